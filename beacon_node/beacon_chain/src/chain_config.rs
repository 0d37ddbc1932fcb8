use serde_derive::{Deserialize, Serialize};

/// There is a multi-hundred-slot skip possible on a real network during extended non-finality; we
/// use 700 to mirror the margin lighthouse's mainnet operators have needed historically.
pub const DEFAULT_IMPORT_MAX_SKIP_SLOTS: u64 = 700;

#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    /// Maximum number of slots the Block Processor will allow a new block to skip ahead of its
    /// parent. `None` means no limit.
    pub import_max_skip_slots: Option<u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            import_max_skip_slots: Some(DEFAULT_IMPORT_MAX_SKIP_SLOTS),
        }
    }
}

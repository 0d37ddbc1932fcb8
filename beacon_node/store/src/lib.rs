//! The Storage Contract: key/value persistence for blocks, states, checkpoints and the deposit
//! root list, with an atomic multi-key write path for `store_chain_head`.
//!
//! `ItemStore` is the byte-level engine trait a database backend implements (`MemoryStore` is the
//! only one provided here; a persistent `LevelDbStore`/`SledStore` would implement the same
//! trait). `Store<S>` is the typed layer the rest of the core talks to: it SSZ-encodes/decodes
//! through whatever `S: ItemStore` it is built on.

mod errors;
mod memory_store;
mod metrics;

pub use errors::Error;
pub use memory_store::MemoryStore;

use parking_lot::RwLock;
use ssz::{Decode, Encode};
use std::sync::Arc;
use types::{BeaconState, Hash256, SignedBeaconBlock, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DBColumn {
    BeaconBlock,
    BeaconState,
    BeaconBlockRootsBySlot,
    BeaconChainInfo,
    DepositDataRootList,
}

impl DBColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            DBColumn::BeaconBlock => "blk",
            DBColumn::BeaconState => "sta",
            DBColumn::BeaconBlockRootsBySlot => "bbs",
            DBColumn::BeaconChainInfo => "bci",
            DBColumn::DepositDataRootList => "ddr",
        }
    }
}

/// A single byte-level write or delete, as accepted by `ItemStore::do_atomically`.
#[derive(Debug, Clone)]
pub enum KeyValueStoreOp {
    PutKeyValue(DBColumn, Vec<u8>, Vec<u8>),
    DeleteKey(DBColumn, Vec<u8>),
}

/// The byte-level engine contract. Implementations need only guarantee that a single
/// `do_atomically` call is indivisible with respect to any other read or write.
pub trait ItemStore: Sync + Send {
    fn get_bytes(&self, column: DBColumn, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;

    fn put_bytes(&self, column: DBColumn, key: &[u8], value: &[u8]) -> Result<(), Error>;

    fn key_exists(&self, column: DBColumn, key: &[u8]) -> bool;

    fn do_atomically(&self, batch: Vec<KeyValueStoreOp>) -> Result<(), Error>;
}

/// A typed, higher-level operation the core issues; `Store::do_atomically` lowers a batch of these
/// into `KeyValueStoreOp`s and hands them to the underlying `ItemStore` as one atomic write.
pub enum StoreOp<'a> {
    PutBlock(Hash256, &'a SignedBeaconBlock),
    PutState(Hash256, &'a BeaconState),
    PutBlockRootAtSlot(Slot, Hash256),
    /// A single `chain.*` pointer write (`CHAIN_HEAD_KEY`, the justified/finalized roots, …),
    /// folded into the same atomic batch as the block/state it is committed alongside.
    PutChainInfo(&'static [u8], Hash256),
}

const JUSTIFIED_BLOCK_ROOT_KEY: &[u8] = b"justified_block_root";
const FINALIZED_BLOCK_ROOT_KEY: &[u8] = b"finalized_block_root";
const JUSTIFIED_STATE_ROOT_KEY: &[u8] = b"justified_state_root";
const FINALIZED_STATE_ROOT_KEY: &[u8] = b"finalized_state_root";
const CHAIN_HEAD_KEY: &[u8] = b"chain_head";

fn slot_key(slot: Slot) -> Vec<u8> {
    slot.as_u64().to_le_bytes().to_vec()
}

fn deposit_index_key(index: u64) -> Vec<u8> {
    index.to_le_bytes().to_vec()
}

/// The typed storage layer the rest of the core talks to. Generic over the byte-level engine.
pub struct Store<S: ItemStore> {
    db: Arc<S>,
    /// Caches `chain.head` so `head_block_root` is a pure in-memory read on the common path;
    /// authoritative state still lives in `db`.
    cached_head: RwLock<Option<Hash256>>,
}

impl<S: ItemStore> Store<S> {
    pub fn new(db: Arc<S>) -> Self {
        Self {
            db,
            cached_head: RwLock::new(None),
        }
    }

    pub fn put_block(&self, block_root: &Hash256, block: &SignedBeaconBlock) -> Result<(), Error> {
        self.db
            .put_bytes(DBColumn::BeaconBlock, block_root.as_bytes(), &block.as_ssz_bytes())
    }

    pub fn get_block(&self, block_root: &Hash256) -> Result<Option<SignedBeaconBlock>, Error> {
        match self.db.get_bytes(DBColumn::BeaconBlock, block_root.as_bytes())? {
            Some(bytes) => Ok(Some(SignedBeaconBlock::from_ssz_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_state(&self, state_root: &Hash256, state: &BeaconState) -> Result<(), Error> {
        self.db
            .put_bytes(DBColumn::BeaconState, state_root.as_bytes(), &state.as_ssz_bytes())
    }

    pub fn get_state(&self, state_root: &Hash256) -> Result<Option<BeaconState>, Error> {
        match self.db.get_bytes(DBColumn::BeaconState, state_root.as_bytes())? {
            Some(bytes) => Ok(Some(BeaconState::from_ssz_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn block_root_at_slot(&self, slot: Slot) -> Result<Option<Hash256>, Error> {
        match self
            .db
            .get_bytes(DBColumn::BeaconBlockRootsBySlot, &slot_key(slot))?
        {
            Some(bytes) => Ok(Some(Hash256::from_slice(&bytes))),
            None => Ok(None),
        }
    }

    pub fn put_block_root_at_slot(&self, slot: Slot, root: Hash256) -> Result<(), Error> {
        self.db
            .put_bytes(DBColumn::BeaconBlockRootsBySlot, &slot_key(slot), root.as_bytes())
    }

    pub fn put_deposit_data_root(&self, index: u64, root: Hash256) -> Result<(), Error> {
        self.db.put_bytes(
            DBColumn::DepositDataRootList,
            &deposit_index_key(index),
            root.as_bytes(),
        )
    }

    pub fn get_deposit_data_root(&self, index: u64) -> Result<Option<Hash256>, Error> {
        match self
            .db
            .get_bytes(DBColumn::DepositDataRootList, &deposit_index_key(index))?
        {
            Some(bytes) => Ok(Some(Hash256::from_slice(&bytes))),
            None => Ok(None),
        }
    }

    fn get_chain_info_root(&self, key: &[u8]) -> Result<Option<Hash256>, Error> {
        match self.db.get_bytes(DBColumn::BeaconChainInfo, key)? {
            Some(bytes) => Ok(Some(Hash256::from_slice(&bytes))),
            None => Ok(None),
        }
    }

    pub fn justified_block_root(&self) -> Result<Option<Hash256>, Error> {
        self.get_chain_info_root(JUSTIFIED_BLOCK_ROOT_KEY)
    }

    pub fn finalized_block_root(&self) -> Result<Option<Hash256>, Error> {
        self.get_chain_info_root(FINALIZED_BLOCK_ROOT_KEY)
    }

    pub fn justified_state_root(&self) -> Result<Option<Hash256>, Error> {
        self.get_chain_info_root(JUSTIFIED_STATE_ROOT_KEY)
    }

    pub fn finalized_state_root(&self) -> Result<Option<Hash256>, Error> {
        self.get_chain_info_root(FINALIZED_STATE_ROOT_KEY)
    }

    pub fn set_justified_checkpoint_roots(
        &self,
        block_root: Hash256,
        state_root: Hash256,
    ) -> Result<(), Error> {
        self.db
            .put_bytes(DBColumn::BeaconChainInfo, JUSTIFIED_BLOCK_ROOT_KEY, block_root.as_bytes())?;
        self.db
            .put_bytes(DBColumn::BeaconChainInfo, JUSTIFIED_STATE_ROOT_KEY, state_root.as_bytes())
    }

    pub fn set_finalized_checkpoint_roots(
        &self,
        block_root: Hash256,
        state_root: Hash256,
    ) -> Result<(), Error> {
        self.db
            .put_bytes(DBColumn::BeaconChainInfo, FINALIZED_BLOCK_ROOT_KEY, block_root.as_bytes())?;
        self.db
            .put_bytes(DBColumn::BeaconChainInfo, FINALIZED_STATE_ROOT_KEY, state_root.as_bytes())
    }

    pub fn head_block_root(&self) -> Result<Option<Hash256>, Error> {
        if let Some(root) = *self.cached_head.read() {
            return Ok(Some(root));
        }
        self.get_chain_info_root(CHAIN_HEAD_KEY)
    }

    /// Atomically commits `block`, `state` and the `chain.head` pointer as a single write, per the
    /// Storage Contract's requirement that this triple never observably update partially.
    pub fn store_chain_head(
        &self,
        block_root: Hash256,
        block: &SignedBeaconBlock,
        state_root: Hash256,
        state: &BeaconState,
    ) -> Result<(), Error> {
        self.do_atomically(vec![
            StoreOp::PutBlock(block_root, block),
            StoreOp::PutState(state_root, state),
            StoreOp::PutChainInfo(CHAIN_HEAD_KEY, block_root),
        ])?;
        *self.cached_head.write() = Some(block_root);
        Ok(())
    }

    /// Lowers a batch of typed operations into byte-level writes and applies them as a single
    /// atomic `ItemStore::do_atomically` call.
    pub fn do_atomically(&self, batch: Vec<StoreOp>) -> Result<(), Error> {
        let ops = batch
            .into_iter()
            .map(|op| match op {
                StoreOp::PutBlock(root, block) => KeyValueStoreOp::PutKeyValue(
                    DBColumn::BeaconBlock,
                    root.as_bytes().to_vec(),
                    block.as_ssz_bytes(),
                ),
                StoreOp::PutState(root, state) => KeyValueStoreOp::PutKeyValue(
                    DBColumn::BeaconState,
                    root.as_bytes().to_vec(),
                    state.as_ssz_bytes(),
                ),
                StoreOp::PutBlockRootAtSlot(slot, root) => KeyValueStoreOp::PutKeyValue(
                    DBColumn::BeaconBlockRootsBySlot,
                    slot_key(slot),
                    root.as_bytes().to_vec(),
                ),
                StoreOp::PutChainInfo(key, root) => KeyValueStoreOp::PutKeyValue(
                    DBColumn::BeaconChainInfo,
                    key.to_vec(),
                    root.as_bytes().to_vec(),
                ),
            })
            .collect();

        self.db.do_atomically(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::{o, Discard, Logger};
    use types::{BeaconBlock, ChainSpec, Eth1Data, SignatureBytes};

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    fn block_and_state() -> (SignedBeaconBlock, BeaconState) {
        let block = SignedBeaconBlock {
            message: BeaconBlock::empty(),
            signature: SignatureBytes::zero(),
        };
        let spec = ChainSpec::minimal();
        let state = BeaconState::new(0, Eth1Data::default(), &spec);
        (block, state)
    }

    #[test]
    fn round_trips_a_block_and_state() {
        let store = Store::new(Arc::new(MemoryStore::open(test_logger())));
        let (block, state) = block_and_state();
        let block_root = Hash256::repeat_byte(9);
        let state_root = Hash256::repeat_byte(10);

        store.put_block(&block_root, &block).unwrap();
        store.put_state(&state_root, &state).unwrap();

        assert_eq!(store.get_block(&block_root).unwrap().unwrap(), block);
        assert_eq!(store.get_state(&state_root).unwrap().unwrap(), state);
        assert!(store.get_block(&Hash256::zero()).unwrap().is_none());
    }

    #[test]
    fn store_chain_head_is_visible_atomically() {
        let store = Store::new(Arc::new(MemoryStore::open(test_logger())));
        let (block, state) = block_and_state();
        let block_root = Hash256::repeat_byte(1);
        let state_root = Hash256::repeat_byte(2);

        store
            .store_chain_head(block_root, &block, state_root, &state)
            .unwrap();

        assert_eq!(store.head_block_root().unwrap(), Some(block_root));
        assert_eq!(store.get_block(&block_root).unwrap().unwrap(), block);
        assert_eq!(store.get_state(&state_root).unwrap().unwrap(), state);
    }

    #[test]
    fn justified_and_finalized_roots_are_independent() {
        let store = Store::new(Arc::new(MemoryStore::open(test_logger())));
        let justified_block = Hash256::repeat_byte(3);
        let justified_state = Hash256::repeat_byte(4);
        let finalized_block = Hash256::repeat_byte(5);
        let finalized_state = Hash256::repeat_byte(6);

        store
            .set_justified_checkpoint_roots(justified_block, justified_state)
            .unwrap();
        store
            .set_finalized_checkpoint_roots(finalized_block, finalized_state)
            .unwrap();

        assert_eq!(store.justified_block_root().unwrap(), Some(justified_block));
        assert_eq!(store.justified_state_root().unwrap(), Some(justified_state));
        assert_eq!(store.finalized_block_root().unwrap(), Some(finalized_block));
        assert_eq!(store.finalized_state_root().unwrap(), Some(finalized_state));
    }

    #[test]
    fn deposit_data_root_list_is_append_only_by_index() {
        let store = Store::new(Arc::new(MemoryStore::open(test_logger())));
        for i in 0..5u64 {
            store
                .put_deposit_data_root(i, Hash256::repeat_byte(i as u8))
                .unwrap();
        }
        assert_eq!(
            store.get_deposit_data_root(3).unwrap(),
            Some(Hash256::repeat_byte(3))
        );
        assert!(store.get_deposit_data_root(5).unwrap().is_none());
    }
}

//! The eth1 follower contract consumed by the Genesis Bootstrapper: a stream of eth1 blocks plus
//! the deposits observed up to each of them.
//!
//! A live JSON-RPC-backed follower is out of scope for this core (see crate docs in the design);
//! `InteropEth1Chain` is the in-memory reference implementation used by tests and local
//! deployments that seed their own deposits rather than watching a real deposit contract.

mod metrics;

use parking_lot::Mutex;
use slog::{debug, Logger};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use types::{DepositData, Hash256};

/// A minimal view of an eth1 block: just enough for the Genesis Bootstrapper to decide
/// `is_valid_genesis_state` and to seed `Eth1Data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eth1Block {
    pub hash: Hash256,
    pub number: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, PartialEq, Eq)]
pub enum Eth1Error {
    UnknownSubscription(SubscriptionId),
}

pub type BlockHandler = Box<dyn FnMut(Eth1Block) + Send>;

/// Exposes the operations the Genesis Bootstrapper needs from an eth1 event source: a
/// subscription to new blocks, and historical deposit replay up to a given block number.
pub trait Eth1DataProvider: Send + Sync {
    /// Primes any internal cache so that `process_past_deposits` and `on_block` are immediately
    /// usable. A no-op for an in-memory provider that is already fully seeded.
    fn init_block_cache(&self);

    /// All deposits observed in blocks numbered `> from_block_number.unwrap_or(0)` and `<=
    /// to_block_number`, in the order they were included.
    fn process_past_deposits(
        &self,
        from_block_number: Option<u64>,
        to_block_number: u64,
    ) -> Vec<DepositData>;

    /// Registers `handler` to be called with every block from this point forward (and, for an
    /// already-seeded provider, any block already observed). Returns a handle for `unsubscribe`.
    fn on_block(&self, handler: BlockHandler) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), Eth1Error>;

    fn latest_block(&self) -> Option<Eth1Block>;
}

struct Inner {
    blocks: Vec<Eth1Block>,
    deposits: Vec<(u64, DepositData)>,
    subscribers: HashMap<u64, BlockHandler>,
}

/// An in-memory eth1 follower seeded once at construction with a fixed block and deposit history,
/// mirroring the fixtures lighthouse's interop tooling generates for local testnets. Pushing a new
/// block with `push_block` notifies every active subscriber synchronously.
pub struct InteropEth1Chain {
    inner: Mutex<Inner>,
    next_subscription_id: AtomicU64,
    log: Logger,
}

impl InteropEth1Chain {
    pub fn new(blocks: Vec<Eth1Block>, deposits: Vec<(u64, DepositData)>, log: Logger) -> Arc<Self> {
        lighthouse_metrics::set_gauge(&metrics::BLOCK_CACHE_LEN, blocks.len() as i64);
        lighthouse_metrics::set_gauge(&metrics::DEPOSIT_CACHE_LEN, deposits.len() as i64);
        if let Some(latest) = blocks.last() {
            lighthouse_metrics::set_gauge(
                &metrics::LATEST_CACHED_BLOCK_TIMESTAMP,
                latest.timestamp as i64,
            );
        }

        Arc::new(Self {
            inner: Mutex::new(Inner {
                blocks,
                deposits,
                subscribers: HashMap::new(),
            }),
            next_subscription_id: AtomicU64::new(0),
            log,
        })
    }

    /// Appends a new eth1 block to the cache and notifies every active subscriber in
    /// registration order, as a live follower would on a new head.
    pub fn push_block(&self, block: Eth1Block) {
        let mut inner = self.inner.lock();
        inner.blocks.push(block);
        lighthouse_metrics::set_gauge(&metrics::BLOCK_CACHE_LEN, inner.blocks.len() as i64);
        lighthouse_metrics::set_gauge(&metrics::LATEST_CACHED_BLOCK_TIMESTAMP, block.timestamp as i64);

        debug!(self.log, "Eth1 block observed"; "number" => block.number, "timestamp" => block.timestamp);

        for handler in inner.subscribers.values_mut() {
            handler(block);
        }
    }

    /// Appends a deposit at `block_number`, for tests that build up a deposit history
    /// incrementally rather than supplying it all at construction.
    pub fn push_deposit(&self, block_number: u64, deposit: DepositData) {
        let mut inner = self.inner.lock();
        inner.deposits.push((block_number, deposit));
        lighthouse_metrics::set_gauge(&metrics::DEPOSIT_CACHE_LEN, inner.deposits.len() as i64);
    }
}

impl Eth1DataProvider for InteropEth1Chain {
    fn init_block_cache(&self) {
        debug!(self.log, "Eth1 block cache primed"; "blocks" => self.inner.lock().blocks.len());
    }

    fn process_past_deposits(
        &self,
        from_block_number: Option<u64>,
        to_block_number: u64,
    ) -> Vec<DepositData> {
        let from = from_block_number.unwrap_or(0);
        self.inner
            .lock()
            .deposits
            .iter()
            .filter(|(number, _)| *number > from && *number <= to_block_number)
            .map(|(_, data)| data.clone())
            .collect()
    }

    fn on_block(&self, handler: BlockHandler) -> SubscriptionId {
        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        self.inner.lock().subscribers.insert(id, handler);
        lighthouse_metrics::set_gauge(
            &metrics::SUBSCRIBER_COUNT,
            self.inner.lock().subscribers.len() as i64,
        );
        SubscriptionId(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), Eth1Error> {
        let mut inner = self.inner.lock();
        if inner.subscribers.remove(&id.0).is_none() {
            return Err(Eth1Error::UnknownSubscription(id));
        }
        lighthouse_metrics::set_gauge(&metrics::SUBSCRIBER_COUNT, inner.subscribers.len() as i64);
        Ok(())
    }

    fn latest_block(&self) -> Option<Eth1Block> {
        self.inner.lock().blocks.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::{o, Discard};
    use std::sync::atomic::AtomicUsize;
    use types::{Hash256, PublicKeyBytes, SignatureBytes};

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    fn deposit(i: u8) -> DepositData {
        DepositData {
            pubkey: PublicKeyBytes([i; 48]),
            withdrawal_credentials: Hash256::zero(),
            amount: 32_000_000_000,
            signature: SignatureBytes::zero(),
        }
    }

    #[test]
    fn process_past_deposits_respects_block_bounds() {
        let chain = InteropEth1Chain::new(
            vec![],
            vec![(1, deposit(1)), (2, deposit(2)), (3, deposit(3))],
            test_logger(),
        );

        let up_to_2 = chain.process_past_deposits(None, 2);
        assert_eq!(up_to_2.len(), 2);

        let between = chain.process_past_deposits(Some(1), 3);
        assert_eq!(between.len(), 2);
    }

    #[test]
    fn push_block_notifies_subscribers() {
        let chain = InteropEth1Chain::new(vec![], vec![], test_logger());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        let id = chain.on_block(Box::new(move |_block| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }));

        chain.push_block(Eth1Block {
            hash: Hash256::repeat_byte(1),
            number: 1,
            timestamp: 100,
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        chain.unsubscribe(id).unwrap();
        chain.push_block(Eth1Block {
            hash: Hash256::repeat_byte(2),
            number: 2,
            timestamp: 106,
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_unknown_id_errors() {
        let chain = InteropEth1Chain::new(vec![], vec![], test_logger());
        assert_eq!(
            chain.unsubscribe(SubscriptionId(42)),
            Err(Eth1Error::UnknownSubscription(SubscriptionId(42)))
        );
    }
}

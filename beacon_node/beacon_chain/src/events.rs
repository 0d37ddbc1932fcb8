//! The event bus the Chain Coordinator publishes `block`/`head`/`justified`/`finalized`/
//! `fork-digest-changed` events on, mirroring the teacher's `ServerSentEventHandler` but without
//! the SSE/HTTP framing (the REST API layer is out of scope, see crate docs).

use serde_derive::{Deserialize, Serialize};
use slog::{trace, Logger};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, SendError, Sender};
use types::{Checkpoint, ForkDigest, Hash256, Slot};

const DEFAULT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEventData {
    pub block_root: Hash256,
    pub slot: Slot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadEventData {
    pub block_root: Hash256,
    pub state_root: Hash256,
    pub slot: Slot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Block(BlockEventData),
    Head(HeadEventData),
    Justified(Checkpoint),
    Finalized(Checkpoint),
    ForkDigestChanged(ForkDigest),
}

pub struct ServerSentEventHandler {
    block_tx: Sender<EventKind>,
    head_tx: Sender<EventKind>,
    justified_tx: Sender<EventKind>,
    finalized_tx: Sender<EventKind>,
    fork_digest_tx: Sender<EventKind>,
    log: Logger,
}

impl ServerSentEventHandler {
    pub fn new(log: Logger) -> Self {
        Self::new_with_capacity(log, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn new_with_capacity(log: Logger, capacity: usize) -> Self {
        let (block_tx, _) = broadcast::channel(capacity);
        let (head_tx, _) = broadcast::channel(capacity);
        let (justified_tx, _) = broadcast::channel(capacity);
        let (finalized_tx, _) = broadcast::channel(capacity);
        let (fork_digest_tx, _) = broadcast::channel(capacity);

        Self {
            block_tx,
            head_tx,
            justified_tx,
            finalized_tx,
            fork_digest_tx,
            log,
        }
    }

    pub fn register(&self, kind: EventKind) {
        let result = match &kind {
            EventKind::Block(_) => self.block_tx.send(kind.clone()),
            EventKind::Head(_) => self.head_tx.send(kind.clone()),
            EventKind::Justified(_) => self.justified_tx.send(kind.clone()),
            EventKind::Finalized(_) => self.finalized_tx.send(kind.clone()),
            EventKind::ForkDigestChanged(_) => self.fork_digest_tx.send(kind.clone()),
        };

        if let Err(SendError(event)) = result {
            trace!(self.log, "No receivers registered to listen for event"; "event" => ?event);
        }
    }

    pub fn subscribe_block(&self) -> Receiver<EventKind> {
        self.block_tx.subscribe()
    }

    pub fn subscribe_head(&self) -> Receiver<EventKind> {
        self.head_tx.subscribe()
    }

    pub fn subscribe_justified(&self) -> Receiver<EventKind> {
        self.justified_tx.subscribe()
    }

    pub fn subscribe_finalized(&self) -> Receiver<EventKind> {
        self.finalized_tx.subscribe()
    }

    pub fn subscribe_fork_digest(&self) -> Receiver<EventKind> {
        self.fork_digest_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::{o, Discard};

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    #[test]
    fn subscriber_receives_registered_event() {
        let handler = ServerSentEventHandler::new(test_logger());
        let mut rx = handler.subscribe_head();

        let data = HeadEventData {
            block_root: Hash256::repeat_byte(1),
            state_root: Hash256::repeat_byte(2),
            slot: Slot::new(5),
        };
        handler.register(EventKind::Head(data.clone()));

        assert_eq!(rx.try_recv().unwrap(), EventKind::Head(data));
    }

    #[test]
    fn registering_with_no_subscribers_does_not_panic() {
        let handler = ServerSentEventHandler::new(test_logger());
        handler.register(EventKind::Justified(Checkpoint::default()));
    }
}

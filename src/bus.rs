use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Named broadcast topic with bounded capacity.
///
/// Slow subscribers lose the oldest messages (`RecvError::Lagged`) rather than
/// stalling the publisher, which runs on the control thread.
#[derive(Debug, Clone)]
pub struct Topic<T> {
    name: &'static str,
    tx: broadcast::Sender<Arc<T>>,
}

impl<T: Send + Sync + 'static> Topic<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { name, tx }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Publish to every current subscriber; returns how many there were.
    pub fn publish(&self, msg: T) -> usize {
        match self.tx.send(Arc::new(msg)) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(topic = self.name, "Published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

use std::sync::Arc;
use tokio::select;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use super::{FeedStats, ServiceError};

/// Consumer side of a running feed
///
/// Values arrive through [`FeedHandle::recv`]. The feed runs until it is
/// stopped, its policy ends it, or the handle is dropped. Dropping the
/// handle ends the task even while clones of its shutdown sender live on.
pub struct FeedHandle<T> {
    receiver: mpsc::Receiver<T>,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
    stats: Arc<Mutex<FeedStats>>,
}

impl<T> FeedHandle<T> {
    pub(crate) fn new(
        receiver: mpsc::Receiver<T>,
        shutdown_tx: broadcast::Sender<()>,
        task: JoinHandle<()>,
        stats: Arc<Mutex<FeedStats>>,
    ) -> Self {
        Self {
            receiver,
            shutdown_tx,
            task,
            stats,
        }
    }

    /// Next value, or `None` once the feed has ended and the buffer is drained
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Ask the feed to stop without waiting for it
    pub fn stop(&self) {
        // no receivers means the task is already gone
        let _ = self.shutdown_tx.send(());
    }

    /// Sender that stops this feed, for wiring into a wider shutdown
    pub fn get_shutdown_tx(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Stop the feed and wait for its task to finish
    pub async fn shutdown(self) -> Result<FeedStats, ServiceError> {
        let _ = self.shutdown_tx.send(());
        drop(self.receiver);

        self.task
            .await
            .map_err(|e| ServiceError::Task(format!("Feed task failed: {}", e)))?;

        let stats = self.stats.lock().await.clone();
        Ok(stats)
    }

    /// Snapshot of the feed counters
    pub async fn stats(&self) -> FeedStats {
        self.stats.lock().await.clone()
    }
}

/// Result of handing one value to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Sent,
    /// The consumer dropped its receiver
    Closed,
    /// Shutdown was requested while waiting for buffer space
    Stopped,
}

/// Send `value`, giving up when shutdown is signalled first
pub(crate) async fn emit<T>(
    tx: &mpsc::Sender<T>,
    value: T,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> Delivery {
    select! {
        biased;
        _ = shutdown_rx.recv() => Delivery::Stopped,
        sent = tx.send(value) => match sent {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::Closed,
        },
    }
}

//! Background Expiration Task
//!
//! Items stored with a positive expiration are deleted when their deadline
//! passes, whether or not anyone asks for them again. Lazy expiry in the
//! engine covers keys that are accessed; this task covers the rest.
//!
//! ## Design
//!
//! The engine keeps its pending deadlines ordered, so there is nothing to
//! scan. The task:
//! 1. Purges every entry whose deadline has passed
//! 2. Sleeps until the next deadline, or until the engine signals that an
//!    earlier one was scheduled
//! 3. Repeats until shut down
//!
//! With no pending deadlines it sleeps until notified.

use crate::storage::StorageEngine;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

/// A handle to the running expiration task.
///
/// When this handle is dropped, the task is stopped.
#[derive(Debug)]
pub struct ExpiryTask {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpiryTask {
    /// Spawns the expiration task for `engine`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use memlru::storage::{ExpiryTask, StorageEngine};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let expiry = ExpiryTask::start(Arc::clone(&engine));
    ///
    /// // Dropping the handle stops the task
    /// drop(expiry);
    /// ```
    pub fn start(engine: Arc<StorageEngine>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(purge_loop(engine, shutdown_rx));

        info!("Background expiration task started");

        Self { shutdown_tx }
    }

    /// Stops the task. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        debug!("Background expiration task stopped");
    }
}

impl Drop for ExpiryTask {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn purge_loop(engine: Arc<StorageEngine>, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        let next_deadline = engine.purge_expired();

        tokio::select! {
            _ = sleep_until(next_deadline) => {}
            _ = engine.expiry_notify().notified() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiration task received shutdown signal");
                    return;
                }
            }
        }
    }
}

/// Sleeps until `deadline`, or forever if there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(when) => tokio::time::sleep_until(when).await,
        None => std::future::pending().await,
    }
}

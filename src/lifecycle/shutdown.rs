//! Shutdown coordination for the daemon.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Shared shutdown flag.
///
/// Once triggered it stays triggered: a waiter created after the signal
/// resolves immediately, so a listener that starts late still stops.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests shutdown. Returns false if it was already requested.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|triggered| !std::mem::replace(triggered, true))
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once shutdown is requested.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            // Err means every sender is gone; nobody can trigger any more.
            let _ = rx.wait_for(|triggered| *triggered).await;
        }
    }

    /// Number of waiters not yet finished.
    pub fn waiter_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

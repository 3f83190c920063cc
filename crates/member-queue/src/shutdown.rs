//! Cooperative cancellation for long-running queue consumers.

use tokio::sync::watch;

/// Create a linked controller/signal pair
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownController { tx }, ShutdownSignal { rx })
}

/// Host-side handle used to request shutdown
#[derive(Debug)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    /// Request shutdown; every signal observes it
    pub fn shutdown(&self) {
        // send_replace stores the value even when no signal is listening
        self.tx.send_replace(true);
    }

    /// Create another signal linked to this controller
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Consumer-side view of a shutdown request
///
/// Dropping the controller without calling [`ShutdownController::shutdown`]
/// never cancels the signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Check whether shutdown has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
#[path = "shutdown_tests.rs"]
mod tests;

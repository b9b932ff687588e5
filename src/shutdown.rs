//! Cooperative cancellation for provider calls
//!
//! A [`Shutdown`] handle is cloned into every provider. Once the matching
//! [`ShutdownTrigger`] fires, pending and future API calls resolve to
//! [`ProviderError::Cancelled`] instead of waiting on the network.

use std::future::Future;

use tokio::sync::watch;
use tracing::warn;

use crate::provider::ProviderError;

/// Sending half, owned by whoever decides the run should stop
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

/// Receiving half, cheap to clone
#[derive(Debug, Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
}

/// Create a connected trigger/handle pair
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownTrigger { sender }, Shutdown { receiver })
}

impl ShutdownTrigger {
    /// Request cancellation of every call observing the paired handle
    pub fn trigger(&self) {
        // send_replace never fails, even without live receivers
        self.sender.send_replace(true);
    }
}

impl Shutdown {
    /// A handle that is never cancelled
    pub fn never() -> Self {
        let (_sender, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_requested(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation has been requested
    pub async fn requested(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // Trigger dropped without firing: nothing can cancel us anymore
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run a provider call, aborting it as soon as cancellation is requested
    pub async fn guard<T, F>(&self, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        if self.is_requested() {
            return Err(ProviderError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.requested() => Err(ProviderError::Cancelled),
            result = call => result,
        }
    }
}

/// Fire `trigger` on the first Ctrl+C
pub fn cancel_on_ctrl_c(trigger: ShutdownTrigger) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling remaining API calls");
            trigger.trigger();
        }
    });
}

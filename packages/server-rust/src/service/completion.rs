//! Single completion with two observers: a future and an optional callback.
//!
//! Callback-style callers and future-style callers observe the same outcome.
//! A [`Completion`] is settled exactly once: either explicitly through
//! [`Completion::settle`] or, if dropped unsettled, with an error. Settling
//! invokes the callback (if any) and then resolves the paired [`Deferred`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tern_core::{ServiceError, ServiceResult};
use tokio::sync::oneshot;

/// Completion callback: receives the outcome by reference.
pub type Callback<T> = Box<dyn FnOnce(Result<&T, &ServiceError>) + Send>;

/// Write side of a completion.
pub struct Completion<T> {
    deferred: Option<oneshot::Sender<ServiceResult<T>>>,
    callback: Option<Callback<T>>,
}

impl<T> Completion<T> {
    /// Creates a completion and the future observing it.
    #[must_use]
    pub fn new(callback: Option<Callback<T>>) -> (Self, Deferred<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                deferred: Some(tx),
                callback,
            },
            Deferred { rx },
        )
    }

    /// Settles the completion, feeding both observers.
    pub fn settle(mut self, result: ServiceResult<T>) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: ServiceResult<T>) {
        if let Some(callback) = self.callback.take() {
            callback(result.as_ref());
        }
        if let Some(tx) = self.deferred.take() {
            // The receiver may have been dropped by a callback-only caller.
            let _ = tx.send(result);
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if self.callback.is_some() || self.deferred.is_some() {
            self.deliver(Err(ServiceError::General(anyhow::anyhow!(
                "call was abandoned before it completed"
            ))));
        }
    }
}

/// Read side of a completion.
#[derive(Debug)]
pub struct Deferred<T> {
    rx: oneshot::Receiver<ServiceResult<T>>,
}

impl<T> Future for Deferred<T> {
    type Output = ServiceResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(ServiceError::General(anyhow::anyhow!(
                    "completion dropped without a result"
                )))
            })
        })
    }
}

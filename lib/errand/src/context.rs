//! Per-call cancellation and deadlines.
//!
//! A [`Context`] travels with every [`Agent::request`](crate::Agent::request).
//! The agent races the send against it: a fired [`CancelHandle`] ends the
//! call with [`Error::Canceled`], an expired deadline with [`Error::Timeout`].
//!
//! ```
//! use std::time::Duration;
//! use errand::Context;
//!
//! let (ctx, handle) = Context::background()
//!     .with_timeout(Duration::from_secs(5))
//!     .with_cancel();
//! assert!(!ctx.is_cancelled());
//! handle.cancel();
//! assert!(ctx.is_cancelled());
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::{Error, Result};

type Signal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Cancellation and deadline carrier for one or more calls.
///
/// Derived contexts keep every signal of their parent and the earliest
/// deadline, so cancelling a parent also cancels its children.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    signals: Vec<watch::Receiver<bool>>,
}

/// Fires the cancellation signal of the contexts derived with
/// [`Context::with_cancel`].
///
/// Dropping the handle does not cancel anything.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel every call running under the associated context.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Context {
    /// A context without deadline nor cancellation.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context expiring after `timeout`.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context expiring at `deadline`; an earlier existing deadline wins.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derive a cancellable context.
    #[must_use]
    pub fn with_cancel(mut self) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        self.signals.push(receiver);
        (self, CancelHandle { sender })
    }

    /// The deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether any cancellation signal fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signals.iter().any(|signal| *signal.borrow())
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= Instant::now())
    }

    /// Run `future` under this context.
    pub(crate) async fn run<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(Error::Canceled);
        }
        if self.is_expired() {
            return Err(Error::Timeout);
        }

        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, future)
                    .await
                    .map_err(|_| Error::Timeout)?,
                None => future.await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancelled() => Err(Error::Canceled),
            result = bounded => result,
        }
    }

    /// Resolves once any signal fires; pending forever without signals.
    async fn cancelled(&self) {
        let mut waiting: Vec<Signal> = self
            .signals
            .iter()
            .cloned()
            .map(|mut signal| -> Signal {
                Box::pin(async move {
                    let closed = signal.wait_for(|cancelled| *cancelled).await.is_err();
                    if closed {
                        // handle dropped without cancelling
                        std::future::pending::<()>().await;
                    }
                })
            })
            .collect();

        std::future::poll_fn(|cx| {
            if waiting
                .iter_mut()
                .any(|signal| signal.as_mut().poll(cx).is_ready())
            {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await;
    }
}

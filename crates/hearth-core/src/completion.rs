//! Single-shot completion of a setup or save request

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::StackError;

pub(crate) type Completer = oneshot::Sender<Result<(), StackError>>;

enum CompletionState {
    Ready(Option<Result<(), StackError>>),
    Waiting(oneshot::Receiver<Result<(), StackError>>),
}

/// Resolves exactly once with the outcome of the request that produced it
///
/// The request is already running when this is returned; dropping it only
/// discards the outcome.
#[must_use = "a Completion carries the only report of the request's outcome"]
pub struct Completion {
    state: CompletionState,
}

impl Completion {
    pub(crate) fn ready(result: Result<(), StackError>) -> Self {
        Self {
            state: CompletionState::Ready(Some(result)),
        }
    }

    pub(crate) fn channel() -> (Completer, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                state: CompletionState::Waiting(rx),
            },
        )
    }

    /// True if the outcome was decided without any store work
    pub fn is_immediate(&self) -> bool {
        matches!(self.state, CompletionState::Ready(_))
    }
}

impl Future for Completion {
    type Output = Result<(), StackError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            CompletionState::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(StackError::WorkerUnavailable)))
            }
            // A dropped sender means the worker went away without reporting
            CompletionState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(StackError::WorkerUnavailable))),
        }
    }
}

//! Single-shot command completion.
//!
//! Each dispatched command gets one `oneshot` channel. The connection holds the
//! sending half while the command is outstanding and consumes it when the
//! command resolves, so a command can be resolved at most once.

use crate::client::error::{ClientError, ClientResult};
use crate::protocol::RespValue;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::sync::oneshot::{self, error::TryRecvError};

/// The half of a reply channel a connection resolves.
pub type ReplySender = oneshot::Sender<ClientResult<RespValue>>;

/// The eventual outcome of one command.
///
/// Resolves to `Ok(value)` when a reply was decoded (including null and Redis
/// error replies) and to `Err(_)` when the command failed. If the client is
/// dropped first, it resolves to [`ClientError::Canceled`].
#[derive(Debug)]
#[must_use = "a Reply does nothing unless awaited or polled"]
pub struct Reply {
    /// `None` once the outcome has been handed out
    rx: Option<oneshot::Receiver<ClientResult<RespValue>>>,
}

impl Reply {
    /// Creates a connected sender/reply pair.
    pub fn channel() -> (ReplySender, Reply) {
        let (tx, rx) = oneshot::channel();
        (tx, Reply { rx: Some(rx) })
    }

    /// Takes the outcome if the command has resolved, without waiting.
    ///
    /// Yields the outcome once; later calls return `None`.
    pub fn try_take(&mut self) -> Option<ClientResult<RespValue>> {
        let rx = self.rx.as_mut()?;
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => Err(ClientError::Canceled),
        };
        self.rx = None;
        Some(result)
    }

    /// Returns true once the outcome has been taken or awaited.
    pub fn is_taken(&self) -> bool {
        self.rx.is_none()
    }
}

impl Future for Reply {
    type Output = ClientResult<RespValue>;

    /// Polling again after completion yields `Canceled`.
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let rx = match self.rx.as_mut() {
            Some(rx) => rx,
            None => return Poll::Ready(Err(ClientError::Canceled)),
        };
        let received = ready!(Pin::new(rx).poll(cx));
        self.rx = None;
        Poll::Ready(received.unwrap_or(Err(ClientError::Canceled)))
    }
}

//! Client Errors
//!
//! The ways a command can fail, as seen by whoever awaits its [`Reply`](crate::client::Reply).

use crate::protocol::ParseError;

/// Result type for commands.
pub type ClientResult<T> = Result<T, ClientError>;

/// Why a command failed.
///
/// A Redis error reply (`-ERR ...`) is not a `ClientError`; it arrives as
/// `Ok(RespValue::Error(..))`.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The reply was not valid RESP. The connection was discarded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The socket closed before the reply completed.
    #[error("connection closed before the reply completed")]
    ConnectionClosed,

    /// Connecting failed, or the socket hit an I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client went away before the command was resolved.
    #[error("client shut down before the command completed")]
    Canceled,
}

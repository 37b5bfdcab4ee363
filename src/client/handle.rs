//! Background Client Driver
//!
//! [`ClientHandle::spawn`] starts one tokio task that owns a
//! [`Client`]`<`[`TcpTransport`]`>`. The task is the only place client state
//! changes, so the core stays single-threaded while handles can be cloned and
//! used from anywhere.
//!
//! ```text
//!  ClientHandle ──request──┐
//!  ClientHandle ──request──┤     ┌──────────────── driver task ────────────────┐
//!                          └───> │ select! { request => client.dispatch(..)     │
//!  socket tasks ───event───────> │           event   => client.handle_event(..) }│
//!                                └──────────────────────────────────────────────┘
//! ```
//!
//! The task exits when every handle is dropped. Outstanding replies then
//! resolve with [`ClientError::Canceled`](crate::client::ClientError::Canceled).

use crate::client::dispatcher::Client;
use crate::client::reply::{Reply, ReplySender};
use crate::config::ClientConfig;
use crate::connection::ClientStats;
use crate::protocol::Command;
use crate::transport::{TcpTransport, TransportEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A command on its way to the driver task.
struct Request {
    command: Command,
    reply: ReplySender,
}

/// Cloneable handle to a client running on its own task.
///
/// # Example
///
/// ```no_run
/// use respool::{ClientConfig, ClientHandle};
///
/// # async fn example() -> Result<(), respool::ClientError> {
/// let client = ClientHandle::spawn(ClientConfig::default());
/// client.invoke("SET", ["greeting", "hello"]).await?;
/// let value = client.invoke("GET", ["greeting"]).await?;
/// assert_eq!(value.as_str(), Some("hello"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ClientHandle {
    requests: mpsc::UnboundedSender<Request>,
    stats: Arc<ClientStats>,
}

impl ClientHandle {
    /// Spawns the driver task on the current tokio runtime.
    pub fn spawn(config: ClientConfig) -> Self {
        Self::spawn_with_join(config).0
    }

    /// Like [`spawn`](ClientHandle::spawn), also returning the driver's join
    /// handle.
    pub fn spawn_with_join(config: ClientConfig) -> (Self, JoinHandle<()>) {
        let (transport, events) = TcpTransport::new(config.connect_timeout);
        let client = Client::new(&config, transport);
        let stats = client.stats();
        let (requests, rx) = mpsc::unbounded_channel();

        info!(addr = %config.addr(), max_idle = config.max_idle, "Client started");
        let join = tokio::spawn(driver_loop(client, rx, events));

        (Self { requests, stats }, join)
    }

    /// Sends `name args...` and returns the reply future.
    ///
    /// The command is on its way as soon as this returns; awaiting the reply
    /// is optional.
    pub fn invoke<N, I, A>(&self, name: N, args: I) -> Reply
    where
        N: AsRef<[u8]>,
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.send(Command::new(name, args))
    }

    /// Sends a prepared command.
    pub fn send(&self, command: Command) -> Reply {
        let (reply, rx) = Reply::channel();
        // If the driver is gone the request (and its sender) is dropped here,
        // which resolves the reply as canceled.
        let _ = self.requests.send(Request { command, reply });
        rx
    }

    /// Shared client statistics.
    pub fn stats(&self) -> Arc<ClientStats> {
        Arc::clone(&self.stats)
    }

    /// Returns true while the driver task is accepting commands.
    pub fn is_running(&self) -> bool {
        !self.requests.is_closed()
    }
}

/// The driver loop: one task, one client.
async fn driver_loop(
    mut client: Client<TcpTransport>,
    mut requests: mpsc::UnboundedReceiver<Request>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(Request { command, reply }) => client.dispatch(command, reply),
                None => {
                    debug!("All client handles dropped");
                    break;
                }
            },
            Some(event) = events.recv() => client.handle_event(event),
        }
    }

    client.shutdown();
    info!(stats = %client.stats(), "Client stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unreachable_server_fails_command() {
        // Grab a free port, then stop listening on it.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = ClientConfig::new("127.0.0.1", port);
        config.connect_timeout = Some(Duration::from_secs(1));
        let client = ClientHandle::spawn(config);

        let result = tokio::time::timeout(Duration::from_secs(3), client.invoke("PING", Vec::<&str>::new()))
            .await
            .expect("reply in time");
        assert!(matches!(result, Err(ClientError::Io(_))));
    }

    #[tokio::test]
    async fn test_driver_stops_when_handles_dropped() {
        let (client, join) = ClientHandle::spawn_with_join(ClientConfig::new("127.0.0.1", 1));
        let other = client.clone();
        assert!(other.is_running());
        drop(client);
        drop(other);

        tokio::time::timeout(Duration::from_secs(2), join)
            .await
            .expect("driver exits")
            .expect("driver did not panic");
    }
}

//! Tokio TCP Engine
//!
//! Each socket gets its own task. The task connects, then loops forwarding
//! whatever it reads as [`Notification::Data`] and writing whatever the client
//! queues with [`Transport::send`]. Everything it observes goes back to the
//! client over one shared event channel.
//!
//! ```text
//!  send(id, bytes) ──> [outbound mpsc] ──> socket task ──> TcpStream
//!                                              │
//!  Client <── [events mpsc] <── Connected/Data/Error/Closed
//! ```
//!
//! Dropping a socket's outbound sender (see [`Transport::close`]) ends its
//! task and closes the socket.

use crate::transport::{ConnectionId, Notification, Transport, TransportEvent};
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Initial read buffer capacity per socket
const READ_BUFFER_SIZE: usize = 4096;

/// Engine backed by tokio TCP sockets.
///
/// `connect` spawns onto the current tokio runtime, so it must be called from
/// within one.
#[derive(Debug)]
pub struct TcpTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    writers: HashMap<ConnectionId, mpsc::UnboundedSender<Bytes>>,
    connect_timeout: Option<Duration>,
    next_id: u64,
}

impl TcpTransport {
    /// Creates an engine and the receiver its notifications arrive on.
    pub fn new(
        connect_timeout: Option<Duration>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Self {
            events,
            writers: HashMap::new(),
            connect_timeout,
            next_id: 0,
        };
        (transport, rx)
    }

    /// Number of sockets the engine is tracking.
    pub fn open_sockets(&self) -> usize {
        self.writers.len()
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, host: &str, port: u16) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId::new(self.next_id);

        let (tx, rx) = mpsc::unbounded_channel();
        self.writers.insert(id, tx);

        let addr = format!("{}:{}", host, port);
        debug!(connection = %id, addr = %addr, "Connecting");
        tokio::spawn(socket_task(
            id,
            addr,
            self.connect_timeout,
            rx,
            self.events.clone(),
        ));

        id
    }

    fn send(&mut self, id: ConnectionId, data: Bytes) {
        match self.writers.get(&id) {
            Some(writer) => {
                if writer.send(data).is_err() {
                    // The task already reported why it stopped.
                    debug!(connection = %id, "Socket task gone, dropping outbound bytes");
                }
            }
            None => warn!(connection = %id, "Send on unknown connection"),
        }
    }

    fn close(&mut self, id: ConnectionId) {
        if self.writers.remove(&id).is_some() {
            debug!(connection = %id, "Closing socket");
        }
    }
}

/// Drives one socket until it closes, fails, or the client drops it.
async fn socket_task(
    id: ConnectionId,
    addr: String,
    connect_timeout: Option<Duration>,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut stream = match connect(&addr, connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = events.send(TransportEvent::error(id, e));
            return;
        }
    };

    // Disable Nagle to keep request latency low for small payloads.
    if let Err(e) = stream.set_nodelay(true) {
        trace!(connection = %id, error = %e, "Could not set TCP_NODELAY");
    }

    if events.send(TransportEvent::connected(id)).is_err() {
        return;
    }

    let (mut reader, mut writer) = stream.split();
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        tokio::select! {
            read = reader.read_buf(&mut buffer) => {
                let notification = match read {
                    Ok(0) => Notification::Closed,
                    Ok(n) => {
                        trace!(connection = %id, bytes = n, "Read data");
                        let data = buffer.split().freeze();
                        if buffer.capacity() < 1024 {
                            buffer.reserve(READ_BUFFER_SIZE);
                        }
                        Notification::Data(data)
                    }
                    Err(e) => Notification::Error(e),
                };
                let done = !matches!(notification, Notification::Data(_));
                if events.send(TransportEvent::new(id, notification)).is_err() || done {
                    return;
                }
            }
            out = outbound.recv() => match out {
                Some(data) => {
                    if let Err(e) = writer.write_all(&data).await {
                        let _ = events.send(TransportEvent::error(id, e));
                        return;
                    }
                    trace!(connection = %id, bytes = data.len(), "Wrote data");
                }
                // The client closed this connection.
                None => return,
            },
        }
    }
}

async fn connect(addr: &str, timeout: Option<Duration>) -> io::Result<TcpStream> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, TcpStream::connect(addr)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {} timed out", addr),
            )),
        },
        None => TcpStream::connect(addr).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_connect_send_receive_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (mut transport, mut events) = TcpTransport::new(None);
        let id = transport.connect("127.0.0.1", port);

        let (mut server, _) = listener.accept().await.unwrap();
        let event = next_event(&mut events).await;
        assert_eq!(event.id, id);
        assert!(matches!(event.notification, Notification::Connected));

        transport.send(id, Bytes::from_static(b"*1\r\n$4\r\nPING\r\n"));
        let mut buf = [0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"*1\r\n$4\r\nPING\r\n");

        server.write_all(b"+PONG\r\n").await.unwrap();
        let event = next_event(&mut events).await;
        match event.notification {
            Notification::Data(data) => assert_eq!(&data[..], b"+PONG\r\n"),
            other => panic!("unexpected notification: {:?}", other),
        }

        drop(server);
        let event = next_event(&mut events).await;
        assert!(matches!(event.notification, Notification::Closed));
    }

    #[tokio::test]
    async fn test_connect_refused_reports_error() {
        // Grab a free port, then stop listening on it.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (mut transport, mut events) = TcpTransport::new(Some(Duration::from_secs(1)));
        let id = transport.connect("127.0.0.1", port);

        let event = next_event(&mut events).await;
        assert_eq!(event.id, id);
        assert!(matches!(event.notification, Notification::Error(_)));
    }

    #[tokio::test]
    async fn test_close_drops_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (mut transport, mut events) = TcpTransport::new(None);
        let id = transport.connect("127.0.0.1", port);
        let (mut server, _) = listener.accept().await.unwrap();
        assert!(matches!(
            next_event(&mut events).await.notification,
            Notification::Connected
        ));
        assert_eq!(transport.open_sockets(), 1);

        transport.close(id);
        assert_eq!(transport.open_sockets(), 0);

        // The server sees EOF once the task drops the stream.
        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(2), server.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }
}

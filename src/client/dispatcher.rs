//! Client Facade
//!
//! [`Client`] turns a command name and arguments into a request, picks a
//! connection from the [`Pool`] (opening one on a miss), and routes engine
//! notifications to the connection they concern.
//!
//! ## Ownership
//!
//! Every live connection is owned by exactly one of two maps:
//!
//! ```text
//!             acquire + command
//!   Pool.idle ─────────────────> Client.in_flight
//!       ▲                               │
//!       └──────── reply delivered ──────┘
//!                                       │ close / error / bad reply
//!                                       ▼
//!                                   discarded
//! ```
//!
//! A connection is removed from the pool before it is given a command and
//! re-inserted only once the command's reply has been delivered, so two
//! commands can never interleave on one socket.

use crate::client::error::ClientError;
use crate::client::reply::{Reply, ReplySender};
use crate::config::ClientConfig;
use crate::connection::{ClientStats, Connection, ConnectionState, DataOutcome};
use crate::pool::Pool;
use crate::protocol::Command;
use crate::transport::{ConnectionId, Notification, Transport, TransportEvent};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Pooled, command-agnostic client core.
///
/// Single-threaded and non-blocking: every state change happens inside
/// [`dispatch`](Client::dispatch) or [`handle_event`](Client::handle_event).
/// The owner is responsible for feeding it the engine's events.
pub struct Client<T: Transport> {
    transport: T,
    pool: Pool,
    /// Connections with a command outstanding
    in_flight: HashMap<ConnectionId, Connection>,
    stats: Arc<ClientStats>,
}

impl<T: Transport> Client<T> {
    /// Creates a client that opens connections through `transport`.
    pub fn new(config: &ClientConfig, transport: T) -> Self {
        Self {
            transport,
            pool: Pool::new(config.host.clone(), config.port, config.max_idle),
            in_flight: HashMap::new(),
            stats: Arc::new(ClientStats::new()),
        }
    }

    /// Sends `name args...` and returns the reply future.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let reply = client.invoke("SET", ["foo", "bar"]);
    /// ```
    pub fn invoke<N, I, A>(&mut self, name: N, args: I) -> Reply
    where
        N: AsRef<[u8]>,
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let (tx, reply) = Reply::channel();
        self.dispatch(Command::new(name, args), tx);
        reply
    }

    /// Issues a prepared command; `reply` is resolved exactly once.
    pub fn dispatch(&mut self, command: Command, reply: ReplySender) {
        let mut conn = self.pool.acquire(&mut self.transport);
        if conn.state() == ConnectionState::Connecting {
            self.stats.connection_opened();
        }

        let id = conn.id();
        let len = conn.command(&mut self.transport, &command, reply);
        self.stats.command_dispatched(len);
        debug!(connection = %id, command = %command, "Dispatched command");

        self.in_flight.insert(id, conn);
        self.stats.set_idle(self.pool.len());
    }

    /// Routes one engine notification.
    pub fn handle_event(&mut self, event: TransportEvent) {
        let id = event.id;
        match event.notification {
            Notification::Connected => self.on_connected(id),
            Notification::Data(data) => self.on_data(id, &data),
            Notification::Error(err) => self.on_error(id, err),
            Notification::Closed => self.on_closed(id),
        }
        self.stats.set_idle(self.pool.len());
    }

    fn on_connected(&mut self, id: ConnectionId) {
        match self.in_flight.get_mut(&id) {
            Some(conn) => conn.on_connected(&mut self.transport),
            None => trace!(connection = %id, "Connected event for unknown connection"),
        }
    }

    fn on_data(&mut self, id: ConnectionId, data: &[u8]) {
        self.stats.bytes_read(data.len());

        let outcome = match self.in_flight.get_mut(&id) {
            Some(conn) => conn.on_data(data),
            None => {
                if let Some(mut conn) = self.pool.remove(id) {
                    // Bytes from a connection with nothing outstanding.
                    conn.on_data(data);
                    self.discard(conn);
                } else {
                    trace!(connection = %id, bytes = data.len(), "Data for unknown connection");
                }
                return;
            }
        };

        match outcome {
            DataOutcome::AwaitingMore => {}
            DataOutcome::Completed => {
                self.stats.command_completed();
                if let Some(conn) = self.in_flight.remove(&id) {
                    self.release(conn);
                }
            }
            DataOutcome::Overrun => {
                self.stats.command_completed();
                if let Some(conn) = self.in_flight.remove(&id) {
                    self.discard(conn);
                }
            }
            DataOutcome::Corrupted => {
                self.stats.command_failed();
                if let Some(conn) = self.in_flight.remove(&id) {
                    self.discard(conn);
                }
            }
            DataOutcome::Unsolicited => {
                if let Some(conn) = self.in_flight.remove(&id) {
                    self.discard(conn);
                }
            }
        }
    }

    fn on_error(&mut self, id: ConnectionId, err: io::Error) {
        if let Some(mut conn) = self.in_flight.remove(&id) {
            warn!(connection = %id, error = %err, "Connection failed with a command outstanding");
            if conn.fail(ClientError::Io(err)) {
                self.stats.command_failed();
            }
            self.discard(conn);
        } else if let Some(mut conn) = self.pool.remove(id) {
            warn!(connection = %id, error = %err, "Idle connection failed");
            conn.fail(ClientError::Io(err));
            self.discard(conn);
        } else {
            warn!(connection = %id, error = %err, "Failed to connect to server");
        }
    }

    fn on_closed(&mut self, id: ConnectionId) {
        if let Some(mut conn) = self.in_flight.remove(&id) {
            warn!(connection = %id, "Connection closed with a command outstanding");
            if conn.fail(ClientError::ConnectionClosed) {
                self.stats.command_failed();
            }
            self.discard(conn);
        } else if let Some(mut conn) = self.pool.remove(id) {
            debug!(connection = %id, "Idle connection closed by server");
            conn.fail(ClientError::ConnectionClosed);
            self.discard(conn);
        } else {
            trace!(connection = %id, "Close event for unknown connection");
        }
    }

    fn release(&mut self, conn: Connection) {
        if let Some(rejected) = self.pool.release(conn) {
            self.discard(rejected);
        }
    }

    /// Drops a connection for good and closes its socket.
    fn discard(&mut self, conn: Connection) {
        debug!(connection = %conn.id(), state = %conn.state(), "Discarding connection");
        self.transport.close(conn.id());
        self.stats.connection_discarded();
    }

    /// Shared statistics.
    pub fn stats(&self) -> Arc<ClientStats> {
        Arc::clone(&self.stats)
    }

    /// Number of idle connections ready for reuse.
    pub fn idle_connections(&self) -> usize {
        self.pool.len()
    }

    /// Number of commands awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns true if `id` is idle in the pool.
    pub fn is_pooled(&self, id: ConnectionId) -> bool {
        self.pool.contains(id)
    }

    /// State of a live connection, whether idle or busy.
    pub fn connection_state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.in_flight
            .get(&id)
            .or_else(|| self.pool.get(id))
            .map(Connection::state)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fails every outstanding command and closes every socket.
    pub fn shutdown(&mut self) {
        let busy: Vec<Connection> = self.in_flight.drain().map(|(_, conn)| conn).collect();
        for mut conn in busy {
            if conn.fail(ClientError::Canceled) {
                self.stats.command_failed();
            }
            self.discard(conn);
        }
        for conn in self.pool.drain() {
            self.discard(conn);
        }
        self.stats.set_idle(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RespValue;
    use crate::transport::mock::MockTransport;
    use bytes::Bytes;

    fn client() -> Client<MockTransport> {
        Client::new(&ClientConfig::new("localhost", 6379), MockTransport::new())
    }

    /// The id the mock handed out most recently.
    fn last_id(client: &Client<MockTransport>) -> ConnectionId {
        ConnectionId::new(client.transport().connects.len() as u64)
    }

    #[test]
    fn test_set_round_trip_returns_connection_to_pool() {
        let mut client = client();
        let mut reply = client.invoke("SET", ["foo", "bar"]);
        let id = last_id(&client);

        assert_eq!(client.connection_state(id), Some(ConnectionState::Busy));
        assert!(!client.is_pooled(id));

        client.handle_event(TransportEvent::connected(id));
        assert_eq!(
            client.transport().sent_to(id),
            vec![Bytes::from_static(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")]
        );
        assert!(reply.try_take().is_none());

        client.handle_event(TransportEvent::data(id, &b"+OK\r\n"[..]));
        assert_eq!(reply.try_take().unwrap().unwrap(), RespValue::simple_string("OK"));
        assert!(client.is_pooled(id));
        assert_eq!(client.connection_state(id), Some(ConnectionState::Idle));
        assert_eq!(client.in_flight(), 0);
    }

    #[test]
    fn test_idle_connection_is_reused() {
        let mut client = client();
        let mut first = client.invoke("GET", ["a"]);
        let id = last_id(&client);
        client.handle_event(TransportEvent::connected(id));
        client.handle_event(TransportEvent::data(id, &b"$-1\r\n"[..]));
        assert_eq!(first.try_take().unwrap().unwrap(), RespValue::Null);

        let mut second = client.invoke("GET", ["b"]);
        assert_eq!(client.transport().connects.len(), 1);
        assert!(!client.is_pooled(id));
        // already connected: the request goes out immediately
        assert_eq!(client.transport().sent_to(id).len(), 2);

        client.handle_event(TransportEvent::data(id, &b"$1\r\n"[..]));
        client.handle_event(TransportEvent::data(id, &b"x\r\n"[..]));
        assert_eq!(second.try_take().unwrap().unwrap(), RespValue::bulk_string("x"));
    }

    #[test]
    fn test_concurrent_commands_use_separate_connections() {
        let mut client = client();
        let mut a = client.invoke("GET", ["a"]);
        let a_id = last_id(&client);
        let mut b = client.invoke("GET", ["b"]);
        let b_id = last_id(&client);
        assert_ne!(a_id, b_id);
        assert_eq!(client.in_flight(), 2);

        client.handle_event(TransportEvent::connected(b_id));
        client.handle_event(TransportEvent::connected(a_id));
        client.handle_event(TransportEvent::data(b_id, &b":2\r\n"[..]));
        assert!(a.try_take().is_none());
        assert_eq!(b.try_take().unwrap().unwrap(), RespValue::Integer(2));
        client.handle_event(TransportEvent::data(a_id, &b":1\r\n"[..]));
        assert_eq!(a.try_take().unwrap().unwrap(), RespValue::Integer(1));
        assert_eq!(client.idle_connections(), 2);
    }

    #[test]
    fn test_close_while_busy_fails_and_discards() {
        let mut client = client();
        let mut reply = client.invoke("GET", ["foo"]);
        let id = last_id(&client);
        client.handle_event(TransportEvent::connected(id));
        client.handle_event(TransportEvent::data(id, &b"$5\r\nhe"[..]));
        client.handle_event(TransportEvent::closed(id));

        assert!(matches!(reply.try_take(), Some(Err(ClientError::ConnectionClosed))));
        assert!(!client.is_pooled(id));
        assert_eq!(client.connection_state(id), None);
        assert_eq!(client.transport().closed, vec![id]);
    }

    #[test]
    fn test_connect_error_with_queued_command_fails_it() {
        let mut client = client();
        let mut reply = client.invoke("PING", Vec::<&str>::new());
        let id = last_id(&client);
        client.handle_event(TransportEvent::error(
            id,
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        ));

        assert!(matches!(reply.try_take(), Some(Err(ClientError::Io(_)))));
        assert!(client.transport().sent.is_empty());
        assert_eq!(client.connection_state(id), None);
    }

    #[test]
    fn test_protocol_error_discards_connection() {
        let mut client = client();
        let mut reply = client.invoke("GET", ["foo"]);
        let id = last_id(&client);
        client.handle_event(TransportEvent::connected(id));
        client.handle_event(TransportEvent::data(id, &b"&1\r\n"[..]));

        assert!(matches!(reply.try_take(), Some(Err(ClientError::Protocol(_)))));
        assert!(!client.is_pooled(id));
        assert_eq!(client.transport().closed, vec![id]);

        // the next command gets a fresh socket
        let _next = client.invoke("GET", ["foo"]);
        assert_eq!(client.transport().connects.len(), 2);
    }

    #[test]
    fn test_idle_close_evicts_without_callback() {
        let mut client = client();
        let mut reply = client.invoke("PING", Vec::<&str>::new());
        let id = last_id(&client);
        client.handle_event(TransportEvent::connected(id));
        client.handle_event(TransportEvent::data(id, &b"+PONG\r\n"[..]));
        assert!(reply.try_take().unwrap().is_ok());

        client.handle_event(TransportEvent::closed(id));
        assert!(!client.is_pooled(id));
        assert_eq!(client.idle_connections(), 0);
        assert_eq!(client.stats().commands_failed.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn test_unsolicited_data_on_idle_connection_discards_it() {
        let mut client = client();
        let _reply = client.invoke("PING", Vec::<&str>::new());
        let id = last_id(&client);
        client.handle_event(TransportEvent::connected(id));
        client.handle_event(TransportEvent::data(id, &b"+PONG\r\n"[..]));
        assert!(client.is_pooled(id));

        client.handle_event(TransportEvent::data(id, &b"+SURPRISE\r\n"[..]));
        assert!(!client.is_pooled(id));
        assert_eq!(client.transport().closed, vec![id]);
    }

    #[test]
    fn test_trailing_bytes_in_reply_delivery_discard_connection() {
        let mut client = client();
        let mut reply = client.invoke("SET", ["foo", "bar"]);
        let id = last_id(&client);
        client.handle_event(TransportEvent::connected(id));
        client.handle_event(TransportEvent::data(id, &b"+OK\r\n$5\r\nab"[..]));

        assert_eq!(reply.try_take().unwrap().unwrap(), RespValue::simple_string("OK"));
        assert!(!client.is_pooled(id));
        assert_eq!(client.transport().closed, vec![id]);

        // the next command does not inherit the stray bytes
        let mut next = client.invoke("GET", ["foo"]);
        let next_id = last_id(&client);
        assert_ne!(next_id, id);
        client.handle_event(TransportEvent::connected(next_id));
        client.handle_event(TransportEvent::data(next_id, &b"$3\r\nbar\r\n"[..]));
        assert_eq!(next.try_take().unwrap().unwrap(), RespValue::bulk_string("bar"));
    }

    #[test]
    fn test_pool_overflow_closes_extra_connections() {
        let mut config = ClientConfig::new("localhost", 6379);
        config.max_idle = 1;
        let mut client = Client::new(&config, MockTransport::new());

        let _a = client.invoke("GET", ["a"]);
        let _b = client.invoke("GET", ["b"]);
        for raw in 1..=2 {
            let id = ConnectionId::new(raw);
            client.handle_event(TransportEvent::connected(id));
            client.handle_event(TransportEvent::data(id, &b":0\r\n"[..]));
        }

        assert_eq!(client.idle_connections(), 1);
        assert_eq!(client.transport().closed, vec![ConnectionId::new(2)]);
    }

    #[test]
    fn test_shutdown_cancels_outstanding_commands() {
        let mut client = client();
        let mut reply = client.invoke("BLPOP", ["queue", "0"]);
        client.shutdown();
        assert!(matches!(reply.try_take(), Some(Err(ClientError::Canceled))));
        assert_eq!(client.in_flight(), 0);
    }

    /// Every event ordering reachable for two connections resolves each
    /// command exactly once and never pools a busy connection.
    #[test]
    fn test_event_sequences_keep_invariants() {
        #[derive(Clone, Copy, Debug)]
        enum Step {
            Connected,
            Partial,
            Finish,
            Error,
            Close,
        }
        let steps = [Step::Connected, Step::Partial, Step::Finish, Step::Error, Step::Close];

        for &s1 in &steps {
            for &s2 in &steps {
                for &s3 in &steps {
                    let mut client = client();
                    let mut replies = vec![client.invoke("GET", ["k"]), client.invoke("GET", ["k"])];
                    let ids = [ConnectionId::new(1), ConnectionId::new(2)];
                    let mut resolved = [0usize; 2];

                    for (n, step) in [s1, s2, s3].into_iter().enumerate() {
                        let id = ids[n % 2];
                        let event = match step {
                            Step::Connected => TransportEvent::connected(id),
                            Step::Partial => TransportEvent::data(id, &b"$3\r\nab"[..]),
                            Step::Finish => TransportEvent::data(id, &b"c\r\n"[..]),
                            Step::Error => TransportEvent::error(id, io::Error::other("boom")),
                            Step::Close => TransportEvent::closed(id),
                        };
                        client.handle_event(event);

                        for (i, id) in ids.iter().enumerate() {
                            if client.connection_state(*id) == Some(ConnectionState::Busy) {
                                assert!(!client.is_pooled(*id), "busy connection pooled: {:?}", [s1, s2, s3]);
                            }
                            if replies[i].try_take().is_some() {
                                resolved[i] += 1;
                            }
                        }
                    }

                    // Close whatever is left; every command must end resolved once.
                    for id in ids {
                        client.handle_event(TransportEvent::closed(id));
                    }
                    for (i, reply) in replies.iter_mut().enumerate() {
                        if reply.try_take().is_some() {
                            resolved[i] += 1;
                        }
                    }
                    assert_eq!(resolved, [1, 1], "sequence {:?}", [s1, s2, s3]);
                }
            }
        }
    }
}

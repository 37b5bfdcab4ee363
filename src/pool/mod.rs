//! Connection Pool
//!
//! The pool holds idle [`Connection`]s keyed by their [`ConnectionId`].
//! Membership means "available for the next command": a connection is taken
//! out before it is handed a command and only put back after its reply has
//! been delivered. Since the pool owns the idle connections by value, a busy
//! connection cannot be in it.
//!
//! Selection among idle connections is arbitrary (neither FIFO nor LRU).

use crate::connection::{Connection, ConnectionState};
use crate::transport::{ConnectionId, Transport};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Idle connections to one server.
#[derive(Debug)]
pub struct Pool {
    host: String,
    port: u16,
    max_idle: usize,
    idle: HashMap<ConnectionId, Connection>,
}

impl Pool {
    /// Creates an empty pool for `host:port` keeping at most `max_idle` idle
    /// connections.
    pub fn new(host: impl Into<String>, port: u16, max_idle: usize) -> Self {
        Self {
            host: host.into(),
            port,
            max_idle,
            idle: HashMap::with_capacity(max_idle),
        }
    }

    /// Takes an idle connection, or opens a new one if none is idle.
    ///
    /// A new connection starts connecting right away and is not recorded in
    /// the pool; the caller is about to issue a command on it.
    pub fn acquire<T: Transport>(&mut self, transport: &mut T) -> Connection {
        if let Some(id) = self.idle.keys().next().copied() {
            if let Some(conn) = self.idle.remove(&id) {
                trace!(connection = %id, idle = self.idle.len(), "Reusing idle connection");
                return conn;
            }
        }
        Connection::open(transport, &self.host, self.port)
    }

    /// Puts a connection whose command has completed back into the pool.
    ///
    /// Returns the connection back if the pool is already holding `max_idle`
    /// connections; the caller should close it.
    pub fn release(&mut self, conn: Connection) -> Option<Connection> {
        debug_assert_eq!(conn.state(), ConnectionState::Idle);
        if self.idle.len() >= self.max_idle {
            debug!(connection = %conn.id(), max_idle = self.max_idle, "Pool full, not keeping connection");
            return Some(conn);
        }
        trace!(connection = %conn.id(), "Connection returned to pool");
        self.idle.insert(conn.id(), conn);
        None
    }

    /// Removes a specific idle connection, e.g. because its socket closed.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.idle.remove(&id)
    }

    /// Looks at an idle connection without taking it.
    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.idle.get(&id)
    }

    /// Returns true if `id` is idle in the pool.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.idle.contains_key(&id)
    }

    /// Number of idle connections.
    pub fn len(&self) -> usize {
        self.idle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idle.is_empty()
    }

    /// Removes and returns every idle connection.
    pub fn drain(&mut self) -> Vec<Connection> {
        self.idle.drain().map(|(_, conn)| conn).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use crate::transport::mock::MockTransport;
    use tokio::sync::oneshot;

    /// Opens a connection and runs one command to completion so it is idle.
    fn idle_connection(pool: &mut Pool, transport: &mut MockTransport) -> Connection {
        let mut conn = pool.acquire(transport);
        conn.on_connected(transport);
        let (tx, _rx) = oneshot::channel();
        conn.command(transport, &Command::new("PING", Vec::<&str>::new()), tx);
        conn.on_data(b"+PONG\r\n");
        conn
    }

    #[test]
    fn test_acquire_on_empty_pool_opens_connection() {
        let mut transport = MockTransport::new();
        let mut pool = Pool::new("localhost", 6379, 4);

        let conn = pool.acquire(&mut transport);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(transport.connects.len(), 1);
        assert!(pool.is_empty());
        assert!(!pool.contains(conn.id()));
    }

    #[test]
    fn test_release_then_acquire_reuses() {
        let mut transport = MockTransport::new();
        let mut pool = Pool::new("localhost", 6379, 4);

        let conn = idle_connection(&mut pool, &mut transport);
        let id = conn.id();
        assert!(pool.release(conn).is_none());
        assert!(pool.contains(id));
        assert_eq!(pool.len(), 1);

        let again = pool.acquire(&mut transport);
        assert_eq!(again.id(), id);
        assert!(!pool.contains(id));
        assert_eq!(transport.connects.len(), 1);
    }

    #[test]
    fn test_release_into_full_pool_is_rejected() {
        let mut transport = MockTransport::new();
        let mut pool = Pool::new("localhost", 6379, 1);

        let first = idle_connection(&mut pool, &mut transport);
        let second = idle_connection(&mut pool, &mut transport);
        assert!(pool.release(first).is_none());

        let rejected = pool.release(second).expect("pool is full");
        assert_eq!(rejected.state(), ConnectionState::Idle);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_remove_and_drain() {
        let mut transport = MockTransport::new();
        let mut pool = Pool::new("localhost", 6379, 4);

        let a = idle_connection(&mut pool, &mut transport);
        let b = idle_connection(&mut pool, &mut transport);
        let a_id = a.id();
        pool.release(a);
        pool.release(b);

        assert_eq!(pool.remove(a_id).map(|c| c.id()), Some(a_id));
        assert!(pool.remove(a_id).is_none());
        assert_eq!(pool.drain().len(), 1);
        assert!(pool.is_empty());
    }
}

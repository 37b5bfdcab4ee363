//! Client Statistics
//!
//! Counters shared between the client core and anyone holding a
//! [`ClientHandle`](crate::client::ClientHandle). Updated with relaxed atomics;
//! values are advisory.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ClientStats {
    /// Total number of sockets opened
    pub connections_opened: AtomicU64,
    /// Connections thrown away (closed, failed, corrupted, or over the idle cap)
    pub connections_discarded: AtomicU64,
    /// Connections currently sitting in the pool
    pub idle_connections: AtomicU64,
    /// Commands handed to a connection
    pub commands_dispatched: AtomicU64,
    /// Commands that received a reply
    pub commands_completed: AtomicU64,
    /// Commands resolved with a failure
    pub commands_failed: AtomicU64,
    /// Total reply bytes received
    pub bytes_read: AtomicU64,
    /// Total request bytes sent or queued
    pub bytes_written: AtomicU64,
}

impl ClientStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_discarded(&self) {
        self.connections_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_idle(&self, idle: usize) {
        self.idle_connections.store(idle as u64, Ordering::Relaxed);
    }

    pub fn command_dispatched(&self, request_bytes: usize) {
        self.commands_dispatched.fetch_add(1, Ordering::Relaxed);
        self.bytes_written
            .fetch_add(request_bytes as u64, Ordering::Relaxed);
    }

    pub fn command_completed(&self) {
        self.commands_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_failed(&self) {
        self.commands_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Commands dispatched but not yet resolved.
    pub fn commands_in_flight(&self) -> u64 {
        let dispatched = self.commands_dispatched.load(Ordering::Relaxed);
        let resolved = self.commands_completed.load(Ordering::Relaxed)
            + self.commands_failed.load(Ordering::Relaxed);
        dispatched.saturating_sub(resolved)
    }
}

impl fmt::Display for ClientStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "idle connections: {}, opened: {}, discarded: {}, commands: {} ok / {} failed / {} in flight, bytes: {} in / {} out",
            self.idle_connections.load(Ordering::Relaxed),
            self.connections_opened.load(Ordering::Relaxed),
            self.connections_discarded.load(Ordering::Relaxed),
            self.commands_completed.load(Ordering::Relaxed),
            self.commands_failed.load(Ordering::Relaxed),
            self.commands_in_flight(),
            self.bytes_read.load(Ordering::Relaxed),
            self.bytes_written.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_tracks_resolution() {
        let stats = ClientStats::new();
        stats.command_dispatched(10);
        stats.command_dispatched(20);
        assert_eq!(stats.commands_in_flight(), 2);

        stats.command_completed();
        stats.command_failed();
        assert_eq!(stats.commands_in_flight(), 0);
        assert_eq!(stats.bytes_written.load(Ordering::Relaxed), 30);
    }

    #[test]
    fn test_display_summary() {
        let stats = ClientStats::new();
        stats.set_idle(3);
        assert!(stats.to_string().starts_with("idle connections: 3,"));
    }
}

//! Connection Module
//!
//! This module holds the per-socket state machine and the statistics the
//! client keeps about its sockets.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    I/O engine (Transport)                   │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ Connected / Data / Error / Closed
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Connection                            │
//! │                                                             │
//! │  ┌──────────────┐   ┌─────────────────┐   ┌─────────────┐   │
//! │  │ pending send │   │ ReplyAssembler  │──>│ reply owed  │   │
//! │  └──────────────┘   └─────────────────┘   └─────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A connection carries at most one outstanding command. That is what makes it
//! safe to pool: it is only ever handed out while idle.

pub mod handler;
pub mod stats;

// Re-export commonly used types
pub use handler::{Connection, ConnectionState, DataOutcome};
pub use stats::ClientStats;

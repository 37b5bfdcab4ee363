//! Client Module
//!
//! This is the caller-facing layer: build a request from a command name and
//! arguments, run it on a pooled connection, get exactly one outcome back.
//!
//! ## Architecture
//!
//! ```text
//! invoke(name, args)
//!       │
//!       ▼
//! ┌─────────────────┐  acquire   ┌──────────┐
//! │     Client      │──────────> │   Pool   │
//! │  (dispatcher)   │ <────────  └──────────┘
//! └────────┬────────┘  release
//!          │ command
//!          ▼
//! ┌─────────────────┐   send     ┌──────────────┐
//! │   Connection    │──────────> │  Transport   │
//! │                 │ <──────────│  (I/O engine)│
//! └────────┬────────┘  events    └──────────────┘
//!          │
//!          ▼
//!        Reply  (resolved exactly once)
//! ```
//!
//! - [`Client`] is the single-threaded core, generic over the engine.
//! - [`ClientHandle`] runs a `Client` over TCP on a background tokio task.

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod reply;

pub use dispatcher::Client;
pub use error::{ClientError, ClientResult};
pub use handle::ClientHandle;
pub use reply::{Reply, ReplySender};

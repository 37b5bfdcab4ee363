//! # respool - An Asynchronous, Pooled Redis Client
//!
//! respool speaks the Redis Serialization Protocol (RESP) from the client side.
//! It frames arbitrary commands, runs them over a pool of reusable TCP
//! connections, and decodes replies incrementally as bytes arrive. Each command
//! resolves exactly once, with a value or a failure.
//!
//! ## Features
//!
//! - **Command-Agnostic**: Any command name plus argument list is accepted
//! - **Connection Pooling**: Idle connections are reused; one command in flight per connection
//! - **Incremental Decoding**: Replies may arrive in any number of chunks
//! - **Engine-Agnostic Core**: The state machine only needs a [`Transport`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              respool                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ClientHandle │───>│   Client    │───>│    Pool     │                  │
//! │  │ (tokio task)│    │ (dispatcher)│    │ (idle conns)│                  │
//! │  └─────────────┘    └──────┬──────┘    └─────────────┘                  │
//! │                            │                                            │
//! │                            ▼                                            │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────┐     │
//! │  │   RESP      │<───│ Connection  │<──>│ Transport (TcpTransport) │     │
//! │  │   Codec     │    │ state mach. │    │   one task per socket    │     │
//! │  └─────────────┘    └─────────────┘    └──────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use respool::{ClientConfig, ClientHandle, RespValue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), respool::ClientError> {
//!     let client = ClientHandle::spawn(ClientConfig::new("127.0.0.1", 6379));
//!
//!     client.invoke("SET", ["user:101", "Ariz"]).await?;
//!     match client.invoke("GET", ["user:101"]).await? {
//!         RespValue::BulkString(name) => println!("{:?}", name),
//!         RespValue::Null => println!("(nil)"),
//!         other => println!("unexpected reply: {}", other),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP values, request encoding, reply parsing and assembly
//! - [`transport`]: The I/O engine contract and the tokio TCP engine
//! - [`connection`]: Per-socket state machine and client statistics
//! - [`pool`]: Idle connections available for reuse
//! - [`client`]: The dispatcher facade and its background driver
//!
//! ## Failure Model
//!
//! A failed command always yields a single `Err` on its [`Reply`]: protocol
//! errors, premature closes and connect failures are all reported that way,
//! and the affected connection is discarded rather than pooled. A Redis error
//! reply (`-ERR ...`) is a successful decode carrying [`RespValue::Error`].

pub mod client;
pub mod config;
pub mod connection;
pub mod pool;
pub mod protocol;
pub mod transport;

// Re-export commonly used types for convenience
pub use client::{Client, ClientError, ClientHandle, ClientResult, Reply};
pub use config::ClientConfig;
pub use connection::{ClientStats, ConnectionState};
pub use protocol::{Command, ParseError, RespValue};
pub use transport::{ConnectionId, Transport, TransportEvent};

/// The default Redis port
pub const DEFAULT_PORT: u16 = 6379;

/// The default host to connect to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of respool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! RESP Protocol Implementation
//!
//! This module is the codec half of the client: it frames outgoing requests and
//! decodes incoming replies. It performs no I/O.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum returned to callers
//! - `command`: Command requests and their wire encoding
//! - `parser`: Resumable decoder for a single reply
//! - `assembler`: Buffers replies that arrive in several chunks
//!
//! ## Example
//!
//! ```
//! use respool::protocol::{Command, ReplyAssembler, RespValue};
//!
//! let request = Command::new("GET", ["name"]).encode();
//! assert_eq!(&request[..], b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
//!
//! let mut assembler = ReplyAssembler::new();
//! assert_eq!(assembler.feed(b"$4\r\nAr").unwrap(), None);
//! assert_eq!(assembler.feed(b"iz\r\n").unwrap(), Some(RespValue::bulk_string("Ariz")));
//! ```

pub mod assembler;
pub mod command;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use assembler::ReplyAssembler;
pub use command::Command;
pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;

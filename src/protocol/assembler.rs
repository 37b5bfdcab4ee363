//! Reply Assembler
//!
//! TCP delivers replies in arbitrary chunks. The assembler accumulates those
//! chunks for one outstanding command and hands back exactly one
//! [`RespValue`] once the whole reply is in.
//!
//! ```text
//!   "$5\r\nhel"  ──> feed ──> None        (4 bytes still needed)
//!   "lo\r\n"     ──> feed ──> Some("hello")
//! ```
//!
//! ## Resumption
//!
//! Every complete token is decoded as soon as it arrives and dropped from the
//! buffer; arrays still waiting for elements live on the parser's
//! continuation stack. Only the unfinished token at the end of the buffer is
//! looked at again on the next delivery. When that token is a bulk string
//! short by a known number of bytes, the assembler records that count and
//! skips parsing until at least that many bytes have arrived.
//!
//! Bytes that follow a completed reply stay buffered. A client sends one
//! command per connection at a time, so the caller treats them as a stream
//! out of step (see [`ReplyAssembler::buffered`]).

use crate::protocol::parser::{ParseResult, RespParser};
use crate::protocol::types::RespValue;
use bytes::{Buf, BytesMut};
use tracing::trace;

/// Initial receive buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Buffers partial replies and decodes them once complete.
#[derive(Debug)]
pub struct ReplyAssembler {
    /// Received bytes not decoded yet
    buffer: BytesMut,

    parser: RespParser,

    /// Bytes still needed before another parse attempt can succeed
    needed: usize,
}

impl Default for ReplyAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            needed: 0,
        }
    }

    /// Feeds newly received bytes.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))` - The reply is complete; anything received after it
    ///   stays buffered
    /// - `Ok(None)` - The reply is not complete yet
    /// - `Err(e)` - The bytes are not valid RESP; the assembler is reset
    pub fn feed(&mut self, data: &[u8]) -> ParseResult<Option<RespValue>> {
        self.buffer.extend_from_slice(data);

        if self.needed > 0 {
            if data.len() < self.needed {
                self.needed -= data.len();
                trace!(
                    buffered = self.buffer.len(),
                    needed = self.needed,
                    "Reply still incomplete"
                );
                return Ok(None);
            }
            self.needed = 0;
        }

        match self.parser.resume(&self.buffer) {
            Ok((value, consumed)) => {
                self.buffer.advance(consumed);
                if value.is_none() {
                    self.needed = self.parser.missing().unwrap_or(0);
                    trace!(
                        buffered = self.buffer.len(),
                        open_arrays = self.parser.open_arrays(),
                        needed = self.needed,
                        "Incomplete reply, need more data"
                    );
                }
                Ok(value)
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Number of bytes a short bulk string is still waiting for.
    ///
    /// Zero unless a bulk string arrived split across deliveries.
    pub fn bytes_still_needed(&self) -> usize {
        self.needed
    }

    /// Number of received bytes not decoded yet.
    ///
    /// While a reply is incomplete this is at most the unfinished token at
    /// its end. After `feed` returns a value it counts the bytes that
    /// followed that reply.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true while part of a reply has been received.
    pub fn is_partial(&self) -> bool {
        !self.buffer.is_empty() || self.parser.open_arrays() > 0
    }

    /// Drops any partial reply.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.parser.reset();
        self.needed = 0;
    }
}

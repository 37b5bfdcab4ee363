//! Resumable RESP Reply Parser
//!
//! This module decodes one RESP value at a time from a stream of bytes that may
//! arrive in pieces.
//!
//! ## How the Parser Works
//!
//! The parser reads a reply as a sequence of tokens: complete scalars (simple
//! strings, errors, integers, bulk strings, nulls) and array headers. Each
//! array header opens a frame on a continuation stack that collects elements
//! until its count is met. A token is only ever decoded once, so a reply that
//! arrives in many chunks costs the same as one that arrives whole.
//!
//! There are two entry points:
//! - [`RespParser::parse`] decodes from the front of a complete buffer and never
//!   keeps state between calls
//! - [`RespParser::resume`] consumes what it can and keeps open arrays for the
//!   next call, which is what the
//!   [`ReplyAssembler`](crate::protocol::ReplyAssembler) uses
//!
//! When a reply is incomplete because a bulk string is short, the parser also
//! remembers how many more bytes it needs (see [`RespParser::missing`]).

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum length of a header or status line before its CRLF shows up.
pub const MAX_LINE_SIZE: usize = 64 * 1024;

/// Maximum array nesting depth (prevent unbounded stack growth)
pub const MAX_NESTING_DEPTH: usize = 32;

/// One decoded step of a reply.
enum Token {
    /// A complete value, including null and empty arrays
    Value(RespValue),
    /// The header of an array with this many elements still to come
    ArrayStart(usize),
}

/// An array whose header has been read but whose elements are still arriving.
#[derive(Debug)]
struct OpenArray {
    remaining: usize,
    elements: Vec<RespValue>,
}

/// A resumable RESP reply parser.
///
/// # Example
///
/// ```
/// use respool::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// assert!(parser.parse(b"$5\r\nhel").unwrap().is_none());
/// assert_eq!(parser.missing(), Some(4));
///
/// let (value, consumed) = parser.parse(b"$5\r\nhello\r\n").unwrap().unwrap();
/// assert_eq!(value, RespValue::bulk_string("hello"));
/// assert_eq!(consumed, 11);
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Arrays opened by `resume` and not complete yet, outermost first
    stack: Vec<OpenArray>,

    /// Bytes still missing from a short bulk string, from the last call
    missing: Option<usize>,
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            missing: None,
        }
    }

    /// Attempts to parse one complete RESP value from the front of `buf`.
    ///
    /// Nothing is kept between calls: an incomplete value has to be parsed
    /// again from the start once more bytes are in.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((value, consumed)))` - Successfully parsed a value
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - Parse error
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.reset();
        let result = self.resume(buf);
        self.stack.clear();
        match result? {
            (Some(value), consumed) => Ok(Some((value, consumed))),
            (None, _) => Ok(None),
        }
    }

    /// Continues decoding the current reply with `buf`.
    ///
    /// `buf` must start right after the bytes consumed by the previous call.
    /// Returns the completed value, if any, and how many bytes of `buf` were
    /// consumed. Consumed bytes are never needed again; arrays still open are
    /// kept in the parser. Bytes after a completed value are left unconsumed.
    ///
    /// After an error the parser state is meaningless until [`reset`](Self::reset).
    pub fn resume(&mut self, buf: &[u8]) -> ParseResult<(Option<RespValue>, usize)> {
        self.missing = None;
        let mut consumed = 0;

        loop {
            let (token, used) = match self.next_token(&buf[consumed..])? {
                Some(step) => step,
                None => return Ok((None, consumed)),
            };
            consumed += used;

            let mut value = match token {
                Token::Value(value) => value,
                Token::ArrayStart(count) => {
                    if self.stack.len() > MAX_NESTING_DEPTH {
                        return Err(ParseError::ProtocolError(format!(
                            "maximum nesting depth exceeded: {}",
                            MAX_NESTING_DEPTH
                        )));
                    }
                    // Every element takes at least 3 bytes; don't trust huge counts for capacity.
                    let capacity = count.min((buf.len() - consumed) / 3 + 1);
                    self.stack.push(OpenArray {
                        remaining: count,
                        elements: Vec::with_capacity(capacity),
                    });
                    continue;
                }
            };

            // Close every array this value completes.
            loop {
                let Some(mut array) = self.stack.pop() else {
                    return Ok((Some(value), consumed));
                };
                array.elements.push(value);
                array.remaining -= 1;
                if array.remaining > 0 {
                    self.stack.push(array);
                    break;
                }
                value = RespValue::Array(array.elements);
            }
        }
    }

    /// Drops any partially decoded reply.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.missing = None;
    }

    /// Number of arrays opened by `resume` that are still waiting for elements.
    pub fn open_arrays(&self) -> usize {
        self.stack.len()
    }

    /// After an incomplete result: the number of additional bytes (payload
    /// plus trailing CRLF) a short bulk string is waiting for.
    ///
    /// `None` means the parser stopped inside a line and cannot tell yet.
    pub fn missing(&self) -> Option<usize> {
        self.missing
    }

    fn next_token(&mut self, buf: &[u8]) -> ParseResult<Option<(Token, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        match buf[0] {
            prefix::SIMPLE_STRING => parse_simple_string(buf),
            prefix::ERROR => parse_error(buf),
            prefix::INTEGER => parse_integer(buf),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => parse_array_header(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(Token, usize)>> {
        debug_assert!(buf[0] == prefix::BULK_STRING);

        let line = match read_line(buf)? {
            Some(line) => line,
            None => return Ok(None),
        };
        let length = parse_i64(line)?;

        if length == -1 {
            let consumed = 1 + line.len() + 2; // $-1\r\n
            return Ok(Some((Token::Value(RespValue::Null), consumed)));
        }

        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;

        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let data_start = 1 + line.len() + 2; // prefix + length + CRLF
        let total_needed = data_start + length + 2; // data + CRLF

        if buf.len() < total_needed {
            self.missing = Some(total_needed - buf.len());
            return Ok(None);
        }

        if &buf[data_start + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);

        Ok(Some((Token::Value(RespValue::BulkString(data)), total_needed)))
    }
}

/// Parses a simple string: `+<string>\r\n`
fn parse_simple_string(buf: &[u8]) -> ParseResult<Option<(Token, usize)>> {
    debug_assert!(buf[0] == prefix::SIMPLE_STRING);

    match read_line(buf)? {
        Some(line) => {
            let s = std::str::from_utf8(line).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            // +1 for prefix, +2 for CRLF
            let consumed = 1 + line.len() + 2;
            Ok(Some((Token::Value(RespValue::SimpleString(s.to_string())), consumed)))
        }
        None => Ok(None),
    }
}

/// Parses an error: `-<error message>\r\n`
fn parse_error(buf: &[u8]) -> ParseResult<Option<(Token, usize)>> {
    debug_assert!(buf[0] == prefix::ERROR);

    match read_line(buf)? {
        Some(line) => {
            let s = std::str::from_utf8(line).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            let consumed = 1 + line.len() + 2;
            Ok(Some((Token::Value(RespValue::Error(s.to_string())), consumed)))
        }
        None => Ok(None),
    }
}

/// Parses an integer: `:<integer>\r\n`
fn parse_integer(buf: &[u8]) -> ParseResult<Option<(Token, usize)>> {
    debug_assert!(buf[0] == prefix::INTEGER);

    match read_line(buf)? {
        Some(line) => {
            let n = parse_i64(line)?;
            let consumed = 1 + line.len() + 2;
            Ok(Some((Token::Value(RespValue::Integer(n)), consumed)))
        }
        None => Ok(None),
    }
}

/// Parses an array header: `*<count>\r\n`
///
/// Null and empty arrays are complete values on their own.
fn parse_array_header(buf: &[u8]) -> ParseResult<Option<(Token, usize)>> {
    debug_assert!(buf[0] == prefix::ARRAY);

    let line = match read_line(buf)? {
        Some(line) => line,
        None => return Ok(None),
    };
    let count = parse_i64(line)?;
    let consumed = 1 + line.len() + 2;

    let token = match count {
        -1 => Token::Value(RespValue::Null),
        0 => Token::Value(RespValue::Array(Vec::new())),
        n if n < 0 => return Err(ParseError::InvalidArrayLength(n)),
        n => Token::ArrayStart(n as usize),
    };

    Ok(Some((token, consumed)))
}

/// Returns the payload of the line starting after the prefix byte, without CRLF.
///
/// `Ok(None)` means no CRLF yet.
fn read_line(buf: &[u8]) -> ParseResult<Option<&[u8]>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => Ok(Some(&buf[1..1 + pos])),
        None if buf.len() > MAX_LINE_SIZE => Err(ParseError::MessageTooLarge {
            size: buf.len(),
            max: MAX_LINE_SIZE,
        }),
        None => Ok(None),
    }
}

fn parse_i64(line: &[u8]) -> ParseResult<i64> {
    let s = std::str::from_utf8(line).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    s.parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Helper function to parse a single RESP value from bytes.
///
/// This is a convenience function for simple use cases.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}

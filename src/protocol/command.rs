//! Command Requests
//!
//! Every request a client sends is a RESP array of bulk strings: the command
//! name followed by its arguments.
//!
//! ```text
//! SET foo bar  ──>  *3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
//! ```
//!
//! The client is command-agnostic: any name and argument list is accepted
//! and framed the same way.

use crate::protocol::types::{prefix, CRLF};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// An immutable, ordered sequence of byte strings (name, then arguments).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    parts: Vec<Bytes>,
}

impl Command {
    /// Builds a request from a command name and its arguments.
    ///
    /// # Example
    /// ```
    /// use respool::protocol::Command;
    /// let cmd = Command::new("SET", ["foo", "bar"]);
    /// assert_eq!(&cmd.encode()[..], b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
    /// ```
    pub fn new<N, I, A>(name: N, args: I) -> Self
    where
        N: AsRef<[u8]>,
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let args = args.into_iter();
        let mut parts = Vec::with_capacity(1 + args.size_hint().0);
        parts.push(Bytes::copy_from_slice(name.as_ref()));
        parts.extend(args.map(|arg| Bytes::copy_from_slice(arg.as_ref())));
        Self { parts }
    }

    /// Builds a request from already-owned parts.
    ///
    /// Returns `None` when `parts` is empty, since a request needs a name.
    pub fn from_parts(parts: Vec<Bytes>) -> Option<Self> {
        if parts.is_empty() {
            None
        } else {
            Some(Self { parts })
        }
    }

    /// The command name.
    pub fn name(&self) -> &[u8] {
        &self.parts[0]
    }

    /// The arguments following the name.
    pub fn args(&self) -> &[Bytes] {
        &self.parts[1..]
    }

    /// All parts, name first.
    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    /// Size of the encoded request in bytes.
    pub fn encoded_len(&self) -> usize {
        let header = 1 + decimal_len(self.parts.len()) + 2;
        self.parts.iter().fold(header, |acc, part| {
            acc + 1 + decimal_len(part.len()) + 2 + part.len() + 2
        })
    }

    /// Encodes the request into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encodes the request into an existing buffer.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u8(prefix::ARRAY);
        buf.put_slice(self.parts.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        for part in &self.parts {
            buf.put_u8(prefix::BULK_STRING);
            buf.put_slice(part.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            buf.put_slice(part);
            buf.put_slice(CRLF);
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.name()))?;
        if !self.args().is_empty() {
            write!(f, " ({} args)", self.args().len())?;
        }
        Ok(())
    }
}

#[inline]
fn decimal_len(mut n: usize) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parser::parse_message;
    use crate::protocol::types::RespValue;

    #[test]
    fn test_encode_set() {
        let cmd = Command::new("SET", ["foo", "bar"]);
        assert_eq!(
            &cmd.encode()[..],
            b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n"
        );
    }

    #[test]
    fn test_encode_no_args() {
        let cmd = Command::new("PING", Vec::<&[u8]>::new());
        assert_eq!(&cmd.encode()[..], b"*1\r\n$4\r\nPING\r\n");
        assert!(cmd.args().is_empty());
    }

    #[test]
    fn test_encoded_len_matches_output() {
        let long = vec![b'x'; 1234];
        let cmd = Command::new("SET", [&b"key"[..], &long[..], b""]);
        assert_eq!(cmd.encoded_len(), cmd.encode().len());
    }

    #[test]
    fn test_encoded_request_decodes_to_its_parts() {
        let cmd = Command::new("HSET", [&b"h"[..], b"field\r\nwith crlf", b"\x00\xff", b""]);
        let encoded = cmd.encode();
        let (value, consumed) = parse_message(&encoded).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());

        let expected: Vec<RespValue> = cmd
            .parts()
            .iter()
            .cloned()
            .map(RespValue::BulkString)
            .collect();
        assert_eq!(value, RespValue::Array(expected));
    }

    #[test]
    fn test_from_parts_requires_name() {
        assert!(Command::from_parts(Vec::new()).is_none());
        let cmd = Command::from_parts(vec![Bytes::from("GET"), Bytes::from("k")]).unwrap();
        assert_eq!(cmd.name(), b"GET");
        assert_eq!(cmd.to_string(), "GET (1 args)");
    }
}

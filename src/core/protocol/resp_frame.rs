// src/core/protocol/resp_frame.rs

//! Implements the RESP frame structure and the corresponding `Encoder` and
//! `Decoder` for network communication.

use crate::core::ZirconError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Protocol-level limits to prevent denial-of-service attacks.
const MAX_FRAME_ELEMENTS: usize = 1_024 * 1_024;
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;
const MAX_RECURSION_DEPTH: usize = 64;

/// An enum representing a single frame in the RESP protocol.
/// This is the low-level representation of data exchanged with clients and peers.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// A convenience method to encode a frame into a `Vec<u8>`.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, ZirconError> {
        let mut buf = BytesMut::new();
        RespFrameCodec.encode(self.clone(), &mut buf)?;
        Ok(buf.to_vec())
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `RespFrame`s.
#[derive(Debug)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = ZirconError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            RespFrame::SimpleString(s) => {
                dst.extend_from_slice(b"+");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Error(s) => {
                dst.extend_from_slice(b"-");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Integer(i) => {
                dst.extend_from_slice(b":");
                dst.extend_from_slice(i.to_string().as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::BulkString(b) => {
                dst.extend_from_slice(b"$");
                dst.extend_from_slice(b.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => {
                dst.extend_from_slice(b"$-1\r\n");
            }
            RespFrame::NullArray => {
                dst.extend_from_slice(b"*-1\r\n");
            }
            RespFrame::Array(arr) => {
                dst.extend_from_slice(b"*");
                dst.extend_from_slice(arr.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                for frame in arr {
                    self.encode(frame, dst)?;
                }
            }
        }
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = ZirconError;

    /// Decodes a `RespFrame` from a `BytesMut` buffer, advancing the buffer only
    /// once a complete frame has been parsed.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut bytes = &src[..];
        match self.decode_recursive(&mut bytes, 0) {
            Ok(frame) => {
                let consumed = src.len() - bytes.len();
                src.advance(consumed);
                Ok(Some(frame))
            }
            // `IncompleteData` signals that more data is needed; any other
            // error is a genuine protocol violation and is propagated.
            Err(ZirconError::IncompleteData) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl RespFrameCodec {
    /// A recursive helper to decode a frame from a slice that is advanced as it
    /// is parsed. `depth` bounds recursion to prevent stack overflow.
    fn decode_recursive(&self, bytes: &mut &[u8], depth: usize) -> Result<RespFrame, ZirconError> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(ZirconError::InvalidRequest(
                "RESP recursion depth limit exceeded".to_string(),
            ));
        }

        let Some(&prefix) = bytes.first() else {
            return Err(ZirconError::IncompleteData);
        };
        *bytes = &bytes[1..];

        match prefix {
            b'+' => Ok(RespFrame::SimpleString(lossy_line(self.take_line(bytes)?))),
            b'-' => Ok(RespFrame::Error(lossy_line(self.take_line(bytes)?))),
            b':' => {
                let line = self.take_line(bytes)?;
                let i = parse_decimal::<i64>(line)?;
                Ok(RespFrame::Integer(i))
            }
            b'$' => self.parse_bulk_string(bytes),
            b'*' => self.parse_array(bytes, depth),
            _ => Err(ZirconError::SyntaxError),
        }
    }

    /// Consumes one CRLF-terminated line and returns it without the terminator.
    fn take_line<'a>(&self, bytes: &mut &'a [u8]) -> Result<&'a [u8], ZirconError> {
        let pos = bytes
            .windows(CRLF_LEN)
            .position(|w| w == CRLF)
            .ok_or(ZirconError::IncompleteData)?;
        let line = &bytes[..pos];
        *bytes = &bytes[pos + CRLF_LEN..];
        Ok(line)
    }

    /// Parses a Bulk String (e.g., `$5\r\nhello\r\n`).
    fn parse_bulk_string(&self, bytes: &mut &[u8]) -> Result<RespFrame, ZirconError> {
        let len: isize = parse_decimal(self.take_line(bytes)?)?;
        if len == -1 {
            return Ok(RespFrame::Null);
        }

        let len = usize::try_from(len).map_err(|_| ZirconError::SyntaxError)?;
        if len > MAX_BULK_STRING_SIZE {
            return Err(ZirconError::SyntaxError);
        }
        if bytes.len() < len + CRLF_LEN {
            return Err(ZirconError::IncompleteData);
        }
        if &bytes[len..len + CRLF_LEN] != CRLF {
            return Err(ZirconError::SyntaxError);
        }

        let data = Bytes::copy_from_slice(&bytes[..len]);
        *bytes = &bytes[len + CRLF_LEN..];
        Ok(RespFrame::BulkString(data))
    }

    /// Parses an Array (e.g., `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`).
    fn parse_array(&self, bytes: &mut &[u8], depth: usize) -> Result<RespFrame, ZirconError> {
        let len: isize = parse_decimal(self.take_line(bytes)?)?;
        if len == -1 {
            return Ok(RespFrame::NullArray);
        }

        let len = usize::try_from(len).map_err(|_| ZirconError::SyntaxError)?;
        if len > MAX_FRAME_ELEMENTS {
            return Err(ZirconError::SyntaxError);
        }

        let mut frames = Vec::with_capacity(len);
        for _ in 0..len {
            frames.push(self.decode_recursive(bytes, depth + 1)?);
        }
        Ok(RespFrame::Array(frames))
    }
}

fn lossy_line(line: &[u8]) -> String {
    String::from_utf8_lossy(line).to_string()
}

fn parse_decimal<T: std::str::FromStr>(line: &[u8]) -> Result<T, ZirconError> {
    std::str::from_utf8(line)
        .map_err(|_| ZirconError::SyntaxError)?
        .parse::<T>()
        .map_err(|_| ZirconError::SyntaxError)
}

// src/core/commands/helpers.rs

//! Helper functions for parsing command arguments from `RespFrame`s.
//! These reduce boilerplate and keep error handling consistent across commands.

use crate::core::ZirconError;
use crate::core::protocol::RespFrame;
use bytes::Bytes;

/// Extracts a `String` from a `RespFrame::BulkString`.
/// Returns a `WrongType` error if the frame is not a BulkString or not valid UTF-8.
pub fn extract_string(frame: &RespFrame) -> Result<String, ZirconError> {
    if let RespFrame::BulkString(bs) = frame {
        String::from_utf8(bs.to_vec()).map_err(|_| ZirconError::WrongType)
    } else {
        Err(ZirconError::WrongType)
    }
}

/// Extracts `Bytes` from a `RespFrame::BulkString`.
pub fn extract_bytes(frame: &RespFrame) -> Result<Bytes, ZirconError> {
    match frame {
        RespFrame::BulkString(bs) => Ok(bs.clone()),
        _ => Err(ZirconError::WrongType),
    }
}

/// Validates that the number of arguments matches an exact expected count.
pub fn validate_arg_count(
    args: &[RespFrame],
    expected: usize,
    cmd: &str,
) -> Result<(), ZirconError> {
    if args.len() != expected {
        Err(ZirconError::WrongArgumentCount(cmd.to_string()))
    } else {
        Ok(())
    }
}

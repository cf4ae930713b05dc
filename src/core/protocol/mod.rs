// src/core/protocol/mod.rs

//! The RESP (REdis Serialization Protocol) implementation used on the client port.

mod resp_frame;
mod resp_value;

pub use resp_frame::{RespFrame, RespFrameCodec};
pub use resp_value::RespValue;

// src/core/cluster/client.rs

//! An internal RESP client used by the slot migrator to drive the destination
//! node of a migration: phase handshakes via `CLUSTER SETSLOT` and per-key
//! transfer via `RESTORE`.

use crate::core::protocol::{RespFrame, RespFrameCodec};
use anyhow::{Result, anyhow};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

// Timeout constants for robust network operations.
const CLIENT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// An internal client for sending commands to other nodes in the cluster.
pub struct ClusterClient {
    stream: TcpStream,
    codec: RespFrameCodec,
}

impl ClusterClient {
    /// Creates a TCP connection to the target node's address with a timeout.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream =
            tokio::time::timeout(CLIENT_CONNECT_TIMEOUT, TcpStream::connect(addr)).await??;
        Ok(Self {
            stream,
            codec: RespFrameCodec,
        })
    }

    /// Sends a single command frame and receives a single reply frame.
    async fn send_and_receive(&mut self, frame: RespFrame) -> Result<RespFrame> {
        let mut write_buf = BytesMut::new();
        self.codec.encode(frame, &mut write_buf)?;

        let write_fut = self.stream.write_all(&write_buf);
        tokio::time::timeout(CLIENT_WRITE_TIMEOUT, write_fut)
            .await
            .map_err(|_| anyhow!("Write timeout while sending command"))??;

        let mut read_buf = BytesMut::with_capacity(4096);
        loop {
            let read_fut = self.stream.read_buf(&mut read_buf);
            match tokio::time::timeout(CLIENT_READ_TIMEOUT, read_fut).await {
                Ok(Ok(0)) => return Err(anyhow!("Connection closed by peer")),
                Ok(Ok(_)) => {
                    if let Some(reply) = self.codec.decode(&mut read_buf)? {
                        return Ok(reply);
                    }
                    // Partial frame; keep reading.
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(anyhow!("Read timeout while waiting for response")),
            }
        }
    }

    fn command_frame(parts: Vec<Bytes>) -> RespFrame {
        RespFrame::Array(parts.into_iter().map(RespFrame::BulkString).collect())
    }

    /// Sends a `CLUSTER <args...>` command and expects an "OK" reply.
    pub async fn cluster_command(&mut self, args: Vec<Bytes>) -> Result<()> {
        let mut parts = vec![Bytes::from_static(b"CLUSTER")];
        parts.extend(args);

        match self.send_and_receive(Self::command_frame(parts)).await? {
            RespFrame::SimpleString(s) if s.eq_ignore_ascii_case("OK") => Ok(()),
            other => Err(anyhow!("Unexpected response to CLUSTER command: {other:?}")),
        }
    }

    /// Marks a slot as importing on the destination node.
    pub async fn setslot_importing(&mut self, slot: u16, source_id: &str) -> Result<()> {
        self.cluster_command(vec![
            "SETSLOT".into(),
            slot.to_string().into(),
            "IMPORTING".into(),
            source_id.to_string().into(),
        ])
        .await
    }

    /// Tells the destination the final owner of a slot after a migration.
    pub async fn setslot_node(&mut self, slot: u16, owner_id: &str) -> Result<()> {
        self.cluster_command(vec![
            "SETSLOT".into(),
            slot.to_string().into(),
            "NODE".into(),
            owner_id.to_string().into(),
        ])
        .await
    }

    /// Applies one serialized key on the destination via `RESTORE ... REPLACE`.
    ///
    /// The destination is importing the slot, so each RESTORE is preceded by
    /// an `ASKING` grant; without it the destination would answer MOVED.
    /// REPLACE makes the apply idempotent by key, which is what lets the
    /// transfer loop safely re-send a key after an ambiguous failure.
    pub async fn restore_key(&mut self, key: Bytes, payload: Bytes, ttl_ms: u64) -> Result<()> {
        let asking = Self::command_frame(vec![Bytes::from_static(b"ASKING")]);
        match self.send_and_receive(asking).await? {
            RespFrame::SimpleString(s) if s.eq_ignore_ascii_case("OK") => {}
            other => return Err(anyhow!("Unexpected response to ASKING: {other:?}")),
        }

        let frame = Self::command_frame(vec![
            "RESTORE".into(),
            key,
            ttl_ms.to_string().into(),
            payload,
            "REPLACE".into(),
        ]);

        match self.send_and_receive(frame).await? {
            RespFrame::SimpleString(s) if s.eq_ignore_ascii_case("OK") => Ok(()),
            RespFrame::Error(e) => Err(anyhow!("RESTORE rejected by destination: {e}")),
            other => Err(anyhow!("Unexpected response to RESTORE: {other:?}")),
        }
    }
}

// src/core/commands/generic/migrate.rs

use crate::core::commands::command_trait::{
    ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};
use crate::core::commands::helpers::{extract_bytes, extract_string};
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

const DEFAULT_MIGRATE_TIMEOUT_MS: u64 = 5000;

/// `MIGRATE host port key destdb [COPY] [REPLACE] [AUTH password] [TIMEOUT ms]`
///
/// Moves a single key to another node by sending it a `RESTORE` command, then
/// (unless COPY) deleting the local copy. Replies `OK`, or `NOKEY` when the
/// key does not exist locally.
#[derive(Debug, Clone, Default)]
pub struct Migrate {
    pub host: String,
    pub port: u16,
    pub key: Bytes,
    pub db_index: usize,
    pub timeout_ms: u64,
    pub copy: bool,
    pub replace: bool,
    pub auth: Option<String>,
}

impl ParseCommand for Migrate {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        if args.len() < 4 {
            return Err(ZirconError::WrongArgumentCount("MIGRATE".to_string()));
        }
        let mut cmd = Migrate {
            host: extract_string(&args[0])?,
            port: extract_string(&args[1])?.parse()?,
            key: extract_bytes(&args[2])?,
            db_index: extract_string(&args[3])?.parse()?,
            timeout_ms: DEFAULT_MIGRATE_TIMEOUT_MS,
            ..Default::default()
        };

        let mut i = 4;
        while i < args.len() {
            let option = extract_string(&args[i])?.to_ascii_lowercase();
            match option.as_str() {
                "copy" => {
                    cmd.copy = true;
                    i += 1;
                }
                "replace" => {
                    cmd.replace = true;
                    i += 1;
                }
                "auth" => {
                    let password =
                        extract_string(args.get(i + 1).ok_or(ZirconError::SyntaxError)?)?;
                    cmd.auth = Some(password);
                    i += 2;
                }
                "timeout" => {
                    cmd.timeout_ms =
                        extract_string(args.get(i + 1).ok_or(ZirconError::SyntaxError)?)?
                            .parse()?;
                    i += 2;
                }
                _ => return Err(ZirconError::SyntaxError),
            }
        }
        Ok(cmd)
    }
}

#[async_trait]
impl ExecutableCommand for Migrate {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        let Some((payload, ttl_ms)) = ctx.state.store.dump(&self.key).await else {
            return Ok((
                RespValue::SimpleString("NOKEY".into()),
                WriteOutcome::DidNotWrite,
            ));
        };

        let target_addr = format!("{}:{}", self.host, self.port);
        let timeout = Duration::from_millis(self.timeout_ms);
        let socket = tokio::time::timeout(timeout, TcpStream::connect(&target_addr))
            .await
            .map_err(|_| ZirconError::MigrationError("IOERR connection timed out".into()))?
            .map_err(|e| ZirconError::MigrationError(format!("IOERR failed to connect: {e}")))?;
        let mut framed = Framed::new(socket, RespFrameCodec);

        if let Some(password) = &self.auth {
            self.send_expect_ok(
                &mut framed,
                vec!["AUTH".into(), password.clone().into()],
                "AUTH",
            )
            .await?;
        }

        // The target may be importing this key's slot; ASKING grants the
        // RESTORE below access in that case and is harmless otherwise.
        self.send_expect_ok(&mut framed, vec!["ASKING".into()], "ASKING")
            .await?;

        let mut restore_parts: Vec<Bytes> = vec![
            "RESTORE".into(),
            self.key.clone(),
            ttl_ms.to_string().into(),
            payload,
        ];
        if self.replace {
            restore_parts.push("REPLACE".into());
        }
        self.send_expect_ok(&mut framed, restore_parts, "RESTORE")
            .await?;

        if self.copy {
            return Ok((
                RespValue::SimpleString("OK".into()),
                WriteOutcome::DidNotWrite,
            ));
        }

        let deleted = ctx
            .state
            .store
            .delete(std::slice::from_ref(&self.key))
            .await;
        let outcome = if deleted > 0 {
            WriteOutcome::Delete { keys_deleted: 1 }
        } else {
            WriteOutcome::DidNotWrite
        };
        Ok((RespValue::SimpleString("OK".into()), outcome))
    }
}

impl Migrate {
    async fn send_expect_ok(
        &self,
        framed: &mut Framed<TcpStream, RespFrameCodec>,
        parts: Vec<Bytes>,
        what: &str,
    ) -> Result<(), ZirconError> {
        let frame = RespFrame::Array(parts.into_iter().map(RespFrame::BulkString).collect());
        framed.send(frame).await?;
        match framed.next().await {
            Some(Ok(RespFrame::SimpleString(s))) if s.eq_ignore_ascii_case("OK") => Ok(()),
            Some(Ok(RespFrame::Error(e))) => Err(ZirconError::MigrationError(e)),
            _ => Err(ZirconError::MigrationError(format!(
                "IOERR target did not acknowledge {what}"
            ))),
        }
    }
}

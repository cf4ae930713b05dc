// src/core/commands/mod.rs

//! Defines all supported commands and the central `Command` enum that
//! encapsulates their parsed state. Dispatch is tagged-variant: a frame is
//! parsed into exactly one typed command up front, and execution is a match
//! over the enum, never a string switch.

use crate::core::protocol::RespFrame;
use crate::core::{RespValue, ZirconError};
use bytes::Bytes;

pub mod cluster;
pub mod command_trait;
pub mod generic;
pub mod helpers;
pub mod string;

pub use command_trait::{
    CommandFlags, ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};

use cluster::ClusterCommand;
use generic::{
    Asking, DbSize, Del, Echo, Exists, Keys, Migrate, Ping, ReadOnly, ReadWrite, Restore, Shutdown,
};
use string::{Get, Set};

/// Every command the server understands, in parsed form.
#[derive(Debug, Clone)]
pub enum Command {
    Cluster(ClusterCommand),
    Get(Get),
    Set(Set),
    Del(Del),
    Exists(Exists),
    Keys(Keys),
    DbSize(DbSize),
    Ping(Ping),
    Echo(Echo),
    Migrate(Migrate),
    Restore(Restore),
    Asking(Asking),
    ReadOnly(ReadOnly),
    ReadWrite(ReadWrite),
    Shutdown(Shutdown),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Cluster(_) => "cluster",
            Command::Get(_) => "get",
            Command::Set(_) => "set",
            Command::Del(_) => "del",
            Command::Exists(_) => "exists",
            Command::Keys(_) => "keys",
            Command::DbSize(_) => "dbsize",
            Command::Ping(_) => "ping",
            Command::Echo(_) => "echo",
            Command::Migrate(_) => "migrate",
            Command::Restore(_) => "restore",
            Command::Asking(_) => "asking",
            Command::ReadOnly(_) => "readonly",
            Command::ReadWrite(_) => "readwrite",
            Command::Shutdown(_) => "shutdown",
        }
    }

    pub fn get_flags(&self) -> CommandFlags {
        match self {
            Command::Cluster(_) => CommandFlags::ADMIN,
            Command::Get(_) | Command::Exists(_) | Command::Keys(_) | Command::DbSize(_) => {
                CommandFlags::READONLY
            }
            Command::Set(_) | Command::Del(_) | Command::Restore(_) => CommandFlags::WRITE,
            Command::Migrate(_) => CommandFlags::WRITE | CommandFlags::ADMIN,
            Command::Ping(_) | Command::Echo(_) => CommandFlags::empty(),
            Command::Asking(_) | Command::ReadOnly(_) | Command::ReadWrite(_) => {
                CommandFlags::SESSION
            }
            Command::Shutdown(_) => CommandFlags::ADMIN,
        }
    }

    /// The keys this command touches, used for cluster redirection.
    pub fn get_keys(&self) -> Vec<Bytes> {
        match self {
            Command::Get(cmd) => vec![cmd.key.clone()],
            Command::Set(cmd) => vec![cmd.key.clone()],
            Command::Del(cmd) => cmd.keys.clone(),
            Command::Exists(cmd) => cmd.keys.clone(),
            Command::Restore(cmd) => vec![cmd.key.clone()],
            // MIGRATE is issued against the migration source itself and must
            // not be redirected away from it.
            _ => vec![],
        }
    }

    pub async fn execute(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        match self {
            Command::Cluster(cmd) => cmd.execute(ctx).await,
            Command::Get(cmd) => cmd.execute(ctx).await,
            Command::Set(cmd) => cmd.execute(ctx).await,
            Command::Del(cmd) => cmd.execute(ctx).await,
            Command::Exists(cmd) => cmd.execute(ctx).await,
            Command::Keys(cmd) => cmd.execute(ctx).await,
            Command::DbSize(cmd) => cmd.execute(ctx).await,
            Command::Ping(cmd) => cmd.execute(ctx).await,
            Command::Echo(cmd) => cmd.execute(ctx).await,
            Command::Migrate(cmd) => cmd.execute(ctx).await,
            Command::Restore(cmd) => cmd.execute(ctx).await,
            Command::Asking(cmd) => cmd.execute(ctx).await,
            Command::ReadOnly(cmd) => cmd.execute(ctx).await,
            Command::ReadWrite(cmd) => cmd.execute(ctx).await,
            Command::Shutdown(cmd) => cmd.execute(ctx).await,
        }
    }
}

impl TryFrom<RespFrame> for Command {
    type Error = ZirconError;

    /// Parses a client request frame (an array of bulk strings) into a command.
    fn try_from(frame: RespFrame) -> Result<Self, Self::Error> {
        let RespFrame::Array(parts) = frame else {
            return Err(ZirconError::InvalidRequest(
                "Expected an array of bulk strings".to_string(),
            ));
        };
        let Some((name_frame, args)) = parts.split_first() else {
            return Err(ZirconError::InvalidRequest("Empty command".to_string()));
        };
        let name = helpers::extract_string(name_frame)?.to_ascii_lowercase();

        let command = match name.as_str() {
            "cluster" => Command::Cluster(ClusterCommand::parse(args)?),
            "get" => Command::Get(Get::parse(args)?),
            "set" => Command::Set(Set::parse(args)?),
            "del" => Command::Del(Del::parse(args)?),
            "exists" => Command::Exists(Exists::parse(args)?),
            "keys" => Command::Keys(Keys::parse(args)?),
            "dbsize" => Command::DbSize(DbSize::parse(args)?),
            "ping" => Command::Ping(Ping::parse(args)?),
            "echo" => Command::Echo(Echo::parse(args)?),
            "migrate" => Command::Migrate(Migrate::parse(args)?),
            "restore" => Command::Restore(Restore::parse(args)?),
            "asking" => Command::Asking(Asking::parse(args)?),
            "readonly" => Command::ReadOnly(ReadOnly::parse(args)?),
            "readwrite" => Command::ReadWrite(ReadWrite::parse(args)?),
            "shutdown" => Command::Shutdown(Shutdown::parse(args)?),
            _ => return Err(ZirconError::UnknownCommand(name)),
        };
        Ok(command)
    }
}

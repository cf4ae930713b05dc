// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::num::{ParseFloatError, ParseIntError};
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the server.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum ZirconError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Incomplete data in stream")]
    IncompleteData,

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Syntax error")]
    SyntaxError,

    #[error("Wrong number of arguments for '{0}' command")]
    WrongArgumentCount(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("Value is not an integer or out of range")]
    NotAnInteger,

    #[error("value is not a valid float")]
    NotAFloat,

    #[error("Key not found")]
    KeyNotFound,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Command not allowed in the current state: {0}")]
    InvalidState(String),

    #[error("READONLY {0}")]
    ReadOnly(String),

    #[error("Migration Error: {0}")]
    MigrationError(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    // --- Cluster-specific errors ---
    /// A redirect error indicating that a key/slot has moved to a different node.
    #[error("MOVED {slot} {addr}")]
    Moved { slot: u16, addr: String },

    /// A temporary redirect error for a slot that is currently being migrated.
    #[error("ASK {slot} {addr}")]
    Ask { slot: u16, addr: String },

    /// A multi-key command was attempted on keys in different slots.
    #[error("CROSSSLOT Keys in request don't hash to the same slot")]
    CrossSlot,

    /// An error indicating that the cluster is down or a slot is unassigned.
    #[error("CLUSTERDOWN {0}")]
    ClusterDown(String),

    /// A failover commit could not gather acknowledgements from a majority of masters.
    #[error("NOQUORUM {0}")]
    QuorumNotReached(String),

    /// An ownership change carried an epoch that is not newer than the current one.
    #[error("Stale epoch {proposed} (current epoch is {current})")]
    StaleEpoch { proposed: u64, current: u64 },
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for ZirconError {
    fn clone(&self) -> Self {
        match self {
            ZirconError::Io(e) => ZirconError::Io(Arc::clone(e)),
            ZirconError::IncompleteData => ZirconError::IncompleteData,
            ZirconError::UnknownCommand(s) => ZirconError::UnknownCommand(s.clone()),
            ZirconError::SyntaxError => ZirconError::SyntaxError,
            ZirconError::WrongArgumentCount(s) => ZirconError::WrongArgumentCount(s.clone()),
            ZirconError::WrongType => ZirconError::WrongType,
            ZirconError::NotAnInteger => ZirconError::NotAnInteger,
            ZirconError::NotAFloat => ZirconError::NotAFloat,
            ZirconError::KeyNotFound => ZirconError::KeyNotFound,
            ZirconError::InvalidRequest(s) => ZirconError::InvalidRequest(s.clone()),
            ZirconError::InvalidState(s) => ZirconError::InvalidState(s.clone()),
            ZirconError::ReadOnly(s) => ZirconError::ReadOnly(s.clone()),
            ZirconError::MigrationError(s) => ZirconError::MigrationError(s.clone()),
            ZirconError::Internal(s) => ZirconError::Internal(s.clone()),
            ZirconError::Moved { slot, addr } => ZirconError::Moved {
                slot: *slot,
                addr: addr.clone(),
            },
            ZirconError::Ask { slot, addr } => ZirconError::Ask {
                slot: *slot,
                addr: addr.clone(),
            },
            ZirconError::CrossSlot => ZirconError::CrossSlot,
            ZirconError::ClusterDown(s) => ZirconError::ClusterDown(s.clone()),
            ZirconError::QuorumNotReached(s) => ZirconError::QuorumNotReached(s.clone()),
            ZirconError::StaleEpoch { proposed, current } => ZirconError::StaleEpoch {
                proposed: *proposed,
                current: *current,
            },
        }
    }
}

impl PartialEq for ZirconError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ZirconError::Io(e1), ZirconError::Io(e2)) => e1.to_string() == e2.to_string(),
            (ZirconError::UnknownCommand(s1), ZirconError::UnknownCommand(s2)) => s1 == s2,
            (ZirconError::WrongArgumentCount(s1), ZirconError::WrongArgumentCount(s2)) => s1 == s2,
            (ZirconError::InvalidRequest(s1), ZirconError::InvalidRequest(s2)) => s1 == s2,
            (ZirconError::InvalidState(s1), ZirconError::InvalidState(s2)) => s1 == s2,
            (ZirconError::ReadOnly(s1), ZirconError::ReadOnly(s2)) => s1 == s2,
            (ZirconError::MigrationError(s1), ZirconError::MigrationError(s2)) => s1 == s2,
            (ZirconError::Internal(s1), ZirconError::Internal(s2)) => s1 == s2,
            (ZirconError::ClusterDown(s1), ZirconError::ClusterDown(s2)) => s1 == s2,
            (ZirconError::QuorumNotReached(s1), ZirconError::QuorumNotReached(s2)) => s1 == s2,
            (
                ZirconError::Moved { slot: s1, addr: a1 },
                ZirconError::Moved { slot: s2, addr: a2 },
            ) => s1 == s2 && a1 == a2,
            (ZirconError::Ask { slot: s1, addr: a1 }, ZirconError::Ask { slot: s2, addr: a2 }) => {
                s1 == s2 && a1 == a2
            }
            (
                ZirconError::StaleEpoch {
                    proposed: p1,
                    current: c1,
                },
                ZirconError::StaleEpoch {
                    proposed: p2,
                    current: c2,
                },
            ) => p1 == p2 && c1 == c2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for ZirconError {
    fn from(e: std::io::Error) -> Self {
        ZirconError::Io(Arc::new(e))
    }
}

impl From<std::str::Utf8Error> for ZirconError {
    fn from(_: std::str::Utf8Error) -> Self {
        ZirconError::WrongType
    }
}

impl From<std::string::FromUtf8Error> for ZirconError {
    fn from(_: std::string::FromUtf8Error) -> Self {
        ZirconError::WrongType
    }
}

impl From<ParseIntError> for ZirconError {
    fn from(_: ParseIntError) -> Self {
        ZirconError::NotAnInteger
    }
}

impl From<ParseFloatError> for ZirconError {
    fn from(_: ParseFloatError) -> Self {
        ZirconError::NotAFloat
    }
}

impl From<serde_json::Error> for ZirconError {
    fn from(e: serde_json::Error) -> Self {
        ZirconError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}

// src/connection/session.rs

//! Defines the state associated with a single client session.

/// Holds the state specific to a single client session.
#[derive(Debug, Default)]
pub struct SessionState {
    /// True for the one command immediately following an `ASKING` command,
    /// granting it access to a slot this node is importing.
    pub is_asking: bool,
    /// True after `READONLY`: the client accepts (possibly stale) reads from
    /// a replica instead of being redirected to the slot's master.
    pub readonly_replica: bool,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

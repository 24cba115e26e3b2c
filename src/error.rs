// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Error types for Jebi

use crate::session::Stage;
use thiserror::Error;

/// Result type alias for Jebi operations
pub type Result<T> = core::result::Result<T, Error>;

/// Main error type for the Jebi library
#[derive(Error, Debug)]
pub enum Error {
    /// The external backend call failed outright (timeout/network/non-success status).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend call succeeded but the returned artifact fails minimal shape checks.
    #[error("Malformed artifact: {0}")]
    MalformedArtifact(String),

    /// A transition was requested from a stage that does not permit it.
    ///
    /// The session is left untouched; the caller may inspect the stage
    /// and issue the operation that is actually due.
    #[error("operation `{operation}` is not permitted at stage `{stage}`")]
    TerminalSession {
        /// The stage the session was in when the operation was rejected.
        stage: Stage,
        /// The rejected operation.
        operation: &'static str,
    },

    /// No session with the given id is known to the controller.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// An artifact did not appear within the bounded polling window.
    ///
    /// Recoverable: the caller may poll again or re-trigger the transition.
    #[error("artifact not ready after {attempts} attempts")]
    NotReady {
        /// Number of probe attempts that were made.
        attempts: u32,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a malformed-artifact error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedArtifact(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Check if retrying the same operation may succeed.
    ///
    /// Transport failures, malformed artifacts and polling exhaustion are
    /// transient by nature; stage-precondition violations and unknown
    /// sessions are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::MalformedArtifact(_) | Self::NotReady { .. }
        )
    }
}

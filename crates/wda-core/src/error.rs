//! Classified failures for every public session operation.
//!
//! [`WdaError`] unifies transport, envelope, protocol and input-validation
//! failures behind one type. Each variant that stems from a server exchange
//! names the command that produced it so a failure can be diagnosed without
//! re-running it. [`WdaError::category`] groups the variants into the coarse
//! [`ErrorCategory`] taxonomy.

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

/// Coarse classification of a [`WdaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The server was unreachable, timed out, or answered with status >= 400.
    Network,
    /// The response body did not have the expected envelope shape.
    MalformedEnvelope,
    /// The envelope was well-formed but the command's success rule did not hold.
    ProtocolMismatch,
    /// Caller input was rejected locally; no request was sent.
    Validation,
    /// The artifact writer failed to persist a screenshot or page dump.
    Artifact,
}

/// Errors returned by [`WdaSession`](crate::session::WdaSession) operations.
#[derive(Error, Debug)]
pub enum WdaError {
    /// The transport failed to deliver the request or got an error status.
    #[error("{command}: network error: {source}")]
    Network {
        command: &'static str,
        #[source]
        source: TransportError,
    },

    /// The response was not a usable `{value, sessionId}` envelope.
    #[error("{command}: malformed envelope: {detail}")]
    MalformedEnvelope { command: &'static str, detail: String },

    /// The command's response rule was not satisfied.
    #[error("{command} failed: {detail}")]
    ProtocolMismatch { command: &'static str, detail: String },

    /// An element search returned an empty match list.
    #[error("no element found using {strategy} '{selector}'")]
    NoElementFound { strategy: String, selector: String },

    /// The server did not hand back a session identifier.
    #[error("failed to create session for '{bundle_id}': {reason}")]
    SessionCreationFailed { bundle_id: String, reason: String },

    /// A session-scoped operation was attempted without an active session.
    #[error("no active session")]
    NoActiveSession,

    /// The button name is not one of volumeUp, volumeDown or home.
    #[error("unsupported button: {0}")]
    UnsupportedButton(String),

    /// The element search strategy is not recognized.
    #[error("unsupported search strategy: {0}")]
    UnsupportedSearchStrategy(String),

    /// The URL is not absolute.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Writing an artifact to disk failed.
    #[error("failed to write {}: {source}", .path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WdaError {
    /// Returns the coarse category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            WdaError::Network { .. } => ErrorCategory::Network,
            WdaError::MalformedEnvelope { .. } => ErrorCategory::MalformedEnvelope,
            WdaError::ProtocolMismatch { .. }
            | WdaError::NoElementFound { .. }
            | WdaError::SessionCreationFailed { .. } => ErrorCategory::ProtocolMismatch,
            WdaError::NoActiveSession
            | WdaError::UnsupportedButton(_)
            | WdaError::UnsupportedSearchStrategy(_)
            | WdaError::InvalidUrl { .. } => ErrorCategory::Validation,
            WdaError::Artifact { .. } => ErrorCategory::Artifact,
        }
    }

    /// Returns the name of the command that failed, when there is one.
    pub fn command(&self) -> Option<&'static str> {
        match self {
            WdaError::Network { command, .. }
            | WdaError::MalformedEnvelope { command, .. }
            | WdaError::ProtocolMismatch { command, .. } => Some(*command),
            _ => None,
        }
    }

    pub(crate) fn malformed(command: &'static str, detail: impl Into<String>) -> Self {
        WdaError::MalformedEnvelope {
            command,
            detail: detail.into(),
        }
    }

    pub(crate) fn mismatch(command: &'static str, detail: impl Into<String>) -> Self {
        WdaError::ProtocolMismatch {
            command,
            detail: detail.into(),
        }
    }
}

//! Unified SDK error types.

use std::time::Duration;

use thiserror::Error;

use crate::shared::State;

/// Top-level SDK error.
///
/// Caller-input and environment errors (`InvalidQuery`,
/// `MissingConfiguration`, `PopupBlocked`) are returned before any exchange
/// is in flight. Everything else settles a pending exchange exactly once.
#[derive(Error, Debug)]
pub enum CheckinError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Missing configuration: {0}")]
    MissingConfiguration(&'static str),

    #[error("Popup blocked: {0}")]
    PopupBlocked(#[source] TransportError),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(#[from] EnvelopeError),

    #[error("State mismatch: expected {expected}, got {actual}")]
    StateMismatch { expected: State, actual: State },

    #[error("Remote declined: {code}{}", detail(.description))]
    RemoteDeclined {
        code: String,
        description: Option<String>,
    },

    #[error("Timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Seal error: {0}")]
    Seal(#[from] SealError),
}

fn detail(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

/// Coarse classification of a [`CheckinError`], for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidQuery,
    MissingConfiguration,
    PopupBlocked,
    MalformedEnvelope,
    StateMismatch,
    RemoteDeclined,
    Timeout,
    Relay,
    Seal,
}

impl CheckinError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Self::MissingConfiguration(_) => ErrorKind::MissingConfiguration,
            Self::PopupBlocked(_) => ErrorKind::PopupBlocked,
            Self::MalformedEnvelope(_) => ErrorKind::MalformedEnvelope,
            Self::StateMismatch { .. } => ErrorKind::StateMismatch,
            Self::RemoteDeclined { .. } => ErrorKind::RemoteDeclined,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Relay(_) => ErrorKind::Relay,
            Self::Seal(_) => ErrorKind::Seal,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

/// Structural failures while decoding or validating an envelope.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Invalid base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid fragment encoding: {0}")]
    Fragment(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u32),

    #[error("Unexpected value for {field}: {value}")]
    UnexpectedValue { field: &'static str, value: String },

    #[error("Duplicate credential item id: {0}")]
    DuplicateItemId(String),

    #[error("Artifact index {index} out of range for item {item} ({len} artifacts)")]
    ArtifactOutOfRange {
        item: String,
        index: usize,
        len: usize,
    },

    #[error("Response carries more than one result kind")]
    AmbiguousResult,
}

/// Host environment failures around transient browsing contexts.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Context blocked: {0}")]
    ContextBlocked(String),

    #[error("Close refused: {0}")]
    CloseRefused(String),
}

/// Response relay failures.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),
}

/// Sealed payload failures.
#[derive(Error, Debug)]
pub enum SealError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Payload encoding failed: {0}")]
    Payload(#[from] serde_json::Error),
}

//! SMB-specific error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categorised SMB failure. Variants carry enough context for a
/// human-readable message; `source()` walks to the underlying cause.
#[derive(Debug, Error)]
pub enum SmbError {
    /// TCP / name resolution failure reaching the server.
    #[error("cannot reach server: {message}")]
    Connection { message: String },

    /// Credentials rejected during session setup.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// Session established but the share could not be attached.
    #[error("share '{share}' unavailable: {message}")]
    ShareUnavailable { share: String, message: String },

    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("already exists: {path}")]
    AlreadyExists { path: String },

    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// Byte count after a copy does not match the source size.
    #[error("integrity check failed for {path}: expected {expected} bytes, copied {actual}")]
    Integrity {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// Retries exhausted for a single-file transfer.
    #[error("transfer of {path} failed after {attempts} attempt(s)")]
    Transfer {
        path: String,
        attempts: u32,
        #[source]
        source: Box<SmbError>,
    },

    /// One file of a folder download failed; earlier files stay on disk.
    #[error("folder transfer aborted at {file} ({completed} file(s) already transferred)")]
    FolderTransfer {
        file: String,
        completed: u32,
        #[source]
        source: Box<SmbError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    /// The server rejected an operation for a reason with no dedicated variant.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat classification for callers that only branch on the category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SmbErrorKind {
    Connection,
    Authentication,
    ShareUnavailable,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Integrity,
    Transfer,
    Cancelled,
    Protocol,
    InvalidInput,
    Io,
}

pub type SmbResult<T> = Result<T, SmbError>;

// ── Construction helpers ─────────────────────────────────────────────

impl SmbError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
        }
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication {
            message: msg.into(),
        }
    }

    pub fn share_unavailable(share: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ShareUnavailable {
            share: share.into(),
            message: msg.into(),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists { path: path.into() }
    }

    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied { path: path.into() }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn kind(&self) -> SmbErrorKind {
        match self {
            Self::Connection { .. } => SmbErrorKind::Connection,
            Self::Authentication { .. } => SmbErrorKind::Authentication,
            Self::ShareUnavailable { .. } => SmbErrorKind::ShareUnavailable,
            Self::NotFound { .. } => SmbErrorKind::NotFound,
            Self::AlreadyExists { .. } => SmbErrorKind::AlreadyExists,
            Self::PermissionDenied { .. } => SmbErrorKind::PermissionDenied,
            Self::Integrity { .. } => SmbErrorKind::Integrity,
            Self::Transfer { .. } | Self::FolderTransfer { .. } => SmbErrorKind::Transfer,
            Self::Cancelled => SmbErrorKind::Cancelled,
            Self::Protocol { .. } => SmbErrorKind::Protocol,
            Self::InvalidInput { .. } => SmbErrorKind::InvalidInput,
            Self::Io(_) => SmbErrorKind::Io,
        }
    }

    /// Whether another transfer attempt could plausibly succeed.
    ///
    /// Missing paths, rejected credentials and bad input will fail the same
    /// way again, so the retry loop gives up on them immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Protocol { .. } | Self::Io(_)
        )
    }

    /// Message chain from this error down to the root cause, joined with ": ".
    pub fn cause_chain(&self) -> String {
        let mut text = self.to_string();
        let mut current: Option<&(dyn std::error::Error + 'static)> =
            std::error::Error::source(self);
        while let Some(cause) = current {
            text.push_str(": ");
            text.push_str(&cause.to_string());
            current = cause.source();
        }
        text
    }
}

impl From<SmbError> for String {
    fn from(e: SmbError) -> String {
        e.cause_chain()
    }
}

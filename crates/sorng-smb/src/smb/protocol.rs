//! The protocol client seam.
//!
//! A backend hands out a chain of closable handles:
//! `ShareTransport::connect` → `ShareConnection::authenticate` →
//! `AuthenticatedSession::attach_share` → `ShareHandle`. None of these are
//! required to tolerate concurrent use; callers serialise through the
//! operation gate.

use crate::smb::error::SmbResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Identity presented during session setup.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Named {
        username: String,
        password: String,
        domain: String,
    },
    Anonymous,
}

impl Credentials {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Username for logs; never the password.
    pub fn display_user(&self) -> String {
        match self {
            Self::Named {
                username, domain, ..
            } if !domain.is_empty() => format!("{}\\{}", domain, username),
            Self::Named { username, .. } => username.clone(),
            Self::Anonymous => "<guest>".into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credentials({})", self.display_user())
    }
}

/// How `open_write` treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateDisposition {
    /// Create, truncating any existing file.
    Overwrite,
    /// Create only if absent; fail with `AlreadyExists` otherwise.
    CreateNew,
}

/// One raw listing row, as the backend reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ShareTransport: Send + Sync {
    async fn connect(&self, server: &str) -> SmbResult<Box<dyn ShareConnection>>;
}

/// A connection dropped without `close` (its operation was cancelled
/// mid-flight) must still release what it holds on the server, synchronously.
#[async_trait]
pub trait ShareConnection: Send {
    async fn authenticate(
        &mut self,
        credentials: &Credentials,
    ) -> SmbResult<Box<dyn AuthenticatedSession>>;

    async fn close(&mut self) -> SmbResult<()>;
}

#[async_trait]
pub trait AuthenticatedSession: Send {
    async fn attach_share(&mut self, share: &str) -> SmbResult<Box<dyn ShareHandle>>;

    async fn close(&mut self) -> SmbResult<()>;
}

/// Operations on an attached share. Paths are share-relative and normalised.
#[async_trait]
pub trait ShareHandle: Send {
    /// Entries of a directory. May include `.` and `..`.
    async fn list(&mut self, path: &str) -> SmbResult<Vec<RawEntry>>;

    /// Metadata of a single path; `NotFound` if absent.
    async fn metadata(&mut self, path: &str) -> SmbResult<RawEntry>;

    async fn file_exists(&mut self, path: &str) -> SmbResult<bool>;

    async fn folder_exists(&mut self, path: &str) -> SmbResult<bool>;

    async fn open_read(&mut self, path: &str) -> SmbResult<Box<dyn RemoteReader>>;

    async fn open_write(
        &mut self,
        path: &str,
        disposition: CreateDisposition,
    ) -> SmbResult<Box<dyn RemoteWriter>>;

    async fn remove(&mut self, path: &str) -> SmbResult<()>;

    async fn remove_directory_recursive(&mut self, path: &str) -> SmbResult<()>;

    async fn create_directory(&mut self, path: &str) -> SmbResult<()>;

    async fn rename_directory(&mut self, from: &str, to: &str) -> SmbResult<()>;

    async fn close(&mut self) -> SmbResult<()>;
}

/// Remote read stream.
#[async_trait]
pub trait RemoteReader: Send {
    /// Read into `buf`; `Ok(0)` at end of file.
    async fn read(&mut self, buf: &mut [u8]) -> SmbResult<usize>;

    /// Advance the stream by `bytes` without returning them. Returns how
    /// many bytes were actually skipped (less only at end of file).
    async fn skip(&mut self, bytes: u64) -> SmbResult<u64> {
        let mut scratch = vec![0u8; 65_536];
        let mut skipped = 0u64;
        while skipped < bytes {
            let want = ((bytes - skipped) as usize).min(scratch.len());
            let n = self.read(&mut scratch[..want]).await?;
            if n == 0 {
                break;
            }
            skipped += n as u64;
        }
        Ok(skipped)
    }

    async fn close(&mut self) -> SmbResult<()>;
}

/// Remote write stream. Data is only guaranteed durable once `close`
/// returns `Ok`.
#[async_trait]
pub trait RemoteWriter: Send {
    async fn write_all(&mut self, buf: &[u8]) -> SmbResult<()>;

    async fn close(&mut self) -> SmbResult<()>;
}

//! # sorng-smb — SMB/CIFS Share Access Engine
//!
//! Every public operation runs the same way: take the operation gate,
//! open a fresh session, run one engine against the attached share, close
//! the session, release the gate. Nothing protocol-facing is cached or
//! shared between two calls.
//!
//! Architecture:
//! - `types` — profile, entries, search request, config, progress snapshot
//! - `error` — SMB error taxonomy
//! - `path` — share-name and share-relative path normalisation
//! - `matcher` — wildcard / substring name matching
//! - `protocol` — the protocol client seam (connection → session → share)
//! - `smbclient` — production backend driving Samba's `smbclient`
//! - `memory` — in-process share server with fault injection
//! - `session` — per-operation session factory
//! - `lock` — the operation gate
//! - `progress` — progress sinks and speed/ETA tracking
//! - `directory` — listing, mkdir, delete, exists
//! - `transfer` — download (resumable) / upload with retry + backoff
//! - `search` — cancellable depth-first search
//! - `rename` — native directory rename, copy-verify-delete file rename
//! - `folder` — whole-directory download
//! - `service` — public operations facade

pub mod types;
pub mod error;
pub mod path;
pub mod matcher;
pub mod protocol;
pub mod smbclient;
pub mod memory;
pub mod session;
pub mod lock;
pub mod progress;
pub mod directory;
pub mod transfer;
pub mod search;
pub mod rename;
pub mod folder;
pub mod service;

// Re-exports for lib.rs consumers
pub use types::*;
pub use error::{SmbError, SmbErrorKind, SmbResult};
pub use matcher::wildcard_match;
pub use progress::{ProgressSink, ProgressUpdate};
pub use service::{SmbService, SmbServiceState};
pub use tokio_util::sync::CancellationToken;

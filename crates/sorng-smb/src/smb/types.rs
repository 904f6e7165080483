//! Shared types for the SMB crate.

use crate::smb::error::{SmbError, SmbResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Connection profile ──────────────────────────────────────────────

/// Everything needed to reach one share. Owned by the caller and only ever
/// read by the engine.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SmbConnectionProfile {
    /// Host name or IP address of the file server.
    pub server: String,
    /// Share name, with or without leading slashes / backslashes.
    pub share: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub domain: String,
    /// Friendly label shown in the UI.
    #[serde(default)]
    pub label: Option<String>,
}

impl SmbConnectionProfile {
    pub fn new(server: impl Into<String>, share: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            share: share.into(),
            username: String::new(),
            password: String::new(),
            domain: String::new(),
            label: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Both username and password empty → guest session.
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

impl fmt::Debug for SmbConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmbConnectionProfile")
            .field("server", &self.server)
            .field("share", &self.share)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .field("label", &self.label)
            .finish()
    }
}

// ─── Directory entries ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SmbEntryKind {
    File,
    Directory,
}

/// Immutable snapshot of one remote entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SmbEntry {
    pub name: String,
    /// Share-relative path, `/`-separated, no leading separator.
    pub path: String,
    pub kind: SmbEntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl SmbEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == SmbEntryKind::Directory
    }

    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

// ─── Listing ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SmbSortField {
    #[default]
    Name,
    Size,
    Modified,
    Kind,
}

/// Options for `list_files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    /// Glob applied to entry names (e.g. "*.txt").
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub sort_by: SmbSortField,
    #[serde(default)]
    pub descending: bool,
    #[serde(default = "default_true")]
    pub show_hidden: bool,
    #[serde(default = "default_true")]
    pub directories_first: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            filter: None,
            sort_by: SmbSortField::Name,
            descending: false,
            show_hidden: true,
            directories_first: true,
        }
    }
}

// ─── Search ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SearchTypeFilter {
    #[default]
    All,
    FilesOnly,
    DirectoriesOnly,
}

impl SearchTypeFilter {
    pub fn accepts(self, kind: SmbEntryKind) -> bool {
        match self {
            Self::All => true,
            Self::FilesOnly => kind == SmbEntryKind::File,
            Self::DirectoriesOnly => kind == SmbEntryKind::Directory,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmbSearchRequest {
    /// Plain text (substring) or a `*` / `?` wildcard pattern.
    pub query: String,
    #[serde(default)]
    pub type_filter: SearchTypeFilter,
    #[serde(default = "default_true")]
    pub include_subfolders: bool,
    /// Overrides `SmbEngineConfig::max_search_results` when set.
    #[serde(default)]
    pub max_results: Option<usize>,
}

impl SmbSearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            type_filter: SearchTypeFilter::All,
            include_subfolders: true,
            max_results: None,
        }
    }

    pub fn files_only(mut self) -> Self {
        self.type_filter = SearchTypeFilter::FilesOnly;
        self
    }

    pub fn directories_only(mut self) -> Self {
        self.type_filter = SearchTypeFilter::DirectoriesOnly;
        self
    }

    pub fn shallow(mut self) -> Self {
        self.include_subfolders = false;
        self
    }
}

/// Result of a search. A cancelled search still carries everything found
/// before the stop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub entries: Vec<SmbEntry>,
    pub cancelled: bool,
    /// Directories whose listing failed and were skipped.
    pub skipped_directories: u32,
    /// The result cap was reached before the walk finished.
    pub truncated: bool,
}

impl SearchOutcome {
    pub fn is_complete(&self) -> bool {
        !self.cancelled && !self.truncated && self.skipped_directories == 0
    }
}

// ─── Transfer results ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Outcome of a single-file transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub direction: TransferDirection,
    pub remote_path: String,
    pub local_path: String,
    /// Size of the file after the transfer (includes resumed bytes).
    pub bytes_total: u64,
    /// Offset the successful attempt started from.
    pub resumed_from: u64,
    /// 1-based number of the attempt that succeeded.
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Outcome of a completed folder download.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderTransferSummary {
    pub files: u32,
    pub directories: u32,
    pub bytes: u64,
}

// ─── Engine config ───────────────────────────────────────────────────

/// Tunables for the engine. The attempt limit is not one of them; it is
/// fixed at `transfer::MAX_ATTEMPTS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmbEngineConfig {
    /// Chunk size for streamed reads/writes (bytes).
    #[serde(default = "default_chunk")]
    pub chunk_size: usize,
    /// Linear retry back-off base in milliseconds.
    #[serde(default = "default_backoff")]
    pub retry_backoff_ms: u64,
    /// TCP reachability probe timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_sec: u64,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Binary used by the smbclient backend.
    #[serde(default = "default_smbclient")]
    pub smbclient_path: String,
    /// Cap on search results (None = unlimited).
    #[serde(default)]
    pub max_search_results: Option<usize>,
}

fn default_chunk() -> usize {
    65_536
}
fn default_backoff() -> u64 {
    1_000
}
fn default_connect_timeout() -> u64 {
    15
}
fn default_port() -> u16 {
    445
}
fn default_smbclient() -> String {
    "smbclient".into()
}
fn default_true() -> bool {
    true
}

impl Default for SmbEngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk(),
            retry_backoff_ms: default_backoff(),
            connect_timeout_sec: default_connect_timeout(),
            port: default_port(),
            smbclient_path: default_smbclient(),
            max_search_results: None,
        }
    }
}

impl SmbEngineConfig {
    /// Parse a JSON config document; missing fields take their defaults.
    pub fn from_json(raw: &str) -> SmbResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| SmbError::invalid_input(format!("Invalid SMB engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SmbResult<()> {
        if self.chunk_size == 0 {
            return Err(SmbError::invalid_input("chunkSize must be greater than 0"));
        }
        if self.connect_timeout_sec == 0 {
            return Err(SmbError::invalid_input(
                "connectTimeoutSec must be greater than 0",
            ));
        }
        if self.smbclient_path.trim().is_empty() {
            return Err(SmbError::invalid_input("smbclientPath must not be empty"));
        }
        if self.max_search_results == Some(0) {
            return Err(SmbError::invalid_input(
                "maxSearchResults must be greater than 0 when set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config = SmbEngineConfig::from_json(r#"{ "retryBackoffMs": 5 }"#).unwrap();
        assert_eq!(config.retry_backoff_ms, 5);
        assert_eq!(config.chunk_size, 65_536);
        assert_eq!(config.port, 445);
        assert_eq!(config.smbclient_path, "smbclient");
        assert!(config.max_search_results.is_none());
    }

    #[test]
    fn config_rejects_zero_chunk() {
        let err = SmbEngineConfig::from_json(r#"{ "chunkSize": 0 }"#).unwrap_err();
        assert_eq!(err.kind(), crate::smb::SmbErrorKind::InvalidInput);
    }

    #[test]
    fn config_rejects_zero_search_cap() {
        let err = SmbEngineConfig::from_json(r#"{ "maxSearchResults": 0 }"#).unwrap_err();
        assert_eq!(err.kind(), crate::smb::SmbErrorKind::InvalidInput);
        let config = SmbEngineConfig::from_json(r#"{ "maxSearchResults": 1 }"#).unwrap();
        assert_eq!(config.max_search_results, Some(1));
    }

    #[test]
    fn profile_debug_redacts_password() {
        let profile = SmbConnectionProfile::new("nas", "media").with_credentials("bob", "hunter2");
        let printed = format!("{:?}", profile);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("bob"));
    }

    #[test]
    fn anonymous_requires_both_fields_empty() {
        assert!(SmbConnectionProfile::new("nas", "media").is_anonymous());
        assert!(!SmbConnectionProfile::new("nas", "media")
            .with_credentials("bob", "")
            .is_anonymous());
        assert!(!SmbConnectionProfile::new("nas", "media")
            .with_credentials("", "pw")
            .is_anonymous());
    }

    #[test]
    fn search_request_deserialises_with_defaults() {
        let req: SmbSearchRequest = serde_json::from_str(r#"{ "query": "*.pdf" }"#).unwrap();
        assert_eq!(req.type_filter, SearchTypeFilter::All);
        assert!(req.include_subfolders);
    }
}

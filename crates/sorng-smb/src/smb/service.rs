//! High-level orchestrator — the public SMB operations.
//!
//! Each method takes the operation gate, opens a fresh session for the
//! given profile, runs one engine against the attached share and closes
//! the session before the gate is released.

use crate::smb::directory;
use crate::smb::error::SmbResult;
use crate::smb::folder::FolderTransferEngine;
use crate::smb::lock::{LockStats, OperationLock};
use crate::smb::progress::ProgressSink;
use crate::smb::protocol::ShareTransport;
use crate::smb::rename::RenameEngine;
use crate::smb::search::SearchEngine;
use crate::smb::session::{SessionFactory, SmbSession};
use crate::smb::smbclient::SmbClientTransport;
use crate::smb::transfer::TransferEngine;
use crate::smb::types::*;
use log::{debug, info};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Shared handle to one engine instance.
pub type SmbServiceState = Arc<SmbService>;

pub struct SmbService {
    lock: OperationLock,
    factory: SessionFactory,
    config: SmbEngineConfig,
    /// Token of the search currently holding the gate, if any.
    current_search: Mutex<Option<CancellationToken>>,
}

impl SmbService {
    pub fn new(
        transport: Arc<dyn ShareTransport>,
        config: SmbEngineConfig,
    ) -> SmbResult<SmbServiceState> {
        config.validate()?;
        Ok(Arc::new(SmbService {
            lock: OperationLock::new(),
            factory: SessionFactory::new(transport),
            config,
            current_search: Mutex::new(None),
        }))
    }

    /// Service backed by Samba's `smbclient`.
    pub fn with_smbclient(config: SmbEngineConfig) -> SmbResult<SmbServiceState> {
        let transport = Arc::new(SmbClientTransport::new(config.clone()));
        Self::new(transport, config)
    }

    pub fn config(&self) -> &SmbEngineConfig {
        &self.config
    }

    pub fn lock_stats(&self) -> LockStats {
        self.lock.stats()
    }

    async fn finish<T>(session: SmbSession, result: SmbResult<T>) -> SmbResult<T> {
        // Close failures are logged by the session; the operation's own
        // outcome is what the caller gets.
        let _ = session.close().await;
        result
    }

    // ─── Connection ──────────────────────────────────────────────

    /// True when connect, authenticate and share attach all succeed.
    pub async fn test_connection(&self, profile: &SmbConnectionProfile) -> bool {
        let _gate = self.lock.acquire("test_connection").await;
        match self.factory.open(profile).await {
            Ok(session) => {
                let _ = session.close().await;
                true
            }
            Err(e) => {
                info!("SMB test connection to //{}/{} failed: {}", profile.server, profile.share, e);
                false
            }
        }
    }

    // ─── Directory operations ────────────────────────────────────

    pub async fn list_files(
        &self,
        profile: &SmbConnectionProfile,
        dir: &str,
        options: Option<ListOptions>,
    ) -> SmbResult<Vec<SmbEntry>> {
        let _gate = self.lock.acquire("list_files").await;
        let mut session = self.factory.open(profile).await?;
        let options = options.unwrap_or_default();
        let result = directory::list_directory(session.share(), dir, &options).await;
        Self::finish(session, result).await
    }

    /// Delete a file, or a directory with everything below it.
    pub async fn delete_file(&self, profile: &SmbConnectionProfile, target: &str) -> SmbResult<()> {
        let _gate = self.lock.acquire("delete_file").await;
        let mut session = self.factory.open(profile).await?;
        let result = directory::delete(session.share(), target).await;
        Self::finish(session, result).await
    }

    pub async fn create_directory(
        &self,
        profile: &SmbConnectionProfile,
        target: &str,
    ) -> SmbResult<()> {
        let _gate = self.lock.acquire("create_directory").await;
        let mut session = self.factory.open(profile).await?;
        let result = directory::create_directory(session.share(), target).await;
        Self::finish(session, result).await
    }

    /// True for both files and directories.
    pub async fn file_exists(&self, profile: &SmbConnectionProfile, target: &str) -> SmbResult<bool> {
        let _gate = self.lock.acquire("file_exists").await;
        let mut session = self.factory.open(profile).await?;
        let result = directory::exists(session.share(), target).await;
        Self::finish(session, result).await
    }

    /// Rename within the parent directory; returns the new path.
    pub async fn rename_file(
        &self,
        profile: &SmbConnectionProfile,
        source: &str,
        new_name: &str,
    ) -> SmbResult<String> {
        let _gate = self.lock.acquire("rename_file").await;
        let mut session = self.factory.open(profile).await?;
        let result = RenameEngine::new(self.config.chunk_size)
            .rename(session.share(), source, new_name)
            .await;
        Self::finish(session, result).await
    }

    // ─── Search ──────────────────────────────────────────────────

    pub async fn search_files(
        &self,
        profile: &SmbConnectionProfile,
        start: &str,
        request: &SmbSearchRequest,
    ) -> SmbResult<SearchOutcome> {
        self.search_files_with_token(profile, start, request, CancellationToken::new())
            .await
    }

    /// Search with a caller-owned token. `cancel_search` reaches it too
    /// while this search runs.
    pub async fn search_files_with_token(
        &self,
        profile: &SmbConnectionProfile,
        start: &str,
        request: &SmbSearchRequest,
        token: CancellationToken,
    ) -> SmbResult<SearchOutcome> {
        let _gate = self.lock.acquire("search_files").await;
        self.set_current_search(Some(token.clone()));
        let result = match self.factory.open(profile).await {
            Ok(mut session) => {
                let outcome = SearchEngine::new(request, &token, self.config.max_search_results)
                    .run(session.share(), start)
                    .await;
                Self::finish(session, Ok(outcome)).await
            }
            Err(e) => Err(e),
        };
        self.set_current_search(None);
        result
    }

    /// Ask the running search (if any) to stop at its next check.
    pub fn cancel_search(&self) {
        let current = self
            .current_search
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match current.as_ref() {
            Some(token) => {
                debug!("SMB search cancellation requested");
                token.cancel();
            }
            None => debug!("SMB cancel requested with no search running"),
        }
    }

    fn set_current_search(&self, token: Option<CancellationToken>) {
        *self
            .current_search
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = token;
    }

    // ─── Transfers ───────────────────────────────────────────────

    pub async fn download_file(
        &self,
        profile: &SmbConnectionProfile,
        remote: &str,
        local: &Path,
        progress: Option<&dyn ProgressSink>,
    ) -> SmbResult<TransferResult> {
        let _gate = self.lock.acquire("download_file").await;
        let mut session = self.factory.open(profile).await?;
        let result = TransferEngine::new(&self.config)
            .download(session.share(), remote, local, progress)
            .await;
        Self::finish(session, result).await
    }

    /// Upload `local` to `remote`; the local file is removed on success.
    pub async fn upload_file(
        &self,
        profile: &SmbConnectionProfile,
        local: &Path,
        remote: &str,
        progress: Option<&dyn ProgressSink>,
    ) -> SmbResult<TransferResult> {
        let _gate = self.lock.acquire("upload_file").await;
        let mut session = self.factory.open(profile).await?;
        let result = TransferEngine::new(&self.config)
            .upload(session.share(), local, remote, progress)
            .await;
        Self::finish(session, result).await
    }

    pub async fn download_folder(
        &self,
        profile: &SmbConnectionProfile,
        remote: &str,
        local: &Path,
        progress: Option<&dyn ProgressSink>,
    ) -> SmbResult<FolderTransferSummary> {
        let _gate = self.lock.acquire("download_folder").await;
        let mut session = self.factory.open(profile).await?;
        let result = FolderTransferEngine::new(&self.config)
            .download(session.share(), remote, local, progress)
            .await;
        Self::finish(session, result).await
    }

    /// Folder download that stops between files, or during a retry
    /// backoff, once `token` is cancelled.
    pub async fn download_folder_with_cancel(
        &self,
        profile: &SmbConnectionProfile,
        remote: &str,
        local: &Path,
        progress: Option<&dyn ProgressSink>,
        token: &CancellationToken,
    ) -> SmbResult<FolderTransferSummary> {
        let _gate = self.lock.acquire("download_folder").await;
        let mut session = self.factory.open(profile).await?;
        let result = FolderTransferEngine::new(&self.config)
            .with_cancel(token)
            .download(session.share(), remote, local, progress)
            .await;
        Self::finish(session, result).await
    }
}

//! Whole-directory download built on the single-file transfer path.

use crate::smb::directory;
use crate::smb::error::{SmbError, SmbResult};
use crate::smb::path;
use crate::smb::progress::ProgressSink;
use crate::smb::protocol::ShareHandle;
use crate::smb::transfer::TransferEngine;
use crate::smb::types::*;
use log::info;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::sync::CancellationToken;

pub struct FolderTransferEngine<'a> {
    config: &'a SmbEngineConfig,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> FolderTransferEngine<'a> {
    pub fn new(config: &'a SmbEngineConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Poll `token` between files and during retry backoff.
    pub fn with_cancel(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Mirror `remote` into `local`. The first file that exhausts its
    /// retries aborts the walk; files already written stay on disk.
    pub async fn download(
        &self,
        share: &mut dyn ShareHandle,
        remote: &str,
        local: &Path,
        progress: Option<&dyn ProgressSink>,
    ) -> SmbResult<FolderTransferSummary> {
        let remote = path::normalize_path(remote);
        if !share.folder_exists(&remote).await? {
            return Err(SmbError::not_found(&remote));
        }
        fs::create_dir_all(local).await?;

        let mut transfer = TransferEngine::new(self.config);
        if let Some(token) = self.cancel {
            transfer = transfer.with_cancel(token);
        }

        let mut summary = FolderTransferSummary::default();
        let mut pending: Vec<(String, PathBuf)> = vec![(remote.clone(), local.to_path_buf())];

        while let Some((dir, local_dir)) = pending.pop() {
            for entry in directory::read_dir(share, &dir).await? {
                if self.cancel.is_some_and(|t| t.is_cancelled()) {
                    return Err(SmbError::Cancelled);
                }
                // Names come from the server; never let one leave `local`.
                if let Err(e) = path::validate_name(&entry.name) {
                    return Err(SmbError::FolderTransfer {
                        file: entry.path,
                        completed: summary.files,
                        source: Box::new(e),
                    });
                }
                let local_path = local_dir.join(&entry.name);
                if entry.is_dir() {
                    fs::create_dir_all(&local_path).await?;
                    summary.directories += 1;
                    pending.push((entry.path, local_path));
                    continue;
                }
                match transfer
                    .download(share, &entry.path, &local_path, progress)
                    .await
                {
                    Ok(result) => {
                        summary.files += 1;
                        summary.bytes += result.bytes_total;
                    }
                    Err(SmbError::Cancelled) => return Err(SmbError::Cancelled),
                    Err(e) => {
                        return Err(SmbError::FolderTransfer {
                            file: entry.path,
                            completed: summary.files,
                            source: Box::new(e),
                        })
                    }
                }
            }
        }

        info!(
            "SMB folder download {} → {}: {} file(s), {} dir(s), {} bytes",
            remote,
            local.display(),
            summary.files,
            summary.directories,
            summary.bytes
        );
        Ok(summary)
    }
}

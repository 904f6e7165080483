// ── Transfer engine – retrying downloads (resumable) & uploads ───────────────

use crate::smb::error::{SmbError, SmbResult};
use crate::smb::path;
use crate::smb::progress::{ProgressSink, ProgressTracker};
use crate::smb::protocol::{CreateDisposition, RemoteReader, RemoteWriter, ShareHandle};
use crate::smb::types::*;
use log::{info, warn};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Attempts per transfer, first try included.
pub const MAX_ATTEMPTS: u32 = 3;

pub struct TransferEngine<'a> {
    config: &'a SmbEngineConfig,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> TransferEngine<'a> {
    pub fn new(config: &'a SmbEngineConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Let `token` interrupt retry backoff sleeps.
    pub fn with_cancel(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    // ── Download ─────────────────────────────────────────────────────────────

    /// Download `remote` to `local`. A failed attempt leaves its partial
    /// local file in place; the next attempt appends to it from its length.
    pub async fn download(
        &self,
        share: &mut dyn ShareHandle,
        remote: &str,
        local: &Path,
        progress: Option<&dyn ProgressSink>,
    ) -> SmbResult<TransferResult> {
        let remote = path::normalize_path(remote);
        // The size drives the short-transfer check; without it the
        // download does not start.
        let total = match share.metadata(&remote).await {
            Ok(meta) if !meta.is_directory => Some(meta.size),
            Ok(_) | Err(SmbError::NotFound { .. }) => return Err(SmbError::not_found(&remote)),
            Err(e) => {
                warn!("SMB download {}: size query failed: {}", remote, e);
                return Err(e);
            }
        };
        let started = Instant::now();

        let mut last_error: Option<SmbError> = None;
        let mut attempts = 0;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                self.backoff(attempt).await?;
            }
            attempts = attempt + 1;

            match self
                .download_attempt(share, &remote, local, attempt, total, progress)
                .await
            {
                Ok((bytes_total, resumed_from)) => {
                    info!(
                        "SMB download {} → {} complete: {} bytes (attempt {}, resumed from {})",
                        remote,
                        local.display(),
                        bytes_total,
                        attempts,
                        resumed_from
                    );
                    return Ok(TransferResult {
                        direction: TransferDirection::Download,
                        remote_path: remote,
                        local_path: local.display().to_string(),
                        bytes_total,
                        resumed_from,
                        attempts,
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Err(e) => {
                    warn!(
                        "SMB download {} attempt {}/{} failed: {}",
                        remote, attempts, MAX_ATTEMPTS, e
                    );
                    let retry = e.is_transient();
                    last_error = Some(e);
                    if !retry {
                        break;
                    }
                }
            }
        }

        Err(SmbError::Transfer {
            path: remote,
            attempts,
            source: Box::new(
                last_error.unwrap_or_else(|| SmbError::protocol("download failed")),
            ),
        })
    }

    async fn download_attempt(
        &self,
        share: &mut dyn ShareHandle,
        remote: &str,
        local: &Path,
        attempt: u32,
        total: Option<u64>,
        progress: Option<&dyn ProgressSink>,
    ) -> SmbResult<(u64, u64)> {
        let mut offset = 0;
        if attempt > 0 {
            if let Ok(meta) = fs::metadata(local).await {
                offset = meta.len();
            }
        }
        // A partial file longer than the source cannot be a prefix of it.
        if total.is_some_and(|t| offset > t) {
            offset = 0;
        }

        let mut reader = share.open_read(remote).await?;
        let tracker = ProgressTracker::new(progress, remote, total, offset);
        let copied = self
            .copy_to_local(reader.as_mut(), local, offset, &tracker)
            .await;
        if let Err(e) = reader.close().await {
            warn!("SMB download {}: closing read handle: {}", remote, e);
        }
        let transferred = copied?;

        if let Some(t) = total {
            if transferred != t {
                return Err(SmbError::protocol(format!(
                    "short transfer of {}: {} of {} bytes",
                    remote, transferred, t
                )));
            }
        }
        Ok((transferred, offset))
    }

    async fn copy_to_local(
        &self,
        reader: &mut dyn RemoteReader,
        local: &Path,
        offset: u64,
        tracker: &ProgressTracker<'_>,
    ) -> SmbResult<u64> {
        let mut file = if offset > 0 {
            fs::OpenOptions::new().append(true).open(local).await?
        } else {
            if let Some(parent) = local.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).await?;
                }
            }
            fs::File::create(local).await?
        };

        if offset > 0 {
            let skipped = reader.skip(offset).await?;
            if skipped != offset {
                return Err(SmbError::protocol(format!(
                    "cannot resume at byte {}: remote stream ended at {}",
                    offset, skipped
                )));
            }
        }

        let mut transferred = offset;
        let mut buf = vec![0u8; self.config.chunk_size];
        let outcome: SmbResult<()> = loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(e),
            };
            if let Err(e) = file.write_all(&buf[..n]).await {
                break Err(e.into());
            }
            transferred += n as u64;
            tracker.report(transferred);
        };

        // Flush on every path: whatever reached the file is the next resume point.
        let flushed = file.flush().await;
        outcome?;
        flushed?;
        Ok(transferred)
    }

    // ── Upload ───────────────────────────────────────────────────────────────

    /// Upload `local` to `remote`, overwriting. Every attempt restarts from
    /// byte zero. The local file is removed once the upload succeeded.
    pub async fn upload(
        &self,
        share: &mut dyn ShareHandle,
        local: &Path,
        remote: &str,
        progress: Option<&dyn ProgressSink>,
    ) -> SmbResult<TransferResult> {
        let remote = path::normalize_path(remote);
        if remote.is_empty() {
            return Err(SmbError::invalid_input("upload target must name a file"));
        }
        let total = match fs::metadata(local).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => {
                return Err(SmbError::invalid_input(format!(
                    "{} is not a regular file",
                    local.display()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SmbError::not_found(local.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let started = Instant::now();

        let mut last_error: Option<SmbError> = None;
        let mut attempts = 0;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                self.backoff(attempt).await?;
            }
            attempts = attempt + 1;

            match self.upload_attempt(share, local, &remote, total, progress).await {
                Ok(sent) => {
                    info!(
                        "SMB upload {} → {} complete: {} bytes (attempt {})",
                        local.display(),
                        remote,
                        sent,
                        attempts
                    );
                    if let Err(e) = fs::remove_file(local).await {
                        warn!(
                            "SMB upload {}: could not remove staged local file: {}",
                            local.display(),
                            e
                        );
                    }
                    return Ok(TransferResult {
                        direction: TransferDirection::Upload,
                        remote_path: remote,
                        local_path: local.display().to_string(),
                        bytes_total: sent,
                        resumed_from: 0,
                        attempts,
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Err(e) => {
                    warn!(
                        "SMB upload {} attempt {}/{} failed: {}",
                        remote, attempts, MAX_ATTEMPTS, e
                    );
                    let retry = e.is_transient();
                    last_error = Some(e);
                    if !retry {
                        break;
                    }
                }
            }
        }

        Err(SmbError::Transfer {
            path: remote,
            attempts,
            source: Box::new(last_error.unwrap_or_else(|| SmbError::protocol("upload failed"))),
        })
    }

    async fn upload_attempt(
        &self,
        share: &mut dyn ShareHandle,
        local: &Path,
        remote: &str,
        total: u64,
        progress: Option<&dyn ProgressSink>,
    ) -> SmbResult<u64> {
        let mut file = fs::File::open(local).await?;
        let mut writer = share
            .open_write(remote, CreateDisposition::Overwrite)
            .await?;
        let tracker = ProgressTracker::new(progress, remote, Some(total), 0);

        match self.copy_to_remote(&mut file, writer.as_mut(), &tracker).await {
            Ok(sent) => {
                writer.close().await?;
                Ok(sent)
            }
            Err(e) => {
                if let Err(close_err) = writer.close().await {
                    warn!("SMB upload {}: closing write handle: {}", remote, close_err);
                }
                Err(e)
            }
        }
    }

    async fn copy_to_remote(
        &self,
        file: &mut fs::File,
        writer: &mut dyn RemoteWriter,
        tracker: &ProgressTracker<'_>,
    ) -> SmbResult<u64> {
        let mut sent = 0u64;
        let mut buf = vec![0u8; self.config.chunk_size];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            sent += n as u64;
            tracker.report(sent);
        }
        Ok(sent)
    }

    // ── Backoff ──────────────────────────────────────────────────────────────

    /// Sleep `retry_backoff_ms × attempt` before retry number `attempt`,
    /// returning early with `Cancelled` if the token fires.
    async fn backoff(&self, attempt: u32) -> SmbResult<()> {
        let delay = Duration::from_millis(self.config.retry_backoff_ms * attempt as u64);
        match self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => Err(SmbError::Cancelled),
                    _ = tokio::time::sleep(delay) => Ok(()),
                }
            }
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

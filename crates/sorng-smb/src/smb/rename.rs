//! Rename within a directory.
//!
//! Directories use the server's native rename. Files are copied to the new
//! name, verified by byte count and existence, and only then is the source
//! removed: at every point at least one complete copy exists.

use crate::smb::error::{SmbError, SmbResult};
use crate::smb::path;
use crate::smb::protocol::{CreateDisposition, RemoteReader, RemoteWriter, ShareHandle};
use log::{info, warn};

pub struct RenameEngine {
    chunk_size: usize,
}

impl RenameEngine {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Rename `source` to `new_name` in the same parent directory and
    /// return the new share-relative path.
    pub async fn rename(
        &self,
        share: &mut dyn ShareHandle,
        source: &str,
        new_name: &str,
    ) -> SmbResult<String> {
        let source = path::normalize_path(source);
        if source.is_empty() {
            return Err(SmbError::invalid_input("cannot rename the share root"));
        }
        path::validate_name(new_name)?;
        let target = path::join(&path::parent(&source), new_name);

        let is_file = share.file_exists(&source).await?;
        if !is_file && !share.folder_exists(&source).await? {
            return Err(SmbError::not_found(&source));
        }
        if share.file_exists(&target).await? || share.folder_exists(&target).await? {
            return Err(SmbError::already_exists(&target));
        }

        if is_file {
            self.rename_file(share, &source, &target).await?;
        } else {
            share.rename_directory(&source, &target).await?;
        }
        info!("SMB renamed {} → {}", source, target);
        Ok(target)
    }

    async fn rename_file(
        &self,
        share: &mut dyn ShareHandle,
        source: &str,
        target: &str,
    ) -> SmbResult<()> {
        let expected = share.metadata(source).await?.size;

        let mut reader = share.open_read(source).await?;
        let mut writer = match share.open_write(target, CreateDisposition::CreateNew).await {
            Ok(writer) => writer,
            Err(e) => {
                let _ = reader.close().await;
                return Err(e);
            }
        };

        // From here on the target exists; any failure removes it again.
        let copied = self.copy(reader.as_mut(), writer.as_mut()).await;
        if let Err(e) = reader.close().await {
            warn!("SMB rename: closing {}: {}", source, e);
        }
        let closed = writer.close().await;

        let verified = match (copied, closed) {
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
            (Ok(actual), Ok(())) if actual != expected => Err(SmbError::Integrity {
                path: source.to_string(),
                expected,
                actual,
            }),
            (Ok(_), Ok(())) => match share.file_exists(target).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(SmbError::protocol(format!(
                    "{} missing after copy",
                    target
                ))),
                Err(e) => Err(e),
            },
        };

        if let Err(e) = verified {
            if let Err(cleanup) = share.remove(target).await {
                warn!(
                    "SMB rename: could not remove partial copy {}: {}",
                    target, cleanup
                );
            }
            return Err(e);
        }

        share.remove(source).await
    }

    async fn copy(
        &self,
        reader: &mut dyn RemoteReader,
        writer: &mut dyn RemoteWriter,
    ) -> SmbResult<u64> {
        let mut total = 0u64;
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            writer.write_all(&buf[..n]).await?;
            total += n as u64;
        }
    }
}

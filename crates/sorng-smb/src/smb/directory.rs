//! Directory operations — list, mkdir, delete, exists.

use crate::smb::error::{SmbError, SmbResult};
use crate::smb::path;
use crate::smb::protocol::{RawEntry, ShareHandle};
use crate::smb::types::*;
use log::info;
use std::cmp::Ordering;

/// Convert a listing row of `dir` into an entry with a share-relative path.
pub fn to_entry(dir: &str, raw: RawEntry) -> SmbEntry {
    SmbEntry {
        path: path::join(dir, &raw.name),
        kind: if raw.is_directory {
            SmbEntryKind::Directory
        } else {
            SmbEntryKind::File
        },
        size: if raw.is_directory { 0 } else { raw.size },
        modified: raw.modified,
        name: raw.name,
    }
}

/// Entries of `dir` without the `.` / `..` pseudo-entries, in server order.
pub async fn read_dir(share: &mut dyn ShareHandle, dir: &str) -> SmbResult<Vec<SmbEntry>> {
    let raw = share.list(dir).await?;
    Ok(raw
        .into_iter()
        .filter(|r| !path::is_pseudo_entry(&r.name))
        .map(|r| to_entry(dir, r))
        .collect())
}

/// List a directory with filtering and sorting applied.
pub async fn list_directory(
    share: &mut dyn ShareHandle,
    dir: &str,
    options: &ListOptions,
) -> SmbResult<Vec<SmbEntry>> {
    let dir = path::normalize_path(dir);
    if !share.folder_exists(&dir).await? {
        return Err(SmbError::not_found(&dir));
    }
    let mut entries = read_dir(share, &dir).await?;

    if let Some(ref filter) = options.filter {
        let pattern = glob::Pattern::new(filter).map_err(|e| {
            SmbError::invalid_input(format!("Invalid filter '{}': {}", filter, e))
        })?;
        entries.retain(|e| pattern.matches(&e.name));
    }

    if !options.show_hidden {
        entries.retain(|e| !e.is_hidden());
    }

    sort_entries(&mut entries, options);
    Ok(entries)
}

fn sort_entries(entries: &mut [SmbEntry], options: &ListOptions) {
    entries.sort_by(|a, b| {
        if options.directories_first {
            let dir_cmp = b.is_dir().cmp(&a.is_dir());
            if dir_cmp != Ordering::Equal {
                return dir_cmp;
            }
        }

        let cmp = match options.sort_by {
            SmbSortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SmbSortField::Size => a.size.cmp(&b.size),
            SmbSortField::Modified => a.modified.cmp(&b.modified),
            SmbSortField::Kind => a.is_dir().cmp(&b.is_dir()),
        };

        if options.descending {
            cmp.reverse()
        } else {
            cmp
        }
    });
}

/// Whether anything (file or directory) exists at `target`.
pub async fn exists(share: &mut dyn ShareHandle, target: &str) -> SmbResult<bool> {
    let target = path::normalize_path(target);
    Ok(share.file_exists(&target).await? || share.folder_exists(&target).await?)
}

/// Create a single directory. Fails if anything already sits at `target`.
pub async fn create_directory(share: &mut dyn ShareHandle, target: &str) -> SmbResult<()> {
    let target = path::normalize_path(target);
    if target.is_empty() {
        return Err(SmbError::already_exists("/"));
    }
    path::validate_name(&path::file_name(&target))?;
    if exists(share, &target).await? {
        return Err(SmbError::already_exists(&target));
    }
    share.create_directory(&target).await?;
    info!("SMB created directory: {}", target);
    Ok(())
}

/// Delete a file, or a directory and everything below it.
pub async fn delete(share: &mut dyn ShareHandle, target: &str) -> SmbResult<()> {
    let target = path::normalize_path(target);
    if target.is_empty() {
        return Err(SmbError::invalid_input("refusing to delete the share root"));
    }
    if share.file_exists(&target).await? {
        share.remove(&target).await?;
        info!("SMB deleted file: {}", target);
    } else if share.folder_exists(&target).await? {
        share.remove_directory_recursive(&target).await?;
        info!("SMB deleted directory tree: {}", target);
    } else {
        return Err(SmbError::not_found(&target));
    }
    Ok(())
}

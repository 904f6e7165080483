//! Cancellable depth-first search.
//!
//! Traversal keeps its own stack of open directory listings instead of
//! recursing, so deep trees cost heap, not call stack. Cancellation is
//! polled before every listing and before every entry; a cancelled search
//! returns what it had collected so far.

use crate::smb::directory;
use crate::smb::matcher::NameMatcher;
use crate::smb::path;
use crate::smb::protocol::ShareHandle;
use crate::smb::types::*;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

/// One listed directory and the position of the next entry to visit.
struct Frame {
    entries: Vec<SmbEntry>,
    next: usize,
}

pub struct SearchEngine<'a> {
    request: &'a SmbSearchRequest,
    matcher: NameMatcher,
    token: &'a CancellationToken,
    max_results: Option<usize>,
}

impl<'a> SearchEngine<'a> {
    /// `max_results` applies when the request carries no cap of its own.
    pub fn new(
        request: &'a SmbSearchRequest,
        token: &'a CancellationToken,
        max_results: Option<usize>,
    ) -> Self {
        Self {
            matcher: NameMatcher::new(&request.query),
            request,
            token,
            max_results: request.max_results.or(max_results),
        }
    }

    /// Search below `start`. Never fails: listing errors are skipped and
    /// counted, cancellation yields a partial outcome.
    pub async fn run(&self, share: &mut dyn ShareHandle, start: &str) -> SearchOutcome {
        let start = path::normalize_path(start);
        let mut outcome = SearchOutcome::default();
        let mut stack: Vec<Frame> = Vec::new();

        if let Some(frame) = self.open(share, &start, &mut outcome).await {
            stack.push(frame);
        }

        while let Some(frame) = stack.last_mut() {
            if self.token.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let entry = match frame.entries.get(frame.next) {
                Some(entry) => entry.clone(),
                None => {
                    stack.pop();
                    continue;
                }
            };
            frame.next += 1;

            if self.request.type_filter.accepts(entry.kind) && self.matcher.matches(&entry.name)
            {
                // Truncated only when a match is actually left out.
                if self.max_results.is_some_and(|cap| outcome.entries.len() >= cap) {
                    outcome.truncated = true;
                    break;
                }
                outcome.entries.push(entry.clone());
            }

            if entry.is_dir() && self.request.include_subfolders {
                if let Some(child) = self.open(share, &entry.path, &mut outcome).await {
                    stack.push(child);
                }
                if outcome.cancelled {
                    break;
                }
            }
        }

        if outcome.cancelled {
            debug!(
                "SMB search '{}' under '{}' cancelled with {} partial result(s)",
                self.request.query,
                start,
                outcome.entries.len()
            );
        }
        outcome
    }

    /// List `dir` into a new frame. `None` when cancelled or the listing
    /// failed; a failure is logged and counted, cancellation is recorded.
    async fn open(
        &self,
        share: &mut dyn ShareHandle,
        dir: &str,
        outcome: &mut SearchOutcome,
    ) -> Option<Frame> {
        if self.token.is_cancelled() {
            outcome.cancelled = true;
            return None;
        }
        match directory::read_dir(share, dir).await {
            Ok(entries) => Some(Frame { entries, next: 0 }),
            Err(_) if self.token.is_cancelled() => {
                outcome.cancelled = true;
                None
            }
            Err(e) => {
                warn!("SMB search: skipping '{}': {}", dir, e);
                outcome.skipped_directories += 1;
                None
            }
        }
    }
}

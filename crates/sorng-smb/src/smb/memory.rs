//! In-process share server implementing the protocol seam.
//!
//! Holds one file tree per share, a credential table and a guest policy,
//! plus fault injection (unreachable server, failing / truncated reads,
//! failing writes, failing listings) and counters describing how the
//! engine drove it. The test suite runs every engine against it.

use crate::smb::error::{SmbError, SmbResult};
use crate::smb::path;
use crate::smb::protocol::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

type ListHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone)]
enum Node {
    File {
        data: Vec<u8>,
        modified: DateTime<Utc>,
    },
    Dir {
        modified: DateTime<Utc>,
    },
}

#[derive(Debug, Default)]
struct ShareTree {
    nodes: BTreeMap<String, Node>,
}

impl ShareTree {
    fn is_dir(&self, p: &str) -> bool {
        p.is_empty() || matches!(self.nodes.get(p), Some(Node::Dir { .. }))
    }

    fn is_file(&self, p: &str) -> bool {
        matches!(self.nodes.get(p), Some(Node::File { .. }))
    }

    fn exists(&self, p: &str) -> bool {
        p.is_empty() || self.nodes.contains_key(p)
    }

    fn ensure_parents(&mut self, p: &str) {
        let mut dir = path::parent(p);
        while !dir.is_empty() {
            self.nodes.entry(dir.clone()).or_insert(Node::Dir {
                modified: Utc::now(),
            });
            dir = path::parent(&dir);
        }
    }

    fn is_within(candidate: &str, dir: &str) -> bool {
        candidate == dir || candidate.starts_with(&format!("{}/", dir))
    }
}

#[derive(Debug, Clone, Copy)]
struct ReadFault {
    remaining: u32,
    after_bytes: u64,
}

#[derive(Debug, Clone, Copy)]
struct WriteFault {
    remaining: u32,
    after_bytes: u64,
}

/// Counters describing how the engine drove the server.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub connects: u32,
    /// Identity of every successful authentication, `<guest>` for anonymous.
    pub identities: Vec<String>,
    pub anonymous_logins: u32,
    /// Connections currently open.
    pub open_sessions: u32,
    /// Highest number of connections open at the same time.
    pub peak_sessions: u32,
    /// Read / write streams opened and not yet closed.
    pub open_streams: u32,
    pub listings: u32,
    pub read_opens: u32,
    pub write_opens: u32,
    /// Offsets passed to `skip` on read streams (download resume points).
    pub resume_offsets: Vec<u64>,
    /// Total bytes accepted by write streams.
    pub bytes_written: u64,
    /// (opened, closed) instants of every closed connection.
    pub session_spans: Vec<(Instant, Instant)>,
}

struct ServerState {
    reachable: bool,
    allow_guest: bool,
    users: HashMap<String, String>,
    shares: HashMap<String, ShareTree>,
    read_faults: HashMap<(String, String), ReadFault>,
    truncated_reads: HashMap<(String, String), u64>,
    write_fault: Option<WriteFault>,
    failing_listings: HashSet<(String, String)>,
    failing_metadata: HashSet<(String, String)>,
    latency: Option<Duration>,
    list_hook: Option<ListHook>,
    stats: ServerStats,
}

/// Cheaply clonable handle to one in-memory server.
#[derive(Clone)]
pub struct MemoryShareServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for MemoryShareServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryShareServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                reachable: true,
                allow_guest: false,
                users: HashMap::new(),
                shares: HashMap::new(),
                read_faults: HashMap::new(),
                truncated_reads: HashMap::new(),
                write_fault: None,
                failing_listings: HashSet::new(),
                failing_metadata: HashSet::new(),
                latency: None,
                list_hook: None,
                stats: ServerStats::default(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Transport to hand to `SmbService`.
    pub fn transport(&self) -> Arc<dyn ShareTransport> {
        Arc::new(MemoryTransport {
            server: self.clone(),
        })
    }

    // ── Setup ───────────────────────────────────────────────────────

    pub fn add_share(&self, share: &str) -> &Self {
        self.state()
            .shares
            .entry(path::normalize_share_name(share))
            .or_default();
        self
    }

    pub fn add_user(&self, username: &str, password: &str) -> &Self {
        self.state()
            .users
            .insert(username.to_string(), password.to_string());
        self
    }

    pub fn set_allow_guest(&self, allow: bool) -> &Self {
        self.state().allow_guest = allow;
        self
    }

    pub fn set_reachable(&self, reachable: bool) -> &Self {
        self.state().reachable = reachable;
        self
    }

    /// Delay applied to connect and every listing.
    pub fn set_latency(&self, latency: Duration) -> &Self {
        self.state().latency = Some(latency);
        self
    }

    /// Called with the directory path on every listing, outside the
    /// server lock.
    pub fn on_list(&self, hook: impl Fn(&str) + Send + Sync + 'static) -> &Self {
        self.state().list_hook = Some(Arc::new(hook));
        self
    }

    /// Create (or replace) a file, creating missing parent directories.
    pub fn put_file(&self, share: &str, file: &str, data: &[u8]) -> &Self {
        let file = path::normalize_path(file);
        let mut state = self.state();
        let tree = state
            .shares
            .entry(path::normalize_share_name(share))
            .or_default();
        tree.ensure_parents(&file);
        tree.nodes.insert(
            file,
            Node::File {
                data: data.to_vec(),
                modified: Utc::now(),
            },
        );
        self
    }

    pub fn put_dir(&self, share: &str, dir: &str) -> &Self {
        let dir = path::normalize_path(dir);
        let mut state = self.state();
        let tree = state
            .shares
            .entry(path::normalize_share_name(share))
            .or_default();
        tree.ensure_parents(&dir);
        tree.nodes.insert(
            dir,
            Node::Dir {
                modified: Utc::now(),
            },
        );
        self
    }

    // ── Fault injection ─────────────────────────────────────────────

    /// The next `times` read streams opened on `file` fail after
    /// delivering `after_bytes` bytes (skipped bytes not counted).
    pub fn fail_reads(&self, share: &str, file: &str, times: u32, after_bytes: u64) -> &Self {
        self.state().read_faults.insert(
            key(share, file),
            ReadFault {
                remaining: times,
                after_bytes,
            },
        );
        self
    }

    /// Read streams on `file` report end-of-file after `bytes` bytes.
    pub fn truncate_reads(&self, share: &str, file: &str, bytes: u64) -> &Self {
        self.state().truncated_reads.insert(key(share, file), bytes);
        self
    }

    /// The next `times` write streams fail once they have accepted
    /// `after_bytes` bytes.
    pub fn fail_writes(&self, times: u32, after_bytes: u64) -> &Self {
        self.state().write_fault = Some(WriteFault {
            remaining: times,
            after_bytes,
        });
        self
    }

    /// Listing `dir` fails with an access-denied protocol error.
    pub fn fail_listing(&self, share: &str, dir: &str) -> &Self {
        self.state().failing_listings.insert(key(share, dir));
        self
    }

    /// Metadata queries on `p` fail with an access-denied protocol error.
    pub fn fail_metadata(&self, share: &str, p: &str) -> &Self {
        self.state().failing_metadata.insert(key(share, p));
        self
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn read_file(&self, share: &str, file: &str) -> Option<Vec<u8>> {
        let state = self.state();
        match state
            .shares
            .get(&path::normalize_share_name(share))?
            .nodes
            .get(&path::normalize_path(file))?
        {
            Node::File { data, .. } => Some(data.clone()),
            Node::Dir { .. } => None,
        }
    }

    pub fn exists(&self, share: &str, p: &str) -> bool {
        self.state()
            .shares
            .get(&path::normalize_share_name(share))
            .is_some_and(|t| t.exists(&path::normalize_path(p)))
    }

    pub fn is_dir(&self, share: &str, p: &str) -> bool {
        self.state()
            .shares
            .get(&path::normalize_share_name(share))
            .is_some_and(|t| t.is_dir(&path::normalize_path(p)))
    }

    pub fn stats(&self) -> ServerStats {
        self.state().stats.clone()
    }

    async fn simulate_latency(&self) {
        let latency = self.state().latency;
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
    }
}

fn key(share: &str, p: &str) -> (String, String) {
    (path::normalize_share_name(share), path::normalize_path(p))
}

// ─── Transport / connection / session ────────────────────────────────

struct MemoryTransport {
    server: MemoryShareServer,
}

#[async_trait]
impl ShareTransport for MemoryTransport {
    async fn connect(&self, server: &str) -> SmbResult<Box<dyn ShareConnection>> {
        self.server.simulate_latency().await;
        let mut state = self.server.state();
        if !state.reachable {
            return Err(SmbError::connection(format!(
                "{}: connection refused",
                server
            )));
        }
        state.stats.connects += 1;
        state.stats.open_sessions += 1;
        state.stats.peak_sessions = state.stats.peak_sessions.max(state.stats.open_sessions);
        Ok(Box::new(MemoryConnection {
            server: self.server.clone(),
            opened: Instant::now(),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    server: MemoryShareServer,
    opened: Instant,
    closed: bool,
}

#[async_trait]
impl ShareConnection for MemoryConnection {
    async fn authenticate(
        &mut self,
        credentials: &Credentials,
    ) -> SmbResult<Box<dyn AuthenticatedSession>> {
        let mut state = self.server.state();
        match credentials {
            Credentials::Anonymous => {
                if !state.allow_guest {
                    return Err(SmbError::authentication("guest access disabled"));
                }
                state.stats.anonymous_logins += 1;
            }
            Credentials::Named {
                username, password, ..
            } => {
                if state.users.get(username) != Some(password) {
                    return Err(SmbError::authentication("NT_STATUS_LOGON_FAILURE"));
                }
            }
        }
        state.stats.identities.push(credentials.display_user());
        Ok(Box::new(MemorySession {
            server: self.server.clone(),
        }))
    }

    async fn close(&mut self) -> SmbResult<()> {
        self.release();
        Ok(())
    }
}

impl MemoryConnection {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = self.server.state();
            state.stats.open_sessions = state.stats.open_sessions.saturating_sub(1);
            state.stats.session_spans.push((self.opened, Instant::now()));
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}

struct MemorySession {
    server: MemoryShareServer,
}

#[async_trait]
impl AuthenticatedSession for MemorySession {
    async fn attach_share(&mut self, share: &str) -> SmbResult<Box<dyn ShareHandle>> {
        let name = path::normalize_share_name(share);
        if !self.server.state().shares.contains_key(&name) {
            return Err(SmbError::share_unavailable(&name, "NT_STATUS_BAD_NETWORK_NAME"));
        }
        Ok(Box::new(MemoryShare {
            server: self.server.clone(),
            share: name,
        }))
    }

    async fn close(&mut self) -> SmbResult<()> {
        Ok(())
    }
}

// ─── Share handle ────────────────────────────────────────────────────

struct MemoryShare {
    server: MemoryShareServer,
    share: String,
}

impl MemoryShare {
    fn with_tree<T>(&self, f: impl FnOnce(&mut ShareTree) -> SmbResult<T>) -> SmbResult<T> {
        let mut state = self.server.state();
        let tree = state
            .shares
            .get_mut(&self.share)
            .ok_or_else(|| SmbError::share_unavailable(&self.share, "share removed"))?;
        f(tree)
    }
}

fn raw_entry(name: &str, node: &Node) -> RawEntry {
    match node {
        Node::File { data, modified } => RawEntry {
            name: name.to_string(),
            is_directory: false,
            size: data.len() as u64,
            modified: Some(*modified),
        },
        Node::Dir { modified } => RawEntry {
            name: name.to_string(),
            is_directory: true,
            size: 0,
            modified: Some(*modified),
        },
    }
}

#[async_trait]
impl ShareHandle for MemoryShare {
    async fn list(&mut self, dir: &str) -> SmbResult<Vec<RawEntry>> {
        self.server.simulate_latency().await;
        let hook = {
            let mut state = self.server.state();
            state.stats.listings += 1;
            if state
                .failing_listings
                .contains(&(self.share.clone(), dir.to_string()))
            {
                return Err(SmbError::protocol(format!(
                    "NT_STATUS_ACCESS_DENIED listing \\{}",
                    dir
                )));
            }
            state.list_hook.clone()
        };
        if let Some(hook) = hook {
            hook(dir);
        }
        self.with_tree(|tree| {
            if !tree.is_dir(dir) {
                return Err(SmbError::not_found(dir));
            }
            let now = Utc::now();
            let mut out = vec![
                RawEntry {
                    name: ".".into(),
                    is_directory: true,
                    size: 0,
                    modified: Some(now),
                },
                RawEntry {
                    name: "..".into(),
                    is_directory: true,
                    size: 0,
                    modified: Some(now),
                },
            ];
            for (p, node) in &tree.nodes {
                if !p.is_empty() && path::parent(p) == dir {
                    out.push(raw_entry(&path::file_name(p), node));
                }
            }
            Ok(out)
        })
    }

    async fn metadata(&mut self, p: &str) -> SmbResult<RawEntry> {
        if self
            .server
            .state()
            .failing_metadata
            .contains(&(self.share.clone(), p.to_string()))
        {
            return Err(SmbError::protocol(format!(
                "NT_STATUS_ACCESS_DENIED querying \\{}",
                p
            )));
        }
        self.with_tree(|tree| {
            if p.is_empty() {
                return Ok(RawEntry {
                    name: String::new(),
                    is_directory: true,
                    size: 0,
                    modified: None,
                });
            }
            tree.nodes
                .get(p)
                .map(|node| raw_entry(&path::file_name(p), node))
                .ok_or_else(|| SmbError::not_found(p))
        })
    }

    async fn file_exists(&mut self, p: &str) -> SmbResult<bool> {
        self.with_tree(|tree| Ok(tree.is_file(p)))
    }

    async fn folder_exists(&mut self, p: &str) -> SmbResult<bool> {
        self.with_tree(|tree| Ok(tree.is_dir(p)))
    }

    async fn open_read(&mut self, p: &str) -> SmbResult<Box<dyn RemoteReader>> {
        let data = self.with_tree(|tree| match tree.nodes.get(p) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Dir { .. }) => Err(SmbError::protocol(format!(
                "NT_STATUS_FILE_IS_A_DIRECTORY: {}",
                p
            ))),
            None => Err(SmbError::not_found(p)),
        })?;
        let mut state = self.server.state();
        let k = (self.share.clone(), p.to_string());
        let fail_after = match state.read_faults.get_mut(&k) {
            Some(fault) if fault.remaining > 0 => {
                fault.remaining -= 1;
                Some(fault.after_bytes)
            }
            _ => None,
        };
        let limit = state
            .truncated_reads
            .get(&k)
            .copied()
            .unwrap_or(data.len() as u64)
            .min(data.len() as u64);
        state.stats.read_opens += 1;
        state.stats.open_streams += 1;
        Ok(Box::new(MemoryReader {
            server: self.server.clone(),
            data,
            limit,
            pos: 0,
            delivered: 0,
            fail_after,
            closed: false,
        }))
    }

    async fn open_write(
        &mut self,
        p: &str,
        disposition: CreateDisposition,
    ) -> SmbResult<Box<dyn RemoteWriter>> {
        let target = p.to_string();
        self.with_tree(|tree| {
            if !tree.is_dir(&path::parent(&target)) {
                return Err(SmbError::not_found(path::parent(&target)));
            }
            match tree.nodes.get(&target) {
                Some(Node::Dir { .. }) => return Err(SmbError::already_exists(&target)),
                Some(Node::File { .. }) if disposition == CreateDisposition::CreateNew => {
                    return Err(SmbError::already_exists(&target))
                }
                _ => {}
            }
            tree.nodes.insert(
                target.clone(),
                Node::File {
                    data: Vec::new(),
                    modified: Utc::now(),
                },
            );
            Ok(())
        })?;
        let mut state = self.server.state();
        let fail_after = match state.write_fault.as_mut() {
            Some(fault) if fault.remaining > 0 => {
                fault.remaining -= 1;
                Some(fault.after_bytes)
            }
            _ => None,
        };
        state.stats.write_opens += 1;
        state.stats.open_streams += 1;
        Ok(Box::new(MemoryWriter {
            server: self.server.clone(),
            share: self.share.clone(),
            path: target,
            written: 0,
            fail_after,
            closed: false,
        }))
    }

    async fn remove(&mut self, p: &str) -> SmbResult<()> {
        self.with_tree(|tree| match tree.nodes.get(p) {
            Some(Node::File { .. }) => {
                tree.nodes.remove(p);
                Ok(())
            }
            Some(Node::Dir { .. }) => Err(SmbError::protocol(format!(
                "NT_STATUS_FILE_IS_A_DIRECTORY: {}",
                p
            ))),
            None => Err(SmbError::not_found(p)),
        })
    }

    async fn remove_directory_recursive(&mut self, p: &str) -> SmbResult<()> {
        self.with_tree(|tree| {
            if p.is_empty() {
                return Err(SmbError::invalid_input("cannot remove the share root"));
            }
            if !matches!(tree.nodes.get(p), Some(Node::Dir { .. })) {
                return Err(SmbError::not_found(p));
            }
            tree.nodes.retain(|k, _| !ShareTree::is_within(k, p));
            Ok(())
        })
    }

    async fn create_directory(&mut self, p: &str) -> SmbResult<()> {
        self.with_tree(|tree| {
            if tree.exists(p) {
                return Err(SmbError::already_exists(p));
            }
            if !tree.is_dir(&path::parent(p)) {
                return Err(SmbError::not_found(path::parent(p)));
            }
            tree.nodes.insert(
                p.to_string(),
                Node::Dir {
                    modified: Utc::now(),
                },
            );
            Ok(())
        })
    }

    async fn rename_directory(&mut self, from: &str, to: &str) -> SmbResult<()> {
        self.with_tree(|tree| {
            if from.is_empty() || !tree.is_dir(from) {
                return Err(SmbError::not_found(from));
            }
            if tree.exists(to) {
                return Err(SmbError::already_exists(to));
            }
            if !tree.is_dir(&path::parent(to)) {
                return Err(SmbError::not_found(path::parent(to)));
            }
            let moved: Vec<String> = tree
                .nodes
                .keys()
                .filter(|k| ShareTree::is_within(k, from))
                .cloned()
                .collect();
            for old in moved {
                if let Some(node) = tree.nodes.remove(&old) {
                    let new_key = format!("{}{}", to, &old[from.len()..]);
                    tree.nodes.insert(new_key, node);
                }
            }
            Ok(())
        })
    }

    async fn close(&mut self) -> SmbResult<()> {
        Ok(())
    }
}

// ─── Streams ─────────────────────────────────────────────────────────

struct MemoryReader {
    server: MemoryShareServer,
    data: Vec<u8>,
    limit: u64,
    pos: u64,
    delivered: u64,
    fail_after: Option<u64>,
    closed: bool,
}

#[async_trait]
impl RemoteReader for MemoryReader {
    async fn read(&mut self, buf: &mut [u8]) -> SmbResult<usize> {
        let mut allowed = self.limit.saturating_sub(self.pos);
        if let Some(after) = self.fail_after {
            if self.delivered >= after {
                return Err(SmbError::protocol("NT_STATUS_CONNECTION_RESET"));
            }
            allowed = allowed.min(after - self.delivered);
        }
        let n = (buf.len() as u64).min(allowed) as usize;
        let start = self.pos as usize;
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        self.delivered += n as u64;
        Ok(n)
    }

    async fn skip(&mut self, bytes: u64) -> SmbResult<u64> {
        self.server.state().stats.resume_offsets.push(bytes);
        let skipped = bytes.min(self.limit.saturating_sub(self.pos));
        self.pos += skipped;
        Ok(skipped)
    }

    async fn close(&mut self) -> SmbResult<()> {
        self.release();
        Ok(())
    }
}

impl MemoryReader {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = self.server.state();
            state.stats.open_streams = state.stats.open_streams.saturating_sub(1);
        }
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        self.release();
    }
}

struct MemoryWriter {
    server: MemoryShareServer,
    share: String,
    path: String,
    written: u64,
    fail_after: Option<u64>,
    closed: bool,
}

#[async_trait]
impl RemoteWriter for MemoryWriter {
    async fn write_all(&mut self, buf: &[u8]) -> SmbResult<()> {
        let mut accept = buf.len();
        let mut fail = false;
        if let Some(after) = self.fail_after {
            let room = after.saturating_sub(self.written) as usize;
            if room < accept {
                accept = room;
                fail = true;
            }
        }
        let mut state = self.server.state();
        if let Some(Node::File { data, modified }) = state
            .shares
            .get_mut(&self.share)
            .and_then(|t| t.nodes.get_mut(&self.path))
        {
            data.extend_from_slice(&buf[..accept]);
            *modified = Utc::now();
        } else {
            return Err(SmbError::protocol(format!(
                "NT_STATUS_FILE_CLOSED: {}",
                self.path
            )));
        }
        state.stats.bytes_written += accept as u64;
        self.written += accept as u64;
        if fail {
            return Err(SmbError::protocol("NT_STATUS_CONNECTION_RESET"));
        }
        Ok(())
    }

    async fn close(&mut self) -> SmbResult<()> {
        self.release();
        Ok(())
    }
}

impl MemoryWriter {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = self.server.state();
            state.stats.open_streams = state.stats.open_streams.saturating_sub(1);
        }
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn attach(server: &MemoryShareServer) -> Box<dyn ShareHandle> {
        let mut conn = server.transport().connect("nas").await.unwrap();
        let mut session = conn.authenticate(&Credentials::Anonymous).await.unwrap();
        session.attach_share("media").await.unwrap()
    }

    #[tokio::test]
    async fn listing_includes_pseudo_entries_and_children() {
        let server = MemoryShareServer::new();
        server.set_allow_guest(true);
        server.put_file("media", "docs/a.txt", b"abc");
        server.put_dir("media", "docs/sub");
        let mut share = attach(&server).await;
        let names: Vec<String> = share
            .list("docs")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec![".", "..", "a.txt", "sub"]);
    }

    #[tokio::test]
    async fn read_fault_fires_after_configured_bytes() {
        let server = MemoryShareServer::new();
        server.set_allow_guest(true);
        server.put_file("media", "f.bin", &[7u8; 100]);
        server.fail_reads("media", "f.bin", 1, 40);
        let mut share = attach(&server).await;

        let mut reader = share.open_read("f.bin").await.unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 40);
        assert!(reader.read(&mut buf).await.is_err());
        reader.close().await.unwrap();

        // Fault consumed: the next stream is healthy.
        let mut reader = share.open_read("f.bin").await.unwrap();
        assert_eq!(reader.skip(90).await.unwrap(), 90);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 10);
        assert_eq!(server.stats().resume_offsets, vec![90]);
    }

    #[tokio::test]
    async fn create_new_refuses_existing_file() {
        let server = MemoryShareServer::new();
        server.set_allow_guest(true);
        server.put_file("media", "a.txt", b"x");
        let mut share = attach(&server).await;
        let err = share
            .open_write("a.txt", CreateDisposition::CreateNew)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SmbError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn rename_directory_moves_subtree() {
        let server = MemoryShareServer::new();
        server.set_allow_guest(true);
        server.put_file("media", "old/x/y.txt", b"y");
        let mut share = attach(&server).await;
        share.rename_directory("old", "new").await.unwrap();
        assert!(!server.exists("media", "old"));
        assert_eq!(server.read_file("media", "new/x/y.txt").unwrap(), b"y");
    }
}

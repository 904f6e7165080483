//! Production backend driving Samba's `smbclient`.
//!
//! `connect` probes TCP reachability, `authenticate` runs a share listing
//! with the credentials and `attach_share` a no-op command against the
//! share; after that every share operation is one `smbclient -c` run.
//! Passwords travel through the `PASSWD` environment variable, never the
//! argument list. Reads stream from `get <path> -` on stdout, writes feed
//! `put /dev/stdin <path>` on stdin.

use crate::smb::error::{SmbError, SmbResult};
use crate::smb::path;
use crate::smb::protocol::*;
use crate::smb::types::SmbEngineConfig;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

lazy_static! {
    /// One `ls` row: two-space indent, name, attribute letters, size, date.
    static ref LS_LINE: Option<Regex> = Regex::new(
        r"^  (?P<name>.+?)\s+(?P<attrs>[A-Z]*)\s+(?P<size>\d+)\s+(?P<date>[A-Z][a-z]{2} [A-Z][a-z]{2} +\d{1,2} \d{2}:\d{2}:\d{2} \d{4})\s*$"
    )
    .ok();
    static ref NT_STATUS: Option<Regex> = Regex::new(r"NT_STATUS_[A-Z_]+").ok();
}

// ─── Output parsing ──────────────────────────────────────────────────

/// Parse the rows of an `ls` listing. Summary and blank lines are skipped.
pub fn parse_ls(output: &str) -> Vec<RawEntry> {
    output.lines().filter_map(parse_ls_line).collect()
}

fn parse_ls_line(line: &str) -> Option<RawEntry> {
    let caps = LS_LINE.as_ref()?.captures(line)?;
    let attrs = &caps["attrs"];
    Some(RawEntry {
        name: caps["name"].to_string(),
        is_directory: attrs.contains('D'),
        size: caps["size"].parse().unwrap_or(0),
        modified: parse_ls_date(&caps["date"]),
    })
}

/// `Mon Mar  4 10:22:31 2024`. smbclient prints server-local time; it is
/// taken as UTC.
pub fn parse_ls_date(raw: &str) -> Option<DateTime<Utc>> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&collapsed, "%a %b %e %H:%M:%S %Y")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Map an `NT_STATUS_*` code to the error taxonomy. `subject` is the path
/// or share the failing command addressed.
pub fn status_error(code: &str, subject: &str, detail: &str) -> SmbError {
    match code {
        "NT_STATUS_OBJECT_NAME_NOT_FOUND"
        | "NT_STATUS_OBJECT_PATH_NOT_FOUND"
        | "NT_STATUS_NO_SUCH_FILE"
        | "NT_STATUS_NOT_FOUND" => SmbError::not_found(subject),
        "NT_STATUS_OBJECT_NAME_COLLISION" => SmbError::already_exists(subject),
        "NT_STATUS_ACCESS_DENIED" | "NT_STATUS_SHARING_VIOLATION" => {
            SmbError::permission_denied(subject)
        }
        "NT_STATUS_LOGON_FAILURE"
        | "NT_STATUS_WRONG_PASSWORD"
        | "NT_STATUS_ACCOUNT_DISABLED"
        | "NT_STATUS_ACCOUNT_LOCKED_OUT"
        | "NT_STATUS_PASSWORD_EXPIRED"
        | "NT_STATUS_NO_SUCH_USER" => SmbError::authentication(code),
        "NT_STATUS_BAD_NETWORK_NAME" => SmbError::share_unavailable(subject, code),
        "NT_STATUS_HOST_UNREACHABLE"
        | "NT_STATUS_NETWORK_UNREACHABLE"
        | "NT_STATUS_CONNECTION_REFUSED"
        | "NT_STATUS_IO_TIMEOUT" => SmbError::connection(format!("{}: {}", subject, code)),
        _ => SmbError::protocol(format!("{}: {}", code, detail.trim())),
    }
}

/// First failure status in command output. Listing rows are ignored so a
/// file named after a status code does not read as an error.
pub fn find_failure(output: &str, subject: &str) -> Option<SmbError> {
    let status = NT_STATUS.as_ref()?;
    output
        .lines()
        .filter(|line| !line.starts_with("  "))
        .find_map(|line| {
            status
                .find_iter(line)
                .map(|m| m.as_str())
                .find(|code| *code != "NT_STATUS_OK")
                .map(|code| status_error(code, subject, line))
        })
}

/// Double-quoted wire path for `-c` command strings. smbclient splits the
/// command string on every `;`, quoted or not, and has no escape for `"`;
/// paths carrying either (or a control character) are refused here rather
/// than run as a different command.
fn quoted(p: &str) -> SmbResult<String> {
    if let Some(c) = p.chars().find(|c| matches!(c, ';' | '"') || c.is_control()) {
        return Err(SmbError::invalid_input(format!(
            "'{}' contains {:?}, which smbclient cannot address",
            p, c
        )));
    }
    Ok(format!("\"{}\"", path::to_wire(p)))
}

fn check_output(output: &Output, subject: &str) -> SmbResult<String> {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if let Some(err) = find_failure(&format!("{}\n{}", stdout, stderr), subject) {
        return Err(err);
    }
    if !output.status.success() {
        let msg = if !stderr.trim().is_empty() { stderr } else { stdout };
        return Err(SmbError::protocol(format!(
            "smbclient exited with {}: {}",
            output.status,
            msg.trim()
        )));
    }
    Ok(stdout)
}

// ─── Command builder ─────────────────────────────────────────────────

#[derive(Clone)]
struct Invocation {
    binary: String,
    server: String,
    port: u16,
    timeout: Duration,
    credentials: Credentials,
}

impl Invocation {
    /// `smbclient` against a share, or `-L` against the server.
    fn command(&self, share: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.binary);
        match share {
            Some(share) => cmd.arg(format!("//{}/{}", self.server, share)),
            None => cmd.arg("-L").arg(format!("//{}", self.server)),
        };
        cmd.arg("-p").arg(self.port.to_string());
        match &self.credentials {
            Credentials::Anonymous => {
                cmd.arg("-N");
            }
            Credentials::Named {
                username,
                password,
                domain,
            } => {
                cmd.arg("-U").arg(username);
                if !domain.is_empty() {
                    cmd.arg("-W").arg(domain);
                }
                cmd.env("PASSWD", password);
            }
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn output(&self, mut cmd: Command) -> SmbResult<Output> {
        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => Err(SmbError::connection(format!(
                "{}: smbclient timed out after {}s",
                self.server,
                self.timeout.as_secs()
            ))),
            Ok(Err(e)) => Err(self.spawn_error(e)),
            Ok(Ok(output)) => Ok(output),
        }
    }

    fn spawn_error(&self, e: std::io::Error) -> SmbError {
        if e.kind() == std::io::ErrorKind::NotFound {
            SmbError::connection(format!("smbclient not found at '{}'", self.binary))
        } else {
            SmbError::Io(e)
        }
    }
}

// ─── Transport / connection / session ────────────────────────────────

pub struct SmbClientTransport {
    config: SmbEngineConfig,
}

impl SmbClientTransport {
    pub fn new(config: SmbEngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ShareTransport for SmbClientTransport {
    async fn connect(&self, server: &str) -> SmbResult<Box<dyn ShareConnection>> {
        let timeout = Duration::from_secs(self.config.connect_timeout_sec);
        let probe = TcpStream::connect((server, self.config.port));
        match tokio::time::timeout(timeout, probe).await {
            Err(_) => {
                return Err(SmbError::connection(format!(
                    "{}:{}: timed out after {}s",
                    server,
                    self.config.port,
                    timeout.as_secs()
                )))
            }
            Ok(Err(e)) => {
                return Err(SmbError::connection(format!(
                    "{}:{}: {}",
                    server, self.config.port, e
                )))
            }
            Ok(Ok(_stream)) => {}
        }
        debug!("SMB {}:{} reachable", server, self.config.port);
        Ok(Box::new(SmbClientConnection {
            binary: self.config.smbclient_path.clone(),
            server: server.to_string(),
            port: self.config.port,
            timeout,
        }))
    }
}

struct SmbClientConnection {
    binary: String,
    server: String,
    port: u16,
    timeout: Duration,
}

#[async_trait]
impl ShareConnection for SmbClientConnection {
    async fn authenticate(
        &mut self,
        credentials: &Credentials,
    ) -> SmbResult<Box<dyn AuthenticatedSession>> {
        let invocation = Invocation {
            binary: self.binary.clone(),
            server: self.server.clone(),
            port: self.port,
            timeout: self.timeout,
            credentials: credentials.clone(),
        };
        let mut cmd = invocation.command(None);
        cmd.arg("-g");
        let output = invocation.output(cmd).await?;
        check_output(&output, &self.server)?;
        Ok(Box::new(SmbClientSession { invocation }))
    }

    async fn close(&mut self) -> SmbResult<()> {
        Ok(())
    }
}

struct SmbClientSession {
    invocation: Invocation,
}

#[async_trait]
impl AuthenticatedSession for SmbClientSession {
    async fn attach_share(&mut self, share: &str) -> SmbResult<Box<dyn ShareHandle>> {
        let mut cmd = self.invocation.command(Some(share));
        cmd.arg("-c").arg("pwd");
        let output = self.invocation.output(cmd).await?;
        check_output(&output, share).map_err(|e| match e {
            SmbError::NotFound { .. } => SmbError::share_unavailable(share, e.to_string()),
            other => other,
        })?;
        Ok(Box::new(SmbClientShare {
            invocation: self.invocation.clone(),
            share: share.to_string(),
        }))
    }

    async fn close(&mut self) -> SmbResult<()> {
        Ok(())
    }
}

// ─── Share handle ────────────────────────────────────────────────────

struct SmbClientShare {
    invocation: Invocation,
    share: String,
}

impl SmbClientShare {
    fn share_command(&self, command: &str) -> Command {
        let mut cmd = self.invocation.command(Some(&self.share));
        cmd.arg("-c").arg(command);
        cmd
    }

    /// Run one `-c` command to completion. Share operations are not bound
    /// by the connect timeout.
    async fn run(&self, command: &str, subject: &str) -> SmbResult<String> {
        debug!("smbclient //{}/{} -c {}", self.invocation.server, self.share, command);
        let output = self
            .share_command(command)
            .output()
            .await
            .map_err(|e| self.invocation.spawn_error(e))?;
        check_output(&output, subject)
    }

    fn spawn(&self, mut cmd: Command) -> SmbResult<Child> {
        cmd.spawn().map_err(|e| self.invocation.spawn_error(e))
    }
}

#[async_trait]
impl ShareHandle for SmbClientShare {
    async fn list(&mut self, dir: &str) -> SmbResult<Vec<RawEntry>> {
        let mask = path::join(dir, "*");
        let output = self.run(&format!("ls {}", quoted(&mask)?), dir).await?;
        Ok(parse_ls(&output))
    }

    async fn metadata(&mut self, p: &str) -> SmbResult<RawEntry> {
        if p.is_empty() {
            return Ok(RawEntry {
                name: String::new(),
                is_directory: true,
                size: 0,
                modified: None,
            });
        }
        let output = self.run(&format!("ls {}", quoted(p)?), p).await?;
        let name = path::file_name(p);
        parse_ls(&output)
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(&name))
            .ok_or_else(|| SmbError::not_found(p))
    }

    async fn file_exists(&mut self, p: &str) -> SmbResult<bool> {
        match self.metadata(p).await {
            Ok(entry) => Ok(!entry.is_directory),
            Err(SmbError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn folder_exists(&mut self, p: &str) -> SmbResult<bool> {
        match self.metadata(p).await {
            Ok(entry) => Ok(entry.is_directory),
            Err(SmbError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn open_read(&mut self, p: &str) -> SmbResult<Box<dyn RemoteReader>> {
        let mut child = self.spawn(self.share_command(&format!("get {} -", quoted(p)?)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SmbError::protocol("smbclient stdout not captured"))?;
        Ok(Box::new(ProcessReader {
            child: Some(child),
            stdout: Some(stdout),
            path: p.to_string(),
        }))
    }

    async fn open_write(
        &mut self,
        p: &str,
        disposition: CreateDisposition,
    ) -> SmbResult<Box<dyn RemoteWriter>> {
        // `put` always overwrites; exclusive create is checked up front.
        if disposition == CreateDisposition::CreateNew {
            match self.metadata(p).await {
                Ok(_) => return Err(SmbError::already_exists(p)),
                Err(SmbError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        let mut cmd = self.share_command(&format!("put /dev/stdin {}", quoted(p)?));
        cmd.stdin(Stdio::piped());
        let mut child = self.spawn(cmd)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SmbError::protocol("smbclient stdin not captured"))?;
        Ok(Box::new(ProcessWriter {
            child: Some(child),
            stdin: Some(stdin),
            path: p.to_string(),
        }))
    }

    async fn remove(&mut self, p: &str) -> SmbResult<()> {
        self.run(&format!("del {}", quoted(p)?), p).await.map(|_| ())
    }

    async fn remove_directory_recursive(&mut self, p: &str) -> SmbResult<()> {
        if p.is_empty() {
            return Err(SmbError::invalid_input("cannot remove the share root"));
        }
        self.run(&format!("deltree {}", quoted(p)?), p)
            .await
            .map(|_| ())
    }

    async fn create_directory(&mut self, p: &str) -> SmbResult<()> {
        self.run(&format!("mkdir {}", quoted(p)?), p).await.map(|_| ())
    }

    async fn rename_directory(&mut self, from: &str, to: &str) -> SmbResult<()> {
        self.run(&format!("rename {} {}", quoted(from)?, quoted(to)?), from)
            .await
            .map(|_| ())
    }

    async fn close(&mut self) -> SmbResult<()> {
        Ok(())
    }
}

// ─── Streams ─────────────────────────────────────────────────────────

struct ProcessReader {
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    path: String,
}

impl ProcessReader {
    /// Reap the process after end of stream and surface its failure, if any.
    async fn finish(&mut self) -> SmbResult<()> {
        self.stdout = None;
        if let Some(child) = self.child.take() {
            let output = child.wait_with_output().await?;
            check_output(&output, &self.path)?;
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteReader for ProcessReader {
    async fn read(&mut self, buf: &mut [u8]) -> SmbResult<usize> {
        let stdout = match self.stdout.as_mut() {
            Some(stdout) => stdout,
            None => return Ok(0),
        };
        let n = stdout.read(buf).await?;
        if n == 0 {
            self.finish().await?;
        }
        Ok(n)
    }

    async fn close(&mut self) -> SmbResult<()> {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            // Closed before end of stream: nothing left worth reading.
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        Ok(())
    }
}

struct ProcessWriter {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    path: String,
}

#[async_trait]
impl RemoteWriter for ProcessWriter {
    async fn write_all(&mut self, buf: &[u8]) -> SmbResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SmbError::protocol(format!("write after close: {}", self.path)))?;
        stdin.write_all(buf).await?;
        Ok(())
    }

    async fn close(&mut self) -> SmbResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }
        if let Some(child) = self.child.take() {
            let output = child.wait_with_output().await?;
            check_output(&output, &self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smb::SmbErrorKind;

    const LS: &str = "  .                                   D        0  Mon Mar  4 10:22:31 2024
  ..                                  D        0  Mon Mar  4 10:22:31 2024
  My Documents                        D        0  Tue Feb 13 08:00:01 2024
  report.pdf                          A   123456  Sun Dec 31 23:59:59 2023
  NT_STATUS_notes.txt                 AH      42  Fri Jan  5 07:08:09 2024

\t\t48254 blocks of size 1048576. 1234 blocks available
";

    #[test]
    fn parses_listing_rows() {
        let entries = parse_ls(LS);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![".", "..", "My Documents", "report.pdf", "NT_STATUS_notes.txt"]
        );
        assert!(entries[2].is_directory);
        assert_eq!(entries[3].size, 123456);
        assert!(!entries[3].is_directory);
        assert_eq!(
            entries[3].modified.unwrap().to_rfc3339(),
            "2023-12-31T23:59:59+00:00"
        );
    }

    #[test]
    fn padded_day_parses() {
        let dt = parse_ls_date("Fri Jan  5 07:08:09 2024").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-05T07:08:09+00:00");
        assert!(parse_ls_date("yesterday").is_none());
    }

    #[test]
    fn status_codes_map_to_taxonomy() {
        let cases = [
            ("NT_STATUS_OBJECT_NAME_NOT_FOUND", SmbErrorKind::NotFound),
            ("NT_STATUS_NO_SUCH_FILE", SmbErrorKind::NotFound),
            ("NT_STATUS_OBJECT_NAME_COLLISION", SmbErrorKind::AlreadyExists),
            ("NT_STATUS_ACCESS_DENIED", SmbErrorKind::PermissionDenied),
            ("NT_STATUS_LOGON_FAILURE", SmbErrorKind::Authentication),
            ("NT_STATUS_BAD_NETWORK_NAME", SmbErrorKind::ShareUnavailable),
            ("NT_STATUS_CONNECTION_REFUSED", SmbErrorKind::Connection),
            ("NT_STATUS_DISK_FULL", SmbErrorKind::Protocol),
        ];
        for (code, kind) in cases {
            assert_eq!(status_error(code, "x", "").kind(), kind, "{}", code);
        }
    }

    #[test]
    fn listing_rows_never_read_as_failures() {
        assert!(find_failure(LS, "").is_none());
        let err = find_failure("NT_STATUS_NO_SUCH_FILE listing \\nope\\*\n", "nope").unwrap();
        assert!(matches!(err, SmbError::NotFound { ref path } if path == "nope"));
        assert!(find_failure("session setup ok: NT_STATUS_OK\n", "").is_none());
    }

    #[test]
    fn password_goes_through_environment() {
        let invocation = Invocation {
            binary: "smbclient".into(),
            server: "nas".into(),
            port: 445,
            timeout: Duration::from_secs(1),
            credentials: Credentials::Named {
                username: "alice".into(),
                password: "s3cret".into(),
                domain: "CORP".into(),
            },
        };
        let cmd = invocation.command(Some("media"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(args, vec!["//nas/media", "-p", "445", "-U", "alice", "-W", "CORP"]);
        assert!(cmd
            .as_std()
            .get_envs()
            .any(|(k, v)| k == "PASSWD" && v.is_some_and(|v| v == "s3cret")));

        let guest = Invocation {
            credentials: Credentials::Anonymous,
            ..invocation
        };
        let args: Vec<String> = guest
            .command(None)
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(args, vec!["-L", "//nas", "-p", "445", "-N"]);
    }

    #[test]
    fn wire_paths_are_quoted() {
        assert_eq!(quoted("a b/c.txt").unwrap(), "\"\\a b\\c.txt\"");
        assert_eq!(quoted(&path::join("", "*")).unwrap(), "\"\\*\"");
    }

    #[test]
    fn command_separators_and_quotes_are_refused() {
        for p in ["notes;x.txt", "dir/say \"hi\".txt", "a\nb"] {
            let err = quoted(p).unwrap_err();
            assert_eq!(err.kind(), SmbErrorKind::InvalidInput, "{}", p);
        }
    }

    #[tokio::test]
    async fn unaddressable_paths_fail_before_smbclient_runs() {
        // A missing binary would surface as a connection error; getting
        // InvalidInput proves nothing was spawned.
        let mut share = SmbClientShare {
            invocation: Invocation {
                binary: "/nonexistent/smbclient".into(),
                server: "nas".into(),
                port: 445,
                timeout: Duration::from_secs(1),
                credentials: Credentials::Anonymous,
            },
            share: "media".into(),
        };
        let err = share.remove("notes;x.txt").await.unwrap_err();
        assert_eq!(err.kind(), SmbErrorKind::InvalidInput);
        let err = share.remove_directory_recursive("a;b").await.unwrap_err();
        assert_eq!(err.kind(), SmbErrorKind::InvalidInput);
        let err = share
            .rename_directory("old", "say \"hi\"")
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), SmbErrorKind::InvalidInput);
        let err = share.open_read("x;y.bin").await.err().unwrap();
        assert_eq!(err.kind(), SmbErrorKind::InvalidInput);

        let err = share.remove("/nope/plain.txt").await.unwrap_err();
        assert_eq!(err.kind(), SmbErrorKind::Connection);
    }
}

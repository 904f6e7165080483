//! End-to-end behaviour of `SmbService` over the in-memory share server.

use sorng_smb::smb::memory::MemoryShareServer;
use sorng_smb::smb::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn config() -> SmbEngineConfig {
    SmbEngineConfig {
        chunk_size: 8192,
        retry_backoff_ms: 1,
        ..SmbEngineConfig::default()
    }
}

fn service(server: &MemoryShareServer) -> SmbServiceState {
    SmbService::new(server.transport(), config()).unwrap()
}

fn alice() -> SmbConnectionProfile {
    SmbConnectionProfile::new("nas.local", "media").with_credentials("alice", "secret")
}

fn server() -> MemoryShareServer {
    let server = MemoryShareServer::new();
    server.add_share("media").add_user("alice", "secret");
    server
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

// ─── Sessions ────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_credentials_log_in_as_guest() {
    let server = server();
    server.set_allow_guest(true);
    server.put_file("media", "a.txt", b"a");
    let svc = service(&server);

    let entries = svc
        .list_files(&SmbConnectionProfile::new("nas.local", "media"), "", None)
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    let stats = server.stats();
    assert_eq!(stats.anonymous_logins, 1);
    assert_eq!(stats.identities, vec!["<guest>".to_string()]);
}

#[tokio::test]
async fn test_connection_requires_every_setup_step() {
    let server = server();
    let svc = service(&server);

    assert!(svc.test_connection(&alice()).await);

    let wrong_password =
        SmbConnectionProfile::new("nas.local", "media").with_credentials("alice", "nope");
    assert!(!svc.test_connection(&wrong_password).await);

    let wrong_share =
        SmbConnectionProfile::new("nas.local", "backup").with_credentials("alice", "secret");
    assert!(!svc.test_connection(&wrong_share).await);

    server.set_reachable(false);
    assert!(!svc.test_connection(&alice()).await);

    // Every check closed what it opened.
    assert_eq!(server.stats().open_sessions, 0);
}

#[tokio::test]
async fn setup_failures_keep_their_category() {
    let server = server();
    let svc = service(&server);

    let err = svc
        .list_files(
            &SmbConnectionProfile::new("nas.local", "media").with_credentials("bob", "x"),
            "",
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SmbErrorKind::Authentication);

    let err = svc
        .file_exists(
            &SmbConnectionProfile::new("nas.local", "nope").with_credentials("alice", "secret"),
            "a",
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SmbErrorKind::ShareUnavailable);
}

#[tokio::test]
async fn concurrent_callers_never_hold_two_sessions() {
    let server = server();
    server.set_latency(Duration::from_millis(5));
    server.put_file("media", "docs/a.txt", b"a");
    let svc = service(&server);

    let mut tasks = Vec::new();
    for i in 0..6 {
        let svc = svc.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                svc.list_files(&alice(), "docs", None).await.map(|_| ())
            } else {
                svc.file_exists(&alice(), "docs/a.txt").await.map(|_| ())
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stats = server.stats();
    assert_eq!(stats.connects, 6);
    assert_eq!(stats.peak_sessions, 1);
    let mut spans = stats.session_spans.clone();
    spans.sort_by_key(|(opened, _)| *opened);
    for pair in spans.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "sessions overlapped");
    }
    assert_eq!(svc.lock_stats().acquisitions, 6);
}

// ─── Directory operations ────────────────────────────────────────────

#[tokio::test]
async fn listing_applies_filter_and_hides_dotfiles() {
    let server = server();
    server
        .put_file("media", "music/b.mp3", b"bb")
        .put_file("media", "music/a.mp3", b"a")
        .put_file("media", "music/cover.jpg", b"c")
        .put_file("media", "music/.index", b"i")
        .put_dir("media", "music/live");
    let svc = service(&server);

    let all = svc.list_files(&alice(), "/music/", None).await.unwrap();
    let names: Vec<&str> = all.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["live", ".index", "a.mp3", "b.mp3", "cover.jpg"]);
    assert!(all.iter().all(|e| e.path.starts_with("music/")));

    let options = ListOptions {
        filter: Some("*.mp3".into()),
        show_hidden: false,
        sort_by: SmbSortField::Size,
        descending: true,
        ..ListOptions::default()
    };
    let mp3s = svc.list_files(&alice(), "music", Some(options)).await.unwrap();
    let names: Vec<&str> = mp3s.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["b.mp3", "a.mp3"]);

    let err = svc.list_files(&alice(), "nowhere", None).await.unwrap_err();
    assert_eq!(err.kind(), SmbErrorKind::NotFound);
}

#[tokio::test]
async fn create_exists_and_delete() {
    let server = server();
    server.put_file("media", "old/deep/file.txt", b"x");
    let svc = service(&server);

    svc.create_directory(&alice(), "incoming").await.unwrap();
    assert!(svc.file_exists(&alice(), "incoming").await.unwrap());
    let err = svc.create_directory(&alice(), "incoming").await.unwrap_err();
    assert_eq!(err.kind(), SmbErrorKind::AlreadyExists);

    assert!(svc.file_exists(&alice(), "old/deep/file.txt").await.unwrap());
    svc.delete_file(&alice(), "old/deep/file.txt").await.unwrap();
    assert!(!svc.file_exists(&alice(), "old/deep/file.txt").await.unwrap());

    svc.delete_file(&alice(), "old").await.unwrap();
    assert!(!server.exists("media", "old"));

    let err = svc.delete_file(&alice(), "old").await.unwrap_err();
    assert_eq!(err.kind(), SmbErrorKind::NotFound);
}

// ─── Transfers ───────────────────────────────────────────────────────

#[tokio::test]
async fn download_resumes_from_partial_file_on_third_attempt() {
    let data = payload(200_000);
    let server = server();
    server.put_file("media", "video/clip.mp4", &data);
    server.fail_reads("media", "video/clip.mp4", 2, 50_000);
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("clip.mp4");
    let svc = service(&server);

    let result = svc
        .download_file(&alice(), "video/clip.mp4", &local, None)
        .await
        .unwrap();

    assert_eq!(result.attempts, 3);
    assert_eq!(result.resumed_from, 100_000);
    assert_eq!(result.bytes_total, data.len() as u64);
    assert_eq!(server.stats().resume_offsets, vec![50_000, 100_000]);
    assert_eq!(std::fs::read(&local).unwrap(), data);
    assert_eq!(server.stats().open_sessions, 0);
}

#[tokio::test]
async fn transfers_never_make_a_fourth_attempt() {
    let server = server();
    server.put_file("media", "f.bin", &payload(10_000));
    server.fail_reads("media", "f.bin", 100, 10);
    server.fail_writes(100, 10);
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&server);

    let err = svc
        .download_file(&alice(), "f.bin", &dir.path().join("f.bin"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SmbError::Transfer { attempts: 3, .. }));
    assert_eq!(server.stats().read_opens, 3);

    let local = dir.path().join("up.bin");
    std::fs::write(&local, payload(1_000)).unwrap();
    let err = svc
        .upload_file(&alice(), &local, "up.bin", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SmbError::Transfer { attempts: 3, .. }));
    assert_eq!(server.stats().write_opens, 3);
    // Exhausted upload keeps the staging copy.
    assert!(local.exists());
    assert!(err.cause_chain().contains("NT_STATUS_CONNECTION_RESET"));
}

#[tokio::test]
async fn dropped_download_releases_session_and_gate() {
    let server = server();
    server.put_file("media", "slow.bin", &payload(10_000));
    server.fail_reads("media", "slow.bin", 1, 10);
    let dir = tempfile::tempdir().unwrap();
    let svc = SmbService::new(
        server.transport(),
        SmbEngineConfig {
            retry_backoff_ms: 1_000,
            ..config()
        },
    )
    .unwrap();

    // Abandoned while waiting out the first retry backoff.
    let outcome = tokio::time::timeout(
        Duration::from_millis(200),
        svc.download_file(&alice(), "slow.bin", &dir.path().join("slow.bin"), None),
    )
    .await;
    assert!(outcome.is_err());

    let stats = server.stats();
    assert_eq!(stats.open_sessions, 0);
    assert_eq!(stats.open_streams, 0);
    assert_eq!(stats.session_spans.len(), 1);

    // The gate is free again.
    assert!(svc.file_exists(&alice(), "slow.bin").await.unwrap());
}

#[tokio::test]
async fn upload_restarts_from_zero_and_removes_source() {
    let data = payload(40_000);
    let server = server();
    server.fail_writes(2, 16_384);
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("report.pdf");
    std::fs::write(&local, &data).unwrap();
    let svc = service(&server);

    let seen = Mutex::new(Vec::new());
    let sink = |u: &ProgressUpdate| seen.lock().unwrap().push(u.done);
    let result = svc
        .upload_file(&alice(), &local, "report.pdf", Some(&sink))
        .await
        .unwrap();

    assert_eq!(result.attempts, 3);
    assert_eq!(result.resumed_from, 0);
    let stats = server.stats();
    assert_eq!(stats.write_opens, 3);
    assert_eq!(stats.bytes_written, 16_384 * 2 + data.len() as u64);
    assert_eq!(server.read_file("media", "report.pdf").unwrap(), data);
    assert!(!local.exists());
    // Progress restarts with every attempt.
    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.iter().filter(|done| **done == 8_192).count(), 3);
    assert_eq!(seen.last(), Some(&(data.len() as u64)));
}

#[tokio::test]
async fn folder_download_mirrors_tree_and_reports_failed_file() {
    let server = server();
    server
        .put_file("media", "album/01.flac", &payload(3_000))
        .put_file("media", "album/02.flac", &payload(4_000))
        .put_file("media", "album/art/front.jpg", &payload(500));
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&server);

    let summary = svc
        .download_folder(&alice(), "album", &dir.path().join("album"), None)
        .await
        .unwrap();
    assert_eq!(summary.files, 3);
    assert_eq!(summary.directories, 1);
    assert_eq!(summary.bytes, 7_500);
    assert_eq!(
        std::fs::read(dir.path().join("album/art/front.jpg")).unwrap(),
        payload(500)
    );

    server.fail_reads("media", "album/02.flac", 3, 100);
    let again = tempfile::tempdir().unwrap();
    let err = svc
        .download_folder(&alice(), "album", again.path(), None)
        .await
        .unwrap_err();
    match err {
        SmbError::FolderTransfer { file, completed, .. } => {
            assert_eq!(file, "album/02.flac");
            assert_eq!(completed, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    // No rollback of what already arrived.
    assert!(again.path().join("01.flac").exists());
}

#[tokio::test]
async fn folder_download_cancel_stops_between_files() {
    let server = server();
    server
        .put_file("media", "set/a.bin", b"a")
        .put_file("media", "set/b.bin", b"b");
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&server);
    let token = CancellationToken::new();

    let cancel = token.clone();
    let sink = move |_: &ProgressUpdate| cancel.cancel();
    let err = svc
        .download_folder_with_cancel(&alice(), "set", dir.path(), Some(&sink), &token)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), SmbErrorKind::Cancelled);
    assert!(dir.path().join("a.bin").exists());
    assert!(!dir.path().join("b.bin").exists());
    assert_eq!(server.stats().open_sessions, 0);
}

// ─── Search ──────────────────────────────────────────────────────────

fn search_tree(server: &MemoryShareServer) {
    server
        .put_file("media", "Report2024.pdf", b"r")
        .put_file("media", "readme.txt", b"r")
        .put_file("media", "a/report-a.pdf", b"r")
        .put_file("media", "a/b/report-b.pdf", b"r")
        .put_file("media", "a/b/c/report-c.pdf", b"r")
        .put_file("media", "z/report-z.pdf", b"r");
}

#[test]
fn wildcard_examples() {
    assert!(wildcard_match("Report2024.pdf", "*.pdf"));
    assert!(wildcard_match("readme.txt", "read"));
    assert!(wildcard_match("readme.txt", "REA?ME"));
    assert!(!wildcard_match("readme.txt", "*.pdf"));
}

#[tokio::test]
async fn shallow_search_stays_one_level_below_start() {
    let server = server();
    search_tree(&server);
    let svc = service(&server);

    let request = SmbSearchRequest::new("report").shallow();
    let outcome = svc.search_files(&alice(), "a", &request).await.unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.entries.len(), 1);
    for entry in &outcome.entries {
        assert!(entry.path.split('/').count() <= 2, "{}", entry.path);
    }

    let deep = svc
        .search_files(&alice(), "a", &SmbSearchRequest::new("*.pdf"))
        .await
        .unwrap();
    assert_eq!(deep.entries.len(), 3);
}

#[tokio::test]
async fn cancel_during_search_returns_partial_results() {
    let server = server();
    search_tree(&server);
    let svc = service(&server);

    let weak = Arc::downgrade(&svc);
    let listings = Arc::new(Mutex::new(0u32));
    let counter = listings.clone();
    server.on_list(move |_dir| {
        let mut n = counter.lock().unwrap();
        *n += 1;
        if *n == 2 {
            if let Some(svc) = weak.upgrade() {
                svc.cancel_search();
            }
        }
    });

    let outcome = svc
        .search_files(&alice(), "", &SmbSearchRequest::new("report"))
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert!(!outcome.is_complete());
    // The listing that saw the cancel was the last one.
    assert_eq!(*listings.lock().unwrap(), 2);
    // Root matches came in before the cancel.
    assert!(outcome.entries.iter().any(|e| e.name == "Report2024.pdf"));

    // The next search starts with a fresh token.
    let listings_before = *listings.lock().unwrap();
    let outcome = svc
        .search_files(&alice(), "z", &SmbSearchRequest::new("report"))
        .await
        .unwrap();
    assert!(!outcome.cancelled);
    assert_eq!(outcome.entries.len(), 1);
    assert_eq!(*listings.lock().unwrap(), listings_before + 1);
}

#[tokio::test]
async fn caller_token_and_result_cap() {
    let server = server();
    search_tree(&server);
    let svc = service(&server);

    let token = CancellationToken::new();
    token.cancel();
    let outcome = svc
        .search_files_with_token(&alice(), "", &SmbSearchRequest::new("*"), token)
        .await
        .unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.entries.is_empty());

    let mut request = SmbSearchRequest::new("*.pdf");
    request.max_results = Some(2);
    let outcome = svc.search_files(&alice(), "", &request).await.unwrap();
    assert_eq!(outcome.entries.len(), 2);
    assert!(outcome.truncated);
    assert!(!outcome.cancelled);
}

// ─── Rename ──────────────────────────────────────────────────────────

#[tokio::test]
async fn rename_onto_existing_target_changes_nothing() {
    let server = server();
    server
        .put_file("media", "docs/draft.txt", b"draft")
        .put_file("media", "docs/final.txt", b"final");
    let svc = service(&server);

    let err = svc
        .rename_file(&alice(), "docs/draft.txt", "final.txt")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), SmbErrorKind::AlreadyExists);
    assert_eq!(server.read_file("media", "docs/draft.txt").unwrap(), b"draft");
    assert_eq!(server.read_file("media", "docs/final.txt").unwrap(), b"final");
}

#[tokio::test]
async fn rename_with_short_copy_keeps_source() {
    let server = server();
    server.put_file("media", "docs/big.iso", &payload(50_000));
    server.truncate_reads("media", "docs/big.iso", 30_000);
    let svc = service(&server);

    let err = svc
        .rename_file(&alice(), "docs/big.iso", "renamed.iso")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), SmbErrorKind::Integrity);
    assert_eq!(server.read_file("media", "docs/big.iso").unwrap(), payload(50_000));
    assert!(!server.exists("media", "docs/renamed.iso"));
}

#[tokio::test]
async fn rename_file_and_directory() {
    let server = server();
    server
        .put_file("media", "docs/a.txt", b"alpha")
        .put_file("media", "photos/x.jpg", b"x");
    let svc = service(&server);

    let new_path = svc
        .rename_file(&alice(), "docs/a.txt", "b.txt")
        .await
        .unwrap();
    assert_eq!(new_path, "docs/b.txt");
    assert_eq!(server.read_file("media", "docs/b.txt").unwrap(), b"alpha");
    assert!(!server.exists("media", "docs/a.txt"));

    svc.rename_file(&alice(), "photos", "pictures").await.unwrap();
    assert_eq!(server.read_file("media", "pictures/x.jpg").unwrap(), b"x");
}

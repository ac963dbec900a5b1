mod common;

use common::{download_error, harness, harness_with, settings, status};
use cloudsync_lib::core::{AccountStatus, ConflictChoice, FileSyncStatus, SyncEvent, UsageCategory};
use cloudsync_lib::storage::{ContainerAccess, DownloadingStatus, ItemStatus, Storage};
use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test]
async fn test_missing_remote_file_is_not_in_remote() {
    let h = harness();

    let report = h.engine.file_status("plan.json").await;
    assert_eq!(report.status, FileSyncStatus::NotInRemote);
    assert!(!report.is_downloaded);
    assert!(!report.is_uploaded);
}

#[tokio::test(start_paused = true)]
async fn test_download_missing_remote_file_fails() {
    let h = harness();

    let outcome = h.engine.download_file("plan.json").await;
    assert!(!outcome.success);
    assert_eq!(outcome.error_code.as_deref(), Some("REMOTE_FILE_MISSING"));
    assert!(!h.local.exists("plan.json").await.unwrap());
}

#[tokio::test]
async fn test_upload_then_status_is_current() {
    let h = harness();
    h.write_local("plan.json", b"{\"v\":1}", 100_000).await;

    let outcome = h.engine.sync_file("plan.json").await;
    assert!(outcome.success, "{:?}", outcome);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.warning.is_none());

    let report = h.engine.file_status("plan.json").await;
    assert_eq!(report.status, FileSyncStatus::Current);
    assert!(report.is_uploaded);
    assert!(report.is_downloaded);
    assert_eq!(report.size, Some(7));
    assert_eq!(report.last_modified, Some(100_000));
    assert_eq!(h.remote.start_downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_file_status_reads_metadata_once() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);
    let stats_before = h.remote.stats.load(Ordering::SeqCst);

    let report = h.engine.file_status("plan.json").await;

    assert_eq!(report.status, FileSyncStatus::Current);
    assert_eq!(report.size, Some(1));
    assert_eq!(report.last_modified, Some(200_000));
    assert_eq!(h.remote.status_reads.load(Ordering::SeqCst), 1);
    assert_eq!(h.remote.stats.load(Ordering::SeqCst), stats_before);
}

#[tokio::test]
async fn test_double_sync_is_idempotent() {
    let h = harness();
    h.write_local("plan.json", b"A", 100_000).await;

    let first = h.engine.sync_file("plan.json").await;
    let second = h.engine.sync_file("plan.json").await;

    assert!(first.success && second.success);
    assert!(second.warning.is_none());
    assert_eq!(h.remote.content("SyncData/plan.json").as_deref(), Some(&b"A"[..]));
    assert_eq!(h.remote.file_count(), 1);
    assert_eq!(h.remote.modified("SyncData/plan.json"), Some(100_000));
}

#[tokio::test(start_paused = true)]
async fn test_upload_without_local_file_fails() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);

    let outcome = h.engine.force_sync_file("plan.json").await;
    assert!(!outcome.success);
    assert_eq!(outcome.error_code.as_deref(), Some("LOCAL_FILE_MISSING"));
    // 远程文件保持不变
    assert_eq!(h.remote.content("SyncData/plan.json").as_deref(), Some(&b"B"[..]));
}

#[tokio::test]
async fn test_invalid_file_name_is_rejected() {
    let h = harness();

    let outcome = h.engine.sync_file("../plan.json").await;
    assert!(!outcome.success);
    assert_eq!(outcome.error_code.as_deref(), Some("INVALID_PATH"));
    assert_eq!(outcome.attempts, 0);

    let report = h.engine.file_status("a/b").await;
    assert!(matches!(report.status, FileSyncStatus::Error(_)));
}

#[tokio::test]
async fn test_sync_overwrites_newer_remote_with_warning() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);
    h.write_local("plan.json", b"A", 100_000).await;
    let mut events = h.engine.subscribe();

    let outcome = h.engine.sync_file("plan.json").await;

    assert!(outcome.success);
    assert!(outcome.warning.is_some());
    assert_eq!(h.remote.content("SyncData/plan.json").as_deref(), Some(&b"A"[..]));
    assert_eq!(h.remote.modified("SyncData/plan.json"), Some(100_000));

    let mut overridden = false;
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::ConflictOverridden {
            file_name,
            local_modified,
            remote_modified,
        } = event
        {
            assert_eq!(file_name, "plan.json");
            assert_eq!(local_modified, Some(100_000));
            assert_eq!(remote_modified, Some(200_000));
            overridden = true;
        }
    }
    assert!(overridden);
}

#[tokio::test]
async fn test_force_sync_skips_conflict_check() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);
    h.write_local("plan.json", b"A", 100_000).await;
    let mut events = h.engine.subscribe();

    let outcome = h.engine.force_sync_file("plan.json").await;

    assert!(outcome.success);
    assert!(outcome.warning.is_none());
    assert_eq!(h.remote.content("SyncData/plan.json").as_deref(), Some(&b"A"[..]));

    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, SyncEvent::ConflictOverridden { .. }));
    }
}

#[tokio::test]
async fn test_download_replaces_older_local() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);
    h.write_local("plan.json", b"A", 100_000).await;

    let outcome = h.engine.download_file("plan.json").await;

    assert!(outcome.success, "{:?}", outcome);
    assert_eq!(h.read_local("plan.json").await, b"B");
    let meta = h.local.stat("plan.json").await.unwrap().unwrap();
    assert_eq!(meta.modified_time, Some(200_000));
}

#[tokio::test]
async fn test_download_keeps_newer_local() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);
    h.write_local("plan.json", b"A", 300_000).await;

    let outcome = h.engine.download_file("plan.json").await;

    assert!(outcome.success);
    assert_eq!(h.read_local("plan.json").await, b"A");
}

#[tokio::test]
async fn test_download_creates_missing_local() {
    let h = harness();
    h.remote.put("SyncData/notes.json", b"{}", 200_000);

    let outcome = h.engine.download_file("notes.json").await;

    assert!(outcome.success);
    assert_eq!(h.read_local("notes.json").await, b"{}");
}

#[tokio::test(start_paused = true)]
async fn test_download_waits_for_materialization() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);
    h.remote.script_statuses(vec![
        status(DownloadingStatus::NotDownloaded),
        status(DownloadingStatus::Downloading),
        status(DownloadingStatus::Current),
    ]);

    let start = Instant::now();
    let outcome = h.engine.download_file("plan.json").await;
    let elapsed = start.elapsed();

    assert!(outcome.success);
    // 未下载等待 2 秒，下载中等待 1 秒
    assert!(elapsed >= Duration::from_secs(3), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(4), "{:?}", elapsed);
    assert_eq!(h.remote.status_reads.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_download_wait_is_bounded_by_deadline() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);
    h.remote.set_default_status(status(DownloadingStatus::NotDownloaded));

    let start = Instant::now();
    let outcome = h.engine.download_file("plan.json").await;
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(120), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_secs(121), "{:?}", elapsed);
    // 远程可以直接读取时仍然完成复制
    assert!(outcome.success);
    assert_eq!(outcome.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_download_errors_are_capped() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);
    h.remote.set_default_status(download_error("连接中断"));

    let start = Instant::now();
    let outcome = h.engine.download_file("plan.json").await;
    let elapsed = start.elapsed();

    assert!(outcome.success);
    assert!(elapsed < Duration::from_secs(10), "{:?}", elapsed);
    assert_eq!(h.remote.status_reads.load(Ordering::SeqCst), 3);
    // 首次触发加两次重新触发
    assert_eq!(h.remote.start_downloads.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_status_read_errors_keep_polling() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);
    h.remote.fail_status_reads(true);

    let remote = h.remote.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        remote.fail_status_reads(false);
    });

    let start = Instant::now();
    let outcome = h.engine.download_file("plan.json").await;

    assert!(outcome.success);
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert!(start.elapsed() < Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn test_upload_retries_are_bounded() {
    let h = harness();
    h.write_local("plan.json", b"A", 100_000).await;
    h.remote.fail_writes(u32::MAX, io::ErrorKind::ConnectionReset);

    let start = Instant::now();
    let outcome = h.engine.sync_file("plan.json").await;

    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.error_code.as_deref(), Some("NETWORK_UNAVAILABLE"));
    assert_eq!(h.remote.writes.load(Ordering::SeqCst), 3);
    // 退避 2 秒 + 4 秒
    assert!(start.elapsed() >= Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_upload_recovers_on_retry() {
    let h = harness();
    h.write_local("plan.json", b"A", 100_000).await;
    h.remote.fail_writes(1, io::ErrorKind::TimedOut);

    let outcome = h.engine.sync_file("plan.json").await;

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(h.remote.content("SyncData/plan.json").as_deref(), Some(&b"A"[..]));
}

#[tokio::test(start_paused = true)]
async fn test_placeholder_app_id_permission_message() {
    let h = harness_with(settings("com.example.cloudsync"));
    h.write_local("plan.json", b"A", 100_000).await;
    h.remote.fail_writes(u32::MAX, io::ErrorKind::PermissionDenied);

    let outcome = h.engine.sync_file("plan.json").await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_code.as_deref(), Some("PERMISSION_DENIED"));
    assert!(outcome.error.unwrap().contains("com.example.cloudsync"));
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_remote_blocks_transfers() {
    let h = harness();
    h.write_local("plan.json", b"A", 100_000).await;
    h.remote.set_identity(None);

    assert_eq!(h.engine.account_status(), AccountStatus::NotAvailable);
    assert!(!h.engine.is_available().await);

    let outcome = h.engine.sync_file("plan.json").await;
    assert!(!outcome.success);
    assert_eq!(outcome.error_code.as_deref(), Some("UNAVAILABLE"));
    assert_eq!(h.remote.file_count(), 0);
}

#[tokio::test]
async fn test_read_only_container_is_unavailable() {
    let h = harness();
    h.remote.set_access(ContainerAccess {
        reachable: true,
        readable: true,
        writable: false,
    });

    assert_eq!(h.engine.account_status(), AccountStatus::Available);
    assert!(!h.engine.is_available().await);

    let report = h.engine.diagnostics().await;
    assert!(report.identity_present);
    assert!(!report.container_writable);
    assert!(!report.can_create_app_directory);
}

#[tokio::test]
async fn test_probe_leaves_no_directories_behind() {
    let h = harness();

    assert!(h.engine.is_available().await);
    assert_eq!(h.remote.dir_paths(), vec!["SyncData".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_download_wait() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);
    h.remote.set_default_status(status(DownloadingStatus::NotDownloaded));

    let engine = h.engine.clone();
    let task = tokio::spawn(async move { engine.download_file("plan.json").await });

    tokio::time::sleep(Duration::from_secs(5)).await;
    h.engine.shutdown();

    let outcome = task.await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.error_code.as_deref(), Some("CANCELLED"));
    assert!(!h.local.exists("plan.json").await.unwrap());
}

#[tokio::test]
async fn test_conflicted_item_status() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);
    h.remote.set_default_status(ItemStatus {
        has_conflicts: true,
        ..ItemStatus::current()
    });

    let report = h.engine.file_status("plan.json").await;
    assert_eq!(report.status, FileSyncStatus::Conflicted);
    assert!(report.has_conflicts);
}

#[tokio::test]
async fn test_status_read_error_is_reported() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);
    h.remote.fail_status_reads(true);

    let report = h.engine.file_status("plan.json").await;
    assert!(matches!(report.status, FileSyncStatus::Error(_)));
    assert!(report.message.is_some());
}

#[tokio::test]
async fn test_resolve_conflict_use_local() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 200_000);
    h.write_local("plan.json", b"A", 100_000).await;

    let outcome = h
        .engine
        .resolve_conflict("plan.json", ConflictChoice::UseLocal)
        .await;

    assert!(outcome.success);
    assert_eq!(h.remote.content("SyncData/plan.json").as_deref(), Some(&b"A"[..]));
    assert_eq!(h.read_local("plan.json").await, b"A");
    assert!(h.remote.start_downloads.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_resolve_conflict_use_remote() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 50_000);
    h.write_local("plan.json", b"A", 100_000).await;

    let outcome = h
        .engine
        .resolve_conflict("plan.json", ConflictChoice::UseRemote)
        .await;

    assert!(outcome.success);
    assert_eq!(h.read_local("plan.json").await, b"B");
    assert_eq!(h.remote.content("SyncData/plan.json").as_deref(), Some(&b"B"[..]));
}

#[tokio::test]
async fn test_resolve_conflict_missing_winner_keeps_both() {
    let h = harness();
    h.write_local("plan.json", b"A", 100_000).await;

    let outcome = h
        .engine
        .resolve_conflict("plan.json", ConflictChoice::UseRemote)
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_code.as_deref(), Some("REMOTE_FILE_MISSING"));
    assert_eq!(h.read_local("plan.json").await, b"A");
}

#[tokio::test]
async fn test_list_files_relative_to_base_dir() {
    let h = harness();
    h.remote.put("SyncData/b.pdf", b"12345", 1);
    h.remote.put("SyncData/a.json", b"{}", 2);
    h.remote.put("Other/c.json", b"{}", 3);

    let files = h.engine.list_files().await.unwrap();
    let names: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(names, vec!["a.json", "b.pdf"]);
    assert_eq!(files[1].size, 5);
}

#[tokio::test]
async fn test_list_files_agrees_with_usage() {
    let h = harness();
    h.remote.put("SyncData/notes.probe-1.json", b"{}", 1);
    h.remote.put("SyncData/a.json", b"{}", 2);
    h.remote.put("SyncData/.probe-abc/x", b"1", 3);

    let files = h.engine.list_files().await.unwrap();
    let names: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(names, vec!["a.json", "notes.probe-1.json"]);

    let usage = h.engine.storage_usage().await.unwrap();
    assert_eq!(usage.file_count, files.len() as u64);
}

#[tokio::test]
async fn test_storage_usage_breakdown() {
    let h = harness();
    h.remote.put("SyncData/a.json", b"{\"a\":1}", 1);
    h.remote.put("SyncData/b.pdf", b"12345", 1);
    h.remote.put("SyncData/c.txt", b"xy", 1);

    let usage = h.engine.storage_usage().await.unwrap();
    assert_eq!(usage.total_size, 14);
    assert_eq!(usage.file_count, 3);
    assert_eq!(usage.category(UsageCategory::Structured).size, 7);
    assert_eq!(usage.category(UsageCategory::Binary).size, 5);
    assert_eq!(usage.category(UsageCategory::Other).size, 2);
    assert_eq!(usage.extension_size("json"), 7);
    assert_eq!(usage.extension_size("pdf"), 5);
}

#[tokio::test]
async fn test_delete_file() {
    let h = harness();
    h.remote.put("SyncData/plan.json", b"B", 1);
    h.write_local("plan.json", b"A", 1).await;

    let outcome = h.engine.delete_file("plan.json").await;
    assert!(outcome.success);
    assert!(h.remote.content("SyncData/plan.json").is_none());
    assert!(h.local.exists("plan.json").await.unwrap());

    // 已经不存在的文件视为删除成功
    let again = h.engine.delete_file("plan.json").await;
    assert!(again.success, "{:?}", again);
    assert!(again.error_code.is_none());
}

#[tokio::test]
async fn test_events_follow_transfer() {
    let h = harness();
    h.write_local("plan.json", b"A", 100_000).await;
    let mut events = h.engine.subscribe();

    h.engine.sync_file("plan.json").await;

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert!(matches!(received.first(), Some(SyncEvent::Phase { .. })));
    assert!(received
        .iter()
        .any(|e| matches!(e, SyncEvent::RemoteChanged { path } if path == "SyncData/plan.json")));
    assert!(matches!(
        received.last(),
        Some(SyncEvent::Completed { attempts: 1, .. })
    ));
}

#[tokio::test]
async fn test_concurrent_syncs_of_same_file() {
    let h = harness();
    h.write_local("plan.json", b"A", 100_000).await;

    let (a, b) = tokio::join!(
        h.engine.sync_file("plan.json"),
        h.engine.force_sync_file("plan.json")
    );

    assert!(a.success && b.success);
    assert_eq!(h.remote.file_count(), 1);
    assert_eq!(h.remote.content("SyncData/plan.json").as_deref(), Some(&b"A"[..]));
}

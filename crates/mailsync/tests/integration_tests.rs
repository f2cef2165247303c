//! Integration tests for the mailsync crate
//!
//! These tests drive complete reconciliation runs over the in-memory and
//! SQLite stores.

use chrono::{DateTime, TimeZone, Utc};
use mailsync::models::{FolderAttributes, Message};
use mailsync::storage::{InMemoryMailStore, MailStore, SqliteMailStore, StoreOp};
use mailsync::sync::{FolderSelector, RunMode, StopReason, SyncOptions, reconcile};
use mailsync::{Endpoint, MoveConfig, Side, SyncError, open_store};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, 5, 14, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

/// Helper to create a message with a body
fn make_message(identity: &str, minutes: i64) -> Message {
    let subject = if identity.is_empty() {
        format!("Legacy message {}", minutes)
    } else {
        format!("Subject of {}", identity)
    };
    Message::builder()
        .identity(identity)
        .subject(subject.clone())
        .timestamp(at(minutes))
        .seen(true)
        .body(format!("Subject: {}\r\n\r\nHello", subject).into_bytes())
        .build()
}

fn mode(build: impl FnOnce(mailsync::sync::RunModeBuilder) -> mailsync::sync::RunModeBuilder) -> SyncOptions {
    SyncOptions::new(build(RunMode::builder()).build().unwrap())
}

fn copy_only() -> SyncOptions {
    SyncOptions::new(RunMode::default())
}

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

fn deletes(store: &InMemoryMailStore) -> Vec<u32> {
    store
        .ops()
        .iter()
        .filter_map(|op| match op {
            StoreOp::Delete { position, .. } => Some(*position),
            _ => None,
        })
        .collect()
}

fn source_abc() -> InMemoryMailStore {
    let mut source = InMemoryMailStore::new("source");
    source.add_message("INBOX", make_message("<A@example.com>", 0));
    source.add_message("INBOX", make_message("<B@example.com>", 1));
    source.add_message("INBOX", make_message("<C@example.com>", 2));
    source
}

#[test]
fn test_copy_rerun_and_sync_delete() {
    let mut source = source_abc();
    let mut target = InMemoryMailStore::new("target");

    // First run copies everything
    let report = reconcile(&mut source, &mut target, &copy_only(), |_| {}).unwrap();
    let inbox = report.folder("INBOX").unwrap();
    assert_eq!(inbox.counts.copied, 3);
    assert_eq!(inbox.counts.skipped, 0);

    // Second run is a no-op
    target.clear_ops();
    let report = reconcile(&mut source, &mut target, &copy_only(), |_| {}).unwrap();
    let inbox = report.folder("INBOX").unwrap();
    assert_eq!(inbox.counts.copied, 0);
    assert_eq!(inbox.counts.skipped, 3);
    assert!(
        !target
            .ops()
            .iter()
            .any(|op| matches!(op, StoreOp::Put { .. }))
    );

    // A target-only message is removed by sync
    target.add_message("INBOX", make_message("<D@example.com>", 3));
    let sync = mode(|m| m.sync(true));
    let report = reconcile(&mut source, &mut target, &sync, |_| {}).unwrap();
    let inbox = report.folder("INBOX").unwrap();
    assert_eq!(inbox.counts.deleted, 1);
    assert_eq!(inbox.counts.copied, 0);
    assert_eq!(
        sorted(target.identities("INBOX")),
        sorted(source.identities("INBOX"))
    );
}

#[test]
fn test_flags_and_timestamp_preserved() {
    let mut source = InMemoryMailStore::new("source");
    let original = Message::builder()
        .identity("<flags@example.com>")
        .timestamp(at(42))
        .answered(true)
        .flagged(true)
        .body(b"Subject: flags\r\n\r\n".to_vec())
        .build();
    source.add_message("INBOX", original.clone());
    let mut target = InMemoryMailStore::new("target");

    reconcile(&mut source, &mut target, &copy_only(), |_| {}).unwrap();

    let copied = &target.messages("INBOX")[0];
    assert_eq!(copied.timestamp, original.timestamp);
    assert_eq!(copied.flags, original.flags);
    assert_eq!(copied.body, original.body);
}

#[test]
fn test_timestamp_fallback_prevents_duplicates() {
    let mut source = InMemoryMailStore::new("source");
    source.add_message("INBOX", make_message("", 10));
    source.add_message("INBOX", make_message("", 20));
    let mut target = InMemoryMailStore::new("target");
    target.add_message("INBOX", make_message("", 10));
    target.add_message("INBOX", make_message("", 20));

    let report = reconcile(&mut source, &mut target, &copy_only(), |_| {}).unwrap();

    let inbox = report.folder("INBOX").unwrap();
    assert_eq!(inbox.counts.skipped, 2);
    assert_eq!(inbox.counts.copied, 0);
    assert_eq!(target.messages("INBOX").len(), 2);
}

#[test]
fn test_identity_never_matches_by_timestamp() {
    // Same timestamp, but the source message has an identity the target
    // lacks: it must be copied, not matched through the fallback key.
    let mut source = InMemoryMailStore::new("source");
    source.add_message("INBOX", make_message("<new@example.com>", 10));
    let mut target = InMemoryMailStore::new("target");
    target.add_message("INBOX", make_message("", 10));

    let report = reconcile(&mut source, &mut target, &copy_only(), |_| {}).unwrap();
    assert_eq!(report.totals().copied, 1);
    assert_eq!(target.messages("INBOX").len(), 2);
}

#[test]
fn test_fake_mode_is_pure() {
    let mut source = source_abc();
    source.subscribe("INBOX");
    let mut target = InMemoryMailStore::new("target");
    target.add_message("INBOX", make_message("<A@example.com>", 0));
    target.add_message("INBOX", make_message("<Z@example.com>", 9));
    target.add_message("INBOX", make_message("<Y@example.com>", 8));

    let fake = mode(|m| m.fake(true).sync(true));
    let report = reconcile(&mut source, &mut target, &fake, |_| {}).unwrap();

    let inbox = report.folder("INBOX").unwrap();
    assert_eq!(inbox.counts.copied, 2);
    assert_eq!(inbox.counts.skipped, 1);
    // 3 + 2 > 3, so the surplus is counted but not removed
    assert_eq!(inbox.counts.deleted, 2);

    for store in [&source, &target] {
        assert!(store.ops().iter().all(|op| matches!(op, StoreOp::Close)));
    }
    assert_eq!(target.messages("INBOX").len(), 3);
    assert!(!target.is_subscribed("INBOX"));
}

#[test]
fn test_fake_wipe_leaves_source_alone() {
    let mut source = source_abc();
    let mut target = InMemoryMailStore::new("target");

    let fake = mode(|m| m.fake(true).wipe(true));
    reconcile(&mut source, &mut target, &fake, |_| {}).unwrap();

    assert_eq!(source.messages("INBOX").len(), 3);
    assert!(deletes(&source).is_empty());
}

#[test]
fn test_wipe_deletes_in_descending_order() {
    let mut source = InMemoryMailStore::new("source");
    for i in 0..6 {
        source.add_message("INBOX", make_message(&format!("<m{}@example.com>", i), i));
    }
    let mut target = InMemoryMailStore::new("target");
    // Half of them are already on the target
    for i in [1, 3, 5] {
        target.add_message("INBOX", make_message(&format!("<m{}@example.com>", i), i));
    }

    let wipe = mode(|m| m.wipe(true));
    let report = reconcile(&mut source, &mut target, &wipe, |_| {}).unwrap();

    let counts = report.folder("INBOX").unwrap().counts;
    assert_eq!(counts.copied, 3);
    assert_eq!(counts.skipped, 3);
    assert_eq!(counts.wiped, 6);

    let positions = deletes(&source);
    assert_eq!(positions, vec![6, 5, 4, 3, 2, 1]);
    assert!(positions.windows(2).all(|w| w[0] >= w[1]));
    assert!(source.messages("INBOX").is_empty());
    assert_eq!(target.messages("INBOX").len(), 6);
}

#[test]
fn test_wipe_skips_failed_copies() {
    let mut source = source_abc();
    source.fail_body_at("INBOX", 2);
    let mut target = InMemoryMailStore::new("target");

    let wipe = mode(|m| m.wipe(true));
    let report = reconcile(&mut source, &mut target, &wipe, |_| {}).unwrap();

    let counts = report.folder("INBOX").unwrap().counts;
    assert_eq!(counts.copied, 2);
    assert_eq!(counts.failed, 1);
    // Only the message that could not be copied stays on the source
    assert_eq!(source.identities("INBOX"), vec!["<B@example.com>"]);
}

#[test]
fn test_once_stops_after_first_copy() {
    let mut source = source_abc();
    source.add_message("Archive", make_message("<old@example.com>", -60));
    let mut target = InMemoryMailStore::new("target");

    let once = mode(|m| m.once(true));
    let report = reconcile(&mut source, &mut target, &once, |_| {}).unwrap();

    assert_eq!(report.stopped, StopReason::Once);
    assert_eq!(report.totals().copied, 1);
    let puts = target
        .ops()
        .iter()
        .filter(|op| matches!(op, StoreOp::Put { .. }))
        .count();
    assert_eq!(puts, 1);
    assert_eq!(source.close_count(), 1);
    assert_eq!(target.close_count(), 1);
}

#[test]
fn test_once_with_fake_walks_everything() {
    let mut source = source_abc();
    source.add_message("Archive", make_message("<old@example.com>", -60));
    let mut target = InMemoryMailStore::new("target");

    let options = mode(|m| m.once(true).fake(true));
    let report = reconcile(&mut source, &mut target, &options, |_| {}).unwrap();

    assert_eq!(report.stopped, StopReason::Completed);
    assert_eq!(report.folders.len(), 2);
    assert_eq!(report.totals().copied, 4);
    assert!(
        !target
            .ops()
            .iter()
            .any(|op| matches!(op, StoreOp::Put { .. } | StoreOp::Delete { .. }))
    );
    assert!(target.identities("INBOX").is_empty());
}

#[test]
fn test_target_index_failure_reported_and_run_continues() {
    let mut source = source_abc();
    source.add_message("Sent", make_message("<sent@example.com>", 5));
    let mut target = InMemoryMailStore::new("target");
    target.add_message("INBOX", make_message("<A@example.com>", 0));
    target.fail_metadata_at("INBOX", 1);

    let report = reconcile(&mut source, &mut target, &copy_only(), |_| {}).unwrap();

    assert_eq!(report.stopped, StopReason::Completed);
    assert!(report.has_failures());
    let inbox = report.folder("INBOX").unwrap();
    assert!(inbox.is_failed());
    assert_eq!(inbox.counts.copied, 0);
    // Nothing was copied into a folder that could not be indexed
    assert_eq!(target.identities("INBOX"), vec!["<A@example.com>"]);

    let sent = report.folder("Sent").unwrap();
    assert!(!sent.is_failed());
    assert_eq!(sent.counts.copied, 1);
    let failed: Vec<_> = report.failed_folders().map(|f| f.source_folder.clone()).collect();
    assert_eq!(failed, vec!["INBOX"]);
}

#[test]
fn test_source_selection_failure_reported() {
    let mut source = source_abc();
    source.add_message("Broken", make_message("<broken@example.com>", 9));
    source.fail_select("Broken");
    let mut target = InMemoryMailStore::new("target");

    let report = reconcile(&mut source, &mut target, &copy_only(), |_| {}).unwrap();

    let broken = report.folder("Broken").unwrap();
    let error = broken.error.as_deref().unwrap();
    assert!(error.contains("source"), "unexpected error: {}", error);
    assert_eq!(report.folder("INBOX").unwrap().counts.copied, 3);
    assert!(report.has_failures());
}

#[test]
fn test_skips_virtual_unselectable_and_deny_listed_folders() {
    let mut source = InMemoryMailStore::new("source");
    source.add_message("INBOX", make_message("<in@example.com>", 0));
    source.add_message("[Gmail]/All Mail", make_message("<all@example.com>", 1));
    source.add_message("Everything", make_message("<every@example.com>", 2));
    source.add_folder("Everything", FolderAttributes::VIRTUAL);
    source.add_message("Parent", make_message("<parent@example.com>", 3));
    source.add_folder("Parent", FolderAttributes::NO_SELECT);
    source.add_message("Junk", make_message("<junk@example.com>", 4));
    let mut target = InMemoryMailStore::new("target");

    let options = copy_only().with_selector(FolderSelector::new().with_skipped(["Junk"]));
    let report = reconcile(&mut source, &mut target, &options, |_| {}).unwrap();

    assert_eq!(report.folders.len(), 1);
    assert_eq!(report.folders[0].source_folder, "INBOX");
    for skipped in ["[Gmail]/All Mail", "Everything", "Parent", "Junk"] {
        assert!(!target.has_folder(skipped), "{} should be skipped", skipped);
    }
}

#[test]
fn test_subscription_follows_source() {
    let mut source = InMemoryMailStore::new("source");
    source.add_message("Lists", make_message("<l@example.com>", 0));
    source.add_message("Quiet", make_message("<q@example.com>", 1));
    source.subscribe("Lists");
    let mut target = InMemoryMailStore::new("target");

    reconcile(&mut source, &mut target, &copy_only(), |_| {}).unwrap();
    assert!(target.is_subscribed("Lists"));
    assert!(!target.is_subscribed("Quiet"));

    // Already subscribed: no second call
    target.clear_ops();
    reconcile(&mut source, &mut target, &copy_only(), |_| {}).unwrap();
    assert!(
        !target
            .ops()
            .iter()
            .any(|op| matches!(op, StoreOp::Subscribe { .. }))
    );
}

#[test]
fn test_body_failures_are_counted_and_walk_continues() {
    let mut source = source_abc();
    source.fail_body_at("INBOX", 3);
    let mut target = InMemoryMailStore::new("target");

    let report = reconcile(&mut source, &mut target, &copy_only(), |_| {}).unwrap();

    let counts = report.folder("INBOX").unwrap().counts;
    assert_eq!(counts.copied, 2);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.skipped, 0);
    assert_eq!(
        sorted(target.identities("INBOX")),
        vec!["<A@example.com>", "<B@example.com>"]
    );
}

#[test]
fn test_append_failures_are_counted() {
    let mut source = source_abc();
    let mut target = InMemoryMailStore::new("target");
    target.fail_appends(true);

    let report = reconcile(&mut source, &mut target, &copy_only(), |_| {}).unwrap();
    let counts = report.totals();
    assert_eq!(counts.failed, 3);
    assert_eq!(counts.copied, 0);
}

#[test]
fn test_unreadable_source_message_blocks_sync_delete() {
    let mut source = source_abc();
    source.fail_metadata_at("INBOX", 2);
    let mut target = InMemoryMailStore::new("target");
    for id in ["<A@example.com>", "<B@example.com>", "<C@example.com>"] {
        target.add_message("INBOX", make_message(id, 0));
    }
    target.add_message("INBOX", make_message("<D@example.com>", 5));

    let sync = mode(|m| m.sync(true));
    let report = reconcile(&mut source, &mut target, &sync, |_| {}).unwrap();

    let counts = report.folder("INBOX").unwrap().counts;
    assert_eq!(counts.unreadable, 1);
    assert_eq!(counts.skipped, 2);
    assert_eq!(counts.deleted, 0);
    assert_eq!(target.messages("INBOX").len(), 4);
}

#[test]
fn test_sync_precondition_kept_exactly() {
    // Target has D but lacks C: counts are equal, so no deletion happens
    // even though D is surplus.
    let mut source = InMemoryMailStore::new("source");
    source.add_message("INBOX", make_message("<A@example.com>", 0));
    source.add_message("INBOX", make_message("<C@example.com>", 2));
    source.fail_body_at("INBOX", 2);
    let mut target = InMemoryMailStore::new("target");
    target.add_message("INBOX", make_message("<A@example.com>", 0));
    target.add_message("INBOX", make_message("<D@example.com>", 3));

    let sync = mode(|m| m.sync(true));
    let report = reconcile(&mut source, &mut target, &sync, |_| {}).unwrap();

    let counts = report.folder("INBOX").unwrap().counts;
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.deleted, 0);
    assert!(target.identities("INBOX").contains(&"<D@example.com>".to_string()));
}

#[test]
fn test_sync_deletes_multiple_surplus_positions_descending() {
    let mut source = InMemoryMailStore::new("source");
    source.add_message("INBOX", make_message("<B@example.com>", 1));
    let mut target = InMemoryMailStore::new("target");
    target.add_message("INBOX", make_message("<X@example.com>", 0));
    target.add_message("INBOX", make_message("<B@example.com>", 1));
    target.add_message("INBOX", make_message("", 7));
    target.add_message("INBOX", make_message("<Y@example.com>", 2));

    let sync = mode(|m| m.sync(true));
    let report = reconcile(&mut source, &mut target, &sync, |_| {}).unwrap();

    assert_eq!(report.totals().deleted, 3);
    assert_eq!(deletes(&target), vec![4, 3, 1]);
    assert_eq!(target.identities("INBOX"), vec!["<B@example.com>"]);
}

#[test]
fn test_target_selection_failure_is_fatal() {
    let mut source = source_abc();
    source.add_message("Later", make_message("<later@example.com>", 9));
    let mut target = InMemoryMailStore::new("target");
    target.fail_select("INBOX");

    let err = reconcile(&mut source, &mut target, &copy_only(), |_| {}).unwrap_err();

    assert!(!err.is_recoverable());
    assert!(err.to_string().contains("target folder 'INBOX'"));
    assert_eq!(source.close_count(), 1);
    assert_eq!(target.close_count(), 1);
    assert!(!target.has_folder("Later"));
}

#[test]
fn test_interrupt_mid_folder() {
    let mut source = InMemoryMailStore::new("source");
    for i in 0..10 {
        source.add_message("INBOX", make_message(&format!("<m{}@example.com>", i), i));
    }
    let mut target = InMemoryMailStore::new("target");

    let flag = Arc::new(AtomicBool::new(false));
    let options = copy_only().with_interrupt(flag.clone());
    let mut seen = 0;
    let report = reconcile(&mut source, &mut target, &options, |event| {
        if let mailsync::SyncProgress::Message { .. } = event {
            seen += 1;
            if seen == 4 {
                flag.store(true, Ordering::Relaxed);
            }
        }
    })
    .unwrap();

    assert_eq!(report.stopped, StopReason::Interrupted);
    assert_eq!(report.totals().copied, 4);
    assert_eq!(target.messages("INBOX").len(), 4);
    assert_eq!(source.close_count(), 1);
    assert_eq!(target.close_count(), 1);

    // Re-running picks up where the interrupted run stopped
    let report = reconcile(&mut source, &mut target, &copy_only(), |_| {}).unwrap();
    assert_eq!(report.totals().copied, 6);
    assert_eq!(report.totals().skipped, 4);
}

#[test]
fn test_wipe_and_sync_rejected_before_connecting() {
    let config = MoveConfig::from_json(r#"{ "wipe": true, "sync": true }"#).unwrap();
    let result = RunMode::builder()
        .wipe(config.wipe)
        .sync(config.sync)
        .build();
    assert!(matches!(result, Err(SyncError::Configuration(_))));
}

#[test]
fn test_sqlite_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let source_path = temp_dir.path().join("source.db");
    let target_path = temp_dir.path().join("target.db");

    {
        let mut seed = SqliteMailStore::open(&source_path).unwrap();
        seed.select("INBOX").unwrap();
        seed.put_message(&make_message("<A@example.com>", 0)).unwrap();
        seed.put_message(&make_message("", 1)).unwrap();
        seed.select("Archive/2020").unwrap();
        seed.put_message(&make_message("<old@example.com>", -600)).unwrap();
        seed.set_subscribed("Archive/2020", true).unwrap();
        seed.close().unwrap();
    }

    let source_uri = format!("file://{}", source_path.display());
    let target_uri = format!("file://{}", target_path.display());
    let source_endpoint = Endpoint::parse(&source_uri).unwrap();
    let target_endpoint = Endpoint::parse(&target_uri).unwrap();

    let run = || {
        let mut source = open_store(&source_endpoint, Side::Source, true).unwrap();
        let mut target = open_store(&target_endpoint, Side::Target, false).unwrap();
        reconcile(source.as_mut(), target.as_mut(), &copy_only(), |_| {}).unwrap()
    };

    let first = run();
    assert_eq!(first.totals().copied, 3);
    assert_eq!(first.folders.len(), 2);

    let second = run();
    assert_eq!(second.totals().copied, 0);
    assert_eq!(second.totals().skipped, 3);

    let mut target = SqliteMailStore::open(&target_path).unwrap();
    assert_eq!(target.list_subscribed().unwrap(), vec!["Archive/2020"]);
    target.select("Archive/2020").unwrap();
    let copied = target.get_message(1).unwrap();
    assert_eq!(copied.identity, "<old@example.com>");
    assert_eq!(copied.timestamp, at(-600));
    assert!(copied.flags.seen);
}

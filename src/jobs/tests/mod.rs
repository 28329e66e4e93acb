use super::test_helpers::*;
use super::*;
use crate::error::{Error, FetchError};
use crate::types::{Event, ExportItem, JobStatus, PlanTier};
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;


fn zip_entries(bytes: &[u8]) -> Vec<(String, usize)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            (file.name().to_string(), data.len())
        })
        .collect()
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn partial_failures_still_complete() {
    let h = create_test_manager();
    let items = items(10);
    h.premium_event("evt", items.clone(), 16).await;
    for missing in [&items[3], &items[7]] {
        h.fetch
            .respond(
                &missing.source_url,
                StubResponse::Fail(FetchError::HttpError { status: 404 }),
            )
            .await;
    }

    let id = h.manager.create_job("evt", "alice").await.unwrap();
    let job = wait_terminal(&h.manager, &id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_items, 10);
    assert_eq!(job.outputs.len(), 1);
    assert_eq!(job.outputs[0].entry_count, 8);
    assert!(job.error.is_none());

    let failed: Vec<_> = job.failed_items.iter().map(|f| f.item_id.as_str()).collect();
    assert_eq!(failed, vec!["p4", "p8"]);
    assert!(job.failed_items.iter().all(|f| f.code == "http_error"));

    let archive = h.store.get(&job.outputs[0].path).await.unwrap();
    let entries = zip_entries(&archive);
    assert_eq!(entries.len(), 8);
    assert_eq!(entries[0], ("Photo_1.jpg".to_string(), 16));
    assert!(!entries.iter().any(|(name, _)| name == "Photo_4.jpg"));

    let view = h.manager.job_view(&id).await.unwrap();
    assert_eq!(view.outputs, job.outputs);
    assert_eq!(view.progress_percent, 100.0);
}

#[tokio::test]
async fn all_items_failing_fails_the_job() {
    let h = create_test_manager();
    h.catalog
        .insert_event("evt", "alice", PlanTier::Premium, items(3))
        .await;

    let id = h.manager.create_job("evt", "alice").await.unwrap();
    let job = wait_terminal(&h.manager, &id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some(ALL_ITEMS_FAILED));
    assert_eq!(job.processed_items, 3);
    assert_eq!(job.failed_items.len(), 3);
    assert!(job.outputs.is_empty());
    assert!(h.store.paths().await.is_empty());
}

#[tokio::test]
async fn full_archives_are_split_into_parts() {
    let mut config = test_config();
    config.archive.max_archive_bytes = 25;
    config.fetch.max_file_bytes = 25;
    let h = create_test_manager_with(config, StubFetch::new());
    h.premium_event("evt", items(5), 10).await;
    let mut rx = h.manager.subscribe();

    let id = h.manager.create_job("evt", "alice").await.unwrap();
    let job = wait_terminal(&h.manager, &id).await;

    assert_eq!(job.status, JobStatus::Completed);
    let counts: Vec<_> = job.outputs.iter().map(|o| o.entry_count).collect();
    assert_eq!(counts, vec![2, 2, 1]);
    let parts: Vec<_> = job.outputs.iter().map(|o| o.part).collect();
    assert_eq!(parts, vec![1, 2, 3]);
    assert_eq!(
        job.outputs[2].path,
        format!("exports/evt/{id}/evt-part-3.zip")
    );

    // Every item lands in exactly one archive
    let mut names = Vec::new();
    for output in &job.outputs {
        let bytes = h.store.get(&output.path).await.unwrap();
        assert_eq!(output.size_bytes, bytes.len() as u64);
        names.extend(zip_entries(&bytes).into_iter().map(|(name, _)| name));
    }
    names.sort();
    assert_eq!(
        names,
        (1..=5).map(|i| format!("Photo_{i}.jpg")).collect::<Vec<_>>()
    );

    let ready = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, Event::ArchiveReady { .. }))
        .count();
    assert_eq!(ready, 3);
}

#[tokio::test]
async fn entry_larger_than_an_archive_is_recorded_as_failed() {
    let mut config = test_config();
    config.archive.max_archive_bytes = 20;
    config.fetch.max_file_bytes = 20;
    let h = create_test_manager_with(config, StubFetch::new());
    let items = items(3);
    h.premium_event("evt", items.clone(), 8).await;
    // The stub ignores the per-file cap, so the assembler sees the oversized entry
    h.fetch
        .respond(&items[1].source_url, StubResponse::Body(vec![0; 64]))
        .await;

    let id = h.manager.create_job("evt", "alice").await.unwrap();
    let job = wait_terminal(&h.manager, &id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.failed_items.len(), 1);
    assert_eq!(job.failed_items[0].item_id, "p2");
    assert_eq!(job.failed_items[0].code, "entry_too_large");
    // The oversized item does not close the shard early
    assert_eq!(job.outputs.len(), 1);
    let total_entries: usize = job.outputs.iter().map(|o| o.entry_count).sum();
    assert_eq!(total_entries, 2);
}

#[tokio::test]
async fn duplicate_display_names_are_numbered() {
    let h = create_test_manager();
    let items = vec![
        ExportItem::new("a", format!("{MEDIA_ORIGIN}/a.jpg"), "IMG.jpg"),
        ExportItem::new("b", format!("{MEDIA_ORIGIN}/b.jpg"), "IMG.jpg"),
        ExportItem::new("c", format!("{MEDIA_ORIGIN}/c.jpg"), "  "),
    ];
    h.premium_event("evt", items, 4).await;

    let id = h.manager.create_job("evt", "alice").await.unwrap();
    let job = wait_terminal(&h.manager, &id).await;

    let bytes = h.store.get(&job.outputs[0].path).await.unwrap();
    let names: Vec<_> = zip_entries(&bytes).into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["IMG.jpg", "IMG-2.jpg", "_"]);
}

#[tokio::test]
async fn storage_failure_is_job_fatal() {
    let h = create_test_manager();
    h.premium_event("evt", items(2), 4).await;
    h.store.set_fail_puts(true);

    let id = h.manager.create_job("evt", "alice").await.unwrap();
    let job = wait_terminal(&h.manager, &id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.unwrap();
    assert!(error.contains("storage error"), "{error}");
    assert!(job.outputs.is_empty());
}

#[tokio::test]
async fn storage_failure_after_a_stored_shard_keeps_that_shard() {
    let mut config = test_config();
    config.archive.max_archive_bytes = 25;
    let h = create_test_manager_with(config, StubFetch::new());
    h.premium_event("evt", items(5), 10).await;
    h.store.fail_puts_after(1);

    let id = h.manager.create_job("evt", "alice").await.unwrap();
    let job = wait_terminal(&h.manager, &id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.clone().unwrap();
    assert!(error.contains("part-2.zip"), "{error}");
    assert_eq!(job.outputs.len(), 1);
    assert_eq!(job.outputs[0].part, 1);
    assert_eq!(job.outputs[0].entry_count, 2);

    // Stored shards stay reachable on the failed job
    let view = h.manager.job_view(&id).await.unwrap();
    assert_eq!(view.outputs.len(), 1);
    assert_eq!(h.store.paths().await, vec![job.outputs[0].path.clone()]);
}

#[tokio::test]
async fn worker_future_is_send() {
    fn assert_send<T: Send>(_: T) {}

    let h = create_test_manager();
    let id = crate::types::JobId::from("exp-send");
    assert_send(super::worker::run(&h.manager, &id, Vec::new()));
}

#[tokio::test]
async fn worker_panic_marks_job_failed() {
    let h = create_test_manager();
    let items = items(2);
    h.premium_event("evt", items.clone(), 4).await;
    h.fetch
        .respond(&items[1].source_url, StubResponse::Panic)
        .await;

    let id = h.manager.create_job("evt", "alice").await.unwrap();
    let job = wait_terminal(&h.manager, &id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("export worker panicked"));
    assert_eq!(job.processed_items, 1);

    // The supervisor also releases the job slot
    for _ in 0..100 {
        if h.manager.active_job_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("supervisor did not release the job");
}

#[tokio::test]
async fn transient_fetch_failures_are_retried() {
    let h = create_test_manager();
    let items = items(1);
    h.catalog
        .insert_event("evt", "alice", PlanTier::Premium, items.clone())
        .await;
    h.fetch
        .respond(
            &items[0].source_url,
            StubResponse::Fail(FetchError::Timeout { timeout_ms: 5 }),
        )
        .await;

    let id = h.manager.create_job("evt", "alice").await.unwrap();
    let job = wait_terminal(&h.manager, &id).await;

    // Initial attempt plus one retry
    assert_eq!(h.fetch.calls(), 2);
    assert_eq!(job.failed_items[0].code, "timeout");
}

#[tokio::test]
async fn exhausted_fetch_quota_fails_remaining_items() {
    let mut config = test_config();
    config.rate_limit.max_fetches_per_window = 2;
    let h = create_test_manager_with(config, StubFetch::new());
    h.premium_event("evt", items(4), 4).await;

    let id = h.manager.create_job("evt", "alice").await.unwrap();
    let job = wait_terminal(&h.manager, &id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.outputs[0].entry_count, 2);
    let codes: Vec<_> = job.failed_items.iter().map(|f| f.code.as_str()).collect();
    assert_eq!(codes, vec!["rate_limited", "rate_limited"]);
    assert_eq!(h.fetch.calls(), 2);
}

#[tokio::test]
async fn progress_events_are_monotonic() {
    let h = create_test_manager();
    h.premium_event("evt", items(6), 4).await;
    let mut rx = h.manager.subscribe();

    let id = h.manager.create_job("evt", "alice").await.unwrap();
    wait_terminal(&h.manager, &id).await;

    let events = drain(&mut rx);
    let progress: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            Event::ExportProgress {
                processed_items, ..
            } => Some(*processed_items),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![1, 2, 3, 4, 5, 6]);

    let kinds: Vec<_> = events.iter().map(Event::kind).collect();
    assert_eq!(kinds.first(), Some(&"export_initiated"));
    assert_eq!(kinds.last(), Some(&"export_completed"));
}

#[tokio::test]
async fn polling_a_finished_job_is_idempotent() {
    let h = create_test_manager();
    h.premium_event("evt", items(2), 4).await;

    let id = h.manager.create_job("evt", "alice").await.unwrap();
    wait_terminal(&h.manager, &id).await;

    let first = h.manager.job_view(&id).await.unwrap();
    let second = h.manager.job_view(&id).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn outputs_are_hidden_while_processing() {
    let gate = Arc::new(Semaphore::new(0));
    let h = create_test_manager_with(test_config(), StubFetch::gated(gate.clone()));
    h.premium_event("evt", items(2), 4).await;

    let id = h.manager.create_job("evt", "alice").await.unwrap();
    gate.add_permits(1);

    // Wait until the first item is processed, the second is blocked
    for _ in 0..500 {
        if h.manager.get_job(&id).await.unwrap().processed_items == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let view = h.manager.job_view(&id).await.unwrap();
    assert_eq!(view.status, JobStatus::Processing);
    assert_eq!(view.processed_items, 1);
    assert_eq!(view.progress_percent, 50.0);
    assert!(view.outputs.is_empty());

    gate.add_permits(1);
    let job = wait_terminal(&h.manager, &id).await;
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn proxy_download_enforces_quota() {
    let mut config = test_config();
    config.rate_limit.max_downloads_per_window = 1;
    let h = create_test_manager_with(config, StubFetch::new());
    let url = format!("{MEDIA_ORIGIN}/single.jpg");
    h.fetch
        .respond(&url, StubResponse::Body(b"one".to_vec()))
        .await;

    assert_eq!(h.manager.proxy_download(&url, "bob").await.unwrap(), b"one");

    match h.manager.proxy_download(&url, "bob").await.unwrap_err() {
        Error::RateLimited { identifier, .. } => assert_eq!(identifier, "download:bob"),
        other => panic!("expected RateLimited, got {other:?}"),
    }

    // Quotas are per caller
    assert!(h.manager.proxy_download(&url, "carol").await.is_ok());
}

#[tokio::test]
async fn proxy_download_surfaces_fetch_errors() {
    let h = create_test_manager();
    let err = h
        .manager
        .proxy_download(&format!("{MEDIA_ORIGIN}/missing.jpg"), "bob")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Fetch(FetchError::HttpError { status: 404 })
    ));
}

//! Crawl worker and trigger service tests
//!
//! These drive the worker thread and the service front end against the
//! scripted site, checking session lifetime, resume verification and
//! trigger admission.

use crate::support::*;
use manov_ingest::crawler::{CrawlOutcome, Pacer};
use manov_ingest::ingest::{CrawlJob, CrawlWorker, ResumeOrigin, ResumePoint};
use manov_ingest::storage::NovelStore;
use manov_ingest::{IngestError, IngestionService, IntermediateStore, SqliteNovelStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn spawn_worker(site: &ScriptedSite) -> CrawlWorker {
    CrawlWorker::spawn(
        Arc::new(site.clone()),
        ScriptedSite::extractor(),
        Pacer::immediate(),
    )
    .unwrap()
}

fn job(staging: &IntermediateStore, start: ResumePoint, max_chapters: i64) -> CrawlJob {
    CrawlJob {
        staging: staging.clone(),
        verify_start: start.origin != ResumeOrigin::Explicit,
        start,
        max_chapters,
    }
}

fn explicit_point(n: u32) -> ResumePoint {
    ResumePoint {
        url: chapter_url(n),
        chapter_num: 1,
        origin: ResumeOrigin::Explicit,
        verified: false,
    }
}

#[tokio::test]
async fn test_each_job_gets_its_own_session() {
    let dir = TempDir::new().unwrap();
    let staging = IntermediateStore::open(dir.path(), "sessions").unwrap();
    let site = ScriptedSite::new(chapter_chain(1, 2));
    let worker = spawn_worker(&site);
    let handle = worker.handle();

    let first = handle.submit(job(&staging, explicit_point(1), 0)).await.unwrap();
    assert_eq!(first.report.saved, vec![1, 2]);
    assert!(matches!(first.report.outcome, CrawlOutcome::Exhausted));

    let second = handle.submit(job(&staging, explicit_point(2), 0)).await.unwrap();
    assert_eq!(second.report.saved, vec![2]);
    assert_eq!(second.report.collisions, 0);

    assert_eq!(site.launches(), 2);
    assert_eq!(site.closes(), 2);

    stop(worker).await;
}

#[tokio::test]
async fn test_blocked_page_aborts_and_closes_session() {
    let dir = TempDir::new().unwrap();
    let staging = IntermediateStore::open(dir.path(), "blocked").unwrap();
    let site = ScriptedSite::new(chapter_chain(1, 3));
    site.block(&chapter_url(2));
    let worker = spawn_worker(&site);

    let result = worker
        .handle()
        .submit(job(&staging, explicit_point(1), 0))
        .await
        .unwrap();

    assert_eq!(result.report.saved, vec![1]);
    match &result.report.outcome {
        CrawlOutcome::Aborted(IngestError::FetchBlocked { url }) => {
            assert_eq!(url, &chapter_url(2));
        }
        other => panic!("expected blocked abort, got {:?}", other),
    }
    // Chapter 3 is never requested once 2 is blocked
    assert_eq!(site.requests(), vec![chapter_url(1), chapter_url(2)]);
    assert_eq!(site.closes(), 1);
    assert_eq!(staging.list_numbers().unwrap(), vec![1]);

    stop(worker).await;
}

#[tokio::test]
async fn test_verification_corrects_counted_number() {
    let dir = TempDir::new().unwrap();
    let staging = IntermediateStore::open(dir.path(), "verify").unwrap();
    let site = ScriptedSite::new(chapter_chain(20, 21));
    let worker = spawn_worker(&site);

    let counted = ResumePoint {
        url: chapter_url(20),
        chapter_num: 18,
        origin: ResumeOrigin::Intermediate,
        verified: false,
    };
    let result = worker.handle().submit(job(&staging, counted, 0)).await.unwrap();

    assert_eq!(result.start.chapter_num, 20);
    assert!(result.start.verified);
    assert_eq!(result.report.saved, vec![20, 21]);
    assert_eq!(site.requests()[0], chapter_url(20));

    stop(worker).await;
}

#[tokio::test]
async fn test_unnumbered_resume_page_keeps_candidate() {
    let dir = TempDir::new().unwrap();
    let staging = IntermediateStore::open(dir.path(), "prologue").unwrap();
    let url = format!("{}/txt/8848/prologue", ORIGIN);
    let mut pages = HashMap::new();
    pages.insert(url.clone(), chapter_html("序章 风起", "很久以前。", None));
    let site = ScriptedSite::new(pages);
    let worker = spawn_worker(&site);

    let candidate = ResumePoint {
        url,
        chapter_num: 7,
        origin: ResumeOrigin::Persisted,
        verified: false,
    };
    let result = worker
        .handle()
        .submit(job(&staging, candidate, 0))
        .await
        .unwrap();

    assert_eq!(result.start.chapter_num, 7);
    assert!(!result.start.verified);
    assert_eq!(result.report.saved, vec![7]);
    let record = staging.load(7).unwrap().unwrap();
    assert_eq!(record.title, "序章 风起");
    assert_eq!(record.content, "很久以前。");

    stop(worker).await;
}

#[tokio::test]
async fn test_unreachable_resume_page_keeps_candidate() {
    let dir = TempDir::new().unwrap();
    let staging = IntermediateStore::open(dir.path(), "gone").unwrap();
    let site = ScriptedSite::new(HashMap::new());
    let worker = spawn_worker(&site);

    let candidate = ResumePoint {
        url: chapter_url(30),
        chapter_num: 30,
        origin: ResumeOrigin::Persisted,
        verified: false,
    };
    let result = worker
        .handle()
        .submit(job(&staging, candidate, 0))
        .await
        .unwrap();

    assert_eq!(result.start.chapter_num, 30);
    assert!(!result.start.verified);
    assert!(result.report.saved.is_empty());
    assert!(matches!(
        result.report.outcome,
        CrawlOutcome::Aborted(IngestError::FetchFailed { .. })
    ));
    assert_eq!(site.closes(), 1);

    stop(worker).await;
}

#[tokio::test]
async fn test_submit_after_shutdown_fails() {
    let dir = TempDir::new().unwrap();
    let staging = IntermediateStore::open(dir.path(), "late").unwrap();
    let site = ScriptedSite::new(chapter_chain(1, 1));
    let worker = spawn_worker(&site);
    let handle = worker.handle();
    stop(worker).await;

    let result = handle.submit(job(&staging, explicit_point(1), 0)).await;
    assert!(matches!(result, Err(IngestError::Worker(_))));
    assert_eq!(site.launches(), 0);
}

fn service(site: &ScriptedSite, staging_root: &std::path::Path) -> IngestionService<SqliteNovelStore> {
    let store = shared(SqliteNovelStore::new_in_memory().unwrap());
    let llm = ScriptedLlm::new(LlmMode::Healthy);
    let (coordinator, worker) = build_coordinator(store, site, llm, staging_root, 0);
    IngestionService::new(coordinator, worker)
}

async fn stop_service(service: IngestionService<SqliteNovelStore>) {
    tokio::task::spawn_blocking(move || service.shutdown())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_trigger_rejects_bad_input() {
    let dir = TempDir::new().unwrap();
    let site = ScriptedSite::new(chapter_chain(1, 1));
    let service = service(&site, dir.path());

    assert!(!service.start_or_resume("  ", None, None).is_accepted());
    assert!(!service
        .start_or_resume("novel", Some("not a url"), Some("Novel"))
        .is_accepted());
    assert!(!service
        .start_or_resume("novel", Some("ftp://www.69shuba.com/txt/1"), Some("Novel"))
        .is_accepted());
    assert_eq!(site.launches(), 0);

    stop_service(service).await;
}

#[tokio::test]
async fn test_trigger_rejects_duplicate_in_flight_run() {
    let dir = TempDir::new().unwrap();
    let site = ScriptedSite::new(chapter_chain(1, 2)).with_latency(Duration::from_millis(50));
    let service = service(&site, dir.path());
    let url = chapter_url(1);

    let first = service.start_or_resume("busy", Some(&url), Some("Busy"));
    assert!(first.is_accepted());
    assert!(!service
        .start_or_resume("busy", Some(&url), Some("Busy"))
        .is_accepted());

    let manov_ingest::Trigger::Accepted(handle) = first else {
        unreachable!();
    };
    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.ingested, vec![1, 2]);

    // The slug is free again once the run has ended
    let again = service.start_or_resume("busy", None, None);
    let manov_ingest::Trigger::Accepted(handle) = again else {
        panic!("resume trigger was rejected");
    };
    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.skipped, vec![1, 2]);

    {
        let store = service.coordinator().store().lock().unwrap();
        let novel = store.find_novel_by_slug("busy").unwrap().unwrap();
        assert_eq!(store.count_chapters(novel.id).unwrap(), 2);
    }

    stop_service(service).await;
}

#[tokio::test]
async fn test_trigger_without_resume_state_reports_nothing() {
    let dir = TempDir::new().unwrap();
    let site = ScriptedSite::new(chapter_chain(1, 1));
    let service = service(&site, dir.path());

    let manov_ingest::Trigger::Accepted(handle) = service.start_or_resume("fresh", None, None)
    else {
        panic!("trigger was rejected");
    };
    assert!(handle.await.unwrap().is_none());
    assert_eq!(site.launches(), 0);

    stop_service(service).await;
}

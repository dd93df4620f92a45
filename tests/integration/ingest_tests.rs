//! End-to-end ingestion runs over a scripted site and LLM

use crate::support::*;
use chrono::Utc;
use manov_ingest::ingest::{CrawlStatus, IngestRequest, ResumeOrigin};
use manov_ingest::storage::NovelStore;
use manov_ingest::{IngestError, IntermediateStore, SqliteNovelStore};
use tempfile::TempDir;

fn explicit(slug: &str, start: u32, title: Option<&str>) -> IngestRequest {
    IngestRequest {
        slug: slug.to_string(),
        start_url: Some(chapter_url(start)),
        title: title.map(str::to_string),
    }
}

fn resume(slug: &str) -> IngestRequest {
    IngestRequest {
        slug: slug.to_string(),
        start_url: None,
        title: None,
    }
}

#[tokio::test]
async fn test_first_run_creates_novel_and_ingests() {
    let dir = TempDir::new().unwrap();
    let store = shared(SqliteNovelStore::new_in_memory().unwrap());
    let site = ScriptedSite::new(chapter_chain(1, 3));
    let llm = ScriptedLlm::new(LlmMode::Healthy);
    let (coordinator, worker) = build_coordinator(store.clone(), &site, llm, dir.path(), 0);

    let report = coordinator
        .run(&explicit("test-novel", 1, Some("Test Novel")))
        .await
        .unwrap();

    assert_eq!(report.ingested, vec![1, 2, 3]);
    assert!(report.skipped.is_empty());
    assert!(report.is_clean());
    let crawl = report.crawl.as_ref().unwrap();
    assert_eq!(crawl.outcome, CrawlStatus::Exhausted);
    assert_eq!(crawl.staged, vec![1, 2, 3]);

    {
        let store = store.lock().unwrap();
        let novel = store.find_novel_by_slug("test-novel").unwrap().unwrap();
        assert_eq!(novel.title, "Test Novel");
        assert_eq!(store.count_chapters(novel.id).unwrap(), 3);

        let chapter = store.find_chapter(novel.id, 2).unwrap().unwrap();
        assert_eq!(chapter.title, "第2章 标题2");
        assert_eq!(chapter.content, "第2章的正文。\n\n第二段。");
        assert_eq!(chapter.source_url.as_deref(), Some(chapter_url(2).as_str()));

        let translation = store.find_translation(chapter.id, "EN").unwrap().unwrap();
        assert_eq!(translation.title, "POLISHED[EN[第2章 标题2]]");
        assert_eq!(
            translation.content,
            "POLISHED[EN[第2章的正文。\n\n第二段。]]"
        );
        assert!(translation.is_published_at(Utc::now()));
    }

    // Staged records use the zero-padded layout
    assert!(dir.path().join("test-novel/chapter_0001.json").exists());
    assert_eq!(site.launches(), 1);
    assert_eq!(site.closes(), 1);

    stop(worker).await;
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = shared(SqliteNovelStore::new_in_memory().unwrap());
    let site = ScriptedSite::new(chapter_chain(1, 3));
    let llm = ScriptedLlm::new(LlmMode::Healthy);
    let (coordinator, worker) =
        build_coordinator(store.clone(), &site, llm.clone(), dir.path(), 0);

    let request = explicit("idem", 1, Some("Idem"));
    coordinator.run(&request).await.unwrap();
    let calls_after_first = llm.calls();

    let second = coordinator.run(&request).await.unwrap();
    assert!(second.ingested.is_empty());
    assert_eq!(second.skipped, vec![1, 2, 3]);
    assert_eq!(llm.calls(), calls_after_first);

    let store = store.lock().unwrap();
    let novel = store.find_novel_by_slug("idem").unwrap().unwrap();
    assert_eq!(store.count_chapters(novel.id).unwrap(), 3);
    assert_eq!(store.count_translations(novel.id).unwrap(), 3);
    drop(store);

    stop(worker).await;
}

#[tokio::test]
async fn test_resume_prefers_intermediate_ahead_of_persisted() {
    let dir = TempDir::new().unwrap();
    let store = shared(SqliteNovelStore::new_in_memory().unwrap());
    seed_chapters(
        &store,
        "resume",
        &(1..=15).map(|n| (n, Some(chapter_url(n)))).collect::<Vec<_>>(),
    );

    // An earlier crawl staged 1-20 but only 1-15 made it into the store
    let staging = IntermediateStore::open(dir.path(), "resume").unwrap();
    for n in 1..=20 {
        staging
            .save(&manov_ingest::IntermediateChapter {
                source_url: chapter_url(n),
                title: format!("第{}章 标题{}", n, n),
                content: format!("第{}章的正文。", n),
                chapter_num: n,
            })
            .unwrap();
    }

    let site = ScriptedSite::new(chapter_chain(20, 22));
    let llm = ScriptedLlm::new(LlmMode::Healthy);
    let (coordinator, worker) = build_coordinator(store.clone(), &site, llm, dir.path(), 0);

    let report = coordinator.run(&resume("resume")).await.unwrap();

    let start = report.start.as_ref().unwrap();
    assert_eq!(start.origin, ResumeOrigin::Intermediate);
    assert_eq!(start.url, chapter_url(20));
    assert_eq!(start.chapter_num, 20);
    assert!(start.verified);

    // Verification fetch, then the crawl itself starting at the same page
    assert_eq!(site.requests()[0], chapter_url(20));
    assert_eq!(report.crawl.as_ref().unwrap().staged, vec![20, 21, 22]);
    assert_eq!(report.ingested, (16..=22).collect::<Vec<_>>());
    assert_eq!(report.skipped, (1..=15).collect::<Vec<_>>());

    stop(worker).await;
}

#[tokio::test]
async fn test_resume_from_persisted_when_ahead() {
    let dir = TempDir::new().unwrap();
    let store = shared(SqliteNovelStore::new_in_memory().unwrap());
    seed_chapters(&store, "ahead", &[(15, Some(chapter_url(15)))]);

    let site = ScriptedSite::new(chapter_chain(15, 16));
    let llm = ScriptedLlm::new(LlmMode::Healthy);
    let (coordinator, worker) = build_coordinator(store.clone(), &site, llm, dir.path(), 0);

    let report = coordinator.run(&resume("ahead")).await.unwrap();
    let start = report.start.as_ref().unwrap();
    assert_eq!(start.origin, ResumeOrigin::Persisted);
    assert_eq!(start.url, chapter_url(15));
    assert_eq!(report.skipped, vec![15]);
    assert_eq!(report.ingested, vec![16]);

    stop(worker).await;
}

#[tokio::test]
async fn test_url_healing_after_aborted_crawl() {
    let dir = TempDir::new().unwrap();
    let store = shared(SqliteNovelStore::new_in_memory().unwrap());
    seed_chapters(&store, "heal", &[(3, None), (4, Some(chapter_url(4)))]);

    let staging = IntermediateStore::open(dir.path(), "heal").unwrap();
    staging
        .save(&manov_ingest::IntermediateChapter {
            source_url: chapter_url(3),
            title: "第3章 标题3".to_string(),
            content: "新抓取的正文".to_string(),
            chapter_num: 3,
        })
        .unwrap();
    staging
        .save(&manov_ingest::IntermediateChapter {
            source_url: String::new(),
            title: "第4章 标题4".to_string(),
            content: "旧记录".to_string(),
            chapter_num: 4,
        })
        .unwrap();

    // The start page is missing, so the crawl aborts immediately
    let site = ScriptedSite::new(Default::default());
    let llm = ScriptedLlm::new(LlmMode::Healthy);
    let (coordinator, worker) = build_coordinator(store.clone(), &site, llm, dir.path(), 0);

    let report = coordinator.run(&explicit("heal", 5, None)).await.unwrap();

    assert_eq!(report.crawl.as_ref().unwrap().outcome, CrawlStatus::Aborted);
    assert!(report
        .incidents
        .iter()
        .any(|e| matches!(e, IngestError::FetchFailed { .. })));
    assert_eq!(report.skipped, vec![3, 4]);
    assert_eq!(report.healed, vec![3, 4]);

    {
        let store = store.lock().unwrap();
        let novel = store.find_novel_by_slug("heal").unwrap().unwrap();
        let chapter = store.find_chapter(novel.id, 3).unwrap().unwrap();
        assert_eq!(chapter.source_url.as_deref(), Some(chapter_url(3).as_str()));
        // Healing never touches the stored content
        assert_eq!(chapter.content, "第3章的正文。");
    }
    assert_eq!(staging.load(4).unwrap().unwrap().source_url, chapter_url(4));
    assert_eq!(site.closes(), 1);

    stop(worker).await;
}

#[tokio::test]
async fn test_record_name_decides_chapter_number() {
    let dir = TempDir::new().unwrap();
    let store = shared(SqliteNovelStore::new_in_memory().unwrap());
    seed_chapters(&store, "keyed", &[(6, Some(chapter_url(6)))]);

    let staging = IntermediateStore::open(dir.path(), "keyed").unwrap();
    // Body disagrees with the record name
    std::fs::write(
        staging.dir().join("chapter_0007.json"),
        format!(
            r#"{{"source_url": "{}", "title": "第7章 标题7", "content": "正文七", "chapter_num": 8}}"#,
            chapter_url(7)
        ),
    )
    .unwrap();
    // Body has no number at all
    std::fs::write(
        staging.dir().join("chapter_0009.json"),
        r#"{"title": "第9章 标题9", "content": "正文九"}"#,
    )
    .unwrap();

    let site = ScriptedSite::new(Default::default());
    let llm = ScriptedLlm::new(LlmMode::Healthy);
    let (coordinator, worker) = build_coordinator(store.clone(), &site, llm, dir.path(), 0);

    let report = coordinator.run(&explicit("keyed", 10, None)).await.unwrap();
    assert_eq!(report.ingested, vec![7, 9]);
    assert!(report.failed.is_empty());

    {
        let store = store.lock().unwrap();
        let novel = store.find_novel_by_slug("keyed").unwrap().unwrap();
        let seventh = store.find_chapter(novel.id, 7).unwrap().unwrap();
        assert_eq!(seventh.content, "正文七");
        assert!(store.find_chapter(novel.id, 8).unwrap().is_none());
        assert!(store.find_chapter(novel.id, 9).unwrap().is_some());
    }

    // A second pass finds both under their record names
    let rerun = coordinator.run(&explicit("keyed", 10, None)).await.unwrap();
    assert!(rerun.ingested.is_empty());
    assert_eq!(rerun.skipped, vec![7, 9]);

    stop(worker).await;
}

#[tokio::test]
async fn test_persist_failure_is_isolated_and_retried() {
    let dir = TempDir::new().unwrap();
    let store = shared(FlakyStore::new(Some(7)));
    let site = ScriptedSite::new(chapter_chain(6, 8));
    let llm = ScriptedLlm::new(LlmMode::Healthy);
    let (coordinator, worker) = build_coordinator(store.clone(), &site, llm, dir.path(), 0);

    let request = explicit("flaky", 6, Some("Flaky"));
    let report = coordinator.run(&request).await.unwrap();

    assert_eq!(report.ingested, vec![6, 8]);
    assert_eq!(report.failed, vec![7]);
    assert!(report
        .incidents
        .iter()
        .any(|e| matches!(e, IngestError::PersistFailed { chapter: 7, .. })));
    {
        let store = store.lock().unwrap();
        let novel = store.find_novel_by_slug("flaky").unwrap().unwrap();
        assert!(store.find_chapter(novel.id, 7).unwrap().is_none());
    }

    // Next run picks chapter 7 up again
    store.lock().unwrap().fail_chapter = None;
    let retry = coordinator.run(&request).await.unwrap();
    assert_eq!(retry.ingested, vec![7]);
    assert_eq!(retry.skipped, vec![6, 8]);

    stop(worker).await;
}

#[tokio::test]
async fn test_polish_failure_commits_literal_translation() {
    let dir = TempDir::new().unwrap();
    let store = shared(SqliteNovelStore::new_in_memory().unwrap());
    let site = ScriptedSite::new(chapter_chain(1, 1));
    let llm = ScriptedLlm::new(LlmMode::PolishFails);
    let (coordinator, worker) = build_coordinator(store.clone(), &site, llm, dir.path(), 0);

    let report = coordinator
        .run(&explicit("literal", 1, Some("Literal")))
        .await
        .unwrap();

    assert_eq!(report.ingested, vec![1]);
    assert_eq!(report.degraded, vec![1]);
    assert!(report
        .incidents
        .iter()
        .any(|e| matches!(e, IngestError::TranslationDegraded { chapter: 1, .. })));

    let store = store.lock().unwrap();
    let novel = store.find_novel_by_slug("literal").unwrap().unwrap();
    let chapter = store.find_chapter(novel.id, 1).unwrap().unwrap();
    let translation = store.find_translation(chapter.id, "EN").unwrap().unwrap();
    assert_eq!(translation.content, "EN[第1章的正文。\n\n第二段。]");
    drop(store);

    stop(worker).await;
}

#[tokio::test]
async fn test_offline_llm_holds_chapters_back() {
    let dir = TempDir::new().unwrap();
    let store = shared(SqliteNovelStore::new_in_memory().unwrap());
    let site = ScriptedSite::new(chapter_chain(1, 2));
    let llm = ScriptedLlm::new(LlmMode::Offline);
    let (coordinator, worker) =
        build_coordinator(store.clone(), &site, llm.clone(), dir.path(), 0);

    let request = explicit("offline", 1, Some("Offline"));
    let report = coordinator.run(&request).await.unwrap();

    assert!(report.ingested.is_empty());
    assert_eq!(report.failed, vec![1, 2]);
    {
        let store = store.lock().unwrap();
        let novel = store.find_novel_by_slug("offline").unwrap().unwrap();
        assert_eq!(store.count_chapters(novel.id).unwrap(), 0);
        assert_eq!(store.count_translations(novel.id).unwrap(), 0);
    }

    // Once the model is back the same numbers are filled in
    llm.set_mode(LlmMode::Healthy);
    let retry = coordinator.run(&request).await.unwrap();
    assert_eq!(retry.ingested, vec![1, 2]);

    stop(worker).await;
}

#[tokio::test]
async fn test_ingest_only_retries_without_browser() {
    let dir = TempDir::new().unwrap();
    let store = shared(SqliteNovelStore::new_in_memory().unwrap());
    let site = ScriptedSite::new(chapter_chain(1, 2));
    let llm = ScriptedLlm::new(LlmMode::Offline);
    let (coordinator, worker) =
        build_coordinator(store.clone(), &site, llm.clone(), dir.path(), 0);

    let first = coordinator
        .run(&explicit("retry", 1, Some("Retry")))
        .await
        .unwrap();
    assert_eq!(first.failed, vec![1, 2]);
    assert_eq!(site.launches(), 1);

    llm.set_mode(LlmMode::Healthy);
    let report = coordinator.ingest_only("retry", None).await.unwrap();

    assert!(report.start.is_none());
    assert!(report.crawl.is_none());
    assert_eq!(report.ingested, vec![1, 2]);
    assert_eq!(site.launches(), 1);

    let unknown = coordinator.ingest_only("nobody", None).await;
    assert!(matches!(unknown, Err(IngestError::NovelNotFound { .. })));

    stop(worker).await;
}

#[tokio::test]
async fn test_budget_limits_crawl() {
    let dir = TempDir::new().unwrap();
    let store = shared(SqliteNovelStore::new_in_memory().unwrap());
    let site = ScriptedSite::new(chapter_chain(1, 10));
    let llm = ScriptedLlm::new(LlmMode::Healthy);
    let (coordinator, worker) = build_coordinator(store.clone(), &site, llm, dir.path(), 3);

    let report = coordinator
        .run(&explicit("budget", 1, Some("Budget")))
        .await
        .unwrap();

    let crawl = report.crawl.as_ref().unwrap();
    assert_eq!(crawl.outcome, CrawlStatus::BudgetReached);
    assert_eq!(crawl.staged, vec![1, 2, 3]);
    assert_eq!(report.ingested, vec![1, 2, 3]);

    stop(worker).await;
}

#[tokio::test]
async fn test_missing_resume_state_does_not_crawl() {
    let dir = TempDir::new().unwrap();
    let store = shared(SqliteNovelStore::new_in_memory().unwrap());
    let site = ScriptedSite::new(chapter_chain(1, 1));
    let llm = ScriptedLlm::new(LlmMode::Healthy);
    let (coordinator, worker) = build_coordinator(store, &site, llm, dir.path(), 0);

    let result = coordinator.run(&resume("unknown")).await;
    assert!(matches!(result, Err(IngestError::MissingResumeState { .. })));
    assert_eq!(site.launches(), 0);

    stop(worker).await;
}

#[tokio::test]
async fn test_unknown_novel_without_title_does_not_crawl() {
    let dir = TempDir::new().unwrap();
    let store = shared(SqliteNovelStore::new_in_memory().unwrap());
    let site = ScriptedSite::new(chapter_chain(1, 1));
    let llm = ScriptedLlm::new(LlmMode::Healthy);
    let (coordinator, worker) = build_coordinator(store, &site, llm, dir.path(), 0);

    let result = coordinator.run(&explicit("untitled", 1, None)).await;
    assert!(matches!(result, Err(IngestError::NovelNotFound { .. })));
    assert_eq!(site.launches(), 0);

    stop(worker).await;
}

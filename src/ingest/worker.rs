//! Dedicated crawl worker
//!
//! Browser-driven crawling runs on its own OS thread with a single-threaded
//! runtime, so a long challenge wait or a slow page never stalls the runtime
//! serving triggers. Callers submit a [`CrawlJob`] through a [`CrawlHandle`]
//! and await the reply; jobs run one at a time in submission order.

use crate::crawler::{
    ChapterExtractor, CrawlDriver, CrawlReport, CrawlRequest, Pacer, PageFetcher, SessionLauncher,
};
use crate::ingest::resume::{verify_resume_point, ResumePoint};
use crate::storage::IntermediateStore;
use crate::{IngestError, Result};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// One crawl session to run on the worker
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub staging: IntermediateStore,
    pub start: ResumePoint,
    /// Re-fetch the start page to confirm its chapter number first
    pub verify_start: bool,
    pub max_chapters: i64,
}

/// What the worker hands back for a job
#[derive(Debug)]
pub struct CrawlJobResult {
    /// The start point actually used, after verification
    pub start: ResumePoint,
    pub report: CrawlReport,
}

enum Message {
    Run {
        job: CrawlJob,
        reply: oneshot::Sender<Result<CrawlJobResult>>,
    },
    Shutdown,
}

/// Cloneable submission side of the worker
#[derive(Clone)]
pub struct CrawlHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl CrawlHandle {
    /// Submits a job and waits for it to finish
    pub async fn submit(&self, job: CrawlJob) -> Result<CrawlJobResult> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Run { job, reply })
            .map_err(|_| IngestError::Worker("crawl worker is not running".to_string()))?;

        rx.await
            .map_err(|_| IngestError::Worker("crawl worker dropped the job".to_string()))?
    }
}

/// Owns the worker thread
pub struct CrawlWorker {
    handle: CrawlHandle,
    thread: Option<JoinHandle<()>>,
}

impl CrawlWorker {
    /// Starts the worker thread
    pub fn spawn(
        launcher: Arc<dyn SessionLauncher>,
        extractor: ChapterExtractor,
        pacer: Pacer,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("crawl-worker".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to start crawl worker runtime: {}", e);
                        return;
                    }
                };
                runtime.block_on(serve(rx, launcher, extractor, pacer));
            })?;

        Ok(Self {
            handle: CrawlHandle { tx },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> CrawlHandle {
        self.handle.clone()
    }

    /// Stops accepting jobs after the queue drains and joins the thread
    ///
    /// Blocks the calling thread; call from outside the async runtime or via
    /// `spawn_blocking`.
    pub fn shutdown(mut self) {
        let _ = self.handle.tx.send(Message::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Crawl worker thread panicked");
            }
        }
    }
}

impl Drop for CrawlWorker {
    fn drop(&mut self) {
        // Detach rather than block; the thread exits once the queue drains
        if self.thread.is_some() {
            let _ = self.handle.tx.send(Message::Shutdown);
        }
    }
}

async fn serve(
    mut rx: mpsc::UnboundedReceiver<Message>,
    launcher: Arc<dyn SessionLauncher>,
    extractor: ChapterExtractor,
    pacer: Pacer,
) {
    debug!("Crawl worker started");
    while let Some(message) = rx.recv().await {
        match message {
            Message::Run { job, reply } => {
                let result = run_job(launcher.as_ref(), &extractor, &pacer, job).await;
                if reply.send(result).is_err() {
                    debug!("Crawl job finished after its caller went away");
                }
            }
            Message::Shutdown => break,
        }
    }
    debug!("Crawl worker stopped");
}

/// Runs one job inside a fresh browser session
///
/// The session is closed exactly once whichever way the job ends.
async fn run_job(
    launcher: &dyn SessionLauncher,
    extractor: &ChapterExtractor,
    pacer: &Pacer,
    job: CrawlJob,
) -> Result<CrawlJobResult> {
    let loader = launcher
        .launch()
        .await
        .map_err(|e| e.at(&job.start.url))?;
    let mut fetcher = PageFetcher::new(loader, extractor.clone());

    let result = crawl_with(&mut fetcher, pacer, job).await;
    fetcher.close().await;
    result
}

async fn crawl_with(fetcher: &mut PageFetcher, pacer: &Pacer, job: CrawlJob) -> Result<CrawlJobResult> {
    let start = if job.verify_start {
        verify_resume_point(fetcher, &job.start).await
    } else {
        job.start
    };

    info!(
        "Crawling from chapter {} at {}",
        start.chapter_num, start.url
    );
    let request = CrawlRequest {
        start_url: start.url.clone(),
        max_chapters: job.max_chapters,
        start_counter: start.chapter_num,
    };

    let report = CrawlDriver::new(fetcher, &job.staging, pacer)
        .run(&request)
        .await?;

    Ok(CrawlJobResult { start, report })
}

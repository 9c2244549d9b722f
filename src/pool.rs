// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::cache::ValidationCache;
use crate::episode::{DownloadContext, Refreshed, refresh_item};
use crate::error::{CacheError, DownloadError};
use crate::http::HttpClient;
use crate::item::Item;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Items of one feed waiting for a worker
///
/// Workers pop from the back; every item is handed out exactly once.
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    items: Arc<Mutex<Vec<Item>>>,
}

impl PendingQueue {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
        }
    }

    /// Take the next item, None once the queue is drained
    pub async fn pop(&self) -> Option<Item> {
        self.items.lock().await.pop()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

/// Serializes cache updates so each completion is applied and written whole
#[derive(Debug, Clone)]
pub struct CacheRecorder {
    cache: Arc<Mutex<ValidationCache>>,
    path: PathBuf,
}

impl CacheRecorder {
    pub fn new(cache: ValidationCache, path: &Path) -> Self {
        Self {
            cache: Arc::new(Mutex::new(cache)),
            path: path.to_path_buf(),
        }
    }

    /// Apply `item` to the cache and rewrite the cache file
    pub async fn record(&self, item: &Item) -> Result<(), CacheError> {
        let mut cache = self.cache.lock().await;
        *cache = std::mem::take(&mut *cache).apply([item]);
        cache.persist(&self.path).await
    }

    /// Current in-memory state
    pub async fn snapshot(&self) -> ValidationCache {
        self.cache.lock().await.clone()
    }
}

/// What a pool run produced
#[derive(Debug, Clone, Default)]
pub struct PoolOutcome {
    /// Items that were validated or downloaded and recorded
    pub completed: Vec<Item>,
    /// Title and reason for every item that failed
    pub failed: Vec<(String, String)>,
    /// Cache with every completion applied
    pub cache: ValidationCache,
}

impl PoolOutcome {
    /// Sum of local sizes over completed items
    pub fn total_bytes(&self) -> u64 {
        self.completed.iter().map(|item| item.byte_size).sum()
    }
}

/// Where one feed's pool writes its files
#[derive(Debug, Clone)]
pub struct PoolTarget {
    pub output_dir: PathBuf,
    pub cache_path: PathBuf,
    pub concurrency: usize,
    pub max_redirects: usize,
}

/// Everything a worker task shares with its siblings
struct WorkerShared<C> {
    client: C,
    queue: PendingQueue,
    recorder: CacheRecorder,
    output_dir: PathBuf,
    reporter: SharedProgressReporter,
    completed: Arc<Mutex<Vec<Item>>>,
    failed: Arc<Mutex<Vec<(String, String)>>>,
}

impl<C: Clone> Clone for WorkerShared<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            queue: self.queue.clone(),
            recorder: self.recorder.clone(),
            output_dir: self.output_dir.clone(),
            reporter: self.reporter.clone(),
            completed: self.completed.clone(),
            failed: self.failed.clone(),
        }
    }
}

/// Drain `items` with `target.concurrency` workers
///
/// A failing item is reported and skipped; it never stops its worker or
/// the pool. The cache file is rewritten after every completed item.
pub async fn run_pool<C: HttpClient + Clone + 'static>(
    client: &C,
    items: Vec<Item>,
    cache: ValidationCache,
    target: &PoolTarget,
    reporter: SharedProgressReporter,
) -> PoolOutcome {
    let shared = WorkerShared {
        client: client.clone(),
        queue: PendingQueue::new(items),
        recorder: CacheRecorder::new(cache, &target.cache_path),
        output_dir: target.output_dir.clone(),
        reporter,
        completed: Arc::new(Mutex::new(Vec::new())),
        failed: Arc::new(Mutex::new(Vec::new())),
    };

    let mut handles = Vec::new();
    for worker_id in 0..target.concurrency.max(1) {
        let context = DownloadContext {
            worker_id,
            max_redirects: target.max_redirects,
        };
        handles.push(tokio::spawn(run_worker(shared.clone(), context)));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "worker task ended abnormally");
        }
    }

    PoolOutcome {
        completed: std::mem::take(&mut *shared.completed.lock().await),
        failed: std::mem::take(&mut *shared.failed.lock().await),
        cache: shared.recorder.snapshot().await,
    }
}

async fn run_worker<C: HttpClient>(shared: WorkerShared<C>, context: DownloadContext) {
    let worker_id = context.worker_id;

    while let Some(item) = shared.queue.pop().await {
        let title = item.title.clone();
        shared.reporter.report(ProgressEvent::ItemStarting {
            worker_id,
            title: title.clone(),
        });

        let result = match refresh_item(
            &shared.client,
            item,
            &shared.output_dir,
            &context,
            &shared.reporter,
        )
        .await
        {
            Ok(refreshed) => shared
                .recorder
                .record(refreshed.item())
                .await
                .map(|()| refreshed)
                .map_err(DownloadError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(refreshed) => {
                let event = match &refreshed {
                    Refreshed::Cached(done) => ProgressEvent::ItemCached {
                        worker_id,
                        title,
                        byte_size: done.byte_size,
                    },
                    Refreshed::Fetched(done) => ProgressEvent::ItemCompleted {
                        worker_id,
                        title,
                        bytes_downloaded: done.byte_size,
                    },
                };
                shared.reporter.report(event);
                shared.completed.lock().await.push(refreshed.into_item());
            }
            Err(e) => {
                warn!(worker = worker_id, title = %title, error = %e, "item failed");
                shared.reporter.report(ProgressEvent::ItemFailed {
                    worker_id,
                    title: title.clone(),
                    error: e.to_string(),
                });
                shared.failed.lock().await.push((title, e.to_string()));
            }
        }
    }

    shared
        .reporter
        .report(ProgressEvent::WorkerFinished { worker_id });
}

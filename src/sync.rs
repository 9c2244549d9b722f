// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::cache::ValidationCache;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::feed::{is_url, load_feed};
use crate::http::HttpClient;
use crate::item::diff;
use crate::pool::{PoolTarget, run_pool};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::registry::Feed;

/// Result of syncing one feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedReport {
    pub feed: String,
    /// Local size of every completed item, downloaded or validated
    pub total_bytes: u64,
    /// Number of items that are current on disk
    pub completed: usize,
    /// Details of failed items (title, error message)
    pub failed_items: Vec<(String, String)>,
}

/// Result of syncing a selection of feeds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub feeds: Vec<FeedReport>,
    /// Feeds that could not be synced at all (name, error message)
    pub failed_feeds: Vec<(String, String)>,
}

impl RunReport {
    pub fn total_bytes(&self) -> u64 {
        self.feeds.iter().map(|feed| feed.total_bytes).sum()
    }
}

/// Synchronize one feed to its output directory
///
/// This:
/// 1. Loads the feed's validation cache
/// 2. Creates the output directory
/// 3. Fetches and parses the feed
/// 4. Diffs the items against the cache
/// 5. Runs the worker pool, which persists the cache after every item
/// 6. Flushes the cache once more
pub async fn sync_feed<C: HttpClient + Clone + 'static>(
    client: &C,
    feed: &Feed,
    config: &SyncConfig,
    reporter: SharedProgressReporter,
) -> Result<FeedReport, SyncError> {
    info!(feed = %feed.name, source = %feed.source_url, "syncing feed");
    reporter.report(ProgressEvent::FeedStarted {
        feed: feed.name.clone(),
        workers: feed.concurrency,
    });

    let cache = ValidationCache::load(&feed.cache_path).await?;
    prepare_output_dir(&feed.output_dir).await?;

    if is_url(&feed.source_url) {
        reporter.report(ProgressEvent::FetchingFeed {
            url: feed.source_url.clone(),
        });
    }
    let raw_items = load_feed(client, &feed.source_url).await?;

    reporter.report(ProgressEvent::FeedParsed {
        feed: feed.name.clone(),
        total_items: raw_items.len(),
    });

    let items = diff(raw_items, &cache);
    let target = PoolTarget {
        output_dir: feed.output_dir.clone(),
        cache_path: feed.cache_path.clone(),
        concurrency: feed.concurrency,
        max_redirects: config.max_redirects,
    };

    let outcome = run_pool(client, items, cache, &target, reporter.clone()).await;
    let total_bytes = outcome.total_bytes();

    outcome
        .cache
        .clone()
        .apply(&outcome.completed)
        .persist(&feed.cache_path)
        .await?;

    info!(
        feed = %feed.name,
        total_bytes,
        completed = outcome.completed.len(),
        failed = outcome.failed.len(),
        "feed synced"
    );
    reporter.report(ProgressEvent::FeedCompleted {
        feed: feed.name.clone(),
        total_bytes,
        completed: outcome.completed.len(),
        failed: outcome.failed.len(),
    });

    Ok(FeedReport {
        feed: feed.name.clone(),
        total_bytes,
        completed: outcome.completed.len(),
        failed_items: outcome.failed,
    })
}

/// Synchronize feeds strictly one after another
///
/// A feed that cannot be synced is recorded in the report and the run
/// moves on to the next one.
pub async fn sync_feeds<C: HttpClient + Clone + 'static>(
    client: &C,
    feeds: &[Feed],
    config: &SyncConfig,
    reporter: SharedProgressReporter,
) -> RunReport {
    let mut report = RunReport::default();

    for feed in feeds {
        match sync_feed(client, feed, config, reporter.clone()).await {
            Ok(feed_report) => report.feeds.push(feed_report),
            Err(e) => {
                warn!(feed = %feed.name, error = %e, "feed sync aborted");
                reporter.report(ProgressEvent::FeedFailed {
                    feed: feed.name.clone(),
                    error: e.to_string(),
                });
                report.failed_feeds.push((feed.name.clone(), e.to_string()));
            }
        }
    }

    report
}

/// Create the output directory and clean up `.partial` files left behind
/// by interrupted downloads
async fn prepare_output_dir(output_dir: &Path) -> Result<(), SyncError> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| SyncError::CreateDirectoryFailed {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

    let read_failed = |e: std::io::Error| SyncError::ReadDirectoryFailed {
        path: output_dir.to_path_buf(),
        source: e,
    };

    let mut entries = tokio::fs::read_dir(output_dir).await.map_err(read_failed)?;
    let mut partial_files_cleaned = 0;

    while let Some(entry) = entries.next_entry().await.map_err(read_failed)? {
        let path = entry.path();
        let is_partial = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(".partial"));

        if is_partial && tokio::fs::remove_file(&path).await.is_ok() {
            partial_files_cleaned += 1;
        }
    }

    if partial_files_cleaned > 0 {
        debug!(dir = %output_dir.display(), partial_files_cleaned, "removed stale partial files");
    }

    Ok(())
}

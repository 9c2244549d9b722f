// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Events emitted during feed synchronization for progress reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A feed sync begins with this many worker slots
    FeedStarted { feed: String, workers: usize },

    /// Feed document is being fetched
    FetchingFeed { url: String },

    /// Feed document has been parsed
    FeedParsed { feed: String, total_items: usize },

    /// A worker picked an item off the queue
    ItemStarting { worker_id: usize, title: String },

    /// The local copy is being checked against the upstream
    Validating { worker_id: usize, title: String },

    /// The upstream moved the item
    Redirected {
        worker_id: usize,
        title: String,
        location: String,
    },

    /// A body transfer is starting
    DownloadStarting {
        worker_id: usize,
        title: String,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update, sent once per received chunk
    DownloadProgress {
        worker_id: usize,
        title: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// The local copy is current; nothing was transferred
    ItemCached {
        worker_id: usize,
        title: String,
        byte_size: u64,
    },

    /// An item was downloaded and recorded
    ItemCompleted {
        worker_id: usize,
        title: String,
        bytes_downloaded: u64,
    },

    /// An item failed; the worker moves on
    ItemFailed {
        worker_id: usize,
        title: String,
        error: String,
    },

    /// A worker found the queue empty and stopped
    WorkerFinished { worker_id: usize },

    /// All workers of a feed are done
    FeedCompleted {
        feed: String,
        total_bytes: u64,
        completed: usize,
        failed: usize,
    },

    /// The feed could not be synced at all
    FeedFailed { feed: String, error: String },
}

impl ProgressEvent {
    /// Worker slot this event belongs to, None for feed-level events
    pub fn worker_id(&self) -> Option<usize> {
        match self {
            Self::ItemStarting { worker_id, .. }
            | Self::Validating { worker_id, .. }
            | Self::Redirected { worker_id, .. }
            | Self::DownloadStarting { worker_id, .. }
            | Self::DownloadProgress { worker_id, .. }
            | Self::ItemCached { worker_id, .. }
            | Self::ItemCompleted { worker_id, .. }
            | Self::ItemFailed { worker_id, .. }
            | Self::WorkerFinished { worker_id } => Some(*worker_id),
            _ => None,
        }
    }

    /// One human-readable status line describing this event
    pub fn status_line(&self) -> String {
        match self {
            Self::FeedStarted { feed, .. } => format!("Updating {feed}"),
            Self::FetchingFeed { url } => format!("Fetching feed {url}"),
            Self::FeedParsed { feed, total_items } => {
                format!("{feed}: {total_items} items in feed")
            }
            Self::ItemStarting { title, .. } => format!("Starting {title}"),
            Self::Validating { title, .. } => format!("Checking {title}"),
            Self::Redirected {
                title, location, ..
            } => format!("Following {title} to {location}"),
            Self::DownloadStarting { title, .. } => format!("Loading {title}"),
            Self::DownloadProgress {
                title,
                bytes_downloaded,
                total_bytes,
                ..
            } => match total_bytes {
                Some(total) if *total > 0 => format!(
                    "Downloading {title} {}%",
                    bytes_downloaded.saturating_mul(100) / total
                ),
                _ => format!("Downloading {title} {bytes_downloaded} bytes"),
            },
            Self::ItemCached { title, .. } => format!("Cached {title}"),
            Self::ItemCompleted { title, .. } => format!("Finished {title}"),
            Self::ItemFailed { title, error, .. } => format!("Error {title}: {error}"),
            Self::WorkerFinished { .. } => "Idle".to_string(),
            Self::FeedCompleted {
                feed,
                total_bytes,
                completed,
                failed,
            } => format!(
                "{feed}: {completed} items, {total_bytes} bytes total, {failed} failed"
            ),
            Self::FeedFailed { feed, error } => format!("Could not update {feed}: {error}"),
        }
    }
}

/// Trait for reporting progress events during synchronization.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Forwards every event to a channel so rendering runs in its own task
///
/// Events sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    /// Create a reporter and the receiving end a renderer drains
    pub fn new() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}

/// Writes status lines through `tracing` instead of drawing anything
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, event: ProgressEvent) {
        match (&event, event.worker_id()) {
            (ProgressEvent::DownloadProgress { .. }, Some(worker)) => {
                tracing::trace!(worker, "{}", event.status_line());
            }
            (ProgressEvent::ItemFailed { .. } | ProgressEvent::FeedFailed { .. }, worker) => {
                tracing::warn!(worker, "{}", event.status_line());
            }
            (_, worker) => tracing::info!(worker, "{}", event.status_line()),
        }
    }
}

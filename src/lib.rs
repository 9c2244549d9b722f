// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod cache;
pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod item;
pub mod pool;
pub mod progress;
pub mod registry;
pub mod sync;

// Re-export main types for convenience
pub use cache::ValidationCache;
pub use config::{DEFAULT_MAX_REDIRECTS, SyncConfig};
pub use episode::{DownloadContext, Refreshed, generate_filename, refresh_item};
pub use error::{CacheError, ConfigError, DownloadError, FeedError, SyncError};
pub use feed::{RawItem, is_url, load_feed, parse_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient, ResponseHead};
pub use item::{Item, diff};
pub use pool::{CacheRecorder, PendingQueue, PoolOutcome, PoolTarget, run_pool};
pub use progress::{
    ChannelReporter, LogReporter, NoopReporter, ProgressEvent, ProgressReporter,
    SharedProgressReporter,
};
pub use registry::{Feed, FeedEntry, Registry};
pub use sync::{FeedReport, RunReport, sync_feed, sync_feeds};

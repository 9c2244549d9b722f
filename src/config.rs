// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::time::Duration;

/// Redirect hops followed per phase before an item is given up on
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Run-wide settings handed to every component of a sync
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Path of the feed registry file
    pub config_path: PathBuf,
    /// Workers per feed when the registry entry does not set its own
    pub default_concurrency: usize,
    /// Log every step instead of rendering progress bars
    pub verbose: bool,
    /// Per-request timeout (None = transport default)
    pub request_timeout: Option<Duration>,
    /// Redirect hops followed while validating or fetching one item
    pub max_redirects: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("./config.json"),
            default_concurrency: 3,
            verbose: false,
            request_timeout: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

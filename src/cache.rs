// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::item::Item;

/// Persisted mapping of item URL to the entity tag it was last downloaded with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationCache {
    entries: BTreeMap<String, String>,
}

impl ValidationCache {
    /// Load a cache file; a missing file is an empty cache
    pub async fn load(path: &Path) -> Result<Self, CacheError> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(CacheError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        serde_json::from_slice(&content).map_err(|e| CacheError::JsonParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Record the outcome of `items`: a validator upserts, its absence removes
    pub fn apply<'a>(mut self, items: impl IntoIterator<Item = &'a Item>) -> Self {
        for item in items {
            match &item.validator {
                Some(validator) => {
                    self.entries.insert(item.url.clone(), validator.clone());
                }
                None => {
                    self.entries.remove(&item.url);
                }
            }
        }
        self
    }

    /// Atomically replace the file at `path` with this cache
    ///
    /// The document is written next to the target and renamed over it, so
    /// readers only ever see a complete file.
    pub async fn persist(&self, path: &Path) -> Result<(), CacheError> {
        let write_failed = |e: std::io::Error| CacheError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(write_failed)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let staging = staging_path(path);
        tokio::fs::write(&staging, json)
            .await
            .map_err(write_failed)?;
        if let Err(e) = tokio::fs::rename(&staging, path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(write_failed(e));
        }

        Ok(())
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(String::as_str)
    }

    pub fn insert(&mut self, url: impl Into<String>, validator: impl Into<String>) {
        self.entries.insert(url.into(), validator.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Directory holding one validation cache per feed, relative to the base dir
pub const CACHE_DIR: &str = "_etags";

/// Directory holding one download folder per feed, relative to the base dir
pub const DOWNLOAD_DIR: &str = "downloads";

/// One feed as written in the registry file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub name: String,
    pub url: String,
    #[serde(default, alias = "downloads", skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default, alias = "etags", skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    #[serde(default, alias = "concurrent", skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

impl FeedEntry {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            output_dir: None,
            cache_path: None,
            concurrency: None,
        }
    }

    /// Fill in defaults and anchor relative paths at `base_dir`
    pub fn resolve(&self, base_dir: &Path, default_concurrency: usize) -> Feed {
        let output_dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| Path::new(DOWNLOAD_DIR).join(&self.name));
        let cache_path = self
            .cache_path
            .clone()
            .unwrap_or_else(|| Path::new(CACHE_DIR).join(format!("{}.etags.json", self.name)));

        Feed {
            name: self.name.clone(),
            source_url: self.url.clone(),
            output_dir: base_dir.join(output_dir),
            cache_path: base_dir.join(cache_path),
            concurrency: self
                .concurrency
                .filter(|&c| c > 0)
                .unwrap_or(default_concurrency)
                .max(1),
        }
    }
}

/// A feed ready to sync, with every setting resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub name: String,
    /// Feed document location: an http(s) URL or a local path
    pub source_url: String,
    pub output_dir: PathBuf,
    pub cache_path: PathBuf,
    pub concurrency: usize,
}

/// The ordered list of configured feeds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default, alias = "podcasts")]
    pub feeds: Vec<FeedEntry>,
}

impl Registry {
    /// Load the registry; a missing file is an empty registry
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        serde_json::from_slice(&content).map_err(|e| ConfigError::JsonParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write the registry as pretty-printed JSON
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| ConfigError::WriteFailed {
                path: path.to_path_buf(),
                source: e,
            })
    }

    pub fn find(&self, name: &str) -> Option<&FeedEntry> {
        self.feeds.iter().find(|feed| feed.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.feeds.iter().map(|feed| feed.name.as_str())
    }

    /// Register a new feed, keeping entries sorted by name
    ///
    /// A name that is already taken leaves the registry unchanged.
    pub fn add(&mut self, name: &str, url: &str) -> Result<(), ConfigError> {
        if self.find(name).is_some() {
            return Err(ConfigError::DuplicateFeed(name.to_string()));
        }

        self.feeds.push(FeedEntry::new(name, url));
        self.feeds.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(())
    }

    /// Point an existing feed at a new source URL; nothing else changes
    pub fn update(&mut self, name: &str, url: &str) -> Result<(), ConfigError> {
        let entry = self
            .feeds
            .iter_mut()
            .find(|feed| feed.name == name)
            .ok_or_else(|| ConfigError::UnknownFeed(name.to_string()))?;

        entry.url = url.to_string();
        Ok(())
    }

    /// Resolve the feeds named in `filter` (all feeds when it is empty),
    /// in registry order
    pub fn select(&self, filter: &[String], base_dir: &Path, default_concurrency: usize) -> Vec<Feed> {
        self.feeds
            .iter()
            .filter(|feed| filter.is_empty() || filter.iter().any(|name| *name == feed.name))
            .map(|feed| feed.resolve(base_dir, default_concurrency))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn registry() -> Registry {
        Registry {
            feeds: vec![
                FeedEntry::new("alpha", "https://example.com/alpha.xml"),
                FeedEntry {
                    output_dir: Some(PathBuf::from("/media/beta")),
                    cache_path: Some(PathBuf::from("state/beta.json")),
                    concurrency: Some(5),
                    ..FeedEntry::new("beta", "https://example.com/beta.xml")
                },
            ],
        }
    }

    #[tokio::test]
    async fn load_missing_file_returns_empty_registry() {
        let dir = tempdir().unwrap();
        let registry = Registry::load(&dir.path().join("config.json")).await.unwrap();
        assert!(registry.feeds.is_empty());
    }

    #[tokio::test]
    async fn load_rejects_malformed_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ \"feeds\": [").unwrap();

        let result = Registry::load(&path).await;
        assert!(matches!(result, Err(ConfigError::JsonParseFailed { .. })));
    }

    #[tokio::test]
    async fn load_accepts_legacy_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
	"podcasts": [
		{ "name": "show", "url": "https://example.com/show.xml", "downloads": "/srv/show", "etags": "/srv/show.json", "concurrent": 2 }
	]
}"#,
        )
        .unwrap();

        let registry = Registry::load(&path).await.unwrap();
        let entry = registry.find("show").unwrap();
        assert_eq!(entry.output_dir, Some(PathBuf::from("/srv/show")));
        assert_eq!(entry.cache_path, Some(PathBuf::from("/srv/show.json")));
        assert_eq!(entry.concurrency, Some(2));
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        registry().save(&path).await.unwrap();
        assert_eq!(Registry::load(&path).await.unwrap(), registry());
    }

    #[test]
    fn add_keeps_entries_sorted() {
        let mut registry = registry();
        registry.add("aardvark", "https://example.com/a.xml").unwrap();

        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["aardvark", "alpha", "beta"]);
    }

    #[test]
    fn add_duplicate_leaves_registry_unchanged() {
        let mut registry = registry();
        let before = registry.clone();

        let result = registry.add("alpha", "https://other.example.com/feed.xml");

        assert!(matches!(result, Err(ConfigError::DuplicateFeed(name)) if name == "alpha"));
        assert_eq!(registry, before);
    }

    #[test]
    fn update_rewrites_only_url() {
        let mut registry = registry();
        registry.update("beta", "https://example.com/beta-v2.xml").unwrap();

        let beta = registry.find("beta").unwrap();
        assert_eq!(beta.url, "https://example.com/beta-v2.xml");
        assert_eq!(beta.output_dir, Some(PathBuf::from("/media/beta")));
        assert_eq!(beta.cache_path, Some(PathBuf::from("state/beta.json")));
        assert_eq!(beta.concurrency, Some(5));
        assert_eq!(registry.find("alpha"), self::registry().find("alpha"));
    }

    #[test]
    fn update_unknown_feed_fails() {
        let mut registry = registry();
        let result = registry.update("gamma", "https://example.com/gamma.xml");
        assert!(matches!(result, Err(ConfigError::UnknownFeed(_))));
        assert_eq!(registry, self::registry());
    }

    #[test]
    fn resolve_applies_defaults() {
        let feed = registry().feeds[0].resolve(Path::new("/work"), 3);

        assert_eq!(feed.output_dir, PathBuf::from("/work/downloads/alpha"));
        assert_eq!(feed.cache_path, PathBuf::from("/work/_etags/alpha.etags.json"));
        assert_eq!(feed.concurrency, 3);
        assert_eq!(feed.source_url, "https://example.com/alpha.xml");
    }

    #[test]
    fn resolve_respects_overrides() {
        let feed = registry().feeds[1].resolve(Path::new("/work"), 3);

        assert_eq!(feed.output_dir, PathBuf::from("/media/beta"));
        assert_eq!(feed.cache_path, PathBuf::from("/work/state/beta.json"));
        assert_eq!(feed.concurrency, 5);
    }

    #[test]
    fn resolve_never_yields_zero_workers() {
        let entry = FeedEntry {
            concurrency: Some(0),
            ..FeedEntry::new("zero", "https://example.com/z.xml")
        };
        assert_eq!(entry.resolve(Path::new("/work"), 0).concurrency, 1);
    }

    #[test]
    fn select_filters_by_name() {
        let feeds = registry().select(&["beta".to_string()], Path::new("/work"), 3);
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].name, "beta");
    }

    #[test]
    fn select_without_filter_returns_all_in_order() {
        let feeds = registry().select(&[], Path::new("/work"), 3);
        let names: Vec<_> = feeds.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }
}

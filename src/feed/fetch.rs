// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use bytes::Bytes;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::parse::{RawItem, parse_feed};

/// Fetch raw feed bytes from a URL (without parsing)
pub async fn fetch_feed_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes, FeedError> {
    let bytes = client
        .get_bytes(url)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;
    Ok(bytes)
}

/// Read raw feed bytes from a local file (without parsing)
pub async fn read_feed_file(path: &Path) -> Result<Vec<u8>, FeedError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| FeedError::FileReadFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Fetch and parse a feed from either a URL or a local file path
pub async fn load_feed<C: HttpClient>(client: &C, source: &str) -> Result<Vec<RawItem>, FeedError> {
    if is_url(source) {
        let bytes = fetch_feed_bytes(client, source).await?;
        parse_feed(&bytes)
    } else {
        let bytes = read_feed_file(Path::new(source)).await?;
        parse_feed(&bytes)
    }
}

/// Determine if a string is a URL or a file path
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, ResponseHead};
    use async_trait::async_trait;
    use tempfile::tempdir;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <description>Test</description>
    <item>
      <title>Only</title>
      <enclosure url="https://example.com/only.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    struct FeedOnlyClient;

    #[async_trait]
    impl HttpClient for FeedOnlyClient {
        async fn get_bytes(&self, _url: &str) -> Result<Bytes, reqwest::Error> {
            Ok(Bytes::from_static(FEED.as_bytes()))
        }

        async fn head(&self, _url: &str) -> Result<ResponseHead, reqwest::Error> {
            unreachable!("feeds are never validated")
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            unreachable!("feeds are never streamed")
        }
    }

    #[test]
    fn is_url_detects_http() {
        assert!(is_url("http://example.com/feed.xml"));
        assert!(is_url("https://example.com/feed.xml"));
    }

    #[test]
    fn is_url_rejects_file_paths() {
        assert!(!is_url("/path/to/feed.xml"));
        assert!(!is_url("./feed.xml"));
        assert!(!is_url("feed.xml"));
    }

    #[tokio::test]
    async fn load_feed_fetches_urls() {
        let items = load_feed(&FeedOnlyClient, "https://example.com/feed.xml")
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Only");
    }

    #[tokio::test]
    async fn load_feed_reads_local_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, FEED).unwrap();

        let items = load_feed(&FeedOnlyClient, path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(items[0].url, "https://example.com/only.mp3");
    }

    #[tokio::test]
    async fn load_feed_reports_missing_file() {
        let result = load_feed(&FeedOnlyClient, "/definitely/not/here.xml").await;
        assert!(matches!(result, Err(FeedError::FileReadFailed { .. })));
    }
}

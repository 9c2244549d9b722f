// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{ETAG, HeaderMap, LOCATION};
use std::pin::Pin;

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Status line and the headers the sync engine cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP status code
    pub status: u16,
    /// Content-Length header value, if present
    pub content_length: Option<u64>,
    /// Location header value, if present
    pub location: Option<String>,
    /// ETag header value, if present
    pub etag: Option<String>,
}

impl ResponseHead {
    /// Whether this status asks the client to go elsewhere
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    /// Whether the upstream reported an error
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// Whether the response carries the requested body
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn from_response(response: &reqwest::Response) -> Self {
        let headers = response.headers();
        Self {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            location: header_string(headers, LOCATION),
            etag: header_string(headers, ETAG),
        }
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

/// HTTP response with its head and body stream
pub struct HttpResponse {
    pub head: ResponseHead,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

/// HTTP client abstraction for testability
///
/// `head` and `get_stream` must not follow redirects themselves: the
/// download engine inspects every 3xx so it can track where an item moved.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch the entire response body as bytes, following redirects
    async fn get_bytes(&self, url: &str) -> Result<Bytes, reqwest::Error>;

    /// Issue a metadata-only request
    async fn head(&self, url: &str) -> Result<ResponseHead, reqwest::Error>;

    /// Get a streaming response for large downloads
    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error>;
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    /// Used for feed documents, follows redirects transparently
    feed_client: reqwest::Client,
    /// Used for items, surfaces redirects to the caller
    item_client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient with default settings
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(None)
    }

    /// Create a new ReqwestClient applying `timeout` to every request
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut feed_builder = reqwest::Client::builder();
        let mut item_builder =
            reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());

        if let Some(timeout) = timeout {
            feed_builder = feed_builder.timeout(timeout);
            item_builder = item_builder.timeout(timeout);
        }

        Ok(Self {
            feed_client: feed_builder.build()?,
            item_client: item_builder.build()?,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_bytes(&self, url: &str) -> Result<Bytes, reqwest::Error> {
        self.feed_client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await
    }

    async fn head(&self, url: &str) -> Result<ResponseHead, reqwest::Error> {
        let response = self.item_client.head(url).send().await?;
        Ok(ResponseHead::from_response(&response))
    }

    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let response = self.item_client.get(url).send().await?;
        let head = ResponseHead::from_response(&response);
        let body: ByteStream = Box::pin(response.bytes_stream());

        Ok(HttpResponse { head, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reqwest_client_can_be_created() {
        let _client = ReqwestClient::new().unwrap();
        let _with_timeout = ReqwestClient::with_timeout(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn redirect_statuses_are_recognized() {
        for status in [301, 302, 303, 307, 308] {
            let head = ResponseHead {
                status,
                ..Default::default()
            };
            assert!(head.is_redirect(), "{status} should redirect");
            assert!(!head.is_error());
        }
    }

    #[test]
    fn other_statuses_are_not_redirects() {
        for status in [200, 204, 304, 404, 500] {
            let head = ResponseHead {
                status,
                ..Default::default()
            };
            assert!(!head.is_redirect(), "{status} should not redirect");
        }
    }

    #[test]
    fn error_threshold_is_400() {
        let ok = ResponseHead {
            status: 399,
            ..Default::default()
        };
        let err = ResponseHead {
            status: 400,
            ..Default::default()
        };
        assert!(!ok.is_error());
        assert!(err.is_error());
    }

    #[test]
    fn only_2xx_is_success() {
        for status in [200, 204, 299] {
            let head = ResponseHead {
                status,
                ..Default::default()
            };
            assert!(head.is_success(), "{status} should succeed");
        }
        for status in [100, 199, 300, 304, 404] {
            let head = ResponseHead {
                status,
                ..Default::default()
            };
            assert!(!head.is_success(), "{status} should not succeed");
        }
    }
}

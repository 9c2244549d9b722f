// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use crate::error::DownloadError;
use crate::http::{HttpClient, HttpResponse, ResponseHead};
use crate::item::Item;
use crate::progress::{ProgressEvent, SharedProgressReporter};

use super::filename::generate_filename;

/// Context for one worker running the engine
#[derive(Debug, Clone)]
pub struct DownloadContext {
    /// Worker slot (0 to concurrency-1) for progress display
    pub worker_id: usize,
    /// Redirect hops followed per phase before giving up
    pub max_redirects: usize,
}

/// How `refresh_item` brought an item up to date
#[derive(Debug, Clone)]
pub enum Refreshed {
    /// The local copy was current; nothing was transferred
    Cached(Item),
    /// The body was downloaded
    Fetched(Item),
}

impl Refreshed {
    pub fn item(&self) -> &Item {
        match self {
            Self::Cached(item) | Self::Fetched(item) => item,
        }
    }

    pub fn into_item(self) -> Item {
        match self {
            Self::Cached(item) | Self::Fetched(item) => item,
        }
    }
}

/// Bring one item's local copy up to date
///
/// A missing local file is always fetched. An existing one is validated
/// with a metadata-only request first and only fetched again when the
/// upstream entity tag differs from the cached one (or either is absent).
///
/// On success the item comes back with `destination`, `byte_size` and
/// `validator` set, and `source_url` pointing past any redirects.
pub async fn refresh_item<C: HttpClient>(
    client: &C,
    mut item: Item,
    output_dir: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<Refreshed, DownloadError> {
    let destination = output_dir.join(generate_filename(&item));
    item.destination = Some(destination.clone());

    if let Ok(metadata) = tokio::fs::metadata(&destination).await
        && is_current(client, &mut item, context, reporter).await?
    {
        item.byte_size = metadata.len();
        return Ok(Refreshed::Cached(item));
    }

    fetch(client, item, &destination, context, reporter)
        .await
        .map(Refreshed::Fetched)
}

/// Ask the upstream whether the cached validator still matches
async fn is_current<C: HttpClient>(
    client: &C,
    item: &mut Item,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<bool, DownloadError> {
    let mut hops = 0;

    loop {
        reporter.report(ProgressEvent::Validating {
            worker_id: context.worker_id,
            title: item.title.clone(),
        });

        let head = client
            .head(&item.source_url)
            .await
            .map_err(|e| DownloadError::HttpFailed {
                url: item.source_url.clone(),
                source: e,
            })?;

        debug!(
            url = %item.source_url,
            status = head.status,
            cached = ?item.validator,
            upstream = ?head.etag,
            "validated"
        );

        if head.is_redirect() {
            follow_redirect(item, &head, &mut hops, context, reporter)?;
            continue;
        }

        if head.is_error() {
            return Err(DownloadError::HttpStatus {
                url: item.source_url.clone(),
                status: head.status,
            });
        }

        return Ok(item.validator.is_some() && item.validator == head.etag);
    }
}

/// Stream the item body to its destination
async fn fetch<C: HttpClient>(
    client: &C,
    mut item: Item,
    destination: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<Item, DownloadError> {
    let mut hops = 0;

    let response = loop {
        let response = client
            .get_stream(&item.source_url)
            .await
            .map_err(|e| DownloadError::HttpFailed {
                url: item.source_url.clone(),
                source: e,
            })?;

        debug!(url = %item.source_url, status = response.head.status, "fetching");

        if response.head.is_redirect() {
            follow_redirect(&mut item, &response.head, &mut hops, context, reporter)?;
            continue;
        }

        if !response.head.is_success() {
            return Err(DownloadError::HttpStatus {
                url: item.source_url.clone(),
                status: response.head.status,
            });
        }

        break response;
    };

    reporter.report(ProgressEvent::DownloadStarting {
        worker_id: context.worker_id,
        title: item.title.clone(),
        content_length: response.head.content_length,
    });

    let etag = response.head.etag.clone();
    let partial = partial_path(destination);

    let bytes_downloaded =
        match write_body(&item, response, &partial, context, reporter).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

    if let Err(e) = tokio::fs::rename(&partial, destination).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(DownloadError::FileWriteFailed {
            path: destination.to_path_buf(),
            source: e,
        });
    }

    item.byte_size = bytes_downloaded;
    item.validator = etag;

    debug!(url = %item.url, bytes = bytes_downloaded, etag = ?item.validator, "saved");

    Ok(item)
}

async fn write_body(
    item: &Item,
    response: HttpResponse,
    partial: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let mut file = File::create(partial)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: partial.to_path_buf(),
            source: e,
        })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: item.source_url.clone(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: partial.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::DownloadProgress {
            worker_id: context.worker_id,
            title: item.title.clone(),
            bytes_downloaded,
            total_bytes: response.head.content_length,
        });
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: partial.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_downloaded)
}

/// Point the item at the redirect target, enforcing the hop bound
fn follow_redirect(
    item: &mut Item,
    head: &ResponseHead,
    hops: &mut usize,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<(), DownloadError> {
    *hops += 1;
    if *hops > context.max_redirects {
        return Err(DownloadError::TooManyRedirects {
            url: item.url.clone(),
            hops: context.max_redirects,
        });
    }

    let location = head
        .location
        .as_deref()
        .map(str::trim)
        .filter(|location| !location.is_empty())
        .ok_or_else(|| DownloadError::MissingLocation {
            url: item.source_url.clone(),
        })?;

    // Location may be relative to the URL that produced it
    let target = Url::parse(&item.source_url)
        .and_then(|base| base.join(location))
        .map(String::from)
        .unwrap_or_else(|_| location.to_string());

    debug!(from = %item.source_url, to = %target, hop = *hops, "redirect");

    reporter.report(ProgressEvent::Redirected {
        worker_id: context.worker_id,
        title: item.title.clone(),
        location: target.clone(),
    });

    item.source_url = target;
    Ok(())
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

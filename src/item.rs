// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use crate::cache::ValidationCache;
use crate::feed::RawItem;

/// One unit of work for a feed sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    /// URL as published by the feed; the validation cache is keyed by it
    pub url: String,
    /// Where the item currently lives, rewritten whenever a redirect is followed
    pub source_url: String,
    /// 1 for the oldest item of the feed, `count` for the newest
    pub sequence_index: usize,
    /// Entity tag known for this item, None if it was never downloaded
    pub validator: Option<String>,
    /// Set by the download engine once it starts on the item
    pub destination: Option<PathBuf>,
    /// Size of the local file, set on completion
    pub byte_size: u64,
}

/// Turn a feed's items into work items annotated with cached validators
///
/// Feeds list newest first, so the first item receives the highest index.
/// Nothing is filtered out: already validated items still get a cheap
/// conditional check.
pub fn diff(raw_items: Vec<RawItem>, cache: &ValidationCache) -> Vec<Item> {
    let count = raw_items.len();

    raw_items
        .into_iter()
        .enumerate()
        .map(|(position, raw)| Item {
            validator: cache.get(&raw.url).map(String::from),
            source_url: raw.url.clone(),
            url: raw.url,
            title: raw.title,
            sequence_index: count - position,
            destination: None,
            byte_size: 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(title: &str, url: &str) -> RawItem {
        RawItem {
            title: title.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn diff_numbers_items_oldest_first() {
        let items = diff(
            vec![
                raw("Newest", "https://example.com/3.mp3"),
                raw("Middle", "https://example.com/2.mp3"),
                raw("Oldest", "https://example.com/1.mp3"),
            ],
            &ValidationCache::default(),
        );

        let indices: Vec<_> = items.iter().map(|i| i.sequence_index).collect();
        assert_eq!(indices, vec![3, 2, 1]);
        assert_eq!(items[2].title, "Oldest");
    }

    #[test]
    fn diff_uses_each_index_once() {
        let raws: Vec<_> = (0..17)
            .map(|n| raw(&format!("Ep {n}"), &format!("https://example.com/{n}.mp3")))
            .collect();

        let mut indices: Vec<_> = diff(raws, &ValidationCache::default())
            .into_iter()
            .map(|i| i.sequence_index)
            .collect();
        indices.sort_unstable();

        assert_eq!(indices, (1..=17).collect::<Vec<_>>());
    }

    #[test]
    fn diff_copies_validators_from_cache() {
        let mut cache = ValidationCache::default();
        cache.insert("https://example.com/known.mp3", "\"abc\"");

        let items = diff(
            vec![
                raw("Known", "https://example.com/known.mp3"),
                raw("Fresh", "https://example.com/fresh.mp3"),
            ],
            &cache,
        );

        assert_eq!(items[0].validator.as_deref(), Some("\"abc\""));
        assert_eq!(items[1].validator, None);
    }

    #[test]
    fn diff_starts_at_the_published_url() {
        let items = diff(
            vec![raw("Ep", "https://example.com/ep.mp3")],
            &ValidationCache::default(),
        );

        assert_eq!(items[0].source_url, items[0].url);
        assert_eq!(items[0].destination, None);
        assert_eq!(items[0].byte_size, 0);
    }

    #[test]
    fn diff_of_empty_feed_is_empty() {
        assert!(diff(Vec::new(), &ValidationCache::default()).is_empty());
    }
}

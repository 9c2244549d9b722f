// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::FeedError;

/// One downloadable entry of a feed, in feed order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub url: String,
}

/// Parse RSS feed XML bytes into the items that carry an enclosure
pub fn parse_feed(xml_bytes: &[u8]) -> Result<Vec<RawItem>, FeedError> {
    let cleaned = clean_xml(&String::from_utf8_lossy(xml_bytes));
    let channel = rss::Channel::read_from(cleaned.as_bytes())?;

    Ok(channel.items().iter().filter_map(parse_item).collect())
}

fn parse_item(item: &rss::Item) -> Option<RawItem> {
    let url = item
        .enclosure()
        .map(|enclosure| enclosure.url().trim())
        .filter(|url| !url.is_empty())?;

    // Some feeds double-escape entities in titles
    let title = item
        .title()
        .map(|t| html_escape::decode_html_entities(t).into_owned())
        .unwrap_or_default();

    Some(RawItem {
        title,
        url: url.to_string(),
    })
}

/// `&nbsp;` is an HTML entity, not an XML one; strict parsers reject it
fn clean_xml(xml: &str) -> String {
    xml.replace("&amp;nbsp;", " ").replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Podcast</title>
    <description>A test podcast for unit testing</description>
    <link>https://example.com</link>
    <item>
      <title>Episode 2</title>
      <enclosure url="https://example.com/ep2.mp3" length="1234567" type="audio/mpeg"/>
    </item>
    <item>
      <title>Show notes only</title>
    </item>
    <item>
      <title>Episode 1</title>
      <enclosure url="https://example.com/ep1.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parse_feed_keeps_feed_order() {
        let items = parse_feed(SAMPLE_FEED.as_bytes()).unwrap();

        assert_eq!(
            items,
            vec![
                RawItem {
                    title: "Episode 2".to_string(),
                    url: "https://example.com/ep2.mp3".to_string(),
                },
                RawItem {
                    title: "Episode 1".to_string(),
                    url: "https://example.com/ep1.mp3".to_string(),
                },
            ]
        );
    }

    #[test]
    fn parse_feed_skips_items_without_enclosure() {
        let items = parse_feed(SAMPLE_FEED.as_bytes()).unwrap();
        assert!(items.iter().all(|item| item.title != "Show notes only"));
    }

    #[test]
    fn parse_feed_tolerates_nbsp_entities() {
        let feed = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <description>Test</description>
    <item>
      <title>Hello&nbsp;World</title>
      <enclosure url="https://example.com/a.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

        let items = parse_feed(feed.as_bytes()).unwrap();
        assert_eq!(items[0].title, "Hello World");
    }

    #[test]
    fn parse_feed_decodes_double_escaped_titles() {
        let feed = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <description>Test</description>
    <item>
      <title>Q&amp;amp;A</title>
      <enclosure url="https://example.com/qa.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

        let items = parse_feed(feed.as_bytes()).unwrap();
        assert_eq!(items[0].title, "Q&A");
    }

    #[test]
    fn parse_feed_defaults_missing_title_to_empty() {
        let feed = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <description>Test</description>
    <item>
      <enclosure url="https://example.com/untitled.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

        let items = parse_feed(feed.as_bytes()).unwrap();
        assert_eq!(items[0].title, "");
    }

    #[test]
    fn parse_feed_rejects_garbage() {
        assert!(parse_feed(b"this is not xml").is_err());
    }
}

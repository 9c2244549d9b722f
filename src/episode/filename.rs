// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use url::Url;

use crate::item::Item;

/// Maximum length in bytes for the title portion of a filename
///
/// Together with the index prefix, the extension and the `.partial` suffix
/// this stays under the 255 byte name limit of common filesystems.
const MAX_TITLE_LENGTH: usize = 200;

/// Longer trailing segments are not treated as an extension
const MAX_EXTENSION_LENGTH: usize = 10;

/// Generate a filename stem (without extension) for an item
///
/// Format: "[index] title", stripped of anything a filesystem would reject
pub fn generate_filename_stem(item: &Item) -> String {
    let title = clean_title(&item.title);
    let title = truncate_at_boundary(&title, MAX_TITLE_LENGTH);
    sanitize_filename::sanitize(format!("[{}] {}", item.sequence_index, title))
}

/// Get the file extension (with leading dot) from an item's published URL
///
/// The query string and fragment never contribute. Returns an empty string
/// when the last path segment has no extension.
pub fn get_extension(item: &Item) -> String {
    let last_segment = match Url::parse(&item.url) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string(),
        Err(_) => item
            .url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .unwrap_or_default()
            .to_string(),
    };

    match last_segment.rfind('.') {
        Some(0) | None => String::new(),
        Some(pos) => {
            let ext = &last_segment[pos + 1..];
            if !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LENGTH
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
            {
                format!(".{ext}")
            } else {
                String::new()
            }
        }
    }
}

/// Generate a complete filename for an item (with extension)
pub fn generate_filename(item: &Item) -> String {
    format!("{}{}", generate_filename_stem(item), get_extension(item))
}

/// Neutralize separators and stray HTML entities before sanitizing
fn clean_title(title: &str) -> String {
    title
        .replace(['/', '\\'], "-")
        .replace("&amp;", "and")
        .replace("&nbsp;", " ")
}

/// Cut `s` to at most `max_len` bytes on a char boundary, preferring the
/// last space in the second half
fn truncate_at_boundary(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }

    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }

    let truncated = &s[..end];
    if let Some(pos) = truncated.rfind(' ')
        && pos > max_len / 2
    {
        return truncated[..pos].trim_end();
    }

    truncated.trim_end()
}

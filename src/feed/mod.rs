mod fetch;
mod parse;

pub use fetch::{is_url, load_feed};
pub use parse::{RawItem, parse_feed};

mod download;
mod filename;

pub use download::{DownloadContext, Refreshed, refresh_item};
pub use filename::{generate_filename, generate_filename_stem, get_extension};

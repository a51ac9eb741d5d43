//! Flat-file persistence: the dedup cache, per-cycle batch files and
//! downloaded images.

pub mod batch;
pub mod cache;
pub mod fs;
pub mod media;


pub use batch::{BatchFile, BatchRecord, BatchWriter};
pub use cache::DedupCache;
pub use media::{HttpImageFetcher, MediaDownloader};

//! On-disk storage of raw feed responses.
//!
//! The cache keeps the unmodified bytes of the last successful fetch per
//! URL. Parsed trees are never stored; every load re-parses.

mod cache;

pub use cache::{cache_key, CacheStore};

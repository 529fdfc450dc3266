//! Fetch RSS and Atom feeds and read them as a normalized tag tree.
//!
//! A load runs the pipeline fetch → parse → validate → normalize:
//!
//! - [`Fetcher`] serves a fresh disk-cached copy when one exists, otherwise
//!   performs one request; if that fails it falls back to the cached copy
//!   however old it is.
//! - The response is parsed leniently into a [`Node`] tree.
//! - RSS documents must contain a `channel`, Atom documents must declare
//!   [`ATOM_NAMESPACE`](feed::ATOM_NAMESPACE).
//! - Namespaced children become plain `prefix:name` tags (`dc:date`) and
//!   each item or entry gets a `timestamp` tag with its date in epoch
//!   seconds.
//!
//! The resulting [`Feed`] is read-only.
//!
//! ```no_run
//! use feedtree::{Config, Credentials, Feed, Fetcher};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default().with_cache_dir("/tmp/feeds");
//! let fetcher = Fetcher::new(config)?;
//!
//! let credentials = Credentials::new("reader", Some("secret"));
//! let feed = Feed::load_atom(&fetcher, "https://example.com/atom.xml", Some(&credentials)).await?;
//! println!("{}", serde_json::to_string_pretty(&feed.to_mapping())?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod feed;
pub mod storage;
pub mod util;

pub use config::{Config, ConfigError};
pub use feed::{
    Credentials, Dialect, Feed, FeedError, FetchError, Fetcher, Node, ParseError, ParseOptions,
};

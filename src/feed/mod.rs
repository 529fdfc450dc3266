//! Loading RSS and Atom feeds into a read-only, normalized tag tree.
//!
//! - **Fetching**: cache-aware retrieval with stale-copy fallback ([`Fetcher`])
//! - **Parsing**: lenient XML to [`Node`] tree ([`parse_document`])
//! - **Normalization**: `prefix:name` tags for namespaced children and a
//!   derived `timestamp` per item ([`normalize`])
//! - **Access**: the read-only [`Feed`] facade
//!
//! # Example
//!
//! ```no_run
//! use feedtree::{Config, Feed, Fetcher};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Fetcher::new(Config::default().with_cache_dir("/var/cache/feeds"))?;
//! let feed = Feed::load_rss(&fetcher, "https://example.com/rss.xml", None).await?;
//!
//! println!("{}", feed.text("title").unwrap_or("Untitled"));
//! for item in feed.items() {
//!     println!("{:?} {:?}", item.child_text("title"), item.timestamp());
//! }
//! # Ok(())
//! # }
//! ```

mod fetcher;
mod node;
pub mod normalize;
mod parser;
mod transport;

pub use fetcher::{FetchError, Fetcher};
pub use node::Node;
pub use parser::{parse_document, Document, ParseError, ParseOptions};
pub use transport::{Credentials, FileTransport, HttpTransport, Transport, TransportError};

use serde_json::Value;
use thiserror::Error;

/// Namespace an Atom document must declare on its root.
pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

/// Errors that can occur while loading a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// No bytes could be obtained
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The bytes are not usable XML
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// The document lacks the dialect's structural marker
    #[error("Invalid channel.")]
    InvalidChannel,
    /// A caller tried to change a loaded feed
    #[error("Cannot assign to a read-only property '{0}'.")]
    ReadOnly(String),
}

/// Feed flavor, which decides validation and normalization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Rss,
    Atom,
}

impl Dialect {
    /// Tag name of one article in this dialect.
    pub fn item_tag(self) -> &'static str {
        match self {
            Dialect::Rss => "item",
            Dialect::Atom => "entry",
        }
    }
}

/// A loaded, normalized feed.
///
/// Wraps the RSS `channel` element or the Atom `feed` root. Only shared
/// references into the tree are handed out, so a `Feed` cannot change
/// after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    root: Node,
    dialect: Dialect,
}

impl Feed {
    /// Fetches and loads an RSS channel.
    ///
    /// # Errors
    ///
    /// [`FeedError::Fetch`] when no bytes are available, [`FeedError::Parse`]
    /// for unusable XML, [`FeedError::InvalidChannel`] when there is no
    /// `channel` element.
    pub async fn load_rss<T: Transport>(
        fetcher: &Fetcher<T>,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Self, FeedError> {
        let bytes = fetcher.fetch(url, credentials).await?;
        Self::from_rss_bytes(&bytes, &fetcher.config().parse_options())
    }

    /// Fetches and loads an Atom feed.
    ///
    /// # Errors
    ///
    /// As [`load_rss`](Feed::load_rss), with [`FeedError::InvalidChannel`]
    /// raised when the root does not declare [`ATOM_NAMESPACE`].
    pub async fn load_atom<T: Transport>(
        fetcher: &Fetcher<T>,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Self, FeedError> {
        let bytes = fetcher.fetch(url, credentials).await?;
        Self::from_atom_bytes(&bytes, &fetcher.config().parse_options())
    }

    /// Loads an RSS channel from raw bytes.
    pub fn from_rss_bytes(bytes: &[u8], options: &ParseOptions) -> Result<Self, FeedError> {
        let mut root = parse_document(bytes, options)?.into_root();

        let index = root
            .children
            .iter()
            .position(|c| c.prefix.is_none() && c.name == "channel")
            .ok_or(FeedError::InvalidChannel)?;
        let mut channel = root.children.swap_remove(index);

        normalize::normalize_rss(&mut channel);
        Ok(Self {
            root: channel,
            dialect: Dialect::Rss,
        })
    }

    /// Loads an Atom feed from raw bytes.
    pub fn from_atom_bytes(bytes: &[u8], options: &ParseOptions) -> Result<Self, FeedError> {
        let document = parse_document(bytes, options)?;
        if !document.declares_namespace(ATOM_NAMESPACE) {
            return Err(FeedError::InvalidChannel);
        }

        let mut root = document.into_root();
        normalize::normalize_atom(&mut root);
        Ok(Self {
            root,
            dialect: Dialect::Atom,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The wrapped `channel` or `feed` element.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// First top-level tag called `name`, or `None` if there is none.
    pub fn field(&self, name: &str) -> Option<&Node> {
        self.root.child(name)
    }

    /// Every top-level tag called `name`.
    pub fn fields<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> {
        self.root.children_named(name)
    }

    /// Text of the first top-level tag called `name`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.root.child_text(name)
    }

    /// RSS items or Atom entries, in document order.
    pub fn items(&self) -> impl Iterator<Item = &Node> {
        self.root.children_named(self.dialect.item_tag())
    }

    /// Always fails: loaded feeds are read-only.
    pub fn set(&self, name: &str, _value: impl Into<String>) -> Result<(), FeedError> {
        Err(FeedError::ReadOnly(name.to_owned()))
    }

    /// The whole feed as nested JSON values; see [`Node::to_mapping`].
    pub fn to_mapping(&self) -> Value {
        self.root.to_mapping()
    }
}

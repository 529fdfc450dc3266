//! Utility functions shared by the fetch and normalization layers.
//!
//! - **URL validation**: scheme checks before any transport is touched
//! - **Date parsing**: RFC 822 / RFC 3339 feed dates to epoch seconds
//!
//! # Examples
//!
//! ```
//! use feedtree::util::{parse_timestamp, validate_url};
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.scheme(), "https");
//!
//! assert_eq!(parse_timestamp("2020-01-01T00:00:00Z"), Some(1577836800));
//! ```

mod date;
mod url_validator;

pub use date::parse_timestamp;
pub use url_validator::{validate_url, UrlValidationError};

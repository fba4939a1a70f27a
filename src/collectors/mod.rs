//! News source collectors for linguanews.
//!
//! Collectors pull raw articles from external sources behind the
//! [`Fetcher`] trait. The RSS collector is the only production source
//! today; ingestion and tests depend on the trait, not the concrete
//! type.

pub mod rss;
pub mod types;

pub use rss::{RssFetcher, DEFAULT_FEED_URL};
pub use types::{FetchedArticle, Fetcher};

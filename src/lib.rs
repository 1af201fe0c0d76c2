//! # batch-loader
//!
//! 请求批处理与去重：把大量单点查询合并为少量批量获取。
//!
//! Request batching and deduplication for amortizing many point lookups into a
//! few bulk fetches, the classic fix for "N+1" data access.
//!
//! ## Overview
//!
//! Callers ask for individual keys. A [`Loader`] collects every key requested
//! within a short window, removes duplicates, splits the distinct keys into
//! bounded chunks, hands each chunk to a caller-supplied [`Fetcher`]
//! concurrently, and gives every caller the values for the keys it asked for.
//!
//! ## Guarantees
//!
//! - **Deduplication**: a key requested by many callers in one window is fetched once
//! - **Bounded chunks**: no fetch call receives more than `max_batch_size` keys
//! - **All-or-nothing windows**: one failing chunk fails every caller of its window
//! - **No caching**: requests in different windows fetch again
//!
//! ## Quick Start
//!
//! ```rust
//! use batch_loader::{Loader, LoaderConfig};
//! use std::collections::HashMap;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> batch_loader::Result<()> {
//!     let loader = Loader::from_fn(|ids: Vec<u64>| async move {
//!         // e.g. `SELECT * FROM users WHERE id IN (...)`
//!         let rows: HashMap<u64, String> =
//!             ids.into_iter().map(|id| (id, format!("user-{}", id))).collect();
//!         Ok::<_, anyhow::Error>(rows)
//!     });
//!     loader.set_config(LoaderConfig::new().with_max_batch_size(100).with_delay(Duration::from_millis(2)));
//!
//!     let (a, b) = tokio::join!(loader.load(1), loader.load(2));
//!     assert_eq!(a?.as_deref(), Some("user-1"));
//!     assert_eq!(b?.as_deref(), Some("user-2"));
//!     assert_eq!(loader.stats().windows_opened, 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`loader`] | Public loader, configuration and statistics |
//! | [`batch`] | Batching window and chunked concurrent dispatch |
//! | [`fetch`] | Fetch operation trait and closure adapter |
//! | [`error`] | Error types |

pub mod batch;
pub mod fetch;
pub mod loader;

pub use fetch::{fetch_fn, Fetcher, FnFetcher};
pub use loader::{Loader, LoaderConfig, LoaderStats};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, FetchError};

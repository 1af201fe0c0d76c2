//! 批量获取接口：调用方提供的批量查询操作。
//!
//! # Fetch Operation
//!
//! The fetch operation is the only I/O boundary of the loader. It receives one
//! chunk of distinct keys and returns whatever values it found for them.
//!
//! - Keys missing from the returned map are reported to callers as `None`.
//! - Extra keys in the returned map are merged as-is; the result is trusted.
//! - It is invoked once per chunk per window, possibly many times concurrently,
//!   so implementations must be safe to call in parallel.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

/// Bulk lookup backing a [`Loader`](crate::Loader).
#[async_trait]
pub trait Fetcher<K, V>: Send + Sync + 'static {
    async fn fetch(&self, keys: Vec<K>) -> anyhow::Result<HashMap<K, V>>;
}

/// Adapter turning an async closure into a [`Fetcher`].
///
/// Built with [`fetch_fn`].
#[derive(Clone)]
pub struct FnFetcher<F> {
    f: F,
}

/// Wrap `f` so it can be used as a [`Fetcher`].
///
/// ```rust
/// use batch_loader::fetch_fn;
/// use std::collections::HashMap;
///
/// let fetcher = fetch_fn(|keys: Vec<u64>| async move {
///     Ok::<_, anyhow::Error>(keys.into_iter().map(|k| (k, k * 2)).collect::<HashMap<_, _>>())
/// });
/// # let _ = fetcher;
/// ```
pub fn fetch_fn<F>(f: F) -> FnFetcher<F> {
    FnFetcher { f }
}

#[async_trait]
impl<K, V, F, Fut> Fetcher<K, V> for FnFetcher<F>
where
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<HashMap<K, V>>> + Send + 'static,
{
    async fn fetch(&self, keys: Vec<K>) -> anyhow::Result<HashMap<K, V>> {
        (self.f)(keys).await
    }
}

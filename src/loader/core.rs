use super::config::LoaderConfig;
use super::stats::{AtomicStats, LoaderStats};
use crate::batch::{BatchExecutor, BatchWindow, Completion};
use crate::fetch::{fetch_fn, Fetcher};
use crate::{Error, ErrorContext, Result};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

struct State<K, V> {
    config: LoaderConfig,
    current: Option<Arc<BatchWindow<K, V>>>,
    next_window_id: u64,
}

struct Shared<K, V> {
    executor: BatchExecutor<K, V>,
    state: Mutex<State<K, V>>,
    stats: AtomicStats,
}

/// Batches and deduplicates point lookups into bulk fetches.
///
/// The first key requested while no window is open starts one. Every key
/// requested until `delay` elapses joins that window; then its distinct keys
/// are split into chunks of at most `max_batch_size`, fetched concurrently, and
/// each caller gets the values it asked for.
///
/// - No caching: a key requested again after its window resolved is fetched again.
/// - All-or-nothing: if any chunk fails, every caller of that window gets the error.
/// - A fetch that never returns stalls its window; there is no per-window timeout.
///
/// Cloning is cheap and clones share windows, so one loader can serve a whole process.
/// Each window resolves on a spawned task, so loads polled outside a tokio runtime
/// fail with [`Error::Runtime`].
///
/// ```rust
/// use batch_loader::Loader;
/// use std::collections::HashMap;
///
/// # #[tokio::main]
/// # async fn main() -> batch_loader::Result<()> {
/// let loader = Loader::from_fn(|keys: Vec<String>| async move {
///     let out: HashMap<String, String> =
///         keys.into_iter().map(|k| (k.clone(), format!("result {}", k))).collect();
///     Ok::<_, anyhow::Error>(out)
/// });
///
/// let value = loader.load("wat".to_string()).await?;
/// assert_eq!(value.as_deref(), Some("result wat"));
/// # Ok(())
/// # }
/// ```
pub struct Loader<K, V> {
    inner: Arc<Shared<K, V>>,
}

impl<K, V> Clone for Loader<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Loader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Loader with the default config (1000 keys per fetch, 5 ms window).
    pub fn new(fetcher: impl Fetcher<K, V>) -> Self {
        Self::with_config(fetcher, LoaderConfig::default())
    }

    pub fn with_config(fetcher: impl Fetcher<K, V>, config: LoaderConfig) -> Self {
        Self::from_shared_fetcher(Arc::new(fetcher), config)
    }

    /// Loader over a fetcher that is already shared elsewhere.
    pub fn from_shared_fetcher(fetcher: Arc<dyn Fetcher<K, V>>, config: LoaderConfig) -> Self {
        Self {
            inner: Arc::new(Shared {
                executor: BatchExecutor::new(fetcher),
                state: Mutex::new(State {
                    config: config.normalized(),
                    current: None,
                    next_window_id: 1,
                }),
                stats: AtomicStats::default(),
            }),
        }
    }

    /// Loader over an async closure, with the default config.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HashMap<K, V>>> + Send + 'static,
    {
        Self::new(fetch_fn(f))
    }

    /// Load one key. `None` means the fetch operation returned no value for it.
    pub async fn load(&self, key: K) -> Result<Option<V>> {
        let mut values = self.load_many(std::slice::from_ref(&key)).await?;
        Ok(values.remove(&key).flatten())
    }

    /// Like [`load`](Self::load), with missing values replaced by `V::default()`.
    pub async fn load_or_default(&self, key: K) -> Result<V>
    where
        V: Default,
    {
        Ok(self.load(key).await?.unwrap_or_default())
    }

    /// Load several keys in one window.
    ///
    /// The map holds one entry per distinct requested key. No keys means no
    /// window and no fetch. On failure no partial values are returned.
    pub async fn load_many(&self, keys: &[K]) -> Result<HashMap<K, Option<V>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let completion = self.attach(keys)?;
        let outcome = completion.wait().await?;
        match &*outcome {
            Ok(values) => Ok(keys
                .iter()
                .map(|k| (k.clone(), values.get(k).cloned()))
                .collect()),
            Err(e) => Err(e.clone()),
        }
    }

    /// Add `keys` to the current window, opening one if needed.
    ///
    /// Keys are inserted while the loader lock is held; a window is only ever
    /// detached under the same lock, so it cannot miss a key.
    fn attach(&self, keys: &[K]) -> Result<Completion<K, V>> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::runtime_with_context(
                "load must be polled inside a tokio runtime",
                ErrorContext::new().with_source("loader"),
            )
        })?;

        let mut st = self.inner.lock()?;
        let (window, opened) = match st.current.clone() {
            Some(window) => (window, None),
            None => {
                let id = st.next_window_id;
                st.next_window_id += 1;
                let config = st.config.clone();
                let window = Arc::new(BatchWindow::new(id, config.max_batch_size));
                st.current = Some(Arc::clone(&window));
                AtomicStats::add(&self.inner.stats.windows_opened, 1);
                debug!(
                    window_id = id,
                    max_batch_size = config.max_batch_size,
                    delay_ms = config.delay.as_millis() as u64,
                    "opened batch window"
                );
                (window, Some(config.delay))
            }
        };
        let completion = window.attach(keys)?;
        AtomicStats::add(&self.inner.stats.keys_requested, keys.len());
        drop(st);

        // Spawned after unlocking: a task dropped on a closing runtime runs its
        // guard, which takes the loader lock.
        if let Some(delay) = opened {
            handle.spawn(Shared::run_window(
                Arc::clone(&self.inner),
                window,
                delay,
            ));
        }
        Ok(completion)
    }

    /// Current config; used for the next window that opens.
    pub fn config(&self) -> LoaderConfig {
        self.inner.lock_recovered().config.clone()
    }

    pub fn set_config(&self, config: LoaderConfig) {
        self.inner.lock_recovered().config = config.normalized();
    }

    /// Change the batch size limit for windows opened from now on (at least 1).
    pub fn set_max_batch_size(&self, n: usize) {
        self.inner.lock_recovered().config.max_batch_size = n.max(1);
    }

    /// Change the batching window for windows opened from now on.
    pub fn set_delay(&self, delay: Duration) {
        self.inner.lock_recovered().config.delay = delay;
    }

    /// Whether a window is currently collecting keys.
    pub fn has_open_window(&self) -> bool {
        self.inner.lock_recovered().current.is_some()
    }

    pub fn stats(&self) -> LoaderStats {
        self.inner.stats.to_stats()
    }
}

impl<K, V> Shared<K, V> {
    /// Lock for config reads and writes; the state stays consistent across a
    /// panic, so a poisoned lock is recovered.
    fn lock_recovered(&self) -> MutexGuard<'_, State<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release a window whose resolution task died before resolving it.
    fn abandon(&self, window: &Arc<BatchWindow<K, V>>) {
        {
            let mut st = self.lock_recovered();
            if st
                .current
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, window))
            {
                st.current = None;
            }
        }
        warn!(window_id = window.id(), "batch window abandoned before resolving");
        window.resolve(Err(Error::runtime_with_context(
            "batch window abandoned",
            ErrorContext::new()
                .with_source("loader")
                .with_details(format!("window {}", window.id())),
        )));
    }
}

/// Resolves its window with an error if the resolution task is dropped early,
/// e.g. when its runtime shuts down.
struct WindowGuard<K, V> {
    shared: Arc<Shared<K, V>>,
    window: Arc<BatchWindow<K, V>>,
    armed: bool,
}

impl<K, V> Drop for WindowGuard<K, V> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.abandon(&self.window);
        }
    }
}

impl<K, V> Shared<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn lock(&self) -> Result<MutexGuard<'_, State<K, V>>> {
        self.state.lock().map_err(|_| {
            Error::runtime_with_context(
                "Loader poisoned",
                ErrorContext::new().with_source("loader"),
            )
        })
    }

    /// Stop `window` from accepting keys and take them.
    fn detach(&self, window: &Arc<BatchWindow<K, V>>) -> Result<Vec<K>> {
        let mut st = self.lock()?;
        if st
            .current
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, window))
        {
            st.current = None;
        }
        window.close()
    }

    async fn run_window(self: Arc<Self>, window: Arc<BatchWindow<K, V>>, delay: Duration) {
        let mut guard = WindowGuard {
            shared: Arc::clone(&self),
            window: Arc::clone(&window),
            armed: true,
        };
        tokio::time::sleep(delay).await;

        let window_id = window.id();
        let keys = match self.detach(&window) {
            Ok(keys) => keys,
            Err(e) => {
                window.resolve(Err(e));
                guard.armed = false;
                return;
            }
        };
        debug!(window_id, keys = keys.len(), "closing batch window");
        AtomicStats::add(&self.stats.keys_dispatched, keys.len());

        let report = self
            .executor
            .execute(window_id, keys, window.max_batch_size())
            .await;
        AtomicStats::add(&self.stats.fetch_calls, report.chunks_dispatched);
        if let Err(e) = &report.outcome {
            AtomicStats::add(&self.stats.windows_failed, 1);
            if e.is_fetch() {
                AtomicStats::add(&self.stats.fetch_failures, 1);
            }
        }
        debug!(
            window_id,
            chunks = report.chunks_dispatched,
            merged = report.chunks_merged,
            elapsed_ms = report.execution_time.as_millis() as u64,
            ok = report.all_succeeded(),
            "batch window resolved"
        );
        window.resolve(report.outcome);
        guard.armed = false;
    }
}

//! Batch executor: partitions a closed window's keys and fetches the chunks concurrently.

use crate::batch::collector::Outcome;
use crate::fetch::Fetcher;
use crate::{Error, ErrorContext, FetchError};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Split `keys` into contiguous chunks of at most `size` keys.
///
/// Every key lands in exactly one chunk, in list order. An empty input yields a
/// single empty chunk; `size` of zero is treated as one.
pub fn partition<K: Clone>(keys: &[K], size: usize) -> Vec<Vec<K>> {
    if keys.is_empty() {
        return vec![Vec::new()];
    }
    keys.chunks(size.max(1)).map(<[K]>::to_vec).collect()
}

/// What happened while dispatching one window.
#[derive(Debug)]
pub struct DispatchReport<K, V> {
    pub outcome: Outcome<K, V>,
    /// Chunks handed to the fetch operation.
    pub chunks_dispatched: usize,
    /// Chunks whose results were merged before the window finished.
    pub chunks_merged: usize,
    pub execution_time: Duration,
}

impl<K, V> DispatchReport<K, V> {
    pub fn all_succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Fetches every chunk of a window on its own task and merges the results.
///
/// The first failing chunk decides the window: remaining chunk tasks are aborted
/// and anything already merged is discarded.
pub struct BatchExecutor<K, V> {
    fetcher: Arc<dyn Fetcher<K, V>>,
}

impl<K, V> Clone for BatchExecutor<K, V> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
        }
    }
}

impl<K, V> BatchExecutor<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(fetcher: Arc<dyn Fetcher<K, V>>) -> Self {
        Self { fetcher }
    }

    pub async fn execute(
        &self,
        window_id: u64,
        keys: Vec<K>,
        max_batch_size: usize,
    ) -> DispatchReport<K, V> {
        let start = Instant::now();

        // No chunk worth a fetch call; an empty window resolves empty.
        if keys.is_empty() {
            return DispatchReport {
                outcome: Ok(HashMap::new()),
                chunks_dispatched: 0,
                chunks_merged: 0,
                execution_time: start.elapsed(),
            };
        }

        let chunks = partition(&keys, max_batch_size);
        let chunks_dispatched = chunks.len();
        let mut tasks = JoinSet::new();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            tracing::trace!(window_id, chunk = index, keys = chunk.len(), "dispatching chunk");
            tasks.spawn(async move { (index, fetcher.fetch(chunk).await) });
        }

        let mut results = HashMap::with_capacity(keys.len());
        let mut chunks_merged = 0;
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(values))) => {
                    results.extend(values);
                    chunks_merged += 1;
                }
                Ok((index, Err(e))) => {
                    tracing::warn!(window_id, chunk = index, error = %e, "fetch failed, failing window");
                    failure = Some(Error::Fetch(FetchError::new(e)));
                    break;
                }
                Err(join_err) => {
                    tracing::error!(window_id, error = %join_err, "chunk task did not complete");
                    failure = Some(Error::runtime_with_context(
                        "fetch task panicked",
                        ErrorContext::new()
                            .with_source("batch_executor")
                            .with_details(format!("window {}: {}", window_id, join_err)),
                    ));
                    break;
                }
            }
        }
        // Dropping the set aborts any chunk still in flight.
        if !tasks.is_empty() {
            tracing::debug!(window_id, stragglers = tasks.len(), "aborting outstanding chunks");
        }
        drop(tasks);

        let outcome = match failure {
            Some(err) => Err(err),
            None => Ok(results),
        };
        DispatchReport {
            outcome,
            chunks_dispatched,
            chunks_merged,
            execution_time: start.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fetch_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_partition_exact_multiple() {
        let keys: Vec<u32> = (0..6).collect();
        assert_eq!(partition(&keys, 3), vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_partition_remainder() {
        let keys: Vec<u32> = (0..7).collect();
        let chunks = partition(&keys, 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], vec![6]);
    }

    #[test]
    fn test_partition_smaller_than_limit() {
        let keys = vec!["a", "b"];
        assert_eq!(partition(&keys, 1000), vec![vec!["a", "b"]]);
    }

    #[test]
    fn test_partition_empty_yields_one_empty_chunk() {
        let keys: Vec<u32> = Vec::new();
        assert_eq!(partition(&keys, 10), vec![Vec::<u32>::new()]);
    }

    #[test]
    fn test_partition_is_a_bijection() {
        let keys: Vec<u32> = (0..101).collect();
        for size in [1, 2, 7, 50, 100, 101, 500] {
            let chunks = partition(&keys, size);
            assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
            let flat: Vec<u32> = chunks.into_iter().flatten().collect();
            assert_eq!(flat, keys);
        }
    }

    #[test]
    fn test_partition_zero_size() {
        let keys = vec![1, 2];
        assert_eq!(partition(&keys, 0), vec![vec![1], vec![2]]);
    }

    fn echo_executor(seen: Arc<Mutex<Vec<Vec<u32>>>>) -> BatchExecutor<u32, String> {
        BatchExecutor::new(Arc::new(fetch_fn(move |keys: Vec<u32>| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(keys.clone());
                let out: HashMap<u32, String> =
                    keys.into_iter().map(|k| (k, format!("v{}", k))).collect();
                Ok::<_, anyhow::Error>(out)
            }
        })))
    }

    #[tokio::test]
    async fn test_execute_merges_all_chunks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let executor = echo_executor(Arc::clone(&seen));

        let report = executor.execute(1, (0..10).collect(), 3).await;
        assert!(report.all_succeeded());
        assert_eq!(report.chunks_dispatched, 4);
        assert_eq!(report.chunks_merged, 4);

        let results = report.outcome.unwrap();
        assert_eq!(results.len(), 10);
        assert_eq!(results.get(&7), Some(&"v7".to_string()));

        let calls = seen.lock().unwrap();
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|c| c.len() <= 3));
    }

    #[tokio::test]
    async fn test_execute_empty_skips_fetch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let executor = echo_executor(Arc::clone(&seen));

        let report = executor.execute(1, Vec::new(), 3).await;
        assert_eq!(report.chunks_dispatched, 0);
        assert!(report.outcome.unwrap().is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_error_wins_and_discards_results() {
        let executor: BatchExecutor<u32, u32> =
            BatchExecutor::new(Arc::new(fetch_fn(|keys: Vec<u32>| async move {
                if keys.contains(&0) {
                    return Err(anyhow::anyhow!("chunk with key 0 failed"));
                }
                Ok(keys.into_iter().map(|k| (k, k)).collect::<HashMap<u32, u32>>())
            })));

        let report = executor.execute(2, (0..9).collect(), 3).await;
        assert!(!report.all_succeeded());
        let err = report.outcome.unwrap_err();
        assert!(err.is_fetch());
        assert_eq!(err.to_string(), "Fetch failed: chunk with key 0 failed");
    }

    #[tokio::test]
    async fn test_error_does_not_wait_for_stragglers() {
        let finished = Arc::new(AtomicUsize::new(0));
        let done = Arc::clone(&finished);
        let executor: BatchExecutor<u32, u32> =
            BatchExecutor::new(Arc::new(fetch_fn(move |keys: Vec<u32>| {
                let done = Arc::clone(&done);
                async move {
                    if keys.contains(&0) {
                        return Err(anyhow::anyhow!("fast failure"));
                    }
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(HashMap::<u32, u32>::new())
                }
            })));

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            executor.execute(3, (0..4).collect(), 1),
        )
        .await
        .expect("error must short-circuit slow chunks");
        assert!(report.outcome.is_err());
        assert_eq!(report.chunks_dispatched, 4);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_chunk_fails_window() {
        let executor: BatchExecutor<u32, u32> =
            BatchExecutor::new(Arc::new(fetch_fn(|keys: Vec<u32>| async move {
                if keys.is_empty() {
                    return Ok::<_, anyhow::Error>(HashMap::<u32, u32>::new());
                }
                panic!("fetch exploded");
            })));

        let report = executor.execute(4, vec![1], 10).await;
        let err = report.outcome.unwrap_err();
        assert!(!err.is_fetch());
        assert!(err.to_string().contains("fetch task panicked"));
    }

    #[tokio::test]
    async fn test_extra_keys_are_merged() {
        let executor: BatchExecutor<u32, u32> =
            BatchExecutor::new(Arc::new(fetch_fn(|_keys: Vec<u32>| async move {
                Ok::<_, anyhow::Error>(HashMap::<u32, u32>::from([(99, 1)]))
            })));

        let results = executor.execute(5, vec![1], 10).await.outcome.unwrap();
        assert_eq!(results.get(&99), Some(&1));
        assert!(!results.contains_key(&1));
    }
}

//! Shared helpers for loader integration tests.

#![allow(dead_code)]

use batch_loader::{Loader, LoaderConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

static TRACING: Once = Once::new();

/// Install a test subscriber once; filter with `RUST_LOG=batch_loader=debug`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Records every chunk the fetch operation receives.
#[derive(Clone, Default)]
pub struct FetchLog {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FetchLog {
    pub fn record(&self, keys: &[String]) {
        self.calls.lock().unwrap().push(keys.to_vec());
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Every key dispatched, across all calls, duplicates kept.
    pub fn all_keys(&self) -> Vec<String> {
        self.calls().into_iter().flatten().collect()
    }
}

/// Loader whose fetch echoes `"result " + key` for every key.
pub fn echo_loader(config: LoaderConfig) -> (Loader<String, String>, FetchLog) {
    init_tracing();
    let log = FetchLog::default();
    let seen = log.clone();
    let loader = Loader::with_config(
        batch_loader::fetch_fn(move |keys: Vec<String>| {
            let seen = seen.clone();
            async move {
                seen.record(&keys);
                let out: HashMap<String, String> = keys
                    .into_iter()
                    .map(|k| {
                        let v = format!("result {}", k);
                        (k, v)
                    })
                    .collect();
                Ok::<_, anyhow::Error>(out)
            }
        }),
        config,
    );
    (loader, log)
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub(crate) const DEFAULT_MAX_BATCH_SIZE: usize = 1000;
pub(crate) const DEFAULT_DELAY: Duration = Duration::from_millis(5);

/// Loader tuning.
///
/// Read when a window opens; changing it never affects a window already in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Largest number of keys handed to a single fetch call.
    pub max_batch_size: usize,
    /// How long a window collects keys before it is fetched.
    #[serde(rename = "delay_ms", with = "duration_ms")]
    pub delay: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            delay: DEFAULT_DELAY,
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, overridable via env:
    /// - `BATCH_LOADER_MAX_BATCH_SIZE` (default 1000)
    /// - `BATCH_LOADER_DELAY_MS` (default 5)
    pub fn from_env() -> Self {
        let max_batch_size = std::env::var("BATCH_LOADER_MAX_BATCH_SIZE")
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_BATCH_SIZE);
        let delay = std::env::var("BATCH_LOADER_DELAY_MS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DELAY);
        Self::new()
            .with_max_batch_size(max_batch_size)
            .with_delay(delay)
    }

    /// Set the batch size limit (at least 1)
    pub fn with_max_batch_size(mut self, n: usize) -> Self {
        self.max_batch_size = n.max(1);
        self
    }

    /// Set the batching window
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Same config with out-of-range values brought back into range.
    pub(crate) fn normalized(mut self) -> Self {
        self.max_batch_size = self.max_batch_size.max(1);
        self
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

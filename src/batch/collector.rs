//! Batch collector: one in-flight batching window.
//!
//! A window moves through `Open -> Resolving -> Resolved` exactly once. Keys can
//! only be added while it is open; the resolved outcome is published through a
//! one-shot broadcast that late subscribers still observe.

use crate::{Error, ErrorContext, Result};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Final state of a resolved window, shared by all of its waiters.
pub type Outcome<K, V> = std::result::Result<HashMap<K, V>, Error>;

/// Observable phase of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    Open,
    Resolving,
    Resolved,
}

#[derive(Debug)]
enum State<K> {
    Open { keys: HashSet<K> },
    Resolving,
    Resolved,
}

/// Receiving half of a window's completion signal.
pub struct Completion<K, V> {
    rx: watch::Receiver<Option<Arc<Outcome<K, V>>>>,
    window_id: u64,
}

impl<K, V> Completion<K, V> {
    /// Wait until the window resolves. Returns immediately if it already has.
    pub async fn wait(mut self) -> Result<Arc<Outcome<K, V>>> {
        let window_id = self.window_id;
        let guard = self.rx.wait_for(Option::is_some).await.map_err(|_| {
            Error::runtime_with_context(
                "batch window abandoned before resolving",
                ErrorContext::new()
                    .with_source("batch_collector")
                    .with_details(format!("window {}", window_id)),
            )
        })?;
        match &*guard {
            Some(outcome) => Ok(Arc::clone(outcome)),
            None => Err(Error::runtime_with_context(
                "batch window signalled without an outcome",
                ErrorContext::new().with_source("batch_collector"),
            )),
        }
    }
}

/// Accumulates distinct keys for one batching window.
pub struct BatchWindow<K, V> {
    id: u64,
    max_batch_size: usize,
    state: Mutex<State<K>>,
    signal: watch::Sender<Option<Arc<Outcome<K, V>>>>,
}

impl<K, V> BatchWindow<K, V>
where
    K: Eq + Hash + Clone,
{
    /// `max_batch_size` is fixed for the lifetime of the window; zero is raised to one.
    pub fn new(id: u64, max_batch_size: usize) -> Self {
        let (signal, _) = watch::channel(None);
        Self {
            id,
            max_batch_size: max_batch_size.max(1),
            state: Mutex::new(State::Open {
                keys: HashSet::new(),
            }),
            signal,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State<K>>> {
        self.state.lock().map_err(|_| {
            Error::runtime_with_context(
                "batch window poisoned",
                ErrorContext::new()
                    .with_source("batch_collector")
                    .with_details(format!("window {}", self.id)),
            )
        })
    }

    /// Add keys to the open window and subscribe to its completion.
    ///
    /// Fails if the window is no longer open.
    pub fn attach<'a, I>(&self, keys: I) -> Result<Completion<K, V>>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let mut st = self.lock()?;
        match &mut *st {
            State::Open { keys: pending } => {
                pending.extend(keys.into_iter().cloned());
                Ok(Completion {
                    rx: self.signal.subscribe(),
                    window_id: self.id,
                })
            }
            _ => Err(Error::runtime_with_context(
                "batch window is closed",
                ErrorContext::new()
                    .with_source("batch_collector")
                    .with_details(format!("window {}", self.id)),
            )),
        }
    }

    /// Close the window and take its distinct keys, in arbitrary order.
    ///
    /// Only the first call sees the keys; later calls get an error.
    pub fn close(&self) -> Result<Vec<K>> {
        let mut st = self.lock()?;
        match std::mem::replace(&mut *st, State::Resolving) {
            State::Open { keys } => Ok(keys.into_iter().collect()),
            previous => {
                *st = previous;
                Err(Error::runtime_with_context(
                    "batch window already closed",
                    ErrorContext::new()
                        .with_source("batch_collector")
                        .with_details(format!("window {}", self.id)),
                ))
            }
        }
    }
}

impl<K, V> BatchWindow<K, V> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Every state transition is a single assignment, so a poisoned lock
    /// still holds a valid state and is recovered.
    fn state_recovered(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish the outcome and release every waiter. Idempotent: only the
    /// first outcome is kept.
    pub fn resolve(&self, outcome: Outcome<K, V>) {
        *self.state_recovered() = State::Resolved;
        let outcome = Arc::new(outcome);
        self.signal.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });
    }

    pub fn phase(&self) -> WindowPhase {
        match &*self.state_recovered() {
            State::Open { .. } => WindowPhase::Open,
            State::Resolving => WindowPhase::Resolving,
            State::Resolved => WindowPhase::Resolved,
        }
    }

    /// Number of distinct keys pending; zero once the window has closed.
    pub fn pending_len(&self) -> usize {
        match &*self.state_recovered() {
            State::Open { keys } => keys.len(),
            _ => 0,
        }
    }
}

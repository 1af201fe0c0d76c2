//! 批处理窗口模块：收集、去重、分块并并发获取键。
//!
//! # Batch Window Module
//!
//! This module holds the two halves of a batching window: the collector that
//! accumulates distinct keys while the window is open, and the executor that
//! fetches them once it closes.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchWindow`] | One window: pending keys, phase, completion signal |
//! | [`Completion`] | Handle a caller awaits until its window resolves |
//! | [`BatchExecutor`] | Chunked concurrent dispatch with first-error-wins |
//! | [`partition`] | Contiguous chunking bounded by the batch size |
//!
//! ## Window Lifecycle
//!
//! - **Open**: accepting keys; duplicates collapse into the pending set
//! - **Resolving**: detached from its loader, chunks are being fetched
//! - **Resolved**: terminal; holds either the merged values or the shared error
//!
//! ```rust
//! use batch_loader::batch::{partition, BatchWindow, WindowPhase};
//!
//! let window: BatchWindow<&str, u32> = BatchWindow::new(1, 2);
//! let _completion = window.attach(&["a", "b", "a", "c"]).unwrap();
//! assert_eq!(window.pending_len(), 3);
//!
//! let mut keys = window.close().unwrap();
//! keys.sort();
//! assert_eq!(window.phase(), WindowPhase::Resolving);
//! assert_eq!(partition(&keys, window.max_batch_size()), vec![vec!["a", "b"], vec!["c"]]);
//! ```

mod collector;
mod executor;

pub use collector::{BatchWindow, Completion, Outcome, WindowPhase};
pub use executor::{partition, BatchExecutor, DispatchReport};

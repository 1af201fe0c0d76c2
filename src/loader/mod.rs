//! 加载器模块：合并点查询为批量获取的公共入口。
//!
//! # Loader Module
//!
//! [`Loader`] is the public entry point. It owns the currently open batching
//! window (if any), opens a new one on demand, and drives each window from
//! open to resolved on a background task.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Loader`] | `load` / `load_many` over a caller-supplied fetch operation |
//! | [`LoaderConfig`] | Batch size limit and window delay, env-overridable |
//! | [`LoaderStats`] | Counters for windows, keys and fetch calls |
//!
//! ## Tuning
//!
//! The window delay is the latency/throughput knob: a short delay gives many
//! small batches and low latency, a long one gives fewer, larger batches.
//! Both settings apply to windows opened after they change.

mod config;
mod core;
mod stats;

pub use config::LoaderConfig;
pub use self::core::Loader;
pub use stats::LoaderStats;

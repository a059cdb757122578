//! A lock-free, multi-producer/multi-consumer FIFO queue reclaimed with
//! hazard pointers.
//!
//! [`Queue`] is the entire public surface: construct one with [`Queue::new`]
//! or [`Queue::with_config`], [`push`](Queue::push) values onto it from any
//! number of threads, [`pop`](Queue::pop) them off from any number of
//! (possibly different) threads, and let its [`Drop`] impl drain and release
//! whatever remains. Every node the queue unlinks is handed to a process-wide
//! hazard-pointer registry rather than freed directly, which guarantees no
//! node is destroyed while a concurrent `pop` still holds a reference to it.
mod config;
mod error;
mod global;
mod hazard;
mod local;
mod queue;
mod shield;

pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::QueueError;
pub use crate::global::HAZARD_CAPACITY;
pub use crate::queue::Queue;

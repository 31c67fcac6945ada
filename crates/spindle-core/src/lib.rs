//! spindle-core
//!
//! A filesystem task queue whose dependencies are resolved by file
//! existence: a task becomes claimable once the file at its `input` exists.
//!
//! # Modules
//! - **domain**: ids, task types, records, outcomes, queue directories
//! - **ports**: seams (TaskStore, Clock, IdGenerator)
//! - **impls**: the filesystem TaskStore
//! - **queue**: ordering index, lock, claim, lifecycle, cascade
//! - **runtime**: handler registry and dispatch
//! - **app**: worker loop, builder, reaper, gc, status
//! - **worker**: groups of worker loops with shared shutdown
//! - **config**: TOML configuration

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod runtime;
pub mod util;
pub mod worker;

pub use error::{Result, SpindleError};

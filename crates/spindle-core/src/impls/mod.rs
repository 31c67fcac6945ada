//! Impls: concrete port implementations.
//!
//! - **FsTaskStore**: one JSON file per record under the queue directories

pub mod fs_store;

pub use self::fs_store::FsTaskStore;

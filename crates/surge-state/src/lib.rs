//! surge-state — embedded state store for Surge.
//!
//! Backed by [redb](https://docs.rs/redb), holds the workloads the
//! autoscaler manages, the utilization samples pushed by external
//! producers, and the history of scaling decisions.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! Workloads are keyed by `{namespace}/{name}`; samples and decisions by
//! `{workload_key}:{zero-padded millis}` so a key-range scan returns them
//! in time order.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;

//! Named response stores used by the worker.
//!
//! A store maps a request signature (method + URL) to a response snapshot.
//! Stores are grouped into generations: every worker version owns one static
//! store (filled at install) and one runtime store (filled while serving).
//! Activation of a new generation deletes every store it does not own.

mod storage;
mod traits;

pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheGeneration, CachedResponse};

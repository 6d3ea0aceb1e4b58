//! Order lookup cache.
//!
//! A fixed-capacity, insertion-ordered working set of orders keyed by `order_uid`.
//! Every admission is also appended to a durable per-instance ledger so that the
//! slot layout can be rebuilt from the store after a restart.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! capacity = 10
//! instance_key = "instance-1"
//! repopulate_on_read = false
//! ```

mod config;
mod lock;
mod order_cache;
mod ring;

pub use config::{CacheConfig, DEFAULT_CAPACITY, MAX_CAPACITY};
pub use order_cache::{CacheSnapshot, OrderCache};
pub use ring::FifoRing;

//! # Cache Module
//!
//! Time-bounded caching shared by the service health probes.

pub mod ttl_cache;

pub use ttl_cache::{CacheEntry, CacheError, TtlCache};

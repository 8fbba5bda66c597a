//! Content-addressed artifact cache.
//!
//! [`CacheKey`] fingerprints a request; [`CacheStore`] maps fingerprints to
//! cache-owned copies of finished artifacts with lazy TTL and missing-file
//! invalidation.

mod key;
mod store;

pub use key::CacheKey;
pub use store::{
    CacheEntry, CacheStats, CacheStore, Clock, Metadata, PruneReport, SystemClock,
    DEFAULT_MAX_BYTES, DEFAULT_TTL, SCHEMA_VERSION,
};

//! Short-TTL cache for read-heavy list endpoints.

mod key;
mod response_cache;

pub use key::{cache_key, resource_prefix};
pub use response_cache::{CacheEntry, ResponseCache};

//! Result cache
//!
//! Maps a canonical fingerprint of the upstream-relevant query parameters to
//! the result set fetched for it. A hit skips the scheduler entirely.

mod config;
mod key;
mod store;

pub use config::CacheConfig;
pub use key::{KEY_FIELDS, QueryParams, make_key, make_key_from_map};
pub use store::{CacheStats, ResultCache};

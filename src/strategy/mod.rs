//! Network-first fetching with a durable cache fallback.

mod fetch;
mod network_first;
mod policy;
mod race;

pub use fetch::{Fetch, ReqwestFetcher};
pub use network_first::{CacheWriteMode, NetworkFirst, NetworkFirstOptions, DEFAULT_NETWORK_TIMEOUT};
pub use policy::CacheableResponse;
pub use race::race;

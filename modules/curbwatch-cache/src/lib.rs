pub mod invalidate;
pub mod store;

pub use invalidate::InvalidationCoordinator;
pub use store::{CacheTag, CacheTtl, ReadCache};

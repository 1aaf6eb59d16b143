mod keyed;
mod membership;
mod memory;
mod snapshot_handles;

pub use keyed::{CacheKey, CacheListener, CacheUpdater, CacheValue, KeyedCache};
pub use membership::MembershipIndex;
pub use memory::{CacheSubscription, MemoryCache};
pub use snapshot_handles::SnapshotHandleCache;

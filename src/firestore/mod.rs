pub mod api;
pub mod cache;
mod constants;
pub mod error;
pub mod model;
pub mod query;
pub mod remote;
pub mod value;

pub use api::{
    DocumentRecord, LiveSubscription, MutationOptions, Orchestrator, PendingWrite, Resolved,
    ResolveOptions, SwrFirestore, SwrSettings, WritePropagator,
};
pub use cache::{
    CacheKey, CacheValue, KeyedCache, MembershipIndex, MemoryCache, SnapshotHandleCache,
};
pub use error::{FirestoreError, FirestoreErrorCode, FirestoreResult};
pub use query::{
    Cursor, FilterOperator, OrderBy, OrderByType, OrderDirection, QueryDescriptor,
    QuerySerializer, ValueTag, WhereClause, WhereType,
};
pub use remote::{InMemoryStore, RemoteStore, SetOptions};

mod in_memory;
mod query_evaluator;
mod snapshot;
mod store;

pub use in_memory::InMemoryStore;
pub use snapshot::{DocumentSnapshot, QuerySnapshot, SnapshotMetadata};
pub use store::{
    DocumentListener, ListenerRegistration, QueryListener, RemoteStore, SetOptions,
};

//! Stale-while-revalidate cache layer for Firestore.
//!
//! Keeps single-document and query-result cache entries consistent with each
//! other as local writes and remote snapshots arrive. The remote store and the
//! keyed cache are collaborators behind the [`firestore::RemoteStore`] and
//! [`firestore::KeyedCache`] traits; in-memory implementations of both ship
//! with the crate.
//!
//! ```
//! use firestore_swr::firestore::{QueryDescriptor, ResolveOptions, SwrFirestore};
//! use firestore_swr::firestore::value::MapValue;
//!
//! # futures::executor::block_on(async {
//! let (client, store, _cache) = SwrFirestore::in_memory();
//! store.seed("users/ada", MapValue::empty()).unwrap();
//! let users = client
//!     .get_collection("users", &QueryDescriptor::new(), &ResolveOptions::default())
//!     .await
//!     .unwrap();
//! assert_eq!(users.value().len(), 1);
//! # });
//! ```

pub mod firestore;

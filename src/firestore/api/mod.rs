mod client;
mod options;
mod orchestrator;
mod propagator;
mod record;

pub use client::SwrFirestore;
pub use options::{MutationOptions, ResolveOptions, SwrSettings};
pub use orchestrator::{LiveSubscription, Orchestrator, Resolved};
pub use propagator::{PendingWrite, WritePropagator};
pub use record::{DecodeOptions, DocumentRecord};

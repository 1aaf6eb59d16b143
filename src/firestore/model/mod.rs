mod document_key;
mod document_reference;
mod field_path;
mod resource_path;
mod timestamp;

pub use document_key::DocumentKey;
pub use document_reference::DocumentReference;
pub use field_path::FieldPath;
pub use resource_path::{PathKind, ResourcePath};
pub use timestamp::Timestamp;

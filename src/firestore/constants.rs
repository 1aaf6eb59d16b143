/// Metadata fields attached to every decoded document record.
pub(crate) const FIELD_ID: &str = "id";
pub(crate) const FIELD_EXISTS: &str = "exists";
pub(crate) const FIELD_HAS_PENDING_WRITES: &str = "hasPendingWrites";
pub(crate) const FIELD_SNAPSHOT: &str = "__snapshot";

pub(crate) const RESERVED_FIELDS: [&str; 4] = [
    FIELD_ID,
    FIELD_EXISTS,
    FIELD_HAS_PENDING_WRITES,
    FIELD_SNAPSHOT,
];

/// Tags recorded next to values that JSON cannot carry natively.
pub(crate) const TAG_DATE: &str = "date";
pub(crate) const TAG_REF: &str = "ref";
pub(crate) const TAG_SNAPSHOT: &str = "snapshot";

pub(crate) const AUTO_ID_LENGTH: usize = 20;

use std::collections::BTreeMap;

use crate::firestore::constants::{
    FIELD_EXISTS, FIELD_HAS_PENDING_WRITES, FIELD_ID, RESERVED_FIELDS,
};
use crate::firestore::model::{FieldPath, Timestamp};
use crate::firestore::remote::DocumentSnapshot;
use crate::firestore::value::{FirestoreValue, MapValue, ValueKind};

/// A decoded document as held in the cache: its fields plus identity and
/// state metadata.
///
/// `id`, `exists`, `hasPendingWrites` and `__snapshot` are reserved; fields
/// with those names in stored documents are reported but left in `data`.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentRecord {
    id: String,
    exists: bool,
    has_pending_writes: bool,
    data: MapValue,
    snapshot: Option<DocumentSnapshot>,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>, data: MapValue) -> Self {
        Self {
            id: id.into(),
            exists: true,
            has_pending_writes: false,
            data,
            snapshot: None,
        }
    }

    pub fn from_snapshot(snapshot: &DocumentSnapshot, options: &DecodeOptions) -> Self {
        let mut data = snapshot.map_value().cloned().unwrap_or_default();
        if options.warn_reserved_fields {
            warn_on_reserved_fields(snapshot.id(), &data);
        }
        parse_dates(&mut data, &options.parse_dates);
        Self {
            id: snapshot.id().to_string(),
            exists: snapshot.exists(),
            has_pending_writes: snapshot.has_pending_writes(),
            data,
            snapshot: options.include_snapshot.then(|| snapshot.clone()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn has_pending_writes(&self) -> bool {
        self.has_pending_writes
    }

    pub fn data(&self) -> &MapValue {
        &self.data
    }

    pub fn get(&self, field: &str) -> Option<&FirestoreValue> {
        self.data.get(field)
    }

    /// The remote snapshot this record was decoded from, when it was kept.
    pub fn snapshot(&self) -> Option<&DocumentSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn with_pending_writes(mut self, pending: bool) -> Self {
        self.has_pending_writes = pending;
        self
    }

    /// Optimistic shallow union of this record's fields with `delta`.
    pub(crate) fn merged_with(&self, delta: &MapValue) -> Self {
        Self {
            id: self.id.clone(),
            exists: true,
            has_pending_writes: true,
            data: self.data.merged_with(delta),
            snapshot: self.snapshot.clone(),
        }
    }

    /// Optimistic record whose fields are exactly `data`.
    pub(crate) fn optimistic(id: impl Into<String>, data: MapValue) -> Self {
        Self::new(id, data).with_pending_writes(true)
    }

    /// Flattens the record into one map, metadata fields included.
    pub fn to_map_value(&self) -> MapValue {
        let mut fields: BTreeMap<String, FirestoreValue> = self.data.fields().clone();
        fields.insert(FIELD_ID.to_string(), FirestoreValue::from_string(&self.id));
        fields.insert(FIELD_EXISTS.to_string(), FirestoreValue::from_bool(self.exists));
        fields.insert(
            FIELD_HAS_PENDING_WRITES.to_string(),
            FirestoreValue::from_bool(self.has_pending_writes),
        );
        MapValue::new(fields)
    }
}

/// Controls how remote snapshots are turned into [`DocumentRecord`]s.
#[derive(Clone, Debug, Default)]
pub struct DecodeOptions {
    pub parse_dates: Vec<FieldPath>,
    pub include_snapshot: bool,
    pub warn_reserved_fields: bool,
}

fn warn_on_reserved_fields(id: &str, data: &MapValue) {
    let collisions: Vec<&str> = RESERVED_FIELDS
        .iter()
        .copied()
        .filter(|field| data.contains_key(field))
        .collect();
    if !collisions.is_empty() {
        log::warn!(
            "document `{id}` uses reserved field(s) {collisions:?}; \
             [id, exists, hasPendingWrites, __snapshot] are reserved, please rename them"
        );
    }
}

/// Converts store-native timestamp encodings at the given paths into
/// [`Timestamp`] values. Paths that are missing or hold anything else are left alone.
fn parse_dates(data: &mut MapValue, fields: &[FieldPath]) {
    for field in fields {
        let parsed = data.value_at(field).and_then(native_timestamp);
        if let Some(timestamp) = parsed {
            data.set_value_at(field, FirestoreValue::from_timestamp(timestamp));
        }
    }
}

fn native_timestamp(value: &FirestoreValue) -> Option<Timestamp> {
    match value.kind() {
        ValueKind::Map(map) => {
            let seconds = match map.get("seconds")?.kind() {
                ValueKind::Integer(seconds) => *seconds,
                _ => return None,
            };
            let nanos = match map.get("nanoseconds").or_else(|| map.get("nanos")) {
                Some(value) => match value.kind() {
                    ValueKind::Integer(nanos) => i32::try_from(*nanos).ok()?,
                    _ => return None,
                },
                None => 0,
            };
            Some(Timestamp::new(seconds, nanos))
        }
        ValueKind::String(text) => Timestamp::parse_iso(text).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::Once;

    use super::*;
    use crate::firestore::model::DocumentKey;
    use crate::firestore::remote::SnapshotMetadata;

    thread_local! {
        static CAPTURED: RefCell<Vec<(log::Level, String)>> = RefCell::new(Vec::new());
    }

    struct CaptureLogger;

    impl log::Log for CaptureLogger {
        fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            let entry = (record.level(), record.args().to_string());
            CAPTURED.with(|captured| captured.borrow_mut().push(entry));
        }

        fn flush(&self) {}
    }

    /// Runs `body` and returns its result with the warnings it logged on this thread.
    fn capture_warnings<T>(body: impl FnOnce() -> T) -> (T, Vec<String>) {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            if log::set_logger(&CaptureLogger).is_ok() {
                log::set_max_level(log::LevelFilter::Trace);
            }
        });
        CAPTURED.with(|captured| captured.borrow_mut().clear());
        let result = body();
        let warnings = CAPTURED.with(|captured| {
            captured
                .borrow_mut()
                .drain(..)
                .filter(|(level, _)| *level == log::Level::Warn)
                .map(|(_, message)| message)
                .collect()
        });
        (result, warnings)
    }

    fn snapshot(path: &str, data: MapValue) -> DocumentSnapshot {
        DocumentSnapshot::new(
            DocumentKey::from_string(path).unwrap(),
            Some(data),
            SnapshotMetadata::new(false, true),
        )
    }

    #[test]
    fn decodes_metadata_from_snapshot() {
        let record = DocumentRecord::from_snapshot(
            &snapshot("users/abc", [("name", "Ada")].into_iter().collect()),
            &DecodeOptions::default(),
        );
        assert_eq!(record.id(), "abc");
        assert!(record.exists());
        assert!(record.has_pending_writes());
        assert!(record.snapshot().is_none());
        assert_eq!(record.get("name"), Some(&FirestoreValue::from_string("Ada")));
    }

    #[test]
    fn keeps_snapshot_when_requested() {
        let options = DecodeOptions {
            include_snapshot: true,
            ..Default::default()
        };
        let source = snapshot("users/abc", MapValue::empty());
        let record = DocumentRecord::from_snapshot(&source, &options);
        assert_eq!(record.snapshot(), Some(&source));
    }

    #[test]
    fn missing_document_decodes_as_not_existing() {
        let source = DocumentSnapshot::new(
            DocumentKey::from_string("users/ghost").unwrap(),
            None,
            SnapshotMetadata::default(),
        );
        let record = DocumentRecord::from_snapshot(&source, &DecodeOptions::default());
        assert!(!record.exists());
        assert!(record.data().is_empty());
    }

    #[test]
    fn parses_dates_at_nested_paths() {
        let mut created = MapValue::empty();
        created.insert("seconds", 1_577_836_800i64);
        created.insert("nanoseconds", 0);
        let mut user = MapValue::empty();
        user.insert("createdAt", created);
        let mut data = MapValue::empty();
        data.insert("user", user);
        data.insert("lastUpdated", "2020-01-01T00:00:00.000Z");
        data.insert("title", "untouched");

        let options = DecodeOptions {
            parse_dates: vec![
                FieldPath::from_dot_separated("user.createdAt").unwrap(),
                FieldPath::from_dot_separated("lastUpdated").unwrap(),
                FieldPath::from_dot_separated("title").unwrap(),
                FieldPath::from_dot_separated("missing").unwrap(),
            ],
            ..Default::default()
        };
        let record = DocumentRecord::from_snapshot(&snapshot("posts/p1", data), &options);
        let expected = Timestamp::new(1_577_836_800, 0);
        let nested = FieldPath::from_dot_separated("user.createdAt").unwrap();
        assert_eq!(
            record.data().value_at(&nested).and_then(FirestoreValue::as_timestamp),
            Some(expected)
        );
        assert_eq!(
            record.get("lastUpdated").and_then(FirestoreValue::as_timestamp),
            Some(expected)
        );
        assert_eq!(record.get("title"), Some(&FirestoreValue::from_string("untouched")));
        assert!(record.get("missing").is_none());
    }

    #[test]
    fn out_of_range_nanoseconds_are_not_parsed() {
        let mut native = MapValue::empty();
        native.insert("seconds", 1_577_836_800i64);
        native.insert("nanoseconds", i64::from(i32::MAX) + 1);
        let mut data = MapValue::empty();
        data.insert("at", native.clone());

        let options = DecodeOptions {
            parse_dates: vec![FieldPath::from_dot_separated("at").unwrap()],
            ..Default::default()
        };
        let record = DocumentRecord::from_snapshot(&snapshot("posts/p1", data), &options);
        assert_eq!(record.get("at"), Some(&FirestoreValue::from(native)));
    }

    #[test]
    fn reserved_fields_stay_in_data_and_are_reported() {
        let options = DecodeOptions {
            warn_reserved_fields: true,
            ..Default::default()
        };
        let source = snapshot("users/abc", [("exists", "yes")].into_iter().collect());
        let (record, warnings) =
            capture_warnings(|| DocumentRecord::from_snapshot(&source, &options));
        assert!(record.exists());
        assert_eq!(record.get("exists"), Some(&FirestoreValue::from_string("yes")));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("`abc`"));
        assert!(warnings[0].contains(r#"["exists"]"#));
    }

    #[test]
    fn reserved_field_report_can_be_disabled() {
        let source = snapshot("users/abc", [("id", "other")].into_iter().collect());
        let (record, warnings) = capture_warnings(|| {
            DocumentRecord::from_snapshot(&source, &DecodeOptions::default())
        });
        assert_eq!(record.id(), "abc");
        assert!(warnings.is_empty());
    }

    #[test]
    fn merge_marks_record_pending() {
        let record = DocumentRecord::new("x", [("a", 1), ("b", 2)].into_iter().collect());
        let merged = record.merged_with(&[("b", 3), ("c", 4)].into_iter().collect());
        assert!(merged.has_pending_writes());
        let expected: MapValue = [("a", 1), ("b", 3), ("c", 4)].into_iter().collect();
        assert_eq!(merged.data(), &expected);
    }

    #[test]
    fn flattened_view_includes_metadata() {
        let map = DocumentRecord::new("x", [("v", 1)].into_iter().collect()).to_map_value();
        assert_eq!(map.get("id"), Some(&FirestoreValue::from_string("x")));
        assert_eq!(map.get("exists"), Some(&FirestoreValue::from_bool(true)));
        assert_eq!(map.get("hasPendingWrites"), Some(&FirestoreValue::from_bool(false)));
    }
}

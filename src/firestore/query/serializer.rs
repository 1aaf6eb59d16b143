use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use crate::firestore::cache::SnapshotHandleCache;
use crate::firestore::constants::{TAG_DATE, TAG_REF, TAG_SNAPSHOT};
use crate::firestore::error::{
    evicted_reference_handle, serialization_mismatch, FirestoreResult,
};
use crate::firestore::model::Timestamp;
use crate::firestore::remote::RemoteStore;
use crate::firestore::value::{FirestoreValue, MapValue, ValueKind};

use super::descriptor::{
    Cursor, FilterOperator, OrderBy, OrderDirection, QueryDescriptor, ValueTag, WhereClause,
};

/// Wire shape of a serialized query. Field order is the canonical key order.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireQuery {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none", default)]
    filters: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    order_by: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    start_at: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    end_at: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    start_after: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    end_before: Option<JsonValue>,
    #[serde(skip_serializing_if = "is_false", default)]
    is_collection_group: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Converts query descriptors to and from the canonical string used in cache keys.
///
/// Timestamps and references in `where` values are written as a JSON
/// surrogate with a `{"type": ...}` tag as the clause's fourth element.
/// Snapshot cursors are written by path and parked in the snapshot handle
/// cache, which `deserialize` consults to get them back.
#[derive(Clone)]
pub struct QuerySerializer {
    store: Arc<dyn RemoteStore>,
    handles: SnapshotHandleCache,
}

impl QuerySerializer {
    pub fn new(store: Arc<dyn RemoteStore>, handles: SnapshotHandleCache) -> Self {
        Self { store, handles }
    }

    pub fn handles(&self) -> &SnapshotHandleCache {
        &self.handles
    }

    pub fn serialize(&self, query: &QueryDescriptor) -> String {
        let wire = WireQuery {
            filters: (!query.filters.is_empty()).then(|| {
                JsonValue::Array(query.filters.iter().map(encode_clause).collect())
            }),
            order_by: (!query.order_by.is_empty()).then(|| {
                JsonValue::Array(
                    query
                        .order_by
                        .iter()
                        .map(|order| json!([order.field(), order.direction().as_str()]))
                        .collect(),
                )
            }),
            limit: query.limit,
            start_at: query.start_at.as_ref().map(|cursor| self.encode_cursor(cursor)),
            end_at: query.end_at.as_ref().map(|cursor| self.encode_cursor(cursor)),
            start_after: query
                .start_after
                .as_ref()
                .map(|cursor| self.encode_cursor(cursor)),
            end_before: query
                .end_before
                .as_ref()
                .map(|cursor| self.encode_cursor(cursor)),
            is_collection_group: query.collection_group,
        };
        // A struct of JSON values and primitives always serializes.
        serde_json::to_string(&wire).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn deserialize(&self, serialized: &str) -> FirestoreResult<QueryDescriptor> {
        let parsed: JsonValue = serde_json::from_str(serialized).map_err(|err| {
            serialization_mismatch(format!("Serialized query is not valid JSON: {err}"))
        })?;
        if !parsed.is_object() {
            return Err(serialization_mismatch(format!(
                "Serialized query must be an object, found {parsed}"
            )));
        }
        let wire: WireQuery = serde_json::from_value(parsed).map_err(|err| {
            serialization_mismatch(format!("Serialized query has an invalid field: {err}"))
        })?;

        let filters = match wire.filters {
            Some(value) => self.decode_filters(value)?,
            None => Vec::new(),
        };
        let order_by = match wire.order_by {
            Some(value) => decode_order_by(value)?,
            None => Vec::new(),
        };

        Ok(QueryDescriptor {
            filters,
            order_by,
            limit: wire.limit,
            start_at: wire.start_at.and_then(|value| self.decode_cursor("startAt", value)),
            end_at: wire.end_at.and_then(|value| self.decode_cursor("endAt", value)),
            start_after: wire
                .start_after
                .and_then(|value| self.decode_cursor("startAfter", value)),
            end_before: wire
                .end_before
                .and_then(|value| self.decode_cursor("endBefore", value)),
            collection_group: wire.is_collection_group,
        })
    }

    fn encode_cursor(&self, cursor: &Cursor) -> JsonValue {
        match cursor {
            Cursor::Number(number) => encode_number(*number),
            Cursor::Snapshot(snapshot) => {
                let path = self.handles.insert(snapshot);
                json!({ "path": path, "type": TAG_SNAPSHOT })
            }
        }
    }

    fn decode_cursor(&self, name: &str, value: JsonValue) -> Option<Cursor> {
        match value {
            JsonValue::Number(number) => number.as_f64().map(Cursor::Number),
            JsonValue::Object(object)
                if object.get("type").and_then(JsonValue::as_str) == Some(TAG_SNAPSHOT) =>
            {
                let path = object.get("path").and_then(JsonValue::as_str)?;
                match self.handles.get(path) {
                    Some(snapshot) => Some(Cursor::Snapshot(snapshot)),
                    None => {
                        let diagnostic = evicted_reference_handle(format!(
                            "{name} cursor for `{path}` dropped: snapshot handle was evicted"
                        ));
                        log::debug!("{diagnostic}");
                        None
                    }
                }
            }
            other => {
                log::debug!("{name} cursor has an unsupported shape, ignoring: {other}");
                None
            }
        }
    }

    fn decode_filters(&self, value: JsonValue) -> FirestoreResult<Vec<WhereClause>> {
        let JsonValue::Array(items) = value else {
            return Err(serialization_mismatch("`where` must be a clause or a list of clauses"));
        };
        // A single clause starts with its field name; a conjunction starts with a clause.
        if matches!(items.first(), Some(JsonValue::String(_))) {
            return Ok(vec![self.decode_clause(items)?]);
        }
        items
            .into_iter()
            .map(|item| match item {
                JsonValue::Array(parts) => self.decode_clause(parts),
                other => Err(serialization_mismatch(format!(
                    "`where` entry is not a clause: {other}"
                ))),
            })
            .collect()
    }

    fn decode_clause(&self, parts: Vec<JsonValue>) -> FirestoreResult<WhereClause> {
        if !(3..=4).contains(&parts.len()) {
            return Err(serialization_mismatch(format!(
                "`where` clause must have 3 or 4 elements, found {}",
                parts.len()
            )));
        }
        let mut parts = parts.into_iter();
        let field = match parts.next() {
            Some(JsonValue::String(field)) => field,
            _ => return Err(serialization_mismatch("`where` field must be a string")),
        };
        let operator: FilterOperator = match parts.next() {
            Some(JsonValue::String(op)) => op.parse()?,
            _ => return Err(serialization_mismatch("`where` operator must be a string")),
        };
        let raw = parts.next().unwrap_or(JsonValue::Null);
        let tag = parts.next().map(decode_tag);

        let (value, tag) = match tag {
            None => (decode_value(raw), None),
            Some(ValueTag::Date) => {
                let parsed = raw.as_str().map(Timestamp::parse_iso);
                match parsed {
                    Some(Ok(timestamp)) => (FirestoreValue::from_timestamp(timestamp), None),
                    _ => {
                        log::debug!("`{field}` is tagged as a date but does not parse as one");
                        (decode_value(raw), Some(ValueTag::Date))
                    }
                }
            }
            Some(ValueTag::Ref) => {
                let resolved = raw.as_str().map(|path| self.store.resolve_reference(path));
                match resolved {
                    Some(Ok(reference)) => (FirestoreValue::from_reference(reference), None),
                    _ => {
                        log::debug!("`{field}` is tagged as a reference but does not resolve");
                        (decode_value(raw), Some(ValueTag::Ref))
                    }
                }
            }
            Some(ValueTag::Unknown(raw_tag)) => {
                log::debug!("`{field}` carries unrecognized tag {raw_tag}; keeping the raw value");
                (decode_value(raw), Some(ValueTag::Unknown(raw_tag)))
            }
        };

        Ok(WhereClause {
            field,
            operator,
            value,
            tag,
        })
    }
}

fn encode_clause(clause: &WhereClause) -> JsonValue {
    let surrogate = encode_value(clause.field(), clause.value(), true);
    let tag = match clause.tag() {
        Some(tag) => Some(encode_tag(tag)),
        None => match clause.value().kind() {
            ValueKind::Timestamp(_) => Some(encode_tag(&ValueTag::Date)),
            ValueKind::Reference(_) => Some(encode_tag(&ValueTag::Ref)),
            _ => None,
        },
    };
    let mut parts = vec![
        JsonValue::String(clause.field().to_string()),
        JsonValue::String(clause.operator().as_str().to_string()),
        surrogate,
    ];
    parts.extend(tag);
    JsonValue::Array(parts)
}

fn encode_tag(tag: &ValueTag) -> JsonValue {
    match tag {
        ValueTag::Date => json!({ "type": TAG_DATE }),
        ValueTag::Ref => json!({ "type": TAG_REF }),
        ValueTag::Unknown(raw) => raw.clone(),
    }
}

fn decode_tag(raw: JsonValue) -> ValueTag {
    match raw.get("type").and_then(JsonValue::as_str) {
        Some(TAG_DATE) => ValueTag::Date,
        Some(TAG_REF) => ValueTag::Ref,
        _ => ValueTag::Unknown(raw),
    }
}

/// JSON surrogate of a filter value. Only the top level of a clause value is
/// tagged; timestamps and references nested deeper lose their type.
fn encode_value(field: &str, value: &FirestoreValue, top_level: bool) -> JsonValue {
    match value.kind() {
        ValueKind::Null => JsonValue::Null,
        ValueKind::Boolean(value) => JsonValue::Bool(*value),
        ValueKind::Integer(value) => JsonValue::from(*value),
        ValueKind::Double(value) => JsonNumber::from_f64(*value)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueKind::String(value) => JsonValue::String(value.clone()),
        ValueKind::Timestamp(timestamp) => {
            if !top_level {
                log::warn!("nested timestamp in `{field}` filter is serialized without a type tag");
            }
            JsonValue::String(timestamp.to_iso_string())
        }
        ValueKind::Reference(reference) => {
            if !top_level {
                log::warn!("nested reference in `{field}` filter is serialized without a type tag");
            }
            JsonValue::String(reference.path().to_string())
        }
        ValueKind::Array(array) => JsonValue::Array(
            array
                .values()
                .iter()
                .map(|item| encode_value(field, item, false))
                .collect(),
        ),
        ValueKind::Map(map) => JsonValue::Object(
            map.fields()
                .iter()
                .map(|(key, item)| (key.clone(), encode_value(field, item, false)))
                .collect::<JsonMap<String, JsonValue>>(),
        ),
    }
}

fn decode_value(raw: JsonValue) -> FirestoreValue {
    match raw {
        JsonValue::Null => FirestoreValue::null(),
        JsonValue::Bool(value) => FirestoreValue::from_bool(value),
        JsonValue::Number(number) => match number.as_i64() {
            Some(integer) => FirestoreValue::from_integer(integer),
            None => FirestoreValue::from_double(number.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(value) => FirestoreValue::from_string(value),
        JsonValue::Array(items) => {
            FirestoreValue::from_array(items.into_iter().map(decode_value).collect())
        }
        JsonValue::Object(object) => FirestoreValue::from(
            object
                .into_iter()
                .map(|(key, item)| (key, decode_value(item)))
                .collect::<MapValue>(),
        ),
    }
}

/// Integral cursor values are written as integers so `5` and `5.0` share a key.
fn encode_number(number: f64) -> JsonValue {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if number.is_finite() && number.fract() == 0.0 && number.abs() <= MAX_EXACT {
        JsonValue::from(number as i64)
    } else {
        JsonNumber::from_f64(number)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

fn decode_order_by(value: JsonValue) -> FirestoreResult<Vec<OrderBy>> {
    match value {
        JsonValue::String(field) => Ok(vec![OrderBy::ascending(field)]),
        JsonValue::Array(items) if matches!(items.first(), Some(JsonValue::String(_))) => {
            Ok(vec![decode_order_pair(items)?])
        }
        JsonValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                JsonValue::String(field) => Ok(OrderBy::ascending(field)),
                JsonValue::Array(pair) => decode_order_pair(pair),
                other => Err(serialization_mismatch(format!(
                    "`orderBy` entry is not an ordering: {other}"
                ))),
            })
            .collect(),
        other => Err(serialization_mismatch(format!(
            "`orderBy` has an unsupported shape: {other}"
        ))),
    }
}

fn decode_order_pair(pair: Vec<JsonValue>) -> FirestoreResult<OrderBy> {
    let mut parts = pair.into_iter();
    let field = match parts.next() {
        Some(JsonValue::String(field)) => field,
        _ => return Err(serialization_mismatch("`orderBy` field must be a string")),
    };
    let direction = match parts.next() {
        None => OrderDirection::Ascending,
        Some(JsonValue::String(direction)) => direction.parse()?,
        Some(other) => {
            return Err(serialization_mismatch(format!(
                "`orderBy` direction must be a string, found {other}"
            )))
        }
    };
    Ok(OrderBy::new(field, direction))
}

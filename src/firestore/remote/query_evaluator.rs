use std::cmp::Ordering;

use crate::firestore::model::{DocumentKey, FieldPath, ResourcePath};
use crate::firestore::query::{
    Cursor, FilterOperator, OrderBy, OrderDirection, QueryDescriptor, WhereClause,
};
use crate::firestore::value::{ArrayValue, FirestoreValue, ValueKind};

use super::DocumentSnapshot;

struct Bound {
    values: Vec<FirestoreValue>,
    inclusive: bool,
}

/// Whether a document lives in the collection (or collection group) a query targets.
pub(crate) fn matches_target(
    key: &DocumentKey,
    path: &ResourcePath,
    query: &QueryDescriptor,
) -> bool {
    if query.is_collection_group() {
        return path.last_segment() == Some(key.collection_id());
    }
    key.collection_path() == *path
}

/// Applies the descriptor's filters, ordering, cursors and limit to the
/// candidate documents and returns the bounded result set.
pub(crate) fn apply_query_to_documents(
    documents: Vec<DocumentSnapshot>,
    path: &ResourcePath,
    query: &QueryDescriptor,
) -> Vec<DocumentSnapshot> {
    let order_by = effective_order_by(query);

    let mut filtered: Vec<DocumentSnapshot> = documents
        .into_iter()
        .filter(|snapshot| snapshot.exists())
        .filter(|snapshot| matches_target(snapshot.key(), path, query))
        .filter(|snapshot| document_satisfies_filters(snapshot, query.filters()))
        .collect();

    filtered.sort_by(|left, right| compare_snapshots(left, right, &order_by));

    let start = query
        .start_at_cursor()
        .map(|cursor| to_bound(cursor, &order_by, true))
        .or_else(|| {
            query
                .start_after_cursor()
                .map(|cursor| to_bound(cursor, &order_by, false))
        });
    if let Some(bound) = start {
        filtered.retain(|snapshot| !is_before_start_bound(snapshot, &bound, &order_by));
    }

    let end = query
        .end_at_cursor()
        .map(|cursor| to_bound(cursor, &order_by, true))
        .or_else(|| {
            query
                .end_before_cursor()
                .map(|cursor| to_bound(cursor, &order_by, false))
        });
    if let Some(bound) = end {
        filtered.retain(|snapshot| !is_after_end_bound(snapshot, &bound, &order_by));
    }

    if let Some(limit) = query.limit_value() {
        filtered.truncate(limit as usize);
    }

    filtered
}

fn effective_order_by(query: &QueryDescriptor) -> Vec<OrderBy> {
    let mut order_by = query.orderings().to_vec();
    let has_key_order = order_by
        .iter()
        .any(|order| parse_field(order.field()).is_document_id());
    if !has_key_order {
        order_by.push(OrderBy::ascending("__name__"));
    }
    order_by
}

fn parse_field(field: &str) -> FieldPath {
    FieldPath::from_dot_separated(field).unwrap_or_else(|_| FieldPath::document_id())
}

fn to_bound(cursor: &Cursor, order_by: &[OrderBy], inclusive: bool) -> Bound {
    let values = match cursor {
        Cursor::Number(value) => vec![FirestoreValue::from_double(*value)],
        Cursor::Snapshot(snapshot) => order_by
            .iter()
            .map(|order| {
                get_field_value(snapshot, &parse_field(order.field()))
                    .unwrap_or_else(FirestoreValue::null)
            })
            .collect(),
    };
    Bound { values, inclusive }
}

fn document_satisfies_filters(snapshot: &DocumentSnapshot, filters: &[WhereClause]) -> bool {
    filters.iter().all(|filter| {
        match get_field_value(snapshot, &parse_field(filter.field())) {
            Some(value) => evaluate_filter(filter, &value),
            None => match filter.operator() {
                FilterOperator::NotEqual => evaluate_filter(filter, &FirestoreValue::null()),
                _ => false,
            },
        }
    })
}

fn evaluate_filter(filter: &WhereClause, value: &FirestoreValue) -> bool {
    match filter.operator() {
        FilterOperator::Equal => compare_values(value, filter.value()) == Some(Ordering::Equal),
        FilterOperator::NotEqual => compare_values(value, filter.value()) != Some(Ordering::Equal),
        FilterOperator::LessThan => compare_values(value, filter.value()) == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => matches!(
            compare_values(value, filter.value()),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperator::GreaterThan => {
            compare_values(value, filter.value()) == Some(Ordering::Greater)
        }
        FilterOperator::GreaterThanOrEqual => matches!(
            compare_values(value, filter.value()),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::ArrayContains => match value.kind() {
            ValueKind::Array(array) => array.contains(filter.value()),
            _ => false,
        },
        FilterOperator::ArrayContainsAny => match (value.kind(), filter.value().kind()) {
            (ValueKind::Array(array), ValueKind::Array(needles)) => {
                array_contains_any(array, needles)
            }
            _ => false,
        },
        FilterOperator::In => match filter.value().kind() {
            ValueKind::Array(values) => values.contains(value),
            _ => false,
        },
        FilterOperator::NotIn => match filter.value().kind() {
            ValueKind::Array(values) => !value.is_null() && !values.contains(value),
            _ => false,
        },
    }
}

fn get_field_value(snapshot: &DocumentSnapshot, field: &FieldPath) -> Option<FirestoreValue> {
    if field.is_document_id() {
        return Some(FirestoreValue::from_string(snapshot.key().as_str()));
    }
    snapshot.map_value()?.value_at(field).cloned()
}

fn compare_snapshots(
    left: &DocumentSnapshot,
    right: &DocumentSnapshot,
    order_by: &[OrderBy],
) -> Ordering {
    for order in order_by {
        let field = parse_field(order.field());
        let left_value = get_field_value(left, &field).unwrap_or_else(FirestoreValue::null);
        let right_value = get_field_value(right, &field).unwrap_or_else(FirestoreValue::null);

        let mut ordering = compare_values(&left_value, &right_value).unwrap_or(Ordering::Equal);
        if order.direction() == OrderDirection::Descending {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(left: &FirestoreValue, right: &FirestoreValue) -> Option<Ordering> {
    match (left.kind(), right.kind()) {
        (ValueKind::Null, ValueKind::Null) => Some(Ordering::Equal),
        (ValueKind::Boolean(a), ValueKind::Boolean(b)) => Some(a.cmp(b)),
        (ValueKind::Integer(a), ValueKind::Integer(b)) => Some(a.cmp(b)),
        (ValueKind::Double(a), ValueKind::Double(b)) => a.partial_cmp(b),
        (ValueKind::Integer(a), ValueKind::Double(b)) => (*a as f64).partial_cmp(b),
        (ValueKind::Double(a), ValueKind::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (ValueKind::Timestamp(a), ValueKind::Timestamp(b)) => Some(a.cmp(b)),
        (ValueKind::String(a), ValueKind::String(b)) => Some(a.cmp(b)),
        (ValueKind::Reference(a), ValueKind::Reference(b)) => Some(a.path().cmp(b.path())),
        _ => {
            if left == right {
                Some(Ordering::Equal)
            } else {
                None
            }
        }
    }
}

fn array_contains_any(array: &ArrayValue, needles: &ArrayValue) -> bool {
    needles.values().iter().any(|needle| array.contains(needle))
}

fn is_before_start_bound(snapshot: &DocumentSnapshot, bound: &Bound, order_by: &[OrderBy]) -> bool {
    let ordering = compare_snapshot_to_bound(snapshot, bound, order_by);
    if bound.inclusive {
        ordering == Ordering::Less
    } else {
        ordering != Ordering::Greater
    }
}

fn is_after_end_bound(snapshot: &DocumentSnapshot, bound: &Bound, order_by: &[OrderBy]) -> bool {
    let ordering = compare_snapshot_to_bound(snapshot, bound, order_by);
    if bound.inclusive {
        ordering == Ordering::Greater
    } else {
        ordering != Ordering::Less
    }
}

fn compare_snapshot_to_bound(
    snapshot: &DocumentSnapshot,
    bound: &Bound,
    order_by: &[OrderBy],
) -> Ordering {
    for (order, bound_value) in order_by.iter().zip(bound.values.iter()) {
        let snapshot_value = get_field_value(snapshot, &parse_field(order.field()))
            .unwrap_or_else(FirestoreValue::null);

        let mut ordering = compare_values(&snapshot_value, bound_value).unwrap_or(Ordering::Equal);
        if order.direction() == OrderDirection::Descending {
            ordering = ordering.reverse();
        }

        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

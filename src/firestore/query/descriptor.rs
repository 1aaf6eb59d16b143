use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde_json::Value as JsonValue;

use crate::firestore::error::{serialization_mismatch, FirestoreError};
use crate::firestore::remote::DocumentSnapshot;
use crate::firestore::value::FirestoreValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    LessThan,
    LessThanOrEqual,
    Equal,
    NotEqual,
    GreaterThanOrEqual,
    GreaterThan,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
            FilterOperator::Equal => "==",
            FilterOperator::NotEqual => "!=",
            FilterOperator::GreaterThanOrEqual => ">=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::ArrayContains => "array-contains",
            FilterOperator::ArrayContainsAny => "array-contains-any",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not-in",
        }
    }
}

impl FromStr for FilterOperator {
    type Err = FirestoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(FilterOperator::LessThan),
            "<=" => Ok(FilterOperator::LessThanOrEqual),
            "==" => Ok(FilterOperator::Equal),
            "!=" => Ok(FilterOperator::NotEqual),
            ">=" => Ok(FilterOperator::GreaterThanOrEqual),
            ">" => Ok(FilterOperator::GreaterThan),
            "array-contains" => Ok(FilterOperator::ArrayContains),
            "array-contains-any" => Ok(FilterOperator::ArrayContainsAny),
            "in" => Ok(FilterOperator::In),
            "not-in" => Ok(FilterOperator::NotIn),
            other => Err(serialization_mismatch(format!(
                "Unknown filter operator `{other}`"
            ))),
        }
    }
}

impl Display for FilterOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Ascending => "asc",
            OrderDirection::Descending => "desc",
        }
    }
}

impl FromStr for OrderDirection {
    type Err = FirestoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(OrderDirection::Ascending),
            "desc" => Ok(OrderDirection::Descending),
            other => Err(serialization_mismatch(format!(
                "Unknown order direction `{other}`"
            ))),
        }
    }
}

/// Type marker carried next to a filter value that JSON cannot represent natively.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueTag {
    Date,
    Ref,
    /// A tag this version does not understand; kept verbatim so re-serialization is stable.
    Unknown(JsonValue),
}

/// One `(field, operator, value)` filter, plus the serializer tag once one is attached.
#[derive(Clone, Debug, PartialEq)]
pub struct WhereClause {
    pub(crate) field: String,
    pub(crate) operator: FilterOperator,
    pub(crate) value: FirestoreValue,
    pub(crate) tag: Option<ValueTag>,
}

impl WhereClause {
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FirestoreValue>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            tag: None,
        }
    }

    /// Builds a clause that already carries a serializer tag.
    pub fn tagged(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FirestoreValue>,
        tag: ValueTag,
    ) -> Self {
        Self {
            tag: Some(tag),
            ..Self::new(field, operator, value)
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &FirestoreValue {
        &self.value
    }

    pub fn tag(&self) -> Option<&ValueTag> {
        self.tag.as_ref()
    }
}

/// The accepted input shapes for `where`: one clause or a conjunction of clauses.
#[derive(Clone, Debug, PartialEq)]
pub enum WhereType {
    Single(WhereClause),
    Many(Vec<WhereClause>),
}

impl WhereType {
    fn into_clauses(self) -> Vec<WhereClause> {
        match self {
            WhereType::Single(clause) => vec![clause],
            WhereType::Many(clauses) => clauses,
        }
    }
}

impl From<WhereClause> for WhereType {
    fn from(value: WhereClause) -> Self {
        WhereType::Single(value)
    }
}

impl From<Vec<WhereClause>> for WhereType {
    fn from(value: Vec<WhereClause>) -> Self {
        WhereType::Many(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrderBy {
    field: String,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new(field, OrderDirection::Ascending)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }
}

/// The accepted input shapes for `orderBy`.
#[derive(Clone, Debug, PartialEq)]
pub enum OrderByType {
    /// A bare field name, ascending implied.
    Field(String),
    Single(OrderBy),
    Many(Vec<OrderBy>),
}

impl OrderByType {
    fn into_orderings(self) -> Vec<OrderBy> {
        match self {
            OrderByType::Field(field) => vec![OrderBy::ascending(field)],
            OrderByType::Single(order) => vec![order],
            OrderByType::Many(orders) => orders,
        }
    }
}

impl From<&str> for OrderByType {
    fn from(value: &str) -> Self {
        OrderByType::Field(value.to_string())
    }
}

impl From<OrderBy> for OrderByType {
    fn from(value: OrderBy) -> Self {
        OrderByType::Single(value)
    }
}

impl From<Vec<OrderBy>> for OrderByType {
    fn from(value: Vec<OrderBy>) -> Self {
        OrderByType::Many(value)
    }
}

/// A query bound: a plain value for the first ordering, or a document snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum Cursor {
    Number(f64),
    Snapshot(DocumentSnapshot),
}

impl From<f64> for Cursor {
    fn from(value: f64) -> Self {
        Cursor::Number(value)
    }
}

impl From<i64> for Cursor {
    fn from(value: i64) -> Self {
        Cursor::Number(value as f64)
    }
}

impl From<i32> for Cursor {
    fn from(value: i32) -> Self {
        Cursor::Number(value as f64)
    }
}

impl From<DocumentSnapshot> for Cursor {
    fn from(value: DocumentSnapshot) -> Self {
        Cursor::Snapshot(value)
    }
}

/// Filter, order, limit and cursor clauses applied to a collection path.
///
/// `where` and `orderBy` inputs are normalized to sequences on entry, so a
/// single clause and a one-element sequence build equal descriptors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryDescriptor {
    pub(crate) filters: Vec<WhereClause>,
    pub(crate) order_by: Vec<OrderBy>,
    pub(crate) limit: Option<u32>,
    pub(crate) start_at: Option<Cursor>,
    pub(crate) end_at: Option<Cursor>,
    pub(crate) start_after: Option<Cursor>,
    pub(crate) end_before: Option<Cursor>,
    pub(crate) collection_group: bool,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the filters with the given clause or conjunction.
    pub fn with_where(mut self, filters: impl Into<WhereType>) -> Self {
        self.filters = filters.into().into_clauses();
        self
    }

    /// Appends one filter clause to the conjunction.
    pub fn filter(
        mut self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FirestoreValue>,
    ) -> Self {
        self.filters.push(WhereClause::new(field, operator, value));
        self
    }

    /// Replaces the orderings.
    pub fn with_order_by(mut self, order_by: impl Into<OrderByType>) -> Self {
        self.order_by = order_by.into().into_orderings();
        self
    }

    /// Appends one ordering.
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push(OrderBy::new(field, direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_at(mut self, cursor: impl Into<Cursor>) -> Self {
        self.start_at = Some(cursor.into());
        self
    }

    pub fn end_at(mut self, cursor: impl Into<Cursor>) -> Self {
        self.end_at = Some(cursor.into());
        self
    }

    pub fn start_after(mut self, cursor: impl Into<Cursor>) -> Self {
        self.start_after = Some(cursor.into());
        self
    }

    pub fn end_before(mut self, cursor: impl Into<Cursor>) -> Self {
        self.end_before = Some(cursor.into());
        self
    }

    /// Matches every collection with this id at any nesting level instead of one path.
    pub fn collection_group(mut self, enabled: bool) -> Self {
        self.collection_group = enabled;
        self
    }

    pub fn filters(&self) -> &[WhereClause] {
        &self.filters
    }

    pub fn orderings(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }

    pub fn start_at_cursor(&self) -> Option<&Cursor> {
        self.start_at.as_ref()
    }

    pub fn end_at_cursor(&self) -> Option<&Cursor> {
        self.end_at.as_ref()
    }

    pub fn start_after_cursor(&self) -> Option<&Cursor> {
        self.start_after.as_ref()
    }

    pub fn end_before_cursor(&self) -> Option<&Cursor> {
        self.end_before.as_ref()
    }

    pub fn is_collection_group(&self) -> bool {
        self.collection_group
    }

    /// Paths of the documents referenced by snapshot cursors.
    pub(crate) fn snapshot_cursor_paths(&self) -> Vec<String> {
        [
            &self.start_at,
            &self.end_at,
            &self.start_after,
            &self.end_before,
        ]
        .into_iter()
        .filter_map(|cursor| match cursor {
            Some(Cursor::Snapshot(snapshot)) => Some(snapshot.key().as_str().to_string()),
            _ => None,
        })
        .collect()
    }
}

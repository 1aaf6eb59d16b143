use std::collections::BTreeMap;

use crate::firestore::model::FieldPath;
use crate::firestore::value::{FirestoreValue, ValueKind};

/// An ordered set of named fields; the body of a document or a nested map value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapValue {
    fields: BTreeMap<String, FirestoreValue>,
}

impl MapValue {
    pub fn new(fields: BTreeMap<String, FirestoreValue>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &BTreeMap<String, FirestoreValue> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, FirestoreValue> {
        self.fields
    }

    pub fn get(&self, field: &str) -> Option<&FirestoreValue> {
        self.fields.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FirestoreValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Shallow union: every top-level field of `delta` overwrites the field of the same name.
    pub fn merged_with(&self, delta: &MapValue) -> MapValue {
        let mut fields = self.fields.clone();
        for (key, value) in &delta.fields {
            fields.insert(key.clone(), value.clone());
        }
        MapValue::new(fields)
    }

    pub fn value_at(&self, path: &FieldPath) -> Option<&FirestoreValue> {
        find_in_map(self, path.segments())
    }

    /// Replaces the value at `path`, creating intermediate maps as needed.
    pub fn set_value_at(&mut self, path: &FieldPath, value: FirestoreValue) {
        set_in_fields(&mut self.fields, path.segments(), value);
    }
}

impl<K, V> FromIterator<(K, V)> for MapValue
where
    K: Into<String>,
    V: Into<FirestoreValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        MapValue::new(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

fn find_in_map<'a>(map: &'a MapValue, segments: &[String]) -> Option<&'a FirestoreValue> {
    let (first, rest) = segments.split_first()?;
    let value = map.fields.get(first)?;
    if rest.is_empty() {
        Some(value)
    } else if let ValueKind::Map(child) = value.kind() {
        find_in_map(child, rest)
    } else {
        None
    }
}

fn set_in_fields(
    fields: &mut BTreeMap<String, FirestoreValue>,
    segments: &[String],
    value: FirestoreValue,
) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        fields.insert(first.clone(), value);
        return;
    }
    let mut child = match fields.get(first).map(FirestoreValue::kind) {
        Some(ValueKind::Map(existing)) => existing.fields().clone(),
        _ => BTreeMap::new(),
    };
    set_in_fields(&mut child, rest, value);
    fields.insert(first.clone(), FirestoreValue::from_map(child));
}

use std::iter::FromIterator;

use indexmap::map::{IndexMap, IntoIter};
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::Value;

/// An ordered `response key -> value` mapping, as produced by completing an
/// object-typed selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Object<S> {
    key_value_list: IndexMap<String, Value<S>>,
}

impl<S> Object<S> {
    /// Creates a new [`Object`] with a fixed number of preallocated slots for
    /// field-value pairs.
    pub fn with_capacity(size: usize) -> Self {
        Self {
            key_value_list: IndexMap::with_capacity(size),
        }
    }

    /// Adds a new field with a value.
    ///
    /// If there is already a field for the given key and both values are
    /// objects, they are merged. Otherwise the existing value is replaced and
    /// returned.
    pub fn add_field(&mut self, k: impl Into<String>, value: Value<S>) -> Option<Value<S>> {
        let key = k.into();
        match (value, self.key_value_list.get_mut(&key)) {
            (Value::Object(incoming), Some(Value::Object(existing))) => {
                for (k, v) in incoming.into_iter() {
                    existing.add_field(k, v);
                }
                None
            }
            (value, _) => self.key_value_list.insert(key, value),
        }
    }

    /// Checks whether the object already contains a field with the given
    /// name.
    pub fn contains_field(&self, name: &str) -> bool {
        self.key_value_list.contains_key(name)
    }

    /// Iterates over all field-value pairs, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value<S>)> {
        self.key_value_list.iter()
    }

    /// Iterates mutably over all field-value pairs, in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Value<S>)> {
        self.key_value_list.iter_mut()
    }

    /// Returns the current number of fields.
    pub fn field_count(&self) -> usize {
        self.key_value_list.len()
    }

    /// Returns the value for a given field, if present.
    pub fn get_field_value(&self, key: &str) -> Option<&Value<S>> {
        self.key_value_list.get(key)
    }
}

impl<S> IntoIterator for Object<S> {
    type Item = (String, Value<S>);
    type IntoIter = IntoIter<String, Value<S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.key_value_list.into_iter()
    }
}

impl<S> From<Object<S>> for Value<S> {
    fn from(o: Object<S>) -> Self {
        Value::Object(o)
    }
}

impl<S: Serialize> Serialize for Object<S> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut map = serializer.serialize_map(Some(self.field_count()))?;
        for (k, v) in self.iter() {
            map.serialize_key(k)?;
            map.serialize_value(v)?;
        }
        map.end()
    }
}

impl<K, S> FromIterator<(K, Value<S>)> for Object<S>
where
    K: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, Value<S>)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut object = Self {
            key_value_list: IndexMap::with_capacity(iter.size_hint().0),
        };
        for (k, v) in iter {
            object.add_field(k.into(), v);
        }
        object
    }
}

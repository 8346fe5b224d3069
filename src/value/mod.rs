//! The [`Value`] tree produced by completing a selection set, and the traits
//! used to convert argument/variable literals into and out of it.

mod object;
mod scalar;

use std::fmt;

use serde::ser::{Serialize, Serializer};

pub use self::{
    object::Object,
    scalar::{DefaultScalarValue, ParseScalarResult, ParseScalarValue, ScalarValue},
};

/// A JSON-like response value tree.
///
/// This is the output side of execution: the shape that gets serialized as
/// the `data` of a response (or a patch). It is deliberately decoupled from
/// [`crate::ast::InputValue`], which is the input side (arguments, variables,
/// default values).
#[derive(Debug, Clone, PartialEq)]
pub enum Value<S = DefaultScalarValue> {
    /// A GraphQL `null` value.
    Null,
    /// A leaf scalar value.
    Scalar(S),
    /// An ordered list of values.
    List(Vec<Value<S>>),
    /// An ordered field-value mapping.
    Object(Object<S>),
}

impl<S> Value<S> {
    /// Constructs a new [`Value::Object`] with a fixed initial capacity.
    pub fn object(o: Object<S>) -> Self {
        Self::Object(o)
    }

    /// Constructs a new [`Value::List`] from an iterator of values.
    pub fn list(iter: impl IntoIterator<Item = Value<S>>) -> Self {
        Self::List(iter.into_iter().collect())
    }

    /// Constructs a new [`Value::Scalar`].
    pub fn scalar(s: impl Into<S>) -> Self {
        Self::Scalar(s.into())
    }

    /// Returns `true` if this is a [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the contained scalar value, if any.
    pub fn as_scalar(&self) -> Option<&S> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the contained object value, if any.
    pub fn as_object_value(&self) -> Option<&Object<S>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the contained object value mutably, if any.
    pub fn as_mut_object_value(&mut self) -> Option<&mut Object<S>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the contained list value, if any.
    pub fn as_list_value(&self) -> Option<&[Value<S>]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Converts this value into its contained object, if any.
    pub fn into_object(self) -> Option<Object<S>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Maps the scalar representation of this value into another
    /// [`ScalarValue`] type, recursing through lists and objects.
    pub fn map_scalar_value<Into>(self) -> Value<Into>
    where
        S: ScalarValue,
        Into: ScalarValue,
    {
        match self {
            Self::Null => Value::Null,
            Self::Scalar(s) => Value::Scalar(s.into_another()),
            Self::List(l) => Value::List(l.into_iter().map(Value::map_scalar_value).collect()),
            Self::Object(o) => Value::Object(
                o.into_iter()
                    .map(|(k, v)| (k, v.map_scalar_value()))
                    .collect(),
            ),
        }
    }
}

impl<S: ScalarValue> Value<S> {
    /// Returns the contained string, if this is a [`Value::Scalar`] holding
    /// one.
    pub fn as_string_value(&self) -> Option<&str> {
        self.as_scalar().and_then(S::as_str)
    }

    /// Returns the contained float (widening an int if necessary), if this
    /// is a [`Value::Scalar`] holding a numeric value.
    pub fn as_float_value(&self) -> Option<f64> {
        self.as_scalar().and_then(S::as_float)
    }
}

impl<S: fmt::Display> fmt::Display for Value<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Scalar(s) => write!(f, "{s}"),
            Self::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Self::Object(o) => {
                write!(f, "{{")?;
                for (i, (k, v)) in o.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl<S: Serialize> Serialize for Value<S> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Scalar(s) => s.serialize(serializer),
            Self::List(l) => l.serialize(serializer),
            Self::Object(o) => o.serialize(serializer),
        }
    }
}

impl<S> From<Option<Value<S>>> for Value<S> {
    fn from(v: Option<Value<S>>) -> Self {
        v.unwrap_or(Value::Null)
    }
}

impl<S, T: Into<Value<S>>> From<Vec<T>> for Value<S> {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<i32> for Value<DefaultScalarValue> {
    fn from(v: i32) -> Self {
        Value::Scalar(DefaultScalarValue::Int(v))
    }
}

impl From<f64> for Value<DefaultScalarValue> {
    fn from(v: f64) -> Self {
        Value::Scalar(DefaultScalarValue::Float(v))
    }
}

impl From<String> for Value<DefaultScalarValue> {
    fn from(v: String) -> Self {
        Value::Scalar(DefaultScalarValue::String(v))
    }
}

impl From<&str> for Value<DefaultScalarValue> {
    fn from(v: &str) -> Self {
        Value::Scalar(DefaultScalarValue::String(v.to_owned()))
    }
}

impl From<bool> for Value<DefaultScalarValue> {
    fn from(v: bool) -> Self {
        Value::Scalar(DefaultScalarValue::Boolean(v))
    }
}

/// Converts a raw [`serde_json::Value`] JSON tree into a [`Value`] response
/// tree, used by the value coercer when reading variable values supplied over
/// the wire.
///
/// `null` and absence are distinguished upstream (in variable coercion); here
/// a bare JSON `null` always yields [`Value::Null`].
pub fn from_json(json: serde_json::Value) -> Value<DefaultScalarValue> {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Scalar(DefaultScalarValue::Boolean(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if let Ok(i) = i32::try_from(i) {
                    return Value::Scalar(DefaultScalarValue::Int(i));
                }
            }
            Value::Scalar(DefaultScalarValue::Float(n.as_f64().unwrap_or(0.0)))
        }
        serde_json::Value::String(s) => Value::Scalar(DefaultScalarValue::String(s)),
        serde_json::Value::Array(a) => Value::List(a.into_iter().map(from_json).collect()),
        serde_json::Value::Object(o) => {
            Value::Object(o.into_iter().map(|(k, v)| (k, from_json(v))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_displays_as_null() {
        assert_eq!(Value::<DefaultScalarValue>::Null.to_string(), "null");
    }

    #[test]
    fn int_displays_bare() {
        let v: Value = 4.into();
        assert_eq!(v.to_string(), "4");
    }

    #[test]
    fn list_displays_bracketed() {
        let v = Value::list([Value::from(1), Value::from(2)]);
        assert_eq!(v.to_string(), "[1, 2]");
    }

    #[test]
    fn object_merges_on_add_field() {
        let mut o = Object::with_capacity(2);
        o.add_field("a", Value::object(Object::with_capacity(1)));
        let mut nested = Object::with_capacity(1);
        nested.add_field("x", Value::from(1));
        o.add_field("a", Value::object(nested));
        let merged = o.get_field_value("a").unwrap().as_object_value().unwrap();
        assert_eq!(merged.get_field_value("x"), Some(&Value::from(1)));
    }

    #[test]
    fn from_json_widens_large_ints_to_float() {
        let j = serde_json::json!(i64::from(i32::MAX) + 1);
        assert_eq!(
            from_json(j).as_float_value(),
            Some(f64::from(i32::MAX) + 1.0)
        );
    }

    #[test]
    fn map_scalar_value_is_noop_identity() {
        let v: Value = Value::from("hi");
        let mapped: Value = v.clone().map_scalar_value();
        assert_eq!(v, mapped);
    }
}

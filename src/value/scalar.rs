use std::fmt;

use serde::{de, ser::Serialize};

/// The result of converting a string into a scalar value.
pub type ParseScalarResult<S = DefaultScalarValue> = Result<S, String>;

/// Converts a raw token string into a concrete scalar representation.
///
/// Schema-level scalar coercion (beyond the built-ins below) is outside this
/// crate's scope; implement this for additional leaf types as needed.
pub trait ParseScalarValue<S = DefaultScalarValue> {
    /// Parses `value` into `S`, or fails with a human-readable message.
    fn from_str(value: &str) -> ParseScalarResult<S>;
}

/// A trait marking a type that can be used as the internal representation of
/// scalar values.
///
/// The default representation, [`DefaultScalarValue`], covers the four
/// built-in GraphQL scalar kinds. Implement this trait to plug in a custom
/// representation (e.g. one that preserves 64-bit integers).
pub trait ScalarValue:
    fmt::Debug + fmt::Display + Clone + PartialEq + for<'de> de::Deserialize<'de> + Serialize
{
    /// Returns the integer representation, if this value holds one.
    fn as_int(&self) -> Option<i32>;

    /// Returns a fresh owned [`String`] if this value holds one.
    fn as_string(&self) -> Option<String>;

    /// Returns a borrowed [`str`] if this value holds one.
    fn as_str(&self) -> Option<&str>;

    /// Returns the floating-point representation, widening an integer if
    /// necessary.
    fn as_float(&self) -> Option<f64>;

    /// Returns the boolean representation, if this value holds one.
    fn as_boolean(&self) -> Option<bool>;

    /// Converts this value into another [`ScalarValue`] representation.
    fn into_another<S: ScalarValue>(self) -> S;
}

/// The default [`ScalarValue`] representation: the four scalar kinds defined
/// by the built-in `Int`, `Float`, `String`, and `Boolean` scalars.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum DefaultScalarValue {
    /// `Int` scalars.
    Int(i32),
    /// `Float` scalars.
    Float(f64),
    /// `String` scalars.
    String(String),
    /// `Boolean` scalars.
    Boolean(bool),
}

impl ScalarValue for DefaultScalarValue {
    fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn as_string(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(f64::from(*i)),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    fn into_another<S: ScalarValue>(self) -> S {
        match self {
            Self::Int(i) => S::from(i),
            Self::Float(f) => S::from(f),
            Self::String(s) => S::from(s),
            Self::Boolean(b) => S::from(b),
        }
    }
}

impl fmt::Display for DefaultScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<i32> for DefaultScalarValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for DefaultScalarValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for DefaultScalarValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for DefaultScalarValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl ParseScalarValue<DefaultScalarValue> for String {
    fn from_str(value: &str) -> ParseScalarResult<DefaultScalarValue> {
        Ok(DefaultScalarValue::String(value.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widens_int_to_float() {
        assert_eq!(DefaultScalarValue::Int(4).as_float(), Some(4.0));
    }

    #[test]
    fn displays_string_without_quotes() {
        assert_eq!(DefaultScalarValue::String("abc".into()).to_string(), "abc");
    }
}

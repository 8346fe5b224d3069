//! Error kinds produced during execution, and their wire representation.

use derive_more::{Display, Error};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::{
    parser::SourcePosition,
    value::{DefaultScalarValue, ScalarValue, Value},
};

/// An error produced while resolving a single field.
///
/// Carries an arbitrary `extensions` payload alongside the message, mirroring
/// the `message`/`extensions` split of a wire error record.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldError<S = DefaultScalarValue> {
    message: String,
    extensions: Value<S>,
}

impl<S> FieldError<S> {
    /// Constructs a new [`FieldError`] with no extensions.
    pub fn new<T: ToString>(message: T) -> Self {
        Self {
            message: message.to_string(),
            extensions: Value::Null,
        }
    }

    /// Constructs a new [`FieldError`] carrying an `extensions` payload.
    pub fn with_extensions<T: ToString>(message: T, extensions: Value<S>) -> Self {
        Self {
            message: message.to_string(),
            extensions,
        }
    }

    /// The human-readable error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The `extensions` payload, if one was attached.
    pub fn extensions(&self) -> &Value<S> {
        &self.extensions
    }
}

impl<T: std::fmt::Display, S> From<T> for FieldError<S> {
    fn from(e: T) -> Self {
        Self::new(e)
    }
}

/// A [`FieldError`] tied to the source location and response path of the
/// field that produced it.
#[derive(Clone, Debug)]
pub struct ExecutionError<S = DefaultScalarValue> {
    location: SourcePosition,
    path: Vec<PathSegment>,
    error: FieldError<S>,
}

impl<S> ExecutionError<S> {
    /// Constructs a new located, path-tagged [`ExecutionError`].
    pub fn new(location: SourcePosition, path: Vec<PathSegment>, error: FieldError<S>) -> Self {
        Self {
            location,
            path,
            error,
        }
    }

    pub fn location(&self) -> &SourcePosition {
        &self.location
    }

    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    pub fn error(&self) -> &FieldError<S> {
        &self.error
    }
}

impl<S: PartialEq> PartialEq for ExecutionError<S> {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location && self.path == other.path && self.error == other.error
    }
}

/// One segment of a response path: either a response-key field name, or a
/// list element index.
///
/// Mirrors the teacher's `FieldPath` linked-list representation but, per the
/// incremental-delivery requirement that list elements themselves be
/// addressable, adds an index variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A field's response key (alias, or name if unaliased).
    Field(String),
    /// A zero-based index into a list.
    Index(usize),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{name}"),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

impl Serialize for PathSegment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Field(name) => serializer.serialize_str(name),
            Self::Index(i) => serializer.serialize_u64(*i as u64),
        }
    }
}

impl<S: ScalarValue> Serialize for ExecutionError<S> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let has_extensions = !self.error().extensions().is_null();
        let mut map = serializer.serialize_map(Some(if has_extensions { 4 } else { 3 }))?;

        map.serialize_key("message")?;
        map.serialize_value(self.error().message())?;

        map.serialize_key("locations")?;
        map.serialize_value(&[self.location()])?;

        map.serialize_key("path")?;
        map.serialize_value(self.path())?;

        if has_extensions {
            map.serialize_key("extensions")?;
            map.serialize_value(self.error().extensions())?;
        }

        map.end()
    }
}

/// Errors that can prevent execution from starting, or from continuing past
/// a fatal validation step.
///
/// Per-field resolution failures are not represented here: those are caught
/// at the field boundary and reported as [`ExecutionError`]s within a
/// successful response instead (see the field-error policy documented on
/// [`crate::resolve`]). Every variant here instead produces a response with
/// `errors` present and `data` entirely absent.
#[derive(Clone, Debug, Display, Error)]
pub enum GraphQLError {
    /// No operation matched the requested operation name, or the document
    /// contains more than one operation and none was named.
    #[display("{message}")]
    OperationSelection {
        /// Human-readable explanation.
        #[error(not(source))]
        message: String,
    },

    /// A variable value could not be coerced against its declared type or
    /// default.
    #[display("{message}")]
    VariableCoercion {
        /// Human-readable explanation.
        #[error(not(source))]
        message: String,
    },

    /// Two selections under the same response key have incompatible
    /// `@stream` directives.
    #[display("{message}")]
    DirectiveConflict {
        /// Human-readable explanation, naming the conflicting response key.
        #[error(not(source))]
        message: String,
        /// Source locations of every selection that conflicted.
        locations: Vec<SourcePosition>,
    },
}

/// A single wire error record, without the `locations`/`path` fields that
/// only make sense for a located field error.
enum WireError<'a> {
    Message(&'a str),
    WithLocations(&'a str, &'a [SourcePosition]),
}

impl Serialize for WireError<'_> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        match self {
            Self::Message(message) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_key("message")?;
                map.serialize_value(message)?;
                map.end()
            }
            Self::WithLocations(message, locations) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_key("message")?;
                map.serialize_value(message)?;
                map.serialize_key("locations")?;
                map.serialize_value(locations)?;
                map.end()
            }
        }
    }
}

impl Serialize for GraphQLError {
    /// Serializes to the full `errors` array value for a fatal, whole-request
    /// error: a one-element list, matching the wire shape a response's
    /// `errors` field always has.
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        match self {
            Self::OperationSelection { message } | Self::VariableCoercion { message } => {
                [WireError::Message(message.as_str())].serialize(serializer)
            }
            Self::DirectiveConflict { message, locations } => {
                [WireError::WithLocations(message.as_str(), locations.as_slice())]
                    .serialize(serializer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_error_from_display_has_null_extensions() {
        let err: FieldError = "boom".into();
        assert_eq!(err.message(), "boom");
        assert_eq!(err.extensions(), &Value::Null);
    }

    #[test]
    fn path_segment_displays_bare() {
        assert_eq!(PathSegment::Field("name".into()).to_string(), "name");
        assert_eq!(PathSegment::Index(3).to_string(), "3");
    }
}

//! Request AST: the syntax-tree shapes produced by parsing (treated here as
//! an external collaborator — see [`crate::parser`]) and consumed by
//! execution.

use std::{borrow::Cow, fmt, hash::Hash, mem, slice, vec};

use indexmap::IndexMap;

use crate::{
    executor::Variables,
    parser::Spanning,
    value::{DefaultScalarValue, ScalarValue},
};

/// Possible modifiers in a [`Type`] literal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TypeModifier {
    /// Non-`null` type (e.g. `<type>!`).
    NonNull,

    /// List of types (e.g. `[<type>]`).
    List(Option<usize>),
}

/// Owned slice of [`TypeModifier`]s.
#[derive(Clone, Debug)]
pub enum TypeModifiers {
    /// [`TypeModifier`]s known statically.
    Static(&'static [TypeModifier]),

    /// [`TypeModifier`]s built dynamically.
    Dynamic(Box<[TypeModifier]>),
}

impl Default for TypeModifiers {
    fn default() -> Self {
        Self::Static(&[])
    }
}

impl AsRef<[TypeModifier]> for TypeModifiers {
    fn as_ref(&self) -> &[TypeModifier] {
        match self {
            Self::Static(s) => s,
            Self::Dynamic(bs) => bs,
        }
    }
}

impl Extend<TypeModifier> for TypeModifiers {
    fn extend<T: IntoIterator<Item = TypeModifier>>(&mut self, iter: T) {
        for modifier in iter {
            self.wrap(modifier);
        }
    }
}

impl TypeModifiers {
    fn wrap(&mut self, modifier: TypeModifier) {
        *self = match (mem::take(self), modifier) {
            (Self::Static(&[]), TypeModifier::NonNull) => Self::Static(&[TypeModifier::NonNull]),
            (Self::Static(&[]), TypeModifier::List(None)) => {
                Self::Static(&[TypeModifier::List(None)])
            }
            (Self::Static(&[TypeModifier::NonNull]), TypeModifier::List(None)) => {
                Self::Static(&[TypeModifier::NonNull, TypeModifier::List(None)])
            }
            (Self::Static(s), modifier) => {
                let mut vec: Vec<_> = s.to_vec();
                vec.push(modifier);
                Self::Dynamic(vec.into_boxed_slice())
            }
            (Self::Dynamic(s), modifier) => {
                let mut vec = s.into_vec();
                vec.push(modifier);
                Self::Dynamic(vec.into_boxed_slice())
            }
        };
    }
}

/// Type literal in a syntax tree.
///
/// Carries no semantic information and might refer to types that don't
/// exist; schema-level type checking is outside this crate's scope.
#[derive(Clone, Copy, Debug)]
pub struct Type<N = String, M = TypeModifiers> {
    name: N,
    modifiers: M,
}

impl<N, M> Eq for Type<N, M> where Self: PartialEq {}

impl<N1, N2, M1, M2> PartialEq<Type<N2, M2>> for Type<N1, M1>
where
    N1: AsRef<str>,
    N2: AsRef<str>,
    M1: AsRef<[TypeModifier]>,
    M2: AsRef<[TypeModifier]>,
{
    fn eq(&self, other: &Type<N2, M2>) -> bool {
        self.name.as_ref() == other.name.as_ref()
            && self.modifiers.as_ref() == other.modifiers.as_ref()
    }
}

impl<N, M> fmt::Display for Type<N, M>
where
    N: AsRef<str>,
    M: AsRef<[TypeModifier]>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modifiers = self.modifiers.as_ref();
        match modifiers.last() {
            Some(TypeModifier::NonNull) => write!(f, "{}!", self.name.as_ref()),
            Some(TypeModifier::List(..)) => write!(f, "[{}]", self.name.as_ref()),
            None => write!(f, "{}", self.name.as_ref()),
        }
    }
}

impl<N: AsRef<str>, M: AsRef<[TypeModifier]>> Type<N, M> {
    /// Returns the name of this [`Type`]. Lists return [`None`].
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        (!self.is_list()).then(|| self.name.as_ref())
    }

    /// Returns the innermost name of this [`Type`].
    #[must_use]
    pub fn innermost_name(&self) -> &str {
        self.name.as_ref()
    }

    /// Returns the topmost [`TypeModifier`] of this [`Type`], if any.
    #[must_use]
    pub fn modifier(&self) -> Option<&TypeModifier> {
        self.modifiers.as_ref().last()
    }

    /// Indicates whether this [`Type`] is non-null.
    #[must_use]
    pub fn is_non_null(&self) -> bool {
        matches!(self.modifier(), Some(TypeModifier::NonNull))
    }

    /// Indicates whether this [`Type`] represents a list.
    #[must_use]
    pub fn is_list(&self) -> bool {
        self.modifiers
            .as_ref()
            .iter()
            .any(|m| matches!(m, TypeModifier::List(..)))
    }
}

impl<N, M: Default> Type<N, M> {
    /// Creates a new `null`able [`Type`] literal from the provided `name`.
    #[must_use]
    pub fn nullable(name: impl Into<N>) -> Self {
        Self {
            name: name.into(),
            modifiers: M::default(),
        }
    }
}

impl<N, M: Extend<TypeModifier>> Type<N, M> {
    fn wrap(mut self, modifier: TypeModifier) -> Self {
        self.modifiers.extend([modifier]);
        self
    }

    /// Wraps this [`Type`] into a list with the provided `expected_size`, if
    /// any.
    #[must_use]
    pub fn wrap_list(self, expected_size: Option<usize>) -> Self {
        self.wrap(TypeModifier::List(expected_size))
    }

    /// Wraps this [`Type`] as non-null.
    #[must_use]
    pub fn wrap_non_null(self) -> Self {
        self.wrap(TypeModifier::NonNull)
    }
}

/// A JSON-like value that can be passed into query execution, either
/// out-of-band as a variable, or in-band as a default value or literal
/// argument. Not constant: may contain variable references.
///
/// Lists and objects are _spanned_, i.e. carry a reference to their position
/// in the source document, when available.
#[derive(Clone, Debug, PartialEq)]
pub enum InputValue<S = DefaultScalarValue> {
    /// Literal `null`.
    Null,
    /// A scalar literal.
    Scalar(S),
    /// An enum value literal.
    Enum(String),
    /// A `$name` variable reference.
    Variable(String),
    /// A list literal.
    List(Vec<Spanning<InputValue<S>>>),
    /// An object literal.
    Object(Vec<(Spanning<String>, Spanning<InputValue<S>>)>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableDefinition<'a, S> {
    pub var_type: Spanning<Type<&'a str>>,
    pub default_value: Option<Spanning<InputValue<S>>>,
    pub directives: Option<Vec<Spanning<Directive<'a, S>>>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Arguments<'a, S> {
    pub items: Vec<(Spanning<&'a str>, Spanning<InputValue<S>>)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariablesDefinition<'a, S> {
    pub items: Vec<(Spanning<&'a str>, VariableDefinition<'a, S>)>,
}

impl<'a, S> VariablesDefinition<'a, S> {
    pub fn iter(&self) -> slice::Iter<'_, (Spanning<&'a str>, VariableDefinition<'a, S>)> {
        self.items.iter()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field<'a, S> {
    pub alias: Option<Spanning<&'a str>>,
    pub name: Spanning<&'a str>,
    pub arguments: Option<Spanning<Arguments<'a, S>>>,
    pub directives: Option<Vec<Spanning<Directive<'a, S>>>>,
    pub selection_set: Option<Vec<Selection<'a, S>>>,
}

impl<'a, S> Field<'a, S> {
    /// The name this field's result is keyed under in the response: its
    /// alias if present, otherwise its name.
    pub fn response_key(&self) -> &'a str {
        self.alias.as_ref().map_or(self.name.item, |a| a.item)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FragmentSpread<'a, S> {
    pub name: Spanning<&'a str>,
    pub directives: Option<Vec<Spanning<Directive<'a, S>>>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InlineFragment<'a, S> {
    pub type_condition: Option<Spanning<&'a str>>,
    pub directives: Option<Vec<Spanning<Directive<'a, S>>>>,
    pub selection_set: Vec<Selection<'a, S>>,
}

/// Entry in a selection set: a field, a fragment spread, or an inline
/// fragment.
///
/// ```text
/// {
///   field(withArg: 123) { subField }
///   ...fragmentSpread
///   ...on User {
///     inlineFragmentField
///   }
/// }
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Selection<'a, S = DefaultScalarValue> {
    Field(Spanning<Field<'a, S>>),
    FragmentSpread(Spanning<FragmentSpread<'a, S>>),
    InlineFragment(Spanning<InlineFragment<'a, S>>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Directive<'a, S> {
    pub name: Spanning<&'a str>,
    pub arguments: Option<Spanning<Arguments<'a, S>>>,
}

impl<'a, S> Directive<'a, S> {
    /// Looks up an argument literal by name.
    pub fn argument(&self, name: &str) -> Option<&Spanning<InputValue<S>>> {
        self.arguments.as_ref().and_then(|a| a.item.get(name))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Operation<'a, S> {
    pub operation_type: OperationType,
    pub name: Option<Spanning<&'a str>>,
    pub variables_definition: Option<Spanning<VariablesDefinition<'a, S>>>,
    pub directives: Option<Vec<Spanning<Directive<'a, S>>>>,
    pub selection_set: Vec<Selection<'a, S>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fragment<'a, S> {
    pub name: Spanning<&'a str>,
    pub type_condition: Spanning<&'a str>,
    pub directives: Option<Vec<Spanning<Directive<'a, S>>>>,
    pub selection_set: Vec<Selection<'a, S>>,
}

#[doc(hidden)]
#[derive(Clone, Debug, PartialEq)]
pub enum Definition<'a, S> {
    Operation(Spanning<Operation<'a, S>>),
    Fragment(Spanning<Fragment<'a, S>>),
}

#[doc(hidden)]
pub type Document<'a, S> = [Definition<'a, S>];
#[doc(hidden)]
pub type OwnedDocument<'a, S> = Vec<Definition<'a, S>>;

/// Parsing of an unstructured [`InputValue`] into a Rust data type.
///
/// The conversion can fail, and must in that case return an [`Err`].
pub trait FromInputValue<S = DefaultScalarValue>: Sized {
    /// Type of this conversion error.
    type Error;

    /// Performs the conversion.
    fn from_input_value(v: &InputValue<S>) -> Result<Self, Self::Error>;

    /// Performs the conversion from an absent value (e.g. to distinguish
    /// between implicit and explicit `null`).
    fn from_implicit_null() -> Result<Self, Self::Error> {
        Self::from_input_value(&InputValue::<S>::Null)
    }
}

/// Losslessly clones a Rust data type into an [`InputValue`].
pub trait ToInputValue<S = DefaultScalarValue> {
    /// Performs the conversion.
    fn to_input_value(&self) -> InputValue<S>;
}

impl<S> InputValue<S> {
    pub fn null() -> Self {
        Self::Null
    }

    pub fn scalar<T: Into<S>>(v: T) -> Self {
        Self::Scalar(v.into())
    }

    pub fn enum_value<T: AsRef<str>>(s: T) -> Self {
        Self::Enum(s.as_ref().into())
    }

    pub fn variable<T: AsRef<str>>(v: T) -> Self {
        Self::Variable(v.as_ref().into())
    }

    /// Construct a [`Spanning::unlocated`] list.
    pub fn list(l: Vec<Self>) -> Self {
        Self::List(l.into_iter().map(Spanning::unlocated).collect())
    }

    pub fn parsed_list(l: Vec<Spanning<Self>>) -> Self {
        Self::List(l)
    }

    /// Construct a [`Spanning::unlocated`] object.
    pub fn object<K>(o: IndexMap<K, Self>) -> Self
    where
        K: AsRef<str> + Eq + Hash,
    {
        Self::Object(
            o.into_iter()
                .map(|(k, v)| (Spanning::unlocated(k.as_ref().into()), Spanning::unlocated(v)))
                .collect(),
        )
    }

    pub fn parsed_object(o: Vec<(Spanning<String>, Spanning<Self>)>) -> Self {
        Self::Object(o)
    }

    /// Resolves all variables of this [`InputValue`] to their actual values.
    ///
    /// If a variable is not present in `values`:
    /// - Returns [`None`] for an [`InputValue::Variable`].
    /// - Skips the field for an [`InputValue::Object`] entry.
    /// - Replaces with [`InputValue::Null`] for an [`InputValue::List`]
    ///   element.
    #[must_use]
    pub fn into_const(self, values: &Variables<S>) -> Option<Self>
    where
        S: Clone,
    {
        match self {
            Self::Variable(v) => values.get(&v).cloned(),
            Self::List(l) => Some(Self::List(
                l.into_iter()
                    .map(|s| s.map(|v| v.into_const(values).unwrap_or_else(Self::null)))
                    .collect(),
            )),
            Self::Object(o) => Some(Self::Object(
                o.into_iter()
                    .filter_map(|(sk, sv)| sv.and_then(|v| v.into_const(values)).map(|sv| (sk, sv)))
                    .collect(),
            )),
            v => Some(v),
        }
    }

    pub fn convert<T: FromInputValue<S>>(&self) -> Result<T, T::Error> {
        T::from_input_value(self)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable(_))
    }

    pub fn as_enum_value(&self) -> Option<&str> {
        match self {
            Self::Enum(e) => Some(e.as_str()),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&S> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_object_value(&self) -> Option<IndexMap<&str, &Self>> {
        match self {
            Self::Object(o) => Some(o.iter().map(|(sk, sv)| (sk.item.as_str(), &sv.item)).collect()),
            _ => None,
        }
    }

    pub fn to_list_value(&self) -> Option<Vec<&Self>> {
        match self {
            Self::List(l) => Some(l.iter().map(|s| &s.item).collect()),
            _ => None,
        }
    }

    /// Recursively finds all referenced variable names.
    pub fn referenced_variables(&self) -> Vec<&str> {
        match self {
            Self::Variable(name) => vec![name.as_str()],
            Self::List(l) => l.iter().flat_map(|v| v.item.referenced_variables()).collect(),
            Self::Object(o) => o.iter().flat_map(|(_, v)| v.item.referenced_variables()).collect(),
            _ => vec![],
        }
    }

    /// Compares equality with another [`InputValue`] ignoring source
    /// position information.
    pub fn unlocated_eq(&self, other: &Self) -> bool
    where
        S: PartialEq,
    {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Scalar(s1), Self::Scalar(s2)) => s1 == s2,
            (Self::Enum(s1), Self::Enum(s2)) | (Self::Variable(s1), Self::Variable(s2)) => s1 == s2,
            (Self::List(l1), Self::List(l2)) => {
                l1.len() == l2.len()
                    && l1
                        .iter()
                        .zip(l2.iter())
                        .all(|(v1, v2)| v1.item.unlocated_eq(&v2.item))
            }
            (Self::Object(o1), Self::Object(o2)) => {
                o1.len() == o2.len()
                    && o1.iter().all(|(sk1, sv1)| {
                        o2.iter()
                            .any(|(sk2, sv2)| sk1.item == sk2.item && sv1.item.unlocated_eq(&sv2.item))
                    })
            }
            _ => false,
        }
    }
}

impl<S: ScalarValue> fmt::Display for InputValue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Scalar(s) => {
                if let Some(str_val) = s.as_str() {
                    write!(f, "\"{str_val}\"")
                } else {
                    write!(f, "{s}")
                }
            }
            Self::Enum(v) => write!(f, "{v}"),
            Self::Variable(v) => write!(f, "${v}"),
            Self::List(v) => {
                write!(f, "[")?;
                for (i, spanning) in v.iter().enumerate() {
                    spanning.item.fmt(f)?;
                    if i < v.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, "]")
            }
            Self::Object(o) => {
                write!(f, "{{")?;
                for (i, (k, v)) in o.iter().enumerate() {
                    write!(f, "{}: ", k.item)?;
                    v.item.fmt(f)?;
                    if i < o.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

/// Conversion into an [`InputValue`], used to build test fixtures and
/// default-value literals directly as Rust values.
pub trait IntoInputValue<S> {
    #[must_use]
    fn into_input_value(self) -> InputValue<S>;
}

impl<S> IntoInputValue<S> for InputValue<S> {
    fn into_input_value(self) -> Self {
        self
    }
}

impl<T, S> IntoInputValue<S> for Option<T>
where
    T: IntoInputValue<S>,
{
    fn into_input_value(self) -> InputValue<S> {
        match self {
            Some(v) => v.into_input_value(),
            None => InputValue::Null,
        }
    }
}

impl<S> IntoInputValue<S> for String
where
    String: Into<S>,
{
    fn into_input_value(self) -> InputValue<S> {
        InputValue::Scalar(self.into())
    }
}

impl<S> IntoInputValue<S> for &str
where
    String: Into<S>,
{
    fn into_input_value(self) -> InputValue<S> {
        InputValue::Scalar(self.to_owned().into())
    }
}

impl<S> IntoInputValue<S> for Cow<'_, str>
where
    String: Into<S>,
{
    fn into_input_value(self) -> InputValue<S> {
        InputValue::Scalar(self.into_owned().into())
    }
}

impl<S> IntoInputValue<S> for i32
where
    i32: Into<S>,
{
    fn into_input_value(self) -> InputValue<S> {
        InputValue::Scalar(self.into())
    }
}

impl<S> IntoInputValue<S> for f64
where
    f64: Into<S>,
{
    fn into_input_value(self) -> InputValue<S> {
        InputValue::Scalar(self.into())
    }
}

impl<S> IntoInputValue<S> for bool
where
    bool: Into<S>,
{
    fn into_input_value(self) -> InputValue<S> {
        InputValue::Scalar(self.into())
    }
}

impl<'a, S> Arguments<'a, S> {
    pub fn into_iter(self) -> vec::IntoIter<(Spanning<&'a str>, Spanning<InputValue<S>>)> {
        self.items.into_iter()
    }

    pub fn iter(&self) -> slice::Iter<'_, (Spanning<&'a str>, Spanning<InputValue<S>>)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Spanning<InputValue<S>>> {
        self.items.iter().find(|(k, _)| k.item == key).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DefaultScalarValue;

    #[test]
    fn input_value_display_matches_literal_forms() {
        let value: InputValue = InputValue::null();
        assert_eq!(value.to_string(), "null");

        let value: InputValue = InputValue::scalar(123);
        assert_eq!(value.to_string(), "123");

        let value: InputValue = InputValue::scalar("FOO".to_owned());
        assert_eq!(value.to_string(), "\"FOO\"");

        let value: InputValue = InputValue::enum_value("BAR");
        assert_eq!(value.to_string(), "BAR");

        let value: InputValue = InputValue::variable("baz");
        assert_eq!(value.to_string(), "$baz");

        let value: InputValue = InputValue::list(vec![InputValue::scalar(1), InputValue::scalar(2)]);
        assert_eq!(value.to_string(), "[1, 2]");
    }

    #[test]
    fn unlocated_eq_ignores_object_field_order() {
        let mut a = IndexMap::new();
        a.insert("foo", InputValue::<DefaultScalarValue>::scalar(1));
        a.insert("bar", InputValue::scalar(2));
        let mut b = IndexMap::new();
        b.insert("bar", InputValue::<DefaultScalarValue>::scalar(2));
        b.insert("foo", InputValue::scalar(1));
        assert!(InputValue::object(a).unlocated_eq(&InputValue::object(b)));
    }

    #[test]
    fn field_response_key_falls_back_to_name() {
        let field = Field::<DefaultScalarValue> {
            alias: None,
            name: Spanning::unlocated("id"),
            arguments: None,
            directives: None,
            selection_set: None,
        };
        assert_eq!(field.response_key(), "id");
    }
}

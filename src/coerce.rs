//! Value coercion: resolves directive argument literals (substituting
//! variable references) into the fixed shapes this crate understands for
//! `@skip`, `@include`, `@defer`, and `@stream`.
//!
//! Coercion of arbitrary field arguments against a schema's declared input
//! types (recursive list/object coercion, enum validation, default values
//! for user-defined arguments) belongs to the schema/type system this crate
//! treats as an external collaborator; what lives here is the slice of
//! argument coercion the core itself depends on to make control-flow
//! decisions.

use crate::{
    ast::{Directive, InputValue},
    executor::Variables,
    parser::Spanning,
    value::ScalarValue,
};

/// Resolves an [`InputValue`] one level, substituting a variable reference
/// for its bound value. Literals pass through unchanged.
pub fn resolve_argument<'v, S: ScalarValue>(
    value: &'v InputValue<S>,
    variables: &'v Variables<S>,
) -> Option<&'v InputValue<S>> {
    match value {
        InputValue::Variable(name) => variables.get(name),
        other => Some(other),
    }
}

fn find<'a, S>(directives: &'a [Spanning<Directive<'a, S>>], name: &str) -> Option<&'a Directive<'a, S>> {
    directives
        .iter()
        .find(|d| d.item.name.item == name)
        .map(|d| &d.item)
}

fn bool_argument<S: ScalarValue>(
    directive: &Directive<'_, S>,
    name: &str,
    variables: &Variables<S>,
) -> Option<bool> {
    let value = directive.argument(name)?;
    match resolve_argument(&value.item, variables)? {
        InputValue::Scalar(s) => s.as_boolean(),
        _ => None,
    }
}

fn string_argument<S: ScalarValue>(
    directive: &Directive<'_, S>,
    name: &str,
    variables: &Variables<S>,
) -> Option<String> {
    let value = directive.argument(name)?;
    match resolve_argument(&value.item, variables)? {
        InputValue::Scalar(s) => s.as_str().map(str::to_owned),
        _ => None,
    }
}

fn int_argument<S: ScalarValue>(
    directive: &Directive<'_, S>,
    name: &str,
    variables: &Variables<S>,
) -> Option<i32> {
    let value = directive.argument(name)?;
    match resolve_argument(&value.item, variables)? {
        InputValue::Scalar(s) => s.as_int(),
        _ => None,
    }
}

/// Evaluates `@skip(if:)`/`@include(if:)` over a selection's directive list.
/// Absent directives default to "keep the selection".
pub fn selection_allowed<S: ScalarValue>(
    directives: Option<&[Spanning<Directive<'_, S>>]>,
    variables: &Variables<S>,
) -> bool {
    let Some(directives) = directives else {
        return true;
    };
    if let Some(skip) = find(directives, "skip") {
        if bool_argument(skip, "if", variables).unwrap_or(false) {
            return false;
        }
    }
    if let Some(include) = find(directives, "include") {
        if !bool_argument(include, "if", variables).unwrap_or(true) {
            return false;
        }
    }
    true
}

/// The coerced arguments of an `@defer` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferArgs {
    pub label: Option<String>,
}

/// Reads `@defer`'s coerced arguments, or [`None`] if the directive is
/// absent or its `if` evaluates to `false`.
///
/// Per the resolved open question (see `DESIGN.md`), `@defer(if: false)` is
/// indistinguishable from no `@defer` at all: the selection is collected
/// inline rather than held back as an empty deferred group.
pub fn read_defer<S: ScalarValue>(
    directives: Option<&[Spanning<Directive<'_, S>>]>,
    variables: &Variables<S>,
) -> Option<DeferArgs> {
    let defer = find(directives?, "defer")?;
    if !bool_argument(defer, "if", variables).unwrap_or(true) {
        return None;
    }
    Some(DeferArgs {
        label: string_argument(defer, "label", variables),
    })
}

/// The coerced arguments of a `@stream` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamArgs {
    pub label: Option<String>,
    pub initial_count: usize,
}

/// Reads `@stream`'s coerced arguments, or [`None`] if the directive is
/// absent or its `if` evaluates to `false`. `initialCount` defaults to `0`
/// and is clamped to non-negative.
pub fn read_stream<S: ScalarValue>(
    directives: Option<&[Spanning<Directive<'_, S>>]>,
    variables: &Variables<S>,
) -> Option<StreamArgs> {
    let stream = find(directives?, "stream")?;
    if !bool_argument(stream, "if", variables).unwrap_or(true) {
        return None;
    }
    let initial_count = int_argument(stream, "initialCount", variables)
        .unwrap_or(0)
        .max(0) as usize;
    Some(StreamArgs {
        label: string_argument(stream, "label", variables),
        initial_count,
    })
}

/// `@stream`'s coerced arguments as used purely for conflict comparison:
/// unlike [`StreamArgs`], `initialCount` is kept as the raw (possibly
/// negative or absent) scalar so two differing `initialCount` literals are
/// reported as a conflict rather than silently clamped to the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSignature {
    pub label: Option<String>,
    pub initial_count: Option<i32>,
}

/// Reads `@stream`'s arguments for conflict-detection purposes. Returns
/// [`None`] both when the directive is absent and when `if` evaluates to
/// `false`, since both present the same "not streamed" shape to the
/// conflict validator.
pub fn read_stream_signature<S: ScalarValue>(
    directives: Option<&[Spanning<Directive<'_, S>>]>,
    variables: &Variables<S>,
) -> Option<StreamSignature> {
    let stream = find(directives?, "stream")?;
    if !bool_argument(stream, "if", variables).unwrap_or(true) {
        return None;
    }
    Some(StreamSignature {
        label: string_argument(stream, "label", variables),
        initial_count: int_argument(stream, "initialCount", variables),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Arguments;
    use crate::value::DefaultScalarValue;
    use indexmap::IndexMap;

    fn directive_with_bool(name: &str, arg: &str, value: bool) -> Directive<'static, DefaultScalarValue> {
        Directive {
            name: Spanning::unlocated(name),
            arguments: Some(Spanning::unlocated(Arguments {
                items: vec![(
                    Spanning::unlocated(arg),
                    Spanning::unlocated(InputValue::scalar(value)),
                )],
            })),
        }
    }

    #[test]
    fn defer_if_false_is_treated_as_absent() {
        let directives = vec![Spanning::unlocated(directive_with_bool("defer", "if", false))];
        let vars: Variables<DefaultScalarValue> = IndexMap::new();
        assert_eq!(read_defer(Some(&directives), &vars), None);
    }

    #[test]
    fn stream_defaults_initial_count_to_zero() {
        let directives = vec![Spanning::unlocated(Directive {
            name: Spanning::unlocated("stream"),
            arguments: None,
        })];
        let vars: Variables<DefaultScalarValue> = IndexMap::new();
        let args = read_stream(Some(&directives), &vars).unwrap();
        assert_eq!(args.initial_count, 0);
        assert_eq!(args.label, None);
    }

    #[test]
    fn skip_true_overrides_include_true() {
        let directives = vec![
            Spanning::unlocated(directive_with_bool("skip", "if", true)),
            Spanning::unlocated(directive_with_bool("include", "if", true)),
        ];
        let vars: Variables<DefaultScalarValue> = IndexMap::new();
        assert!(!selection_allowed(Some(&directives), &vars));
    }
}

//! Field collection: grouping a selection set's fields by response key,
//! honoring `@skip`/`@include`, fragment spreads/inline fragments, and
//! splitting out `@defer`-marked groups.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::{
    ast::{Field, Fragment, InputValue, Selection},
    coerce::{read_defer, selection_allowed},
    executor::Variables,
    value::ScalarValue,
};

/// A single response key's collected fields: normally exactly one, but a
/// response key can be backed by more than one [`Field`] occurrence (e.g. the
/// same field requested once directly and once through a fragment spread).
#[derive(Debug)]
pub struct FieldGroup<'a, S> {
    pub response_key: &'a str,
    pub fields: Vec<&'a Field<'a, S>>,
}

/// The outcome of collecting a selection set: fields to resolve immediately,
/// and fields deferred behind an `@defer` directive, each tagged with the
/// `label` argument (if any) under which their patch should be reported.
#[derive(Debug, Default)]
pub struct CollectedFields<'a, S> {
    /// Groups to resolve as part of the current (possibly incremental)
    /// payload, in first-appearance order.
    pub immediate: IndexMap<&'a str, FieldGroup<'a, S>>,
    /// Groups gated behind `@defer`, keyed by the defer `label` (or `""` for
    /// an unlabeled defer), each with its own first-appearance-ordered
    /// groups.
    pub deferred: Vec<DeferredGroup<'a, S>>,
}

/// One `@defer`-marked set of field groups sharing a label.
#[derive(Debug)]
pub struct DeferredGroup<'a, S> {
    pub label: Option<String>,
    pub fields: IndexMap<&'a str, FieldGroup<'a, S>>,
}

/// Looks up a named fragment definition; supplied by the executor, which
/// owns the document's fragment table.
pub trait FragmentLookup<'a, S> {
    fn fragment(&self, name: &str) -> Option<&'a Fragment<'a, S>>;
}

/// Collects the fields of `selection_set` into response-key groups.
///
/// `type_condition` is the concrete type name of the object currently being
/// resolved: selections under an inline fragment or fragment spread whose
/// type condition does not match are skipped, per spec. `visited_fragments`
/// guards against spread cycles; a fragment already on the stack is skipped
/// rather than treated as an error, since a real spread cycle would already
/// have been rejected by validation ahead of execution.
pub fn collect_fields<'a, S: ScalarValue>(
    selection_set: &'a [Selection<'a, S>],
    type_condition: &str,
    variables: &Variables<S>,
    fragments: &impl FragmentLookup<'a, S>,
    visited_fragments: &mut HashSet<&'a str>,
) -> CollectedFields<'a, S> {
    let mut out = CollectedFields::default();
    collect_into(
        selection_set,
        type_condition,
        variables,
        fragments,
        visited_fragments,
        &mut out.immediate,
        &mut out.deferred,
    );
    out
}

#[allow(clippy::too_many_arguments, reason = "internal recursive helper")]
fn collect_into<'a, S: ScalarValue>(
    selection_set: &'a [Selection<'a, S>],
    type_condition: &str,
    variables: &Variables<S>,
    fragments: &impl FragmentLookup<'a, S>,
    visited_fragments: &mut HashSet<&'a str>,
    immediate: &mut IndexMap<&'a str, FieldGroup<'a, S>>,
    deferred: &mut Vec<DeferredGroup<'a, S>>,
) {
    for selection in selection_set {
        match selection {
            Selection::Field(field) => {
                let field = &field.item;
                if !selection_allowed(field.directives.as_deref(), variables) {
                    continue;
                }
                if let Some(defer) = read_defer(field.directives.as_deref(), variables) {
                    push_deferred(deferred, defer.label, field.response_key(), field);
                } else {
                    push_immediate(immediate, field.response_key(), field);
                }
            }
            Selection::FragmentSpread(spread) => {
                let spread = &spread.item;
                if !selection_allowed(spread.directives.as_deref(), variables) {
                    continue;
                }
                let Some(fragment) = fragments.fragment(spread.name.item) else {
                    continue;
                };
                if fragment.type_condition.item != type_condition
                    || !visited_fragments.insert(spread.name.item)
                {
                    continue;
                }
                if let Some(defer) = read_defer(spread.directives.as_deref(), variables) {
                    let mut nested_immediate = IndexMap::new();
                    let mut nested_deferred = Vec::new();
                    collect_into(
                        &fragment.selection_set,
                        type_condition,
                        variables,
                        fragments,
                        visited_fragments,
                        &mut nested_immediate,
                        &mut nested_deferred,
                    );
                    deferred.push(DeferredGroup {
                        label: defer.label,
                        fields: nested_immediate,
                    });
                    deferred.extend(nested_deferred);
                } else {
                    collect_into(
                        &fragment.selection_set,
                        type_condition,
                        variables,
                        fragments,
                        visited_fragments,
                        immediate,
                        deferred,
                    );
                }
                visited_fragments.remove(spread.name.item);
            }
            Selection::InlineFragment(inline) => {
                let inline = &inline.item;
                if !selection_allowed(inline.directives.as_deref(), variables) {
                    continue;
                }
                if let Some(cond) = inline.type_condition.as_ref() {
                    if cond.item != type_condition {
                        continue;
                    }
                }
                if let Some(defer) = read_defer(inline.directives.as_deref(), variables) {
                    let mut nested_immediate = IndexMap::new();
                    let mut nested_deferred = Vec::new();
                    collect_into(
                        &inline.selection_set,
                        type_condition,
                        variables,
                        fragments,
                        visited_fragments,
                        &mut nested_immediate,
                        &mut nested_deferred,
                    );
                    deferred.push(DeferredGroup {
                        label: defer.label,
                        fields: nested_immediate,
                    });
                    deferred.extend(nested_deferred);
                } else {
                    collect_into(
                        &inline.selection_set,
                        type_condition,
                        variables,
                        fragments,
                        visited_fragments,
                        immediate,
                        deferred,
                    );
                }
            }
        }
    }
}

fn push_immediate<'a, S>(
    immediate: &mut IndexMap<&'a str, FieldGroup<'a, S>>,
    response_key: &'a str,
    field: &'a Field<'a, S>,
) {
    immediate
        .entry(response_key)
        .or_insert_with(|| FieldGroup {
            response_key,
            fields: Vec::new(),
        })
        .fields
        .push(field);
}

fn push_deferred<'a, S>(
    deferred: &mut Vec<DeferredGroup<'a, S>>,
    label: Option<String>,
    response_key: &'a str,
    field: &'a Field<'a, S>,
) {
    let group = deferred.iter_mut().find(|g| g.label == label);
    let fields = match group {
        Some(g) => &mut g.fields,
        None => {
            deferred.push(DeferredGroup {
                label,
                fields: IndexMap::new(),
            });
            &mut deferred.last_mut().expect("just pushed").fields
        }
    };
    fields
        .entry(response_key)
        .or_insert_with(|| FieldGroup {
            response_key,
            fields: Vec::new(),
        })
        .fields
        .push(field);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::Directive, parser::Spanning, value::DefaultScalarValue};

    struct NoFragments;
    impl<'a> FragmentLookup<'a, DefaultScalarValue> for NoFragments {
        fn fragment(&self, _name: &str) -> Option<&'a Fragment<'a, DefaultScalarValue>> {
            None
        }
    }

    fn field<'a>(name: &'a str, alias: Option<&'a str>) -> Selection<'a, DefaultScalarValue> {
        Selection::Field(Spanning::unlocated(Field {
            alias: alias.map(Spanning::unlocated),
            name: Spanning::unlocated(name),
            arguments: None,
            directives: None,
            selection_set: None,
        }))
    }

    #[test]
    fn collects_fields_in_first_appearance_order() {
        let selection_set = vec![field("b", None), field("a", None), field("b", None)];
        let vars = IndexMap::new();
        let mut visited = HashSet::new();
        let collected =
            collect_fields(&selection_set, "Query", &vars, &NoFragments, &mut visited);
        let keys: Vec<_> = collected.immediate.keys().copied().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(collected.immediate["b"].fields.len(), 2);
    }

    #[test]
    fn skip_true_drops_field() {
        let mut f = field("a", None);
        if let Selection::Field(ref mut spanning) = f {
            spanning.item.directives = Some(vec![Spanning::unlocated(Directive {
                name: Spanning::unlocated("skip"),
                arguments: Some(Spanning::unlocated(crate::ast::Arguments {
                    items: vec![(
                        Spanning::unlocated("if"),
                        Spanning::unlocated(InputValue::scalar(true)),
                    )],
                })),
            })]);
        }
        let selection_set = vec![f];
        let vars = IndexMap::new();
        let mut visited = HashSet::new();
        let collected =
            collect_fields(&selection_set, "Query", &vars, &NoFragments, &mut visited);
        assert!(collected.immediate.is_empty());
    }
}

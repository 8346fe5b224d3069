//! Field resolution and value completion: invoking resolvers for a collected
//! field group and recursively completing the result against its declared
//! shape (non-null propagation, list iteration, leaf serialization, nested
//! object recursion, and `@stream`-driven async-sequence iteration).

use std::cell::RefCell;
use std::collections::HashSet;

use async_trait::async_trait;
use futures::stream::BoxStream;
use indexmap::IndexMap;

use crate::{
    ast::{Field, Fragment, InputValue},
    coerce::read_stream,
    collect::{collect_fields, CollectedFields, DeferredGroup, FragmentLookup},
    conflict::{check_stream_conflicts, StreamConflict},
    error::{ExecutionError, FieldError, PathSegment},
    executor::Variables,
    parser::SourcePosition,
    value::{Object, ScalarValue, Value},
};

/// What a resolver hands back for a single field, before completion.
///
/// This plays the role the schema's declared field type plays in a full
/// type system: it tells the driver how to recurse. Schema-level validation
/// that a resolver's `FieldValue` actually matches some declared type is out
/// of scope here; a resolver is trusted to return a shape consistent with
/// what it advertises.
pub enum FieldValue<S> {
    /// An already-serialized leaf value (scalar, enum, or an explicit
    /// `null` that is allowed to be null).
    Leaf(Value<S>),
    /// A nested object to recurse the field's selection set into.
    Object(Box<dyn Resolvable<S>>),
    /// An ordered list of field values, resolved and completed all at once.
    List(Vec<FieldValue<S>>),
    /// Wraps another [`FieldValue`], turning a `null` produced by it into a
    /// field error that propagates to the nearest nullable ancestor instead
    /// of being returned as-is.
    NonNull(Box<FieldValue<S>>),
    /// An async sequence of field values. Under a field's `@stream`
    /// directive, the first `initialCount` elements are completed inline and
    /// the remainder is registered with the [`crate::dispatch::Dispatcher`]
    /// as a streamed tail; without `@stream`, the sequence is simply
    /// exhausted and concatenated into an ordinary list.
    Stream(BoxStream<'static, Result<FieldValue<S>, FieldError<S>>>),
}

impl<S> FieldValue<S> {
    /// Shorthand for a `null` leaf.
    pub fn null() -> Self {
        Self::Leaf(Value::Null)
    }
}

/// An object-typed resolver: given a field name and its (already-coerced)
/// arguments, produces a [`FieldValue`] or fails with a [`FieldError`].
///
/// Corresponds to the teacher's `GraphQLValueAsync::resolve_field_async`,
/// generalized to return the richer [`FieldValue`] shape this crate needs for
/// `@stream`/`@defer` support.
#[async_trait]
pub trait Resolvable<S: ScalarValue>: Send + Sync {
    /// The concrete type name, used as the type condition when collecting
    /// fragment spreads and inline fragments against this object.
    fn type_name(&self) -> &'static str;

    /// Resolves a single field by name.
    async fn resolve_field(
        &self,
        field_name: &str,
        arguments: &IndexMap<String, InputValue<S>>,
    ) -> Result<FieldValue<S>, FieldError<S>>;
}

/// A streamed list field's remaining elements, registered by
/// [`complete_value`] and drained by the executor into the dispatcher.
///
/// Carries only owned/`'static` data plus borrows of the request document
/// (which outlives the whole execution), so it can be driven independently
/// of the synchronous completion pass that produced it.
pub struct StreamTail<'a, S> {
    pub field: &'a Field<'a, S>,
    pub path: Vec<PathSegment>,
    pub label: Option<String>,
    pub next_index: usize,
    pub stream: BoxStream<'static, Result<FieldValue<S>, FieldError<S>>>,
}

/// A deferred fragment's field group, collected but not yet resolved,
/// registered by [`execute_selection_set`] and drained by the executor into
/// the dispatcher.
///
/// Registered regardless of depth: a `@defer` on a fragment spread or inline
/// fragment nested inside any object's own selection set is held back the
/// same way a `@defer` at the request's root is, with `path` set to that
/// nested object's own response path so the resulting patch is grafted in
/// the right place. The only selection set that does not honor `@defer` is a
/// mutation operation's own root one (see [`execute_selection_set`]'s
/// `honor_defer` parameter).
pub struct DeferredTail<'a, S> {
    pub label: Option<String>,
    pub path: Vec<PathSegment>,
    pub group: IndexMap<&'a str, crate::collect::FieldGroup<'a, S>>,
}

/// Everything needed to collect and complete a selection set: the document's
/// fragment table, coerced variables, and the shared error/defer/stream
/// sinks that the top-level executor drains after the synchronous pass.
pub struct ExecutionContext<'a, S> {
    pub fragments: IndexMap<&'a str, &'a Fragment<'a, S>>,
    pub variables: Variables<S>,
    pub errors: RefCell<Vec<ExecutionError<S>>>,
    pub stream_tails: RefCell<Vec<StreamTail<'a, S>>>,
    pub deferred_tails: RefCell<Vec<DeferredTail<'a, S>>>,
    /// The first `@stream` conflict found anywhere in the request, if any.
    ///
    /// Set in place of pushing a normal field error: a conflict is fatal for
    /// the whole request, so the executor checks this after the synchronous
    /// pass completes and discards any data it produced.
    pub conflict: RefCell<Option<StreamConflict>>,
}

impl<'a, S> FragmentLookup<'a, S> for ExecutionContext<'a, S> {
    fn fragment(&self, name: &str) -> Option<&'a Fragment<'a, S>> {
        self.fragments.get(name).copied()
    }
}

impl<'a, S: ScalarValue> ExecutionContext<'a, S> {
    pub fn new(fragments: IndexMap<&'a str, &'a Fragment<'a, S>>, variables: Variables<S>) -> Self {
        Self {
            fragments,
            variables,
            errors: RefCell::new(Vec::new()),
            stream_tails: RefCell::new(Vec::new()),
            deferred_tails: RefCell::new(Vec::new()),
            conflict: RefCell::new(None),
        }
    }

    fn push_error(&self, location: SourcePosition, path: Vec<PathSegment>, error: FieldError<S>) {
        self.errors
            .borrow_mut()
            .push(ExecutionError::new(location, path, error));
    }

    fn report_conflict(&self, conflict: StreamConflict) {
        let mut slot = self.conflict.borrow_mut();
        if slot.is_none() {
            *slot = Some(conflict);
        }
    }
}

/// Resolves and completes a full selection set against a root [`Resolvable`]
/// object, in first-appearance response-key order.
///
/// Sibling fields are resolved concurrently (eagerly dispatched, then
/// awaited in key order rather than completion order) except when `serial`
/// is set, in which case each field group is awaited before the next one
/// starts — the discipline required for mutation root fields.
///
/// `honor_defer` is `false` only for a mutation operation's own root
/// selection set (see [`DeferredTail`]): every nested selection set,
/// regardless of depth, is resolved with `honor_defer: true` so a `@defer`
/// anywhere below the root is still registered as a deferred tail.
///
/// Returns `Err(PropagatedNull)` when a non-null violation anywhere in this
/// selection set could not be contained by a nullable field within it; the
/// caller is then responsible for nulling this selection set's own position
/// (see [`complete_value`]'s `Object` arm).
pub async fn execute_selection_set<'a, S: ScalarValue>(
    root: &dyn Resolvable<S>,
    selection_set: &'a [crate::ast::Selection<'a, S>],
    ctx: &ExecutionContext<'a, S>,
    path: &[PathSegment],
    serial: bool,
    honor_defer: bool,
) -> Result<Object<S>, PropagatedNull> {
    let mut visited = HashSet::new();
    let mut collected: CollectedFields<'a, S> =
        collect_fields(selection_set, root.type_name(), &ctx.variables, ctx, &mut visited);

    if let Err(conflict) = check_stream_conflicts(collected.immediate.values(), &ctx.variables) {
        ctx.report_conflict(conflict);
        return Ok(Object::with_capacity(0));
    }

    if honor_defer {
        for DeferredGroup { label, fields } in collected.deferred.drain(..) {
            ctx.deferred_tails.borrow_mut().push(DeferredTail {
                label,
                path: path.to_vec(),
                group: fields,
            });
        }
    } else {
        for DeferredGroup { fields, .. } in collected.deferred.drain(..) {
            for (key, group) in fields {
                collected.immediate.entry(key).or_insert(group);
            }
        }
    }

    resolve_groups(root, &collected.immediate, ctx, path, serial).await
}

/// Marks that a non-null violation somewhere in a selection set propagated
/// past every nullable position within it, and must null this selection
/// set's own containing field instead.
///
/// Carries no data: the located [`ExecutionError`] for the violation itself
/// is already pushed to [`ExecutionContext::errors`] at the point it was
/// detected, in [`resolve_group`].
pub struct PropagatedNull;

/// Resolves and completes an already-collected set of field groups, in
/// first-appearance response-key order.
///
/// Factored out of [`execute_selection_set`] so the executor can reuse it
/// directly against a deferred fragment's pre-collected group, without
/// re-running field collection.
///
/// Every sibling field group is still resolved even once one has already
/// propagated a null — a mutation field's side effects still run, and a
/// query field's own error is still collected — but the whole call reports
/// `Err(PropagatedNull)` if any of them did, so the caller can null this
/// object's own position instead of returning a partially built one.
pub(crate) async fn resolve_groups<'a, S: ScalarValue>(
    root: &dyn Resolvable<S>,
    groups: &IndexMap<&'a str, crate::collect::FieldGroup<'a, S>>,
    ctx: &ExecutionContext<'a, S>,
    path: &[PathSegment],
    serial: bool,
) -> Result<Object<S>, PropagatedNull> {
    let mut object = Object::with_capacity(groups.len());
    let mut propagated = false;

    if serial {
        for (response_key, group) in groups {
            match resolve_group(root, group.fields[0], response_key, ctx, path).await {
                Ok(value) => object.add_field((*response_key).to_owned(), value),
                Err(PropagatedNull) => propagated = true,
            }
        }
    } else {
        let futures = groups
            .iter()
            .map(|(response_key, group)| resolve_group(root, group.fields[0], response_key, ctx, path));
        let values = futures::future::join_all(futures).await;
        for ((response_key, _), value) in groups.iter().zip(values) {
            match value {
                Ok(value) => object.add_field((*response_key).to_owned(), value),
                Err(PropagatedNull) => propagated = true,
            }
        }
    }

    if propagated {
        Err(PropagatedNull)
    } else {
        Ok(object)
    }
}

/// Resolves and completes a single field, reporting a located error for
/// either an outright resolver failure (always contained to this field,
/// replaced with `null`) or a non-null violation surfacing from completion
/// (reported the same way, but propagated to the caller instead of being
/// contained here — see [`PropagatedNull`]).
async fn resolve_group<'a, S: ScalarValue>(
    root: &dyn Resolvable<S>,
    field: &'a Field<'a, S>,
    response_key: &str,
    ctx: &ExecutionContext<'a, S>,
    path: &[PathSegment],
) -> Result<Value<S>, PropagatedNull> {
    let mut field_path = path.to_vec();
    field_path.push(PathSegment::Field(response_key.to_owned()));

    let arguments = coerce_arguments(field, &ctx.variables);

    match root.resolve_field(field.name.item, &arguments).await {
        Ok(value) => match complete_value(value, field, ctx, &field_path).await {
            Ok(v) => Ok(v),
            Err(err) => {
                ctx.push_error(*field.name.start(), field_path, err);
                Err(PropagatedNull)
            }
        },
        Err(err) => {
            tracing::debug!(field = field.name.item, error = %err.message(), "field resolver returned an error");
            ctx.push_error(*field.name.start(), field_path, err);
            Ok(Value::Null)
        }
    }
}

/// Reads literal argument values off a field, substituting variables.
///
/// Full coercion against a declared input type (defaults, enum/input-object
/// validation) is the value coercer's responsibility at the schema boundary
/// and out of scope here; this only performs the variable substitution step
/// that field resolution itself depends on.
fn coerce_arguments<S: ScalarValue>(
    field: &Field<'_, S>,
    variables: &Variables<S>,
) -> IndexMap<String, InputValue<S>> {
    let Some(arguments) = field.arguments.as_ref() else {
        return IndexMap::new();
    };
    arguments
        .item
        .iter()
        .map(|(name, value)| {
            let resolved = match &value.item {
                InputValue::Variable(var_name) => {
                    variables.get(var_name).cloned().unwrap_or(InputValue::Null)
                }
                other => other.clone(),
            };
            ((*name.item).to_owned(), resolved)
        })
        .collect()
}

/// Completes a resolved [`FieldValue`] into a response [`Value`], recursing
/// into nested objects, lists, and async sequences as required.
///
/// Field-error policy: a plain resolver failure is caught at that field's
/// own boundary by [`resolve_group`] and replaced with `null` there. A
/// `null` produced under a [`FieldValue::NonNull`] wrapper is different: this
/// function returns it as an [`Err`] instead of swallowing it into that
/// field's own slot, and the caller must keep propagating it outward rather
/// than stopping at the position that produced it. The [`FieldValue::Object`]
/// arm is where most of that propagation happens in practice: a nested
/// selection set reporting [`PropagatedNull`] becomes this object's own
/// `null`, which re-triggers the `NonNull` arm one level further out if this
/// object's own field was itself declared non-null.
fn complete_value<'a, 'b, S: ScalarValue>(
    value: FieldValue<S>,
    field: &'a Field<'a, S>,
    ctx: &'b ExecutionContext<'a, S>,
    path: &'b [PathSegment],
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value<S>, FieldError<S>>> + 'b>>
where
    'a: 'b,
{
    Box::pin(async move {
        match value {
            FieldValue::Leaf(v) => Ok(v),
            FieldValue::NonNull(inner) => {
                let completed = complete_value(*inner, field, ctx, path).await?;
                if completed.is_null() {
                    Err(FieldError::new(format!(
                        "Cannot return null for non-nullable field \"{}\".",
                        field.response_key()
                    )))
                } else {
                    Ok(completed)
                }
            }
            FieldValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let mut item_path = path.to_vec();
                    item_path.push(PathSegment::Index(index));
                    match complete_value(item, field, ctx, &item_path).await {
                        Ok(v) => out.push(v),
                        Err(err) => {
                            ctx.push_error(*field.name.start(), item_path, err);
                            out.push(Value::Null);
                        }
                    }
                }
                Ok(Value::List(out))
            }
            FieldValue::Object(obj) => {
                let selection_set = field.selection_set.as_deref().unwrap_or(&[]);
                match execute_selection_set(obj.as_ref(), selection_set, ctx, path, false, true)
                    .await
                {
                    Ok(object) => Ok(Value::Object(object)),
                    Err(PropagatedNull) => Ok(Value::Null),
                }
            }
            FieldValue::Stream(mut stream) => {
                use futures::StreamExt;

                match read_stream(field.directives.as_deref(), &ctx.variables) {
                    None => {
                        let mut out = Vec::new();
                        let mut index = 0usize;
                        while let Some(item) = stream.next().await {
                            let mut item_path = path.to_vec();
                            item_path.push(PathSegment::Index(index));
                            out.push(complete_stream_item(item, field, ctx, item_path).await.0);
                            index += 1;
                        }
                        Ok(Value::List(out))
                    }
                    Some(args) => {
                        let initial_count = args.initial_count;
                        let label = args.label;
                        let mut out = Vec::with_capacity(initial_count);
                        let mut index = 0usize;
                        while index < initial_count {
                            let Some(item) = stream.next().await else {
                                break;
                            };
                            let mut item_path = path.to_vec();
                            item_path.push(PathSegment::Index(index));
                            out.push(complete_stream_item(item, field, ctx, item_path).await.0);
                            index += 1;
                        }
                        ctx.stream_tails.borrow_mut().push(StreamTail {
                            field,
                            path: path.to_vec(),
                            label,
                            next_index: index,
                            stream,
                        });
                        Ok(Value::List(out))
                    }
                }
            }
        }
    })
}

/// Completes one streamed element, returning its value alongside whether the
/// source item itself was an `Err` (a rejecting iterator, as opposed to a
/// value that merely completed to `null`).
async fn complete_stream_item<'a, S: ScalarValue>(
    item: Result<FieldValue<S>, FieldError<S>>,
    field: &'a Field<'a, S>,
    ctx: &ExecutionContext<'a, S>,
    item_path: Vec<PathSegment>,
) -> (Value<S>, bool) {
    match item {
        Ok(item) => {
            let value = complete_value(item, field, ctx, &item_path)
                .await
                .unwrap_or_else(|err| {
                    ctx.push_error(*field.name.start(), item_path, err);
                    Value::Null
                });
            (value, false)
        }
        Err(err) => {
            ctx.push_error(*field.name.start(), item_path, err);
            (Value::Null, true)
        }
    }
}

/// One further element of a streamed tail: its completed value, and whether
/// the source rejected that element.
pub struct StreamStep<S> {
    pub value: Value<S>,
    pub rejected: bool,
}

/// Completes one further element of a streamed tail, returning its
/// [`StreamStep`] and advancing the tail's cursor. Used by the executor to
/// step a [`StreamTail`] into the next [`crate::dispatch::Patch`].
///
/// Does not itself stop the tail when an element rejects — the caller must
/// check [`StreamStep::rejected`] and decline to poll again, since
/// discarding that signal here would let a rejecting source keep being
/// asked for more.
pub async fn step_stream_tail<'a, S: ScalarValue>(
    tail: &mut StreamTail<'a, S>,
    ctx: &ExecutionContext<'a, S>,
) -> Option<StreamStep<S>> {
    use futures::StreamExt;
    let item = tail.stream.next().await?;
    let mut item_path = tail.path.clone();
    item_path.push(PathSegment::Index(tail.next_index));
    tail.next_index += 1;
    let (value, rejected) = complete_stream_item(item, tail.field, ctx, item_path).await;
    Some(StreamStep { value, rejected })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser::Spanning, value::DefaultScalarValue};

    struct StaticObject;

    #[async_trait]
    impl Resolvable<DefaultScalarValue> for StaticObject {
        fn type_name(&self) -> &'static str {
            "Query"
        }

        async fn resolve_field(
            &self,
            field_name: &str,
            _arguments: &IndexMap<String, InputValue<DefaultScalarValue>>,
        ) -> Result<FieldValue<DefaultScalarValue>, FieldError<DefaultScalarValue>> {
            match field_name {
                "greeting" => Ok(FieldValue::Leaf(Value::from("hi"))),
                "required" => Ok(FieldValue::NonNull(Box::new(FieldValue::null()))),
                _ => Err(FieldError::new("unknown field")),
            }
        }
    }

    fn field<'a>(name: &'a str) -> Field<'a, DefaultScalarValue> {
        Field {
            alias: None,
            name: Spanning::unlocated(name),
            arguments: None,
            directives: None,
            selection_set: None,
        }
    }

    fn empty_ctx<'a>() -> ExecutionContext<'a, DefaultScalarValue> {
        ExecutionContext::new(IndexMap::new(), IndexMap::new())
    }

    #[tokio::test]
    async fn leaf_field_completes_directly() {
        let ctx = empty_ctx();
        let f = field("greeting");
        let selection_set = vec![crate::ast::Selection::Field(Spanning::unlocated(f))];
        let obj = execute_selection_set(&StaticObject, &selection_set, &ctx, &[], false, true)
            .await
            .expect("no non-null violation");
        assert_eq!(obj.get_field_value("greeting"), Some(&Value::from("hi")));
    }

    #[tokio::test]
    async fn non_null_violation_propagates_past_the_object_that_produced_it() {
        let ctx = empty_ctx();
        let f = field("required");
        let selection_set = vec![crate::ast::Selection::Field(Spanning::unlocated(f))];
        let result =
            execute_selection_set(&StaticObject, &selection_set, &ctx, &[], false, true).await;
        assert!(result.is_err());
        assert_eq!(ctx.errors.borrow().len(), 1);
        let error = &ctx.errors.borrow()[0];
        assert!(error.error().message().contains("non-nullable"));
        assert_eq!(error.path(), &[PathSegment::Field("required".to_owned())]);
    }

    #[tokio::test]
    async fn stream_field_without_directive_concatenates_fully() {
        let ctx = empty_ctx();
        let mut f = field("items");
        f.selection_set = None;
        let items: Vec<Result<FieldValue<DefaultScalarValue>, FieldError<DefaultScalarValue>>> =
            vec![
                Ok(FieldValue::Leaf(Value::from(1))),
                Ok(FieldValue::Leaf(Value::from(2))),
            ];
        let stream = Box::pin(futures::stream::iter(items));
        let value = complete_value(FieldValue::Stream(stream), &f, &ctx, &[])
            .await
            .unwrap();
        assert_eq!(value, Value::List(vec![Value::from(1), Value::from(2)]));
        assert!(ctx.stream_tails.borrow().is_empty());
    }
}

//! Top-level request orchestration: operation selection, variable coercion,
//! and dispatching the root selection set, draining whatever `@defer`/
//! `@stream` tails it registers into an ordered incremental sequence.

use std::rc::Rc;

use futures::stream::LocalBoxStream;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::{
    ast::{Definition, InputValue, Operation, OperationType},
    dispatch::{Dispatcher, Patch, StepOutcome},
    error::{ExecutionError, GraphQLError, PathSegment},
    resolve::{
        resolve_groups, step_stream_tail, DeferredTail, ExecutionContext, PropagatedNull,
        Resolvable, StreamTail,
    },
    value::{ScalarValue, Value},
};

/// The coerced variable-value map threaded through collection, conflict
/// checking, and resolution.
///
/// Kept as a bare type alias (rather than a newtype) since every module that
/// consumes it just needs ordered `$name -> value` lookup, nothing more.
pub type Variables<S> = IndexMap<String, InputValue<S>>;

/// The three possible execution roots a request can dispatch against.
///
/// A caller that never serves mutations or subscriptions can simply leave
/// those fields `None`; a request naming such an operation then fails with
/// [`GraphQLError::OperationSelection`], mirroring an unknown operation
/// rather than a distinct "not supported" error, since from this core's
/// point of view there is no difference between the two.
pub struct Roots<'a, S> {
    pub query: &'a dyn Resolvable<S>,
    pub mutation: Option<&'a dyn Resolvable<S>>,
    pub subscription: Option<&'a dyn Resolvable<S>>,
}

/// A single request: the parsed document, the operation to run (by name, if
/// the document defines more than one), the caller-supplied variable
/// values, and the roots available to dispatch against.
pub struct Request<'a, S> {
    pub document: &'a [Definition<'a, S>],
    pub operation_name: Option<&'a str>,
    pub variable_values: Variables<S>,
    pub roots: Roots<'a, S>,
}

/// The initial (and possibly only) response payload.
#[derive(Debug, Clone)]
pub struct Response<S> {
    pub data: Option<Value<S>>,
    pub errors: Vec<ExecutionError<S>>,
    /// `Some(true)` when at least one incremental patch follows; omitted
    /// from the wire shape entirely when there is nothing more to expect.
    pub has_next: Option<bool>,
}

impl<S: ScalarValue> Serialize for Response<S> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut len = usize::from(!self.errors.is_empty()) + usize::from(self.has_next.is_some());
        if self.data.is_some() {
            len += 1;
        }
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(data) = &self.data {
            map.serialize_key("data")?;
            map.serialize_value(data)?;
        }
        if !self.errors.is_empty() {
            map.serialize_key("errors")?;
            map.serialize_value(&self.errors)?;
        }
        if let Some(has_next) = self.has_next {
            map.serialize_key("hasNext")?;
            map.serialize_value(&has_next)?;
        }
        map.end()
    }
}

/// One further payload of an incremental delivery sequence: either a patch
/// carrying part of a deferred fragment or a streamed list element, or the
/// sequence's distinct terminator.
#[derive(Debug, Clone)]
pub enum IncrementalItem<S> {
    Patch(Patch<S>),
    /// The final record of the sequence, carrying no data of its own.
    Terminator,
}

impl<S: ScalarValue> Serialize for IncrementalItem<S> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        match self {
            Self::Patch(patch) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_key("data")?;
                map.serialize_value(&patch.data)?;
                map.serialize_key("path")?;
                map.serialize_value(&patch.path)?;
                if let Some(label) = &patch.label {
                    map.serialize_key("label")?;
                    map.serialize_value(label)?;
                }
                if !patch.errors.is_empty() {
                    map.serialize_key("errors")?;
                    map.serialize_value(&patch.errors)?;
                }
                map.serialize_key("hasNext")?;
                map.serialize_value(&true)?;
                map.end()
            }
            Self::Terminator => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_key("hasNext")?;
                map.serialize_value(&false)?;
                map.end()
            }
        }
    }
}

/// What running a [`Request`] produces.
pub enum Outcome<'a, S> {
    /// A fatal, whole-request error: no operation was resolved, variables
    /// failed to coerce, or two selections produced a `@stream` conflict.
    /// The wire response is `{ "errors": [...] }` with `data` entirely
    /// absent.
    Failed(GraphQLError),
    /// A complete response with no pending incremental work.
    Single(Response<S>),
    /// The initial response, followed by an ordered sequence of incremental
    /// patches ending in a distinct terminator.
    Incremental {
        initial: Response<S>,
        patches: LocalBoxStream<'a, IncrementalItem<S>>,
    },
}

/// Finds the operation to run: the only operation in the document if
/// `operation_name` is `None` and there is exactly one, the named operation
/// otherwise.
fn find_operation<'a, S>(
    document: &'a [Definition<'a, S>],
    operation_name: Option<&str>,
) -> Result<&'a Operation<'a, S>, GraphQLError> {
    let mut operations = document.iter().filter_map(|def| match def {
        Definition::Operation(op) => Some(&op.item),
        Definition::Fragment(_) => None,
    });

    match operation_name {
        Some(name) => operations
            .find(|op| op.name.as_ref().is_some_and(|n| n.item == name))
            .ok_or_else(|| GraphQLError::OperationSelection {
                message: format!("Unknown operation named \"{name}\"."),
            }),
        None => match (operations.next(), operations.next()) {
            (Some(op), None) => Ok(op),
            (Some(_), Some(_)) => Err(GraphQLError::OperationSelection {
                message: "Must provide operation name if query contains multiple operations."
                    .to_owned(),
            }),
            (None, _) => Err(GraphQLError::OperationSelection {
                message: "No operation found in the provided document.".to_owned(),
            }),
        },
    }
}

/// Merges caller-supplied variable values with an operation's declared
/// defaults, failing if a non-null variable is left without a value.
///
/// Coercion against a declared input type beyond this nullability check
/// (enum membership, nested input-object shape) is the value coercer's
/// concern at the schema boundary and out of scope here; see `coerce.rs`.
fn coerce_variables<'a, S: ScalarValue>(
    operation: &Operation<'a, S>,
    provided: &Variables<S>,
) -> Result<Variables<S>, GraphQLError> {
    let mut out = Variables::new();
    let Some(defs) = &operation.variables_definition else {
        return Ok(out);
    };
    for (name, def) in defs.item.iter() {
        let name = *name.item;
        match provided.get(name) {
            Some(value) => {
                out.insert(name.to_owned(), value.clone());
            }
            None => match &def.default_value {
                Some(default) => {
                    out.insert(name.to_owned(), default.item.clone());
                }
                None if def.var_type.item.is_non_null() => {
                    return Err(GraphQLError::VariableCoercion {
                        message: format!(
                            "Variable \"${name}\" of required type \"{}\" was not provided.",
                            def.var_type.item
                        ),
                    });
                }
                None => {}
            },
        }
    }
    Ok(out)
}

fn select_root<'a, S>(
    operation_type: OperationType,
    roots: &Roots<'a, S>,
) -> Result<&'a dyn Resolvable<S>, GraphQLError> {
    match operation_type {
        OperationType::Query => Ok(roots.query),
        OperationType::Mutation => roots.mutation.ok_or_else(|| GraphQLError::OperationSelection {
            message: "The schema does not support mutations.".to_owned(),
        }),
        OperationType::Subscription => {
            roots
                .subscription
                .ok_or_else(|| GraphQLError::OperationSelection {
                    message: "The schema does not support subscriptions.".to_owned(),
                })
        }
    }
}

/// Runs a request to completion, producing either a fatal error, a single
/// complete response, or a response plus the incremental sequence that
/// follows it.
///
/// Per spec, `@defer`/`@stream` are only ever honored on a query or
/// subscription's root selection set: a mutation's top-level fields resolve
/// serially and in full before the response is returned, so any `@defer`/
/// `@stream` attached directly to one of them is treated as absent. A
/// `@defer` attached to a *fragment* spread at the mutation root is still
/// honored, since deferring an entire fragment does not disturb the
/// required serial ordering of the mutation's own top-level fields.
pub async fn execute<'a, S: ScalarValue + 'a>(request: Request<'a, S>) -> Outcome<'a, S> {
    let Request {
        document,
        operation_name,
        variable_values,
        roots,
    } = request;

    let operation = match find_operation(document, operation_name) {
        Ok(op) => op,
        Err(err) => {
            tracing::warn!(%err, "operation selection failed");
            return Outcome::Failed(err);
        }
    };

    tracing::debug!(operation = ?operation.operation_type, name = ?operation.name.map(|n| n.item), "selected operation");

    let variables = match coerce_variables(operation, &variable_values) {
        Ok(vars) => vars,
        Err(err) => {
            tracing::warn!(%err, "variable coercion failed");
            return Outcome::Failed(err);
        }
    };

    let root = match select_root(operation.operation_type, &roots) {
        Ok(root) => root,
        Err(err) => return Outcome::Failed(err),
    };

    let fragments = document
        .iter()
        .filter_map(|def| match def {
            Definition::Fragment(f) => Some((f.item.name.item, &f.item)),
            Definition::Operation(_) => None,
        })
        .collect::<IndexMap<_, _>>();

    let ctx = ExecutionContext::new(fragments, variables);

    let serial = operation.operation_type == OperationType::Mutation;
    let honor_defer = !serial;

    let data = match crate::resolve::execute_selection_set(
        root,
        &operation.selection_set,
        &ctx,
        &[],
        serial,
        honor_defer,
    )
    .await
    {
        Ok(object) => Value::Object(object),
        Err(PropagatedNull) => Value::Null,
    };

    if let Some(conflict) = ctx.conflict.borrow_mut().take() {
        tracing::warn!(message = %conflict.message, "stream directive conflict, failing whole request");
        return Outcome::Failed(GraphQLError::DirectiveConflict {
            message: conflict.message,
            locations: conflict.locations,
        });
    }

    let initial_errors = ctx.errors.borrow_mut().drain(..).collect::<Vec<_>>();
    let stream_tails = ctx.stream_tails.borrow_mut().drain(..).collect::<Vec<_>>();
    let deferred_tails = ctx
        .deferred_tails
        .borrow_mut()
        .drain(..)
        .collect::<Vec<_>>();

    if stream_tails.is_empty() && deferred_tails.is_empty() {
        return Outcome::Single(Response {
            data: Some(data),
            errors: initial_errors,
            has_next: None,
        });
    }

    tracing::debug!(
        streams = stream_tails.len(),
        deferred = deferred_tails.len(),
        "dispatching incremental payloads"
    );

    let ctx = Rc::new(ctx);
    let mut dispatcher = Dispatcher::new();

    for tail in stream_tails {
        let ctx = Rc::clone(&ctx);
        dispatcher.add(Box::pin(stream_tail_step(tail, ctx)));
    }
    for tail in deferred_tails {
        let ctx = Rc::clone(&ctx);
        dispatcher.add(Box::pin(deferred_tail_step(tail, root, ctx)));
    }

    let initial = Response {
        data: Some(data),
        errors: initial_errors,
        has_next: Some(true),
    };

    Outcome::Incremental {
        initial,
        patches: incremental_stream(dispatcher),
    }
}

/// Steps a streamed tail once, producing the patch for its next element and
/// (if more may follow) the continuation to poll for the one after that.
///
/// Resolves to [`None`] once the underlying stream is exhausted, whether
/// that happens on the very first poll (the field had no more elements past
/// its `initialCount`) or any subsequent one. A rejecting element (the
/// source itself yielded an `Err`) stops iteration: `next` is `None` so the
/// rejecting tail is never polled again.
async fn stream_tail_step<'a, S: ScalarValue>(
    mut tail: StreamTail<'a, S>,
    ctx: Rc<ExecutionContext<'a, S>>,
) -> Option<StepOutcome<'a, S>> {
    let before = ctx.errors.borrow().len();
    let step = step_stream_tail(&mut tail, &ctx).await?;
    let errors = ctx.errors.borrow_mut().split_off(before);

    let mut item_path = tail.path.clone();
    item_path.push(PathSegment::Index(tail.next_index - 1));
    let label = tail.label.clone();
    let rejected = step.rejected;

    Some(StepOutcome {
        patch: Patch {
            data: step.value,
            path: item_path,
            label,
            errors,
        },
        next: if rejected {
            None
        } else {
            Some(Box::pin(stream_tail_step(tail, ctx)))
        },
    })
}

/// Resolves a deferred fragment's held-back field group into a single
/// patch. A deferred group never has further steps of its own, so `next`
/// is always `None`.
async fn deferred_tail_step<'a, S: ScalarValue>(
    tail: DeferredTail<'a, S>,
    root: &'a dyn Resolvable<S>,
    ctx: Rc<ExecutionContext<'a, S>>,
) -> Option<StepOutcome<'a, S>> {
    let before = ctx.errors.borrow().len();
    let data = match resolve_groups(root, &tail.group, &ctx, &tail.path, false).await {
        Ok(object) => Value::Object(object),
        Err(PropagatedNull) => Value::Null,
    };
    let errors = ctx.errors.borrow_mut().split_off(before);

    Some(StepOutcome {
        patch: Patch {
            data,
            path: tail.path,
            label: tail.label,
            errors,
        },
        next: None,
    })
}

/// Builds the public incremental sequence: every settled patch, in
/// settlement order, followed by one distinct terminator once the
/// dispatcher has nothing left pending.
fn incremental_stream<'a, S: ScalarValue + 'a>(
    mut dispatcher: Dispatcher<'a, S>,
) -> LocalBoxStream<'a, IncrementalItem<S>> {
    dispatcher.mark_initial_delivered();
    Box::pin(futures::stream::unfold(Some(dispatcher), |state| async move {
        let Some(mut dispatcher) = state else {
            return None;
        };
        match dispatcher.next().await {
            Some(patch) => Some((IncrementalItem::Patch(patch), Some(dispatcher))),
            None => Some((IncrementalItem::Terminator, None)),
        }
    }))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures::StreamExt;

    use super::*;
    use crate::{
        ast::{Field, Fragment, Selection, Type, TypeModifiers, VariableDefinition, VariablesDefinition},
        error::FieldError,
        parser::Spanning,
        resolve::FieldValue,
        value::DefaultScalarValue,
    };

    struct Greeter;

    #[async_trait]
    impl Resolvable<DefaultScalarValue> for Greeter {
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
                _ => Err(FieldError::new("unknown field")),
            }
        }
    }

    fn document_with_single_query<'a>(
        selection_set: Vec<Selection<'a, DefaultScalarValue>>,
    ) -> Vec<Definition<'a, DefaultScalarValue>> {
        vec![Definition::Operation(Spanning::unlocated(Operation {
            operation_type: OperationType::Query,
            name: None,
            variables_definition: None,
            directives: None,
            selection_set,
        }))]
    }

    #[tokio::test]
    async fn single_operation_resolves_without_naming_it() {
        let field = Selection::Field(Spanning::unlocated(Field {
            alias: None,
            name: Spanning::unlocated("greeting"),
            arguments: None,
            directives: None,
            selection_set: None,
        }));
        let document = document_with_single_query(vec![field]);

        let outcome = execute(Request {
            document: &document,
            operation_name: None,
            variable_values: IndexMap::new(),
            roots: Roots {
                query: &Greeter,
                mutation: None,
                subscription: None,
            },
        })
        .await;

        match outcome {
            Outcome::Single(response) => {
                let data = response.data.unwrap();
                let object = data.as_object_value().unwrap();
                assert_eq!(object.get_field_value("greeting"), Some(&Value::from("hi")));
                assert!(response.errors.is_empty());
            }
            _ => panic!("expected a single response"),
        }
    }

    #[tokio::test]
    async fn multiple_operations_without_a_name_is_fatal() {
        let field = Selection::Field(Spanning::unlocated(Field {
            alias: None,
            name: Spanning::unlocated("greeting"),
            arguments: None,
            directives: None,
            selection_set: None,
        }));
        let document = vec![
            Definition::Operation(Spanning::unlocated(Operation {
                operation_type: OperationType::Query,
                name: Some(Spanning::unlocated("A")),
                variables_definition: None,
                directives: None,
                selection_set: vec![field.clone()],
            })),
            Definition::Operation(Spanning::unlocated(Operation {
                operation_type: OperationType::Query,
                name: Some(Spanning::unlocated("B")),
                variables_definition: None,
                directives: None,
                selection_set: vec![field],
            })),
        ];

        let outcome = execute(Request {
            document: &document,
            operation_name: None,
            variable_values: IndexMap::new(),
            roots: Roots {
                query: &Greeter,
                mutation: None,
                subscription: None,
            },
        })
        .await;

        match outcome {
            Outcome::Failed(GraphQLError::OperationSelection { message }) => {
                assert!(message.contains("multiple operations"));
            }
            _ => panic!("expected a fatal operation-selection error"),
        }
    }

    #[tokio::test]
    async fn missing_required_variable_is_fatal() {
        let field = Selection::Field(Spanning::unlocated(Field {
            alias: None,
            name: Spanning::unlocated("greeting"),
            arguments: None,
            directives: None,
            selection_set: None,
        }));
        let document = vec![Definition::Operation(Spanning::unlocated(Operation {
            operation_type: OperationType::Query,
            name: None,
            variables_definition: Some(Spanning::unlocated(VariablesDefinition {
                items: vec![(
                    Spanning::unlocated("id"),
                    VariableDefinition {
                        var_type: Spanning::unlocated(
                            Type::<&str>::nullable("ID").wrap_non_null(),
                        ),
                        default_value: None,
                        directives: None,
                    },
                )],
            })),
            directives: None,
            selection_set: vec![field],
        }))];

        let outcome = execute(Request {
            document: &document,
            operation_name: None,
            variable_values: IndexMap::new(),
            roots: Roots {
                query: &Greeter,
                mutation: None,
                subscription: None,
            },
        })
        .await;

        match outcome {
            Outcome::Failed(GraphQLError::VariableCoercion { message }) => {
                assert!(message.contains("$id"));
            }
            _ => panic!("expected a fatal variable-coercion error"),
        }
    }

    struct DeferringRoot;

    #[async_trait]
    impl Resolvable<DefaultScalarValue> for DeferringRoot {
        fn type_name(&self) -> &'static str {
            "Query"
        }

        async fn resolve_field(
            &self,
            field_name: &str,
            _arguments: &IndexMap<String, InputValue<DefaultScalarValue>>,
        ) -> Result<FieldValue<DefaultScalarValue>, FieldError<DefaultScalarValue>> {
            match field_name {
                "fast" => Ok(FieldValue::Leaf(Value::from("quick"))),
                "slow" => Ok(FieldValue::Leaf(Value::from("eventually"))),
                _ => Err(FieldError::new("unknown field")),
            }
        }
    }

    #[tokio::test]
    async fn deferred_fragment_arrives_as_a_trailing_patch() {
        let fragment = Fragment {
            name: Spanning::unlocated("Later"),
            type_condition: Spanning::unlocated("Query"),
            directives: Some(vec![Spanning::unlocated(crate::ast::Directive {
                name: Spanning::unlocated("defer"),
                arguments: None,
            })]),
            selection_set: vec![Selection::Field(Spanning::unlocated(Field {
                alias: None,
                name: Spanning::unlocated("slow"),
                arguments: None,
                directives: None,
                selection_set: None,
            }))],
        };
        let document = vec![
            Definition::Fragment(Spanning::unlocated(fragment)),
            Definition::Operation(Spanning::unlocated(Operation {
                operation_type: OperationType::Query,
                name: None,
                variables_definition: None,
                directives: None,
                selection_set: vec![
                    Selection::Field(Spanning::unlocated(Field {
                        alias: None,
                        name: Spanning::unlocated("fast"),
                        arguments: None,
                        directives: None,
                        selection_set: None,
                    })),
                    Selection::FragmentSpread(Spanning::unlocated(crate::ast::FragmentSpread {
                        name: Spanning::unlocated("Later"),
                        directives: None,
                    })),
                ],
            })),
        ];

        let outcome = execute(Request {
            document: &document,
            operation_name: None,
            variable_values: IndexMap::new(),
            roots: Roots {
                query: &DeferringRoot,
                mutation: None,
                subscription: None,
            },
        })
        .await;

        let Outcome::Incremental {
            initial,
            mut patches,
        } = outcome
        else {
            panic!("expected an incremental response");
        };

        let data = initial.data.unwrap();
        let object = data.as_object_value().unwrap();
        assert_eq!(object.get_field_value("fast"), Some(&Value::from("quick")));
        assert!(!object.contains_field("slow"));
        assert_eq!(initial.has_next, Some(true));

        let first = patches.next().await.unwrap();
        let IncrementalItem::Patch(patch) = first else {
            panic!("expected a patch before the terminator");
        };
        let patched = patch.data.as_object_value().unwrap();
        assert_eq!(
            patched.get_field_value("slow"),
            Some(&Value::from("eventually"))
        );

        let last = patches.next().await.unwrap();
        assert!(matches!(last, IncrementalItem::Terminator));
        assert!(patches.next().await.is_none());
    }
}

//! Validates that selections sharing a response key agree on their
//! `@stream` directive, ahead of execution.

use crate::{
    coerce::{read_stream_signature, StreamSignature},
    collect::FieldGroup,
    executor::Variables,
    parser::SourcePosition,
    value::ScalarValue,
};

/// A `@stream` conflict found while finalizing a field group.
///
/// This is fatal for the whole request: per spec, the executor reports it
/// in place of `data` rather than nulling out the conflicting subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConflict {
    pub message: String,
    pub locations: Vec<SourcePosition>,
}

/// Checks every field group for a `@stream` conflict, returning the first
/// one found.
///
/// Per spec, this is a fatal, pre-execution check: a single conflicting
/// response key aborts the whole request rather than producing a partial
/// response.
pub fn check_stream_conflicts<'a, S: ScalarValue>(
    groups: impl IntoIterator<Item = &'a FieldGroup<'a, S>>,
    variables: &Variables<S>,
) -> Result<(), StreamConflict>
where
    S: 'a,
{
    for group in groups {
        let mut signature: Option<StreamSignature> = None;
        let mut name = None;
        for field in &group.fields {
            if let Some(existing_name) = name {
                if existing_name != field.name.item {
                    return Err(conflict(group));
                }
            } else {
                name = Some(field.name.item);
            }

            let this_sig = read_stream_signature(field.directives.as_deref(), variables);
            match (&signature, &this_sig) {
                (None, _) => {
                    signature = Some(this_sig.unwrap_or(StreamSignature {
                        label: None,
                        initial_count: None,
                    }))
                }
                (Some(_), None)
                    if signature.as_ref()
                        != Some(&StreamSignature {
                            label: None,
                            initial_count: None,
                        }) =>
                {
                    return Err(conflict(group));
                }
                (Some(existing), Some(new)) if existing != new => {
                    return Err(conflict(group));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn conflict<S>(group: &FieldGroup<'_, S>) -> StreamConflict {
    StreamConflict {
        message: conflict_message(group.response_key),
        locations: group.fields.iter().map(|f| *f.name.start()).collect(),
    }
}

fn conflict_message(response_key: &str) -> String {
    format!(
        "Fields \"{response_key}\" conflict because they have differing stream directives. \
         Use different aliases on the fields to fetch both if this was intentional."
    )
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::{
        ast::{Arguments, Directive, Field, InputValue},
        parser::Spanning,
        value::DefaultScalarValue,
    };

    fn stream_field<'a>(
        name: &'a str,
        label: Option<&'a str>,
        initial_count: i32,
    ) -> Field<'a, DefaultScalarValue> {
        let mut items = vec![(
            Spanning::unlocated("initialCount"),
            Spanning::unlocated(InputValue::scalar(initial_count)),
        )];
        if let Some(label) = label {
            items.push((
                Spanning::unlocated("label"),
                Spanning::unlocated(InputValue::scalar(label.to_owned())),
            ));
        }
        Field {
            alias: None,
            name: Spanning::unlocated(name),
            arguments: None,
            directives: Some(vec![Spanning::unlocated(Directive {
                name: Spanning::unlocated("stream"),
                arguments: Some(Spanning::unlocated(Arguments { items })),
            })]),
            selection_set: None,
        }
    }

    #[test]
    fn same_stream_args_do_not_conflict() {
        let a = stream_field("items", Some("L"), 2);
        let b = stream_field("items", Some("L"), 2);
        let group = FieldGroup {
            response_key: "items",
            fields: vec![&a, &b],
        };
        let vars = IndexMap::new();
        assert!(check_stream_conflicts([&group], &vars).is_ok());
    }

    #[test]
    fn differing_initial_count_conflicts() {
        let a = stream_field("items", Some("L"), 2);
        let b = stream_field("items", Some("L"), 3);
        let group = FieldGroup {
            response_key: "items",
            fields: vec![&a, &b],
        };
        let vars = IndexMap::new();
        let err = check_stream_conflicts([&group], &vars).unwrap_err();
        assert!(err.message.contains("\"items\""));
        assert!(err.message.contains("differing stream directives"));
        assert_eq!(err.locations.len(), 2);
    }

    #[test]
    fn stream_vs_no_stream_conflicts() {
        let a = stream_field("items", Some("L"), 2);
        let b = Field {
            alias: None,
            name: Spanning::unlocated("items"),
            arguments: None,
            directives: None,
            selection_set: None,
        };
        let group = FieldGroup {
            response_key: "items",
            fields: vec![&a, &b],
        };
        let vars = IndexMap::new();
        assert!(check_stream_conflicts([&group], &vars).is_err());
    }
}

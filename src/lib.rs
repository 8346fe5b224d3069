//! Incremental delivery execution core for a typed query language.
//!
//! This crate implements the part of a GraphQL-style execution engine that
//! sits between a resolved schema and the wire: collecting a selection set's
//! fields (honoring `@skip`/`@include`), completing resolved values against
//! their shape (non-null propagation, list iteration), and — where
//! `@defer`/`@stream` are present — multiplexing the deferred fragments and
//! streamed list tails that collection and completion set aside into a
//! single ordered sequence of incremental patches.
//!
//! It does not parse query text, validate a document against a schema, or
//! run resolvers itself; those are treated as external collaborators. See
//! [`executor::execute`] for the entry point that ties everything together.

mod ast;
mod coerce;
mod collect;
mod conflict;
mod dispatch;
mod error;
mod executor;
mod parser;
mod resolve;
mod value;

pub use crate::{
    ast::{
        Arguments, Definition, Directive, Field, Fragment, FragmentSpread, FromInputValue,
        InlineFragment, InputValue, IntoInputValue, Operation, OperationType, OwnedDocument,
        Selection, ToInputValue, Type, TypeModifier, TypeModifiers, VariableDefinition,
        VariablesDefinition,
    },
    conflict::StreamConflict,
    dispatch::Patch,
    error::{ExecutionError, FieldError, GraphQLError, PathSegment},
    executor::{execute, IncrementalItem, Outcome, Request, Response, Roots, Variables},
    parser::{SourcePosition, Span, Spanning},
    resolve::{ExecutionContext, FieldValue, Resolvable},
    value::{DefaultScalarValue, Object, ParseScalarResult, ParseScalarValue, ScalarValue, Value},
};

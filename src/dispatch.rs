//! Orchestrates in-flight deferred fragments and streamed list tails into an
//! ordered sequence of incremental patches.

use std::{future::Future, pin::Pin};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::{
    error::{ExecutionError, PathSegment},
    value::{ScalarValue, Value},
};

/// One incremental payload: either part of a deferred fragment's data, or a
/// single streamed list element.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch<S> {
    pub data: Value<S>,
    pub path: Vec<PathSegment>,
    pub label: Option<String>,
    pub errors: Vec<ExecutionError<S>>,
}

impl<S: ScalarValue> Serialize for Patch<S> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_key("data")?;
        map.serialize_value(&self.data)?;
        map.serialize_key("path")?;
        map.serialize_value(&self.path)?;
        if let Some(label) = &self.label {
            map.serialize_key("label")?;
            map.serialize_value(label)?;
        }
        if !self.errors.is_empty() {
            map.serialize_key("errors")?;
            map.serialize_value(&self.errors)?;
        }
        map.end()
    }
}

/// The result of stepping one pending entry: the patch it produced, and
/// (for a streamed tail with more elements) the next step to poll.
///
/// Returning the next step rather than scheduling it eagerly is what keeps
/// an unbounded async sequence from recursing synchronously while it is
/// registered: each element is only resolved once its predecessor's future
/// actually completes.
pub struct StepOutcome<'a, S> {
    pub patch: Patch<S>,
    pub next: Option<PendingFuture<'a, S>>,
}

/// A boxed, non-`'static` pending future.
///
/// Resolves to [`None`] when a streamed tail turns out to be already
/// exhausted (no further elements ever arrive), so that a tail can be
/// registered without first having to know whether it has anything left to
/// give.
pub type PendingFuture<'a, S> = Pin<Box<dyn Future<Output = Option<StepOutcome<'a, S>>> + 'a>>;

/// Tracks in-flight incremental payloads and yields them in settlement order.
pub struct Dispatcher<'a, S> {
    pending: FuturesUnordered<PendingFuture<'a, S>>,
    initial_delivered: bool,
}

impl<'a, S> Default for Dispatcher<'a, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, S> Dispatcher<'a, S> {
    pub fn new() -> Self {
        Self {
            pending: FuturesUnordered::new(),
            initial_delivered: false,
        }
    }

    /// Registers a pending payload (a deferred fragment, or the first step
    /// of a streamed tail).
    pub fn add(&mut self, fut: PendingFuture<'a, S>) {
        self.pending.push(fut);
    }

    /// Whether any payload is still in flight.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Marks the initial (synchronous) response as delivered. Must be
    /// called exactly once, before the first call to [`Dispatcher::next`].
    pub fn mark_initial_delivered(&mut self) {
        self.initial_delivered = true;
    }

    pub fn initial_delivered(&self) -> bool {
        self.initial_delivered
    }

    /// Awaits and returns the next settled patch, in settlement order (not
    /// registration order). Re-queues a streamed tail's continuation, if
    /// any, before returning. An entry that resolves to [`None`] (an
    /// already-exhausted tail) is silently dropped and the next one polled.
    pub async fn next(&mut self) -> Option<Patch<S>> {
        loop {
            let outcome = self.pending.next().await?;
            let Some(outcome) = outcome else {
                continue;
            };
            if let Some(next) = outcome.next {
                self.pending.push(next);
            }
            tracing::trace!(path = ?outcome.patch.path, label = ?outcome.patch.label, "dispatched patch");
            return Some(outcome.patch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DefaultScalarValue;

    fn patch(data: Value<DefaultScalarValue>, label: &str) -> Patch<DefaultScalarValue> {
        Patch {
            data,
            path: vec![],
            label: Some(label.to_owned()),
            errors: vec![],
        }
    }

    #[tokio::test]
    async fn yields_patches_until_exhausted() {
        let mut dispatcher: Dispatcher<DefaultScalarValue> = Dispatcher::new();
        dispatcher.add(Box::pin(async {
            Some(StepOutcome {
                patch: patch(Value::from(1), "a"),
                next: None,
            })
        }));
        assert!(dispatcher.has_pending());
        let first = dispatcher.next().await.unwrap();
        assert_eq!(first.label.as_deref(), Some("a"));
        assert!(!dispatcher.has_pending());
        assert!(dispatcher.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_tail_requeues_next_step() {
        let mut dispatcher: Dispatcher<DefaultScalarValue> = Dispatcher::new();

        fn step(i: i32) -> PendingFuture<'static, DefaultScalarValue> {
            Box::pin(async move {
                Some(StepOutcome {
                    patch: Patch {
                        data: Value::from(i),
                        path: vec![PathSegment::Index(i as usize)],
                        label: None,
                        errors: vec![],
                    },
                    next: if i < 2 { Some(step(i + 1)) } else { None },
                })
            })
        }

        dispatcher.add(step(0));
        let mut seen = vec![];
        while let Some(p) = dispatcher.next().await {
            if let Some(PathSegment::Index(i)) = p.path.first() {
                seen.push(*i);
            }
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn exhausted_tail_yields_no_patch() {
        let mut dispatcher: Dispatcher<DefaultScalarValue> = Dispatcher::new();
        dispatcher.add(Box::pin(async { None }));
        dispatcher.add(Box::pin(async {
            Some(StepOutcome {
                patch: patch(Value::from(9), "only"),
                next: None,
            })
        }));
        let only = dispatcher.next().await.unwrap();
        assert_eq!(only.label.as_deref(), Some("only"));
        assert!(dispatcher.next().await.is_none());
    }
}

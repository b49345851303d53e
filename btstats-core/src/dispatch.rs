//! Query dispatcher
//!
//! Resolves an action name against the registry and, for declarative actions,
//! composes `window + transform + ranking`, runs it on the store and applies the
//! action's post-shaper. Custom actions are handed back to the caller untouched.

use crate::actions::{
    Action, ActionDescriptor, ActionRegistry, CustomAction, QueryPolicy, Ranking, Window,
};
use crate::db::EventStore;
use crate::error::Result;
use crate::pipeline::Stage;
use crate::value::Value;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

/// What running an action produced.
#[derive(Debug)]
pub enum Outcome {
    /// Result document rows, already shaped
    Rows(Vec<Value>),
    /// The caller must run this handler itself
    Custom(CustomAction),
}

/// Stateless dispatcher over a shared, immutable registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ActionRegistry>,
    policy: QueryPolicy,
}

impl Dispatcher {
    pub fn new(registry: Arc<ActionRegistry>, policy: QueryPolicy) -> Self {
        Self { registry, policy }
    }

    /// Dispatcher over the built-in actions with the default policy.
    pub fn builtin() -> Self {
        Self::new(Arc::new(ActionRegistry::builtin()), QueryPolicy::default())
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &QueryPolicy {
        &self.policy
    }

    pub fn resolve(&self, name: &str) -> Result<&Action> {
        self.registry.get(name)
    }

    /// Full stage list for `descriptor` as of `now`.
    pub fn compose(&self, descriptor: &ActionDescriptor, now: DateTime<Utc>) -> Vec<Stage> {
        let mut stages = Vec::with_capacity(descriptor.transform.len() + 3);
        if descriptor.window == Window::Recent {
            stages.push(self.policy.window_stage(now));
        }
        stages.extend(descriptor.transform.iter().cloned());
        if descriptor.ranking == Ranking::Top {
            stages.extend(self.policy.ranking_stages());
        }
        stages
    }

    /// Run the named action.
    pub fn run<S: EventStore>(&self, name: &str, store: &S, now: DateTime<Utc>) -> Result<Outcome> {
        match self.resolve(name)? {
            Action::Standard(descriptor) => {
                Ok(Outcome::Rows(self.run_standard(descriptor, store, now)?))
            }
            Action::Custom(custom) => Ok(Outcome::Custom(*custom)),
        }
    }

    /// Run one declarative action against `store`.
    pub fn run_standard<S: EventStore>(
        &self,
        descriptor: &ActionDescriptor,
        store: &S,
        now: DateTime<Utc>,
    ) -> Result<Vec<Value>> {
        let stages = self.compose(descriptor, now);
        let start = Instant::now();

        let rows: Vec<Value> = store
            .aggregate(descriptor.stream, &stages)?
            .into_iter()
            .map(Value::Doc)
            .collect();

        tracing::debug!(
            action = descriptor.name,
            stream = descriptor.stream,
            rows = rows.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Action executed"
        );

        Ok(match descriptor.post_shape {
            Some(shape) => shape(rows),
            None => rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::pipeline::Predicate;
    use crate::value::Document;
    use std::cell::RefCell;

    /// Records the last pipeline it was asked to run.
    #[derive(Default)]
    struct RecordingStore {
        seen: RefCell<Option<(String, usize)>>,
        rows: Vec<Document>,
    }

    impl EventStore for RecordingStore {
        fn aggregate(&self, stream: &str, stages: &[Stage]) -> Result<Vec<Document>> {
            *self.seen.borrow_mut() = Some((stream.to_string(), stages.len()));
            Ok(self.rows.clone())
        }
    }

    struct FailingStore;

    impl EventStore for FailingStore {
        fn aggregate(&self, _stream: &str, _stages: &[Stage]) -> Result<Vec<Document>> {
            Err(Error::Pipeline("store unreachable".into()))
        }
    }

    fn descriptor(name: &str, dispatcher: &Dispatcher) -> ActionDescriptor {
        match dispatcher.resolve(name).unwrap() {
            Action::Standard(d) => d.clone(),
            Action::Custom(_) => panic!("{name} is custom"),
        }
    }

    #[test]
    fn test_compose_wraps_transform_with_window_and_ranking() {
        let dispatcher = Dispatcher::builtin();
        let drinks = descriptor("drinks", &dispatcher);
        let stages = dispatcher.compose(&drinks, Utc::now());

        assert_eq!(stages.len(), drinks.transform.len() + 3);
        assert!(matches!(stages[0], Stage::Match(Predicate::Gte("_time", _))));
        assert!(matches!(stages[1], Stage::Match(Predicate::Eq("msg.emote", _))));
        assert!(matches!(stages[stages.len() - 2], Stage::Sort(_)));
        assert!(matches!(stages[stages.len() - 1], Stage::Limit(10)));
    }

    #[test]
    fn test_compose_connected_has_no_window_or_ranking() {
        let dispatcher = Dispatcher::builtin();
        let connected = descriptor("connected", &dispatcher);
        let stages = dispatcher.compose(&connected, Utc::now());
        assert_eq!(stages.len(), connected.transform.len());
        assert!(matches!(stages[0], Stage::Group { .. }));
    }

    #[test]
    fn test_run_targets_action_stream_and_shapes() {
        let dispatcher = Dispatcher::builtin();
        let store = RecordingStore {
            rows: vec![Document::new().with("_id", "2024-05-01T12:00Z").with("count", 7)],
            ..Default::default()
        };

        let outcome = dispatcher.run("connected", &store, Utc::now()).unwrap();
        let Outcome::Rows(rows) = outcome else {
            panic!("expected rows");
        };
        assert_eq!(
            rows,
            vec![Value::Array(vec![Value::from("2024-05-01T12:00Z"), Value::Int(7)])]
        );
        assert_eq!(
            *store.seen.borrow(),
            Some(("numConnected".to_string(), 2))
        );
    }

    #[test]
    fn test_custom_action_is_returned_unrun() {
        let dispatcher = Dispatcher::builtin();
        let store = RecordingStore::default();
        let outcome = dispatcher.run("usercolors", &store, Utc::now()).unwrap();
        assert!(matches!(outcome, Outcome::Custom(CustomAction::UserColors)));
        assert!(store.seen.borrow().is_none());
    }

    #[test]
    fn test_errors_propagate() {
        let dispatcher = Dispatcher::builtin();
        assert!(matches!(
            dispatcher.run("nope", &FailingStore, Utc::now()),
            Err(Error::UnknownAction(_))
        ));
        assert!(matches!(
            dispatcher.run("videos", &FailingStore, Utc::now()),
            Err(Error::Pipeline(_))
        ));
    }
}

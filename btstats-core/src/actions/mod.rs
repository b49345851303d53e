//! Action registry
//!
//! Every query the service answers is a named action. Most are declarative
//! ([`ActionDescriptor`]): a source stream, whether the shared recency window
//! and ranking apply, the grouping stages in between, and an optional shaper
//! for the final rows. The rest are [`CustomAction`]s that bypass the store.
//!
//! ```text
//!   window? ──► transform stages ──► ranking? ──► store ──► post-shaper
//! ```
//!
//! The registry is built once at startup and only read afterwards.

pub mod policy;

use crate::error::{Error, Result};
use crate::pipeline::{Accumulator, Expr, Predicate, SortKey, Stage};
use crate::value::Value;
use std::collections::BTreeMap;

pub use policy::{QueryPolicy, Ranking, Window};

/// Video change events.
pub const VIDEO_CHANGES: &str = "forceVideoChange";
/// Chat messages.
pub const CHAT_MESSAGES: &str = "chatMsg";
/// Periodic connected-user samples.
pub const CONNECTED_COUNTS: &str = "numConnected";

/// Reshapes the rows returned by the store.
pub type PostShaper = fn(Vec<Value>) -> Vec<Value>;

/// Declarative description of one aggregation query.
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    pub name: &'static str,
    pub stream: &'static str,
    pub window: Window,
    pub transform: Vec<Stage>,
    pub ranking: Ranking,
    /// Identity when `None`
    pub post_shape: Option<PostShaper>,
}

/// Actions handled entirely outside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomAction {
    /// CSS rules built from the remote user color map
    UserColors,
}

impl CustomAction {
    pub fn name(&self) -> &'static str {
        match self {
            CustomAction::UserColors => "usercolors",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    Standard(ActionDescriptor),
    Custom(CustomAction),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Standard(descriptor) => descriptor.name,
            Action::Custom(custom) => custom.name(),
        }
    }
}

/// Name-indexed, read-only set of actions.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<&'static str, Action>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in actions.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Action::Standard(videos()));
        registry.register(Action::Standard(drinks()));
        registry.register(Action::Standard(emotes()));
        registry.register(Action::Standard(chatters()));
        registry.register(Action::Standard(connected()));
        registry.register(Action::Custom(CustomAction::UserColors));
        registry
    }

    /// Add an action, replacing any previous action of the same name.
    pub fn register(&mut self, action: Action) {
        tracing::debug!(action = action.name(), "Registered action");
        self.actions.insert(action.name(), action);
    }

    pub fn get(&self, name: &str) -> Result<&Action> {
        self.actions
            .get(name)
            .ok_or_else(|| Error::UnknownAction(name.to_string()))
    }

    /// Action names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        self.actions.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }
}

/// Most played videos, keyed by title.
fn videos() -> ActionDescriptor {
    ActionDescriptor {
        name: "videos",
        stream: VIDEO_CHANGES,
        window: Window::Recent,
        transform: vec![Stage::Group {
            key: Expr::field("video.videotitle"),
            fields: vec![
                ("count", Accumulator::count()),
                ("latest", Accumulator::Max(Expr::field("_time"))),
                ("videoid", Accumulator::First(Expr::field("video.videoid"))),
                ("videotype", Accumulator::First(Expr::field("video.videotype"))),
            ],
        }],
        ranking: Ranking::Top,
        post_shape: None,
    }
}

/// Most requested drinks (`/drink` messages), case-folded.
fn drinks() -> ActionDescriptor {
    ActionDescriptor {
        name: "drinks",
        stream: CHAT_MESSAGES,
        window: Window::Recent,
        transform: vec![
            Stage::Match(Predicate::Eq("msg.emote", Value::from("drink"))),
            Stage::Group {
                key: Expr::field("msg.msg").lower(),
                fields: vec![
                    ("count", Accumulator::count()),
                    ("latest", Accumulator::Max(Expr::field("_time"))),
                ],
            },
        ],
        ranking: Ranking::Top,
        post_shape: None,
    }
}

/// Most used emotes across all chat messages.
fn emotes() -> ActionDescriptor {
    ActionDescriptor {
        name: "emotes",
        stream: CHAT_MESSAGES,
        window: Window::Recent,
        transform: vec![
            Stage::Project(vec![
                ("_time", Expr::field("_time")),
                ("emotes", Expr::field("msg.msg").matches()),
            ]),
            Stage::Unwind("emotes"),
            Stage::Group {
                key: Expr::field("emotes").emote_name(),
                fields: vec![
                    ("count", Accumulator::count()),
                    ("latest", Accumulator::Max(Expr::field("_time"))),
                ],
            },
        ],
        ranking: Ranking::Top,
        post_shape: None,
    }
}

/// Most active chatters, counting plain messages only.
fn chatters() -> ActionDescriptor {
    ActionDescriptor {
        name: "chatters",
        stream: CHAT_MESSAGES,
        window: Window::Recent,
        transform: vec![
            Stage::Match(Predicate::Eq("msg.emote", Value::Bool(false))),
            Stage::Group {
                key: Expr::field("msg.nick"),
                fields: vec![
                    ("count", Accumulator::count()),
                    ("latest", Accumulator::Max(Expr::field("_time"))),
                    ("characters", Accumulator::Sum(Expr::field("msg.msg").byte_len())),
                    ("emotes", Accumulator::Sum(Expr::field("msg.msg").match_count())),
                ],
            },
        ],
        ranking: Ranking::Top,
        post_shape: None,
    }
}

/// Peak connected users per five-minute bucket, full history, oldest first.
fn connected() -> ActionDescriptor {
    ActionDescriptor {
        name: "connected",
        stream: CONNECTED_COUNTS,
        window: Window::All,
        transform: vec![
            Stage::Group {
                key: Expr::field("_time").five_minute_bucket(),
                fields: vec![("count", Accumulator::Max(Expr::field("num")))],
            },
            Stage::Sort(vec![SortKey::asc("_id")]),
        ],
        ranking: Ranking::Unranked,
        post_shape: Some(bucket_pairs),
    }
}

/// `{_id: label, count: n}` rows become `[label, n]`.
fn bucket_pairs(rows: Vec<Value>) -> Vec<Value> {
    rows.into_iter()
        .map(|row| {
            let (label, count) = match row.as_document() {
                Some(doc) => (
                    doc.get("_id").cloned().unwrap_or(Value::Null),
                    doc.get("count").cloned().unwrap_or(Value::Null),
                ),
                None => (Value::Null, Value::Null),
            };
            Value::Array(vec![label, count])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Document;

    #[test]
    fn test_builtin_names() {
        let registry = ActionRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec!["chatters", "connected", "drinks", "emotes", "usercolors", "videos"]
        );
    }

    #[test]
    fn test_unknown_action_is_client_error() {
        let registry = ActionRegistry::builtin();
        let err = registry.get("bogus").unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_usercolors_is_custom() {
        let registry = ActionRegistry::builtin();
        assert!(matches!(
            registry.get("usercolors").unwrap(),
            Action::Custom(CustomAction::UserColors)
        ));
    }

    #[test]
    fn test_policies_per_action() {
        let registry = ActionRegistry::builtin();
        for action in registry.iter() {
            let Action::Standard(descriptor) = action else {
                continue;
            };
            if descriptor.name == "connected" {
                assert_eq!(descriptor.window, Window::All);
                assert_eq!(descriptor.ranking, Ranking::Unranked);
                assert!(descriptor.post_shape.is_some());
            } else {
                assert_eq!(descriptor.window, Window::Recent);
                assert_eq!(descriptor.ranking, Ranking::Top);
                assert!(descriptor.post_shape.is_none());
            }
        }
    }

    #[test]
    fn test_bucket_pairs() {
        let rows = vec![Value::Doc(
            Document::new().with("_id", "2024-05-01T12:05Z").with("count", 42),
        )];
        assert_eq!(
            bucket_pairs(rows),
            vec![Value::Array(vec![
                Value::from("2024-05-01T12:05Z"),
                Value::Int(42)
            ])]
        );
    }
}

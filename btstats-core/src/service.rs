//! Request-scoped query service
//!
//! One call to [`QueryService::handle`] answers one request: resolve the action,
//! open a store handle for declarative actions (closed again on every exit path),
//! run exactly one query, and encode the reply. Nothing is cached between calls.

use crate::actions::{Action, ActionDescriptor, ActionRegistry, CustomAction, QueryPolicy};
use crate::config::{Config, StoreSettings};
use crate::db::Database;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::serialize;
use crate::usercolors::UserColorsClient;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

/// Encoded response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Json(String),
    Css(String),
}

impl Reply {
    pub fn content_type(&self) -> &'static str {
        match self {
            Reply::Json(_) => "application/json",
            Reply::Css(_) => "text/css",
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Reply::Json(body) | Reply::Css(body) => body,
        }
    }

    pub fn into_body(self) -> String {
        match self {
            Reply::Json(body) | Reply::Css(body) => body,
        }
    }
}

/// Shared, read-only state for answering requests.
#[derive(Debug, Clone)]
pub struct QueryService {
    dispatcher: Dispatcher,
    store: Arc<StoreSettings>,
    colors: UserColorsClient,
}

impl QueryService {
    pub fn new(dispatcher: Dispatcher, store: StoreSettings, colors: UserColorsClient) -> Self {
        Self {
            dispatcher,
            store: Arc::new(store),
            colors,
        }
    }

    /// Service over the built-in actions, with policy and color source from `config`.
    pub fn from_config(config: &Config, store: StoreSettings) -> Result<Self> {
        let dispatcher = Dispatcher::new(
            Arc::new(ActionRegistry::builtin()),
            QueryPolicy::from_config(&config.query),
        );
        let colors = UserColorsClient::new(&config.usercolors)?;
        Ok(Self::new(dispatcher, store, colors))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> &StoreSettings {
        &self.store
    }

    /// Answer one request for `action`.
    pub async fn handle(&self, action: &str) -> Result<Reply> {
        let start = Instant::now();
        let result = self.dispatch(action).await;

        match &result {
            Ok(reply) => tracing::info!(
                action,
                bytes = reply.body().len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Action served"
            ),
            Err(e) if e.is_client_error() => {
                tracing::info!(action, error = %e, "Rejected action")
            }
            Err(e) => tracing::warn!(action, error = %e, "Action failed"),
        }

        result
    }

    async fn dispatch(&self, action: &str) -> Result<Reply> {
        let now = Utc::now();
        match self.dispatcher.resolve(action)? {
            Action::Custom(CustomAction::UserColors) => {
                Ok(Reply::Css(self.colors.fetch_css().await?))
            }
            Action::Standard(descriptor) => {
                let descriptor = descriptor.clone();
                let dispatcher = self.dispatcher.clone();
                let store = Arc::clone(&self.store);

                tokio::task::spawn_blocking(move || {
                    query_json(&dispatcher, &descriptor, &store, now)
                })
                .await
                .map_err(|e| Error::Task(e.to_string()))?
                .map(Reply::Json)
            }
        }
    }
}

/// Open a read-only store handle, run `descriptor`, encode the rows.
pub fn query_json(
    dispatcher: &Dispatcher,
    descriptor: &ActionDescriptor,
    store: &StoreSettings,
    now: DateTime<Utc>,
) -> Result<String> {
    let db = Database::open_read_only(&store.database_path)?;
    let rows = dispatcher.run_standard(descriptor, &db, now)?;
    serialize::to_json(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserColorsConfig;
    use crate::db::NewEvent;
    use serde_json::json;
    use tempfile::TempDir;

    fn service_with_db(dir: &TempDir) -> QueryService {
        let path = dir.path().join("btlogs.db");
        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();
        db.insert_event(&NewEvent::new(
            "chatMsg",
            Utc::now(),
            json!({"msg": {"nick": "amy", "msg": "Soda", "emote": "drink"}}),
        ))
        .unwrap();
        drop(db);

        QueryService::new(
            Dispatcher::builtin(),
            StoreSettings {
                database_path: path,
            },
            UserColorsClient::new(&UserColorsConfig::default()).unwrap(),
        )
    }

    #[test]
    fn test_reply_content_types() {
        assert_eq!(Reply::Json("[]".into()).content_type(), "application/json");
        assert_eq!(Reply::Css(String::new()).content_type(), "text/css");
        assert_eq!(Reply::Css("a".into()).into_body(), "a");
    }

    #[tokio::test]
    async fn test_handle_standard_action() {
        let dir = TempDir::new().unwrap();
        let service = service_with_db(&dir);

        let reply = service.handle("drinks").await.unwrap();
        assert_eq!(reply.content_type(), "application/json");
        assert!(reply.body().starts_with(r#"[{"_id":"soda","count":1,"latest":""#));
    }

    #[tokio::test]
    async fn test_handle_unknown_action() {
        let dir = TempDir::new().unwrap();
        let service = service_with_db(&dir);
        let err = service.handle("nope").await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_missing_store_is_server_error() {
        let dir = TempDir::new().unwrap();
        let service = QueryService::new(
            Dispatcher::builtin(),
            StoreSettings {
                database_path: dir.path().join("absent.db"),
            },
            UserColorsClient::new(&UserColorsConfig::default()).unwrap(),
        );
        let err = service.handle("videos").await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert!(!err.is_client_error());
    }
}

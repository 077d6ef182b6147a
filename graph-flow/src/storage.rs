use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{context::Context, error::Result};

/// One run of a graph: where it is and the context its tasks share.
///
/// The context is not serialized; storages that persist sessions keep it
/// alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub graph_id: String,
    pub current_task_id: String,
    pub status_message: Option<String>,
    #[serde(skip)]
    pub context: Context,
}

impl Session {
    pub fn new_from_task(
        id: impl Into<String>,
        graph_id: impl Into<String>,
        start_task: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            graph_id: graph_id.into(),
            current_task_id: start_task.into(),
            status_message: None,
            context: Context::new(),
        }
    }
}

#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Session) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Process-local sessions. Clones share the same map, and a fetched session
/// shares its context with the stored one.
#[derive(Clone, Default)]
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, Session>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(id).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

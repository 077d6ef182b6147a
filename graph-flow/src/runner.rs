//! Drives sessions through a graph against a [`SessionStorage`].
//!
//! The session is saved after every step, so `current_task_id` in storage is
//! always the next task to run. A step that fails is not saved.

use std::fmt;
use std::sync::Arc;

use crate::{
    error::{GraphError, Result},
    graph::{ExecutionResult, ExecutionStatus, Graph},
    storage::{Session, SessionStorage},
};

/// A run that stopped early, with the task that was executing when it did.
/// `task_id` is `None` when the session could not be loaded or saved.
#[derive(Debug)]
pub struct StepFailure {
    pub task_id: Option<String>,
    pub error: GraphError,
}

impl StepFailure {
    /// The task's own message for task failures, the engine error otherwise.
    pub fn reason(&self) -> String {
        match &self.error {
            GraphError::TaskExecutionFailed(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.task_id {
            Some(task_id) => write!(f, "{}: {}", task_id, self.reason()),
            None => write!(f, "{}", self.error),
        }
    }
}

#[derive(Clone)]
pub struct FlowRunner {
    graph: Arc<Graph>,
    storage: Arc<dyn SessionStorage>,
}

impl FlowRunner {
    pub fn new(graph: Arc<Graph>, storage: Arc<dyn SessionStorage>) -> Self {
        Self { graph, storage }
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Execute one step of `session_id` and save the result.
    pub async fn run(&self, session_id: &str) -> Result<ExecutionResult> {
        let mut session = self.load(session_id).await?;
        let result = self.graph.execute_session(&mut session).await?;
        self.storage.save(session).await?;
        Ok(result)
    }

    /// Step `session_id` until the graph ends, saving between steps.
    pub async fn run_to_end(
        &self,
        session_id: &str,
    ) -> std::result::Result<ExecutionResult, StepFailure> {
        loop {
            let mut session = self.load(session_id).await.map_err(|error| StepFailure {
                task_id: None,
                error,
            })?;

            // execute_session moves current_task_id forward before each chained
            // task, so on error it names the task that failed.
            let result = match self.graph.execute_session(&mut session).await {
                Ok(result) => result,
                Err(error) => {
                    return Err(StepFailure {
                        task_id: Some(session.current_task_id),
                        error,
                    });
                }
            };

            self.storage.save(session).await.map_err(|error| StepFailure {
                task_id: None,
                error,
            })?;

            if result.status == ExecutionStatus::Completed {
                return Ok(result);
            }
        }
    }

    async fn load(&self, session_id: &str) -> Result<Session> {
        self.storage
            .get(session_id)
            .await?
            .ok_or_else(|| GraphError::SessionNotFound(session_id.to_string()))
    }
}

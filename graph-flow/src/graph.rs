use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::{
    error::{GraphError, Result},
    storage::Session,
    task::{NextAction, Task, TaskResult},
};

/// A fixed set of tasks joined by unconditional edges. Each task has at most
/// one successor; a later edge from the same task replaces the earlier one.
pub struct Graph {
    pub id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    successors: HashMap<String, String>,
    start_task_id: Option<String>,
}

impl Graph {
    /// Execute the session's current task and move the session on.
    ///
    /// A task answering [`NextAction::ContinueAndExecute`] chains straight into
    /// its successor within the same call; `current_task_id` is moved before
    /// each chained task runs.
    pub async fn execute_session(&self, session: &mut Session) -> Result<ExecutionResult> {
        loop {
            let result = self.execute_single_task(session).await?;
            session.status_message = result.status_message.clone();

            let next = match result.next_action {
                NextAction::End => None,
                NextAction::Continue | NextAction::ContinueAndExecute => {
                    self.find_next_task(&result.task_id)
                }
            };

            let Some(next_task_id) = next else {
                return Ok(ExecutionResult {
                    response: result.response,
                    status: ExecutionStatus::Completed,
                });
            };

            session.current_task_id = next_task_id;
            if result.next_action == NextAction::Continue {
                return Ok(ExecutionResult {
                    response: result.response,
                    status: ExecutionStatus::InProgress,
                });
            }
        }
    }

    async fn execute_single_task(&self, session: &Session) -> Result<TaskResult> {
        let task_id = session.current_task_id.as_str();
        let task = self
            .get_task(task_id)
            .ok_or_else(|| GraphError::TaskNotFound(task_id.to_string()))?;

        debug!(graph_id = %self.id, session_id = %session.id, task_id = %task_id, "executing task");
        let mut result = task.run(session.context.clone()).await?;
        result.task_id = task_id.to_string();
        Ok(result)
    }

    pub fn find_next_task(&self, current_task_id: &str) -> Option<String> {
        self.successors.get(current_task_id).cloned()
    }

    /// Linear order in which tasks run when every task continues.
    pub fn stage_order(&self) -> Result<Vec<String>> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.start_task_id();

        while let Some(task_id) = current {
            if !self.tasks.contains_key(&task_id) {
                return Err(GraphError::TaskNotFound(task_id));
            }
            if !seen.insert(task_id.clone()) {
                return Err(GraphError::InvalidGraph(format!(
                    "cycle detected at task {}",
                    task_id
                )));
            }
            current = self.find_next_task(&task_id);
            order.push(task_id);
        }

        Ok(order)
    }

    pub fn start_task_id(&self) -> Option<String> {
        self.start_task_id.clone()
    }

    pub fn get_task(&self, task_id: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_id).cloned()
    }
}

/// Assembles a [`Graph`]. The first task added is the start task unless
/// [`GraphBuilder::set_start_task`] names another one.
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            graph: Graph {
                id: id.into(),
                tasks: HashMap::new(),
                successors: HashMap::new(),
                start_task_id: None,
            },
        }
    }

    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        let task_id = task.id().to_string();
        self.graph.start_task_id.get_or_insert_with(|| task_id.clone());
        self.graph.tasks.insert(task_id, task);
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.graph.successors.insert(from.into(), to.into());
        self
    }

    pub fn set_start_task(mut self, task_id: impl Into<String>) -> Self {
        self.graph.start_task_id = Some(task_id.into());
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// Where a session stands after one call to [`Graph::execute_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub response: Option<String>,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The session moved on and more tasks remain
    InProgress,
    /// The graph ended
    Completed,
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{context::Context, error::Result};

/// What a task hands back to the graph after running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Response to hand back to the caller
    pub response: Option<String>,
    /// Next action to take
    pub next_action: NextAction,
    /// Human-readable progress note, copied onto the session
    pub status_message: Option<String>,
    /// Filled in by the graph with the id of the task that produced this result
    #[serde(default)]
    pub task_id: String,
}

impl TaskResult {
    pub fn new_with_status(
        response: Option<String>,
        next_action: NextAction,
        status_message: Option<String>,
    ) -> Self {
        Self {
            response,
            next_action,
            status_message,
            task_id: String::new(),
        }
    }
}

/// How the graph proceeds once a task succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextAction {
    /// Advance to the next task but hand control back to the caller
    Continue,
    /// Advance to the next task and execute it immediately
    ContinueAndExecute,
    /// End the graph execution
    End,
}

/// One stage of a graph. Tasks communicate only through the shared [`Context`].
#[async_trait]
pub trait Task: Send + Sync {
    /// Graph-unique id; edges and sessions refer to tasks by it.
    fn id(&self) -> &str;

    async fn run(&self, context: Context) -> Result<TaskResult>;
}

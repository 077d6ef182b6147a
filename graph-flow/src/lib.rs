pub mod context;
pub mod error;
pub mod graph;
pub mod runner;
pub mod storage;
pub mod task;

pub use context::{Context, StateKey};
pub use error::{GraphError, Result};
pub use graph::{ExecutionResult, ExecutionStatus, Graph, GraphBuilder};
pub use runner::{FlowRunner, StepFailure};
pub use storage::{InMemorySessionStorage, Session, SessionStorage};
pub use task::{NextAction, Task, TaskResult};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    const TRAIL: StateKey<Vec<String>> = StateKey::new("trail");

    struct StepTask {
        id: &'static str,
        next: NextAction,
    }

    #[async_trait]
    impl Task for StepTask {
        fn id(&self) -> &str {
            self.id
        }

        async fn run(&self, context: Context) -> Result<TaskResult> {
            context.append(&TRAIL, self.id.to_string()).await?;
            Ok(TaskResult::new_with_status(
                None,
                self.next.clone(),
                Some(format!("{} done", self.id)),
            ))
        }
    }

    struct FailingTask;

    #[async_trait]
    impl Task for FailingTask {
        fn id(&self) -> &str {
            "failing"
        }

        async fn run(&self, _context: Context) -> Result<TaskResult> {
            Err(GraphError::TaskExecutionFailed("boom".to_string()))
        }
    }

    fn step(id: &'static str, next: NextAction) -> Arc<dyn Task> {
        Arc::new(StepTask { id, next })
    }

    fn three_step_graph(next: NextAction) -> Graph {
        GraphBuilder::new("three_steps")
            .add_task(step("first", next.clone()))
            .add_task(step("second", next))
            .add_task(step("third", NextAction::End))
            .add_edge("first", "second")
            .add_edge("second", "third")
            .build()
    }

    #[tokio::test]
    async fn continue_and_execute_runs_to_the_end_in_one_call() {
        let graph = three_step_graph(NextAction::ContinueAndExecute);
        let mut session = Session::new_from_task("s1", &graph.id, "first");

        let result = graph.execute_session(&mut session).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(session.current_task_id, "third");
        assert_eq!(session.status_message.as_deref(), Some("third done"));
        let trail = session.context.fetch(&TRAIL).await.unwrap();
        assert_eq!(trail, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn flow_runner_advances_one_step_per_call() {
        let graph = Arc::new(three_step_graph(NextAction::Continue));
        let storage = Arc::new(InMemorySessionStorage::new());
        let session = Session::new_from_task("s2", &graph.id, "first");
        storage.save(session).await.unwrap();

        let runner = FlowRunner::new(graph, storage.clone());

        let first = runner.run("s2").await.unwrap();
        assert_eq!(first.status, ExecutionStatus::InProgress);
        let stored = storage.get("s2").await.unwrap().unwrap();
        assert_eq!(stored.current_task_id, "second");

        runner.run("s2").await.unwrap();
        let last = runner.run("s2").await.unwrap();
        assert_eq!(last.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn failing_step_leaves_session_on_failed_task() {
        let graph = Arc::new(
            GraphBuilder::new("failing")
                .add_task(step("first", NextAction::Continue))
                .add_task(Arc::new(FailingTask))
                .add_edge("first", "failing")
                .build(),
        );
        let storage = Arc::new(InMemorySessionStorage::new());
        storage
            .save(Session::new_from_task("s3", &graph.id, "first"))
            .await
            .unwrap();
        let runner = FlowRunner::new(graph, storage.clone());

        runner.run("s3").await.unwrap();
        let err = runner.run("s3").await.unwrap_err();

        assert!(matches!(err, GraphError::TaskExecutionFailed(_)));
        let stored = storage.get("s3").await.unwrap().unwrap();
        assert_eq!(stored.current_task_id, "failing");
    }

    #[tokio::test]
    async fn run_to_end_names_the_chained_task_that_failed() {
        let graph = Arc::new(
            GraphBuilder::new("chained")
                .add_task(step("first", NextAction::ContinueAndExecute))
                .add_task(Arc::new(FailingTask))
                .add_edge("first", "failing")
                .build(),
        );
        let storage = Arc::new(InMemorySessionStorage::new());
        storage
            .save(Session::new_from_task("s4", &graph.id, "first"))
            .await
            .unwrap();
        let runner = FlowRunner::new(graph, storage.clone());

        let failure = runner.run_to_end("s4").await.unwrap_err();

        assert_eq!(failure.task_id.as_deref(), Some("failing"));
        assert_eq!(failure.reason(), "boom");
        assert_eq!(failure.to_string(), "failing: boom");
        let stored = storage.get("s4").await.unwrap().unwrap();
        assert_eq!(stored.current_task_id, "first");
    }

    #[tokio::test]
    async fn run_to_end_saves_between_steps() {
        let graph = Arc::new(three_step_graph(NextAction::Continue));
        let storage = Arc::new(InMemorySessionStorage::new());
        let session = Session::new_from_task("s5", &graph.id, "first");
        let context = session.context.clone();
        storage.save(session).await.unwrap();
        let runner = FlowRunner::new(graph, storage.clone());

        let result = runner.run_to_end("s5").await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(
            context.fetch(&TRAIL).await.unwrap(),
            vec!["first", "second", "third"]
        );
        let stored = storage.get("s5").await.unwrap().unwrap();
        assert_eq!(stored.current_task_id, "third");

        storage.delete("s5").await.unwrap();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn missing_session_is_reported() {
        let graph = Arc::new(three_step_graph(NextAction::Continue));
        let runner = FlowRunner::new(graph, Arc::new(InMemorySessionStorage::new()));
        let err = runner.run("nope").await.unwrap_err();
        assert!(matches!(err, GraphError::SessionNotFound(id) if id == "nope"));
    }

    #[test]
    fn stage_order_follows_edges_and_rejects_cycles() {
        let graph = three_step_graph(NextAction::Continue);
        assert_eq!(graph.stage_order().unwrap(), vec!["first", "second", "third"]);

        let cyclic = GraphBuilder::new("cyclic")
            .add_task(step("a", NextAction::Continue))
            .add_task(step("b", NextAction::Continue))
            .add_edge("a", "b")
            .add_edge("b", "a")
            .build();
        assert!(matches!(
            cyclic.stage_order(),
            Err(GraphError::InvalidGraph(_))
        ));
    }
}

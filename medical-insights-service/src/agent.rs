use async_trait::async_trait;
use graph_flow::Graph;

use crate::workflow::PipelineError;

/// A pipeline variant: it knows its stage graph and how to drive one input through it.
#[async_trait]
pub trait Agent: Send + Sync {
    type Input: Send;
    type Output: Send;

    fn build_graph(&self) -> Graph;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError>;
}

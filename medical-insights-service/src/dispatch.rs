//! Hand-off between the request boundary and the pipeline. Callers enqueue a
//! case and return; the outcome is visible only through the stored case status.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span};

use crate::pipeline::{CasePipeline, PipelineRequest};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("pipeline queue is full")]
    QueueFull,

    #[error("pipeline worker has stopped")]
    WorkerStopped,
}

#[derive(Clone)]
pub struct PipelineDispatcher {
    sender: mpsc::Sender<PipelineRequest>,
}

impl PipelineDispatcher {
    /// Start the worker. Each dequeued case runs in its own task, so cases do
    /// not wait on each other.
    pub fn spawn(pipeline: Arc<CasePipeline>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<PipelineRequest>(capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let pipeline = pipeline.clone();
                let span = info_span!("pipeline", case_id = %request.case_id);
                tokio::spawn(
                    async move {
                        match pipeline.run(request).await {
                            Ok(outcome) => match outcome.result {
                                Ok(_) => info!(
                                    errors = outcome.state.processing_errors.len(),
                                    "pipeline run completed"
                                ),
                                Err(e) => error!(
                                    error = %e,
                                    stage = %outcome.state.processing_stage,
                                    "pipeline run failed"
                                ),
                            },
                            Err(e) => error!(error = %e, "pipeline run aborted"),
                        }
                    }
                    .instrument(span),
                );
            }
            info!("pipeline dispatcher stopped");
        });

        (Self { sender }, worker)
    }

    /// Enqueue a case without waiting for it to run.
    pub fn dispatch(&self, request: PipelineRequest) -> Result<(), DispatchError> {
        self.sender.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::WorkerStopped,
        })
    }
}

use thiserror::Error;

use frameflow::PipelineError;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("session input is closed")]
    Closed,

    #[error("{task} task failed: {source}")]
    Task {
        task: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl TransformError {
    pub(crate) fn task(task: &'static str, source: tokio::task::JoinError) -> Self {
        Self::Task { task, source }
    }
}

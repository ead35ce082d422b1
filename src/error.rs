use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("processor '{name}' is listed more than once")]
    DuplicateProcessor { name: String },

    #[error("processor '{processor}' depends on '{dependency}', which is not registered")]
    MissingDependency {
        processor: String,
        dependency: String,
    },

    #[error("circular processor dependency: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("unknown preset '{name}'; expected one of markdown, shiki, mermaid, math, full")]
    UnknownPreset { name: String },

    #[error("unknown processor '{name}'")]
    UnknownProcessor { name: String },

    #[error("pipeline was flushed; call reset before pushing more content")]
    PushAfterDone,
}

/// Failure of a single processor on a single block. Recorded in block meta, never
/// propagated out of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("{processor} failed to render: {message}")]
    Render { processor: String, message: String },

    #[error("{processor} failed to preload: {message}")]
    Preload { processor: String, message: String },
}

impl RenderError {
    #[must_use]
    pub fn render(processor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            processor: processor.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn preload(processor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Preload {
            processor: processor.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Render { message, .. } | Self::Preload { message, .. } => message,
        }
    }
}

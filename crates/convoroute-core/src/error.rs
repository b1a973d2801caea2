use thiserror::Error;

/// Errors produced by the routing core and its collaborator seams.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Malformed route/step/guideline configuration. Fatal at build time.
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    #[error("Unknown step '{step}' in route '{route}'")]
    UnknownStep { route: String, step: String },

    #[error("Route '{0}' has no steps")]
    EmptyRoute(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;

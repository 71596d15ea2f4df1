use thiserror::Error;

pub type Result<T> = std::result::Result<T, SynthError>;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("stack '{stack}' already declares a resource with logical id '{logical_id}'")]
    DuplicateLogicalId { stack: String, logical_id: String },

    #[error("stack '{stack}' already declares a template parameter '{logical_id}'")]
    DuplicateTemplateParameter { stack: String, logical_id: String },

    #[error("parameter '{key}' is already published by stack '{publisher}'")]
    DuplicatePublisher { key: String, publisher: String },

    #[error("stack '{reader}' reads parameter '{key}' but no stack publishes it")]
    UnknownParameter { key: String, reader: String },

    #[error(
        "stack '{reader}' reads parameter '{key}' published by '{publisher}' without depending on it"
    )]
    UnorderedParameterRead {
        key: String,
        reader: String,
        publisher: String,
    },

    #[error("stack '{0}' is not part of this app")]
    UnknownStack(String),

    #[error("stack '{0}' is declared twice")]
    DuplicateStack(String),

    #[error("stack dependencies form a cycle through '{0}'")]
    DependencyCycle(String),

    #[error("route '{route_key}' in stack '{stack}' is not signed-request authorized")]
    UnsignedRoute { stack: String, route_key: String },

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("invalid metric expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("failed to stage asset '{path}': {source}")]
    Asset {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

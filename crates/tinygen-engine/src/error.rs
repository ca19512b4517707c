use thiserror::Error;

/// Errors from the generation engine.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Caller-supplied generation arguments out of range, rejected before the
    /// model is invoked. Never re-wrapped by the engine.
    #[error("invalid generation parameter: {0}")]
    InvalidParameter(&'static str),

    /// Failure inside the model runtime, carrying the original message.
    #[error("text generation failed: {0}")]
    Failed(String),
}

/// Errors from the completion service.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("text generation service not initialized")]
    NotReady,

    #[error(transparent)]
    Generate(#[from] GenerateError),
}

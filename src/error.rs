use thiserror::Error;

/// Failures the form surfaces to the user.
///
/// The messages are shown verbatim; provider detail only goes to the log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("Please fill out all fields.")]
    Validation,

    #[error("Failed to communicate with the AI model. Please check your connection and API key.")]
    Backend,
}

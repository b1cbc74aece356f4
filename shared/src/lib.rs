// shared/src/lib.rs

/// Errors crossing every layer of the story site.
///
/// The type is `Clone` because a single failed backend call may be handed
/// to every caller that joined the same pending operation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("validation: {0}")]
    Validation(String),
    #[error("backend error {code}: {message}")]
    Backend { code: String, message: String },
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("dependency '{0}' not found")]
    DependencyNotFound(String),
    #[error("upload: {0}")]
    Upload(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    pub fn backend(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod config;
pub mod logging;

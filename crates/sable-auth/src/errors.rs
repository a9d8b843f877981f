use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("connection string segment is not a key=value pair: {0}")]
    MalformedSegment(String),
    #[error("connection string is missing {0}")]
    MissingField(&'static str),
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("shared access key name must not be empty")]
    EmptyKeyName,
    #[error("shared access key must not be empty")]
    EmptyKey,
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error("token provider failed: {0}")]
    Provider(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

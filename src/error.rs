use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildEventsError {
    #[error("{provider} token required to poll the API")]
    MissingCredential { provider: &'static str },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("API request failed with status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Pagination error: {0}")]
    Pagination(String),

    #[error("Timed out {0}")]
    Timeout(String),

    #[error("Build not found: {0}")]
    BuildNotFound(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, BuildEventsError>;

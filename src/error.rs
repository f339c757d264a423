use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrcovError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid diff format: {0}")]
    InvalidDiffFormat(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing environment variable(s): {}", .0.join(", "))]
    MissingEnvironmentVariable(Vec<String>),

    #[error("The annotation type '{0}' is not valid. Please choose from notice, warning or error")]
    InvalidAnnotationType(String),

    #[error("GitHub API: unauthorized")]
    Unauthorized,

    #[error("GitHub API: forbidden")]
    Forbidden,

    #[error("GitHub API: not found")]
    NotFound,

    #[error("GitHub API: conflict")]
    Conflict,

    #[error("GitHub API: validation failed")]
    ValidationFailed,

    #[error("GitHub API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("Cannot get pull request: {0}")]
    CannotGetPullRequest(String),

    #[error("Cannot post comment: {0}")]
    CannotPostComment(String),

    #[error("Cannot write to annotations branch: {0}")]
    CannotGetBranch(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Marker not found in the rendered comment")]
    MissingMarker,
}

impl PrcovError {
    /// Map an HTTP error status to the matching API error kind.
    #[must_use]
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => PrcovError::Unauthorized,
            403 => PrcovError::Forbidden,
            404 => PrcovError::NotFound,
            409 => PrcovError::Conflict,
            422 => PrcovError::ValidationFailed,
            _ => PrcovError::Api { status, body },
        }
    }
}

impl From<std::fmt::Error> for PrcovError {
    fn from(err: std::fmt::Error) -> Self {
        PrcovError::Template(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PrcovError>;

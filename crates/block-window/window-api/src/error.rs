use hyper::StatusCode;
use window_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("invalid value for parameter '{name}': {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("store error")]
    Store(#[from] StoreError),
}

impl QueryError {
    pub fn status(&self) -> StatusCode {
        match self {
            QueryError::MissingParameter(_) | QueryError::InvalidParameter { .. } => {
                StatusCode::BAD_REQUEST
            }
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
            QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to clients. Store failures are not described beyond
    /// their category.
    pub fn public_message(&self) -> String {
        match self {
            QueryError::Store(_) => "internal error while reading the block window".to_owned(),
            other => other.to_string(),
        }
    }
}

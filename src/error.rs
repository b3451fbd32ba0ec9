use thiserror::Error;

#[derive(Debug, Error)]
pub enum GradeError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl GradeError {
    /// Wire code used in the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            GradeError::Validation(_) => "bad_params",
            GradeError::NotFound(_) => "not_found",
            GradeError::Storage(_) => "db_query_failed",
        }
    }
}

pub type GradeResult<T> = Result<T, GradeError>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid revision id: {0}")]
    InvalidRevisionId(String),

    #[error("invalid document body: {0}")]
    InvalidBody(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type MoshResult<T> = Result<T, MoshError>;

#[derive(thiserror::Error, Debug)]
pub enum MoshError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("processing error: {0}")]
    Processing(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MoshError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing(msg.into())
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid website id: {0}")]
    InvalidWebsiteId(String),

    #[error("unsupported time unit: {0}")]
    UnsupportedTimeUnit(String),

    #[error("unsupported timezone: {0}")]
    UnsupportedTimezone(String),
}

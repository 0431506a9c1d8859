#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {0}")]
    Status(u16),
    #[error("empty response body")]
    Empty,
    #[error("malformed provider response: {0}")]
    Json(#[from] serde_json::Error),
}

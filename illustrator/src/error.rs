use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Reqwest error: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Failed to parse API response: {0}")]
    ParseError(String),
    #[error("Provider returned status {status}. Body: {content}")]
    ApiReturnedError {
        status: reqwest::StatusCode,
        content: String,
    },
    #[error("Jimeng API error: {message} (code: {code})")]
    JimengError { code: i64, message: String },
    #[error("Jimeng task {0}")]
    TaskFailed(&'static str),
    #[error("Jimeng task did not finish within {0} seconds")]
    Timeout(u64),
    #[error("Provider returned empty image data")]
    EmptyImageData,
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::ParseError(e.to_string())
    }
}

impl From<base64::DecodeError> for ApiError {
    fn from(e: base64::DecodeError) -> Self {
        ApiError::ParseError(format!("invalid base64 image data: {}", e))
    }
}

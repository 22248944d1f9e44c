use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("invalid url '{value}': {message}")]
    InvalidUrl { value: String, message: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    /// A `{success: false}` body. The text is the backend's own `message`.
    #[error("{0}")]
    Backend(String),
}

impl ConsoleError {
    pub fn backend(message: Option<&str>) -> Self {
        let text = message
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or("backend reported failure");
        Self::Backend(text.to_string())
    }
}

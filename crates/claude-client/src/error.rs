use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaudeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Anthropic API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse stream event: {source}\n  data: {data}")]
    Parse {
        data: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("API key not set: environment variable {0} is empty or missing")]
    MissingApiKey(String),
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised while talking to the Pocket service or serving the
/// authorization callback
#[derive(Error, Debug)]
pub enum Error {
    /// The service answered with a non-success HTTP status
    #[error("protocol error: {status}{}{}", fmt_code(.code), fmt_message(.message))]
    Protocol {
        /// HTTP status line, e.g. "403 Forbidden"
        status: String,
        /// Value of the `x-error-code` response header
        code: Option<String>,
        /// Value of the `x-error` response header
        message: Option<String>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("callback error: {0}")]
    Callback(String),
}

fn fmt_code(code: &Option<String>) -> String {
    code.as_ref()
        .map(|code| format!(" (code {})", code))
        .unwrap_or_default()
}

fn fmt_message(message: &Option<String>) -> String {
    message
        .as_ref()
        .map(|message| format!(": {}", message))
        .unwrap_or_default()
}

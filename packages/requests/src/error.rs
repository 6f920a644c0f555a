use std::string::FromUtf8Error;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{option} option error: {message}")]
    Option {
        option: &'static str,
        message: String,
    },

    #[error("Cannot set {requested} body: request already has a {current} body")]
    BodyConflict {
        current: &'static str,
        requested: &'static str,
    },

    #[error("Invalid header name: {name}")]
    InvalidHeaderName { name: String },

    #[error("Invalid value for header [{name}]")]
    InvalidHeaderValue { name: String },

    #[error("Invalid cookie [{name}]")]
    InvalidCookie { name: String },

    #[error("Write multipart error: {0}")]
    Multipart(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid HTTP method: {method}")]
    InvalidMethod { method: String },

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Transport failure: {message}")]
    TransportFailure { message: String },

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Response body has already been consumed")]
    BodyConsumed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Response body is not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

impl Error {
    pub(crate) fn option(option: &'static str, error: impl ToString) -> Self {
        Error::Option {
            option,
            message: error.to_string(),
        }
    }

    /// True when the call was aborted because its deadline passed.
    pub fn is_deadline_exceeded(&self) -> bool {
        match self {
            Error::DeadlineExceeded => true,
            Error::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

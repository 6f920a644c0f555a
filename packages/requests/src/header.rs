//! Header values accepted by the header options.

use std::fmt;

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_USER_AGENT: &str = "User-Agent";
pub const HEADER_REFERER: &str = "Referer";
pub const HEADER_AUTHORIZATION: &str = "Authorization";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_MULTIPART: &str = "multipart/form-data";

/// A configured header value.
///
/// `Delete` removes the header from the assembled request instead of setting it.
pub enum HeaderValue {
    /// Sent verbatim.
    Text(String),
    /// Rendered with `Display` when the request is assembled.
    Display(Box<dyn fmt::Display + Send + Sync>),
    Delete,
}

impl HeaderValue {
    /// Wrap any renderable value; it is formatted at assembly time.
    pub fn display<T>(value: T) -> Self
    where
        T: fmt::Display + Send + Sync + 'static,
    {
        HeaderValue::Display(Box::new(value))
    }

    /// The text to send, or `None` for a deletion marker.
    pub fn render(&self) -> Option<String> {
        match self {
            HeaderValue::Text(text) => Some(text.clone()),
            HeaderValue::Display(value) => Some(value.to_string()),
            HeaderValue::Delete => None,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, HeaderValue::Delete)
    }
}

impl fmt::Debug for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Text(text) => f.debug_tuple("Text").field(text).finish(),
            HeaderValue::Display(value) => f
                .debug_tuple("Display")
                .field(&value.to_string())
                .finish(),
            HeaderValue::Delete => f.write_str("Delete"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<&String> for HeaderValue {
    fn from(value: &String) -> Self {
        HeaderValue::Text(value.clone())
    }
}

impl<T: Into<HeaderValue>> From<Option<T>> for HeaderValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(HeaderValue::Delete)
    }
}

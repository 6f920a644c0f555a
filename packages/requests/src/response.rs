//! Response wrapper with one-shot body decoding.

use std::io::{self, BufReader, Read};

use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::executor::RawResponse;

/// A response returned by a [`crate::Session`].
///
/// The body is a single-use stream. [`Response::bytes`], [`Response::text`]
/// and [`Response::json`] each consume it and close it before returning,
/// whether decoding succeeded or not. Calling any of them a second time is a
/// misuse and fails with [`Error::BodyConsumed`] instead of returning the body
/// again.
pub struct Response {
    parts: http::response::Parts,
    body: Option<Box<dyn Read + Send>>,
}

impl Response {
    pub fn new(raw: RawResponse) -> Self {
        let (parts, body) = raw.into_parts();
        Self {
            parts,
            body: Some(body),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.parts.status
    }

    /// Check if the response status indicates success (2xx)
    pub fn is_success(&self) -> bool {
        self.parts.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether the body is still available for decoding.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Read the whole body.
    pub fn bytes(&mut self) -> Result<Vec<u8>> {
        let mut body = DeadlineAware(self.take_body()?);
        let mut buf = Vec::new();
        match body.read_to_end(&mut buf) {
            Ok(_) => Ok(buf),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(Error::DeadlineExceeded),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Read the whole body as UTF-8 text.
    pub fn text(&mut self) -> Result<String> {
        Ok(String::from_utf8(self.bytes()?)?)
    }

    /// Decode the body as JSON into `T`.
    pub fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let body = BufReader::new(DeadlineAware(self.take_body()?));
        serde_json::from_reader(body).map_err(|e| {
            if e.io_error_kind() == Some(io::ErrorKind::TimedOut) {
                Error::DeadlineExceeded
            } else {
                Error::Json(e)
            }
        })
    }

    /// The underlying response. Its body is empty if it was already consumed.
    pub fn into_inner(self) -> RawResponse {
        let body = self
            .body
            .unwrap_or_else(|| Box::new(io::empty()) as Box<dyn Read + Send>);
        http::Response::from_parts(self.parts, body)
    }

    fn take_body(&mut self) -> Result<Box<dyn Read + Send>> {
        self.body.take().ok_or(Error::BodyConsumed)
    }
}

/// Reports transport timeouts raised mid-body as `ErrorKind::TimedOut`.
struct DeadlineAware(Box<dyn Read + Send>);

impl Read for DeadlineAware {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf).map_err(|e| {
            if is_timeout(&e) {
                io::Error::new(io::ErrorKind::TimedOut, e)
            } else {
                e
            }
        })
    }
}

fn is_timeout(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::TimedOut
        || error
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
            .is_some_and(|e| e.is_timeout())
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.parts.status)
            .field("headers", &self.parts.headers)
            .field("body_consumed", &self.body.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts how many times the body stream is closed.
    struct TrackedBody {
        data: Cursor<Vec<u8>>,
        closed: Arc<AtomicUsize>,
    }

    impl Read for TrackedBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.data.read(buf)
        }
    }

    impl Drop for TrackedBody {
        fn drop(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked(status: u16, body: &str) -> (Response, Arc<AtomicUsize>) {
        let closed = Arc::new(AtomicUsize::new(0));
        let body: Box<dyn Read + Send> = Box::new(TrackedBody {
            data: Cursor::new(body.as_bytes().to_vec()),
            closed: closed.clone(),
        });
        let raw = http::Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(body)
            .unwrap();
        (Response::new(raw), closed)
    }

    #[test]
    fn bytes_reads_and_closes() {
        let (mut response, closed) = tracked(200, "foo");
        assert_eq!(response.bytes().unwrap(), b"foo");
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(!response.has_body());
    }

    #[test]
    fn bytes_twice_is_rejected() {
        let (mut response, closed) = tracked(200, "foo");
        response.bytes().unwrap();
        assert!(matches!(response.bytes(), Err(Error::BodyConsumed)));
        assert!(matches!(response.text(), Err(Error::BodyConsumed)));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn text_decodes_utf8() {
        let (mut response, _) = tracked(200, "héllo");
        assert_eq!(response.text().unwrap(), "héllo");
    }

    #[test]
    fn text_rejects_invalid_utf8() {
        let body: Box<dyn Read + Send> = Box::new(Cursor::new(vec![0xff, 0xfe]));
        let mut response = Response::new(http::Response::new(body));
        assert!(matches!(response.text(), Err(Error::Utf8(_))));
    }

    #[test]
    fn json_decodes_into_target() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Pair {
            a: String,
            c: String,
        }

        let (mut response, closed) = tracked(200, r#"{"a":"b", "c": "d"}"#);
        let pair: Pair = response.json().unwrap();
        assert_eq!(
            pair,
            Pair {
                a: "b".to_string(),
                c: "d".to_string()
            }
        );
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn json_failure_still_closes_body() {
        let (mut response, closed) = tracked(200, "{not json");
        let result: Result<HashMap<String, String>> = response.json();
        assert!(matches!(result, Err(Error::Json(_))));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(matches!(response.bytes(), Err(Error::BodyConsumed)));
    }

    /// Yields its data, then fails the way a stalled transport does.
    struct StalledBody {
        data: Cursor<Vec<u8>>,
        error: Option<io::Error>,
    }

    impl Read for StalledBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.data.read(buf)?;
            match self.error.take() {
                Some(e) if n == 0 => Err(e),
                _ => Ok(n),
            }
        }
    }

    fn stalled(data: &str, error: io::Error) -> Response {
        let body: Box<dyn Read + Send> = Box::new(StalledBody {
            data: Cursor::new(data.as_bytes().to_vec()),
            error: Some(error),
        });
        Response::new(http::Response::new(body))
    }

    #[test]
    fn body_timeout_is_deadline_exceeded() {
        let mut response = stalled("par", io::Error::new(io::ErrorKind::TimedOut, "stalled"));
        let err = response.bytes().unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded));
        assert!(err.is_deadline_exceeded());

        let mut response = stalled(r#"{"a": "#, io::Error::new(io::ErrorKind::TimedOut, "stalled"));
        let err = response.json::<HashMap<String, String>>().unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded));
    }

    #[test]
    fn other_body_errors_stay_io() {
        let mut response = stalled("par", io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(response.bytes(), Err(Error::Io(_))));

        let mut response = stalled("{", io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let err = response.json::<HashMap<String, String>>().unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn status_and_headers() {
        let (response, _) = tracked(404, "");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.is_success());
        assert_eq!(response.header("content-type"), Some("application/json"));
    }

    #[test]
    fn into_inner_passes_through() {
        let (response, _) = tracked(200, "raw");
        let mut raw = response.into_inner();
        assert_eq!(raw.status(), StatusCode::OK);

        let mut body = String::new();
        raw.body_mut().read_to_string(&mut body).unwrap();
        assert_eq!(body, "raw");
    }

    #[test]
    fn into_inner_after_consumption_has_empty_body() {
        let (mut response, _) = tracked(200, "raw");
        response.bytes().unwrap();
        let mut raw = response.into_inner();
        let mut body = Vec::new();
        raw.body_mut().read_to_end(&mut body).unwrap();
        assert!(body.is_empty());
    }
}

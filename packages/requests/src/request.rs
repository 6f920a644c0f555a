//! Request assembly.
//!
//! [`build_request`] applies options to a fresh [`RequestOptions`], then
//! finalizes the multipart body, materializes headers, query parameters and
//! cookies, and records the deadline. The result is an immutable [`Request`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, Read};
use std::time::{Duration, Instant};

use http::header::{HeaderMap, HeaderName, HeaderValue as WireValue, AUTHORIZATION, COOKIE};
use url::Url;

use crate::error::{Error, Result};
use crate::header::HeaderValue;
use crate::method::Method;
use crate::options::{BodySource, RequestOption, RequestOptions};

/// A finalized request body.
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    Reader(Box<dyn Read + Send>),
}

impl Body {
    /// The buffered content, if the body is not a stream.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Body::Empty => Some(&[]),
            Body::Bytes(bytes) => Some(bytes),
            Body::Reader(_) => None,
        }
    }

    /// Byte length, when known up front.
    pub fn len(&self) -> Option<u64> {
        self.as_bytes().map(|bytes| bytes.len() as u64)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    pub fn read_to_end(self) -> io::Result<Vec<u8>> {
        match self {
            Body::Empty => Ok(Vec::new()),
            Body::Bytes(bytes) => Ok(bytes),
            Body::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Body::Reader(_) => f.write_str("Reader"),
        }
    }
}

/// An assembled request, ready for a transport.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Body,
    deadline: Option<Instant>,
}

/// The owned pieces of a [`Request`].
#[derive(Debug)]
pub struct Parts {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
    pub deadline: Option<Instant>,
}

impl Request {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header as text. Values that are not visible ASCII yield `None`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All cookies carried by the `Cookie` header, in order.
    pub fn cookies(&self) -> Vec<(&str, &str)> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies()
            .into_iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    pub fn into_parts(self) -> Parts {
        Parts {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
            deadline: self.deadline,
        }
    }
}

/// Apply `options` in order and assemble the request.
///
/// Fails with the first option error before any other work is done.
pub fn build_request(
    method: Method,
    url: &str,
    options: impl IntoIterator<Item = RequestOption>,
) -> Result<Request> {
    let options = RequestOptions::from_options(options)?;
    let (headers, queries, cookies, body, deadline) = options.into_parts();

    let body = finalize_body(body)?;

    let mut url = Url::parse(url)?;
    let mut header_map = materialize_headers(headers)?;
    apply_queries(&mut url, &queries);
    apply_cookies(&mut header_map, &cookies)?;

    log::debug!("assembled {} {} (body: {:?})", method, url, body);

    Ok(Request {
        method,
        url,
        headers: header_map,
        body,
        deadline,
    })
}

fn finalize_body(source: BodySource) -> Result<Body> {
    let body = match source {
        BodySource::None => Body::Empty,
        BodySource::Raw(reader) => Body::Reader(reader),
        BodySource::Json(bytes) => Body::Bytes(bytes),
        BodySource::Form(text) => Body::Bytes(text.into_bytes()),
        BodySource::Multipart(writer) => Body::Bytes(
            writer
                .finish()
                .map_err(|e| Error::Multipart(e.to_string()))?,
        ),
    };
    Ok(body)
}

fn materialize_headers(headers: HashMap<String, HeaderValue>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| Error::InvalidHeaderName { name: key.clone() })?;
        match value.render() {
            None => {
                map.remove(&name);
            }
            Some(text) => {
                let mut wire = WireValue::from_str(&text)
                    .map_err(|_| Error::InvalidHeaderValue { name: key.clone() })?;
                if name == AUTHORIZATION {
                    wire.set_sensitive(true);
                }
                map.insert(name, wire);
            }
        }
    }
    Ok(map)
}

/// Configured keys replace every value the URL already carries for them.
fn apply_queries(url: &mut Url, queries: &BTreeMap<String, String>) {
    if queries.is_empty() {
        return;
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !queries.contains_key(&**k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .extend_pairs(queries);
}

fn apply_cookies(headers: &mut HeaderMap, cookies: &BTreeMap<String, String>) -> Result<()> {
    if cookies.is_empty() {
        return Ok(());
    }
    let mut line: Vec<String> = headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|existing| vec![existing.to_string()])
        .unwrap_or_default();
    for (name, value) in cookies {
        if !is_cookie_name(name) || !value.bytes().all(is_cookie_octet) {
            return Err(Error::InvalidCookie { name: name.clone() });
        }
        line.push(format!("{}={}", name, value));
    }

    let value = WireValue::from_str(&line.join("; ")).map_err(|_| Error::InvalidHeaderValue {
        name: COOKIE.to_string(),
    })?;
    headers.insert(COOKIE, value);
    Ok(())
}

/// RFC 6265 cookie-name: a non-empty token.
fn is_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b))
}

/// RFC 6265 cookie-octet: visible ASCII except `"`, `,`, `;` and `\`.
fn is_cookie_octet(b: u8) -> bool {
    b.is_ascii_graphic() && !matches!(b, b'"' | b',' | b';' | b'\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::header::*;
    use crate::options::*;
    use base64::prelude::BASE64_STANDARD;
    use base64::Engine;
    use std::io::Cursor;

    fn names(request: &Request) -> Vec<String> {
        let mut names: Vec<String> = request.headers().keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }

    #[test]
    fn header_overwrite_and_delete() {
        let req = build_request(
            Method::GET,
            "http://localhost",
            [
                header("key_1", "value_1"),
                header("key_2", "value_2"),
                header("key_2", None::<&str>),
                header("key_1", "value_3"),
            ],
        )
        .unwrap();
        assert_eq!(names(&req), vec!["key_1"]);
        assert_eq!(req.header("key_1"), Some("value_3"));
    }

    #[test]
    fn delete_of_absent_header_is_noop() {
        let req = build_request(
            Method::GET,
            "http://localhost",
            [header("gone", HeaderValue::Delete)],
        )
        .unwrap();
        assert!(req.headers().is_empty());
    }

    #[test]
    fn headers_replace_then_merge() {
        let req = build_request(
            Method::GET,
            "http://localhost",
            [
                header("foo", "bar"),
                replace_headers([("key_1", "value_1"), ("key_2", "value_2")]),
                headers([
                    ("key_1", HeaderValue::from("value_3")),
                    ("key_2", HeaderValue::Delete),
                ]),
            ],
        )
        .unwrap();
        assert_eq!(names(&req), vec!["key_1"]);
        assert_eq!(req.header("key_1"), Some("value_3"));
    }

    #[test]
    fn display_header_is_rendered() {
        let req = build_request(
            Method::GET,
            "http://localhost",
            [header("X-Retry", HeaderValue::display(3))],
        )
        .unwrap();
        assert_eq!(req.header("x-retry"), Some("3"));
    }

    #[test]
    fn bad_header_value_names_the_key() {
        let err = build_request(
            Method::GET,
            "http://localhost",
            [header("key_1", "foo"), header("key_2", "line\nbreak")],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidHeaderValue { name } if name == "key_2"));
    }

    #[test]
    fn bad_header_name_is_rejected() {
        let err = build_request(Method::GET, "http://localhost", [header("bad key", "v")])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHeaderName { name } if name == "bad key"));
    }

    #[test]
    fn basic_auth_round_trips() {
        let req = build_request(
            Method::GET,
            "http://localhost",
            [basic_auth("username", "123456")],
        )
        .unwrap();
        let value = req.headers().get(HEADER_AUTHORIZATION).unwrap();
        assert!(value.is_sensitive());

        let encoded = value.to_str().unwrap().strip_prefix("Basic ").unwrap();
        let decoded = BASE64_STANDARD.decode(encoded).unwrap();
        assert_eq!(decoded, b"username:123456");
    }

    #[test]
    fn cookies_are_materialized() {
        let req = build_request(
            Method::GET,
            "http://localhost",
            [cookie("foo", "bar"), cookie("a", "b")],
        )
        .unwrap();
        assert_eq!(req.cookie("foo"), Some("bar"));
        assert_eq!(req.cookies(), vec![("a", "b"), ("foo", "bar")]);
    }

    #[test]
    fn cookie_value_cannot_smuggle_another_cookie() {
        let err = build_request(
            Method::GET,
            "http://localhost",
            [cookie("foo", "x; admin=1")],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidCookie { name } if name == "foo"));
    }

    #[test]
    fn cookie_names_and_values_are_checked() {
        for (name, value) in [
            ("", "v"),
            ("a b", "v"),
            ("a=b", "v"),
            ("foo", "a b"),
            ("foo", "a,b"),
            ("foo", "\"quoted\""),
            ("foo", "line\r\nbreak"),
        ] {
            let result = build_request(Method::GET, "http://localhost", [cookie(name, value)]);
            assert!(
                matches!(result, Err(Error::InvalidCookie { .. })),
                "accepted cookie {:?}={:?}",
                name,
                value
            );
        }

        let req = build_request(
            Method::GET,
            "http://localhost",
            [cookie("token", "abc-123_x.y~z=="), cookie("empty", "")],
        )
        .unwrap();
        assert_eq!(req.cookie("token"), Some("abc-123_x.y~z=="));
        assert_eq!(req.header("cookie"), Some("empty=; token=abc-123_x.y~z=="));
    }

    #[test]
    fn replaced_cookies_drop_earlier_ones() {
        let req = build_request(
            Method::GET,
            "http://localhost",
            [cookies([("foo", "bar")]), replace_cookies([("a", "b")])],
        )
        .unwrap();
        assert_eq!(req.cookies(), vec![("a", "b")]);
    }

    #[test]
    fn cookies_append_to_explicit_cookie_header() {
        let req = build_request(
            Method::GET,
            "http://localhost",
            [header("Cookie", "session=1"), cookie("theme", "dark")],
        )
        .unwrap();
        assert_eq!(req.header("cookie"), Some("session=1; theme=dark"));
    }

    fn query_map(req: &Request) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in req.url().query_pairs() {
            map.entry(k.into_owned()).or_default().push(v.into_owned());
        }
        map
    }

    fn expected(pairs: &[(&str, &str)]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
            .collect()
    }

    #[test]
    fn query_merges_with_url_query() {
        let req = build_request(Method::GET, "http://localhost?a=b&c=d", [query("e", "f")])
            .unwrap();
        assert_eq!(
            query_map(&req),
            expected(&[("a", "b"), ("c", "d"), ("e", "f")])
        );
    }

    #[test]
    fn query_replaces_url_values_for_same_key() {
        let req = build_request(
            Method::GET,
            "http://localhost?a=1&a=2&b=x",
            [query("a", "3")],
        )
        .unwrap();
        assert_eq!(query_map(&req), expected(&[("a", "3"), ("b", "x")]));
    }

    #[test]
    fn replace_queries_keeps_url_query() {
        let req = build_request(
            Method::GET,
            "http://localhost?a=b&c=d",
            [queries([("foo", "bar")]), replace_queries([("e", "f")])],
        )
        .unwrap();
        assert_eq!(
            query_map(&req),
            expected(&[("a", "b"), ("c", "d"), ("e", "f")])
        );
    }

    #[test]
    fn url_without_configured_queries_is_untouched() {
        let req = build_request(Method::GET, "http://localhost/p?z=1&a=2", []).unwrap();
        assert_eq!(req.url().as_str(), "http://localhost/p?z=1&a=2");
    }

    #[test]
    fn raw_body_streams_through() {
        let req = build_request(
            Method::GET,
            "http://localhost",
            [body(Cursor::new(b"foo".to_vec()))],
        )
        .unwrap();
        assert!(req.body().as_bytes().is_none());
        assert_eq!(req.into_body().read_to_end().unwrap(), b"foo");
    }

    #[test]
    fn json_body_round_trips() {
        let value = serde_json::json!({"a": "b", "c": ["d", "e"]});
        let req = build_request(Method::POST, "http://localhost", [json(&value)]).unwrap();
        assert_eq!(req.header(HEADER_CONTENT_TYPE), Some(CONTENT_TYPE_JSON));

        let bytes = req.into_body().read_to_end().unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn json_failure_aborts_assembly() {
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], 1);
        let err = build_request(
            Method::POST,
            "http://localhost",
            [
                json(&bad),
                RequestOption::new("unreachable", |_| panic!("applied after error")),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Option { option: "json", .. }));
    }

    #[test]
    fn option_error_wins_over_bad_url() {
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], 1);
        let err = build_request(Method::POST, "not a url", [json(&bad)]).unwrap_err();
        assert!(matches!(err, Error::Option { .. }));
    }

    #[test]
    fn form_body() {
        let req = build_request(
            Method::POST,
            "http://localhost",
            [form([("a", "b"), ("c", "d")])],
        )
        .unwrap();
        assert_eq!(req.header(HEADER_CONTENT_TYPE), Some(CONTENT_TYPE_FORM));
        assert_eq!(req.body().as_bytes(), Some(&b"a=b&c=d"[..]));
        assert_eq!(req.body().len(), Some(7));
    }

    #[test]
    fn multipart_is_finalized() {
        let req = build_request(
            Method::POST,
            "http://localhost",
            [
                multipart_field_string("foo", "bar"),
                file_reader("file", "test.txt", Cursor::new(b"foo\n".to_vec())),
            ],
        )
        .unwrap();

        let content_type = req.header(HEADER_CONTENT_TYPE).unwrap().to_string();
        assert!(content_type.starts_with(CONTENT_TYPE_MULTIPART));
        let boundary = content_type.split("boundary=").nth(1).unwrap();

        let body = String::from_utf8(req.into_body().read_to_end().unwrap()).unwrap();
        assert!(body.starts_with(&format!("--{}\r\n", boundary)));
        assert!(body.ends_with(&format!("\r\n--{}--\r\n", boundary)));
        assert!(body.contains("name=\"file\"; filename=\"test.txt\"\r\n"));
        assert!(body.contains("\r\n\r\nfoo\n\r\n"));
    }

    #[test]
    fn multipart_body_matches_writer_output() {
        let mut writer = codec::MultipartWriter::with_boundary("fixed");
        writer.write_field("a", "1").unwrap();
        let expected = writer.finish().unwrap();

        let req = build_request(
            Method::POST,
            "http://localhost",
            [RequestOption::new("fixed_multipart", |o| {
                o.body = BodySource::Multipart(codec::MultipartWriter::with_boundary("fixed"));
            }), multipart_field_string("a", "1")],
        )
        .unwrap();
        assert_eq!(req.into_body().read_to_end().unwrap(), expected);
    }

    #[test]
    fn deadline_is_carried() {
        let at = Instant::now() + Duration::from_secs(5);
        let req = build_request(Method::GET, "http://localhost", [deadline(at)]).unwrap();
        assert_eq!(req.deadline(), Some(at));
        assert!(!req.is_expired());
        assert!(req.remaining().unwrap() <= Duration::from_secs(5));

        let req = build_request(Method::GET, "http://localhost", []).unwrap();
        assert!(req.deadline().is_none());
        assert!(!req.is_expired());
    }

    #[test]
    fn past_deadline_is_expired() {
        let at = Instant::now() - Duration::from_millis(1);
        let req = build_request(Method::GET, "http://localhost", [deadline(at)]).unwrap();
        assert!(req.is_expired());
        assert_eq!(req.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn invalid_url() {
        let err = build_request(Method::GET, "::nope::", []).unwrap_err();
        assert!(matches!(err, Error::UrlParse(_)));
    }
}

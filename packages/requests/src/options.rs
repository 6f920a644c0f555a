//! Request options and the configuration state they mutate.
//!
//! A [`RequestOption`] is a named mutator over [`RequestOptions`]. Options are
//! applied strictly in the order given; later writes to the same header, query
//! or cookie key win. The first failing option records a sticky error and no
//! further option is applied.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::codec::{self, MultipartWriter};
use crate::error::{Error, Result};
use crate::header::{
    HeaderValue, CONTENT_TYPE_FORM, CONTENT_TYPE_JSON, HEADER_AUTHORIZATION, HEADER_CONTENT_TYPE,
    HEADER_REFERER, HEADER_USER_AGENT,
};

/// Where the request body comes from.
///
/// At most one source is active. A plain source (raw, JSON, form) may be
/// replaced by another plain source, but once a multipart body is started it
/// stays the only source, and a plain source is never silently turned into a
/// multipart one.
#[derive(Default)]
pub enum BodySource {
    #[default]
    None,
    Raw(Box<dyn Read + Send>),
    Json(Vec<u8>),
    Form(String),
    Multipart(MultipartWriter),
}

impl BodySource {
    pub fn kind(&self) -> &'static str {
        match self {
            BodySource::None => "empty",
            BodySource::Raw(_) => "raw",
            BodySource::Json(_) => "json",
            BodySource::Form(_) => "form",
            BodySource::Multipart(_) => "multipart",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, BodySource::None)
    }
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::Json(bytes) => f.debug_tuple("Json").field(&bytes.len()).finish(),
            BodySource::Form(text) => f.debug_tuple("Form").field(text).finish(),
            BodySource::Multipart(writer) => f.debug_tuple("Multipart").field(writer).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// Accumulated request configuration.
#[derive(Debug, Default)]
pub struct RequestOptions {
    pub(crate) headers: HashMap<String, HeaderValue>,
    pub(crate) queries: BTreeMap<String, String>,
    pub(crate) cookies: BTreeMap<String, String>,
    pub(crate) body: BodySource,
    pub(crate) deadline: Option<Instant>,
    error: Option<Error>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply options in order, stopping at the first one that fails.
    pub fn from_options(options: impl IntoIterator<Item = RequestOption>) -> Result<Self> {
        let mut state = Self::new();
        for option in options {
            log::trace!("applying {} option", option.name());
            option.apply(&mut state);
            if let Some(error) = state.error.take() {
                return Err(error);
            }
        }
        Ok(state)
    }

    /// Header value configured under `name`, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(&name.to_ascii_lowercase())
    }

    pub fn headers(&self) -> &HashMap<String, HeaderValue> {
        &self.headers
    }

    pub fn queries(&self) -> &BTreeMap<String, String> {
        &self.queries
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn body(&self) -> &BodySource {
        &self.body
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Record an error unless an earlier one is already pending.
    pub fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
    }

    /// Replace a plain body source.
    pub fn set_body(&mut self, body: BodySource) -> Result<()> {
        let conflict = match (&self.body, &body) {
            (BodySource::Multipart(_), _) => true,
            (BodySource::None, _) => false,
            (_, BodySource::Multipart(_)) => true,
            _ => false,
        };
        if conflict {
            return Err(Error::BodyConflict {
                current: self.body.kind(),
                requested: body.kind(),
            });
        }
        self.body = body;
        Ok(())
    }

    /// The multipart writer, created on first use.
    pub fn multipart(&mut self) -> Result<&mut MultipartWriter> {
        if self.body.is_none() {
            self.body = BodySource::Multipart(MultipartWriter::new());
        }
        match &mut self.body {
            BodySource::Multipart(writer) => Ok(writer),
            other => Err(Error::BodyConflict {
                current: other.kind(),
                requested: "multipart",
            }),
        }
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        HashMap<String, HeaderValue>,
        BTreeMap<String, String>,
        BTreeMap<String, String>,
        BodySource,
        Option<Instant>,
    ) {
        (
            self.headers,
            self.queries,
            self.cookies,
            self.body,
            self.deadline,
        )
    }

    fn write_multipart<F>(&mut self, option: &'static str, write: F)
    where
        F: FnOnce(&mut MultipartWriter) -> std::io::Result<()>,
    {
        let content_type = match self.multipart() {
            Ok(writer) => match write(&mut *writer) {
                Ok(()) => writer.content_type(),
                Err(e) => return self.fail(Error::option(option, e)),
            },
            Err(e) => return self.fail(e),
        };
        self.set_header(HEADER_CONTENT_TYPE, content_type);
    }
}

type Mutator = Box<dyn FnOnce(&mut RequestOptions) + Send>;

/// A named mutator applied to [`RequestOptions`].
pub struct RequestOption {
    name: &'static str,
    mutate: Mutator,
}

impl RequestOption {
    pub fn new<F>(name: &'static str, mutate: F) -> Self
    where
        F: FnOnce(&mut RequestOptions) + Send + 'static,
    {
        Self {
            name,
            mutate: Box::new(mutate),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run the mutator. Does nothing when an error is already pending.
    pub fn apply(self, options: &mut RequestOptions) {
        if options.error.is_none() {
            (self.mutate)(options);
        }
    }
}

impl fmt::Debug for RequestOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOption")
            .field("name", &self.name)
            .finish()
    }
}

fn collect_pairs<I, K, V, T>(entries: I) -> Vec<(String, T)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<T>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Set the call deadline.
pub fn deadline(at: Instant) -> RequestOption {
    RequestOption::new("deadline", move |o| o.deadline = Some(at))
}

/// Set the deadline to `duration` from the moment this option is applied.
///
/// A duration too large to represent as an instant clears the deadline, so
/// `timeout(Duration::MAX)` means unbounded.
pub fn timeout(duration: Duration) -> RequestOption {
    RequestOption::new("timeout", move |o| {
        o.deadline = Instant::now().checked_add(duration)
    })
}

/// Set a header; `HeaderValue::Delete` (or `None`) removes it.
pub fn header(name: impl Into<String>, value: impl Into<HeaderValue>) -> RequestOption {
    let name = name.into();
    let value = value.into();
    RequestOption::new("header", move |o| o.set_header(name, value))
}

/// Merge headers into the configured ones.
pub fn headers<I, K, V>(entries: I) -> RequestOption
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<HeaderValue>,
{
    let entries: Vec<(String, HeaderValue)> = collect_pairs(entries);
    RequestOption::new("headers", move |o| {
        for (name, value) in entries {
            o.set_header(name, value);
        }
    })
}

/// Discard every configured header, then set these.
pub fn replace_headers<I, K, V>(entries: I) -> RequestOption
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<HeaderValue>,
{
    let entries: Vec<(String, HeaderValue)> = collect_pairs(entries);
    RequestOption::new("headers", move |o| {
        o.headers.clear();
        for (name, value) in entries {
            o.set_header(name, value);
        }
    })
}

pub fn user_agent(value: impl Into<String>) -> RequestOption {
    named_header("user_agent", HEADER_USER_AGENT, value.into())
}

pub fn content_type(value: impl Into<String>) -> RequestOption {
    named_header("content_type", HEADER_CONTENT_TYPE, value.into())
}

pub fn referer(value: impl Into<String>) -> RequestOption {
    named_header("referer", HEADER_REFERER, value.into())
}

pub fn authorization(value: impl Into<String>) -> RequestOption {
    named_header("authorization", HEADER_AUTHORIZATION, value.into())
}

/// Authorization header with `Basic` credentials.
pub fn basic_auth(username: &str, password: &str) -> RequestOption {
    named_header(
        "basic_auth",
        HEADER_AUTHORIZATION,
        codec::basic_credentials(username, password),
    )
}

fn named_header(option: &'static str, name: &'static str, value: String) -> RequestOption {
    RequestOption::new(option, move |o| o.set_header(name, value))
}

pub fn cookie(name: impl Into<String>, value: impl Into<String>) -> RequestOption {
    let name = name.into();
    let value = value.into();
    RequestOption::new("cookie", move |o| {
        o.cookies.insert(name, value);
    })
}

pub fn cookies<I, K, V>(entries: I) -> RequestOption
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let entries: Vec<(String, String)> = collect_pairs(entries);
    RequestOption::new("cookies", move |o| o.cookies.extend(entries))
}

pub fn replace_cookies<I, K, V>(entries: I) -> RequestOption
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let entries: Vec<(String, String)> = collect_pairs(entries);
    RequestOption::new("cookies", move |o| {
        o.cookies = entries.into_iter().collect();
    })
}

/// Set a query parameter, replacing any value the key already has.
pub fn query(key: impl Into<String>, value: impl Into<String>) -> RequestOption {
    let key = key.into();
    let value = value.into();
    RequestOption::new("query", move |o| {
        o.queries.insert(key, value);
    })
}

pub fn queries<I, K, V>(entries: I) -> RequestOption
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let entries: Vec<(String, String)> = collect_pairs(entries);
    RequestOption::new("queries", move |o| o.queries.extend(entries))
}

pub fn replace_queries<I, K, V>(entries: I) -> RequestOption
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let entries: Vec<(String, String)> = collect_pairs(entries);
    RequestOption::new("queries", move |o| {
        o.queries = entries.into_iter().collect();
    })
}

/// Replace the configured queries with the fields of a serializable struct or map.
///
/// Strings, numbers and booleans become values; `null` fields are skipped.
/// Nested arrays or objects are rejected.
pub fn queries_from<T: Serialize + ?Sized>(value: &T) -> RequestOption {
    let flattened = flatten_queries(value);
    RequestOption::new("queries_from", move |o| match flattened {
        Ok(queries) => o.queries = queries,
        Err(message) => o.fail(Error::option("queries_from", message)),
    })
}

fn flatten_queries<T: Serialize + ?Sized>(
    value: &T,
) -> std::result::Result<BTreeMap<String, String>, String> {
    let value = serde_json::to_value(value).map_err(|e| e.to_string())?;
    let serde_json::Value::Object(fields) = value else {
        return Err("value must serialize to a map".to_string());
    };

    let mut queries = BTreeMap::new();
    for (key, field) in fields {
        let text = match field {
            serde_json::Value::Null => continue,
            serde_json::Value::String(s) => s,
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return Err(format!("value of query [{}] must be a scalar", key)),
        };
        queries.insert(key, text);
    }
    Ok(queries)
}

/// Use a reader as the request body.
pub fn body<R: Read + Send + 'static>(reader: R) -> RequestOption {
    RequestOption::new("body", move |o| {
        if let Err(e) = o.set_body(BodySource::Raw(Box::new(reader))) {
            o.fail(e);
        }
    })
}

/// Serialize `value` as a JSON body.
pub fn json<T: Serialize + ?Sized>(value: &T) -> RequestOption {
    let encoded = codec::encode_json(value);
    RequestOption::new("json", move |o| {
        let bytes = match encoded {
            Ok(bytes) => bytes,
            Err(e) => return o.fail(Error::option("json", e)),
        };
        match o.set_body(BodySource::Json(bytes)) {
            Ok(()) => o.set_header(HEADER_CONTENT_TYPE, CONTENT_TYPE_JSON),
            Err(e) => o.fail(e),
        }
    })
}

/// Encode pairs as an urlencoded form body.
pub fn form<I, K, V>(entries: I) -> RequestOption
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let pairs: BTreeMap<String, String> = entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    let encoded = codec::encode_form(&pairs);
    RequestOption::new("form", move |o| match o.set_body(BodySource::Form(encoded)) {
        Ok(()) => o.set_header(HEADER_CONTENT_TYPE, CONTENT_TYPE_FORM),
        Err(e) => o.fail(e),
    })
}

/// Add the file at `path` as a multipart file part.
///
/// The part's file name is the path's final component.
pub fn file(field_name: impl Into<String>, path: impl AsRef<Path>) -> RequestOption {
    let field_name = field_name.into();
    let path = path.as_ref().to_path_buf();
    RequestOption::new("file", move |o| {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => return o.fail(Error::option("file", e)),
        };
        o.write_multipart("file", |writer| {
            writer
                .write_file(&field_name, &file_name, &mut file)
                .map(|_| ())
        });
    })
}

/// Add a multipart file part read from an already open handle.
pub fn file_reader<R>(
    field_name: impl Into<String>,
    file_name: impl Into<String>,
    mut reader: R,
) -> RequestOption
where
    R: Read + Send + 'static,
{
    let field_name = field_name.into();
    let file_name = file_name.into();
    RequestOption::new("file", move |o| {
        o.write_multipart("file", |writer| {
            writer
                .write_file(&field_name, &file_name, &mut reader)
                .map(|_| ())
        });
    })
}

pub fn multipart_field_string(
    field_name: impl Into<String>,
    value: impl Into<String>,
) -> RequestOption {
    let field_name = field_name.into();
    let value = value.into();
    RequestOption::new("multipart_field_string", move |o| {
        o.write_multipart("multipart_field_string", |writer| {
            writer.write_field(&field_name, &value)
        });
    })
}

pub fn multipart_field<R>(field_name: impl Into<String>, mut reader: R) -> RequestOption
where
    R: Read + Send + 'static,
{
    let field_name = field_name.into();
    RequestOption::new("multipart_field", move |o| {
        o.write_multipart("multipart_field", |writer| {
            writer
                .write_stream_field(&field_name, &mut reader)
                .map(|_| ())
        });
    })
}

pub fn multipart_field_bytes(
    field_name: impl Into<String>,
    content: impl Into<Vec<u8>>,
) -> RequestOption {
    let field_name = field_name.into();
    let content = content.into();
    RequestOption::new("multipart_field_bytes", move |o| {
        o.write_multipart("multipart_field_bytes", |writer| {
            writer
                .write_stream_field(&field_name, &mut content.as_slice())
                .map(|_| ())
        });
    })
}

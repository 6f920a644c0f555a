//! # structfs-requests
//!
//! Composable request options and blocking HTTP sessions.
//!
//! Callers describe a request as an ordered list of [`RequestOption`]s.
//! The options are applied to a fresh [`RequestOptions`] accumulator, the
//! result is assembled into an immutable [`Request`], and a [`Session`]
//! hands it to its [`HttpExecutor`]. The reply comes back as a [`Response`]
//! whose body can be decoded once.
//!
//! ```ignore
//! use structfs_requests::{get, header, query, timeout};
//!
//! let mut response = get(
//!     "https://api.example.com/search",
//!     [
//!         query("q", "structfs"),
//!         header("Accept", "application/json"),
//!         timeout(Duration::from_secs(5)),
//!     ],
//! )?;
//! let results: Vec<Hit> = response.json()?;
//! ```
//!
//! ## Ordering
//!
//! Options run in the order given. Later writes to the same header, query or
//! cookie key win, and the `replace_*` variants discard everything configured
//! before them. The first option that fails stops the chain; its error is
//! returned and no request is assembled.
//!
//! ## Bodies
//!
//! A request has at most one body source: a raw reader ([`body`]), JSON
//! ([`json`]), an urlencoded form ([`form`]) or a multipart form built up by
//! [`file`], [`multipart_field_string`], [`multipart_field`] and
//! [`multipart_field_bytes`]. Plain sources replace each other; mixing a plain
//! source with a multipart one is an [`Error::BodyConflict`].

pub mod codec;
pub mod error;
pub mod executor;
pub mod header;
pub mod method;
pub mod options;
pub mod request;
pub mod response;
pub mod session;

// Re-export main types
pub use error::{Error, Result};
pub use executor::{ExecutorConfig, HttpExecutor, RawResponse, ReqwestExecutor};
pub use header::{
    HeaderValue, CONTENT_TYPE_FORM, CONTENT_TYPE_JSON, CONTENT_TYPE_MULTIPART,
    HEADER_AUTHORIZATION, HEADER_CONTENT_TYPE, HEADER_REFERER, HEADER_USER_AGENT,
};
pub use method::Method;
pub use options::{
    authorization, basic_auth, body, content_type, cookie, cookies, deadline, file, file_reader,
    form, header, headers, json, multipart_field, multipart_field_bytes, multipart_field_string,
    queries, queries_from, query, referer, replace_cookies, replace_headers, replace_queries,
    timeout, user_agent, BodySource, RequestOption, RequestOptions,
};
pub use request::{build_request, Body, Request};
pub use response::Response;
pub use session::{
    connect, default_session, delete, get, head, options, patch, post, put, trace, Session,
};

//! Transport abstraction.
//!
//! A [`crate::Session`] never talks to the network itself; it hands each
//! assembled [`Request`] to an [`HttpExecutor`]. The production executor wraps
//! a blocking reqwest client; tests substitute a mock.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::redirect::Policy;

use crate::error::{Error, Result};
use crate::request::{Body, Request};

/// The raw reply produced by a transport.
///
/// The body is a single-use stream owned by whoever holds the response.
pub type RawResponse = http::Response<Box<dyn std::io::Read + Send>>;

/// Trait for executing HTTP requests.
///
/// Implementations must give up once the request's deadline passes and report
/// that as [`Error::DeadlineExceeded`]. Sharing one executor between threads
/// is only as safe as its `Send + Sync` implementation makes it.
pub trait HttpExecutor: Send + Sync {
    fn execute(&self, request: Request) -> Result<RawResponse>;
}

/// Settings for the production executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound for every call, independent of per-request deadlines
    pub timeout: Option<Duration>,

    pub connect_timeout: Option<Duration>,

    /// Sent when a request does not set its own User-Agent
    pub user_agent: Option<String>,

    /// Maximum redirects to follow; zero disables redirects
    pub max_redirects: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: None,
            user_agent: None,
            max_redirects: 10,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Leave calls without a deadline unbounded.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }
}

/// Production HTTP executor using reqwest.
pub struct ReqwestExecutor {
    client: Client,
}

impl ReqwestExecutor {
    /// Create a new executor with the given timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::from_config(ExecutorConfig::new().timeout(timeout))
    }

    /// Create with default timeout of 30 seconds.
    pub fn with_default_timeout() -> Result<Self> {
        Self::from_config(ExecutorConfig::default())
    }

    pub fn from_config(config: ExecutorConfig) -> Result<Self> {
        let mut builder = Client::builder();
        // reqwest's blocking client defaults to 30s; None must mean unbounded.
        builder = builder.timeout(config.timeout);
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent);
        }
        builder = if config.max_redirects == 0 {
            builder.redirect(Policy::none())
        } else {
            builder.redirect(Policy::limited(config.max_redirects))
        };

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Use a caller-built client as-is.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl HttpExecutor for ReqwestExecutor {
    fn execute(&self, request: Request) -> Result<RawResponse> {
        let remaining = request.remaining();
        if remaining == Some(Duration::ZERO) {
            return Err(Error::DeadlineExceeded);
        }

        let parts = request.into_parts();
        let mut req_builder = self
            .client
            .request(parts.method.into(), parts.url)
            .headers(parts.headers);

        if let Some(remaining) = remaining {
            req_builder = req_builder.timeout(remaining);
        }

        req_builder = match parts.body {
            Body::Empty => req_builder,
            Body::Bytes(bytes) => req_builder.body(bytes),
            Body::Reader(reader) => req_builder.body(reqwest::blocking::Body::new(reader)),
        };

        let response = req_builder.send().map_err(|e| {
            if remaining.is_some() && e.is_timeout() {
                Error::DeadlineExceeded
            } else {
                Error::Transport(e)
            }
        })?;

        let mut builder = http::Response::builder()
            .status(response.status())
            .version(response.version());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(
                response
                    .headers()
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone())),
            );
        }

        let body: Box<dyn std::io::Read + Send> = Box::new(response);
        builder.body(body).map_err(|e| Error::TransportFailure {
            message: e.to_string(),
        })
    }
}

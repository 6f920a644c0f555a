//! Sessions dispatch assembled requests through an [`HttpExecutor`].

use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};
use crate::executor::{ExecutorConfig, HttpExecutor, ReqwestExecutor};
use crate::method::Method;
use crate::options::RequestOption;
use crate::request::{build_request, Request};
use crate::response::Response;

/// A reusable execution context.
///
/// Each call assembles its own request, so a session can be cloned and shared
/// across threads freely; the executor is the only shared state.
///
/// # Example
///
/// ```ignore
/// use structfs_requests::{json, timeout, Session};
///
/// let session = Session::with_default_timeout()?;
/// let mut response = session.post(
///     "https://api.example.com/users",
///     [json(&new_user), timeout(Duration::from_secs(5))],
/// )?;
/// let created: User = response.json()?;
/// ```
#[derive(Clone)]
pub struct Session {
    executor: Arc<dyn HttpExecutor>,
}

impl Session {
    pub fn new(executor: impl HttpExecutor + 'static) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    pub fn from_executor(executor: Arc<dyn HttpExecutor>) -> Self {
        Self { executor }
    }

    /// Session over a reqwest executor with a 30 second timeout.
    pub fn with_default_timeout() -> Result<Self> {
        Ok(Self::new(ReqwestExecutor::with_default_timeout()?))
    }

    /// Send an already assembled request.
    pub fn execute(&self, request: Request) -> Result<Response> {
        if request.is_expired() {
            log::debug!("{} {} not sent: deadline passed", request.method(), request.url());
            return Err(Error::DeadlineExceeded);
        }

        let method = request.method();
        let url = request.url().to_string();
        log::debug!("dispatching {} {}", method, url);

        let raw = self.executor.execute(request)?;
        log::debug!("{} {} -> {}", method, url, raw.status());
        Ok(Response::new(raw))
    }

    /// Assemble a request from `options` and send it.
    pub fn dispatch(
        &self,
        method: Method,
        url: &str,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response> {
        let request = build_request(method, url, options)?;
        self.execute(request)
    }

    pub fn get(
        &self,
        url: &str,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response> {
        self.dispatch(Method::GET, url, options)
    }

    pub fn head(
        &self,
        url: &str,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response> {
        self.dispatch(Method::HEAD, url, options)
    }

    pub fn post(
        &self,
        url: &str,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response> {
        self.dispatch(Method::POST, url, options)
    }

    pub fn put(
        &self,
        url: &str,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response> {
        self.dispatch(Method::PUT, url, options)
    }

    pub fn patch(
        &self,
        url: &str,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response> {
        self.dispatch(Method::PATCH, url, options)
    }

    pub fn delete(
        &self,
        url: &str,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response> {
        self.dispatch(Method::DELETE, url, options)
    }

    pub fn connect(
        &self,
        url: &str,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response> {
        self.dispatch(Method::CONNECT, url, options)
    }

    pub fn options(
        &self,
        url: &str,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response> {
        self.dispatch(Method::OPTIONS, url, options)
    }

    pub fn trace(
        &self,
        url: &str,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response> {
        self.dispatch(Method::TRACE, url, options)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

static DEFAULT_SESSION: OnceLock<Session> = OnceLock::new();

/// The process-wide session used by the top-level verb functions.
///
/// Created on first use over a reqwest executor with no overall timeout, so
/// calls are bounded only by their own deadline. Later calls return the same
/// instance.
pub fn default_session() -> Result<&'static Session> {
    if let Some(session) = DEFAULT_SESSION.get() {
        return Ok(session);
    }
    let executor = ReqwestExecutor::from_config(ExecutorConfig::new().no_timeout())?;
    Ok(DEFAULT_SESSION.get_or_init(|| Session::new(executor)))
}

pub fn get(url: &str, options: impl IntoIterator<Item = RequestOption>) -> Result<Response> {
    default_session()?.get(url, options)
}

pub fn head(url: &str, options: impl IntoIterator<Item = RequestOption>) -> Result<Response> {
    default_session()?.head(url, options)
}

pub fn post(url: &str, options: impl IntoIterator<Item = RequestOption>) -> Result<Response> {
    default_session()?.post(url, options)
}

pub fn put(url: &str, options: impl IntoIterator<Item = RequestOption>) -> Result<Response> {
    default_session()?.put(url, options)
}

pub fn patch(url: &str, options: impl IntoIterator<Item = RequestOption>) -> Result<Response> {
    default_session()?.patch(url, options)
}

pub fn delete(url: &str, options: impl IntoIterator<Item = RequestOption>) -> Result<Response> {
    default_session()?.delete(url, options)
}

pub fn connect(url: &str, options: impl IntoIterator<Item = RequestOption>) -> Result<Response> {
    default_session()?.connect(url, options)
}

pub fn options(url: &str, options: impl IntoIterator<Item = RequestOption>) -> Result<Response> {
    default_session()?.options(url, options)
}

pub fn trace(url: &str, options: impl IntoIterator<Item = RequestOption>) -> Result<Response> {
    default_session()?.trace(url, options)
}

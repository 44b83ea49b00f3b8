//! Application hooks the server consults while handling a request.
//!
//! Every hook is optional. The synchronous ones are implemented for plain
//! closures; [`RequestNotify`] is async and gets the whole [`Exchange`].

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use crate::auth::AuthDecision;
use crate::error::Result;
use crate::http::connection::Exchange;
use crate::http::mime::MimeMap;
use crate::http::request::Method;
use crate::http::response::HttpDate;
use crate::transport::Transport;

/// What the server does after a request-notify handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Fall through to the built-in handling of the method.
    Continue,
    /// The handler sent the whole response.
    Completed,
    /// Drop the request without a response.
    Aborted,
}

pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = Result<NotifyOutcome>> + 'a>>;

/// Decides whether a resource needs authentication, and with which credentials.
pub trait AuthenticationCheck {
    fn check(&self, method: Method, resource: &str) -> AuthDecision;
}

impl<F> AuthenticationCheck for F
where
    F: Fn(Method, &str) -> AuthDecision,
{
    fn check(&self, method: Method, resource: &str) -> AuthDecision {
        self(method, resource)
    }
}

/// Called for every authenticated request before the built-in handling.
///
/// The handler reads the request and may answer it through the exchange.
///
/// ```ignore
/// struct Status;
///
/// impl<T: Transport> RequestNotify<T> for Status {
///     fn notify<'a>(&'a self, exchange: &'a mut Exchange<'_, T>, _method: Method) -> NotifyFuture<'a> {
///         Box::pin(async move {
///             if exchange.resource() != "/status" {
///                 return Ok(NotifyOutcome::Continue);
///             }
///             exchange.send_response("200 OK", "up", None).await?;
///             Ok(NotifyOutcome::Completed)
///         })
///     }
/// }
/// ```
pub trait RequestNotify<T: Transport> {
    fn notify<'a>(&'a self, exchange: &'a mut Exchange<'_, T>, method: Method) -> NotifyFuture<'a>;
}

/// Told about a request whose credentials were rejected.
pub trait InvalidCredentialsNotify {
    fn notify(&self, method: Method, resource: &str, peer: SocketAddr);
}

impl<F> InvalidCredentialsNotify for F
where
    F: Fn(Method, &str, SocketAddr),
{
    fn notify(&self, method: Method, resource: &str, peer: SocketAddr) {
        self(method, resource, peer)
    }
}

/// Inputs of an otherwise valid Digest response, for an extra policy check.
#[derive(Debug, Clone, Copy)]
pub struct DigestCheckParams<'a> {
    pub name: &'a str,
    pub realm: &'a str,
    pub password: &'a str,
    pub method: Method,
    pub uri: &'a str,
    pub nc: &'a str,
    pub cnonce: &'a str,
}

/// May veto a Digest response that matched; a veto re-challenges.
pub trait DigestCheck {
    fn check(&self, params: &DigestCheckParams<'_>) -> bool;
}

impl<F> DigestCheck for F
where
    F: Fn(&DigestCheckParams<'_>) -> bool,
{
    fn check(&self, params: &DigestCheckParams<'_>) -> bool {
        self(params)
    }
}

/// Source of the `Date` header.
pub trait GmtClock {
    fn now(&self) -> HttpDate;
}

impl<F> GmtClock for F
where
    F: Fn() -> HttpDate,
{
    fn now(&self) -> HttpDate {
        self()
    }
}

/// Caching metadata for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    /// Seconds, sent as `Cache-Control: max-age`
    pub max_age: u32,
    pub last_modified: HttpDate,
}

pub trait CacheInfo {
    fn cache_info(&self, resource: &str) -> Option<CacheEntry>;
}

impl<F> CacheInfo for F
where
    F: Fn(&str) -> Option<CacheEntry>,
{
    fn cache_info(&self, resource: &str) -> Option<CacheEntry> {
        self(resource)
    }
}

/// The hooks registered on one server.
pub struct Callbacks<T: Transport> {
    pub(crate) authentication_check: Option<Box<dyn AuthenticationCheck>>,
    pub(crate) request_notify: Option<Box<dyn RequestNotify<T>>>,
    pub(crate) invalid_credentials: Option<Box<dyn InvalidCredentialsNotify>>,
    pub(crate) digest_check: Option<Box<dyn DigestCheck>>,
    pub(crate) gmt: Option<Box<dyn GmtClock>>,
    pub(crate) cache: Option<Box<dyn CacheInfo>>,
    pub(crate) mime_maps: Vec<MimeMap>,
}

impl<T: Transport> Default for Callbacks<T> {
    fn default() -> Self {
        Self {
            authentication_check: None,
            request_notify: None,
            invalid_credentials: None,
            digest_check: None,
            gmt: None,
            cache: None,
            mime_maps: Vec::new(),
        }
    }
}

impl<T: Transport> fmt::Debug for Callbacks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("authentication_check", &self.authentication_check.is_some())
            .field("request_notify", &self.request_notify.is_some())
            .field("invalid_credentials", &self.invalid_credentials.is_some())
            .field("digest_check", &self.digest_check.is_some())
            .field("gmt", &self.gmt.is_some())
            .field("cache", &self.cache.is_some())
            .field("mime_maps", &self.mime_maps)
            .finish()
    }
}

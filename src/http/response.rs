use std::fmt;

use crate::error::{HttpError, Result};
use crate::http::request::Method;
use crate::http::segment::{SegmentChain, SegmentPool};
use crate::server::callbacks::{CacheInfo, GmtClock};

pub const HTTP_VERSION: &str = "HTTP/1.0";

/// HTTP status codes the server and its notify handlers send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 201 Created
    Created,
    /// 204 No Content
    NoContent,
    /// 304 Not Modified
    NotModified,
    /// 400 Bad Request
    BadRequest,
    /// 401 Unauthorized
    Unauthorized,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 408 Request Time-out
    RequestTimeout,
    /// 500 Internal Server Error
    InternalServerError,
    /// 501 Not Implemented
    NotImplemented,
    /// 503 Service Unavailable
    ServiceUnavailable,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use tinyhttpd::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotImplemented.as_u16(), 501);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NoContent => 204,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::RequestTimeout => 408,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    /// Status text as it appears on the status line, e.g. `"404 Not Found"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Ok => "200 OK",
            StatusCode::Created => "201 Created",
            StatusCode::NoContent => "204 No Content",
            StatusCode::NotModified => "304 Not Modified",
            StatusCode::BadRequest => "400 Bad Request",
            StatusCode::Unauthorized => "401 Unauthorized",
            StatusCode::Forbidden => "403 Forbidden",
            StatusCode::NotFound => "404 Not Found",
            StatusCode::MethodNotAllowed => "405 Method Not Allowed",
            StatusCode::RequestTimeout => "408 Request Time-out",
            StatusCode::InternalServerError => "500 Internal Server Error",
            StatusCode::NotImplemented => "501 Not Implemented",
            StatusCode::ServiceUnavailable => "503 Service Unavailable",
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        &self.as_str()[4..]
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar date in GMT as supplied by the clock and cache-info callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpDate {
    pub year: u16,
    /// 1..=12
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// 0 = Sunday
    pub weekday: u8,
}

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

impl fmt::Display for HttpDate {
    /// RFC 1123 form: `Sun, 06 Nov 1994 08:49:37 GMT`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let weekday = WEEKDAYS[usize::from(self.weekday % 7)];
        let month = MONTHS[usize::from(self.month.clamp(1, 12) - 1)];
        write!(
            f,
            "{weekday}, {:02} {month} {:04} {:02}:{:02}:{:02} GMT",
            self.day, self.year, self.hour, self.minute, self.second
        )
    }
}

/// Server-side collaborators consulted while generating a header.
#[derive(Clone, Copy, Default)]
pub struct HeaderContext<'a> {
    pub gmt: Option<&'a dyn GmtClock>,
    pub cache: Option<&'a dyn CacheInfo>,
    pub method: Option<Method>,
    pub resource: &'a str,
}

impl fmt::Debug for HeaderContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderContext")
            .field("gmt", &self.gmt.is_some())
            .field("cache", &self.cache.is_some())
            .field("method", &self.method)
            .field("resource", &self.resource)
            .finish()
    }
}

/// Builder for a response status line and header block.
///
/// # Example
///
/// ```
/// # use tinyhttpd::http::response::{HeaderContext, ResponseHeader, StatusCode};
/// let text = ResponseHeader::new(StatusCode::Ok.as_str())
///     .content_type("text/html")
///     .content_length(5)
///     .render(&HeaderContext::default());
/// assert!(text.starts_with("HTTP/1.0 200 OK\r\n"));
/// assert!(text.ends_with("Content-Length: 5\r\n\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct ResponseHeader<'a> {
    status: &'a str,
    content_type: Option<&'a str>,
    content_length: u64,
    additional: Option<&'a str>,
}

impl<'a> ResponseHeader<'a> {
    pub fn new(status: &'a str) -> Self {
        Self {
            status,
            content_type: None,
            content_length: 0,
            additional: None,
        }
    }

    pub fn content_type(mut self, content_type: &'a str) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn content_length(mut self, length: u64) -> Self {
        self.content_length = length;
        self
    }

    /// Raw header lines appended verbatim; each line must end with CRLF.
    pub fn additional(mut self, header: &'a str) -> Self {
        self.additional = Some(header);
        self
    }

    fn is_status(&self, code: StatusCode) -> bool {
        self.status.starts_with(&code.as_str()[..3])
    }

    pub fn render(&self, ctx: &HeaderContext<'_>) -> String {
        Rendered { header: self, ctx }.to_string()
    }

    fn write_to(&self, out: &mut impl fmt::Write, ctx: &HeaderContext<'_>) -> fmt::Result {
        write!(out, "{HTTP_VERSION} {}\r\n", self.status)?;

        if let Some(content_type) = self.content_type {
            write!(out, "Content-Type: {content_type}\r\n")?;
        }

        out.write_str("Connection: Close\r\n")?;
        if self.content_length > 0 || self.is_status(StatusCode::NotModified) {
            write!(out, "Content-Length: {}\r\n", self.content_length)?;
        }

        if let Some(clock) = ctx.gmt {
            write!(out, "Date: {}\r\n", clock.now())?;
        }

        let cacheable = self.is_status(StatusCode::Ok) || self.is_status(StatusCode::NotModified);
        if let (Some(cache), Some(Method::GET), true) = (ctx.cache, ctx.method, cacheable) {
            if let Some(entry) = cache.cache_info(ctx.resource) {
                write!(out, "Cache-Control: max-age={}\r\n", entry.max_age)?;
                write!(out, "Last-Modified: {}\r\n", entry.last_modified)?;
            }
        }

        if let Some(additional) = self.additional {
            out.write_str(additional)?;
        }

        out.write_str("\r\n")
    }

    /// Renders the header into segments taken from `pool`.
    pub fn into_segments(&self, pool: &SegmentPool, ctx: &HeaderContext<'_>) -> Result<SegmentChain> {
        pool.chain_from(self.render(ctx).as_bytes())
    }
}

struct Rendered<'h, 'a, 'c> {
    header: &'h ResponseHeader<'a>,
    ctx: &'h HeaderContext<'c>,
}

impl fmt::Display for Rendered<'_, '_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.header.write_to(f, self.ctx)
    }
}

/// Re-validates a caller-declared length against the actual text.
pub fn checked_text(text: &str, declared_len: usize) -> Result<&str> {
    if text.len() != declared_len {
        return Err(HttpError::Protocol("declared length does not match text"));
    }
    Ok(text)
}

use std::fmt;

use memchr::{memchr, memchr2, memmem};

use crate::error::{HttpError, Result};
use crate::http::segment::SegmentChain;

/// HTTP request methods understood by the server.
///
/// Anything else on the request line is classified as unknown and
/// answered with 501 Not Implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Submit data, usually consumed by a request-notify handler
    POST,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// PUT - Store the request body under the resource name
    PUT,
    /// DELETE - Remove a resource
    DELETE,
}

impl Method {
    /// Classifies a request line by its literal, case-sensitive prefix.
    ///
    /// # Example
    ///
    /// ```
    /// # use tinyhttpd::http::request::Method;
    /// assert_eq!(Method::from_request_line(b"GET / HTTP/1.0"), Some(Method::GET));
    /// assert_eq!(Method::from_request_line(b"get / HTTP/1.0"), None);
    /// ```
    pub fn from_request_line(line: &[u8]) -> Option<Self> {
        const PREFIXES: [(&[u8], Method); 5] = [
            (b"GET ", Method::GET),
            (b"PUT ", Method::PUT),
            (b"POST ", Method::POST),
            (b"HEAD ", Method::HEAD),
            (b"DELETE ", Method::DELETE),
        ];

        PREFIXES
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix))
            .map(|(_, method)| *method)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::HEAD => "HEAD",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request as assembled from the wire.
///
/// `head` is a contiguous copy of the request line and headers including the
/// terminating empty line. `chain` is the whole logical stream received so
/// far: the head followed by whatever content bytes arrived with it.
#[derive(Debug)]
pub struct Request {
    /// `None` for methods the server does not implement
    pub method: Option<Method>,
    head: Vec<u8>,
    chain: SegmentChain,
    content_offset: usize,
}

impl Request {
    /// Wraps an assembled chain whose head ends at `content_offset`.
    pub fn new(chain: SegmentChain, content_offset: usize) -> Self {
        let head = chain.to_vec(0, content_offset);
        Self {
            method: Method::from_request_line(&head),
            head,
            chain,
            content_offset,
        }
    }

    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub fn chain(&self) -> &SegmentChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut SegmentChain {
        &mut self.chain
    }

    /// Byte offset from the start of the head to the first content byte.
    pub fn content_offset(&self) -> usize {
        self.content_offset
    }

    /// Content bytes already present in the chain.
    pub fn content_received(&self) -> usize {
        self.chain.len().saturating_sub(self.content_offset)
    }

    pub fn resource(&self, max_size: usize) -> Result<String> {
        retrieve_resource(&self.head, max_size)
    }

    pub fn param(&self, index: usize, max_size: usize) -> Result<String> {
        param_get(&self.head, index, max_size)
    }

    pub fn query(&self, index: usize, max_size: usize) -> Result<String> {
        query_get(&self.head, index, max_size)
    }

    /// Looks up a header value (case-insensitive name).
    pub fn header(&self, name: &str, max_size: usize) -> Result<String> {
        field_value(&self.head, name, max_size)
    }

    /// Content-Length, 0 when absent or malformed.
    pub fn content_length(&self) -> u64 {
        content_length(&self.head)
    }

    /// Content-Length, distinguishing a malformed value from an absent one.
    pub fn content_length_checked(&self) -> Result<u64> {
        content_length_checked(&self.head)
    }
}

fn line_end(head: &[u8]) -> usize {
    memchr2(b'\r', b'\n', head).unwrap_or(head.len())
}

/// The request target: from after the first space to the next space or CR.
fn request_target(head: &[u8]) -> Result<&[u8]> {
    let line = &head[..line_end(head)];
    let space = memchr(b' ', line).ok_or(HttpError::Protocol("missing request target"))?;
    let rest = &line[space + 1..];
    let start = rest.iter().position(|&b| b != b' ').unwrap_or(rest.len());
    let rest = &rest[start..];
    let end = memchr(b' ', rest).unwrap_or(rest.len());
    Ok(&rest[..end])
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Extracts and percent-decodes the resource path of the request line.
///
/// Accepts `/path` or an absolute `http://host/path` target and stops at a
/// space, `;` or `?`. The decoded path may not exceed `max_size` bytes.
pub fn retrieve_resource(head: &[u8], max_size: usize) -> Result<String> {
    let target = request_target(head)?;

    let path = if target.first() == Some(&b'/') {
        target
    } else if target.len() >= 7 && target[..7].eq_ignore_ascii_case(b"http://") {
        let authority = &target[7..];
        let slash = memchr(b'/', authority).ok_or(HttpError::Protocol("absolute URI without path"))?;
        &authority[slash..]
    } else {
        return Err(HttpError::Protocol("request target must start with '/'"));
    };

    let mut decoded = Vec::with_capacity(path.len().min(max_size));
    let mut i = 0;
    while i < path.len() {
        let byte = path[i];
        if byte == b';' || byte == b'?' {
            break;
        }

        if byte == b'%' {
            let hi = path.get(i + 1).copied().and_then(hex_value);
            let lo = path.get(i + 2).copied().and_then(hex_value);
            match (hi, lo) {
                (Some(hi), Some(lo)) => decoded.push((hi << 4) | lo),
                _ => return Err(HttpError::Protocol("malformed percent escape")),
            }
            i += 3;
        } else {
            decoded.push(byte);
            i += 1;
        }

        if decoded.len() > max_size {
            return Err(HttpError::Protocol("resource exceeds buffer"));
        }
    }

    if decoded.contains(&0) {
        return Err(HttpError::Protocol("resource contains NUL"));
    }
    String::from_utf8(decoded).map_err(|_| HttpError::Protocol("resource is not UTF-8"))
}

const TOKEN_TERMINATORS: &[u8] = b";?& \r";

/// Copies the token that starts right after `target[start]`.
fn token_after(head: &[u8], target: &[u8], start: usize, max_size: usize) -> Result<String> {
    let rest = &target[start + 1..];
    let len = match rest.iter().position(|b| TOKEN_TERMINATORS.contains(b)) {
        Some(len) => len,
        // the target ends at a space or CR unless the head was cut short
        None if line_end(head) < head.len() => rest.len(),
        None => return Err(HttpError::ImproperlyTerminated),
    };
    if len > max_size {
        return Err(HttpError::BufferTooSmall);
    }
    String::from_utf8(rest[..len].to_vec()).map_err(|_| HttpError::Protocol("parameter is not UTF-8"))
}

/// Returns the `index`-th (zero based) `;`-delimited parameter of the target.
pub fn param_get(head: &[u8], index: usize, max_size: usize) -> Result<String> {
    let target = request_target(head)?;
    let start = target
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b';')
        .map(|(i, _)| i)
        .nth(index)
        .ok_or(HttpError::NotFound)?;
    token_after(head, target, start, max_size)
}

/// Returns the `index`-th (zero based) `?`/`&`-delimited query token.
pub fn query_get(head: &[u8], index: usize, max_size: usize) -> Result<String> {
    let target = request_target(head)?;
    let query = memchr(b'?', target).ok_or(HttpError::NotFound)?;
    let start = std::iter::once(query)
        .chain(
            target[query + 1..]
                .iter()
                .enumerate()
                .filter(|(_, b)| **b == b'&')
                .map(|(i, _)| query + 1 + i),
        )
        .nth(index)
        .ok_or(HttpError::NotFound)?;
    token_after(head, target, start, max_size)
}

/// Case-insensitive header lookup returning the trimmed value.
///
/// A value longer than `max_size` is reported as [`HttpError::NotFound`].
pub fn field_value(head: &[u8], name: &str, max_size: usize) -> Result<String> {
    let name = name.as_bytes();
    let headers = &head[line_end(head)..];

    for line in headers.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.len() <= name.len()
            || !line[..name.len()].eq_ignore_ascii_case(name)
            || line[name.len()] != b':'
        {
            continue;
        }

        let value = line[name.len() + 1..].trim_ascii();
        if value.len() > max_size {
            return Err(HttpError::NotFound);
        }
        return String::from_utf8(value.to_vec()).map_err(|_| HttpError::NotFound);
    }

    Err(HttpError::NotFound)
}

/// Content-Length value, or 0 when absent or malformed.
pub fn content_length(head: &[u8]) -> u64 {
    content_length_checked(head).unwrap_or(0)
}

/// Content-Length value; absent means 0, a malformed value is a protocol error.
pub fn content_length_checked(head: &[u8]) -> Result<u64> {
    let value = match field_value(head, "Content-Length", 20) {
        Ok(value) => value,
        Err(HttpError::NotFound) if !has_field(head, "Content-Length") => return Ok(0),
        Err(_) => return Err(HttpError::Protocol("invalid Content-Length")),
    };

    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HttpError::Protocol("invalid Content-Length"));
    }
    value
        .parse()
        .map_err(|_| HttpError::Protocol("invalid Content-Length"))
}

fn has_field(head: &[u8], name: &str) -> bool {
    field_value(head, name, usize::MAX).is_ok()
}

/// Distance from the start of the head to the first content byte, or 0 if
/// the head terminator is not present.
pub fn content_offset(head: &[u8]) -> usize {
    memmem::find(head, b"\r\n\r\n").map(|i| i + 4).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_decodes_percent_escapes() {
        let head = b"GET /a%20b%2Fc.txt HTTP/1.0\r\n\r\n";
        assert_eq!(retrieve_resource(head, 40).unwrap(), "/a b/c.txt");
    }

    #[test]
    fn resource_rejects_bad_escape() {
        let head = b"GET /a%2g HTTP/1.0\r\n\r\n";
        assert!(matches!(
            retrieve_resource(head, 40),
            Err(HttpError::Protocol(_))
        ));
        let head = b"GET /a%2 HTTP/1.0\r\n\r\n";
        assert!(matches!(
            retrieve_resource(head, 40),
            Err(HttpError::Protocol(_))
        ));
    }

    #[test]
    fn resource_stops_at_query_and_params() {
        assert_eq!(
            retrieve_resource(b"GET /x.cgi?a=1 HTTP/1.0\r\n\r\n", 40).unwrap(),
            "/x.cgi"
        );
        assert_eq!(
            retrieve_resource(b"GET /x;p HTTP/1.0\r\n\r\n", 40).unwrap(),
            "/x"
        );
    }

    #[test]
    fn resource_accepts_absolute_uri() {
        let head = b"GET http://example.com/index.html HTTP/1.0\r\n\r\n";
        assert_eq!(retrieve_resource(head, 40).unwrap(), "/index.html");
    }

    #[test]
    fn resource_capacity_is_enforced() {
        let head = b"GET /abcdef HTTP/1.0\r\n\r\n";
        assert!(retrieve_resource(head, 7).is_ok());
        assert!(retrieve_resource(head, 6).is_err());
    }

    #[test]
    fn resource_requires_slash() {
        assert!(retrieve_resource(b"GET index.html HTTP/1.0\r\n\r\n", 40).is_err());
        assert!(retrieve_resource(b"GET\r\n\r\n", 40).is_err());
    }

    #[test]
    fn params_and_queries() {
        let head = b"GET /cgi;first;second?a=1&b=2 HTTP/1.0\r\n\r\n";
        assert_eq!(param_get(head, 0, 20).unwrap(), "first");
        assert_eq!(param_get(head, 1, 20).unwrap(), "second");
        assert!(matches!(param_get(head, 2, 20), Err(HttpError::NotFound)));

        assert_eq!(query_get(head, 0, 20).unwrap(), "a=1");
        assert_eq!(query_get(head, 1, 20).unwrap(), "b=2");
        assert!(matches!(query_get(head, 2, 20), Err(HttpError::NotFound)));
        assert!(matches!(query_get(head, 0, 2), Err(HttpError::BufferTooSmall)));
    }

    #[test]
    fn unterminated_parameter() {
        assert!(matches!(
            param_get(b"GET /cgi;first", 0, 20),
            Err(HttpError::ImproperlyTerminated)
        ));
    }

    #[test]
    fn field_value_is_case_insensitive() {
        let head = b"GET / HTTP/1.0\r\ncontent-type:  text/plain \r\nX-A: 1\r\n\r\n";
        assert_eq!(field_value(head, "Content-Type", 64).unwrap(), "text/plain");
        assert_eq!(field_value(head, "x-a", 64).unwrap(), "1");
        assert!(matches!(field_value(head, "Missing", 64), Err(HttpError::NotFound)));
        assert!(matches!(field_value(head, "Content-Type", 4), Err(HttpError::NotFound)));
    }

    #[test]
    fn content_length_variants() {
        assert_eq!(content_length(b"PUT / HTTP/1.0\r\nContent-Length: 12\r\n\r\n"), 12);
        assert_eq!(content_length(b"PUT / HTTP/1.0\r\n\r\n"), 0);
        assert_eq!(content_length_checked(b"PUT / HTTP/1.0\r\n\r\n").unwrap(), 0);
        assert!(matches!(
            content_length_checked(b"PUT / HTTP/1.0\r\nContent-Length: 1x\r\n\r\n"),
            Err(HttpError::Protocol(_))
        ));
        assert_eq!(content_length(b"PUT / HTTP/1.0\r\nContent-Length: 1x\r\n\r\n"), 0);
    }

    #[test]
    fn request_line_ends_at_bare_newline() {
        let head = b"GET  /status HTTP/1.0\nHost: x\n\n";
        assert_eq!(retrieve_resource(head, 40).unwrap(), "/status");
        assert_eq!(line_end(head), 21);
        assert!(matches!(retrieve_resource(b"GET\r\n\r\n", 40), Err(HttpError::Protocol(_))));
    }

    #[test]
    fn content_offset_points_past_empty_line() {
        let head = b"PUT /f HTTP/1.0\r\nContent-Length: 3\r\n\r\nabc";
        assert_eq!(content_offset(head), head.len() - 3);
        assert_eq!(content_offset(b"GET / HTTP/1.0\r\n"), 0);
    }

    #[test]
    fn method_prefixes() {
        assert_eq!(Method::from_request_line(b"DELETE /x HTTP/1.0"), Some(Method::DELETE));
        assert_eq!(Method::from_request_line(b"HEAD / HTTP/1.0"), Some(Method::HEAD));
        assert_eq!(Method::from_request_line(b"GETX / HTTP/1.0"), None);
        assert_eq!(Method::from_request_line(b"OPTIONS * HTTP/1.0"), None);
    }
}

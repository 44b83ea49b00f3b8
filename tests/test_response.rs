use tinyhttpd::error::HttpError;
use tinyhttpd::http::mime::{MimeMap, mime_type, mime_type_checked};
use tinyhttpd::http::response::{HeaderContext, ResponseHeader, StatusCode};
use tinyhttpd::http::segment::SegmentPool;

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::NotModified.as_u16(), 304);
    assert_eq!(StatusCode::Unauthorized.as_u16(), 401);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::RequestTimeout.as_u16(), 408);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
    assert_eq!(StatusCode::NotImplemented.as_u16(), 501);
}

#[test]
fn test_status_code_text_starts_with_code() {
    let all = [
        StatusCode::Ok,
        StatusCode::Created,
        StatusCode::NoContent,
        StatusCode::NotModified,
        StatusCode::BadRequest,
        StatusCode::Unauthorized,
        StatusCode::Forbidden,
        StatusCode::NotFound,
        StatusCode::MethodNotAllowed,
        StatusCode::RequestTimeout,
        StatusCode::InternalServerError,
        StatusCode::NotImplemented,
        StatusCode::ServiceUnavailable,
    ];
    for code in all {
        let text = code.as_str();
        assert!(text.starts_with(&code.as_u16().to_string()), "{text}");
        assert_eq!(&text[4..], code.reason_phrase());
        assert_eq!(code.to_string(), text);
    }
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    assert_eq!(StatusCode::RequestTimeout.reason_phrase(), "Request Time-out");
    assert_eq!(StatusCode::NotImplemented.reason_phrase(), "Not Implemented");
}

#[test]
fn test_header_without_length_omits_content_length() {
    let text = ResponseHeader::new("200 OK")
        .content_type("text/plain")
        .render(&HeaderContext::default());

    assert_eq!(
        text,
        "HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\nConnection: Close\r\n\r\n"
    );
}

#[test]
fn test_header_split_over_small_segments() {
    let pool = SegmentPool::new(16, 16);
    let header = ResponseHeader::new("200 OK")
        .content_type("text/html")
        .content_length(1234);
    let ctx = HeaderContext::default();

    let chain = header.into_segments(&pool, &ctx).unwrap();

    assert!(chain.segment_count() > 1);
    assert!(chain.segments().iter().all(|s| s.len() <= 16));
    assert_eq!(chain.to_vec(0, chain.len()), header.render(&ctx).into_bytes());
    drop(chain);
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn test_header_fails_when_pool_is_exhausted() {
    let pool = SegmentPool::new(16, 1);
    let header = ResponseHeader::new("404 Not Found").content_type("text/plain");

    let result = header.into_segments(&pool, &HeaderContext::default());

    assert!(matches!(result, Err(HttpError::Allocation)));
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn test_mime_builtin_types() {
    assert_eq!(mime_type("/index.html", &[]), "text/html");
    assert_eq!(mime_type("/logo.PNG", &[]), "image/png");
    assert_eq!(mime_type("/app.min.js", &[]), "application/javascript");
    assert_eq!(mime_type("/notes", &[]), "text/plain");
    assert_eq!(mime_type("/archive.tar.zz", &[]), "text/plain");
}

#[test]
fn test_mime_additional_maps_take_precedence() {
    let maps = [
        MimeMap::new("svg", "image/svg+xml"),
        MimeMap::new("htm", "application/xhtml+xml"),
    ];
    assert_eq!(mime_type("/icon.svg", &maps), "image/svg+xml");
    assert_eq!(mime_type("/page.htm", &maps), "application/xhtml+xml");
    assert_eq!(mime_type("/page.html", &maps), "text/html");
}

#[test]
fn test_mime_checked_validates_declared_length() {
    assert_eq!(mime_type_checked("/a.gif", 6, &[]).unwrap(), "image/gif");
    assert!(matches!(mime_type_checked("/a.gif", 4, &[]), Err(HttpError::Protocol(_))));
}

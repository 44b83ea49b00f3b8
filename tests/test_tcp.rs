use std::time::Duration;

use tinyhttpd::http::segment::SegmentPool;
use tinyhttpd::server::{HttpServer, ServerSettings};
use tinyhttpd::store::{DirStore, MemoryStore};
use tinyhttpd::transport::{TcpTransport, Transport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn roundtrip(addr: std::net::SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn test_tcp_get_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();

    let pool = SegmentPool::default();
    let transport = TcpTransport::bind("127.0.0.1:0", pool.clone(), 4).await.unwrap();
    let addr = transport.local_addr();
    let mut server = HttpServer::builder(transport, DirStore::new(dir.path()), pool, ServerSettings::default())
        .build()
        .unwrap();

    let (_, response) = tokio::join!(
        server.serve_next(),
        roundtrip(addr, b"GET /index.html HTTP/1.0\r\n\r\n")
    );

    assert_eq!(
        response,
        "HTTP/1.0 200 OK\r\nContent-Type: text/html\r\nConnection: Close\r\nContent-Length: 11\r\n\r\n<h1>hi</h1>"
    );
    assert_eq!(server.stats().connection_successes, 1);
    assert_eq!(server.pool().in_use(), 0);
}

#[tokio::test]
async fn test_tcp_put_then_get() {
    let store = MemoryStore::new();
    let pool = SegmentPool::default();
    let transport = TcpTransport::bind("127.0.0.1:0", pool.clone(), 4).await.unwrap();
    let addr = transport.local_addr();
    let mut server = HttpServer::builder(transport, store.clone(), pool, ServerSettings::default())
        .build()
        .unwrap();

    let (_, response) = tokio::join!(
        server.serve_next(),
        roundtrip(addr, b"PUT /log.txt HTTP/1.0\r\nContent-Length: 5\r\n\r\nentry")
    );
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
    assert_eq!(store.get("log.txt").as_deref(), Some(&b"entry"[..]));

    let (_, response) = tokio::join!(
        server.serve_next(),
        roundtrip(addr, b"GET /log.txt HTTP/1.0\r\n\r\n")
    );
    assert!(response.ends_with("\r\n\r\nentry"));
}

#[tokio::test]
async fn test_tcp_peer_closing_early() {
    let pool = SegmentPool::default();
    let transport = TcpTransport::bind("127.0.0.1:0", pool.clone(), 4).await.unwrap();
    let addr = transport.local_addr();
    let mut server = HttpServer::builder(transport, MemoryStore::new(), pool, ServerSettings::default())
        .build()
        .unwrap();

    let client = async {
        let stream = TcpStream::connect(addr).await.unwrap();
        drop(stream);
    };
    tokio::join!(server.serve_next(), client);

    assert_eq!(server.stats().connection_successes, 1);
    assert_eq!(server.stats().invalid_http_headers, 0);
    assert!(server.transport().peer_addr().is_none());
}

#[tokio::test]
async fn test_tcp_exhausted_pool_counts_allocation_error() {
    let pool = SegmentPool::new(600, 1);
    let transport = TcpTransport::bind("127.0.0.1:0", pool.clone(), 4).await.unwrap();
    let addr = transport.local_addr();
    let mut server = HttpServer::builder(transport, MemoryStore::new(), pool.clone(), ServerSettings::default())
        .build()
        .unwrap();
    let held = pool.allocate().unwrap();

    let client = async {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let _ = stream.write_all(b"GET / HTTP/1.0\r\n\r\n").await;
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response).await;
        response
    };
    let (_, response) = tokio::join!(server.serve_next(), client);

    assert!(response.is_empty());
    assert_eq!(server.stats().allocation_errors, 1);
    assert_eq!(server.stats().invalid_http_headers, 0);
    drop(held);
    assert_eq!(pool.in_use(), 0);
}

#[tokio::test]
async fn test_tcp_accept_times_out_without_clients() {
    let pool = SegmentPool::default();
    let mut transport = TcpTransport::bind("127.0.0.1:0", pool, 1).await.unwrap();

    let result = transport.accept(Duration::from_millis(20)).await;

    assert!(matches!(result, Err(tinyhttpd::HttpError::Timeout)));
}

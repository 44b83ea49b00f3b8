//! HTTP/1.0 protocol implementation.
//!
//! This module implements the request side of an embedded HTTP/1.0 server
//! that works on fixed-capacity segments instead of one growable buffer.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`segment`**: Segment pool and the segment chain a request is assembled in
//! - **`matcher`**: Substring search that resumes across segment boundaries
//! - **`parser`**: Receives segments until the request head is complete
//! - **`request`**: Method classification, resource/parameter/header extraction
//! - **`multipart`**: Multipart boundary, entity header and entity content scanning
//! - **`response`**: Status codes and the response header generator
//! - **`writer`**: Sends headers and bodies as transport-sized segments
//! - **`mime`**: MIME type detection based on file extensions
//! - **`connection`**: The per-request [`Exchange`](connection::Exchange) and method dispatch
//!
//! # Request State Machine
//!
//! Each connection carries exactly one request:
//!
//! ```text
//!        ┌──────────────────┐
//!        │  ReadingRequest  │ ← Receive segments until CRLFCRLF
//!        └──────┬───────────┘
//!               │ Head assembled
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Resource, auth, notify, method body
//!        └──────┬───────────┘
//!               │ Response sent (or error answered)
//!               ▼
//!        ┌──────────────────┐
//!        │  Disconnecting   │ ← Always; HTTP/1.0 has no keep-alive here
//!        └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tinyhttpd::http::segment::SegmentPool;
//! use tinyhttpd::server::{HttpServer, ServerSettings};
//! use tinyhttpd::store::DirStore;
//! use tinyhttpd::transport::TcpTransport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = SegmentPool::default();
//!     let transport = TcpTransport::bind("127.0.0.1:8080", pool.clone(), 5).await?;
//!     let mut server = HttpServer::builder(transport, DirStore::new("www"), pool, ServerSettings::default())
//!         .build()?;
//!
//!     loop {
//!         server.serve_next().await;
//!     }
//! }
//! ```

pub mod connection;
pub mod matcher;
pub mod mime;
pub mod multipart;
pub mod parser;
pub mod request;
pub mod response;
pub mod segment;
pub mod writer;

//! tinyhttpd - Embedded HTTP/1.0 Server
//!
//! Core library for request assembly, authentication, multipart scanning
//! and response generation over a segmented transport.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod server;
pub mod store;
pub mod transport;

pub use error::{HttpError, Result};

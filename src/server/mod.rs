//! The connection loop.
//!
//! One [`HttpServer`] owns one transport endpoint and serves its
//! connections strictly one after another:
//!
//! ```text
//!   WaitingForConnection ─signal─▶ Accepting ─▶ ReadingRequest ─▶ Dispatching
//!            ▲                         │              │                │
//!            └──────── relisten ◀── Disconnecting ◀───┴────────────────┘
//! ```
//!
//! Every path ends in disconnect and relisten; no request outcome stops
//! the loop.

pub mod callbacks;
pub mod listener;

use std::future::Future;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, warn};

use crate::auth::NonceTable;
use crate::error::{HttpError, Result};
use crate::http::connection::Exchange;
use crate::http::mime::MimeMap;
use crate::http::parser::read_request;
use crate::http::request::Method;
use crate::http::segment::SegmentPool;
use crate::store::FileStore;
use crate::transport::Transport;

use callbacks::{
    AuthenticationCheck, CacheInfo, Callbacks, DigestCheck, GmtClock, InvalidCredentialsNotify,
    RequestNotify,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const MIN_HEAD_SEGMENT: usize = 600;
pub const MAX_RESOURCE: usize = 40;
pub const MAX_HEADER_FIELD: usize = 256;
pub const NONCE_COUNT: usize = 2;

/// Limits and timeouts of one server instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub accept_timeout: Duration,
    pub receive_timeout: Duration,
    pub send_timeout: Duration,
    pub disconnect_timeout: Duration,
    /// Age after which an unanswered nonce may be reclaimed
    pub nonce_timeout: Duration,
    /// First segments smaller than this are copied into pool segments
    pub min_head_segment: usize,
    /// Longest decoded resource path
    pub max_resource: usize,
    /// Longest header value the server reads
    pub max_header_field: usize,
    pub nonce_count: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            accept_timeout: DEFAULT_TIMEOUT,
            receive_timeout: DEFAULT_TIMEOUT,
            send_timeout: DEFAULT_TIMEOUT,
            disconnect_timeout: DEFAULT_TIMEOUT,
            nonce_timeout: DEFAULT_TIMEOUT,
            min_head_segment: MIN_HEAD_SEGMENT,
            max_resource: MAX_RESOURCE,
            max_header_field: MAX_HEADER_FIELD,
            nonce_count: NONCE_COUNT,
        }
    }
}

/// Counters kept by the connection loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub get_requests: u64,
    pub head_requests: u64,
    pub put_requests: u64,
    pub delete_requests: u64,
    pub post_requests: u64,
    pub unknown_requests: u64,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub allocation_errors: u64,
    pub connection_failures: u64,
    pub connection_successes: u64,
    pub invalid_http_headers: u64,
}

impl ServerStats {
    fn count_request(&mut self, method: Option<Method>) {
        let counter = match method {
            Some(Method::GET) => &mut self.get_requests,
            Some(Method::HEAD) => &mut self.head_requests,
            Some(Method::PUT) => &mut self.put_requests,
            Some(Method::DELETE) => &mut self.delete_requests,
            Some(Method::POST) => &mut self.post_requests,
            None => &mut self.unknown_requests,
        };
        *counter += 1;
    }
}

/// An HTTP/1.0 server on one transport endpoint
pub struct HttpServer<T: Transport> {
    transport: T,
    store: Box<dyn FileStore>,
    pool: SegmentPool,
    settings: ServerSettings,
    callbacks: Callbacks<T>,
    stats: ServerStats,
    nonces: NonceTable,
    rng: Box<dyn RngCore>,
}

impl<T: Transport> HttpServer<T> {
    pub fn builder(
        transport: T,
        store: impl FileStore + 'static,
        pool: SegmentPool,
        settings: ServerSettings,
    ) -> HttpServerBuilder<T> {
        HttpServerBuilder {
            transport,
            store: Box::new(store),
            pool,
            settings,
            callbacks: Callbacks::default(),
            rng: None,
        }
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn pool(&self) -> &SegmentPool {
        &self.pool
    }

    pub fn nonces(&self) -> &NonceTable {
        &self.nonces
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn set_authentication_check(&mut self, check: impl AuthenticationCheck + 'static) {
        self.callbacks.authentication_check = Some(Box::new(check));
    }

    pub fn set_request_notify(&mut self, notify: impl RequestNotify<T> + 'static) {
        self.callbacks.request_notify = Some(Box::new(notify));
    }

    pub fn set_invalid_credentials_notify(&mut self, notify: impl InvalidCredentialsNotify + 'static) {
        self.callbacks.invalid_credentials = Some(Box::new(notify));
    }

    pub fn set_digest_check(&mut self, check: impl DigestCheck + 'static) {
        self.callbacks.digest_check = Some(Box::new(check));
    }

    pub fn set_gmt_clock(&mut self, clock: impl GmtClock + 'static) {
        self.callbacks.gmt = Some(Box::new(clock));
    }

    pub fn set_cache_info(&mut self, cache: impl CacheInfo + 'static) {
        self.callbacks.cache = Some(Box::new(cache));
    }

    pub fn set_mime_maps(&mut self, maps: Vec<MimeMap>) {
        self.callbacks.mime_maps = maps;
    }

    /// Serves exactly one connection, from waiting for it to relistening.
    pub async fn serve_next(&mut self) {
        self.transport.signal().wait().await;

        let peer = match self.transport.accept(self.settings.accept_timeout).await {
            Ok(peer) => peer,
            Err(e) => {
                self.stats.connection_failures += 1;
                warn!(error = %e, "Accept failed");
                self.finish().await;
                return;
            }
        };
        self.stats.connection_successes += 1;
        info!("Accepted connection from {}", peer);

        match read_request(&mut self.transport, &self.pool, &self.settings, &mut self.stats).await {
            Ok(request) => {
                self.stats.count_request(request.method);
                debug!(peer = %peer, method = ?request.method, "dispatching request");

                let mut exchange = Exchange {
                    transport: &mut self.transport,
                    store: self.store.as_ref(),
                    pool: &self.pool,
                    settings: &self.settings,
                    callbacks: &self.callbacks,
                    stats: &mut self.stats,
                    nonces: &mut self.nonces,
                    rng: self.rng.as_mut(),
                    peer,
                    request,
                    resource: String::new(),
                    multipart: Default::default(),
                    response_started: false,
                };
                exchange.process().await;
            }
            Err(HttpError::Timeout) => debug!(peer = %peer, "no request before timeout"),
            Err(HttpError::Closed) => debug!(peer = %peer, "peer closed before sending a request"),
            Err(HttpError::Allocation) => {
                self.stats.allocation_errors += 1;
                warn!(peer = %peer, "no segment available to receive the request");
            }
            Err(e) => {
                self.stats.invalid_http_headers += 1;
                warn!(peer = %peer, error = %e, "Invalid request head");
            }
        }

        self.nonces.on_disconnect();
        self.finish().await;
    }

    async fn finish(&mut self) {
        if let Err(e) = self.transport.disconnect(self.settings.disconnect_timeout).await {
            debug!(error = %e, "disconnect failed");
        }
        if let Err(e) = self.transport.relisten().await {
            warn!(error = %e, "relisten failed");
        }
    }

    /// Serves connections until `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("HTTP server stopped");
                    return;
                }
                _ = self.serve_next() => {}
            }
        }
    }
}

/// Collects hooks before the server starts
pub struct HttpServerBuilder<T: Transport> {
    transport: T,
    store: Box<dyn FileStore>,
    pool: SegmentPool,
    settings: ServerSettings,
    callbacks: Callbacks<T>,
    rng: Option<Box<dyn RngCore>>,
}

impl<T: Transport> HttpServerBuilder<T> {
    pub fn authentication_check(mut self, check: impl AuthenticationCheck + 'static) -> Self {
        self.callbacks.authentication_check = Some(Box::new(check));
        self
    }

    pub fn request_notify(mut self, notify: impl RequestNotify<T> + 'static) -> Self {
        self.callbacks.request_notify = Some(Box::new(notify));
        self
    }

    pub fn invalid_credentials_notify(mut self, notify: impl InvalidCredentialsNotify + 'static) -> Self {
        self.callbacks.invalid_credentials = Some(Box::new(notify));
        self
    }

    pub fn digest_check(mut self, check: impl DigestCheck + 'static) -> Self {
        self.callbacks.digest_check = Some(Box::new(check));
        self
    }

    pub fn gmt_clock(mut self, clock: impl GmtClock + 'static) -> Self {
        self.callbacks.gmt = Some(Box::new(clock));
        self
    }

    pub fn cache_info(mut self, cache: impl CacheInfo + 'static) -> Self {
        self.callbacks.cache = Some(Box::new(cache));
        self
    }

    pub fn mime_maps(mut self, maps: Vec<MimeMap>) -> Self {
        self.callbacks.mime_maps = maps;
        self
    }

    /// Random source for nonces; entropy-seeded when not set.
    pub fn rng(mut self, rng: impl RngCore + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    pub fn build(self) -> Result<HttpServer<T>> {
        let minimum = self.settings.min_head_segment;
        if self.pool.payload_size() < minimum {
            return Err(HttpError::PoolTooSmall {
                payload: self.pool.payload_size(),
                minimum,
            });
        }

        let nonces = NonceTable::new(self.settings.nonce_count, self.settings.nonce_timeout);
        Ok(HttpServer {
            transport: self.transport,
            store: self.store,
            pool: self.pool,
            settings: self.settings,
            callbacks: self.callbacks,
            stats: ServerStats::default(),
            nonces,
            rng: self
                .rng
                .unwrap_or_else(|| Box::new(StdRng::from_entropy())),
        })
    }
}

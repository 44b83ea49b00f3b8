#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tinyhttpd::error::{HttpError, Result};
use tinyhttpd::http::segment::{Segment, SegmentPool};
use tinyhttpd::server::{HttpServer, HttpServerBuilder, ServerSettings};
use tinyhttpd::store::MemoryStore;
use tinyhttpd::transport::{ConnectionSignal, Transport};

/// In-memory transport: each queued connection delivers its chunks as
/// separate segments, then times out.
pub struct ScriptedTransport {
    signal: ConnectionSignal,
    connections: VecDeque<Vec<Vec<u8>>>,
    current: Option<VecDeque<Vec<u8>>>,
    /// Everything sent, one entry per accepted connection
    pub sent: Vec<Vec<u8>>,
    /// Number of send calls
    pub sends: usize,
    mss: usize,
    peer: SocketAddr,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            signal: ConnectionSignal::new(),
            connections: VecDeque::new(),
            current: None,
            sent: Vec::new(),
            sends: 0,
            mss: 1460,
            peer: "192.0.2.10:40000".parse().unwrap(),
        }
    }

    pub fn with_mss(mut self, mss: usize) -> Self {
        self.mss = mss;
        self
    }

    /// Queues a connection and raises the pending signal.
    pub fn push_connection(&mut self, chunks: &[&[u8]]) {
        self.connections
            .push_back(chunks.iter().map(|c| c.to_vec()).collect());
        self.signal.raise();
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Output of the most recent connection, lossily decoded.
    pub fn last_response(&self) -> String {
        self.sent
            .last()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }
}

impl Transport for ScriptedTransport {
    fn signal(&self) -> &ConnectionSignal {
        &self.signal
    }

    async fn accept(&mut self, _timeout: Duration) -> Result<SocketAddr> {
        let chunks = self.connections.pop_front().ok_or(HttpError::Timeout)?;
        self.current = Some(chunks.into());
        self.sent.push(Vec::new());
        Ok(self.peer)
    }

    async fn receive(&mut self, _timeout: Duration) -> Result<Segment> {
        let chunks = self.current.as_mut().ok_or(HttpError::Closed)?;
        let chunk = chunks.pop_front().ok_or(HttpError::Timeout)?;
        Ok(Segment::unpooled(&chunk))
    }

    async fn send(&mut self, segment: Segment, _timeout: Duration) -> Result<()> {
        self.sends += 1;
        self.sent
            .last_mut()
            .ok_or(HttpError::Closed)?
            .extend_from_slice(segment.as_slice());
        Ok(())
    }

    async fn disconnect(&mut self, _timeout: Duration) -> Result<()> {
        self.current = None;
        Ok(())
    }

    async fn relisten(&mut self) -> Result<()> {
        if !self.connections.is_empty() {
            self.signal.raise();
        }
        Ok(())
    }

    fn mss(&self) -> usize {
        self.mss
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.current.as_ref().map(|_| self.peer)
    }
}

pub fn builder(transport: ScriptedTransport, store: &MemoryStore) -> HttpServerBuilder<ScriptedTransport> {
    HttpServer::builder(
        transport,
        store.clone(),
        SegmentPool::default(),
        ServerSettings::default(),
    )
    .rng(StdRng::seed_from_u64(42))
}

pub fn server(store: &MemoryStore) -> HttpServer<ScriptedTransport> {
    builder(ScriptedTransport::new(), store).build().unwrap()
}

/// Queues one connection and serves it; returns the response text.
pub async fn exchange(server: &mut HttpServer<ScriptedTransport>, chunks: &[&[u8]]) -> String {
    server.transport_mut().push_connection(chunks);
    server.serve_next().await;
    server.transport().last_response()
}

pub fn status_line(response: &str) -> &str {
    response.split("\r\n").next().unwrap_or_default()
}

pub fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or_default()
}

pub fn header<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    let (head, _) = response.split_once("\r\n\r\n")?;
    head.split("\r\n").skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

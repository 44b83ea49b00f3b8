//! Request assembly: receive segments until the whole head is present.

use tracing::{debug, trace};

use crate::error::{HttpError, Result};
use crate::http::request::Request;
use crate::http::segment::{SegmentChain, SegmentPool};
use crate::server::{ServerSettings, ServerStats};
use crate::transport::Transport;

/// The empty line ending a request head.
pub const HEAD_TERMINATOR: &[u8; 4] = b"\r\n\r\n";

/// Resumable search for CRLFCRLF over a growing segment chain.
///
/// Bytes are scanned once: a later call continues from where the previous
/// one stopped, carrying the number of terminator bytes matched so far.
#[derive(Debug, Clone, Default)]
pub struct HeadScanner {
    matched: usize,
    scanned: usize,
}

impl HeadScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scanner that starts at logical offset `offset`.
    pub fn starting_at(offset: usize) -> Self {
        Self {
            matched: 0,
            scanned: offset,
        }
    }

    /// Logical offset of the next byte to scan.
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Returns the offset just past the terminator once it has been seen.
    pub fn scan(&mut self, chain: &SegmentChain) -> Option<usize> {
        for byte in chain.bytes_from(self.scanned) {
            self.scanned += 1;
            self.matched = match (self.matched, byte) {
                (m @ (0 | 2), b'\r') => m + 1,
                (m @ (1 | 3), b'\n') => m + 1,
                // a stray CR may still open the terminator
                (_, b'\r') => 1,
                _ => 0,
            };
            if self.matched == HEAD_TERMINATOR.len() {
                self.matched = 0;
                return Some(self.scanned);
            }
        }
        None
    }
}

/// Receives from `transport` until a complete request head is assembled.
///
/// The returned request holds the head and whatever content bytes arrived
/// with it. A first segment smaller than `settings.min_head_segment` is
/// copied into pool segments so the head has room to grow.
pub async fn read_request<T: Transport>(
    transport: &mut T,
    pool: &SegmentPool,
    settings: &ServerSettings,
    stats: &mut ServerStats,
) -> Result<Request> {
    let first = transport.receive(settings.receive_timeout).await?;
    stats.total_bytes_received += first.len() as u64;

    if !first.as_slice().first().is_some_and(u8::is_ascii_uppercase) {
        return Err(HttpError::Protocol("request does not start with a method"));
    }

    let mut chain = SegmentChain::new();
    if first.capacity() < settings.min_head_segment {
        trace!(capacity = first.capacity(), "copying undersized first segment");
        pool.append(&mut chain, first.as_slice())
            .map_err(|e| reassembly_failed(stats, e))?;
    } else {
        chain.push(first);
    }

    let mut scanner = HeadScanner::new();
    loop {
        if let Some(content_offset) = scanner.scan(&chain) {
            debug!(
                head_len = content_offset,
                segments = chain.segment_count(),
                "request head assembled"
            );
            return Ok(Request::new(chain, content_offset));
        }

        let next = transport.receive(settings.receive_timeout).await?;
        stats.total_bytes_received += next.len() as u64;
        pool.append(&mut chain, next.as_slice())
            .map_err(|e| reassembly_failed(stats, e))?;
    }
}

fn reassembly_failed(stats: &mut ServerStats, err: HttpError) -> HttpError {
    if matches!(err, HttpError::Allocation) {
        stats.allocation_errors += 1;
    }
    HttpError::Protocol("request reassembly failed")
}

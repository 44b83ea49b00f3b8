use std::time::Duration;

use tracing::trace;

use crate::error::Result;
use crate::http::segment::{SegmentChain, SegmentPool};
use crate::server::ServerStats;
use crate::transport::Transport;

/// Sends outgoing segments over one connection and keeps the byte count.
pub struct ResponseWriter<'a, T: Transport> {
    transport: &'a mut T,
    pool: &'a SegmentPool,
    timeout: Duration,
    stats: &'a mut ServerStats,
}

impl<'a, T: Transport> ResponseWriter<'a, T> {
    pub fn new(
        transport: &'a mut T,
        pool: &'a SegmentPool,
        timeout: Duration,
        stats: &'a mut ServerStats,
    ) -> Self {
        Self {
            transport,
            pool,
            timeout,
            stats,
        }
    }

    /// Largest body chunk: the transport MSS, capped by the segment payload.
    pub fn chunk_size(&self) -> usize {
        self.transport.mss().min(self.pool.payload_size()).max(1)
    }

    /// Sends every non-empty segment of `chain` in order.
    pub async fn send_segments(&mut self, chain: SegmentChain) -> Result<()> {
        for segment in chain.into_segments() {
            if segment.is_empty() {
                continue;
            }
            let len = segment.len();
            self.transport.send(segment, self.timeout).await?;
            self.stats.total_bytes_sent += len as u64;
            trace!(bytes = len, "segment sent");
        }
        Ok(())
    }

    /// Copies `data` into pool segments of at most one chunk each and sends them.
    pub async fn send_data(&mut self, data: &[u8]) -> Result<()> {
        for piece in data.chunks(self.chunk_size()) {
            let mut segment = self.pool.allocate()?;
            segment.extend(piece);
            self.transport.send(segment, self.timeout).await?;
            self.stats.total_bytes_sent += piece.len() as u64;
        }
        Ok(())
    }
}

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{ConnectionSignal, DEFAULT_MSS, Transport};
use crate::error::{HttpError, Result};
use crate::http::segment::{Segment, SegmentPool};

type Pending = (TcpStream, SocketAddr);

/// TCP endpoint backed by a tokio listener.
///
/// A background task accepts sockets into a queue as deep as the listen
/// backlog and raises the connection signal for each one. The worker then
/// serves them strictly one at a time.
pub struct TcpTransport {
    local_addr: SocketAddr,
    pool: SegmentPool,
    signal: Arc<ConnectionSignal>,
    pending: mpsc::Receiver<Pending>,
    queued: Arc<AtomicUsize>,
    current: Option<Pending>,
    accept_task: JoinHandle<()>,
}

impl TcpTransport {
    pub async fn bind(addr: &str, pool: SegmentPool, backlog: usize) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let signal = Arc::new(ConnectionSignal::new());
        let queued = Arc::new(AtomicUsize::new(0));
        let (tx, pending) = mpsc::channel(backlog.max(1));

        let accept_task = tokio::spawn(accept_loop(
            listener,
            tx,
            Arc::clone(&signal),
            Arc::clone(&queued),
        ));

        Ok(Self {
            local_addr,
            pool,
            signal,
            pending,
            queued,
            current: None,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.current
            .as_mut()
            .map(|(stream, _)| stream)
            .ok_or(HttpError::Closed)
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: mpsc::Sender<Pending>,
    signal: Arc<ConnectionSignal>,
    queued: Arc<AtomicUsize>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(peer = %peer, "connection queued");
                queued.fetch_add(1, Ordering::AcqRel);
                if tx.send((stream, peer)).await.is_err() {
                    break;
                }
                signal.raise();
            }
            Err(e) => warn!(error = %e, "listener accept failed"),
        }
    }
}

impl Transport for TcpTransport {
    fn signal(&self) -> &ConnectionSignal {
        &self.signal
    }

    async fn accept(&mut self, timeout: Duration) -> Result<SocketAddr> {
        let (stream, peer) = tokio::time::timeout(timeout, self.pending.recv())
            .await
            .map_err(|_| HttpError::Timeout)?
            .ok_or(HttpError::Closed)?;
        self.queued.fetch_sub(1, Ordering::AcqRel);

        if let Err(e) = stream.set_nodelay(true) {
            trace!(error = %e, "set_nodelay failed");
        }
        self.current = Some((stream, peer));
        Ok(peer)
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Segment> {
        let mut segment = self.pool.allocate()?;
        let stream = self.stream()?;

        let buf = segment.begin_fill();
        let n = tokio::time::timeout(timeout, stream.read(buf))
            .await
            .map_err(|_| HttpError::Timeout)??;
        segment.finish_fill(0, n);

        if n == 0 {
            return Err(HttpError::Closed);
        }
        trace!(bytes = n, "segment received");
        Ok(segment)
    }

    async fn send(&mut self, segment: Segment, timeout: Duration) -> Result<()> {
        let stream = self.stream()?;
        tokio::time::timeout(timeout, stream.write_all(segment.as_slice()))
            .await
            .map_err(|_| HttpError::Timeout)??;
        Ok(())
    }

    async fn disconnect(&mut self, timeout: Duration) -> Result<()> {
        if let Some((mut stream, peer)) = self.current.take() {
            match tokio::time::timeout(timeout, stream.shutdown()).await {
                Ok(Ok(())) => debug!(peer = %peer, "connection closed"),
                Ok(Err(e)) => debug!(peer = %peer, error = %e, "shutdown failed"),
                Err(_) => debug!(peer = %peer, "shutdown timed out"),
            }
        }
        Ok(())
    }

    async fn relisten(&mut self) -> Result<()> {
        if self.queued.load(Ordering::Acquire) > 0 {
            self.signal.raise();
        }
        Ok(())
    }

    fn mss(&self) -> usize {
        DEFAULT_MSS
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.current.as_ref().map(|(_, peer)| *peer)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

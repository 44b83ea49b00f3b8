//! The byte-stream transport the server runs on.
//!
//! The server never touches sockets directly. It waits for the
//! connection-pending signal, accepts, then moves whole segments in and out
//! through a [`Transport`]. Every call is bounded by a timeout and an
//! elapsed timeout surfaces as [`HttpError::Timeout`](crate::error::HttpError::Timeout).

pub mod tcp;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::Result;
use crate::http::segment::Segment;

pub use tcp::TcpTransport;

/// Default maximum segment size for a TCP connection over Ethernet.
pub const DEFAULT_MSS: usize = 1460;

/// One listening endpoint serving a single connection at a time.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Raised whenever a connection is waiting to be accepted.
    fn signal(&self) -> &ConnectionSignal;

    async fn accept(&mut self, timeout: Duration) -> Result<SocketAddr>;

    /// Receives the next segment of the current connection.
    async fn receive(&mut self, timeout: Duration) -> Result<Segment>;

    async fn send(&mut self, segment: Segment, timeout: Duration) -> Result<()>;

    async fn disconnect(&mut self, timeout: Duration) -> Result<()>;

    /// Makes the endpoint ready to accept the next connection.
    async fn relisten(&mut self) -> Result<()>;

    /// Largest payload a single send should carry.
    fn mss(&self) -> usize;

    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// Connection-pending flag shared between the accept path and the worker.
///
/// `raise` and `take` are each one atomic operation, so a raise that lands
/// between the worker's check and clear is never lost.
#[derive(Debug, Default)]
pub struct ConnectionSignal {
    pending: AtomicBool,
    notify: Notify,
}

impl ConnectionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Clears the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Waits until the flag is raised, then clears it.
    pub async fn wait(&self) {
        loop {
            if self.take() {
                return;
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn raise_before_wait_is_not_lost() {
        let signal = ConnectionSignal::new();
        signal.raise();
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("pending raise should complete the wait");
        assert!(!signal.is_raised());
    }

    #[tokio::test]
    async fn wait_wakes_on_raise_from_another_task() {
        let signal = Arc::new(ConnectionSignal::new());
        let raiser = Arc::clone(&signal);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            raiser.raise();
        });

        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("raise should wake the waiter");
        handle.await.unwrap();
    }

    #[test]
    fn take_clears_once() {
        let signal = ConnectionSignal::new();
        signal.raise();
        assert!(signal.take());
        assert!(!signal.take());
    }
}

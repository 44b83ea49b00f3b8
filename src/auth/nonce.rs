//! Digest nonce table
//!
//! A small fixed table of server nonces. Each entry moves through:
//!
//! ```text
//!   Invalid ──allocate──▶ Valid ──verified──▶ Accepted
//!      ▲                    │                    │
//!      └──── mismatch ──────┘                    │
//!      ▲     or reclaimed after timeout          │
//!      └─────────────── disconnect ──────────────┘
//! ```

use std::time::Duration;

use rand::{Rng, RngCore};
use tokio::time::Instant;

/// Length of a nonce token in characters
pub const NONCE_SIZE: usize = 32;

const TOKEN_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Lifecycle state of one nonce entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceState {
    /// Free for allocation
    Invalid,
    /// Sent in a challenge, not yet answered
    Valid,
    /// Answered correctly; usable until the connection ends
    Accepted,
}

#[derive(Debug, Clone)]
pub struct NonceEntry {
    pub state: NonceState,
    /// When the nonce was issued
    pub created: Instant,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct NonceTable {
    entries: Vec<NonceEntry>,
    timeout: Duration,
}

impl NonceTable {
    pub fn new(size: usize, timeout: Duration) -> Self {
        let now = Instant::now();
        let entries = (0..size)
            .map(|_| NonceEntry {
                state: NonceState::Invalid,
                created: now,
                token: String::new(),
            })
            .collect();
        Self { entries, timeout }
    }

    pub fn entries(&self) -> &[NonceEntry] {
        &self.entries
    }

    /// Issues a fresh nonce and returns its token.
    ///
    /// Takes a free entry first, otherwise reclaims a Valid entry older than
    /// the timeout. Returns `None` when every entry is Accepted or fresh.
    pub fn allocate(&mut self, rng: &mut dyn RngCore) -> Option<&str> {
        let now = Instant::now();
        let timeout = self.timeout;
        let index = self
            .entries
            .iter()
            .position(|e| e.state == NonceState::Invalid)
            .or_else(|| {
                self.entries.iter().position(|e| {
                    e.state == NonceState::Valid && now.duration_since(e.created) > timeout
                })
            })?;

        let token = (0..NONCE_SIZE)
            .map(|_| char::from(TOKEN_CHARS[rng.gen_range(0..TOKEN_CHARS.len())]))
            .collect();

        let entry = &mut self.entries[index];
        *entry = NonceEntry {
            state: NonceState::Valid,
            created: now,
            token,
        };
        tracing::trace!(slot = index, "nonce issued");
        Some(&entry.token)
    }

    /// Index of the live (Valid or Accepted) entry holding `token`.
    pub fn find(&self, token: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.state != NonceState::Invalid && e.token == token)
    }

    pub fn state_of(&self, token: &str) -> Option<NonceState> {
        self.find(token).map(|i| self.entries[i].state)
    }

    /// Marks the entry Accepted after a verified response.
    pub fn accept(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.state = NonceState::Accepted;
        }
    }

    pub fn invalidate(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.state = NonceState::Invalid;
        }
    }

    /// Accepted nonces are single use: they die with the connection.
    pub fn on_disconnect(&mut self) {
        for entry in &mut self.entries {
            if entry.state == NonceState::Accepted {
                entry.state = NonceState::Invalid;
            }
        }
    }
}

//! Multipart body scanning.
//!
//! [`MultipartContext`] never receives data itself. Each call looks at the
//! segment chain as it is now and either makes progress or answers
//! `NeedMore`; the caller then appends the next received segment and calls
//! again. Partial boundary matches at the end of the chain are carried in
//! the matcher, so a boundary split across two segments is still found.
//!
//! ```text
//!   Searching ──boundary matched──▶ Found ──"--" after boundary──▶ Consumed
//!       ▲                             │
//!       └────entity header read───────┘
//! ```

use crate::error::{HttpError, Result};
use crate::http::matcher::PatternMatcher;
use crate::http::parser::HeadScanner;
use crate::http::request::field_value;
use crate::http::segment::{Segment, SegmentChain};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryState {
    #[default]
    Searching,
    /// The next boundary is located; its part content has been handed out.
    Found,
    /// The closing boundary was read.
    Consumed,
}

/// A run of content bytes inside one segment, by logical offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    NeedMore,
    Available(Span),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityHeaderScan {
    NeedMore,
    /// Header bytes copied into the caller's buffer.
    Complete(usize),
    /// The closing boundary was reached; no more parts follow.
    Closing,
}

#[derive(Debug, Clone, Default)]
pub struct MultipartContext {
    matcher: Option<PatternMatcher>,
    state: BoundaryState,
    /// Next content byte not yet handed out.
    next: usize,
    /// Next byte not yet fed to the matcher.
    cursor: usize,
    /// Start of the located boundary, while it has not been consumed.
    found_at: Option<usize>,
    header_scan: Option<HeadScanner>,
}

impl MultipartContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn state(&self) -> BoundaryState {
        self.state
    }

    /// The wire boundary, `CRLF--<token>`, once known.
    pub fn boundary(&self) -> Option<&[u8]> {
        self.matcher.as_ref().map(PatternMatcher::pattern)
    }

    /// Bytes before this offset are no longer needed.
    pub fn retained_from(&self) -> usize {
        self.next
    }

    /// Derives the boundary from the request's Content-Type on first use.
    ///
    /// The search starts at the CRLF that ends the head, so a body opening
    /// with `--<token>` matches the full `CRLF--<token>` pattern.
    pub fn ensure_boundary(&mut self, head: &[u8], content_offset: usize, max_field: usize) -> Result<()> {
        if self.matcher.is_some() {
            return Ok(());
        }

        let content_type = field_value(head, "Content-Type", max_field)?;
        let token = boundary_token(&content_type)
            .ok_or(HttpError::Protocol("missing multipart boundary"))?;

        let mut pattern = b"\r\n--".to_vec();
        pattern.extend_from_slice(token.as_bytes());
        self.matcher = Some(PatternMatcher::new(&pattern));
        self.state = BoundaryState::Searching;
        self.next = content_offset.saturating_sub(2);
        self.cursor = self.next;
        self.found_at = None;
        self.header_scan = None;
        Ok(())
    }

    /// Feeds unseen bytes to the matcher until a boundary completes.
    fn advance(&mut self, chain: &SegmentChain) {
        let Some(matcher) = self.matcher.as_mut() else {
            return;
        };
        if self.found_at.is_some() {
            return;
        }

        for byte in chain.bytes_from(self.cursor) {
            self.cursor += 1;
            if matcher.step(byte) {
                self.found_at = Some(self.cursor - matcher.pattern().len());
                return;
            }
        }
    }

    /// End of the bytes known not to belong to a boundary.
    fn safe_limit(&self) -> usize {
        let matched = self.matcher.as_ref().map_or(0, PatternMatcher::matched);
        self.found_at.unwrap_or(self.cursor - matched)
    }

    fn pattern_len(&self) -> Result<usize> {
        self.matcher
            .as_ref()
            .map(|m| m.pattern().len())
            .ok_or(HttpError::Protocol("multipart boundary not initialized"))
    }

    /// Hands out the next run of part content, at most one segment long.
    ///
    /// The run that reaches the boundary moves the state to `Found`; after
    /// that, calls fail with `BoundaryAlreadyFound` until the next entity
    /// header is read.
    pub fn find_content(&mut self, chain: &SegmentChain) -> Result<Scan> {
        self.pattern_len()?;
        if self.state != BoundaryState::Searching {
            return Err(HttpError::BoundaryAlreadyFound);
        }

        self.advance(chain);
        let limit = self.safe_limit();
        if self.next >= limit {
            if self.found_at.is_some() {
                self.state = BoundaryState::Found;
                return Ok(Scan::Available(Span {
                    offset: self.next,
                    length: 0,
                }));
            }
            return Ok(Scan::NeedMore);
        }

        let (index, inner) = chain
            .locate(self.next)
            .ok_or(HttpError::Protocol("multipart content released"))?;
        let segment_end = self.next - inner + chain.segment(index).map_or(0, Segment::len);
        let end = limit.min(segment_end);

        let span = Span {
            offset: self.next,
            length: end - self.next,
        };
        self.next = end;
        if self.found_at == Some(end) {
            self.state = BoundaryState::Found;
        }
        Ok(Scan::Available(span))
    }

    /// Skips to the next boundary and copies the part's header lines into `buf`.
    ///
    /// Unread content of the current part is discarded. The copied header
    /// excludes the blank line that ends it.
    pub fn read_entity_header(&mut self, chain: &SegmentChain, buf: &mut [u8]) -> Result<EntityHeaderScan> {
        self.pattern_len()?;

        match self.state {
            BoundaryState::Consumed => return Ok(EntityHeaderScan::Closing),
            BoundaryState::Found => {}
            BoundaryState::Searching => {
                self.advance(chain);
                match self.found_at {
                    Some(at) => {
                        self.next = at;
                        self.state = BoundaryState::Found;
                    }
                    None => {
                        self.next = self.next.max(self.safe_limit());
                        return Ok(EntityHeaderScan::NeedMore);
                    }
                }
            }
        }

        // the boundary occupies found_at..cursor
        let after = self.cursor;
        let (Some(first), Some(second)) = (chain.byte_at(after), chain.byte_at(after + 1)) else {
            return Ok(EntityHeaderScan::NeedMore);
        };
        match (first, second) {
            (b'-', b'-') => {
                self.state = BoundaryState::Consumed;
                self.next = after + 2;
                self.found_at = None;
                return Ok(EntityHeaderScan::Closing);
            }
            (b'\r', b'\n') => {}
            _ => return Err(HttpError::Protocol("malformed multipart boundary")),
        }

        let scanner = self
            .header_scan
            .get_or_insert_with(|| HeadScanner::starting_at(after));
        let Some(end) = scanner.scan(chain) else {
            return Ok(EntityHeaderScan::NeedMore);
        };
        self.header_scan = None;

        let header_start = after + 2;
        let len = end - 2 - header_start;
        if len > buf.len() {
            return Err(HttpError::BufferTooSmall);
        }
        chain.copy_to(header_start, &mut buf[..len]);

        self.next = end;
        self.cursor = end;
        self.found_at = None;
        if let Some(matcher) = self.matcher.as_mut() {
            matcher.reset();
        }
        self.state = BoundaryState::Searching;
        Ok(EntityHeaderScan::Complete(len))
    }
}

/// Extracts the `boundary=` parameter of a `multipart/...` content type.
pub fn boundary_token(content_type: &str) -> Option<&str> {
    let lower = content_type.to_ascii_lowercase();
    if !lower.trim_start().starts_with("multipart/") {
        return None;
    }

    let start = lower.find("boundary=")? + "boundary=".len();
    let value = &content_type[start..];
    let token = match value.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next()?,
        None => value
            .split(|c: char| c == ';' || c.is_ascii_whitespace())
            .next()?,
    };
    (!token.is_empty()).then_some(token)
}

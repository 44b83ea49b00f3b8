//! Fixed-capacity receive/transmit segments and the pool they come from.
//!
//! A request is assembled from a chain of segments. The chain presents
//! one logical byte stream: parsing code asks for the byte at a logical
//! offset or copies a logical range, and never walks the segments itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;

use crate::error::{HttpError, Result};

pub const DEFAULT_PAYLOAD_SIZE: usize = 1536;
pub const DEFAULT_SEGMENT_COUNT: usize = 32;

#[derive(Debug)]
struct PoolInner {
    payload_size: usize,
    segment_count: usize,
    in_use: AtomicUsize,
}

/// A bounded pool of equally sized segments.
///
/// Segments are released back to the pool when dropped.
#[derive(Debug, Clone)]
pub struct SegmentPool {
    inner: Arc<PoolInner>,
}

impl SegmentPool {
    pub fn new(payload_size: usize, segment_count: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                payload_size,
                segment_count,
                in_use: AtomicUsize::new(0),
            }),
        }
    }

    pub fn payload_size(&self) -> usize {
        self.inner.payload_size
    }

    pub fn segment_count(&self) -> usize {
        self.inner.segment_count
    }

    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.segment_count().saturating_sub(self.in_use())
    }

    /// Takes an empty segment from the pool.
    pub fn allocate(&self) -> Result<Segment> {
        let limit = self.inner.segment_count;
        self.inner
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .map_err(|_| HttpError::Allocation)?;

        Ok(Segment {
            data: BytesMut::with_capacity(self.inner.payload_size),
            capacity: self.inner.payload_size,
            lease: Some(Arc::clone(&self.inner)),
        })
    }

    /// Returns a segment to the pool.
    pub fn release(&self, segment: Segment) {
        drop(segment);
    }

    /// Appends `bytes` to the chain, filling the tail segment before
    /// allocating new ones.
    pub fn append(&self, chain: &mut SegmentChain, mut bytes: &[u8]) -> Result<()> {
        if let Some(tail) = chain.segments.last_mut() {
            let copied = tail.extend(bytes);
            bytes = &bytes[copied..];
        }

        while !bytes.is_empty() {
            let mut segment = self.allocate()?;
            let copied = segment.extend(bytes);
            bytes = &bytes[copied..];
            chain.push(segment);
        }

        Ok(())
    }

    /// Builds a fresh chain holding a copy of `bytes`.
    pub fn chain_from(&self, bytes: &[u8]) -> Result<SegmentChain> {
        let mut chain = SegmentChain::new();
        self.append(&mut chain, bytes)?;
        Ok(chain)
    }
}

impl Default for SegmentPool {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_SIZE, DEFAULT_SEGMENT_COUNT)
    }
}

/// One bounded chunk of bytes.
#[derive(Debug)]
pub struct Segment {
    data: BytesMut,
    capacity: usize,
    lease: Option<Arc<PoolInner>>,
}

impl Segment {
    /// A segment that does not belong to any pool, sized exactly to `bytes`.
    pub fn unpooled(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            capacity: bytes.len(),
            lease: None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Copies as much of `bytes` as fits; returns the number copied.
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.remaining());
        self.data.extend_from_slice(&bytes[..n]);
        n
    }

    /// Exposes the unfilled tail for a read; pair with [`Segment::finish_fill`].
    pub(crate) fn begin_fill(&mut self) -> &mut [u8] {
        let filled = self.data.len();
        self.data.resize(self.capacity, 0);
        &mut self.data[filled..]
    }

    /// Keeps `n` freshly read bytes of the tail exposed by `begin_fill`.
    pub(crate) fn finish_fill(&mut self, filled_before: usize, n: usize) {
        self.data.truncate(filled_before + n);
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if let Some(pool) = self.lease.take() {
            pool.in_use.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// Ordered segments forming one logical stream.
///
/// Logical offsets stay stable when leading segments are released: `base`
/// is the logical offset of the first retained byte.
#[derive(Debug, Default)]
pub struct SegmentChain {
    segments: Vec<Segment>,
    base: usize,
}

impl SegmentChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Logical end offset: every byte ever held, released or not.
    pub fn len(&self) -> usize {
        self.base + self.retained()
    }

    /// Bytes still held in segments.
    pub fn retained(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    /// Logical offset of the first byte still held.
    pub fn retained_start(&self) -> usize {
        self.base
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// Resolves a logical offset to (segment index, offset inside segment).
    ///
    /// Returns `None` when the offset is released or at or past the end.
    pub fn locate(&self, offset: usize) -> Option<(usize, usize)> {
        let mut offset = offset.checked_sub(self.base)?;
        for (index, segment) in self.segments.iter().enumerate() {
            if offset < segment.len() {
                return Some((index, offset));
            }
            offset -= segment.len();
        }
        None
    }

    /// Logical offset of the first byte of segment `index`.
    pub fn segment_start(&self, index: usize) -> usize {
        self.base
            + self.segments[..index.min(self.segments.len())]
                .iter()
                .map(Segment::len)
                .sum::<usize>()
    }

    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.locate(offset)
            .map(|(index, inner)| self.segments[index].as_slice()[inner])
    }

    /// Iterates the bytes from `offset` to the end of the chain.
    pub fn bytes_from(&self, offset: usize) -> impl Iterator<Item = u8> + '_ {
        let (first, inner) = self.locate(offset).unwrap_or((self.segments.len(), 0));
        self.segments
            .iter()
            .skip(first)
            .enumerate()
            .flat_map(move |(i, segment)| {
                let skip = if i == 0 { inner } else { 0 };
                segment.as_slice()[skip..].iter().copied()
            })
    }

    /// The logical range `start..end` as one slice per segment it touches.
    pub fn slices(&self, start: usize, end: usize) -> impl Iterator<Item = &[u8]> + '_ {
        let mut seg_start = self.base;
        self.segments.iter().filter_map(move |segment| {
            let from = seg_start;
            seg_start += segment.len();
            let lo = start.max(from);
            let hi = end.min(seg_start);
            (lo < hi).then(|| &segment.as_slice()[lo - from..hi - from])
        })
    }

    /// Copies bytes starting at `offset` into `dst`; returns the count copied.
    pub fn copy_to(&self, offset: usize, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        for (slot, byte) in dst.iter_mut().zip(self.bytes_from(offset)) {
            *slot = byte;
            copied += 1;
        }
        copied
    }

    /// Copies a logical range out of the chain.
    pub fn to_vec(&self, start: usize, end: usize) -> Vec<u8> {
        let end = end.min(self.len());
        if start >= end || start < self.base {
            return Vec::new();
        }
        self.bytes_from(start).take(end - start).collect()
    }

    /// Drops leading segments that lie entirely before `offset`.
    pub fn release_before(&mut self, offset: usize) {
        let mut end = self.base;
        let count = self
            .segments
            .iter()
            .take_while(|segment| {
                end += segment.len();
                end <= offset
            })
            .count();
        let released: usize = self.segments.drain(..count).map(|s| s.len()).sum();
        self.base += released;
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.base = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_and_release() {
        let pool = SegmentPool::new(8, 2);
        let a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();
        assert!(matches!(pool.allocate(), Err(HttpError::Allocation)));
        assert_eq!(pool.available(), 0);

        pool.release(a);
        assert_eq!(pool.available(), 1);
        assert!(pool.allocate().is_ok());
    }

    #[test]
    fn append_fills_tail_before_allocating() {
        let pool = SegmentPool::new(4, 8);
        let mut chain = pool.chain_from(b"ab").unwrap();
        pool.append(&mut chain, b"cdefg").unwrap();

        assert_eq!(chain.segment_count(), 2);
        assert_eq!(chain.segment(0).unwrap().as_slice(), b"abcd");
        assert_eq!(chain.segment(1).unwrap().as_slice(), b"efg");
        assert_eq!(chain.to_vec(0, chain.len()), b"abcdefg");
    }

    #[test]
    fn locate_skips_empty_segments() {
        let mut chain = SegmentChain::new();
        chain.push(Segment::unpooled(b"ab"));
        chain.push(Segment::unpooled(b""));
        chain.push(Segment::unpooled(b"cd"));

        assert_eq!(chain.locate(2), Some((2, 0)));
        assert_eq!(chain.byte_at(3), Some(b'd'));
        assert_eq!(chain.locate(4), None);
        assert_eq!(chain.segment_start(2), 2);
    }

    #[test]
    fn copy_across_segments() {
        let mut chain = SegmentChain::new();
        chain.push(Segment::unpooled(b"hel"));
        chain.push(Segment::unpooled(b"lo"));

        let mut dst = [0u8; 4];
        assert_eq!(chain.copy_to(1, &mut dst), 4);
        assert_eq!(&dst, b"ello");
        assert_eq!(chain.copy_to(5, &mut dst), 0);
    }

    #[test]
    fn fill_keeps_only_read_bytes() {
        let pool = SegmentPool::new(16, 1);
        let mut segment = pool.allocate().unwrap();
        let buf = segment.begin_fill();
        buf[..3].copy_from_slice(b"xyz");
        segment.finish_fill(0, 3);
        assert_eq!(segment.as_slice(), b"xyz");
        assert_eq!(segment.remaining(), 13);
    }

    #[test]
    fn release_keeps_logical_offsets() {
        let pool = SegmentPool::new(4, 4);
        let mut chain = pool.chain_from(b"abcdefghij").unwrap();
        assert_eq!(pool.in_use(), 3);

        chain.release_before(9);
        assert_eq!(pool.in_use(), 1);
        assert_eq!(chain.retained_start(), 8);
        assert_eq!(chain.len(), 10);
        assert_eq!(chain.byte_at(8), Some(b'i'));
        assert_eq!(chain.byte_at(2), None);
        assert_eq!(chain.to_vec(8, 10), b"ij");
    }

    #[test]
    fn slices_follow_segments() {
        let mut chain = SegmentChain::new();
        chain.push(Segment::unpooled(b"head"));
        chain.push(Segment::unpooled(b"body"));

        let parts: Vec<&[u8]> = chain.slices(2, 7).collect();
        assert_eq!(parts, vec![&b"ad"[..], &b"bod"[..]]);
    }
}

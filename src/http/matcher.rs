//! Substring search that can be suspended at a chunk boundary and resumed
//! on the next chunk without looking back.
//!
//! The matcher keeps only the length of the pattern prefix matched so far.
//! A prefix-function table lets a mismatch fall back to the longest prefix
//! that is still a suffix of what was seen, so bytes already consumed from
//! an earlier chunk never need to be revisited.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The pattern ended at this index in the chunk (exclusive end).
    Complete(usize),
    /// The chunk ran out with this many pattern bytes matched at its tail.
    Partial(usize),
    NoMatch,
}

#[derive(Debug, Clone)]
pub struct PatternMatcher {
    pattern: Vec<u8>,
    fallback: Vec<usize>,
    matched: usize,
}

impl PatternMatcher {
    pub fn new(pattern: &[u8]) -> Self {
        let mut fallback = vec![0; pattern.len()];
        let mut k = 0;
        for i in 1..pattern.len() {
            while k > 0 && pattern[i] != pattern[k] {
                k = fallback[k - 1];
            }
            if pattern[i] == pattern[k] {
                k += 1;
            }
            fallback[i] = k;
        }

        Self {
            pattern: pattern.to_vec(),
            fallback,
            matched: 0,
        }
    }

    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    /// Number of pattern bytes matched by the bytes fed so far.
    pub fn matched(&self) -> usize {
        self.matched
    }

    /// Restores a partial-match count carried over from an earlier scan.
    pub fn resume(&mut self, matched: usize) {
        self.matched = matched.min(self.pattern.len().saturating_sub(1));
    }

    pub fn reset(&mut self) {
        self.matched = 0;
    }

    /// Feeds one byte; returns true when it completes the pattern.
    pub fn step(&mut self, byte: u8) -> bool {
        if self.pattern.is_empty() {
            return true;
        }

        while self.matched > 0 && byte != self.pattern[self.matched] {
            self.matched = self.fallback[self.matched - 1];
        }
        if byte == self.pattern[self.matched] {
            self.matched += 1;
        }

        if self.matched == self.pattern.len() {
            self.matched = 0;
            true
        } else {
            false
        }
    }

    /// Feeds a chunk, stopping at the first complete match.
    pub fn feed(&mut self, chunk: &[u8]) -> MatchOutcome {
        if self.pattern.is_empty() {
            return MatchOutcome::Complete(0);
        }

        for (i, &byte) in chunk.iter().enumerate() {
            if self.step(byte) {
                return MatchOutcome::Complete(i + 1);
            }
        }

        match self.matched {
            0 => MatchOutcome::NoMatch,
            n => MatchOutcome::Partial(n),
        }
    }
}

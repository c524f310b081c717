//! The bounded byte store that backs every [`Parser`](crate::engine::Parser).
//!
//! `Buffer` is a single fixed-capacity byte array with two cursors, `tail`
//! and `head`. The readable region is `[tail, head)`; everything else is
//! free space. Pushing past the end of the array triggers a compaction
//! (`[tail, head)` is shifted down to offset 0) rather than a reallocation:
//! capacity never grows on the hot path.

use std::fmt;

/// Configuration for a [`Buffer`].
///
/// Mirrors the teacher's builder-style config objects: small, `Copy`, and
/// consumed by value at construction time.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct BufferConfig {
    capacity: usize,
}

impl BufferConfig {
    /// The default capacity, matching the original implementation's default
    /// of 4095 bytes.
    pub const DEFAULT_CAPACITY: usize = 4095;

    /// Build a config with the given initial capacity.
    pub const fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }

    /// The configured capacity.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

/// An internal buffer-level failure.
///
/// Distinct from [`ParseError`](crate::error::ParseError): these are
/// expected signals consumed by the engine, not faults surfaced to a host
/// unless [`push`](Buffer::push) itself overflows.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BufferError {
    /// A `push` would have exceeded the buffer's capacity.
    Overflow,

    /// A `pull`-family call did not find enough readable bytes.
    ///
    /// The payload, when present, is the position a subsequent
    /// [`pull_until`](Buffer::pull_until) retry should resume scanning
    /// from, so the delimiter search never re-inspects bytes it has
    /// already ruled out.
    Starving(Option<usize>),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow => f.write_str("push exceeds buffer capacity"),
            Self::Starving(_) => f.write_str("buffer starving: not enough readable bytes"),
        }
    }
}

impl std::error::Error for BufferError {}

type BufferResult<T> = Result<T, BufferError>;

/// A bounded byte store with push/pull/peek/search primitives.
pub struct Buffer {
    buf: Vec<u8>,
    tail: usize,
    head: usize,
}

impl Buffer {
    /// Create a buffer using [`BufferConfig::default`].
    pub fn new() -> Self {
        Self::with_config(BufferConfig::default())
    }

    /// Create a buffer with an explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(BufferConfig::with_capacity(capacity))
    }

    /// Create a buffer from a [`BufferConfig`].
    pub fn with_config(config: BufferConfig) -> Self {
        assert!(config.capacity() >= 2, "buffer capacity must be > 1");
        Self {
            buf: vec![0u8; config.capacity()],
            tail: 0,
            head: 0,
        }
    }

    /// Total fixed capacity.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of readable bytes currently buffered, `head - tail`.
    pub fn data_size(&self) -> usize {
        self.head - self.tail
    }

    /// Number of bytes that can still be pushed, `capacity - head + tail`.
    pub fn available_size(&self) -> usize {
        self.buf.len() - self.head + self.tail
    }

    fn right_blank_size(&self) -> usize {
        self.buf.len() - self.head
    }

    /// Whether `available_size() == 0`.
    pub fn is_full(&self) -> bool {
        self.available_size() == 0
    }

    /// Whether the buffer currently holds no readable bytes.
    ///
    /// Matches the original implementation: a buffer that has been fully
    /// drained resets `head` to zero, so emptiness is exactly `head == 0`.
    pub fn is_empty(&self) -> bool {
        self.head == 0
    }

    /// Reset both cursors to zero without touching the underlying storage.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    /// Resize the backing storage, clearing all contents.
    pub fn resize(&mut self, new_capacity: usize) {
        assert!(new_capacity >= 2, "buffer capacity must be > 1");
        self.buf.resize(new_capacity, 0);
        self.clear();
    }

    /// A mutable view of the free region starting at `head`, for a caller
    /// that wants to write directly into the buffer (e.g. `recv_into`).
    pub fn next(&mut self) -> &mut [u8] {
        &mut self.buf[self.head..]
    }

    /// Advance `head` by `n`, as if `n` bytes had just been written into
    /// [`next`](Self::next)'s view.
    pub fn advance(&mut self, n: usize) {
        self.head += n;
    }

    fn adjust(&mut self) {
        let len = self.head - self.tail;
        if len == 0 {
            self.head = 0;
            self.tail = 0;
        } else {
            self.buf.copy_within(self.tail..self.head, 0);
            self.tail = 0;
            self.head = len;
        }
    }

    /// Copy `data` into the free region, compacting first if needed.
    pub fn push(&mut self, data: &[u8]) -> BufferResult<()> {
        let len = data.len();
        if len > self.available_size() {
            return Err(BufferError::Overflow);
        }
        if len > self.right_blank_size() {
            self.adjust();
        }
        self.buf[self.head..self.head + len].copy_from_slice(data);
        self.advance(len);
        Ok(())
    }

    /// Pull bytes written by an external source into [`next`](Self::next),
    /// e.g. after a blocking `read(2)` into that slice.
    pub fn push_from_reader<R: std::io::Read>(&mut self, mut reader: R) -> std::io::Result<usize> {
        let n = reader.read(self.next())?;
        self.advance(n);
        Ok(n)
    }

    /// Pull `n` readable bytes. `n == 0` pulls everything currently
    /// readable and resets the cursors to zero.
    pub fn pull(&mut self, n: usize) -> BufferResult<Vec<u8>> {
        if n == 0 {
            let res = self.buf[self.tail..self.head].to_vec();
            self.head = 0;
            self.tail = 0;
            return Ok(res);
        }
        if self.data_size() < n {
            return Err(BufferError::Starving(None));
        }
        let start = self.tail;
        self.tail += n;
        let res = self.buf[start..self.tail].to_vec();
        if self.head == self.tail {
            self.head = 0;
            self.tail = 0;
        }
        Ok(res)
    }

    /// Pull as much as is readable, requiring at least `min_n` bytes.
    pub fn pull_amap(&mut self, min_n: usize) -> BufferResult<Vec<u8>> {
        assert!(min_n >= 1, "min_n must be >= 1");
        if self.data_size() < min_n {
            return Err(BufferError::Starving(None));
        }
        self.pull(0)
    }

    /// Copy the first `n` readable bytes without consuming them.
    pub fn peek(&self, n: usize) -> BufferResult<Vec<u8>> {
        assert!(n >= 1, "n must be >= 1");
        if self.data_size() < n {
            return Err(BufferError::Starving(None));
        }
        Ok(self.buf[self.tail..self.tail + n].to_vec())
    }

    /// Decode an `n`-byte integer in the given byte order.
    pub fn pull_int(&mut self, n: usize, big_endian: bool, signed: bool) -> BufferResult<i128> {
        let bytes = self.pull(n)?;
        Ok(decode_int(&bytes, big_endian, signed))
    }

    /// Decode a fixed-size array of exactly `N` bytes.
    pub fn pull_array<const N: usize>(&mut self) -> BufferResult<[u8; N]> {
        let bytes = self.pull(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Search `[init_pos.unwrap_or(tail), head)` for `delim`.
    ///
    /// On a miss, returns `Starving(Some(resume_pos))` with
    /// `resume_pos = max(tail, head - len(delim) + 1)`, so a retry after
    /// more bytes arrive only rescans the tail end of what was already
    /// searched. On a hit at index `i`, advances `tail` to `i + delim.len()`
    /// and returns bytes `[old_tail, i + delim.len())` if `keep_tail`, else
    /// `[old_tail, i)`.
    pub fn pull_until(
        &mut self,
        delim: &[u8],
        init_pos: Option<usize>,
        keep_tail: bool,
    ) -> BufferResult<Vec<u8>> {
        assert!(!delim.is_empty(), "delim must not be empty");
        let start_search = init_pos.unwrap_or(self.tail);
        let haystack = &self.buf[start_search..self.head];
        match find_subslice(haystack, delim) {
            None => {
                let resume = self.head.saturating_sub(delim.len()).saturating_add(1);
                let resume = resume.max(self.tail);
                Err(BufferError::Starving(Some(resume)))
            }
            Some(offset) => {
                let index = start_search + offset;
                let start = self.tail;
                self.tail = index + delim.len();
                let end = if keep_tail { self.tail } else { index };
                Ok(self.buf[start..end].to_vec())
            }
        }
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("tail", &self.tail)
            .field("head", &self.head)
            .field("capacity", &self.buf.len())
            .finish()
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn decode_int(bytes: &[u8], big_endian: bool, signed: bool) -> i128 {
    let mut buf = [0u8; 16];
    let n = bytes.len();
    if big_endian {
        buf[16 - n..].copy_from_slice(bytes);
        let mut value = i128::from_be_bytes(buf);
        if signed && n < 16 && bytes[0] & 0x80 != 0 {
            let shift = (16 - n) * 8;
            value -= 1i128 << (128 - shift - 1) << 1;
        }
        if !signed {
            value = u128::from_be_bytes(buf) as i128;
        }
        value
    } else {
        buf[..n].copy_from_slice(bytes);
        let unsigned = u128::from_le_bytes(buf);
        if signed && n > 0 && bytes[n - 1] & 0x80 != 0 {
            let sign_extend = !0u128 << (n * 8);
            (unsigned | sign_extend) as i128
        } else {
            unsigned as i128
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pull_roundtrip() {
        let mut buf = Buffer::with_capacity(8);
        buf.push(b"abcd").unwrap();
        assert_eq!(buf.pull(2).unwrap(), b"ab");
        assert_eq!(buf.pull(2).unwrap(), b"cd");
        assert!(buf.is_empty());
    }

    #[test]
    fn push_overflow() {
        let mut buf = Buffer::with_capacity(4);
        assert_eq!(buf.push(b"abcde"), Err(BufferError::Overflow));
    }

    #[test]
    fn pull_starving() {
        let mut buf = Buffer::with_capacity(8);
        buf.push(b"ab").unwrap();
        assert_eq!(buf.pull(4), Err(BufferError::Starving(None)));
    }

    #[test]
    fn compaction_on_push() {
        let mut buf = Buffer::with_capacity(4);
        buf.push(b"ab").unwrap();
        buf.pull(2).unwrap();
        buf.push(b"cd").unwrap();
        assert_eq!(buf.pull(2).unwrap(), b"cd");
    }

    #[test]
    fn conservation_invariant() {
        let mut buf = Buffer::with_capacity(16);
        buf.push(b"hello").unwrap();
        buf.pull(2).unwrap();
        buf.push(b"world!!").unwrap();
        assert_eq!(buf.data_size() + buf.available_size(), buf.capacity());
    }

    #[test]
    fn pull_until_hit_and_miss() {
        let mut buf = Buffer::with_capacity(32);
        buf.push(b"foo\r\nbar").unwrap();
        let line = buf.pull_until(b"\r\n", None, false).unwrap();
        assert_eq!(line, b"foo");
        assert_eq!(buf.pull(3).unwrap(), b"bar");
    }

    #[test]
    fn pull_until_resume_position_is_monotone() {
        let mut buf = Buffer::with_capacity(32);
        buf.push(b"aaa").unwrap();
        let err = buf.pull_until(b"\r\n", None, false).unwrap_err();
        let resume = match err {
            BufferError::Starving(Some(pos)) => pos,
            _ => panic!("expected Starving with resume position"),
        };
        buf.push(b"a\r\n").unwrap();
        let line = buf.pull_until(b"\r\n", Some(resume), false).unwrap();
        assert_eq!(line, b"aaaa");
    }

    #[test]
    fn peek_does_not_consume() {
        let mut buf = Buffer::with_capacity(8);
        buf.push(b"hi").unwrap();
        assert_eq!(buf.peek(2).unwrap(), b"hi");
        assert_eq!(buf.pull(2).unwrap(), b"hi");
    }

    #[test]
    fn pull_int_big_and_little() {
        let mut buf = Buffer::with_capacity(8);
        buf.push(&[0x01, 0x11, 0x11]).unwrap();
        assert_eq!(buf.pull_int(3, true, false).unwrap(), 0x0111_11);
        buf.push(&[0x11, 0x11, 0x01]).unwrap();
        assert_eq!(buf.pull_int(3, false, false).unwrap(), 0x0111_11);
    }
}

//! Buffered, bounded-wait access to a [`ByteSource`]
//!
//! Every byte pulled from the source lands in a carryover buffer exactly once.
//! The decoder and the resynchronizer peek at that buffer and only consume
//! bytes once they have settled what those bytes are, so nothing already
//! pulled from the medium is ever lost or read twice.

use crate::constants::READ_CHUNK;
use crate::medium::ByteSource;
use bytes::{Buf, BytesMut};
use std::io;
use std::time::{Duration, Instant};

/// Carryover buffer in front of a byte source
pub struct ByteReader<S> {
    source: S,
    buf: BytesMut,
    chunk: Box<[u8]>,
}

impl<S: ByteSource> ByteReader<S> {
    /// Wrap a source
    pub fn new(source: S) -> Self {
        Self {
            source,
            buf: BytesMut::with_capacity(READ_CHUNK),
            chunk: vec![0u8; READ_CHUNK].into_boxed_slice(),
        }
    }

    /// Bytes pulled from the source but not yet consumed
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the carryover buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop `n` bytes from the front of the buffer
    pub fn consume(&mut self, n: usize) {
        self.buf.advance(n.min(self.buf.len()));
    }

    /// Remove and return `n` bytes from the front of the buffer
    pub fn take(&mut self, n: usize) -> BytesMut {
        self.buf.split_to(n.min(self.buf.len()))
    }

    /// The wrapped source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Pull once from the source, waiting at most `timeout`
    ///
    /// Returns the number of new bytes.
    pub fn pull(&mut self, timeout: Duration) -> io::Result<usize> {
        let n = self.source.read_timeout(&mut self.chunk, timeout)?;
        self.buf.extend_from_slice(&self.chunk[..n]);
        Ok(n)
    }

    /// Wait until at least one byte is buffered
    ///
    /// Returns immediately if carryover bytes exist; otherwise makes a single
    /// bounded read, which may return early if the source was interrupted.
    pub fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        if !self.buf.is_empty() {
            return Ok(true);
        }
        self.pull(timeout)?;
        Ok(!self.buf.is_empty())
    }

    /// Keep pulling until `n` bytes are buffered or `deadline` passes
    pub fn fill_to(&mut self, n: usize, deadline: Instant) -> io::Result<bool> {
        while self.buf.len() < n {
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            self.pull(deadline - now)?;
        }
        Ok(true)
    }
}

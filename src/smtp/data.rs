//! Accumulation of the `DATA` payload.
//!
//! Chunks arrive as they are read off the wire: one line, or a piece of an
//! overlong line. The buffer undoes dot-stuffing, recognises the lone `.`
//! terminator, and stops retaining bytes once the size limit is crossed while
//! still consuming input up to the terminator.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataEvent {
    /// Keep reading.
    More,
    /// The terminating `.` line was seen.
    Done,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("message of at least {received} bytes exceeds the {limit} byte limit")]
pub struct Oversized {
    pub limit: usize,
    pub received: usize,
}

#[derive(Debug)]
pub struct DataBuffer {
    buf: Vec<u8>,
    limit: usize,
    received: usize,
    overflowed: bool,
    at_line_start: bool,
}

impl DataBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            received: 0,
            overflowed: false,
            at_line_start: true,
        }
    }

    /// Bytes the buffer may still accept before overflowing.
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.received)
    }

    pub fn push(&mut self, chunk: &[u8]) -> DataEvent {
        let line_start = self.at_line_start;
        self.at_line_start = chunk.ends_with(b"\n");
        if line_start && (chunk == b".\r\n" || chunk == b".\n") {
            return DataEvent::Done;
        }
        let data = if line_start && chunk.starts_with(b".") {
            &chunk[1..]
        } else {
            chunk
        };
        self.received = self.received.saturating_add(data.len());
        if self.overflowed {
            return DataEvent::More;
        }
        if self.received > self.limit {
            self.overflowed = true;
            self.buf = Vec::new();
            return DataEvent::More;
        }
        self.buf.extend_from_slice(data);
        DataEvent::More
    }

    /// The complete message, or the size failure.
    pub fn finish(self) -> Result<Vec<u8>, Oversized> {
        if self.overflowed {
            return Err(Oversized {
                limit: self.limit,
                received: self.received,
            });
        }
        Ok(self.buf)
    }
}

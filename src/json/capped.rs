//! Purpose: Byte-capped wrapper around the body stream.
//! Exports: `CappedReader`, `is_body_too_large`.
//! Role: Turns "more than N bytes" into a distinguishable read error for the parser.
//! Invariants: Never pulls more than `max + 1` bytes from the inner reader.
use std::fmt;
use std::io::{self, Read};

#[derive(Debug)]
struct BodyTooLarge {
    max: u64,
}

impl fmt::Display for BodyTooLarge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body exceeds {} bytes", self.max)
    }
}

impl std::error::Error for BodyTooLarge {}

pub struct CappedReader<R> {
    inner: R,
    max: u64,
    count: u64,
}

impl<R: Read> CappedReader<R> {
    pub fn new(inner: R, max: u64) -> Self {
        Self {
            inner,
            max,
            count: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.count
    }

    fn exceeded(&self) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, BodyTooLarge { max: self.max })
    }
}

impl<R: Read> Read for CappedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.count > self.max {
            return Err(self.exceeded());
        }
        let allowed = self.max.saturating_sub(self.count).saturating_add(1);
        let len = usize::try_from(allowed).map_or(buf.len(), |allowed| buf.len().min(allowed));
        let n = self.inner.read(&mut buf[..len])?;
        self.count += n as u64;
        if self.count > self.max {
            return Err(self.exceeded());
        }
        Ok(n)
    }
}

/// True when `err` came from a `CappedReader` crossing its cap.
pub fn is_body_too_large(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.downcast_ref::<BodyTooLarge>().is_some())
}

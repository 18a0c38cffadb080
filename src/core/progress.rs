//! Byte-counting writer that reports a completion fraction after every write.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

const CHUNK_SIZE: usize = 64 * 1024;

/// Failure while pumping bytes through a [`ProgressWriter`].
///
/// Every variant records how many bytes had been accepted by the sink before
/// the transfer stopped.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("read failed after {transferred} bytes: {source}")]
    Read {
        transferred: u64,
        #[source]
        source: io::Error,
    },

    #[error("write failed after {transferred} bytes: {source}")]
    Write {
        transferred: u64,
        #[source]
        source: io::Error,
    },

    #[error("cancelled after {transferred} bytes")]
    Cancelled { transferred: u64 },
}

impl TransferError {
    pub fn transferred(&self) -> u64 {
        match self {
            TransferError::Read { transferred, .. }
            | TransferError::Write { transferred, .. }
            | TransferError::Cancelled { transferred } => *transferred,
        }
    }
}

/// Shared flag checked between chunks. Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Wraps a sink and calls `on_progress` with `bytes_written / expected_size`
/// after each successful write.
///
/// The callback is invoked synchronously, once per write, with no throttling.
/// An expected size of `0` means "unknown" and always reports `1.0`. When the
/// declared size is too small the fraction is passed through above `1.0`.
///
/// The sink is borrowed or owned as the caller chooses (`&mut File` works);
/// the writer never closes it.
pub struct ProgressWriter<W, F> {
    sink: W,
    expected: u64,
    written: u64,
    on_progress: F,
    cancel: Option<CancelToken>,
}

impl<W, F> ProgressWriter<W, F>
where
    W: Write,
    F: FnMut(f64),
{
    pub fn new(sink: W, expected_size: u64, on_progress: F) -> Self {
        Self {
            sink,
            expected: expected_size,
            written: 0,
            on_progress,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn expected_size(&self) -> u64 {
        self.expected
    }

    pub fn fraction(&self) -> f64 {
        if self.expected == 0 {
            1.0
        } else {
            self.written as f64 / self.expected as f64
        }
    }

    /// Forward `chunk` verbatim to the sink.
    ///
    /// On failure the running total is left as it was and no progress is reported.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<usize, TransferError> {
        self.sink
            .write_all(chunk)
            .map_err(|source| TransferError::Write {
                transferred: self.written,
                source,
            })?;
        self.record(chunk.len());
        Ok(chunk.len())
    }

    /// Pull chunks from `source` until it is exhausted, writing each one.
    ///
    /// Returns the number of bytes copied by this call. Stops at the first
    /// read or write error; there is no retry apart from `Interrupted` reads.
    pub fn copy_from<R: Read>(&mut self, mut source: R) -> Result<u64, TransferError> {
        let start = self.written;
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(TransferError::Cancelled {
                    transferred: self.written,
                });
            }

            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(TransferError::Read {
                        transferred: self.written,
                        source,
                    })
                }
            };

            self.write_chunk(&buf[..n])?;
        }

        Ok(self.written - start)
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    fn record(&mut self, n: usize) {
        self.written += n as u64;
        let fraction = self.fraction();
        (self.on_progress)(fraction);
    }
}

impl<W, F> Write for ProgressWriter<W, F>
where
    W: Write,
    F: FnMut(f64),
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.sink.write(buf)?;
        self.record(n);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

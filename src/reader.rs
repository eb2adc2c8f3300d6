//! Pull-based reading of flow logs from any sequential byte source.

use std::io::Read;

use bytes::BytesMut;
use tokio_util::codec::Decoder as _;

use crate::decoder::{DecodeOutcome, DecoderStats, FlowLogDecoder, FlowLogDecoderConfig};
use crate::error::StreamError;

/// Bytes requested from the source per refill.
const READ_CHUNK: usize = 8 * 1024;

/// Iterator over the decode outcomes of a sequential byte source.
///
/// Drives a [`FlowLogDecoder`] over any [`std::io::Read`] — a file, a
/// socket, an in-memory buffer — carrying partially-buffered trailing bytes
/// across reads, so the source may still be growing while it is consumed.
/// The iteration ends at a clean end of stream, after a strict-mode halt, or
/// after the single fatal `Err` item produced by a source I/O failure.
///
/// For async sources, use the decoder directly with
/// `tokio_util::codec::FramedRead`; this type is the synchronous
/// counterpart.
#[derive(Debug)]
pub struct LogReader<R> {
    source: R,
    decoder: FlowLogDecoder,
    buffer: BytesMut,
    eof: bool,
    done: bool,
}

impl<R: Read> LogReader<R> {
    /// Creates a reader with the default decoder configuration.
    pub fn new(source: R) -> Self {
        Self::with_config(source, FlowLogDecoderConfig::default())
    }

    /// Creates a reader with the given decoder configuration.
    pub fn with_config(source: R, config: FlowLogDecoderConfig) -> Self {
        Self {
            source,
            decoder: config.build(),
            buffer: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
            done: false,
        }
    }

    /// Counters accumulated by the underlying decoder.
    pub const fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    fn fill(&mut self) -> std::io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.source.read(&mut chunk) {
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }
}

impl<R: Read> Iterator for LogReader<R> {
    type Item = Result<DecodeOutcome, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let step = if self.eof {
                self.decoder.decode_eof(&mut self.buffer)
            } else {
                self.decoder.decode(&mut self.buffer)
            };
            match step {
                Ok(Some(outcome)) => {
                    if self.decoder.is_halted() {
                        self.done = true;
                    }
                    return Some(Ok(outcome));
                }
                Ok(None) => {
                    if self.eof || self.decoder.is_halted() {
                        self.done = true;
                        return None;
                    }
                    match self.fill() {
                        Ok(0) => self.eof = true,
                        Ok(_) => {}
                        Err(err) => {
                            self.done = true;
                            return Some(Err(StreamError::from(err)));
                        }
                    }
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

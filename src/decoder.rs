//! Incremental decoding of a flow log byte stream.
//!
//! [`FlowLogDecoder`] implements [`tokio_util::codec::Decoder`]: feed it
//! bytes as they arrive and it yields one [`DecodeOutcome`] per record
//! attempt. Returning `Ok(None)` means "need more bytes" — transient
//! truncation is a suspension, not an error, until the source signals
//! closure via `decode_eof`.

use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::Decoder;

use crate::cursor::ByteCursor;
use crate::error::{DecodeError, StreamError};
use crate::record::{
    decode_body, decode_header, FlowRecord, RecordHeader, FORMAT_VERSION_1, HEADER_LEN,
    RECORD_MAGIC,
};

/// The result of one record attempt.
///
/// Decode failures are ordinary values in the outcome sequence; whether the
/// sequence continues past one depends on the error's structural class and
/// the configured [`RecoveryPolicy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A fully decoded record.
    Record(FlowRecord),
    /// A failed record attempt, with the failure offset inside the error.
    Error(DecodeError),
}

impl DecodeOutcome {
    /// The decoded record, if this outcome is one.
    pub const fn as_record(&self) -> Option<&FlowRecord> {
        match self {
            Self::Record(record) => Some(record),
            Self::Error(_) => None,
        }
    }

    /// The decode error, if this outcome is one.
    pub const fn as_error(&self) -> Option<&DecodeError> {
        match self {
            Self::Record(_) => None,
            Self::Error(err) => Some(err),
        }
    }
}

/// Recovery policy applied when the stream structure is violated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// The first structural error stops the sequence permanently.
    #[default]
    Strict,
    /// Structural errors are reported, then the decoder scans forward for
    /// the next record magic and resumes.
    Lenient,
}

/// Config used to build a `FlowLogDecoder`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FlowLogDecoderConfig {
    /// Recovery policy for structural stream errors.
    #[serde(default)]
    pub recovery_policy: RecoveryPolicy,

    /// Upper bound on the declared record size, in bytes. Records declaring
    /// more are rejected before their body is buffered, bounding memory use
    /// against corrupt lengths.
    #[serde(default = "default_max_record_size")]
    pub max_record_size: usize,

    /// Format versions this decoder accepts.
    #[serde(default = "default_known_versions")]
    pub known_versions: Vec<u8>,
}

const fn default_max_record_size() -> usize {
    64 * 1024
}

fn default_known_versions() -> Vec<u8> {
    vec![FORMAT_VERSION_1]
}

impl Default for FlowLogDecoderConfig {
    fn default() -> Self {
        Self {
            recovery_policy: RecoveryPolicy::default(),
            max_record_size: default_max_record_size(),
            known_versions: default_known_versions(),
        }
    }
}

impl FlowLogDecoderConfig {
    /// Build the `FlowLogDecoder` from this configuration.
    pub fn build(&self) -> FlowLogDecoder {
        FlowLogDecoder::new(self.clone())
    }
}

/// Counters accumulated over the life of one decoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Records decoded successfully.
    pub records: u64,
    /// Error outcomes emitted.
    pub record_errors: u64,
    /// Desynchronized regions entered (lenient mode).
    pub resyncs: u64,
    /// Bytes discarded while hunting for a record boundary.
    pub skipped_bytes: u64,
    /// Records that carried unrecognized fields.
    pub unrecognized_fields: u64,
}

#[derive(Clone, Copy, Debug)]
enum State {
    /// At a record boundary, waiting for a full prologue.
    Header,
    /// Prologue consumed, waiting for the declared body.
    Body {
        header: RecordHeader,
        record_start: u64,
    },
    /// Desynchronized; scanning for the next record magic.
    Resync,
    /// Terminal. Strict-mode structural stop, or the source ended.
    Halted,
}

/// Streaming decoder for a flow log byte source.
///
/// One instance per stream. The decoder owns the stream position and any
/// partially-buffered trailing bytes; everything below it is stateless.
/// Abandoning the decoder between outcomes leaks nothing — no partial
/// record is ever exposed.
#[derive(Debug)]
pub struct FlowLogDecoder {
    config: FlowLogDecoderConfig,
    state: State,
    /// Absolute stream offset of the first unconsumed buffered byte.
    offset: u64,
    stats: DecoderStats,
}

impl FlowLogDecoder {
    /// Creates a decoder with the given configuration.
    pub fn new(config: FlowLogDecoderConfig) -> Self {
        Self {
            config,
            state: State::Header,
            offset: 0,
            stats: DecoderStats::default(),
        }
    }

    /// Counters accumulated so far.
    pub const fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Whether the decoder has stopped permanently.
    pub const fn is_halted(&self) -> bool {
        matches!(self.state, State::Halted)
    }

    fn consume(&mut self, src: &mut BytesMut, n: usize) {
        src.advance(n);
        self.offset += n as u64;
    }

    fn emit_error(&mut self, err: DecodeError) -> Option<DecodeOutcome> {
        self.stats.record_errors += 1;
        Some(DecodeOutcome::Error(err))
    }

    /// Enters recovery after a structural error: halt outright in strict
    /// mode, otherwise start scanning for the next magic.
    fn recover(&mut self, src: &mut BytesMut, discard: usize) {
        match self.config.recovery_policy {
            RecoveryPolicy::Strict => self.state = State::Halted,
            RecoveryPolicy::Lenient => {
                if discard > 0 {
                    self.stats.skipped_bytes += discard as u64;
                    self.consume(src, discard);
                }
                self.stats.resyncs += 1;
                self.state = State::Resync;
            }
        }
    }

    fn decode_at_header(
        &mut self,
        src: &mut BytesMut,
    ) -> Option<Option<DecodeOutcome>> {
        if src.len() < HEADER_LEN {
            return Some(None);
        }
        let base = self.offset;
        let mut cursor = ByteCursor::new(&src[..HEADER_LEN]);
        match decode_header(
            &mut cursor,
            base,
            &self.config.known_versions,
            self.config.max_record_size,
        ) {
            Ok(header) => {
                self.consume(src, HEADER_LEN);
                self.state = State::Body {
                    header,
                    record_start: base,
                };
                None
            }
            Err(err @ DecodeError::UnsupportedVersion { .. }) => {
                // The length field is still readable; skipping the record
                // whole is best effort and only sound if the length is sane.
                let declared = u16::from_be_bytes([src[3], src[4]]) as usize;
                let skippable =
                    declared >= HEADER_LEN && declared <= self.config.max_record_size;
                match self.config.recovery_policy {
                    RecoveryPolicy::Strict => {
                        tracing::warn!(offset = base, %err, "halting on structural error");
                        self.state = State::Halted;
                    }
                    RecoveryPolicy::Lenient if skippable => {
                        if src.len() < declared {
                            // Wait for the rest of the record before
                            // emitting, so the skip and the outcome happen
                            // together exactly once.
                            return Some(None);
                        }
                        self.stats.skipped_bytes += declared as u64;
                        self.consume(src, declared);
                    }
                    RecoveryPolicy::Lenient => {
                        self.recover(src, RECORD_MAGIC.len());
                    }
                }
                Some(self.emit_error(err))
            }
            Err(err) => {
                // BadMagic or BadLength; both desynchronize. A bad-magic
                // scan may resume from this very position (these bytes are
                // not a magic, so the scan cannot stall on them); a bad
                // length must first step past the valid magic it sits
                // behind.
                let discard = match err {
                    DecodeError::BadMagic { .. } => 0,
                    _ => RECORD_MAGIC.len(),
                };
                if matches!(self.config.recovery_policy, RecoveryPolicy::Strict) {
                    tracing::warn!(offset = base, %err, "halting on structural error");
                }
                self.recover(src, discard);
                Some(self.emit_error(err))
            }
        }
    }

    fn decode_at_body(
        &mut self,
        src: &mut BytesMut,
        header: RecordHeader,
        record_start: u64,
    ) -> Option<Option<DecodeOutcome>> {
        let body_len = header.body_len();
        if src.len() < body_len {
            return Some(None);
        }
        let mut cursor = ByteCursor::new(&src[..body_len]);
        let result = decode_body(&mut cursor, &header, record_start);
        // The declared boundary is trusted for everything but FieldOverrun,
        // and even there the next plausible sync point is past the window.
        self.consume(src, body_len);
        self.state = State::Header;
        match result {
            Ok(record) => {
                if record.unrecognized_fields {
                    self.stats.unrecognized_fields += 1;
                }
                self.stats.records += 1;
                tracing::trace!(
                    offset = record_start,
                    mask = header.field_mask,
                    "decoded flow record"
                );
                Some(Some(DecodeOutcome::Record(record)))
            }
            Err(err) => {
                if err.is_structural() {
                    self.recover(src, 0);
                }
                Some(self.emit_error(err))
            }
        }
    }

    fn resync(&mut self, src: &mut BytesMut) -> Option<Option<DecodeOutcome>> {
        match memchr::memmem::find(src, &RECORD_MAGIC) {
            Some(found) => {
                if found > 0 {
                    self.stats.skipped_bytes += found as u64;
                    self.consume(src, found);
                }
                tracing::warn!(offset = self.offset, "resynchronized on record magic");
                self.state = State::Header;
                None
            }
            None => {
                // Keep one byte: the magic could straddle the chunk edge.
                let keep = RECORD_MAGIC.len() - 1;
                if src.len() > keep {
                    let n = src.len() - keep;
                    self.stats.skipped_bytes += n as u64;
                    self.consume(src, n);
                }
                Some(None)
            }
        }
    }
}

impl Default for FlowLogDecoder {
    fn default() -> Self {
        Self::new(FlowLogDecoderConfig::default())
    }
}

impl Decoder for FlowLogDecoder {
    type Item = DecodeOutcome;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let step = match self.state {
                State::Halted => {
                    // Drain so a framed driver cannot buffer without bound.
                    let n = src.len();
                    self.consume(src, n);
                    Some(None)
                }
                State::Header => self.decode_at_header(src),
                State::Body {
                    header,
                    record_start,
                } => self.decode_at_body(src, header, record_start),
                State::Resync => self.resync(src),
            };
            if let Some(result) = step {
                return Ok(result);
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(outcome) = self.decode(src)? {
            return Ok(Some(outcome));
        }
        match self.state {
            State::Halted => Ok(None),
            State::Resync => {
                // The tail of a desynchronized region; nothing left to sync
                // on.
                let n = src.len();
                self.stats.skipped_bytes += n as u64;
                self.consume(src, n);
                self.state = State::Halted;
                Ok(None)
            }
            State::Header => {
                if src.is_empty() {
                    // Source ended exactly at a record boundary.
                    self.state = State::Halted;
                    return Ok(None);
                }
                // Mid-header, or a lenient unsupported-version record whose
                // declared bytes never arrived.
                let needed = if src.len() >= HEADER_LEN {
                    u16::from_be_bytes([src[3], src[4]]) as usize
                } else {
                    HEADER_LEN
                };
                let err = DecodeError::Truncated {
                    offset: self.offset,
                    needed,
                    available: src.len(),
                };
                let n = src.len();
                self.consume(src, n);
                self.state = State::Halted;
                Ok(self.emit_error(err))
            }
            State::Body {
                header,
                record_start,
            } => {
                let err = DecodeError::Truncated {
                    offset: record_start,
                    needed: header.declared_length as usize,
                    available: HEADER_LEN + src.len(),
                };
                let n = src.len();
                self.consume(src, n);
                self.state = State::Halted;
                Ok(self.emit_error(err))
            }
        }
    }
}

//! Errors surfaced while decoding a flow log stream.

use snafu::Snafu;

/// A failure decoding one record attempt.
///
/// Every variant carries the absolute stream offset of the failure, so a
/// caller can report "decoded K records, then failed at byte offset B".
/// Decode failures are yielded as values in the outcome sequence
/// ([`DecodeOutcome::Error`](crate::DecodeOutcome::Error)), never as panics;
/// only source I/O failures use the separate, fatal [`StreamError`] channel.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
pub enum DecodeError {
    /// The source ended inside a record and is closed, so the rest of the
    /// record can never arrive. While the source is still open, missing bytes
    /// suspend decoding instead of producing this error.
    #[snafu(display(
        "record at offset {offset} truncated: needed {needed} bytes, had {available}"
    ))]
    Truncated {
        /// Offset of the start of the truncated record attempt.
        offset: u64,
        /// Total bytes the record attempt required.
        needed: usize,
        /// Bytes actually present before the source closed.
        available: usize,
    },

    /// The bytes at a record boundary are not the record magic. The stream is
    /// desynchronized; everything after this offset is suspect.
    #[snafu(display("bad magic at offset {offset}: found {found:02x?}"))]
    BadMagic {
        /// Offset where the magic was expected.
        offset: u64,
        /// The bytes found instead.
        found: [u8; 2],
    },

    /// Valid magic, but a format version this decoder was not configured to
    /// accept.
    #[snafu(display("unsupported format version {version} at offset {offset}"))]
    UnsupportedVersion {
        /// Offset of the version byte.
        offset: u64,
        /// The version found on the wire.
        version: u8,
    },

    /// The declared record length is smaller than the header or larger than
    /// the configured maximum, so it cannot be trusted to find the next
    /// record boundary.
    #[snafu(display(
        "declared record length {declared} at offset {offset} is out of bounds (max {max})"
    ))]
    BadLength {
        /// Offset of the length field.
        offset: u64,
        /// The length found on the wire.
        declared: u16,
        /// The configured maximum record size.
        max: usize,
    },

    /// The field mask requires more bytes than the declared record length
    /// contains. Mask and length disagree; the record is structurally
    /// corrupt.
    #[snafu(display("field {field} overruns the declared record length at offset {offset}"))]
    FieldOverrun {
        /// Offset of the first byte the field needed beyond the record.
        offset: u64,
        /// The field being decoded when the record ran out.
        field: &'static str,
    },

    /// An address field carried a family tag outside the known set. The
    /// address length cannot be determined, so the record cannot be decoded.
    #[snafu(display(
        "unknown address family {family} for field {field} at offset {offset}"
    ))]
    UnknownAddressFamily {
        /// Offset of the family tag byte.
        offset: u64,
        /// The address field being decoded.
        field: &'static str,
        /// The family tag found on the wire.
        family: u8,
    },

    /// A field's bytes are not a valid instance of its type. Reserved for
    /// field types whose encodings have invalid bit patterns; in format
    /// version 1 the family tag is the only such validation and reports the
    /// more specific [`DecodeError::UnknownAddressFamily`].
    #[snafu(display("malformed field {field} at offset {offset}"))]
    Malformed {
        /// Offset of the offending bytes.
        offset: u64,
        /// The field that failed to decode.
        field: &'static str,
    },
}

impl DecodeError {
    /// Absolute stream offset of the failure.
    pub const fn offset(&self) -> u64 {
        match self {
            Self::Truncated { offset, .. }
            | Self::BadMagic { offset, .. }
            | Self::UnsupportedVersion { offset, .. }
            | Self::BadLength { offset, .. }
            | Self::FieldOverrun { offset, .. }
            | Self::UnknownAddressFamily { offset, .. }
            | Self::Malformed { offset, .. } => *offset,
        }
    }

    /// Whether this error desynchronizes the stream.
    ///
    /// Structural errors halt a strict-mode decoder; a lenient decoder
    /// recovers by scanning for the next record magic (or, for an
    /// unsupported version with a sane length, by skipping the record
    /// whole). Non-structural errors poison one record whose boundary is
    /// still known, so decoding continues at the next record under either
    /// policy.
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::BadMagic { .. }
                | Self::UnsupportedVersion { .. }
                | Self::BadLength { .. }
                | Self::FieldOverrun { .. }
        )
    }
}

/// A failure of the underlying byte source.
///
/// Unlike [`DecodeError`], this is not an outcome: it terminates the
/// sequence immediately regardless of recovery policy.
#[derive(Debug, Snafu)]
pub enum StreamError {
    /// The byte source failed.
    #[snafu(display("i/o error reading flow log: {source}"))]
    Io {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl From<std::io::Error> for StreamError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source }
    }
}

//! Decoder for the binary, append-only log format written by a network flow
//! collector.
//!
//! A log file is a sequence of self-describing records: a fixed prologue
//! (magic, version, declared length, field-presence mask) followed by the
//! present fields' encodings in a canonical, versioned order. This crate
//! turns such a byte stream — a file, a socket, or an in-memory buffer,
//! possibly still being appended to — into typed, validated [`FlowRecord`]s,
//! treating the input as untrusted: every read is bounds-checked, every
//! declared length is sanity-checked before buffering, and malformed input
//! becomes a typed error outcome, never a panic.
//!
//! Decode-only: this crate never writes records.
//!
//! ```
//! use flowlog_parser::{DecodeOutcome, LogReader};
//!
//! let reader = LogReader::new(std::io::Cursor::new(Vec::new()));
//! for outcome in reader {
//!     match outcome.expect("source i/o failure") {
//!         DecodeOutcome::Record(record) => println!("{:?}", record.src_addr),
//!         DecodeOutcome::Error(err) => eprintln!("skipping: {err}"),
//!     }
//! }
//! ```

#![deny(missing_docs)]
#![deny(warnings)]

pub mod cursor;
pub mod decoder;
pub mod error;
pub mod field;
pub mod reader;
pub mod record;

pub use cursor::{ByteCursor, Underrun};
pub use decoder::{
    DecodeOutcome, DecoderStats, FlowLogDecoder, FlowLogDecoderConfig, RecoveryPolicy,
};
pub use error::{DecodeError, StreamError};
pub use field::{AddressFamily, FieldKind, FlowTimestamp, FIELDS_V1, KNOWN_MASK_V1};
pub use reader::LogReader;
pub use record::{
    decode_body, decode_header, FlowRecord, RecordHeader, FORMAT_VERSION_1, HEADER_LEN,
    RECORD_MAGIC,
};

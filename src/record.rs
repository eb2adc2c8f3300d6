//! Record header and body decoding.
//!
//! A record is a fixed 9-byte prologue (magic, version, declared length,
//! field mask) followed by the encodings of the present fields in canonical
//! order. The header and body decoders here are pure: they consume from a
//! caller-supplied [`ByteCursor`] and hold no state of their own.

use std::net::IpAddr;

use crate::cursor::ByteCursor;
use crate::error::DecodeError;
use crate::field::{
    self, FieldKind, FlowTimestamp, FIELDS_V1, KNOWN_MASK_V1,
};

/// Byte pattern opening every record.
pub const RECORD_MAGIC: [u8; 2] = [0xf5, 0x0c];

/// The format version this crate decodes.
pub const FORMAT_VERSION_1: u8 = 1;

/// Wire size of the fixed record prologue: magic, version, declared length,
/// field mask.
pub const HEADER_LEN: usize = 9;

/// The fixed prologue of one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    /// On-disk format version.
    pub version: u8,
    /// Total record size in bytes, header included.
    pub declared_length: u16,
    /// Field presence mask, unknown bits preserved.
    pub field_mask: u32,
}

impl RecordHeader {
    /// Body size in bytes: declared length minus the prologue.
    pub const fn body_len(&self) -> usize {
        self.declared_length as usize - HEADER_LEN
    }

    /// Mask bits beyond the known field list for this version.
    pub const fn unknown_mask_bits(&self) -> u32 {
        self.field_mask & !KNOWN_MASK_V1
    }
}

/// Decodes and validates the record prologue.
///
/// `base` is the absolute stream offset of the record start, used for error
/// reporting. Validation order: magic byte-for-byte, then version against
/// `known_versions`, then declared length against the header size and
/// `max_record_size`. The cursor must hold at least [`HEADER_LEN`] bytes;
/// buffering enough of the stream first is the caller's job.
pub fn decode_header(
    cursor: &mut ByteCursor<'_>,
    base: u64,
    known_versions: &[u8],
    max_record_size: usize,
) -> Result<RecordHeader, DecodeError> {
    let truncated = |u: crate::cursor::Underrun| DecodeError::Truncated {
        offset: base,
        needed: HEADER_LEN,
        available: u.position + u.available,
    };

    let magic = cursor.read_exact(2).map_err(truncated)?;
    if magic != RECORD_MAGIC {
        return Err(DecodeError::BadMagic {
            offset: base,
            found: [magic[0], magic[1]],
        });
    }

    let version = cursor.read_u8().map_err(truncated)?;
    let declared_length = cursor.read_u16().map_err(truncated)?;
    let field_mask = cursor.read_u32().map_err(truncated)?;

    if !known_versions.contains(&version) {
        return Err(DecodeError::UnsupportedVersion {
            offset: base + 2,
            version,
        });
    }

    if (declared_length as usize) < HEADER_LEN || declared_length as usize > max_record_size {
        return Err(DecodeError::BadLength {
            offset: base + 3,
            declared: declared_length,
            max: max_record_size,
        });
    }

    Ok(RecordHeader {
        version,
        declared_length,
        field_mask,
    })
}

/// One decoded flow record.
///
/// Contains exactly the fields whose mask bit was set; absent fields are
/// `None`, never placeholders. All data is copied out of the input buffer
/// during decode, so the record owns itself and outlives the bytes it came
/// from. Immutable once built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlowRecord {
    /// Format version the record was decoded from.
    pub version: u8,
    /// Raw field mask as it appeared on disk, unknown bits preserved.
    pub field_mask: u32,
    /// Whether the record carried content the decoder did not interpret:
    /// unknown mask bits, or declared bytes beyond the known field list.
    /// Non-fatal; the skipped bytes are gone but the record is complete.
    pub unrecognized_fields: bool,
    /// Address of the exporting agent.
    pub agent_addr: Option<IpAddr>,
    /// Source address.
    pub src_addr: Option<IpAddr>,
    /// Destination address.
    pub dst_addr: Option<IpAddr>,
    /// Next-hop gateway address.
    pub gateway_addr: Option<IpAddr>,
    /// Source port.
    pub src_port: Option<u16>,
    /// Destination port.
    pub dst_port: Option<u16>,
    /// IP protocol number.
    pub protocol: Option<u8>,
    /// Type-of-service byte.
    pub tos: Option<u8>,
    /// TCP flags seen on the flow.
    pub tcp_flags: Option<u8>,
    /// Packet count.
    pub packets: Option<u64>,
    /// Octet count.
    pub octets: Option<u64>,
    /// Flow start time.
    pub start_time: Option<FlowTimestamp>,
    /// Flow finish time.
    pub finish_time: Option<FlowTimestamp>,
    /// Input interface index.
    pub if_index_in: Option<u32>,
    /// Output interface index.
    pub if_index_out: Option<u32>,
    /// Source autonomous-system number.
    pub src_as: Option<u32>,
    /// Destination autonomous-system number.
    pub dst_as: Option<u32>,
    /// Operator-assigned flow tag.
    pub tag: Option<u32>,
    /// When the collector received the flow, whole seconds.
    pub recv_time: Option<u32>,
}

impl FlowRecord {
    /// Mask bits the decoder did not recognize for this record's version.
    pub const fn unrecognized_field_bits(&self) -> u32 {
        self.field_mask & !KNOWN_MASK_V1
    }

    /// The known fields present on this record, in canonical order.
    pub fn present_fields(&self) -> impl Iterator<Item = FieldKind> + '_ {
        FIELDS_V1
            .into_iter()
            .filter(|field| self.field_mask & field.mask_bit() != 0)
    }
}

/// Decodes a record body.
///
/// `cursor` must span exactly the record's body — `declared_length` minus the
/// prologue — and nothing more; the window boundary is what turns a
/// mask/length disagreement into [`DecodeError::FieldOverrun`] instead of a
/// read past the record. `record_start` is the absolute stream offset of the
/// record's first byte.
///
/// Fields decode in canonical order; unset bits consume nothing. Declared
/// bytes left over after the known fields, and mask bits beyond the known
/// list, mark the record as carrying unrecognized fields: those bytes are
/// skipped without interpretation and the record is still produced.
pub fn decode_body(
    cursor: &mut ByteCursor<'_>,
    header: &RecordHeader,
    record_start: u64,
) -> Result<FlowRecord, DecodeError> {
    let body_base = record_start + HEADER_LEN as u64;
    let mut record = FlowRecord {
        version: header.version,
        field_mask: header.field_mask,
        ..FlowRecord::default()
    };

    for kind in FIELDS_V1 {
        if header.field_mask & kind.mask_bit() == 0 {
            continue;
        }
        decode_field(cursor, kind, &mut record)
            .map_err(|err| err.into_decode_error(body_base, kind))?;
    }

    let trailing = cursor.remaining();
    if trailing > 0 || header.unknown_mask_bits() != 0 {
        record.unrecognized_fields = true;
        tracing::warn!(
            offset = record_start,
            unknown_bits = header.unknown_mask_bits(),
            trailing_bytes = trailing,
            "unrecognized fields present; bytes skipped without interpretation"
        );
    }
    if trailing > 0 {
        let _ = cursor.skip(trailing);
    }

    Ok(record)
}

fn decode_field(
    cursor: &mut ByteCursor<'_>,
    kind: FieldKind,
    record: &mut FlowRecord,
) -> Result<(), field::FieldError> {
    match kind {
        FieldKind::AgentAddr => record.agent_addr = Some(field::read_address(cursor)?),
        FieldKind::SrcAddr => record.src_addr = Some(field::read_address(cursor)?),
        FieldKind::DstAddr => record.dst_addr = Some(field::read_address(cursor)?),
        FieldKind::GatewayAddr => record.gateway_addr = Some(field::read_address(cursor)?),
        FieldKind::SrcPort => record.src_port = Some(cursor.read_u16()?),
        FieldKind::DstPort => record.dst_port = Some(cursor.read_u16()?),
        FieldKind::Protocol => record.protocol = Some(cursor.read_u8()?),
        FieldKind::Tos => record.tos = Some(cursor.read_u8()?),
        FieldKind::TcpFlags => record.tcp_flags = Some(cursor.read_u8()?),
        FieldKind::Packets => record.packets = Some(cursor.read_u64()?),
        FieldKind::Octets => record.octets = Some(cursor.read_u64()?),
        FieldKind::StartTime => record.start_time = Some(field::read_timestamp(cursor)?),
        FieldKind::FinishTime => record.finish_time = Some(field::read_timestamp(cursor)?),
        FieldKind::IfIndexIn => record.if_index_in = Some(cursor.read_u32()?),
        FieldKind::IfIndexOut => record.if_index_out = Some(cursor.read_u32()?),
        FieldKind::SrcAs => record.src_as = Some(cursor.read_u32()?),
        FieldKind::DstAs => record.dst_as = Some(cursor.read_u32()?),
        FieldKind::Tag => record.tag = Some(cursor.read_u32()?),
        FieldKind::RecvTime => record.recv_time = Some(cursor.read_u32()?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: &[u8] = &[FORMAT_VERSION_1];
    const MAX: usize = 64 * 1024;

    fn header_bytes(version: u8, declared: u16, mask: u32) -> Vec<u8> {
        let mut bytes = RECORD_MAGIC.to_vec();
        bytes.push(version);
        bytes.extend_from_slice(&declared.to_be_bytes());
        bytes.extend_from_slice(&mask.to_be_bytes());
        bytes
    }

    #[test]
    fn decodes_valid_header() {
        let bytes = header_bytes(1, 13, 0x0000_8010);
        let mut cursor = ByteCursor::new(&bytes);
        let header = decode_header(&mut cursor, 0, KNOWN, MAX).unwrap();
        assert_eq!(
            header,
            RecordHeader {
                version: 1,
                declared_length: 13,
                field_mask: 0x0000_8010,
            }
        );
        assert_eq!(header.body_len(), 4);
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut bytes = header_bytes(1, 13, 0);
        bytes[0] = 0x00;
        let mut cursor = ByteCursor::new(&bytes);
        let err = decode_header(&mut cursor, 100, KNOWN, MAX).unwrap_err();
        assert_eq!(
            err,
            DecodeError::BadMagic {
                offset: 100,
                found: [0x00, 0x0c]
            }
        );
    }

    #[test]
    fn rejects_unknown_version() {
        let bytes = header_bytes(7, 13, 0);
        let mut cursor = ByteCursor::new(&bytes);
        let err = decode_header(&mut cursor, 0, KNOWN, MAX).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnsupportedVersion {
                offset: 2,
                version: 7
            }
        );
    }

    #[test]
    fn rejects_length_smaller_than_header() {
        // declared_length = 8 cannot even hold the prologue; this must fail
        // before any field decode is attempted.
        let bytes = header_bytes(1, 8, 0);
        let mut cursor = ByteCursor::new(&bytes);
        let err = decode_header(&mut cursor, 0, KNOWN, MAX).unwrap_err();
        assert_eq!(
            err,
            DecodeError::BadLength {
                offset: 3,
                declared: 8,
                max: MAX
            }
        );
    }

    #[test]
    fn rejects_length_above_maximum() {
        let bytes = header_bytes(1, 2048, 0);
        let mut cursor = ByteCursor::new(&bytes);
        let err = decode_header(&mut cursor, 0, KNOWN, 1024).unwrap_err();
        assert!(matches!(err, DecodeError::BadLength { declared: 2048, .. }));
    }

    fn mask_of(fields: &[FieldKind]) -> u32 {
        fields.iter().fold(0, |m, f| m | f.mask_bit())
    }

    #[test]
    fn body_contains_exactly_the_masked_fields() {
        let mask = mask_of(&[
            FieldKind::Protocol,
            FieldKind::SrcPort,
            FieldKind::DstPort,
            FieldKind::Octets,
        ]);
        // Canonical order: src_port, dst_port, protocol, octets.
        let mut body = Vec::new();
        body.extend_from_slice(&443u16.to_be_bytes());
        body.extend_from_slice(&51000u16.to_be_bytes());
        body.push(6);
        body.extend_from_slice(&1500u64.to_be_bytes());

        let header = RecordHeader {
            version: 1,
            declared_length: (HEADER_LEN + body.len()) as u16,
            field_mask: mask,
        };
        let mut cursor = ByteCursor::new(&body);
        let record = decode_body(&mut cursor, &header, 0).unwrap();

        assert_eq!(record.protocol, Some(6));
        assert_eq!(record.src_port, Some(443));
        assert_eq!(record.dst_port, Some(51000));
        assert_eq!(record.octets, Some(1500));
        assert!(!record.unrecognized_fields);

        // Nothing the mask did not declare.
        assert_eq!(record.present_fields().count(), 4);
        assert_eq!(record.agent_addr, None);
        assert_eq!(record.packets, None);
        assert_eq!(record.start_time, None);
    }

    #[test]
    fn field_overrun_reports_first_missing_byte() {
        // declared_length = header + 3 while the mask wants a 4-byte field:
        // the fourth byte would sit at offset 12.
        let header = RecordHeader {
            version: 1,
            declared_length: (HEADER_LEN + 3) as u16,
            field_mask: FieldKind::SrcAs.mask_bit(),
        };
        let body = [0u8; 3];
        let mut cursor = ByteCursor::new(&body);
        let err = decode_body(&mut cursor, &header, 0).unwrap_err();
        assert_eq!(
            err,
            DecodeError::FieldOverrun {
                offset: 12,
                field: "src_as"
            }
        );
    }

    #[test]
    fn unknown_mask_bits_are_preserved_not_decoded() {
        let unknown_bit = 1u32 << 25;
        let mask = FieldKind::Protocol.mask_bit() | unknown_bit;
        // One known byte, then four bytes belonging to the unknown field.
        let body = [6u8, 0xaa, 0xbb, 0xcc, 0xdd];
        let header = RecordHeader {
            version: 1,
            declared_length: (HEADER_LEN + body.len()) as u16,
            field_mask: mask,
        };
        let mut cursor = ByteCursor::new(&body);
        let record = decode_body(&mut cursor, &header, 0).unwrap();

        assert_eq!(record.protocol, Some(6));
        assert!(record.unrecognized_fields);
        assert_eq!(record.unrecognized_field_bits(), unknown_bit);
        assert_eq!(record.field_mask, mask);
        // Cursor consumed the whole declared window.
        assert!(cursor.is_empty());
    }

    #[test]
    fn trailing_declared_bytes_are_skipped_whole() {
        let header = RecordHeader {
            version: 1,
            declared_length: (HEADER_LEN + 5) as u16,
            field_mask: FieldKind::Tos.mask_bit(),
        };
        let body = [0x10u8, 1, 2, 3, 4];
        let mut cursor = ByteCursor::new(&body);
        let record = decode_body(&mut cursor, &header, 0).unwrap();
        assert_eq!(record.tos, Some(0x10));
        assert!(record.unrecognized_fields);
        assert_eq!(record.unrecognized_field_bits(), 0);
        assert!(cursor.is_empty());
    }

    #[test]
    fn unknown_address_family_points_at_the_tag() {
        let header = RecordHeader {
            version: 1,
            declared_length: (HEADER_LEN + 6) as u16,
            field_mask: FieldKind::SrcPort.mask_bit() | FieldKind::DstAddr.mask_bit(),
        };
        // dst_addr decodes first in canonical order; its tag byte is bad.
        let body = [9u8, 1, 2, 3, 4, 5];
        let mut cursor = ByteCursor::new(&body);
        let err = decode_body(&mut cursor, &header, 1000).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownAddressFamily {
                offset: 1000 + HEADER_LEN as u64,
                field: "dst_addr",
                family: 9
            }
        );
    }

    #[test]
    fn empty_mask_record_is_valid_and_empty() {
        let header = RecordHeader {
            version: 1,
            declared_length: HEADER_LEN as u16,
            field_mask: 0,
        };
        let mut cursor = ByteCursor::new(&[]);
        let record = decode_body(&mut cursor, &header, 0).unwrap();
        assert_eq!(record, FlowRecord {
            version: 1,
            ..FlowRecord::default()
        });
        assert_eq!(record.present_fields().count(), 0);
    }
}

//! Primitive on-disk field types and the canonical field table.
//!
//! Field decode routines are stateless and freely reentrant; all state lives
//! in the [`ByteCursor`] they consume from.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::cursor::{ByteCursor, Underrun};
use crate::error::DecodeError;

/// Address family tag preceding every on-disk address.
///
/// Addresses never infer their length from remaining bytes; the explicit tag
/// selects a 4- or 16-byte encoding and anything else is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressFamily {
    /// IPv4, tag value 4, followed by 4 address bytes.
    V4,
    /// IPv6, tag value 6, followed by 16 address bytes.
    V6,
}

impl AddressFamily {
    /// The on-disk tag value.
    pub const fn tag(self) -> u8 {
        match self {
            Self::V4 => 4,
            Self::V6 => 6,
        }
    }

    /// Maps an on-disk tag value back to a family, if known.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            4 => Some(Self::V4),
            6 => Some(Self::V6),
            _ => None,
        }
    }
}

/// A collector-relative timestamp: whole seconds plus an opaque fraction
/// word.
///
/// The decoder passes both words through verbatim; it applies no timezone or
/// epoch interpretation. Within one record the start time does not exceed the
/// finish time, but nothing orders timestamps across records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlowTimestamp {
    /// Whole seconds.
    pub seconds: u32,
    /// Sub-second fraction, encoding defined by the collector.
    pub fraction: u32,
}

/// One optional field of the version 1 record layout.
///
/// Declaration order is the canonical decode order: a record body is the
/// concatenation of the present fields' encodings in this order, and the
/// discriminant is the field's mask bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Address of the agent that exported the flow.
    AgentAddr,
    /// Flow source address.
    SrcAddr,
    /// Flow destination address.
    DstAddr,
    /// Next-hop gateway address.
    GatewayAddr,
    /// Source transport port.
    SrcPort,
    /// Destination transport port.
    DstPort,
    /// IP protocol number.
    Protocol,
    /// Type-of-service byte.
    Tos,
    /// Union of TCP flags seen on the flow.
    TcpFlags,
    /// Packet count.
    Packets,
    /// Octet count.
    Octets,
    /// Flow start time.
    StartTime,
    /// Flow finish time.
    FinishTime,
    /// Input interface index.
    IfIndexIn,
    /// Output interface index.
    IfIndexOut,
    /// Source autonomous-system number.
    SrcAs,
    /// Destination autonomous-system number.
    DstAs,
    /// Operator-assigned flow tag.
    Tag,
    /// When the collector received the flow, whole seconds.
    RecvTime,
}

impl FieldKind {
    /// The field's bit in the record mask.
    pub const fn mask_bit(self) -> u32 {
        1 << self as u32
    }

    /// The field's wire name, as used in diagnostics and reports.
    pub const fn name(self) -> &'static str {
        match self {
            Self::AgentAddr => "agent_addr",
            Self::SrcAddr => "src_addr",
            Self::DstAddr => "dst_addr",
            Self::GatewayAddr => "gateway_addr",
            Self::SrcPort => "src_port",
            Self::DstPort => "dst_port",
            Self::Protocol => "protocol",
            Self::Tos => "tos",
            Self::TcpFlags => "tcp_flags",
            Self::Packets => "packets",
            Self::Octets => "octets",
            Self::StartTime => "start_time",
            Self::FinishTime => "finish_time",
            Self::IfIndexIn => "if_index_in",
            Self::IfIndexOut => "if_index_out",
            Self::SrcAs => "src_as",
            Self::DstAs => "dst_as",
            Self::Tag => "tag",
            Self::RecvTime => "recv_time",
        }
    }
}

/// Canonical decode order for format version 1.
pub const FIELDS_V1: [FieldKind; 19] = [
    FieldKind::AgentAddr,
    FieldKind::SrcAddr,
    FieldKind::DstAddr,
    FieldKind::GatewayAddr,
    FieldKind::SrcPort,
    FieldKind::DstPort,
    FieldKind::Protocol,
    FieldKind::Tos,
    FieldKind::TcpFlags,
    FieldKind::Packets,
    FieldKind::Octets,
    FieldKind::StartTime,
    FieldKind::FinishTime,
    FieldKind::IfIndexIn,
    FieldKind::IfIndexOut,
    FieldKind::SrcAs,
    FieldKind::DstAs,
    FieldKind::Tag,
    FieldKind::RecvTime,
];

/// Every mask bit the version 1 decoder understands. Bits outside this mask
/// are preserved on the decoded record and reported as unrecognized, never
/// decoded.
pub const KNOWN_MASK_V1: u32 = 0x0007_ffff;

/// A field-level failure, before record context (field name, absolute
/// offset) is attached by the body decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FieldError {
    /// The field needed more bytes than the record window held.
    Underrun(Underrun),
    /// An address family tag outside the known set, at the given window
    /// position.
    UnknownAddressFamily { position: usize, family: u8 },
}

impl From<Underrun> for FieldError {
    fn from(underrun: Underrun) -> Self {
        Self::Underrun(underrun)
    }
}

impl FieldError {
    /// Attaches record context. `body_base` is the absolute stream offset of
    /// the first body byte; window positions inside the error are relative
    /// to it.
    pub(crate) fn into_decode_error(self, body_base: u64, field: FieldKind) -> DecodeError {
        match self {
            Self::Underrun(u) => DecodeError::FieldOverrun {
                // The first byte the read needed but the record did not hold.
                offset: body_base + (u.position + u.available) as u64,
                field: field.name(),
            },
            Self::UnknownAddressFamily { position, family } => {
                DecodeError::UnknownAddressFamily {
                    offset: body_base + position as u64,
                    field: field.name(),
                    family,
                }
            }
        }
    }
}

/// Decodes a family-tagged address: one tag byte, then exactly 4 or 16
/// address bytes.
pub(crate) fn read_address(cursor: &mut ByteCursor<'_>) -> Result<IpAddr, FieldError> {
    let tag_position = cursor.position();
    let tag = cursor.read_u8()?;
    match AddressFamily::from_tag(tag) {
        Some(AddressFamily::V4) => {
            let b = cursor.read_exact(4)?;
            Ok(IpAddr::V4(Ipv4Addr::new(b[0], b[1], b[2], b[3])))
        }
        Some(AddressFamily::V6) => {
            let b = cursor.read_exact(16)?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(b);
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        None => Err(FieldError::UnknownAddressFamily {
            position: tag_position,
            family: tag,
        }),
    }
}

/// Decodes a two-word timestamp: seconds, then the fraction word.
pub(crate) fn read_timestamp(cursor: &mut ByteCursor<'_>) -> Result<FlowTimestamp, FieldError> {
    let seconds = cursor.read_u32()?;
    let fraction = cursor.read_u32()?;
    Ok(FlowTimestamp { seconds, fraction })
}

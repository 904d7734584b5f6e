// crates/cip-rs/src/epath/segment.rs

use crate::CipError;
use crate::codec::ByteReader;
use crate::types::{CipDataType, SegmentType};
use alloc::vec::Vec;

// Logical segment types (bits 4-2 of the leading byte).
const LOGICAL_CLASS_ID: u8 = 0x00;
const LOGICAL_INSTANCE_ID: u8 = 0x04;
const LOGICAL_MEMBER_ID: u8 = 0x08;
const LOGICAL_CONNECTION_POINT: u8 = 0x0C;
const LOGICAL_ATTRIBUTE_ID: u8 = 0x10;
const LOGICAL_SPECIAL: u8 = 0x14;
const LOGICAL_SERVICE_ID: u8 = 0x18;

// Logical formats (bits 1-0).
const FORMAT_8_BIT: u8 = 0x00;
const FORMAT_16_BIT: u8 = 0x01;
const FORMAT_32_BIT: u8 = 0x02;

const ELECTRONIC_KEY_FORMAT: u8 = 0x04;
const PORT_EXTENDED_LINK: u8 = 0x10;
const PORT_ID_ESCAPE: u8 = 0x0F;

const NETWORK_SCHEDULE: u8 = 0x01;
const NETWORK_FIXED_TAG: u8 = 0x02;
const NETWORK_PRODUCTION_INHIBIT_TIME: u8 = 0x03;
const NETWORK_SAFETY: u8 = 0x10;
const NETWORK_EXTENDED: u8 = 0x1F;

const DATA_SIMPLE: u8 = 0x80;
const DATA_ANSI_EXTENDED_SYMBOL: u8 = 0x91;

/// Identity values an originator expects the target device to have.
///
/// A zero field matches anything. The compatibility bit (top bit of the
/// major revision byte) relaxes the minor revision check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElectronicKey {
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    pub major_revision: u8,
    pub compatibility: bool,
    pub minor_revision: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalSegment {
    ClassId(u16),
    InstanceId(u32),
    MemberId(u32),
    ConnectionPoint(u32),
    AttributeId(u16),
    ElectronicKey(ElectronicKey),
    ServiceId(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSegment {
    pub port: u16,
    pub link_address: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkSegment {
    Schedule(u8),
    FixedTag(u8),
    /// Production inhibit time in milliseconds.
    ProductionInhibitTime(u8),
    Safety(Vec<u8>),
    Extended(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSegment {
    /// Word-aligned opaque data, e.g. configuration data in a Forward Open.
    Simple(Vec<u8>),
    AnsiExtendedSymbol(Vec<u8>),
}

/// One decoded EPATH segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Port(PortSegment),
    Logical(LogicalSegment),
    Network(NetworkSegment),
    Symbolic(Vec<u8>),
    Data(DataSegment),
    DataTypeConstructed { code: u8, descriptor: Vec<u8> },
    DataTypeElementary(CipDataType),
}

/// Decodes the segment at the start of `data` (padded encoding).
///
/// Returns the segment and the number of bytes consumed, padding included.
/// A segment cut short by the end of the buffer fails with
/// [`CipError::BufferUnderrun`]; a type/format byte that names no valid
/// segment fails with [`CipError::InvalidSegmentType`].
pub fn decode_segment(data: &[u8]) -> Result<(Segment, usize), CipError> {
    let mut reader = ByteReader::new(data);
    let lead = reader.read_u8()?;
    let segment = match SegmentType::from_leading_byte(lead) {
        SegmentType::Port => Segment::Port(decode_port(lead, &mut reader)?),
        SegmentType::Logical => Segment::Logical(decode_logical(lead, &mut reader)?),
        SegmentType::Network => Segment::Network(decode_network(lead, &mut reader)?),
        SegmentType::Symbolic => {
            let len = (lead & 0x1F) as usize;
            if len == 0 {
                // Extended symbol formats are not accepted.
                return Err(CipError::InvalidSegmentType(lead));
            }
            let symbol = reader.take(len)?.to_vec();
            // Leading byte plus symbol must end on a word boundary.
            if (1 + len) % 2 != 0 {
                reader.skip(1)?;
            }
            Segment::Symbolic(symbol)
        }
        SegmentType::Data => Segment::Data(decode_data(lead, &mut reader)?),
        SegmentType::DataTypeConstructed => {
            if lead > 0xA3 {
                return Err(CipError::InvalidSegmentType(lead));
            }
            let len = reader.read_u8()? as usize;
            let descriptor = reader.take(len)?.to_vec();
            if len % 2 != 0 {
                reader.skip(1)?;
            }
            Segment::DataTypeConstructed {
                code: lead,
                descriptor,
            }
        }
        SegmentType::DataTypeElementary => match CipDataType::try_from(lead) {
            Ok(data_type) if data_type.is_elementary() => Segment::DataTypeElementary(data_type),
            _ => return Err(CipError::InvalidSegmentType(lead)),
        },
        SegmentType::Reserved => return Err(CipError::InvalidSegmentType(lead)),
    };
    Ok((segment, reader.position()))
}

fn decode_logical(lead: u8, reader: &mut ByteReader<'_>) -> Result<LogicalSegment, CipError> {
    let logical_type = lead & 0x1C;
    let format = lead & 0x03;

    if logical_type == LOGICAL_SPECIAL {
        if format != FORMAT_8_BIT || reader.read_u8()? != ELECTRONIC_KEY_FORMAT {
            return Err(CipError::InvalidSegmentType(lead));
        }
        let vendor_id = reader.read_u16()?;
        let device_type = reader.read_u16()?;
        let product_code = reader.read_u16()?;
        let major = reader.read_u8()?;
        let minor_revision = reader.read_u8()?;
        return Ok(LogicalSegment::ElectronicKey(ElectronicKey {
            vendor_id,
            device_type,
            product_code,
            major_revision: major & 0x7F,
            compatibility: major & 0x80 != 0,
            minor_revision,
        }));
    }
    if logical_type == LOGICAL_SERVICE_ID {
        if format != FORMAT_8_BIT {
            return Err(CipError::InvalidSegmentType(lead));
        }
        return Ok(LogicalSegment::ServiceId(reader.read_u8()?));
    }

    let wide_allowed = matches!(
        logical_type,
        LOGICAL_INSTANCE_ID | LOGICAL_MEMBER_ID | LOGICAL_CONNECTION_POINT
    );
    let value = match format {
        FORMAT_8_BIT => reader.read_u8()? as u32,
        FORMAT_16_BIT => {
            reader.skip(1)?;
            reader.read_u16()? as u32
        }
        FORMAT_32_BIT if wide_allowed => {
            reader.skip(1)?;
            reader.read_u32()?
        }
        _ => return Err(CipError::InvalidSegmentType(lead)),
    };

    Ok(match logical_type {
        LOGICAL_CLASS_ID => LogicalSegment::ClassId(value as u16),
        LOGICAL_INSTANCE_ID => LogicalSegment::InstanceId(value),
        LOGICAL_MEMBER_ID => LogicalSegment::MemberId(value),
        LOGICAL_CONNECTION_POINT => LogicalSegment::ConnectionPoint(value),
        LOGICAL_ATTRIBUTE_ID => LogicalSegment::AttributeId(value as u16),
        // Extended logical.
        _ => return Err(CipError::InvalidSegmentType(lead)),
    })
}

fn decode_port(lead: u8, reader: &mut ByteReader<'_>) -> Result<PortSegment, CipError> {
    let extended_link = lead & PORT_EXTENDED_LINK != 0;
    let link_len = if extended_link { reader.read_u8()? as usize } else { 1 };
    let port = match lead & 0x0F {
        PORT_ID_ESCAPE => reader.read_u16()?,
        id => id as u16,
    };
    let link_address = reader.take(link_len)?.to_vec();
    if reader.position() % 2 != 0 {
        reader.skip(1)?;
    }
    Ok(PortSegment { port, link_address })
}

fn decode_network(lead: u8, reader: &mut ByteReader<'_>) -> Result<NetworkSegment, CipError> {
    let subtype = lead & 0x1F;
    Ok(match subtype {
        NETWORK_SCHEDULE => NetworkSegment::Schedule(reader.read_u8()?),
        NETWORK_FIXED_TAG => NetworkSegment::FixedTag(reader.read_u8()?),
        NETWORK_PRODUCTION_INHIBIT_TIME => {
            NetworkSegment::ProductionInhibitTime(reader.read_u8()?)
        }
        NETWORK_SAFETY | NETWORK_EXTENDED => {
            let words = reader.read_u8()? as usize;
            let payload = reader.take(words * 2)?.to_vec();
            if subtype == NETWORK_SAFETY {
                NetworkSegment::Safety(payload)
            } else {
                NetworkSegment::Extended(payload)
            }
        }
        _ => return Err(CipError::InvalidSegmentType(lead)),
    })
}

fn decode_data(lead: u8, reader: &mut ByteReader<'_>) -> Result<DataSegment, CipError> {
    match lead {
        DATA_SIMPLE => {
            let words = reader.read_u8()? as usize;
            Ok(DataSegment::Simple(reader.take(words * 2)?.to_vec()))
        }
        DATA_ANSI_EXTENDED_SYMBOL => {
            let len = reader.read_u8()? as usize;
            let symbol = reader.take(len)?.to_vec();
            if len % 2 != 0 {
                reader.skip(1)?;
            }
            Ok(DataSegment::AnsiExtendedSymbol(symbol))
        }
        _ => Err(CipError::InvalidSegmentType(lead)),
    }
}

/// Decodes every segment in `data`, in order.
///
/// Returns the segments and the number of trailing bytes that did not form a
/// complete segment. Invalid segments are an error.
pub fn decode_segments(data: &[u8]) -> Result<(Vec<Segment>, usize), CipError> {
    let mut segments = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        match decode_segment(&data[offset..]) {
            Ok((segment, used)) => {
                segments.push(segment);
                offset += used;
            }
            Err(CipError::BufferUnderrun { .. }) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((segments, data.len() - offset))
}

/// Appends a logical segment using the narrowest format that holds `value`.
fn push_logical(out: &mut Vec<u8>, logical_type: u8, value: u32) {
    let lead = SegmentType::Logical as u8 | logical_type;
    if value <= u8::MAX as u32 {
        out.push(lead | FORMAT_8_BIT);
        out.push(value as u8);
    } else if value <= u16::MAX as u32 {
        out.push(lead | FORMAT_16_BIT);
        out.push(0);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else {
        out.push(lead | FORMAT_32_BIT);
        out.push(0);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn pad_to_word(out: &mut Vec<u8>, start: usize) {
    if (out.len() - start) % 2 != 0 {
        out.push(0);
    }
}

impl Segment {
    /// Appends the padded encoding of this segment to `out`.
    ///
    /// Payloads that do not fit their length field are truncated.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let start = out.len();
        match self {
            Segment::Logical(logical) => match logical {
                LogicalSegment::ClassId(v) => push_logical(out, LOGICAL_CLASS_ID, *v as u32),
                LogicalSegment::InstanceId(v) => push_logical(out, LOGICAL_INSTANCE_ID, *v),
                LogicalSegment::MemberId(v) => push_logical(out, LOGICAL_MEMBER_ID, *v),
                LogicalSegment::ConnectionPoint(v) => {
                    push_logical(out, LOGICAL_CONNECTION_POINT, *v)
                }
                LogicalSegment::AttributeId(v) => {
                    push_logical(out, LOGICAL_ATTRIBUTE_ID, *v as u32)
                }
                LogicalSegment::ElectronicKey(key) => {
                    out.push(SegmentType::Logical as u8 | LOGICAL_SPECIAL);
                    out.push(ELECTRONIC_KEY_FORMAT);
                    out.extend_from_slice(&key.vendor_id.to_le_bytes());
                    out.extend_from_slice(&key.device_type.to_le_bytes());
                    out.extend_from_slice(&key.product_code.to_le_bytes());
                    let compat = if key.compatibility { 0x80 } else { 0 };
                    out.push((key.major_revision & 0x7F) | compat);
                    out.push(key.minor_revision);
                }
                LogicalSegment::ServiceId(v) => {
                    out.push(SegmentType::Logical as u8 | LOGICAL_SERVICE_ID);
                    out.push(*v);
                }
            },
            Segment::Port(port) => {
                let link = &port.link_address[..port.link_address.len().min(u8::MAX as usize)];
                let extended_link = link.len() != 1;
                let mut lead = SegmentType::Port as u8;
                if extended_link {
                    lead |= PORT_EXTENDED_LINK;
                }
                if port.port >= PORT_ID_ESCAPE as u16 {
                    out.push(lead | PORT_ID_ESCAPE);
                } else {
                    out.push(lead | port.port as u8);
                }
                if extended_link {
                    out.push(link.len() as u8);
                }
                if port.port >= PORT_ID_ESCAPE as u16 {
                    out.extend_from_slice(&port.port.to_le_bytes());
                }
                out.extend_from_slice(link);
                pad_to_word(out, start);
            }
            Segment::Network(network) => {
                let lead = SegmentType::Network as u8;
                match network {
                    NetworkSegment::Schedule(v) => out.extend_from_slice(&[lead | NETWORK_SCHEDULE, *v]),
                    NetworkSegment::FixedTag(v) => out.extend_from_slice(&[lead | NETWORK_FIXED_TAG, *v]),
                    NetworkSegment::ProductionInhibitTime(v) => {
                        out.extend_from_slice(&[lead | NETWORK_PRODUCTION_INHIBIT_TIME, *v])
                    }
                    NetworkSegment::Safety(payload) | NetworkSegment::Extended(payload) => {
                        let subtype = if matches!(network, NetworkSegment::Safety(_)) {
                            NETWORK_SAFETY
                        } else {
                            NETWORK_EXTENDED
                        };
                        let words = (payload.len() / 2).min(u8::MAX as usize);
                        out.push(lead | subtype);
                        out.push(words as u8);
                        out.extend_from_slice(&payload[..words * 2]);
                    }
                }
            }
            Segment::Symbolic(symbol) => {
                let len = symbol.len().min(0x1F);
                out.push(SegmentType::Symbolic as u8 | len as u8);
                out.extend_from_slice(&symbol[..len]);
                pad_to_word(out, start);
            }
            Segment::Data(DataSegment::Simple(payload)) => {
                let words = (payload.len() / 2).min(u8::MAX as usize);
                out.push(DATA_SIMPLE);
                out.push(words as u8);
                out.extend_from_slice(&payload[..words * 2]);
            }
            Segment::Data(DataSegment::AnsiExtendedSymbol(symbol)) => {
                let len = symbol.len().min(u8::MAX as usize);
                out.push(DATA_ANSI_EXTENDED_SYMBOL);
                out.push(len as u8);
                out.extend_from_slice(&symbol[..len]);
                pad_to_word(out, start);
            }
            Segment::DataTypeConstructed { code, descriptor } => {
                let len = descriptor.len().min(u8::MAX as usize);
                out.push(*code);
                out.push(len as u8);
                out.extend_from_slice(&descriptor[..len]);
                pad_to_word(out, start);
            }
            Segment::DataTypeElementary(data_type) => out.push(*data_type as u8),
        }
    }
}

/// Encodes a sequence of segments into a padded EPATH.
pub fn encode_path(segments: &[Segment]) -> Vec<u8> {
    let mut out = Vec::new();
    for segment in segments {
        segment.encode(&mut out);
    }
    out
}

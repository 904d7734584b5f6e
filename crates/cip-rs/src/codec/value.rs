// crates/cip-rs/src/codec/value.rs

use super::reader::ByteReader;
use crate::CipError;
use crate::types::{CipDataType, CipRevision};
use alloc::vec::Vec;

/// Selects the wire encoding used to decode a [`TypedValue`].
///
/// Most kinds are self-delimiting and are named by their data type code.
/// Fixed-size strings and raw byte arrays carry no length on the wire, so
/// their size has to be supplied out-of-band by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Elementary(CipDataType),
    FixedString(usize),
    ByteArray(usize),
}

/// Represents any value that can be carried by a CIP attribute or message.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Bool(bool),
    Sint(i8),
    Int(i16),
    Dint(i32),
    Lint(i64),
    Usint(u8),
    Uint(u16),
    Udint(u32),
    Ulint(u64),
    Real(f32),
    Lreal(f64),
    Stime(i32),
    /// Days since 1972-01-01.
    Date(u16),
    /// Milliseconds since midnight.
    TimeOfDay(u32),
    DateAndTime { time_of_day: u32, date: u16 },
    /// UINT length prefix, one byte per character.
    String(Vec<u8>),
    Byte(u8),
    Word(u16),
    Dword(u32),
    Lword(u64),
    /// UINT length prefix, two bytes per character.
    String2(Vec<u16>),
    Ftime(i32),
    Ltime(i64),
    Itime(i16),
    /// UINT character size, UINT character count, then `size * count` bytes.
    StringN { char_size: u16, data: Vec<u8> },
    /// USINT length prefix, one byte per character.
    ShortString(Vec<u8>),
    Time(i32),
    EngUnit(u16),
    Revision(CipRevision),
    MacAddress([u8; 6]),
    /// Exactly the bytes sent on the wire, NUL padding included. Build it
    /// with [`TypedValue::fixed_string`] to pad a shorter text.
    FixedString(Vec<u8>),
    /// Raw bytes; the length is known from context (e.g. an assembly's size).
    ByteArray(Vec<u8>),
}

impl TypedValue {
    /// Returns the tag that decodes this value's encoding.
    pub fn tag(&self) -> TypeTag {
        let data_type = match self {
            Self::Bool(_) => CipDataType::Bool,
            Self::Sint(_) => CipDataType::Sint,
            Self::Int(_) => CipDataType::Int,
            Self::Dint(_) => CipDataType::Dint,
            Self::Lint(_) => CipDataType::Lint,
            Self::Usint(_) => CipDataType::Usint,
            Self::Uint(_) => CipDataType::Uint,
            Self::Udint(_) => CipDataType::Udint,
            Self::Ulint(_) => CipDataType::Ulint,
            Self::Real(_) => CipDataType::Real,
            Self::Lreal(_) => CipDataType::Lreal,
            Self::Stime(_) => CipDataType::Stime,
            Self::Date(_) => CipDataType::Date,
            Self::TimeOfDay(_) => CipDataType::TimeOfDay,
            Self::DateAndTime { .. } => CipDataType::DateAndTime,
            Self::String(_) => CipDataType::String,
            Self::Byte(_) => CipDataType::Byte,
            Self::Word(_) => CipDataType::Word,
            Self::Dword(_) => CipDataType::Dword,
            Self::Lword(_) => CipDataType::Lword,
            Self::String2(_) => CipDataType::String2,
            Self::Ftime(_) => CipDataType::Ftime,
            Self::Ltime(_) => CipDataType::Ltime,
            Self::Itime(_) => CipDataType::Itime,
            Self::StringN { .. } => CipDataType::StringN,
            Self::ShortString(_) => CipDataType::ShortString,
            Self::Time(_) => CipDataType::Time,
            Self::EngUnit(_) => CipDataType::EngUnit,
            Self::Revision(_) => CipDataType::UsintUsint,
            Self::MacAddress(_) => CipDataType::SixUsint,
            Self::FixedString(raw) => return TypeTag::FixedString(raw.len()),
            Self::ByteArray(data) => return TypeTag::ByteArray(data.len()),
        };
        TypeTag::Elementary(data_type)
    }

    /// Number of bytes [`TypedValue::encode`] will append.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Bool(_) | Self::Sint(_) | Self::Usint(_) | Self::Byte(_) => 1,
            Self::Int(_)
            | Self::Uint(_)
            | Self::Word(_)
            | Self::Date(_)
            | Self::Itime(_)
            | Self::EngUnit(_)
            | Self::Revision(_) => 2,
            Self::Dint(_)
            | Self::Udint(_)
            | Self::Dword(_)
            | Self::Real(_)
            | Self::Stime(_)
            | Self::TimeOfDay(_)
            | Self::Ftime(_)
            | Self::Time(_) => 4,
            Self::DateAndTime { .. } | Self::MacAddress(_) => 6,
            Self::Lint(_) | Self::Ulint(_) | Self::Lword(_) | Self::Lreal(_) | Self::Ltime(_) => 8,
            Self::String(v) => 2 + v.len().min(u16::MAX as usize),
            Self::String2(v) => 2 + 2 * v.len().min(u16::MAX as usize),
            Self::StringN { char_size, data } => 4 + string_n_byte_len(*char_size, data.len()),
            Self::ShortString(v) => 1 + v.len().min(u8::MAX as usize),
            Self::FixedString(v) | Self::ByteArray(v) => v.len(),
        }
    }

    /// Serializes the value into `out` using the little-endian CIP layout.
    ///
    /// This never fails. Length-prefixed kinds longer than their prefix can
    /// express are truncated.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Bool(v) => out.push(*v as u8),
            Self::Sint(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Dint(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Lint(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Usint(v) => out.push(*v),
            Self::Uint(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Udint(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Ulint(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Real(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Lreal(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Stime(v) | Self::Ftime(v) | Self::Time(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Date(v) | Self::Word(v) | Self::EngUnit(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::TimeOfDay(v) | Self::Dword(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::DateAndTime { time_of_day, date } => {
                out.extend_from_slice(&time_of_day.to_le_bytes());
                out.extend_from_slice(&date.to_le_bytes());
            }
            Self::String(v) => {
                let len = v.len().min(u16::MAX as usize);
                out.extend_from_slice(&(len as u16).to_le_bytes());
                out.extend_from_slice(&v[..len]);
            }
            Self::Byte(v) => out.push(*v),
            Self::Lword(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::String2(v) => {
                let len = v.len().min(u16::MAX as usize);
                out.extend_from_slice(&(len as u16).to_le_bytes());
                for c in &v[..len] {
                    out.extend_from_slice(&c.to_le_bytes());
                }
            }
            Self::Ltime(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Itime(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::StringN { char_size, data } => {
                let byte_len = string_n_byte_len(*char_size, data.len());
                let count = if *char_size == 0 { 0 } else { byte_len / *char_size as usize };
                out.extend_from_slice(&char_size.to_le_bytes());
                out.extend_from_slice(&(count as u16).to_le_bytes());
                out.extend_from_slice(&data[..byte_len]);
            }
            Self::ShortString(v) => {
                let len = v.len().min(u8::MAX as usize);
                out.push(len as u8);
                out.extend_from_slice(&v[..len]);
            }
            Self::Revision(r) => {
                out.push(r.major);
                out.push(r.minor);
            }
            Self::MacAddress(mac) => out.extend_from_slice(mac),
            Self::FixedString(v) | Self::ByteArray(v) => out.extend_from_slice(v),
        }
    }

    /// Builds a fixed-size string of `size` bytes, zero padding or truncating
    /// `text` to fit.
    pub fn fixed_string(text: &[u8], size: usize) -> Self {
        let mut raw = text[..text.len().min(size)].to_vec();
        raw.resize(size, 0);
        Self::FixedString(raw)
    }

    /// Text of a fixed-size string without its NUL padding.
    pub fn fixed_string_text(&self) -> Option<&[u8]> {
        match self {
            Self::FixedString(raw) => {
                let end = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
                Some(&raw[..end])
            }
            _ => None,
        }
    }

    /// Convenience wrapper around [`TypedValue::encode`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out);
        out
    }

    /// Decodes a value of kind `tag` from the start of `data`.
    ///
    /// Returns the value and the number of bytes consumed. Trailing bytes are
    /// left for the caller.
    pub fn decode(data: &[u8], tag: TypeTag) -> Result<(TypedValue, usize), CipError> {
        let mut reader = ByteReader::new(data);
        let value = Self::decode_from(&mut reader, tag)?;
        Ok((value, reader.position()))
    }

    /// Decodes a value from a cursor, advancing it past the value.
    pub fn decode_from(reader: &mut ByteReader<'_>, tag: TypeTag) -> Result<TypedValue, CipError> {
        let data_type = match tag {
            TypeTag::FixedString(size) => return Ok(Self::FixedString(reader.take(size)?.to_vec())),
            TypeTag::ByteArray(len) => return Ok(Self::ByteArray(reader.take(len)?.to_vec())),
            TypeTag::Elementary(data_type) => data_type,
        };

        let value = match data_type {
            CipDataType::Bool => Self::Bool(reader.read_u8()? != 0),
            CipDataType::Sint => Self::Sint(reader.read_i8()?),
            CipDataType::Int => Self::Int(reader.read_i16()?),
            CipDataType::Dint => Self::Dint(reader.read_i32()?),
            CipDataType::Lint => Self::Lint(reader.read_i64()?),
            CipDataType::Usint => Self::Usint(reader.read_u8()?),
            CipDataType::Uint => Self::Uint(reader.read_u16()?),
            CipDataType::Udint => Self::Udint(reader.read_u32()?),
            CipDataType::Ulint => Self::Ulint(reader.read_u64()?),
            CipDataType::Real => Self::Real(reader.read_f32()?),
            CipDataType::Lreal => Self::Lreal(reader.read_f64()?),
            CipDataType::Stime => Self::Stime(reader.read_i32()?),
            CipDataType::Date => Self::Date(reader.read_u16()?),
            CipDataType::TimeOfDay => Self::TimeOfDay(reader.read_u32()?),
            CipDataType::DateAndTime => {
                let time_of_day = reader.read_u32()?;
                let date = reader.read_u16()?;
                Self::DateAndTime { time_of_day, date }
            }
            CipDataType::String => {
                let len = reader.read_u16()? as usize;
                Self::String(take_declared(reader, len)?.to_vec())
            }
            CipDataType::Byte => Self::Byte(reader.read_u8()?),
            CipDataType::Word => Self::Word(reader.read_u16()?),
            CipDataType::Dword => Self::Dword(reader.read_u32()?),
            CipDataType::Lword => Self::Lword(reader.read_u64()?),
            CipDataType::String2 => {
                let len = reader.read_u16()? as usize;
                let raw = take_declared(reader, len * 2)?;
                Self::String2(
                    raw.chunks_exact(2)
                        .map(|c| u16::from_le_bytes([c[0], c[1]]))
                        .collect(),
                )
            }
            CipDataType::Ftime => Self::Ftime(reader.read_i32()?),
            CipDataType::Ltime => Self::Ltime(reader.read_i64()?),
            CipDataType::Itime => Self::Itime(reader.read_i16()?),
            CipDataType::StringN => {
                let char_size = reader.read_u16()?;
                let count = reader.read_u16()? as usize;
                if !matches!(char_size, 1 | 2 | 4) {
                    return Err(CipError::InvalidEncoding);
                }
                let raw = take_declared(reader, count * char_size as usize)?;
                Self::StringN {
                    char_size,
                    data: raw.to_vec(),
                }
            }
            CipDataType::ShortString => {
                let len = reader.read_u8()? as usize;
                Self::ShortString(take_declared(reader, len)?.to_vec())
            }
            CipDataType::Time => Self::Time(reader.read_i32()?),
            CipDataType::EngUnit => Self::EngUnit(reader.read_u16()?),
            CipDataType::UsintUsint => {
                let major = reader.read_u8()?;
                let minor = reader.read_u8()?;
                Self::Revision(CipRevision { major, minor })
            }
            CipDataType::SixUsint => Self::MacAddress(reader.take(6)?.try_into()?),
            CipDataType::Any
            | CipDataType::StringI
            | CipDataType::MemberList
            | CipDataType::ByteArray => {
                return Err(CipError::UnsupportedDataType(data_type as u8));
            }
        };
        Ok(value)
    }

    /// Returns the value as an unsigned integer, for the integer and bit-string kinds.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Usint(v) | Self::Byte(v) => Some(*v as u64),
            Self::Uint(v) | Self::Word(v) | Self::EngUnit(v) | Self::Date(v) => Some(*v as u64),
            Self::Udint(v) | Self::Dword(v) | Self::TimeOfDay(v) => Some(*v as u64),
            Self::Ulint(v) | Self::Lword(v) => Some(*v),
            _ => None,
        }
    }
}

/// A length prefix that points past the end of the buffer is an encoding
/// error, not an underrun: the prefix itself was read successfully.
fn take_declared<'a>(reader: &mut ByteReader<'a>, len: usize) -> Result<&'a [u8], CipError> {
    if len > reader.remaining() {
        return Err(CipError::InvalidEncoding);
    }
    reader.take(len)
}

fn string_n_byte_len(char_size: u16, data_len: usize) -> usize {
    if char_size == 0 {
        return 0;
    }
    let count = (data_len / char_size as usize).min(u16::MAX as usize);
    count * char_size as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn roundtrip(value: TypedValue) {
        let bytes = value.to_bytes();
        assert_eq!(bytes.len(), value.encoded_len());
        assert_eq!(TypedValue::decode(&bytes, value.tag()), Ok((value, bytes.len())));
    }

    #[test]
    fn test_integer_layout_is_little_endian() {
        assert_eq!(TypedValue::Uint(0xAABB).to_bytes(), vec![0xBB, 0xAA]);
        assert_eq!(
            TypedValue::Dint(-2).to_bytes(),
            vec![0xFE, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(
            TypedValue::Real(1.0).to_bytes(),
            vec![0x00, 0x00, 0x80, 0x3F]
        );
        roundtrip(TypedValue::Lint(i64::MIN));
        roundtrip(TypedValue::Ulint(u64::MAX));
        roundtrip(TypedValue::Lreal(-0.125));
    }

    #[test]
    fn test_time_kinds_roundtrip() {
        roundtrip(TypedValue::DateAndTime {
            time_of_day: 43_200_000,
            date: 18_000,
        });
        roundtrip(TypedValue::Itime(-5));
        roundtrip(TypedValue::Ltime(1 << 40));
    }

    #[test]
    fn test_string_kinds() {
        let short = TypedValue::ShortString(b"cip-rs".to_vec());
        assert_eq!(short.to_bytes()[0], 6);
        roundtrip(short);

        let string = TypedValue::String(b"Adapter".to_vec());
        assert_eq!(&string.to_bytes()[..2], &[7, 0]);
        roundtrip(string);

        roundtrip(TypedValue::String2(vec![0x0048, 0x0069]));
        roundtrip(TypedValue::StringN {
            char_size: 2,
            data: vec![0x48, 0x00, 0x69, 0x00],
        });
    }

    #[test]
    fn test_fixed_string_is_zero_padded() {
        let value = TypedValue::fixed_string(b"abc", 6);
        assert_eq!(value.to_bytes(), vec![b'a', b'b', b'c', 0, 0, 0]);
        assert_eq!(value.fixed_string_text(), Some(&b"abc"[..]));
        roundtrip(value);

        let long = TypedValue::fixed_string(b"abcdefgh", 4);
        assert_eq!(long.to_bytes(), b"abcd".to_vec());
        roundtrip(long);
    }

    #[test]
    fn test_fixed_string_keeps_trailing_nul() {
        let value = TypedValue::fixed_string(b"ab\0", 4);
        assert_eq!(value.to_bytes(), vec![b'a', b'b', 0, 0]);
        roundtrip(value.clone());
        let (decoded, _) = TypedValue::decode(&[b'a', b'b', 0, 0], TypeTag::FixedString(4)).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(decoded.fixed_string_text(), Some(&b"ab"[..]));
    }

    #[test]
    fn test_length_prefix_past_end_is_invalid_encoding() {
        // SHORT_STRING claims 10 characters but only 3 follow.
        let data = [10, b'a', b'b', b'c'];
        assert_eq!(
            TypedValue::decode(&data, TypeTag::Elementary(CipDataType::ShortString)),
            Err(CipError::InvalidEncoding)
        );
        // STRING whose prefix itself is cut short is an underrun.
        assert_eq!(
            TypedValue::decode(&[0x05], TypeTag::Elementary(CipDataType::String)),
            Err(CipError::BufferUnderrun {
                needed: 2,
                available: 1
            })
        );
    }

    #[test]
    fn test_buffer_underrun() {
        assert_eq!(
            TypedValue::decode(&[0xAA, 0xBB, 0xCC], TypeTag::Elementary(CipDataType::Udint)),
            Err(CipError::BufferUnderrun {
                needed: 4,
                available: 3
            })
        );
        assert_eq!(
            TypedValue::decode(&[0x00; 5], TypeTag::Elementary(CipDataType::SixUsint)),
            Err(CipError::BufferUnderrun {
                needed: 6,
                available: 5
            })
        );
    }

    #[test]
    fn test_decode_leaves_trailing_bytes() {
        let data = [0x34, 0x12, 0xFF];
        assert_eq!(
            TypedValue::decode(&data, TypeTag::Elementary(CipDataType::Uint)),
            Ok((TypedValue::Uint(0x1234), 2))
        );
    }

    #[test]
    fn test_unsupported_kinds() {
        assert_eq!(
            TypedValue::decode(&[0; 4], TypeTag::Elementary(CipDataType::StringI)),
            Err(CipError::UnsupportedDataType(0xDE))
        );
        assert_eq!(
            TypedValue::decode(&[1, 0, 0, 0, 0], TypeTag::Elementary(CipDataType::StringN)),
            Ok((
                TypedValue::StringN {
                    char_size: 1,
                    data: vec![]
                },
                4
            ))
        );
        assert_eq!(
            TypedValue::decode(&[3, 0, 1, 0, 0, 0, 0], TypeTag::Elementary(CipDataType::StringN)),
            Err(CipError::InvalidEncoding)
        );
    }

    #[test]
    fn test_revision_and_mac() {
        let rev = TypedValue::Revision(CipRevision::new(2, 7));
        assert_eq!(rev.to_bytes(), vec![2, 7]);
        roundtrip(rev);
        roundtrip(TypedValue::MacAddress([0x00, 0x1D, 0x9C, 0x01, 0x02, 0x03]));
    }
}

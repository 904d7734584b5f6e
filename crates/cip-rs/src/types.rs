use crate::error::CipError;
use core::convert::TryFrom;
use core::fmt;

// --- Primitive Types (CIP Vol. 1, Appendix C-2.1) ---
// These aliases keep attribute definitions close to the names used by the standard.

/// Alias for USINT (8-bit unsigned integer)
pub type USINT = u8;

// --- Class Codes ---

/// Identity object class code.
pub const CLASS_IDENTITY: u32 = 0x01;
/// Message Router object class code.
pub const CLASS_MESSAGE_ROUTER: u32 = 0x02;
/// Assembly object class code.
pub const CLASS_ASSEMBLY: u32 = 0x04;
/// Connection object class code.
pub const CLASS_CONNECTION: u32 = 0x05;
/// Connection Manager object class code.
pub const CLASS_CONNECTION_MANAGER: u32 = 0x06;
/// TCP/IP Interface object class code.
pub const CLASS_TCP_IP_INTERFACE: u32 = 0xF5;
/// Ethernet Link object class code.
pub const CLASS_ETHERNET_LINK: u32 = 0xF6;

/// Bit set on a service code to mark it as a reply.
pub const REPLY_SERVICE_MASK: u8 = 0x80;

/// The set of bits 7-5 in the segment type/format byte of an EPATH segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SegmentType {
    Port = 0x00,
    Logical = 0x20,
    Network = 0x40,
    Symbolic = 0x60,
    Data = 0x80,
    DataTypeConstructed = 0xA0,
    DataTypeElementary = 0xC0,
    Reserved = 0xE0,
}

impl SegmentType {
    /// Extracts the segment type from a segment's leading byte. Total, since
    /// every combination of the three top bits is named.
    pub fn from_leading_byte(byte: u8) -> Self {
        match byte & 0xE0 {
            0x00 => Self::Port,
            0x20 => Self::Logical,
            0x40 => Self::Network,
            0x60 => Self::Symbolic,
            0x80 => Self::Data,
            0xA0 => Self::DataTypeConstructed,
            0xC0 => Self::DataTypeElementary,
            _ => Self::Reserved,
        }
    }
}

/// The encoded CIP data types carried in messages and data type segments.
/// (CIP Vol. 1, Appendix C-6.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum CipDataType {
    /// Data type that can not be directly encoded.
    Any = 0x00,
    Bool = 0xC1,
    Sint = 0xC2,
    Int = 0xC3,
    Dint = 0xC4,
    Lint = 0xC5,
    Usint = 0xC6,
    Uint = 0xC7,
    Udint = 0xC8,
    Ulint = 0xC9,
    Real = 0xCA,
    Lreal = 0xCB,
    /// Synchronous time information, range of DINT.
    Stime = 0xCC,
    Date = 0xCD,
    TimeOfDay = 0xCE,
    DateAndTime = 0xCF,
    /// Character string, 1 byte per character.
    String = 0xD0,
    Byte = 0xD1,
    Word = 0xD2,
    Dword = 0xD3,
    Lword = 0xD4,
    /// Character string, 2 bytes per character.
    String2 = 0xD5,
    /// Duration in microseconds, range of DINT.
    Ftime = 0xD6,
    /// Duration in microseconds, range of LINT.
    Ltime = 0xD7,
    /// Duration in milliseconds, range of INT.
    Itime = 0xD8,
    /// Character string, N bytes per character.
    StringN = 0xD9,
    /// Character string, 1 byte per character, 1 byte length indicator.
    ShortString = 0xDA,
    /// Duration in milliseconds, range of DINT.
    Time = 0xDB,
    EngUnit = 0xDD,
    /// International character string.
    StringI = 0xDE,
    /// Two USINTs, used for the Identity revision attribute.
    UsintUsint = 0xA0,
    /// Six USINTs, used for MAC addresses.
    SixUsint = 0xA2,
    MemberList = 0xA3,
    ByteArray = 0xA4,
}

impl TryFrom<u8> for CipDataType {
    type Error = CipError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Any),
            0xC1 => Ok(Self::Bool),
            0xC2 => Ok(Self::Sint),
            0xC3 => Ok(Self::Int),
            0xC4 => Ok(Self::Dint),
            0xC5 => Ok(Self::Lint),
            0xC6 => Ok(Self::Usint),
            0xC7 => Ok(Self::Uint),
            0xC8 => Ok(Self::Udint),
            0xC9 => Ok(Self::Ulint),
            0xCA => Ok(Self::Real),
            0xCB => Ok(Self::Lreal),
            0xCC => Ok(Self::Stime),
            0xCD => Ok(Self::Date),
            0xCE => Ok(Self::TimeOfDay),
            0xCF => Ok(Self::DateAndTime),
            0xD0 => Ok(Self::String),
            0xD1 => Ok(Self::Byte),
            0xD2 => Ok(Self::Word),
            0xD3 => Ok(Self::Dword),
            0xD4 => Ok(Self::Lword),
            0xD5 => Ok(Self::String2),
            0xD6 => Ok(Self::Ftime),
            0xD7 => Ok(Self::Ltime),
            0xD8 => Ok(Self::Itime),
            0xD9 => Ok(Self::StringN),
            0xDA => Ok(Self::ShortString),
            0xDB => Ok(Self::Time),
            0xDD => Ok(Self::EngUnit),
            0xDE => Ok(Self::StringI),
            0xA0 => Ok(Self::UsintUsint),
            0xA2 => Ok(Self::SixUsint),
            0xA3 => Ok(Self::MemberList),
            0xA4 => Ok(Self::ByteArray),
            _ => Err(CipError::UnsupportedDataType(value)),
        }
    }
}

impl CipDataType {
    /// Returns true for the codes that may appear in an elementary data type segment.
    pub fn is_elementary(self) -> bool {
        (0xC1..=0xDE).contains(&(self as u8))
    }
}

/// The set of CIP service codes.
///
/// Common services range from 0x01 to 0x1C. Beyond that the codes are class
/// specific; only the Connection Manager's are named here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ServiceCode {
    GetAttributeAll = 0x01,
    SetAttributeAll = 0x02,
    GetAttributeList = 0x03,
    SetAttributeList = 0x04,
    Reset = 0x05,
    Start = 0x06,
    Stop = 0x07,
    Create = 0x08,
    Delete = 0x09,
    MultipleServicePacket = 0x0A,
    ApplyAttributes = 0x0D,
    GetAttributeSingle = 0x0E,
    SetAttributeSingle = 0x10,
    FindNextObjectInstance = 0x11,
    Restore = 0x15,
    Save = 0x16,
    NoOperation = 0x17,
    GetMember = 0x18,
    SetMember = 0x19,
    InsertMember = 0x1A,
    RemoveMember = 0x1B,
    GroupSync = 0x1C,

    // --- Connection Manager services ---
    ForwardClose = 0x4E,
    UnconnectedSend = 0x52,
    ForwardOpen = 0x54,
    GetConnectionOwner = 0x5A,
    LargeForwardOpen = 0x5B,
}

impl TryFrom<u8> for ServiceCode {
    type Error = CipError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::GetAttributeAll),
            0x02 => Ok(Self::SetAttributeAll),
            0x03 => Ok(Self::GetAttributeList),
            0x04 => Ok(Self::SetAttributeList),
            0x05 => Ok(Self::Reset),
            0x06 => Ok(Self::Start),
            0x07 => Ok(Self::Stop),
            0x08 => Ok(Self::Create),
            0x09 => Ok(Self::Delete),
            0x0A => Ok(Self::MultipleServicePacket),
            0x0D => Ok(Self::ApplyAttributes),
            0x0E => Ok(Self::GetAttributeSingle),
            0x10 => Ok(Self::SetAttributeSingle),
            0x11 => Ok(Self::FindNextObjectInstance),
            0x15 => Ok(Self::Restore),
            0x16 => Ok(Self::Save),
            0x17 => Ok(Self::NoOperation),
            0x18 => Ok(Self::GetMember),
            0x19 => Ok(Self::SetMember),
            0x1A => Ok(Self::InsertMember),
            0x1B => Ok(Self::RemoveMember),
            0x1C => Ok(Self::GroupSync),
            0x4E => Ok(Self::ForwardClose),
            0x52 => Ok(Self::UnconnectedSend),
            0x54 => Ok(Self::ForwardOpen),
            0x5A => Ok(Self::GetConnectionOwner),
            0x5B => Ok(Self::LargeForwardOpen),
            _ => Err(CipError::InvalidServiceCode(value)),
        }
    }
}

/// Get and set flags for CIP attributes.
///
/// The router consults these before dispatching a common service, so an
/// attribute that is not gettable is never handed to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct AttributeFlags(pub u8);

impl AttributeFlags {
    /// Neither settable nor gettable.
    pub const NOT_SET_OR_GETABLE: Self = Self(0);
    /// Gettable via GetAttributeAll.
    pub const GET_ALL: Self = Self(1 << 0);
    /// Gettable via GetAttributeSingle.
    pub const GET_SINGLE: Self = Self(1 << 1);
    /// Settable via SetAttributeSingle.
    pub const SET_SINGLE: Self = Self(1 << 2);
    pub const SET_AND_GET: Self = Self(Self::GET_ALL.0 | Self::GET_SINGLE.0 | Self::SET_SINGLE.0);
    /// GET_ALL | GET_SINGLE, the usual mask of a read-only attribute.
    pub const GET: Self = Self(Self::GET_ALL.0 | Self::GET_SINGLE.0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for AttributeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Notifications handed to the application on I/O connection state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoConnectionEvent {
    Opened,
    TimedOut,
    Closed,
}

impl fmt::Display for IoConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened => write!(f, "opened"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Major/minor revision pair, as carried by the Identity object and electronic keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CipRevision {
    pub major: USINT,
    pub minor: USINT,
}

impl CipRevision {
    pub const fn new(major: USINT, minor: USINT) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for CipRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.major, self.minor)
    }
}

use crate::connection::{ConnectionState, ConnectionTransition};
use crate::status::GeneralStatus;
use core::array::TryFromSliceError;
use core::fmt;

/// Defines a portable, descriptive Error type for the CIP stack.
///
/// These errors never leave the device as-is: at the protocol boundary they
/// are converted into a [`GeneralStatus`] (or a Connection Manager extended
/// status) and returned to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipError {
    /// Fewer bytes remain than the value or segment being decoded requires.
    BufferUnderrun { needed: usize, available: usize },
    /// A length field or encoded value is inconsistent with the buffer.
    InvalidEncoding,
    /// The data type code has no supported wire encoding.
    UnsupportedDataType(u8),
    /// The segment type/format combination is not recognised.
    InvalidSegmentType(u8),
    /// A value in the message is not a known service code.
    InvalidServiceCode(u8),
    /// A value is not a valid enum variant.
    InvalidEnumValue(u8),
    /// A value is not a known Connection Manager extended status.
    InvalidExtendedStatus(u16),
    /// A multi-byte value could not be parsed from a slice.
    SliceConversion,
    /// The connection state machine was asked for a transition it does not allow.
    InvalidStateTransition {
        from: ConnectionState,
        transition: ConnectionTransition,
    },
    /// No connection is registered under this id.
    ConnectionNotFound(u32),
    /// The requested class is not registered.
    ClassNotFound(u32),
    /// The class exists but has no such instance.
    InstanceNotFound { class_id: u32, instance_id: u32 },
    /// The instance has no such attribute.
    AttributeNotFound { class_id: u32, instance_id: u32, attribute_id: u16 },
    /// A class with this id was registered twice.
    ClassAlreadyRegistered(u32),
    /// An instance with this id already exists in the class.
    InstanceAlreadyExists { class_id: u32, instance_id: u32 },
    /// A value with an incorrect data type was written to an attribute.
    TypeMismatch,
    /// The device configuration is inconsistent.
    InvalidConfiguration(&'static str),
}

impl CipError {
    /// Maps the error onto the general status returned to the requester.
    pub fn general_status(&self) -> GeneralStatus {
        match self {
            Self::BufferUnderrun { .. } | Self::SliceConversion => GeneralStatus::NotEnoughData,
            Self::InvalidEncoding | Self::UnsupportedDataType(_) | Self::InvalidEnumValue(_) => {
                GeneralStatus::InvalidParameterValue
            }
            Self::InvalidSegmentType(_) => GeneralStatus::PathSegmentError,
            Self::InvalidServiceCode(_) => GeneralStatus::ServiceNotSupported,
            Self::ClassNotFound(_) => GeneralStatus::PathDestinationUnknown,
            Self::InstanceNotFound { .. } => GeneralStatus::PathSegmentError,
            Self::AttributeNotFound { .. } => GeneralStatus::AttributeNotSupported,
            Self::TypeMismatch => GeneralStatus::InvalidAttributeValue,
            Self::InstanceAlreadyExists { .. } | Self::ClassAlreadyRegistered(_) => {
                GeneralStatus::ObjectAlreadyExists
            }
            Self::InvalidExtendedStatus(_)
            | Self::InvalidStateTransition { .. }
            | Self::ConnectionNotFound(_)
            | Self::InvalidConfiguration(_) => GeneralStatus::DeviceStateConflict,
        }
    }
}

impl fmt::Display for CipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferUnderrun { needed, available } => write!(
                f,
                "Buffer underrun: {needed} bytes needed, {available} available"
            ),
            Self::InvalidEncoding => write!(f, "Encoded length is inconsistent with the buffer"),
            Self::UnsupportedDataType(v) => write!(f, "Unsupported CIP data type: {v:#04x}"),
            Self::InvalidSegmentType(v) => write!(f, "Invalid segment type/format byte: {v:#04x}"),
            Self::InvalidServiceCode(v) => write!(f, "Invalid service code: {v:#04x}"),
            Self::InvalidEnumValue(v) => write!(f, "A value is not a valid enum variant: {v:#04x}"),
            Self::InvalidExtendedStatus(v) => write!(f, "Unknown extended status: {v:#06x}"),
            Self::SliceConversion => write!(f, "Failed to convert slice to a fixed-size array"),
            Self::InvalidStateTransition { from, transition } => {
                write!(f, "Invalid connection transition {transition:?} from {from:?}")
            }
            Self::ConnectionNotFound(id) => write!(f, "No connection with id {id:#010x}"),
            Self::ClassNotFound(c) => write!(f, "Class {c:#x} is not registered"),
            Self::InstanceNotFound { class_id, instance_id } => {
                write!(f, "Class {class_id:#x} has no instance {instance_id}")
            }
            Self::AttributeNotFound { class_id, instance_id, attribute_id } => write!(
                f,
                "Class {class_id:#x} instance {instance_id} has no attribute {attribute_id}"
            ),
            Self::ClassAlreadyRegistered(c) => write!(f, "Class {c:#x} is already registered"),
            Self::InstanceAlreadyExists { class_id, instance_id } => {
                write!(f, "Class {class_id:#x} already has instance {instance_id}")
            }
            Self::TypeMismatch => write!(f, "The provided value's type does not match the attribute's type"),
            Self::InvalidConfiguration(s) => write!(f, "Invalid configuration: {s}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CipError {}

// --- From Implementations for Error Conversion ---

impl From<TryFromSliceError> for CipError {
    fn from(_: TryFromSliceError) -> Self {
        CipError::SliceConversion
    }
}

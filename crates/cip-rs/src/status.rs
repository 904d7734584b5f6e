use crate::error::CipError;
use core::fmt;

/// CIP general status codes returned in every message router reply.
/// (CIP Vol. 1, Appendix B-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GeneralStatus {
    Success = 0x00,
    ConnectionFailure = 0x01,
    ResourceUnavailable = 0x02,
    InvalidParameterValue = 0x03,
    PathSegmentError = 0x04,
    PathDestinationUnknown = 0x05,
    PartialTransfer = 0x06,
    ConnectionLost = 0x07,
    ServiceNotSupported = 0x08,
    InvalidAttributeValue = 0x09,
    AttributeListError = 0x0A,
    AlreadyInRequestedMode = 0x0B,
    ObjectStateConflict = 0x0C,
    ObjectAlreadyExists = 0x0D,
    AttributeNotSetable = 0x0E,
    PrivilegeViolation = 0x0F,
    DeviceStateConflict = 0x10,
    ReplyDataTooLarge = 0x11,
    FragmentationOfPrimitiveValue = 0x12,
    NotEnoughData = 0x13,
    AttributeNotSupported = 0x14,
    TooMuchData = 0x15,
    ObjectDoesNotExist = 0x16,
    ServiceFragmentationSequenceNotInProgress = 0x17,
    NoStoredAttributeData = 0x18,
    StoreOperationFailure = 0x19,
    RoutingFailureRequestPacketTooLarge = 0x1A,
    RoutingFailureResponsePacketTooLarge = 0x1B,
    MissingAttributeListEntryData = 0x1C,
    InvalidAttributeValueList = 0x1D,
    EmbeddedServiceError = 0x1E,
    VendorSpecificError = 0x1F,
    InvalidParameter = 0x20,
    WriteOnceValueOrMediumAlreadyWritten = 0x21,
    InvalidReplyReceived = 0x22,
    KeyFailureInPath = 0x25,
    PathSizeInvalid = 0x26,
    UnexpectedAttributeInList = 0x27,
    InvalidMemberId = 0x28,
    MemberNotSetable = 0x29,
    Group2OnlyServerGeneralFailure = 0x2A,
    UnknownModbusError = 0x2B,
    AttributeNotGettable = 0x2C,
}

impl TryFrom<u8> for GeneralStatus {
    type Error = CipError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use GeneralStatus::*;
        let status = match value {
            0x00 => Success,
            0x01 => ConnectionFailure,
            0x02 => ResourceUnavailable,
            0x03 => InvalidParameterValue,
            0x04 => PathSegmentError,
            0x05 => PathDestinationUnknown,
            0x06 => PartialTransfer,
            0x07 => ConnectionLost,
            0x08 => ServiceNotSupported,
            0x09 => InvalidAttributeValue,
            0x0A => AttributeListError,
            0x0B => AlreadyInRequestedMode,
            0x0C => ObjectStateConflict,
            0x0D => ObjectAlreadyExists,
            0x0E => AttributeNotSetable,
            0x0F => PrivilegeViolation,
            0x10 => DeviceStateConflict,
            0x11 => ReplyDataTooLarge,
            0x12 => FragmentationOfPrimitiveValue,
            0x13 => NotEnoughData,
            0x14 => AttributeNotSupported,
            0x15 => TooMuchData,
            0x16 => ObjectDoesNotExist,
            0x17 => ServiceFragmentationSequenceNotInProgress,
            0x18 => NoStoredAttributeData,
            0x19 => StoreOperationFailure,
            0x1A => RoutingFailureRequestPacketTooLarge,
            0x1B => RoutingFailureResponsePacketTooLarge,
            0x1C => MissingAttributeListEntryData,
            0x1D => InvalidAttributeValueList,
            0x1E => EmbeddedServiceError,
            0x1F => VendorSpecificError,
            0x20 => InvalidParameter,
            0x21 => WriteOnceValueOrMediumAlreadyWritten,
            0x22 => InvalidReplyReceived,
            0x25 => KeyFailureInPath,
            0x26 => PathSizeInvalid,
            0x27 => UnexpectedAttributeInList,
            0x28 => InvalidMemberId,
            0x29 => MemberNotSetable,
            0x2A => Group2OnlyServerGeneralFailure,
            0x2B => UnknownModbusError,
            0x2C => AttributeNotGettable,
            _ => return Err(CipError::InvalidEnumValue(value)),
        };
        Ok(status)
    }
}

/// Connection Manager extended status codes.
///
/// These are returned verbatim as the single additional status word of a
/// failed Connection Manager service. The set is fixed by the standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ConnectionManagerStatus {
    Success = 0x0000,
    ConnectionInUse = 0x0100,
    TransportTriggerNotSupported = 0x0103,
    OwnershipConflict = 0x0106,
    ConnectionNotFoundAtTargetApplication = 0x0107,
    RpiNotSupported = 0x0111,
    InvalidOToTConnectionType = 0x0123,
    InvalidTToOConnectionType = 0x0124,
    InvalidOToTConnectionSize = 0x0127,
    InvalidTToOConnectionSize = 0x0128,
    NoMoreConnectionsAvailable = 0x0113,
    VendorIdOrProductCodeError = 0x0114,
    DeviceTypeError = 0x0115,
    RevisionMismatch = 0x0116,
    PitGreaterThanRpi = 0x011B,
    InvalidConfigurationApplicationPath = 0x0129,
    InvalidConsumingApplicationPath = 0x012A,
    InvalidProducingApplicationPath = 0x012B,
    InconsistentApplicationPathCombo = 0x012F,
    NonListenOnlyConnectionNotOpened = 0x0119,
    ParameterErrorInUnconnectedSendService = 0x0205,
    InvalidSegmentTypeInPath = 0x0315,
    TargetObjectOutOfConnections = 0x011A,
}

impl ConnectionManagerStatus {
    /// Returns the raw extended status word.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// The general status that accompanies this extended status on the wire.
    pub fn general_status(self) -> GeneralStatus {
        match self {
            Self::Success => GeneralStatus::Success,
            _ => GeneralStatus::ConnectionFailure,
        }
    }
}

impl TryFrom<u16> for ConnectionManagerStatus {
    type Error = CipError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        use ConnectionManagerStatus::*;
        let status = match value {
            0x0000 => Success,
            0x0100 => ConnectionInUse,
            0x0103 => TransportTriggerNotSupported,
            0x0106 => OwnershipConflict,
            0x0107 => ConnectionNotFoundAtTargetApplication,
            0x0111 => RpiNotSupported,
            0x0123 => InvalidOToTConnectionType,
            0x0124 => InvalidTToOConnectionType,
            0x0127 => InvalidOToTConnectionSize,
            0x0128 => InvalidTToOConnectionSize,
            0x0113 => NoMoreConnectionsAvailable,
            0x0114 => VendorIdOrProductCodeError,
            0x0115 => DeviceTypeError,
            0x0116 => RevisionMismatch,
            0x011B => PitGreaterThanRpi,
            0x0129 => InvalidConfigurationApplicationPath,
            0x012A => InvalidConsumingApplicationPath,
            0x012B => InvalidProducingApplicationPath,
            0x012F => InconsistentApplicationPathCombo,
            0x0119 => NonListenOnlyConnectionNotOpened,
            0x0205 => ParameterErrorInUnconnectedSendService,
            0x0315 => InvalidSegmentTypeInPath,
            0x011A => TargetObjectOutOfConnections,
            _ => return Err(CipError::InvalidExtendedStatus(value)),
        };
        Ok(status)
    }
}

impl fmt::Display for ConnectionManagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:#06x})", self, self.code())
    }
}

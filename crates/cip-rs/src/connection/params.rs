// crates/cip-rs/src/connection/params.rs

/// Connection type bits of the network connection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Null,
    Multicast,
    PointToPoint,
    Reserved,
}

impl ConnectionType {
    fn from_bits(bits: u32) -> Self {
        match bits & 0x03 {
            0 => Self::Null,
            1 => Self::Multicast,
            2 => Self::PointToPoint,
            _ => Self::Reserved,
        }
    }

    fn bits(self) -> u32 {
        match self {
            Self::Null => 0,
            Self::Multicast => 1,
            Self::PointToPoint => 2,
            Self::Reserved => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPriority {
    Low,
    High,
    Scheduled,
    Urgent,
}

impl ConnectionPriority {
    fn from_bits(bits: u32) -> Self {
        match bits & 0x03 {
            0 => Self::Low,
            1 => Self::High,
            2 => Self::Scheduled,
            _ => Self::Urgent,
        }
    }

    fn bits(self) -> u32 {
        self as u32
    }
}

/// Network connection parameters of one direction of a Forward Open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConnectionParams {
    /// Connection size in bytes.
    pub size: u16,
    pub variable_size: bool,
    pub priority: ConnectionPriority,
    pub connection_type: ConnectionType,
    /// Parsed but not acted upon: redundant owners are not supported.
    pub redundant_owner: bool,
}

impl NetworkConnectionParams {
    /// Decodes the 16-bit form used by Forward Open.
    pub fn from_u16(raw: u16) -> Self {
        let raw = raw as u32;
        Self {
            size: (raw & 0x01FF) as u16,
            variable_size: raw & (1 << 9) != 0,
            priority: ConnectionPriority::from_bits(raw >> 10),
            connection_type: ConnectionType::from_bits(raw >> 13),
            redundant_owner: raw & (1 << 15) != 0,
        }
    }

    /// Decodes the 32-bit form used by Large Forward Open.
    pub fn from_u32(raw: u32) -> Self {
        Self {
            size: (raw & 0xFFFF) as u16,
            variable_size: raw & (1 << 25) != 0,
            priority: ConnectionPriority::from_bits(raw >> 26),
            connection_type: ConnectionType::from_bits(raw >> 29),
            redundant_owner: raw & (1 << 31) != 0,
        }
    }

    /// Encodes the 16-bit form; sizes above 511 bytes are truncated.
    pub fn to_u16(&self) -> u16 {
        let mut raw = (self.size as u32) & 0x01FF;
        if self.variable_size {
            raw |= 1 << 9;
        }
        raw |= self.priority.bits() << 10;
        raw |= self.connection_type.bits() << 13;
        if self.redundant_owner {
            raw |= 1 << 15;
        }
        raw as u16
    }

    pub fn to_u32(&self) -> u32 {
        let mut raw = self.size as u32;
        if self.variable_size {
            raw |= 1 << 25;
        }
        raw |= self.priority.bits() << 26;
        raw |= self.connection_type.bits() << 29;
        if self.redundant_owner {
            raw |= 1 << 31;
        }
        raw
    }

    /// Checks a payload or requested length against this connection size.
    pub fn accepts_size(&self, len: usize) -> bool {
        if self.variable_size {
            len <= self.size as usize
        } else {
            len == self.size as usize
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportClass {
    Class0,
    Class1,
    Class2,
    Class3,
    Other(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductionTrigger {
    Cyclic,
    ChangeOfState,
    Application,
    Reserved(u8),
}

/// The transport type/trigger byte of a Forward Open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTrigger {
    /// Direction bit: the target acts as the server of an explicit connection.
    pub server: bool,
    pub trigger: ProductionTrigger,
    pub class: TransportClass,
}

impl TransportTrigger {
    pub fn from_byte(raw: u8) -> Self {
        let trigger = match (raw >> 4) & 0x07 {
            0 => ProductionTrigger::Cyclic,
            1 => ProductionTrigger::ChangeOfState,
            2 => ProductionTrigger::Application,
            other => ProductionTrigger::Reserved(other),
        };
        let class = match raw & 0x0F {
            0 => TransportClass::Class0,
            1 => TransportClass::Class1,
            2 => TransportClass::Class2,
            3 => TransportClass::Class3,
            other => TransportClass::Other(other),
        };
        Self {
            server: raw & 0x80 != 0,
            trigger,
            class,
        }
    }

    pub fn to_byte(&self) -> u8 {
        let trigger = match self.trigger {
            ProductionTrigger::Cyclic => 0,
            ProductionTrigger::ChangeOfState => 1,
            ProductionTrigger::Application => 2,
            ProductionTrigger::Reserved(v) => v & 0x07,
        };
        let class = match self.class {
            TransportClass::Class0 => 0,
            TransportClass::Class1 => 1,
            TransportClass::Class2 => 2,
            TransportClass::Class3 => 3,
            TransportClass::Other(v) => v & 0x0F,
        };
        let server = if self.server { 0x80 } else { 0 };
        server | (trigger << 4) | class
    }

    /// Classes 0 and 1 carry cyclic I/O data.
    pub fn is_io(&self) -> bool {
        matches!(self.class, TransportClass::Class0 | TransportClass::Class1)
    }

    /// True for the combinations this device can serve.
    pub fn is_supported(&self) -> bool {
        match self.class {
            TransportClass::Class0 | TransportClass::Class1 => {
                !matches!(self.trigger, ProductionTrigger::Reserved(_))
            }
            TransportClass::Class3 => {
                self.server && self.trigger == ProductionTrigger::Application
            }
            TransportClass::Class2 | TransportClass::Other(_) => false,
        }
    }
}

/// Decodes the connection timeout multiplier byte into the factor applied to
/// the O->T RPI. Only the low three bits are significant.
pub fn timeout_multiplier(raw: u8) -> u32 {
    4u32 << (raw & 0x07)
}

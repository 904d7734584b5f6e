// crates/cip-rs/src/connection/forward_open.rs
//! Request and reply layouts of the Connection Manager services.

use super::params::{NetworkConnectionParams, TransportTrigger};
use crate::CipError;
use crate::codec::ByteReader;
use alloc::vec::Vec;

/// Identifies a connection across its lifetime, as chosen by the originator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ConnectionTriple {
    pub connection_serial: u16,
    pub vendor_id: u16,
    pub originator_serial: u32,
}

impl ConnectionTriple {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self, CipError> {
        Ok(Self {
            connection_serial: reader.read_u16()?,
            vendor_id: reader.read_u16()?,
            originator_serial: reader.read_u32()?,
        })
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.connection_serial.to_le_bytes());
        out.extend_from_slice(&self.vendor_id.to_le_bytes());
        out.extend_from_slice(&self.originator_serial.to_le_bytes());
    }
}

/// Forward Open and Large Forward Open request data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOpenRequest {
    pub priority_time_tick: u8,
    pub timeout_ticks: u8,
    pub o_to_t_connection_id: u32,
    pub t_to_o_connection_id: u32,
    pub triple: ConnectionTriple,
    /// Raw multiplier byte; see [`super::params::timeout_multiplier`].
    pub timeout_multiplier: u8,
    /// Requested packet interval, microseconds.
    pub o_to_t_rpi_us: u32,
    pub o_to_t_params: NetworkConnectionParams,
    pub t_to_o_rpi_us: u32,
    pub t_to_o_params: NetworkConnectionParams,
    pub transport: TransportTrigger,
    /// Padded EPATH naming the application objects.
    pub connection_path: Vec<u8>,
    /// True when parsed from (or encoded as) a Large Forward Open.
    pub large: bool,
}

impl ForwardOpenRequest {
    pub fn parse(data: &[u8], large: bool) -> Result<Self, CipError> {
        let mut reader = ByteReader::new(data);
        let priority_time_tick = reader.read_u8()?;
        let timeout_ticks = reader.read_u8()?;
        let o_to_t_connection_id = reader.read_u32()?;
        let t_to_o_connection_id = reader.read_u32()?;
        let triple = ConnectionTriple::read(&mut reader)?;
        let timeout_multiplier = reader.read_u8()?;
        reader.skip(3)?;
        let o_to_t_rpi_us = reader.read_u32()?;
        let o_to_t_params = read_params(&mut reader, large)?;
        let t_to_o_rpi_us = reader.read_u32()?;
        let t_to_o_params = read_params(&mut reader, large)?;
        let transport = TransportTrigger::from_byte(reader.read_u8()?);
        let path_words = reader.read_u8()? as usize;
        let connection_path = reader.take(path_words * 2)?.to_vec();
        Ok(Self {
            priority_time_tick,
            timeout_ticks,
            o_to_t_connection_id,
            t_to_o_connection_id,
            triple,
            timeout_multiplier,
            o_to_t_rpi_us,
            o_to_t_params,
            t_to_o_rpi_us,
            t_to_o_params,
            transport,
            connection_path,
            large,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(48 + self.connection_path.len());
        out.push(self.priority_time_tick);
        out.push(self.timeout_ticks);
        out.extend_from_slice(&self.o_to_t_connection_id.to_le_bytes());
        out.extend_from_slice(&self.t_to_o_connection_id.to_le_bytes());
        self.triple.encode(&mut out);
        out.push(self.timeout_multiplier);
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(&self.o_to_t_rpi_us.to_le_bytes());
        write_params(&mut out, &self.o_to_t_params, self.large);
        out.extend_from_slice(&self.t_to_o_rpi_us.to_le_bytes());
        write_params(&mut out, &self.t_to_o_params, self.large);
        out.push(self.transport.to_byte());
        out.push(self.connection_path.len().div_ceil(2) as u8);
        out.extend_from_slice(&self.connection_path);
        if self.connection_path.len() % 2 != 0 {
            out.push(0);
        }
        out
    }
}

fn read_params(reader: &mut ByteReader<'_>, large: bool) -> Result<NetworkConnectionParams, CipError> {
    Ok(if large {
        NetworkConnectionParams::from_u32(reader.read_u32()?)
    } else {
        NetworkConnectionParams::from_u16(reader.read_u16()?)
    })
}

fn write_params(out: &mut Vec<u8>, params: &NetworkConnectionParams, large: bool) {
    if large {
        out.extend_from_slice(&params.to_u32().to_le_bytes());
    } else {
        out.extend_from_slice(&params.to_u16().to_le_bytes());
    }
}

/// Data of a successful Forward Open reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOpenSuccess {
    pub o_to_t_connection_id: u32,
    pub t_to_o_connection_id: u32,
    pub triple: ConnectionTriple,
    /// Actual packet intervals, microseconds.
    pub o_to_t_api_us: u32,
    pub t_to_o_api_us: u32,
}

impl ForwardOpenSuccess {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(26);
        out.extend_from_slice(&self.o_to_t_connection_id.to_le_bytes());
        out.extend_from_slice(&self.t_to_o_connection_id.to_le_bytes());
        self.triple.encode(&mut out);
        out.extend_from_slice(&self.o_to_t_api_us.to_le_bytes());
        out.extend_from_slice(&self.t_to_o_api_us.to_le_bytes());
        // No application reply; reserved.
        out.extend_from_slice(&[0, 0]);
        out
    }

    pub fn parse(data: &[u8]) -> Result<Self, CipError> {
        let mut reader = ByteReader::new(data);
        Ok(Self {
            o_to_t_connection_id: reader.read_u32()?,
            t_to_o_connection_id: reader.read_u32()?,
            triple: ConnectionTriple::read(&mut reader)?,
            o_to_t_api_us: reader.read_u32()?,
            t_to_o_api_us: reader.read_u32()?,
        })
    }
}

/// Data of a failed Forward Open or Forward Close reply.
pub fn failure_reply_data(triple: &ConnectionTriple, remaining_path_words: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    triple.encode(&mut out);
    out.push(remaining_path_words);
    out.push(0);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardCloseRequest {
    pub priority_time_tick: u8,
    pub timeout_ticks: u8,
    pub triple: ConnectionTriple,
    pub connection_path: Vec<u8>,
}

impl ForwardCloseRequest {
    pub fn parse(data: &[u8]) -> Result<Self, CipError> {
        let mut reader = ByteReader::new(data);
        let priority_time_tick = reader.read_u8()?;
        let timeout_ticks = reader.read_u8()?;
        let triple = ConnectionTriple::read(&mut reader)?;
        let path_words = reader.read_u8()? as usize;
        reader.skip(1)?;
        let connection_path = reader.take(path_words * 2)?.to_vec();
        Ok(Self {
            priority_time_tick,
            timeout_ticks,
            triple,
            connection_path,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.connection_path.len());
        out.push(self.priority_time_tick);
        out.push(self.timeout_ticks);
        self.triple.encode(&mut out);
        out.push(self.connection_path.len().div_ceil(2) as u8);
        out.push(0);
        out.extend_from_slice(&self.connection_path);
        if self.connection_path.len() % 2 != 0 {
            out.push(0);
        }
        out
    }
}

/// Data of a successful Forward Close reply.
pub fn forward_close_success_data(triple: &ConnectionTriple) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    triple.encode(&mut out);
    // Application reply size and reserved.
    out.extend_from_slice(&[0, 0]);
    out
}

/// Get Connection Owner request: `[reserved][path size in words][path]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetConnectionOwnerRequest {
    pub connection_path: Vec<u8>,
}

impl GetConnectionOwnerRequest {
    pub fn parse(data: &[u8]) -> Result<Self, CipError> {
        let mut reader = ByteReader::new(data);
        reader.skip(1)?;
        let path_words = reader.read_u8()? as usize;
        Ok(Self {
            connection_path: reader.take(path_words * 2)?.to_vec(),
        })
    }
}

/// Last run/idle state observed from the owner of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OwnerAction {
    #[default]
    None = 0,
    Idle = 1,
    Run = 2,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetConnectionOwnerReply {
    pub connection_count: u8,
    pub coo_connections: u8,
    pub roo_connections: u8,
    pub last_action: OwnerAction,
    pub owner: ConnectionTriple,
}

impl GetConnectionOwnerReply {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12);
        out.push(self.connection_count);
        out.push(self.coo_connections);
        out.push(self.roo_connections);
        out.push(self.last_action as u8);
        self.owner.encode(&mut out);
        out
    }
}

/// Unconnected Send request data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconnectedSendRequest {
    pub priority_time_tick: u8,
    pub timeout_ticks: u8,
    pub embedded_message: Vec<u8>,
    pub route_path: Vec<u8>,
}

impl UnconnectedSendRequest {
    pub fn parse(data: &[u8]) -> Result<Self, CipError> {
        let mut reader = ByteReader::new(data);
        let priority_time_tick = reader.read_u8()?;
        let timeout_ticks = reader.read_u8()?;
        let message_len = reader.read_u16()? as usize;
        let embedded_message = reader.take(message_len)?.to_vec();
        if message_len % 2 != 0 {
            reader.skip(1)?;
        }
        let route_words = reader.read_u8()? as usize;
        reader.skip(1)?;
        let route_path = reader.take(route_words * 2)?.to_vec();
        Ok(Self {
            priority_time_tick,
            timeout_ticks,
            embedded_message,
            route_path,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.embedded_message.len() + self.route_path.len());
        out.push(self.priority_time_tick);
        out.push(self.timeout_ticks);
        out.extend_from_slice(&(self.embedded_message.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.embedded_message);
        if self.embedded_message.len() % 2 != 0 {
            out.push(0);
        }
        out.push(self.route_path.len().div_ceil(2) as u8);
        out.push(0);
        out.extend_from_slice(&self.route_path);
        if self.route_path.len() % 2 != 0 {
            out.push(0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::params::{ConnectionPriority, ConnectionType};
    use alloc::vec;

    fn sample_request(large: bool) -> ForwardOpenRequest {
        let params = NetworkConnectionParams {
            size: 8,
            variable_size: false,
            priority: ConnectionPriority::Scheduled,
            connection_type: ConnectionType::PointToPoint,
            redundant_owner: false,
        };
        ForwardOpenRequest {
            priority_time_tick: 0x0A,
            timeout_ticks: 0x0E,
            o_to_t_connection_id: 0,
            t_to_o_connection_id: 0x1122_3344,
            triple: ConnectionTriple {
                connection_serial: 0x0102,
                vendor_id: 0x0304,
                originator_serial: 0x0506_0708,
            },
            timeout_multiplier: 1,
            o_to_t_rpi_us: 10_000,
            o_to_t_params: params,
            t_to_o_rpi_us: 20_000,
            t_to_o_params: params,
            transport: TransportTrigger::from_byte(0x01),
            connection_path: vec![0x20, 0x04, 0x24, 0x01, 0x2C, 0x96, 0x2C, 0x64],
            large,
        }
    }

    #[test]
    fn test_forward_open_layout() {
        let bytes = sample_request(false).to_bytes();
        // 36 fixed bytes plus the path.
        assert_eq!(bytes.len(), 36 + 8);
        assert_eq!(&bytes[6..10], &0x1122_3344u32.to_le_bytes());
        assert_eq!(bytes[18], 1);
        assert_eq!(&bytes[22..26], &10_000u32.to_le_bytes());
        assert_eq!(bytes[34], 0x01);
        assert_eq!(bytes[35], 4);
        assert_eq!(ForwardOpenRequest::parse(&bytes, false), Ok(sample_request(false)));
    }

    #[test]
    fn test_large_forward_open_layout() {
        let bytes = sample_request(true).to_bytes();
        assert_eq!(bytes.len(), 40 + 8);
        assert_eq!(ForwardOpenRequest::parse(&bytes, true), Ok(sample_request(true)));
    }

    #[test]
    fn test_truncated_forward_open() {
        let bytes = sample_request(false).to_bytes();
        assert!(matches!(
            ForwardOpenRequest::parse(&bytes[..bytes.len() - 2], false),
            Err(CipError::BufferUnderrun { .. })
        ));
    }

    #[test]
    fn test_success_reply_layout() {
        let reply = ForwardOpenSuccess {
            o_to_t_connection_id: 1,
            t_to_o_connection_id: 2,
            triple: ConnectionTriple::default(),
            o_to_t_api_us: 10_000,
            t_to_o_api_us: 20_000,
        };
        let bytes = reply.to_bytes();
        assert_eq!(bytes.len(), 26);
        assert_eq!(ForwardOpenSuccess::parse(&bytes), Ok(reply));
    }

    #[test]
    fn test_forward_close_round_trip() {
        let request = ForwardCloseRequest {
            priority_time_tick: 0x0A,
            timeout_ticks: 0x0E,
            triple: ConnectionTriple {
                connection_serial: 7,
                vendor_id: 8,
                originator_serial: 9,
            },
            connection_path: vec![0x20, 0x04, 0x24, 0x01],
        };
        let bytes = request.to_bytes();
        assert_eq!(bytes[10], 2);
        assert_eq!(ForwardCloseRequest::parse(&bytes), Ok(request));
    }

    #[test]
    fn test_unconnected_send_pads_odd_message() {
        let request = UnconnectedSendRequest {
            priority_time_tick: 0x07,
            timeout_ticks: 0x0A,
            embedded_message: vec![0x0E, 0x02, 0x20, 0x01, 0x24, 0x01, 0x30],
            route_path: vec![0x01, 0x00],
        };
        let bytes = request.to_bytes();
        assert_eq!(bytes.len(), 4 + 7 + 1 + 2 + 2);
        assert_eq!(UnconnectedSendRequest::parse(&bytes), Ok(request));
    }

    #[test]
    fn test_get_connection_owner_reply() {
        let reply = GetConnectionOwnerReply {
            connection_count: 2,
            coo_connections: 1,
            roo_connections: 0,
            last_action: OwnerAction::Run,
            owner: ConnectionTriple {
                connection_serial: 1,
                vendor_id: 2,
                originator_serial: 3,
            },
        };
        assert_eq!(reply.to_bytes(), vec![2, 1, 0, 2, 1, 0, 2, 0, 3, 0, 0, 0]);
    }
}

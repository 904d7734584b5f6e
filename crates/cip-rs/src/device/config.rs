// crates/cip-rs/src/device/config.rs
//! Static device configuration: identity values and connection limits.

use crate::CipError;
use crate::types::CipRevision;
use alloc::string::String;

/// Configuration of a [`CipDevice`](super::CipDevice).
///
/// The identity fields are written into the Identity object when the device
/// is created. Everything else is read by the Connection Manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    pub revision: CipRevision,
    pub serial_number: u32,
    pub product_name: String,

    /// Maximum number of simultaneously open class 0/1 connections.
    pub max_io_connections: usize,
    /// Maximum number of simultaneously open class 3 connections.
    pub max_explicit_connections: usize,
    /// Maximum number of connections producing from the same assembly.
    pub max_connections_per_point: usize,

    /// Consumed connection point that marks an input-only connection.
    pub input_only_heartbeat_point: u32,
    /// Consumed connection point that marks a listen-only connection.
    pub listen_only_heartbeat_point: u32,

    /// O->T I/O data carries a 32-bit run/idle header.
    pub o_to_t_run_idle_header: bool,
    /// T->O I/O data carries a 32-bit run/idle header.
    pub t_to_o_run_idle_header: bool,

    /// Inactivity timeout applied to explicit (class 3) connections, in microseconds.
    pub explicit_inactivity_timeout_us: u64,

    /// Seed for connection id allocation. Varying it across power cycles
    /// keeps ids from a previous incarnation from being reused immediately.
    pub connection_id_seed: u32,

    /// Port and slot an Unconnected Send route path must name to reach this device.
    pub local_port: u16,
    pub local_slot: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: 1,
            device_type: 0x0C,
            product_code: 1,
            revision: CipRevision::new(1, 1),
            serial_number: 0x0000_0001,
            product_name: String::from("cip-rs adapter"),
            max_io_connections: 8,
            max_explicit_connections: 6,
            max_connections_per_point: 4,
            input_only_heartbeat_point: 198,
            listen_only_heartbeat_point: 199,
            o_to_t_run_idle_header: true,
            t_to_o_run_idle_header: false,
            explicit_inactivity_timeout_us: 10_000_000,
            connection_id_seed: 1,
            local_port: 1,
            local_slot: 0,
        }
    }
}

impl DeviceConfig {
    /// Checks that the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), CipError> {
        if self.max_io_connections == 0 && self.max_explicit_connections == 0 {
            return Err(CipError::InvalidConfiguration(
                "At least one connection must be allowed",
            ));
        }
        if self.max_connections_per_point == 0 {
            return Err(CipError::InvalidConfiguration(
                "max_connections_per_point must be non-zero",
            ));
        }
        if self.input_only_heartbeat_point == self.listen_only_heartbeat_point {
            return Err(CipError::InvalidConfiguration(
                "Input-only and listen-only heartbeat points must differ",
            ));
        }
        if self.input_only_heartbeat_point == 0 || self.listen_only_heartbeat_point == 0 {
            return Err(CipError::InvalidConfiguration(
                "Heartbeat connection points must be non-zero",
            ));
        }
        if self.explicit_inactivity_timeout_us == 0 {
            return Err(CipError::InvalidConfiguration(
                "Explicit inactivity timeout must be non-zero",
            ));
        }
        if self.product_name.len() > u8::MAX as usize {
            return Err(CipError::InvalidConfiguration(
                "Product name does not fit a SHORT_STRING",
            ));
        }
        if self.revision.major == 0 || self.revision.major > 0x7F {
            return Err(CipError::InvalidConfiguration(
                "Major revision must be in 1..=127",
            ));
        }
        Ok(())
    }
}

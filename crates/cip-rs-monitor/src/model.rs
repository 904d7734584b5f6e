//! Serializable snapshots of a device's connection state.
//!
//! A snapshot is captured on the real-time thread, handed to the monitor
//! thread through a channel and serialized to JSON for the web frontend.

use cip_rs::connection::{CipConnection, ConnectionKind, ConnectionStats};
use cip_rs::{CipDevice, ConnectionEvent};
use serde::Serialize;

/// One entry of the connection table.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub kind: String,
    pub state: String,
    pub o_to_t_connection_id: u32,
    pub t_to_o_connection_id: u32,
    pub connection_serial: u16,
    pub originator_vendor_id: u16,
    pub originator_serial: u32,
    pub consumed_point: u32,
    pub produced_point: u32,
    pub o_to_t_rpi_us: u64,
    pub t_to_o_rpi_us: u64,
    pub inactivity_timeout_us: u64,
    pub watchdog_remaining_us: u64,
    pub produced_packets: u32,
}

impl From<&CipConnection> for ConnectionInfo {
    fn from(conn: &CipConnection) -> Self {
        let kind = match conn.kind {
            ConnectionKind::Explicit => "Explicit",
            ConnectionKind::ExclusiveOwner => "ExclusiveOwner",
            ConnectionKind::InputOnly => "InputOnly",
            ConnectionKind::ListenOnly => "ListenOnly",
        };
        Self {
            kind: kind.to_string(),
            state: conn.state.to_string(),
            o_to_t_connection_id: conn.o_to_t_connection_id,
            t_to_o_connection_id: conn.t_to_o_connection_id,
            connection_serial: conn.triple.connection_serial,
            originator_vendor_id: conn.triple.vendor_id,
            originator_serial: conn.triple.originator_serial,
            consumed_point: conn.consumed_point,
            produced_point: conn.produced_point,
            o_to_t_rpi_us: conn.o_to_t_rpi_us,
            t_to_o_rpi_us: conn.t_to_o_rpi_us,
            inactivity_timeout_us: conn.inactivity_timeout_us,
            watchdog_remaining_us: conn.watchdog_remaining_us,
            produced_packets: conn.produced_encap_sequence,
        }
    }
}

/// An I/O connection event, as shown in the event log.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    pub kind: String,
    pub o_to_t_connection_id: u32,
    pub t_to_o_connection_id: u32,
    pub consumed_point: u32,
    pub produced_point: u32,
}

impl From<&ConnectionEvent> for EventRecord {
    fn from(event: &ConnectionEvent) -> Self {
        Self {
            kind: event.kind.to_string(),
            o_to_t_connection_id: event.o_to_t_connection_id,
            t_to_o_connection_id: event.t_to_o_connection_id,
            consumed_point: event.consumed_point,
            produced_point: event.produced_point,
        }
    }
}

/// Connection Manager counters (instance 1, attributes 1-8).
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct DiagnosticCounters {
    pub open_requests: u16,
    pub open_format_rejects: u16,
    pub open_resource_rejects: u16,
    pub open_other_rejects: u16,
    pub close_requests: u16,
    pub close_format_requests: u16,
    pub close_other_requests: u16,
    pub connection_timeouts: u16,
}

impl From<&ConnectionStats> for DiagnosticCounters {
    fn from(stats: &ConnectionStats) -> Self {
        Self {
            open_requests: stats.open_requests,
            open_format_rejects: stats.open_format_rejects,
            open_resource_rejects: stats.open_resource_rejects,
            open_other_rejects: stats.open_other_rejects,
            close_requests: stats.close_requests,
            close_format_requests: stats.close_format_requests,
            close_other_requests: stats.close_other_requests,
            connection_timeouts: stats.connection_timeouts,
        }
    }
}

/// The data packet sent from the device thread to the monitor.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DiagnosticSnapshot {
    pub product_name: String,
    pub vendor_id: u16,
    pub product_code: u16,
    pub revision: String,
    pub connections: Vec<ConnectionInfo>,
    /// Events drained since the previous snapshot.
    pub events: Vec<EventRecord>,
    pub counters: DiagnosticCounters,
}

impl DiagnosticSnapshot {
    /// Captures the device state. `events` are the connection events the
    /// application drained since the last snapshot.
    pub fn capture(device: &CipDevice, events: &[ConnectionEvent]) -> Self {
        let config = device.config();
        Self {
            product_name: config.product_name.clone(),
            vendor_id: config.vendor_id,
            product_code: config.product_code,
            revision: config.revision.to_string(),
            connections: device
                .connection_manager()
                .connections()
                .map(ConnectionInfo::from)
                .collect(),
            events: events.iter().map(EventRecord::from).collect(),
            counters: DiagnosticCounters::from(device.stats()),
        }
    }
}

// crates/cip-rs/src/connection/events.rs

use crate::types::IoConnectionEvent;
use alloc::vec::Vec;

/// A state change of an I/O connection, queued for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub kind: IoConnectionEvent,
    pub o_to_t_connection_id: u32,
    pub t_to_o_connection_id: u32,
    /// Assembly instance (or heartbeat point) consumed by the connection.
    pub consumed_point: u32,
    /// Assembly instance produced by the connection.
    pub produced_point: u32,
}

/// What happened to a received I/O packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// New data was written to the consumed assembly.
    Accepted,
    /// Heartbeat or unchanged sequence count: watchdog reset, no data written.
    Refreshed,
    /// Run/idle header reported idle: watchdog reset, no data written.
    Idle,
    /// Encapsulation sequence number not newer than the last accepted one.
    Stale,
    /// Payload length does not match the connection size.
    SizeMismatch,
    /// No open connection consumes on this id.
    UnknownConnection,
}

/// An I/O packet the transport should send on a T->O connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedPacket {
    pub connection_id: u32,
    pub encap_sequence: u32,
    pub payload: Vec<u8>,
}

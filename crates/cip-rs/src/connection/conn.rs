// crates/cip-rs/src/connection/conn.rs

use super::forward_open::{ConnectionTriple, OwnerAction};
use super::params::{NetworkConnectionParams, TransportTrigger};
use crate::CipError;
use alloc::vec::Vec;
use core::fmt;

/// Lifecycle states of a connection object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    NonExistent,
    Configuring,
    Established,
    TimedOut,
    ClosedByPeer,
    ClosedByApplication,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Inputs that drive the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionTransition {
    /// A Forward Open was accepted and resources were allocated.
    Configure,
    /// Configuration data was applied.
    Establish,
    /// The inactivity watchdog reached zero.
    WatchdogExpired,
    /// The originator closed the connection.
    ForwardClose,
    /// The device closed the connection (session loss, explicit request).
    ApplicationClose,
    /// The connection was removed from the table.
    Release,
}

/// Computes the next state, or rejects a transition the lifecycle does not allow.
pub fn next_state(
    state: ConnectionState,
    transition: ConnectionTransition,
) -> Result<ConnectionState, CipError> {
    use ConnectionState::*;
    use ConnectionTransition::*;
    let next = match (state, transition) {
        (NonExistent, Configure) => Configuring,
        (Configuring, Establish) => Established,
        // Configuration data could not be applied.
        (Configuring, ApplicationClose) => ClosedByApplication,
        (Established, WatchdogExpired) => TimedOut,
        (Established, ForwardClose) => ClosedByPeer,
        (Established, ApplicationClose) => ClosedByApplication,
        (TimedOut | ClosedByPeer | ClosedByApplication, Release) => NonExistent,
        (from, transition) => return Err(CipError::InvalidStateTransition { from, transition }),
    };
    Ok(next)
}

/// Role of a connection, derived from its application path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// Class 3 connection to the Message Router.
    Explicit,
    /// Consumes into an assembly; at most one per consumed assembly.
    ExclusiveOwner,
    /// Consumes only heartbeats; produces independently.
    InputOnly,
    /// Consumes only heartbeats; requires another connection on the produced point.
    ListenOnly,
}

impl ConnectionKind {
    pub fn is_io(self) -> bool {
        !matches!(self, Self::Explicit)
    }
}

/// One entry of the connection table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipConnection {
    pub state: ConnectionState,
    pub kind: ConnectionKind,
    pub triple: ConnectionTriple,
    pub o_to_t_connection_id: u32,
    pub t_to_o_connection_id: u32,
    pub transport: TransportTrigger,
    pub o_to_t_params: NetworkConnectionParams,
    pub t_to_o_params: NetworkConnectionParams,
    pub o_to_t_rpi_us: u64,
    pub t_to_o_rpi_us: u64,
    /// Decoded multiplier (4, 8, ... 512).
    pub timeout_multiplier: u32,
    pub config_instance: Option<u32>,
    pub consumed_point: u32,
    pub produced_point: u32,
    pub session_handle: Option<u32>,
    /// O->T data carries a run/idle header.
    pub consumes_run_idle: bool,
    /// T->O data carries a run/idle header.
    pub produces_run_idle: bool,

    // --- Timing (microseconds) ---
    pub inactivity_timeout_us: u64,
    pub watchdog_remaining_us: u64,
    pub production_remaining_us: u64,
    pub inhibit_time_us: u64,
    pub inhibit_remaining_us: u64,
    pub production_pending: bool,

    // --- Sequencing ---
    pub last_encap_sequence: Option<u32>,
    pub last_cip_sequence: Option<u16>,
    pub produced_cip_sequence: u16,
    pub produced_encap_sequence: u32,
    pub last_action: OwnerAction,
    /// Sequence count and encoded reply of the last connected explicit request.
    pub last_explicit: Option<(u16, Vec<u8>)>,
}

impl CipConnection {
    /// Applies a transition, leaving the state untouched if it is illegal.
    pub fn apply(&mut self, transition: ConnectionTransition) -> Result<(), CipError> {
        self.state = next_state(self.state, transition)?;
        Ok(())
    }

    pub fn is_class1(&self) -> bool {
        self.transport.class == super::params::TransportClass::Class1
    }

    /// True if either direction uses `id`.
    pub fn uses_id(&self, id: u32) -> bool {
        self.o_to_t_connection_id == id || self.t_to_o_connection_id == id
    }
}

// crates/cip-rs/src/connection/mod.rs
//! Connection Manager: connection table, Forward Open/Close handling, I/O
//! consumption and production, and inactivity watchdogs.

pub mod conn;
pub mod events;
pub mod forward_open;
pub mod manager;
pub mod params;
mod watchdog;

pub use conn::{CipConnection, ConnectionKind, ConnectionState, ConnectionTransition, next_state};
pub use events::{ConnectionEvent, ConsumeOutcome, ProducedPacket};
pub use forward_open::{
    ConnectionTriple, ForwardCloseRequest, ForwardOpenRequest, ForwardOpenSuccess,
    GetConnectionOwnerReply, GetConnectionOwnerRequest, OwnerAction, UnconnectedSendRequest,
};
pub use manager::{ConnectionManager, ConnectionStats, ExplicitLookup};
pub use params::{
    ConnectionPriority, ConnectionType, NetworkConnectionParams, ProductionTrigger, TransportClass,
    TransportTrigger, timeout_multiplier,
};

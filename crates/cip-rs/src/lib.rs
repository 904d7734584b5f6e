#![cfg_attr(not(feature = "std"), no_std)]


// 'alloc' is used for dynamic allocation (e.g., Vec<u8> in paths and replies)
extern crate alloc;

// --- Foundation Modules ---
pub mod types;
pub mod status;
pub mod error;

// --- Encoding Layers ---
pub mod codec;
pub mod epath;

// --- Object Model ---
pub mod object;
pub mod router;

// --- Connections ---
pub mod connection;

// --- Device Abstraction ---
pub mod device;

// --- Top-level Exports ---
pub use error::CipError;
pub use status::{ConnectionManagerStatus, GeneralStatus};
pub use types::{AttributeFlags, CipDataType, CipRevision, IoConnectionEvent, ServiceCode};
pub use codec::{ByteReader, TypeTag, TypedValue};
pub use epath::{ResolvedPath, Segment, decode_path};
pub use object::ObjectRegistry;
pub use router::{MessageRouterRequest, MessageRouterResponse, RequestContext};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, ConsumeOutcome};
pub use device::{CipDevice, DeviceAction, DeviceConfig};

//! EPATH segment decoding and encoding.
//!
//! Only the padded encoding is supported, which is what the Message Router
//! and the Connection Manager receive.

mod path;
mod segment;

pub use path::{ResolvedPath, decode_path};
pub use segment::{
    DataSegment, ElectronicKey, LogicalSegment, NetworkSegment, PortSegment, Segment,
    decode_segment, decode_segments, encode_path,
};

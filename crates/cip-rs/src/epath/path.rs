// crates/cip-rs/src/epath/path.rs

use super::segment::{LogicalSegment, Segment, decode_segment};
use crate::CipError;
use alloc::vec::Vec;
use log::trace;

/// The addressing information extracted from an EPATH.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPath {
    pub class_id: Option<u16>,
    pub instance_id: Option<u32>,
    pub attribute_id: Option<u16>,
    pub connection_point: Option<u32>,
    pub member_id: Option<u32>,
    /// Segments that did not fill a slot, in the order they appeared.
    pub leftover: Vec<Segment>,
    /// Trailing bytes that did not form a complete segment.
    pub unconsumed: usize,
}

impl ResolvedPath {
    /// True if the whole path was decoded.
    pub fn is_complete(&self) -> bool {
        self.unconsumed == 0
    }

    /// Instance addressed by the path, taking a connection point as an
    /// instance when no instance segment is present.
    pub fn target_instance(&self) -> Option<u32> {
        self.instance_id.or(self.connection_point)
    }
}

fn fill<T>(slot: &mut Option<T>, value: T, segment: Segment, leftover: &mut Vec<Segment>) {
    if slot.is_none() {
        *slot = Some(value);
    } else {
        leftover.push(segment);
    }
}

/// Decodes a padded EPATH left to right into a [`ResolvedPath`].
///
/// The first class, instance, attribute, connection point and member segment
/// each fill their slot; anything else goes to `leftover`. Decoding stops at
/// a truncated segment and records how many bytes were left. An invalid
/// segment type fails the whole decode.
pub fn decode_path(data: &[u8]) -> Result<ResolvedPath, CipError> {
    let mut path = ResolvedPath::default();
    let mut offset = 0;

    while offset < data.len() {
        let (segment, used) = match decode_segment(&data[offset..]) {
            Ok(decoded) => decoded,
            Err(CipError::BufferUnderrun { .. }) => {
                trace!(
                    "[EPATH] Truncated segment at offset {}, {} bytes unconsumed",
                    offset,
                    data.len() - offset
                );
                path.unconsumed = data.len() - offset;
                break;
            }
            Err(e) => return Err(e),
        };
        offset += used;

        match segment {
            Segment::Logical(LogicalSegment::ClassId(v)) => {
                fill(&mut path.class_id, v, segment, &mut path.leftover)
            }
            Segment::Logical(LogicalSegment::InstanceId(v)) => {
                fill(&mut path.instance_id, v, segment, &mut path.leftover)
            }
            Segment::Logical(LogicalSegment::AttributeId(v)) => {
                fill(&mut path.attribute_id, v, segment, &mut path.leftover)
            }
            Segment::Logical(LogicalSegment::ConnectionPoint(v)) => {
                fill(&mut path.connection_point, v, segment, &mut path.leftover)
            }
            Segment::Logical(LogicalSegment::MemberId(v)) => {
                fill(&mut path.member_id, v, segment, &mut path.leftover)
            }
            other => path.leftover.push(other),
        }
    }
    Ok(path)
}

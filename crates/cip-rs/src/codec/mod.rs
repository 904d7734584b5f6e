//! Little-endian encoding of the CIP primitive data types.

mod reader;
mod value;

pub use reader::ByteReader;
pub use value::{TypeTag, TypedValue};

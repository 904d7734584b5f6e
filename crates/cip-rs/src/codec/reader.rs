use crate::CipError;

/// A bounds-checked cursor over a received byte buffer.
///
/// All multi-byte reads are little-endian. A read never advances past the
/// end of the buffer: it fails with [`CipError::BufferUnderrun`] and leaves
/// the cursor where it was.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

macro_rules! read_le {
    ($name:ident, $type:ty) => {
        pub fn $name(&mut self) -> Result<$type, CipError> {
            let bytes = self.take(core::mem::size_of::<$type>())?;
            Ok(<$type>::from_le_bytes(bytes.try_into()?))
        }
    };
}

impl<'a> ByteReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consumes `len` bytes and returns them as a sub-slice.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], CipError> {
        if len > self.remaining() {
            return Err(CipError::BufferUnderrun {
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), CipError> {
        self.take(len).map(|_| ())
    }

    /// Consumes and returns everything that is left.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buffer[self.position..];
        self.position = self.buffer.len();
        slice
    }

    read_le!(read_u8, u8);
    read_le!(read_u16, u16);
    read_le!(read_u32, u32);
    read_le!(read_u64, u64);
    read_le!(read_i8, i8);
    read_le!(read_i16, i16);
    read_le!(read_i32, i32);
    read_le!(read_i64, i64);
    read_le!(read_f32, f32);
    read_le!(read_f64, f64);
}

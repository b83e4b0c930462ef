pub mod reader;

use crate::{DecodeError, Result};
use bytes::{Buf, Bytes};
use reader::{Decode, Length, Reader};
use strum::IntoStaticStr;

/// Names of the fixed-width values a stream can read. Used to report what was being
/// read when the buffer ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Primitive {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
}

impl Primitive {
    pub fn width(self) -> usize {
        match self {
            Primitive::Bool | Primitive::Int8 | Primitive::UInt8 => 1,
            Primitive::Int16 | Primitive::UInt16 => 2,
            Primitive::Int32 | Primitive::UInt32 | Primitive::Float => 4,
            Primitive::Int64 | Primitive::UInt64 | Primitive::Double => 8,
        }
    }
}

/// A read cursor over an immutable, fully loaded file buffer.
///
/// The stream is `Copy`: lookahead is done by copying it and reading from the copy, which
/// leaves the original offset where it was.
#[derive(Debug, Clone, Copy)]
pub struct Stream<'a> {
    data: &'a [u8],
    offset: usize,
}

macro_rules! primitive {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $prim:ident, $get:ident) => {
        $(#[$doc])*
        pub fn $name(&mut self) -> Result<$ty> {
            let mut chunk = self.take(Primitive::$prim.into(), Primitive::$prim.width())?;
            Ok(chunk.$get())
        }
    };
}

impl<'a> Stream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    pub fn at(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte length of the whole underlying buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Hands out the next `n` bytes and moves past them, or fails without moving.
    fn take(&mut self, ty: &'static str, n: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(DecodeError::Underrun {
                ty,
                offset: self.offset,
                needed: n,
                remaining,
            });
        }

        let chunk = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(chunk)
    }

    /// Moves forward by `n` bytes without looking at them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take("skip", n).map(|_| ())
    }

    pub fn bool(&mut self) -> Result<bool> {
        let mut chunk = self.take(Primitive::Bool.into(), Primitive::Bool.width())?;
        Ok(chunk.get_u8() != 0)
    }

    primitive!(int8, i8, Int8, get_i8);
    primitive!(uint8, u8, UInt8, get_u8);
    primitive!(int16, i16, Int16, get_i16);
    primitive!(uint16, u16, UInt16, get_u16);
    primitive!(int32, i32, Int32, get_i32);
    primitive!(uint32, u32, UInt32, get_u32);
    primitive!(int64, i64, Int64, get_i64);
    primitive!(uint64, u64, UInt64, get_u64);
    primitive!(float, f32, Float, get_f32);
    primitive!(double, f64, Double, get_f64);
    primitive!(
        /// The only little-endian read: summary files keep their offset table in native order.
        int32_le,
        i32,
        Int32,
        get_i32_le
    );

    /// Reads a length with `length`, then copies that many raw bytes.
    pub fn bytes<R>(&mut self, length: &R) -> Result<Bytes>
    where
        R: Reader,
        R::Value: Length,
    {
        let at = self.offset;
        let len = self.read(length)?;
        let n = len.to_len().ok_or(DecodeError::InvalidLength {
            ty: "bytes",
            length: len.raw(),
            offset: at,
        })?;

        self.raw(n)
    }

    /// Copies the next `n` bytes.
    pub fn raw(&mut self, n: usize) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(self.take("bytes", n)?))
    }

    pub fn bytes16(&mut self) -> Result<Bytes> {
        self.bytes(&reader::of::<u16>())
    }

    pub fn bytes32(&mut self) -> Result<Bytes> {
        self.bytes(&reader::of::<u32>())
    }

    /// Like [`Stream::bytes`], decoded as UTF-8. Text that is not valid UTF-8 does not fail
    /// the read, it comes back as an `INVALID(size=.., bytes=..)` placeholder.
    pub fn string<R>(&mut self, length: &R) -> Result<String>
    where
        R: Reader,
        R::Value: Length,
    {
        let at = self.offset;
        let raw = self.bytes(length)?;
        match std::str::from_utf8(&raw) {
            Ok(text) => Ok(text.to_owned()),
            Err(e) => {
                tracing::warn!(offset = at, size = raw.len(), "undecodable text: {e}");
                Ok(invalid_text(&raw))
            }
        }
    }

    pub fn string16(&mut self) -> Result<String> {
        self.string(&reader::of::<u16>())
    }

    pub fn string32(&mut self) -> Result<String> {
        self.string(&reader::of::<u32>())
    }

    pub fn read<R: Reader>(&mut self, reader: &R) -> Result<R::Value> {
        reader.read(self)
    }

    pub fn decode<T: Decode>(&mut self) -> Result<T> {
        T::decode(self)
    }
}

/// Placeholder for text that could not be decoded, keeping its size and content visible.
pub fn invalid_text(raw: &[u8]) -> String {
    format!("INVALID(size={}, bytes={})", raw.len(), hex::encode(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_primitives_are_big_endian() {
        let data: &[u8] = &[
            1, // bool
            0xFF, // int8
            0x01, 0x02, // uint16
            0xFF, 0xFF, 0xFF, 0xFE, // int32
            0, 0, 0, 0, 0, 0, 0, 100, // int64
        ];
        let mut stream = Stream::new(data);
        assert!(stream.bool().unwrap());
        assert_eq!(stream.int8().unwrap(), -1);
        assert_eq!(stream.uint16().unwrap(), 0x0102);
        assert_eq!(stream.int32().unwrap(), -2);
        assert_eq!(stream.int64().unwrap(), 100);
        assert_eq!(stream.offset(), data.len());
        assert!(stream.is_exhausted());
    }

    #[test]
    fn test_floats() {
        let mut data = Vec::new();
        data.extend_from_slice(&1.5f32.to_be_bytes());
        data.extend_from_slice(&(-0.25f64).to_be_bytes());
        let mut stream = Stream::new(&data);
        assert_eq!(stream.float().unwrap(), 1.5);
        assert_eq!(stream.double().unwrap(), -0.25);
    }

    #[test]
    fn test_int32_le() {
        let data: &[u8] = &[10, 0, 0, 0, 0, 0, 0, 10];
        let mut stream = Stream::new(data);
        assert_eq!(stream.int32_le().unwrap(), 10);
        assert_eq!(stream.int32().unwrap(), 10);
    }

    #[test]
    fn test_underrun_keeps_offset() {
        let data: &[u8] = &[0, 0, 0, 1, 0, 0];
        let mut stream = Stream::new(data);
        assert_eq!(stream.int32().unwrap(), 1);

        let err = stream.int64().unwrap_err();
        assert_eq!(
            err,
            DecodeError::Underrun {
                ty: "int64",
                offset: 4,
                needed: 8,
                remaining: 2,
            }
        );
        assert_eq!(err.to_string(), "failed to read `int64` at offset 4: 8 bytes needed, 2 remaining");
        assert_eq!(stream.offset(), 4);
    }

    #[test]
    fn test_skip() {
        let data: &[u8] = &[0; 5];
        let mut stream = Stream::new(data);
        assert!(stream.skip(3).is_ok());
        assert_eq!(stream.offset(), 3);
        assert!(stream.skip(3).is_err());
        assert!(stream.skip(2).is_ok());
        assert!(stream.is_exhausted());
    }

    #[test]
    fn test_lookahead_copy_does_not_move_original() {
        let data: &[u8] = &[0, 3, b'a', b'b', b'c', 0, 1, b'z'];
        let mut stream = Stream::new(data);
        let mut peek = stream;
        assert_eq!(peek.bytes16().unwrap(), Bytes::from("abc"));
        assert_eq!(peek.offset(), 5);
        assert_eq!(stream.offset(), 0);
        assert_eq!(stream.bytes16().unwrap(), Bytes::from("abc"));
        assert_eq!(stream.bytes16().unwrap(), Bytes::from("z"));
    }

    #[test]
    fn test_bytes32_truncated() {
        let data: &[u8] = &[0, 0, 0, 9, 1, 2, 3];
        let mut stream = Stream::new(data);
        let err = stream.bytes32().unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Underrun {
                ty: "bytes",
                offset: 4,
                needed: 9,
                remaining: 3,
            }
        ));
    }

    #[test]
    fn test_negative_length() {
        let data: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF, 1, 2];
        let mut stream = Stream::new(data);
        let err = stream.bytes(&reader::of::<i32>()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidLength {
                ty: "bytes",
                length: -1,
                offset: 0,
            }
        );
    }

    #[test]
    fn test_string() {
        let data: &[u8] = &[0, 5, b'h', b'e', b'l', b'l', b'o', 0, 0, 0, 2, b'o', b'k'];
        let mut stream = Stream::new(data);
        assert_eq!(stream.string16().unwrap(), "hello");
        assert_eq!(stream.string32().unwrap(), "ok");
    }

    #[traced_test]
    #[test]
    fn test_invalid_utf8_is_placeholder() {
        let data: &[u8] = &[0, 2, 0xFF, 0xFE, 0, 1, b'x'];
        let mut stream = Stream::new(data);
        let text = stream.string16().unwrap();
        assert_eq!(text, "INVALID(size=2, bytes=fffe)");
        assert!(text.contains("size=2"));
        assert!(text.contains("fffe"));
        assert!(logs_contain("undecodable text"));

        // Decoding goes on right after the bad string.
        assert_eq!(stream.string16().unwrap(), "x");
    }

    #[test]
    fn test_primitive_names() {
        assert_eq!(Primitive::UInt16.to_string(), "uint16");
        let name: &'static str = Primitive::Double.into();
        assert_eq!(name, "double");
        assert_eq!(Primitive::Double.width(), 8);
    }
}

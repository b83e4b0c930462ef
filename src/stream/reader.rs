//! Composable readers on top of [`Stream`].
//!
//! A [`Reader`] is a value that knows how to pull one typed value off a stream. Fixed records
//! implement [`Decode`] field by field in layout order, and every `Decode` type is also a
//! reader through [`of`]. Collections, tuples, tagged unions and enums are built by combining
//! readers.

use super::Stream;
use crate::{DecodeError, Result};
use ahash::AHashMap;
use std::hash::Hash;
use std::marker::PhantomData;

pub trait Reader {
    type Value;

    fn read(&self, stream: &mut Stream<'_>) -> Result<Self::Value>;
}

/// A type with a fixed on-disk layout.
pub trait Decode: Sized {
    fn decode(stream: &mut Stream<'_>) -> Result<Self>;
}

/// Integers usable as length or count prefixes.
pub trait Length: Copy {
    /// `None` when the value cannot be a length, e.g. negative.
    fn to_len(self) -> Option<usize>;

    /// The value as read, for error reports.
    fn raw(self) -> i64;
}

macro_rules! length {
    ($($ty:ty),*) => {
        $(
            impl Length for $ty {
                fn to_len(self) -> Option<usize> {
                    usize::try_from(self).ok()
                }

                fn raw(self) -> i64 {
                    self as i64
                }
            }
        )*
    };
}

length!(u8, i8, u16, i16, u32, i32, u64, i64);

macro_rules! decode_primitive {
    ($($ty:ty => $method:ident),*) => {
        $(
            impl Decode for $ty {
                fn decode(stream: &mut Stream<'_>) -> Result<Self> {
                    stream.$method()
                }
            }
        )*
    };
}

decode_primitive!(
    bool => bool,
    i8 => int8,
    u8 => uint8,
    i16 => int16,
    u16 => uint16,
    i32 => int32,
    u32 => uint32,
    i64 => int64,
    u64 => uint64,
    f32 => float,
    f64 => double
);

/// Reader for any [`Decode`] type.
#[derive(Debug)]
pub struct Of<T>(PhantomData<T>);

impl<T> Clone for Of<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Of<T> {}

pub fn of<T: Decode>() -> Of<T> {
    Of(PhantomData)
}

impl<T: Decode> Reader for Of<T> {
    type Value = T;

    fn read(&self, stream: &mut Stream<'_>) -> Result<T> {
        T::decode(stream)
    }
}

/// Length-prefixed raw bytes.
#[derive(Debug, Clone, Copy)]
pub struct RawBytes<L>(L);

pub fn bytes<L>(length: L) -> RawBytes<L>
where
    L: Reader,
    L::Value: Length,
{
    RawBytes(length)
}

pub fn bytes16() -> RawBytes<Of<u16>> {
    bytes(of::<u16>())
}

pub fn bytes32() -> RawBytes<Of<u32>> {
    bytes(of::<u32>())
}

impl<L> Reader for RawBytes<L>
where
    L: Reader,
    L::Value: Length,
{
    type Value = bytes::Bytes;

    fn read(&self, stream: &mut Stream<'_>) -> Result<Self::Value> {
        stream.bytes(&self.0)
    }
}

/// Length-prefixed UTF-8 text, see [`Stream::string`].
#[derive(Debug, Clone, Copy)]
pub struct Text<L>(L);

pub fn string<L>(length: L) -> Text<L>
where
    L: Reader,
    L::Value: Length,
{
    Text(length)
}

pub fn string16() -> Text<Of<u16>> {
    string(of::<u16>())
}

pub fn string32() -> Text<Of<u32>> {
    string(of::<u32>())
}

impl<L> Reader for Text<L>
where
    L: Reader,
    L::Value: Length,
{
    type Value = String;

    fn read(&self, stream: &mut Stream<'_>) -> Result<String> {
        stream.string(&self.0)
    }
}

/// Reads a count with `count`, then that many elements, failing on a negative count.
fn counted<C, F>(stream: &mut Stream<'_>, count: &C, mut element: F) -> Result<()>
where
    C: Reader,
    C::Value: Length,
    F: FnMut(&mut Stream<'_>) -> Result<()>,
{
    let at = stream.offset();
    let n = stream.read(count)?;
    let n = n.to_len().ok_or(DecodeError::InvalidLength {
        ty: "count",
        length: n.raw(),
        offset: at,
    })?;

    for _ in 0..n {
        element(stream)?;
    }

    Ok(())
}

/// An `int32` element count followed by the elements, order preserved.
#[derive(Debug, Clone, Copy)]
pub struct Array32<E>(E);

pub fn array32<E: Reader>(element: E) -> Array32<E> {
    Array32(element)
}

impl<E: Reader> Reader for Array32<E> {
    type Value = Vec<E::Value>;

    fn read(&self, stream: &mut Stream<'_>) -> Result<Self::Value> {
        let mut items = Vec::new();
        counted(stream, &of::<i32>(), |s| {
            items.push(self.0.read(s)?);
            Ok(())
        })?;

        Ok(items)
    }
}

/// A count followed by key/value pairs. Uniqueness of keys is up to the writer, a repeated
/// key keeps the last value.
#[derive(Debug, Clone, Copy)]
pub struct Map<C, K, V> {
    count: C,
    key: K,
    value: V,
}

pub fn map16<K: Reader, V: Reader>(key: K, value: V) -> Map<Of<i16>, K, V> {
    Map {
        count: of::<i16>(),
        key,
        value,
    }
}

pub fn map32<K: Reader, V: Reader>(key: K, value: V) -> Map<Of<i32>, K, V> {
    Map {
        count: of::<i32>(),
        key,
        value,
    }
}

impl<C, K, V> Reader for Map<C, K, V>
where
    C: Reader,
    C::Value: Length,
    K: Reader,
    K::Value: Eq + Hash,
    V: Reader,
{
    type Value = AHashMap<K::Value, V::Value>;

    fn read(&self, stream: &mut Stream<'_>) -> Result<Self::Value> {
        let mut map = AHashMap::new();
        counted(stream, &self.count, |s| {
            let key = self.key.read(s)?;
            let value = self.value.read(s)?;
            map.insert(key, value);
            Ok(())
        })?;

        Ok(map)
    }
}

macro_rules! tuple_reader {
    ($($name:ident),+) => {
        impl<$($name: Reader),+> Reader for ($($name,)+) {
            type Value = ($($name::Value,)+);

            #[allow(non_snake_case)]
            fn read(&self, stream: &mut Stream<'_>) -> Result<Self::Value> {
                let ($($name,)+) = self;
                Ok(($($name.read(stream)?,)+))
            }
        }
    };
}

tuple_reader!(A, B);
tuple_reader!(A, B, C);
tuple_reader!(A, B, C, D);
tuple_reader!(A, B, C, D, E);

/// The member table of a tagged union: maps a tag to a typed payload.
pub trait UnionMember: Sized {
    /// Decodes the payload of the member identified by `tag`. For a tag it does not know it
    /// returns `Ok(None)` without touching the stream.
    fn decode_member(tag: u64, stream: &mut Stream<'_>) -> Result<Option<Self>>;
}

/// A set of tagged union members: a count, then per member a tag, an `uint32` payload size and
/// the payload. Members with unknown tags are skipped by their declared size, so files written
/// with newer optional members stay readable.
#[derive(Debug)]
pub struct TaggedUnionSet<T, M> {
    tag: T,
    member: PhantomData<M>,
}

impl<T: Clone, M> Clone for TaggedUnionSet<T, M> {
    fn clone(&self) -> Self {
        Self {
            tag: self.tag.clone(),
            member: PhantomData,
        }
    }
}

pub fn tagged_union_set<T, M>(tag: T) -> TaggedUnionSet<T, M>
where
    T: Reader,
    T::Value: Length,
    M: UnionMember,
{
    TaggedUnionSet {
        tag,
        member: PhantomData,
    }
}

impl<T, M> Reader for TaggedUnionSet<T, M>
where
    T: Reader,
    T::Value: Length,
    M: UnionMember,
{
    type Value = Vec<M>;

    fn read(&self, stream: &mut Stream<'_>) -> Result<Vec<M>> {
        let mut members = Vec::new();
        counted(stream, &self.tag, |s| {
            let tag = s.read(&self.tag)?.raw() as u64;
            let declared = s.uint32()? as usize;
            let start = s.offset();

            match M::decode_member(tag, s)? {
                Some(member) => {
                    let consumed = s.offset() - start;
                    if consumed > declared {
                        return Err(DecodeError::MemberOverrun {
                            tag,
                            offset: start,
                            declared,
                            consumed,
                        });
                    }
                    s.skip(declared - consumed)?;
                    members.push(member);
                }
                None => {
                    tracing::debug!(tag, size = declared, offset = start, "skipping unknown member");
                    s.skip(declared)?;
                }
            }

            Ok(())
        })?;

        Ok(members)
    }
}

/// Symbolic values of a `uint32` discriminant.
pub trait Discriminant: Sized {
    fn from_discriminant(value: u32) -> Option<Self>;
}

#[derive(Debug)]
pub struct Enum32<E>(PhantomData<E>);

impl<E> Clone for Enum32<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Enum32<E> {}

pub fn enum32<E: Discriminant>() -> Enum32<E> {
    Enum32(PhantomData)
}

impl<E: Discriminant> Reader for Enum32<E> {
    type Value = E;

    fn read(&self, stream: &mut Stream<'_>) -> Result<E> {
        let offset = stream.offset();
        let value = stream.uint32()?;
        E::from_discriminant(value).ok_or(DecodeError::UnmappedEnum { value, offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, Bytes};
    use strum::FromRepr;
    use tracing_test::traced_test;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
    #[repr(u32)]
    enum Compression {
        None = 0,
        Lz4 = 1,
        Zstd = 4,
    }

    impl Discriminant for Compression {
        fn from_discriminant(value: u32) -> Option<Self> {
            Self::from_repr(value)
        }
    }

    #[derive(Debug, PartialEq)]
    enum Metadata {
        Sharding(Vec<i64>),
        Origin(String),
    }

    impl UnionMember for Metadata {
        fn decode_member(tag: u64, stream: &mut Stream<'_>) -> Result<Option<Self>> {
            match tag {
                1 => Ok(Some(Metadata::Sharding(stream.read(&array32(of::<i64>()))?))),
                3 => Ok(Some(Metadata::Origin(stream.string32()?))),
                _ => Ok(None),
            }
        }
    }

    #[derive(Debug, PartialEq)]
    struct Header {
        version: u16,
        name: String,
        compression: Compression,
    }

    impl Decode for Header {
        fn decode(stream: &mut Stream<'_>) -> Result<Self> {
            Ok(Self {
                version: stream.uint16()?,
                name: stream.string16()?,
                compression: stream.read(&enum32())?,
            })
        }
    }

    fn put_origin(buf: &mut Vec<u8>, origin: &str) {
        buf.put_u32(3);
        buf.put_u32(4 + origin.len() as u32);
        buf.put_u32(origin.len() as u32);
        buf.put_slice(origin.as_bytes());
    }

    #[traced_test]
    #[test]
    fn test_tagged_union_skips_unknown_member() {
        let mut buf = Vec::new();
        buf.put_u32(2);
        // Unknown member: tag 9 with 5 bytes nobody here understands.
        buf.put_u32(9);
        buf.put_u32(5);
        buf.put_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00]);
        let unknown_span = 4 + 4 + 5;
        put_origin(&mut buf, "node-1");
        let known_span = 4 + 4 + 4 + 6;

        let mut stream = Stream::new(&buf);
        let members = stream.read(&tagged_union_set::<_, Metadata>(of::<u32>())).unwrap();

        assert_eq!(members, vec![Metadata::Origin("node-1".to_string())]);
        assert_eq!(stream.offset(), 4 + unknown_span + known_span);
        assert!(stream.is_exhausted());
        assert!(logs_contain("skipping unknown member"));
    }

    #[test]
    fn test_tagged_union_realigns_short_member() {
        let mut buf = Vec::new();
        buf.put_u32(2);
        // A newer writer appended 3 bytes to the sharding payload.
        buf.put_u32(1);
        buf.put_u32(4 + 8 + 3);
        buf.put_i32(1);
        buf.put_i64(42);
        buf.put_slice(&[1, 2, 3]);
        put_origin(&mut buf, "x");

        let mut stream = Stream::new(&buf);
        let members = stream.read(&tagged_union_set::<_, Metadata>(of::<u32>())).unwrap();

        assert_eq!(
            members,
            vec![Metadata::Sharding(vec![42]), Metadata::Origin("x".to_string())]
        );
        assert!(stream.is_exhausted());
    }

    #[test]
    fn test_tagged_union_member_overrun() {
        let mut buf = Vec::new();
        buf.put_u32(1);
        buf.put_u32(3);
        buf.put_u32(2); // Too small for the 4 byte length prefix alone.
        buf.put_u32(1);
        buf.put_u8(b'a');

        let mut stream = Stream::new(&buf);
        let err = stream
            .read(&tagged_union_set::<_, Metadata>(of::<u32>()))
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::MemberOverrun {
                tag: 3,
                offset: 12,
                declared: 2,
                consumed: 5,
            }
        );
    }

    #[test]
    fn test_tagged_union_unknown_member_past_end() {
        let mut buf = Vec::new();
        buf.put_u32(1);
        buf.put_u32(7);
        buf.put_u32(100);
        buf.put_slice(&[0; 10]);

        let mut stream = Stream::new(&buf);
        let err = stream
            .read(&tagged_union_set::<_, Metadata>(of::<u32>()))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Underrun { ty: "skip", offset: 12, .. }));
    }

    #[test]
    fn test_struct_in_declared_order() {
        let mut buf = Vec::new();
        buf.put_u16(3);
        buf.put_u16(2);
        buf.put_slice(b"me");
        buf.put_u32(4);

        let mut stream = Stream::new(&buf);
        let header: Header = stream.decode().unwrap();
        assert_eq!(
            header,
            Header {
                version: 3,
                name: "me".to_string(),
                compression: Compression::Zstd,
            }
        );
    }

    #[test]
    fn test_enum_unmapped() {
        let mut buf = Vec::new();
        buf.put_u32(0);
        buf.put_u32(1);
        buf.put_u32(2);

        let mut stream = Stream::new(&buf);
        assert_eq!(stream.read(&enum32::<Compression>()).unwrap(), Compression::None);
        assert_eq!(stream.read(&enum32::<Compression>()).unwrap(), Compression::Lz4);
        assert_eq!(
            stream.read(&enum32::<Compression>()).unwrap_err(),
            DecodeError::UnmappedEnum { value: 2, offset: 8 }
        );
    }

    #[test]
    fn test_array_keeps_order() {
        let mut buf = Vec::new();
        buf.put_i32(3);
        for s in ["c", "a", "b"] {
            buf.put_u16(1);
            buf.put_slice(s.as_bytes());
        }

        let mut stream = Stream::new(&buf);
        let items = stream.read(&array32(bytes16())).unwrap();
        assert_eq!(
            items,
            vec![Bytes::from("c"), Bytes::from("a"), Bytes::from("b")]
        );
    }

    #[test]
    fn test_array_negative_count() {
        let mut buf = Vec::new();
        buf.put_i32(-5);

        let mut stream = Stream::new(&buf);
        let err = stream.read(&array32(of::<u8>())).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidLength {
                ty: "count",
                length: -5,
                offset: 0,
            }
        );
    }

    #[test]
    fn test_map_last_write_wins() {
        let mut buf = Vec::new();
        buf.put_i32(3);
        for (k, v) in [("a", 1u32), ("b", 2), ("a", 3)] {
            buf.put_u16(1);
            buf.put_slice(k.as_bytes());
            buf.put_u32(v);
        }

        let mut stream = Stream::new(&buf);
        let map = stream.read(&map32(string16(), of::<u32>())).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a"), Some(&3));
        assert_eq!(map.get("b"), Some(&2));
    }

    #[test]
    fn test_map16() {
        let mut buf = Vec::new();
        buf.put_i16(1);
        buf.put_u8(7);
        buf.put_u32(2);
        buf.put_slice(b"ok");

        let mut stream = Stream::new(&buf);
        let map = stream.read(&map16(of::<u8>(), string32())).unwrap();
        assert_eq!(map.get(&7).map(String::as_str), Some("ok"));
    }

    #[test]
    fn test_tuple() {
        let mut buf = Vec::new();
        buf.put_i32(-7);
        buf.put_i64(1_700_000_000_000_000);
        buf.put_u8(1);

        let mut stream = Stream::new(&buf);
        let value = stream
            .read(&(of::<i32>(), of::<i64>(), of::<bool>()))
            .unwrap();
        assert_eq!(value, (-7, 1_700_000_000_000_000, true));
    }

    #[test]
    fn test_bytes_with_custom_length() {
        let buf: &[u8] = &[2, b'h', b'i'];
        let mut stream = Stream::new(buf);
        assert_eq!(stream.read(&bytes(of::<u8>())).unwrap(), Bytes::from("hi"));
    }
}

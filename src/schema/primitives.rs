//! The closed set of primitive descriptor kinds.

use std::future::Future;
use std::marker::PhantomData;

use crate::engine::SharedBuffer;
use crate::error::ParseError;
use crate::trap;

use super::{read_nested, read_nested_list, Descriptor};

fn encode_int(value: i128, width: usize, big_endian: bool) -> Vec<u8> {
    let full = value.to_be_bytes();
    let be = full[16 - width..].to_vec();
    if big_endian {
        be
    } else {
        be.into_iter().rev().collect()
    }
}

/// `StructUnit`/`IntUnit(width, byteorder, signed)` — a fixed-width integer.
///
/// Decodes to `i128` so one type covers every width up to 16 bytes;
/// [`NarrowInt`] narrows the result to a concrete native integer type for
/// schema fields that want one.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct IntUnit {
    /// Width in bytes.
    pub width: usize,
    /// `true` for big-endian, `false` for little-endian.
    pub big_endian: bool,
    /// Whether the value is sign-extended.
    pub signed: bool,
}

impl IntUnit {
    /// Build a descriptor for an arbitrary width (used for the 24-bit
    /// integers wire protocols sometimes carry, which have no native
    /// Rust type).
    pub const fn new(width: usize, big_endian: bool, signed: bool) -> Self {
        Self {
            width,
            big_endian,
            signed,
        }
    }

    /// Unsigned 8-bit.
    pub const U8: Self = Self::new(1, true, false);
    /// Signed 8-bit.
    pub const I8: Self = Self::new(1, true, true);
    /// Unsigned 16-bit, big-endian.
    pub const U16BE: Self = Self::new(2, true, false);
    /// Unsigned 16-bit, little-endian.
    pub const U16LE: Self = Self::new(2, false, false);
    /// Signed 16-bit, big-endian.
    pub const I16BE: Self = Self::new(2, true, true);
    /// Unsigned 24-bit, big-endian (no native Rust type).
    pub const U24BE: Self = Self::new(3, true, false);
    /// Unsigned 32-bit, big-endian.
    pub const U32BE: Self = Self::new(4, true, false);
    /// Unsigned 32-bit, little-endian.
    pub const U32LE: Self = Self::new(4, false, false);
    /// Signed 32-bit, big-endian.
    pub const I32BE: Self = Self::new(4, true, true);
    /// Unsigned 64-bit, big-endian.
    pub const U64BE: Self = Self::new(8, true, false);
    /// Signed 64-bit, big-endian.
    pub const I64BE: Self = Self::new(8, true, true);
}

impl Descriptor for IntUnit {
    type Value = i128;

    async fn read(&self, buffer: &SharedBuffer) -> Result<i128, ParseError> {
        trap::read_int(buffer.clone(), self.width, self.big_endian, self.signed)?.await
    }

    fn write(&self, value: &i128) -> Result<Vec<u8>, ParseError> {
        Ok(encode_int(*value, self.width, self.big_endian))
    }
}

/// Narrows an [`IntUnit`]'s `i128` down to a concrete native integer type,
/// failing to read if the wire value doesn't fit.
pub struct NarrowInt<V> {
    inner: IntUnit,
    _marker: PhantomData<fn() -> V>,
}

impl<V> NarrowInt<V> {
    /// Wrap `inner`, narrowing its decoded value to `V`.
    pub const fn new(inner: IntUnit) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<V> Descriptor for NarrowInt<V>
where
    V: TryFrom<i128> + Copy,
    i128: From<V>,
{
    type Value = V;

    async fn read(&self, buffer: &SharedBuffer) -> Result<V, ParseError> {
        let raw = self.inner.read(buffer).await?;
        V::try_from(raw).map_err(|_| ParseError::semantic("integer out of range for field width"))
    }

    fn write(&self, value: &V) -> Result<Vec<u8>, ParseError> {
        self.inner.write(&i128::from(*value))
    }
}

/// An unsigned byte field.
pub fn u8_field() -> NarrowInt<u8> {
    NarrowInt::new(IntUnit::U8)
}

/// A signed byte field.
pub fn i8_field() -> NarrowInt<i8> {
    NarrowInt::new(IntUnit::I8)
}

/// A big-endian `u16` field.
pub fn u16be_field() -> NarrowInt<u16> {
    NarrowInt::new(IntUnit::U16BE)
}

/// A little-endian `u16` field.
pub fn u16le_field() -> NarrowInt<u16> {
    NarrowInt::new(IntUnit::U16LE)
}

/// A big-endian `u32` field.
pub fn u32be_field() -> NarrowInt<u32> {
    NarrowInt::new(IntUnit::U32BE)
}

/// A big-endian 24-bit field, narrowed into a `u32` (there is no native
/// 24-bit integer type).
pub fn u24be_field() -> NarrowInt<u32> {
    NarrowInt::new(IntUnit::U24BE)
}

/// `Bytes(length)` — fixed-width when `length >= 0`, sink-to-end when
/// `length < 0`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Bytes {
    /// Number of bytes to read; negative means "read everything readable".
    pub length: isize,
}

impl Descriptor for Bytes {
    type Value = Vec<u8>;

    async fn read(&self, buffer: &SharedBuffer) -> Result<Vec<u8>, ParseError> {
        if self.length < 0 {
            trap::read(buffer.clone(), 0).await
        } else {
            trap::read(buffer.clone(), self.length as usize).await
        }
    }

    fn write(&self, value: &Vec<u8>) -> Result<Vec<u8>, ParseError> {
        Ok(value.clone())
    }
}

/// The value passed to [`MustEqual::write_fixed`]: either a concrete value
/// (checked against the constraint) or the distinguished placeholder
/// (substituted with the expected value).
#[derive(Clone, Debug)]
pub enum Fixed<V> {
    /// A concrete value to validate against the constraint.
    Value(V),
    /// Substitute the constraint's expected value.
    Placeholder,
}

/// `MustEqual(inner, expected)` — a read/write equality guard.
pub struct MustEqual<D: Descriptor> {
    /// The wrapped descriptor.
    pub inner: D,
    /// The value every decoded/encoded instance must equal.
    pub expected: D::Value,
}

impl<D: Descriptor> Descriptor for MustEqual<D>
where
    D::Value: PartialEq + std::fmt::Debug,
{
    type Value = D::Value;

    async fn read(&self, buffer: &SharedBuffer) -> Result<D::Value, ParseError> {
        let value = self.inner.read(buffer).await?;
        if value != self.expected {
            return Err(ParseError::semantic(format!(
                "expected {:?}, got {:?}",
                self.expected, value
            )));
        }
        Ok(value)
    }

    fn write(&self, value: &D::Value) -> Result<Vec<u8>, ParseError> {
        if *value != self.expected {
            return Err(ParseError::semantic("value does not satisfy MustEqual constraint"));
        }
        self.inner.write(value)
    }
}

impl<D: Descriptor> MustEqual<D>
where
    D::Value: PartialEq + Clone + std::fmt::Debug,
{
    /// Write either a checked concrete value or the placeholder, which
    /// substitutes [`expected`](Self::expected).
    pub fn write_fixed(&self, value: &Fixed<D::Value>) -> Result<Vec<u8>, ParseError> {
        match value {
            Fixed::Placeholder => self.inner.write(&self.expected),
            Fixed::Value(v) => self.write(v),
        }
    }
}

/// `EndWith(delim)` — read up to a delimiter, dropping it; write appends it.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct EndWith {
    /// The terminating delimiter.
    pub delim: Vec<u8>,
}

impl Descriptor for EndWith {
    type Value = Vec<u8>;

    async fn read(&self, buffer: &SharedBuffer) -> Result<Vec<u8>, ParseError> {
        trap::read_until(buffer.clone(), self.delim.clone(), false)?.await
    }

    fn write(&self, value: &Vec<u8>) -> Result<Vec<u8>, ParseError> {
        let mut out = value.clone();
        out.extend_from_slice(&self.delim);
        Ok(out)
    }
}

/// `LengthPrefixedBytes(len_desc)` — a length prefix followed by exactly
/// that many raw bytes.
pub struct LengthPrefixedBytes<L> {
    /// The descriptor used to read/write the length prefix.
    pub len_desc: L,
}

impl<L> Descriptor for LengthPrefixedBytes<L>
where
    L: Descriptor,
    L::Value: Copy + TryInto<usize> + TryFrom<usize>,
{
    type Value = Vec<u8>;

    async fn read(&self, buffer: &SharedBuffer) -> Result<Vec<u8>, ParseError> {
        let len = self.len_desc.read(buffer).await?;
        let len: usize = len
            .try_into()
            .map_err(|_| ParseError::semantic("negative length prefix"))?;
        trap::read(buffer.clone(), len).await
    }

    fn write(&self, value: &Vec<u8>) -> Result<Vec<u8>, ParseError> {
        let len = L::Value::try_from(value.len())
            .map_err(|_| ParseError::semantic("length does not fit the length-prefix width"))?;
        let mut out = self.len_desc.write(&len)?;
        out.extend_from_slice(value);
        Ok(out)
    }
}

/// `LengthPrefixedObject(len_desc, inner)` — a length prefix followed by a
/// nested object that must consume exactly that many bytes.
pub struct LengthPrefixedObject<L, D> {
    /// The descriptor used to read/write the length prefix.
    pub len_desc: L,
    /// The descriptor for the nested object.
    pub inner: D,
}

impl<L, D> Descriptor for LengthPrefixedObject<L, D>
where
    L: Descriptor,
    L::Value: Copy + TryInto<usize> + TryFrom<usize>,
    D: Descriptor,
{
    type Value = D::Value;

    async fn read(&self, buffer: &SharedBuffer) -> Result<D::Value, ParseError> {
        let len = self.len_desc.read(buffer).await?;
        let len: usize = len
            .try_into()
            .map_err(|_| ParseError::semantic("negative length prefix"))?;
        let bytes = trap::read(buffer.clone(), len).await?;
        read_nested(&self.inner, bytes).await
    }

    fn write(&self, value: &D::Value) -> Result<Vec<u8>, ParseError> {
        let payload = self.inner.write(value)?;
        let len = L::Value::try_from(payload.len())
            .map_err(|_| ParseError::semantic("length does not fit the length-prefix width"))?;
        let mut out = self.len_desc.write(&len)?;
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

/// `LengthPrefixedObjectList(len_desc, inner)` — a length prefix followed
/// by a sequence of nested objects packed back-to-back, filling exactly
/// that many bytes.
pub struct LengthPrefixedObjectList<L, D> {
    /// The descriptor used to read/write the total length prefix.
    pub len_desc: L,
    /// The descriptor for each list element.
    pub inner: D,
}

impl<L, D> Descriptor for LengthPrefixedObjectList<L, D>
where
    L: Descriptor,
    L::Value: Copy + TryInto<usize> + TryFrom<usize>,
    D: Descriptor,
{
    type Value = Vec<D::Value>;

    async fn read(&self, buffer: &SharedBuffer) -> Result<Vec<D::Value>, ParseError> {
        let len = self.len_desc.read(buffer).await?;
        let len: usize = len
            .try_into()
            .map_err(|_| ParseError::semantic("negative length prefix"))?;
        let bytes = trap::read(buffer.clone(), len).await?;
        read_nested_list(&self.inner, bytes).await
    }

    fn write(&self, value: &Vec<D::Value>) -> Result<Vec<u8>, ParseError> {
        let mut payload = Vec::new();
        for item in value {
            payload.extend(self.inner.write(item)?);
        }
        let len = L::Value::try_from(payload.len())
            .map_err(|_| ParseError::semantic("length does not fit the length-prefix width"))?;
        let mut out = self.len_desc.write(&len)?;
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

/// `SizedIntEnum(len_desc, enum_set)` — an integer mapped onto a closed set
/// of enumerators, built with [`closed_enum!`](crate::closed_enum).
///
/// Unknown values are a [`ParseError`] on read, never a permissive
/// fallback — this is the strict counterpart to the open-ended C-style
/// enums elsewhere in the crate.
pub struct SizedIntEnum<E> {
    int: IntUnit,
    _marker: PhantomData<fn() -> E>,
}

impl<E> SizedIntEnum<E> {
    /// Build a descriptor decoding through `int` into `E`.
    pub const fn new(int: IntUnit) -> Self {
        Self {
            int,
            _marker: PhantomData,
        }
    }
}

impl<E> Descriptor for SizedIntEnum<E>
where
    E: TryFrom<i128, Error = ParseError> + Copy,
    i128: From<E>,
{
    type Value = E;

    async fn read(&self, buffer: &SharedBuffer) -> Result<E, ParseError> {
        let raw = self.int.read(buffer).await?;
        E::try_from(raw)
    }

    fn write(&self, value: &E) -> Result<Vec<u8>, ParseError> {
        self.int.write(&i128::from(*value))
    }
}

/// `Convert(inner, encode, decode)` — adapts an inner descriptor's value
/// type to a different Rust type.
pub struct Convert<D: Descriptor, V> {
    /// The wrapped descriptor.
    pub inner: D,
    /// Decode the inner value into `V`, fallibly.
    pub decode: fn(D::Value) -> Result<V, ParseError>,
    /// Encode `V` back into the inner descriptor's value type.
    pub encode: fn(&V) -> D::Value,
}

impl<D: Descriptor, V> Descriptor for Convert<D, V> {
    type Value = V;

    async fn read(&self, buffer: &SharedBuffer) -> Result<V, ParseError> {
        let raw = self.inner.read(buffer).await?;
        (self.decode)(raw)
    }

    fn write(&self, value: &V) -> Result<Vec<u8>, ParseError> {
        let raw = (self.encode)(value);
        self.inner.write(&raw)
    }
}

/// `String(length, encoding)` over UTF-8: `Bytes` composed with a UTF-8
/// codec via [`Convert`].
pub fn utf8_string(length: isize) -> Convert<Bytes, String> {
    Convert {
        inner: Bytes { length },
        decode: |bytes| String::from_utf8(bytes).map_err(|_| ParseError::semantic("invalid utf-8")),
        encode: |s: &String| s.clone().into_bytes(),
    }
}

/// `LengthPrefixedString(len_desc, encoding)` over UTF-8:
/// `LengthPrefixedBytes` composed with a UTF-8 codec via [`Convert`].
pub fn utf8_length_prefixed_string<L>(len_desc: L) -> Convert<LengthPrefixedBytes<L>, String>
where
    L: Descriptor,
    L::Value: Copy + TryInto<usize> + TryFrom<usize>,
{
    Convert {
        inner: LengthPrefixedBytes { len_desc },
        decode: |bytes| String::from_utf8(bytes).map_err(|_| ParseError::semantic("invalid utf-8")),
        encode: |s: &String| s.clone().into_bytes(),
    }
}

/// A type alias naming the common case of [`LengthPrefixedString`]: a
/// UTF-8 string whose length prefix is read by `L`.
pub type LengthPrefixedString<L> = Convert<LengthPrefixedBytes<L>, String>;

/// An anonymous, ad-hoc schema: a fixed sequence of descriptors read and
/// written in order, producing a plain Rust tuple instead of a named
/// record. Stands in for a one-off nested structure that doesn't deserve
/// its own [`schema!`](crate::schema) type; build one with
/// [`group!`](crate::schema::group).
impl<A: Descriptor, B: Descriptor> Descriptor for (A, B) {
    type Value = (A::Value, B::Value);

    async fn read(&self, buffer: &SharedBuffer) -> Result<Self::Value, ParseError> {
        let a = self.0.read(buffer).await?;
        let b = self.1.read(buffer).await?;
        Ok((a, b))
    }

    fn write(&self, value: &Self::Value) -> Result<Vec<u8>, ParseError> {
        let mut out = self.0.write(&value.0)?;
        out.extend(self.1.write(&value.1)?);
        Ok(out)
    }
}

impl<A: Descriptor, B: Descriptor, C: Descriptor> Descriptor for (A, B, C) {
    type Value = (A::Value, B::Value, C::Value);

    async fn read(&self, buffer: &SharedBuffer) -> Result<Self::Value, ParseError> {
        let a = self.0.read(buffer).await?;
        let b = self.1.read(buffer).await?;
        let c = self.2.read(buffer).await?;
        Ok((a, b, c))
    }

    fn write(&self, value: &Self::Value) -> Result<Vec<u8>, ParseError> {
        let mut out = self.0.write(&value.0)?;
        out.extend(self.1.write(&value.1)?);
        out.extend(self.2.write(&value.2)?);
        Ok(out)
    }
}

//! # Stream
//!
//! Growable byte buffer with an append-only write end and a read cursor.
//!
//! Multi-byte primitives are encoded in the stream's configured [`Endian`];
//! length-prefixed blobs (`write_buffer`, `write_string`) carry a 4-byte
//! signed length header followed by the raw bytes, which are never swapped.
//!
//! ## Invariants
//! - `pos() <= len() <= capacity()`
//! - A failed read leaves the cursor exactly where it was
//! - The buffer only grows; `resize` rejects any shrink
//!
//! ## Usage
//! ```rust
//! use service_runtime::core::stream::{Endian, Stream};
//!
//! let mut stream = Stream::new();
//! stream.set_endian(Endian::Little);
//! stream.write(42u32);
//! stream.write_string("hello").unwrap();
//!
//! assert_eq!(stream.read::<u32>().unwrap(), 42);
//! assert_eq!(stream.read_string().unwrap(), "hello");
//! assert_eq!(stream.pos(), stream.len());
//! ```

use crate::error::{constants, Error, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Size of the length header in front of every length-prefixed blob.
pub const LENGTH_HEADER_SIZE: usize = 4;

/// Byte order used for multi-byte primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Big,
    Little,
}

impl Endian {
    /// Network byte order.
    pub const NETWORK: Endian = Endian::Big;

    /// Byte order of the host CPU.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }
}

/// Fixed-width value that can be written to and read from a [`Stream`].
pub trait Primitive: Copy + Sized {
    /// Encoded width in bytes.
    const SIZE: usize;
    /// Type name used in error messages.
    const NAME: &'static str;

    fn write_to(self, endian: Endian, out: &mut Vec<u8>);

    /// `bytes` is exactly `Self::SIZE` long.
    fn read_from(endian: Endian, bytes: &[u8]) -> Self;
}

macro_rules! impl_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();
                const NAME: &'static str = stringify!($ty);

                #[inline]
                fn write_to(self, endian: Endian, out: &mut Vec<u8>) {
                    match endian {
                        Endian::Big => out.extend_from_slice(&self.to_be_bytes()),
                        Endian::Little => out.extend_from_slice(&self.to_le_bytes()),
                    }
                }

                #[inline]
                fn read_from(endian: Endian, bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    match endian {
                        Endian::Big => <$ty>::from_be_bytes(raw),
                        Endian::Little => <$ty>::from_le_bytes(raw),
                    }
                }
            }
        )*
    };
}

impl_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Primitive for bool {
    const SIZE: usize = 1;
    const NAME: &'static str = "bool";

    #[inline]
    fn write_to(self, _endian: Endian, out: &mut Vec<u8>) {
        out.push(u8::from(self));
    }

    #[inline]
    fn read_from(_endian: Endian, bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Application type with its own stream encoding.
pub trait Streamable: Sized {
    fn encode(&self, stream: &mut Stream) -> Result<()>;
    fn decode(stream: &mut Stream) -> Result<Self>;
}

impl<T: Primitive> Streamable for T {
    fn encode(&self, stream: &mut Stream) -> Result<()> {
        stream.write(*self);
        Ok(())
    }

    fn decode(stream: &mut Stream) -> Result<Self> {
        stream.read()
    }
}

impl Streamable for String {
    fn encode(&self, stream: &mut Stream) -> Result<()> {
        stream.write_string(self)
    }

    fn decode(stream: &mut Stream) -> Result<Self> {
        stream.read_string()
    }
}

impl<T: Streamable> Streamable for Option<T> {
    fn encode(&self, stream: &mut Stream) -> Result<()> {
        match self {
            Some(value) => {
                stream.write(true);
                value.encode(stream)
            }
            None => {
                stream.write(false);
                Ok(())
            }
        }
    }

    fn decode(stream: &mut Stream) -> Result<Self> {
        if stream.read::<bool>()? {
            Ok(Some(T::decode(stream)?))
        } else {
            Ok(None)
        }
    }
}

impl<T: Streamable> Streamable for Vec<T> {
    fn encode(&self, stream: &mut Stream) -> Result<()> {
        let count = u32::try_from(self.len())
            .map_err(|_| Error::limit(format!("sequence too long: {}", self.len())))?;
        stream.write(count);
        self.iter().try_for_each(|item| item.encode(stream))
    }

    fn decode(stream: &mut Stream) -> Result<Self> {
        let count = stream.read::<u32>()? as usize;
        // Every element takes at least one byte, so a count beyond the remaining
        // bytes can only come from a corrupt header.
        if count > stream.remaining() {
            return Err(Error::limit(format!(
                "sequence count {count} exceeds {} remaining bytes",
                stream.remaining()
            )));
        }
        (0..count).map(|_| T::decode(stream)).collect()
    }
}

/// Shape selector for [`Stream::read_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    None,
    Bool,
    Int32,
    Int64,
    Float64,
    Str,
    Bytes,
    List,
    Map,
}

/// Dynamically typed value for loosely typed payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::None => ValueKind::None,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int32(_) => ValueKind::Int32,
            Value::Int64(_) => ValueKind::Int64,
            Value::Float64(_) => ValueKind::Float64,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
        }
    }
}

/// Endian-aware byte stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stream {
    buf: Vec<u8>,
    cursor: usize,
    endian: Endian,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            cursor: 0,
            endian: Endian::default(),
        }
    }

    /// Wrap already-written bytes for reading, cursor at the start.
    pub fn from_vec(buf: Vec<u8>) -> Self {
        Self {
            buf,
            cursor: 0,
            endian: Endian::default(),
        }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Affects only primitives written or read after this call.
    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Number of written bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn pos(&self) -> usize {
        self.cursor
    }

    /// Move the read cursor. Positions beyond the written length are rejected.
    pub fn set_pos(&mut self, pos: usize) -> Result<()> {
        if pos > self.buf.len() {
            return Err(Error::limit(format!(
                "{}: {pos} > {}",
                constants::ERR_POS_OUT_OF_RANGE,
                self.buf.len()
            )));
        }
        self.cursor = pos;
        Ok(())
    }

    /// Unread byte count.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Grow the backing storage to hold at least `capacity` bytes.
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.buf.capacity() {
            return Err(Error::limit(format!(
                "{}: requested {capacity}, current {}",
                constants::ERR_SHRINK_REJECTED,
                self.buf.capacity()
            )));
        }
        self.buf.reserve_exact(capacity - self.buf.len());
        Ok(())
    }

    /// Drop all written bytes and rewind, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.cursor = 0;
    }

    /// All written bytes, regardless of the cursor.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Bytes between the cursor and the end of written data.
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.cursor..]
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }

    // ---------------------------------------------------------------------
    // Primitives
    // ---------------------------------------------------------------------

    #[inline]
    pub fn write<T: Primitive>(&mut self, value: T) {
        value.write_to(self.endian, &mut self.buf);
    }

    #[inline]
    pub fn read<T: Primitive>(&mut self) -> Result<T> {
        let value = self.peek::<T>()?;
        self.cursor += T::SIZE;
        Ok(value)
    }

    /// Read without advancing the cursor.
    pub fn peek<T: Primitive>(&self) -> Result<T> {
        if self.remaining() < T::SIZE {
            return Err(Error::limit(format!(
                "{} to decode '{}': need {}, have {}",
                constants::ERR_NOT_ENOUGH_BYTES,
                T::NAME,
                T::SIZE,
                self.remaining()
            )));
        }
        Ok(T::read_from(
            self.endian,
            &self.buf[self.cursor..self.cursor + T::SIZE],
        ))
    }

    // ---------------------------------------------------------------------
    // Raw bytes
    // ---------------------------------------------------------------------

    pub fn write_raw(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn read_raw(&mut self, len: usize) -> Result<Vec<u8>> {
        self.ensure_remaining(len, "raw bytes")?;
        let out = self.buf[self.cursor..self.cursor + len].to_vec();
        self.cursor += len;
        Ok(out)
    }

    pub fn read_raw_into(&mut self, out: &mut [u8]) -> Result<()> {
        self.ensure_remaining(out.len(), "raw bytes")?;
        out.copy_from_slice(&self.buf[self.cursor..self.cursor + out.len()]);
        self.cursor += out.len();
        Ok(())
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.ensure_remaining(len, "skip")?;
        self.cursor += len;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Length-prefixed blobs
    // ---------------------------------------------------------------------

    /// Write a 4-byte signed length header followed by `data`.
    pub fn write_buffer(&mut self, data: &[u8]) -> Result<()> {
        let len = i32::try_from(data.len())
            .map_err(|_| Error::limit(format!("buffer too long: {} bytes", data.len())))?;
        self.write(len);
        self.buf.extend_from_slice(data);
        Ok(())
    }

    pub fn read_buffer(&mut self) -> Result<Vec<u8>> {
        self.transact(|s| {
            let len = s.read_length()?;
            s.read_raw(len)
        })
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_buffer(value.as_bytes())
    }

    pub fn read_string(&mut self) -> Result<String> {
        self.transact(|s| {
            let len = s.read_length()?;
            s.ensure_remaining(len, "str")?;
            let text = std::str::from_utf8(&s.buf[s.cursor..s.cursor + len])
                .map_err(|e| Error::InvalidData(format!("string is not UTF-8: {e}")))?
                .to_owned();
            s.cursor += len;
            Ok(text)
        })
    }

    // ---------------------------------------------------------------------
    // Structured values
    // ---------------------------------------------------------------------

    pub fn write_streamable<T: Streamable>(&mut self, value: &T) -> Result<()> {
        value.encode(self)
    }

    /// Decode a [`Streamable`]; on failure the cursor is restored.
    pub fn read_streamable<T: Streamable>(&mut self) -> Result<T> {
        self.transact(T::decode)
    }

    /// Serialize a serde value as a length-prefixed bincode blob.
    pub fn write_serde<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let encoded = bincode::serialize(value)?;
        self.write_buffer(&encoded)
    }

    pub fn read_serde<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.transact(|s| {
            let blob = s.read_buffer()?;
            Ok(bincode::deserialize(&blob)?)
        })
    }

    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::None => {}
            Value::Bool(v) => self.write(*v),
            Value::Int32(v) => self.write(*v),
            Value::Int64(v) => self.write(*v),
            Value::Float64(v) => self.write(*v),
            Value::Str(v) => self.write_string(v)?,
            Value::Bytes(v) => self.write_buffer(v)?,
            Value::List(items) => {
                self.write_count(items.len())?;
                for item in items {
                    self.write_value(item)?;
                }
            }
            Value::Map(entries) => {
                self.write_count(entries.len())?;
                for (key, item) in entries {
                    self.write_value(key)?;
                    self.write_value(item)?;
                }
            }
        }
        Ok(())
    }

    /// Read a value of the given shape.
    ///
    /// Containers are written untagged, so their element types cannot be
    /// recovered and reading them is not supported.
    pub fn read_value(&mut self, kind: ValueKind) -> Result<Value> {
        match kind {
            ValueKind::None => Ok(Value::None),
            ValueKind::Bool => self.read().map(Value::Bool),
            ValueKind::Int32 => self.read().map(Value::Int32),
            ValueKind::Int64 => self.read().map(Value::Int64),
            ValueKind::Float64 => self.read().map(Value::Float64),
            ValueKind::Str => self.read_string().map(Value::Str),
            ValueKind::Bytes => self.read_buffer().map(Value::Bytes),
            ValueKind::List | ValueKind::Map => Err(Error::NotImplemented(format!(
                "{kind:?} values are written untagged and cannot be read back"
            ))),
        }
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn write_count(&mut self, count: usize) -> Result<()> {
        let count = i32::try_from(count)
            .map_err(|_| Error::limit(format!("container too long: {count}")))?;
        self.write(count);
        Ok(())
    }

    /// Read and validate a length header against the remaining bytes.
    fn read_length(&mut self) -> Result<usize> {
        let len = self.read::<i32>()?;
        if len < 0 {
            return Err(Error::limit(format!(
                "{}: {len}",
                constants::ERR_NEGATIVE_LENGTH
            )));
        }
        let len = len as usize;
        self.ensure_remaining(len, "length-prefixed data")?;
        Ok(len)
    }

    fn ensure_remaining(&self, len: usize, what: &str) -> Result<()> {
        if self.remaining() < len {
            return Err(Error::limit(format!(
                "{} to decode '{what}': need {len}, have {}",
                constants::ERR_NOT_ENOUGH_BYTES,
                self.remaining()
            )));
        }
        Ok(())
    }

    /// Run a multi-step read, rewinding the cursor if any step fails.
    fn transact<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let start = self.cursor;
        let result = f(self);
        if result.is_err() {
            self.cursor = start;
        }
        result
    }
}

impl From<Vec<u8>> for Stream {
    fn from(buf: Vec<u8>) -> Self {
        Stream::from_vec(buf)
    }
}

impl From<&[u8]> for Stream {
    fn from(data: &[u8]) -> Self {
        Stream::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_primitive_roundtrip_mixed_types() {
        let mut s = Stream::new();
        s.write(1u8);
        s.write(-2i16);
        s.write(3u32);
        s.write(-4i64);
        s.write(5.5f32);
        s.write(6.25f64);
        s.write(true);

        assert_eq!(s.read::<u8>().unwrap(), 1);
        assert_eq!(s.read::<i16>().unwrap(), -2);
        assert_eq!(s.read::<u32>().unwrap(), 3);
        assert_eq!(s.read::<i64>().unwrap(), -4);
        assert_eq!(s.read::<f32>().unwrap(), 5.5);
        assert_eq!(s.read::<f64>().unwrap(), 6.25);
        assert!(s.read::<bool>().unwrap());
        assert_eq!(s.pos(), s.len());
        assert_eq!(s.len(), 1 + 2 + 4 + 8 + 4 + 8 + 1);
    }

    #[test]
    fn test_endian_byte_layout() {
        let mut big = Stream::new();
        big.write(0x0102_0304u32);
        assert_eq!(big.as_slice(), &[1, 2, 3, 4]);

        let mut little = Stream::new().with_endian(Endian::Little);
        little.write(0x0102_0304u32);
        assert_eq!(little.as_slice(), &[4, 3, 2, 1]);
    }

    #[test]
    fn test_endian_switch_affects_only_later_primitives() {
        let mut s = Stream::new();
        s.write(1u16);
        s.set_endian(Endian::Little);
        s.write(1u16);
        s.write_buffer(&[9, 8]).unwrap();
        assert_eq!(&s.as_slice()[..4], &[0, 1, 1, 0]);
        // Little-endian length header, blob bytes untouched
        assert_eq!(&s.as_slice()[4..], &[2, 0, 0, 0, 9, 8]);
    }

    #[test]
    fn test_read_past_end_leaves_cursor() {
        let mut s = Stream::new();
        s.write(7u16);
        let err = s.read::<u32>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Limit);
        assert_eq!(s.pos(), 0);
        assert_eq!(s.read::<u16>().unwrap(), 7);
    }

    #[test]
    fn test_truncated_buffer_rejected_without_advance() {
        let mut s = Stream::new();
        s.write(1000i32);
        s.write_raw(&[0u8; 10]);
        let err = s.read_buffer().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Limit);
        assert_eq!(s.pos(), 0);
    }

    #[test]
    fn test_negative_length_rejected() {
        let mut s = Stream::new();
        s.write(-1i32);
        let err = s.read_string().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Limit);
        assert_eq!(s.pos(), 0);
    }

    #[test]
    fn test_invalid_utf8_is_invalid_data() {
        let mut s = Stream::new();
        s.write_buffer(&[0xff, 0xfe]).unwrap();
        let err = s.read_string().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert_eq!(s.pos(), 0);
    }

    #[test]
    fn test_set_pos_bounds() {
        let mut s = Stream::from_vec(vec![1, 2, 3]);
        s.set_pos(3).unwrap();
        assert_eq!(s.remaining(), 0);
        assert_eq!(s.set_pos(4).unwrap_err().kind(), ErrorKind::Limit);
        assert_eq!(s.pos(), 3);
    }

    #[test]
    fn test_peek_header_then_rewind() {
        let mut s = Stream::new();
        s.write(0xABCDu16);
        s.write_string("payload").unwrap();
        assert_eq!(s.peek::<u16>().unwrap(), 0xABCD);
        assert_eq!(s.pos(), 0);
        s.skip(2).unwrap();
        let mark = s.pos();
        assert_eq!(s.read_string().unwrap(), "payload");
        s.set_pos(mark).unwrap();
        assert_eq!(s.read_string().unwrap(), "payload");
    }

    #[test]
    fn test_resize_only_grows() {
        let mut s = Stream::with_capacity(16);
        let cap = s.capacity();
        assert_eq!(s.resize(cap).unwrap_err().kind(), ErrorKind::Limit);
        assert_eq!(s.resize(4).unwrap_err().kind(), ErrorKind::Limit);
        s.resize(cap + 64).unwrap();
        assert!(s.capacity() >= cap + 64);
        assert!(s.pos() <= s.len() && s.len() <= s.capacity());
    }

    #[test]
    fn test_streamable_containers() {
        let mut s = Stream::new();
        let items = vec![Some("a".to_string()), None, Some("ccc".to_string())];
        s.write_streamable(&items).unwrap();
        let back: Vec<Option<String>> = s.read_streamable().unwrap();
        assert_eq!(back, items);
    }

    #[test]
    fn test_streamable_bogus_count_restores_cursor() {
        let mut s = Stream::new();
        s.write(u32::MAX);
        s.write(1u8);
        let err = s.read_streamable::<Vec<u8>>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Limit);
        assert_eq!(s.pos(), 0);
    }

    #[test]
    fn test_serde_blob() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Login {
            user: String,
            level: u16,
        }

        let mut s = Stream::new();
        let login = Login {
            user: "ada".into(),
            level: 3,
        };
        s.write_serde(&login).unwrap();
        assert_eq!(s.read_serde::<Login>().unwrap(), login);
    }

    #[test]
    fn test_values_and_unsupported_shapes() {
        let mut s = Stream::new();
        s.write_value(&Value::Int32(-9)).unwrap();
        s.write_value(&Value::Str("x".into())).unwrap();
        s.write_value(&Value::List(vec![Value::Bool(true)])).unwrap();

        assert_eq!(s.read_value(ValueKind::Int32).unwrap(), Value::Int32(-9));
        assert_eq!(
            s.read_value(ValueKind::Str).unwrap(),
            Value::Str("x".into())
        );
        let pos = s.pos();
        let err = s.read_value(ValueKind::List).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
        assert_eq!(s.pos(), pos);
    }
}

//! Packed-record codec.
//!
//! Every Mach-o structure this crate understands is a fixed-layout record with no
//! implicit padding. Records are declared with the crate-internal `packed!` macro, which
//! derives the `scroll` readers and writers and attaches a static [`Descriptor`] listing
//! each field's kind and width. The descriptor is what callers use to know how many bytes
//! a record occupies before they read it.
//!
//! Bytes come from a [`ByteSource`]: an in-memory buffer ([`SliceSource`]), a seekable
//! stream such as a `File` ([`StreamSource`]), or a read-only memory map
//! ([`MappedSource`], behind the `mmap` feature). For the same underlying bytes all three
//! decode to equal values. The byte order is always supplied by the caller.

use std::io::{self, Read, Seek, SeekFrom, Write};

use scroll::ctx::{TryFromCtx, TryIntoCtx};
use scroll::{Endian, Pread, Pwrite};

use crate::error::{self, Error};

/// The primitive kind of one record field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    /// A fixed-length byte array, e.g. a segment name
    Bytes(usize),
    /// A nested record
    Struct(&'static Descriptor),
}

impl FieldKind {
    /// The number of bytes this field occupies
    pub const fn size(&self) -> usize {
        match *self {
            FieldKind::U8 | FieldKind::I8 => 1,
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U32 | FieldKind::I32 => 4,
            FieldKind::U64 | FieldKind::I64 => 8,
            FieldKind::Bytes(len) => len,
            FieldKind::Struct(descriptor) => descriptor.size(),
        }
    }
}

/// A named field of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// The static layout of a packed record: its fields, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub name: &'static str,
    pub fields: &'static [Field],
}

impl Descriptor {
    /// Total size in bytes; the sum of the field sizes
    pub const fn size(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self.fields.len() {
            total += self.fields[i].kind.size();
            i += 1;
        }
        total
    }

    /// Byte offset of the field called `name`, if there is one
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        let mut offset = 0;
        for field in self.fields {
            if field.name == name {
                return Some(offset);
            }
            offset += field.kind.size();
        }
        None
    }
}

/// Anything that can appear as a field of a packed record
pub trait FieldType {
    const KIND: FieldKind;
}

macro_rules! field_type {
    ($($ty:ty => $kind:ident),*) => {
        $(impl FieldType for $ty {
            const KIND: FieldKind = FieldKind::$kind;
        })*
    };
}

field_type!(u8 => U8, u16 => U16, u32 => U32, u64 => U64, i8 => I8, i16 => I16, i32 => I32, i64 => I64);

impl<const N: usize> FieldType for [u8; N] {
    const KIND: FieldKind = FieldKind::Bytes(N);
}

/// A packed record with a static layout which can be read and written in either byte order
pub trait Packed:
    Copy
    + for<'a> TryFromCtx<'a, Endian, Error = scroll::Error>
    + TryIntoCtx<Endian, Error = scroll::Error>
{
    const DESCRIPTOR: Descriptor;
}

/// The size in bytes of the record `T`
pub const fn sizeof<T: Packed>() -> usize {
    T::DESCRIPTOR.size()
}

/// A positioned source of bytes
pub trait ByteSource {
    /// Fill all of `buf` from the current position, advancing past it.
    /// `what` names the record being read, for error reporting.
    fn read_exact(&mut self, buf: &mut [u8], what: &'static str) -> error::Result<()>;
    /// Move to the absolute `offset`
    fn seek(&mut self, offset: u64) -> error::Result<()>;
    /// The current absolute position
    fn position(&self) -> u64;
    /// Total length of the source in bytes
    fn size(&self) -> u64;
}

fn read_from_slice(
    bytes: &[u8],
    position: &mut usize,
    buf: &mut [u8],
    what: &'static str,
) -> error::Result<()> {
    let start = *position;
    let end = start.checked_add(buf.len());
    match end {
        Some(end) if end <= bytes.len() => {
            buf.copy_from_slice(&bytes[start..end]);
            *position = end;
            Ok(())
        }
        _ => Err(Error::Truncated {
            what,
            offset: start as u64,
            needed: buf.len(),
        }),
    }
}

fn seek_in_slice(position: &mut usize, offset: u64) -> error::Result<()> {
    *position = usize::try_from(offset)
        .map_err(|_| Error::Malformed(format!("offset {offset:#x} does not fit in memory")))?;
    Ok(())
}

/// An in-memory buffer, read from a movable offset
#[derive(Debug, Clone, Copy)]
pub struct SliceSource<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        SliceSource { bytes, position: 0 }
    }

    /// Start reading `bytes` at `offset`
    pub fn at(bytes: &'a [u8], offset: usize) -> Self {
        SliceSource {
            bytes,
            position: offset,
        }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl ByteSource for SliceSource<'_> {
    fn read_exact(&mut self, buf: &mut [u8], what: &'static str) -> error::Result<()> {
        read_from_slice(self.bytes, &mut self.position, buf, what)
    }
    fn seek(&mut self, offset: u64) -> error::Result<()> {
        seek_in_slice(&mut self.position, offset)
    }
    fn position(&self) -> u64 {
        self.position as u64
    }
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// A sequential, seekable stream such as an open `File`
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
    position: u64,
    size: u64,
}

impl<R: Read + Seek> StreamSource<R> {
    /// Wraps `inner`, reading from its current position
    pub fn new(mut inner: R) -> error::Result<Self> {
        let position = inner.stream_position()?;
        let size = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(position))?;
        Ok(StreamSource { inner, position, size })
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> ByteSource for StreamSource<R> {
    fn read_exact(&mut self, buf: &mut [u8], what: &'static str) -> error::Result<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.position += buf.len() as u64;
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(Error::Truncated {
                what,
                offset: self.position,
                needed: buf.len(),
            }),
            Err(err) => Err(err.into()),
        }
    }
    fn seek(&mut self, offset: u64) -> error::Result<()> {
        self.position = self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
    fn position(&self) -> u64 {
        self.position
    }
    fn size(&self) -> u64 {
        self.size
    }
}

/// A read-only memory map of a whole file
#[cfg(feature = "mmap")]
#[derive(Debug)]
pub struct MappedSource {
    map: memmap2::Mmap,
    position: usize,
}

#[cfg(feature = "mmap")]
impl MappedSource {
    /// Maps the file at `path`; the file handle is closed once the map exists
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> error::Result<Self> {
        let file = std::fs::File::open(path)?;
        // the map is only ever read; concurrent truncation of the file by another
        // process is outside what this crate can guard against
        let map = unsafe { memmap2::Mmap::map(&file)? };
        Ok(MappedSource::new(map))
    }

    pub fn new(map: memmap2::Mmap) -> Self {
        MappedSource { map, position: 0 }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }
}

#[cfg(feature = "mmap")]
impl ByteSource for MappedSource {
    fn read_exact(&mut self, buf: &mut [u8], what: &'static str) -> error::Result<()> {
        read_from_slice(&self.map, &mut self.position, buf, what)
    }
    fn seek(&mut self, offset: u64) -> error::Result<()> {
        seek_in_slice(&mut self.position, offset)
    }
    fn position(&self) -> u64 {
        self.position as u64
    }
    fn size(&self) -> u64 {
        self.map.len() as u64
    }
}

/// Reads exactly `len` raw bytes from `source`. Nothing is allocated when the source is
/// shorter than `len`.
pub fn read_bytes<S: ByteSource + ?Sized>(
    source: &mut S,
    len: usize,
    what: &'static str,
) -> error::Result<Vec<u8>> {
    let position = source.position();
    if position.saturating_add(len as u64) > source.size() {
        return Err(Error::Truncated {
            what,
            offset: position,
            needed: len,
        });
    }
    let mut buf = vec![0u8; len];
    source.read_exact(&mut buf, what)?;
    Ok(buf)
}

/// Decodes one `T` at the current position of `source`, using byte order `endian`
pub fn decode<T: Packed, S: ByteSource + ?Sized>(source: &mut S, endian: Endian) -> error::Result<T> {
    let buf = read_bytes(source, sizeof::<T>(), T::DESCRIPTOR.name)?;
    Ok(buf.as_slice().pread_with::<T>(0, endian)?)
}

/// Decodes one `T` from `bytes` at `offset`
pub fn decode_at<T: Packed>(bytes: &[u8], offset: usize, endian: Endian) -> error::Result<T> {
    decode(&mut SliceSource::at(bytes, offset), endian)
}

/// Encodes `value` into a new buffer of exactly `sizeof::<T>()` bytes
pub fn encode<T: Packed>(value: &T, endian: Endian) -> error::Result<Vec<u8>> {
    let mut buf = vec![0u8; sizeof::<T>()];
    encode_into(value, &mut buf, 0, endian)?;
    Ok(buf)
}

/// Encodes `value` in place into `bytes` at `offset`
pub fn encode_into<T: Packed>(
    value: &T,
    bytes: &mut [u8],
    offset: usize,
    endian: Endian,
) -> error::Result<()> {
    let size = sizeof::<T>();
    if offset.checked_add(size).is_none_or(|end| end > bytes.len()) {
        return Err(Error::Truncated {
            what: T::DESCRIPTOR.name,
            offset: offset as u64,
            needed: size,
        });
    }
    bytes.pwrite_with(*value, offset, endian)?;
    Ok(())
}

/// Encodes `value` to the end of `writer`
pub fn write_to<T: Packed, W: Write + ?Sized>(
    value: &T,
    writer: &mut W,
    endian: Endian,
) -> error::Result<()> {
    writer.write_all(&encode(value, endian)?)?;
    Ok(())
}

//! A byte-offset based string table.
//! Mach-o symbol tables index their names this way.

use core::fmt;
use core::str;

use crate::error;

/// A common string table format which is indexed by byte offsets (and not
/// member index). Strings run up to the next NUL, or to the end of the table
/// when the last one is unterminated.
pub struct Strtab<'a> {
    bytes: &'a [u8],
}

impl<'a> Strtab<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Strtab { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The raw bytes of the string starting at `offset`, without its terminator
    pub fn get_bytes(&self, offset: usize) -> error::Result<&'a [u8]> {
        let tail = self.bytes.get(offset..).ok_or_else(|| {
            error::Error::Malformed(format!(
                "string offset {offset:#x} is past the end of a {:#x} byte string table",
                self.bytes.len()
            ))
        })?;
        let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
        Ok(&tail[..end])
    }

    /// The string starting at `offset`
    pub fn get(&self, offset: usize) -> error::Result<&'a str> {
        let bytes = self.get_bytes(offset)?;
        str::from_utf8(bytes).map_err(|_| {
            error::Error::Malformed(format!("string at offset {offset:#x} is not valid utf8"))
        })
    }

    /// Every string in the table, in order
    pub fn to_vec(&self) -> error::Result<Vec<&'a str>> {
        let mut strings = Vec::new();
        let mut i = 0;
        while i < self.bytes.len() {
            let string = self.get(i)?;
            i += string.len() + 1;
            strings.push(string);
        }
        Ok(strings)
    }
}

impl fmt::Debug for Strtab<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.bytes))
    }
}

//! A custom machwalk error
//!

use core::fmt;
use core::result;
use std::error;
use std::io;
use std::path::PathBuf;

#[non_exhaustive]
#[derive(Debug)]
/// A custom machwalk error
pub enum Error {
    /// Fewer bytes were available than a packed record requires
    Truncated {
        /// The record being decoded
        what: &'static str,
        /// Where the read started
        offset: u64,
        /// How many bytes the record needed
        needed: usize,
    },
    /// The binary has a bad magic number
    BadMagic(u64),
    /// A load command kind this crate does not know, and the caller did not opt into tolerating
    UnsupportedLoadCommand {
        /// The raw `cmd` value
        cmd: u32,
        /// Offset of the command within its image
        offset: usize,
    },
    /// Every dyld search candidate was exhausted
    LibraryNotFound(String),
    /// A dependency edge could not be completed while building a graph
    CyclicOrMissingDependency {
        /// The binary holding the reference
        loader: PathBuf,
        /// The reference string as stored in the load command
        reference: String,
        /// Why it could not be followed
        cause: Box<Error>,
    },
    /// An entity will be returned, but it is malformed in some way
    Malformed(String),
    /// An error emanating from reading and interpreting bytes
    Scroll(scroll::Error),
    /// An IO based error
    IO(io::Error),
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IO(ref io) => Some(io),
            Error::Scroll(ref scroll) => Some(scroll),
            Error::CyclicOrMissingDependency { ref cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IO(err)
    }
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Error {
        Error::Scroll(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Truncated {
                what,
                offset,
                needed,
            } => write!(
                fmt,
                "Truncated {what}: needed {needed} bytes at offset {offset:#x}"
            ),
            Error::BadMagic(magic) => write!(fmt, "Invalid magic number: 0x{magic:x}"),
            Error::UnsupportedLoadCommand { cmd, offset } => write!(
                fmt,
                "Unsupported load command {cmd:#x} at offset {offset:#x}"
            ),
            Error::LibraryNotFound(ref name) => write!(fmt, "dylib {name} could not be found"),
            Error::CyclicOrMissingDependency {
                ref loader,
                ref reference,
                ref cause,
            } => write!(
                fmt,
                "{} depends on {reference}, which could not be loaded: {cause}",
                loader.display()
            ),
            Error::Malformed(ref msg) => write!(fmt, "Malformed entity: {msg}"),
            Error::Scroll(ref err) => write!(fmt, "{err}"),
            Error::IO(ref err) => write!(fmt, "{err}"),
        }
    }
}

/// An impish result
pub type Result<T> = result::Result<T, Error>;

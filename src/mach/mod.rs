//! The Mach-o binary format parser and raw struct definitions
//!
//! A file is either a single (thin) image or a fat archive of several; either way parsing
//! yields one [`MachO`] per image, each owning its header and ordered load commands.
use core::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use scroll::Endian;

use crate::codec::{self, ByteSource};
use crate::error;
use crate::options::ParseOptions;

pub mod constants;
pub mod fat;
pub mod header;
pub mod load_command;
pub mod symbols;
pub mod writer;

pub use self::constants::cputype;

use self::header::{Ctx, Header};
use self::load_command::{CommandVariant, LoadCommand};

/// Returns the big endian magical number at the current position of `source`
pub fn peek<S: ByteSource + ?Sized>(source: &mut S) -> error::Result<u32> {
    let position = source.position();
    let mut magic = [0u8; 4];
    source.read_exact(&mut magic, "magic")?;
    source.seek(position)?;
    Ok(u32::from_be_bytes(magic))
}

/// One thin Mach-o image: its header and ordered load commands
#[derive(Clone, PartialEq, Eq)]
pub struct MachO {
    pub header: Header,
    pub ctx: Ctx,
    /// Offset of the image within its file; 0 unless it is a fat slice
    pub offset: u64,
    /// Size of the image, when a fat architecture entry records it
    pub size: Option<u64>,
    pub commands: Vec<LoadCommand>,
    /// Size of the command region as it was read, so a rewrite that shrinks it can clear the tail
    pub(crate) parsed_sizeofcmds: u32,
}

impl fmt::Debug for MachO {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("MachO")
            .field("header", &self.header)
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("size", &self.size)
            .field("commands", &self.commands.len())
            .finish()
    }
}

impl MachO {
    /// Parses the image starting at `offset` in `source`
    pub fn read<S: ByteSource + ?Sized>(
        source: &mut S,
        offset: u64,
        size: Option<u64>,
        options: &ParseOptions,
    ) -> error::Result<Self> {
        source.seek(offset)?;
        let ctx = Ctx::from_magic(peek(source)?)?;
        let header = Header::read(source, ctx)?;
        log::debug!(
            "{} image at {offset:#x}: {} commands in {:#x} bytes",
            header::filetype_to_str(header.filetype),
            header.ncmds,
            header.sizeofcmds
        );
        let mut commands = Vec::with_capacity(header.ncmds.min(1024) as usize);
        let mut cmd_offset = ctx.header_size();
        for _ in 0..header.ncmds {
            let lc = LoadCommand::read(source, cmd_offset, ctx.endian, options)?;
            log::trace!("{} at {cmd_offset:#x}", load_command::cmd_to_str(lc.cmd()));
            cmd_offset += lc.cmdsize();
            commands.push(lc);
        }
        let macho = MachO {
            header,
            ctx,
            offset,
            size,
            commands,
            parsed_sizeofcmds: header.sizeofcmds,
        };
        macho.validate_strings()?;
        Ok(macho)
    }

    /// Every name this crate hands out as `&str` is checked once here, so the accessors
    /// below cannot fail
    fn validate_strings(&self) -> error::Result<()> {
        for lc in &self.commands {
            if let Some(name) = lc.dylib_reference() {
                name?;
            }
            match lc.command {
                CommandVariant::IdDylib(ref comm) => {
                    lc.lc_str(comm.dylib.name)?;
                }
                CommandVariant::Rpath(ref comm) => {
                    lc.lc_str(comm.path)?;
                }
                _ => (),
            }
        }
        Ok(())
    }

    pub fn is_64(&self) -> bool {
        self.ctx.is_64
    }

    pub fn endian(&self) -> Endian {
        self.ctx.endian
    }

    pub fn filetype(&self) -> u32 {
        self.header.filetype
    }

    /// The dylib references of this image, in command order: `(command index, name, command)`.
    /// Duplicates are yielded once per occurrence; the image's own LC_ID_DYLIB is not included.
    pub fn walk_relocatables(&self) -> impl Iterator<Item = (usize, &str, &LoadCommand)> + '_ {
        self.commands
            .iter()
            .enumerate()
            .filter_map(|(index, lc)| match lc.dylib_reference() {
                Some(Ok(name)) => Some((index, name, lc)),
                _ => None,
            })
    }

    /// The name this image identifies itself by, if it is a dylib
    pub fn install_name(&self) -> Option<&str> {
        self.commands.iter().find_map(|lc| match lc.command {
            CommandVariant::IdDylib(ref comm) => lc.lc_str(comm.dylib.name).ok(),
            _ => None,
        })
    }

    /// The LC_RPATH entries, in command order
    pub fn rpaths(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|lc| match lc.command {
                CommandVariant::Rpath(ref comm) => lc.lc_str(comm.path).ok(),
                _ => None,
            })
            .collect()
    }

    pub fn uuid(&self) -> Option<[u8; 16]> {
        self.commands.iter().find_map(|lc| match lc.command {
            CommandVariant::Uuid(ref comm) => Some(comm.uuid),
            _ => None,
        })
    }

    /// All segments with their sections, in command order
    pub fn segments(&self) -> error::Result<Vec<load_command::Segment>> {
        self.commands
            .iter()
            .filter_map(|lc| lc.segment(self.ctx.endian))
            .collect()
    }

    pub fn symtab(&self) -> Option<&load_command::SymtabCommand> {
        self.commands.iter().find_map(|lc| match lc.command {
            CommandVariant::Symtab(ref comm) => Some(comm),
            _ => None,
        })
    }

    pub fn dysymtab(&self) -> Option<&load_command::DysymtabCommand> {
        self.commands.iter().find_map(|lc| match lc.command {
            CommandVariant::Dysymtab(ref comm) => Some(comm),
            _ => None,
        })
    }
}

/// Parses every image in `source`: the slices of a fat archive, or the single thin image
pub fn parse<S: ByteSource + ?Sized>(
    source: &mut S,
    options: &ParseOptions,
) -> error::Result<Vec<MachO>> {
    Ok(MachFile::read(source, options)?.headers)
}

/// A parsed file: either a collection of multiple architectures, or a single mach-o binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachFile {
    /// Where the file was read from, if it came from disk
    pub path: Option<PathBuf>,
    /// The fat header and architecture table, for multi-architecture files
    pub fat: Option<fat::FatArchive>,
    /// One entry per image, in architecture table order
    pub headers: Vec<MachO>,
}

impl MachFile {
    /// Parses every image in `source`
    pub fn read<S: ByteSource + ?Sized>(
        source: &mut S,
        options: &ParseOptions,
    ) -> error::Result<Self> {
        source.seek(0)?;
        let magic = peek(source)?;
        if fat::is_fat_magic(magic) {
            let archive = fat::FatArchive::read(source)?;
            log::debug!("fat archive with {} architectures", archive.arches.len());
            let mut headers = Vec::with_capacity(archive.arches.len());
            for arch in &archive.arches {
                headers.push(MachO::read(source, arch.offset, Some(arch.size), options)?);
            }
            Ok(MachFile {
                path: None,
                fat: Some(archive),
                headers,
            })
        } else {
            Ok(MachFile {
                path: None,
                fat: None,
                headers: vec![MachO::read(source, 0, None, options)?],
            })
        }
    }

    /// Parses an in-memory image
    pub fn parse(bytes: &[u8], options: &ParseOptions) -> error::Result<Self> {
        Self::read(&mut codec::SliceSource::new(bytes), options)
    }

    /// Opens and parses the file at `path`; the file is closed before this returns
    pub fn open<P: AsRef<Path>>(path: P, options: &ParseOptions) -> error::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut source = codec::StreamSource::new(BufReader::new(file))?;
        let mut parsed = Self::read(&mut source, options)?;
        parsed.path = Some(path.to_path_buf());
        Ok(parsed)
    }

    /// Memory maps and parses the file at `path`
    #[cfg(feature = "mmap")]
    pub fn map<P: AsRef<Path>>(path: P, options: &ParseOptions) -> error::Result<Self> {
        let path = path.as_ref();
        let mut source = codec::MappedSource::open(path)?;
        let mut parsed = Self::read(&mut source, options)?;
        parsed.path = Some(path.to_path_buf());
        Ok(parsed)
    }

    pub fn is_fat(&self) -> bool {
        self.fat.is_some()
    }

    /// The dylib references of every image, in order, without duplicates
    pub fn dylib_references(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self
            .headers
            .iter()
            .flat_map(|macho| macho.walk_relocatables().map(|(_, name, _)| name))
        {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

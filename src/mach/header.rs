//! The Mach-o header, its magic numbers, file types and flags

use core::fmt;

use scroll::Endian;

use crate::codec::{self, ByteSource, Packed};
use crate::error;

/// Mach Header magic constant
pub const MH_MAGIC: u32 = 0xfeedface;
pub const MH_CIGAM: u32 = 0xcefaedfe;
/// Mach Header magic constant for 64-bit
pub const MH_MAGIC_64: u32 = 0xfeedfacf;
pub const MH_CIGAM_64: u32 = 0xcffaedfe;

// Constants for the flags field of the mach_header
/// the object file has no undefined references
pub const MH_NOUNDEFS: u32 = 0x1;
/// the object file is input for the dynamic linker and can't be staticly link edited again
pub const MH_DYLDLINK: u32 = 0x4;
/// the file has its dynamic undefined references prebound.
pub const MH_PREBOUND: u32 = 0x10;
/// the image is using two-level name space bindings
pub const MH_TWOLEVEL: u32 = 0x80;
/// the final linked image contains external weak symbols
pub const MH_WEAK_DEFINES: u32 = 0x8000;
/// the final linked image uses weak symbols
pub const MH_BINDS_TO_WEAK: u32 = 0x10000;
/// When this bit is set on a dylib, the static linker does not need to examine dependent dylibs to
/// see if any are re-exported
pub const MH_NO_REEXPORTED_DYLIBS: u32 = 0x100000;
/// When this bit is set, the OS will load the main executable at a random address.
pub const MH_PIE: u32 = 0x200000;
/// The code was linked for use in an application extension.
pub const MH_APP_EXTENSION_SAFE: u32 = 0x2000000;

// Constants for the filetype field of the mach_header
/// relocatable object file
pub const MH_OBJECT: u32 = 0x1;
/// demand paged executable file
pub const MH_EXECUTE: u32 = 0x2;
/// fixed VM shared library file
pub const MH_FVMLIB: u32 = 0x3;
/// core file
pub const MH_CORE: u32 = 0x4;
/// preloaded executable file
pub const MH_PRELOAD: u32 = 0x5;
/// dynamically bound shared library
pub const MH_DYLIB: u32 = 0x6;
/// dynamic link editor
pub const MH_DYLINKER: u32 = 0x7;
/// dynamically bound bundle file
pub const MH_BUNDLE: u32 = 0x8;
/// shared library stub for static linking only, no section contents
pub const MH_DYLIB_STUB: u32 = 0x9;
/// companion file with only debug sections
pub const MH_DSYM: u32 = 0xa;
/// x86_64 kexts
pub const MH_KEXT_BUNDLE: u32 = 0xb;
/// a file composed of other Mach-Os to be run in the same userspace sharing a single linkedit
pub const MH_FILESET: u32 = 0xc;

pub fn filetype_to_str(filetype: u32) -> &'static str {
    match filetype {
        MH_OBJECT => "OBJECT",
        MH_EXECUTE => "EXECUTE",
        MH_FVMLIB => "FVMLIB",
        MH_CORE => "CORE",
        MH_PRELOAD => "PRELOAD",
        MH_DYLIB => "DYLIB",
        MH_DYLINKER => "DYLINKER",
        MH_BUNDLE => "BUNDLE",
        MH_DYLIB_STUB => "DYLIB_STUB",
        MH_DSYM => "DSYM",
        MH_KEXT_BUNDLE => "KEXT_BUNDLE",
        MH_FILESET => "FILESET",
        _ => "UNKNOWN FILETYPE",
    }
}

/// The layout facts every structure read after the magic depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ctx {
    /// Whether the 64-bit header and record layouts are in use
    pub is_64: bool,
    pub endian: Endian,
}

impl Ctx {
    /// Classifies the first four bytes of an image, read big endian
    pub fn from_magic(magic: u32) -> error::Result<Self> {
        let (is_64, endian) = match magic {
            MH_MAGIC => (false, scroll::BE),
            MH_CIGAM => (false, scroll::LE),
            MH_MAGIC_64 => (true, scroll::BE),
            MH_CIGAM_64 => (true, scroll::LE),
            _ => return Err(error::Error::BadMagic(u64::from(magic))),
        };
        Ok(Ctx { is_64, endian })
    }

    /// Size of the mach header in this layout
    pub fn header_size(&self) -> usize {
        if self.is_64 {
            SIZEOF_HEADER_64
        } else {
            SIZEOF_HEADER_32
        }
    }

    /// Alignment load command sizes are rounded to
    pub fn pointer_size(&self) -> usize {
        if self.is_64 { 8 } else { 4 }
    }
}

packed! {
    /// The 32-bit mach header
    pub struct Header32 {
        pub magic: u32,
        pub cputype: u32,
        pub cpusubtype: u32,
        pub filetype: u32,
        pub ncmds: u32,
        pub sizeofcmds: u32,
        pub flags: u32,
    }
}

pub const SIZEOF_HEADER_32: usize = Header32::DESCRIPTOR.size();

packed! {
    /// The 64-bit mach header
    pub struct Header64 {
        pub magic: u32,
        pub cputype: u32,
        pub cpusubtype: u32,
        pub filetype: u32,
        pub ncmds: u32,
        pub sizeofcmds: u32,
        pub flags: u32,
        pub reserved: u32,
    }
}

pub const SIZEOF_HEADER_64: usize = Header64::DESCRIPTOR.size();

/// A unified 32/64-bit mach header
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub cputype: u32,
    pub cpusubtype: u32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
    /// Only present in the 64-bit layout
    pub reserved: u32,
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Header")
            .field("magic", &format_args!("0x{:x}", self.magic))
            .field("cputype", &self.cputype)
            .field("cpusubtype", &format_args!("0x{:x}", self.cpusubtype))
            .field("filetype", &filetype_to_str(self.filetype))
            .field("ncmds", &self.ncmds)
            .field("sizeofcmds", &self.sizeofcmds)
            .field("flags", &format_args!("0x{:x}", self.flags))
            .field("reserved", &format_args!("0x{:x}", self.reserved))
            .finish()
    }
}

impl From<Header32> for Header {
    fn from(header: Header32) -> Self {
        Header {
            magic: header.magic,
            cputype: header.cputype,
            cpusubtype: header.cpusubtype,
            filetype: header.filetype,
            ncmds: header.ncmds,
            sizeofcmds: header.sizeofcmds,
            flags: header.flags,
            reserved: 0,
        }
    }
}

impl From<Header64> for Header {
    fn from(header: Header64) -> Self {
        Header {
            magic: header.magic,
            cputype: header.cputype,
            cpusubtype: header.cpusubtype,
            filetype: header.filetype,
            ncmds: header.ncmds,
            sizeofcmds: header.sizeofcmds,
            flags: header.flags,
            reserved: header.reserved,
        }
    }
}

impl Header {
    /// Decodes the header at the current position of `source` with the layout of `ctx`
    pub fn read<S: ByteSource + ?Sized>(source: &mut S, ctx: Ctx) -> error::Result<Self> {
        if ctx.is_64 {
            Ok(codec::decode::<Header64, _>(source, ctx.endian)?.into())
        } else {
            Ok(codec::decode::<Header32, _>(source, ctx.endian)?.into())
        }
    }

    /// Encodes this header with the layout of `ctx`
    pub fn to_bytes(&self, ctx: Ctx) -> error::Result<Vec<u8>> {
        if ctx.is_64 {
            let header = Header64 {
                magic: self.magic,
                cputype: self.cputype,
                cpusubtype: self.cpusubtype,
                filetype: self.filetype,
                ncmds: self.ncmds,
                sizeofcmds: self.sizeofcmds,
                flags: self.flags,
                reserved: self.reserved,
            };
            codec::encode(&header, ctx.endian)
        } else {
            let header = Header32 {
                magic: self.magic,
                cputype: self.cputype,
                cpusubtype: self.cpusubtype,
                filetype: self.filetype,
                ncmds: self.ncmds,
                sizeofcmds: self.sizeofcmds,
                flags: self.flags,
            };
            codec::encode(&header, ctx.endian)
        }
    }

    pub fn is_64(&self) -> bool {
        self.magic == MH_MAGIC_64
    }
}

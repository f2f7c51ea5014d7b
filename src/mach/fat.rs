//! A Mach-o fat binary is a multi-architecture binary container

use core::fmt;

use crate::codec::{self, ByteSource, Packed};
use crate::error;
use crate::mach::constants::cputype;

pub const FAT_MAGIC: u32 = 0xcafebabe;
pub const FAT_CIGAM: u32 = 0xbebafeca;
/// Fat archives whose architecture entries carry 64-bit offsets and sizes
pub const FAT_MAGIC_64: u32 = 0xcafebabf;
pub const FAT_CIGAM_64: u32 = 0xbfbafeca;

packed! {
    /// The Mach-o `FatHeader` always has its data bigendian
    pub struct FatHeader {
        /// The magic number, `cafebabe`
        pub magic: u32,
        /// How many fat architecture headers there are
        pub nfat_arch: u32,
    }
}

pub const SIZEOF_FAT_HEADER: usize = FatHeader::DESCRIPTOR.size();

packed! {
    /// The Mach-o `FatArch` always has its data bigendian
    pub struct FatArch32 {
        /// What kind of CPU this binary is
        pub cputype: u32,
        pub cpusubtype: u32,
        /// Where in the fat binary it starts
        pub offset: u32,
        /// How big the binary is
        pub size: u32,
        pub align: u32,
    }
}

pub const SIZEOF_FAT_ARCH: usize = FatArch32::DESCRIPTOR.size();

packed! {
    /// The 64-bit variant of a fat architecture entry
    pub struct FatArch64 {
        pub cputype: u32,
        pub cpusubtype: u32,
        pub offset: u64,
        pub size: u64,
        pub align: u32,
        pub reserved: u32,
    }
}

pub const SIZEOF_FAT_ARCH_64: usize = FatArch64::DESCRIPTOR.size();

/// One architecture slice of a fat binary, independent of the entry width it was read from
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FatArch {
    pub cputype: u32,
    pub cpusubtype: u32,
    /// Where in the fat binary the slice starts
    pub offset: u64,
    /// How big the slice is
    pub size: u64,
    /// Alignment of the slice, as a power of two
    pub align: u32,
}

impl fmt::Debug for FatArch {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("FatArch")
            .field("cputype", &cputype::cpu_type_to_str(self.cputype))
            .field("cpusubtype", &self.cpusubtype)
            .field("offset", &format_args!("{:#x}", &self.offset))
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

impl From<FatArch32> for FatArch {
    fn from(arch: FatArch32) -> Self {
        FatArch {
            cputype: arch.cputype,
            cpusubtype: arch.cpusubtype,
            offset: u64::from(arch.offset),
            size: u64::from(arch.size),
            align: arch.align,
        }
    }
}

impl From<FatArch64> for FatArch {
    fn from(arch: FatArch64) -> Self {
        FatArch {
            cputype: arch.cputype,
            cpusubtype: arch.cpusubtype,
            offset: arch.offset,
            size: arch.size,
            align: arch.align,
        }
    }
}

impl FatArch {
    /// Get the slice of bytes this header describes from `bytes`
    pub fn slice<'a>(&self, bytes: &'a [u8]) -> error::Result<&'a [u8]> {
        let start = self.offset as usize;
        let end = start.saturating_add(self.size as usize);
        bytes.get(start..end).ok_or_else(|| error::Error::Truncated {
            what: "fat architecture slice",
            offset: self.offset,
            needed: self.size as usize,
        })
    }

    /// Whether this fat header describes a 64-bit binary
    pub fn is_64(&self) -> bool {
        self.cputype & cputype::CPU_ARCH_ABI64 != 0
    }
}

/// Whether `magic`, read big endian, starts a fat archive
pub fn is_fat_magic(magic: u32) -> bool {
    magic == FAT_MAGIC || magic == FAT_MAGIC_64
}

/// The fat header and its architecture table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatArchive {
    pub header: FatHeader,
    pub arches: Vec<FatArch>,
}

impl FatArchive {
    /// Reads the header and architecture table from the start of `source`
    pub fn read<S: ByteSource + ?Sized>(source: &mut S) -> error::Result<Self> {
        source.seek(0)?;
        let header: FatHeader = codec::decode(source, scroll::BE)?;
        let wide = match header.magic {
            FAT_MAGIC => false,
            FAT_MAGIC_64 => true,
            magic => return Err(error::Error::BadMagic(u64::from(magic))),
        };
        let mut arches = Vec::with_capacity(header.nfat_arch.min(64) as usize);
        for _ in 0..header.nfat_arch {
            let arch: FatArch = if wide {
                codec::decode::<FatArch64, _>(source, scroll::BE)?.into()
            } else {
                codec::decode::<FatArch32, _>(source, scroll::BE)?.into()
            };
            arches.push(arch);
        }
        Ok(FatArchive { header, arches })
    }

    /// Try and find the `cputype` in `Self`, if there is one
    pub fn find_cputype(&self, cputype: u32) -> Option<&FatArch> {
        self.arches.iter().find(|arch| arch.cputype == cputype)
    }
}

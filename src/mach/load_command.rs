//! Load commands tell the kernel and dynamic linker anything from how to load this binary into memory, what the entry point is, apple specific information, to which libraries it requires for dynamic linking

use core::fmt::{self, Display};

use scroll::Endian;

use crate::codec::{self, ByteSource, Packed};
use crate::error;
use crate::options::ParseOptions;
use crate::strtab::Strtab;

///////////////////////////////////////
// Load Commands from mach-o/loader.h
// with some rusty additions
//////////////////////////////////////

packed! {
    /// Occurs at the beginning of every load command to serve as a sort of tagged union/enum discriminant
    pub struct LoadCommandHeader {
        pub cmd: u32,
        pub cmdsize: u32,
    }
}

impl Display for LoadCommandHeader {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "LoadCommandHeader: {} size: {}", cmd_to_str(self.cmd), self.cmdsize)
    }
}

pub const SIZEOF_LOAD_COMMAND: usize = LoadCommandHeader::DESCRIPTOR.size();

/// An offset, relative to the start of its load command, of a NUL terminated string
pub type LcStr = u32;

packed! {
    pub struct Section32 {
        /// name of this section
        pub sectname: [u8; 16],
        /// segment this section goes in
        pub segname: [u8; 16],
        /// memory address of this section
        pub addr: u32,
        /// size in bytes of this section
        pub size: u32,
        /// file offset of this section
        pub offset: u32,
        /// section alignment (power of 2)
        pub align: u32,
        /// file offset of relocation entries
        pub reloff: u32,
        /// number of relocation entries
        pub nreloc: u32,
        /// flags (section type and attributes)
        pub flags: u32,
        /// reserved (for offset or index)
        pub reserved1: u32,
        /// reserved (for count or sizeof)
        pub reserved2: u32,
    }
}

pub const SIZEOF_SECTION_32: usize = Section32::DESCRIPTOR.size();

packed! {
    /// for 64-bit architectures
    pub struct Section64 {
        pub sectname: [u8; 16],
        pub segname: [u8; 16],
        pub addr: u64,
        pub size: u64,
        pub offset: u32,
        pub align: u32,
        pub reloff: u32,
        pub nreloc: u32,
        pub flags: u32,
        pub reserved1: u32,
        pub reserved2: u32,
        pub reserved3: u32,
    }
}

pub const SIZEOF_SECTION_64: usize = Section64::DESCRIPTOR.size();

packed! {
    pub struct SegmentCommand32 {
        pub cmd: u32,
        pub cmdsize: u32,
        pub segname: [u8; 16],
        pub vmaddr: u32,
        pub vmsize: u32,
        pub fileoff: u32,
        pub filesize: u32,
        pub maxprot: u32,
        pub initprot: u32,
        pub nsects: u32,
        pub flags: u32,
    }
}

pub const SIZEOF_SEGMENT_COMMAND_32: usize = SegmentCommand32::DESCRIPTOR.size();

packed! {
    pub struct SegmentCommand64 {
        pub cmd: u32,
        pub cmdsize: u32,
        pub segname: [u8; 16],
        pub vmaddr: u64,
        pub vmsize: u64,
        pub fileoff: u64,
        pub filesize: u64,
        pub maxprot: u32,
        pub initprot: u32,
        pub nsects: u32,
        pub flags: u32,
    }
}

pub const SIZEOF_SEGMENT_COMMAND_64: usize = SegmentCommand64::DESCRIPTOR.size();

packed! {
    /// Fixed virtual memory shared libraries are identified by two things.  The
    /// target pathname (the name of the library as found for execution), and the
    /// minor version number.  The address of where the headers are loaded is in
    /// header_addr. (THIS IS OBSOLETE and no longer supported).
    pub struct Fvmlib {
        /// library's target pathname
        pub name: LcStr,
        /// library's minor version number
        pub minor_version: u32,
        /// library's header address
        pub header_addr: u32,
    }
}

packed! {
    /// LC_IDFVMLIB or LC_LOADFVMLIB
    pub struct FvmlibCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub fvmlib: Fvmlib,
    }
}

packed! {
    /// Dynamicly linked shared libraries are identified by two things.  The
    /// pathname (the name of the library as found for execution), and the
    /// compatibility version number.  The pathname must match and the compatibility
    /// number in the user of the library must be greater than or equal to the
    /// library being used.
    pub struct Dylib {
        /// library's path name
        pub name: LcStr,
        /// library's build time stamp
        pub timestamp: u32,
        /// library's current version number
        pub current_version: u32,
        /// library's compatibility vers number
        pub compatibility_version: u32,
    }
}

packed! {
    /// LC_ID_DYLIB, LC_LOAD_DYLIB, LC_LOAD_WEAK_DYLIB, LC_REEXPORT_DYLIB,
    /// LC_LAZY_LOAD_DYLIB or LC_LOAD_UPWARD_DYLIB
    pub struct DylibCommand {
        pub cmd: u32,
        /// includes pathname string
        pub cmdsize: u32,
        /// the library identification
        pub dylib: Dylib,
    }
}

pub const SIZEOF_DYLIB_COMMAND: usize = DylibCommand::DESCRIPTOR.size();

packed! {
    /// The name of the umbrella framework of a subframework
    pub struct SubFrameworkCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub umbrella: LcStr,
    }
}

packed! {
    /// A client, other than the umbrella, allowed to link against a subframework
    pub struct SubClientCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub client: LcStr,
    }
}

packed! {
    pub struct SubUmbrellaCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub sub_umbrella: LcStr,
    }
}

packed! {
    pub struct SubLibraryCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub sub_library: LcStr,
    }
}

packed! {
    /// A program that is prebound to its dynamic libraries has one of these for each
    /// library that the static linker used in prebinding. The bit vector of linked
    /// modules follows the library's name in the command's payload.
    pub struct PreboundDylibCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        /// library's path name
        pub name: LcStr,
        /// number of modules in library
        pub nmodules: u32,
        /// bit vector of linked modules
        pub linked_modules: LcStr,
    }
}

pub const SIZEOF_PREBOUND_DYLIB_COMMAND: usize = PreboundDylibCommand::DESCRIPTOR.size();

packed! {
    /// The name of the dynamic linker, or an environment string for LC_DYLD_ENVIRONMENT
    pub struct DylinkerCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub name: LcStr,
    }
}

packed! {
    /// LC_THREAD or LC_UNIXTHREAD; the flavor/count/state triples follow in the payload
    pub struct ThreadCommand {
        pub cmd: u32,
        pub cmdsize: u32,
    }
}

packed! {
    pub struct RoutinesCommand32 {
        pub cmd: u32,
        pub cmdsize: u32,
        pub init_address: u32,
        pub init_module: u32,
        pub reserved1: u32,
        pub reserved2: u32,
        pub reserved3: u32,
        pub reserved4: u32,
        pub reserved5: u32,
        pub reserved6: u32,
    }
}

packed! {
    pub struct RoutinesCommand64 {
        pub cmd: u32,
        pub cmdsize: u32,
        pub init_address: u64,
        pub init_module: u64,
        pub reserved1: u64,
        pub reserved2: u64,
        pub reserved3: u64,
        pub reserved4: u64,
        pub reserved5: u64,
        pub reserved6: u64,
    }
}

packed! {
    pub struct SymtabCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        /// symbol table offset
        pub symoff: u32,
        /// number of symbol table entries
        pub nsyms: u32,
        /// string table offset
        pub stroff: u32,
        /// string table size in bytes
        pub strsize: u32,
    }
}

pub const SIZEOF_SYMTAB_COMMAND: usize = SymtabCommand::DESCRIPTOR.size();

packed! {
    /// Partitions the symbol table into local, external-defined and undefined runs and
    /// locates the older dynamic linking tables
    pub struct DysymtabCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub ilocalsym: u32,
        pub nlocalsym: u32,
        pub iextdefsym: u32,
        pub nextdefsym: u32,
        pub iundefsym: u32,
        pub nundefsym: u32,
        pub tocoff: u32,
        pub ntoc: u32,
        pub modtaboff: u32,
        pub nmodtab: u32,
        pub extrefsymoff: u32,
        pub nextrefsyms: u32,
        pub indirectsymoff: u32,
        pub nindirectsyms: u32,
        pub extreloff: u32,
        pub nextrel: u32,
        pub locreloff: u32,
        pub nlocrel: u32,
    }
}

pub const SIZEOF_DYSYMTAB_COMMAND: usize = DysymtabCommand::DESCRIPTOR.size();

packed! {
    pub struct DylibTableOfContents {
        /// the defined external symbol (index into the symbol table)
        pub symbol_index: u32,
        /// index into the module table this symbol is defined in
        pub module_index: u32,
    }
}

pub const SIZEOF_DYLIB_TABLE_OF_CONTENTS: usize = DylibTableOfContents::DESCRIPTOR.size();

packed! {
    pub struct TwolevelHintsCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub offset: u32,
        pub nhints: u32,
    }
}

packed! {
    pub struct PrebindCksumCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub cksum: u32,
    }
}

packed! {
    pub struct UuidCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub uuid: [u8; 16],
    }
}

pub const SIZEOF_UUID_COMMAND: usize = UuidCommand::DESCRIPTOR.size();

packed! {
    pub struct RpathCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub path: LcStr,
    }
}

pub const SIZEOF_RPATH_COMMAND: usize = RpathCommand::DESCRIPTOR.size();

packed! {
    /// A blob of data in the __LINKEDIT segment
    pub struct LinkeditDataCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub dataoff: u32,
        pub datasize: u32,
    }
}

packed! {
    pub struct EncryptionInfoCommand32 {
        pub cmd: u32,
        pub cmdsize: u32,
        pub cryptoff: u32,
        pub cryptsize: u32,
        pub cryptid: u32,
    }
}

packed! {
    pub struct EncryptionInfoCommand64 {
        pub cmd: u32,
        pub cmdsize: u32,
        pub cryptoff: u32,
        pub cryptsize: u32,
        pub cryptid: u32,
        pub pad: u32,
    }
}

packed! {
    pub struct VersionMinCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub version: u32,
        pub sdk: u32,
    }
}

packed! {
    pub struct DyldInfoCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub rebase_off: u32,
        pub rebase_size: u32,
        pub bind_off: u32,
        pub bind_size: u32,
        pub weak_bind_off: u32,
        pub weak_bind_size: u32,
        pub lazy_bind_off: u32,
        pub lazy_bind_size: u32,
        pub export_off: u32,
        pub export_size: u32,
    }
}

packed! {
    /// `count` NUL terminated linker flags follow in the payload
    pub struct LinkerOptionCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub count: u32,
    }
}

packed! {
    pub struct SymsegCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub offset: u32,
        pub size: u32,
    }
}

packed! {
    pub struct IdentCommand {
        pub cmd: u32,
        pub cmdsize: u32,
    }
}

packed! {
    pub struct FvmfileCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub name: LcStr,
        pub header_addr: u32,
    }
}

packed! {
    pub struct EntryPointCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub entryoff: u64,
        pub stacksize: u64,
    }
}

packed! {
    pub struct SourceVersionCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub version: u64,
    }
}

packed! {
    /// `ntools` build_tool_version records follow in the payload
    pub struct BuildVersionCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub platform: u32,
        pub minos: u32,
        pub sdk: u32,
        pub ntools: u32,
    }
}

packed! {
    pub struct NoteCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub data_owner: [u8; 16],
        pub offset: u64,
        pub size: u64,
    }
}

packed! {
    pub struct FilesetEntryCommand {
        pub cmd: u32,
        pub cmdsize: u32,
        pub vmaddr: u64,
        pub fileoff: u64,
        pub entry_id: LcStr,
        pub reserved: u32,
    }
}

// Constants, et. al

pub const LC_REQ_DYLD: u32 = 0x80000000;
pub const LC_SEGMENT: u32 = 0x1;
pub const LC_SYMTAB: u32 = 0x2;
pub const LC_SYMSEG: u32 = 0x3;
pub const LC_THREAD: u32 = 0x4;
pub const LC_UNIXTHREAD: u32 = 0x5;
pub const LC_LOADFVMLIB: u32 = 0x6;
pub const LC_IDFVMLIB: u32 = 0x7;
pub const LC_IDENT: u32 = 0x8;
pub const LC_FVMFILE: u32 = 0x9;
pub const LC_PREPAGE: u32 = 0xa;
pub const LC_DYSYMTAB: u32 = 0xb;
pub const LC_LOAD_DYLIB: u32 = 0xc;
pub const LC_ID_DYLIB: u32 = 0xd;
pub const LC_LOAD_DYLINKER: u32 = 0xe;
pub const LC_ID_DYLINKER: u32 = 0xf;
pub const LC_PREBOUND_DYLIB: u32 = 0x10;
pub const LC_ROUTINES: u32 = 0x11;
pub const LC_SUB_FRAMEWORK: u32 = 0x12;
pub const LC_SUB_UMBRELLA: u32 = 0x13;
pub const LC_SUB_CLIENT: u32 = 0x14;
pub const LC_SUB_LIBRARY: u32 = 0x15;
pub const LC_TWOLEVEL_HINTS: u32 = 0x16;
pub const LC_PREBIND_CKSUM: u32 = 0x17;
pub const LC_LOAD_WEAK_DYLIB: u32 = 0x18 | LC_REQ_DYLD;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_ROUTINES_64: u32 = 0x1a;
pub const LC_UUID: u32 = 0x1b;
pub const LC_RPATH: u32 = 0x1c | LC_REQ_DYLD;
pub const LC_CODE_SIGNATURE: u32 = 0x1d;
pub const LC_SEGMENT_SPLIT_INFO: u32 = 0x1e;
pub const LC_REEXPORT_DYLIB: u32 = 0x1f | LC_REQ_DYLD;
pub const LC_LAZY_LOAD_DYLIB: u32 = 0x20;
pub const LC_ENCRYPTION_INFO: u32 = 0x21;
pub const LC_DYLD_INFO: u32 = 0x22;
pub const LC_DYLD_INFO_ONLY: u32 = 0x22 | LC_REQ_DYLD;
pub const LC_LOAD_UPWARD_DYLIB: u32 = 0x23 | LC_REQ_DYLD;
pub const LC_VERSION_MIN_MACOSX: u32 = 0x24;
pub const LC_VERSION_MIN_IPHONEOS: u32 = 0x25;
pub const LC_FUNCTION_STARTS: u32 = 0x26;
pub const LC_DYLD_ENVIRONMENT: u32 = 0x27;
pub const LC_MAIN: u32 = 0x28 | LC_REQ_DYLD;
pub const LC_DATA_IN_CODE: u32 = 0x29;
pub const LC_SOURCE_VERSION: u32 = 0x2A;
pub const LC_DYLIB_CODE_SIGN_DRS: u32 = 0x2B;
pub const LC_ENCRYPTION_INFO_64: u32 = 0x2C;
pub const LC_LINKER_OPTION: u32 = 0x2D;
pub const LC_LINKER_OPTIMIZATION_HINT: u32 = 0x2E;
pub const LC_VERSION_MIN_TVOS: u32 = 0x2F;
pub const LC_VERSION_MIN_WATCHOS: u32 = 0x30;
pub const LC_NOTE: u32 = 0x31;
pub const LC_BUILD_VERSION: u32 = 0x32;
pub const LC_DYLD_EXPORTS_TRIE: u32 = 0x33 | LC_REQ_DYLD;
pub const LC_DYLD_CHAINED_FIXUPS: u32 = 0x34 | LC_REQ_DYLD;
pub const LC_FILESET_ENTRY: u32 = 0x35 | LC_REQ_DYLD;
pub const LC_ATOM_INFO: u32 = 0x36;

pub fn cmd_to_str(cmd: u32) -> &'static str {
    match cmd {
        LC_SEGMENT => "LC_SEGMENT",
        LC_SYMTAB => "LC_SYMTAB",
        LC_SYMSEG => "LC_SYMSEG",
        LC_THREAD => "LC_THREAD",
        LC_UNIXTHREAD => "LC_UNIXTHREAD",
        LC_LOADFVMLIB => "LC_LOADFVMLIB",
        LC_IDFVMLIB => "LC_IDFVMLIB",
        LC_IDENT => "LC_IDENT",
        LC_FVMFILE => "LC_FVMFILE",
        LC_PREPAGE => "LC_PREPAGE",
        LC_DYSYMTAB => "LC_DYSYMTAB",
        LC_LOAD_DYLIB => "LC_LOAD_DYLIB",
        LC_ID_DYLIB => "LC_ID_DYLIB",
        LC_LOAD_DYLINKER => "LC_LOAD_DYLINKER",
        LC_ID_DYLINKER => "LC_ID_DYLINKER",
        LC_PREBOUND_DYLIB => "LC_PREBOUND_DYLIB",
        LC_ROUTINES => "LC_ROUTINES",
        LC_SUB_FRAMEWORK => "LC_SUB_FRAMEWORK",
        LC_SUB_UMBRELLA => "LC_SUB_UMBRELLA",
        LC_SUB_CLIENT => "LC_SUB_CLIENT",
        LC_SUB_LIBRARY => "LC_SUB_LIBRARY",
        LC_TWOLEVEL_HINTS => "LC_TWOLEVEL_HINTS",
        LC_PREBIND_CKSUM => "LC_PREBIND_CKSUM",
        LC_LOAD_WEAK_DYLIB => "LC_LOAD_WEAK_DYLIB",
        LC_SEGMENT_64 => "LC_SEGMENT_64",
        LC_ROUTINES_64 => "LC_ROUTINES_64",
        LC_UUID => "LC_UUID",
        LC_RPATH => "LC_RPATH",
        LC_CODE_SIGNATURE => "LC_CODE_SIGNATURE",
        LC_SEGMENT_SPLIT_INFO => "LC_SEGMENT_SPLIT_INFO",
        LC_REEXPORT_DYLIB => "LC_REEXPORT_DYLIB",
        LC_LAZY_LOAD_DYLIB => "LC_LAZY_LOAD_DYLIB",
        LC_ENCRYPTION_INFO => "LC_ENCRYPTION_INFO",
        LC_DYLD_INFO => "LC_DYLD_INFO",
        LC_DYLD_INFO_ONLY => "LC_DYLD_INFO_ONLY",
        LC_LOAD_UPWARD_DYLIB => "LC_LOAD_UPWARD_DYLIB",
        LC_VERSION_MIN_MACOSX => "LC_VERSION_MIN_MACOSX",
        LC_VERSION_MIN_IPHONEOS => "LC_VERSION_MIN_IPHONEOS",
        LC_FUNCTION_STARTS => "LC_FUNCTION_STARTS",
        LC_DYLD_ENVIRONMENT => "LC_DYLD_ENVIRONMENT",
        LC_MAIN => "LC_MAIN",
        LC_DATA_IN_CODE => "LC_DATA_IN_CODE",
        LC_SOURCE_VERSION => "LC_SOURCE_VERSION",
        LC_DYLIB_CODE_SIGN_DRS => "LC_DYLIB_CODE_SIGN_DRS",
        LC_ENCRYPTION_INFO_64 => "LC_ENCRYPTION_INFO_64",
        LC_LINKER_OPTION => "LC_LINKER_OPTION",
        LC_LINKER_OPTIMIZATION_HINT => "LC_LINKER_OPTIMIZATION_HINT",
        LC_VERSION_MIN_TVOS => "LC_VERSION_MIN_TVOS",
        LC_VERSION_MIN_WATCHOS => "LC_VERSION_MIN_WATCHOS",
        LC_NOTE => "LC_NOTE",
        LC_BUILD_VERSION => "LC_BUILD_VERSION",
        LC_DYLD_EXPORTS_TRIE => "LC_DYLD_EXPORTS_TRIE",
        LC_DYLD_CHAINED_FIXUPS => "LC_DYLD_CHAINED_FIXUPS",
        LC_FILESET_ENTRY => "LC_FILESET_ENTRY",
        LC_ATOM_INFO => "LC_ATOM_INFO",
        _ => "LC_UNKNOWN",
    }
}

// Typesafe Command Variants

macro_rules! command_variants {
    ($($variant:ident($ty:ty) = $lc:ident),* $(,)?) => {
        /// A load command, typed by its kind
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum CommandVariant {
            $($variant($ty),)*
            /// A kind this crate does not recognize; everything after the header is opaque
            Unknown(LoadCommandHeader),
        }

        impl CommandVariant {
            /// Decodes the fixed record at the start of `bytes` for a command of kind `cmd`,
            /// or `None` when the kind is not recognized
            fn decode(bytes: &[u8], cmd: u32, endian: Endian) -> error::Result<Option<Self>> {
                use self::CommandVariant::*;
                match cmd {
                    $($lc => Ok(Some($variant(codec::decode_at::<$ty>(bytes, 0, endian)?))),)*
                    _ => Ok(None),
                }
            }

            /// The `cmd`/`cmdsize` pair this command starts with
            pub fn header(&self) -> LoadCommandHeader {
                use self::CommandVariant::*;
                match *self {
                    $($variant(comm) => LoadCommandHeader { cmd: comm.cmd, cmdsize: comm.cmdsize },)*
                    Unknown(header) => header,
                }
            }

            pub(crate) fn set_cmdsize(&mut self, cmdsize: u32) {
                use self::CommandVariant::*;
                match *self {
                    $($variant(ref mut comm) => comm.cmdsize = cmdsize,)*
                    Unknown(ref mut header) => header.cmdsize = cmdsize,
                }
            }

            /// Size of the fixed record, i.e. where the command's payload starts
            pub fn fixed_size(&self) -> usize {
                use self::CommandVariant::*;
                match *self {
                    $($variant(_) => codec::sizeof::<$ty>(),)*
                    Unknown(_) => SIZEOF_LOAD_COMMAND,
                }
            }

            /// Encodes only the fixed record
            pub fn to_bytes(&self, endian: Endian) -> error::Result<Vec<u8>> {
                use self::CommandVariant::*;
                match *self {
                    $($variant(ref comm) => codec::encode(comm, endian),)*
                    Unknown(ref header) => codec::encode(header, endian),
                }
            }
        }
    };
}

command_variants! {
    Segment32(SegmentCommand32) = LC_SEGMENT,
    Segment64(SegmentCommand64) = LC_SEGMENT_64,
    Uuid(UuidCommand) = LC_UUID,
    Symtab(SymtabCommand) = LC_SYMTAB,
    Symseg(SymsegCommand) = LC_SYMSEG,
    Thread(ThreadCommand) = LC_THREAD,
    Unixthread(ThreadCommand) = LC_UNIXTHREAD,
    LoadFvmlib(FvmlibCommand) = LC_LOADFVMLIB,
    IdFvmlib(FvmlibCommand) = LC_IDFVMLIB,
    Ident(IdentCommand) = LC_IDENT,
    Fvmfile(FvmfileCommand) = LC_FVMFILE,
    Prepage(LoadCommandHeader) = LC_PREPAGE,
    Dysymtab(DysymtabCommand) = LC_DYSYMTAB,
    LoadDylib(DylibCommand) = LC_LOAD_DYLIB,
    IdDylib(DylibCommand) = LC_ID_DYLIB,
    LoadDylinker(DylinkerCommand) = LC_LOAD_DYLINKER,
    IdDylinker(DylinkerCommand) = LC_ID_DYLINKER,
    PreboundDylib(PreboundDylibCommand) = LC_PREBOUND_DYLIB,
    Routines32(RoutinesCommand32) = LC_ROUTINES,
    Routines64(RoutinesCommand64) = LC_ROUTINES_64,
    SubFramework(SubFrameworkCommand) = LC_SUB_FRAMEWORK,
    SubUmbrella(SubUmbrellaCommand) = LC_SUB_UMBRELLA,
    SubClient(SubClientCommand) = LC_SUB_CLIENT,
    SubLibrary(SubLibraryCommand) = LC_SUB_LIBRARY,
    TwolevelHints(TwolevelHintsCommand) = LC_TWOLEVEL_HINTS,
    PrebindCksum(PrebindCksumCommand) = LC_PREBIND_CKSUM,
    LoadWeakDylib(DylibCommand) = LC_LOAD_WEAK_DYLIB,
    Rpath(RpathCommand) = LC_RPATH,
    CodeSignature(LinkeditDataCommand) = LC_CODE_SIGNATURE,
    SegmentSplitInfo(LinkeditDataCommand) = LC_SEGMENT_SPLIT_INFO,
    ReexportDylib(DylibCommand) = LC_REEXPORT_DYLIB,
    LazyLoadDylib(DylibCommand) = LC_LAZY_LOAD_DYLIB,
    EncryptionInfo32(EncryptionInfoCommand32) = LC_ENCRYPTION_INFO,
    EncryptionInfo64(EncryptionInfoCommand64) = LC_ENCRYPTION_INFO_64,
    DyldInfo(DyldInfoCommand) = LC_DYLD_INFO,
    DyldInfoOnly(DyldInfoCommand) = LC_DYLD_INFO_ONLY,
    LoadUpwardDylib(DylibCommand) = LC_LOAD_UPWARD_DYLIB,
    VersionMinMacosx(VersionMinCommand) = LC_VERSION_MIN_MACOSX,
    VersionMinIphoneos(VersionMinCommand) = LC_VERSION_MIN_IPHONEOS,
    VersionMinTvos(VersionMinCommand) = LC_VERSION_MIN_TVOS,
    VersionMinWatchos(VersionMinCommand) = LC_VERSION_MIN_WATCHOS,
    FunctionStarts(LinkeditDataCommand) = LC_FUNCTION_STARTS,
    DyldEnvironment(DylinkerCommand) = LC_DYLD_ENVIRONMENT,
    Main(EntryPointCommand) = LC_MAIN,
    DataInCode(LinkeditDataCommand) = LC_DATA_IN_CODE,
    SourceVersion(SourceVersionCommand) = LC_SOURCE_VERSION,
    DylibCodeSignDrs(LinkeditDataCommand) = LC_DYLIB_CODE_SIGN_DRS,
    LinkerOption(LinkerOptionCommand) = LC_LINKER_OPTION,
    LinkerOptimizationHint(LinkeditDataCommand) = LC_LINKER_OPTIMIZATION_HINT,
    Note(NoteCommand) = LC_NOTE,
    BuildVersion(BuildVersionCommand) = LC_BUILD_VERSION,
    DyldExportsTrie(LinkeditDataCommand) = LC_DYLD_EXPORTS_TRIE,
    DyldChainedFixups(LinkeditDataCommand) = LC_DYLD_CHAINED_FIXUPS,
    FilesetEntry(FilesetEntryCommand) = LC_FILESET_ENTRY,
    AtomInfo(LinkeditDataCommand) = LC_ATOM_INFO,
}

impl CommandVariant {
    pub fn cmd(&self) -> u32 {
        self.header().cmd
    }

    pub fn cmdsize(&self) -> usize {
        self.header().cmdsize as usize
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, CommandVariant::Unknown(_))
    }
}

/// Whether a command of kind `cmd` names a library this image depends on
pub fn is_dylib_reference(cmd: u32) -> bool {
    matches!(
        cmd,
        LC_LOAD_DYLIB
            | LC_LOAD_WEAK_DYLIB
            | LC_REEXPORT_DYLIB
            | LC_LAZY_LOAD_DYLIB
            | LC_LOAD_UPWARD_DYLIB
            | LC_PREBOUND_DYLIB
    )
}

/// One load command: its typed fixed record, followed by the rest of its bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadCommand {
    /// Offset of the command from the start of its image
    pub offset: usize,
    pub command: CommandVariant,
    /// Everything after the fixed record, up to `cmdsize`: strings, sections, or for an
    /// unknown command its whole opaque payload
    pub data: Vec<u8>,
}

impl LoadCommand {
    /// Reads the command at the current position of `source`; `offset` is that position
    /// relative to the start of the image, used for error reporting and bookkeeping
    pub fn read<S: ByteSource + ?Sized>(
        source: &mut S,
        offset: usize,
        endian: Endian,
        options: &ParseOptions,
    ) -> error::Result<Self> {
        let lc: LoadCommandHeader = codec::decode(source, endian)?;
        let size = lc.cmdsize as usize;
        if size < SIZEOF_LOAD_COMMAND {
            return Err(error::Error::Malformed(format!(
                "{lc} at offset {offset:#x} is smaller than a load command header"
            )));
        }
        let rest = codec::read_bytes(source, size - SIZEOF_LOAD_COMMAND, "load command")?;
        let mut bytes = codec::encode(&lc, endian)?;
        bytes.extend_from_slice(&rest);
        match CommandVariant::decode(&bytes, lc.cmd, endian)? {
            Some(command) => {
                let data = bytes.split_off(command.fixed_size());
                Ok(LoadCommand {
                    offset,
                    command,
                    data,
                })
            }
            None if options.allow_unknown_load_commands => {
                log::warn!("keeping unknown load command {:#x} at offset {offset:#x} as {} opaque bytes", lc.cmd, rest.len());
                Ok(LoadCommand {
                    offset,
                    command: CommandVariant::Unknown(lc),
                    data: rest,
                })
            }
            None => Err(error::Error::UnsupportedLoadCommand {
                cmd: lc.cmd,
                offset,
            }),
        }
    }

    pub fn cmd(&self) -> u32 {
        self.command.cmd()
    }

    pub fn cmdsize(&self) -> usize {
        self.command.cmdsize()
    }

    pub fn is_known(&self) -> bool {
        self.command.is_known()
    }

    /// The bytes this command occupies in the image, byte for byte
    pub fn to_bytes(&self, endian: Endian) -> error::Result<Vec<u8>> {
        let mut bytes = self.command.to_bytes(endian)?;
        bytes.extend_from_slice(&self.data);
        if bytes.len() != self.cmdsize() {
            return Err(error::Error::Malformed(format!(
                "{} is {} bytes but claims a cmdsize of {}",
                cmd_to_str(self.cmd()),
                bytes.len(),
                self.cmdsize()
            )));
        }
        Ok(bytes)
    }

    /// The string stored at `offset`, relative to the start of this command
    pub fn lc_str(&self, offset: LcStr) -> error::Result<&str> {
        let offset = offset as usize;
        let fixed = self.command.fixed_size();
        if offset < fixed || offset > self.cmdsize() {
            return Err(error::Error::Malformed(format!(
                "string offset {offset:#x} lies outside the payload of {}",
                cmd_to_str(self.cmd())
            )));
        }
        Strtab::new(&self.data).get(offset - fixed)
    }

    /// The library named by a dylib reference command, if this is one
    pub fn dylib_reference(&self) -> Option<error::Result<&str>> {
        use self::CommandVariant::*;
        match self.command {
            LoadDylib(ref comm)
            | LoadWeakDylib(ref comm)
            | ReexportDylib(ref comm)
            | LazyLoadDylib(ref comm)
            | LoadUpwardDylib(ref comm) => Some(self.lc_str(comm.dylib.name)),
            PreboundDylib(ref comm) => Some(self.lc_str(comm.name)),
            _ => None,
        }
    }

    /// The segment described by this command, with its sections, if this is a segment command
    pub fn segment(&self, endian: Endian) -> Option<error::Result<Segment>> {
        match self.command {
            CommandVariant::Segment32(ref comm) => Some(Segment::from_32(comm, &self.data, endian)),
            CommandVariant::Segment64(ref comm) => Some(Segment::from_64(comm, &self.data, endian)),
            _ => None,
        }
    }
}

/// The name stored in a fixed 16 byte, NUL padded field
pub fn fixed_name(bytes: &[u8; 16]) -> &str {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    core::str::from_utf8(&bytes[..end]).unwrap_or("")
}

/// A unified 32/64-bit section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Section {
    pub sectname: [u8; 16],
    pub segname: [u8; 16],
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
}

impl Section {
    pub fn name(&self) -> &str {
        fixed_name(&self.sectname)
    }

    pub fn segname(&self) -> &str {
        fixed_name(&self.segname)
    }
}

impl From<Section32> for Section {
    fn from(section: Section32) -> Self {
        Section {
            sectname: section.sectname,
            segname: section.segname,
            addr: u64::from(section.addr),
            size: u64::from(section.size),
            offset: section.offset,
            align: section.align,
            reloff: section.reloff,
            nreloc: section.nreloc,
            flags: section.flags,
        }
    }
}

impl From<Section64> for Section {
    fn from(section: Section64) -> Self {
        Section {
            sectname: section.sectname,
            segname: section.segname,
            addr: section.addr,
            size: section.size,
            offset: section.offset,
            align: section.align,
            reloff: section.reloff,
            nreloc: section.nreloc,
            flags: section.flags,
        }
    }
}

/// A unified 32/64-bit segment and its sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub segname: [u8; 16],
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: u32,
    pub initprot: u32,
    pub flags: u32,
    pub sections: Vec<Section>,
}

impl Segment {
    pub fn name(&self) -> &str {
        fixed_name(&self.segname)
    }

    fn from_32(comm: &SegmentCommand32, data: &[u8], endian: Endian) -> error::Result<Self> {
        let mut source = codec::SliceSource::new(data);
        let mut sections = Vec::with_capacity(comm.nsects.min(256) as usize);
        for _ in 0..comm.nsects {
            sections.push(codec::decode::<Section32, _>(&mut source, endian)?.into());
        }
        Ok(Segment {
            segname: comm.segname,
            vmaddr: u64::from(comm.vmaddr),
            vmsize: u64::from(comm.vmsize),
            fileoff: u64::from(comm.fileoff),
            filesize: u64::from(comm.filesize),
            maxprot: comm.maxprot,
            initprot: comm.initprot,
            flags: comm.flags,
            sections,
        })
    }

    fn from_64(comm: &SegmentCommand64, data: &[u8], endian: Endian) -> error::Result<Self> {
        let mut source = codec::SliceSource::new(data);
        let mut sections = Vec::with_capacity(comm.nsects.min(256) as usize);
        for _ in 0..comm.nsects {
            sections.push(codec::decode::<Section64, _>(&mut source, endian)?.into());
        }
        Ok(Segment {
            segname: comm.segname,
            vmaddr: comm.vmaddr,
            vmsize: comm.vmsize,
            fileoff: comm.fileoff,
            filesize: comm.filesize,
            maxprot: comm.maxprot,
            initprot: comm.initprot,
            flags: comm.flags,
            sections,
        })
    }
}

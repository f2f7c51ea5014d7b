//! Synthesizes small Mach-o images for the integration tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use machwalk::codec::{self, Packed};
use machwalk::mach::cputype::{CPU_TYPE_X86, CPU_TYPE_X86_64};
use machwalk::mach::fat::{FAT_MAGIC, FAT_MAGIC_64, FatArch32, FatArch64, FatHeader};
use machwalk::mach::header::{Ctx, Header, MH_DYLIB, MH_EXECUTE, MH_MAGIC, MH_MAGIC_64};
use machwalk::mach::load_command::*;
use machwalk::mach::symbols::{Nlist32, Nlist64};
use scroll::Endian;

pub const TEXT_BYTES: [u8; 16] = [0xcc; 16];

fn pad(data: &mut Vec<u8>, fixed: usize, align: usize) {
    while (fixed + data.len()) % align != 0 {
        data.push(0);
    }
}

/// A symbol to place in the table: name, type, section, value
#[derive(Debug, Clone)]
pub struct Sym {
    pub name: &'static str,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_value: u64,
}

pub fn sym(name: &'static str, n_type: u8, n_sect: u8, n_value: u64) -> Sym {
    Sym {
        name,
        n_type,
        n_sect,
        n_value,
    }
}

#[derive(Debug, Clone, Default)]
struct Symbols {
    locals: Vec<Sym>,
    external: Vec<Sym>,
    undefined: Vec<Sym>,
    toc: Vec<DylibTableOfContents>,
}

/// Builds one thin image: a header, a `__TEXT` segment with a single `__text` section, the
/// requested load commands, and optionally a symbol table placed after the section contents
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    pub ctx: Ctx,
    pub cputype: u32,
    pub filetype: u32,
    /// Free bytes between the end of the load commands and the `__text` contents
    pub slack: usize,
    commands: Vec<Vec<u8>>,
    symbols: Option<Symbols>,
}

impl ImageBuilder {
    pub fn new(is_64: bool, endian: Endian, filetype: u32) -> Self {
        ImageBuilder {
            ctx: Ctx { is_64, endian },
            cputype: if is_64 { CPU_TYPE_X86_64 } else { CPU_TYPE_X86 },
            filetype,
            slack: 256,
            commands: Vec::new(),
            symbols: None,
        }
    }

    /// A 64-bit little endian executable
    pub fn executable() -> Self {
        Self::new(true, scroll::LE, MH_EXECUTE)
    }

    /// A 64-bit little endian dylib identifying itself as `install_name`
    pub fn dylib(install_name: &str) -> Self {
        Self::new(true, scroll::LE, MH_DYLIB).id_dylib(install_name)
    }

    pub fn slack(mut self, slack: usize) -> Self {
        self.slack = slack;
        self
    }

    pub fn cputype(mut self, cputype: u32) -> Self {
        self.cputype = cputype;
        self
    }

    fn align(&self) -> usize {
        self.ctx.pointer_size()
    }

    fn string_command<T: Packed>(&self, record: impl FnOnce(u32, u32) -> T, name: &str) -> Vec<u8> {
        let fixed = codec::sizeof::<T>();
        let mut data = name.as_bytes().to_vec();
        data.push(0);
        pad(&mut data, fixed, self.align());
        let value = record((fixed + data.len()) as u32, fixed as u32);
        let mut bytes = codec::encode(&value, self.ctx.endian).unwrap();
        bytes.extend_from_slice(&data);
        bytes
    }

    pub fn dylib_command(mut self, cmd: u32, name: &str) -> Self {
        let bytes = self.string_command(
            |cmdsize, offset| DylibCommand {
                cmd,
                cmdsize,
                dylib: Dylib {
                    name: offset,
                    timestamp: 2,
                    current_version: 0x10000,
                    compatibility_version: 0x10000,
                },
            },
            name,
        );
        self.commands.push(bytes);
        self
    }

    pub fn id_dylib(self, name: &str) -> Self {
        self.dylib_command(LC_ID_DYLIB, name)
    }

    pub fn load_dylib(self, name: &str) -> Self {
        self.dylib_command(LC_LOAD_DYLIB, name)
    }

    pub fn weak_dylib(self, name: &str) -> Self {
        self.dylib_command(LC_LOAD_WEAK_DYLIB, name)
    }

    pub fn reexport_dylib(self, name: &str) -> Self {
        self.dylib_command(LC_REEXPORT_DYLIB, name)
    }

    pub fn rpath(mut self, path: &str) -> Self {
        let bytes = self.string_command(
            |cmdsize, offset| RpathCommand {
                cmd: LC_RPATH,
                cmdsize,
                path: offset,
            },
            path,
        );
        self.commands.push(bytes);
        self
    }

    pub fn dylinker(mut self, name: &str) -> Self {
        let bytes = self.string_command(
            |cmdsize, offset| DylinkerCommand {
                cmd: LC_LOAD_DYLINKER,
                cmdsize,
                name: offset,
            },
            name,
        );
        self.commands.push(bytes);
        self
    }

    pub fn uuid(mut self, uuid: [u8; 16]) -> Self {
        let command = UuidCommand {
            cmd: LC_UUID,
            cmdsize: SIZEOF_UUID_COMMAND as u32,
            uuid,
        };
        self.commands.push(codec::encode(&command, self.ctx.endian).unwrap());
        self
    }

    /// Any command, given its kind and the payload after the 8 byte header
    pub fn raw_command(mut self, cmd: u32, payload: &[u8]) -> Self {
        let header = LoadCommandHeader {
            cmd,
            cmdsize: (SIZEOF_LOAD_COMMAND + payload.len()) as u32,
        };
        let mut bytes = codec::encode(&header, self.ctx.endian).unwrap();
        bytes.extend_from_slice(payload);
        self.commands.push(bytes);
        self
    }

    /// Adds LC_SYMTAB and LC_DYSYMTAB describing these three runs, in this order
    pub fn symbols(mut self, locals: Vec<Sym>, external: Vec<Sym>, undefined: Vec<Sym>) -> Self {
        self.symbols = Some(Symbols {
            locals,
            external,
            undefined,
            toc: Vec::new(),
        });
        self
    }

    /// A dylib table of contents; requires [`ImageBuilder::symbols`]
    pub fn toc(mut self, toc: Vec<DylibTableOfContents>) -> Self {
        if let Some(ref mut symbols) = self.symbols {
            symbols.toc = toc;
        }
        self
    }

    fn segment_size(&self) -> usize {
        if self.ctx.is_64 {
            SIZEOF_SEGMENT_COMMAND_64 + SIZEOF_SECTION_64
        } else {
            SIZEOF_SEGMENT_COMMAND_32 + SIZEOF_SECTION_32
        }
    }

    fn name16(name: &str) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        bytes
    }

    fn segment(&self, text_offset: usize, file_size: usize) -> Vec<u8> {
        let endian = self.ctx.endian;
        let segname = Self::name16("__TEXT");
        let sectname = Self::name16("__text");
        if self.ctx.is_64 {
            let segment = SegmentCommand64 {
                cmd: LC_SEGMENT_64,
                cmdsize: self.segment_size() as u32,
                segname,
                vmaddr: 0x1_0000_0000,
                vmsize: 0x4000,
                fileoff: 0,
                filesize: file_size as u64,
                maxprot: 5,
                initprot: 5,
                nsects: 1,
                flags: 0,
            };
            let section = Section64 {
                sectname,
                segname,
                addr: 0x1_0000_0000 + text_offset as u64,
                size: TEXT_BYTES.len() as u64,
                offset: text_offset as u32,
                align: 4,
                flags: 0x8000_0400,
                ..Default::default()
            };
            let mut bytes = codec::encode(&segment, endian).unwrap();
            bytes.extend(codec::encode(&section, endian).unwrap());
            bytes
        } else {
            let segment = SegmentCommand32 {
                cmd: LC_SEGMENT,
                cmdsize: self.segment_size() as u32,
                segname,
                vmaddr: 0x1000,
                vmsize: 0x4000,
                fileoff: 0,
                filesize: file_size as u32,
                maxprot: 5,
                initprot: 5,
                nsects: 1,
                flags: 0,
            };
            let section = Section32 {
                sectname,
                segname,
                addr: 0x1000 + text_offset as u32,
                size: TEXT_BYTES.len() as u32,
                offset: text_offset as u32,
                align: 4,
                flags: 0x8000_0400,
                ..Default::default()
            };
            let mut bytes = codec::encode(&segment, endian).unwrap();
            bytes.extend(codec::encode(&section, endian).unwrap());
            bytes
        }
    }

    /// Offset of the `__text` contents in the built image
    pub fn text_offset(&self) -> usize {
        let symbol_commands = if self.symbols.is_some() {
            SIZEOF_SYMTAB_COMMAND + SIZEOF_DYSYMTAB_COMMAND
        } else {
            0
        };
        let commands: usize = self.commands.iter().map(Vec::len).sum();
        let end = self.ctx.header_size() + self.segment_size() + commands + symbol_commands + self.slack;
        end.next_multiple_of(16)
    }

    pub fn build(&self) -> Vec<u8> {
        let endian = self.ctx.endian;
        let text_offset = self.text_offset();
        let mut tail = TEXT_BYTES.to_vec();
        let mut symbol_commands = Vec::new();
        if let Some(ref symbols) = self.symbols {
            let all: Vec<&Sym> = symbols
                .locals
                .iter()
                .chain(&symbols.external)
                .chain(&symbols.undefined)
                .collect();
            let mut strings = vec![0u8];
            let mut strx = Vec::with_capacity(all.len());
            for sym in &all {
                if sym.name.is_empty() {
                    strx.push(0);
                } else {
                    strx.push(strings.len() as u32);
                    strings.extend_from_slice(sym.name.as_bytes());
                    strings.push(0);
                }
            }
            while strings.len() % 8 != 0 {
                strings.push(0);
            }
            let symoff = text_offset + tail.len();
            for (sym, n_strx) in all.iter().zip(strx) {
                let record = if self.ctx.is_64 {
                    codec::encode(
                        &Nlist64 {
                            n_strx,
                            n_type: sym.n_type,
                            n_sect: sym.n_sect,
                            n_desc: 0,
                            n_value: sym.n_value,
                        },
                        endian,
                    )
                } else {
                    codec::encode(
                        &Nlist32 {
                            n_strx,
                            n_type: sym.n_type,
                            n_sect: sym.n_sect,
                            n_desc: 0,
                            n_value: sym.n_value as u32,
                        },
                        endian,
                    )
                };
                tail.extend(record.unwrap());
            }
            let stroff = text_offset + tail.len();
            tail.extend_from_slice(&strings);
            let tocoff = if symbols.toc.is_empty() {
                0
            } else {
                let tocoff = text_offset + tail.len();
                for entry in &symbols.toc {
                    tail.extend(codec::encode(entry, endian).unwrap());
                }
                tocoff
            };
            let symtab = SymtabCommand {
                cmd: LC_SYMTAB,
                cmdsize: SIZEOF_SYMTAB_COMMAND as u32,
                symoff: symoff as u32,
                nsyms: all.len() as u32,
                stroff: stroff as u32,
                strsize: strings.len() as u32,
            };
            let nlocal = symbols.locals.len() as u32;
            let nextdef = symbols.external.len() as u32;
            let dysymtab = DysymtabCommand {
                cmd: LC_DYSYMTAB,
                cmdsize: SIZEOF_DYSYMTAB_COMMAND as u32,
                ilocalsym: 0,
                nlocalsym: nlocal,
                iextdefsym: nlocal,
                nextdefsym: nextdef,
                iundefsym: nlocal + nextdef,
                nundefsym: symbols.undefined.len() as u32,
                tocoff: tocoff as u32,
                ntoc: symbols.toc.len() as u32,
                ..Default::default()
            };
            symbol_commands.extend(codec::encode(&symtab, endian).unwrap());
            symbol_commands.extend(codec::encode(&dysymtab, endian).unwrap());
        }

        let file_size = text_offset + tail.len();
        let mut region = self.segment(text_offset, file_size);
        for command in &self.commands {
            region.extend_from_slice(command);
        }
        region.extend_from_slice(&symbol_commands);
        let ncmds = 1 + self.commands.len() + if self.symbols.is_some() { 2 } else { 0 };

        let header = Header {
            magic: if self.ctx.is_64 { MH_MAGIC_64 } else { MH_MAGIC },
            cputype: self.cputype,
            cpusubtype: 3,
            filetype: self.filetype,
            ncmds: ncmds as u32,
            sizeofcmds: region.len() as u32,
            flags: 0x85,
            reserved: 0,
        };
        let mut image = header.to_bytes(self.ctx).unwrap();
        image.extend_from_slice(&region);
        image.resize(text_offset, 0);
        image.extend_from_slice(&tail);
        image
    }
}

const SLICE_ALIGN: u32 = 12;

/// A fat archive holding `slices`, each `(cputype, image)`, at 4K aligned offsets
pub fn fat(slices: &[(u32, Vec<u8>)], wide: bool) -> Vec<u8> {
    let entry_size = if wide {
        codec::sizeof::<FatArch64>()
    } else {
        codec::sizeof::<FatArch32>()
    };
    let header = FatHeader {
        magic: if wide { FAT_MAGIC_64 } else { FAT_MAGIC },
        nfat_arch: slices.len() as u32,
    };
    let mut bytes = codec::encode(&header, scroll::BE).unwrap();
    let mut offset = (codec::sizeof::<FatHeader>() + entry_size * slices.len()).next_multiple_of(1 << SLICE_ALIGN);
    let mut offsets = Vec::new();
    for (cputype, image) in slices {
        let entry = if wide {
            codec::encode(
                &FatArch64 {
                    cputype: *cputype,
                    cpusubtype: 3,
                    offset: offset as u64,
                    size: image.len() as u64,
                    align: SLICE_ALIGN,
                    reserved: 0,
                },
                scroll::BE,
            )
        } else {
            codec::encode(
                &FatArch32 {
                    cputype: *cputype,
                    cpusubtype: 3,
                    offset: offset as u32,
                    size: image.len() as u32,
                    align: SLICE_ALIGN,
                },
                scroll::BE,
            )
        };
        bytes.extend(entry.unwrap());
        offsets.push(offset);
        offset = (offset + image.len()).next_multiple_of(1 << SLICE_ALIGN);
    }
    for ((_, image), offset) in slices.iter().zip(offsets) {
        bytes.resize(offset, 0);
        bytes.extend_from_slice(image);
    }
    bytes
}

/// Writes `bytes` to `dir/name`, creating parent directories
pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Installs a stderr logger once per test binary, quiet unless `RUST_LOG_LEVEL` asks otherwise
pub fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let verbosity = std::env::var("RUST_LOG_LEVEL")
            .ok()
            .and_then(|level| level.parse::<usize>().ok())
            .unwrap_or(0);
        let _ = stderrlog::new().verbosity(verbosity).init();
    });
}

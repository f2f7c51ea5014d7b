//! "Nlist" style symbols in this binary - beware, like most symbol tables in most binary formats, they are strippable, and should not be relied upon.
//!
//! Symbols are essentially a type, offset, and the symbol name. When a dynamic symbol table
//! command is present it partitions the symbol list into local, external-defined and undefined
//! runs; those runs are exposed as views into the one decoded list.

use core::fmt::{self, Debug};
use core::ops::Range;

use crate::codec::{self, ByteSource, Packed};
use crate::error;
use crate::mach::MachO;
use crate::mach::load_command::{DylibTableOfContents, DysymtabCommand, SymtabCommand};
use crate::strtab::Strtab;

// The n_type field really contains four fields which are used via the following masks.
/// if any of these bits set, a symbolic debugging entry
pub const N_STAB: u8 = 0xe0;
/// private external symbol bit
pub const N_PEXT: u8 = 0x10;
/// mask for the type bits
pub const N_TYPE: u8 = 0x0e;
/// external symbol bit, set for external symbols
pub const N_EXT: u8 = 0x01;

// If the type is N_SECT then the n_sect field contains an ordinal of the
// section the symbol is defined in.
/// undefined, n_sect == NO_SECT
pub const N_UNDF: u8 = 0x0;
/// absolute, n_sect == NO_SECT
pub const N_ABS: u8 = 0x2;
/// defined in section number n_sect
pub const N_SECT: u8 = 0xe;
/// prebound undefined (defined in a dylib)
pub const N_PBUD: u8 = 0xc;
/// indirect
pub const N_INDR: u8 = 0xa;

/// symbol is not in any section
pub const NO_SECT: u8 = 0;

pub fn n_type_to_str(n_type: u8) -> &'static str {
    match n_type {
        N_UNDF => "N_UNDF",
        N_ABS => "N_ABS",
        N_SECT => "N_SECT",
        N_PBUD => "N_PBUD",
        N_INDR => "N_INDR",
        _ => "UNKNOWN_N_TYPE",
    }
}

packed! {
    pub struct Nlist32 {
        /// index into the string table
        pub n_strx: u32,
        /// type flag, see below
        pub n_type: u8,
        /// section number or NO_SECT
        pub n_sect: u8,
        /// see <mach-o/stab.h>
        pub n_desc: u16,
        /// value of this symbol (or stab offset)
        pub n_value: u32,
    }
}

pub const SIZEOF_NLIST_32: usize = Nlist32::DESCRIPTOR.size();

packed! {
    pub struct Nlist64 {
        /// index into the string table
        pub n_strx: u32,
        /// type flag, see below
        pub n_type: u8,
        /// section number or NO_SECT
        pub n_sect: u8,
        /// see <mach-o/stab.h>
        pub n_desc: u16,
        /// value of this symbol (or stab offset)
        pub n_value: u64,
    }
}

pub const SIZEOF_NLIST_64: usize = Nlist64::DESCRIPTOR.size();

/// A unified 32/64-bit symbol record
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Nlist {
    /// index into the string table; 0 is the empty name
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u64,
}

impl Nlist {
    /// Gets this symbol's type in bits 0xe
    pub fn get_type(&self) -> u8 {
        self.n_type & N_TYPE
    }

    /// Gets the str representation of the type of this symbol
    pub fn type_str(&self) -> &'static str {
        n_type_to_str(self.get_type())
    }

    /// Whether this symbol is global or not
    pub fn is_global(&self) -> bool {
        self.n_type & N_EXT != 0
    }

    /// Whether this symbol is weak or not
    pub fn is_weak(&self) -> bool {
        self.n_desc & (N_WEAK_REF | N_WEAK_DEF) != 0
    }

    /// Whether this symbol is undefined or not
    pub fn is_undefined(&self) -> bool {
        self.n_sect == NO_SECT && self.get_type() == N_UNDF
    }

    /// Whether this symbol is a symbolic debugging entry
    pub fn is_stab(&self) -> bool {
        self.n_type & N_STAB != 0
    }
}

/// symbol is weak referenced
pub const N_WEAK_REF: u16 = 0x40;
/// coalesced symbol is a weak definition
pub const N_WEAK_DEF: u16 = 0x80;

impl Debug for Nlist {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Nlist")
            .field("n_strx", &format_args!("{:04}", self.n_strx))
            .field("n_type", &format_args!("{:#02x}", self.n_type))
            .field("n_sect", &format_args!("{:#x}", self.n_sect))
            .field("n_desc", &format_args!("{:#03x}", self.n_desc))
            .field("n_value", &format_args!("{:#x}", self.n_value))
            .finish()
    }
}

impl From<Nlist32> for Nlist {
    fn from(nlist: Nlist32) -> Self {
        Nlist {
            n_strx: nlist.n_strx,
            n_type: nlist.n_type,
            n_sect: nlist.n_sect,
            n_desc: nlist.n_desc,
            n_value: u64::from(nlist.n_value),
        }
    }
}

impl From<Nlist64> for Nlist {
    fn from(nlist: Nlist64) -> Self {
        Nlist {
            n_strx: nlist.n_strx,
            n_type: nlist.n_type,
            n_sect: nlist.n_sect,
            n_desc: nlist.n_desc,
            n_value: nlist.n_value,
        }
    }
}

/// A symbol record paired with its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub nlist: Nlist,
}

/// The symbol table of one image, plus the partition its dynamic symbol table describes
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub symtab: Option<SymtabCommand>,
    pub dysymtab: Option<DysymtabCommand>,
    symbols: Vec<Symbol>,
    locals: Range<usize>,
    external_defined: Range<usize>,
    undefined: Range<usize>,
    toc: Option<Vec<DylibTableOfContents>>,
}

impl SymbolTable {
    /// Reads the symbol table of `macho` from `source`, the file that image was parsed from.
    /// An image without a symbol table command yields an empty table.
    pub fn read<S: ByteSource + ?Sized>(source: &mut S, macho: &MachO) -> error::Result<Self> {
        let symtab = macho.symtab().copied();
        let dysymtab = macho.dysymtab().copied();
        let symbols = match symtab {
            Some(ref symtab) => read_symbols(source, macho, symtab)?,
            None => Vec::new(),
        };
        let mut table = SymbolTable {
            symtab,
            dysymtab,
            symbols,
            ..Default::default()
        };
        if let Some(ref dysymtab) = dysymtab {
            table.partition(dysymtab)?;
            if dysymtab.tocoff != 0 {
                source.seek(macho.offset + u64::from(dysymtab.tocoff))?;
                let mut toc = Vec::with_capacity(dysymtab.ntoc.min(4096) as usize);
                for _ in 0..dysymtab.ntoc {
                    toc.push(codec::decode::<DylibTableOfContents, _>(source, macho.ctx.endian)?);
                }
                table.toc = Some(toc);
            }
        }
        log::debug!(
            "read {} symbols ({} local, {} external, {} undefined)",
            table.symbols.len(),
            table.locals.len(),
            table.external_defined.len(),
            table.undefined.len()
        );
        Ok(table)
    }

    fn partition(&mut self, dysymtab: &DysymtabCommand) -> error::Result<()> {
        let nsyms = self.symbols.len();
        let range = |index: u32, count: u32, what: &str| -> error::Result<Range<usize>> {
            let start = index as usize;
            let end = start.checked_add(count as usize).filter(|end| *end <= nsyms);
            match end {
                Some(end) => Ok(start..end),
                None => Err(error::Error::Malformed(format!(
                    "{what} symbols {start}+{count} run past the {nsyms} symbol table entries"
                ))),
            }
        };
        let locals = range(dysymtab.ilocalsym, dysymtab.nlocalsym, "local")?;
        let external_defined = range(dysymtab.iextdefsym, dysymtab.nextdefsym, "external defined")?;
        let undefined = range(dysymtab.iundefsym, dysymtab.nundefsym, "undefined")?;
        let mut runs = [&locals, &external_defined, &undefined];
        runs.sort_by_key(|run| run.start);
        for pair in runs.windows(2) {
            if !pair[0].is_empty() && !pair[1].is_empty() && pair[0].end > pair[1].start {
                return Err(error::Error::Malformed(format!(
                    "symbol runs {:?} and {:?} overlap",
                    pair[0], pair[1]
                )));
            }
        }
        self.locals = locals;
        self.external_defined = external_defined;
        self.undefined = undefined;
        Ok(())
    }

    /// Every symbol, in table order
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The local symbols; empty without a dynamic symbol table
    pub fn locals(&self) -> &[Symbol] {
        &self.symbols[self.locals.clone()]
    }

    /// The externally defined symbols; empty without a dynamic symbol table
    pub fn external_defined(&self) -> &[Symbol] {
        &self.symbols[self.external_defined.clone()]
    }

    /// The undefined symbols; empty without a dynamic symbol table
    pub fn undefined(&self) -> &[Symbol] {
        &self.symbols[self.undefined.clone()]
    }

    /// Index ranges of the local, external-defined and undefined runs
    pub fn partition_ranges(&self) -> [Range<usize>; 3] {
        [
            self.locals.clone(),
            self.external_defined.clone(),
            self.undefined.clone(),
        ]
    }

    /// The dylib table of contents, when the dynamic symbol table locates one
    pub fn toc(&self) -> Option<&[DylibTableOfContents]> {
        self.toc.as_deref()
    }
}

fn read_symbols<S: ByteSource + ?Sized>(
    source: &mut S,
    macho: &MachO,
    symtab: &SymtabCommand,
) -> error::Result<Vec<Symbol>> {
    source.seek(macho.offset + u64::from(symtab.stroff))?;
    let strings = codec::read_bytes(source, symtab.strsize as usize, "string table")?;
    let strtab = Strtab::new(&strings);

    source.seek(macho.offset + u64::from(symtab.symoff))?;
    let mut symbols = Vec::with_capacity(symtab.nsyms.min(1 << 16) as usize);
    for _ in 0..symtab.nsyms {
        let nlist: Nlist = if macho.ctx.is_64 {
            codec::decode::<Nlist64, _>(source, macho.ctx.endian)?.into()
        } else {
            codec::decode::<Nlist32, _>(source, macho.ctx.endian)?.into()
        };
        let name = if nlist.n_strx == 0 {
            String::new()
        } else {
            String::from_utf8_lossy(strtab.get_bytes(nlist.n_strx as usize)?).into_owned()
        };
        symbols.push(Symbol { name, nlist });
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nlist_sizes() {
        assert_eq!(SIZEOF_NLIST_32, 12);
        assert_eq!(SIZEOF_NLIST_64, 16);
    }

    #[test]
    fn nlist_classification() {
        let undefined = Nlist {
            n_strx: 4,
            n_type: N_UNDF | N_EXT,
            ..Default::default()
        };
        assert!(undefined.is_undefined());
        assert!(undefined.is_global());
        assert!(!undefined.is_stab());
        assert_eq!(undefined.type_str(), "N_UNDF");

        let defined = Nlist {
            n_type: N_SECT,
            n_sect: 1,
            n_desc: N_WEAK_DEF,
            n_value: 0x1000,
            ..Default::default()
        };
        assert!(!defined.is_undefined());
        assert!(!defined.is_global());
        assert!(defined.is_weak());
        assert_eq!(defined.type_str(), "N_SECT");

        let stab = Nlist {
            n_type: 0x24,
            ..Default::default()
        };
        assert!(stab.is_stab());
    }

    fn table_of(count: usize) -> SymbolTable {
        SymbolTable {
            symbols: (0..count)
                .map(|i| Symbol {
                    name: format!("_sym{i}"),
                    nlist: Nlist::default(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn partition_views() {
        let mut table = table_of(5);
        let dysymtab = DysymtabCommand {
            ilocalsym: 0,
            nlocalsym: 2,
            iextdefsym: 2,
            nextdefsym: 1,
            iundefsym: 3,
            nundefsym: 2,
            ..Default::default()
        };
        table.partition(&dysymtab).unwrap();
        assert_eq!(table.locals().len(), 2);
        assert_eq!(table.external_defined()[0].name, "_sym2");
        assert_eq!(table.undefined()[1].name, "_sym4");
        assert_eq!(table.partition_ranges(), [0..2, 2..3, 3..5]);
    }

    #[test]
    fn bad_partitions_are_malformed() {
        let mut table = table_of(3);
        let past_end = DysymtabCommand {
            iundefsym: 2,
            nundefsym: 2,
            ..Default::default()
        };
        assert!(matches!(table.partition(&past_end), Err(error::Error::Malformed(_))));

        let overlapping = DysymtabCommand {
            ilocalsym: 0,
            nlocalsym: 2,
            iextdefsym: 1,
            nextdefsym: 2,
            ..Default::default()
        };
        assert!(matches!(table.partition(&overlapping), Err(error::Error::Malformed(_))));
        assert!(table.locals().is_empty());
    }
}

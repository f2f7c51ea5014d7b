mod common;

use common::{ImageBuilder, sym};
use machwalk::codec::SliceSource;
use machwalk::error::Error;
use machwalk::mach::MachFile;
use machwalk::mach::cputype::{CPU_TYPE_POWERPC, CPU_TYPE_X86_64};
use machwalk::mach::header::{MH_DYLIB, MH_EXECUTE};
use machwalk::mach::load_command::{DylibTableOfContents, LC_SYMTAB};
use machwalk::mach::symbols::{N_EXT, N_SECT, N_UNDF, SymbolTable};
use machwalk::options::ParseOptions;

fn with_symbols(builder: ImageBuilder) -> ImageBuilder {
    builder.symbols(
        vec![sym("", N_SECT, 1, 0x10), sym("_counter", N_SECT, 1, 0x20)],
        vec![sym("_main", N_SECT | N_EXT, 1, 0x1f00), sym("_helper", N_SECT | N_EXT, 1, 0x1f40)],
        vec![sym("_printf", N_UNDF | N_EXT, 0, 0)],
    )
}

#[test]
fn partitions_in_every_layout() {
    for is_64 in [false, true] {
        for endian in [scroll::LE, scroll::BE] {
            let bytes = with_symbols(ImageBuilder::new(is_64, endian, MH_EXECUTE)).build();
            let file = MachFile::parse(&bytes, &ParseOptions::default()).unwrap();
            let table = SymbolTable::read(&mut SliceSource::new(&bytes), &file.headers[0]).unwrap();

            assert_eq!(table.len(), 5);
            let names: Vec<_> = table.symbols().iter().map(|symbol| symbol.name.as_str()).collect();
            assert_eq!(names, ["", "_counter", "_main", "_helper", "_printf"]);
            assert_eq!(table.symbols()[0].nlist.n_strx, 0);

            assert_eq!(table.locals().len(), 2);
            assert!(table.locals().iter().all(|symbol| !symbol.nlist.is_global()));
            let external: Vec<_> = table.external_defined().iter().map(|symbol| symbol.name.as_str()).collect();
            assert_eq!(external, ["_main", "_helper"]);
            assert_eq!(table.external_defined()[0].nlist.n_value, 0x1f00);
            assert_eq!(table.undefined().len(), 1);
            assert!(table.undefined()[0].nlist.is_undefined());
            assert_eq!(table.partition_ranges(), [0..2, 2..4, 4..5]);
            assert!(table.toc().is_none());
            assert_eq!(table.symtab.unwrap().nsyms, 5);
        }
    }
}

#[test]
fn table_of_contents() {
    let toc = vec![
        DylibTableOfContents {
            symbol_index: 2,
            module_index: 0,
        },
        DylibTableOfContents {
            symbol_index: 3,
            module_index: 0,
        },
    ];
    let bytes = with_symbols(ImageBuilder::dylib("/usr/lib/libtoc.dylib"))
        .toc(toc.clone())
        .build();
    let file = MachFile::parse(&bytes, &ParseOptions::default()).unwrap();
    assert_eq!(file.headers[0].filetype(), MH_DYLIB);
    let table = SymbolTable::read(&mut SliceSource::new(&bytes), &file.headers[0]).unwrap();
    assert_eq!(table.toc(), Some(toc.as_slice()));
}

#[test]
fn fat_slices_read_relative_to_their_offset() {
    let thin64 = with_symbols(ImageBuilder::executable()).build();
    let thin32 = with_symbols(ImageBuilder::new(false, scroll::BE, MH_EXECUTE)).build();
    let bytes = common::fat(&[(CPU_TYPE_X86_64, thin64), (CPU_TYPE_POWERPC, thin32)], true);
    let file = MachFile::parse(&bytes, &ParseOptions::default()).unwrap();
    for macho in &file.headers {
        assert!(macho.offset > 0);
        let table = SymbolTable::read(&mut SliceSource::new(&bytes), macho).unwrap();
        assert_eq!(table.undefined()[0].name, "_printf");
    }
}

#[test]
fn images_without_symbols() {
    let bytes = ImageBuilder::executable().build();
    let file = MachFile::parse(&bytes, &ParseOptions::default()).unwrap();
    let table = SymbolTable::read(&mut SliceSource::new(&bytes), &file.headers[0]).unwrap();
    assert!(table.is_empty());
    assert!(table.locals().is_empty());
    assert!(table.symtab.is_none());
}

#[test]
fn string_offsets_past_the_table() {
    let builder = with_symbols(ImageBuilder::executable());
    let mut bytes = builder.build();
    let file = MachFile::parse(&bytes, &ParseOptions::default()).unwrap();
    let symoff = file.headers[0].symtab().unwrap().symoff as usize;
    // point the second symbol's name far past the string table
    let second = symoff + 16;
    bytes[second..second + 4].copy_from_slice(&0xffffu32.to_le_bytes());
    assert!(SymbolTable::read(&mut SliceSource::new(&bytes), &file.headers[0]).is_err());
}

#[test]
fn oversized_string_tables_are_truncated() {
    let mut bytes = with_symbols(ImageBuilder::executable()).build();
    let file = MachFile::parse(&bytes, &ParseOptions::default()).unwrap();
    let symtab = file.headers[0]
        .commands
        .iter()
        .find(|lc| lc.cmd() == LC_SYMTAB)
        .unwrap();
    // strsize follows cmd, cmdsize, symoff, nsyms and stroff
    let strsize = symtab.offset + 20;
    bytes[strsize..strsize + 4].copy_from_slice(&0xffff_fff0u32.to_le_bytes());

    let file = MachFile::parse(&bytes, &ParseOptions::default()).unwrap();
    let err = SymbolTable::read(&mut SliceSource::new(&bytes), &file.headers[0]).unwrap_err();
    assert!(matches!(err, Error::Truncated { what: "string table", needed: 0xffff_fff0, .. }));
}

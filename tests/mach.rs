mod common;

use common::ImageBuilder;
use machwalk::error::Error;
use machwalk::mach::MachFile;
use machwalk::mach::cputype::{CPU_TYPE_ARM64, CPU_TYPE_POWERPC, CPU_TYPE_X86_64};
use machwalk::mach::header::{MH_DYLIB, MH_EXECUTE, SIZEOF_HEADER_64};
use machwalk::mach::load_command::{
    CommandVariant, LC_LOAD_DYLIB, LC_LOAD_WEAK_DYLIB, LC_REEXPORT_DYLIB, LC_UUID,
    SIZEOF_SECTION_64, SIZEOF_SEGMENT_COMMAND_64, SIZEOF_UUID_COMMAND,
};
use machwalk::options::ParseOptions;

const UUID: [u8; 16] = [
    0x5f, 0x1b, 0x2a, 0x11, 0x90, 0x3c, 0x3e, 0x77, 0xa1, 0x08, 0x21, 0x9e, 0x6b, 0x42, 0x0d, 0xe3,
];

fn sample(is_64: bool, endian: scroll::Endian) -> ImageBuilder {
    ImageBuilder::new(is_64, endian, MH_DYLIB)
        .id_dylib("/usr/local/lib/libsample.1.dylib")
        .uuid(UUID)
        .load_dylib("/usr/lib/libSystem.B.dylib")
        .rpath("@loader_path/../lib")
        .weak_dylib("@rpath/libweak.dylib")
        .reexport_dylib("/usr/lib/libc++.1.dylib")
        .load_dylib("/usr/lib/libSystem.B.dylib")
}

#[test]
fn thin_images_in_every_layout() {
    for is_64 in [false, true] {
        for endian in [scroll::LE, scroll::BE] {
            let bytes = sample(is_64, endian).build();
            let machos = machwalk::parse(&bytes, &ParseOptions::default()).unwrap();
            assert_eq!(machos.len(), 1);
            let macho = &machos[0];
            assert_eq!(macho.is_64(), is_64);
            assert_eq!(macho.endian(), endian);
            assert_eq!(macho.filetype(), MH_DYLIB);
            assert_eq!(macho.offset, 0);
            assert_eq!(macho.size, None);
            assert_eq!(macho.header.ncmds as usize, macho.commands.len());
            assert_eq!(macho.commands.len(), 8);
            assert!(macho.commands.iter().all(|lc| lc.is_known()));

            assert_eq!(macho.install_name(), Some("/usr/local/lib/libsample.1.dylib"));
            assert_eq!(macho.rpaths(), ["@loader_path/../lib"]);
            assert_eq!(macho.uuid(), Some(UUID));

            let walked: Vec<_> = macho
                .walk_relocatables()
                .map(|(index, name, lc)| (index, name, lc.cmd()))
                .collect();
            assert_eq!(
                walked,
                [
                    (3, "/usr/lib/libSystem.B.dylib", LC_LOAD_DYLIB),
                    (5, "@rpath/libweak.dylib", LC_LOAD_WEAK_DYLIB),
                    (6, "/usr/lib/libc++.1.dylib", LC_REEXPORT_DYLIB),
                    (7, "/usr/lib/libSystem.B.dylib", LC_LOAD_DYLIB),
                ]
            );
        }
    }
}

#[test]
fn commands_reserialize_byte_for_byte() {
    for is_64 in [false, true] {
        for endian in [scroll::LE, scroll::BE] {
            let bytes = sample(is_64, endian).build();
            let file = MachFile::parse(&bytes, &ParseOptions::default()).unwrap();
            let macho = &file.headers[0];
            let end = macho.ctx.header_size() + macho.header.sizeofcmds as usize;
            assert_eq!(macho.to_bytes().unwrap(), &bytes[..end]);
            for lc in &macho.commands {
                let raw = &bytes[lc.offset..lc.offset + lc.cmdsize()];
                assert_eq!(lc.to_bytes(endian).unwrap(), raw);
            }
        }
    }
}

#[test]
fn segments_and_sections() {
    let builder = sample(true, scroll::LE);
    let bytes = builder.build();
    let macho = &machwalk::parse(&bytes, &ParseOptions::default()).unwrap()[0];
    let segments = macho.segments().unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].name(), "__TEXT");
    assert_eq!(segments[0].filesize as usize, bytes.len());
    assert_eq!(segments[0].sections.len(), 1);
    let text = &segments[0].sections[0];
    assert_eq!(text.name(), "__text");
    assert_eq!(text.segname(), "__TEXT");
    assert_eq!(text.offset as usize, builder.text_offset());
    assert_eq!(macho.low_offset().unwrap(), Some(builder.text_offset() as u64));
}

#[test]
fn unknown_commands_next_to_a_uuid() {
    let bytes = ImageBuilder::executable()
        .uuid(UUID)
        .raw_command(0x7777, &[1, 2, 3, 4, 5, 6, 7, 8])
        .load_dylib("/usr/lib/libSystem.B.dylib")
        .build();
    let unknown_offset = SIZEOF_HEADER_64 + SIZEOF_SEGMENT_COMMAND_64 + SIZEOF_SECTION_64 + SIZEOF_UUID_COMMAND;

    match machwalk::parse(&bytes, &ParseOptions::strict()) {
        Err(Error::UnsupportedLoadCommand { cmd, offset }) => {
            assert_eq!(cmd, 0x7777);
            assert_eq!(offset, unknown_offset);
        }
        other => panic!("expected an unsupported load command, got {other:?}"),
    }

    let macho = &machwalk::parse(&bytes, &ParseOptions::permissive()).unwrap()[0];
    assert_eq!(macho.commands.len(), 4);
    assert_eq!(macho.commands[1].cmd(), LC_UUID);
    let unknown = &macho.commands[2];
    assert!(!unknown.is_known());
    assert!(matches!(unknown.command, CommandVariant::Unknown(_)));
    assert_eq!(unknown.offset, unknown_offset);
    assert_eq!(unknown.data, [1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(macho.uuid(), Some(UUID));
    let names: Vec<_> = macho.walk_relocatables().map(|(_, name, _)| name).collect();
    assert_eq!(names, ["/usr/lib/libSystem.B.dylib"]);
    let end = SIZEOF_HEADER_64 + macho.header.sizeofcmds as usize;
    assert_eq!(macho.to_bytes().unwrap(), &bytes[..end]);
}

#[test]
fn bad_input() {
    match machwalk::parse(&[0u8; 64], &ParseOptions::default()) {
        Err(Error::BadMagic(0)) => (),
        other => panic!("expected a bad magic, got {other:?}"),
    }

    let bytes = ImageBuilder::executable().load_dylib("/usr/lib/libSystem.B.dylib").build();
    match machwalk::parse(&bytes[..SIZEOF_HEADER_64 + 8], &ParseOptions::default()) {
        Err(Error::Truncated { .. }) => (),
        other => panic!("expected a truncation, got {other:?}"),
    }
    assert!(machwalk::parse(&bytes[..2], &ParseOptions::default()).is_err());

    // a first command claiming to be smaller than its own header
    let mut tiny = bytes.clone();
    tiny[SIZEOF_HEADER_64 + 4..SIZEOF_HEADER_64 + 8].copy_from_slice(&4u32.to_le_bytes());
    match machwalk::parse(&tiny, &ParseOptions::default()) {
        Err(Error::Malformed(_)) => (),
        other => panic!("expected a malformed command, got {other:?}"),
    }
}

#[test]
fn fat_archives() {
    let thin64 = sample(true, scroll::LE).build();
    let thin32 = sample(false, scroll::BE).cputype(CPU_TYPE_POWERPC).build();
    for wide in [false, true] {
        let bytes = common::fat(&[(CPU_TYPE_X86_64, thin64.clone()), (CPU_TYPE_POWERPC, thin32.clone())], wide);
        let file = MachFile::parse(&bytes, &ParseOptions::default()).unwrap();
        assert!(file.is_fat());
        let archive = file.fat.as_ref().unwrap();
        assert_eq!(archive.arches.len(), 2);
        assert!(archive.find_cputype(CPU_TYPE_ARM64).is_none());
        let ppc = archive.find_cputype(CPU_TYPE_POWERPC).unwrap();
        assert_eq!(ppc.slice(&bytes).unwrap(), thin32.as_slice());

        assert_eq!(file.headers.len(), 2);
        assert!(file.headers[0].is_64());
        assert_eq!(file.headers[0].offset, 0x1000);
        assert_eq!(file.headers[0].size, Some(thin64.len() as u64));
        assert!(!file.headers[1].is_64());
        assert_eq!(file.headers[1].endian(), scroll::BE);
        assert_eq!(file.headers[1].offset, ppc.offset);

        // both slices carry the same references, reported once
        assert_eq!(
            file.dylib_references(),
            ["/usr/lib/libSystem.B.dylib", "@rpath/libweak.dylib", "/usr/lib/libc++.1.dylib"]
        );
    }
}

#[test]
fn every_source_agrees() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = common::fat(
        &[
            (CPU_TYPE_X86_64, sample(true, scroll::LE).build()),
            (CPU_TYPE_ARM64, ImageBuilder::new(true, scroll::LE, MH_EXECUTE).build()),
        ],
        false,
    );
    let path = common::write(dir.path(), "universal", &bytes);

    let parsed = MachFile::parse(&bytes, &ParseOptions::default()).unwrap();
    let opened = MachFile::open(&path, &ParseOptions::default()).unwrap();
    assert_eq!(opened.path.as_deref(), Some(path.as_path()));
    assert_eq!(opened.headers, parsed.headers);
    assert_eq!(opened.fat, parsed.fat);
    #[cfg(feature = "mmap")]
    {
        let mapped = MachFile::map(&path, &ParseOptions::default()).unwrap();
        assert_eq!(mapped.headers, parsed.headers);
    }

    assert!(MachFile::open(dir.path().join("missing"), &ParseOptions::default()).is_err());
}

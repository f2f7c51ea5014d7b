//! Section, segment and cpu constants from `mach-o/loader.h` and `mach/machine.h`

// Segment and Section Constants

// The flags field of a section structure is separated into two parts a section
// type and section attributes.  The section types are mutually exclusive (it
// can only have one type) but the section attributes are not (it may have more
// than one attribute).
pub const SECTION_TYPE: u32 = 0x000000ff; // 256 section types
pub const SECTION_ATTRIBUTES: u32 = 0xffffff00; //  24 section attributes

// Constants for the type of a section
pub const S_REGULAR: u32 = 0x0; // regular section
pub const S_ZEROFILL: u32 = 0x1; // zero fill on demand section
pub const S_CSTRING_LITERALS: u32 = 0x2; // section with only literal C strings
pub const S_GB_ZEROFILL: u32 = 0xc; // zero fill on demand section (that can be larger than 4 gigabytes)
pub const S_THREAD_LOCAL_ZEROFILL: u32 = 0x12; // thread local zerofill section

/// Whether a section of this `flags` value occupies no bytes in the file
pub fn is_zerofill(flags: u32) -> bool {
    matches!(
        flags & SECTION_TYPE,
        S_ZEROFILL | S_GB_ZEROFILL | S_THREAD_LOCAL_ZEROFILL
    )
}

pub mod cputype {

    pub const CPU_ARCH_MASK: u32 = 0xff000000;
    pub const CPU_ARCH_ABI64: u32 = 0x01000000;
    pub const CPU_ARCH_ABI64_32: u32 = 0x02000000;
    pub const CPU_TYPE_X86: u32 = 7;
    pub const CPU_TYPE_ARM: u32 = 12;
    pub const CPU_TYPE_POWERPC: u32 = 18;
    pub const CPU_TYPE_X86_64: u32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;
    pub const CPU_TYPE_ARM64: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64;
    pub const CPU_TYPE_ARM64_32: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64_32;
    pub const CPU_TYPE_POWERPC64: u32 = CPU_TYPE_POWERPC | CPU_ARCH_ABI64;

    #[inline(always)]
    pub fn cpu_type_to_str(cputype: u32) -> &'static str {
        match cputype {
            CPU_TYPE_ARM64 => "arm64",
            CPU_TYPE_ARM64_32 => "arm64_32",
            CPU_TYPE_X86_64 => "x86_64",
            CPU_TYPE_ARM => "arm",
            CPU_TYPE_X86 => "i386",
            CPU_TYPE_POWERPC => "ppc",
            CPU_TYPE_POWERPC64 => "ppc64",
            _ => "unknown",
        }
    }
}

//! # machwalk, a Mach-o dependency walker and rewriter
//!
//! `machwalk` parses Mach-o executables, dylibs and bundles (thin or fat, 32 or 64 bit,
//! either byte order), lists the libraries each image depends on, resolves those references
//! to files with the same search the dynamic linker performs, walks a whole dependency graph,
//! and rewrites load commands so a bundle can carry its libraries with it.
//!
//! ### Example
//!
//! ```rust,no_run
//! use machwalk::{mach, options::ParseOptions};
//!
//! fn run() -> machwalk::error::Result<()> {
//!     let file = mach::MachFile::open("/bin/ls", &ParseOptions::default())?;
//!     for macho in &file.headers {
//!         for (_, name, _) in macho.walk_relocatables() {
//!             println!("{name}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Feature Usage
//!
//! The only optional feature is `mmap` (on by default), which adds
//! [`codec::MappedSource`] and [`mach::MachFile::map`] on top of `memmap2`.
//!
//! The library never installs a logger; it reports progress through the `log` facade.

#[macro_use]
mod macros;

pub mod codec;
pub mod dyld;
pub mod error;
pub mod graph;
pub mod mach;
pub mod options;
pub mod standalone;
pub mod strtab;

pub use crate::graph::{DependencyGraph, GraphBuilder};
pub use crate::mach::{MachFile, MachO};
pub use crate::options::ParseOptions;

/// Parses every image in `bytes`: the slices of a fat archive, or the single thin image
pub fn parse(bytes: &[u8], options: &options::ParseOptions) -> error::Result<Vec<mach::MachO>> {
    mach::parse(&mut codec::SliceSource::new(bytes), options)
}

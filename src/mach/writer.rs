//! Re-serialization and in-place modification of Mach-O load commands
//!
//! Works like a minimal `install_name_tool`: the string carried by a dylib, rpath or
//! dylinker command can be replaced, the header's command sizes are recomputed, and the
//! modified header and command region are written back over a copy of the original file.
//! Section and segment contents are never moved, so the command region may only grow into
//! the slack space before the first section with file content.

use crate::error;
use crate::mach::load_command::*;
use crate::mach::{MachFile, MachO};

/// The payload for a command whose fixed record is `fixed` bytes: `name`, its NUL, then
/// enough NULs to bring the command size to a multiple of `align`
fn padded_string(name: &str, fixed: usize, align: usize) -> Vec<u8> {
    let mut data = name.as_bytes().to_vec();
    data.push(0);
    pad_to(&mut data, fixed, align);
    data
}

fn pad_to(data: &mut Vec<u8>, fixed: usize, align: usize) {
    while (fixed + data.len()) % align != 0 {
        data.push(0);
    }
}

impl LoadCommand {
    /// The string this command carries, if it is one of the commands whose string can be rewritten
    pub fn string(&self) -> Option<error::Result<&str>> {
        use CommandVariant::*;
        match self.command {
            IdDylib(ref comm)
            | LoadDylib(ref comm)
            | LoadWeakDylib(ref comm)
            | ReexportDylib(ref comm)
            | LazyLoadDylib(ref comm)
            | LoadUpwardDylib(ref comm) => Some(self.lc_str(comm.dylib.name)),
            PreboundDylib(ref comm) => Some(self.lc_str(comm.name)),
            Rpath(ref comm) => Some(self.lc_str(comm.path)),
            LoadDylinker(ref comm) | IdDylinker(ref comm) | DyldEnvironment(ref comm) => {
                Some(self.lc_str(comm.name))
            }
            SubFramework(ref comm) => Some(self.lc_str(comm.umbrella)),
            SubClient(ref comm) => Some(self.lc_str(comm.client)),
            SubUmbrella(ref comm) => Some(self.lc_str(comm.sub_umbrella)),
            SubLibrary(ref comm) => Some(self.lc_str(comm.sub_library)),
            _ => None,
        }
    }

    /// Replaces this command's string with `name`, keeping its size a multiple of `align`.
    /// Returns `false`, leaving the command untouched, when `name` is already the stored string.
    pub fn replace_string(&mut self, name: &str, align: usize) -> error::Result<bool> {
        match self.string() {
            Some(current) => {
                if current? == name {
                    return Ok(false);
                }
            }
            None => {
                return Err(error::Error::Malformed(format!(
                    "{} carries no replaceable string",
                    cmd_to_str(self.cmd())
                )));
            }
        }
        let fixed = self.command.fixed_size();
        let mut data = padded_string(name, fixed, align);
        let name_offset = fixed as u32;
        // the linked module bit vector of a prebound dylib moves to just after the new name
        let modules = match self.command {
            CommandVariant::PreboundDylib(ref comm) => {
                let start = (comm.linked_modules as usize).saturating_sub(fixed);
                let len = (comm.nmodules as usize).div_ceil(8);
                let bytes = self.data.get(start..start.saturating_add(len)).ok_or_else(|| {
                    error::Error::Malformed(format!(
                        "linked modules of {} prebound modules run past their command",
                        comm.nmodules
                    ))
                })?;
                let offset = (fixed + data.len()) as u32;
                data.extend_from_slice(bytes);
                pad_to(&mut data, fixed, align);
                Some(offset)
            }
            _ => None,
        };

        use CommandVariant::*;
        match self.command {
            IdDylib(ref mut comm)
            | LoadDylib(ref mut comm)
            | LoadWeakDylib(ref mut comm)
            | ReexportDylib(ref mut comm)
            | LazyLoadDylib(ref mut comm)
            | LoadUpwardDylib(ref mut comm) => comm.dylib.name = name_offset,
            PreboundDylib(ref mut comm) => {
                comm.name = name_offset;
                if let Some(offset) = modules {
                    comm.linked_modules = offset;
                }
            }
            Rpath(ref mut comm) => comm.path = name_offset,
            LoadDylinker(ref mut comm) | IdDylinker(ref mut comm) | DyldEnvironment(ref mut comm) => {
                comm.name = name_offset
            }
            SubFramework(ref mut comm) => comm.umbrella = name_offset,
            SubClient(ref mut comm) => comm.client = name_offset,
            SubUmbrella(ref mut comm) => comm.sub_umbrella = name_offset,
            SubLibrary(ref mut comm) => comm.sub_library = name_offset,
            _ => (),
        }
        let cmdsize = u32::try_from(fixed + data.len())
            .map_err(|_| error::Error::Malformed(format!("{} byte string does not fit a load command", name.len())))?;
        self.command.set_cmdsize(cmdsize);
        self.data = data;
        Ok(true)
    }
}

impl MachO {
    /// The header followed by every load command, exactly as they would appear in the file
    pub fn to_bytes(&self) -> error::Result<Vec<u8>> {
        let mut bytes = self.header.to_bytes(self.ctx)?;
        bytes.reserve(self.header.sizeofcmds as usize);
        for lc in &self.commands {
            bytes.extend_from_slice(&lc.to_bytes(self.ctx.endian)?);
        }
        Ok(bytes)
    }

    /// Only the load command region
    pub fn command_region(&self) -> error::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.header.sizeofcmds as usize);
        for lc in &self.commands {
            bytes.extend_from_slice(&lc.to_bytes(self.ctx.endian)?);
        }
        Ok(bytes)
    }

    /// Recomputes `ncmds` and `sizeofcmds` from the command list
    fn update_command_sizes(&mut self) {
        self.header.ncmds = self.commands.len() as u32;
        self.header.sizeofcmds = self.commands.iter().map(|lc| lc.cmdsize() as u32).sum();
    }

    /// Replaces the string of the command at `index` with `name`, padded to pointer alignment,
    /// and updates the command and header sizes. Returns whether anything changed.
    pub fn rewrite_data_for_command(&mut self, index: usize, name: &str) -> error::Result<bool> {
        let align = self.ctx.pointer_size();
        let lc = self.commands.get_mut(index).ok_or_else(|| {
            error::Error::Malformed(format!("there is no load command at index {index}"))
        })?;
        let before = lc.cmdsize();
        if !lc.replace_string(name, align)? {
            return Ok(false);
        }
        let after = lc.cmdsize();
        log::debug!("command {index} now holds {name} ({before} -> {after} bytes)");
        self.update_command_sizes();
        if after > before {
            log::warn!(
                "load command region grew by {} bytes to {:#x}",
                after - before,
                self.header.sizeofcmds
            );
        }
        Ok(true)
    }

    /// Replaces the LC_ID_DYLIB name; `false` when there is none or it already is `name`
    pub fn rewrite_install_name(&mut self, name: &str) -> error::Result<bool> {
        let index = self
            .commands
            .iter()
            .position(|lc| matches!(lc.command, CommandVariant::IdDylib(_)));
        match index {
            Some(index) => self.rewrite_data_for_command(index, name),
            None => Ok(false),
        }
    }

    /// Offers the install name and then every dylib reference to `changefunc`; each `Some`
    /// answer replaces that string. Returns whether any command changed.
    pub fn rewrite_load_commands<F>(&mut self, mut changefunc: F) -> error::Result<bool>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut changed = false;
        if let Some(name) = self.install_name().and_then(&mut changefunc) {
            changed |= self.rewrite_install_name(&name)?;
        }
        let updates: Vec<(usize, String)> = self
            .walk_relocatables()
            .filter_map(|(index, name, _)| changefunc(name).map(|name| (index, name)))
            .collect();
        for (index, name) in updates {
            changed |= self.rewrite_data_for_command(index, &name)?;
        }
        Ok(changed)
    }

    /// The smallest file offset, relative to the image, of any section or segment contents
    /// past the header. The command region cannot grow beyond it.
    pub fn low_offset(&self) -> error::Result<Option<u64>> {
        let mut low: Option<u64> = None;
        for segment in self.segments()? {
            let mut candidates = Vec::with_capacity(segment.sections.len() + 1);
            if segment.filesize > 0 && segment.fileoff > 0 {
                candidates.push(segment.fileoff);
            }
            candidates.extend(
                segment
                    .sections
                    .iter()
                    .filter(|section| {
                        !crate::mach::constants::is_zerofill(section.flags) && section.offset > 0
                    })
                    .map(|section| u64::from(section.offset)),
            );
            for offset in candidates {
                low = Some(low.map_or(offset, |low| low.min(offset)));
            }
        }
        Ok(low)
    }
}

impl MachFile {
    /// A copy of `data`, the bytes this file was parsed from, with every image's header
    /// and command region replaced by its current state
    pub fn to_image(&self, data: &[u8]) -> error::Result<Vec<u8>> {
        let mut image = data.to_vec();
        self.write_image(&mut image)?;
        Ok(image)
    }

    /// Writes every image's header and command region over `data` in place
    pub fn write_image(&self, data: &mut [u8]) -> error::Result<()> {
        for macho in &self.headers {
            let bytes = macho.to_bytes()?;
            let start = usize::try_from(macho.offset)
                .map_err(|_| error::Error::Malformed(format!("image offset {:#x} does not fit in memory", macho.offset)))?;
            let image_len = match macho.size {
                Some(size) => size as usize,
                None => data.len().saturating_sub(start),
            };
            let limit = match macho.low_offset()? {
                Some(low) => (low as usize).min(image_len),
                None => image_len,
            };
            if bytes.len() > limit {
                return Err(error::Error::Malformed(format!(
                    "load commands need {:#x} bytes but section data starts at {limit:#x}",
                    bytes.len()
                )));
            }
            let end = start + bytes.len();
            let target = data.get_mut(start..end).ok_or(error::Error::Truncated {
                what: "image header",
                offset: macho.offset,
                needed: bytes.len(),
            })?;
            target.copy_from_slice(&bytes);
            let old_end = start + macho.ctx.header_size() + macho.parsed_sizeofcmds as usize;
            if old_end > end {
                let old_end = old_end.min(data.len());
                data[end..old_end].fill(0);
            }
        }
        Ok(())
    }
}

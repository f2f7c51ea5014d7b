//! Parsing of library and framework references into their parts
//!
//! A dylib reference looks like `Location/Name.SomeVersion_Suffix.dylib`, a framework
//! reference like `Location/Name.framework/Versions/SomeVersion/Name_Suffix`. Both the
//! version and the suffix are optional.

/// The parts of a `.dylib` reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DylibInfo<'a> {
    /// Everything before the file name, without the trailing `/`
    pub location: &'a str,
    /// The file name
    pub name: &'a str,
    pub shortname: &'a str,
    pub version: Option<&'a str>,
    pub suffix: Option<&'a str>,
}

/// The parts of a framework reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameworkInfo<'a> {
    /// The directory holding the `.framework` bundle
    pub location: &'a str,
    /// The bundle-relative name, e.g. `Foo.framework/Versions/A/Foo`
    pub name: &'a str,
    pub shortname: &'a str,
    pub version: Option<&'a str>,
    pub suffix: Option<&'a str>,
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// The final path component of `path`
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

/// Reads an optional `<marker><part>` prefix of `rest`, where `part` is non-empty and holds
/// neither `.` nor `_`. `None` means the marker was present but not followed by a part.
fn optional_part(rest: &str, marker: char) -> Option<(Option<&str>, &str)> {
    match rest.strip_prefix(marker) {
        Some(tail) => {
            let end = tail.find(['.', '_']).unwrap_or(tail.len());
            if end == 0 {
                None
            } else {
                Some((Some(&tail[..end]), &tail[end..]))
            }
        }
        None => Some((None, rest)),
    }
}

/// Splits a `.dylib` reference into its parts; `None` if it is not one
///
/// ```rust
/// use machwalk::dyld::names::dylib_info;
/// let info = dylib_info("P/Foo.A_debug.dylib").unwrap();
/// assert_eq!(info.location, "P");
/// assert_eq!(info.shortname, "Foo");
/// assert_eq!(info.version, Some("A"));
/// assert_eq!(info.suffix, Some("debug"));
/// ```
pub fn dylib_info(path: &str) -> Option<DylibInfo<'_>> {
    let name = basename(path);
    let location = &path[..path.len() - name.len()];
    let location = location.strip_suffix('/').unwrap_or(location);
    let stem = name.strip_suffix(".dylib")?;
    // the shortest run of word characters after which only `.version` and `_suffix` remain
    for (end, c) in stem.char_indices() {
        if !is_word(c) {
            break;
        }
        let shortname = &stem[..end + c.len_utf8()];
        let rest = &stem[shortname.len()..];
        let Some((version, rest)) = optional_part(rest, '.') else {
            continue;
        };
        let Some((suffix, rest)) = optional_part(rest, '_') else {
            continue;
        };
        if rest.is_empty() {
            return Some(DylibInfo {
                location,
                name,
                shortname,
                version,
                suffix,
            });
        }
    }
    None
}

fn is_framework_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Splits a framework reference into its parts; `None` if it is not one
///
/// ```rust
/// use machwalk::dyld::names::framework_info;
/// let info = framework_info("P/F.framework/Versions/A/F_debug").unwrap();
/// assert_eq!(info.location, "P");
/// assert_eq!(info.name, "F.framework/Versions/A/F_debug");
/// assert_eq!(info.version, Some("A"));
/// assert_eq!(info.suffix, Some("debug"));
/// assert!(framework_info("P/F.framework/Versions/A").is_none());
/// ```
pub fn framework_info(path: &str) -> Option<FrameworkInfo<'_>> {
    let mut starts = vec![0];
    starts.extend(path.match_indices('/').map(|(index, _)| index + 1));
    let components: Vec<(usize, &str)> = starts
        .iter()
        .zip(path.split('/'))
        .map(|(start, component)| (*start, component))
        .collect();

    // the rightmost `.framework` component that fits wins
    for (i, &(start, component)) in components.iter().enumerate().rev() {
        let Some(shortname) = component.strip_suffix(".framework") else {
            continue;
        };
        if shortname.is_empty() || !shortname.chars().all(is_framework_char) {
            continue;
        }
        let rest = &components[i + 1..];
        let (version, file) = match rest {
            [(_, file)] => (None, *file),
            [(_, "Versions"), (_, version), (_, file)] if !version.is_empty() => {
                (Some(*version), *file)
            }
            _ => continue,
        };
        let suffix = match file.strip_prefix(shortname) {
            Some("") => None,
            Some(tail) => match tail.strip_prefix('_') {
                Some(suffix) if !suffix.is_empty() && !suffix.contains('_') => Some(suffix),
                _ => continue,
            },
            None => continue,
        };
        let location = if start == 0 { "" } else { &path[..start - 1] };
        return Some(FrameworkInfo {
            location,
            name: &path[start..],
            shortname,
            version,
            suffix,
        });
    }
    None
}

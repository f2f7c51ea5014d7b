//! dyld emulation: resolving a library reference to a file the way the dynamic linker does
//!
//! Candidates are produced in this order, each step only contributing when it applies:
//!
//! 1. `DYLD_FRAMEWORK_PATH` for framework references, then `DYLD_LIBRARY_PATH` with the
//!    reference's file name
//! 2. `@executable_path/` references joined to the executable's directory
//! 3. `@loader_path/` references joined to the referencing binary's directory
//! 4. `@rpath/` references joined to each run path
//! 5. the reference itself, then the fallback framework and library directories
//!
//! With `DYLD_IMAGE_SUFFIX` set, each candidate is preceded by its suffixed variant. The
//! first candidate that is a file, or that the injected shared cache check claims, wins.
//! Failing that, an optional [`FallbackProbe`] gets the last word.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error;

pub mod env;
pub mod names;

pub use self::env::DyldEnv;
pub use self::names::{DylibInfo, FrameworkInfo, dylib_info, framework_info};

const EXECUTABLE_PATH: &str = "@executable_path/";
const LOADER_PATH: &str = "@loader_path/";
const RPATH: &str = "@rpath/";

/// Where a reference is being resolved from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchContext {
    /// Directory of the main executable, for `@executable_path/`
    pub executable_path: Option<PathBuf>,
    /// Directory of the binary holding the reference, for `@loader_path/`
    pub loader_path: Option<PathBuf>,
    /// Run paths in effect, in search order; may themselves start with `@loader_path/`
    /// or `@executable_path/`
    pub rpaths: Vec<String>,
}

impl SearchContext {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_executable_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    pub fn with_loader_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.loader_path = Some(path.into());
        self
    }

    pub fn with_rpaths<I, S>(mut self, rpaths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rpaths.extend(rpaths.into_iter().map(Into::into));
        self
    }

    /// `rpath` with a leading `@loader_path/` or `@executable_path/` replaced;
    /// `None` when the marker's directory is unknown
    pub fn expand_rpath(&self, rpath: &str) -> Option<PathBuf> {
        let marker = |rpath: &str, marker: &str| -> Option<String> {
            let bare = marker.trim_end_matches('/');
            if rpath == bare {
                Some(String::new())
            } else {
                rpath.strip_prefix(marker).map(String::from)
            }
        };
        if let Some(rest) = marker(rpath, LOADER_PATH) {
            return self.loader_path.as_ref().map(|dir| dir.join(rest));
        }
        if let Some(rest) = marker(rpath, EXECUTABLE_PATH) {
            return self.executable_path.as_ref().map(|dir| dir.join(rest));
        }
        Some(PathBuf::from(rpath))
    }
}

/// Lexically removes `.` and folds `name/..` pairs, without touching the filesystem.
/// A `..` directly under the root stays at the root; leading `..` of a relative path are kept.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::Prefix(..) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::Prefix(..) | Component::RootDir) => {}
                _ => normalized.push(".."),
            },
            Component::Normal(name) => normalized.push(name),
        }
    }
    normalized
}

/// Inserts `suffix` before a trailing `.dylib`, or appends it
pub fn with_image_suffix(path: &Path, suffix: &str) -> PathBuf {
    let path = path.to_string_lossy();
    match path.strip_suffix(".dylib") {
        Some(stem) => PathBuf::from(format!("{stem}{suffix}.dylib")),
        None => PathBuf::from(format!("{path}{suffix}")),
    }
}

/// For every path in `paths`, yields its suffixed variant (when a suffix is set) and then the path
pub fn image_suffix_search<'a, I>(paths: I, suffix: Option<&'a str>) -> impl Iterator<Item = PathBuf> + 'a
where
    I: IntoIterator<Item = PathBuf>,
    I::IntoIter: 'a,
{
    paths.into_iter().flat_map(move |path| {
        let suffixed = suffix.map(|suffix| with_image_suffix(&path, suffix));
        suffixed.into_iter().chain(std::iter::once(path))
    })
}

/// A last resort lookup, consulted after every dyld candidate failed
pub trait FallbackProbe: Send + Sync {
    fn probe(&self, name: &str) -> Option<PathBuf>;
}

/// Looks for a library in a Homebrew `opt` tree: `<root>/<shortname>/lib/<name>`, or else the
/// first `<shortname>.*.dylib` in that directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomebrewProbe {
    pub root: PathBuf,
}

impl Default for HomebrewProbe {
    fn default() -> Self {
        HomebrewProbe {
            root: PathBuf::from("/opt/homebrew/opt"),
        }
    }
}

impl HomebrewProbe {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        HomebrewProbe { root: root.into() }
    }
}

impl FallbackProbe for HomebrewProbe {
    fn probe(&self, name: &str) -> Option<PathBuf> {
        let info = dylib_info(name)?;
        let dir = self.root.join(info.shortname).join("lib");
        if !dir.is_dir() {
            return None;
        }
        let exact = dir.join(info.name);
        if exact.is_file() {
            return Some(exact);
        }
        let prefix = format!("{}.", info.shortname);
        let mut versioned: Vec<PathBuf> = fs::read_dir(&dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let file_name = entry.file_name();
                let file_name = file_name.to_string_lossy();
                file_name.starts_with(&prefix) && file_name.ends_with(".dylib")
            })
            .map(|entry| entry.path())
            .collect();
        versioned.sort();
        versioned.into_iter().next()
    }
}

/// Answers whether a path is present in the platform's shared library cache
pub type SharedCacheCheck = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Resolves library references to files
#[derive(Clone)]
pub struct DyldResolver {
    env: DyldEnv,
    shared_cache: Option<SharedCacheCheck>,
    fallback: Option<Arc<dyn FallbackProbe>>,
}

impl std::fmt::Debug for DyldResolver {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("DyldResolver")
            .field("env", &self.env)
            .field("shared_cache", &self.shared_cache.is_some())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Same as [`DyldResolver::from_env`], so `HOME` contributes `~/lib` and
/// `~/Library/Frameworks` to the default fallbacks
impl Default for DyldResolver {
    fn default() -> Self {
        DyldResolver::from_env()
    }
}

impl DyldResolver {
    /// A resolver over `env`, with the default Homebrew probe and no shared cache check
    pub fn new(env: DyldEnv) -> Self {
        DyldResolver {
            env,
            shared_cache: None,
            fallback: Some(Arc::new(HomebrewProbe::default())),
        }
    }

    /// A resolver over the current process environment
    pub fn from_env() -> Self {
        Self::new(DyldEnv::from_env())
    }

    pub fn env(&self) -> &DyldEnv {
        &self.env
    }

    /// Treat every path `check` accepts as present, whether or not it exists on disk
    pub fn with_shared_cache<F>(mut self, check: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.shared_cache = Some(Arc::new(check));
        self
    }

    /// Consult the running system's dyld shared cache
    #[cfg(target_os = "macos")]
    pub fn with_system_shared_cache(self) -> Self {
        self.with_shared_cache(shared_cache::contains_path)
    }

    pub fn with_fallback_probe<P: FallbackProbe + 'static>(mut self, probe: P) -> Self {
        self.fallback = Some(Arc::new(probe));
        self
    }

    pub fn without_fallback_probe(mut self) -> Self {
        self.fallback = None;
        self
    }

    fn override_search<'a>(&'a self, name: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        let framework = framework_info(name).map(|info| info.name);
        let frameworks = framework.into_iter().flat_map(move |framework| {
            self.env
                .framework_path
                .iter()
                .map(move |dir| dir.join(framework))
        });
        let basename = names::basename(name);
        let libraries = self.env.library_path.iter().map(move |dir| dir.join(basename));
        frameworks.chain(libraries)
    }

    fn default_search<'a>(&'a self, name: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        let frameworks = framework_info(name)
            .map(|info| {
                self.env
                    .framework_fallbacks()
                    .into_iter()
                    .map(move |dir| dir.join(info.name))
            })
            .into_iter()
            .flatten();
        let basename = names::basename(name);
        let libraries = self
            .env
            .library_fallbacks()
            .into_iter()
            .map(move |dir| dir.join(basename));
        std::iter::once(PathBuf::from(name))
            .chain(frameworks)
            .chain(libraries)
    }

    /// Every candidate for `name`, in search order, before existence testing
    pub fn search_paths<'a>(
        &'a self,
        name: &'a str,
        context: &'a SearchContext,
    ) -> impl Iterator<Item = PathBuf> + 'a {
        let executable = name
            .strip_prefix(EXECUTABLE_PATH)
            .zip(context.executable_path.as_ref())
            .map(|(rest, dir)| dir.join(rest));
        let loader = name
            .strip_prefix(LOADER_PATH)
            .zip(context.loader_path.as_ref())
            .map(|(rest, dir)| dir.join(rest));
        let rpaths = name
            .strip_prefix(RPATH)
            .map(move |rest| {
                context
                    .rpaths
                    .iter()
                    .filter_map(move |rpath| context.expand_rpath(rpath))
                    .map(move |dir| dir.join(rest))
            })
            .into_iter()
            .flatten();
        let candidates = self
            .override_search(name)
            .chain(executable)
            .chain(loader)
            .chain(rpaths)
            .chain(self.default_search(name));
        image_suffix_search(candidates, self.env.image_suffix.as_deref())
    }

    /// The first candidate for `name` that exists, as an absolute path with `.` and `..`
    /// folded away, so one file always resolves to one path
    pub fn find(&self, name: &str, context: &SearchContext) -> error::Result<PathBuf> {
        for path in self.search_paths(name, context) {
            log::trace!("dyld candidate for {name}: {}", path.display());
            if self.shared_cache.as_ref().is_some_and(|contains| contains(&normalize_path(&path))) {
                log::debug!("{name} is in the shared cache as {}", path.display());
                return Ok(normalize_path(path));
            }
            if path.is_file() {
                log::debug!("{name} resolved to {}", path.display());
                return Ok(normalize_path(std::path::absolute(&path)?));
            }
        }
        if let Some(path) = self.fallback.as_ref().and_then(|probe| probe.probe(name)) {
            log::debug!("{name} found by the fallback probe at {}", path.display());
            return Ok(normalize_path(path));
        }
        Err(error::Error::LibraryNotFound(name.to_string()))
    }

    /// Finds a framework given loosely, e.g. `Python`, `Python.framework` or
    /// `Python.framework/Versions/Current`
    pub fn framework_find(&self, name: &str, context: &SearchContext) -> error::Result<PathBuf> {
        match self.find(name, context) {
            Err(error::Error::LibraryNotFound(_)) => (),
            found => return found,
        }
        let (bundle, index) = match name.rfind(".framework") {
            Some(index) => (name.to_string(), index),
            None => (format!("{name}.framework"), name.len()),
        };
        let shortname = names::basename(&bundle[..index]);
        let candidate = Path::new(&bundle).join(shortname);
        let candidate = candidate.to_string_lossy();
        self.find(&candidate, context).map_err(|err| match err {
            error::Error::LibraryNotFound(_) => error::Error::LibraryNotFound(name.to_string()),
            err => err,
        })
    }
}

#[cfg(target_os = "macos")]
mod shared_cache {
    use std::ffi::{CString, c_char};
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    unsafe extern "C" {
        fn _dyld_shared_cache_contains_path(path: *const c_char) -> bool;
    }

    pub fn contains_path(path: &Path) -> bool {
        match CString::new(path.as_os_str().as_bytes()) {
            // the string is NUL terminated and outlives the call
            Ok(path) => unsafe { _dyld_shared_cache_contains_path(path.as_ptr()) },
            Err(_) => false,
        }
    }
}

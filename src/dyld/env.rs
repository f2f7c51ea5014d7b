//! The `DYLD_*` environment the dynamic linker consults while searching for libraries

use std::ffi::OsStr;
use std::path::PathBuf;

pub const DYLD_IMAGE_SUFFIX: &str = "DYLD_IMAGE_SUFFIX";
pub const DYLD_FRAMEWORK_PATH: &str = "DYLD_FRAMEWORK_PATH";
pub const DYLD_LIBRARY_PATH: &str = "DYLD_LIBRARY_PATH";
pub const DYLD_FALLBACK_FRAMEWORK_PATH: &str = "DYLD_FALLBACK_FRAMEWORK_PATH";
pub const DYLD_FALLBACK_LIBRARY_PATH: &str = "DYLD_FALLBACK_LIBRARY_PATH";

/// Framework directories searched when `DYLD_FALLBACK_FRAMEWORK_PATH` is empty, after `~/Library/Frameworks`
pub const DEFAULT_FRAMEWORK_FALLBACK: [&str; 3] = [
    "/Library/Frameworks",
    "/Network/Library/Frameworks",
    "/System/Library/Frameworks",
];

/// Library directories searched when `DYLD_FALLBACK_LIBRARY_PATH` is empty, after `~/lib`
pub const DEFAULT_LIBRARY_FALLBACK: [&str; 3] = ["/usr/local/lib", "/lib", "/usr/lib"];

/// Splits a colon separated list; an empty value is an empty list
pub fn split_path_list(value: &str) -> Vec<PathBuf> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(':').map(PathBuf::from).collect()
}

/// A snapshot of the dyld search environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DyldEnv {
    /// `DYLD_IMAGE_SUFFIX`; an empty value counts as unset
    pub image_suffix: Option<String>,
    pub framework_path: Vec<PathBuf>,
    pub library_path: Vec<PathBuf>,
    pub fallback_framework_path: Vec<PathBuf>,
    pub fallback_library_path: Vec<PathBuf>,
    /// The home directory the `~` default fallbacks live under
    pub home: Option<PathBuf>,
}

impl DyldEnv {
    /// An environment with nothing set and no home directory, so the default fallbacks
    /// leave out `~/lib` and `~/Library/Frameworks`; [`DyldEnv::from_env`] or
    /// [`DyldEnv::with_home`] bring them back
    pub fn new() -> Self {
        Default::default()
    }

    /// Reads the current process environment
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars_os())
    }

    /// Reads the variables this resolver understands out of `vars`; everything else is ignored
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let mut env = DyldEnv::new();
        for (key, value) in vars {
            let Some(key) = key.as_ref().to_str() else {
                continue;
            };
            let value = value.as_ref().to_string_lossy();
            match key {
                DYLD_IMAGE_SUFFIX => {
                    env.image_suffix = Some(value.into_owned()).filter(|suffix| !suffix.is_empty())
                }
                DYLD_FRAMEWORK_PATH => env.framework_path = split_path_list(&value),
                DYLD_LIBRARY_PATH => env.library_path = split_path_list(&value),
                DYLD_FALLBACK_FRAMEWORK_PATH => env.fallback_framework_path = split_path_list(&value),
                DYLD_FALLBACK_LIBRARY_PATH => env.fallback_library_path = split_path_list(&value),
                "HOME" if !value.is_empty() => env.home = Some(PathBuf::from(value.into_owned())),
                _ => (),
            }
        }
        env
    }

    pub fn with_image_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.image_suffix = Some(suffix.into()).filter(|suffix| !suffix.is_empty());
        self
    }

    pub fn with_home<P: Into<PathBuf>>(mut self, home: P) -> Self {
        self.home = Some(home.into());
        self
    }

    /// `DYLD_FALLBACK_FRAMEWORK_PATH`, or the default framework directories when it is empty
    pub fn framework_fallbacks(&self) -> Vec<PathBuf> {
        if !self.fallback_framework_path.is_empty() {
            return self.fallback_framework_path.clone();
        }
        let home = self.home.iter().map(|home| home.join("Library/Frameworks"));
        home.chain(DEFAULT_FRAMEWORK_FALLBACK.iter().map(PathBuf::from))
            .collect()
    }

    /// `DYLD_FALLBACK_LIBRARY_PATH`, or the default library directories when it is empty
    pub fn library_fallbacks(&self) -> Vec<PathBuf> {
        if !self.fallback_library_path.is_empty() {
            return self.fallback_library_path.clone();
        }
        let home = self.home.iter().map(|home| home.join("lib"));
        home.chain(DEFAULT_LIBRARY_FALLBACK.iter().map(PathBuf::from))
            .collect()
    }
}

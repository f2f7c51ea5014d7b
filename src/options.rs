//! Parsing options for Mach-o containers
//!
//! The only policy a caller can pick today is what happens when a load command
//! kind is not recognized. Strict parsing (the default) fails; permissive parsing
//! keeps the command as an opaque payload so it survives a rewrite.

/// Common parsing options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseOptions {
    /// Keep unrecognized load commands as `CommandVariant::Unknown` instead of failing
    pub allow_unknown_load_commands: bool,
}

impl ParseOptions {
    /// Create new ParseOptions with default settings
    pub fn new() -> Self {
        Default::default()
    }

    /// Create ParseOptions which tolerate unknown load commands
    pub fn permissive() -> Self {
        ParseOptions {
            allow_unknown_load_commands: true,
        }
    }

    /// Create ParseOptions which reject unknown load commands
    pub fn strict() -> Self {
        ParseOptions {
            allow_unknown_load_commands: false,
        }
    }

    /// Set the unknown load command policy
    pub fn with_unknown_load_commands(mut self, allow: bool) -> Self {
        self.allow_unknown_load_commands = allow;
        self
    }
}

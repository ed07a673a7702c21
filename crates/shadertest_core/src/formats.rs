//! Output format vocabulary.
//!
//! This registry defines the canonical set of output formats the conformance runner can request from the compiler.
//! Callers should avoid hard-coding format strings and instead use [`OutputFormat`] for identity.
//!
//! ## Notes
//! - The declaration order of [`OutputFormat::ALL`] is the canonical column order: results are scheduled,
//!   aggregated and reported in that order.
//! - Matching of user-supplied names is **case-sensitive**.

use std::fmt;

use thiserror::Error;

/// Stable identifier for an output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OutputFormat {
    /// The compiler's own source language (round-tripped).
    Wgsl,
    /// SPIR-V assembly.
    Spvasm,
    /// Metal shading language.
    Msl,
    /// HLSL validated with the DXC back-end.
    HlslDxc,
    /// HLSL validated with the FXC back-end.
    HlslFxc,
    /// GL shading language.
    Glsl,
}

/// How output of a format gets checked beyond the compiler's own run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// The validator is linked into the compiler; validation is always available.
    Builtin,
    /// The validator is an external executable which may or may not be present on the host.
    External(Validator),
}

/// External validator executables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Validator {
    Dxc,
    Fxc,
    Metal,
}

impl Validator {
    /// Every validator, in the order they are probed and fingerprinted.
    pub const ALL: [Validator; 3] = [Validator::Dxc, Validator::Fxc, Validator::Metal];

    /// Name of the executable (or library) searched for when no explicit path was given.
    pub fn executable_name(self) -> &'static str {
        match self {
            Validator::Dxc => "dxc",
            Validator::Fxc => "d3dcompiler_47.dll",
            Validator::Metal => {
                if cfg!(windows) {
                    "metal.exe"
                } else {
                    "xcrun"
                }
            }
        }
    }

    /// Compiler flag used to hand the resolved validator path to the compiler.
    pub fn compiler_flag(self) -> &'static str {
        match self {
            Validator::Dxc => "--dxc",
            Validator::Fxc => "--fxc",
            Validator::Metal => "--xcrun",
        }
    }

    /// The format this validator checks.
    pub fn format(self) -> OutputFormat {
        match self {
            Validator::Dxc => OutputFormat::HlslDxc,
            Validator::Fxc => OutputFormat::HlslFxc,
            Validator::Metal => OutputFormat::Msl,
        }
    }
}

impl OutputFormat {
    /// Every format, in canonical column order.
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Wgsl,
        OutputFormat::Spvasm,
        OutputFormat::Msl,
        OutputFormat::HlslDxc,
        OutputFormat::HlslFxc,
        OutputFormat::Glsl,
    ];

    /// Canonical spelling, as accepted on the command line and stored in the validation cache.
    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Wgsl => "wgsl",
            OutputFormat::Spvasm => "spvasm",
            OutputFormat::Msl => "msl",
            OutputFormat::HlslDxc => "hlsl-dxc",
            OutputFormat::HlslFxc => "hlsl-fxc",
            OutputFormat::Glsl => "glsl",
        }
    }

    /// Suffix of the expectation file, after `.expected.` (and the optional `ir.` tag).
    pub fn expectation_tag(self) -> &'static str {
        match self {
            OutputFormat::HlslDxc => "dxc.hlsl",
            OutputFormat::HlslFxc => "fxc.hlsl",
            other => other.name(),
        }
    }

    /// Value passed to the compiler's `--format` flag (`hlsl-fxc` -> `hlsl`).
    pub fn compiler_format(self) -> &'static str {
        let name = self.name();
        name.split('-').next().unwrap_or(name)
    }

    pub fn validation(self) -> Validation {
        match self {
            OutputFormat::Wgsl | OutputFormat::Spvasm | OutputFormat::Glsl => Validation::Builtin,
            OutputFormat::Msl => Validation::External(Validator::Metal),
            OutputFormat::HlslDxc => Validation::External(Validator::Dxc),
            OutputFormat::HlslFxc => Validation::External(Validator::Fxc),
        }
    }

    /// Whether previously validated hashes may be handed back to the compiler to skip re-validation.
    ///
    /// The compiler is its own toolchain for `wgsl`, and that toolchain changes with every build.
    pub fn caches_validation(self) -> bool {
        self != OutputFormat::Wgsl
    }

    /// Resolve a single spelling to a format.
    pub fn from_name(name: &str) -> Option<Self> {
        OutputFormat::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A `--format` list contained an unknown entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown format '{0}'")]
pub struct FormatParseError(pub String);

/// Parse a comma separated format list.
///
/// ## Notes
/// - `all` selects every format in canonical order.
/// - `hlsl` expands to both HLSL back-ends.
/// - The result keeps the user's order; duplicates are dropped.
pub fn parse_format_list(list: &str) -> Result<Vec<OutputFormat>, FormatParseError> {
    if list.trim() == "all" {
        return Ok(OutputFormat::ALL.to_vec());
    }

    let mut formats = Vec::new();
    for entry in list.split(',') {
        let entry = entry.trim();
        let expanded = match entry {
            "hlsl" => vec![OutputFormat::HlslDxc, OutputFormat::HlslFxc],
            _ => match OutputFormat::from_name(entry) {
                Some(format) => vec![format],
                None => return Err(FormatParseError(entry.to_string())),
            },
        };
        for format in expanded {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
    }
    Ok(formats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expectation_tags() {
        assert_eq!(OutputFormat::HlslDxc.expectation_tag(), "dxc.hlsl");
        assert_eq!(OutputFormat::HlslFxc.expectation_tag(), "fxc.hlsl");
        assert_eq!(OutputFormat::Msl.expectation_tag(), "msl");
        assert_eq!(OutputFormat::Wgsl.expectation_tag(), "wgsl");
    }

    #[test]
    fn test_compiler_format_strips_backend() {
        assert_eq!(OutputFormat::HlslDxc.compiler_format(), "hlsl");
        assert_eq!(OutputFormat::HlslFxc.compiler_format(), "hlsl");
        assert_eq!(OutputFormat::Spvasm.compiler_format(), "spvasm");
    }

    #[test]
    fn test_only_wgsl_skips_caching() {
        for format in OutputFormat::ALL {
            assert_eq!(format.caches_validation(), format != OutputFormat::Wgsl);
        }
    }

    #[test]
    fn test_validators_map_back_to_their_format() {
        for validator in Validator::ALL {
            assert_eq!(validator.format().validation(), Validation::External(validator));
        }
    }

    #[test]
    fn test_parse_all() {
        assert_eq!(parse_format_list("all").unwrap(), OutputFormat::ALL.to_vec());
    }

    #[test]
    fn test_parse_hlsl_expands() {
        assert_eq!(
            parse_format_list("msl, hlsl").unwrap(),
            vec![OutputFormat::Msl, OutputFormat::HlslDxc, OutputFormat::HlslFxc]
        );
    }

    #[test]
    fn test_parse_drops_duplicates() {
        assert_eq!(
            parse_format_list("hlsl-fxc,hlsl").unwrap(),
            vec![OutputFormat::HlslFxc, OutputFormat::HlslDxc]
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            parse_format_list("wgsl,hlsl-foo"),
            Err(FormatParseError("hlsl-foo".to_string()))
        );
    }

    #[test]
    fn test_from_name_round_trips() {
        for format in OutputFormat::ALL {
            assert_eq!(OutputFormat::from_name(format.name()), Some(format));
        }
        assert_eq!(OutputFormat::from_name("hlsl"), None);
    }
}

//! Target architecture selection

use std::fmt;

/// Environment variable selecting the target architecture
pub const ARCH_ENV: &str = "ARCH";

/// Target architecture for the macOS cross toolchain.
///
/// Only `x86_64` has a provisioning path; everything else is expected to
/// bring its own toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetArch {
    X86_64,
    Other(String),
}

impl TargetArch {
    /// Parse from an architecture identifier
    pub fn parse(s: &str) -> Self {
        match s {
            "x86_64" => TargetArch::X86_64,
            other => TargetArch::Other(other.to_string()),
        }
    }

    /// Read from `$ARCH`; unset counts as an unsupported value
    pub fn from_env() -> Self {
        match std::env::var(ARCH_ENV) {
            Ok(value) => Self::parse(&value),
            Err(_) => TargetArch::Other(String::new()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TargetArch::X86_64 => "x86_64",
            TargetArch::Other(name) => name,
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, TargetArch::X86_64)
    }
}

impl fmt::Display for TargetArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetArch::Other(name) if name.is_empty() => f.write_str("<unset>"),
            arch => f.write_str(arch.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(TargetArch::parse("x86_64"), TargetArch::X86_64);
        assert_eq!(TargetArch::parse("arm64"), TargetArch::Other("arm64".into()));
        // case matters, like the shell comparison it replaces
        assert_eq!(TargetArch::parse("X86_64"), TargetArch::Other("X86_64".into()));
    }

    #[test]
    fn test_display() {
        assert_eq!(TargetArch::X86_64.to_string(), "x86_64");
        assert_eq!(TargetArch::Other(String::new()).to_string(), "<unset>");
        assert!(!TargetArch::parse("arm64").is_supported());
    }
}

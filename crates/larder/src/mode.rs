// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::str::FromStr;

/// Which cache tier a deployment asks for.
///
/// Parsed from the configuration values `"memory"` (alias `"local"`) and `"distributed"`,
/// ignoring ASCII case.
///
/// # Examples
///
/// ```
/// use larder::CacheMode;
///
/// assert_eq!("distributed".parse::<CacheMode>().unwrap(), CacheMode::Distributed);
/// assert_eq!("Local".parse::<CacheMode>().unwrap(), CacheMode::Memory);
/// assert!("disk".parse::<CacheMode>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// In-process cache only.
    #[default]
    #[serde(alias = "local")]
    Memory,
    /// Network-backed cache shared by every process, with local fallback.
    Distributed,
}

impl CacheMode {
    /// Returns the configuration value of this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Distributed => "distributed",
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheMode {
    type Err = ParseCacheModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("memory") || trimmed.eq_ignore_ascii_case("local") {
            Ok(Self::Memory)
        } else if trimmed.eq_ignore_ascii_case("distributed") {
            Ok(Self::Distributed)
        } else {
            Err(ParseCacheModeError { value: value.to_string() })
        }
    }
}

/// Error returned when a string is not a known [`CacheMode`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cache mode '{value}', expected 'memory' or 'distributed'")]
pub struct ParseCacheModeError {
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_values() {
        for (input, expected) in [
            ("memory", CacheMode::Memory),
            ("MEMORY", CacheMode::Memory),
            ("local", CacheMode::Memory),
            (" distributed ", CacheMode::Distributed),
        ] {
            assert_eq!(input.parse::<CacheMode>().unwrap(), expected, "input: {input:?}");
        }
    }

    #[test]
    fn rejects_unknown_values() {
        let error = "redis".parse::<CacheMode>().unwrap_err();
        assert_eq!(error.to_string(), "unknown cache mode 'redis', expected 'memory' or 'distributed'");
    }

    #[test]
    fn display_round_trips() {
        for mode in [CacheMode::Memory, CacheMode::Distributed] {
            assert_eq!(mode.to_string().parse::<CacheMode>().unwrap(), mode);
        }
        assert_eq!(CacheMode::default(), CacheMode::Memory);
    }

    #[test]
    fn deserializes_from_config_values() {
        let mode: CacheMode = serde_json::from_str("\"local\"").unwrap();
        assert_eq!(mode, CacheMode::Memory);
        let mode: CacheMode = serde_json::from_str("\"distributed\"").unwrap();
        assert_eq!(mode, CacheMode::Distributed);
    }
}

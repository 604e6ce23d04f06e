//! Manager configuration.
//!
//! Settings can be built in code or read from the environment:
//!
//! ```bash
//! CTENSOR_DEBUG=1 cargo test          # estimate and log per-handle memory
//! CTENSOR_NAME_PREFIX=param cargo run # auto-generated names become `param_000000001`
//! ```

/// Environment variable switching diagnostic mode on.
pub const DEBUG_ENV: &str = "CTENSOR_DEBUG";

/// Environment variable overriding the prefix of auto-generated names.
pub const NAME_PREFIX_ENV: &str = "CTENSOR_NAME_PREFIX";

const DEFAULT_NAME_PREFIX: &str = "tensor";

/// Settings for a [`HandleManager`](crate::HandleManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Estimate each handle's memory footprint on acquire and log lifecycle events.
    ///
    /// The byte counter this feeds is advisory; nothing checks it.
    pub diagnostics: bool,
    /// Prefix for names generated when `acquire` is given none.
    pub name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            diagnostics: false,
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
        }
    }
}

impl Config {
    /// Reads [`DEBUG_ENV`] and [`NAME_PREFIX_ENV`], falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            diagnostics: lookup(DEBUG_ENV)
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.diagnostics),
            name_prefix: lookup(NAME_PREFIX_ENV)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.name_prefix),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_values() {
        for on in ["1", "true", "TRUE", " yes ", "On"] {
            assert!(parse_flag(on), "{on:?} should enable diagnostics");
        }
        for off in ["", "0", "false", "no", "debug"] {
            assert!(!parse_flag(off), "{off:?} should not enable diagnostics");
        }
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = Config::from_lookup(|key| match key {
            DEBUG_ENV => Some("1".to_string()),
            NAME_PREFIX_ENV => Some("param".to_string()),
            _ => None,
        });
        assert!(config.diagnostics);
        assert_eq!(config.name_prefix, "param");
    }

    #[test]
    fn blank_prefix_falls_back() {
        let config = Config::from_lookup(|key| (key == NAME_PREFIX_ENV).then(|| "  ".to_string()));
        assert_eq!(config, Config::default());
    }
}

//! Flag configuration from strings and the process environment.
//!
//! A configuration is a comma separated list of `NAME:value` pairs:
//!
//! ```text
//! GPU_ENV_FLAGS="WEBGL_PACK:false,WEBGL_FLUSH_THRESHOLD:2,WEBGL_MAX_SIZE_FOR_NARROW_TEXTURE:Infinity"
//! ```
//!
//! - `true` / `false` (any case) parse as booleans.
//! - Anything else must parse as a number; `Infinity` is accepted, `NaN` is not.
//! - Empty entries (`A:1,,B:2`) are ignored.
//!
//! Parsing only checks syntax. Names and types are checked against the
//! registry when the config is applied with
//! [`Environment::apply_config`](crate::Environment::apply_config).

use core::str::FromStr;

use crate::value::FlagValue;

/// Environment variable read by [`FlagConfig::from_env`].
pub const FLAGS_ENV_VAR: &str = "GPU_ENV_FLAGS";

/// Errors produced while parsing a configuration string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An entry is not of the form `NAME:value`.
    #[error("malformed flag entry `{0}`, expected NAME:value")]
    Malformed(String),
    /// The value is neither a boolean nor a number.
    #[error("flag `{name}` has unparsable value `{raw}`")]
    BadValue {
        /// Flag the value was given for.
        name: String,
        /// The raw text.
        raw: String,
    },
    /// The environment variable holds bytes that are not UTF-8.
    #[error("environment variable `{0}` is not valid unicode")]
    NotUnicode(String),
}

/// Ordered list of configured flag values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagConfig {
    entries: Vec<(String, FlagValue)>,
}

impl FlagConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `NAME:value,NAME:value` string.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Malformed`] or [`ConfigError::BadValue`] for the first
    /// bad entry.
    ///
    /// # Example
    ///
    /// ```
    /// use gpu_env::config::FlagConfig;
    /// use gpu_env::FlagValue;
    ///
    /// let config = FlagConfig::parse("WEBGL_PACK:false, WEBGL_VERSION:1").unwrap();
    /// assert_eq!(config.get("WEBGL_PACK"), Some(FlagValue::Bool(false)));
    /// assert_eq!(config.get("WEBGL_VERSION"), Some(FlagValue::Number(1.0)));
    /// ```
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let mut config = Self::new();
        for entry in input.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, raw) = entry
                .split_once(':')
                .ok_or_else(|| ConfigError::Malformed(entry.to_owned()))?;
            let (name, raw) = (name.trim(), raw.trim());
            if name.is_empty() {
                return Err(ConfigError::Malformed(entry.to_owned()));
            }
            let value = parse_value(raw)
                .ok_or_else(|| ConfigError::BadValue { name: name.to_owned(), raw: raw.to_owned() })?;
            config.insert(name, value);
        }
        Ok(config)
    }

    /// Reads [`FLAGS_ENV_VAR`]. An unset variable yields an empty config.
    ///
    /// # Errors
    ///
    /// Parse errors, or [`ConfigError::NotUnicode`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_var(FLAGS_ENV_VAR)
    }

    /// Reads the variable `key`. An unset variable yields an empty config.
    ///
    /// # Errors
    ///
    /// Parse errors, or [`ConfigError::NotUnicode`].
    pub fn from_env_var(key: &str) -> Result<Self, ConfigError> {
        match std::env::var(key) {
            Ok(raw) => Self::parse(&raw),
            Err(std::env::VarError::NotPresent) => Ok(Self::new()),
            Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode(key.to_owned())),
        }
    }

    /// Sets `name`, replacing an earlier entry for the same flag in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FlagValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// The configured value for `name`.
    pub fn get(&self, name: &str) -> Option<FlagValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    /// Entries in the order they were first given.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlagValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of configured flags.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromStr for FlagConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_value(raw: &str) -> Option<FlagValue> {
    if raw.eq_ignore_ascii_case("true") {
        return Some(FlagValue::Bool(true));
    }
    if raw.eq_ignore_ascii_case("false") {
        return Some(FlagValue::Bool(false));
    }
    raw.parse::<f64>()
        .ok()
        .filter(|n| !n.is_nan())
        .map(FlagValue::Number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_booleans_numbers_and_infinity() {
        let config = FlagConfig::parse("A:TRUE,B:false,C:-1,D:2.5,E:Infinity").unwrap();
        assert_eq!(config.len(), 5);
        assert_eq!(config.get("A"), Some(FlagValue::Bool(true)));
        assert_eq!(config.get("B"), Some(FlagValue::Bool(false)));
        assert_eq!(config.get("C"), Some(FlagValue::Number(-1.0)));
        assert_eq!(config.get("D"), Some(FlagValue::Number(2.5)));
        assert_eq!(config.get("E"), Some(FlagValue::Number(f64::INFINITY)));
    }

    #[test]
    fn blank_input_and_empty_entries_are_ignored() {
        assert!(FlagConfig::parse("").unwrap().is_empty());
        let config = FlagConfig::parse(" A:1 ,, ").unwrap();
        assert_eq!(config.iter().collect::<Vec<_>>(), [("A", &FlagValue::Number(1.0))]);
    }

    #[test]
    fn later_entries_replace_earlier_ones() {
        let config: FlagConfig = "A:1,B:true,A:2".parse().unwrap();
        assert_eq!(config.len(), 2);
        assert_eq!(config.get("A"), Some(FlagValue::Number(2.0)));
    }

    #[test]
    fn rejects_malformed_entries() {
        assert_eq!(FlagConfig::parse("A"), Err(ConfigError::Malformed("A".into())));
        assert_eq!(FlagConfig::parse(":1"), Err(ConfigError::Malformed(":1".into())));
        assert_eq!(
            FlagConfig::parse("A:yes"),
            Err(ConfigError::BadValue { name: "A".into(), raw: "yes".into() })
        );
        assert!(FlagConfig::parse("A:NaN").is_err());
    }

    #[test]
    fn unset_variable_is_empty_config() {
        let config = FlagConfig::from_env_var("GPU_ENV_FLAGS_THAT_IS_NEVER_SET").unwrap();
        assert!(config.is_empty());
    }
}

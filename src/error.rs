//! Error types for flag registration, resolution and capability probing.

use crate::config::ConfigError;
use crate::value::{FlagType, FlagValue};

/// A failure reported by a capability probe.
///
/// Probe failures are passed through flag resolution unchanged and wrapped in
/// [`FlagError::Probe`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// The probe does not know how to answer this capability.
    #[error("capability `{0}` is not provided by this probe")]
    Unsupported(String),
    /// The probe knows the capability but querying it failed.
    #[error("querying capability `{name}` failed: {message}")]
    Failed {
        /// Capability that was queried.
        name: String,
        /// Reason reported by the host environment.
        message: String,
    },
}

impl ProbeError {
    /// Shorthand for a [`ProbeError::Failed`].
    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed { name: name.into(), message: message.into() }
    }
}

/// Everything that can go wrong while registering, setting or resolving flags.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlagError {
    /// The flag name is not in the registry.
    #[error("flag `{0}` has not been registered")]
    UnknownFlag(String),
    /// A flag with this name is already registered.
    #[error("flag `{0}` is already registered")]
    DuplicateFlag(String),
    /// A value was rejected by type checking or by the flag's validator.
    #[error("invalid value {value} for flag `{name}`: {reason}")]
    InvalidFlagValue {
        /// Flag the value was meant for.
        name: String,
        /// The rejected value.
        value: FlagValue,
        /// Why it was rejected.
        reason: String,
    },
    /// A typed read asked for the other flag type.
    #[error("flag `{name}` is a {actual} flag and cannot be read as a {requested}")]
    TypeMismatch {
        /// Flag that was read.
        name: String,
        /// Declared type of the flag.
        actual: FlagType,
        /// Type the caller asked for.
        requested: FlagType,
    },
    /// Evaluators depend on each other in a loop. Holds the loop, first flag repeated last.
    #[error("cyclic flag dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),
    /// A capability probe failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),
    /// A configuration string could not be parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl FlagError {
    pub(crate) fn invalid(name: &str, value: FlagValue, reason: impl Into<String>) -> Self {
        Self::InvalidFlagValue { name: name.to_owned(), value, reason: reason.into() }
    }
}

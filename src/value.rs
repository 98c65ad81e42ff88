//! Flag values and flag types.
//!
//! Every flag resolves to a [`FlagValue`], which is either a boolean or a
//! number. Numbers are stored as `f64` so that unbounded limits such as
//! "no maximum size" can be expressed as [`f64::INFINITY`].

use core::fmt;

/// The declared type of a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagType {
    /// A `true`/`false` switch.
    Bool,
    /// A numeric setting such as a threshold or a hardware limit.
    Number,
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("boolean"),
            Self::Number => f.write_str("number"),
        }
    }
}

/// A resolved or user-supplied flag value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlagValue {
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Number(f64),
}

impl FlagValue {
    /// Returns the [`FlagType`] this value belongs to.
    pub const fn flag_type(&self) -> FlagType {
        match self {
            Self::Bool(_) => FlagType::Bool,
            Self::Number(_) => FlagType::Number,
        }
    }

    /// Returns the boolean, if this is a boolean value.
    pub const fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(b) => Some(b),
            Self::Number(_) => None,
        }
    }

    /// Returns the number, if this is a numeric value.
    pub const fn as_number(&self) -> Option<f64> {
        match *self {
            Self::Number(n) => Some(n),
            Self::Bool(_) => None,
        }
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for FlagValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<u32> for FlagValue {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i32> for FlagValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) if n.is_infinite() && n.is_sign_positive() => f.write_str("Infinity"),
            Self::Number(n) if n.is_infinite() => f.write_str("-Infinity"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

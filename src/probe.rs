//! Capability probe layer.
//!
//! Evaluators that need to know something about the host (the largest
//! texture the GPU accepts, whether the device is a phone, whether an
//! extension exists) ask a [`CapabilityProbe`] by name. The environment
//! owns one probe and hands it to evaluators through the
//! [`Resolver`](crate::environment::Resolver).
//!
//! # Contract
//!
//! - Probes are zero-argument and name-indexed, so a probe answer looks
//!   exactly like a flag without dependencies.
//! - Probes may be expensive and may keep their own cache. Invalidating that
//!   cache is the probe's business, never the environment's.
//! - The resolver calls a given capability at most once per top-level
//!   resolution.
//!
//! # Implementations
//!
//! - [`NoProbes`]: for environments whose flags never touch the host.
//! - [`ProbeTable`]: closures registered by name.
//! - [`DeviceProbe`](crate::webgl::DeviceProbe): typed GPU device queries.

use std::collections::HashMap;

use crate::error::ProbeError;
use crate::value::FlagValue;

/// A host environment that can answer capability queries by name.
pub trait CapabilityProbe: Send + Sync {
    /// Answers the capability called `name`.
    ///
    /// # Errors
    ///
    /// [`ProbeError::Unsupported`] for names this probe does not know,
    /// [`ProbeError::Failed`] when the host query itself fails.
    fn query(&self, name: &str) -> Result<FlagValue, ProbeError>;
}

/// A probe that knows no capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbes;

impl CapabilityProbe for NoProbes {
    fn query(&self, name: &str) -> Result<FlagValue, ProbeError> {
        Err(ProbeError::Unsupported(name.to_owned()))
    }
}

type ProbeFn = Box<dyn Fn() -> Result<FlagValue, ProbeError> + Send + Sync>;

/// Closure-backed probe, one zero-argument function per capability name.
///
/// # Example
///
/// ```
/// use gpu_env::probe::{CapabilityProbe, ProbeTable};
/// use gpu_env::FlagValue;
///
/// let probes = ProbeTable::new()
///     .with("max_texture_size", || Ok(FlagValue::Number(4096.0)));
/// assert_eq!(probes.query("max_texture_size"), Ok(FlagValue::Number(4096.0)));
/// assert!(probes.query("is_mobile").is_err());
/// ```
#[derive(Default)]
pub struct ProbeTable {
    probes: HashMap<String, ProbeFn>,
}

impl ProbeTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the probe for `name`.
    pub fn insert<F>(&mut self, name: impl Into<String>, probe: F)
    where
        F: Fn() -> Result<FlagValue, ProbeError> + Send + Sync + 'static,
    {
        self.probes.insert(name.into(), Box::new(probe));
    }

    /// Builder form of [`ProbeTable::insert`].
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, probe: F) -> Self
    where
        F: Fn() -> Result<FlagValue, ProbeError> + Send + Sync + 'static,
    {
        self.insert(name, probe);
        self
    }
}

impl CapabilityProbe for ProbeTable {
    fn query(&self, name: &str) -> Result<FlagValue, ProbeError> {
        match self.probes.get(name) {
            Some(probe) => probe(),
            None => Err(ProbeError::Unsupported(name.to_owned())),
        }
    }
}

impl core::fmt::Debug for ProbeTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut names: Vec<&str> = self.probes.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ProbeTable").field("probes", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_probes_rejects_everything() {
        assert_eq!(
            NoProbes.query("is_mobile"),
            Err(ProbeError::Unsupported("is_mobile".into()))
        );
    }

    #[test]
    fn table_forwards_failures_unchanged() {
        let table = ProbeTable::new()
            .with("lost", || Err(ProbeError::failed("lost", "context lost")));
        assert_eq!(table.query("lost"), Err(ProbeError::failed("lost", "context lost")));
    }

    #[test]
    fn insert_replaces_existing_probe() {
        let mut table = ProbeTable::new().with("units", || Ok(FlagValue::from(8u32)));
        table.insert("units", || Ok(FlagValue::from(32u32)));
        assert_eq!(table.query("units"), Ok(FlagValue::Number(32.0)));
    }
}

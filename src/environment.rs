//! The flag store.
//!
//! An [`Environment`] owns a [`FlagRegistry`], a [`CapabilityProbe`] and
//! the mutable state layered on top of them:
//!
//! ```text
//!   get(name)
//!     │
//!     ├─ overrides   explicit `set` values, cleared by `reset`
//!     ├─ seeded      values from a `FlagConfig`, survive `reset`
//!     ├─ cache       evaluator results, cleared by `set` and `reset`
//!     └─ evaluator   runs with a `Resolver`, may recurse and probe
//! ```
//!
//! Only evaluator results are cached. Cache writes made while answering one
//! `get` are staged in the [`Resolver`] and committed when the whole
//! resolution succeeds, so a failing resolution (cycle, probe error,
//! validator rejection) leaves the cache exactly as it was.
//!
//! Any `set` clears the whole cache. Dependencies between flags are only
//! discovered by running evaluators, so this is the one policy that keeps
//! every derived flag consistent with the latest override.
//!
//! # Example
//!
//! ```
//! use gpu_env::{Environment, FlagDefinition, FlagRegistry};
//!
//! let mut registry = FlagRegistry::new();
//! registry.register(FlagDefinition::constant("HAS_GPU", true)).unwrap();
//! registry
//!     .register(FlagDefinition::boolean("PACK", |r| r.get_bool("HAS_GPU")))
//!     .unwrap();
//!
//! let mut env = Environment::new(registry);
//! assert!(env.get_bool("PACK").unwrap());
//!
//! env.set("HAS_GPU", false).unwrap();
//! assert!(!env.get_bool("PACK").unwrap());
//!
//! env.reset();
//! assert!(env.get_bool("PACK").unwrap());
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use log::{debug, info, trace};

use crate::config::FlagConfig;
use crate::error::{FlagError, ProbeError};
use crate::probe::{CapabilityProbe, NoProbes};
use crate::registry::FlagRegistry;
use crate::value::{FlagType, FlagValue};

/// An environment shared between threads. Every operation locks the mutex,
/// which makes `get`, `set` and `reset` a single critical section.
pub type SharedEnvironment = Arc<Mutex<Environment>>;

/// Process-scoped flag state: registry, probe, overrides, seeds and cache.
pub struct Environment {
    registry: FlagRegistry,
    probe: Arc<dyn CapabilityProbe>,
    overrides: HashMap<String, FlagValue>,
    seeded: HashMap<String, FlagValue>,
    cache: HashMap<String, FlagValue>,
}

impl Environment {
    /// Creates an environment whose evaluators cannot probe the host.
    pub fn new(registry: FlagRegistry) -> Self {
        Self::with_probe(registry, Arc::new(NoProbes))
    }

    /// Creates an environment answering capability queries with `probe`.
    pub fn with_probe(registry: FlagRegistry, probe: Arc<dyn CapabilityProbe>) -> Self {
        Self {
            registry,
            probe,
            overrides: HashMap::new(),
            seeded: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    /// The registry this environment resolves against.
    pub fn registry(&self) -> &FlagRegistry {
        &self.registry
    }

    /// Resolves a flag.
    ///
    /// # Behavior
    ///
    /// Override, then config seed, then cache, then evaluator. A freshly
    /// evaluated value is type checked and validated before it is cached.
    ///
    /// # Errors
    ///
    /// - [`FlagError::UnknownFlag`] for unregistered names, including ones
    ///   reached through an evaluator.
    /// - [`FlagError::CyclicDependency`] if evaluators depend on each other.
    /// - [`FlagError::InvalidFlagValue`] if an evaluator produced a value its
    ///   own definition rejects.
    /// - [`FlagError::Probe`] when a capability probe fails.
    pub fn get(&mut self, name: impl AsRef<str>) -> Result<FlagValue, FlagError> {
        let name = name.as_ref();
        let mut resolver = Resolver {
            registry: &self.registry,
            overrides: &self.overrides,
            seeded: &self.seeded,
            cache: &self.cache,
            probe: self.probe.as_ref(),
            staged: HashMap::new(),
            probed: HashMap::new(),
            resolving: Vec::new(),
        };
        let value = resolver.get(name)?;
        let staged = resolver.into_staged();
        self.cache.extend(staged);
        Ok(value)
    }

    /// Resolves a boolean flag.
    ///
    /// # Errors
    ///
    /// Anything [`Environment::get`] returns, plus [`FlagError::TypeMismatch`]
    /// for numeric flags.
    pub fn get_bool(&mut self, name: impl AsRef<str>) -> Result<bool, FlagError> {
        let name = name.as_ref();
        let value = self.get(name)?;
        expect_bool(name, value)
    }

    /// Resolves a numeric flag.
    ///
    /// # Errors
    ///
    /// Anything [`Environment::get`] returns, plus [`FlagError::TypeMismatch`]
    /// for boolean flags.
    pub fn get_number(&mut self, name: impl AsRef<str>) -> Result<f64, FlagError> {
        let name = name.as_ref();
        let value = self.get(name)?;
        expect_number(name, value)
    }

    /// Overrides a flag.
    ///
    /// On success every cached evaluation is dropped and the flag's set hook,
    /// if any, runs with the new value.
    ///
    /// # Errors
    ///
    /// [`FlagError::UnknownFlag`] or [`FlagError::InvalidFlagValue`]; the
    /// environment is unchanged in both cases.
    pub fn set(&mut self, name: impl AsRef<str>, value: impl Into<FlagValue>) -> Result<(), FlagError> {
        let name = name.as_ref();
        let value = value.into();
        let definition = self.registry.lookup(name)?;
        definition.check(&value)?;

        debug!("flag `{name}` set to {value}");
        self.overrides.insert(name.to_owned(), value);
        self.cache.clear();
        definition.run_set_hook(&value);
        Ok(())
    }

    /// Overrides several flags at once.
    ///
    /// Every entry is checked before any is applied, so either all flags are
    /// set or none is.
    ///
    /// # Errors
    ///
    /// The first [`FlagError::UnknownFlag`] or [`FlagError::InvalidFlagValue`]
    /// encountered.
    pub fn set_flags<I, K, V>(&mut self, flags: I) -> Result<(), FlagError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FlagValue>,
    {
        let mut checked = Vec::new();
        for (name, value) in flags {
            let name = name.as_ref();
            let value = value.into();
            self.registry.lookup(name)?.check(&value)?;
            checked.push((name.to_owned(), value));
        }
        for (name, value) in checked {
            self.set(name, value)?;
        }
        Ok(())
    }

    /// Drops all overrides and cached evaluations. Config seeds are kept.
    pub fn reset(&mut self) {
        info!(
            "resetting flag environment ({} overrides, {} cached)",
            self.overrides.len(),
            self.cache.len()
        );
        self.overrides.clear();
        self.cache.clear();
    }

    /// Installs configuration-supplied values.
    ///
    /// Seeded values sit between overrides and evaluators and are not removed
    /// by [`Environment::reset`]. Applying a config replaces earlier seeds for
    /// the same flags and clears the cache.
    ///
    /// # Errors
    ///
    /// [`FlagError::UnknownFlag`] or [`FlagError::InvalidFlagValue`] for the
    /// first bad entry; nothing is applied in that case.
    pub fn apply_config(&mut self, config: &FlagConfig) -> Result<(), FlagError> {
        for (name, value) in config.iter() {
            self.registry.lookup(name)?.check(value)?;
        }
        for (name, value) in config.iter() {
            self.seeded.insert(name.to_owned(), *value);
        }
        self.cache.clear();
        info!("applied {} configured flag value(s)", config.len());
        Ok(())
    }

    /// Every value currently known without evaluating anything.
    ///
    /// Cached evaluations, config seeds and overrides merged by precedence.
    pub fn flags(&self) -> BTreeMap<String, FlagValue> {
        let mut flags = BTreeMap::new();
        for layer in [&self.cache, &self.seeded, &self.overrides] {
            for (name, value) in layer {
                flags.insert(name.clone(), *value);
            }
        }
        flags
    }

    /// The cached evaluation for `name`, if there is one.
    pub fn cached(&self, name: impl AsRef<str>) -> Option<FlagValue> {
        self.cache.get(name.as_ref()).copied()
    }

    /// Wraps the environment for use from several threads.
    pub fn into_shared(self) -> SharedEnvironment {
        Arc::new(Mutex::new(self))
    }
}

impl core::fmt::Debug for Environment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Environment")
            .field("registered", &self.registry.len())
            .field("overrides", &self.overrides)
            .field("seeded", &self.seeded)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Resolution capability handed to evaluators.
///
/// A resolver lives for one top-level [`Environment::get`]. It reads the
/// environment's layers, stages newly evaluated values, remembers probe
/// answers, and tracks which flags are currently being evaluated so that
/// dependency cycles are reported instead of recursing forever.
pub struct Resolver<'a> {
    registry: &'a FlagRegistry,
    overrides: &'a HashMap<String, FlagValue>,
    seeded: &'a HashMap<String, FlagValue>,
    cache: &'a HashMap<String, FlagValue>,
    probe: &'a dyn CapabilityProbe,
    staged: HashMap<String, FlagValue>,
    probed: HashMap<String, FlagValue>,
    resolving: Vec<String>,
}

impl Resolver<'_> {
    fn into_staged(self) -> HashMap<String, FlagValue> {
        self.staged
    }

    /// Resolves a dependency flag through the same path as
    /// [`Environment::get`].
    ///
    /// # Errors
    ///
    /// See [`Environment::get`].
    pub fn get(&mut self, name: impl AsRef<str>) -> Result<FlagValue, FlagError> {
        let name = name.as_ref();
        if let Some(value) = self.overrides.get(name).or_else(|| self.seeded.get(name)) {
            return Ok(*value);
        }
        if let Some(value) = self.cache.get(name).or_else(|| self.staged.get(name)) {
            trace!("flag `{name}` served from cache");
            return Ok(*value);
        }

        let registry = self.registry;
        let definition = registry.lookup(name)?;
        if let Some(start) = self.resolving.iter().position(|n| n == name) {
            let mut cycle = self.resolving[start..].to_vec();
            cycle.push(name.to_owned());
            return Err(FlagError::CyclicDependency(cycle));
        }

        self.resolving.push(name.to_owned());
        let evaluated = definition.evaluate(self);
        self.resolving.pop();

        let value = evaluated?;
        definition.check(&value)?;
        debug!("flag `{name}` evaluated to {value}");
        self.staged.insert(name.to_owned(), value);
        Ok(value)
    }

    /// Resolves a boolean dependency.
    ///
    /// # Errors
    ///
    /// See [`Environment::get_bool`].
    pub fn get_bool(&mut self, name: impl AsRef<str>) -> Result<bool, FlagError> {
        let name = name.as_ref();
        let value = self.get(name)?;
        expect_bool(name, value)
    }

    /// Resolves a numeric dependency.
    ///
    /// # Errors
    ///
    /// See [`Environment::get_number`].
    pub fn get_number(&mut self, name: impl AsRef<str>) -> Result<f64, FlagError> {
        let name = name.as_ref();
        let value = self.get(name)?;
        expect_number(name, value)
    }

    /// Queries a host capability, at most once per resolution.
    ///
    /// # Errors
    ///
    /// The probe's [`ProbeError`], wrapped in [`FlagError::Probe`].
    pub fn probe(&mut self, capability: impl AsRef<str>) -> Result<FlagValue, FlagError> {
        let capability = capability.as_ref();
        if let Some(value) = self.probed.get(capability) {
            return Ok(*value);
        }
        trace!("probing capability `{capability}`");
        let value = self.probe.query(capability)?;
        self.probed.insert(capability.to_owned(), value);
        Ok(value)
    }

    /// Queries a boolean capability.
    ///
    /// # Errors
    ///
    /// [`FlagError::Probe`] if the probe fails or answers with a number.
    pub fn probe_bool(&mut self, capability: impl AsRef<str>) -> Result<bool, FlagError> {
        let capability = capability.as_ref();
        let value = self.probe(capability)?;
        value
            .as_bool()
            .ok_or_else(|| ProbeError::failed(capability, format!("expected a boolean, got {value}")).into())
    }

    /// Queries a numeric capability.
    ///
    /// # Errors
    ///
    /// [`FlagError::Probe`] if the probe fails or answers with a boolean.
    pub fn probe_number(&mut self, capability: impl AsRef<str>) -> Result<f64, FlagError> {
        let capability = capability.as_ref();
        let value = self.probe(capability)?;
        value
            .as_number()
            .ok_or_else(|| ProbeError::failed(capability, format!("expected a number, got {value}")).into())
    }
}

fn expect_bool(name: &str, value: FlagValue) -> Result<bool, FlagError> {
    value.as_bool().ok_or_else(|| FlagError::TypeMismatch {
        name: name.to_owned(),
        actual: value.flag_type(),
        requested: FlagType::Bool,
    })
}

fn expect_number(name: &str, value: FlagValue) -> Result<f64, FlagError> {
    value.as_number().ok_or_else(|| FlagError::TypeMismatch {
        name: name.to_owned(),
        actual: value.flag_type(),
        requested: FlagType::Number,
    })
}

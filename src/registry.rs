//! Flag registry.
//!
//! The registry is the static half of the engine: a table of
//! [`FlagDefinition`]s built once at startup by whoever owns the flags, then
//! handed to an [`Environment`](crate::Environment) which never mutates it.
//!
//! A definition bundles:
//!
//! - a unique name,
//! - a declared [`FlagType`],
//! - an evaluator computing the default from other flags and probes,
//! - an optional validator for values given through `set`,
//! - an optional set hook that runs after a successful `set`.
//!
//! # Example
//!
//! ```
//! use gpu_env::{FlagDefinition, FlagRegistry};
//!
//! let mut registry = FlagRegistry::new();
//! registry.register(FlagDefinition::constant("HAS_GPU", true)).unwrap();
//! registry
//!     .register(FlagDefinition::boolean("PACK", |r| r.get_bool("HAS_GPU")))
//!     .unwrap();
//! assert!(registry.register(FlagDefinition::constant("PACK", false)).is_err());
//! ```

use std::collections::HashMap;

use crate::environment::Resolver;
use crate::error::FlagError;
use crate::value::{FlagType, FlagValue};

/// Boxed evaluator computing a flag's default value.
pub type Evaluator = Box<dyn Fn(&mut Resolver<'_>) -> Result<FlagValue, FlagError> + Send + Sync>;
/// Boxed validator; `Err` carries the human readable reason.
pub type Validator = Box<dyn Fn(&FlagValue) -> Result<(), String> + Send + Sync>;
/// Boxed callback run after a flag is explicitly set.
pub type SetHook = Box<dyn Fn(&FlagValue) + Send + Sync>;

fn boxed<F>(evaluator: F) -> Evaluator
where
    F: Fn(&mut Resolver<'_>) -> Result<FlagValue, FlagError> + Send + Sync + 'static,
{
    Box::new(evaluator)
}

/// Declarative description of a single flag.
pub struct FlagDefinition {
    name: String,
    flag_type: FlagType,
    evaluator: Evaluator,
    validator: Option<Validator>,
    set_hook: Option<SetHook>,
}

impl FlagDefinition {
    /// Creates a definition from an evaluator producing raw [`FlagValue`]s.
    ///
    /// The evaluator's result is checked against `flag_type` on every
    /// evaluation.
    pub fn new<F>(name: impl Into<String>, flag_type: FlagType, evaluator: F) -> Self
    where
        F: Fn(&mut Resolver<'_>) -> Result<FlagValue, FlagError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            flag_type,
            evaluator: boxed(evaluator),
            validator: None,
            set_hook: None,
        }
    }

    /// A boolean flag computed by `evaluator`.
    pub fn boolean<F>(name: impl Into<String>, evaluator: F) -> Self
    where
        F: Fn(&mut Resolver<'_>) -> Result<bool, FlagError> + Send + Sync + 'static,
    {
        Self::new(name, FlagType::Bool, move |r| evaluator(r).map(FlagValue::Bool))
    }

    /// A numeric flag computed by `evaluator`.
    pub fn number<F>(name: impl Into<String>, evaluator: F) -> Self
    where
        F: Fn(&mut Resolver<'_>) -> Result<f64, FlagError> + Send + Sync + 'static,
    {
        Self::new(name, FlagType::Number, move |r| evaluator(r).map(FlagValue::Number))
    }

    /// A flag whose default is a literal.
    pub fn constant(name: impl Into<String>, value: impl Into<FlagValue>) -> Self {
        let value = value.into();
        Self::new(name, value.flag_type(), move |_| Ok(value))
    }

    /// Attaches a validator that every explicitly set value must pass.
    ///
    /// Evaluated defaults are checked too, so a validator also guards against
    /// a misbehaving evaluator or probe.
    #[must_use]
    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&FlagValue) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Attaches a hook run with the new value after each successful `set`.
    #[must_use]
    pub fn with_set_hook<H>(mut self, hook: H) -> Self
    where
        H: Fn(&FlagValue) + Send + Sync + 'static,
    {
        self.set_hook = Some(Box::new(hook));
        self
    }

    /// The flag's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The flag's declared type.
    pub const fn flag_type(&self) -> FlagType {
        self.flag_type
    }

    pub(crate) fn evaluate(&self, resolver: &mut Resolver<'_>) -> Result<FlagValue, FlagError> {
        (self.evaluator)(resolver)
    }

    /// Type, `NaN` and validator checks shared by `set` and evaluation.
    pub(crate) fn check(&self, value: &FlagValue) -> Result<(), FlagError> {
        if value.flag_type() != self.flag_type {
            return Err(FlagError::invalid(
                &self.name,
                *value,
                format!("expected a {} value", self.flag_type),
            ));
        }
        if value.as_number().is_some_and(f64::is_nan) {
            return Err(FlagError::invalid(&self.name, *value, "NaN is not a valid flag value"));
        }
        if let Some(validator) = &self.validator {
            validator(value).map_err(|reason| FlagError::invalid(&self.name, *value, reason))?;
        }
        Ok(())
    }

    pub(crate) fn run_set_hook(&self, value: &FlagValue) {
        if let Some(hook) = &self.set_hook {
            hook(value);
        }
    }
}

impl core::fmt::Debug for FlagDefinition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlagDefinition")
            .field("name", &self.name)
            .field("flag_type", &self.flag_type)
            .field("validator", &self.validator.is_some())
            .field("set_hook", &self.set_hook.is_some())
            .finish_non_exhaustive()
    }
}

/// Table of flag definitions, kept in registration order.
#[derive(Debug, Default)]
pub struct FlagRegistry {
    definitions: Vec<FlagDefinition>,
    index: HashMap<String, usize>,
}

impl FlagRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a flag.
    ///
    /// # Errors
    ///
    /// [`FlagError::DuplicateFlag`] if a flag with the same name exists; the
    /// registry is left unchanged.
    pub fn register(&mut self, definition: FlagDefinition) -> Result<(), FlagError> {
        if self.index.contains_key(definition.name()) {
            return Err(FlagError::DuplicateFlag(definition.name().to_owned()));
        }
        self.index.insert(definition.name().to_owned(), self.definitions.len());
        self.definitions.push(definition);
        Ok(())
    }

    /// Finds the definition for `name`.
    ///
    /// # Errors
    ///
    /// [`FlagError::UnknownFlag`] if nothing is registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<&FlagDefinition, FlagError> {
        self.index
            .get(name)
            .map(|&i| &self.definitions[i])
            .ok_or_else(|| FlagError::UnknownFlag(name.to_owned()))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(FlagDefinition::name)
    }

    /// Number of registered flags.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether no flag is registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_unknown_flag_fails() {
        let registry = FlagRegistry::new();
        assert_eq!(
            registry.lookup("MISSING").err(),
            Some(FlagError::UnknownFlag("MISSING".into()))
        );
    }

    #[test]
    fn duplicate_registration_keeps_first_definition() {
        let mut registry = FlagRegistry::new();
        registry.register(FlagDefinition::constant("A", 1.0)).unwrap();
        let err = registry.register(FlagDefinition::constant("A", true)).unwrap_err();
        assert_eq!(err, FlagError::DuplicateFlag("A".into()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("A").unwrap().flag_type(), FlagType::Number);
    }

    #[test]
    fn names_follow_registration_order() {
        let mut registry = FlagRegistry::new();
        for name in ["C", "A", "B"] {
            registry.register(FlagDefinition::constant(name, false)).unwrap();
        }
        assert_eq!(registry.names().collect::<Vec<_>>(), ["C", "A", "B"]);
    }

    #[test]
    fn check_rejects_wrong_type_nan_and_validator_failures() {
        let def = FlagDefinition::constant("T", 0.0).with_validator(|v| match v.as_number() {
            Some(n) if n < 0.0 => Err("must be non-negative".into()),
            _ => Ok(()),
        });
        assert!(def.check(&FlagValue::Number(3.0)).is_ok());
        assert!(matches!(def.check(&FlagValue::Bool(true)), Err(FlagError::InvalidFlagValue { .. })));
        assert!(matches!(def.check(&FlagValue::Number(f64::NAN)), Err(FlagError::InvalidFlagValue { .. })));
        match def.check(&FlagValue::Number(-2.0)) {
            Err(FlagError::InvalidFlagValue { reason, .. }) => assert_eq!(reason, "must be non-negative"),
            other => panic!("unexpected {other:?}"),
        }
    }
}

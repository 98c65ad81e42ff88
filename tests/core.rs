use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use gpu_env::probe::ProbeTable;
use gpu_env::{Environment, FlagDefinition, FlagError, FlagRegistry, FlagType, FlagValue};

/// Host state behind the probes of the test environment.
#[derive(Default)]
struct Host {
    accelerated: AtomicBool,
    units: AtomicU32,
    mobile: AtomicBool,
    unit_queries: AtomicUsize,
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn non_negative_or_minus_one(value: &FlagValue) -> Result<(), String> {
    match value.as_number() {
        Some(n) if n >= 0.0 || n == -1.0 => Ok(()),
        _ => Err("must be -1 or at least 0".into()),
    }
}

fn test_env(host: &Arc<Host>) -> Environment {
    init_logging();

    let probes = {
        let (a, u, m) = (Arc::clone(host), Arc::clone(host), Arc::clone(host));
        ProbeTable::new()
            .with("accelerated", move || Ok(a.accelerated.load(Ordering::SeqCst).into()))
            .with("units", move || {
                u.unit_queries.fetch_add(1, Ordering::SeqCst);
                Ok(u.units.load(Ordering::SeqCst).into())
            })
            .with("mobile", move || Ok(m.mobile.load(Ordering::SeqCst).into()))
    };

    let mut registry = FlagRegistry::new();
    registry
        .register(FlagDefinition::boolean("HAS_ACCEL", |r| r.probe_bool("accelerated")))
        .unwrap();
    registry
        .register(FlagDefinition::boolean("PACKED", |r| r.get_bool("HAS_ACCEL")))
        .unwrap();
    registry
        .register(FlagDefinition::boolean("PACKED_REDUCE", |r| r.get_bool("PACKED")))
        .unwrap();
    registry
        .register(FlagDefinition::number("MAX_UNITS", |r| Ok(r.probe_number("units")?.min(16.0))))
        .unwrap();
    registry
        .register(
            FlagDefinition::number("FLUSH", |r| Ok(if r.probe_bool("mobile")? { 1.0 } else { -1.0 }))
                .with_validator(non_negative_or_minus_one),
        )
        .unwrap();
    registry.register(FlagDefinition::constant("HANDOFF", 128.0)).unwrap();

    Environment::with_probe(registry, Arc::new(probes))
}

fn host(accelerated: bool, units: u32, mobile: bool) -> Arc<Host> {
    let host = Host::default();
    host.accelerated.store(accelerated, Ordering::SeqCst);
    host.units.store(units, Ordering::SeqCst);
    host.mobile.store(mobile, Ordering::SeqCst);
    Arc::new(host)
}

#[test]
fn test_reset_is_idempotent_for_every_flag() {
    let host = host(true, 8, false);
    let mut env = test_env(&host);
    let names: Vec<String> = env.registry().names().map(str::to_owned).collect();

    for name in names {
        env.reset();
        let first = env.get(&name).unwrap();
        env.reset();
        let second = env.get(&name).unwrap();
        assert_eq!(first, second, "{name}");
    }
}

#[test]
fn test_override_takes_precedence_over_evaluator() {
    let host = host(true, 8, false);
    let mut env = test_env(&host);

    let overrides = [
        ("HAS_ACCEL", FlagValue::Bool(false)),
        ("PACKED", FlagValue::Bool(false)),
        ("PACKED_REDUCE", FlagValue::Bool(false)),
        ("MAX_UNITS", FlagValue::Number(3.0)),
        ("FLUSH", FlagValue::Number(0.0)),
        ("HANDOFF", FlagValue::Number(256.0)),
    ];
    for (name, value) in overrides {
        env.set(name, value).unwrap();
        assert_eq!(env.get(name), Ok(value), "{name}");
    }
}

#[test]
fn test_cached_value_is_stable_and_probed_once() {
    let host = host(true, 12, false);
    let mut env = test_env(&host);

    let first = env.get_number("MAX_UNITS").unwrap();
    host.units.store(4, Ordering::SeqCst);
    let second = env.get_number("MAX_UNITS").unwrap();

    assert_eq!(first, 12.0);
    assert_eq!(first, second);
    assert_eq!(host.unit_queries.load(Ordering::SeqCst), 1);

    env.reset();
    assert_eq!(env.get_number("MAX_UNITS"), Ok(4.0));
    assert_eq!(host.unit_queries.load(Ordering::SeqCst), 2);
}

#[test]
fn test_setting_base_flag_propagates_to_dependents() {
    let host = host(true, 8, false);
    let mut env = test_env(&host);

    assert!(env.get_bool("PACKED_REDUCE").unwrap());

    env.set("HAS_ACCEL", false).unwrap();
    assert!(!env.get_bool("PACKED").unwrap());
    assert!(!env.get_bool("PACKED_REDUCE").unwrap());

    env.set("HAS_ACCEL", true).unwrap();
    assert!(env.get_bool("PACKED").unwrap());
    assert!(env.get_bool("PACKED_REDUCE").unwrap());
}

#[test]
fn test_negative_threshold_is_rejected_and_state_unchanged() {
    let host = host(true, 8, false);
    let mut env = test_env(&host);
    env.set("FLUSH", 5.0).unwrap();
    let before = env.flags();

    let err = env.set("FLUSH", -2.0).unwrap_err();
    assert!(matches!(err, FlagError::InvalidFlagValue { ref name, .. } if name == "FLUSH"));
    assert_eq!(env.flags(), before);
    assert_eq!(env.get_number("FLUSH"), Ok(5.0));

    env.set("FLUSH", -1.0).unwrap();
    assert_eq!(env.get_number("FLUSH"), Ok(-1.0));
}

#[test]
fn test_capped_derivation_below_at_and_above_ceiling() {
    for (probed, expected) in [(10, 10.0), (16, 16.0), (20, 16.0)] {
        let host = host(true, probed, false);
        let mut env = test_env(&host);
        assert_eq!(env.get_number("MAX_UNITS"), Ok(expected), "probed {probed}");
    }
}

#[test]
fn test_threshold_default_depends_on_device_class() {
    let mobile = host(true, 8, true);
    assert_eq!(test_env(&mobile).get_number("FLUSH"), Ok(1.0));

    let desktop = host(true, 8, false);
    assert_eq!(test_env(&desktop).get_number("FLUSH"), Ok(-1.0));
}

#[test]
fn test_unknown_flags_are_reported() {
    let host = host(true, 8, false);
    let mut env = test_env(&host);

    assert_eq!(env.get("NOPE"), Err(FlagError::UnknownFlag("NOPE".into())));
    assert_eq!(env.set("NOPE", true), Err(FlagError::UnknownFlag("NOPE".into())));
}

#[test]
fn test_set_with_wrong_type_is_rejected() {
    let host = host(true, 8, false);
    let mut env = test_env(&host);

    assert!(matches!(env.set("PACKED", 1.0), Err(FlagError::InvalidFlagValue { .. })));
    assert!(matches!(env.set("HANDOFF", f64::NAN), Err(FlagError::InvalidFlagValue { .. })));
    assert_eq!(
        env.get_bool("HANDOFF"),
        Err(FlagError::TypeMismatch {
            name: "HANDOFF".into(),
            actual: FlagType::Number,
            requested: FlagType::Bool,
        })
    );
}

#[test]
fn test_set_flags_is_all_or_nothing() {
    let host = host(true, 8, false);
    let mut env = test_env(&host);

    let result = env.set_flags([("HANDOFF", 64.0), ("FLUSH", -7.0)]);
    assert!(matches!(result, Err(FlagError::InvalidFlagValue { .. })));
    assert_eq!(env.get_number("HANDOFF"), Ok(128.0));

    env.set_flags([("HANDOFF", 64.0), ("FLUSH", 2.0)]).unwrap();
    assert_eq!(env.get_number("HANDOFF"), Ok(64.0));
    assert_eq!(env.get_number("FLUSH"), Ok(2.0));
}

#[test]
fn test_flags_snapshot_merges_cache_and_overrides() {
    let host = host(true, 8, false);
    let mut env = test_env(&host);
    assert!(env.flags().is_empty());

    env.get("PACKED").unwrap();
    env.set("HANDOFF", 32.0).unwrap();
    env.get("PACKED").unwrap();

    let flags = env.flags();
    assert_eq!(flags.get("PACKED"), Some(&FlagValue::Bool(true)));
    assert_eq!(flags.get("HAS_ACCEL"), Some(&FlagValue::Bool(true)));
    assert_eq!(flags.get("HANDOFF"), Some(&FlagValue::Number(32.0)));
    assert_eq!(flags.get("MAX_UNITS"), None);

    env.reset();
    assert!(env.flags().is_empty());
}

#[test]
fn test_probe_failure_propagates_and_is_not_cached() {
    init_logging();
    let healthy = Arc::new(AtomicBool::new(false));
    let probe_state = Arc::clone(&healthy);
    let probes = ProbeTable::new().with("units", move || {
        if probe_state.load(Ordering::SeqCst) {
            Ok(FlagValue::Number(8.0))
        } else {
            Err(gpu_env::ProbeError::failed("units", "context lost"))
        }
    });
    let mut registry = FlagRegistry::new();
    registry
        .register(FlagDefinition::number("UNITS", |r| r.probe_number("units")))
        .unwrap();
    let mut env = Environment::with_probe(registry, Arc::new(probes));

    assert_eq!(
        env.get("UNITS"),
        Err(FlagError::Probe(gpu_env::ProbeError::failed("units", "context lost")))
    );
    healthy.store(true, Ordering::SeqCst);
    assert_eq!(env.get_number("UNITS"), Ok(8.0));
}

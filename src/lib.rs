//! gpu_env: capability-derived runtime flags for GPU tensor backends.
//!
//! A tensor backend has dozens of knobs whose right value depends on the
//! machine it runs on: whether kernels should be packed, how large a
//! texture may be, when to hand small ops back to the CPU. This crate
//! computes those knobs lazily from each other and from hardware queries,
//! caches the answers, and lets users override any of them.
//!
//! # Features
//!
//! - Declarative flag registry with evaluators, validators and set hooks.
//! - Lazy resolution with caching, overrides and cycle detection.
//! - Capability probes abstracting the host (GPU limits, mobile detection).
//! - The complete WebGL backend flag set, with a scriptable mock device.
//! - Configuration from `NAME:value` strings and the `GPU_ENV_FLAGS` variable.
//!
//! # Modules
//!
//! - [`registry`]: Flag definitions and the registry holding them.
//! - [`environment`]: The flag store: resolution, overrides, cache.
//! - [`probe`]: Capability probe contract and simple probes.
//! - [`config`]: Parsing flag values from strings and the environment.
//! - [`webgl`]: WebGL backend flags and device probes.
//!
//! # Feature Flags
//!
//! - `wgpu`: Enables [`webgl::WgpuDevice`], answering capability queries
//!   from a real GPU adapter.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use gpu_env::webgl::{self, DeviceProbe, MockDevice, WebGlFlag};
//!
//! let probe = Arc::new(DeviceProbe::new(MockDevice::webgl2()));
//! let mut env = webgl::environment(probe.clone()).unwrap();
//!
//! probe.device().set_max_texture_image_units(20);
//! assert_eq!(env.get_number(WebGlFlag::MaxTexturesInShader).unwrap(), 16.0);
//!
//! env.set(WebGlFlag::Pack, false).unwrap();
//! assert!(!env.get_bool(WebGlFlag::PackReduce).unwrap());
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod probe;
pub mod registry;
pub mod value;
pub mod webgl;

pub use environment::{Environment, Resolver, SharedEnvironment};
pub use error::{FlagError, ProbeError};
pub use registry::{FlagDefinition, FlagRegistry};
pub use value::{FlagType, FlagValue};

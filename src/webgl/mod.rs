//! WebGL backend flags.
//!
//! This module is a *user* of the engine: it fills a [`FlagRegistry`] with
//! the flags a WebGL tensor backend reads at runtime, wired to a
//! [`GlDevice`] through a [`DeviceProbe`].
//!
//! # Flag graph
//!
//! ```text
//!   webgl1 / webgl2 probes ─▶ WEBGL_VERSION ─▶ HAS_WEBGL ─▶ WEBGL_PACK ─▶ WEBGL_PACK_* …
//!                                  │
//!                                  ├─▶ WEBGL_BUFFER_SUPPORTED
//!                                  ├─▶ WEBGL_DISJOINT_QUERY_TIMER_EXTENSION_VERSION ─▶ …_RELIABLE ◀─ is_mobile
//!                                  └─▶ WEBGL_RENDER_FLOAT32_CAPABLE ─▶ …_ENABLED ◀─ WEBGL_FORCE_F16_TEXTURES
//!                                                                         └─▶ WEBGL_SIZE_UPLOAD_UNIFORM
//! ```
//!
//! Limits (`WEBGL_MAX_TEXTURE_SIZE`, `WEBGL_MAX_TEXTURES_IN_SHADER`) come
//! straight from the device, the latter capped at
//! [`MAX_TEXTURES_IN_SHADER_CAP`]. Thresholds are literals except
//! `WEBGL_FLUSH_THRESHOLD`, which flushes after every call on mobile.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use gpu_env::webgl::{self, DeviceProbe, MockDevice, WebGlFlag};
//!
//! let probe = Arc::new(DeviceProbe::new(MockDevice::webgl2()));
//! let mut env = webgl::environment(probe).unwrap();
//!
//! assert!(env.get_bool(WebGlFlag::Pack).unwrap());
//! webgl::force_half_float(&mut env).unwrap();
//! assert!(!env.get_bool(WebGlFlag::RenderFloat32Enabled).unwrap());
//! ```

use std::sync::Arc;

use log::warn;

use crate::environment::Environment;
use crate::error::FlagError;
use crate::probe::CapabilityProbe;
use crate::registry::{FlagDefinition, FlagRegistry};
use crate::value::FlagValue;

mod device;
mod mock;
#[cfg(feature = "wgpu")]
mod wgpu;

pub use device::{Capability, DeviceProbe, GlDevice};
pub use mock::MockDevice;
#[cfg(feature = "wgpu")]
pub use self::wgpu::{GpuError, WgpuDevice};

/// Upper bound applied to the device's texture image unit count.
pub const MAX_TEXTURES_IN_SHADER_CAP: f64 = 16.0;

/// Uniform upload size used when float32 rendering is enabled.
pub const SIZE_UPLOAD_UNIFORM: f64 = 4.0;

macro_rules! webgl_flags {
    ($( $(#[$doc:meta])* $variant:ident => $name:literal, )*) => {
        /// Every flag registered by [`register_flags`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum WebGlFlag {
            $( $(#[$doc])* $variant, )*
        }

        impl WebGlFlag {
            /// All flags, in registration order.
            pub const ALL: &'static [WebGlFlag] = &[$( WebGlFlag::$variant, )*];

            /// The registry name of the flag.
            pub const fn name(self) -> &'static str {
                match self {
                    $( WebGlFlag::$variant => $name, )*
                }
            }
        }
    };
}

webgl_flags! {
    /// Running under a test harness.
    IsTest => "IS_TEST",
    /// Checks every op result for NaNs; slow.
    DebugMode => "DEBUG",
    /// 2, 1, or 0 when no WebGL context can be created.
    Version => "WEBGL_VERSION",
    /// Any WebGL version is usable.
    HasWebGl => "HAS_WEBGL",
    CheckNumericalProblems => "WEBGL_CHECK_NUMERICAL_PROBLEMS",
    BufferSupported => "WEBGL_BUFFER_SUPPORTED",
    CpuForward => "WEBGL_CPU_FORWARD",
    /// Forces half float textures even where float32 rendering works.
    ForceF16Textures => "WEBGL_FORCE_F16_TEXTURES",
    /// Packed (4 values per texel) kernels.
    Pack => "WEBGL_PACK",
    PackNormalization => "WEBGL_PACK_NORMALIZATION",
    PackClip => "WEBGL_PACK_CLIP",
    PackDepthwiseConv => "WEBGL_PACK_DEPTHWISECONV",
    PackBinaryOperations => "WEBGL_PACK_BINARY_OPERATIONS",
    PackUnaryOperations => "WEBGL_PACK_UNARY_OPERATIONS",
    PackArrayOperations => "WEBGL_PACK_ARRAY_OPERATIONS",
    PackImageOperations => "WEBGL_PACK_IMAGE_OPERATIONS",
    PackReduce => "WEBGL_PACK_REDUCE",
    LazilyUnpack => "WEBGL_LAZILY_UNPACK",
    ConvIm2Col => "WEBGL_CONV_IM2COL",
    PackConv2dTranspose => "WEBGL_PACK_CONV2DTRANSPOSE",
    MaxTextureSize => "WEBGL_MAX_TEXTURE_SIZE",
    MaxTexturesInShader => "WEBGL_MAX_TEXTURES_IN_SHADER",
    DisjointQueryTimerExtensionVersion => "WEBGL_DISJOINT_QUERY_TIMER_EXTENSION_VERSION",
    /// Timer queries exist and the device is not mobile.
    DisjointQueryTimerExtensionReliable => "WEBGL_DISJOINT_QUERY_TIMER_EXTENSION_RELIABLE",
    RenderFloat32Capable => "WEBGL_RENDER_FLOAT32_CAPABLE",
    RenderFloat32Enabled => "WEBGL_RENDER_FLOAT32_ENABLED",
    DownloadFloatEnabled => "WEBGL_DOWNLOAD_FLOAT_ENABLED",
    FenceApiEnabled => "WEBGL_FENCE_API_ENABLED",
    SizeUploadUniform => "WEBGL_SIZE_UPLOAD_UNIFORM",
    /// Bytes of texture memory before deletion kicks in; -1 never deletes.
    DeleteTextureThreshold => "WEBGL_DELETE_TEXTURE_THRESHOLD",
    /// Calls between manual flushes; -1 never flushes.
    FlushThreshold => "WEBGL_FLUSH_THRESHOLD",
    CpuHandoffSizeThreshold => "CPU_HANDOFF_SIZE_THRESHOLD",
    UseShapesUniforms => "WEBGL_USE_SHAPES_UNIFORMS",
    TopkLastDimCpuHandoffSizeThreshold => "TOPK_LAST_DIM_CPU_HANDOFF_SIZE_THRESHOLD",
    TopkKCpuHandoffThreshold => "TOPK_K_CPU_HANDOFF_THRESHOLD",
    ExpConv => "WEBGL_EXP_CONV",
    SoftwareWebGlEnabled => "SOFTWARE_WEBGL_ENABLED",
    MaxSizeForNarrowTexture => "WEBGL_MAX_SIZE_FOR_NARROW_TEXTURE",
    AutoSquarifyNarrowTextureShape => "WEBGL_AUTO_SQUARIFY_NARROW_TEXTURE_SHAPE",
    WebGl2IsNanCustom => "WEBGL2_ISNAN_CUSTOM",
    EngineCompileOnly => "ENGINE_COMPILE_ONLY",
}

impl AsRef<str> for WebGlFlag {
    fn as_ref(&self) -> &str {
        self.name()
    }
}

impl core::fmt::Display for WebGlFlag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Flags that simply follow `WEBGL_PACK`.
const PACK_FOLLOWERS: &[WebGlFlag] = &[
    WebGlFlag::PackNormalization,
    WebGlFlag::PackClip,
    WebGlFlag::PackDepthwiseConv,
    WebGlFlag::PackBinaryOperations,
    WebGlFlag::PackUnaryOperations,
    WebGlFlag::PackArrayOperations,
    WebGlFlag::PackImageOperations,
    WebGlFlag::PackReduce,
    WebGlFlag::LazilyUnpack,
    WebGlFlag::ConvIm2Col,
    WebGlFlag::PackConv2dTranspose,
];

/// A validator accepting `-1` or any value `>= 0`.
fn minus_one_or_non_negative(
    flag: WebGlFlag,
    meaning: &'static str,
) -> impl Fn(&FlagValue) -> Result<(), String> + Send + Sync + 'static {
    move |value: &FlagValue| match value.as_number() {
        Some(n) if n >= 0.0 || n == -1.0 => Ok(()),
        _ => Err(format!("{flag} must be -1 (indicating {meaning}) or at least 0")),
    }
}

/// Capability-gated flag that is `false` without a WebGL context and
/// otherwise answers a boolean probe, optionally only on WebGL 2.
fn gated_probe(flag: WebGlFlag, capability: Capability, webgl2_only: bool) -> FlagDefinition {
    FlagDefinition::boolean(flag.name(), move |r| {
        let version = r.get_number(WebGlFlag::Version)?;
        if version == 0.0 || (webgl2_only && version != 2.0) {
            return Ok(false);
        }
        r.probe_bool(capability)
    })
}

/// Registers the core and WebGL flags into `registry`.
///
/// # Errors
///
/// [`FlagError::DuplicateFlag`] if any of the names is already taken.
pub fn register_flags(registry: &mut FlagRegistry) -> Result<(), FlagError> {
    use WebGlFlag as F;

    registry.register(FlagDefinition::constant(F::IsTest.name(), false))?;
    registry.register(FlagDefinition::constant(F::DebugMode.name(), false).with_set_hook(|value| {
        if value.as_bool() == Some(true) {
            warn!(
                "debugging mode is ON: every op result is downloaded and checked for NaNs, \
                 which significantly impacts performance"
            );
        }
    }))?;

    registry.register(FlagDefinition::number(F::Version.name(), |r| {
        if r.probe_bool(Capability::WebGl2)? {
            Ok(2.0)
        } else if r.probe_bool(Capability::WebGl1)? {
            Ok(1.0)
        } else {
            Ok(0.0)
        }
    }))?;
    registry.register(FlagDefinition::boolean(F::HasWebGl.name(), |r| {
        Ok(r.get_number(F::Version)? > 0.0)
    }))?;
    registry.register(FlagDefinition::constant(F::CheckNumericalProblems.name(), false))?;
    registry.register(FlagDefinition::boolean(F::BufferSupported.name(), |r| {
        Ok(r.get_number(F::Version)? == 2.0)
    }))?;
    registry.register(FlagDefinition::constant(F::CpuForward.name(), true))?;
    registry.register(FlagDefinition::constant(F::ForceF16Textures.name(), false))?;

    registry.register(FlagDefinition::boolean(F::Pack.name(), |r| r.get_bool(F::HasWebGl)))?;
    for &flag in PACK_FOLLOWERS {
        registry.register(FlagDefinition::boolean(flag.name(), |r| r.get_bool(F::Pack)))?;
    }

    registry.register(FlagDefinition::number(F::MaxTextureSize.name(), |r| {
        r.probe_number(Capability::MaxTextureSize)
    }))?;
    registry.register(FlagDefinition::number(F::MaxTexturesInShader.name(), |r| {
        Ok(r.probe_number(Capability::MaxTextureImageUnits)?.min(MAX_TEXTURES_IN_SHADER_CAP))
    }))?;

    registry.register(FlagDefinition::number(F::DisjointQueryTimerExtensionVersion.name(), |r| {
        if r.get_number(F::Version)? == 0.0 {
            return Ok(0.0);
        }
        r.probe_number(Capability::DisjointQueryTimerVersion)
    }))?;
    registry.register(FlagDefinition::boolean(F::DisjointQueryTimerExtensionReliable.name(), |r| {
        Ok(r.get_number(F::DisjointQueryTimerExtensionVersion)? > 0.0 && !r.probe_bool(Capability::IsMobile)?)
    }))?;

    registry.register(gated_probe(F::RenderFloat32Capable, Capability::RenderFloat32, false))?;
    registry.register(FlagDefinition::boolean(F::RenderFloat32Enabled.name(), |r| {
        if r.get_bool(F::ForceF16Textures)? {
            return Ok(false);
        }
        r.get_bool(F::RenderFloat32Capable)
    }))?;
    registry.register(gated_probe(F::DownloadFloatEnabled, Capability::DownloadFloat, false))?;
    registry.register(gated_probe(F::FenceApiEnabled, Capability::FenceApi, true))?;
    registry.register(FlagDefinition::number(F::SizeUploadUniform.name(), |r| {
        Ok(if r.get_bool(F::RenderFloat32Enabled)? { SIZE_UPLOAD_UNIFORM } else { 0.0 })
    }))?;

    registry.register(
        FlagDefinition::constant(F::DeleteTextureThreshold.name(), -1.0)
            .with_validator(minus_one_or_non_negative(F::DeleteTextureThreshold, "never delete")),
    )?;
    registry.register(
        FlagDefinition::number(F::FlushThreshold.name(), |r| {
            Ok(if r.probe_bool(Capability::IsMobile)? { 1.0 } else { -1.0 })
        })
        .with_validator(minus_one_or_non_negative(F::FlushThreshold, "never manual flush")),
    )?;

    registry.register(FlagDefinition::constant(F::CpuHandoffSizeThreshold.name(), 128.0))?;
    registry.register(FlagDefinition::constant(F::UseShapesUniforms.name(), false))?;
    registry.register(FlagDefinition::constant(F::TopkLastDimCpuHandoffSizeThreshold.name(), 100_000.0))?;
    registry.register(FlagDefinition::constant(F::TopkKCpuHandoffThreshold.name(), 128.0))?;
    registry.register(FlagDefinition::constant(F::ExpConv.name(), false))?;
    registry.register(FlagDefinition::boolean(F::SoftwareWebGlEnabled.name(), |r| r.get_bool(F::IsTest)))?;
    registry.register(FlagDefinition::constant(F::MaxSizeForNarrowTexture.name(), f64::INFINITY))?;
    registry.register(FlagDefinition::constant(F::AutoSquarifyNarrowTextureShape.name(), false))?;
    registry.register(FlagDefinition::constant(F::WebGl2IsNanCustom.name(), false))?;
    registry.register(FlagDefinition::constant(F::EngineCompileOnly.name(), false))?;

    Ok(())
}

/// Builds an environment with every WebGL flag, answering capability
/// queries with `probe`.
///
/// # Errors
///
/// Only if registration fails, which cannot happen on a fresh registry.
pub fn environment(probe: Arc<dyn CapabilityProbe>) -> Result<Environment, FlagError> {
    let mut registry = FlagRegistry::new();
    register_flags(&mut registry)?;
    Ok(Environment::with_probe(registry, probe))
}

/// Forces half float textures, which turns float32 rendering off while
/// leaving `WEBGL_RENDER_FLOAT32_CAPABLE` untouched.
///
/// # Errors
///
/// [`FlagError::UnknownFlag`] if `env` was not built with [`register_flags`].
pub fn force_half_float(env: &mut Environment) -> Result<(), FlagError> {
    env.set(WebGlFlag::ForceF16Textures, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_flag_is_registered_once_in_order() {
        let mut registry = FlagRegistry::new();
        register_flags(&mut registry).unwrap();
        let names: Vec<&str> = registry.names().collect();
        let expected: Vec<&str> = WebGlFlag::ALL.iter().map(|f| f.name()).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn registering_twice_fails() {
        let mut registry = FlagRegistry::new();
        register_flags(&mut registry).unwrap();
        assert_eq!(
            register_flags(&mut registry),
            Err(FlagError::DuplicateFlag("IS_TEST".into()))
        );
    }

    #[test]
    fn threshold_validator_accepts_minus_one_and_non_negative() {
        let check = minus_one_or_non_negative(WebGlFlag::FlushThreshold, "never manual flush");
        assert!(check(&FlagValue::Number(-1.0)).is_ok());
        assert!(check(&FlagValue::Number(0.0)).is_ok());
        assert!(check(&FlagValue::Number(7.5)).is_ok());
        assert_eq!(
            check(&FlagValue::Number(-2.0)),
            Err(String::from(
                "WEBGL_FLUSH_THRESHOLD must be -1 (indicating never manual flush) or at least 0"
            ))
        );
    }
}

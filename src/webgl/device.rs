//! Device capability queries.
//!
//! [`GlDevice`] is the typed view of a GPU context: "which WebGL versions
//! work", "how large can a texture be", "is this a phone". [`DeviceProbe`]
//! adapts any device to the name-indexed [`CapabilityProbe`] contract used
//! by flag evaluators.
//!
//! The two limits that are expensive to read and never change for a given
//! context (maximum texture size and texture image units) are cached inside
//! the probe. The cache is independent of the flag environment: resetting
//! the environment keeps them, and [`DeviceProbe::reset_max_texture_size`] /
//! [`DeviceProbe::reset_max_textures_in_shader`] drop them when the context
//! is replaced.

use core::sync::atomic::{AtomicU64, Ordering};

use log::trace;

use crate::error::ProbeError;
use crate::probe::CapabilityProbe;
use crate::value::FlagValue;

/// Capabilities a [`DeviceProbe`] can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// A WebGL 1 context can be created.
    WebGl1,
    /// A WebGL 2 context can be created.
    WebGl2,
    /// Largest texture dimension.
    MaxTextureSize,
    /// Texture units available to a fragment shader (uncapped).
    MaxTextureImageUnits,
    /// Version of the disjoint timer query extension, 0 when absent.
    DisjointQueryTimerVersion,
    /// Float32 textures can be render targets.
    RenderFloat32,
    /// Float textures can be read back.
    DownloadFloat,
    /// Fence sync objects exist.
    FenceApi,
    /// The device is classified as mobile.
    IsMobile,
}

impl Capability {
    /// Every capability.
    pub const ALL: [Self; 9] = [
        Self::WebGl1,
        Self::WebGl2,
        Self::MaxTextureSize,
        Self::MaxTextureImageUnits,
        Self::DisjointQueryTimerVersion,
        Self::RenderFloat32,
        Self::DownloadFloat,
        Self::FenceApi,
        Self::IsMobile,
    ];

    /// Probe name of the capability.
    pub const fn name(self) -> &'static str {
        match self {
            Self::WebGl1 => "webgl1",
            Self::WebGl2 => "webgl2",
            Self::MaxTextureSize => "max_texture_size",
            Self::MaxTextureImageUnits => "max_texture_image_units",
            Self::DisjointQueryTimerVersion => "disjoint_query_timer_version",
            Self::RenderFloat32 => "render_float32",
            Self::DownloadFloat => "download_float",
            Self::FenceApi => "fence_api",
            Self::IsMobile => "is_mobile",
        }
    }

    /// Looks a capability up by probe name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl AsRef<str> for Capability {
    fn as_ref(&self) -> &str {
        self.name()
    }
}

/// Typed capability queries against a GPU context.
pub trait GlDevice: Send + Sync {
    /// Whether a context of the given WebGL version can be created.
    ///
    /// # Errors
    ///
    /// When the host cannot be queried at all.
    fn is_version_enabled(&self, version: u8) -> Result<bool, ProbeError>;

    /// Largest texture dimension of the context.
    ///
    /// # Errors
    ///
    /// When there is no context or the query fails.
    fn max_texture_size(&self) -> Result<u32, ProbeError>;

    /// Fragment shader texture image units of the context.
    ///
    /// # Errors
    ///
    /// When there is no context or the query fails.
    fn max_texture_image_units(&self) -> Result<u32, ProbeError>;

    /// Disjoint timer query extension version, 0 when not available.
    ///
    /// # Errors
    ///
    /// When there is no context or the query fails.
    fn disjoint_query_timer_version(&self) -> Result<u8, ProbeError>;

    /// Whether float32 textures can be rendered to.
    ///
    /// # Errors
    ///
    /// When there is no context or the query fails.
    fn can_render_to_float32(&self) -> Result<bool, ProbeError>;

    /// Whether float textures can be downloaded.
    ///
    /// # Errors
    ///
    /// When there is no context or the query fails.
    fn can_download_float(&self) -> Result<bool, ProbeError>;

    /// Whether fence sync objects are available.
    ///
    /// # Errors
    ///
    /// When there is no context or the query fails.
    fn fence_api_enabled(&self) -> Result<bool, ProbeError>;

    /// Whether the device counts as mobile. Defaults to the compile target.
    fn is_mobile(&self) -> bool {
        cfg!(any(target_os = "android", target_os = "ios"))
    }
}

/// A lazily read `u32` limit that can be forgotten again.
///
/// Stored widened to `u64` so that `u64::MAX` can mean "not read yet".
struct CachedLimit(AtomicU64);

impl CachedLimit {
    const UNSET: u64 = u64::MAX;

    const fn new() -> Self {
        Self(AtomicU64::new(Self::UNSET))
    }

    fn get_or_query(&self, query: impl FnOnce() -> Result<u32, ProbeError>) -> Result<u32, ProbeError> {
        let cached = self.0.load(Ordering::Acquire);
        if cached != Self::UNSET {
            #[allow(clippy::cast_possible_truncation)]
            return Ok(cached as u32);
        }
        let limit = query()?;
        self.0.store(u64::from(limit), Ordering::Release);
        Ok(limit)
    }

    fn clear(&self) {
        self.0.store(Self::UNSET, Ordering::Release);
    }
}

/// Adapts a [`GlDevice`] to [`CapabilityProbe`].
pub struct DeviceProbe<D> {
    device: D,
    max_texture_size: CachedLimit,
    max_texture_image_units: CachedLimit,
}

impl<D: GlDevice> DeviceProbe<D> {
    /// Wraps `device` with empty limit caches.
    pub const fn new(device: D) -> Self {
        Self {
            device,
            max_texture_size: CachedLimit::new(),
            max_texture_image_units: CachedLimit::new(),
        }
    }

    /// The wrapped device.
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Forgets the cached maximum texture size; the next query asks the device.
    pub fn reset_max_texture_size(&self) {
        self.max_texture_size.clear();
    }

    /// Forgets the cached texture image unit count.
    pub fn reset_max_textures_in_shader(&self) {
        self.max_texture_image_units.clear();
    }

    /// Answers a typed capability.
    ///
    /// # Errors
    ///
    /// Whatever the device reports.
    pub fn query_capability(&self, capability: Capability) -> Result<FlagValue, ProbeError> {
        trace!("querying device capability `{}`", capability.name());
        let device = &self.device;
        Ok(match capability {
            Capability::WebGl1 => device.is_version_enabled(1)?.into(),
            Capability::WebGl2 => device.is_version_enabled(2)?.into(),
            Capability::MaxTextureSize => {
                self.max_texture_size.get_or_query(|| device.max_texture_size())?.into()
            }
            Capability::MaxTextureImageUnits => self
                .max_texture_image_units
                .get_or_query(|| device.max_texture_image_units())?
                .into(),
            Capability::DisjointQueryTimerVersion => {
                FlagValue::Number(f64::from(device.disjoint_query_timer_version()?))
            }
            Capability::RenderFloat32 => device.can_render_to_float32()?.into(),
            Capability::DownloadFloat => device.can_download_float()?.into(),
            Capability::FenceApi => device.fence_api_enabled()?.into(),
            Capability::IsMobile => device.is_mobile().into(),
        })
    }
}

impl<D: GlDevice> CapabilityProbe for DeviceProbe<D> {
    fn query(&self, name: &str) -> Result<FlagValue, ProbeError> {
        let capability =
            Capability::from_name(name).ok_or_else(|| ProbeError::Unsupported(name.to_owned()))?;
        self.query_capability(capability)
    }
}

impl<D: core::fmt::Debug> core::fmt::Debug for DeviceProbe<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceProbe").field("device", &self.device).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webgl::MockDevice;

    #[test]
    fn capability_names_round_trip() {
        for capability in Capability::ALL {
            assert_eq!(Capability::from_name(capability.name()), Some(capability));
        }
        assert_eq!(Capability::from_name("max_texture_units"), None);
    }

    #[test]
    fn unknown_capability_is_unsupported() {
        let probe = DeviceProbe::new(MockDevice::webgl2());
        assert_eq!(
            probe.query("cuda_cores"),
            Err(ProbeError::Unsupported("cuda_cores".into()))
        );
    }

    #[test]
    fn limits_are_cached_until_reset() {
        let probe = DeviceProbe::new(MockDevice::webgl2());
        probe.device().set_max_texture_size(50);
        assert_eq!(probe.query("max_texture_size"), Ok(FlagValue::Number(50.0)));

        probe.device().set_max_texture_size(8192);
        assert_eq!(probe.query("max_texture_size"), Ok(FlagValue::Number(50.0)));
        assert_eq!(probe.device().max_texture_size_queries(), 1);

        probe.reset_max_texture_size();
        assert_eq!(probe.query("max_texture_size"), Ok(FlagValue::Number(8192.0)));
        assert_eq!(probe.device().max_texture_size_queries(), 2);
    }

    #[test]
    fn texture_units_are_reported_uncapped() {
        let probe = DeviceProbe::new(MockDevice::webgl2());
        probe.device().set_max_texture_image_units(32);
        assert_eq!(probe.query("max_texture_image_units"), Ok(FlagValue::Number(32.0)));
    }
}

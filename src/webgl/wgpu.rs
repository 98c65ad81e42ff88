//! Capability queries answered by a real GPU through `wgpu`.
//!
//! The default adapter is requested once per process (via `lazy_static`)
//! and shared by every [`WgpuDevice::new`]. Hosts that already own an
//! adapter can wrap it with [`WgpuDevice::from_adapter`] instead.
//!
//! The WebGL questions map onto adapter properties as follows:
//!
//! - any WebGL version: an adapter exists
//! - maximum texture size: `max_texture_dimension_2d`
//! - texture image units: `max_sampled_textures_per_shader_stage`
//! - disjoint timer queries: `Features::TIMESTAMP_QUERY` (reported as version 2)
//! - float32 rendering / download: `Rgba32Float` allows `RENDER_ATTACHMENT` / `COPY_SRC`
//! - fences: always available once there is a queue

use std::sync::Arc;

use log::{debug, warn};

use crate::error::ProbeError;
use crate::webgl::device::GlDevice;

/// Failure to acquire a GPU.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    /// An error in requesting the adapter.
    #[error("adapter error: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
}

/// Requests the default adapter, blocking until `wgpu` answers.
///
/// # Errors
///
/// [`GpuError::Adapter`] if no adapter matches the default options.
pub fn request_default_adapter() -> Result<wgpu::Adapter, GpuError> {
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
    debug!("using wgpu adapter {:?}", adapter.get_info());
    Ok(adapter)
}

lazy_static::lazy_static! {
    static ref DEFAULT_ADAPTER: Option<Arc<wgpu::Adapter>> = match request_default_adapter() {
        Ok(adapter) => Some(Arc::new(adapter)),
        Err(err) => {
            warn!("no GPU adapter available, reporting WebGL as unavailable: {err}");
            None
        }
    };
}

/// A [`GlDevice`] backed by a `wgpu` adapter.
#[derive(Debug, Clone)]
pub struct WgpuDevice {
    adapter: Option<Arc<wgpu::Adapter>>,
}

impl WgpuDevice {
    /// Uses the process-wide default adapter, requesting it on first use.
    pub fn new() -> Self {
        Self { adapter: DEFAULT_ADAPTER.clone() }
    }

    /// Uses an adapter the host already owns.
    pub fn from_adapter(adapter: wgpu::Adapter) -> Self {
        Self { adapter: Some(Arc::new(adapter)) }
    }

    /// Whether an adapter is present.
    pub fn has_adapter(&self) -> bool {
        self.adapter.is_some()
    }

    fn adapter(&self, what: &str) -> Result<&wgpu::Adapter, ProbeError> {
        self.adapter
            .as_deref()
            .ok_or_else(|| ProbeError::failed(what, "no GPU adapter available"))
    }

    fn float32_usages(&self, what: &str) -> Result<wgpu::TextureUsages, ProbeError> {
        let adapter = self.adapter(what)?;
        Ok(adapter.get_texture_format_features(wgpu::TextureFormat::Rgba32Float).allowed_usages)
    }
}

impl Default for WgpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GlDevice for WgpuDevice {
    fn is_version_enabled(&self, version: u8) -> Result<bool, ProbeError> {
        Ok(matches!(version, 1 | 2) && self.has_adapter())
    }

    fn max_texture_size(&self) -> Result<u32, ProbeError> {
        Ok(self.adapter("max_texture_size")?.limits().max_texture_dimension_2d)
    }

    fn max_texture_image_units(&self) -> Result<u32, ProbeError> {
        Ok(self.adapter("max_texture_image_units")?.limits().max_sampled_textures_per_shader_stage)
    }

    fn disjoint_query_timer_version(&self) -> Result<u8, ProbeError> {
        let features = self.adapter("disjoint_query_timer_version")?.features();
        Ok(if features.contains(wgpu::Features::TIMESTAMP_QUERY) { 2 } else { 0 })
    }

    fn can_render_to_float32(&self) -> Result<bool, ProbeError> {
        Ok(self.float32_usages("render_float32")?.contains(wgpu::TextureUsages::RENDER_ATTACHMENT))
    }

    fn can_download_float(&self) -> Result<bool, ProbeError> {
        Ok(self.float32_usages("download_float")?.contains(wgpu::TextureUsages::COPY_SRC))
    }

    fn fence_api_enabled(&self) -> Result<bool, ProbeError> {
        self.adapter("fence_api").map(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wgpu_device_is_consistent_with_adapter_presence() {
        let device = WgpuDevice::new();
        if device.has_adapter() {
            assert_eq!(device.is_version_enabled(2), Ok(true));
            assert!(device.max_texture_size().unwrap() > 0);
        } else {
            assert_eq!(device.is_version_enabled(1), Ok(false));
            assert!(device.max_texture_size().is_err());
        }
        assert_eq!(device.is_version_enabled(3), Ok(false));
    }
}

//! Scriptable [`GlDevice`] for tests and for hosts without a GPU.
//!
//! Every answer can be changed through `&self`, so a test can keep an
//! `Arc<DeviceProbe<MockDevice>>` next to the environment and reshape the
//! device between resolutions.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicUsize, Ordering};

use crate::error::ProbeError;
use crate::webgl::device::GlDevice;

const MOBILE_UNSET: u8 = 0;
const MOBILE_FALSE: u8 = 1;
const MOBILE_TRUE: u8 = 2;

/// A fake GPU context.
#[derive(Debug)]
pub struct MockDevice {
    webgl1: AtomicBool,
    webgl2: AtomicBool,
    context_lost: AtomicBool,
    max_texture_size: AtomicU32,
    max_texture_image_units: AtomicU32,
    disjoint_query_timer_version: AtomicU8,
    render_float32: AtomicBool,
    download_float: AtomicBool,
    fence_api: AtomicBool,
    mobile: AtomicU8,
    max_texture_size_queries: AtomicUsize,
    max_texture_image_units_queries: AtomicUsize,
}

impl MockDevice {
    /// A capable WebGL 2 desktop device.
    pub const fn webgl2() -> Self {
        Self {
            webgl1: AtomicBool::new(true),
            webgl2: AtomicBool::new(true),
            context_lost: AtomicBool::new(false),
            max_texture_size: AtomicU32::new(4096),
            max_texture_image_units: AtomicU32::new(16),
            disjoint_query_timer_version: AtomicU8::new(2),
            render_float32: AtomicBool::new(true),
            download_float: AtomicBool::new(true),
            fence_api: AtomicBool::new(true),
            mobile: AtomicU8::new(MOBILE_UNSET),
            max_texture_size_queries: AtomicUsize::new(0),
            max_texture_image_units_queries: AtomicUsize::new(0),
        }
    }

    /// A WebGL 1 only device without float32 render targets.
    pub fn webgl1() -> Self {
        let device = Self::webgl2();
        device.set_version(1);
        device.render_float32.store(false, Ordering::Release);
        device.disjoint_query_timer_version.store(1, Ordering::Release);
        device.max_texture_image_units.store(8, Ordering::Release);
        device
    }

    /// A host where no context can be created.
    pub fn headless() -> Self {
        let device = Self::webgl2();
        device.set_version(0);
        device
    }

    /// Enables WebGL versions up to `version` (0, 1 or 2).
    pub fn set_version(&self, version: u8) {
        self.webgl1.store(version >= 1, Ordering::Release);
        self.webgl2.store(version >= 2, Ordering::Release);
    }

    /// Makes every context query fail until restored.
    pub fn set_context_lost(&self, lost: bool) {
        self.context_lost.store(lost, Ordering::Release);
    }

    /// Sets the reported maximum texture size.
    pub fn set_max_texture_size(&self, size: u32) {
        self.max_texture_size.store(size, Ordering::Release);
    }

    /// Sets the reported texture image unit count.
    pub fn set_max_texture_image_units(&self, units: u32) {
        self.max_texture_image_units.store(units, Ordering::Release);
    }

    /// Sets the disjoint timer query extension version (0 = absent).
    pub fn set_disjoint_query_timer_version(&self, version: u8) {
        self.disjoint_query_timer_version.store(version, Ordering::Release);
    }

    /// Sets whether float32 textures can be rendered to.
    pub fn set_render_float32(&self, capable: bool) {
        self.render_float32.store(capable, Ordering::Release);
    }

    /// Overrides the mobile classification; `None` restores the target default.
    pub fn mock_is_mobile(&self, mobile: Option<bool>) {
        let encoded = match mobile {
            None => MOBILE_UNSET,
            Some(false) => MOBILE_FALSE,
            Some(true) => MOBILE_TRUE,
        };
        self.mobile.store(encoded, Ordering::Release);
    }

    /// How often the maximum texture size was read from the device.
    pub fn max_texture_size_queries(&self) -> usize {
        self.max_texture_size_queries.load(Ordering::Acquire)
    }

    /// How often the texture image unit count was read from the device.
    pub fn max_texture_image_units_queries(&self) -> usize {
        self.max_texture_image_units_queries.load(Ordering::Acquire)
    }

    fn context(&self, what: &str) -> Result<(), ProbeError> {
        if self.context_lost.load(Ordering::Acquire) {
            return Err(ProbeError::failed(what, "WebGL context lost"));
        }
        if !self.webgl1.load(Ordering::Acquire) {
            return Err(ProbeError::failed(what, "no WebGL context available"));
        }
        Ok(())
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::webgl2()
    }
}

impl GlDevice for MockDevice {
    fn is_version_enabled(&self, version: u8) -> Result<bool, ProbeError> {
        Ok(match version {
            1 => self.webgl1.load(Ordering::Acquire),
            2 => self.webgl2.load(Ordering::Acquire),
            _ => false,
        })
    }

    fn max_texture_size(&self) -> Result<u32, ProbeError> {
        self.context("max_texture_size")?;
        self.max_texture_size_queries.fetch_add(1, Ordering::AcqRel);
        Ok(self.max_texture_size.load(Ordering::Acquire))
    }

    fn max_texture_image_units(&self) -> Result<u32, ProbeError> {
        self.context("max_texture_image_units")?;
        self.max_texture_image_units_queries.fetch_add(1, Ordering::AcqRel);
        Ok(self.max_texture_image_units.load(Ordering::Acquire))
    }

    fn disjoint_query_timer_version(&self) -> Result<u8, ProbeError> {
        self.context("disjoint_query_timer_version")?;
        Ok(self.disjoint_query_timer_version.load(Ordering::Acquire))
    }

    fn can_render_to_float32(&self) -> Result<bool, ProbeError> {
        self.context("render_float32")?;
        Ok(self.render_float32.load(Ordering::Acquire))
    }

    fn can_download_float(&self) -> Result<bool, ProbeError> {
        self.context("download_float")?;
        Ok(self.download_float.load(Ordering::Acquire))
    }

    fn fence_api_enabled(&self) -> Result<bool, ProbeError> {
        self.context("fence_api")?;
        Ok(self.fence_api.load(Ordering::Acquire))
    }

    fn is_mobile(&self) -> bool {
        match self.mobile.load(Ordering::Acquire) {
            MOBILE_TRUE => true,
            MOBILE_FALSE => false,
            _ => cfg!(any(target_os = "android", target_os = "ios")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_report_expected_versions() {
        let webgl1 = MockDevice::webgl1();
        assert_eq!(webgl1.is_version_enabled(1), Ok(true));
        assert_eq!(webgl1.is_version_enabled(2), Ok(false));

        let headless = MockDevice::headless();
        assert_eq!(headless.is_version_enabled(1), Ok(false));
        assert!(headless.max_texture_size().is_err());
    }

    #[test]
    fn lost_context_fails_queries() {
        let device = MockDevice::webgl2();
        device.set_context_lost(true);
        assert_eq!(
            device.max_texture_image_units(),
            Err(ProbeError::failed("max_texture_image_units", "WebGL context lost"))
        );
        device.set_context_lost(false);
        assert_eq!(device.max_texture_image_units(), Ok(16));
    }

    #[test]
    fn mobile_mock_overrides_and_restores() {
        let device = MockDevice::webgl2();
        device.mock_is_mobile(Some(true));
        assert!(device.is_mobile());
        device.mock_is_mobile(Some(false));
        assert!(!device.is_mobile());
        device.mock_is_mobile(None);
        assert_eq!(device.is_mobile(), cfg!(any(target_os = "android", target_os = "ios")));
    }
}

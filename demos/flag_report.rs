//! Prints every WebGL flag as resolved on this machine.
//!
//! Run with `--features wgpu` to query the real GPU; without it a mock
//! WebGL 2 device is used. Values from `GPU_ENV_FLAGS` (e.g.
//! `GPU_ENV_FLAGS=WEBGL_PACK:false`) are applied before resolving.

use std::sync::Arc;

use gpu_env::config::FlagConfig;
use gpu_env::webgl::{self, DeviceProbe, WebGlFlag};
use gpu_env::Environment;

#[cfg(feature = "wgpu")]
fn probe() -> Arc<DeviceProbe<webgl::WgpuDevice>> {
    Arc::new(DeviceProbe::new(webgl::WgpuDevice::new()))
}

#[cfg(not(feature = "wgpu"))]
fn probe() -> Arc<DeviceProbe<webgl::MockDevice>> {
    Arc::new(DeviceProbe::new(webgl::MockDevice::webgl2()))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut env: Environment = webgl::environment(probe())?;
    env.apply_config(&FlagConfig::from_env()?)?;

    for &flag in WebGlFlag::ALL {
        match env.get(flag) {
            Ok(value) => println!("{flag:<48} {value}"),
            Err(err) => println!("{flag:<48} <{err}>"),
        }
    }
    Ok(())
}

use std::{path::PathBuf, time::Duration};

use gfx_hal::{InstanceConfig, SwapchainConfig};
use shared::Camera;

/// Everything the renderer needs before it sees a window.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub instance: InstanceConfig,
    pub swapchain: SwapchainConfig,
    /// RGBA clear value for the single color attachment.
    pub clear_color: [f32; 4],
    /// Directory SPIR-V paths passed to pipeline creation are resolved against.
    pub shader_root: PathBuf,
    pub fence_timeout: Duration,
    /// Consecutive fence timeouts tolerated before a frame fails.
    pub fence_retry_limit: u32,
    pub camera: Camera,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            instance: InstanceConfig::default(),
            swapchain: SwapchainConfig::default(),
            clear_color: [0.0, 1.0, 0.0, 1.0],
            shader_root: PathBuf::from(env!("OUT_DIR")),
            fence_timeout: Duration::from_millis(100),
            fence_retry_limit: 10,
            camera: Camera::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_samples() {
        let config = RendererConfig::default();
        assert_eq!(config.clear_color, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(config.fence_timeout, Duration::from_millis(100));
        assert!(config.fence_retry_limit > 0);
        assert_eq!(config.camera.fov_y_degrees, 45.0);
    }
}

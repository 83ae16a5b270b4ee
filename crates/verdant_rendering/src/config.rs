//! Renderer configuration.
//!
//! Loaded once from TOML at startup. The culling switches stay editable
//! between frames (console-variable style) through
//! [`crate::InstanceRenderer::config_mut`].
//!
//! ```toml
//! culling_enabled = true
//! occlusion_culling_enabled = true
//! lock_culling_frustum = false
//! draw_bounding_boxes = false
//! frames_in_flight = 2
//! animation_queue_capacity = 1024
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Instance renderer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Run the compute culling pass. When off, every draw call is drawn.
    pub culling_enabled: bool,
    /// Also test against the depth pyramid when one is supplied.
    pub occlusion_culling_enabled: bool,
    /// Keep culling with the last frustum while the camera moves.
    pub lock_culling_frustum: bool,
    /// Collect world-space bounds of every draw call for a debug drawer.
    pub draw_bounding_boxes: bool,
    /// Frames the GPU may lag behind the CPU. Retired buffers live this long.
    pub frames_in_flight: usize,
    /// Pending animation requests before producers get `AnimationQueueFull`.
    pub animation_queue_capacity: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            culling_enabled: true,
            occlusion_culling_enabled: true,
            lock_culling_frustum: false,
            draw_bounding_boxes: false,
            frames_in_flight: 2,
            animation_queue_capacity: 1024,
        }
    }
}

impl RendererConfig {
    /// Parses and validates a TOML document. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> RenderResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| RenderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: &Path) -> RenderResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RenderError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Rejects values the renderer cannot run with.
    pub fn validate(&self) -> RenderResult<()> {
        if self.frames_in_flight == 0 {
            return Err(RenderError::Config("frames_in_flight must be at least 1".into()));
        }
        if self.animation_queue_capacity == 0 {
            return Err(RenderError::Config(
                "animation_queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert!(config.culling_enabled);
        assert_eq!(config.frames_in_flight, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RendererConfig::from_toml_str("culling_enabled = false\n").unwrap();
        assert!(!config.culling_enabled);
        assert!(config.occlusion_culling_enabled);
        assert_eq!(config.animation_queue_capacity, 1024);
    }

    #[test]
    fn test_invalid_values() {
        let err = RendererConfig::from_toml_str("frames_in_flight = 0").unwrap_err();
        assert!(matches!(err, RenderError::Config(_)));
        assert!(RendererConfig::from_toml_str("culling_enabled = 3").is_err());
    }
}

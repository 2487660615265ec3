//! # Renderer Configuration
//!
//! Serializable settings for the frame pipeline. Loaded from TOML or RON via
//! [`Config`], validated before the renderer is initialized.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};
use crate::foundation::logging;

bitflags! {
    /// Buffers cleared at the start of every frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ClearMask: u32 {
        /// Color attachment
        const COLOR = 0b001;
        /// Depth attachment
        const DEPTH = 0b010;
        /// Stencil attachment
        const STENCIL = 0b100;
    }
}

/// Default float precision written into every shader preamble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderPrecision {
    /// `highp`
    #[default]
    Highp,
    /// `mediump`
    Mediump,
    /// `lowp`
    Lowp,
}

impl ShaderPrecision {
    /// GLSL qualifier
    pub fn as_glsl(self) -> &'static str {
        match self {
            Self::Highp => "highp",
            Self::Mediump => "mediump",
            Self::Lowp => "lowp",
        }
    }
}

/// # Renderer Configuration
///
/// Behaviour switches for the frame pipeline. Every field has a default so a
/// partial file is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Log level used by binaries when they set up `env_logger`
    pub log_level: String,
    /// Clear color (RGBA, each in 0..=1)
    pub clear_color: [f32; 4],
    /// Buffers cleared at frame start
    pub clear_mask: ClearMask,
    /// Float precision in the shader preamble
    pub shader_precision: ShaderPrecision,
    /// Cache attribute bindings in vertex array objects
    pub use_vertex_arrays: bool,
    /// Free GPU resources that were not used during a frame
    pub gc_enabled: bool,
    /// Skip drawables whose bounds fall outside the camera frustum
    pub frustum_culling: bool,
    /// Sort transparent drawables back to front
    pub sort_transparent: bool,
    /// Upper bound on lights packed per category, 0 for unbounded
    pub max_lights_per_category: usize,
}

impl RendererConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_mask: ClearMask::COLOR | ClearMask::DEPTH,
            shader_precision: ShaderPrecision::Highp,
            use_vertex_arrays: true,
            gc_enabled: true,
            frustum_culling: true,
            sort_transparent: true,
            max_lights_per_category: 0,
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set clear color
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Enable or disable end-of-frame resource collection
    pub fn with_gc(mut self, enabled: bool) -> Self {
        self.gc_enabled = enabled;
        self
    }

    /// Enable or disable frustum culling
    pub fn with_frustum_culling(mut self, enabled: bool) -> Self {
        self.frustum_culling = enabled;
        self
    }

    /// Enable or disable vertex array objects
    pub fn with_vertex_arrays(mut self, enabled: bool) -> Self {
        self.use_vertex_arrays = enabled;
        self
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for RendererConfig {
    /// Known log level and clear color within 0..=1
    fn validate(&self) -> Result<(), ConfigError> {
        if logging::parse_level(&self.log_level).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }

        if self
            .clear_color
            .iter()
            .any(|c| !c.is_finite() || !(0.0..=1.0).contains(c))
        {
            return Err(ConfigError::Invalid(format!(
                "clear color components must be within 0..=1, got {:?}",
                self.clear_color
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;
    use std::path::Path;

    #[test]
    fn test_default_is_valid() {
        assert!(RendererConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RendererConfig::from_toml_str(
            "log_level = \"debug\"\ngc_enabled = false\nclear_color = [0.1, 0.2, 0.3, 1.0]\n",
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert!(!config.gc_enabled);
        assert!(config.use_vertex_arrays);
        assert_eq!(config.clear_mask, ClearMask::COLOR | ClearMask::DEPTH);
    }

    #[test]
    fn test_ron_precision() {
        let config = RendererConfig::from_ron_str("(shader_precision: mediump)").unwrap();
        assert_eq!(config.shader_precision, ShaderPrecision::Mediump);
    }

    #[test]
    fn test_rejects_out_of_range_clear_color() {
        let config = RendererConfig::new().with_clear_color([1.5, 0.0, 0.0, 1.0]);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_loading_rejects_invalid_values() {
        let err = RendererConfig::from_toml_str("clear_color = [2.0, 0.0, 0.0, 1.0]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = RendererConfig::from_ron_str("(shader_precision: ultra)").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: ConfigFormat::Ron, .. }));
    }

    #[test]
    fn test_format_follows_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("renderer.toml")), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_path(Path::new("renderer.ron")), Some(ConfigFormat::Ron));
        let err = RendererConfig::load_from_file("renderer.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_saved_file_loads_back() {
        let dir = std::env::temp_dir();
        let config = RendererConfig::new()
            .with_log_level("warn")
            .with_frustum_culling(false);

        for name in ["scene_engine_renderer_test.toml", "scene_engine_renderer_test.ron"] {
            let path = dir.join(name);
            config.save_to_file(&path).unwrap();
            let loaded = RendererConfig::load_from_file(&path).unwrap();
            std::fs::remove_file(&path).unwrap();

            assert_eq!(loaded.log_level, "warn");
            assert!(!loaded.frustum_culling);
            assert_eq!(loaded.clear_mask, config.clear_mask);
        }
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let config = RendererConfig::new().with_log_level("chatty");
        assert!(config.validate().is_err());
    }
}

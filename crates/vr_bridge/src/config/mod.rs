//! Configuration system
//!
//! [`VrSettings`] carries the host-tunable values the bridge reads: the
//! enable toggle, world scale, far clip and MSAA sample count. Settings can be
//! kept in TOML or RON files through the [`Config`] trait.

pub use serde::{Deserialize, Serialize};

use crate::render::view::NEAR_CLIP;

/// World units per tracking-space meter used by default.
pub const DEFAULT_WORLD_SCALE: f32 = 26.2467;

/// Default far clip distance in world units.
pub const DEFAULT_FAR_CLIP: f32 = 16384.0;

/// Default MSAA sample count for the per-eye draw targets.
pub const DEFAULT_MSAA_SAMPLES: u32 = 4;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its accepted range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// # VR Settings
///
/// Values the host may change between frames. `world_scale` and `far_clip`
/// are re-read every time eye matrices are composed, so changing them never
/// requires re-initializing the session. `enabled` mirrors the host's toggle
/// and is written back to `false` when an enable attempt fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VrSettings {
    /// Whether the host wants the VR session running
    pub enabled: bool,
    /// World units per tracking-space meter
    pub world_scale: f32,
    /// Far clip plane distance in world units
    pub far_clip: f32,
    /// Samples per pixel of the per-eye draw targets
    pub msaa_samples: u32,
}

impl Default for VrSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            world_scale: DEFAULT_WORLD_SCALE,
            far_clip: DEFAULT_FAR_CLIP,
            msaa_samples: DEFAULT_MSAA_SAMPLES,
        }
    }
}

impl VrSettings {
    /// Set the enable toggle
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the world scale
    pub fn with_world_scale(mut self, world_scale: f32) -> Self {
        self.world_scale = world_scale;
        self
    }

    /// Set the far clip distance
    pub fn with_far_clip(mut self, far_clip: f32) -> Self {
        self.far_clip = far_clip;
        self
    }

    /// Set the MSAA sample count
    pub fn with_msaa_samples(mut self, samples: u32) -> Self {
        self.msaa_samples = samples;
        self
    }

    /// Check ranges; the near clip is fixed so the far clip must lie past it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::check_world_scale(self.world_scale)?;
        Self::check_far_clip(self.far_clip)?;
        Self::check_msaa_samples(self.msaa_samples)
    }

    /// World scale must be a finite positive number
    pub fn check_world_scale(world_scale: f32) -> Result<(), ConfigError> {
        if world_scale.is_finite() && world_scale > 0.0 {
            return Ok(());
        }
        Err(ConfigError::Invalid {
            field: "world_scale",
            reason: format!("must be a positive number, got {world_scale}"),
        })
    }

    /// Far clip must be finite and beyond the fixed near clip
    pub fn check_far_clip(far_clip: f32) -> Result<(), ConfigError> {
        if far_clip.is_finite() && far_clip > NEAR_CLIP {
            return Ok(());
        }
        Err(ConfigError::Invalid {
            field: "far_clip",
            reason: format!("must exceed the near clip ({NEAR_CLIP}), got {far_clip}"),
        })
    }

    /// At least one sample per pixel
    pub fn check_msaa_samples(samples: u32) -> Result<(), ConfigError> {
        if samples > 0 {
            return Ok(());
        }
        Err(ConfigError::Invalid {
            field: "msaa_samples",
            reason: "must be at least 1".to_string(),
        })
    }
}

impl Config for VrSettings {}

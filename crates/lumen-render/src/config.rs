// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runtime configuration, loaded from RON.

use lumen_core::renderer::api::{
    DescriptorPoolDescriptor, DescriptorPoolSize, DescriptorType, PresentMode, TextureFormat,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid RON for [`Config`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// The configuration could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] ron::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Renderer settings.
    pub renderer: RendererConfig,
    /// Engine loop settings.
    pub engine: EngineConfig,
    /// Logger settings.
    pub logging: LoggingSection,
}

impl Config {
    /// Parses a configuration from RON text. Missing keys take their defaults.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Reads and parses a RON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::info!("Config: loading '{}'", path.as_ref().display());
        Self::from_ron_str(&text)
    }

    /// Serializes the configuration as pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }
}

/// Renderer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// When false, frames are not rendered at all.
    pub video_enabled: bool,
    /// Enables the shadow map pass.
    pub shadow_maps_enabled: bool,
    /// Enables the render-to-texture pass.
    pub render_to_textures_enabled: bool,
    /// Clear color of the main target.
    pub clear_color: [f32; 4],
    /// Depth clear value.
    pub clear_depth: f32,
    /// Stencil clear value.
    pub clear_stencil: u32,
    /// Sizing of the renderer-wide descriptor pool.
    pub descriptor_pool: DescriptorPoolConfig,
    /// Swap chain preferences.
    pub swap_chain: SwapChainConfig,
    /// Number of frames averaged by the statistics.
    pub statistics_window: usize,
    /// Delay between framebuffer polls while the window is minimized.
    pub resize_poll_interval_ms: u64,
    /// Maximum number of polls before swap chain recreation gives up.
    pub resize_max_polls: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            video_enabled: true,
            shadow_maps_enabled: true,
            render_to_textures_enabled: true,
            clear_color: [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0, 1.0],
            clear_depth: 1.0,
            clear_stencil: 0,
            descriptor_pool: DescriptorPoolConfig::default(),
            swap_chain: SwapChainConfig::default(),
            statistics_window: 30,
            resize_poll_interval_ms: 16,
            resize_max_polls: 600,
        }
    }
}

/// Sizing of the descriptor pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorPoolConfig {
    /// Maximum number of sets.
    pub max_sets: u32,
    /// Number of descriptors per type.
    pub sizes: Vec<DescriptorPoolSize>,
}

impl Default for DescriptorPoolConfig {
    fn default() -> Self {
        Self {
            max_sets: 64,
            sizes: vec![
                DescriptorPoolSize {
                    ty: DescriptorType::UniformBuffer,
                    count: 16,
                },
                DescriptorPoolSize {
                    ty: DescriptorType::CombinedImageSampler,
                    count: 16,
                },
                DescriptorPoolSize {
                    ty: DescriptorType::StorageBuffer,
                    count: 8,
                },
            ],
        }
    }
}

impl DescriptorPoolConfig {
    /// The device descriptor for this configuration.
    pub fn descriptor(&self) -> DescriptorPoolDescriptor {
        DescriptorPoolDescriptor {
            label: Some(Cow::Borrowed("Renderer Descriptor Pool")),
            max_sets: self.max_sets,
            sizes: self.sizes.clone(),
        }
    }
}

/// Swap chain preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapChainConfig {
    /// Requested number of images.
    pub preferred_image_count: u32,
    /// Waits for vertical sync when presenting.
    pub vsync: bool,
    /// Format of the main depth buffer, `None` for no depth buffer.
    pub depth_format: Option<TextureFormat>,
}

impl Default for SwapChainConfig {
    fn default() -> Self {
        Self {
            preferred_image_count: 3,
            vsync: true,
            depth_format: Some(TextureFormat::Depth32Float),
        }
    }
}

impl SwapChainConfig {
    /// The present mode implied by `vsync`.
    pub fn present_mode(&self) -> PresentMode {
        if self.vsync {
            PresentMode::Fifo
        } else {
            PresentMode::Immediate
        }
    }
}

/// Engine loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed rate of the logic thread.
    pub logic_rate_hz: f64,
    /// Optional cap of the render thread.
    pub max_frame_rate: Option<f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            logic_rate_hz: 60.0,
            max_frame_rate: None,
        }
    }
}

/// The `logging` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// An `env_logger` filter string overriding `RUST_LOG`.
    pub filter: Option<String>,
    /// Colored output.
    pub colored: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: None,
            colored: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_ron_str("()").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.renderer.statistics_window, 30);
        assert_eq!(config.renderer.descriptor_pool.max_sets, 64);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let text = "(renderer: (video_enabled: false, swap_chain: (vsync: false)), engine: (logic_rate_hz: 30.0))";
        let config = Config::from_ron_str(text).unwrap();
        assert!(!config.renderer.video_enabled);
        assert!(config.renderer.shadow_maps_enabled);
        assert_eq!(config.renderer.swap_chain.present_mode(), PresentMode::Immediate);
        assert_eq!(config.renderer.swap_chain.preferred_image_count, 3);
        assert_eq!(config.engine.logic_rate_hz, 30.0);
    }

    #[test]
    fn invalid_document_is_a_parse_error() {
        assert!(matches!(
            Config::from_ron_str("(renderer: 12)"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn serialized_config_parses_back() {
        let mut config = Config::default();
        config.renderer.clear_stencil = 7;
        config.logging.filter = Some("debug".to_string());
        let text = config.to_ron_string().unwrap();
        assert_eq!(Config::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn descriptor_pool_descriptor_matches_config() {
        let pool = DescriptorPoolConfig::default().descriptor();
        assert_eq!(pool.capacity_of(DescriptorType::UniformBuffer), 16);
        assert_eq!(pool.capacity_of(DescriptorType::StorageBuffer), 8);
    }
}

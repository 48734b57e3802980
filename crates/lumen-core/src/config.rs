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

//! Renderer configuration.
//!
//! Every section has a `Default`, and missing fields in a RON file fall back to
//! it, so a config file only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Settings of the frame ring and its per-frame buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Number of frame slots, 2 (double) or 3 (triple buffering).
    pub frames_in_flight: usize,
    /// Upper bound on the CPU wait for a slot's fence, in milliseconds.
    pub fence_timeout_ms: u64,
    /// Capacity of the per-frame object array.
    pub max_objects: u32,
    /// Capacity of the per-frame material array.
    pub max_materials: u32,
    /// Capacity of the per-frame light array.
    pub max_lights: u32,
    /// Capacity of the bindless texture table.
    pub max_textures: u32,
}

impl FrameConfig {
    /// The fence wait bound as a [`Duration`].
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            fence_timeout_ms: 1000,
            max_objects: 10_000,
            max_materials: 1024,
            max_lights: 256,
            max_textures: 1024,
        }
    }
}

/// Settings of the geometry arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Growth granularity of every vertex pool, in bytes.
    pub vertex_page_size: u64,
    /// Growth granularity of the index pool, in bytes.
    pub index_page_size: u64,
    /// Number of pages allocated up front for each pool.
    pub initial_pages: u64,
    /// A pool is compacted when live usage drops below this fraction of its capacity.
    pub shrink_usage_threshold: f32,
    /// Usage a pool is compacted to.
    pub shrink_target_usage: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            vertex_page_size: 64 * MIB,
            index_page_size: 64 * MIB,
            initial_pages: 1,
            shrink_usage_threshold: 0.5,
            shrink_target_usage: 0.75,
        }
    }
}

/// Capacity limits of the draw-batch builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// A command never draws more instances than this.
    pub max_instances_per_command: u32,
    /// A batch never holds more commands than this.
    pub max_commands_per_batch: u32,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_instances_per_command: 10_000,
            max_commands_per_batch: 10_000,
        }
    }
}

/// Settings of the per-object worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of worker threads, `0` meaning the available parallelism.
    pub worker_threads: usize,
    /// Below this many objects per worker, work is not split further.
    pub min_objects_per_worker: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            min_objects_per_worker: 64,
        }
    }
}

/// Root configuration of the renderer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Frame ring settings.
    pub frames: FrameConfig,
    /// Geometry arena settings.
    pub geometry: GeometryConfig,
    /// Draw-batch limits.
    pub batching: BatchingConfig,
    /// Worker pool settings.
    pub workers: WorkerConfig,
}

/// An error raised while loading or validating a [`RendererConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The RON text could not be parsed.
    Parse(String),
    /// A value is out of its accepted range.
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "Failed to read renderer config: {err}"),
            ConfigError::Parse(msg) => write!(f, "Failed to parse renderer config: {msg}"),
            ConfigError::Invalid { field, reason } => {
                write!(f, "Invalid renderer config field '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl RendererConfig {
    /// Parses a configuration from RON text and validates it.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: RendererConfig =
            ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a RON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron_str(&text)?;
        log::info!("Loaded renderer config from {}", path.display());
        Ok(config)
    }

    /// Serializes the configuration to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Rejects values the renderer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let frames = &self.frames;
        if !(2..=3).contains(&frames.frames_in_flight) {
            return Err(ConfigError::Invalid {
                field: "frames.frames_in_flight",
                reason: format!("expected 2 or 3, got {}", frames.frames_in_flight),
            });
        }
        if frames.fence_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "frames.fence_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        for (field, value) in [
            ("frames.max_objects", frames.max_objects),
            ("frames.max_materials", frames.max_materials),
            ("frames.max_lights", frames.max_lights),
            ("frames.max_textures", frames.max_textures),
            (
                "batching.max_instances_per_command",
                self.batching.max_instances_per_command,
            ),
            (
                "batching.max_commands_per_batch",
                self.batching.max_commands_per_batch,
            ),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be positive".to_string(),
                });
            }
        }

        let geometry = &self.geometry;
        if geometry.vertex_page_size == 0 || geometry.index_page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "geometry.*_page_size",
                reason: "must be positive".to_string(),
            });
        }
        if geometry.initial_pages == 0 {
            return Err(ConfigError::Invalid {
                field: "geometry.initial_pages",
                reason: "must be positive".to_string(),
            });
        }
        if !(0.0..1.0).contains(&geometry.shrink_usage_threshold) {
            return Err(ConfigError::Invalid {
                field: "geometry.shrink_usage_threshold",
                reason: format!("expected [0, 1), got {}", geometry.shrink_usage_threshold),
            });
        }
        if geometry.shrink_target_usage <= geometry.shrink_usage_threshold
            || geometry.shrink_target_usage > 1.0
        {
            return Err(ConfigError::Invalid {
                field: "geometry.shrink_target_usage",
                reason: format!(
                    "expected ({}, 1], got {}",
                    geometry.shrink_usage_threshold, geometry.shrink_target_usage
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(RendererConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_ron_falls_back_to_defaults() {
        let config = RendererConfig::from_ron_str("(frames: (frames_in_flight: 3))").unwrap();
        assert_eq!(config.frames.frames_in_flight, 3);
        assert_eq!(config.frames.fence_timeout_ms, 1000);
        assert_eq!(config.geometry, GeometryConfig::default());
    }

    #[test]
    fn test_rejects_single_buffering() {
        let err = RendererConfig::from_ron_str("(frames: (frames_in_flight: 1))").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "frames.frames_in_flight",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_inverted_shrink_band() {
        let mut config = RendererConfig::default();
        config.geometry.shrink_target_usage = 0.4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(geometry: (vertex_page_size: 4096, initial_pages: 2))").unwrap();
        let config = RendererConfig::load(file.path()).unwrap();
        assert_eq!(config.geometry.vertex_page_size, 4096);
        assert_eq!(config.geometry.initial_pages, 2);
    }

    #[test]
    fn test_ron_round_trip() {
        let config = RendererConfig::default();
        let text = config.to_ron_string().unwrap();
        assert_eq!(RendererConfig::from_ron_str(&text).unwrap(), config);
    }
}

//! Engine configuration: defaults plus a serializable settings struct.
//!
//! Settings live in `<config_dir>/playa/engine.json`. Missing keys fall back
//! to the `DEFAULT_*` constants below, so old files keep loading.

use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Frames kept in the frame cache before LRU eviction kicks in
pub const DEFAULT_CACHE_CAPACITY: usize = 64;
/// Symmetric preload radius while scrubbing
pub const DEFAULT_SCRUB_RADIUS: u32 = 4;
/// Frames preloaded in the playback direction
pub const DEFAULT_AHEAD_RADIUS: u32 = 12;
/// Frames kept warm behind the playhead during playback
pub const DEFAULT_BEHIND_RADIUS: u32 = 2;
/// Fraction of available memory the frame cache may use
pub const DEFAULT_MEM_FRACTION: f64 = 0.75;
/// Memory reserved for the system (GB)
pub const DEFAULT_RESERVE_GB: f64 = 2.0;
/// Default output size for graph evaluation
pub const DEFAULT_DIM: (u32, u32) = (1920, 1080);

const CONFIG_DIR: &str = "playa";
const CONFIG_FILE: &str = "engine.json";

/// Recommended loader count: leave 25% of cores for the UI thread.
pub fn default_max_in_flight() -> usize {
    (num_cpus::get() * 3 / 4).max(1)
}

/// Tunables for the frame cache and preload coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Max cached frames (count-based LRU limit)
    pub cache_capacity: usize,
    /// Max simultaneous loader calls; excess requests queue
    pub max_in_flight: usize,
    /// Symmetric radius used while scrubbing
    pub scrub_radius: u32,
    /// Radius in the playback direction
    pub ahead_radius: u32,
    /// Radius opposite to the playback direction
    pub behind_radius: u32,
    /// Fraction of available memory for cached frames (0.0-1.0)
    pub mem_fraction: f64,
    /// Memory reserved for the system (GB)
    pub reserve_gb: f64,
    /// Optional inclusive work area; preload windows are clamped to it
    pub frame_range: Option<(i32, i32)>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_in_flight: default_max_in_flight(),
            scrub_radius: DEFAULT_SCRUB_RADIUS,
            ahead_radius: DEFAULT_AHEAD_RADIUS,
            behind_radius: DEFAULT_BEHIND_RADIUS,
            mem_fraction: DEFAULT_MEM_FRACTION,
            reserve_gb: DEFAULT_RESERVE_GB,
            frame_range: None,
        }
    }
}

impl EngineConfig {
    /// Parse settings from JSON. Unknown keys are ignored, missing keys use defaults.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_json::from_str(json).context("invalid engine config JSON")?;
        Ok(cfg.validate())
    }

    /// Load settings from file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let cfg = Self::from_json(&text)?;
        debug!("Engine config loaded from {}", path.display());
        Ok(cfg)
    }

    /// Load from the default location, falling back to defaults on any error.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            warn!("Engine config ignored: {:#}", e);
            Self::default()
        })
    }

    /// Write settings as pretty JSON, creating parent dirs.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// `<config_dir>/playa/engine.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Clamp values that would stall the engine.
    pub fn validate(mut self) -> Self {
        if self.cache_capacity == 0 {
            warn!("cache_capacity=0 is not usable, using 1");
            self.cache_capacity = 1;
        }
        if self.max_in_flight == 0 {
            warn!("max_in_flight=0 is not usable, using 1");
            self.max_in_flight = 1;
        }
        self.mem_fraction = self.mem_fraction.clamp(0.0, 1.0);
        if let Some((start, end)) = self.frame_range
            && end < start
        {
            warn!("frame_range [{}..{}] is empty, ignoring", start, end);
            self.frame_range = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = EngineConfig::from_json(r#"{ "cache_capacity": 16, "ahead_radius": 8 }"#).unwrap();
        assert_eq!(cfg.cache_capacity, 16);
        assert_eq!(cfg.ahead_radius, 8);
        assert_eq!(cfg.behind_radius, DEFAULT_BEHIND_RADIUS);
        assert_eq!(cfg.scrub_radius, DEFAULT_SCRUB_RADIUS);
    }

    #[test]
    fn test_validate_clamps_zeroes() {
        let cfg = EngineConfig::from_json(
            r#"{ "cache_capacity": 0, "max_in_flight": 0, "frame_range": [10, 2] }"#,
        )
        .unwrap();
        assert_eq!(cfg.cache_capacity, 1);
        assert_eq!(cfg.max_in_flight, 1);
        assert_eq!(cfg.frame_range, None);
    }

    #[test]
    fn test_save_load() {
        let dir = std::env::temp_dir().join(format!("playa-core-cfg-{}", uuid::Uuid::new_v4()));
        let path = dir.join(CONFIG_FILE);

        let cfg = EngineConfig {
            cache_capacity: 5,
            frame_range: Some((1, 100)),
            ..Default::default()
        };
        cfg.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bad_json_is_error() {
        assert!(EngineConfig::from_json("{ not json").is_err());
    }
}

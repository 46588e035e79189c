use std::path::PathBuf;

use serde::Deserialize;

use crate::config::StoryPolicy;
use crate::paths::kiln_config_path;
use crate::stories::ScoreWeights;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    pub version: u32,
    pub stories: StoriesConfig,
    pub views: ViewsConfig,
    pub analytics: ScoreWeights,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            version: 1,
            stories: StoriesConfig::default(),
            views: ViewsConfig::default(),
            analytics: ScoreWeights::default(),
        }
    }
}

impl KilnConfig {
    pub fn load() -> Result<Self, String> {
        let path = kiln_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| format!("read config.toml: {e}"))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| format!("parse config.toml: {e}"))
    }

    pub fn config_path() -> Result<PathBuf, String> {
        kiln_config_path()
    }

    pub fn story_policy(&self) -> StoryPolicy {
        StoryPolicy {
            ttl: chrono::Duration::hours(i64::from(self.stories.ttl_hours.max(1))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoriesConfig {
    pub ttl_hours: u32,
}

impl Default for StoriesConfig {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewsConfig {
    /// Compare-and-set attempts before a contended view write is dropped.
    pub max_write_attempts: usize,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: 5,
        }
    }
}

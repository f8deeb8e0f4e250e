use std::time::Duration;

use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchoolbellError};
use crate::types::TenantSeed;

pub const DEFAULT_TICK_MS: u64 = 500; // scheduler poll period
pub const DEFAULT_TIMEZONE: &str = "Asia/Seoul";
pub const DEFAULT_EVENT_BUFFER: usize = 256;
pub const DEFAULT_CHUNK_MAX: usize = 1900; // Discord caps messages at 2000 chars

/// Top-level config (schoolbell.toml + SCHOOLBELL_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchoolbellConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Named duration pairs usable in place of explicit durations.
    #[serde(default)]
    pub presets: Vec<PresetConfig>,
    /// Tenants recreated on startup (timers restart at Active, breaks at their
    /// next future occurrence).
    #[serde(default)]
    pub tenants: Vec<TenantSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// IANA timezone name used for break-window wall-clock times.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Capacity of the scheduler → delivery event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            timezone: DEFAULT_TIMEZONE.to_string(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| SchoolbellError::InvalidTimezone(self.timezone.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Longest text sent in a single message; longer replies are split.
    #[serde(default = "default_chunk_max")]
    pub chunk_max: usize,
    /// Sentence template language for spoken announcements ("ko" or "en").
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            chunk_max: DEFAULT_CHUNK_MAX,
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetConfig {
    pub name: String,
    pub active_secs: u64,
    pub rest_secs: u64,
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}
fn default_chunk_max() -> usize {
    DEFAULT_CHUNK_MAX
}
fn default_language() -> String {
    "en".to_string()
}

impl SchoolbellConfig {
    /// Load config from a TOML file with SCHOOLBELL_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `SCHOOLBELL_SCHEDULER__TICK_MS=250`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: SchoolbellConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SCHOOLBELL_").split("__"))
            .extract()
            .map_err(|e| SchoolbellError::Config(e.to_string()))?;

        config.scheduler.tz()?;
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.schoolbell/schoolbell.toml", home)
}

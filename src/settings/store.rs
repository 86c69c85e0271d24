//! Profiling settings store.
//!
//! Settings are loaded from multiple sources in priority order:
//! 1. File named by `XRT_INI_PATH`
//! 2. Project-local `./xrt.toml`
//! 3. User config file (`~/.config/xrt/xrt.toml`)
//! 4. Built-in defaults
//!
//! # Settings File Format
//!
//! ```toml
//! [AIE_profile_settings]
//! tile_based_aie_metrics = "all:heat_map; {1,2}:stalls"
//! graph_based_interface_tile_metrics = "all:all:input_throughputs"
//! interface_tile_latency_metrics = "g1:in:g2:out:16"
//! interval_us = 500
//!
//! [Debug]
//! # Deprecated keys still honoured as fallbacks
//! aie_profile_core_metrics = "heat_map"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::device::ModuleType;
use crate::message::MessageSink;

/// Section holding profiling settings.
pub const PROFILE_SECTION: &str = "AIE_profile_settings";

/// Default polling interval in microseconds.
pub const DEFAULT_INTERVAL_US: u64 = 1000;

/// Smallest polling interval the poller supports.
pub const MIN_INTERVAL_US: u64 = 100;

/// Keys recognized in `[AIE_profile_settings]`.
pub const VALID_SETTINGS: &[&str] = &[
    "graph_based_aie_metrics",
    "graph_based_aie_memory_metrics",
    "graph_based_memory_tile_metrics",
    "graph_based_interface_tile_metrics",
    "tile_based_aie_metrics",
    "tile_based_aie_memory_metrics",
    "tile_based_memory_tile_metrics",
    "tile_based_interface_tile_metrics",
    "tile_based_microcontroller_metrics",
    "interface_tile_latency_metrics",
    "interval_us",
    "start_type",
    "start_iteration",
];

/// Deprecated `[Debug]` keys: (old key, replacement key, replacement text).
const DEPRECATED_SETTINGS: &[(&str, &str, &str)] = &[
    (
        "aie_profile_core_metrics",
        "tile_based_aie_metrics",
        "AIE_profile_settings.graph_based_aie_metrics or tile_based_aie_metrics",
    ),
    (
        "aie_profile_memory_metrics",
        "tile_based_aie_memory_metrics",
        "AIE_profile_settings.graph_based_aie_memory_metrics or tile_based_aie_memory_metrics",
    ),
    (
        "aie_profile_interface_metrics",
        "tile_based_interface_tile_metrics",
        "AIE_profile_settings.tile_based_interface_tile_metrics",
    ),
    (
        "aie_profile_interval_us",
        "interval_us",
        "AIE_profile_settings.interval_us",
    ),
];

/// A raw setting value as written in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{}", b),
            SettingValue::Int(i) => write!(f, "{}", i),
            SettingValue::Float(x) => write!(f, "{}", x),
            SettingValue::Text(s) => f.write_str(s),
        }
    }
}

/// On-disk layout of a settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SettingsFile {
    #[serde(rename = "AIE_profile_settings")]
    profile: BTreeMap<String, SettingValue>,
    #[serde(rename = "Debug")]
    debug: BTreeMap<String, SettingValue>,
}

/// When counters start counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartType {
    /// Start as soon as the device is configured.
    #[default]
    Time,
    /// Start on the first kernel launch.
    KernelStart,
    /// Start once a graph reaches `start_iteration`.
    Iteration,
}

impl FromStr for StartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time" => Ok(StartType::Time),
            "kernel_start" => Ok(StartType::KernelStart),
            "iteration" => Ok(StartType::Iteration),
            other => Err(format!("unknown start type '{}'", other)),
        }
    }
}

/// Merged profiling settings.
#[derive(Debug, Clone, Default)]
pub struct ProfileSettings {
    profile: BTreeMap<String, String>,
    debug: BTreeMap<String, String>,
}

impl ProfileSettings {
    /// Load settings from all sources.
    pub fn load() -> Self {
        let mut settings = Self::default();

        if let Some(user) = Self::user_config_path().and_then(|p| Self::load_from_file(&p)) {
            settings.merge(user);
        }

        if let Some(local) = Self::load_from_file(Path::new("xrt.toml")) {
            settings.merge(local);
        }

        // Explicit file overrides everything
        if let Ok(path) = std::env::var("XRT_INI_PATH") {
            log::info!("Using XRT_INI_PATH from environment: {}", path);
            if let Some(env) = Self::load_from_file(Path::new(&path)) {
                settings.merge(env);
            }
        }

        settings
    }

    /// Parse settings from TOML text.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let file: SettingsFile = toml::from_str(content).context("invalid settings file")?;
        let stringify = |map: BTreeMap<String, SettingValue>| {
            map.into_iter()
                .map(|(k, v)| (k, v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };
        Ok(Self {
            profile: stringify(file.profile),
            debug: stringify(file.debug),
        })
    }

    /// Load settings from a specific file, logging and skipping failures.
    pub fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    Some(settings)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {:#}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Path of the per-user settings file.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("xrt").join("xrt.toml"))
    }

    /// Merge another store into this one, key by key.
    pub fn merge(&mut self, other: Self) {
        self.profile.extend(other.profile);
        self.debug.extend(other.debug);
    }

    /// Set a profiling key (builder style).
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.profile.insert(key.to_string(), value.into());
    }

    /// Set a `[Debug]` key (builder style).
    pub fn with_debug(mut self, key: &str, value: impl Into<String>) -> Self {
        self.debug.insert(key.to_string(), value.into());
        self
    }

    /// Raw profiling value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.profile.get(key).map(String::as_str)
    }

    /// Report unknown profiling keys and deprecated debug keys.
    pub fn check(&self, sink: &dyn MessageSink) {
        for key in self.profile.keys() {
            if !VALID_SETTINGS.contains(&key.as_str()) {
                sink.warning(&format!(
                    "The setting {}.{} is not recognized. Please check the spelling and compare to supported list: {}",
                    PROFILE_SECTION,
                    key,
                    VALID_SETTINGS.join(", ")
                ));
            }
        }

        for (old, _, replacement) in DEPRECATED_SETTINGS {
            if self.debug.contains_key(*old) {
                sink.warning(&format!(
                    "The setting Debug.{} is no longer supported. Please instead use {}.",
                    old, replacement
                ));
            }
        }
    }

    /// Tile-based settings string for a module.
    ///
    /// Falls back to the deprecated debug key when the current key is empty.
    /// Old-style values without a tile field apply to all tiles.
    pub fn tile_based_metrics(&self, module: ModuleType) -> String {
        let key = tile_based_key(module);
        let value = self.get(key).unwrap_or_default();
        if !value.is_empty() {
            return value.to_string();
        }

        match self.deprecated_value(key) {
            Some(old) => old
                .split(';')
                .filter(|e| !e.trim().is_empty())
                .map(|e| {
                    if e.contains(':') {
                        e.to_string()
                    } else {
                        format!("all:{}", e.trim())
                    }
                })
                .collect::<Vec<_>>()
                .join(";"),
            None => String::new(),
        }
    }

    /// Graph-based settings string for a module (microcontrollers have none).
    pub fn graph_based_metrics(&self, module: ModuleType) -> String {
        graph_based_key(module)
            .and_then(|key| self.get(key))
            .unwrap_or_default()
            .to_string()
    }

    /// Latency pair settings string.
    pub fn latency_metrics(&self) -> String {
        self.get("interface_tile_latency_metrics")
            .unwrap_or_default()
            .to_string()
    }

    /// Polling interval in microseconds, clamped to the supported minimum.
    pub fn interval_us(&self, sink: &dyn MessageSink) -> u64 {
        let raw = self
            .get("interval_us")
            .or_else(|| self.deprecated_value("interval_us"));

        let interval = match raw.map(str::parse::<u64>) {
            None => DEFAULT_INTERVAL_US,
            Some(Ok(v)) => v,
            Some(Err(_)) => {
                sink.warning(&format!(
                    "Unable to parse AIE profile interval '{}'. Using default of {} usec.",
                    raw.unwrap_or_default(),
                    DEFAULT_INTERVAL_US
                ));
                DEFAULT_INTERVAL_US
            }
        };

        if interval < MIN_INTERVAL_US {
            sink.warning(&format!(
                "Minimum supported AIE profile interval is {} usec.",
                MIN_INTERVAL_US
            ));
            return MIN_INTERVAL_US;
        }
        interval
    }

    pub fn start_type(&self, sink: &dyn MessageSink) -> StartType {
        match self.get("start_type").map(str::parse::<StartType>) {
            None => StartType::default(),
            Some(Ok(t)) => t,
            Some(Err(e)) => {
                sink.warning(&format!(
                    "Unable to use AIE profile {}. Supported values are time, kernel_start and iteration.",
                    e
                ));
                StartType::default()
            }
        }
    }

    /// Graph iteration that starts deferred counters (at least 1).
    pub fn start_iteration(&self) -> u32 {
        self.get("start_iteration")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(1)
    }

    fn deprecated_value(&self, replacement: &str) -> Option<&str> {
        DEPRECATED_SETTINGS
            .iter()
            .find(|(_, new, _)| *new == replacement)
            .and_then(|(old, _, _)| self.debug.get(*old))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Settings key for tile-based metrics of a module.
pub fn tile_based_key(module: ModuleType) -> &'static str {
    match module {
        ModuleType::Core => "tile_based_aie_metrics",
        ModuleType::Dma => "tile_based_aie_memory_metrics",
        ModuleType::Shim => "tile_based_interface_tile_metrics",
        ModuleType::MemTile => "tile_based_memory_tile_metrics",
        ModuleType::Uc => "tile_based_microcontroller_metrics",
    }
}

/// Settings key for graph-based metrics of a module.
pub fn graph_based_key(module: ModuleType) -> Option<&'static str> {
    match module {
        ModuleType::Core => Some("graph_based_aie_metrics"),
        ModuleType::Dma => Some("graph_based_aie_memory_metrics"),
        ModuleType::Shim => Some("graph_based_interface_tile_metrics"),
        ModuleType::MemTile => Some("graph_based_memory_tile_metrics"),
        ModuleType::Uc => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{RecordingSink, Severity};

    const SAMPLE: &str = r#"
[AIE_profile_settings]
tile_based_aie_metrics = "all:heat_map"
graph_based_interface_tile_metrics = "all:all:input_throughputs"
interval_us = 250
start_type = "iteration"
start_iteration = 3
bogus_key = true

[Debug]
aie_profile_memory_metrics = "conflicts"
"#;

    #[test]
    fn test_parse_sample() {
        let settings = ProfileSettings::from_toml_str(SAMPLE).unwrap();
        let sink = RecordingSink::new();

        assert_eq!(settings.tile_based_metrics(ModuleType::Core), "all:heat_map");
        assert_eq!(
            settings.graph_based_metrics(ModuleType::Shim),
            "all:all:input_throughputs"
        );
        assert_eq!(settings.interval_us(&sink), 250);
        assert_eq!(settings.start_type(&sink), StartType::Iteration);
        assert_eq!(settings.start_iteration(), 3);
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn test_check_reports_unknown_and_deprecated() {
        let settings = ProfileSettings::from_toml_str(SAMPLE).unwrap();
        let sink = RecordingSink::new();
        settings.check(&sink);

        assert_eq!(sink.count_containing(Severity::Warning, "bogus_key"), 1);
        assert_eq!(
            sink.count_containing(Severity::Warning, "Debug.aie_profile_memory_metrics"),
            1
        );
        assert_eq!(sink.warnings().len(), 2);
    }

    #[test]
    fn test_deprecated_fallback() {
        let settings = ProfileSettings::from_toml_str(SAMPLE).unwrap();
        assert_eq!(settings.tile_based_metrics(ModuleType::Dma), "all:conflicts");

        // Current key wins over the deprecated one
        let settings = settings.with("tile_based_aie_memory_metrics", "{0,0}:dma_locks");
        assert_eq!(settings.tile_based_metrics(ModuleType::Dma), "{0,0}:dma_locks");
    }

    #[test]
    fn test_interval_clamped() {
        let sink = RecordingSink::new();
        let settings = ProfileSettings::default().with("interval_us", "20");
        assert_eq!(settings.interval_us(&sink), MIN_INTERVAL_US);
        assert_eq!(sink.warnings().len(), 1);

        let settings = ProfileSettings::default();
        assert_eq!(settings.interval_us(&sink), DEFAULT_INTERVAL_US);

        let settings = ProfileSettings::default().with_debug("aie_profile_interval_us", "400");
        assert_eq!(settings.interval_us(&sink), 400);
    }

    #[test]
    fn test_bad_start_type() {
        let sink = RecordingSink::new();
        let settings = ProfileSettings::default().with("start_type", "later");
        assert_eq!(settings.start_type(&sink), StartType::Time);
        assert_eq!(sink.warnings().len(), 1);
        assert_eq!(settings.start_iteration(), 1);
    }

    #[test]
    fn test_merge_overrides_per_key() {
        let mut base = ProfileSettings::default()
            .with("tile_based_aie_metrics", "all:stalls")
            .with("interval_us", "500");
        let overlay = ProfileSettings::default().with("interval_us", "700");
        base.merge(overlay);

        assert_eq!(base.get("tile_based_aie_metrics"), Some("all:stalls"));
        assert_eq!(base.get("interval_us"), Some("700"));
    }

    #[test]
    fn test_microcontrollers_have_no_graph_key() {
        let settings = ProfileSettings::default();
        assert_eq!(settings.graph_based_metrics(ModuleType::Uc), "");
        assert_eq!(
            tile_based_key(ModuleType::Uc),
            "tile_based_microcontroller_metrics"
        );
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(ProfileSettings::from_toml_str("[AIE_profile_settings\nx=").is_err());
    }
}

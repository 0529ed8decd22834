//! Player Configuration
//!
//! Feature toggles and timing constants, read once at startup from
//! `~/.config/open-source-player/player.toml` and the environment. After
//! loading, the configuration is shared as `Arc<PlayerConfig>` and never
//! mutated.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. Environment variables
//! 2. TOML configuration file
//! 3. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [features]
//! auto_hide_controls = true
//! subtitles = true
//! settings_menu = true
//! cinematic_mode = false
//! fast_forward = true
//! interstitial = false
//! debug_logging = false
//!
//! [timing]
//! stall_timeout_ms = 10000
//! frame_interval_ms = 16
//! auto_hide_delay_ms = 3500
//! seek_step_secs = 10.0
//! volume_step = 0.1
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[features]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesToml {
    /// Hide controls after pointer inactivity
    pub auto_hide_controls: Option<bool>,
    /// Load subtitle tracks
    pub subtitles: Option<bool>,
    /// Show the settings menu button
    pub settings_menu: Option<bool>,
    /// Allow cinematic dimming
    pub cinematic_mode: Option<bool>,
    /// Show the fast-forward button
    pub fast_forward: Option<bool>,
    /// Run interstitial overlays before playback
    pub interstitial: Option<bool>,
    /// Hand sources to the adaptive streaming collaborator
    pub adaptive_source: Option<bool>,
    /// Initialise the context menu
    pub context_menu: Option<bool>,
    /// Verbose diagnostics
    pub debug_logging: Option<bool>,
}

/// `[timing]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingToml {
    /// Stall watchdog deadline in milliseconds
    pub stall_timeout_ms: Option<u64>,
    /// Frame loop period in milliseconds
    pub frame_interval_ms: Option<u64>,
    /// Inactivity delay before controls hide, in milliseconds
    pub auto_hide_delay_ms: Option<u64>,
    /// Seconds skipped by arrow keys and fast-forward
    pub seek_step_secs: Option<f64>,
    /// Volume change per key press
    pub volume_step: Option<f64>,
    /// Position a looping surface restarts from, in seconds
    pub loop_restart_offset_secs: Option<f64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerToml {
    /// Feature toggles
    pub features: FeaturesToml,
    /// Timing constants
    pub timing: TimingToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Feature toggles
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggles {
    /// Hide controls after pointer inactivity while playing
    pub auto_hide_controls: bool,
    /// Load and allow toggling subtitle tracks
    pub subtitles: bool,
    /// Settings menu button
    pub settings_menu: bool,
    /// Cinematic dimming
    pub cinematic_mode: bool,
    /// Fast-forward button
    pub fast_forward: bool,
    /// Interstitial overlay before playback
    pub interstitial: bool,
    /// Adaptive streaming collaborator for video sources
    pub adaptive_source: bool,
    /// Context menu initialisation
    pub context_menu: bool,
    /// Verbose diagnostics and raw device error codes
    pub debug_logging: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            auto_hide_controls: true,
            subtitles: false,
            settings_menu: true,
            cinematic_mode: true,
            fast_forward: true,
            interstitial: false,
            adaptive_source: false,
            context_menu: true,
            debug_logging: false,
        }
    }
}

/// Timing constants
#[derive(Clone, Debug, PartialEq)]
pub struct TimingConfig {
    /// Stall watchdog deadline
    pub stall_timeout: Duration,
    /// Frame loop period, also the delay of a deferred UI refresh
    pub frame_interval: Duration,
    /// Inactivity delay before controls hide
    pub auto_hide_delay: Duration,
    /// Seconds skipped by arrow keys and fast-forward
    pub seek_step_secs: f64,
    /// Volume change per key press
    pub volume_step: f64,
    /// Position a looping surface restarts from
    pub loop_restart_offset_secs: f64,
    /// Volume restored on unmute when nothing was remembered
    pub unmute_volume: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_secs(10),
            frame_interval: Duration::from_millis(16),
            auto_hide_delay: Duration::from_millis(3500),
            seek_step_secs: 10.0,
            volume_step: 0.1,
            loop_restart_offset_secs: 0.2,
            unmute_volume: 0.1,
        }
    }
}

/// Complete player configuration
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Feature toggles
    pub features: FeatureToggles,

    /// Timing constants
    pub timing: TimingConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            features: FeatureToggles::default(),
            timing: TimingConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl PlayerConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Replace the feature toggles
    #[must_use]
    pub fn with_features(mut self, features: FeatureToggles) -> Self {
        self.features = features;
        self
    }

    /// Replace the timing constants
    #[must_use]
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timing;
        if t.stall_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "timing.stall_timeout_ms must be greater than zero".into(),
            ));
        }
        if t.frame_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "timing.frame_interval_ms must be greater than zero".into(),
            ));
        }
        if !(t.volume_step > 0.0 && t.volume_step <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "timing.volume_step must be in (0, 1], got {}",
                t.volume_step
            )));
        }
        if !(t.seek_step_secs.is_finite() && t.seek_step_secs > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "timing.seek_step_secs must be positive, got {}",
                t.seek_step_secs
            )));
        }
        if !(t.loop_restart_offset_secs.is_finite() && t.loop_restart_offset_secs >= 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "timing.loop_restart_offset_secs must not be negative, got {}",
                t.loop_restart_offset_secs
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/open-source-player/player.toml` or
/// `~/.config/open-source-player/player.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("open-source-player").join("player.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the merged values fail validation. A missing file is not an error.
pub fn load_config() -> Result<PlayerConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the merged values fail validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<PlayerConfig, ConfigError> {
    load_with_env(path, |key| std::env::var(key).ok())
}

fn load_with_env<F>(path: Option<PathBuf>, env: F) -> Result<PlayerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = PlayerConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_config = read_toml(config_path)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;
    Ok(config)
}

fn read_toml(path: &Path) -> Result<PlayerToml, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut PlayerConfig, toml: &PlayerToml) {
    let f = &toml.features;
    let features = &mut config.features;
    if let Some(v) = f.auto_hide_controls {
        features.auto_hide_controls = v;
    }
    if let Some(v) = f.subtitles {
        features.subtitles = v;
    }
    if let Some(v) = f.settings_menu {
        features.settings_menu = v;
    }
    if let Some(v) = f.cinematic_mode {
        features.cinematic_mode = v;
    }
    if let Some(v) = f.fast_forward {
        features.fast_forward = v;
    }
    if let Some(v) = f.interstitial {
        features.interstitial = v;
    }
    if let Some(v) = f.adaptive_source {
        features.adaptive_source = v;
    }
    if let Some(v) = f.context_menu {
        features.context_menu = v;
    }
    if let Some(v) = f.debug_logging {
        features.debug_logging = v;
    }

    let t = &toml.timing;
    let timing = &mut config.timing;
    if let Some(ms) = t.stall_timeout_ms {
        timing.stall_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = t.frame_interval_ms {
        timing.frame_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = t.auto_hide_delay_ms {
        timing.auto_hide_delay = Duration::from_millis(ms);
    }
    if let Some(secs) = t.seek_step_secs {
        timing.seek_step_secs = secs;
    }
    if let Some(step) = t.volume_step {
        timing.volume_step = step;
    }
    if let Some(offset) = t.loop_restart_offset_secs {
        timing.loop_restart_offset_secs = offset;
    }
}

fn parse_flag(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut PlayerConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let flags: [(&str, &mut bool); 7] = [
        ("OSP_DEBUG", &mut config.features.debug_logging),
        ("OSP_AUTO_HIDE", &mut config.features.auto_hide_controls),
        ("OSP_SUBTITLES", &mut config.features.subtitles),
        ("OSP_SETTINGS_MENU", &mut config.features.settings_menu),
        ("OSP_CINEMATIC_MODE", &mut config.features.cinematic_mode),
        ("OSP_FAST_FORWARD", &mut config.features.fast_forward),
        ("OSP_INTERSTITIAL", &mut config.features.interstitial),
    ];
    let mut touched = false;
    for (key, slot) in flags {
        if let Some(value) = env(key) {
            *slot = parse_flag(&value);
            touched = true;
        }
    }

    if let Some(timeout) = env("OSP_STALL_TIMEOUT_MS") {
        if let Ok(ms) = timeout.parse::<u64>() {
            config.timing.stall_timeout = Duration::from_millis(ms);
            touched = true;
        } else {
            tracing::warn!(value = %timeout, "Ignoring non-numeric OSP_STALL_TIMEOUT_MS");
        }
    }

    if touched {
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = PlayerConfig::default();

        assert!(config.features.auto_hide_controls);
        assert!(!config.features.subtitles);
        assert!(!config.features.debug_logging);
        assert_eq!(config.timing.stall_timeout, Duration::from_secs(10));
        assert_eq!(config.timing.auto_hide_delay, Duration::from_millis(3500));
        assert_eq!(config.timing.seek_step_secs, 10.0);
        assert_eq!(config.timing.volume_step, 0.1);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let config = load_with_env(Some(path), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_file_values_applied() {
        let file = write_toml(
            r#"
            [features]
            subtitles = true
            cinematic_mode = false

            [timing]
            stall_timeout_ms = 5000
            volume_step = 0.25
            "#,
        );

        let config = load_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        assert!(config.features.subtitles);
        assert!(!config.features.cinematic_mode);
        assert!(config.features.fast_forward);
        assert_eq!(config.timing.stall_timeout, Duration::from_millis(5000));
        assert_eq!(config.timing.volume_step, 0.25);
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml("[features]\nsubtitles = true\n");
        let env = env_from(&[("OSP_SUBTITLES", "false"), ("OSP_STALL_TIMEOUT_MS", "2500")]);

        let config = load_with_env(Some(file.path().to_path_buf()), env).unwrap();
        assert!(!config.features.subtitles);
        assert_eq!(config.timing.stall_timeout, Duration::from_millis(2500));
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_env_flag_parsing() {
        assert!(parse_flag("1"));
        assert!(parse_flag("yes"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("FALSE"));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let file = write_toml("[timing\nstall_timeout_ms = ");
        let err = load_with_env(Some(file.path().to_path_buf()), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_toml("[timing]\nvolume_step = 1.5\n");
        let err = load_with_env(Some(file.path().to_path_buf()), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let env = env_from(&[("OSP_STALL_TIMEOUT_MS", "0")]);
        let err = load_with_env(None, env).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_default_config_path_layout() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("open-source-player/player.toml"));
        }
    }
}

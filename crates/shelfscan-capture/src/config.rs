//! # Scanner Configuration
//!
//! Configuration management for the scan controller.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SHELFSCAN_DEVICE_ID=abc-123                                        │
//! │     SHELFSCAN_AFTER_DETECTION=stop                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/shelfscan/scanner.toml (Linux)                           │
//! │     ~/Library/Application Support/com.shelfscan.scanner/scanner.toml   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     640x480, native decoder preferred, 1200 ms cooldown                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # scanner.toml
//! [camera]
//! preferred_device_id = "3f2a..."   # optional, last used camera
//! ideal_width = 640
//! ideal_height = 480
//! strict_rear_facing = false
//! acquire_timeout_ms = 10000
//! first_frame_timeout_ms = 5000
//! torch_timeout_ms = 3000
//!
//! [decoder]
//! prefer_native = true
//! symbologies = ["ean_13", "ean_8", "upc_a", "upc_e"]
//! frame_interval_ms = 16
//! engine_interval_ms = 100
//! init_timeout_ms = 5000
//!
//! [scan]
//! cooldown_ms = 1200
//! after_detection = "continue"   # continue | stop
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use shelfscan_core::{
    AfterDetection, Resolution, Symbology, DEFAULT_COOLDOWN_MS, DEFAULT_IDEAL_HEIGHT,
    DEFAULT_IDEAL_WIDTH,
};

use crate::error::{ScanError, ScanResult};

// =============================================================================
// Camera Settings
// =============================================================================

/// Camera acquisition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Device to try first. When unset, the rear-facing heuristic picks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_device_id: Option<String>,

    #[serde(default = "default_ideal_width")]
    pub ideal_width: u32,

    #[serde(default = "default_ideal_height")]
    pub ideal_height: u32,

    /// Use an exact rear-facing constraint on the second attempt.
    #[serde(default)]
    pub strict_rear_facing: bool,

    /// Bound on enumeration and on each stream open.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,

    /// Bound on the wait for the first delivered frame.
    #[serde(default = "default_first_frame_timeout")]
    pub first_frame_timeout_ms: u64,

    /// Bound on a torch constraint application.
    #[serde(default = "default_torch_timeout")]
    pub torch_timeout_ms: u64,
}

fn default_ideal_width() -> u32 {
    DEFAULT_IDEAL_WIDTH
}

fn default_ideal_height() -> u32 {
    DEFAULT_IDEAL_HEIGHT
}

fn default_acquire_timeout() -> u64 {
    10_000
}

fn default_first_frame_timeout() -> u64 {
    5_000
}

fn default_torch_timeout() -> u64 {
    3_000
}

impl Default for CameraSettings {
    fn default() -> Self {
        CameraSettings {
            preferred_device_id: None,
            ideal_width: default_ideal_width(),
            ideal_height: default_ideal_height(),
            strict_rear_facing: false,
            acquire_timeout_ms: default_acquire_timeout(),
            first_frame_timeout_ms: default_first_frame_timeout(),
            torch_timeout_ms: default_torch_timeout(),
        }
    }
}

// =============================================================================
// Decoder Settings
// =============================================================================

/// Decode strategy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderSettings {
    /// Try the platform reader before the software engine.
    #[serde(default = "default_true")]
    pub prefer_native: bool,

    /// Symbologies both strategies are asked to read.
    #[serde(default = "default_symbologies")]
    pub symbologies: Vec<Symbology>,

    /// Native frame tick.
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,

    /// Software engine cadence.
    #[serde(default = "default_engine_interval")]
    pub engine_interval_ms: u64,

    /// Bound on each strategy's initialisation.
    #[serde(default = "default_init_timeout")]
    pub init_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_symbologies() -> Vec<Symbology> {
    vec![
        Symbology::Ean13,
        Symbology::Ean8,
        Symbology::UpcA,
        Symbology::UpcE,
    ]
}

fn default_frame_interval() -> u64 {
    16
}

fn default_engine_interval() -> u64 {
    100
}

fn default_init_timeout() -> u64 {
    5_000
}

impl Default for DecoderSettings {
    fn default() -> Self {
        DecoderSettings {
            prefer_native: true,
            symbologies: default_symbologies(),
            frame_interval_ms: default_frame_interval(),
            engine_interval_ms: default_engine_interval(),
            init_timeout_ms: default_init_timeout(),
        }
    }
}

// =============================================================================
// Scan Settings
// =============================================================================

/// Result handling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Quiet window after an emitted result.
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,

    /// Keep scanning or stop after the first emitted result.
    #[serde(default)]
    pub after_detection: AfterDetection,
}

fn default_cooldown() -> u64 {
    DEFAULT_COOLDOWN_MS
}

impl Default for ScanSettings {
    fn default() -> Self {
        ScanSettings {
            cooldown_ms: default_cooldown(),
            after_detection: AfterDetection::default(),
        }
    }
}

// =============================================================================
// Scanner Config
// =============================================================================

/// Complete scanner configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default)]
    pub camera: CameraSettings,

    #[serde(default)]
    pub decoder: DecoderSettings,

    #[serde(default)]
    pub scan: ScanSettings,
}

impl ScannerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (scanner.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ScanResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading scanner config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load scanner config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ScanResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ScanError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ScanError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| ScanError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Scanner config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ScanResult<()> {
        if self.camera.ideal_width == 0 || self.camera.ideal_height == 0 {
            return Err(ScanError::InvalidConfig(
                "ideal resolution must be non-zero".into(),
            ));
        }

        if let Some(ref id) = self.camera.preferred_device_id {
            if id.trim().is_empty() {
                return Err(ScanError::InvalidConfig(
                    "preferred_device_id must not be blank".into(),
                ));
            }
        }

        let bounds = [
            ("acquire_timeout_ms", self.camera.acquire_timeout_ms),
            ("first_frame_timeout_ms", self.camera.first_frame_timeout_ms),
            ("torch_timeout_ms", self.camera.torch_timeout_ms),
            ("frame_interval_ms", self.decoder.frame_interval_ms),
            ("engine_interval_ms", self.decoder.engine_interval_ms),
            ("init_timeout_ms", self.decoder.init_timeout_ms),
        ];
        if let Some((name, _)) = bounds.iter().find(|(_, value)| *value == 0) {
            return Err(ScanError::InvalidConfig(format!(
                "{} must be greater than 0",
                name
            )));
        }

        if self.decoder.symbologies.is_empty() {
            return Err(ScanError::InvalidConfig(
                "at least one symbology must be enabled".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // Preferred camera
        if let Ok(id) = std::env::var("SHELFSCAN_DEVICE_ID") {
            debug!(device_id = %id, "Overriding preferred camera from environment");
            self.camera.preferred_device_id = Some(id);
        }

        // Cooldown
        if let Ok(cooldown) = std::env::var("SHELFSCAN_COOLDOWN_MS") {
            match cooldown.parse::<u64>() {
                Ok(ms) => self.scan.cooldown_ms = ms,
                Err(_) => warn!(value = %cooldown, "Invalid cooldown in environment"),
            }
        }

        // After-detection mode
        if let Ok(mode) = std::env::var("SHELFSCAN_AFTER_DETECTION") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding after-detection mode from environment");
                    self.scan.after_detection = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown after-detection mode in environment"),
            }
        }

        // Native reader preference
        if let Ok(flag) = std::env::var("SHELFSCAN_PREFER_NATIVE") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.decoder.prefer_native = true,
                "0" | "false" | "no" => self.decoder.prefer_native = false,
                _ => warn!(value = %flag, "Invalid native preference in environment"),
            }
        }

        // Symbologies (comma list)
        if let Ok(list) = std::env::var("SHELFSCAN_SYMBOLOGIES") {
            let parsed: Result<Vec<Symbology>, _> = list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect();
            match parsed {
                Ok(symbologies) => self.decoder.symbologies = symbologies,
                Err(e) => warn!(error = %e, "Invalid symbology list in environment"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "shelfscan", "scanner")
            .map(|dirs| dirs.config_dir().join("scanner.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the ideal capture resolution.
    pub fn quality(&self) -> Resolution {
        Resolution::new(self.camera.ideal_width, self.camera.ideal_height)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.camera.acquire_timeout_ms)
    }

    pub fn first_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.camera.first_frame_timeout_ms)
    }

    pub fn torch_timeout(&self) -> Duration {
        Duration::from_millis(self.camera.torch_timeout_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.decoder.frame_interval_ms)
    }

    pub fn engine_interval(&self) -> Duration {
        Duration::from_millis(self.decoder.engine_interval_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.decoder.init_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.scan.cooldown_ms)
    }
}

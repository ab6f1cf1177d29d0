//! Configuration management for the `trunkscan` scanner

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory recordings and metadata are written to
    pub capture_dir: PathBuf,

    /// Optional `{token}` filename template; the legacy date-tree layout
    /// is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_format: Option<String>,

    /// Archive call artifacts instead of deleting them when the upload
    /// ultimately fails
    #[serde(default)]
    pub archive_files_on_failure: bool,

    /// Configured trunked systems
    #[serde(default)]
    pub systems: Vec<SystemConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Per-system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Short name used in paths and log lines
    pub short_name: String,

    /// Optional `{token}` filename template for this system, overriding the
    /// top-level one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_format: Option<String>,

    /// Bandplan family name (`800_standard`, `800_rebanded`, `800_splinter`,
    /// `900`, `OBT`, plus the legacy aliases)
    #[serde(default = "default_bandplan")]
    pub bandplan: String,

    /// OBT bandplan base frequency, MHz
    #[serde(default)]
    pub bandplan_base: f64,

    /// OBT bandplan high frequency, MHz
    #[serde(default)]
    pub bandplan_high: f64,

    /// OBT bandplan channel spacing, MHz
    #[serde(default = "default_bandplan_spacing")]
    pub bandplan_spacing: f64,

    /// OBT bandplan channel offset
    #[serde(default = "default_bandplan_offset")]
    pub bandplan_offset: i32,

    /// Transmissions shorter than this many seconds are dropped
    #[serde(default)]
    pub min_tx_duration: f64,

    /// Calls with less playable audio than this many seconds are dropped
    #[serde(default)]
    pub min_call_duration: f64,

    /// Keep the combined audio after processing
    #[serde(default = "default_true")]
    pub audio_archive: bool,

    /// Keep the per-transmission files after processing
    #[serde(default)]
    pub transmission_archive: bool,

    /// Keep the JSON sidecar after processing
    #[serde(default = "default_true")]
    pub call_log: bool,

    /// Transcode combined audio to AAC
    #[serde(default = "default_true")]
    pub compress_wav: bool,

    /// Optional upload script, invoked with the three artifact paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_script: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json or text)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_bandplan() -> String {
    "800_standard".to_string()
}

const fn default_bandplan_spacing() -> f64 {
    0.025
}

const fn default_bandplan_offset() -> i32 {
    380
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            short_name: String::new(),
            filename_format: None,
            bandplan: default_bandplan(),
            bandplan_base: 0.0,
            bandplan_high: 0.0,
            bandplan_spacing: default_bandplan_spacing(),
            bandplan_offset: default_bandplan_offset(),
            min_tx_duration: 0.0,
            min_call_duration: 0.0,
            audio_archive: true,
            transmission_archive: false,
            call_log: true,
            compress_wav: true,
            upload_script: None,
        }
    }
}

impl Config {
    /// Load configuration from environment and files
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or parsed.
    pub fn load() -> crate::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("trunkscan").required(false))
            .add_source(config::Environment::with_prefix("TRUNKSCAN").separator("_"))
            .build()
            .map_err(|e| crate::Error::Configuration {
                message: e.to_string(),
            })?;

        config
            .try_deserialize()
            .map_err(|e| crate::Error::Configuration {
                message: e.to_string(),
            })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture_dir: PathBuf::from(
                std::env::var("TRUNKSCAN_CAPTURE_DIR").unwrap_or_else(|_| "./captures".to_string()),
            ),
            filename_format: None,
            archive_files_on_failure: false,
            systems: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

//! Configuration management for the camera monitor service.
//!
//! This module handles loading and validating configuration from environment
//! variables and configuration files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Raw pixel formats with 3 bytes per pixel, matching `FrameDims::frame_size`.
const PACKED_PIXEL_FORMATS: &[&str] = &["bgr24", "rgb24"];

/// Main configuration for the monitor service.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Admission scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Per-camera session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Decoder and prober process configuration
    #[serde(default)]
    pub decoder: DecoderConfig,

    /// Detection service configuration
    pub detector: DetectorConfig,

    /// Upstream VMS configuration
    pub vms: VmsConfig,

    /// Camera inventory source
    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Zone configuration source
    #[serde(default)]
    pub zones: ZonesConfig,

    /// Intake API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Admission scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently running sessions
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Maximum time to block on an empty queue before re-checking, in milliseconds
    #[serde(default = "default_queue_poll_ms")]
    pub queue_poll_ms: u64,

    /// Sleep between admission attempts while at capacity, in milliseconds
    #[serde(default = "default_saturated_backoff_ms")]
    pub saturated_backoff_ms: u64,
}

/// Per-camera session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Hard ceiling on a session's streaming loop, in seconds
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,

    /// Run detection on every Nth decoded frame
    #[serde(default = "default_process_every")]
    pub process_every: u64,

    /// Wait between polls while no new frame is available, in milliseconds
    #[serde(default = "default_frame_wait_ms")]
    pub frame_wait_ms: u64,

    /// Minimum interval between detection events from one session, in seconds
    #[serde(default = "default_event_delay_secs")]
    pub event_delay_secs: u64,

    /// End the session on the first confirmed detection
    #[serde(default = "default_stop_on_detection")]
    pub stop_on_detection: bool,

    /// Width of the frame space zone coordinates are authored in
    #[serde(default = "default_zone_reference_width")]
    pub zone_reference_width: u32,

    /// Height of the frame space zone coordinates are authored in
    #[serde(default = "default_zone_reference_height")]
    pub zone_reference_height: u32,
}

/// Decoder and prober process configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DecoderConfig {
    /// Path to the ffmpeg binary
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Path to the ffprobe binary
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    /// Stream probe timeout in seconds
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Grace period between terminate and kill, in milliseconds
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,

    /// Raw output pixel format (3 bytes per pixel)
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
}

/// Detection service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Detection service endpoint
    pub endpoint: String,

    /// Per-frame detection timeout in milliseconds
    #[serde(default = "default_detector_timeout_ms")]
    pub timeout_ms: u64,

    /// Minimum confidence for a detection to count
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// Classes a detection must belong to
    #[serde(default = "default_classes")]
    pub classes: Vec<String>,
}

/// Upstream VMS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VmsConfig {
    /// VMS REST API base URL
    pub base_url: String,

    /// Static bearer token (skips login)
    #[serde(default)]
    pub token: Option<String>,

    /// Login username
    #[serde(default)]
    pub username: Option<String>,

    /// Login password
    #[serde(default)]
    pub password: Option<String>,

    /// Custom event raised on a confirmed detection
    pub detection_event_id: String,

    /// Custom event raised on session errors
    #[serde(default)]
    pub error_event_id: Option<String>,

    /// Event action source that carries the fullscreen action
    pub source_id: String,

    /// Monitor the fullscreen action targets
    #[serde(default = "default_monitor_id")]
    pub monitor_id: u32,

    /// Legend text shown on the fullscreen camera
    #[serde(default = "default_legend_text")]
    pub legend_text: String,

    /// How far in the future the transient event is scheduled, in seconds
    #[serde(default = "default_event_lead_secs")]
    pub event_lead_secs: u64,

    /// Delay before the transient event is removed, in seconds
    #[serde(default = "default_event_removal_delay_secs")]
    pub event_removal_delay_secs: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Accept self-signed TLS certificates
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,

    /// Give up retrying login after this many seconds
    #[serde(default = "default_login_max_elapsed_secs")]
    pub login_max_elapsed_secs: u64,
}

/// Camera inventory source.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryConfig {
    /// Path to the recorder export JSON
    #[serde(default = "default_inventory_path")]
    pub path: String,
}

/// Zone configuration source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZonesConfig {
    /// Path to the zones JSON (no file means no zone filtering)
    #[serde(default)]
    pub path: Option<String>,
}

/// Intake API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Address the intake API listens on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_capacity() -> usize {
    100
}
fn default_queue_poll_ms() -> u64 {
    1000
}
fn default_saturated_backoff_ms() -> u64 {
    500
}
fn default_time_budget_secs() -> u64 {
    20
}
fn default_process_every() -> u64 {
    5
}
fn default_frame_wait_ms() -> u64 {
    10
}
fn default_event_delay_secs() -> u64 {
    30
}
fn default_stop_on_detection() -> bool {
    true
}
fn default_zone_reference_width() -> u32 {
    640
}
fn default_zone_reference_height() -> u32 {
    360
}
fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}
fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}
fn default_probe_timeout_secs() -> u64 {
    10
}
fn default_terminate_grace_ms() -> u64 {
    2000
}
fn default_pixel_format() -> String {
    "bgr24".to_string()
}
fn default_detector_timeout_ms() -> u64 {
    5000
}
fn default_min_confidence() -> f32 {
    0.5
}
fn default_classes() -> Vec<String> {
    vec!["person".to_string()]
}
fn default_monitor_id() -> u32 {
    9
}
fn default_legend_text() -> String {
    "$event.name$".to_string()
}
fn default_event_lead_secs() -> u64 {
    10
}
fn default_event_removal_delay_secs() -> u64 {
    20
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_accept_invalid_certs() -> bool {
    true
}
fn default_login_max_elapsed_secs() -> u64 {
    60
}
fn default_inventory_path() -> String {
    "recorders.json".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            queue_poll_ms: default_queue_poll_ms(),
            saturated_backoff_ms: default_saturated_backoff_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            time_budget_secs: default_time_budget_secs(),
            process_every: default_process_every(),
            frame_wait_ms: default_frame_wait_ms(),
            event_delay_secs: default_event_delay_secs(),
            stop_on_detection: default_stop_on_detection(),
            zone_reference_width: default_zone_reference_width(),
            zone_reference_height: default_zone_reference_height(),
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            probe_timeout_secs: default_probe_timeout_secs(),
            terminate_grace_ms: default_terminate_grace_ms(),
            pixel_format: default_pixel_format(),
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            path: default_inventory_path(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default config file (config/default.toml)
    /// 2. Environment-specific config (config/{env}.toml)
    /// 3. Environment variables (prefixed with MONITOR_)
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // e.g. MONITOR_VMS__BASE_URL
            .add_source(
                Environment::with_prefix("MONITOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Create configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("MONITOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.scheduler.capacity == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "scheduler.capacity".to_string(),
                message: "Capacity must be greater than 0".to_string(),
            });
        }

        if self.session.process_every == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "session.process_every".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.session.time_budget_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "session.time_budget_secs".to_string(),
                message: "Time budget must be greater than 0".to_string(),
            });
        }

        if self.session.zone_reference_width == 0 || self.session.zone_reference_height == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "session.zone_reference_width/height".to_string(),
                message: "Dimensions must be greater than 0".to_string(),
            });
        }

        if !PACKED_PIXEL_FORMATS.contains(&self.decoder.pixel_format.as_str()) {
            return Err(ConfigValidationError::InvalidValue {
                field: "decoder.pixel_format".to_string(),
                message: format!(
                    "Frames are read as 3 bytes per pixel; expected one of {:?}",
                    PACKED_PIXEL_FORMATS
                ),
            });
        }

        if self.detector.endpoint.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "detector.endpoint".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            return Err(ConfigValidationError::InvalidValue {
                field: "detector.min_confidence".to_string(),
                message: "Confidence must be within [0, 1]".to_string(),
            });
        }

        if self.vms.base_url.is_empty() {
            return Err(ConfigValidationError::MissingField("vms.base_url".to_string()));
        }
        if !self.vms.base_url.starts_with("http://") && !self.vms.base_url.starts_with("https://") {
            return Err(ConfigValidationError::InvalidValue {
                field: "vms.base_url".to_string(),
                message: "URL must start with http:// or https://".to_string(),
            });
        }

        if self.vms.detection_event_id.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "vms.detection_event_id".to_string(),
            ));
        }

        if self.vms.source_id.is_empty() {
            return Err(ConfigValidationError::MissingField("vms.source_id".to_string()));
        }

        let has_token = self.vms.token.as_deref().is_some_and(|t| !t.is_empty());
        let has_login = self.vms.username.as_deref().is_some_and(|u| !u.is_empty());
        if !has_token && !has_login {
            return Err(ConfigValidationError::MissingField(
                "vms.token or vms.username".to_string(),
            ));
        }

        Ok(())
    }
}

impl SchedulerConfig {
    /// Get queue poll interval as Duration.
    pub fn queue_poll(&self) -> Duration {
        Duration::from_millis(self.queue_poll_ms)
    }

    /// Get saturated backoff as Duration.
    pub fn saturated_backoff(&self) -> Duration {
        Duration::from_millis(self.saturated_backoff_ms)
    }
}

impl SessionConfig {
    /// Get session time budget as Duration.
    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs)
    }

    /// Get frame wait as Duration.
    pub fn frame_wait(&self) -> Duration {
        Duration::from_millis(self.frame_wait_ms)
    }

    /// Get event debounce window as Duration.
    pub fn event_delay(&self) -> Duration {
        Duration::from_secs(self.event_delay_secs)
    }
}

impl DecoderConfig {
    /// Get probe timeout as Duration.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Get terminate grace period as Duration.
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

impl DetectorConfig {
    /// Get detection timeout as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl VmsConfig {
    /// Get request timeout as Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get event lead time as Duration.
    pub fn event_lead(&self) -> Duration {
        Duration::from_secs(self.event_lead_secs)
    }

    /// Get event removal delay as Duration.
    pub fn event_removal_delay(&self) -> Duration {
        Duration::from_secs(self.event_removal_delay_secs)
    }

    /// Get login retry ceiling as Duration.
    pub fn login_max_elapsed(&self) -> Duration {
        Duration::from_secs(self.login_max_elapsed_secs)
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
pub(crate) fn test_vms_config(base_url: &str) -> VmsConfig {
    VmsConfig {
        base_url: base_url.to_string(),
        token: Some("test-token".to_string()),
        username: None,
        password: None,
        detection_event_id: "evt-detect".to_string(),
        error_event_id: Some("evt-error".to_string()),
        source_id: "src-1".to_string(),
        monitor_id: default_monitor_id(),
        legend_text: default_legend_text(),
        event_lead_secs: default_event_lead_secs(),
        event_removal_delay_secs: default_event_removal_delay_secs(),
        request_timeout_secs: 1,
        accept_invalid_certs: true,
        login_max_elapsed_secs: 1,
    }
}

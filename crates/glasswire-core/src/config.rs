//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level Glasswire configuration.
///
/// Every section is optional; accessors fall back to the built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<SurfaceConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backends: Option<BackendsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// --- Gateway ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Allow any origin to embed the feeds.
    #[serde(default = "default_true")]
    pub cors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: None,
            cors: true,
        }
    }
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

// --- Shared surface ---

/// Rendering surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Explicit Chrome/Chromium executable; auto-detected when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,

    /// Width of the local display in pixels.
    #[serde(default = "default_display_width")]
    pub display_width: u32,

    /// Fraction of the display width used for the viewport.
    #[serde(default = "default_width_fraction")]
    pub width_fraction: f64,

    #[serde(default = "default_viewport_height")]
    pub height: u32,

    /// Page the shared surface opens on first use.
    #[serde(default = "default_landing_url")]
    pub landing_url: String,

    /// Page loaded by the single-shot `/screenshot` capture.
    #[serde(default = "default_snapshot_url")]
    pub snapshot_url: String,

    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_ms: u64,

    /// Additional command-line flags for the engine.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            display_width: default_display_width(),
            width_fraction: default_width_fraction(),
            height: default_viewport_height(),
            landing_url: default_landing_url(),
            snapshot_url: default_snapshot_url(),
            launch_timeout_ms: default_launch_timeout(),
            extra_args: Vec::new(),
        }
    }
}

impl SurfaceConfig {
    /// Viewport size derived once from the display width.
    pub fn viewport(&self) -> (u32, u32) {
        let width = (f64::from(self.display_width) * self.width_fraction) as u32;
        (width.max(1), self.height)
    }
}

fn default_display_width() -> u32 {
    1920
}

fn default_width_fraction() -> f64 {
    0.25
}

fn default_viewport_height() -> u32 {
    720
}

fn default_landing_url() -> String {
    "https://www.ibm.com/granite".into()
}

fn default_snapshot_url() -> String {
    "https://tympanus.net/Development/AmbientCanvasBackgrounds/index2.html".into()
}

fn default_launch_timeout() -> u64 {
    30_000
}

// --- Capture ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_standard_profile")]
    pub standard: ProfileConfig,

    #[serde(default = "default_fast_profile")]
    pub fast: ProfileConfig,

    /// Log the achieved frame rate every N frames (0 disables).
    #[serde(default = "default_log_every_frames")]
    pub log_every_frames: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            standard: default_standard_profile(),
            fast: default_fast_profile(),
            log_every_frames: default_log_every_frames(),
        }
    }
}

/// Slowest cadence a capture profile may ask for.
pub const MIN_CAPTURE_FPS: f64 = 0.01;

/// Cadence and JPEG quality of one stream flavor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub fps: f64,
    pub quality: u8,
}

fn default_standard_profile() -> ProfileConfig {
    ProfileConfig {
        fps: 20.0,
        quality: 75,
    }
}

fn default_fast_profile() -> ProfileConfig {
    ProfileConfig {
        fps: 30.0,
        quality: 60,
    }
}

fn default_log_every_frames() -> u64 {
    100
}

// --- Backends ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub primary: BackendConfig,

    #[serde(default)]
    pub secondary: BackendConfig,

    /// Pause between synthetic token events on the fallback path.
    #[serde(default = "default_fallback_delay")]
    pub fallback_token_delay_ms: u64,

    #[serde(default = "default_chat_system_prompt")]
    pub chat_system_prompt: String,

    #[serde(default = "default_markdown_system_prompt")]
    pub markdown_system_prompt: String,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            primary: BackendConfig::default(),
            secondary: BackendConfig::default(),
            fallback_token_delay_ms: default_fallback_delay(),
            chat_system_prompt: default_chat_system_prompt(),
            markdown_system_prompt: default_markdown_system_prompt(),
        }
    }
}

/// Location and model of one generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            model: default_model(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "granite3.3:8b".into()
}

fn default_fallback_delay() -> u64 {
    30
}

fn default_chat_system_prompt() -> String {
    "You are a helpful assistant.".into()
}

fn default_markdown_system_prompt() -> String {
    "You are a meeting notes assistant. Respond in well-structured Markdown \
     using headings, bullet lists, and emphasis where it helps."
        .into()
}

// --- Logging ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "glasswire_surface=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::GlasswireError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn gateway(&self) -> GatewayConfig {
        self.gateway.clone().unwrap_or_default()
    }

    pub fn surface(&self) -> SurfaceConfig {
        self.surface.clone().unwrap_or_default()
    }

    pub fn capture(&self) -> CaptureConfig {
        self.capture.clone().unwrap_or_default()
    }

    pub fn backends(&self) -> BackendsConfig {
        self.backends.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_else(|| LoggingConfig {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        })
    }

    /// Gateway port.
    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or_else(default_port)
    }

    /// Copy with every section filled in, defaults included.
    pub fn resolved(&self) -> Config {
        Config {
            gateway: Some(self.gateway()),
            surface: Some(self.surface()),
            capture: Some(self.capture()),
            backends: Some(self.backends()),
            logging: Some(self.logging()),
        }
    }

    /// Get an effective config value by dotted path (e.g. `capture.fast.fps`).
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self.resolved()).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }

        let capture = self.capture();
        for (name, profile) in [("standard", capture.standard), ("fast", capture.fast)] {
            if !(profile.fps >= MIN_CAPTURE_FPS && profile.fps.is_finite()) {
                errors.push(format!(
                    "Capture profile '{name}' needs a finite fps of at least {MIN_CAPTURE_FPS}"
                ));
            }
            if profile.quality > 100 {
                errors.push(format!(
                    "Capture profile '{name}' quality {} exceeds 100",
                    profile.quality
                ));
            }
        }

        let surface = self.surface();
        if !(surface.width_fraction > 0.0 && surface.width_fraction <= 1.0) {
            errors.push(format!(
                "Surface width_fraction {} must be within (0, 1]",
                surface.width_fraction
            ));
        }
        if let Some(path) = &surface.chrome_path {
            if !Path::new(path).exists() {
                warnings.push(format!("Chrome executable not found: {path}"));
            }
        }

        let backends = self.backends();
        if backends.fallback_token_delay_ms > 1_000 {
            warnings.push(format!(
                "Fallback token delay of {}ms will make fallback replies crawl",
                backends.fallback_token_delay_ms
            ));
        }

        (warnings, errors)
    }
}

/// Base directory for Glasswire data: `~/.glasswire/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".glasswire")
}

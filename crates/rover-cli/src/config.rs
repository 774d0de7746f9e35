//! Configuration vault – reads/writes `~/.rover/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use rover_kernel::ActuatorConfig;
use rover_middleware::{AudioConfig, VideoConfig};
use rover_runtime::{DisplayConfig, LogFormat, RoverConfig};

/// Where the drivers come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HardwareBackend {
    /// In-process simulated drivers.
    #[default]
    Sim,
    /// No drivers at all; every command reports "not initialized".
    None,
}

impl std::str::FromStr for HardwareBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sim" => Ok(Self::Sim),
            "none" => Ok(Self::None),
            other => Err(format!("unknown hardware backend '{other}' (expected sim or none)")),
        }
    }
}

impl std::fmt::Display for HardwareBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareBackend::Sim => write!(f, "sim"),
            HardwareBackend::None => write!(f, "none"),
        }
    }
}

/// Which devices to bring up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub backend: HardwareBackend,
    pub enable_audio: bool,
    pub enable_video: bool,
    pub enable_display: bool,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: HardwareBackend::Sim,
            enable_audio: true,
            enable_video: true,
            enable_display: true,
        }
    }
}

/// Persisted daemon configuration stored in `~/.rover/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP port for the cockpit (operator page, sockets, video).
    pub http_port: u16,

    /// Answer successful control commands with an OK envelope.
    pub ack_commands: bool,

    pub log_format: LogFormat,

    /// OTLP/HTTP collector URL. Falls back to `OTEL_EXPORTER_OTLP_ENDPOINT`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,

    pub hardware: HardwareConfig,
    pub actuators: ActuatorConfig,
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            ack_commands: false,
            log_format: LogFormat::Compact,
            otlp_endpoint: None,
            hardware: HardwareConfig::default(),
            actuators: ActuatorConfig::default(),
            audio: AudioConfig::default(),
            video: VideoConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Config {
    /// The subsystem sections, as the runtime wants them.
    pub fn rover_config(&self) -> RoverConfig {
        RoverConfig {
            actuators: self.actuators.clone(),
            audio: self.audio.clone(),
            video: self.video.clone(),
            display: self.display.clone(),
        }
    }
}

/// Return the config path: `$ROVER_CONFIG` if set, else
/// `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("ROVER_CONFIG")
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path. Environment overrides are not
/// applied; see [`apply_env_overrides`].
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {}", e))
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.
///
/// Unparseable values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_HTTP_PORT` | `http_port` |
/// | `ROVER_HARDWARE` | `hardware.backend` (`sim` or `none`) |
/// | `ROVER_ENABLE_AUDIO` | `hardware.enable_audio` |
/// | `ROVER_ENABLE_VIDEO` | `hardware.enable_video` |
/// | `ROVER_LOG_FORMAT` | `log_format` (`compact` or `json`) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROVER_HTTP_PORT")
        && let Ok(port) = v.trim().parse::<u16>()
    {
        cfg.http_port = port;
    }
    if let Ok(v) = std::env::var("ROVER_HARDWARE")
        && let Ok(backend) = v.parse()
    {
        cfg.hardware.backend = backend;
    }
    if let Ok(v) = std::env::var("ROVER_ENABLE_AUDIO")
        && let Some(on) = parse_flag(&v)
    {
        cfg.hardware.enable_audio = on;
    }
    if let Ok(v) = std::env::var("ROVER_ENABLE_VIDEO")
        && let Some(on) = parse_flag(&v)
    {
        cfg.hardware.enable_video = on;
    }
    if let Ok(v) = std::env::var("ROVER_LOG_FORMAT")
        && let Ok(format) = v.parse()
    {
        cfg.log_format = format;
    }
}

/// Save the config to disk, creating `~/.rover/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

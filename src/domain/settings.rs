use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            console_logging_enabled: default_true(),
            file_logging_enabled: default_false(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            ansi_colors: default_true(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "lightlink".to_string()
}

/// Which link strategy the bridge runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process GATT link, one session per bulb.
    Ble,
    /// External daemon over a persistent WebSocket.
    Websocket,
    /// External daemon over Redis pub/sub channels.
    Pubsub,
}

/// One registered bulb: stable address plus display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightConfig {
    pub mac: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsocketSettings {
    #[serde(default = "default_ws_host")]
    pub host: String,
    #[serde(default = "default_ws_port")]
    pub port: u16,
}

impl Default for WebsocketSettings {
    fn default() -> Self {
        Self {
            host: default_ws_host(),
            port: default_ws_port(),
        }
    }
}

fn default_ws_host() -> String {
    "0.0.0.0".to_string()
}
fn default_ws_port() -> u16 {
    8765
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubSettings {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    /// Channel prefix: commands go to `<namespace>:control`, state arrives
    /// on `<namespace>:state`.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for PubSubSettings {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            namespace: default_namespace(),
        }
    }
}

fn default_redis_host() -> String {
    "localhost".to_string()
}
fn default_redis_port() -> u16 {
    6379
}
fn default_namespace() -> String {
    "yeelightble".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BleSettings {
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "default_connect_delay_ms")]
    pub connect_delay_ms: u64,
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,
}

impl Default for BleSettings {
    fn default() -> Self {
        Self {
            connect_retries: default_connect_retries(),
            connect_delay_ms: default_connect_delay_ms(),
            write_retries: default_write_retries(),
        }
    }
}

fn default_connect_retries() -> u32 {
    10
}
fn default_connect_delay_ms() -> u64 {
    100
}
fn default_write_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    #[serde(default)]
    pub devices: Vec<LightConfig>,

    #[serde(default)]
    pub websocket: WebsocketSettings,
    #[serde(default)]
    pub pubsub: PubSubSettings,
    #[serde(default)]
    pub ble: BleSettings,

    /// Duplicate commands with the same arguments inside this window are
    /// coalesced into one transport write.
    #[serde(default = "default_throttle_window_ms")]
    pub throttle_window_ms: u64,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            devices: Vec::new(),
            websocket: WebsocketSettings::default(),
            pubsub: PubSubSettings::default(),
            ble: BleSettings::default(),
            throttle_window_ms: default_throttle_window_ms(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_transport() -> TransportKind {
    TransportKind::Websocket
}
fn default_throttle_window_ms() -> u64 {
    200
}

pub struct SettingsService {
    settings: Settings,
}

impl SettingsService {
    /// Load settings from `path`, or from the platform config directory when
    /// no path is given. A missing or unreadable file yields defaults.
    pub fn new(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let settings_path = match path {
            Some(p) => p,
            None => Self::default_settings_path()?,
        };
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self { settings })
    }

    fn default_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("lightlink");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_daemon_endpoints() {
        let settings = Settings::default();
        assert_eq!(settings.websocket.host, "0.0.0.0");
        assert_eq!(settings.websocket.port, 8765);
        assert_eq!(settings.pubsub.host, "localhost");
        assert_eq!(settings.pubsub.port, 6379);
        assert_eq!(settings.pubsub.namespace, "yeelightble");
        assert_eq!(settings.throttle_window_ms, 200);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let json = r#"{
            "transport": "pubsub",
            "devices": [{ "mac": "F8:24:41:00:11:22", "name": "Desk lamp" }]
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.transport, TransportKind::Pubsub);
        assert_eq!(settings.devices.len(), 1);
        assert_eq!(settings.ble.connect_retries, 10);
        assert_eq!(settings.ble.write_retries, 2);
        assert_eq!(settings.ble.connect_delay_ms, 100);
    }
}

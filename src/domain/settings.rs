use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
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
    "kle_ble_sdk".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// How an advertised local name is compared against the scan target.
/// All policies are case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    #[default]
    Exact,
    Prefix,
    Contains,
}

/// GATT layout of the lock's command channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattSettings {
    #[serde(default = "default_service_uuid")]
    pub service_uuid: Uuid,
    #[serde(default = "default_command_uuid")]
    pub command_char_uuid: Uuid,
}

impl Default for GattSettings {
    fn default() -> Self {
        Self {
            service_uuid: default_service_uuid(),
            command_char_uuid: default_command_uuid(),
        }
    }
}

fn default_service_uuid() -> Uuid {
    crate::infrastructure::bluetooth::protocol::SERVICE_UUID
}
fn default_command_uuid() -> Uuid {
    crate::infrastructure::bluetooth::protocol::COMMAND_CHAR_UUID
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    #[serde(default)]
    pub match_policy: MatchPolicy,
    #[serde(default)]
    pub gatt: GattSettings,
    /// Last target typed into the demo, offered again on the next run
    #[serde(default)]
    pub last_target: Option<String>,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan_timeout_secs: default_scan_timeout_secs(),
            match_policy: MatchPolicy::default(),
            gatt: GattSettings::default(),
            last_target: None,
            log_settings: LogSettings::default(),
        }
    }
}

fn default_scan_timeout_secs() -> u64 {
    30
}

impl Settings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            scan_timeout: Duration::from_secs(self.scan_timeout_secs),
            match_policy: self.match_policy,
        }
    }
}

/// Runtime knobs of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub scan_timeout: Duration,
    pub match_policy: MatchPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Settings::default().session_config()
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::at(settings_path))
    }

    /// Use an explicit settings file; missing or unreadable files yield defaults
    pub fn at(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!("Using default settings ({}): {}", settings_path.display(), e);
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("KleBleSdk");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn remember_target(&mut self, target: &str) -> anyhow::Result<()> {
        if self.settings.last_target.as_deref() != Some(target) {
            self.settings.last_target = Some(target.to_string());
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("kle_ble_sdk_{}_{}", name, std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn partial_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "match_policy": "prefix" }"#).unwrap();
        assert_eq!(settings.match_policy, MatchPolicy::Prefix);
        assert_eq!(settings.scan_timeout_secs, 30);
        assert_eq!(settings.gatt, GattSettings::default());
        assert_eq!(
            settings.session_config().scan_timeout,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let service = SettingsService::at(scratch_path("missing"));
        assert_eq!(service.get().match_policy, MatchPolicy::Exact);
        assert!(service.get().last_target.is_none());
    }

    #[test]
    fn remembered_target_survives_reload() {
        let path = scratch_path("remember");
        let mut service = SettingsService::at(path.clone());
        service.get_mut().scan_timeout_secs = 12;
        service.remember_target("11717433").unwrap();

        let reloaded = SettingsService::at(path.clone());
        assert_eq!(reloaded.get().last_target.as_deref(), Some("11717433"));
        assert_eq!(reloaded.get().scan_timeout_secs, 12);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}

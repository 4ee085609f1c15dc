use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::core::providers::ProviderKind;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Unknown provider ID: '{0}'")]
    UnknownProvider(String),
    #[error("Cannot disable '{0}': it is the last enabled provider")]
    LastEnabledProvider(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_warning_percent")]
    pub warning_percent: f64,
    #[serde(default = "default_critical_percent")]
    pub critical_percent: f64,
}

fn default_warning_percent() -> f64 {
    80.0
}
fn default_critical_percent() -> f64 {
    95.0
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            warning_percent: default_warning_percent(),
            critical_percent: default_critical_percent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Explicitly-entered API key for users opting out of keyring storage.
    /// Must pass through the sanitizer before any logging.
    pub api_key: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Auto-refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Start application on system login
    #[serde(default)]
    pub start_on_login: bool,
    #[serde(default)]
    pub notifications: NotificationSettings,
    /// Per-provider entries; order doubles as display order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

fn default_refresh_interval() -> u64 {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            start_on_login: false,
            notifications: NotificationSettings::default(),
            providers: vec![
                ProviderConfig {
                    id: "claude".into(),
                    enabled: true,
                    api_key: None,
                },
                ProviderConfig {
                    id: "codex".into(),
                    enabled: false,
                    api_key: None,
                },
                ProviderConfig {
                    id: "openai".into(),
                    enabled: false,
                    api_key: None,
                },
                ProviderConfig {
                    id: "gemini".into(),
                    enabled: false,
                    api_key: None,
                },
            ],
        }
    }
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("aiq").join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Serialize and write this config to the config file path.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).expect("Failed to serialize config");
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Enabled providers in display order.
    pub fn enabled_providers(&self) -> Vec<ProviderKind> {
        self.providers
            .iter()
            .filter(|p| p.enabled)
            .filter_map(|p| ProviderKind::from_id(&p.id))
            .collect()
    }

    pub fn is_provider_enabled(&self, kind: ProviderKind) -> bool {
        self.providers
            .iter()
            .any(|p| p.enabled && p.id == kind.id())
    }

    /// API key override from the config carve-out, if any.
    pub fn api_key_for(&self, kind: ProviderKind) -> Option<&str> {
        self.providers
            .iter()
            .find(|p| p.id == kind.id())
            .and_then(|p| p.api_key.as_deref())
    }

    /// Enable or disable a provider. Disabling the last enabled provider is
    /// rejected and the list is left unchanged.
    pub fn set_provider_enabled(&mut self, id: &str, enabled: bool) -> Result<(), ConfigError> {
        let kind =
            ProviderKind::from_id(id).ok_or_else(|| ConfigError::UnknownProvider(id.to_string()))?;

        if !enabled {
            let enabled_count = self.providers.iter().filter(|p| p.enabled).count();
            let is_enabled = self.is_provider_enabled(kind);
            if is_enabled && enabled_count <= 1 {
                return Err(ConfigError::LastEnabledProvider(kind.id().to_string()));
            }
        }

        if let Some(entry) = self.providers.iter_mut().find(|p| p.id == kind.id()) {
            entry.enabled = enabled;
        } else {
            self.providers.push(ProviderConfig {
                id: kind.id().to_string(),
                enabled,
                api_key: None,
            });
        }
        Ok(())
    }

    /// Reorder providers; entries not named keep their position after the
    /// named ones. Unknown IDs are rejected.
    pub fn set_provider_order(&mut self, order: &[String]) -> Result<(), ConfigError> {
        for id in order {
            if ProviderKind::from_id(id).is_none() {
                return Err(ConfigError::UnknownProvider(id.clone()));
            }
        }
        self.providers.sort_by_key(|p| {
            order
                .iter()
                .position(|id| ProviderKind::from_id(id).map(|k| k.id()) == Some(p.id.as_str()))
                .unwrap_or(usize::MAX)
        });
        Ok(())
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.refresh_interval == 0 {
            issues.push("refresh_interval must be at least 1 minute".to_string());
        }
        if self.notifications.warning_percent >= self.notifications.critical_percent {
            issues.push(format!(
                "warning_percent ({}) must be below critical_percent ({})",
                self.notifications.warning_percent, self.notifications.critical_percent
            ));
        }
        for p in &self.providers {
            if ProviderKind::from_id(&p.id).is_none() {
                issues.push(format!("Unknown provider ID: '{}'", p.id));
            }
        }
        if self.enabled_providers().is_empty() {
            issues.push("At least one provider must be enabled".to_string());
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let issues = config.validate();
        assert!(issues.is_empty(), "Default config should be valid, got: {:?}", issues);
        assert_eq!(config.refresh_interval, 5);
        assert!(!config.start_on_login);
    }

    #[test]
    fn default_enables_only_claude() {
        let config = AppConfig::default();
        assert_eq!(config.enabled_providers(), vec![ProviderKind::Claude]);
    }

    #[test]
    fn enable_adds_to_list() {
        let mut config = AppConfig::default();
        config.set_provider_enabled("openai", true).unwrap();
        assert!(config.is_provider_enabled(ProviderKind::Openai));
        assert_eq!(
            config.enabled_providers(),
            vec![ProviderKind::Claude, ProviderKind::Openai]
        );
    }

    #[test]
    fn disabling_last_enabled_provider_is_rejected() {
        let mut config = AppConfig::default();
        let err = config.set_provider_enabled("claude", false).unwrap_err();
        assert!(matches!(err, ConfigError::LastEnabledProvider(_)));
        // List unchanged
        assert_eq!(config.enabled_providers(), vec![ProviderKind::Claude]);
    }

    #[test]
    fn disable_works_when_another_remains() {
        let mut config = AppConfig::default();
        config.set_provider_enabled("codex", true).unwrap();
        config.set_provider_enabled("claude", false).unwrap();
        assert_eq!(config.enabled_providers(), vec![ProviderKind::Codex]);
    }

    #[test]
    fn enable_unknown_provider_is_rejected() {
        let mut config = AppConfig::default();
        let err = config.set_provider_enabled("notreal", true).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider(_)));
    }

    #[test]
    fn reorder_moves_named_providers_first() {
        let mut config = AppConfig::default();
        config
            .set_provider_order(&["gemini".to_string(), "claude".to_string()])
            .unwrap();
        let ids: Vec<_> = config.providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids[0], "gemini");
        assert_eq!(ids[1], "claude");
    }

    #[test]
    fn reorder_rejects_unknown_id() {
        let mut config = AppConfig::default();
        assert!(config.set_provider_order(&["bogus".to_string()]).is_err());
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
refresh_interval = 10
start_on_login = true
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.refresh_interval, 10);
        assert!(config.start_on_login);
        assert!(config.providers.is_empty());
        assert_eq!(config.notifications.warning_percent, 80.0);
    }

    #[test]
    fn parse_provider_with_api_key_carve_out() {
        let toml = r#"
[[providers]]
id = "openai"
enabled = true
api_key = "sk-from-config"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.api_key_for(ProviderKind::Openai), Some("sk-from-config"));
        assert_eq!(config.api_key_for(ProviderKind::Claude), None);
    }

    #[test]
    fn parse_empty_toml_gives_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.refresh_interval, 5);
        assert_eq!(config.notifications.critical_percent, 95.0);
    }

    #[test]
    fn validate_catches_inverted_thresholds() {
        let mut config = AppConfig::default();
        config.notifications.warning_percent = 96.0;
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("warning_percent")));
    }

    #[test]
    fn validate_catches_unknown_provider_id() {
        let mut config = AppConfig::default();
        config.providers.push(ProviderConfig {
            id: "notareal".to_string(),
            enabled: false,
            api_key: None,
        });
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("Unknown provider")));
    }

    #[test]
    fn config_path_uses_xdg_when_set() {
        let _guard = crate::core::testenv::ENV_LOCK.lock().unwrap();
        std::env::set_var("XDG_CONFIG_HOME", "/tmp/test_xdg_config");
        let path = AppConfig::config_path();
        std::env::remove_var("XDG_CONFIG_HOME");
        assert_eq!(path, PathBuf::from("/tmp/test_xdg_config/aiq/config.toml"));
    }
}

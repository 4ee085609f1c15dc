use std::sync::Arc;

use crate::core::config::{AppConfig, ConfigError};
use crate::core::models::usage::UsageSnapshot;
use crate::core::providers::{self, claude, ProviderCtx, ProviderError, ProviderKind};
use crate::core::secret::{Secret, SecretStore};

/// Request/response facade consumed by the UI collaborator (here, the
/// CLI). Every call is a one-shot; nothing streams.
pub struct Service {
    store: Arc<SecretStore>,
}

impl Service {
    pub fn new() -> Self {
        Self {
            store: Arc::new(SecretStore::new()),
        }
    }

    pub fn with_store(store: SecretStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn store(&self) -> Arc<SecretStore> {
        Arc::clone(&self.store)
    }

    /// Provider context against the current on-disk config.
    pub fn provider_ctx(&self) -> ProviderCtx {
        ProviderCtx::new(Arc::clone(&self.store), self.get_config())
    }

    fn resolve(&self, provider_id: &str) -> Result<ProviderKind, ProviderError> {
        ProviderKind::from_id(provider_id).ok_or_else(|| {
            ProviderError::Unsupported(format!("unknown provider '{}'", provider_id))
        })
    }

    // --- Configuration ---

    pub fn get_config(&self) -> AppConfig {
        AppConfig::load().unwrap_or_default()
    }

    pub fn set_refresh_interval(&self, minutes: u64) -> Result<(), ConfigError> {
        let mut config = self.get_config();
        config.refresh_interval = minutes.max(1);
        config.save()?;
        Ok(())
    }

    pub fn set_start_on_login(&self, enabled: bool) -> Result<(), ConfigError> {
        let mut config = self.get_config();
        config.start_on_login = enabled;
        config.save()?;
        Ok(())
    }

    pub fn set_provider_enabled(&self, provider_id: &str, enabled: bool) -> Result<(), ConfigError> {
        let mut config = self.get_config();
        config.set_provider_enabled(provider_id, enabled)?;
        config.save()?;
        Ok(())
    }

    pub fn set_provider_order(&self, order: &[String]) -> Result<(), ConfigError> {
        let mut config = self.get_config();
        config.set_provider_order(order)?;
        config.save()?;
        Ok(())
    }

    // --- Provider operations ---

    pub async fn is_provider_available(&self, provider_id: &str) -> Result<bool, ProviderError> {
        let kind = self.resolve(provider_id)?;
        providers::is_available(&self.provider_ctx(), kind).await
    }

    pub async fn fetch_provider_usage(
        &self,
        provider_id: &str,
    ) -> Result<UsageSnapshot, ProviderError> {
        let kind = self.resolve(provider_id)?;
        providers::fetch_usage(&self.provider_ctx(), kind).await
    }

    pub async fn login_provider(
        &self,
        provider_id: &str,
        api_key: Option<String>,
    ) -> Result<(), ProviderError> {
        let kind = self.resolve(provider_id)?;
        providers::login(&self.provider_ctx(), kind, api_key.map(Secret::new)).await
    }

    pub async fn logout_provider(&self, provider_id: &str) -> Result<(), ProviderError> {
        let kind = self.resolve(provider_id)?;
        providers::logout(&self.provider_ctx(), kind).await
    }

    /// Claude-specific: re-scan for a freshly-created CLI session
    /// credential. Returns whether one was found.
    pub fn reload_token(&self) -> Result<bool, ProviderError> {
        claude::reload(&self.provider_ctx())
    }
}

impl Default for Service {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testenv::ENV_LOCK;

    fn mock_service() -> Service {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        Service::with_store(SecretStore::with_service("aiquota-service-test"))
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let service = mock_service();
        let err = service.is_provider_available("copilot").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }

    #[tokio::test]
    async fn logout_twice_is_idempotent() {
        let service = mock_service();
        service
            .store
            .put("gemini", &Secret::new("key".into()))
            .unwrap();

        service.logout_provider("gemini").await.unwrap();
        // Second logout of an already-empty credential must not error
        service.logout_provider("gemini").await.unwrap();
        assert!(service.store.get("gemini").unwrap().is_none());
    }

    #[tokio::test]
    async fn login_with_supplied_key_persists_secret() {
        let service = mock_service();
        service
            .login_provider("gemini", Some("g-key-123".to_string()))
            .await
            .unwrap();
        assert_eq!(
            service.store.get("gemini").unwrap().unwrap().expose(),
            "g-key-123"
        );
    }

    #[tokio::test]
    async fn unauthenticated_provider_reports_unavailable() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("OPENAI_API_KEY");

        let service = mock_service();
        // No stored secret, no env key, no cookie → unavailable, and a
        // fetch would show the login prompt rather than a partial snapshot
        let available = service.is_provider_available("openai").await.unwrap();
        assert!(!available);
    }

    #[test]
    fn config_enable_round_trips_through_facade() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("XDG_CONFIG_HOME", dir.path());

        let service = mock_service();
        service.set_provider_enabled("codex", true).unwrap();
        let config = service.get_config();
        assert!(config
            .enabled_providers()
            .contains(&ProviderKind::Codex));

        // Disabling everything down to the last provider is rejected
        service.set_provider_enabled("codex", false).unwrap();
        let err = service.set_provider_enabled("claude", false).unwrap_err();
        assert!(matches!(err, ConfigError::LastEnabledProvider(_)));
        let config = service.get_config();
        assert_eq!(config.enabled_providers(), vec![ProviderKind::Claude]);

        std::env::remove_var("XDG_CONFIG_HOME");
    }

    #[test]
    fn refresh_interval_is_floored_at_one_minute() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("XDG_CONFIG_HOME", dir.path());

        let service = mock_service();
        service.set_refresh_interval(0).unwrap();
        assert_eq!(service.get_config().refresh_interval, 1);
        service.set_refresh_interval(15).unwrap();
        assert_eq!(service.get_config().refresh_interval, 15);

        std::env::remove_var("XDG_CONFIG_HOME");
    }
}

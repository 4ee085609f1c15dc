pub mod claude;
pub mod codex;
pub mod gemini;
pub mod openai;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::core::config::AppConfig;
use crate::core::models::usage::UsageSnapshot;
use crate::core::sanitize;
use crate::core::secret::{Secret, SecretStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Claude,
    Codex,
    Openai,
    Gemini,
}

/// How a provider acquires its credential, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    OAuth,
    Cookie,
    Cli,
    ApiToken,
    None,
}

/// Static, serializable description of a provider variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub id: String,
    pub name: String,
    pub supports_login: bool,
    pub auth_methods: Vec<AuthMethod>,
}

impl ProviderKind {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "claude" => Some(Self::Claude),
            "codex" => Some(Self::Codex),
            "openai" => Some(Self::Openai),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Openai => "openai",
            Self::Gemini => "gemini",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::Codex => "Codex",
            Self::Openai => "OpenAI",
            Self::Gemini => "Gemini",
        }
    }

    /// Supported credential paths, most preferred first.
    pub fn auth_methods(&self) -> &'static [AuthMethod] {
        match self {
            Self::Claude => &[AuthMethod::OAuth, AuthMethod::Cli],
            Self::Codex => &[AuthMethod::Cli, AuthMethod::ApiToken],
            Self::Openai => &[AuthMethod::ApiToken, AuthMethod::Cookie],
            Self::Gemini => &[AuthMethod::ApiToken],
        }
    }

    pub fn supports_login(&self) -> bool {
        true
    }

    pub fn session_label(&self) -> &'static str {
        "Session"
    }

    pub fn weekly_label(&self) -> &'static str {
        match self {
            Self::Openai => "Monthly",
            _ => "Weekly",
        }
    }

    pub fn tertiary_label(&self) -> &'static str {
        match self {
            Self::Claude => "Sonnet",
            _ => "Model",
        }
    }

    /// All provider variants in display order.
    pub fn all() -> &'static [ProviderKind] {
        &[Self::Claude, Self::Codex, Self::Openai, Self::Gemini]
    }

    pub fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            id: self.id().to_string(),
            name: self.display_name().to_string(),
            supports_login: self.supports_login(),
            auth_methods: self.auth_methods().to_vec(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ProviderError {
    /// No usable credential — a normal state, mapped to "show login",
    /// never surfaced as an error.
    #[error("Not authenticated")]
    NotAuthenticated,
    /// Transient transport failure; the next scheduled poll retries.
    #[error("Network failure: {0}")]
    NetworkFailure(String),
    /// The provider's own API throttled the usage check.
    #[error("Rate limited by provider API")]
    RateLimited,
    /// Remote response shape changed; surfaced, not retried aggressively.
    #[error("Unexpected response: {0}")]
    ParseFailure(String),
    /// Operation not valid for this provider's auth methods.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// OS secret service failure. Distinct from NotAuthenticated: retrying
    /// login cannot help until the secret service is back.
    #[error("Secret store error: {0}")]
    Store(String),
}

impl ProviderError {
    /// Redact any upstream-derived message before it can cross the
    /// provider boundary.
    fn sanitized(self) -> Self {
        match self {
            Self::NetworkFailure(msg) => Self::NetworkFailure(sanitize::redact(&msg)),
            Self::ParseFailure(msg) => Self::ParseFailure(sanitize::redact(&msg)),
            Self::Store(msg) => Self::Store(sanitize::redact(&msg)),
            other => other,
        }
    }
}

impl From<StoreError> for ProviderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotAuthenticated,
            StoreError::Unavailable(msg) => Self::Store(msg),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::ParseFailure(err.to_string())
        } else {
            Self::NetworkFailure(err.to_string())
        }
    }
}

/// Map a non-success HTTP status to the provider error taxonomy.
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            ProviderError::NotAuthenticated
        }
        reqwest::StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        _ => ProviderError::ParseFailure(format!("HTTP {}: {}", status.as_u16(), body)),
    }
}

/// Validate that a resolved endpoint URL uses HTTPS.
///
/// All providers that allow endpoint overrides must call this before
/// sending credentials, to prevent exfiltration over plain HTTP.
pub(crate) fn validate_endpoint(url: &str, provider_name: &str) -> Result<(), ProviderError> {
    if !url.starts_with("https://") {
        return Err(ProviderError::Unsupported(format!(
            "{}: endpoint must use HTTPS, got: {}",
            provider_name, url
        )));
    }
    Ok(())
}

/// Everything a provider variant needs to authenticate and fetch.
#[derive(Clone)]
pub struct ProviderCtx {
    pub store: Arc<SecretStore>,
    pub http: reqwest::Client,
    pub config: AppConfig,
}

impl ProviderCtx {
    pub fn new(store: Arc<SecretStore>, config: AppConfig) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Config carve-out key wrapped as a transient secret.
    pub(crate) fn config_api_key(&self, kind: ProviderKind) -> Option<Secret> {
        self.config
            .api_key_for(kind)
            .map(|k| Secret::new(k.to_string()))
    }
}

/// Fetch a fresh usage snapshot. Dispatch is a match on the closed
/// variant set; each arm owns its response mapping. Error text leaving
/// here is always sanitized.
pub async fn fetch_usage(
    ctx: &ProviderCtx,
    kind: ProviderKind,
) -> Result<UsageSnapshot, ProviderError> {
    let result = match kind {
        ProviderKind::Claude => claude::fetch(ctx).await,
        ProviderKind::Codex => codex::fetch(ctx).await,
        ProviderKind::Openai => openai::fetch(ctx).await,
        ProviderKind::Gemini => gemini::fetch(ctx).await,
    };
    result.map_err(ProviderError::sanitized)
}

/// Check whether a usable credential currently exists, without a network
/// call.
pub async fn is_available(ctx: &ProviderCtx, kind: ProviderKind) -> Result<bool, ProviderError> {
    let result = match kind {
        ProviderKind::Claude => claude::is_available(ctx),
        ProviderKind::Codex => codex::is_available(ctx),
        ProviderKind::Openai => openai::is_available(ctx),
        ProviderKind::Gemini => gemini::is_available(ctx),
    };
    result.map_err(ProviderError::sanitized)
}

/// Run the credential-acquisition flow for the provider's preferred auth
/// method. `supplied` carries a directly-entered API key where that is
/// the flow.
pub async fn login(
    ctx: &ProviderCtx,
    kind: ProviderKind,
    supplied: Option<Secret>,
) -> Result<(), ProviderError> {
    let result = match kind {
        ProviderKind::Claude => claude::login(ctx, supplied),
        ProviderKind::Codex => codex::login(ctx, supplied),
        ProviderKind::Openai => openai::login(ctx, supplied),
        ProviderKind::Gemini => gemini::login(ctx, supplied),
    };
    result.map_err(ProviderError::sanitized)
}

/// Delete the stored credential. Idempotent: a second logout is a no-op.
pub async fn logout(ctx: &ProviderCtx, kind: ProviderKind) -> Result<(), ProviderError> {
    let result = match kind {
        ProviderKind::Claude => claude::logout(ctx),
        ProviderKind::Codex => codex::logout(ctx),
        ProviderKind::Openai => openai::logout(ctx),
        ProviderKind::Gemini => gemini::logout(ctx),
    };
    result.map_err(ProviderError::sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_id_round_trips() {
        for kind in ProviderKind::all() {
            assert_eq!(ProviderKind::from_id(kind.id()), Some(*kind));
        }
        assert_eq!(ProviderKind::from_id("CLAUDE"), Some(ProviderKind::Claude));
        assert_eq!(ProviderKind::from_id("copilot"), None);
    }

    #[test]
    fn auth_methods_are_ordered_by_preference() {
        assert_eq!(
            ProviderKind::Claude.auth_methods()[0],
            AuthMethod::OAuth
        );
        assert_eq!(
            ProviderKind::Openai.auth_methods(),
            &[AuthMethod::ApiToken, AuthMethod::Cookie]
        );
        assert_eq!(ProviderKind::Gemini.auth_methods(), &[AuthMethod::ApiToken]);
    }

    #[test]
    fn metadata_reflects_variant() {
        let meta = ProviderKind::Codex.metadata();
        assert_eq!(meta.id, "codex");
        assert_eq!(meta.name, "Codex");
        assert!(meta.supports_login);
        assert_eq!(meta.auth_methods.len(), 2);
    }

    #[test]
    fn classify_status_maps_taxonomy() {
        assert!(matches!(
            classify_status(reqwest::StatusCode::UNAUTHORIZED, ""),
            ProviderError::NotAuthenticated
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::RateLimited
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            ProviderError::ParseFailure(_)
        ));
    }

    #[test]
    fn store_unavailable_never_becomes_not_authenticated() {
        let err: ProviderError = StoreError::Unavailable("dbus down".into()).into();
        assert!(matches!(err, ProviderError::Store(_)));

        let err: ProviderError = StoreError::NotFound("claude".into()).into();
        assert!(matches!(err, ProviderError::NotAuthenticated));
    }

    #[test]
    fn sanitized_errors_redact_secrets() {
        let err = ProviderError::ParseFailure(
            "HTTP 500: leaked Bearer sk-ant-oat01-abcdefgh body".into(),
        )
        .sanitized();
        let text = err.to_string();
        assert!(!text.contains("sk-ant"));
        assert!(text.contains("[REDACTED]"));
    }

    #[test]
    fn validate_endpoint_rejects_http() {
        assert!(validate_endpoint("https://api.example.com/v1", "Test").is_ok());
        assert!(validate_endpoint("http://evil.com", "Test").is_err());
        assert!(validate_endpoint("file:///etc/passwd", "Test").is_err());
        assert!(validate_endpoint("", "Test").is_err());
    }
}

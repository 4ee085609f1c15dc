use base64::Engine;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::path::PathBuf;

use crate::core::models::usage::{IdentitySnapshot, RateWindow, UsageSnapshot};
use crate::core::providers::{
    classify_status, validate_endpoint, ProviderCtx, ProviderError, ProviderKind,
};
use crate::core::secret::Secret;

const STORE_KEY: &str = "codex";

// --- Codex CLI credential and config files ---

#[derive(Deserialize)]
struct CodexAuthFile {
    tokens: Option<CodexTokens>,
    #[serde(rename = "OPENAI_API_KEY")]
    openai_api_key: Option<String>,
}

#[derive(Deserialize)]
struct CodexTokens {
    access_token: Option<String>,
    account_id: Option<String>,
}

#[derive(Deserialize, Default)]
struct CodexCliConfig {
    chatgpt_base_url: Option<String>,
}

struct CodexCredentials {
    access_token: Secret,
    account_id: Option<String>,
}

fn codex_home() -> PathBuf {
    std::env::var("CODEX_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".codex")
        })
}

/// Read Codex CLI credentials from auth.json: OAuth tokens first, the
/// OPENAI_API_KEY fallback second.
fn scan_cli_credentials() -> Option<CodexCredentials> {
    let path = codex_home().join("auth.json");
    let content = std::fs::read_to_string(&path).ok()?;
    let file: CodexAuthFile = serde_json::from_str(&content).ok()?;

    if let Some(tokens) = file.tokens {
        if let Some(token) = tokens.access_token.filter(|t| !t.is_empty()) {
            return Some(CodexCredentials {
                access_token: Secret::new(token),
                account_id: tokens.account_id,
            });
        }
    }

    file.openai_api_key
        .filter(|k| !k.is_empty())
        .map(|k| CodexCredentials {
            access_token: Secret::new(k),
            account_id: None,
        })
}

fn resolve_credentials(ctx: &ProviderCtx) -> Result<CodexCredentials, ProviderError> {
    if let Some(secret) = ctx.store.get(STORE_KEY)? {
        return Ok(CodexCredentials {
            account_id: account_id_from_token(secret.expose()),
            access_token: secret,
        });
    }
    if let Some(creds) = scan_cli_credentials() {
        if let Err(e) = ctx.store.put(STORE_KEY, &creds.access_token) {
            tracing::warn!("could not cache Codex token in secret store: {}", e);
        }
        return Ok(creds);
    }
    Err(ProviderError::NotAuthenticated)
}

fn read_cli_config() -> CodexCliConfig {
    let path = codex_home().join("config.toml");
    match std::fs::read_to_string(&path) {
        Ok(content) => toml::from_str(&content).unwrap_or_default(),
        Err(_) => CodexCliConfig::default(),
    }
}

/// Resolve the full usage URL from the optional configured base URL.
fn resolve_usage_url(base_url: Option<&str>) -> String {
    let base = base_url.unwrap_or("https://chatgpt.com/backend-api/");

    let base = if (base.contains("chatgpt.com") || base.contains("chat.openai.com"))
        && !base.contains("backend-api")
    {
        format!("{}/backend-api/", base.trim_end_matches('/'))
    } else {
        base.to_string()
    };

    let base = if base.ends_with('/') {
        base
    } else {
        format!("{}/", base)
    };

    if base.contains("backend-api") {
        format!("{}wham/usage", base)
    } else {
        format!("{}api/codex/usage", base)
    }
}

// --- JWT claims (identity only, never verified) ---

/// Decode a JWT payload without signature verification.
fn decode_jwt_claims(token: &str) -> Option<serde_json::Value> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .ok()?;
    serde_json::from_slice(&decoded).ok()
}

fn email_from_token(token: &str) -> Option<String> {
    decode_jwt_claims(token)?
        .get("email")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn account_id_from_token(token: &str) -> Option<String> {
    decode_jwt_claims(token)?
        .get("https://api.openai.com/auth")
        .and_then(|v| v.get("chatgpt_account_id"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

// --- Usage response (shared shape with the ChatGPT backend) ---

#[derive(Deserialize)]
pub(crate) struct CodexWindowRaw {
    pub used_percent: f64,
    pub reset_at: Option<i64>,
    pub limit_window_seconds: Option<u64>,
}

#[derive(Deserialize)]
pub(crate) struct CodexRateLimitRaw {
    pub primary_window: Option<CodexWindowRaw>,
    pub secondary_window: Option<CodexWindowRaw>,
}

#[derive(Deserialize)]
pub(crate) struct CodexUsageResponse {
    pub plan_type: Option<String>,
    pub rate_limit: Option<CodexRateLimitRaw>,
}

pub(crate) fn parse_window(raw: CodexWindowRaw) -> RateWindow {
    let mut window = RateWindow::new(raw.used_percent);
    window.window_minutes = raw.limit_window_seconds.map(|s| s / 60);
    window.resets_at = raw
        .reset_at
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single());
    window
}

fn parse_usage(data: CodexUsageResponse, email: Option<String>) -> UsageSnapshot {
    let mut snapshot = UsageSnapshot::new(ProviderKind::Codex, "cli");

    if let Some(rl) = data.rate_limit {
        snapshot.primary = rl.primary_window.map(parse_window);
        snapshot.secondary = rl.secondary_window.map(parse_window);
    }

    if data.plan_type.is_some() || email.is_some() {
        snapshot.identity = Some(IdentitySnapshot {
            email,
            plan: data.plan_type,
            organization: None,
        });
    }
    snapshot
}

/// Fetch usage data from the Codex usage endpoint.
pub async fn fetch(ctx: &ProviderCtx) -> Result<UsageSnapshot, ProviderError> {
    let snapshot = {
        let creds = resolve_credentials(ctx)?;

        let cli_config = read_cli_config();
        let url = resolve_usage_url(cli_config.chatgpt_base_url.as_deref());
        validate_endpoint(&url, "Codex")?;

        let email = email_from_token(creds.access_token.expose());

        let mut request = ctx
            .http
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", creds.access_token.expose()),
            )
            .header("Accept", "application/json");
        if let Some(account_id) = &creds.account_id {
            request = request.header("ChatGPT-Account-Id", account_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                let _ = ctx.store.delete(STORE_KEY);
            }
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let data: CodexUsageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseFailure(e.to_string()))?;
        parse_usage(data, email)
    };
    Ok(snapshot)
}

pub fn is_available(ctx: &ProviderCtx) -> Result<bool, ProviderError> {
    if ctx.store.contains(STORE_KEY)? {
        return Ok(true);
    }
    Ok(scan_cli_credentials().is_some())
}

/// Accept a directly-supplied API key, or re-scan the Codex CLI's
/// credential file.
pub fn login(ctx: &ProviderCtx, supplied: Option<Secret>) -> Result<(), ProviderError> {
    if let Some(secret) = supplied {
        ctx.store.put(STORE_KEY, &secret)?;
        return Ok(());
    }
    match scan_cli_credentials() {
        Some(creds) => {
            ctx.store.put(STORE_KEY, &creds.access_token)?;
            Ok(())
        }
        None => Err(ProviderError::NotAuthenticated),
    }
}

pub fn logout(ctx: &ProviderCtx) -> Result<(), ProviderError> {
    ctx.store.delete(STORE_KEY)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_url_default() {
        assert_eq!(
            resolve_usage_url(None),
            "https://chatgpt.com/backend-api/wham/usage"
        );
    }

    #[test]
    fn resolve_url_chatgpt_without_backend_api() {
        let url = resolve_usage_url(Some("https://chatgpt.com/"));
        assert!(url.contains("backend-api"), "url: {}", url);
        assert!(url.ends_with("wham/usage"), "url: {}", url);
    }

    #[test]
    fn resolve_url_custom_base() {
        let url = resolve_usage_url(Some("https://my.proxy.com/api/"));
        assert_eq!(url, "https://my.proxy.com/api/api/codex/usage");
    }

    #[test]
    fn parse_window_converts_seconds_to_minutes() {
        let raw = CodexWindowRaw {
            used_percent: 42.0,
            reset_at: Some(1713600000),
            limit_window_seconds: Some(18000),
        };
        let window = parse_window(raw);
        assert!((window.used_percent - 42.0).abs() < 1e-10);
        assert_eq!(window.window_minutes, Some(300));
        assert!(window.resets_at.is_some());
    }

    #[test]
    fn parse_window_handles_missing_fields() {
        let raw = CodexWindowRaw {
            used_percent: 10.0,
            reset_at: None,
            limit_window_seconds: None,
        };
        let window = parse_window(raw);
        assert!(window.window_minutes.is_none());
        assert!(window.resets_at.is_none());
    }

    #[test]
    fn parse_usage_full_response() {
        let json = r#"{
            "plan_type": "pro",
            "rate_limit": {
                "primary_window": {
                    "used_percent": 42,
                    "reset_at": 1713600000,
                    "limit_window_seconds": 18000
                },
                "secondary_window": {
                    "used_percent": 15,
                    "reset_at": 1714204800,
                    "limit_window_seconds": 604800
                }
            }
        }"#;
        let data: CodexUsageResponse = serde_json::from_str(json).unwrap();
        let snapshot = parse_usage(data, Some("user@example.com".into()));

        assert!((snapshot.primary.as_ref().unwrap().used_percent - 42.0).abs() < 1e-10);
        assert_eq!(
            snapshot.secondary.as_ref().unwrap().window_minutes,
            Some(10080)
        );
        let identity = snapshot.identity.unwrap();
        assert_eq!(identity.plan.as_deref(), Some("pro"));
        assert_eq!(identity.email.as_deref(), Some("user@example.com"));
    }

    #[test]
    fn parse_usage_without_rate_limit() {
        let json = r#"{ "plan_type": "free" }"#;
        let data: CodexUsageResponse = serde_json::from_str(json).unwrap();
        let snapshot = parse_usage(data, None);
        assert!(snapshot.primary.is_none());
        assert!(snapshot.secondary.is_none());
    }

    #[test]
    fn decode_jwt_claims_valid_token() {
        // Payload: {"sub":"1234567890","email":"test@example.com"}
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(br#"{"sub":"1234567890","email":"test@example.com"}"#);
        let token = format!("header.{}.sig", payload);
        assert_eq!(email_from_token(&token).as_deref(), Some("test@example.com"));
    }

    #[test]
    fn decode_jwt_claims_wrong_part_count() {
        assert!(decode_jwt_claims("only.two").is_none());
    }

    #[test]
    fn decode_jwt_claims_invalid_base64() {
        assert!(decode_jwt_claims("header.!!!invalid!!!.sig").is_none());
    }

    #[test]
    fn parse_auth_file_tokens_path() {
        let json = r#"{
            "tokens": {
                "access_token": "at_xyz",
                "account_id": "acc_123"
            }
        }"#;
        let file: CodexAuthFile = serde_json::from_str(json).unwrap();
        let tokens = file.tokens.unwrap();
        assert_eq!(tokens.access_token.as_deref(), Some("at_xyz"));
        assert_eq!(tokens.account_id.as_deref(), Some("acc_123"));
    }

    #[test]
    fn parse_auth_file_api_key_fallback() {
        let json = r#"{"OPENAI_API_KEY": "sk-abc"}"#;
        let file: CodexAuthFile = serde_json::from_str(json).unwrap();
        assert!(file.tokens.is_none());
        assert_eq!(file.openai_api_key.as_deref(), Some("sk-abc"));
    }

    #[test]
    fn codex_home_honors_env_override() {
        let _guard = crate::core::testenv::ENV_LOCK.lock().unwrap();
        std::env::set_var("CODEX_HOME", "/tmp/codex-test-home");
        let home = codex_home();
        std::env::remove_var("CODEX_HOME");
        assert_eq!(home, PathBuf::from("/tmp/codex-test-home"));
    }
}

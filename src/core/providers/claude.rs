use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;

use crate::core::models::usage::{IdentitySnapshot, RateWindow, UsageSnapshot};
use crate::core::providers::{classify_status, ProviderCtx, ProviderError, ProviderKind};
use crate::core::secret::Secret;

const USAGE_URL: &str = "https://api.anthropic.com/api/oauth/usage";
/// Secret-store key for the cached OAuth token.
const STORE_KEY: &str = "claude";
/// Keyring service the Claude Code CLI itself writes to.
const CLI_KEYRING_SERVICE: &str = "Claude Code-credentials";

// --- Claude Code CLI credential file ---

#[derive(Deserialize)]
struct CliCredentialsFile {
    #[serde(rename = "claudeAiOauth")]
    claude_ai_oauth: Option<CliOAuthEntry>,
}

#[derive(Deserialize)]
struct CliOAuthEntry {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

fn credentials_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("~"))
        .join(".claude")
        .join(".credentials.json")
}

/// Scan the Claude Code CLI's credential locations for an OAuth token.
fn scan_cli_credentials() -> Option<Secret> {
    let path = credentials_path();
    if let Ok(content) = std::fs::read_to_string(&path) {
        if let Ok(file) = serde_json::from_str::<CliCredentialsFile>(&content) {
            if let Some(token) = file.claude_ai_oauth.and_then(|o| o.access_token) {
                if !token.is_empty() {
                    tracing::debug!("found Claude OAuth token in {}", path.display());
                    return Some(Secret::new(token));
                }
            }
        }
    }

    // The CLI may keep its credential blob in the OS keyring instead
    if let Ok(entry) = keyring::Entry::new(CLI_KEYRING_SERVICE, "default") {
        if let Ok(blob) = entry.get_password() {
            if let Ok(file) = serde_json::from_str::<CliCredentialsFile>(&blob) {
                if let Some(token) = file.claude_ai_oauth.and_then(|o| o.access_token) {
                    if !token.is_empty() {
                        return Some(Secret::new(token));
                    }
                }
            } else if blob.starts_with("sk-ant-") {
                return Some(Secret::new(blob));
            }
        }
    }

    None
}

/// Stored token, or a fresh scan of the CLI credentials (persisted for
/// next time).
fn resolve_token(ctx: &ProviderCtx) -> Result<Secret, ProviderError> {
    if let Some(secret) = ctx.store.get(STORE_KEY)? {
        return Ok(secret);
    }
    if let Some(secret) = scan_cli_credentials() {
        if let Err(e) = ctx.store.put(STORE_KEY, &secret) {
            tracing::warn!("could not cache Claude token in secret store: {}", e);
        }
        return Ok(secret);
    }
    Err(ProviderError::NotAuthenticated)
}

// --- Usage response ---

#[derive(Deserialize)]
struct ClaudeWindowRaw {
    utilization: Option<f64>,
    resets_at: Option<String>,
}

#[derive(Deserialize)]
struct ClaudeUsageResponse {
    five_hour: Option<ClaudeWindowRaw>,
    seven_day: Option<ClaudeWindowRaw>,
    seven_day_sonnet: Option<ClaudeWindowRaw>,
    plan: Option<String>,
    email: Option<String>,
}

fn parse_window(raw: ClaudeWindowRaw, window_minutes: Option<u64>) -> Option<RateWindow> {
    let utilization = raw.utilization?;
    // API may return utilization as a fraction (0.0-1.0) or a percentage
    // (0-100). If > 1.0, treat it as already a percentage.
    let used_percent = if utilization > 1.0 {
        utilization
    } else {
        utilization * 100.0
    };
    let mut window = RateWindow::new(used_percent);
    window.window_minutes = window_minutes;
    window.resets_at = raw
        .resets_at
        .as_deref()
        .and_then(|s| s.parse::<DateTime<Utc>>().ok());
    Some(window)
}

fn parse_usage(data: ClaudeUsageResponse) -> UsageSnapshot {
    let mut snapshot = UsageSnapshot::new(ProviderKind::Claude, "oauth");
    snapshot.primary = data.five_hour.and_then(|w| parse_window(w, Some(300)));
    snapshot.secondary = data.seven_day.and_then(|w| parse_window(w, Some(10080)));
    snapshot.tertiary = data
        .seven_day_sonnet
        .and_then(|w| parse_window(w, Some(10080)));

    if data.plan.is_some() || data.email.is_some() {
        snapshot.identity = Some(IdentitySnapshot {
            email: data.email,
            plan: data.plan,
            organization: None,
        });
    }
    snapshot
}

/// Fetch usage from the Claude OAuth API.
pub async fn fetch(ctx: &ProviderCtx) -> Result<UsageSnapshot, ProviderError> {
    let snapshot = {
        let token = resolve_token(ctx)?;
        let response = ctx
            .http
            .get(USAGE_URL)
            .header("Authorization", format!("Bearer {}", token.expose()))
            .header("Accept", "application/json")
            .header("anthropic-beta", "oauth-2025-04-20")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                // The cached token is dead; drop it so the next poll re-scans
                let _ = ctx.store.delete(STORE_KEY);
            }
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let data: ClaudeUsageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseFailure(e.to_string()))?;
        parse_usage(data)
        // token dropped (zeroized) here, before the snapshot leaves
    };
    Ok(snapshot)
}

/// True when a credential exists, without any network call.
pub fn is_available(ctx: &ProviderCtx) -> Result<bool, ProviderError> {
    if ctx.store.contains(STORE_KEY)? {
        return Ok(true);
    }
    Ok(scan_cli_credentials().is_some())
}

/// Claude's login flow is a re-scan: the user authenticates via the
/// Claude Code CLI and we pick up the freshly-written credential.
pub fn login(ctx: &ProviderCtx, _supplied: Option<Secret>) -> Result<(), ProviderError> {
    if reload(ctx)? {
        Ok(())
    } else {
        Err(ProviderError::NotAuthenticated)
    }
}

/// Discard the cached token and re-scan the CLI credential locations.
/// Returns whether a credential was found.
pub fn reload(ctx: &ProviderCtx) -> Result<bool, ProviderError> {
    ctx.store.delete(STORE_KEY)?;
    match scan_cli_credentials() {
        Some(secret) => {
            ctx.store.put(STORE_KEY, &secret)?;
            Ok(true)
        }
        None => Ok(false),
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
    fn parse_window_converts_fraction_to_percent() {
        let raw = ClaudeWindowRaw {
            utilization: Some(0.28),
            resets_at: Some("2025-12-04T19:15:00Z".to_string()),
        };
        let window = parse_window(raw, Some(300)).unwrap();
        assert!((window.used_percent - 28.0).abs() < 1e-10);
        assert_eq!(window.window_minutes, Some(300));
        assert!(window.resets_at.is_some());
    }

    #[test]
    fn parse_window_passes_percentage_through() {
        let raw = ClaudeWindowRaw {
            utilization: Some(45.5),
            resets_at: None,
        };
        let window = parse_window(raw, Some(300)).unwrap();
        assert!((window.used_percent - 45.5).abs() < 1e-10);
    }

    #[test]
    fn parse_window_without_utilization_is_none() {
        let raw = ClaudeWindowRaw {
            utilization: None,
            resets_at: Some("2025-12-04T19:15:00Z".to_string()),
        };
        assert!(parse_window(raw, None).is_none());
    }

    #[test]
    fn parse_window_tolerates_invalid_datetime() {
        let raw = ClaudeWindowRaw {
            utilization: Some(0.1),
            resets_at: Some("not-a-date".to_string()),
        };
        let window = parse_window(raw, Some(300)).unwrap();
        assert!(window.resets_at.is_none());
    }

    #[test]
    fn parse_usage_full_response() {
        let json = r#"{
            "five_hour": { "utilization": 0.28, "resets_at": "2025-12-04T19:15:00Z" },
            "seven_day": { "utilization": 0.59, "resets_at": "2025-12-05T17:00:00Z" },
            "seven_day_sonnet": { "utilization": 0.12, "resets_at": "2025-12-05T17:00:00Z" },
            "plan": "pro",
            "email": "user@example.com"
        }"#;
        let data: ClaudeUsageResponse = serde_json::from_str(json).unwrap();
        let snapshot = parse_usage(data);

        assert!((snapshot.primary.as_ref().unwrap().used_percent - 28.0).abs() < 1e-10);
        assert!((snapshot.secondary.as_ref().unwrap().used_percent - 59.0).abs() < 1e-10);
        assert!(snapshot.tertiary.is_some());
        let identity = snapshot.identity.unwrap();
        assert_eq!(identity.plan.as_deref(), Some("pro"));
        assert_eq!(identity.email.as_deref(), Some("user@example.com"));
    }

    #[test]
    fn parse_usage_partial_response() {
        let json = r#"{ "five_hour": { "utilization": 0.5 } }"#;
        let data: ClaudeUsageResponse = serde_json::from_str(json).unwrap();
        let snapshot = parse_usage(data);
        assert!(snapshot.primary.is_some());
        assert!(snapshot.secondary.is_none());
        assert!(snapshot.identity.is_none());
    }

    #[test]
    fn parse_cli_credentials_happy_path() {
        let json = r#"{ "claudeAiOauth": { "accessToken": "tok_abc123" } }"#;
        let file: CliCredentialsFile = serde_json::from_str(json).unwrap();
        let token = file.claude_ai_oauth.unwrap().access_token.unwrap();
        assert_eq!(token, "tok_abc123");
    }

    #[test]
    fn parse_cli_credentials_missing_oauth_key() {
        let file: CliCredentialsFile = serde_json::from_str("{}").unwrap();
        assert!(file.claude_ai_oauth.is_none());
    }

    #[test]
    fn credentials_path_points_into_claude_dir() {
        let path = credentials_path();
        assert!(path.to_string_lossy().contains(".claude"));
        assert!(path.to_string_lossy().ends_with(".credentials.json"));
    }
}

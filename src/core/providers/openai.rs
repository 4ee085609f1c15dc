use chrono::{Datelike, Utc};
use serde::Deserialize;

use crate::core::cookies::CookieExtractor;
use crate::core::models::usage::{IdentitySnapshot, RateWindow, UsageSnapshot};
use crate::core::providers::{codex, classify_status, ProviderCtx, ProviderError, ProviderKind};
use crate::core::secret::Secret;

const API_BASE: &str = "https://api.openai.com";
const CHATGPT_USAGE_URL: &str = "https://chatgpt.com/backend-api/wham/usage";

const STORE_KEY: &str = "openai";
const COOKIE_STORE_KEY: &str = "openai-cookie";
const COOKIE_DOMAIN: &str = "chatgpt.com";
const COOKIE_NAME: &str = "__Secure-next-auth.session-token";

// --- Billing responses ---

#[derive(Deserialize)]
struct Subscription {
    hard_limit_usd: Option<f64>,
    plan: Option<SubscriptionPlan>,
}

#[derive(Deserialize)]
struct SubscriptionPlan {
    title: Option<String>,
}

#[derive(Deserialize)]
struct BillingUsage {
    /// Month-to-date usage in cents
    total_usage: Option<f64>,
}

fn resolve_api_key(ctx: &ProviderCtx) -> Result<Option<Secret>, ProviderError> {
    if let Some(secret) = ctx.config_api_key(ProviderKind::Openai) {
        return Ok(Some(secret));
    }
    if let Some(secret) = ctx.store.get(STORE_KEY)? {
        return Ok(Some(secret));
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            return Ok(Some(Secret::new(key)));
        }
    }
    Ok(None)
}

fn month_window(used_usd: f64, limit_usd: f64) -> RateWindow {
    let used_percent = if limit_usd > 0.0 {
        used_usd / limit_usd * 100.0
    } else {
        0.0
    };
    let mut window = RateWindow::new(used_percent);
    window.reset_description = Some(format!("${:.2} / ${:.2} this month", used_usd, limit_usd));
    window
}

/// Fetch month-to-date billing usage against the subscription hard limit.
async fn fetch_billing(ctx: &ProviderCtx, api_key: &Secret) -> Result<UsageSnapshot, ProviderError> {
    let subscription_url = format!("{}/v1/dashboard/billing/subscription", API_BASE);
    let response = ctx
        .http
        .get(&subscription_url)
        .header("Authorization", format!("Bearer {}", api_key.expose()))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, &body));
    }
    let subscription: Subscription = response
        .json()
        .await
        .map_err(|e| ProviderError::ParseFailure(e.to_string()))?;

    let now = Utc::now();
    let start_date = format!("{}-{:02}-01", now.year(), now.month());
    let end_date = (now.date_naive() + chrono::Days::new(1))
        .format("%Y-%m-%d")
        .to_string();
    let usage_url = format!(
        "{}/v1/dashboard/billing/usage?start_date={}&end_date={}",
        API_BASE, start_date, end_date
    );

    let response = ctx
        .http
        .get(&usage_url)
        .header("Authorization", format!("Bearer {}", api_key.expose()))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, &body));
    }
    let usage: BillingUsage = response
        .json()
        .await
        .map_err(|e| ProviderError::ParseFailure(e.to_string()))?;

    let mut snapshot = UsageSnapshot::new(ProviderKind::Openai, "api");
    if let (Some(used_cents), Some(limit)) = (
        usage.total_usage,
        subscription.hard_limit_usd.filter(|l| *l > 0.0),
    ) {
        snapshot.primary = Some(month_window(used_cents / 100.0, limit));
    }
    if let Some(plan) = subscription.plan.and_then(|p| p.title) {
        snapshot.identity = Some(IdentitySnapshot {
            email: None,
            plan: Some(plan),
            organization: None,
        });
    }
    Ok(snapshot)
}

/// Cached session cookie, or a fresh extraction from a local browser
/// (persisted for reuse).
fn resolve_cookie(ctx: &ProviderCtx) -> Result<Secret, ProviderError> {
    if let Some(secret) = ctx.store.get(COOKIE_STORE_KEY)? {
        return Ok(secret);
    }
    extract_and_cache_cookie(ctx)
}

fn extract_and_cache_cookie(ctx: &ProviderCtx) -> Result<Secret, ProviderError> {
    let secret = CookieExtractor::new()
        .extract_any(COOKIE_DOMAIN, COOKIE_NAME)
        .map_err(|_| ProviderError::NotAuthenticated)?;
    if let Err(e) = ctx.store.put(COOKIE_STORE_KEY, &secret) {
        tracing::warn!("could not cache ChatGPT session cookie: {}", e);
    }
    Ok(secret)
}

/// Fetch usage from the ChatGPT backend using the browser session cookie.
/// Same response shape as the Codex endpoint.
async fn fetch_via_cookie(
    ctx: &ProviderCtx,
    cookie: &Secret,
) -> Result<UsageSnapshot, ProviderError> {
    let response = ctx
        .http
        .get(CHATGPT_USAGE_URL)
        .header("Cookie", format!("{}={}", COOKIE_NAME, cookie.expose()))
        .header("Accept", "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, &body));
    }

    let data: codex::CodexUsageResponse = response
        .json()
        .await
        .map_err(|e| ProviderError::ParseFailure(e.to_string()))?;

    let mut snapshot = UsageSnapshot::new(ProviderKind::Openai, "cookie");
    if let Some(rl) = data.rate_limit {
        snapshot.primary = rl.primary_window.map(codex::parse_window);
        snapshot.secondary = rl.secondary_window.map(codex::parse_window);
    }
    if let Some(plan) = data.plan_type {
        snapshot.identity = Some(IdentitySnapshot {
            email: None,
            plan: Some(plan),
            organization: None,
        });
    }
    Ok(snapshot)
}

/// Fetch usage, preferring the API key path and falling back to the
/// browser session cookie.
pub async fn fetch(ctx: &ProviderCtx) -> Result<UsageSnapshot, ProviderError> {
    if let Some(api_key) = resolve_api_key(ctx)? {
        return fetch_billing(ctx, &api_key).await;
    }

    let cookie = resolve_cookie(ctx)?;
    match fetch_via_cookie(ctx, &cookie).await {
        // A cached cookie the endpoint rejects is stale: drop it,
        // re-extract, and try once more rather than trusting the cache.
        Err(ProviderError::NotAuthenticated) => {
            drop(cookie);
            ctx.store.delete(COOKIE_STORE_KEY)?;
            let fresh = extract_and_cache_cookie(ctx)?;
            fetch_via_cookie(ctx, &fresh).await
        }
        other => other,
    }
}

pub fn is_available(ctx: &ProviderCtx) -> Result<bool, ProviderError> {
    if resolve_api_key(ctx)?.is_some() {
        return Ok(true);
    }
    Ok(ctx.store.contains(COOKIE_STORE_KEY)?)
}

/// Accept a directly-supplied API key, or extract a browser session
/// cookie (the variant's two auth methods, in preference order).
pub fn login(ctx: &ProviderCtx, supplied: Option<Secret>) -> Result<(), ProviderError> {
    if let Some(secret) = supplied {
        ctx.store.put(STORE_KEY, &secret)?;
        return Ok(());
    }
    extract_and_cache_cookie(ctx).map(|_| ())
}

pub fn logout(ctx: &ProviderCtx) -> Result<(), ProviderError> {
    ctx.store.delete(STORE_KEY)?;
    ctx.store.delete(COOKIE_STORE_KEY)?;
    Ok(())
}

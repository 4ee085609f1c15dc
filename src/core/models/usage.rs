use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::core::providers::ProviderKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateWindow {
    /// Percentage of the rate limit that has been used. Stored as reported
    /// by the provider (may transiently exceed 100); clamp only for display.
    pub used_percent: f64,
    /// Duration of the rate window in minutes
    pub window_minutes: Option<u64>,
    /// When the rate window resets
    pub resets_at: Option<DateTime<Utc>>,
    /// Human-readable reset description (e.g., "Tomorrow at 1:00 AM")
    pub reset_description: Option<String>,
}

impl RateWindow {
    pub fn new(used_percent: f64) -> Self {
        Self {
            // Upstream values are never meaningfully negative
            used_percent: used_percent.max(0.0),
            window_minutes: None,
            resets_at: None,
            reset_description: None,
        }
    }

    /// Usage percentage clamped to [0, 100] for rendering.
    pub fn display_percent(&self) -> f64 {
        self.used_percent.clamp(0.0, 100.0)
    }
}

/// Which of a snapshot's three quota windows a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSlot {
    Primary,
    Secondary,
    Tertiary,
}

impl WindowSlot {
    pub fn all() -> &'static [WindowSlot] {
        &[Self::Primary, Self::Secondary, Self::Tertiary]
    }
}

/// Descriptive account info — never used as a credential.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub email: Option<String>,
    pub plan: Option<String>,
    pub organization: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub provider: ProviderKind,
    pub source: String, // "oauth", "cli", "api", "cookie"
    /// Primary rate window (usually session/5-hour)
    pub primary: Option<RateWindow>,
    /// Secondary rate window (usually weekly/7-day)
    pub secondary: Option<RateWindow>,
    /// Tertiary rate window (model-specific, e.g., Sonnet limit)
    pub tertiary: Option<RateWindow>,
    /// When this snapshot was captured
    pub updated_at: DateTime<Utc>,
    /// Provider identity (email, plan, org)
    pub identity: Option<IdentitySnapshot>,
}

impl UsageSnapshot {
    /// An empty snapshot stamped with the current time.
    pub fn new(provider: ProviderKind, source: &str) -> Self {
        Self {
            provider,
            source: source.to_string(),
            primary: None,
            secondary: None,
            tertiary: None,
            updated_at: Utc::now(),
            identity: None,
        }
    }

    pub fn window(&self, slot: WindowSlot) -> Option<&RateWindow> {
        match slot {
            WindowSlot::Primary => self.primary.as_ref(),
            WindowSlot::Secondary => self.secondary.as_ref(),
            WindowSlot::Tertiary => self.tertiary.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_window_clamps_negative_input() {
        let window = RateWindow::new(-3.0);
        assert_eq!(window.used_percent, 0.0);
    }

    #[test]
    fn display_percent_clamps_overflow_but_storage_keeps_it() {
        let mut window = RateWindow::new(50.0);
        window.used_percent = 104.2;
        assert_eq!(window.display_percent(), 100.0);
        assert!((window.used_percent - 104.2).abs() < 1e-10);
    }

    #[test]
    fn display_percent_in_range_is_unchanged() {
        for pct in [0.0, 28.4, 99.9, 100.0] {
            assert_eq!(RateWindow::new(pct).display_percent(), pct);
        }
    }

    #[test]
    fn snapshot_window_accessor_matches_slots() {
        let mut snapshot = UsageSnapshot::new(ProviderKind::Claude, "oauth");
        snapshot.primary = Some(RateWindow::new(10.0));
        snapshot.tertiary = Some(RateWindow::new(30.0));

        assert_eq!(
            snapshot.window(WindowSlot::Primary).map(|w| w.used_percent),
            Some(10.0)
        );
        assert!(snapshot.window(WindowSlot::Secondary).is_none());
        assert_eq!(
            snapshot.window(WindowSlot::Tertiary).map(|w| w.used_percent),
            Some(30.0)
        );
    }

    #[test]
    fn snapshot_serializes_round_trip() {
        let mut snapshot = UsageSnapshot::new(ProviderKind::Codex, "cli");
        snapshot.primary = Some(RateWindow::new(42.0));
        snapshot.identity = Some(IdentitySnapshot {
            email: Some("user@example.com".into()),
            plan: Some("pro".into()),
            organization: None,
        });

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: UsageSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.primary, snapshot.primary);
        assert_eq!(back.identity, snapshot.identity);
    }
}

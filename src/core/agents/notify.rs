use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::config::NotificationSettings;
use crate::core::models::usage::{UsageSnapshot, WindowSlot};
use crate::core::providers::ProviderKind;

/// Severity tier of a usage value. Ordering matters: alerts fire only on
/// upward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Normal,
    Warning,
    Critical,
}

impl Tier {
    fn of(used_percent: f64, thresholds: &NotificationSettings) -> Self {
        if used_percent >= thresholds.critical_percent {
            Self::Critical
        } else if used_percent >= thresholds.warning_percent {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub provider: ProviderKind,
    pub slot: WindowSlot,
    pub tier: Tier,
    pub used_percent: f64,
}

impl Alert {
    pub fn title(&self) -> String {
        match self.tier {
            Tier::Critical => format!("{} usage critical", self.provider.display_name()),
            _ => format!("{} usage warning", self.provider.display_name()),
        }
    }

    pub fn body(&self) -> String {
        let label = match self.slot {
            WindowSlot::Primary => self.provider.session_label(),
            WindowSlot::Secondary => self.provider.weekly_label(),
            WindowSlot::Tertiary => self.provider.tertiary_label(),
        };
        format!(
            "{} window at {:.0}% used",
            label,
            self.used_percent.clamp(0.0, 100.0)
        )
    }
}

/// Watches published snapshots and raises edge-triggered threshold
/// alerts: one per upward tier crossing per (provider, window slot),
/// re-armed only when the value falls back below the threshold.
pub struct NotificationAgent {
    thresholds: NotificationSettings,
    last_tiers: HashMap<(ProviderKind, WindowSlot), Tier>,
}

impl NotificationAgent {
    pub fn new(thresholds: NotificationSettings) -> Self {
        Self {
            thresholds,
            last_tiers: HashMap::new(),
        }
    }

    /// Advance the per-window tier state for one snapshot, returning the
    /// alerts that fired. Pure state step; no I/O.
    pub fn observe(&mut self, snapshot: &UsageSnapshot) -> Vec<Alert> {
        let mut alerts = Vec::new();

        for slot in WindowSlot::all() {
            let Some(window) = snapshot.window(*slot) else {
                continue;
            };
            let tier = Tier::of(window.used_percent, &self.thresholds);
            let key = (snapshot.provider, *slot);
            let previous = self.last_tiers.get(&key).copied().unwrap_or(Tier::Normal);

            if tier > previous {
                alerts.push(Alert {
                    provider: snapshot.provider,
                    slot: *slot,
                    tier,
                    used_percent: window.used_percent,
                });
            }
            // Record falls as well, so a re-crossing fires again
            self.last_tiers.insert(key, tier);
        }

        alerts
    }

    /// Consume published snapshots until the channel closes or shutdown
    /// is requested, handing alerts to `deliver`.
    pub async fn run<F>(
        mut self,
        mut rx: mpsc::Receiver<UsageSnapshot>,
        cancel: CancellationToken,
        deliver: F,
    ) where
        F: Fn(&Alert) + Send,
    {
        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    let Some(snapshot) = maybe else { break };
                    for alert in self.observe(&snapshot) {
                        tracing::info!(
                            "{}: {} crossed into {:?} at {:.1}%",
                            alert.provider.id(),
                            alert.body(),
                            alert.tier,
                            alert.used_percent
                        );
                        deliver(&alert);
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }
}

/// Fire-and-forget desktop notification; delivery failure is logged and
/// otherwise ignored.
pub fn deliver_desktop(alert: &Alert) {
    let result = notify_rust::Notification::new()
        .summary(&alert.title())
        .body(&alert.body())
        .show();
    if let Err(e) = result {
        tracing::warn!("desktop notification failed: {}", e);
    }
}

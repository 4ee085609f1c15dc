use colored::{control, Colorize};

use crate::core::formatter::{
    format_remaining_percent, format_reset_countdown, format_usage_bar,
};
use crate::core::models::usage::{RateWindow, UsageSnapshot};

const BAR_WIDTH: usize = 12;

/// Render a full provider block as a colored (or plain) string.
///
/// Layout:
/// ```text
///  Claude (oauth)
///   Session   72% remaining [████████░░░░]
///             Resets in 2h 15m
///   Weekly    41% remaining [█████░░░░░░░]
///   Account   user@example.com
///   Plan      Pro
/// ```
pub fn render_provider(snapshot: &UsageSnapshot, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines: Vec<String> = Vec::new();

    let header = format!(
        " {} ({})",
        snapshot.provider.display_name(),
        snapshot.source
    );
    lines.push(header.bold().to_string());

    let windows: [Option<(&str, &RateWindow)>; 3] = [
        snapshot
            .primary
            .as_ref()
            .map(|w| (snapshot.provider.session_label(), w)),
        snapshot
            .secondary
            .as_ref()
            .map(|w| (snapshot.provider.weekly_label(), w)),
        snapshot
            .tertiary
            .as_ref()
            .map(|w| (snapshot.provider.tertiary_label(), w)),
    ];

    for (label, window) in windows.into_iter().flatten() {
        render_rate_window(&mut lines, label, window);
    }

    if let Some(identity) = &snapshot.identity {
        if let Some(email) = &identity.email {
            lines.push(format!("  {}   {}", "Account".cyan(), email));
        }
        if let Some(plan) = &identity.plan {
            lines.push(format!("  {}      {}", "Plan".cyan(), plan));
        }
    }

    lines.join("\n")
}

fn render_rate_window(lines: &mut Vec<String>, label: &str, window: &RateWindow) {
    // Display values are clamped; storage keeps what the provider said
    let percent_str = format_remaining_percent(window.display_percent());
    let bar_str = format_usage_bar(window.display_percent(), BAR_WIDTH);

    let colored_percent = color_by_remaining(window.display_percent(), &percent_str);
    let colored_bar = bar_str.magenta();

    // Pad label to 7 chars for alignment
    let padded_label = format!("{:<7}", label);

    lines.push(format!(
        "  {}  {} {}",
        padded_label.cyan(),
        colored_percent,
        colored_bar
    ));

    if let Some(resets_at) = &window.resets_at {
        // 11 spaces to align under the percent/bar values
        lines.push(format!(
            "           {}",
            format_reset_countdown(resets_at).dimmed()
        ));
    } else if let Some(description) = &window.reset_description {
        lines.push(format!("           {}", description.dimmed()));
    }
}

/// Color the percent string green/yellow/red based on remaining percentage.
fn color_by_remaining(used_percent: f64, text: &str) -> colored::ColoredString {
    let remaining = 100.0 - used_percent;
    if remaining >= 25.0 {
        text.green()
    } else if remaining >= 10.0 {
        text.yellow()
    } else {
        text.red()
    }
}

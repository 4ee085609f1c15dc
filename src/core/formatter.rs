use chrono::{DateTime, Utc};

/// Returns "{remaining}% remaining" where remaining = 100 - used, rounded to nearest integer.
pub fn format_remaining_percent(used_percent: f64) -> String {
    let remaining = (100.0 - used_percent).clamp(0.0, 100.0).round() as u64;
    format!("{}% remaining", remaining)
}

/// Returns "Resets in Xh Ym" relative to now. If past, returns "Resets now".
/// If more than 24 hours away, includes days.
pub fn format_reset_countdown(resets_at: &DateTime<Utc>) -> String {
    let now = Utc::now();
    let duration = *resets_at - now;
    let total_seconds = duration.num_seconds();

    if total_seconds <= 0 {
        return "Resets now".to_string();
    }

    let total_minutes = total_seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 24 {
        let days = hours / 24;
        let remaining_hours = hours % 24;
        if remaining_hours == 0 {
            format!("Resets in {}d", days)
        } else {
            format!("Resets in {}d {}h", days, remaining_hours)
        }
    } else if hours > 0 {
        format!("Resets in {}h {}m", hours, minutes)
    } else {
        format!("Resets in {}m", total_minutes.max(1))
    }
}

/// Returns "[████████░░░░]" where █ = remaining portion, ░ = used portion.
/// Width is the number of block characters inside the brackets (default 12).
pub fn format_usage_bar(used_percent: f64, width: usize) -> String {
    let used_percent = used_percent.clamp(0.0, 100.0);
    let used_blocks = ((used_percent / 100.0) * width as f64).round() as usize;
    let remaining_blocks = width.saturating_sub(used_blocks);

    let filled: String = "█".repeat(remaining_blocks);
    let empty: String = "░".repeat(used_blocks);

    format!("[{}{}]", filled, empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn format_remaining_percent_rounds() {
        assert_eq!(format_remaining_percent(28.4), "72% remaining");
        assert_eq!(format_remaining_percent(0.0), "100% remaining");
        assert_eq!(format_remaining_percent(100.0), "0% remaining");
        assert_eq!(format_remaining_percent(110.0), "0% remaining");
        assert_eq!(format_remaining_percent(-5.0), "100% remaining");
    }

    #[test]
    fn format_reset_countdown_past() {
        let past = Utc::now() - Duration::seconds(10);
        assert_eq!(format_reset_countdown(&past), "Resets now");
    }

    #[test]
    fn format_reset_countdown_minutes() {
        let future = Utc::now() + Duration::minutes(45);
        let result = format_reset_countdown(&future);
        assert!(result.starts_with("Resets in "));
        assert!(result.contains('m'));
    }

    #[test]
    fn format_reset_countdown_hours_and_minutes() {
        let future = Utc::now() + Duration::minutes(135); // 2h 15m
        let result = format_reset_countdown(&future);
        assert!(result.contains('h'));
        assert!(result.contains('m'));
    }

    #[test]
    fn format_reset_countdown_days() {
        let future = Utc::now() + Duration::hours(25);
        let result = format_reset_countdown(&future);
        assert!(result.contains('d'));
    }

    #[test]
    fn format_usage_bar_width() {
        // 0% used — all filled
        let bar = format_usage_bar(0.0, 12);
        assert_eq!(bar, "[████████████]");

        // 100% used — all empty
        let bar = format_usage_bar(100.0, 12);
        assert_eq!(bar, "[░░░░░░░░░░░░]");

        // 50% used — half filled, half empty
        let bar = format_usage_bar(50.0, 12);
        assert_eq!(bar, "[██████░░░░░░]");

        // Transient >100% values clamp instead of underflowing
        let bar = format_usage_bar(130.0, 12);
        assert_eq!(bar, "[░░░░░░░░░░░░]");
    }
}

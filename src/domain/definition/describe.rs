//! Human-readable summaries of an endpoint's middleware options for admin listings.

use super::EndpointDefinition;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Renders seconds in the largest whole unit below the next one ("90" -> "1 minute").
pub fn human_readable_duration(seconds: u64) -> String {
    let (amount, unit) = if seconds < MINUTE {
        (seconds, "second")
    } else if seconds < HOUR {
        (seconds / MINUTE, "minute")
    } else if seconds < DAY {
        (seconds / HOUR, "hour")
    } else {
        (seconds / DAY, "day")
    };

    if amount == 1 {
        format!("{} {}", amount, unit)
    } else {
        format!("{} {}s", amount, unit)
    }
}

/// One line per enabled option, in display order.
pub fn specifications(definition: &EndpointDefinition) -> Vec<String> {
    let mut lines = Vec::new();
    let settings = &definition.settings;

    if settings.auth.as_ref().is_some_and(|a| a.jwt_enabled) {
        lines.push("JWT Enabled".to_string());
    }

    if let Some(cache) = settings.cache.as_ref().filter(|c| c.enabled) {
        lines.push(format!("Cache: {}", human_readable_duration(cache.ttl_seconds)));
    }

    if let Some(rl) = settings.rate_limit.as_ref().filter(|r| r.enabled) {
        lines.push(format!(
            "Rate Limited by {}: {} calls per {}",
            rl.key_by.as_str(),
            rl.max_calls,
            human_readable_duration(rl.window_seconds)
        ));
    }

    lines
}

//! Topic name and filter validation
//!
//! Key rules:
//! - Topic names MUST NOT contain wildcards (+ or #)
//! - Topic filters MAY contain wildcards
//! - Multi-level wildcard (#) must be the last level
//! - Single-level wildcard (+) must occupy an entire level

/// Validate a topic name before publishing it to the broker
pub fn validate_topic_name(topic: &str) -> Result<(), &'static str> {
    if topic.is_empty() {
        return Err("topic name cannot be empty");
    }

    if topic.len() > 65535 {
        return Err("topic name exceeds maximum length");
    }

    if topic.contains('\0') {
        return Err("topic name cannot contain null character");
    }

    if topic.contains('+') || topic.contains('#') {
        return Err("topic name cannot contain wildcards");
    }

    Ok(())
}

/// Validate a subscription filter
pub fn validate_topic_filter(filter: &str) -> Result<(), &'static str> {
    if filter.is_empty() {
        return Err("topic filter cannot be empty");
    }

    if filter.contains('\0') {
        return Err("topic filter cannot contain null character");
    }

    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || i != levels.len() - 1) {
            return Err("multi-level wildcard must be the entire last level");
        }
        if level.contains('+') && *level != "+" {
            return Err("single-level wildcard must occupy entire level");
        }
    }

    Ok(())
}

/// Check if a topic filter matches a topic name
///
/// - `+` matches exactly one level
/// - `#` matches zero or more trailing levels
/// - `$`-topics don't match filters starting with a wildcard
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    for filter_level in filter.split('/') {
        if filter_level == "#" {
            return true;
        }
        match topic_levels.next() {
            Some(level) if filter_level == "+" || filter_level == level => {}
            _ => return false,
        }
    }

    topic_levels.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_topic_name() {
        assert!(validate_topic_name("control/gun/5").is_ok());
        assert!(validate_topic_name("command/reset").is_ok());

        assert!(validate_topic_name("").is_err());
        assert!(validate_topic_name("control/gun/+").is_err());
        assert!(validate_topic_name("control/#").is_err());
        assert!(validate_topic_name("control\0gun").is_err());
    }

    #[test]
    fn test_validate_topic_filter() {
        assert!(validate_topic_filter("command/damage/+").is_ok());
        assert!(validate_topic_filter("command/#").is_ok());
        assert!(validate_topic_filter("#").is_ok());

        assert!(validate_topic_filter("").is_err());
        assert!(validate_topic_filter("command/dam+").is_err());
        assert!(validate_topic_filter("command/#/reset").is_err());
        assert!(validate_topic_filter("command#").is_err());
    }

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches_filter("command/reset", "command/reset"));
        assert!(topic_matches_filter("command/damage/3", "command/damage/+"));
        assert!(topic_matches_filter("command/heal/12", "command/+/+"));
        assert!(topic_matches_filter("command/damage/3", "command/#"));
        assert!(topic_matches_filter("command", "command/#"));

        assert!(!topic_matches_filter("command/damage", "command/damage/+"));
        assert!(!topic_matches_filter("command/damage/3/x", "command/damage/+"));
        assert!(!topic_matches_filter("command/heal/3", "command/damage/+"));
        assert!(!topic_matches_filter("command/reset", "command/reset/now"));
        assert!(!topic_matches_filter("$SYS/uptime", "#"));
    }
}

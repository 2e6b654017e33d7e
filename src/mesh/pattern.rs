/// Matches a dotted event type against a subscription pattern: exact,
/// single trailing-wildcard prefix (`a.b.*`), or universal (`*`). Kept as a
/// small closed matcher rather than a general globbing crate so the router
/// hot path never allocates.
pub fn matches(pattern: &str, event_type: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return event_type == prefix || event_type.starts_with(&format!("{prefix}."));
    }
    pattern == event_type
}

use once_cell::sync::Lazy;
use std::time::Duration;

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// High-water mark for the Event Mesh's bounded queue before `publish`
/// returns `BackpressureFull`. Defaults to 4096.
pub static MESH_QUEUE_CAPACITY: Lazy<usize> =
    Lazy::new(|| env_u64("GRACE_MESH_QUEUE_CAPACITY", 4096) as usize);

/// Default bounded timeout for `safe_publish` / `safe_log`.
pub static SAFE_HELPER_TIMEOUT: Lazy<Duration> =
    Lazy::new(|| Duration::from_millis(env_u64("GRACE_SAFE_HELPER_TIMEOUT_MS", 2_000)));

/// Risk score at or above which a plan requires Parliament review.
pub static REVIEW_THRESHOLD: Lazy<f64> = Lazy::new(|| env_f64("GRACE_REVIEW_THRESHOLD", 0.5));

/// Confidence below which an enriched event is dropped as low-confidence.
pub static MIN_EVENT_CONFIDENCE: Lazy<f64> =
    Lazy::new(|| env_f64("GRACE_MIN_EVENT_CONFIDENCE", 0.4));

/// Default Meta Coordinator cycle period.
pub static META_CYCLE_PERIOD: Lazy<Duration> =
    Lazy::new(|| Duration::from_secs(env_u64("GRACE_META_CYCLE_PERIOD_SECS", 120)));

/// Per-advisor deadline within a Meta Coordinator cycle.
pub static ADVISOR_DEADLINE: Lazy<Duration> =
    Lazy::new(|| Duration::from_millis(env_u64("GRACE_ADVISOR_DEADLINE_MS", 500)));

/// Sliding window used by the memory broker's per-domain quota check.
pub static MEMORY_QUOTA_WINDOW: Lazy<Duration> =
    Lazy::new(|| Duration::from_secs(env_u64("GRACE_MEMORY_QUOTA_WINDOW_SECS", 60)));

/// Maximum memory requests per domain within the quota window.
pub static MEMORY_QUOTA_LIMIT: Lazy<u64> = Lazy::new(|| env_u64("GRACE_MEMORY_QUOTA_LIMIT", 120));

/// Trust level required for a memory request to be upgraded to
/// `cross_domain` access.
pub static CROSS_DOMAIN_TRUST_THRESHOLD: Lazy<f64> =
    Lazy::new(|| env_f64("GRACE_CROSS_DOMAIN_TRUST_THRESHOLD", 0.8));

/// Timeout the Component Handshake waits for required acknowledgers.
pub static HANDSHAKE_ACK_TIMEOUT: Lazy<Duration> =
    Lazy::new(|| Duration::from_secs(env_u64("GRACE_HANDSHAKE_ACK_TIMEOUT_SECS", 60)));

/// Observation window opened after a component is integrated.
pub static HANDSHAKE_OBSERVATION_WINDOW: Lazy<Duration> =
    Lazy::new(|| Duration::from_secs(env_u64("GRACE_HANDSHAKE_OBSERVATION_WINDOW_SECS", 3_600)));

/// Bounded ring buffer length kept by the Intelligent Trigger Hub.
pub static TRIGGER_HISTORY_CAPACITY: Lazy<usize> =
    Lazy::new(|| env_u64("GRACE_TRIGGER_HISTORY_CAPACITY", 500) as usize);

/// Dependency-chain depth the Enrichment pipeline walks for context.
pub static ENRICHMENT_CONTEXT_DEPTH: Lazy<usize> =
    Lazy::new(|| env_u64("GRACE_ENRICHMENT_CONTEXT_DEPTH", 2) as usize);

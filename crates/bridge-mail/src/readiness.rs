//! PR readiness state machine and cooldown (§4.4).

use bridge_core::config::MailBridgeConfig;
use bridge_core::types::{DurableState, ForgeState, PullRequestRef, ReadinessState};
use chrono::{DateTime, Utc};
use regex::Regex;

/// Derive the bridge's view of a pull request's lifecycle state. `PreReady`
/// is inferred from "no revision has been recorded yet" rather than stored
/// directly, since it collapses to the forge's own state once a
/// conversation has been opened.
pub fn compute_state(durable: &DurableState, pr: &PullRequestRef) -> ReadinessState {
    if durable.head_history.revisions.is_empty() {
        return ReadinessState::PreReady;
    }
    match pr.state {
        ForgeState::Integrated => ReadinessState::Integrated,
        ForgeState::Closed => ReadinessState::Closed,
        ForgeState::Open => ReadinessState::Ready,
    }
}

/// PreReady → Ready gate: every ready label present AND every ready-comment
/// pattern matched by at least one comment from its configured author.
pub fn ready_conditions_met(pr: &PullRequestRef, config: &MailBridgeConfig) -> bool {
    let labels_ok = config.ready_labels.iter().all(|l| pr.labels.contains(l));
    if !labels_ok {
        return false;
    }
    config.ready_comment_patterns.iter().all(|pattern| {
        let Ok(re) = Regex::new(&pattern.pattern) else { return false };
        pr.comments
            .iter()
            .any(|c| c.author.eq_ignore_ascii_case(&pattern.author) && re.is_match(&c.body))
    })
}

/// True if `updated_at` is recent enough that the bridge should defer its
/// action to the next cycle, letting an author finish pushing.
pub fn in_cooldown(updated_at: DateTime<Utc>, now: DateTime<Utc>, cooldown_seconds: i64) -> bool {
    (now - updated_at).num_seconds() < cooldown_seconds
}

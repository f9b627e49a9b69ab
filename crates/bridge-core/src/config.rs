//! Structured configuration record (§6, "Configuration").
//!
//! Every field here is one the component sections of SPEC_FULL.md call out
//! as "configured". Loading this from environment variables, a config file,
//! or CLI flags is outer-binary wiring and is not part of this crate.

use std::collections::BTreeMap;

/// One mailing list the bridge can send to / read from.
#[derive(Debug, Clone)]
pub struct MailingListConfig {
    pub name: String,
    pub address: String,
    /// Labels on a pull request that route it to this list.
    pub label_set: Vec<String>,
}

/// Mail Synthesis & Threading policy (§4.4).
#[derive(Debug, Clone)]
pub struct MailBridgeConfig {
    pub sender_identity: String,
    pub mailing_lists: Vec<MailingListConfig>,
    pub ignored_authors: Vec<String>,
    pub ignored_comment_patterns: Vec<String>,
    pub hidden_marker_prefix: String,
    pub extra_headers: BTreeMap<String, String>,
    pub issue_tracker_url_base: String,
    /// Base URL the footer's `Patch:`/`Changes:`/`Fetch:` lines are built
    /// from, e.g. `https://forge.test/openjdk/jdk`.
    pub forge_url_base: String,
    pub cooldown_seconds: i64,
    /// "Close in time" window for combining review comments (§4.3 item 3, §9).
    pub combine_review_comment_window_seconds: i64,
    pub repo_in_subject: bool,
    /// Ready labels and ready-comment patterns gating PreReady → Ready.
    pub ready_labels: Vec<String>,
    pub ready_comment_patterns: Vec<ReadyCommentPattern>,
    /// Number of lines of file context rendered around a review comment.
    pub review_comment_context_lines: u32,
    /// Minimum outbound-mail send interval, serialized on the bridge's queue.
    pub min_send_interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ReadyCommentPattern {
    pub pattern: String,
    pub author: String,
}

/// Webrev Publisher policy (§4.5).
#[derive(Debug, Clone)]
pub struct WebrevConfig {
    pub archive_base_path: String,
    pub large_blob_threshold_bytes: u64,
    pub public_mirror_base: String,
    pub push_retry_attempts: u32,
}

/// Archive Reader (inbound) policy (§4.6).
#[derive(Debug, Clone)]
pub struct ArchiveReaderConfig {
    pub lookback_window_seconds: i64,
    pub oversize_reply_threshold_bytes: u64,
}

/// Pull-Request & Issue Notifier policy (§4.7).
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Branch name → requested fix-version, e.g. "jdk17u" → "17.0".
    pub branch_version_map: BTreeMap<String, String>,
    pub integrator_identity: String,
    pub release_stream_label: String,
    pub committer_email_domain: String,
    /// Path, read at the integrated head revision, carrying the repository's
    /// own fix-version declaration (e.g. `.jcheck/conf`'s `version` key) —
    /// the fallback source for the requested fix-version when
    /// `branch_version_map` has no entry for the target branch.
    pub version_conf_path: String,
}

/// Durable State Store retry policy (§4.2) and Scheduler scratch root (§4.1).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub state_store_retry_attempts: u32,
    pub scratch_root: String,
    pub max_concurrent_work_items: usize,
}

/// The bridge's full structured configuration record.
#[derive(Debug, Clone)]
pub struct Config {
    pub mail_bridge: MailBridgeConfig,
    pub webrev: WebrevConfig,
    pub archive_reader: ArchiveReaderConfig,
    pub notifier: NotifierConfig,
    pub runtime: RuntimeConfig,
}

//! Core data model shared by the mail bridge and the PR/issue notifier.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier for a pull request: `(repository-name, number)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrId {
    pub repo: String,
    pub number: u64,
}

impl PrId {
    pub fn new(repo: impl Into<String>, number: u64) -> Self {
        Self { repo: repo.into(), number }
    }

    /// Stable string form used as the durable-state entity id.
    pub fn entity_id(&self) -> String {
        format!("{}#{}", self.repo, self.number)
    }
}

impl std::fmt::Display for PrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// The forge's lifecycle state for a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForgeState {
    Open,
    Closed,
    Integrated,
}

/// A single issue-tracker-style comment on a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeComment {
    pub id: String,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Present when this comment is itself a reply to another forge comment.
    pub in_reply_to: Option<String>,
}

/// A single inline file/line comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeReviewComment {
    pub id: String,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub file: String,
    pub line: u32,
    pub base_hash: String,
    pub head_hash: String,
    pub in_reply_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approve,
    RequestChanges,
    Comment,
}

/// A single top-level review (approve / request-changes / comment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeReview {
    pub id: String,
    pub author: String,
    /// Role the reviewer holds on the project, e.g. "Reviewer" or "Committer".
    pub role: String,
    pub body: String,
    pub verdict: ReviewVerdict,
    pub created_at: DateTime<Utc>,
}

/// A read-only snapshot of a pull request as seen on the forge. Owned by the
/// forge; the bridge only ever reads a point-in-time copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub id: PrId,
    pub title: String,
    pub body: String,
    pub author: String,
    pub head_hash: String,
    pub base_hash: String,
    pub target_branch: String,
    pub labels: BTreeSet<String>,
    pub comments: Vec<ForgeComment>,
    pub reviews: Vec<ForgeReview>,
    pub review_comments: Vec<ForgeReviewComment>,
    pub state: ForgeState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One observed head-revision: the hash, when the bridge first saw it, and
/// whether that push was a rebase (new target base) rather than a fast
/// forward (§4.4 "Ready → Ready with head changed").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub head_hash: String,
    pub observed_at: DateTime<Utc>,
    pub is_rebase: bool,
}

/// Every head-revision the bridge has observed for a pull request, oldest
/// first. Index 0 is the revision the PR-Opened item covers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeadHistory {
    pub revisions: Vec<RevisionRecord>,
}

impl HeadHistory {
    pub fn ordinal_of(&self, hash: &str) -> Option<usize> {
        self.revisions.iter().position(|r| r.head_hash == hash)
    }

    pub fn push_if_new(&mut self, hash: &str, observed_at: DateTime<Utc>, is_rebase: bool) -> bool {
        if self.revisions.last().map(|r| r.head_hash.as_str()) == Some(hash) {
            return false;
        }
        self.revisions.push(RevisionRecord { head_hash: hash.to_string(), observed_at, is_rebase });
        true
    }
}

/// A tagged variant over every kind of archivable event. `item_id` is
/// deterministic from the source forge id and the kind discriminant so that
/// recomputing the archive yields the same ids every time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ArchiveItem {
    PrOpened {
        item_id: String,
        author: String,
        timestamp: DateTime<Utc>,
        body: String,
        head_hash: String,
    },
    PrRevised {
        item_id: String,
        author: String,
        timestamp: DateTime<Utc>,
        body: String,
        head_hash: String,
        ordinal: usize,
        is_rebase: bool,
    },
    Comment {
        item_id: String,
        author: String,
        timestamp: DateTime<Utc>,
        body: String,
        parent_item_id: Option<String>,
    },
    ReviewComment {
        item_id: String,
        author: String,
        timestamp: DateTime<Utc>,
        /// Sub-comment bodies combined under this single item, in order.
        bodies: Vec<String>,
        file: String,
        line: u32,
        base_hash: String,
        head_hash: String,
        parent_item_id: Option<String>,
    },
    Review {
        item_id: String,
        author: String,
        role: String,
        timestamp: DateTime<Utc>,
        body: String,
        verdict: ReviewVerdict,
        parent_item_id: Option<String>,
    },
    Verdict {
        item_id: String,
        author: String,
        role: String,
        timestamp: DateTime<Utc>,
        body: String,
        parent_item_id: Option<String>,
    },
}

impl ArchiveItem {
    pub fn item_id(&self) -> &str {
        match self {
            ArchiveItem::PrOpened { item_id, .. }
            | ArchiveItem::PrRevised { item_id, .. }
            | ArchiveItem::Comment { item_id, .. }
            | ArchiveItem::ReviewComment { item_id, .. }
            | ArchiveItem::Review { item_id, .. }
            | ArchiveItem::Verdict { item_id, .. } => item_id,
        }
    }

    pub fn author(&self) -> &str {
        match self {
            ArchiveItem::PrOpened { author, .. }
            | ArchiveItem::PrRevised { author, .. }
            | ArchiveItem::Comment { author, .. }
            | ArchiveItem::ReviewComment { author, .. }
            | ArchiveItem::Review { author, .. }
            | ArchiveItem::Verdict { author, .. } => author,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ArchiveItem::PrOpened { timestamp, .. }
            | ArchiveItem::PrRevised { timestamp, .. }
            | ArchiveItem::Comment { timestamp, .. }
            | ArchiveItem::ReviewComment { timestamp, .. }
            | ArchiveItem::Review { timestamp, .. }
            | ArchiveItem::Verdict { timestamp, .. } => *timestamp,
        }
    }

    pub fn parent_item_id(&self) -> Option<&str> {
        match self {
            ArchiveItem::PrOpened { .. } | ArchiveItem::PrRevised { .. } => None,
            ArchiveItem::Comment { parent_item_id, .. }
            | ArchiveItem::ReviewComment { parent_item_id, .. }
            | ArchiveItem::Review { parent_item_id, .. }
            | ArchiveItem::Verdict { parent_item_id, .. } => parent_item_id.as_deref(),
        }
    }

    /// The rendered body used both for display and for quote-matching by
    /// later items. For combined review comments this joins the sub-bodies.
    pub fn rendered_body(&self) -> String {
        match self {
            ArchiveItem::PrOpened { body, .. }
            | ArchiveItem::PrRevised { body, .. }
            | ArchiveItem::Comment { body, .. }
            | ArchiveItem::Review { body, .. }
            | ArchiveItem::Verdict { body, .. } => body.clone(),
            ArchiveItem::ReviewComment { bodies, .. } => bodies.join("\n\n"),
        }
    }

    /// First non-empty line of the rendered body; used by the quoted-line
    /// parent-resolution rule (§4.3 step 2).
    pub fn first_nonempty_line(&self) -> Option<String> {
        self.rendered_body()
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
    }
}

/// `{Full, Incremental, MergeTarget, MergeSource, MergeConflict}` webrev kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebrevKind {
    Full,
    Incremental,
    MergeTarget,
    MergeSource,
    MergeConflict,
}

/// A published patch snapshot. Lives append-only in the archive-storage
/// repository keyed by `pr-id/revision-ordinal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebrevArtifact {
    pub pr_id: PrId,
    pub revision_ordinal: u32,
    pub base_hash: String,
    pub head_hash: String,
    pub kind: WebrevKind,
    pub url: String,
}

impl WebrevArtifact {
    /// `<NN>` path segment, zero-padded to two digits per §4.5.
    pub fn ordinal_segment(&self) -> String {
        format!("{:02}", self.revision_ordinal)
    }
}

/// The durable, per-pull-request memory the mail bridge keeps across
/// restarts. Mutated only by the mail-bridge work item for its own entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableState {
    pub entity_id: String,
    pub issue_ids: BTreeSet<String>,
    pub integrated_commit: Option<String>,
    pub head_revision: String,
    pub forge_state: ForgeState,
    pub target_branch: String,
    /// Message-IDs of mails this bridge has sent for this pull request.
    pub sent_mail_fingerprints: BTreeSet<String>,
    /// Archive items already materialized, by item-id, so re-runs are
    /// idempotent and Message-ID chaining survives restarts.
    pub item_message_ids: BTreeMap<String, String>,
    /// Every head-revision observed so far, in order, with first-seen times.
    pub head_history: HeadHistory,
    /// Highest webrev revision ordinal already published.
    pub last_webrev_ordinal: Option<u32>,
    /// Last time this entity's durable state was updated; used for cooldown.
    pub last_update: DateTime<Utc>,
}

impl DurableState {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            issue_ids: BTreeSet::new(),
            integrated_commit: None,
            head_revision: String::new(),
            forge_state: ForgeState::Open,
            target_branch: String::new(),
            sent_mail_fingerprints: BTreeSet::new(),
            item_message_ids: BTreeMap::new(),
            head_history: HeadHistory::default(),
            last_webrev_ordinal: None,
            last_update: Utc::now(),
        }
    }
}

/// PR-readiness state machine (§4.4). `PreReady` is the initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    PreReady,
    Ready,
    Integrated,
    Closed,
}

/// Snapshot used by the PR notifier (§4.7) to diff against the last stored
/// state and emit lifecycle callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestState {
    pub pr_id: PrId,
    pub issue_ids: BTreeSet<String>,
    pub integrated_commit: Option<String>,
    pub head: String,
    pub state: ForgeState,
    pub target_branch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Bug,
    NewFeature,
    Enhancement,
    Task,
    SubTask,
    Backport,
}

impl IssueType {
    pub fn is_primary(&self) -> bool {
        !matches!(self, IssueType::Backport)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueLinkKind {
    BackportOf,
    BackportedBy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueLink {
    pub kind: IssueLinkKind,
    pub target_id: String,
}

/// A tracker issue: a primary or one of its backports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRef {
    pub id: String,
    pub issue_type: IssueType,
    pub state: IssueState,
    pub fix_versions: Vec<String>,
    pub security_level: Option<String>,
    pub labels: BTreeSet<String>,
    pub links: Vec<IssueLink>,
    pub assignee: Option<String>,
    pub resolved_in_build: Option<String>,
}

impl IssueRef {
    pub fn backport_of(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.kind == IssueLinkKind::BackportOf)
            .map(|l| l.target_id.as_str())
    }
}

/// `(feature, interim?, update?, patch?, opt?, resolvedInBuild?)`, ordered
/// numerically by component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JdkVersion {
    pub feature: u32,
    pub interim: Option<u32>,
    pub update: Option<u32>,
    pub patch: Option<u32>,
    pub opt: Option<String>,
    pub resolved_in_build: Option<String>,
}

/// A string key identifying an equivalence class of `JdkVersion`s that ship
/// together; see §4.7.1.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReleaseStream(pub String);

impl std::fmt::Display for ReleaseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

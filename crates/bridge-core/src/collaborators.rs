//! External collaborator interfaces (§6). These are pure trait definitions —
//! no concrete network client lives in this crate; generic forge/mailing-list
//! transport clients are explicitly out of scope (§1).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{ForgeComment, ForgeReviewComment, PrId, PullRequestRef};

/// Code-review forge: enumerate repositories; fetch PR snapshots; mutate
/// labels/comments/review-comments; manage the repository's label set.
#[async_trait]
pub trait Forge: Send + Sync {
    async fn list_repositories(&self) -> anyhow::Result<Vec<String>>;
    async fn list_open_pull_requests(&self, repo: &str) -> anyhow::Result<Vec<PrId>>;
    async fn fetch_pull_request(&self, id: &PrId) -> anyhow::Result<PullRequestRef>;

    async fn add_labels(&self, id: &PrId, labels: &[String]) -> anyhow::Result<()>;
    async fn remove_labels(&self, id: &PrId, labels: &[String]) -> anyhow::Result<()>;

    async fn post_comment(&self, id: &PrId, body: &str) -> anyhow::Result<ForgeComment>;
    async fn edit_comment(&self, id: &PrId, comment_id: &str, body: &str) -> anyhow::Result<()>;
    async fn reply_to_review_comment(
        &self,
        id: &PrId,
        review_comment_id: &str,
        body: &str,
    ) -> anyhow::Result<ForgeReviewComment>;

    async fn list_repo_labels(&self, repo: &str) -> anyhow::Result<Vec<RepoLabel>>;
    async fn create_label(&self, repo: &str, label: &RepoLabel) -> anyhow::Result<()>;
    async fn update_label(&self, repo: &str, label: &RepoLabel) -> anyhow::Result<()>;
    async fn delete_label(&self, repo: &str, name: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLabel {
    pub name: String,
    pub description: String,
}

/// One inbound mail observed in a mailing-list archive conversation.
#[derive(Debug, Clone)]
pub struct ArchiveMail {
    pub message_id: String,
    pub in_reply_to: Option<String>,
    pub subject: String,
    pub from_name: String,
    pub from_address: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// A first-message-plus-replies conversation as observed in the archive.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub root: ArchiveMail,
    pub replies: Vec<ArchiveMail>,
}

/// A mail ready to be submitted, with arbitrary extra headers.
#[derive(Debug, Clone)]
pub struct OutboundMail {
    pub message_id: String,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub body: String,
    pub extra_headers: Vec<(String, String)>,
}

/// Mailing-list transport: SMTP submission plus archive retrieval.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutboundMail) -> anyhow::Result<()>;

    /// Conversations observed on `list_address` within `lookback_seconds`.
    async fn list_conversations(
        &self,
        list_address: &str,
        lookback_seconds: i64,
    ) -> anyhow::Result<Vec<Conversation>>;
}

/// Properties used to create a new issue-tracker issue (backport creation).
#[derive(Debug, Clone, Default)]
pub struct NewIssueProps {
    pub summary: String,
    pub issue_type: String,
    pub fix_versions: Vec<String>,
    pub security_level: Option<String>,
    pub backport_of: Option<String>,
}

/// Issue tracker: fetch/mutate issues, follow links, create backports.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn fetch_issue(&self, id: &str) -> anyhow::Result<crate::types::IssueRef>;
    async fn set_state(&self, id: &str, state: crate::types::IssueState) -> anyhow::Result<()>;
    async fn set_assignee(&self, id: &str, assignee: &str) -> anyhow::Result<()>;
    async fn add_labels(&self, id: &str, labels: &[String]) -> anyhow::Result<()>;
    async fn remove_labels(&self, id: &str, labels: &[String]) -> anyhow::Result<()>;
    async fn add_comment(&self, id: &str, body: &str) -> anyhow::Result<()>;
    async fn set_resolved_in_build(&self, id: &str, value: &str) -> anyhow::Result<()>;
    async fn create_issue(&self, props: &NewIssueProps) -> anyhow::Result<String>;
}

/// Version control: materialize refs, commit, push with optimistic
/// concurrency, read files at a revision.
#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn materialize(&self, url: &str, reference: &str, into: &str) -> anyhow::Result<()>;
    async fn fetch_and_checkout(&self, path: &str, reference: &str) -> anyhow::Result<()>;
    async fn resolve_ref(&self, path: &str, reference: &str) -> anyhow::Result<String>;
    async fn commit(&self, path: &str, message: &str) -> anyhow::Result<String>;

    /// Pushes `path`'s current branch. Returns `Ok(true)` on success,
    /// `Ok(false)` if the remote ref moved (optimistic-concurrency conflict,
    /// caller should re-fetch/re-apply/retry).
    async fn push(&self, path: &str, reference: &str) -> anyhow::Result<bool>;

    async fn commits_between(&self, path: &str, base: &str, head: &str) -> anyhow::Result<Vec<String>>;
    async fn read_file_at(&self, path: &str, reference: &str, file: &str) -> anyhow::Result<Option<String>>;
}

//! Durable memory for the PR/issue notifier, kept separate from the mail
//! bridge's `DurableState` (§4.2: "mutated only by the mail-bridge work
//! item"). Same line-delimited-JSON-over-`VersionControl` discipline, its
//! own record shape and its own ref.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use bridge_core::collaborators::VersionControl;
use bridge_core::types::PullRequestState;

const STATE_FILE: &str = "notifier-state.jsonl";

/// Per-pull-request memory the notifier keeps across restarts: the last
/// computed state snapshot (for diffing) and which issue/commit pairs have
/// already received a one-line integration comment (§4.7 step 3, dedup —
/// `IssueTracker` has no list-comments accessor to check against directly).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierState {
    pub entity_id: String,
    pub last_state: Option<PullRequestState>,
    /// issue id -> set of commit hashes already notified.
    pub notified_issue_commits: BTreeMap<String, BTreeSet<String>>,
}

impl NotifierState {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self { entity_id: entity_id.into(), last_state: None, notified_issue_commits: BTreeMap::new() }
    }

    pub fn already_notified(&self, issue_id: &str, commit_hash: &str) -> bool {
        self.notified_issue_commits.get(issue_id).is_some_and(|commits| commits.contains(commit_hash))
    }

    pub fn mark_notified(&mut self, issue_id: &str, commit_hash: &str) {
        self.notified_issue_commits.entry(issue_id.to_string()).or_default().insert(commit_hash.to_string());
    }
}

pub struct NotifierStateStore {
    vc: Arc<dyn VersionControl>,
    repo_url: String,
    reference: String,
    working_copy: String,
    retry_attempts: u32,
    records: tokio::sync::Mutex<BTreeMap<String, NotifierState>>,
}

impl NotifierStateStore {
    pub fn new(
        vc: Arc<dyn VersionControl>,
        repo_url: impl Into<String>,
        reference: impl Into<String>,
        working_copy: impl Into<String>,
        retry_attempts: u32,
    ) -> Self {
        Self {
            vc,
            repo_url: repo_url.into(),
            reference: reference.into(),
            working_copy: working_copy.into(),
            retry_attempts,
            records: tokio::sync::Mutex::new(BTreeMap::new()),
        }
    }

    pub async fn load(&self) -> anyhow::Result<()> {
        self.vc
            .materialize(&self.repo_url, &self.reference, &self.working_copy)
            .await
            .context("notifier_state_store: materialize")?;
        let records = self.read_records().await?;
        *self.records.lock().await = records;
        Ok(())
    }

    pub async fn get(&self, entity_id: &str) -> Option<NotifierState> {
        self.records.lock().await.get(entity_id).cloned()
    }

    pub async fn put(&self, record: NotifierState) -> anyhow::Result<()> {
        {
            let mut records = self.records.lock().await;
            records.insert(record.entity_id.clone(), record);
        }
        self.commit().await
    }

    async fn commit(&self) -> anyhow::Result<()> {
        for attempt in 0..=self.retry_attempts {
            self.vc
                .fetch_and_checkout(&self.working_copy, &self.reference)
                .await
                .context("notifier_state_store: fetch_and_checkout")?;

            let remote_records = self.read_records().await?;
            {
                let mut local = self.records.lock().await;
                for (id, remote_record) in remote_records {
                    local.entry(id).or_insert(remote_record);
                }
            }

            self.write_records().await?;
            self.vc
                .commit(&self.working_copy, "bridge: update notifier state")
                .await
                .context("notifier_state_store: commit")?;

            match self.vc.push(&self.working_copy, &self.reference).await {
                Ok(true) => {
                    info!(attempt, "notifier state pushed");
                    return Ok(());
                }
                Ok(false) => {
                    warn!(attempt, "notifier state push race, retrying");
                    continue;
                }
                Err(e) => return Err(e).context("notifier_state_store: push"),
            }
        }
        anyhow::bail!("notifier state push failed after {} attempts (conflict)", self.retry_attempts + 1)
    }

    async fn read_records(&self) -> anyhow::Result<BTreeMap<String, NotifierState>> {
        let path = format!("{}/{}", self.working_copy, STATE_FILE);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e).context("notifier_state_store: read state file"),
        };
        parse_jsonl(&text)
    }

    async fn write_records(&self) -> anyhow::Result<()> {
        let path = format!("{}/{}", self.working_copy, STATE_FILE);
        let records = self.records.lock().await;
        let text = serialize_jsonl(&records)?;
        tokio::fs::write(&path, text).await.context("notifier_state_store: write state file")
    }
}

fn serialize_jsonl(records: &BTreeMap<String, NotifierState>) -> anyhow::Result<String> {
    let mut out = String::new();
    for record in records.values() {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

fn parse_jsonl(text: &str) -> anyhow::Result<BTreeMap<String, NotifierState>> {
    let mut out = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: NotifierState = serde_json::from_str(line).context("notifier_state_store: parse record")?;
        out.insert(record.entity_id.clone(), record);
    }
    Ok(out)
}

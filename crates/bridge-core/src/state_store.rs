//! Durable State Store (§4.2).
//!
//! A set-of-records value keyed by entity-id, serialized as line-delimited
//! JSON sorted by entity-id. Persistence goes through the `VersionControl`
//! collaborator with optimistic concurrency: pull, merge by "key wins
//! last-write", push, retry up to a bounded number of attempts on conflict.
//! Grounded in the push/fetch/retry discipline of the teacher's `git.rs`
//! (`run_integration`'s push-race handling), adapted from a concrete git
//! wrapper to the `VersionControl` trait.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::collaborators::VersionControl;
use crate::types::DurableState;

const STATE_FILE: &str = "state.jsonl";

/// In-memory view plus the machinery to commit it back with optimistic
/// concurrency. One store instance is shared per repository.
pub struct DurableStateStore {
    vc: Arc<dyn VersionControl>,
    repo_url: String,
    reference: String,
    working_copy: String,
    retry_attempts: u32,
    records: tokio::sync::Mutex<BTreeMap<String, DurableState>>,
}

impl DurableStateStore {
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

    /// Materialize the working copy and load the current record set.
    pub async fn load(&self) -> anyhow::Result<()> {
        self.vc
            .materialize(&self.repo_url, &self.reference, &self.working_copy)
            .await
            .context("state_store: materialize")?;
        let records = self.read_records().await?;
        *self.records.lock().await = records;
        Ok(())
    }

    /// current(): a snapshot of every record.
    pub async fn current(&self) -> BTreeMap<String, DurableState> {
        self.records.lock().await.clone()
    }

    pub async fn get(&self, entity_id: &str) -> Option<DurableState> {
        self.records.lock().await.get(entity_id).cloned()
    }

    /// put(record): replace the entry with the same entity-id, then commit
    /// with optimistic concurrency (pull, merge key-wins-last-write, push,
    /// retry up to `retry_attempts`).
    pub async fn put(&self, record: DurableState) -> anyhow::Result<()> {
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
                .context("state_store: fetch_and_checkout")?;

            let remote_records = self.read_records().await?;
            {
                let mut local = self.records.lock().await;
                for (id, remote_record) in remote_records {
                    local.entry(id).or_insert(remote_record);
                }
            }

            self.write_records().await?;
            self.vc
                .commit(&self.working_copy, "bridge: update durable state")
                .await
                .context("state_store: commit")?;

            match self.vc.push(&self.working_copy, &self.reference).await {
                Ok(true) => {
                    info!(attempt, "durable state pushed");
                    return Ok(());
                }
                Ok(false) => {
                    warn!(attempt, "durable state push race, retrying");
                    continue;
                }
                Err(e) => return Err(e).context("state_store: push"),
            }
        }
        anyhow::bail!("durable state push failed after {} attempts (conflict)", self.retry_attempts + 1)
    }

    async fn read_records(&self) -> anyhow::Result<BTreeMap<String, DurableState>> {
        let path = format!("{}/{}", self.working_copy, STATE_FILE);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e).context("state_store: read state file"),
        };
        parse_jsonl(&text)
    }

    async fn write_records(&self) -> anyhow::Result<()> {
        let path = format!("{}/{}", self.working_copy, STATE_FILE);
        let records = self.records.lock().await;
        let text = serialize_jsonl(&records)?;
        tokio::fs::write(&path, text).await.context("state_store: write state file")
    }
}

/// Line-delimited JSON, one record per line, sorted by entity-id — a
/// `BTreeMap` already iterates in key order so this is a direct serialize.
fn serialize_jsonl(records: &BTreeMap<String, DurableState>) -> anyhow::Result<String> {
    let mut out = String::new();
    for record in records.values() {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

fn parse_jsonl(text: &str) -> anyhow::Result<BTreeMap<String, DurableState>> {
    let mut out = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: DurableState = serde_json::from_str(line).context("state_store: parse record")?;
        out.insert(record.entity_id.clone(), record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::VersionControl;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// Minimal in-memory fake standing in for a git remote: a single text
    /// blob keyed by (path, reference), with a push that can be made to
    /// race once to exercise the retry path.
    struct FakeVc {
        blobs: StdMutex<HashMap<String, String>>,
        fail_pushes_remaining: StdMutex<u32>,
    }

    impl FakeVc {
        fn new() -> Self {
            Self { blobs: StdMutex::new(HashMap::new()), fail_pushes_remaining: StdMutex::new(0) }
        }

        fn key(path: &str) -> String {
            path.to_string()
        }
    }

    #[async_trait]
    impl VersionControl for FakeVc {
        async fn materialize(&self, _url: &str, _reference: &str, into: &str) -> anyhow::Result<()> {
            tokio::fs::create_dir_all(into).await?;
            if let Some(blob) = self.blobs.lock().unwrap().get(&Self::key(into)).cloned() {
                tokio::fs::write(format!("{into}/{STATE_FILE}"), blob).await?;
            }
            Ok(())
        }

        async fn fetch_and_checkout(&self, path: &str, _reference: &str) -> anyhow::Result<()> {
            if let Some(blob) = self.blobs.lock().unwrap().get(&Self::key(path)).cloned() {
                tokio::fs::write(format!("{path}/{STATE_FILE}"), blob).await?;
            }
            Ok(())
        }

        async fn resolve_ref(&self, _path: &str, _reference: &str) -> anyhow::Result<String> {
            Ok("HEAD".to_string())
        }

        async fn commit(&self, _path: &str, _message: &str) -> anyhow::Result<String> {
            Ok("deadbeef".to_string())
        }

        async fn push(&self, path: &str, _reference: &str) -> anyhow::Result<bool> {
            let mut remaining = self.fail_pushes_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(false);
            }
            drop(remaining);
            let text = tokio::fs::read_to_string(format!("{path}/{STATE_FILE}")).await.unwrap_or_default();
            self.blobs.lock().unwrap().insert(Self::key(path), text);
            Ok(true)
        }

        async fn commits_between(&self, _path: &str, _base: &str, _head: &str) -> anyhow::Result<Vec<String>> {
            Ok(vec![])
        }

        async fn read_file_at(&self, _path: &str, _reference: &str, _file: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
    }

    fn tmp_dir(name: &str) -> String {
        std::env::temp_dir().join(format!("bridge-state-test-{name}-{}", std::process::id())).to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let vc = Arc::new(FakeVc::new());
        let wc = tmp_dir("roundtrip");
        let store = DurableStateStore::new(vc, "repo://archive", "refs/heads/state", wc, 5);
        store.load().await.unwrap();

        let mut record = DurableState::new("openjdk/jdk#1234");
        record.head_revision = "abc123".to_string();
        store.put(record.clone()).await.unwrap();

        let fetched = store.get("openjdk/jdk#1234").await.unwrap();
        assert_eq!(fetched.head_revision, "abc123");
    }

    #[tokio::test]
    async fn serialized_form_is_sorted_by_entity_id() {
        let vc = Arc::new(FakeVc::new());
        let wc = tmp_dir("sorted");
        let store = DurableStateStore::new(vc, "repo://archive", "refs/heads/state", wc, 5);
        store.load().await.unwrap();
        store.put(DurableState::new("repo#2")).await.unwrap();
        store.put(DurableState::new("repo#1")).await.unwrap();

        let path = format!("{}/{STATE_FILE}", store.working_copy);
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("repo#1"));
        assert!(lines[1].contains("repo#2"));
    }

    #[tokio::test]
    async fn push_race_triggers_one_retry_then_succeeds() {
        let vc = Arc::new(FakeVc::new());
        *vc.fail_pushes_remaining.lock().unwrap() = 1;
        let wc = tmp_dir("race");
        let store = DurableStateStore::new(vc, "repo://archive", "refs/heads/state", wc, 5);
        store.load().await.unwrap();

        store.put(DurableState::new("openjdk/jdk#42")).await.unwrap();
        assert!(store.get("openjdk/jdk#42").await.is_some());
    }

    #[tokio::test]
    async fn exhausting_retries_fails_the_work_item() {
        let vc = Arc::new(FakeVc::new());
        *vc.fail_pushes_remaining.lock().unwrap() = 99;
        let wc = tmp_dir("exhausted");
        let store = DurableStateStore::new(vc, "repo://archive", "refs/heads/state", wc, 2);
        store.load().await.unwrap();

        let result = store.put(DurableState::new("openjdk/jdk#7")).await;
        assert!(result.is_err());
    }
}

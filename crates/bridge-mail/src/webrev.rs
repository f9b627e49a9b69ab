//! Webrev Publisher (§4.5).
//!
//! Renders a patch snapshot — the HTML webrev renderer itself is out of
//! scope (§1) and is treated as an upstream collaborator supplying already
//! rendered file bytes — and publishes it to an archive-storage ref with
//! optimistic concurrency, following the same pull/commit/push/retry shape
//! as `bridge_core::state_store::DurableStateStore`.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bridge_core::collaborators::VersionControl;
use bridge_core::config::WebrevConfig;
use bridge_core::types::{PrId, PullRequestRef, WebrevArtifact, WebrevKind};
use tracing::{info, warn};

const TOO_LARGE_NOTICE: &str = "This file is too large to publish inline; see the full webrev for its contents.\n";

/// Stands in for the webrev HTML renderer, which §1 explicitly keeps out of
/// scope: given a revision pair, produce the rendered artifact's file tree.
/// The publisher below only handles placing that tree into the
/// archive-storage repository with optimistic concurrency.
#[async_trait]
pub trait WebrevRenderer: Send + Sync {
    async fn render(
        &self,
        pr: &PullRequestRef,
        base_hash: &str,
        head_hash: &str,
    ) -> anyhow::Result<BTreeMap<String, Vec<u8>>>;
}

pub struct WebrevPublisher {
    vc: Arc<dyn VersionControl>,
    config: WebrevConfig,
    repo_url: String,
    reference: String,
    working_copy: String,
}

impl WebrevPublisher {
    pub fn new(
        vc: Arc<dyn VersionControl>,
        config: WebrevConfig,
        repo_url: impl Into<String>,
        reference: impl Into<String>,
        working_copy: impl Into<String>,
    ) -> Self {
        Self { vc, config, repo_url: repo_url.into(), reference: reference.into(), working_copy: working_copy.into() }
    }

    /// `<base>/<repo>/<number>/<NN>/` relative to the working copy root.
    fn relative_dir(&self, pr_id: &PrId, ordinal_segment: &str) -> String {
        format!("{}/{}/{}/{}", self.config.archive_base_path, pr_id.repo, pr_id.number, ordinal_segment)
    }

    /// Large blobs are replaced with a placeholder smaller than 1 KiB.
    fn prepare_files(&self, files: &BTreeMap<String, Vec<u8>>) -> BTreeMap<String, Vec<u8>> {
        files
            .iter()
            .map(|(path, bytes)| {
                if bytes.len() as u64 > self.config.large_blob_threshold_bytes {
                    (path.clone(), TOO_LARGE_NOTICE.as_bytes().to_vec())
                } else {
                    (path.clone(), bytes.clone())
                }
            })
            .collect()
    }

    /// Generate (or idempotently re-generate) the webrev for one revision
    /// and publish it, retrying on an optimistic-concurrency push race.
    pub async fn generate(
        &self,
        pr_id: &PrId,
        base_hash: &str,
        head_hash: &str,
        ordinal: u32,
        kind: WebrevKind,
        files: &BTreeMap<String, Vec<u8>>,
    ) -> anyhow::Result<WebrevArtifact> {
        self.vc
            .materialize(&self.repo_url, &self.reference, &self.working_copy)
            .await
            .context("webrev: materialize archive working copy")?;

        let prepared = self.prepare_files(files);
        let ordinal_segment = format!("{ordinal:02}");
        let dir = self.relative_dir(pr_id, &ordinal_segment);

        for attempt in 0..=self.config.push_retry_attempts {
            self.vc
                .fetch_and_checkout(&self.working_copy, &self.reference)
                .await
                .context("webrev: fetch_and_checkout")?;

            self.write_files(&dir, &prepared).await?;

            self.vc
                .commit(&self.working_copy, &format!("webrev: {} {ordinal_segment}", pr_id))
                .await
                .context("webrev: commit")?;

            match self.vc.push(&self.working_copy, &self.reference).await {
                Ok(true) => {
                    info!(pr = %pr_id, ordinal, attempt, "webrev published");
                    let url = format!("{}/{}", self.config.public_mirror_base.trim_end_matches('/'), dir);
                    return Ok(WebrevArtifact {
                        pr_id: pr_id.clone(),
                        revision_ordinal: ordinal,
                        base_hash: base_hash.to_string(),
                        head_hash: head_hash.to_string(),
                        kind,
                        url,
                    });
                }
                Ok(false) => {
                    warn!(pr = %pr_id, ordinal, attempt, "webrev push race, retrying");
                    continue;
                }
                Err(e) => return Err(e).context("webrev: push"),
            }
        }

        anyhow::bail!(
            "webrev push failed for {} revision {} after {} attempts (conflict)",
            pr_id,
            ordinal_segment,
            self.config.push_retry_attempts + 1
        )
    }

    async fn write_files(&self, dir: &str, files: &BTreeMap<String, Vec<u8>>) -> anyhow::Result<()> {
        let full_dir = format!("{}/{}", self.working_copy, dir);
        tokio::fs::create_dir_all(&full_dir).await.context("webrev: create artifact dir")?;
        for (name, bytes) in files {
            let path = format!("{full_dir}/{name}");
            if let Some(parent) = std::path::Path::new(&path).parent() {
                tokio::fs::create_dir_all(parent).await.context("webrev: create artifact subdir")?;
            }
            tokio::fs::write(&path, bytes).await.context("webrev: write artifact file")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeVc {
        blobs: StdMutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
        fail_pushes_remaining: StdMutex<u32>,
        push_count: StdMutex<u32>,
    }

    impl FakeVc {
        fn new() -> Self {
            Self {
                blobs: StdMutex::new(HashMap::new()),
                fail_pushes_remaining: StdMutex::new(0),
                push_count: StdMutex::new(0),
            }
        }
    }

    async fn snapshot_tree(path: &str) -> BTreeMap<String, Vec<u8>> {
        let mut out = BTreeMap::new();
        let mut stack = vec![path.to_string()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(_) => continue,
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let p = entry.path();
                if p.is_dir() {
                    stack.push(p.to_string_lossy().into_owned());
                } else {
                    let bytes = tokio::fs::read(&p).await.unwrap();
                    out.insert(p.strip_prefix(path).unwrap().to_string_lossy().into_owned(), bytes);
                }
            }
        }
        out
    }

    #[async_trait]
    impl VersionControl for FakeVc {
        async fn materialize(&self, _url: &str, _reference: &str, into: &str) -> anyhow::Result<()> {
            tokio::fs::create_dir_all(into).await?;
            Ok(())
        }

        async fn fetch_and_checkout(&self, _path: &str, _reference: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn resolve_ref(&self, _path: &str, _reference: &str) -> anyhow::Result<String> {
            Ok("HEAD".to_string())
        }

        async fn commit(&self, _path: &str, _message: &str) -> anyhow::Result<String> {
            Ok("cafebabe".to_string())
        }

        async fn push(&self, path: &str, _reference: &str) -> anyhow::Result<bool> {
            *self.push_count.lock().unwrap() += 1;
            let mut remaining = self.fail_pushes_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(false);
            }
            drop(remaining);
            self.blobs.lock().unwrap().insert(path.to_string(), snapshot_tree(path).await);
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
        std::env::temp_dir().join(format!("bridge-webrev-test-{name}-{}", std::process::id())).to_string_lossy().into_owned()
    }

    fn config() -> WebrevConfig {
        WebrevConfig {
            archive_base_path: "webrevs".into(),
            large_blob_threshold_bytes: 100,
            public_mirror_base: "https://webrevs.test/mirror".into(),
            push_retry_attempts: 5,
        }
    }

    #[tokio::test]
    async fn generate_publishes_and_returns_public_url() {
        let vc = Arc::new(FakeVc::new());
        let wc = tmp_dir("basic");
        let publisher = WebrevPublisher::new(vc, config(), "repo://archive", "refs/heads/webrevs", wc);
        let pr_id = PrId::new("openjdk/jdk", 1234);
        let mut files = BTreeMap::new();
        files.insert("index.html".to_string(), b"<html>diff</html>".to_vec());

        let artifact = publisher.generate(&pr_id, "base1", "head1", 0, WebrevKind::Full, &files).await.unwrap();
        assert_eq!(artifact.revision_ordinal, 0);
        assert!(artifact.url.contains("webrevs/openjdk/jdk/1234/00"));
    }

    #[tokio::test]
    async fn large_blob_is_replaced_with_small_placeholder() {
        let vc = Arc::new(FakeVc::new());
        let wc = tmp_dir("large");
        let publisher = WebrevPublisher::new(vc, config(), "repo://archive", "refs/heads/webrevs", wc.clone());
        let pr_id = PrId::new("openjdk/jdk", 1234);
        let mut files = BTreeMap::new();
        files.insert("big.bin".to_string(), vec![0u8; 10_000]);

        publisher.generate(&pr_id, "base1", "head1", 0, WebrevKind::Full, &files).await.unwrap();

        let written = tokio::fs::read(format!("{wc}/webrevs/openjdk/jdk/1234/00/big.bin")).await.unwrap();
        assert!(written.len() < 1024);
    }

    #[tokio::test]
    async fn push_race_retries_then_succeeds() {
        let vc = Arc::new(FakeVc::new());
        *vc.fail_pushes_remaining.lock().unwrap() = 1;
        let wc = tmp_dir("race");
        let publisher = WebrevPublisher::new(vc.clone(), config(), "repo://archive", "refs/heads/webrevs", wc);
        let pr_id = PrId::new("openjdk/jdk", 1234);
        let mut files = BTreeMap::new();
        files.insert("index.html".to_string(), b"diff".to_vec());

        publisher.generate(&pr_id, "base1", "head1", 0, WebrevKind::Full, &files).await.unwrap();
        assert_eq!(*vc.push_count.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn regenerating_same_revision_is_idempotent() {
        let vc = Arc::new(FakeVc::new());
        let wc = tmp_dir("idempotent");
        let publisher = WebrevPublisher::new(vc, config(), "repo://archive", "refs/heads/webrevs", wc.clone());
        let pr_id = PrId::new("openjdk/jdk", 1234);
        let mut files = BTreeMap::new();
        files.insert("index.html".to_string(), b"diff-content".to_vec());

        publisher.generate(&pr_id, "base1", "head1", 0, WebrevKind::Full, &files).await.unwrap();
        let first = snapshot_tree(&format!("{wc}/webrevs/openjdk/jdk/1234/00")).await;
        publisher.generate(&pr_id, "base1", "head1", 0, WebrevKind::Full, &files).await.unwrap();
        let second = snapshot_tree(&format!("{wc}/webrevs/openjdk/jdk/1234/00")).await;

        assert_eq!(first, second);
    }
}

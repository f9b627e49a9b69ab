//! Label Updater (§4.8): ensures the forge repository carries exactly the
//! label set derived from the mailing-list configuration.

use bridge_core::collaborators::{Forge, RepoLabel};
use bridge_core::config::MailingListConfig;
use tracing::info;

/// The label set a mailing-list configuration derives: one label per list
/// name, each described by the list's email address.
pub fn derive_labels(lists: &[MailingListConfig]) -> Vec<RepoLabel> {
    lists.iter().map(|l| RepoLabel { name: l.name.clone(), description: l.address.clone() }).collect()
}

/// Reconcile `repo`'s labels against `derived`: create missing labels,
/// update ones whose description drifted, and leave everything else
/// (including labels outside the derived set) untouched.
pub async fn sync_labels(forge: &dyn Forge, repo: &str, derived: &[RepoLabel]) -> anyhow::Result<()> {
    let existing = forge.list_repo_labels(repo).await?;

    for label in derived {
        match existing.iter().find(|e| e.name == label.name) {
            None => {
                info!(repo, label = %label.name, "creating mailing-list label");
                forge.create_label(repo, label).await?;
            }
            Some(found) if found.description != label.description => {
                info!(repo, label = %label.name, "updating mailing-list label description");
                forge.update_label(repo, label).await?;
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_core::collaborators::{Forge, RepoLabel};
    use bridge_core::types::{ForgeComment, ForgeReviewComment, PrId, PullRequestRef};
    use std::sync::Mutex as StdMutex;

    struct FakeForge {
        labels: StdMutex<Vec<RepoLabel>>,
        created: StdMutex<Vec<RepoLabel>>,
        updated: StdMutex<Vec<RepoLabel>>,
    }

    #[async_trait]
    impl Forge for FakeForge {
        async fn list_repositories(&self) -> anyhow::Result<Vec<String>> {
            Ok(vec![])
        }
        async fn list_open_pull_requests(&self, _repo: &str) -> anyhow::Result<Vec<PrId>> {
            Ok(vec![])
        }
        async fn fetch_pull_request(&self, _id: &PrId) -> anyhow::Result<PullRequestRef> {
            anyhow::bail!("not used")
        }
        async fn add_labels(&self, _id: &PrId, _labels: &[String]) -> anyhow::Result<()> {
            Ok(())
        }
        async fn remove_labels(&self, _id: &PrId, _labels: &[String]) -> anyhow::Result<()> {
            Ok(())
        }
        async fn post_comment(&self, _id: &PrId, _body: &str) -> anyhow::Result<ForgeComment> {
            anyhow::bail!("not used")
        }
        async fn edit_comment(&self, _id: &PrId, _comment_id: &str, _body: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn reply_to_review_comment(
            &self,
            _id: &PrId,
            _review_comment_id: &str,
            _body: &str,
        ) -> anyhow::Result<ForgeReviewComment> {
            anyhow::bail!("not used")
        }
        async fn list_repo_labels(&self, _repo: &str) -> anyhow::Result<Vec<RepoLabel>> {
            Ok(self.labels.lock().unwrap().clone())
        }
        async fn create_label(&self, _repo: &str, label: &RepoLabel) -> anyhow::Result<()> {
            self.created.lock().unwrap().push(label.clone());
            self.labels.lock().unwrap().push(label.clone());
            Ok(())
        }
        async fn update_label(&self, _repo: &str, label: &RepoLabel) -> anyhow::Result<()> {
            self.updated.lock().unwrap().push(label.clone());
            let mut labels = self.labels.lock().unwrap();
            if let Some(existing) = labels.iter_mut().find(|l| l.name == label.name) {
                *existing = label.clone();
            }
            Ok(())
        }
        async fn delete_label(&self, _repo: &str, _name: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn list(name: &str, address: &str) -> MailingListConfig {
        MailingListConfig { name: name.into(), address: address.into(), label_set: vec![] }
    }

    #[tokio::test]
    async fn creates_missing_labels() {
        let forge = FakeForge { labels: StdMutex::new(vec![]), created: StdMutex::new(vec![]), updated: StdMutex::new(vec![]) };
        let derived = derive_labels(&[list("jdk-dev", "jdk-dev@openjdk.test")]);
        sync_labels(&forge, "openjdk/jdk", &derived).await.unwrap();
        assert_eq!(forge.created.lock().unwrap().len(), 1);
        assert_eq!(forge.created.lock().unwrap()[0].name, "jdk-dev");
    }

    #[tokio::test]
    async fn updates_labels_with_drifted_description() {
        let forge = FakeForge {
            labels: StdMutex::new(vec![RepoLabel { name: "jdk-dev".into(), description: "stale@openjdk.test".into() }]),
            created: StdMutex::new(vec![]),
            updated: StdMutex::new(vec![]),
        };
        let derived = derive_labels(&[list("jdk-dev", "jdk-dev@openjdk.test")]);
        sync_labels(&forge, "openjdk/jdk", &derived).await.unwrap();
        assert_eq!(forge.updated.lock().unwrap().len(), 1);
        assert!(forge.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn leaves_unrelated_labels_untouched() {
        let forge = FakeForge {
            labels: StdMutex::new(vec![RepoLabel { name: "bug".into(), description: "unrelated".into() }]),
            created: StdMutex::new(vec![]),
            updated: StdMutex::new(vec![]),
        };
        let derived = derive_labels(&[list("jdk-dev", "jdk-dev@openjdk.test")]);
        sync_labels(&forge, "openjdk/jdk", &derived).await.unwrap();
        assert_eq!(forge.labels.lock().unwrap().iter().find(|l| l.name == "bug").unwrap().description, "unrelated");
    }

    #[tokio::test]
    async fn matching_label_is_left_alone() {
        let forge = FakeForge {
            labels: StdMutex::new(vec![RepoLabel { name: "jdk-dev".into(), description: "jdk-dev@openjdk.test".into() }]),
            created: StdMutex::new(vec![]),
            updated: StdMutex::new(vec![]),
        };
        let derived = derive_labels(&[list("jdk-dev", "jdk-dev@openjdk.test")]);
        sync_labels(&forge, "openjdk/jdk", &derived).await.unwrap();
        assert!(forge.created.lock().unwrap().is_empty());
        assert!(forge.updated.lock().unwrap().is_empty());
    }
}

//! Wires the pure building blocks in this crate into a `Bot`/`WorkItem`
//! pair: one `PrNotifierWorkItem` per open pull request, diffing its
//! lifecycle state and handing integration events to the `IssueNotifier`.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use bridge_core::collaborators::Forge;
use bridge_core::config::NotifierConfig;
use bridge_core::error::BridgeError;
use bridge_core::scheduler::{Bot, WorkItem};
use bridge_core::types::PrId;

use crate::diff::{compute_pull_request_state, diff_state, LifecycleEvent};
use crate::marker::has_temporary_failure_marker;
use crate::notifier::IssueNotifier;
use crate::state_store::{NotifierState, NotifierStateStore};

pub struct PrNotifierWorkItem {
    pub pr_id: PrId,
    pub forge: Arc<dyn Forge>,
    pub state_store: Arc<NotifierStateStore>,
    pub issue_notifier: Arc<IssueNotifier>,
    pub config: Arc<NotifierConfig>,
}

#[async_trait]
impl WorkItem for PrNotifierWorkItem {
    fn label(&self) -> String {
        format!("pr-notifier:{}", self.pr_id)
    }

    fn may_run_concurrently_with(&self, other: &dyn WorkItem) -> bool {
        match other.label().strip_prefix("pr-notifier:") {
            Some(pr) => pr != self.pr_id.to_string(),
            None => true,
        }
    }

    async fn execute(&self, _scratch_path: &str) -> anyhow::Result<Vec<Box<dyn WorkItem>>> {
        let pr = self.forge.fetch_pull_request(&self.pr_id).await.context("pr-notifier: fetch_pull_request")?;

        if has_temporary_failure_marker(&pr.body) {
            info!(pr = %self.pr_id, "pr-notifier: suspended, temporary failure marker present");
            return Ok(vec![]);
        }

        let entity_id = self.pr_id.entity_id();
        let mut state = self.state_store.get(&entity_id).await.unwrap_or_else(|| NotifierState::new(entity_id.clone()));

        let new_state = compute_pull_request_state(&pr, &self.config);
        let events = diff_state(state.last_state.as_ref(), &new_state);

        for event in events {
            match event {
                LifecycleEvent::IntegratedPr(commit_hash) => {
                    self.issue_notifier
                        .on_integrated_pr(&pr, &commit_hash, &new_state.issue_ids, &mut state)
                        .await
                        .context("pr-notifier: on_integrated_pr")?;
                }
                other => {
                    info!(pr = %self.pr_id, event = ?other, "pr-notifier: lifecycle event");
                }
            }
        }

        state.last_state = Some(new_state);
        self.state_store.put(state).await.context("pr-notifier: commit notifier state")?;
        Ok(vec![])
    }
}

pub struct PrNotifierBot {
    pub forge: Arc<dyn Forge>,
    pub state_store: Arc<NotifierStateStore>,
    pub issue_notifier: Arc<IssueNotifier>,
    pub config: Arc<NotifierConfig>,
}

#[async_trait]
impl Bot for PrNotifierBot {
    fn name(&self) -> &str {
        "pr-notifier"
    }

    async fn produce_periodic_items(&self) -> Result<Vec<Box<dyn WorkItem>>, BridgeError> {
        let repos = self.forge.list_repositories().await.map_err(BridgeError::fatal)?;
        let mut items: Vec<Box<dyn WorkItem>> = Vec::new();
        for repo in repos {
            let prs = match self.forge.list_open_pull_requests(&repo).await {
                Ok(prs) => prs,
                Err(e) => return Err(BridgeError::transient(e)),
            };
            for pr_id in prs {
                items.push(Box::new(PrNotifierWorkItem {
                    pr_id,
                    forge: self.forge.clone(),
                    state_store: self.state_store.clone(),
                    issue_notifier: self.issue_notifier.clone(),
                    config: self.config.clone(),
                }));
            }
        }
        Ok(items)
    }
}

//! Wires the pure building blocks in this crate into `Bot`/`WorkItem`
//! implementations: the mail-bridge work item (one per pull request), the
//! archive-reader work item (one per mailing list), and the label-updater
//! work item (one per repository).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use bridge_core::collaborators::{Forge, MailTransport, OutboundMail, VersionControl};
use bridge_core::config::{ArchiveReaderConfig, MailBridgeConfig, MailingListConfig};
use bridge_core::error::BridgeError;
use bridge_core::hash::message_id;
use bridge_core::issue_refs::parse_issue_ids;
use bridge_core::scheduler::{Bot, WorkItem};
use bridge_core::state_store::DurableStateStore;
use bridge_core::types::{ArchiveItem, DurableState, ForgeState, PrId, WebrevKind};

use crate::build::build_conversation;
use crate::footer::{render_footer, WebrevMentions};
use crate::labels::{derive_labels, sync_labels};
use crate::readiness::{self};
use crate::reader;
use crate::thread::{render_mail, RenderContext};
use crate::webrev::{WebrevPublisher, WebrevRenderer};

/// Serializes outbound sends against `min_send_interval_ms`, shared by every
/// mail-bridge work item spawned from the same bot.
pub struct SendGate {
    min_interval_ms: u64,
    last_send: Mutex<Option<std::time::Instant>>,
}

impl SendGate {
    pub fn new(min_interval_ms: u64) -> Self {
        Self { min_interval_ms, last_send: Mutex::new(None) }
    }

    async fn wait_turn(&self) {
        if self.min_interval_ms == 0 {
            return;
        }
        let mut last = self.last_send.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            let min = std::time::Duration::from_millis(self.min_interval_ms);
            if elapsed < min {
                tokio::time::sleep(min - elapsed).await;
            }
        }
        *last = Some(std::time::Instant::now());
    }
}

/// The mailing lists a pull request's current labels route to, by address.
pub fn recipients_for(labels: &BTreeSet<String>, lists: &[MailingListConfig]) -> Vec<String> {
    lists
        .iter()
        .filter(|l| l.label_set.iter().any(|required| labels.contains(required)))
        .map(|l| l.address.clone())
        .collect()
}

pub struct MailBridgeWorkItem {
    pub pr_id: PrId,
    pub forge: Arc<dyn Forge>,
    pub mail: Arc<dyn MailTransport>,
    pub vc: Arc<dyn VersionControl>,
    pub state_store: Arc<DurableStateStore>,
    pub webrev: Arc<WebrevPublisher>,
    pub renderer: Arc<dyn WebrevRenderer>,
    pub config: Arc<MailBridgeConfig>,
    pub mail_domain: String,
    pub send_gate: Arc<SendGate>,
}

#[async_trait]
impl WorkItem for MailBridgeWorkItem {
    fn label(&self) -> String {
        format!("mail-bridge:{}", self.pr_id)
    }

    fn may_run_concurrently_with(&self, other: &dyn WorkItem) -> bool {
        let other_label = other.label();
        if let Some(pr) = other_label.strip_prefix("mail-bridge:") {
            return pr != self.pr_id.to_string();
        }
        if let Some(repo) = other_label.strip_prefix("label-updater:") {
            return repo != self.pr_id.repo;
        }
        true
    }

    async fn execute(&self, _scratch_path: &str) -> anyhow::Result<Vec<Box<dyn WorkItem>>> {
        let pr = self.forge.fetch_pull_request(&self.pr_id).await.context("mail-bridge: fetch_pull_request")?;
        let entity_id = self.pr_id.entity_id();
        let mut durable = self.state_store.get(&entity_id).await.unwrap_or_else(|| DurableState::new(entity_id.clone()));
        let now = Utc::now();

        if readiness::in_cooldown(pr.updated_at, now, self.config.cooldown_seconds) {
            info!(pr = %self.pr_id, "deferring: within cooldown window");
            return Ok(vec![]);
        }

        let was_ready = !durable.head_history.revisions.is_empty();
        if !was_ready {
            if !readiness::ready_conditions_met(&pr, &self.config) {
                return Ok(vec![]);
            }
            durable.head_history.push_if_new(&pr.head_hash, now, false);
        } else if let Some(last) = durable.head_history.revisions.last() {
            if last.head_hash != pr.head_hash {
                let is_rebase = self.vc.commits_between(&pr.id.repo, &last.head_hash, &pr.head_hash).await.is_err();
                durable.head_history.push_if_new(&pr.head_hash, now, is_rebase);
            }
        }

        let revision_commit_counts = self.commit_counts(&pr.id.repo, &durable).await;
        let items = build_conversation(&pr, &durable.head_history, &revision_commit_counts, &self.config);

        let recipients = recipients_for(&pr.labels, &self.config.mailing_lists);
        let issue_ids: Vec<String> = parse_issue_ids(&pr.body);

        for item in &items {
            if durable.item_message_ids.contains_key(item.item_id()) {
                continue;
            }

            let webrev_footer = match item {
                ArchiveItem::PrOpened { head_hash, .. } => {
                    Some(self.publish_revision(&pr, "root", head_hash, 0, WebrevKind::Full, &mut durable).await?)
                }
                ArchiveItem::PrRevised { head_hash, ordinal, is_rebase, .. } => {
                    let kind = if *is_rebase { WebrevKind::Full } else { WebrevKind::Incremental };
                    let base = durable
                        .head_history
                        .revisions
                        .get(ordinal - 1)
                        .map(|r| r.head_hash.clone())
                        .unwrap_or_else(|| pr.base_hash.clone());
                    Some(self.publish_revision(&pr, &base, head_hash, *ordinal as u32, kind, &mut durable).await?)
                }
                _ => None,
            };

            let review_comment_context = match item {
                ArchiveItem::ReviewComment { file, line, head_hash, .. } => {
                    self.vc.read_file_at(&pr.id.repo, head_hash, file).await.ok().flatten().map(|content| {
                        crate::context::render_context(&content, *line, self.config.review_comment_context_lines)
                    })
                }
                _ => None,
            };

            let ctx = RenderContext {
                pr_id: &pr.id,
                repo: &pr.id.repo,
                title: &pr.title,
                items: &items,
                known_message_ids: &durable.item_message_ids,
                mail_domain: &self.mail_domain,
                config: &self.config,
                review_comment_context: review_comment_context.as_deref(),
                recipients: &recipients,
            };
            let mut mail = render_mail(item, &ctx);
            if let Some(footer) = &webrev_footer {
                mail.body = format!("{}\n\n{footer}", mail.body);
            }

            self.send_gate.wait_turn().await;
            self.mail.send(&mail).await.context("mail-bridge: send")?;
            durable.sent_mail_fingerprints.insert(mail.message_id.clone());
            durable.item_message_ids.insert(item.item_id().to_string(), mail.message_id);
        }

        self.maybe_send_state_change(&pr, &mut durable).await?;

        durable.head_revision = pr.head_hash.clone();
        durable.forge_state = pr.state;
        durable.target_branch = pr.target_branch.clone();
        durable.issue_ids = issue_ids.into_iter().collect();
        durable.last_update = now;

        self.state_store.put(durable).await.context("mail-bridge: commit durable state")?;
        Ok(vec![])
    }
}

impl MailBridgeWorkItem {
    /// Commit counts between consecutive recorded revisions, recomputed each
    /// cycle since the count itself isn't persisted (§9: kept simple; a
    /// cache would trade this for a DurableState schema change).
    async fn commit_counts(&self, repo: &str, durable: &DurableState) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        let revisions = &durable.head_history.revisions;
        for (i, rev) in revisions.iter().enumerate().skip(1) {
            let base = &revisions[i - 1].head_hash;
            if let Ok(commits) = self.vc.commits_between(repo, base, &rev.head_hash).await {
                counts.insert(rev.head_hash.clone(), commits.len());
            }
        }
        counts
    }

    async fn publish_revision(
        &self,
        pr: &bridge_core::types::PullRequestRef,
        base_hash: &str,
        head_hash: &str,
        ordinal: u32,
        kind: WebrevKind,
        durable: &mut DurableState,
    ) -> anyhow::Result<String> {
        let files = self.renderer.render(pr, base_hash, head_hash).await.context("mail-bridge: render webrev")?;
        let artifact = self.webrev.generate(&pr.id, base_hash, head_hash, ordinal, kind, &files).await?;

        let range_artifact = if ordinal > 0 && !matches!(kind, WebrevKind::Full) {
            self.webrev.generate(&pr.id, &pr.base_hash, head_hash, ordinal, WebrevKind::Incremental, &files).await.ok()
        } else {
            None
        };

        let mentions = WebrevMentions { latest: &artifact, range_from_zero: range_artifact.as_ref() };
        let issue_ids = parse_issue_ids(&pr.body);
        durable.last_webrev_ordinal = Some(ordinal);
        Ok(render_footer(&pr.id, &self.config, &issue_ids, &mentions))
    }

    /// Any → Closed/Integrated emits a one-off state-change notification,
    /// fingerprinted outside the ArchiveItem chain so it sends exactly once.
    async fn maybe_send_state_change(
        &self,
        pr: &bridge_core::types::PullRequestRef,
        durable: &mut DurableState,
    ) -> anyhow::Result<()> {
        if !matches!(pr.state, ForgeState::Closed | ForgeState::Integrated) {
            return Ok(());
        }
        let synthetic_id = format!("state-change:{:?}", pr.state);
        if durable.item_message_ids.contains_key(&synthetic_id) {
            return Ok(());
        }

        let recipients = recipients_for(&pr.labels, &self.config.mailing_lists);
        let root_subject = crate::subject::rfr_subject(&pr.id.repo, &pr.title, self.config.repo_in_subject);
        let notice = match pr.state {
            ForgeState::Integrated => "This pull request has been integrated.",
            ForgeState::Closed => "This pull request has been closed without being integrated.",
            ForgeState::Open => unreachable!(),
        };

        let mail = OutboundMail {
            message_id: message_id(&pr.id.entity_id(), &synthetic_id, &self.mail_domain),
            in_reply_to: durable.item_message_ids.values().next().cloned(),
            references: vec![],
            subject: crate::subject::reply_subject(&root_subject),
            from: self.config.sender_identity.clone(),
            to: recipients,
            body: notice.to_string(),
            extra_headers: self.config.extra_headers.clone().into_iter().collect(),
        };

        self.send_gate.wait_turn().await;
        self.mail.send(&mail).await.context("mail-bridge: send state-change notification")?;
        durable.sent_mail_fingerprints.insert(mail.message_id.clone());
        durable.item_message_ids.insert(synthetic_id, mail.message_id);
        Ok(())
    }
}

pub struct MailBridgeBot {
    pub forge: Arc<dyn Forge>,
    pub mail: Arc<dyn MailTransport>,
    pub vc: Arc<dyn VersionControl>,
    pub state_store: Arc<DurableStateStore>,
    pub webrev: Arc<WebrevPublisher>,
    pub renderer: Arc<dyn WebrevRenderer>,
    pub config: Arc<MailBridgeConfig>,
    pub mail_domain: String,
    pub send_gate: Arc<SendGate>,
}

#[async_trait]
impl Bot for MailBridgeBot {
    fn name(&self) -> &str {
        "mail-bridge"
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
                items.push(Box::new(MailBridgeWorkItem {
                    pr_id,
                    forge: self.forge.clone(),
                    mail: self.mail.clone(),
                    vc: self.vc.clone(),
                    state_store: self.state_store.clone(),
                    webrev: self.webrev.clone(),
                    renderer: self.renderer.clone(),
                    config: self.config.clone(),
                    mail_domain: self.mail_domain.clone(),
                    send_gate: self.send_gate.clone(),
                }));
            }
        }
        Ok(items)
    }
}

/// One archive-reader pass over a single mailing list (§4.6).
pub struct ArchiveReaderWorkItem {
    pub list: MailingListConfig,
    pub forge: Arc<dyn Forge>,
    pub mail: Arc<dyn MailTransport>,
    pub state_store: Arc<DurableStateStore>,
    pub config: Arc<ArchiveReaderConfig>,
}

#[async_trait]
impl WorkItem for ArchiveReaderWorkItem {
    fn label(&self) -> String {
        format!("archive-reader:{}", self.list.address)
    }

    fn may_run_concurrently_with(&self, other: &dyn WorkItem) -> bool {
        match other.label().strip_prefix("archive-reader:") {
            Some(address) => address != self.list.address,
            None => true,
        }
    }

    async fn execute(&self, _scratch_path: &str) -> anyhow::Result<Vec<Box<dyn WorkItem>>> {
        let conversations = self
            .mail
            .list_conversations(&self.list.address, self.config.lookback_window_seconds)
            .await
            .context("archive-reader: list_conversations")?;

        for conversation in conversations {
            if !reader::is_rfr_subject(&conversation.root.subject) {
                continue;
            }
            let Some(in_reply_to) = conversation.root.in_reply_to.clone().or(Some(conversation.root.message_id.clone())) else {
                continue;
            };
            let Some(pr_id) = self.resolve_pr(&in_reply_to).await else { continue };

            let durable = self.state_store.get(&pr_id.entity_id()).await;
            let Some(mut durable) = durable else { continue };

            let already_bridged: BTreeSet<String> = durable
                .item_message_ids
                .values()
                .flat_map(|_| std::iter::empty::<String>())
                .collect();
            let unbridged = reader::unbridged_replies(&conversation, &durable.sent_mail_fingerprints, &already_bridged);

            for reply in unbridged {
                let rendered = reader::render_reply(&self.list.address, reply, &self.config);
                self.forge.post_comment(&pr_id, &rendered.body).await.context("archive-reader: post_comment")?;
                durable.sent_mail_fingerprints.insert(reply.message_id.clone());
            }
            self.state_store.put(durable).await.context("archive-reader: commit durable state")?;
        }

        Ok(vec![])
    }
}

impl ArchiveReaderWorkItem {
    /// §4.6 step 2: resolve a conversation to a pull request by looking its
    /// root Message-ID up across every durable-state record's sent
    /// fingerprints.
    async fn resolve_pr(&self, root_message_id: &str) -> Option<PrId> {
        let records = self.state_store.current().await;
        records
            .into_iter()
            .find(|(_, record)| record.sent_mail_fingerprints.contains(root_message_id))
            .and_then(|(entity_id, _)| {
                let (repo, number) = entity_id.rsplit_once('#')?;
                Some(PrId::new(repo, number.parse().ok()?))
            })
    }
}

pub struct ArchiveReaderBot {
    pub lists: Vec<MailingListConfig>,
    pub forge: Arc<dyn Forge>,
    pub mail: Arc<dyn MailTransport>,
    pub state_store: Arc<DurableStateStore>,
    pub config: Arc<ArchiveReaderConfig>,
}

#[async_trait]
impl Bot for ArchiveReaderBot {
    fn name(&self) -> &str {
        "archive-reader"
    }

    async fn produce_periodic_items(&self) -> Result<Vec<Box<dyn WorkItem>>, BridgeError> {
        Ok(self
            .lists
            .iter()
            .map(|list| {
                Box::new(ArchiveReaderWorkItem {
                    list: list.clone(),
                    forge: self.forge.clone(),
                    mail: self.mail.clone(),
                    state_store: self.state_store.clone(),
                    config: self.config.clone(),
                }) as Box<dyn WorkItem>
            })
            .collect())
    }
}

/// §4.8: ensures one repository's forge labels match the derived set.
pub struct LabelUpdaterWorkItem {
    pub repo: String,
    pub forge: Arc<dyn Forge>,
    pub lists: Vec<MailingListConfig>,
}

#[async_trait]
impl WorkItem for LabelUpdaterWorkItem {
    fn label(&self) -> String {
        format!("label-updater:{}", self.repo)
    }

    fn may_run_concurrently_with(&self, other: &dyn WorkItem) -> bool {
        let other_label = other.label();
        if let Some(repo) = other_label.strip_prefix("label-updater:") {
            return repo != self.repo;
        }
        if let Some(pr) = other_label.strip_prefix("mail-bridge:") {
            return !pr.starts_with(&format!("{}#", self.repo));
        }
        true
    }

    async fn execute(&self, _scratch_path: &str) -> anyhow::Result<Vec<Box<dyn WorkItem>>> {
        let derived = derive_labels(&self.lists);
        sync_labels(self.forge.as_ref(), &self.repo, &derived).await?;
        Ok(vec![])
    }
}

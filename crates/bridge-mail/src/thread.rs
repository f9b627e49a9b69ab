//! Mail synthesis: turns one `ArchiveItem` into a fully-addressed
//! `OutboundMail` with deterministic threading headers (§4.4).

use std::collections::BTreeMap;

use bridge_core::collaborators::OutboundMail;
use bridge_core::config::MailBridgeConfig;
use bridge_core::hash::message_id;
use bridge_core::markdown::markdown_to_text;
use bridge_core::types::{ArchiveItem, PrId, ReviewVerdict};

use crate::subject::{reply_subject, rfr_subject, verdict_subject};

/// Everything a render pass needs beyond the item itself.
pub struct RenderContext<'a> {
    pub pr_id: &'a PrId,
    pub repo: &'a str,
    pub title: &'a str,
    /// The full, currently-built conversation, used to walk parent chains
    /// for the `References` header.
    pub items: &'a [ArchiveItem],
    /// Message-IDs of already-materialized items, keyed by item-id.
    pub known_message_ids: &'a BTreeMap<String, String>,
    pub mail_domain: &'a str,
    pub config: &'a MailBridgeConfig,
    /// Rendered file context for review comments, already fetched by the
    /// caller (async VC read).
    pub review_comment_context: Option<&'a str>,
    pub recipients: &'a [String],
}

/// Render one archive item into a ready-to-send mail. The Message-ID is a
/// deterministic hash of `(pr-entity-id, item-id)` so re-runs and the
/// inbound reader agree on it without any shared mutable counter.
pub fn render_mail(item: &ArchiveItem, ctx: &RenderContext<'_>) -> OutboundMail {
    let entity_id = ctx.pr_id.entity_id();
    let this_message_id = message_id(&entity_id, item.item_id(), ctx.mail_domain);

    let root_subject = rfr_subject(ctx.repo, ctx.title, ctx.config.repo_in_subject);

    let (subject, in_reply_to, references) = match item {
        ArchiveItem::PrOpened { .. } => (root_subject, None, vec![]),
        ArchiveItem::PrRevised { .. } => {
            let refs = references_chain(item, ctx);
            (root_subject, refs.last().cloned(), refs)
        }
        ArchiveItem::Review { verdict, .. } => {
            let refs = references_chain(item, ctx);
            (verdict_subject(&root_subject, *verdict), refs.last().cloned(), refs)
        }
        ArchiveItem::Verdict { .. } => {
            let refs = references_chain(item, ctx);
            (verdict_subject(&root_subject, ReviewVerdict::Comment), refs.last().cloned(), refs)
        }
        _ => {
            let refs = references_chain(item, ctx);
            (reply_subject(&root_subject), refs.last().cloned(), refs)
        }
    };

    let body = render_body(item, ctx);

    OutboundMail {
        message_id: this_message_id,
        in_reply_to,
        references,
        subject,
        from: ctx.config.sender_identity.clone(),
        to: ctx.recipients.to_vec(),
        body,
        extra_headers: ctx.config.extra_headers.clone().into_iter().collect(),
    }
}

/// Walk the parent chain back to the root via `ctx.items`, looking up each
/// ancestor's Message-ID, to build the `References` header (oldest first).
fn references_chain(item: &ArchiveItem, ctx: &RenderContext<'_>) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current_id = item.parent_item_id().map(str::to_string);
    let mut seen = std::collections::HashSet::new();

    while let Some(id) = current_id {
        if !seen.insert(id.clone()) {
            break; // defensive: parent resolution is backward-only, this shouldn't happen
        }
        let Some(message_id) = ctx.known_message_ids.get(&id) else { break };
        chain.push(message_id.clone());
        current_id = ctx
            .items
            .iter()
            .find(|i| i.item_id() == id)
            .and_then(|i| i.parent_item_id())
            .map(str::to_string);
    }

    chain.reverse();
    chain
}

fn render_body(item: &ArchiveItem, ctx: &RenderContext<'_>) -> String {
    let mut body = String::new();

    if let Some(parent_id) = item.parent_item_id() {
        if let Some(parent) = ctx.items.iter().find(|i| i.item_id() == parent_id) {
            body.push_str(&quote(&markdown_to_text(&parent.rendered_body())));
            body.push_str("\n\n");
        }
    }

    match item {
        ArchiveItem::PrOpened { body: b, .. } | ArchiveItem::PrRevised { body: b, .. } => {
            body.push_str(&markdown_to_text(b));
        }
        ArchiveItem::Comment { body: b, .. } => {
            body.push_str(&markdown_to_text(b));
        }
        ArchiveItem::Review { body: b, .. } | ArchiveItem::Verdict { body: b, .. } => {
            body.push_str(&markdown_to_text(b));
        }
        ArchiveItem::ReviewComment { bodies, file, line, .. } => {
            body.push_str(&format!("{file} line {line}\n"));
            if let Some(context) = ctx.review_comment_context {
                body.push_str(context);
                body.push('\n');
            }
            for (i, b) in bodies.iter().enumerate() {
                if i > 0 {
                    body.push_str("\n\n");
                }
                body.push_str(&markdown_to_text(b));
            }
        }
    }

    body
}

/// Prepend `> ` to every line of `parent_body`, for quoting in a reply.
pub fn quote(parent_body: &str) -> String {
    parent_body.lines().map(|l| format!("> {l}")).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::types::ForgeState;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn config() -> MailBridgeConfig {
        MailBridgeConfig {
            sender_identity: "bridge@mail.test".into(),
            mailing_lists: vec![],
            ignored_authors: vec![],
            ignored_comment_patterns: vec![],
            hidden_marker_prefix: String::new(),
            extra_headers: Default::default(),
            issue_tracker_url_base: "http://issues.test/browse/".into(),
            forge_url_base: "http://forge.test/openjdk/jdk".into(),
            cooldown_seconds: 0,
            combine_review_comment_window_seconds: 60,
            repo_in_subject: false,
            ready_labels: vec!["rfr".into()],
            ready_comment_patterns: vec![],
            review_comment_context_lines: 3,
            min_send_interval_ms: 0,
        }
    }

    fn opened(id: &str) -> ArchiveItem {
        ArchiveItem::PrOpened {
            item_id: id.into(),
            author: "alice".into(),
            timestamp: Utc::now(),
            body: "This should now be ready".into(),
            head_hash: "abc123".into(),
        }
    }

    #[test]
    fn same_pr_and_item_id_yield_same_message_id_every_render() {
        let pr_id = PrId::new("openjdk/jdk", 1234);
        let cfg = config();
        let known = BTreeMap::new();
        let item = opened("pr-opened");
        let items = vec![item.clone()];
        let ctx = RenderContext {
            pr_id: &pr_id,
            repo: "openjdk/jdk",
            title: "1234: Fix foo",
            items: &items,
            known_message_ids: &known,
            mail_domain: "mail.test",
            config: &cfg,
            review_comment_context: None,
            recipients: &[],
        };
        let a = render_mail(&item, &ctx);
        let b = render_mail(&item, &ctx);
        assert_eq!(a.message_id, b.message_id);
    }

    #[test]
    fn root_mail_has_no_in_reply_to() {
        let pr_id = PrId::new("openjdk/jdk", 1234);
        let cfg = config();
        let known = BTreeMap::new();
        let item = opened("pr-opened");
        let items = vec![item.clone()];
        let ctx = RenderContext {
            pr_id: &pr_id,
            repo: "openjdk/jdk",
            title: "1234: Fix foo",
            items: &items,
            known_message_ids: &known,
            mail_domain: "mail.test",
            config: &cfg,
            review_comment_context: None,
            recipients: &[],
        };
        let mail = render_mail(&item, &ctx);
        assert_eq!(mail.subject, "RFR: 1234: Fix foo");
        assert!(mail.in_reply_to.is_none());
    }

    #[test]
    fn verdict_reply_has_approved_subject_and_quotes_parent() {
        let pr_id = PrId::new("openjdk/jdk", 1234);
        let cfg = config();
        let mut known = BTreeMap::new();
        known.insert("pr-opened".to_string(), "<root@mail.test>".to_string());
        let root = opened("pr-opened");
        let review = ArchiveItem::Review {
            item_id: "rv1".into(),
            author: "reviewer1".into(),
            role: "Reviewer".into(),
            timestamp: Utc::now(),
            body: "Looks good".into(),
            verdict: ReviewVerdict::Approve,
            parent_item_id: Some("pr-opened".into()),
        };
        let items = vec![root, review.clone()];
        let ctx = RenderContext {
            pr_id: &pr_id,
            repo: "openjdk/jdk",
            title: "1234: Fix foo",
            items: &items,
            known_message_ids: &known,
            mail_domain: "mail.test",
            config: &cfg,
            review_comment_context: None,
            recipients: &[],
        };
        let mail = render_mail(&review, &ctx);
        assert_eq!(mail.subject, "[Approved] Re: RFR: 1234: Fix foo");
        assert_eq!(mail.in_reply_to, Some("<root@mail.test>".to_string()));
        assert!(mail.body.contains("> This should now be ready"));
        assert!(mail.body.contains("Looks good"));
    }

    #[test]
    fn quote_prefixes_every_line() {
        let q = quote("line one\nline two");
        assert_eq!(q, "> line one\n> line two");
    }

    #[test]
    fn combined_review_comment_body_contains_all_sub_bodies_in_order() {
        let root = opened("pr-opened");
        let item = ArchiveItem::ReviewComment {
            item_id: "rc1".into(),
            author: "reviewer1".into(),
            timestamp: Utc::now(),
            bodies: vec!["Review comment".into(), "Another review comment".into()],
            file: "src/foo.rs".into(),
            line: 42,
            base_hash: "base".into(),
            head_hash: "head".into(),
            parent_item_id: Some("pr-opened".into()),
        };
        let pr_id = PrId::new("openjdk/jdk", 1234);
        let cfg = config();
        let mut known = BTreeMap::new();
        known.insert("pr-opened".to_string(), "<root@mail.test>".to_string());
        let items = vec![root, item.clone()];
        let ctx = RenderContext {
            pr_id: &pr_id,
            repo: "openjdk/jdk",
            title: "1234: Fix foo",
            items: &items,
            known_message_ids: &known,
            mail_domain: "mail.test",
            config: &cfg,
            review_comment_context: None,
            recipients: &[],
        };
        let mail = render_mail(&item, &ctx);
        assert!(mail.body.contains("Review comment"));
        assert!(mail.body.contains("Another review comment"));
        assert!(mail.body.contains("src/foo.rs"));
        let _ = ForgeState::Open;
    }
}

//! Builds the full archive-item sequence for a pull request (§4.3).
//!
//! Reconstructed from scratch on every call from the forge snapshot plus the
//! bridge's own head-revision history, so recomputing always yields the same
//! item-ids (§3 invariant ii) and the idempotence property in §8 holds.

use std::collections::{BTreeMap, HashMap};

use bridge_core::archive::{self, PendingItem};
use bridge_core::config::MailBridgeConfig;
use bridge_core::types::{
    ArchiveItem, ForgeReviewComment, HeadHistory, PullRequestRef, ReviewVerdict,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static HTML_COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

/// Strip HTML comment markers and anything below a configured hidden-marker
/// line, then trim. Returns `None` if the remaining body is empty or matches
/// an ignored-comment pattern (§4.3 item 2).
fn filter_comment_body(body: &str, config: &MailBridgeConfig) -> Option<String> {
    let mut cleaned = HTML_COMMENT_RE.replace_all(body, "").into_owned();

    if !config.hidden_marker_prefix.is_empty() {
        if let Some(idx) = cleaned.find(&config.hidden_marker_prefix) {
            cleaned.truncate(idx);
        }
    }

    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        return None;
    }

    for pattern in &config.ignored_comment_patterns {
        if let Ok(re) = Regex::new(pattern) {
            if re.is_match(&cleaned) {
                return None;
            }
        }
    }

    Some(cleaned)
}

/// One chronologically-ordered event feeding into the conversation build.
enum Event<'a> {
    Revised { ordinal: usize, head_hash: &'a str, observed_at: DateTime<Utc>, is_rebase: bool },
    Comment { id: &'a str, author: &'a str, body: String, in_reply_to: Option<&'a str>, at: DateTime<Utc> },
    ReviewCommentGroup { members: Vec<&'a ForgeReviewComment>, at: DateTime<Utc> },
    Review { id: &'a str, author: &'a str, role: &'a str, body: &'a str, verdict: ReviewVerdict, at: DateTime<Utc> },
}

fn event_time(e: &Event<'_>) -> DateTime<Utc> {
    match e {
        Event::Revised { observed_at, .. } => *observed_at,
        Event::Comment { at, .. } => *at,
        Event::ReviewCommentGroup { at, .. } => *at,
        Event::Review { at, .. } => *at,
    }
}

/// Group review comments on the same `(file, line, author, base_hash,
/// head_hash)` that land within `archive::COMBINE_WINDOW_SECONDS` of one
/// another (§4.3 item 3).
fn group_review_comments(comments: &[ForgeReviewComment]) -> Vec<Vec<&ForgeReviewComment>> {
    let mut by_key: BTreeMap<(&str, u32, &str, &str, &str), Vec<&ForgeReviewComment>> = BTreeMap::new();
    for c in comments {
        let key = (c.file.as_str(), c.line, c.author.as_str(), c.base_hash.as_str(), c.head_hash.as_str());
        by_key.entry(key).or_default().push(c);
    }

    let mut groups = Vec::new();
    for mut members in by_key.into_values() {
        members.sort_by_key(|c| c.created_at);
        let mut current: Vec<&ForgeReviewComment> = Vec::new();
        for member in members {
            if let Some(last) = current.last() {
                let gap = (member.created_at - last.created_at).num_seconds();
                if !archive::within_combine_window(gap) {
                    groups.push(std::mem::take(&mut current));
                }
            }
            current.push(member);
        }
        if !current.is_empty() {
            groups.push(current);
        }
    }
    groups
}

/// Build the complete, ordered archive-item sequence for `pr`.
///
/// `revision_commit_counts` maps each non-initial head-hash in
/// `head_history` to the number of new commits it introduced (computed by
/// the caller via `VersionControl::commits_between`, since that call is
/// async and this function stays pure).
pub fn build_conversation(
    pr: &PullRequestRef,
    head_history: &HeadHistory,
    revision_commit_counts: &BTreeMap<String, usize>,
    config: &MailBridgeConfig,
) -> Vec<ArchiveItem> {
    let mut events: Vec<Event<'_>> = Vec::new();

    for (ordinal, rev) in head_history.revisions.iter().enumerate().skip(1) {
        events.push(Event::Revised {
            ordinal,
            head_hash: &rev.head_hash,
            observed_at: rev.observed_at,
            is_rebase: rev.is_rebase,
        });
    }

    for comment in &pr.comments {
        if config.ignored_authors.iter().any(|a| a.eq_ignore_ascii_case(&comment.author)) {
            continue;
        }
        let Some(body) = filter_comment_body(&comment.body, config) else { continue };
        events.push(Event::Comment {
            id: &comment.id,
            author: &comment.author,
            body,
            in_reply_to: comment.in_reply_to.as_deref(),
            at: comment.created_at,
        });
    }

    for group in group_review_comments(&pr.review_comments) {
        let at = group.last().expect("non-empty group").created_at;
        events.push(Event::ReviewCommentGroup { members: group, at });
    }

    for review in &pr.reviews {
        events.push(Event::Review {
            id: &review.id,
            author: &review.author,
            role: &review.role,
            body: &review.body,
            verdict: review.verdict,
            at: review.created_at,
        });
    }

    events.sort_by_key(event_time);

    let mut items: Vec<ArchiveItem> = Vec::new();
    // Maps a forge-side source id (comment id, review-comment id) to the
    // item-id that now represents it, so direct-reply resolution and
    // combined review-comment sub-ids both work.
    let mut source_to_item: HashMap<String, String> = HashMap::new();

    let opened_item_id = archive::derive_item_id("pr-opened", &pr.id.entity_id());
    let opened_at = head_history
        .revisions
        .first()
        .map(|r| r.observed_at)
        .unwrap_or(pr.created_at);
    let opened_head = head_history
        .revisions
        .first()
        .map(|r| r.head_hash.clone())
        .unwrap_or_else(|| pr.head_hash.clone());
    items.push(ArchiveItem::PrOpened {
        item_id: opened_item_id,
        author: pr.author.clone(),
        timestamp: opened_at,
        body: pr.body.clone(),
        head_hash: opened_head,
    });

    for event in events {
        match event {
            Event::Revised { ordinal, head_hash, observed_at, is_rebase } => {
                let item_id = archive::derive_item_id("pr-revised", head_hash);
                let count = revision_commit_counts.get(head_hash).copied().unwrap_or(0);
                let plural = if count == 1 { "" } else { "s" };
                let body = if is_rebase {
                    "Rebased to a new target base.".to_string()
                } else {
                    format!("{count} additional commit{plural}")
                };
                items.push(ArchiveItem::PrRevised {
                    item_id,
                    author: pr.author.clone(),
                    timestamp: observed_at,
                    body,
                    head_hash: head_hash.to_string(),
                    ordinal,
                    is_rebase,
                });
            }
            Event::Comment { id, author, body, in_reply_to, at } => {
                let direct = in_reply_to.and_then(|src| source_to_item.get(src).map(String::as_str));
                let pending = PendingItem { body: &body, author, direct_reply_to: direct };
                let parent = archive::resolve_parent(&pending, &items);
                let item_id = archive::derive_item_id("comment", id);
                items.push(ArchiveItem::Comment {
                    item_id: item_id.clone(),
                    author: author.to_string(),
                    timestamp: at,
                    body,
                    parent_item_id: parent,
                });
                source_to_item.insert(id.to_string(), item_id);
            }
            Event::ReviewCommentGroup { members, at } => {
                let first = members[0];
                let direct = first
                    .in_reply_to
                    .as_deref()
                    .and_then(|src| source_to_item.get(src).map(String::as_str));
                let pending = PendingItem { body: &first.body, author: &first.author, direct_reply_to: direct };
                let parent = archive::resolve_parent(&pending, &items);
                let item_id = archive::derive_item_id("review-comment", &first.id);
                let bodies: Vec<String> = members.iter().map(|m| m.body.clone()).collect();
                items.push(ArchiveItem::ReviewComment {
                    item_id: item_id.clone(),
                    author: first.author.clone(),
                    timestamp: at,
                    bodies,
                    file: first.file.clone(),
                    line: first.line,
                    base_hash: first.base_hash.clone(),
                    head_hash: first.head_hash.clone(),
                    parent_item_id: parent,
                });
                for member in &members {
                    source_to_item.insert(member.id.clone(), item_id.clone());
                }
            }
            Event::Review { id, author, role, body, verdict, at } => {
                let pending = PendingItem { body, author, direct_reply_to: None };
                let parent = archive::resolve_parent(&pending, &items);
                let rendered_body = if body.trim().is_empty() {
                    format!("Marked as reviewed by {author} ({role})")
                } else {
                    body.to_string()
                };
                let item_id = archive::derive_item_id("review", id);
                items.push(ArchiveItem::Review {
                    item_id: item_id.clone(),
                    author: author.to_string(),
                    role: role.to_string(),
                    timestamp: at,
                    body: rendered_body,
                    verdict,
                    parent_item_id: parent,
                });
                source_to_item.insert(id.to_string(), item_id);
            }
        }
    }

    items
}

//! Archive-Item Model & Parent Resolution (§4.3).

use crate::markdown::{mentions, quotes_line};
use crate::types::ArchiveItem;

/// A candidate item not yet assigned a parent, together with whether it is
/// itself a direct forge reply (review-comment reply, comment edit reply)
/// and, if so, the item-id it directly replies to.
pub struct PendingItem<'a> {
    pub body: &'a str,
    pub author: &'a str,
    pub direct_reply_to: Option<&'a str>,
}

/// Resolve the parent item-id for `pending` against `existing`, which must
/// be ordered oldest-first (so "newest-first" scans iterate it in reverse).
/// Returns `None` only when `existing` is empty (the caller is itself the
/// PR-Opened item).
pub fn resolve_parent(pending: &PendingItem<'_>, existing: &[ArchiveItem]) -> Option<String> {
    // Step 1: direct forge reply.
    if let Some(target) = pending.direct_reply_to {
        if existing.iter().any(|i| i.item_id() == target) {
            return Some(target.to_string());
        }
    }

    // Step 2: quoted first line of a prior item, scanned newest-first so
    // ties favor the more recent item.
    for item in existing.iter().rev() {
        if let Some(first_line) = item.first_nonempty_line() {
            if quotes_line(pending.body, &first_line) {
                return Some(item.item_id().to_string());
            }
        }
    }

    // Step 3: @mention of a prior author, most recent matching item wins.
    let mentioned: Vec<String> = mentions(pending.body);
    if !mentioned.is_empty() {
        for item in existing.iter().rev() {
            if mentioned.iter().any(|m| m == &item.author().to_lowercase()) {
                return Some(item.item_id().to_string());
            }
        }
    }

    // Step 4: fall back to the PR-Opened item, or the latest PR-Revised.
    fallback_root(existing)
}

/// PR-Opened, or the latest PR-Revised if any revisions have landed.
fn fallback_root(existing: &[ArchiveItem]) -> Option<String> {
    existing
        .iter()
        .rev()
        .find(|i| matches!(i, ArchiveItem::PrRevised { .. } | ArchiveItem::PrOpened { .. }))
        .map(|i| i.item_id().to_string())
}

/// Deterministic item-id for a forge-sourced item: `<kind>:<source-id>`.
/// Recomputing from the same source always yields the same id (§3 invariant ii).
pub fn derive_item_id(kind: &str, source_id: &str) -> String {
    format!("{kind}:{source_id}")
}

/// §4.3 item 3: whether two review comments on the same (file, line, author,
/// base-hash, head-hash) posted `gap_seconds` apart should combine into one
/// item. The bridge documents a one-minute window (§9 open question).
pub const COMBINE_WINDOW_SECONDS: i64 = 60;

pub fn within_combine_window(gap_seconds: i64) -> bool {
    gap_seconds.abs() < COMBINE_WINDOW_SECONDS
}

//! Backport resolution (§4.7 steps 1-3): following `backport-of`/
//! `backported-by` links to the canonical primary, collecting its backport
//! family, and matching a requested fix-version against that family by the
//! exact/pool-or-open/scratch precedence.

use bridge_core::collaborators::{IssueTracker, NewIssueProps};
use bridge_core::jdkversion::is_scratch_version;
use bridge_core::types::{IssueLinkKind, IssueRef};

/// Bound on `backport-of` chain traversal; a well-formed tracker never
/// nests this deep, but a cyclic or dangling link must not hang the bot.
const MAX_LINK_HOPS: usize = 32;

/// §4.7 step 1: follow `backport-of` links until a primary issue type is
/// reached.
pub async fn resolve_primary(tracker: &dyn IssueTracker, issue: IssueRef) -> anyhow::Result<IssueRef> {
    let mut current = issue;
    for _ in 0..MAX_LINK_HOPS {
        if current.issue_type.is_primary() {
            return Ok(current);
        }
        let parent_id = current
            .backport_of()
            .ok_or_else(|| anyhow::anyhow!("backport {} has no backport-of link to a primary", current.id))?
            .to_string();
        current = tracker.fetch_issue(&parent_id).await?;
    }
    anyhow::bail!("backport-of chain for {} exceeded {MAX_LINK_HOPS} hops", current.id)
}

/// The primary plus every issue it links to as `backported-by`.
pub async fn collect_family(tracker: &dyn IssueTracker, primary: &IssueRef) -> anyhow::Result<Vec<IssueRef>> {
    let mut family = vec![primary.clone()];
    for link in &primary.links {
        if link.kind == IssueLinkKind::BackportedBy {
            family.push(tracker.fetch_issue(&link.target_id).await?);
        }
    }
    Ok(family)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchTier {
    Exact,
    PoolOrOpen,
    Scratch,
}

fn classify(issue: &IssueRef, requested: &str, requested_feature: u32) -> Option<MatchTier> {
    match issue.fix_versions.as_slice() {
        [] => Some(MatchTier::Scratch),
        [only] if is_scratch_version(only) => Some(MatchTier::Scratch),
        [only] if only == requested => Some(MatchTier::Exact),
        [only, ..] => {
            let lower = only.to_lowercase();
            if lower == format!("{requested_feature}-pool") || lower == format!("{requested_feature}-open") {
                Some(MatchTier::PoolOrOpen)
            } else {
                None
            }
        }
    }
}

/// §4.7 step 3's three-tier precedence. Ties within a tier favor the
/// earlier entry in `family` (§8).
pub fn find_matching_issue<'a>(family: &'a [IssueRef], requested: &str, requested_feature: u32) -> Option<&'a IssueRef> {
    for tier in [MatchTier::Exact, MatchTier::PoolOrOpen, MatchTier::Scratch] {
        if let Some(found) = family.iter().find(|i| classify(i, requested, requested_feature) == Some(tier)) {
            return Some(found);
        }
    }
    None
}

/// §4.7 step 3's "create a new backport by copying the primary": issue-type
/// overridden to Backport, fix-versions replaced, resolved-in-build cleared,
/// security level inherited.
pub fn new_backport_props(primary: &IssueRef, requested_version: &str) -> NewIssueProps {
    NewIssueProps {
        summary: format!("Backport {} to {requested_version}", primary.id),
        issue_type: "Backport".to_string(),
        fix_versions: vec![requested_version.to_string()],
        security_level: primary.security_level.clone(),
        backport_of: Some(primary.id.clone()),
    }
}

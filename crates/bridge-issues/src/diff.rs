//! Pull-Request Notifier (§4.7, first half): computes a `PullRequestState`
//! snapshot and diffs it against the last stored one, producing the ordered
//! lifecycle callbacks listeners fan out on.

use bridge_core::config::NotifierConfig;
use bridge_core::issue_refs::parse_issue_ids;
use bridge_core::types::{ForgeState, PullRequestRef, PullRequestState};

use crate::integration::extract_integrated_commit;

/// `compute_pull_request_state`: the notifier's view of a pull request,
/// built fresh from the forge snapshot on every tick.
pub fn compute_pull_request_state(pr: &PullRequestRef, config: &NotifierConfig) -> PullRequestState {
    PullRequestState {
        pr_id: pr.id.clone(),
        issue_ids: parse_issue_ids(&pr.body).into_iter().collect(),
        integrated_commit: extract_integrated_commit(pr, &config.integrator_identity),
        head: pr.head_hash.clone(),
        state: pr.state,
        target_branch: pr.target_branch.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    NewPr,
    NewIssue(String),
    RemovedIssue(String),
    HeadChange(String),
    StateChange(ForgeState),
    TargetBranchChange(String),
    IntegratedPr(String),
}

/// Diffs `old` (the last stored state, absent on a never-seen PR) against
/// `new`, in the callback order §4.7 names: new-pr, new-issue, removed-issue,
/// head-change, state-change, target-branch-change, integrated-pr.
pub fn diff_state(old: Option<&PullRequestState>, new: &PullRequestState) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();

    let Some(old) = old else {
        events.push(LifecycleEvent::NewPr);
        events.extend(new.issue_ids.iter().cloned().map(LifecycleEvent::NewIssue));
        if let Some(commit) = &new.integrated_commit {
            events.push(LifecycleEvent::IntegratedPr(commit.clone()));
        }
        return events;
    };

    events.extend(new.issue_ids.difference(&old.issue_ids).cloned().map(LifecycleEvent::NewIssue));
    events.extend(old.issue_ids.difference(&new.issue_ids).cloned().map(LifecycleEvent::RemovedIssue));
    if old.head != new.head {
        events.push(LifecycleEvent::HeadChange(old.head.clone()));
    }
    if old.state != new.state {
        events.push(LifecycleEvent::StateChange(old.state));
    }
    if old.target_branch != new.target_branch {
        events.push(LifecycleEvent::TargetBranchChange(old.target_branch.clone()));
    }
    if let Some(commit) = &new.integrated_commit {
        if old.integrated_commit.as_deref() != Some(commit.as_str()) {
            events.push(LifecycleEvent::IntegratedPr(commit.clone()));
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::types::PrId;
    use std::collections::BTreeSet;

    fn state(issue_ids: &[&str], head: &str, pr_state: ForgeState, branch: &str, integrated: Option<&str>) -> PullRequestState {
        PullRequestState {
            pr_id: PrId::new("openjdk/jdk", 1234),
            issue_ids: issue_ids.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            integrated_commit: integrated.map(String::from),
            head: head.into(),
            state: pr_state,
            target_branch: branch.into(),
        }
    }

    #[test]
    fn never_seen_pr_emits_new_pr_and_new_issues() {
        let new = state(&["TSTPRJ-1", "TSTPRJ-2"], "abc", ForgeState::Open, "master", None);
        let events = diff_state(None, &new);
        assert_eq!(events[0], LifecycleEvent::NewPr);
        assert!(events.contains(&LifecycleEvent::NewIssue("TSTPRJ-1".into())));
        assert!(events.contains(&LifecycleEvent::NewIssue("TSTPRJ-2".into())));
    }

    #[test]
    fn unchanged_state_emits_nothing() {
        let s = state(&["TSTPRJ-1"], "abc", ForgeState::Open, "master", None);
        assert!(diff_state(Some(&s), &s).is_empty());
    }

    #[test]
    fn added_and_removed_issues_are_both_reported() {
        let old = state(&["TSTPRJ-1"], "abc", ForgeState::Open, "master", None);
        let new = state(&["TSTPRJ-2"], "abc", ForgeState::Open, "master", None);
        let events = diff_state(Some(&old), &new);
        assert!(events.contains(&LifecycleEvent::NewIssue("TSTPRJ-2".into())));
        assert!(events.contains(&LifecycleEvent::RemovedIssue("TSTPRJ-1".into())));
    }

    #[test]
    fn head_change_reports_old_head() {
        let old = state(&[], "abc", ForgeState::Open, "master", None);
        let new = state(&[], "def", ForgeState::Open, "master", None);
        assert_eq!(diff_state(Some(&old), &new), vec![LifecycleEvent::HeadChange("abc".into())]);
    }

    #[test]
    fn state_change_reports_old_state() {
        let old = state(&[], "abc", ForgeState::Open, "master", None);
        let new = state(&[], "abc", ForgeState::Closed, "master", None);
        assert_eq!(diff_state(Some(&old), &new), vec![LifecycleEvent::StateChange(ForgeState::Open)]);
    }

    #[test]
    fn integration_is_reported_once_then_stays_quiet() {
        let hash = "c".repeat(40);
        let old = state(&[], "abc", ForgeState::Open, "master", None);
        let integrated = state(&[], "abc", ForgeState::Integrated, "master", Some(&hash));
        let events = diff_state(Some(&old), &integrated);
        assert!(events.contains(&LifecycleEvent::IntegratedPr(hash.clone())));

        // Re-running with the same stored state as `integrated` now: no repeat.
        let events_again = diff_state(Some(&integrated), &integrated);
        assert!(!events_again.iter().any(|e| matches!(e, LifecycleEvent::IntegratedPr(_))));
    }
}

//! Back-pressure signal (§7): a pull request author (or the bridge itself)
//! can park notifier actions for a PR by leaving this marker in its body.

pub const TEMPORARY_ISSUE_FAILURE_MARKER: &str = "TEMPORARY_ISSUE_FAILURE_MARKER";

/// True once the marker appears anywhere in the pull-request body. The
/// notifier suspends every lifecycle action for the PR until it's removed.
pub fn has_temporary_failure_marker(body: &str) -> bool {
    body.contains(TEMPORARY_ISSUE_FAILURE_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_marker_anywhere_in_body() {
        let body = format!("Some description.\n\n{TEMPORARY_ISSUE_FAILURE_MARKER}\n\nMore text.");
        assert!(has_temporary_failure_marker(&body));
    }

    #[test]
    fn absent_marker_is_not_detected() {
        assert!(!has_temporary_failure_marker("Just a normal pull request body."));
    }
}

//! Subject-line conventions (§4.4).

use bridge_core::types::ReviewVerdict;

/// Root subject: `"RFR: " + title`, optionally prefixed with `"<repo>: "`.
pub fn rfr_subject(repo: &str, title: &str, repo_in_subject: bool) -> String {
    if repo_in_subject {
        format!("{repo}: RFR: {title}")
    } else {
        format!("RFR: {title}")
    }
}

/// Conventional reply subject: `"Re: " + root`, idempotent against a
/// subject that is already a reply.
pub fn reply_subject(root_subject: &str) -> String {
    if root_subject.starts_with("Re: ") {
        root_subject.to_string()
    } else {
        format!("Re: {root_subject}")
    }
}

/// Verdict replies are prefixed `"[Approved] "` or `"Changes requested: "`;
/// plain review comments carry no prefix (§4.4).
pub fn verdict_subject(root_subject: &str, verdict: ReviewVerdict) -> String {
    let reply = reply_subject(root_subject);
    match verdict {
        ReviewVerdict::Approve => format!("[Approved] {reply}"),
        ReviewVerdict::RequestChanges => format!("Changes requested: {reply}"),
        ReviewVerdict::Comment => reply,
    }
}

//! Issue-reference parsing shared by the mail bridge (footer "Issue:" lines)
//! and the PR/issue notifier (§4.7): a dedicated "Issue"/"Issues" heading in
//! the pull-request body followed by bullet lines `[<id>](<url>): ...`.

use once_cell::sync::Lazy;
use regex::Regex;

static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^#{0,6}\s*issues?\s*:?\s*$").unwrap());
static BULLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*]\s*\[([^\]]+)\]\(([^)]+)\)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRefLine {
    pub id: String,
    pub url: String,
}

/// The issue-id/url bullets under the first "Issue"/"Issues" heading found
/// in `body`. Parsing stops at the first non-bullet, non-blank line after
/// the heading (the block has ended).
pub fn parse_issue_refs(body: &str) -> Vec<IssueRefLine> {
    let mut out = Vec::new();
    let mut in_block = false;
    for line in body.lines() {
        let trimmed = line.trim();
        if !in_block {
            if HEADING_RE.is_match(trimmed) {
                in_block = true;
            }
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        match BULLET_RE.captures(trimmed) {
            Some(caps) => out.push(IssueRefLine { id: caps[1].to_string(), url: caps[2].to_string() }),
            None => break,
        }
    }
    out
}

pub fn parse_issue_ids(body: &str) -> Vec<String> {
    parse_issue_refs(body).into_iter().map(|r| r.id).collect()
}

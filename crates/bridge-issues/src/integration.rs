//! Integration-commit extraction (§4.7) and the `.jcheck/conf`-style
//! fix-version fallback referenced by "the commit's embedded version
//! configuration".

use once_cell::sync::Lazy;
use regex::Regex;

use bridge_core::types::PullRequestRef;

static PUSHED_AS_COMMIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Pushed as commit ([0-9a-fA-F]{40})\.").unwrap());

/// The 40-hex commit hash from the integrator's "Pushed as commit &lt;hash&gt;."
/// comment, if one has been posted by the configured integrator identity.
pub fn extract_integrated_commit(pr: &PullRequestRef, integrator_identity: &str) -> Option<String> {
    pr.comments
        .iter()
        .filter(|c| c.author == integrator_identity)
        .find_map(|c| PUSHED_AS_COMMIT_RE.captures(&c.body).map(|caps| caps[1].to_string()))
}

/// Parse the `version = <value>` key out of a `.jcheck/conf`-style INI text.
/// Section headers are ignored; the first `version` key found wins.
pub fn parse_conf_version(conf_text: &str) -> Option<String> {
    for line in conf_text.lines() {
        let line = line.trim();
        if line.starts_with('#') || line.starts_with('[') {
            continue;
        }
        let (key, value) = line.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("version") {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

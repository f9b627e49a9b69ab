//! Footer lines appended to PR-Opened/PR-Revised mails (§8 scenario 1/2):
//! `Patch:`, `Changes:`, `Webrev:`, `Issue:`, `Fetch:`.

use bridge_core::config::MailBridgeConfig;
use bridge_core::types::{PrId, WebrevArtifact};

/// One or two webrev mentions: the revision just published, and (for a
/// non-rebase revision after the first) the cumulative range against the
/// initial revision, per §8 scenario 2 ("both `webrev.01` and
/// `webrev.00-01` URLs").
pub struct WebrevMentions<'a> {
    pub latest: &'a WebrevArtifact,
    pub range_from_zero: Option<&'a WebrevArtifact>,
}

pub fn render_footer(
    pr_id: &PrId,
    config: &MailBridgeConfig,
    issue_ids: &[String],
    webrev: &WebrevMentions<'_>,
) -> String {
    let base = config.forge_url_base.trim_end_matches('/');
    let mut out = String::new();

    out.push_str(&format!("Patch: {base}/pull/{}.diff\n", pr_id.number));
    out.push_str(&format!("Changes: {base}/pull/{}/files\n", pr_id.number));
    out.push_str(&format!("Webrev: {}\n", webrev.latest.url));
    if let Some(range) = webrev.range_from_zero {
        out.push_str(&format!("Webrev (00-{}): {}\n", webrev.latest.ordinal_segment(), range.url));
    }
    for id in issue_ids {
        out.push_str(&format!("Issue: {}{}\n", config.issue_tracker_url_base, id));
    }
    out.push_str(&format!("Fetch: git fetch {base} pull/{}/head:pr/{}\n", pr_id.number, pr_id.number));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::types::WebrevKind;

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

    fn artifact(ordinal: u32) -> WebrevArtifact {
        WebrevArtifact {
            pr_id: PrId::new("openjdk/jdk", 1234),
            revision_ordinal: ordinal,
            base_hash: "base".into(),
            head_hash: "head".into(),
            kind: WebrevKind::Full,
            url: format!("https://webrevs.test/mirror/webrevs/openjdk/jdk/1234/{ordinal:02}"),
        }
    }

    #[test]
    fn footer_contains_all_required_lines() {
        let pr_id = PrId::new("openjdk/jdk", 1234);
        let cfg = config();
        let zero = artifact(0);
        let mentions = WebrevMentions { latest: &zero, range_from_zero: None };
        let footer = render_footer(&pr_id, &cfg, &["TSTPRJ-1234".to_string()], &mentions);

        assert!(footer.contains("Patch:"));
        assert!(footer.contains("Changes:"));
        assert!(footer.contains("Webrev:"));
        assert!(footer.contains("Issue:"));
        assert!(footer.contains("http://issues.test/browse/TSTPRJ-1234"));
        assert!(footer.contains("Fetch:"));
    }

    #[test]
    fn revised_footer_mentions_both_revision_and_range() {
        let pr_id = PrId::new("openjdk/jdk", 1234);
        let cfg = config();
        let zero = artifact(0);
        let one = artifact(1);
        let mentions = WebrevMentions { latest: &one, range_from_zero: Some(&zero) };
        let footer = render_footer(&pr_id, &cfg, &[], &mentions);

        assert!(footer.contains("1234/01"));
        assert!(footer.contains("00-01"));
    }
}

//! Archive Reader (inbound, §4.6): polls the mailing-list archive, filters
//! out self-originated mail, and posts replies as forge comments carrying a
//! hidden "Bridged id" marker so later passes recognize and skip them.

use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;

use bridge_core::collaborators::{ArchiveMail, Conversation};
use bridge_core::config::ArchiveReaderConfig;
use bridge_core::markdown::text_to_markdown;

/// Matches a previously-posted bridged-id marker; used both to render new
/// markers and to recognize ones already present in a forge comment body.
pub static BRIDGED_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<!-- Bridged id \(([A-Za-z0-9+/=]+)\) -->").unwrap());

const OVERSIZE_NOTICE: &str = "This message was too large to include in full.";

fn base64_encode(message_id: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(message_id.as_bytes())
}

fn base64_decode(encoded: &str) -> Option<String> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

/// The `<!-- Bridged id (...) -->` marker appended to every posted comment.
pub fn bridged_id_marker(message_id: &str) -> String {
    format!("<!-- Bridged id ({}) -->", base64_encode(message_id))
}

/// Every Message-ID recorded by a bridged-id marker already present in
/// `comment_body` (a PR may carry more than one if it was reprocessed).
pub fn bridged_message_ids(comment_body: &str) -> Vec<String> {
    BRIDGED_ID_RE
        .captures_iter(comment_body)
        .filter_map(|c| base64_decode(&c[1]))
        .collect()
}

/// Whether `subject` matches the `RFR:` convention, optionally with a
/// `<repo>:` or `[branch]` prefix/suffix (§4.6 step 1).
pub fn is_rfr_subject(subject: &str) -> bool {
    subject.contains("RFR:")
}

pub struct RenderedReply {
    pub body: String,
    pub bridged_message_id: String,
}

/// Render one inbound reply as a forge comment body, honoring the oversize
/// threshold and appending the bridged-id marker (§4.6 steps 3-4).
pub fn render_reply(list_address: &str, mail: &ArchiveMail, config: &ArchiveReaderConfig) -> RenderedReply {
    let header = format!(
        "Mailing list message from [{}](mailto:{}) on [List](mailto:{}):",
        mail.from_name, mail.from_address, list_address
    );

    let body_text = if mail.body.len() as u64 > config.oversize_reply_threshold_bytes {
        OVERSIZE_NOTICE.to_string()
    } else {
        text_to_markdown(&mail.body)
    };

    let marker = bridged_id_marker(&mail.message_id);
    RenderedReply { body: format!("{header}\n\n{body_text}\n\n{marker}"), bridged_message_id: mail.message_id.clone() }
}

/// A conversation's replies that still need bridging: not already in
/// `sent_fingerprints` (self-originated) and not already present as a
/// bridged-id marker in `already_bridged` (posted by an earlier reader pass).
pub fn unbridged_replies<'a>(
    conversation: &'a Conversation,
    sent_fingerprints: &std::collections::BTreeSet<String>,
    already_bridged: &std::collections::BTreeSet<String>,
) -> Vec<&'a ArchiveMail> {
    conversation
        .replies
        .iter()
        .filter(|reply| !sent_fingerprints.contains(&reply.message_id))
        .filter(|reply| !already_bridged.contains(&reply.message_id))
        .filter(|reply| reply.in_reply_to.is_some())
        .collect()
}

//! Markdown <-> text conversion (§4.4, §4.6, §8 round-trip property).
//!
//! Outbound (forge Markdown -> mail text): strip emoji shorthands, unwrap
//! fenced code blocks, inline `suggestion` blocks.
//! Inbound (mail text -> forge Markdown): backslash-escape list/asterisk
//! prefix characters, preserve blockquote runs, encode leading whitespace as
//! `&#32;` entities.

use once_cell::sync::Lazy;
use regex::Regex;

static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(?:suggestion)?\n(.*?)\n```").unwrap());
static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([A-Za-z0-9][A-Za-z0-9-]*)").unwrap());
static QUOTE_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^>\s?(.*)$").unwrap());
static LEADING_WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^( +)").unwrap());

/// Shorthand -> Unicode code point, the minimal table the bridge itself
/// emits (extend as new shorthands are observed in practice).
const EMOJI_TABLE: &[(&str, &str)] = &[
    (":smile:", "\u{1F604}"),
    (":+1:", "\u{1F44D}"),
    (":-1:", "\u{1F44E}"),
    (":tada:", "\u{1F389}"),
    (":heavy_check_mark:", "\u{2714}"),
    (":x:", "\u{274C}"),
    (":warning:", "\u{26A0}"),
];

/// Outbound conversion: forge-authored Markdown body -> plain mail text.
pub fn markdown_to_text(input: &str) -> String {
    let mut out = input.to_string();

    for (shorthand, codepoint) in EMOJI_TABLE {
        out = out.replace(shorthand, codepoint);
    }

    // Unwrap fenced code blocks (including `suggestion` blocks) to their
    // bare content, dropping the fence markers.
    out = FENCE_RE.replace_all(&out, "$1").into_owned();

    out
}

/// Inbound conversion: mail text body -> Markdown safe to post as a forge
/// comment. Escapes characters that would otherwise be interpreted as list
/// markers, preserves blockquote runs by separating them with a blank line,
/// and encodes leading whitespace as `&#32;` entities to keep indentation.
pub fn text_to_markdown(input: &str) -> String {
    let mut out_lines: Vec<String> = Vec::new();
    let mut prev_was_quote = false;

    for raw_line in input.lines() {
        let is_quote = raw_line.trim_start().starts_with('>');

        if is_quote && !prev_was_quote && !out_lines.is_empty() {
            out_lines.push(String::new());
        }

        let escaped = escape_markdown_line(raw_line);
        out_lines.push(escaped);
        prev_was_quote = is_quote;
    }

    out_lines.join("\n")
}

fn escape_markdown_line(line: &str) -> String {
    // Encode leading spaces as &#32; entities before escaping list markers,
    // so indentation survives Markdown rendering.
    let (leading, rest) = match LEADING_WS_RE.find(line) {
        Some(m) => (m.as_str(), &line[m.end()..]),
        None => ("", line),
    };
    let encoded_leading = "&#32;".repeat(leading.len());

    let mut escaped = String::with_capacity(rest.len() + 4);
    let mut chars = rest.chars().peekable();
    let mut at_line_start = true;
    while let Some(c) = chars.next() {
        let needs_escape = at_line_start
            && matches!(c, '-' | '+' | '*')
            && chars.peek().map(|n| *n == ' ').unwrap_or(false);
        let is_asterisk = c == '*';
        if needs_escape || is_asterisk {
            escaped.push('\\');
        }
        escaped.push(c);
        if !c.is_whitespace() {
            at_line_start = false;
        }
    }

    format!("{encoded_leading}{escaped}")
}

/// True if `body`'s first non-empty line is a quote (`> ...`) matching
/// `candidate` (§4.3 parent-resolution step 2).
pub fn quotes_line(body: &str, candidate: &str) -> bool {
    let candidate = candidate.trim();
    body.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|first| QUOTE_LINE_RE.captures(first))
        .map(|caps| caps.get(1).map(|m| m.as_str().trim()) == Some(candidate))
        .unwrap_or(false)
}

/// `@username` mentions found in `body`, lowercased for canonical matching.
pub fn mentions(body: &str) -> Vec<String> {
    MENTION_RE
        .captures_iter(body)
        .map(|c| c[1].to_lowercase())
        .collect()
}

//! Review-comment file context rendering (§4.4): a short window of N lines
//! around the target line, read from the head-revision file snapshot.

/// Render a `review_comment_context_lines`-sized window around `line`
/// (1-indexed) from `file_content`, with a leading `line N:` marker per
/// rendered line so the reader can orient without a diff view.
pub fn render_context(file_content: &str, line: u32, window: u32) -> String {
    let lines: Vec<&str> = file_content.lines().collect();
    if lines.is_empty() || line == 0 {
        return String::new();
    }
    let target = (line - 1) as usize;
    let start = target.saturating_sub(window as usize);
    let end = (target + window as usize + 1).min(lines.len());

    let mut out = String::new();
    for (i, text) in lines.iter().enumerate().take(end).skip(start) {
        let marker = if i == target { ">" } else { " " };
        out.push_str(&format!("{marker} {:>4}  {text}\n", i + 1));
    }
    out
}

//! Text normalization and greedy word wrapping.

use crate::error::{MediaError, MediaResult};

/// Ellipsis appended to the last kept line when wrapping is truncated.
pub const ELLIPSIS: char = '…';

/// Expand `:shortcode:` emoji names to their glyphs. Unknown names are
/// left untouched.
pub fn expand_shortcodes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(':') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        if let Some(end) = after.find(':') {
            let name = &after[..end];
            if is_shortcode(name) {
                if let Some(emoji) = emojis::get_by_shortcode(name) {
                    out.push_str(emoji.as_str());
                    rest = &after[end + 1..];
                    continue;
                }
            }
        }

        // Not a shortcode: keep the colon and rescan from the next char, so
        // the closing colon can still open the next shortcode.
        out.push(':');
        rest = after;
    }

    out.push_str(rest);
    out
}

fn is_shortcode(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-'))
}

/// Expand emoji shortcodes and collapse whitespace runs to single spaces.
///
/// Fails with [`MediaError::EmptyText`] if nothing is left.
pub fn normalize_text(text: &str) -> MediaResult<String> {
    let expanded = expand_shortcodes(text);
    let collapsed = expanded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(MediaError::EmptyText);
    }
    Ok(collapsed)
}

/// Number of characters as counted for wrapping.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Greedy word wrap.
///
/// A word joins the current line while `len(line) + 1 + len(word) <= max`.
/// Words are never split; a word longer than the limit gets its own line.
pub fn wrap_text(text: &str, max_chars_per_line: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = char_len(word);
        if current.is_empty() {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= max_chars_per_line {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Keep at most `max_lines`; when lines are dropped, the last kept line
/// gets an ellipsis. Returns whether truncation happened.
pub fn cap_lines(lines: &mut Vec<String>, max_lines: usize) -> bool {
    if lines.len() <= max_lines || max_lines == 0 {
        return false;
    }
    lines.truncate(max_lines);
    if let Some(last) = lines.last_mut() {
        last.push(ELLIPSIS);
    }
    true
}

/// Split a combined `"quote - source"` string at the last spaced dash.
///
/// Returns the input unchanged (and no attribution) when either side of
/// the dash would be empty.
pub fn split_attribution(text: &str) -> (String, Option<String>) {
    if let Some(idx) = text.rfind(" - ") {
        let quote = text[..idx].trim();
        let source = text[idx + 3..].trim();
        if !quote.is_empty() && !source.is_empty() {
            return (quote.to_string(), Some(source.to_string()));
        }
    }
    (text.trim().to_string(), None)
}

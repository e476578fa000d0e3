//! Boundary-aware splitting of long text under the platform length cap.

/// Hard upper bound the platform places on one message body.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Sentence-ending punctuation, ASCII and CJK fullwidth.
const SENTENCE_TERMINATORS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Splits `text` into ordered chunks of at most `max_len` bytes, preferring
/// semantic boundaries.
///
/// Each split window is scanned for the last occurrence of, in priority
/// order: a paragraph break, a line break, a sentence terminator, any
/// whitespace. The split lands just past the boundary; with no boundary in
/// the window the text is cut hard at the window end. The remainder is
/// left-trimmed after every split. Pure function of its inputs, so a
/// restarted delivery re-chunks identically.
pub fn segment(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 {
        return Vec::new();
    }
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut window_end = remaining.floor_char_boundary(max_len);
        if window_end == 0 {
            // max_len is smaller than the first character; cut past it anyway
            window_end = remaining
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(remaining.len());
        }

        let split_at = find_break(&remaining[..window_end]).unwrap_or(window_end);
        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

/// Byte offset just past the best boundary in the window, or `None` when no
/// boundary pattern occurs at all.
fn find_break(window: &str) -> Option<usize> {
    if let Some(pos) = window.rfind("\n\n") {
        return Some(pos + 2);
    }
    if let Some(pos) = window.rfind('\n') {
        return Some(pos + 1);
    }
    if let Some(pos) = window.rfind(SENTENCE_TERMINATORS) {
        let ch_len = window[pos..].chars().next().map(char::len_utf8)?;
        return Some(pos + ch_len);
    }
    if let Some(pos) = window.rfind(char::is_whitespace) {
        let ch_len = window[pos..].chars().next().map(char::len_utf8)?;
        return Some(pos + ch_len);
    }
    None
}

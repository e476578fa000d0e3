//! Best-effort conversion of lightweight markdown to Telegram HTML.

/// Convert a subset of Markdown to Telegram-compatible HTML.
///
/// Telegram accepts `<b>`, `<i>`, `<code>`, `<pre>`, `<a href="">` and
/// `<s>`. Inline constructs (bold, italic, strikethrough, inline code,
/// links) and fenced code blocks are rendered; everything else passes
/// through HTML-escaped. The function is total — malformed markup degrades
/// to escaped text rather than failing.
pub fn markdown_to_html(md: &str) -> String {
    let escaped = escape_html(md);
    let chars: Vec<char> = escaped.chars().collect();
    let mut out = String::with_capacity(escaped.len());
    let mut i = 0;
    let mut in_code = false;

    while i < chars.len() {
        // Fenced code block with optional language tag.
        if !in_code && starts_with(&chars, i, "```") {
            i += 3;
            let mut lang = String::new();
            while i < chars.len() && chars[i] != '\n' {
                lang.push(chars[i]);
                i += 1;
            }
            if i < chars.len() {
                i += 1;
            }
            let (block, next) = take_until(&chars, i, "```");
            i = next;
            if lang.is_empty() {
                out.push_str("<pre>");
                out.push_str(&block);
                out.push_str("</pre>");
            } else {
                out.push_str(&format!("<pre><code class=\"language-{lang}\">"));
                out.push_str(&block);
                out.push_str("</code></pre>");
            }
            continue;
        }

        // Inline code toggles; markdown inside it is left alone.
        if chars[i] == '`' {
            in_code = !in_code;
            out.push_str(if in_code { "<code>" } else { "</code>" });
            i += 1;
            continue;
        }
        if in_code {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        if starts_with(&chars, i, "**") {
            let (content, next) = take_until(&chars, i + 2, "**");
            i = next;
            out.push_str("<b>");
            out.push_str(&content);
            out.push_str("</b>");
            continue;
        }

        if starts_with(&chars, i, "~~") {
            let (content, next) = take_until(&chars, i + 2, "~~");
            i = next;
            out.push_str("<s>");
            out.push_str(&content);
            out.push_str("</s>");
            continue;
        }

        if chars[i] == '*' {
            let (content, next) = take_until(&chars, i + 1, "*");
            i = next;
            out.push_str("<i>");
            out.push_str(&content);
            out.push_str("</i>");
            continue;
        }

        if chars[i] == '[' {
            if let Some((text, url, next)) = take_link(&chars, i) {
                out.push_str(&format!("<a href=\"{url}\">{text}</a>"));
                i = next;
                continue;
            }
        }

        out.push(chars[i]);
        i += 1;
    }

    // Never leave an unterminated code tag when the input ends without a
    // closing backtick (common when content was split into chunks).
    if in_code {
        out.push_str("</code>");
    }

    out
}

fn starts_with(chars: &[char], at: usize, pat: &str) -> bool {
    let mut idx = at;
    for pc in pat.chars() {
        if chars.get(idx) != Some(&pc) {
            return false;
        }
        idx += 1;
    }
    true
}

/// Collects characters until `delimiter`, consuming it. Runs to the end of
/// input when the delimiter never appears.
fn take_until(chars: &[char], mut at: usize, delimiter: &str) -> (String, usize) {
    let mut content = String::new();
    while at < chars.len() {
        if starts_with(chars, at, delimiter) {
            return (content, at + delimiter.chars().count());
        }
        content.push(chars[at]);
        at += 1;
    }
    (content, at)
}

/// Parses `[text](url)` starting at an opening bracket. `None` when the
/// construct is incomplete, in which case the caller emits the bracket
/// literally.
fn take_link(chars: &[char], at: usize) -> Option<(String, String, usize)> {
    let mut i = at + 1;
    let mut text = String::new();
    while i < chars.len() && chars[i] != ']' {
        text.push(chars[i]);
        i += 1;
    }
    if i >= chars.len() {
        return None;
    }
    i += 1;
    if chars.get(i) != Some(&'(') {
        return None;
    }
    i += 1;
    let mut url = String::new();
    while i < chars.len() && chars[i] != ')' {
        url.push(chars[i]);
        i += 1;
    }
    if i >= chars.len() {
        return None;
    }
    Some((text, url, i + 1))
}

/// Escape HTML special characters.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[must_use]
pub fn truncate_at_char_boundary(text: &str, max_len: usize) -> &str {
    &text[..text.floor_char_boundary(max_len)]
}

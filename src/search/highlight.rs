const MARK_OPEN: &str = "<mark>";
const MARK_CLOSE: &str = "</mark>";

/// Wraps the first case-insensitive occurrence of `needle` in `text` with
/// `<mark>` tags. Returns `text` unchanged when there is no occurrence.
pub fn highlight(text: &str, needle: &str) -> String {
    let needle = needle.trim();
    if needle.is_empty() {
        return text.to_string();
    }

    for (start, _) in text.char_indices() {
        if let Some(len) = match_len(&text[start..], needle) {
            let end = start + len;
            return format!(
                "{}{MARK_OPEN}{}{MARK_CLOSE}{}",
                &text[..start],
                &text[start..end],
                &text[end..]
            );
        }
    }

    text.to_string()
}

/// Byte length of the prefix of `haystack` that equals `needle` ignoring case.
fn match_len(haystack: &str, needle: &str) -> Option<usize> {
    let mut hay = haystack.char_indices();
    let mut consumed = 0;

    for n in needle.chars() {
        let (idx, h) = hay.next()?;
        if !h.to_lowercase().eq(n.to_lowercase()) {
            return None;
        }
        consumed = idx + h.len_utf8();
    }

    Some(consumed)
}

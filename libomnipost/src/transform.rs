//! Rich-text annotation derivation
//!
//! Scans variant text for hashtag tokens and computes the UTF-8 byte span of
//! each, because the downstream annotation formats address spans by byte
//! position, not character index. Rust strings are UTF-8, so `char_indices`
//! yields exactly the byte offsets the wire format wants.

/// A hashtag occurrence in a piece of text.
///
/// `byte_start` points at the `#` marker; `byte_end` is one past the last
/// byte of the tag body. Both are offsets into the UTF-8 encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashtagSpan {
    /// Tag body without the leading marker.
    pub tag: String,
    pub byte_start: usize,
    pub byte_end: usize,
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Find all hashtag spans in `text`.
///
/// A hashtag is a `#` marker at the start of the text or after a non-word
/// character, followed by one or more Unicode letters, digits, or
/// underscores. A bare `#` with no body is not a tag.
pub fn hashtag_spans(text: &str) -> Vec<HashtagSpan> {
    let mut spans = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut prev: Option<char> = None;

    while let Some((idx, c)) = chars.next() {
        if c == '#' && prev.map_or(true, |p| !is_tag_char(p) && p != '#') {
            let mut tag = String::new();
            let mut end = idx + c.len_utf8();

            while let Some(&(tag_idx, tag_char)) = chars.peek() {
                if !is_tag_char(tag_char) {
                    break;
                }
                tag.push(tag_char);
                end = tag_idx + tag_char.len_utf8();
                chars.next();
            }

            if !tag.is_empty() {
                prev = tag.chars().last();
                spans.push(HashtagSpan {
                    tag,
                    byte_start: idx,
                    byte_end: end,
                });
                continue;
            }
        }
        prev = Some(c);
    }

    spans
}

//! Escaping for listing hrefs and labels.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

/// Bytes that pass through an href unchanged: RFC 3986 unreserved plus the
/// sub-delimiters that are harmless inside a double-quoted attribute.
fn is_href_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'-' | b'.' | b'_' | b'~' | b'!' | b'$' | b'(' | b')' | b'*' | b'+' | b',' | b'=' | b':' | b'@'
        )
}

fn is_triplet(bytes: &[u8], at: usize) -> bool {
    bytes[at] == b'%'
        && at + 2 < bytes.len()
        && bytes[at + 1].is_ascii_hexdigit()
        && bytes[at + 2].is_ascii_hexdigit()
}

fn push_encoded(out: &mut String, value: &str, keep_slash: bool) {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if is_triplet(bytes, i) {
            // Already an escape; re-encoding would turn %3B into %253B.
            out.push_str(&value[i..i + 3]);
            i += 3;
            continue;
        }
        if is_href_safe(b) || (keep_slash && b == b'/') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
        i += 1;
    }
}

/// One path segment for use inside `href="…"`. Quotes, angle brackets,
/// `&`, `;`, `?`, `#`, whitespace and non-ASCII bytes are percent-encoded;
/// existing `%XX` escapes are kept.
pub fn href_segment(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    push_encoded(&mut out, name, false);
    out
}

/// A context path for use as an href prefix; `/` separators are kept and the
/// result always ends with `/`.
pub fn href_base(context_path: &str) -> String {
    let mut out = String::with_capacity(context_path.len() + 1);
    if !context_path.starts_with('/') {
        out.push('/');
    }
    push_encoded(&mut out, context_path, true);
    if !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Visible text: HTML-escaped, with characters XML cannot carry replaced.
pub fn label(name: &str) -> String {
    html_escape::encode_safe(&printable(name)).into_owned()
}

/// Human-readable form of an href-encoded context path, for element text.
pub fn decoded_label(context_path: &str) -> String {
    let decoded = percent_decode_str(context_path).decode_utf8_lossy();
    html_escape::encode_text(&printable(&decoded)).into_owned()
}

fn printable(text: &str) -> Cow<'_, str> {
    if !text.chars().any(is_xml_illegal) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.chars()
            .map(|c| if is_xml_illegal(c) { '\u{FFFD}' } else { c })
            .collect(),
    )
}

fn is_xml_illegal(c: char) -> bool {
    (c.is_control() && !matches!(c, '\t' | '\n' | '\r')) || c == '\u{FFFE}' || c == '\u{FFFF}'
}

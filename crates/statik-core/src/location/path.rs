//! Request path normalization.
//!
//! Reduces a request path to plain segments that can never climb above the
//! root they are later joined onto.

use anyhow::{bail, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped when turning a decoded key back into a request path.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'%')
    .add(b'/')
    .add(b'\\')
    .add(b'?')
    .add(b'#');

/// A request path reduced to decoded segments, contained within its root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RelativePath {
    segments: Vec<String>,
}

impl RelativePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Canonical string form used for cache keys and logical location paths:
    /// `/` for the root, otherwise `/a/b`.
    pub fn key(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for s in &self.segments {
            out.push('/');
            out.push_str(s);
        }
        out
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Child path. `name` must be a single plain segment.
    pub fn join(&self, name: &str) -> RelativePath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        RelativePath { segments }
    }

    /// Same path with `suffix` appended to the last segment (`a/b.txt` -> `a/b.txt.gz`).
    /// Returns `None` for the root.
    pub fn with_suffix(&self, suffix: &str) -> Option<RelativePath> {
        let mut segments = self.segments.clone();
        let last = segments.last_mut()?;
        last.push_str(suffix);
        Some(RelativePath { segments })
    }
}

/// Re-encode a normalized key (`/a/b`) so that [`normalize`] maps it back to
/// the same segments.
pub fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for segment in key.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.extend(utf8_percent_encode(segment, SEGMENT));
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Normalize a request path.
///
/// - Each segment is percent-decoded; malformed escapes, invalid UTF-8, NUL
///   and other control characters are faults.
/// - Empty and `.` segments are dropped; `..` pops the previous segment.
/// - Returns `Ok(None)` when `..` would climb above the root, or when a
///   decoded segment contains `/` or `\` (encoded separators).
pub fn normalize(raw: &str) -> Result<Option<RelativePath>> {
    let mut segments: Vec<String> = Vec::new();

    for raw_segment in raw.split('/') {
        if raw_segment.is_empty() {
            continue;
        }
        check_escapes(raw_segment)?;
        let decoded = match percent_decode_str(raw_segment).decode_utf8() {
            Ok(d) => d,
            Err(_) => bail!("request path segment is not valid UTF-8"),
        };
        if decoded.chars().any(|c| c == '\0' || c.is_control()) {
            bail!("request path contains control characters");
        }
        if decoded.contains('/') || decoded.contains('\\') {
            return Ok(None);
        }
        match decoded.as_ref() {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Ok(None);
                }
            }
            _ => segments.push(decoded.into_owned()),
        }
    }

    Ok(Some(RelativePath { segments }))
}

/// Every `%` must start a two-hex-digit escape.
fn check_escapes(segment: &str) -> Result<()> {
    let bytes = segment.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let ok = i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !ok {
                bail!("malformed percent-encoding in request path");
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn key(raw: &str) -> Option<String> {
        normalize(raw).unwrap().map(|p| p.key())
    }

    #[rstest]
    #[case("/", "/")]
    #[case("", "/")]
    #[case("/a/b.txt", "/a/b.txt")]
    #[case("a//b/", "/a/b")]
    #[case("/a/./b", "/a/b")]
    #[case("/a/x/../b", "/a/b")]
    #[case("/dir%3B/four", "/dir;/four")]
    #[case("/f%3F%3Fr", "/f??r")]
    #[case("/a/..", "/")]
    fn normalizes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(key(raw).as_deref(), Some(expected));
    }

    #[rstest]
    #[case("/..")]
    #[case("/../etc/passwd")]
    #[case("/a/../../etc/passwd")]
    #[case("/%2e%2e/etc/passwd")]
    #[case("/%2E%2E/%2E%2E/secret")]
    #[case("/a%2F..%2F..%2Fsecret")]
    #[case("/..%5C..%5Csecret")]
    fn traversal_is_missing(#[case] raw: &str) {
        assert_eq!(key(raw), None);
    }

    #[rstest]
    #[case("/bad%zzescape")]
    #[case("/trailing%4")]
    #[case("/nul%00byte")]
    #[case("/bad%ff%feutf8")]
    fn decoding_faults(#[case] raw: &str) {
        assert!(normalize(raw).is_err());
    }

    #[test]
    fn encoded_key_normalizes_back() {
        for raw in ["/100%25 done.txt", "/dir%3B/f%3F%3Fr", "/plain/a.txt", "/"] {
            let once = normalize(raw).unwrap().unwrap();
            let again = normalize(&encode_key(&once.key())).unwrap().unwrap();
            assert_eq!(once, again, "{raw}");
        }
    }

    #[test]
    fn suffix_and_join() {
        let p = normalize("/docs/readme.txt").unwrap().unwrap();
        assert_eq!(p.with_suffix(".gz").unwrap().key(), "/docs/readme.txt.gz");
        assert_eq!(p.file_name(), Some("readme.txt"));
        assert!(RelativePath::root().with_suffix(".gz").is_none());
        assert_eq!(RelativePath::root().join("x").key(), "/x");
    }
}

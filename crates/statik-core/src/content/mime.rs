//! Extension to MIME type mapping.

use std::collections::BTreeMap;

/// MIME lookup by filename suffix.
///
/// Configured entries may name compound suffixes (`tar.gz`); the longest
/// matching configured suffix wins. Without a configured match the built-in
/// table from `mime_guess` is consulted for the last extension.
#[derive(Debug, Clone, Default)]
pub struct MimeTable {
    overrides: BTreeMap<String, String>,
}

impl MimeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `suffix -> mime` pairs. Suffixes are case-insensitive and
    /// may be written with or without a leading dot.
    pub fn with_overrides<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut table = Self::new();
        for (suffix, mime) in pairs {
            table.insert(suffix, mime);
        }
        table
    }

    pub fn insert(&mut self, suffix: &str, mime: &str) {
        let key = suffix.trim_start_matches('.').to_ascii_lowercase();
        if !key.is_empty() {
            self.overrides.insert(key, mime.to_string());
        }
    }

    /// MIME type for the last segment of `path`, if known.
    pub fn lookup(&self, path: &str) -> Option<String> {
        let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();

        // Leftmost dot gives the longest suffix.
        for (at, _) in name.match_indices('.') {
            let suffix = &name[at + 1..];
            if suffix.is_empty() {
                continue;
            }
            if let Some(mime) = self.overrides.get(suffix) {
                return Some(mime.clone());
            }
        }

        let (_, ext) = name.rsplit_once('.')?;
        if ext.is_empty() {
            return None;
        }
        mime_guess::from_ext(ext).first_raw().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/foo.txt", Some("text/plain"))]
    #[case("/a/b/style.CSS", Some("text/css"))]
    #[case("/index.html", Some("text/html"))]
    #[case("/img.png", Some("image/png"))]
    #[case("/README", None)]
    #[case("/trailing.", None)]
    fn builtin_table(#[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(MimeTable::new().lookup(path).as_deref(), expected);
    }

    #[test]
    fn longest_configured_suffix_wins() {
        let table = MimeTable::with_overrides([
            ("gz", "application/gzip"),
            (".tar.gz", "application/x-gtar"),
            ("webmanifest", "application/manifest+json"),
        ]);
        assert_eq!(
            table.lookup("/dl/pkg.tar.gz").as_deref(),
            Some("application/x-gtar")
        );
        assert_eq!(table.lookup("/x.gz").as_deref(), Some("application/gzip"));
        assert_eq!(
            table.lookup("/site.WEBMANIFEST").as_deref(),
            Some("application/manifest+json")
        );
        // falls back to builtin
        assert_eq!(table.lookup("/a.txt").as_deref(), Some("text/plain"));
    }
}

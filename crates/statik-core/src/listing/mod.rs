//! Directory listing documents.
//!
//! Produces a small XHTML page for a directory location. Hrefs are built
//! from the caller's context path plus the encoded child name; labels are
//! entity-escaped. Host filesystem paths never enter the output.

mod encode;

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::time::SystemTime;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use crate::location::Location;

pub use encode::{decoded_label, href_base, href_segment, label};

/// Column a listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    Name,
    Modified,
    Size,
}

impl SortColumn {
    fn code(self) -> char {
        match self {
            SortColumn::Name => 'N',
            SortColumn::Modified => 'M',
            SortColumn::Size => 'S',
        }
    }
}

/// Ordering requested through `C=<N|M|S>` and `O=<A|D>` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortSpec {
    pub column: SortColumn,
    pub descending: bool,
}

impl SortSpec {
    /// Parse a query string (`C=M&O=D`, `;` also separates). Unknown keys
    /// and values are ignored.
    pub fn from_query(query: Option<&str>) -> Self {
        let mut spec = SortSpec::default();
        let Some(query) = query else {
            return spec;
        };
        for pair in query.trim_start_matches('?').split(['&', ';']) {
            match pair.split_once('=') {
                Some(("C", "N")) => spec.column = SortColumn::Name,
                Some(("C", "M")) => spec.column = SortColumn::Modified,
                Some(("C", "S")) => spec.column = SortColumn::Size,
                Some(("O", "A")) => spec.descending = false,
                Some(("O", "D")) => spec.descending = true,
                _ => {}
            }
        }
        spec
    }
}

/// Presentation switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingOptions {
    /// Add a `../` row unless the context path is the root.
    pub show_parent: bool,
    pub sort: SortSpec,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            show_parent: true,
            sort: SortSpec::default(),
        }
    }
}

/// Listing for `dir` with default options.
pub fn generate_listing(dir: &Location, context_path: &str) -> Result<String> {
    generate(dir, context_path, &ListingOptions::default())
}

/// Render the listing document for `dir` as served under `context_path`.
///
/// `context_path` is the already-encoded request path of the directory; it
/// is used verbatim apart from escaping characters unsafe in an attribute
/// and ensuring a trailing `/`.
pub fn generate(dir: &Location, context_path: &str, options: &ListingOptions) -> Result<String> {
    if !dir.is_dir() {
        bail!("not a directory: {}", dir.path());
    }
    let mut children = dir.children()?;
    sort(&mut children, options.sort);

    let base = href_base(context_path);
    let title = decoded_label(&base);

    let mut page = String::with_capacity(1024 + children.len() * 160);
    page.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    page.push_str("<!DOCTYPE html>\n");
    page.push_str("<html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"en\">\n<head>\n");
    page.push_str("<meta charset=\"utf-8\"/>\n");
    let _ = writeln!(page, "<title>Directory: {title}</title>");
    page.push_str(STYLE);
    page.push_str("</head>\n<body>\n");
    let _ = writeln!(page, "<h1 class=\"title\">Directory: {title}</h1>");
    page.push_str("<table class=\"listing\">\n<thead>\n<tr>");
    header_cell(&mut page, "name", "Name", SortColumn::Name, options.sort);
    header_cell(&mut page, "lastmodified", "Last Modified", SortColumn::Modified, options.sort);
    header_cell(&mut page, "size", "Size", SortColumn::Size, options.sort);
    page.push_str("</tr>\n</thead>\n<tbody>\n");

    if options.show_parent && base != "/" {
        page.push_str(
            "<tr><td class=\"name\"><a href=\"../\">Parent Directory</a></td>\
             <td class=\"lastmodified\">-</td><td class=\"size\">-</td></tr>\n",
        );
    }

    for child in &children {
        let name = child.name();
        if name.is_empty() {
            tracing::warn!("skipping unnamed listing entry");
            continue;
        }
        let slash = if child.is_dir() { "/" } else { "" };
        let href = format!("{base}{}{slash}", href_segment(name));
        let text = format!("{}{slash}", label(name));
        let modified = child
            .modified()
            .map(format_time)
            .unwrap_or_else(|| "-".to_string());
        let size = if child.is_dir() {
            "-".to_string()
        } else {
            human_size(child.len())
        };
        let _ = writeln!(
            page,
            "<tr><td class=\"name\"><a href=\"{href}\">{text}</a></td>\
             <td class=\"lastmodified\">{modified}</td><td class=\"size\">{size}</td></tr>"
        );
    }

    page.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    Ok(page)
}

const STYLE: &str = "<style>\n\
body { font-family: sans-serif; }\n\
table.listing { border-collapse: collapse; }\n\
td, th { padding: 0.2em 1em; text-align: left; }\n\
td.size { text-align: right; }\n\
</style>\n";

fn header_cell(page: &mut String, class: &str, text: &str, column: SortColumn, current: SortSpec) {
    // Clicking the active column flips its direction.
    let order = if current.column == column && !current.descending {
        'D'
    } else {
        'A'
    };
    let _ = write!(
        page,
        "<th class=\"{class}\"><a href=\"?C={}&amp;O={order}\">{text}</a></th>",
        column.code()
    );
}

fn sort(children: &mut [Location], spec: SortSpec) {
    children.sort_by(|a, b| {
        let primary = match spec.column {
            SortColumn::Name => Ordering::Equal,
            SortColumn::Modified => a.modified().cmp(&b.modified()),
            SortColumn::Size => a.len().cmp(&b.len()),
        };
        let ord = primary.then_with(|| a.name().cmp(b.name()));
        if spec.descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

fn format_time(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// `512 B`, `1.5 KiB`, `3.0 MiB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

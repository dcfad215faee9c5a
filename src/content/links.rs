//! Link reference definitions and their uses.
//!
//! ```markdown
//! Benchmarks live in the [distopia repo][distopia].
//!
//! [distopia]: https://github.com/MDAnalysis/distopia
//! ```
//!
//! Definitions are collected per document. Uses are found by running the
//! markdown parser, so references inside code are never counted.

use super::math::{code_regions, line_of, mask};
use crate::render::markdown::options;
use pulldown_cmark::{BrokenLink, CowStr, Event, LinkType, Parser, Tag};
use regex::Regex;
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::LazyLock,
};

/// A `[label]: url "title"` definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkDef {
    pub url: String,
    pub title: Option<String>,
    pub line: usize,
}

/// Document-local label → URL table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTable {
    defs: BTreeMap<String, LinkDef>,
    /// Later definitions of an already defined label: `(label, line)`.
    duplicates: Vec<(String, usize)>,
}

impl LinkTable {
    /// Collect every definition in `text`, outside fenced code.
    pub fn scan(text: &str) -> Self {
        static RE_DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(
                r#"^ {0,3}\[([^\]]+)\]:[ \t]*<?([^\s>]+)>?(?:[ \t]+(?:"([^"]*)"|'([^']*)'|\(([^)]*)\)))?[ \t]*$"#,
            )
            .unwrap()
        });

        let code = code_regions(text);
        let mut table = Self::default();
        let mut offset = 0;

        for line in text.split_inclusive('\n') {
            let start = offset;
            offset += line.len();
            if code.iter().any(|r| r.contains(&start)) {
                continue;
            }
            let Some(caps) = RE_DEFINITION.captures(line.trim_end_matches(['\n', '\r'])) else {
                continue;
            };
            let label = &caps[1];
            if label.starts_with('^') {
                continue; // footnote
            }

            let key = normalize_label(label);
            let line_no = line_of(text, start);
            if table.defs.contains_key(&key) {
                table.duplicates.push((key, line_no));
                continue;
            }
            let title = caps
                .get(3)
                .or_else(|| caps.get(4))
                .or_else(|| caps.get(5))
                .map(|m| m.as_str().to_string());
            table.defs.insert(
                key,
                LinkDef {
                    url: caps[2].to_string(),
                    title,
                    line: line_no,
                },
            );
        }
        table
    }

    /// Definitions in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LinkDef)> {
        self.defs.iter().map(|(label, def)| (label.as_str(), def))
    }

    pub fn duplicates(&self) -> &[(String, usize)] {
        &self.duplicates
    }
}

/// A full or collapsed reference whose label has no definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedLink {
    pub label: String,
    pub line: usize,
}

impl UnresolvedLink {
    /// Keep full (`[text][label]`) and collapsed (`[label][]`) references.
    ///
    /// Shortcut references (`[label]`) look exactly like literal brackets,
    /// so they are never reported. `line_at` maps a byte offset to a line.
    pub fn from_broken(link: &BrokenLink<'_>, line_at: impl FnOnce(usize) -> usize) -> Option<Self> {
        match link.link_type {
            LinkType::Reference
            | LinkType::ReferenceUnknown
            | LinkType::Collapsed
            | LinkType::CollapsedUnknown => Some(Self {
                label: link.reference.to_string(),
                line: line_at(link.span.start),
            }),
            _ => None,
        }
    }
}

/// Everything known about links in one document.
#[derive(Debug, Clone, Default)]
pub struct LinkReport {
    pub table: LinkTable,
    /// Normalized labels that at least one reference resolved through.
    pub used: BTreeSet<String>,
    pub unresolved: Vec<UnresolvedLink>,
}

impl LinkReport {
    /// Defined labels that no reference uses, with their lines.
    pub fn unused(&self) -> Vec<(&str, usize)> {
        self.table
            .iter()
            .filter(|(label, _)| !self.used.contains(*label))
            .map(|(label, def)| (label, def.line))
            .collect()
    }
}

/// Collect definitions, resolved uses and unresolved labels of `text`.
///
/// Math spans are blanked first so `[` inside formulas is not read as a link.
pub fn analyze(text: &str) -> LinkReport {
    let masked = mask(text);
    let table = LinkTable::scan(&masked);
    let mut used = BTreeSet::new();
    let mut unresolved = Vec::new();
    collect_uses(&masked, &mut used, &mut unresolved);

    LinkReport {
        table,
        used,
        unresolved,
    }
}

fn collect_uses<'a>(
    source: &'a str,
    used: &mut BTreeSet<String>,
    unresolved: &mut Vec<UnresolvedLink>,
) {
    let callback = |link: BrokenLink<'a>| -> Option<(CowStr<'a>, CowStr<'a>)> {
        if let Some(found) = UnresolvedLink::from_broken(&link, |offset| line_of(source, offset)) {
            unresolved.push(found);
        }
        None
    };
    let parser = Parser::new_with_broken_link_callback(source, options(), Some(callback));

    for event in parser {
        let (link_type, id) = match event {
            Event::Start(Tag::Link { link_type, id, .. })
            | Event::Start(Tag::Image { link_type, id, .. }) => (link_type, id),
            _ => continue,
        };
        if matches!(
            link_type,
            LinkType::Reference | LinkType::Collapsed | LinkType::Shortcut
        ) {
            used.insert(normalize_label(&id));
        }
    }
}

/// CommonMark label matching: trim, collapse whitespace, fold case.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def<'t>(table: &'t LinkTable, label: &str) -> Option<&'t LinkDef> {
        let key = normalize_label(label);
        table.iter().find(|(l, _)| *l == key).map(|(_, d)| d)
    }

    const POST: &str = "\
We benchmarked [distopia][] against the [numpy baseline][np].
See also [the docs][Docs Site].

[distopia]: https://github.com/MDAnalysis/distopia
[np]: <https://numpy.org> \"NumPy\"
[docs   site]: https://docs.example.org 'Docs'
";

    #[test]
    fn test_scan_definitions() {
        let table = LinkTable::scan(POST);
        assert_eq!(table.iter().count(), 3);

        let np = def(&table, "NP").unwrap();
        assert_eq!(np.url, "https://numpy.org");
        assert_eq!(np.title.as_deref(), Some("NumPy"));
        assert_eq!(np.line, 5);

        let docs = def(&table, "Docs Site").unwrap();
        assert_eq!(docs.title.as_deref(), Some("Docs"));
        assert!(table.duplicates().is_empty());
    }

    #[test]
    fn test_scan_skips_code_and_footnotes() {
        let text = "```\n[inside]: https://a.org\n```\n[^1]: a footnote\n    [deep]: https://b.org\n";
        let table = LinkTable::scan(text);
        assert_eq!(table.iter().count(), 0);
        assert!(table.duplicates().is_empty());
    }

    #[test]
    fn test_scan_duplicates_first_wins() {
        let text = "[a]: https://first.org\n[A]: https://second.org\n";
        let table = LinkTable::scan(text);
        assert_eq!(def(&table, "a").unwrap().url, "https://first.org");
        assert_eq!(table.duplicates(), &[("a".to_string(), 2)]);
    }

    #[test]
    fn test_analyze_all_resolved() {
        let report = analyze(POST);
        assert!(report.unresolved.is_empty());
        assert!(report.used.contains("distopia"));
        assert!(report.used.contains("np"));
        assert!(report.used.contains("docs site"));
        assert!(report.unused().is_empty());
    }

    #[test]
    fn test_analyze_unresolved_and_unused() {
        let text = "First [ok][a], then [broken][missing].\n\nAnd [gone][].\n\n[a]: /a\n[spare]: /spare\n";
        let report = analyze(text);

        let labels: Vec<_> = report.unresolved.iter().map(|u| u.label.as_str()).collect();
        assert_eq!(labels, ["missing", "gone"]);
        assert_eq!(report.unresolved[0].line, 1);
        assert_eq!(report.unresolved[1].line, 3);
        assert_eq!(report.unused(), vec![("spare", 6)]);
    }

    #[test]
    fn test_analyze_ignores_code_and_math() {
        let text = "`[x][y]`\n\n```\n[a][b]\n```\n\n$$M[i][j]$$\n";
        let report = analyze(text);
        assert!(report.unresolved.is_empty());
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  Foo   Bar "), "foo bar");
        assert_eq!(normalize_label("SIMD\tWiki"), "simd wiki");
    }
}

//! YAML front matter between `---` markers.
//!
//! ```text
//! ---
//! layout: post
//! title: "distopia: SIMD distances"
//! ---
//! body...
//! ```

use super::PostError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// Opening and closing marker.
const DELIMITER: &str = "---";
/// YAML document end marker, also accepted as the closing line.
const DOCUMENT_END: &str = "...";

/// A source file cut at its front matter markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split<'a> {
    pub yaml: &'a str,
    pub body: &'a str,
    /// 1-based line number of the first body line in the file.
    pub body_line: usize,
}

/// Separate the front matter block from the body.
pub fn split(source: &str) -> Result<Split<'_>, PostError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);

    let mut lines = source.split_inclusive('\n');
    let first = lines.next().ok_or(PostError::MissingFrontMatter)?;
    if first.trim_end() != DELIMITER {
        return Err(PostError::MissingFrontMatter);
    }

    let yaml_start = first.len();
    let mut offset = yaml_start;
    let mut line_no = 1;
    for line in lines {
        line_no += 1;
        let marker = line.trim_end();
        if marker == DELIMITER || marker == DOCUMENT_END {
            return Ok(Split {
                yaml: &source[yaml_start..offset],
                body: &source[offset + line.len()..],
                body_line: line_no + 1,
            });
        }
        offset += line.len();
    }

    Err(PostError::UnclosedFrontMatter)
}

/// Parsed front matter of a post.
///
/// Known keys get typed fields; everything else stays in `extra` and is
/// still reachable from templates as `page.<key>`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter {
    /// `None` when the key is absent; `Some("none")` for `layout: null`.
    pub layout: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub permalink: Option<String>,
    pub author: Option<String>,
    pub excerpt: Option<String>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub published: bool,
    pub extra: BTreeMap<String, Value>,
}

impl Default for FrontMatter {
    fn default() -> Self {
        Self {
            layout: None,
            title: None,
            date: None,
            permalink: None,
            author: None,
            excerpt: None,
            tags: Vec::new(),
            categories: Vec::new(),
            published: true,
            extra: BTreeMap::new(),
        }
    }
}

impl FrontMatter {
    /// Parse the YAML between the markers.
    pub fn parse(yaml: &str) -> Result<Self, PostError> {
        let mapping = match serde_yaml::from_str::<Value>(yaml)? {
            Value::Null => Mapping::new(),
            Value::Mapping(mapping) => mapping,
            _ => return Err(PostError::NotAMapping),
        };
        Ok(Self::from_mapping(mapping))
    }

    fn from_mapping(mapping: Mapping) -> Self {
        let mut front = Self::default();
        let mut description = None;

        for (key, value) in mapping {
            let Some(key) = scalar_to_string(&key) else {
                continue;
            };
            match key.as_str() {
                "layout" => {
                    front.layout = match &value {
                        Value::Null => Some("none".to_string()),
                        other => scalar_to_string(other),
                    }
                }
                "title" => front.title = scalar_to_string(&value),
                "date" => front.date = scalar_to_string(&value),
                "permalink" => front.permalink = scalar_to_string(&value),
                "author" => front.author = scalar_to_string(&value),
                "excerpt" => front.excerpt = scalar_to_string(&value),
                // Stays reachable as `page.description`.
                "description" => {
                    description = scalar_to_string(&value);
                    front.extra.insert(key, value);
                }
                "tags" => front.tags = string_list(&value),
                "categories" | "category" => front.categories.extend(string_list(&value)),
                "published" => front.published = value.as_bool().unwrap_or(true),
                _ => {
                    front.extra.insert(key, value);
                }
            }
        }
        if front.excerpt.is_none() {
            front.excerpt = description;
        }
        front
    }

    /// Title with surrounding whitespace removed; empty when absent.
    pub fn title(&self) -> &str {
        self.title.as_deref().map(str::trim).unwrap_or_default()
    }

    /// Parse the `date` key, if present.
    ///
    /// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]` and the same followed by
    /// a `±HHMM` offset (converted to UTC).
    pub fn datetime(&self) -> Result<Option<NaiveDateTime>, PostError> {
        let Some(raw) = self.date.as_deref().map(str::trim) else {
            return Ok(None);
        };

        if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z") {
            return Ok(Some(dt.naive_utc()));
        }
        for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
                return Ok(Some(dt));
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(Some)
            .ok_or_else(|| PostError::Date(raw.to_string()))
    }
}

/// Render a YAML scalar as text; sequences and mappings yield `None`.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// `tags: [a, b]` or `tags: "a b"` both yield `["a", "b"]`.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(scalar_to_string).collect(),
        other => scalar_to_string(other)
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_basic() {
        let source = "---\nlayout: post\ntitle: Hi\n---\nBody line\n";
        let split = split(source).unwrap();
        assert_eq!(split.yaml, "layout: post\ntitle: Hi\n");
        assert_eq!(split.body, "Body line\n");
        assert_eq!(split.body_line, 5);
    }

    #[test]
    fn test_split_crlf_and_bom() {
        let source = "\u{feff}---\r\ntitle: Hi\r\n---\r\nBody\r\n";
        let split = split(source).unwrap();
        assert_eq!(split.yaml, "title: Hi\r\n");
        assert_eq!(split.body, "Body\r\n");
    }

    #[test]
    fn test_split_document_end_marker() {
        let split = split("---\ntitle: Hi\n...\nBody").unwrap();
        assert_eq!(split.body, "Body");
    }

    #[test]
    fn test_split_empty_block() {
        let split = split("---\n---\n").unwrap();
        assert_eq!(split.yaml, "");
        assert_eq!(split.body, "");
        assert_eq!(split.body_line, 3);
    }

    #[test]
    fn test_split_missing() {
        assert!(matches!(split("# Title\n"), Err(PostError::MissingFrontMatter)));
        assert!(matches!(split(""), Err(PostError::MissingFrontMatter)));
        assert!(matches!(split("----\n"), Err(PostError::MissingFrontMatter)));
    }

    #[test]
    fn test_split_unclosed() {
        assert!(matches!(
            split("---\ntitle: Hi\nbody"),
            Err(PostError::UnclosedFrontMatter)
        ));
    }

    #[test]
    fn test_parse_known_keys() {
        let yaml = r#"
layout: post
title: "distopia: fast distances"
date: 2023-08-10 12:00:00 +0200
author: Richard
tags: [simd, mdanalysis]
categories: news blog
permalink: /distopia/
"#;
        let front = FrontMatter::parse(yaml).unwrap();
        assert_eq!(front.layout.as_deref(), Some("post"));
        assert_eq!(front.title(), "distopia: fast distances");
        assert_eq!(front.author.as_deref(), Some("Richard"));
        assert_eq!(front.tags, ["simd", "mdanalysis"]);
        assert_eq!(front.categories, ["news", "blog"]);
        assert_eq!(front.permalink.as_deref(), Some("/distopia/"));
        assert!(front.published);
        assert!(front.extra.is_empty());
    }

    #[test]
    fn test_parse_extra_and_numeric_title() {
        let front = FrontMatter::parse("title: 2024\nmathjax: true\n").unwrap();
        assert_eq!(front.title(), "2024");
        assert_eq!(front.extra.get("mathjax"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_excerpt_wins_over_description() {
        for yaml in [
            "excerpt: short\ndescription: long\n",
            "description: long\nexcerpt: short\n",
        ] {
            let front = FrontMatter::parse(yaml).unwrap();
            assert_eq!(front.excerpt.as_deref(), Some("short"), "{yaml}");
            assert_eq!(front.extra.get("description"), Some(&Value::from("long")));
        }

        let front = FrontMatter::parse("description: only\n").unwrap();
        assert_eq!(front.excerpt.as_deref(), Some("only"));
    }

    #[test]
    fn test_parse_null_layout() {
        let front = FrontMatter::parse("layout: null\ntitle: x\n").unwrap();
        assert_eq!(front.layout.as_deref(), Some("none"));
    }

    #[test]
    fn test_parse_unpublished() {
        let front = FrontMatter::parse("title: x\npublished: false\n").unwrap();
        assert!(!front.published);
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        let front = FrontMatter::parse("").unwrap();
        assert_eq!(front.title(), "");
        assert_eq!(front.layout, None);

        assert!(matches!(
            FrontMatter::parse("- a\n- b\n"),
            Err(PostError::NotAMapping)
        ));
        assert!(matches!(
            FrontMatter::parse("title: [unclosed\n"),
            Err(PostError::Yaml(_))
        ));
    }

    #[test]
    fn test_datetime_formats() {
        let with = |date: &str| FrontMatter {
            date: Some(date.to_string()),
            ..FrontMatter::default()
        };

        let dt = with("2023-08-10 12:30:00 +0200").datetime().unwrap().unwrap();
        assert_eq!(dt.to_string(), "2023-08-10 10:30:00");

        let dt = with("2023-08-10 12:30").datetime().unwrap().unwrap();
        assert_eq!(dt.to_string(), "2023-08-10 12:30:00");

        let dt = with("2023-08-10").datetime().unwrap().unwrap();
        assert_eq!(dt.to_string(), "2023-08-10 00:00:00");

        assert!(with("last tuesday").datetime().is_err());
        assert_eq!(FrontMatter::default().datetime().unwrap(), None);
    }
}

//! The Liquid subset understood in post bodies and layouts.
//!
//! | Syntax                               | Meaning                               |
//! |--------------------------------------|---------------------------------------|
//! | `{{ page.title }}`                   | variable lookup                       |
//! | `{{ page.date \| date: "%B %d, %Y" }}` | filters, applied left to right     |
//! | `{% include footer.html %}`          | file from the includes directory      |
//! | `{% post_url 2023-08-10-distopia %}` | URL of another post                   |
//! | `{% raw %}…{% endraw %}`             | emitted verbatim                      |
//! | `{% comment %}…{% endcomment %}`     | dropped                               |
//!
//! Anything unknown is an error in strict mode and left in the output as
//! written otherwise.

use crate::{content::math::line_of, utils::slug::slugify};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, format::StrftimeItems, format::Item};
use regex::Regex;
use std::{
    collections::{BTreeMap, HashMap},
    fmt::Write,
    fs, io,
    path::{Component, Path},
    sync::LazyLock,
};
use thiserror::Error;

/// Flattened variables: `page.title`, `site.baseurl`, `content`.
pub type Vars = BTreeMap<String, String>;

/// Include nesting limit, also the guard against include cycles.
pub const MAX_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum LiquidError {
    #[error("unknown variable `{name}` on line {line}")]
    UnknownVariable { name: String, line: usize },

    #[error("unknown filter `{name}` on line {line}")]
    UnknownFilter { name: String, line: usize },

    #[error("filter `{name}` needs an argument on line {line}")]
    MissingArgument { name: String, line: usize },

    #[error("invalid date format `{format}` on line {line}")]
    DateFormat { format: String, line: usize },

    #[error("`{value}` is not a date on line {line}")]
    NotADate { value: String, line: usize },

    #[error("unknown tag `{name}` on line {line}")]
    UnknownTag { name: String, line: usize },

    #[error("`{open}` on line {line} is never closed")]
    Unclosed { open: &'static str, line: usize },

    #[error("include `{name}` not found on line {line}")]
    MissingInclude {
        name: String,
        line: usize,
        #[source]
        source: io::Error,
    },

    #[error("include `{name}` on line {line} must be a relative path inside the includes directory")]
    IncludePath { name: String, line: usize },

    #[error("includes nested deeper than {} levels at `{name}`", MAX_INCLUDE_DEPTH)]
    IncludeDepth { name: String },

    /// An error inside an included file. Its own line counts within that file.
    #[error("in include `{name}` on line {line}: {source}")]
    Include {
        name: String,
        line: usize,
        source: Box<LiquidError>,
    },

    #[error("post_url: no post `{id}` on line {line}")]
    UnknownPost { id: String, line: usize },
}

impl LiquidError {
    /// Line in the rendered template, if known.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::UnknownVariable { line, .. }
            | Self::UnknownFilter { line, .. }
            | Self::MissingArgument { line, .. }
            | Self::DateFormat { line, .. }
            | Self::NotADate { line, .. }
            | Self::UnknownTag { line, .. }
            | Self::Unclosed { line, .. }
            | Self::MissingInclude { line, .. }
            | Self::IncludePath { line, .. }
            | Self::Include { line, .. }
            | Self::UnknownPost { line, .. } => Some(*line),
            Self::IncludeDepth { .. } => None,
        }
    }

    /// Shift the line by `lines`, for a template that starts further down
    /// its file.
    pub fn offset_line(mut self, lines: usize) -> Self {
        match &mut self {
            Self::UnknownVariable { line, .. }
            | Self::UnknownFilter { line, .. }
            | Self::MissingArgument { line, .. }
            | Self::DateFormat { line, .. }
            | Self::NotADate { line, .. }
            | Self::UnknownTag { line, .. }
            | Self::Unclosed { line, .. }
            | Self::MissingInclude { line, .. }
            | Self::IncludePath { line, .. }
            | Self::Include { line, .. }
            | Self::UnknownPost { line, .. } => *line += lines,
            Self::IncludeDepth { .. } => {}
        }
        self
    }
}

/// Everything a template can see.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub vars: &'a Vars,
    pub includes: &'a Path,
    /// Post id (`YYYY-MM-DD-slug`) → site-relative URL.
    pub post_urls: &'a HashMap<String, String>,
    pub strict: bool,
}

/// Expand all Liquid tags and outputs in `template`.
pub fn render(template: &str, ctx: &Context<'_>) -> Result<String, LiquidError> {
    render_at_depth(template, ctx, 0)
}

fn render_at_depth(template: &str, ctx: &Context<'_>, depth: usize) -> Result<String, LiquidError> {
    static RE_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[{%]").unwrap());

    let mut out = String::with_capacity(template.len());
    let mut i = 0;

    while let Some(open) = RE_OPEN.find_at(template, i) {
        let pos = open.start();
        out.push_str(&template[i..pos]);

        let is_output = open.as_str() == "{{";
        let (open_marker, close_marker) = if is_output { ("{{", "}}") } else { ("{%", "%}") };
        let line = line_of(template, pos);

        let Some(inner_len) = template[pos + 2..].find(close_marker) else {
            if ctx.strict {
                return Err(LiquidError::Unclosed {
                    open: open_marker,
                    line,
                });
            }
            out.push_str(&template[pos..]);
            return Ok(out);
        };
        let inner = strip_markers(&template[pos + 2..pos + 2 + inner_len]);
        let token_end = pos + 2 + inner_len + 2;
        let token = &template[pos..token_end];
        i = token_end;

        if is_output {
            let value = eval_output(inner, ctx, line);
            push_or_keep(&mut out, value, token, ctx.strict)?;
            continue;
        }

        let (name, args) = inner.split_once(char::is_whitespace).unwrap_or((inner, ""));
        let args = args.trim();
        match name {
            "raw" | "comment" => {
                let end_name = if name == "raw" { "endraw" } else { "endcomment" };
                match find_block_end(template, token_end, end_name) {
                    Some((body_end, block_end)) => {
                        if name == "raw" {
                            out.push_str(&template[token_end..body_end]);
                        }
                        i = block_end;
                    }
                    None if ctx.strict => {
                        return Err(LiquidError::Unclosed {
                            open: if name == "raw" { "{% raw %}" } else { "{% comment %}" },
                            line,
                        });
                    }
                    None => {
                        out.push_str(&template[pos..]);
                        return Ok(out);
                    }
                }
            }
            "include" => {
                let value = include(args, ctx, depth, line);
                push_or_keep(&mut out, value, token, ctx.strict)?;
            }
            "post_url" => {
                let id = unquote(args);
                let value = ctx
                    .post_urls
                    .get(id)
                    .cloned()
                    .ok_or_else(|| LiquidError::UnknownPost {
                        id: id.to_string(),
                        line,
                    });
                push_or_keep(&mut out, value, token, ctx.strict)?;
            }
            _ => {
                let value = Err(LiquidError::UnknownTag {
                    name: name.to_string(),
                    line,
                });
                push_or_keep(&mut out, value, token, ctx.strict)?;
            }
        }
    }

    out.push_str(&template[i..]);
    Ok(out)
}

/// Push a resolved value, or the raw token when not strict.
fn push_or_keep(
    out: &mut String,
    value: Result<String, LiquidError>,
    token: &str,
    strict: bool,
) -> Result<(), LiquidError> {
    match value {
        Ok(value) => out.push_str(&value),
        Err(_) if !strict => out.push_str(token),
        Err(err) => return Err(err),
    }
    Ok(())
}

/// Trim whitespace and `-` whitespace-control markers.
fn strip_markers(inner: &str) -> &str {
    let inner = inner.strip_prefix('-').unwrap_or(inner);
    let inner = inner.strip_suffix('-').unwrap_or(inner);
    inner.trim()
}

/// `(start of end tag, end of end tag)` for `{% <end_name> %}` after `from`.
fn find_block_end(template: &str, from: usize, end_name: &str) -> Option<(usize, usize)> {
    let pattern = format!(r"\{{%-?\s*{end_name}\s*-?%\}}");
    let re = Regex::new(&pattern).ok()?;
    re.find_at(template, from).map(|m| (m.start(), m.end()))
}

fn include(args: &str, ctx: &Context<'_>, depth: usize, line: usize) -> Result<String, LiquidError> {
    let name = unquote(args.split_whitespace().next().unwrap_or_default()).to_string();
    let relative = Path::new(&name);
    let inside = !name.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !inside {
        return Err(LiquidError::IncludePath { name, line });
    }
    if depth >= MAX_INCLUDE_DEPTH {
        return Err(LiquidError::IncludeDepth { name });
    }

    let source = fs::read_to_string(ctx.includes.join(relative))
        .map_err(|source| LiquidError::MissingInclude {
            name: name.clone(),
            line,
            source,
        })?;
    render_at_depth(&source, ctx, depth + 1).map_err(|err| match err {
        // Reported once, not wrapped at every level.
        err @ LiquidError::IncludeDepth { .. } => err,
        err => LiquidError::Include {
            name,
            line,
            source: Box::new(err),
        },
    })
}

/// Evaluate `value | filter: "arg" | filter`.
fn eval_output(inner: &str, ctx: &Context<'_>, line: usize) -> Result<String, LiquidError> {
    let mut parts = split_pipes(inner).into_iter();
    let head = parts.next().unwrap_or_default().trim();

    let mut value = if is_quoted(head) {
        Some(unquote(head).to_string())
    } else {
        ctx.vars.get(head).cloned()
    };

    for filter in parts {
        let (name, arg) = match filter.split_once(':') {
            Some((name, arg)) => (name.trim(), Some(unquote(arg.trim()))),
            None => (filter.trim(), None),
        };

        if name == "default" {
            let fallback = arg.ok_or_else(|| LiquidError::MissingArgument {
                name: name.to_string(),
                line,
            })?;
            if value.as_deref().is_none_or(str::is_empty) {
                value = Some(fallback.to_string());
            }
            continue;
        }

        let Some(current) = value.take() else {
            continue;
        };
        value = Some(apply_filter(name, arg, &current, ctx, line)?);
    }

    value.ok_or_else(|| LiquidError::UnknownVariable {
        name: head.to_string(),
        line,
    })
}

fn apply_filter(
    name: &str,
    arg: Option<&str>,
    value: &str,
    ctx: &Context<'_>,
    line: usize,
) -> Result<String, LiquidError> {
    let filtered = match name {
        "escape" | "xml_escape" => escape_html(value),
        "upcase" => value.to_uppercase(),
        "downcase" => value.to_lowercase(),
        "strip" => value.trim().to_string(),
        "slugify" => slugify(value),
        "relative_url" => join_url(site_var(ctx, "site.baseurl"), value),
        "absolute_url" => {
            let origin = site_var(ctx, "site.url").trim_end_matches('/');
            format!("{origin}{}", join_url(site_var(ctx, "site.baseurl"), value))
        }
        "date" => {
            let format = arg.ok_or_else(|| LiquidError::MissingArgument {
                name: name.to_string(),
                line,
            })?;
            format_date(value, format, line)?
        }
        _ => {
            return Err(LiquidError::UnknownFilter {
                name: name.to_string(),
                line,
            });
        }
    };
    Ok(filtered)
}

fn site_var<'a>(ctx: &'a Context<'_>, key: &str) -> &'a str {
    ctx.vars.get(key).map(String::as_str).unwrap_or_default()
}

/// `base` + `path` with exactly one slash between them.
fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let base = if base.is_empty() || base.starts_with('/') {
        base.to_string()
    } else {
        format!("/{base}")
    };
    format!("{base}/{path}")
}

fn format_date(value: &str, format: &str, line: usize) -> Result<String, LiquidError> {
    let value = value.trim();
    let datetime = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .ok_or_else(|| LiquidError::NotADate {
            value: value.to_string(),
            line,
        })?;

    let bad_format = || LiquidError::DateFormat {
        format: format.to_string(),
        line,
    };
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(bad_format());
    }
    let mut out = String::new();
    write!(out, "{}", datetime.format(format)).map_err(|_| bad_format())?;
    Ok(out)
}

/// Split on `|` outside quotes.
fn split_pipes(expr: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '|') => {
                parts.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&expr[start..]);
    parts
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
}

fn unquote(s: &str) -> &str {
    if is_quoted(s) { &s[1..s.len() - 1] } else { s }
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Fixture {
        vars: Vars,
        includes: PathBuf,
        post_urls: HashMap<String, String>,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let includes = dir.path().join("_includes");
            fs::create_dir_all(&includes).unwrap();
            fs::write(includes.join("footer.html"), "<footer>{{ site.title }}</footer>").unwrap();
            fs::write(includes.join("loop.html"), "{% include loop.html %}").unwrap();
            fs::write(includes.join("broken.html"), "<aside>\n{{ page.nope }}</aside>").unwrap();

            let vars = Vars::from([
                ("page.title".into(), "distopia & SIMD".into()),
                ("page.date".into(), "2023-08-10".into()),
                ("page.empty".into(), String::new()),
                ("site.title".into(), "MDAnalysis".into()),
                ("site.url".into(), "https://www.mdanalysis.org".into()),
                ("site.baseurl".into(), "/blog".into()),
            ]);
            let post_urls = HashMap::from([(
                "2023-08-10-distopia".to_string(),
                "/2023/08/10/distopia/".to_string(),
            )]);
            Self {
                vars,
                includes,
                post_urls,
                _dir: dir,
            }
        }

        fn ctx(&self, strict: bool) -> Context<'_> {
            Context {
                vars: &self.vars,
                includes: &self.includes,
                post_urls: &self.post_urls,
                strict,
            }
        }

        fn render(&self, template: &str) -> Result<String, LiquidError> {
            render(template, &self.ctx(true))
        }
    }

    #[test]
    fn test_variables_and_plain_text() {
        let fx = Fixture::new();
        assert_eq!(fx.render("no tags here").unwrap(), "no tags here");
        assert_eq!(
            fx.render("<h1>{{ page.title }}</h1> on {{site.title}}").unwrap(),
            "<h1>distopia & SIMD</h1> on MDAnalysis"
        );
    }

    #[test]
    fn test_filters() {
        let fx = Fixture::new();
        assert_eq!(
            fx.render("{{ page.title | escape }}").unwrap(),
            "distopia &amp; SIMD"
        );
        assert_eq!(fx.render("{{ page.title | upcase }}").unwrap(), "DISTOPIA & SIMD");
        assert_eq!(fx.render("{{ page.title | slugify }}").unwrap(), "distopia-simd");
        assert_eq!(
            fx.render(r#"{{ page.date | date: "%B %d, %Y" }}"#).unwrap(),
            "August 10, 2023"
        );
        assert_eq!(
            fx.render(r#"{{ "/css/main.css" | relative_url }}"#).unwrap(),
            "/blog/css/main.css"
        );
        assert_eq!(
            fx.render(r#"{{ "feed.xml" | absolute_url }}"#).unwrap(),
            "https://www.mdanalysis.org/blog/feed.xml"
        );
    }

    #[test]
    fn test_default_filter() {
        let fx = Fixture::new();
        assert_eq!(
            fx.render(r#"{{ page.author | default: "anon" }}"#).unwrap(),
            "anon"
        );
        assert_eq!(
            fx.render(r#"{{ page.empty | default: "x" }}"#).unwrap(),
            "x"
        );
        assert_eq!(
            fx.render(r#"{{ page.title | default: "x" }}"#).unwrap(),
            "distopia & SIMD"
        );
    }

    #[test]
    fn test_quoted_pipe_is_not_a_filter() {
        let fx = Fixture::new();
        assert_eq!(fx.render(r#"{{ "a | b" | upcase }}"#).unwrap(), "A | B");
    }

    #[test]
    fn test_unknown_variable_strict_and_lenient() {
        let fx = Fixture::new();
        let err = fx.render("x\n{{ page.nope }}").unwrap_err();
        assert!(matches!(err, LiquidError::UnknownVariable { ref name, line: 2 } if name == "page.nope"));

        let lenient = render("a {{ page.nope }} b", &fx.ctx(false)).unwrap();
        assert_eq!(lenient, "a {{ page.nope }} b");
    }

    #[test]
    fn test_unknown_filter_and_bad_date() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.render("{{ page.title | frobnicate }}"),
            Err(LiquidError::UnknownFilter { .. })
        ));
        assert!(matches!(
            fx.render(r#"{{ page.title | date: "%Y" }}"#),
            Err(LiquidError::NotADate { .. })
        ));
        assert!(matches!(
            fx.render(r#"{{ page.date | date: "%Q" }}"#),
            Err(LiquidError::DateFormat { .. })
        ));
    }

    #[test]
    fn test_include() {
        let fx = Fixture::new();
        assert_eq!(
            fx.render("{% include footer.html %}").unwrap(),
            "<footer>MDAnalysis</footer>"
        );
        assert_eq!(
            fx.render(r#"{%- include "footer.html" -%}"#).unwrap(),
            "<footer>MDAnalysis</footer>"
        );
    }

    #[test]
    fn test_include_errors() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.render("{% include missing.html %}"),
            Err(LiquidError::MissingInclude { .. })
        ));
        assert!(matches!(
            fx.render("{% include ../secret %}"),
            Err(LiquidError::IncludePath { .. })
        ));
        assert!(matches!(
            fx.render("{% include loop.html %}"),
            Err(LiquidError::IncludeDepth { .. })
        ));
    }

    #[test]
    fn test_error_inside_include_keeps_both_lines() {
        let fx = Fixture::new();
        let err = fx.render("a\nb\n{% include broken.html %}").unwrap_err();
        assert_eq!(err.line(), Some(3));
        let LiquidError::Include { ref name, ref source, .. } = err else {
            panic!("expected an include error, got {err}");
        };
        assert_eq!(name, "broken.html");
        assert_eq!(source.line(), Some(2));

        let shifted = err.offset_line(4);
        assert_eq!(shifted.line(), Some(7));
        assert!(shifted.to_string().starts_with("in include `broken.html` on line 7: unknown variable"));
    }

    #[test]
    fn test_post_url() {
        let fx = Fixture::new();
        assert_eq!(
            fx.render("[prev]({{ site.baseurl }}{% post_url 2023-08-10-distopia %})")
                .unwrap(),
            "[prev](/blog/2023/08/10/distopia/)"
        );
        assert!(matches!(
            fx.render("{% post_url 1999-01-01-nope %}"),
            Err(LiquidError::UnknownPost { .. })
        ));
    }

    #[test]
    fn test_raw_and_comment() {
        let fx = Fixture::new();
        assert_eq!(
            fx.render("{% raw %}{{ not.a.var }}{% endraw %}!").unwrap(),
            "{{ not.a.var }}!"
        );
        assert_eq!(
            fx.render("a{% comment %} {{ gone }} {% endcomment %}b").unwrap(),
            "ab"
        );
        assert!(matches!(
            fx.render("{% raw %} never closed"),
            Err(LiquidError::Unclosed { .. })
        ));
    }

    #[test]
    fn test_unknown_tag_and_unclosed() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.render("{% for x in y %}"),
            Err(LiquidError::UnknownTag { ref name, .. }) if name == "for"
        ));
        assert!(matches!(
            fx.render("{{ page.title"),
            Err(LiquidError::Unclosed { open: "{{", .. })
        ));
        assert_eq!(
            render("{{ page.title", &fx.ctx(false)).unwrap(),
            "{{ page.title"
        );
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("", "/a"), "/a");
        assert_eq!(join_url("/blog/", "a"), "/blog/a");
        assert_eq!(join_url("blog", "/a/"), "/blog/a/");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}

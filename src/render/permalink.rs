//! Permalink patterns: `/:year/:month/:day/:title/`.
//!
//! | Style    | Pattern                                          |
//! |----------|--------------------------------------------------|
//! | `pretty` | `/:categories/:year/:month/:day/:title/`         |
//! | `date`   | `/:categories/:year/:month/:day/:title.html`     |
//! | `none`   | `/:categories/:title.html`                       |

use super::RenderError;
use crate::{content::Post, utils::slug::slugify};
use chrono::Datelike;
use regex::Regex;
use std::{
    path::{Component, Path, PathBuf},
    sync::LazyLock,
};

const PRETTY: &str = "/:categories/:year/:month/:day/:title/";
const DATE: &str = "/:categories/:year/:month/:day/:title.html";
const NONE: &str = "/:categories/:title.html";

/// Map a named style to its pattern; anything else is already a pattern.
pub fn pattern_for(style: &str) -> &str {
    match style {
        "pretty" => PRETTY,
        "date" => DATE,
        "none" => NONE,
        pattern => pattern,
    }
}

/// Site-relative URL of `post`.
///
/// A `permalink` in the post's front matter wins over the site pattern.
pub fn expand(site_pattern: &str, post: &Post) -> String {
    static RE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r":(year|short_year|month|i_month|day|i_day|title|slug|categories)\b").unwrap()
    });

    let pattern = post
        .front
        .permalink
        .as_deref()
        .map(pattern_for)
        .unwrap_or_else(|| pattern_for(site_pattern));
    let date = post.date();

    let url = RE_TOKEN.replace_all(pattern, |caps: &regex::Captures| match &caps[1] {
        "year" => format!("{:04}", date.year()),
        "short_year" => format!("{:02}", date.year() % 100),
        "month" => format!("{:02}", date.month()),
        "i_month" => date.month().to_string(),
        "day" => format!("{:02}", date.day()),
        "i_day" => date.day().to_string(),
        "title" | "slug" => post.slug().to_string(),
        _ => post
            .front
            .categories
            .iter()
            .map(|c| slugify(c))
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("/"),
    });

    collapse_slashes(&url)
}

/// Ensure one leading slash and no empty segments.
fn collapse_slashes(url: &str) -> String {
    let trailing = url.ends_with('/');
    let segments: Vec<_> = url.split('/').filter(|s| !s.is_empty()).collect();
    let mut out = String::with_capacity(url.len() + 1);
    out.push('/');
    out.push_str(&segments.join("/"));
    if trailing && !segments.is_empty() {
        out.push('/');
    }
    out
}

/// File path under `output` that serves `url`.
///
/// `/a/b/` → `a/b/index.html`, `/a/b` → `a/b.html`, `/a/b.html` → `a/b.html`.
pub fn output_path(output: &Path, url: &str) -> Result<PathBuf, RenderError> {
    let relative = url.trim_start_matches('/');
    let mut path = PathBuf::from(relative);

    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(RenderError::Permalink(url.to_string()));
    }

    if url.ends_with('/') {
        path.push("index.html");
    } else if !has_page_extension(&path) {
        // `release-v2.1` is a name, not a file with extension `1`.
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".html");
        path.set_file_name(name);
    }
    Ok(output.join(path))
}

/// Extensions a permalink may end in and be written as is.
const PAGE_EXTENSIONS: [&str; 7] = ["html", "htm", "xml", "json", "txt", "rss", "atom"];

fn has_page_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| PAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(file_name: &str, front: &str) -> Post {
        let source = format!("---\ntitle: t\n{front}---\nbody\n");
        Post::parse(PathBuf::from(file_name), file_name, &source).unwrap()
    }

    #[test]
    fn test_pretty_default() {
        let post = post("2023-08-10-distopia.md", "");
        assert_eq!(expand("pretty", &post), "/2023/08/10/distopia/");
    }

    #[test]
    fn test_named_styles_with_categories() {
        let post = post("2023-08-10-distopia.md", "categories: [News, GSoC 2023]\n");
        assert_eq!(expand("date", &post), "/news/gsoc-2023/2023/08/10/distopia.html");
        assert_eq!(expand("none", &post), "/news/gsoc-2023/distopia.html");
    }

    #[test]
    fn test_custom_pattern_tokens() {
        let post = post("2021-03-05-x.md", "");
        assert_eq!(
            expand("/:short_year/:i_month/:i_day/:slug", &post),
            "/21/3/5/x"
        );
        // unknown tokens stay as written
        assert_eq!(expand("/:year/:unknown/", &post), "/2021/:unknown/");
    }

    #[test]
    fn test_front_matter_permalink_wins() {
        let post = post("2023-08-10-distopia.md", "permalink: /projects/:title/\n");
        assert_eq!(expand("pretty", &post), "/projects/distopia/");
    }

    #[test]
    fn test_collapse_slashes() {
        assert_eq!(collapse_slashes("//a//b/"), "/a/b/");
        assert_eq!(collapse_slashes("a/b.html"), "/a/b.html");
        assert_eq!(collapse_slashes("/"), "/");
    }

    #[test]
    fn test_output_path() {
        let out = Path::new("/site");
        assert_eq!(
            output_path(out, "/2023/08/10/x/").unwrap(),
            PathBuf::from("/site/2023/08/10/x/index.html")
        );
        assert_eq!(output_path(out, "/a/x").unwrap(), PathBuf::from("/site/a/x.html"));
        assert_eq!(
            output_path(out, "/a/x.html").unwrap(),
            PathBuf::from("/site/a/x.html")
        );
        assert_eq!(output_path(out, "/").unwrap(), PathBuf::from("/site/index.html"));
    }

    #[test]
    fn test_output_path_dotted_name_gets_html() {
        let out = Path::new("/site");
        assert_eq!(
            output_path(out, "/a/release-v2.1").unwrap(),
            PathBuf::from("/site/a/release-v2.1.html")
        );
        assert_eq!(
            output_path(out, "/feed.xml").unwrap(),
            PathBuf::from("/site/feed.xml")
        );

        let post = post("2023-08-10-release-v2.1.md", "permalink: /:title\n");
        let url = expand("pretty", &post);
        assert_eq!(url, "/release-v2.1");
        assert_eq!(
            output_path(out, &url).unwrap(),
            PathBuf::from("/site/release-v2.1.html")
        );
    }

    #[test]
    fn test_output_path_rejects_escape() {
        assert!(output_path(Path::new("/site"), "/../etc/x.html").is_err());
    }
}

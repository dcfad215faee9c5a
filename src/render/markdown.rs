//! Markdown to HTML with `pulldown-cmark`.

use crate::content::{links::UnresolvedLink, math::line_of};
use pulldown_cmark::{BrokenLink, CowStr, Options, Parser, html};

/// Extensions enabled for every post.
pub fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

/// Rendered HTML plus the reference labels that had no definition.
///
/// Unresolved references are left in the HTML as their literal source text,
/// e.g. `[SIMD][simd-wiki]`.
#[derive(Debug, Clone, Default)]
pub struct Markdown {
    pub html: String,
    pub unresolved: Vec<UnresolvedLink>,
}

/// Render `text` to HTML, collecting unresolved reference labels.
pub fn to_html(text: &str) -> Markdown {
    to_html_with_lines(text, |offset| line_of(text, offset))
}

/// Like [`to_html`], with unresolved labels numbered by `line_at`.
pub fn to_html_with_lines<'a>(text: &'a str, line_at: impl Fn(usize) -> usize) -> Markdown {
    let mut unresolved = Vec::new();
    let mut out = String::with_capacity(text.len() + text.len() / 2);
    {
        let callback = |link: BrokenLink<'a>| -> Option<(CowStr<'a>, CowStr<'a>)> {
            if let Some(found) = UnresolvedLink::from_broken(&link, &line_at) {
                unresolved.push(found);
            }
            None
        };
        let parser = Parser::new_with_broken_link_callback(text, options(), Some(callback));
        html::push_html(&mut out, parser);
    }
    Markdown {
        html: out,
        unresolved,
    }
}

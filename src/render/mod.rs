//! Rendering a post into a finished HTML page.
//!
//! ```text
//! body ─► Liquid ─► protect $$math$$ ─► Markdown ─► restore math ─► layouts ─► minify
//! ```

pub mod layout;
pub mod liquid;
pub mod markdown;
pub mod permalink;

pub use layout::Layouts;

use crate::{
    config::SiteConfig,
    content::{Post, PostError, frontmatter::scalar_to_string, links::UnresolvedLink, math},
    utils::minify::{MinifyType, minify},
};
use liquid::{Context, LiquidError, Vars};
use markdown::Markdown;
use std::{collections::HashMap, io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Post(#[from] PostError),

    #[error("{template}: {source}")]
    Liquid {
        template: String,
        #[source]
        source: LiquidError,
    },

    #[error("unknown layout `{0}`")]
    UnknownLayout(String),

    #[error("layout cycle: {}", .0.join(" -> "))]
    LayoutCycle(Vec<String>),

    #[error("unresolved link reference {}", describe_unresolved(.0))]
    UnresolvedLinks(Vec<UnresolvedLink>),

    #[error("permalink `{0}` escapes the output directory")]
    Permalink(String),

    #[error("IO error with `{0}`")]
    Io(PathBuf, #[source] io::Error),
}

fn describe_unresolved(links: &[UnresolvedLink]) -> String {
    links
        .iter()
        .map(|link| format!("`[{}]` on line {}", link.label, link.line))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One finished page.
#[derive(Debug, Clone)]
pub struct RenderedPost {
    /// Site-relative URL, without `baseurl`.
    pub url: String,
    /// Destination file under the output directory.
    pub output: PathBuf,
    /// The full page after layouts and minification.
    pub html: Vec<u8>,
    /// The post body alone, before any layout.
    pub content_html: String,
    /// Labels left unresolved in non-strict mode, with file line numbers.
    pub unresolved: Vec<UnresolvedLink>,
}

/// Shared state for rendering every post of a site.
#[derive(Debug)]
pub struct Renderer<'a> {
    config: &'a SiteConfig,
    layouts: Layouts,
    /// Post id → URL, for `post_url`.
    urls: HashMap<String, String>,
    site_vars: Vars,
}

impl<'a> Renderer<'a> {
    /// Load layouts and index `posts` for `post_url`.
    pub fn new(config: &'a SiteConfig, posts: &[Post]) -> Result<Self, RenderError> {
        let layouts = Layouts::load(&config.build.layouts)?;
        Ok(Self::with_layouts(config, posts, layouts))
    }

    pub fn with_layouts(config: &'a SiteConfig, posts: &[Post], layouts: Layouts) -> Self {
        let urls = posts
            .iter()
            .map(|post| (post.id(), permalink::expand(&config.build.permalink, post)))
            .collect();
        Self {
            config,
            layouts,
            urls,
            site_vars: site_vars(config),
        }
    }

    /// Site-relative URL of `post`.
    pub fn url_for(&self, post: &Post) -> String {
        permalink::expand(&self.config.build.permalink, post)
    }

    /// Render one post. Pure: the same post and site always give the same
    /// bytes.
    pub fn render(&self, post: &Post) -> Result<RenderedPost, RenderError> {
        let strict = self.config.build.strict;
        let url = self.url_for(post);
        let output = permalink::output_path(&self.config.build.output, &url)?;
        let mut vars = self.page_vars(post, &url);

        let body = liquid::render(&post.body, &self.context(&vars)).map_err(|source| {
            RenderError::Liquid {
                template: post.source.display().to_string(),
                source: source.offset_line(post.body_line - 1),
            }
        })?;

        let Markdown { html, unresolved } = match math::protect(&body) {
            Ok(protected) => {
                let md = markdown::to_html_with_lines(&protected.text, |offset| {
                    protected.source_line(offset)
                });
                Markdown {
                    html: protected.restore(&md.html),
                    unresolved: md.unresolved,
                }
            }
            Err(PostError::UnbalancedMath { line }) if strict => {
                return Err(PostError::UnbalancedMath {
                    line: line + post.body_line - 1,
                }
                .into());
            }
            Err(err) if strict => return Err(err.into()),
            Err(_) => markdown::to_html(&body),
        };

        let unresolved: Vec<_> = unresolved
            .into_iter()
            .map(|link| UnresolvedLink {
                line: link.line + post.body_line - 1,
                ..link
            })
            .collect();
        if strict && !unresolved.is_empty() {
            return Err(RenderError::UnresolvedLinks(unresolved));
        }

        let content_html = html;
        let mut page = content_html.clone();
        for layout in self.layouts.chain(post.layout().unwrap_or("none"))? {
            vars.insert("content".to_string(), std::mem::take(&mut page));
            page = liquid::render(&layout.template, &self.context(&vars)).map_err(|source| {
                RenderError::Liquid {
                    template: layout.source.display().to_string(),
                    source: source.offset_line(layout.body_line - 1),
                }
            })?;
        }

        let html = minify(MinifyType::Html(page.as_bytes()), self.config).into_owned();
        Ok(RenderedPost {
            url,
            output,
            html,
            content_html,
            unresolved,
        })
    }

    fn context<'v>(&'v self, vars: &'v Vars) -> Context<'v> {
        Context {
            vars,
            includes: &self.config.build.includes,
            post_urls: &self.urls,
            strict: self.config.build.strict,
        }
    }

    fn page_vars(&self, post: &Post, url: &str) -> Vars {
        let mut vars = self.site_vars.clone();
        let front = &post.front;

        for (key, value) in &front.extra {
            if let Some(value) = scalar_to_string(value) {
                vars.insert(format!("page.{key}"), value);
            }
        }

        let page = [
            ("title", post.title().to_string()),
            ("layout", post.layout().unwrap_or_default().to_string()),
            ("date", post.date().format("%Y-%m-%d").to_string()),
            ("url", url.to_string()),
            ("slug", post.slug().to_string()),
            ("id", post.id()),
            ("author", front.author.clone().unwrap_or_default()),
            ("excerpt", front.excerpt.clone().unwrap_or_default()),
            ("tags", front.tags.join(", ")),
            ("categories", front.categories.join(", ")),
        ];
        for (key, value) in page {
            vars.insert(format!("page.{key}"), value);
        }
        vars
    }
}

fn site_vars(config: &SiteConfig) -> Vars {
    let site = &config.site;
    let mut vars: Vars = config
        .extra
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(n) => n.to_string(),
                toml::Value::Float(n) => n.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Datetime(dt) => dt.to_string(),
                toml::Value::Array(_) | toml::Value::Table(_) => return None,
            };
            Some((format!("site.{key}"), value))
        })
        .collect();

    let known = [
        ("title", site.title.clone()),
        ("description", site.description.clone()),
        ("url", site.url.clone().unwrap_or_default()),
        ("baseurl", site.baseurl.clone()),
        ("author", site.author.clone()),
        ("language", site.language.clone()),
    ];
    for (key, value) in known {
        vars.insert(format!("site.{key}"), value);
    }
    vars
}

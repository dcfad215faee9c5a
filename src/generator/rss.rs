//! RSS 2.0 feed generation.
//!
//! Built from rendered posts, newest first. No `lastBuildDate` is written so
//! rebuilding unchanged posts produces an identical feed.

use crate::{
    config::SiteConfig,
    content::Post,
    log,
    render::{RenderedPost, liquid::escape_html},
    utils::minify::{MinifyType, minify},
};
use anyhow::{Context, Result, anyhow};
use regex::Regex;
use rss::{CategoryBuilder, ChannelBuilder, GuidBuilder, ItemBuilder, validation::Validate};
use std::{fs, sync::LazyLock};

/// A post paired with its rendered output.
#[derive(Debug, Clone, Copy)]
pub struct FeedEntry<'a> {
    pub post: &'a Post,
    pub rendered: &'a RenderedPost,
}

/// Build the rss feed if enabled in config.
pub fn build_rss(config: &SiteConfig, entries: &[FeedEntry<'_>]) -> Result<()> {
    if config.build.rss.enable {
        RssFeed::new(config, entries).write()?;
    }
    Ok(())
}

struct RssFeed<'a> {
    config: &'a SiteConfig,
    entries: Vec<FeedEntry<'a>>,
}

impl<'a> RssFeed<'a> {
    /// Keep the newest `limit` entries.
    fn new(config: &'a SiteConfig, entries: &[FeedEntry<'a>]) -> Self {
        let mut entries = entries.to_vec();
        entries.sort_by(|a, b| {
            (b.post.datetime(), b.post.id()).cmp(&(a.post.datetime(), a.post.id()))
        });
        entries.truncate(config.build.rss.limit);
        Self { config, entries }
    }

    fn into_xml(self) -> Result<String> {
        let base = self.config.site.absolute_base();
        let items: Vec<_> = self
            .entries
            .iter()
            .map(|entry| entry_to_item(entry, &base, self.config))
            .collect();

        let site = &self.config.site;
        let channel = ChannelBuilder::default()
            .title(&site.title)
            .link(format!("{base}/"))
            .description(&site.description)
            .language(Some(site.language.clone()))
            .generator(Some("inkpost".to_string()))
            .items(items)
            .build();

        channel
            .validate()
            .map_err(|e| anyhow!("rss validation failed: {e}"))?;
        Ok(channel.to_string())
    }

    fn write(self) -> Result<()> {
        let config = self.config;
        let count = self.entries.len();
        let xml = self.into_xml()?;
        let xml = minify(MinifyType::Xml(xml.as_bytes()), config);
        let path = config.feed_path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create `{}`", parent.display()))?;
        }
        fs::write(&path, &*xml).with_context(|| format!("failed to write `{}`", path.display()))?;

        log!("rss"; "{} ({count} items)", config.build.rss.path.display());
        Ok(())
    }
}

fn entry_to_item(entry: &FeedEntry<'_>, base: &str, config: &SiteConfig) -> rss::Item {
    let FeedEntry { post, rendered } = *entry;
    let link = format!("{base}{}", rendered.url);
    let description = post
        .front
        .excerpt
        .as_deref()
        .map(escape_html)
        .or_else(|| first_paragraph(&rendered.content_html));
    let categories = post
        .front
        .categories
        .iter()
        .chain(&post.front.tags)
        .map(|name| CategoryBuilder::default().name(name.clone()).build())
        .collect::<Vec<_>>();

    ItemBuilder::default()
        .title(Some(post.title().to_string()))
        .link(Some(link.clone()))
        .guid(Some(GuidBuilder::default().permalink(true).value(link).build()))
        .description(description)
        .pub_date(Some(post.datetime().and_utc().to_rfc2822()))
        .author(rss_author(post.front.author.as_deref(), config))
        .categories(categories)
        .build()
}

/// Inner HTML of the first `<p>` element.
fn first_paragraph(html: &str) -> Option<String> {
    static RE_PARAGRAPH: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<p>(.*?)</p>").unwrap());

    RE_PARAGRAPH
        .captures(html)
        .map(|caps| caps[1].trim().to_string())
        .filter(|text| !text.is_empty())
}

/// RSS wants `email@example.com (Name)`; anything else is left out.
fn rss_author(author: Option<&str>, config: &SiteConfig) -> Option<String> {
    static RE_VALID_AUTHOR: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}[ \t]*\([^)]+\)$").unwrap()
    });

    author
        .into_iter()
        .chain(std::iter::once(config.site.author.as_str()))
        .find(|author| RE_VALID_AUTHOR.is_match(author))
        .map(str::to_string)
}

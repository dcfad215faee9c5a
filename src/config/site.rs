//! `[site]` section configuration.
//!
//! Site-wide values exposed to templates as `site.*`.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[site]` section in inkpost.toml.
///
/// # Example
/// ```toml
/// [site]
/// title = "My Blog"
/// url = "https://myblog.com"
/// baseurl = "/blog"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteInfo {
    /// Site title.
    #[serde(default = "defaults::site::title")]
    #[educe(Default = defaults::site::title())]
    pub title: String,

    /// Site description, used as the feed description.
    #[serde(default)]
    pub description: String,

    /// Absolute origin for links in the feed. Required for RSS.
    #[serde(default = "defaults::site::url")]
    #[educe(Default = defaults::site::url())]
    pub url: Option<String>,

    /// Path prefix when the site is served from a subdirectory.
    #[serde(default)]
    pub baseurl: String,

    #[serde(default)]
    pub author: String,

    /// BCP 47 language code.
    #[serde(default = "defaults::site::language")]
    #[educe(Default = defaults::site::language())]
    pub language: String,
}

impl SiteInfo {
    /// `url` + `baseurl` without a trailing slash.
    pub fn absolute_base(&self) -> String {
        let origin = self.url.as_deref().unwrap_or_default().trim_end_matches('/');
        let base = self.baseurl.trim_matches('/');
        if base.is_empty() {
            origin.to_string()
        } else {
            format!("{origin}/{base}")
        }
    }
}

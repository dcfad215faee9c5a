//! `[build]` section configuration.
//!
//! Source and output directories, permalink style and rendering switches.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[build]` section in inkpost.toml.
///
/// # Example
/// ```toml
/// [build]
/// posts = "_posts"
/// output = "_site"
/// permalink = "/:year/:title/"
/// strict = true
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Directory holding `YYYY-MM-DD-slug.md` files.
    #[serde(default = "defaults::build::posts")]
    #[educe(Default = defaults::build::posts())]
    pub posts: PathBuf,

    /// Directory holding `<name>.html` layouts.
    #[serde(default = "defaults::build::layouts")]
    #[educe(Default = defaults::build::layouts())]
    pub layouts: PathBuf,

    /// Directory searched by `{% include %}`.
    #[serde(default = "defaults::build::includes")]
    #[educe(Default = defaults::build::includes())]
    pub includes: PathBuf,

    /// Static files copied verbatim into the output.
    #[serde(default = "defaults::build::assets")]
    #[educe(Default = defaults::build::assets())]
    pub assets: PathBuf,

    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Named style (`pretty`, `date`, `none`) or a pattern with `:tokens`.
    #[serde(default = "defaults::build::permalink")]
    #[educe(Default = defaults::build::permalink())]
    pub permalink: String,

    /// Unresolved labels, variables, includes are errors rather than
    /// being left visibly in the output.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub strict: bool,

    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub minify: bool,

    /// Render posts with `published: false`.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub drafts: bool,

    #[serde(default)]
    pub rss: RssConfig,
}

/// `[build.rss]` section.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct RssConfig {
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub enable: bool,

    /// Feed path relative to the output directory.
    #[serde(default = "defaults::build::rss::path")]
    #[educe(Default = defaults::build::rss::path())]
    pub path: PathBuf,

    /// Maximum number of items, newest first.
    #[serde(default = "defaults::build::rss::limit")]
    #[educe(Default = defaults::build::rss::limit())]
    pub limit: usize,
}

//! Project configuration from `inkpost.toml`.
//!
//! # Sections
//!
//! | Section        | Purpose                                       |
//! |----------------|-----------------------------------------------|
//! | `[site]`       | Site metadata exposed as `site.*`             |
//! | `[build]`      | Directories, permalink style, strict mode     |
//! | `[build.rss]`  | Feed generation                               |
//! | `[extra]`      | User-defined fields, also exposed as `site.*` |
//!
//! A missing config file is not an error: every field has a default that
//! matches the usual `_posts` / `_layouts` / `_site` layout.

mod build;
pub mod defaults;
mod error;
mod site;

pub use build::BuildConfig;
pub use error::ConfigError;
pub use site::SiteInfo;

use crate::cli::{Cli, Commands};
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Root configuration structure representing inkpost.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute project root (set after loading)
    #[serde(skip)]
    pub root: PathBuf,

    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub site: SiteInfo,

    #[serde(default)]
    pub build: BuildConfig,

    /// User-defined fields, sorted so template output stays stable
    #[serde(default)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load `<root>/<config>` (or defaults when absent) and apply CLI overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };
        config.config_path = normalize_path(&config_path);
        config.update_with_cli(cli);
        config.resolve_paths(root);

        if !matches!(cli.command, Commands::New { .. }) {
            config.validate()?;
        }
        Ok(config)
    }

    /// Update configuration with CLI arguments
    fn update_with_cli(&mut self, cli: &Cli) {
        update_option(&mut self.build.output, cli.output.as_ref());

        if let Some(args) = cli.render_args() {
            update_option(&mut self.build.strict, args.strict.as_ref());
            update_option(&mut self.build.minify, args.minify.as_ref());
            if args.drafts {
                self.build.drafts = true;
            }
        }
    }

    /// Make every directory absolute relative to `root`.
    pub fn resolve_paths(&mut self, root: &Path) {
        let root = normalize_path(root);
        self.build.posts = normalize_path(&root.join(&self.build.posts));
        self.build.layouts = normalize_path(&root.join(&self.build.layouts));
        self.build.includes = normalize_path(&root.join(&self.build.includes));
        self.build.assets = normalize_path(&root.join(&self.build.assets));
        self.build.output = normalize_path(&root.join(&self.build.output));
        self.root = root;
    }

    /// Absolute path of the RSS feed file.
    pub fn feed_path(&self) -> PathBuf {
        self.build.output.join(&self.build.rss.path)
    }

    /// Validate field combinations that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.site.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!(ConfigError::Validation(
                    "[site.url] must start with http:// or https://".into()
                ));
            }
        }

        if self.build.rss.enable && self.site.url.is_none() {
            bail!(ConfigError::Validation(
                "[site.url] is required when [build.rss.enable] = true".into()
            ));
        }

        let permalink = self.build.permalink.as_str();
        let is_named = matches!(permalink, "pretty" | "date" | "none");
        if !is_named && !permalink.starts_with('/') {
            bail!(ConfigError::Validation(format!(
                "[build.permalink] must be pretty, date, none or start with '/': `{permalink}`"
            )));
        }

        if self.build.output == self.build.posts || self.build.output == self.root {
            bail!(ConfigError::Validation(
                "[build.output] must not be the project root or the posts directory".into()
            ));
        }

        Ok(())
    }
}

/// Update config option if CLI value is provided
fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
    if let Some(option) = cli_option {
        *config_option = option.clone();
    }
}

/// Normalize a path to absolute, using canonicalize if the path exists
fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config_in(root: &Path, toml: &str) -> SiteConfig {
        let mut config = SiteConfig::from_str(toml).unwrap();
        config.resolve_paths(root);
        config
    }

    #[test]
    fn test_resolve_paths_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "");

        assert!(config.build.posts.is_absolute());
        assert!(config.build.posts.ends_with("_posts"));
        assert!(config.build.output.ends_with("_site"));
        assert!(config.feed_path().ends_with("_site/feed.xml"));
    }

    #[test]
    fn test_validate_defaults_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(config_in(dir.path(), "").validate().is_ok());
    }

    #[test]
    fn test_validate_url_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "[site]\nurl = \"example.com\"\n");
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("[site.url]"));
    }

    #[test]
    fn test_validate_rss_requires_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "[build.rss]\nenable = true\n");
        assert!(config.validate().is_err());

        let config = config_in(
            dir.path(),
            "[site]\nurl = \"https://a.org\"\n[build.rss]\nenable = true\n",
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rss_off_unless_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "[site]\ntitle = \"My Blog\"\n");
        assert!(!config.build.rss.enable);
        assert!(config.validate().is_ok());

        let sample = r#"
[site]
title = "My Blog"
url = "https://example.com"

[build.rss]
enable = false
path = "feed.xml"
limit = 20
"#;
        let config = config_in(dir.path(), sample);
        assert!(!config.build.rss.enable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_permalink() {
        let dir = tempfile::tempdir().unwrap();
        assert!(config_in(dir.path(), "[build]\npermalink = \"date\"\n").validate().is_ok());
        assert!(
            config_in(dir.path(), "[build]\npermalink = \"/:year/:title/\"\n")
                .validate()
                .is_ok()
        );
        assert!(
            config_in(dir.path(), "[build]\npermalink = \":year/:title\"\n")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_validate_output_not_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "[build]\noutput = \".\"\n");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extra_is_sorted() {
        let config = SiteConfig::from_str("[extra]\nzeta = 1\nalpha = \"a\"\n").unwrap();
        let keys: Vec<_> = config.extra.keys().cloned().collect();
        assert_eq!(keys, ["alpha", "zeta"]);
    }

    #[test]
    fn test_load_applies_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("inkpost.toml"), "[build]\nstrict = true\n").unwrap();
        let root = dir.path().to_str().unwrap();

        let cli = Cli::parse_from(["inkpost", "-r", root, "build", "--strict=false", "--drafts"]);
        let config = SiteConfig::load(&cli).unwrap();

        assert!(!config.build.strict);
        assert!(config.build.drafts);
        assert!(config.config_path.ends_with("inkpost.toml"));
    }

    #[test]
    fn test_load_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();

        let cli = Cli::parse_from(["inkpost", "-r", root, "check"]);
        let config = SiteConfig::load(&cli).unwrap();
        assert_eq!(config.site.title, "My Blog");
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("inkpost.toml"), "[site\n").unwrap();
        let root = dir.path().to_str().unwrap();

        let cli = Cli::parse_from(["inkpost", "-r", root, "check"]);
        assert!(SiteConfig::load(&cli).is_err());
    }
}

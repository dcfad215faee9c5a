//! Post scaffolding.

use crate::{config::SiteConfig, content::filename::PostName, log, utils::slug::slugify};
use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde_yaml::Value;
use std::{fs, path::PathBuf};

/// Create `<posts>/<date>-<slug>.md` for `title`.
///
/// Without `date` the post is dated now and the front matter records the
/// local time. Never overwrites an existing file.
pub fn new_post(config: &SiteConfig, title: &str, date: Option<&str>, layout: &str) -> Result<PathBuf> {
    let title = title.trim();
    if title.is_empty() {
        bail!("post title must not be empty");
    }
    let slug = slugify(title);
    if slug.is_empty() {
        bail!("cannot derive a filename slug from title `{title}`");
    }

    let (date, timestamp) = match date {
        Some(date) => {
            let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .with_context(|| format!("invalid date `{date}`, expected YYYY-MM-DD"))?;
            (date, None)
        }
        None => {
            let now = Local::now();
            (now.date_naive(), Some(now.format("%Y-%m-%d %H:%M:%S %z").to_string()))
        }
    };

    let file_name = format!("{}-{slug}.md", date.format("%Y-%m-%d"));
    PostName::parse(&file_name)?;

    let dir = &config.build.posts;
    let path = dir.join(&file_name);
    if path.exists() {
        bail!("`{}` already exists", path.display());
    }

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    fs::write(&path, scaffold(title, layout, timestamp.as_deref())?)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    log!("new"; "{}", path.display());
    Ok(path)
}

fn scaffold(title: &str, layout: &str, timestamp: Option<&str>) -> Result<String> {
    let quoted_title = serde_yaml::to_string(&Value::String(title.to_string()))?;
    let mut out = String::from("---\n");
    out.push_str(&format!("layout: {layout}\n"));
    out.push_str(&format!("title: {}", quoted_title));
    if let Some(timestamp) = timestamp {
        out.push_str(&format!("date: {timestamp}\n"));
    }
    out.push_str("---\n\n");
    Ok(out)
}

//! Site building orchestration.
//!
//! ```text
//! build_site()
//!     │
//!     ├── load_posts()      parse every post in parallel
//!     ├── render            every published post in parallel
//!     ├── write pages       after output paths are known to be unique
//!     ├── copy_assets()
//!     └── build_rss()
//! ```
//!
//! Every post is attempted; failures are logged with their paths and fail
//! the build at the end.

use crate::{
    config::SiteConfig,
    content::{Post, load_posts},
    generator::rss::{FeedEntry, build_rss},
    log,
    render::{RenderedPost, Renderer},
};
use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};
use walkdir::WalkDir;

/// What a build produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub pages: usize,
    pub skipped: usize,
    pub assets: usize,
    pub feed: Option<PathBuf>,
}

/// Build the site into `config.build.output`.
///
/// With `clean`, the output directory is removed first.
pub fn build_site(config: &SiteConfig, clean: bool) -> Result<BuildSummary> {
    let output = &config.build.output;
    prepare_output(output, clean)?;

    let loaded = load_posts(&config.build.posts);
    let mut failures = loaded.errors.len();
    for (path, err) in &loaded.errors {
        log!("error"; "{}: {err}", path.display());
    }

    let (posts, skipped): (Vec<Post>, Vec<Post>) = loaded
        .posts
        .into_iter()
        .partition(|post| post.published() || config.build.drafts);
    if !skipped.is_empty() {
        log!("build"; "skipping {} unpublished posts", skipped.len());
    }

    let renderer = Renderer::new(config, &posts).with_context(|| {
        format!("failed to load layouts from `{}`", config.build.layouts.display())
    })?;

    let render_failures = AtomicUsize::new(0);
    let rendered: Vec<Option<RenderedPost>> = posts
        .par_iter()
        .map(|post| match renderer.render(post) {
            Ok(page) => {
                for link in &page.unresolved {
                    log!("warn"; "{}:{}: unresolved link reference `[{}]`", post.source.display(), link.line, link.label);
                }
                Some(page)
            }
            Err(err) => {
                render_failures.fetch_add(1, Ordering::Relaxed);
                log!("error"; "{}: {err}", post.source.display());
                None
            }
        })
        .collect();
    failures += render_failures.into_inner();

    failures += report_collisions(&posts, &rendered);
    if failures > 0 {
        bail!("build failed: {failures} posts with errors");
    }

    let pages: Vec<_> = posts
        .iter()
        .zip(&rendered)
        .filter_map(|(post, page)| page.as_ref().map(|rendered| FeedEntry { post, rendered }))
        .collect();

    pages
        .par_iter()
        .try_for_each(|entry| write_page(entry.rendered))?;
    log!("build"; "{} pages", pages.len());

    let assets = copy_assets(&config.build.assets, output)?;
    build_rss(config, &pages)?;

    Ok(BuildSummary {
        pages: pages.len(),
        skipped: skipped.len(),
        assets,
        feed: config.build.rss.enable.then(|| config.feed_path()),
    })
}

/// Create the output directory, clearing it first when `clean` is set.
fn prepare_output(output: &Path, clean: bool) -> Result<()> {
    if clean && output.exists() {
        fs::remove_dir_all(output).with_context(|| {
            format!("Failed to clear output directory: {}", output.display())
        })?;
    }
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))
}

/// Log every output path claimed by more than one post; return how many
/// posts collided.
fn report_collisions(posts: &[Post], rendered: &[Option<RenderedPost>]) -> usize {
    let mut owners: HashMap<&Path, Vec<&Post>> = HashMap::new();
    for (post, page) in posts.iter().zip(rendered) {
        if let Some(page) = page {
            owners.entry(page.output.as_path()).or_default().push(post);
        }
    }

    let mut collisions: Vec<_> = owners.into_iter().filter(|(_, p)| p.len() > 1).collect();
    collisions.sort_by_key(|(path, _)| *path);

    let mut count = 0;
    for (path, posts) in collisions {
        let sources: Vec<_> = posts.iter().map(|p| p.source.display().to_string()).collect();
        log!("error"; "{} is written by more than one post: {}", path.display(), sources.join(", "));
        count += posts.len();
    }
    count
}

fn write_page(page: &RenderedPost) -> Result<()> {
    if let Some(parent) = page.output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&page.output, &page.html)
        .with_context(|| format!("Failed to write {}", page.output.display()))
}

/// Copy `assets` into `output/<assets dir name>`, keeping the layout.
///
/// Hidden files are skipped. Returns the number of files copied.
fn copy_assets(assets: &Path, output: &Path) -> Result<usize> {
    if !assets.is_dir() {
        return Ok(0);
    }
    let target = output.join(assets.file_name().unwrap_or_default());

    let files: Vec<_> = WalkDir::new(assets)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect();

    files.par_iter().try_for_each(|source| -> Result<()> {
        let relative = source.strip_prefix(assets)?;
        let dest = target.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, &dest)
            .with_context(|| format!("Failed to copy {}", source.display()))?;
        Ok(())
    })?;

    if !files.is_empty() {
        log!("assets"; "{} files", files.len());
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: &str = "<html><head><title>{{ page.title }}</title></head><body>{{ content }}</body></html>";

    fn site(posts: &[(&str, &str)]) -> (tempfile::TempDir, SiteConfig) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("_posts")).unwrap();
        fs::create_dir_all(root.join("_layouts")).unwrap();
        fs::create_dir_all(root.join("assets/css")).unwrap();
        fs::write(root.join("_layouts/post.html"), LAYOUT).unwrap();
        fs::write(root.join("assets/css/main.css"), "body{}").unwrap();
        fs::write(root.join("assets/.DS_Store"), "").unwrap();
        for (name, source) in posts {
            fs::write(root.join("_posts").join(name), source).unwrap();
        }

        let mut config = SiteConfig::default();
        config.site.url = Some("https://www.mdanalysis.org".to_string());
        config.build.rss.enable = true;
        config.resolve_paths(root);
        (dir, config)
    }

    const DISTOPIA: &str = "---\nlayout: post\ntitle: distopia\n---\nFast [SIMD][simd] $$a<b$$.\n\n[simd]: https://en.wikipedia.org/wiki/SIMD\n";

    #[test]
    fn test_build_site() {
        let (_dir, config) = site(&[
            ("2023-08-10-distopia.md", DISTOPIA),
            ("2023-09-01-draft.md", "---\nlayout: post\ntitle: draft\npublished: false\n---\nwip\n"),
        ]);

        let summary = build_site(&config, false).unwrap();
        assert_eq!(summary.pages, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.assets, 1);

        let out = &config.build.output;
        let page = fs::read_to_string(out.join("2023/08/10/distopia/index.html")).unwrap();
        assert!(page.contains("<title>distopia</title>"));
        assert!(page.contains("$$a&lt;b$$"));
        assert!(!out.join("2023/09/01/draft/index.html").exists());
        assert!(out.join("assets/css/main.css").exists());
        assert!(!out.join("assets/.DS_Store").exists());

        let feed = fs::read_to_string(summary.feed.unwrap()).unwrap();
        assert!(feed.contains("https://www.mdanalysis.org/2023/08/10/distopia/"));
    }

    #[test]
    fn test_drafts_flag_includes_unpublished() {
        let (_dir, mut config) = site(&[(
            "2023-09-01-draft.md",
            "---\nlayout: post\ntitle: draft\npublished: false\n---\nwip\n",
        )]);
        config.build.drafts = true;
        let summary = build_site(&config, false).unwrap();
        assert_eq!(summary.pages, 1);
        assert!(config.build.output.join("2023/09/01/draft/index.html").exists());
    }

    #[test]
    fn test_build_is_byte_identical() {
        let (_dir, config) = site(&[
            ("2023-08-10-distopia.md", DISTOPIA),
            ("2021-01-01-older.md", "---\nlayout: post\ntitle: older\n---\nsee {% post_url 2023-08-10-distopia %}\n"),
        ]);
        let read_all = |config: &SiteConfig| -> Vec<(PathBuf, Vec<u8>)> {
            let mut files: Vec<_> = WalkDir::new(&config.build.output)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| (e.path().to_path_buf(), fs::read(e.path()).unwrap()))
                .collect();
            files.sort();
            files
        };

        build_site(&config, true).unwrap();
        let first = read_all(&config);
        build_site(&config, true).unwrap();
        assert_eq!(first, read_all(&config));
    }

    #[test]
    fn test_failure_after_all_posts_attempted() {
        let (_dir, config) = site(&[
            ("2023-01-01-a.md", "---\nlayout: post\ntitle: a\n---\n[x][missing]\n"),
            ("2023-01-02-b.md", "no front matter"),
            ("2023-01-03-c.md", "---\nlayout: post\ntitle: c\n---\nfine\n"),
        ]);
        let err = build_site(&config, false).unwrap_err();
        assert!(err.to_string().contains("2 posts"));
        // nothing is written when any post fails
        assert!(!config.build.output.join("2023/01/03/c/index.html").exists());
    }

    #[test]
    fn test_colliding_output_paths() {
        let (_dir, config) = site(&[
            ("2023-01-01-a.md", "---\nlayout: post\ntitle: a\npermalink: /same/\n---\n"),
            ("2023-01-02-b.md", "---\nlayout: post\ntitle: b\npermalink: /same/\n---\n"),
        ]);
        let err = build_site(&config, false).unwrap_err();
        assert!(err.to_string().contains("2 posts"));
    }

    #[test]
    fn test_clean_removes_stale_files() {
        let (_dir, config) = site(&[("2023-08-10-distopia.md", DISTOPIA)]);
        fs::create_dir_all(&config.build.output).unwrap();
        let stale = config.build.output.join("stale.html");
        fs::write(&stale, "old").unwrap();

        build_site(&config, false).unwrap();
        assert!(stale.exists());
        build_site(&config, true).unwrap();
        assert!(!stale.exists());
    }
}

//! A single post and loading the posts directory.

use super::{
    PostError,
    filename::{PostName, has_post_extension},
    frontmatter::{self, FrontMatter},
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// A parsed post. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Post {
    pub source: PathBuf,
    pub name: PostName,
    pub front: FrontMatter,
    /// Raw markup after the front matter block.
    pub body: String,
    /// 1-based line of the first body line in the source file.
    pub body_line: usize,
}

impl Post {
    /// Read and parse a post file.
    pub fn from_path(path: &Path) -> Result<Self, PostError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| PostError::filename(&path.to_string_lossy(), "not valid UTF-8"))?;
        let source =
            fs::read_to_string(path).map_err(|err| PostError::Io(path.to_path_buf(), err))?;
        Self::parse(path.to_path_buf(), file_name, &source)
    }

    /// Parse a post from its file name and contents.
    pub fn parse(source_path: PathBuf, file_name: &str, source: &str) -> Result<Self, PostError> {
        let name = PostName::parse(file_name)?;
        let split = frontmatter::split(source)?;
        let front = FrontMatter::parse(split.yaml)?;

        Ok(Self {
            source: source_path,
            name,
            front,
            body: split.body.to_string(),
            body_line: split.body_line,
        })
    }

    /// `YYYY-MM-DD-slug`
    pub fn id(&self) -> String {
        self.name.stem()
    }

    pub fn slug(&self) -> &str {
        &self.name.slug
    }

    pub fn title(&self) -> &str {
        self.front.title()
    }

    pub fn layout(&self) -> Option<&str> {
        self.front.layout.as_deref()
    }

    pub fn published(&self) -> bool {
        self.front.published
    }

    /// Calendar date from the filename.
    pub fn date(&self) -> NaiveDate {
        self.name.date
    }

    /// Publish time: the front matter `date` if it parses, else midnight of
    /// the filename date.
    pub fn datetime(&self) -> NaiveDateTime {
        self.front
            .datetime()
            .ok()
            .flatten()
            .unwrap_or_else(|| self.name.date.and_time(NaiveTime::MIN))
    }

    /// Chronological sort key.
    pub fn sort_key(&self) -> (NaiveDate, &str) {
        (self.name.date, &self.name.slug)
    }
}

/// Result of loading a posts directory.
#[derive(Debug, Default)]
pub struct LoadedPosts {
    /// Chronological order.
    pub posts: Vec<Post>,
    /// Files that failed to parse, in path order.
    pub errors: Vec<(PathBuf, PostError)>,
}

/// All post source files under `dir`, sorted by path.
///
/// Hidden files and directories are skipped. A missing directory yields
/// no files.
pub fn collect_post_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut files: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| has_post_extension(path))
        .collect();
    files.sort();
    files
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str()
        .is_some_and(|name| name.starts_with('.') || name.ends_with('~'))
}

/// Parse every post under `dir` in parallel.
pub fn load_posts(dir: &Path) -> LoadedPosts {
    let results: Vec<_> = collect_post_files(dir)
        .into_par_iter()
        .map(|path| {
            let result = Post::from_path(&path);
            (path, result)
        })
        .collect();

    let mut loaded = LoadedPosts::default();
    for (path, result) in results {
        match result {
            Ok(post) => loaded.posts.push(post),
            Err(err) => loaded.errors.push((path, err)),
        }
    }
    loaded
        .posts
        .sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    loaded
}

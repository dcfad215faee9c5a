//! Named HTML layouts with optional parent layouts.
//!
//! `_layouts/post.html` may start with front matter naming its own parent:
//!
//! ```text
//! ---
//! layout: default
//! ---
//! <article>{{ content }}</article>
//! ```

use super::RenderError;
use crate::content::frontmatter::{self, FrontMatter};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Layout names that mean "no wrapping".
const NO_LAYOUT: [&str; 2] = ["none", "null"];

#[derive(Debug, Clone)]
pub struct Layout {
    pub name: String,
    pub parent: Option<String>,
    pub template: String,
    pub source: PathBuf,
    /// 1-based file line of the first template line.
    pub body_line: usize,
}

impl Layout {
    fn parse(name: String, source: PathBuf, content: &str) -> Result<Self, RenderError> {
        if !content.starts_with("---") && !content.starts_with("\u{feff}---") {
            return Ok(Self {
                name,
                parent: None,
                template: content.to_string(),
                source,
                body_line: 1,
            });
        }

        let split = frontmatter::split(content)?;
        let front = FrontMatter::parse(split.yaml)?;
        let parent = front.layout.filter(|parent| !is_no_layout(parent));
        Ok(Self {
            name,
            parent,
            template: split.body.to_string(),
            source,
            body_line: split.body_line,
        })
    }
}

/// `none`/`null` disable layout wrapping.
pub fn is_no_layout(name: &str) -> bool {
    NO_LAYOUT.contains(&name)
}

/// All layouts of a site, keyed by file stem.
#[derive(Debug, Clone, Default)]
pub struct Layouts {
    map: BTreeMap<String, Layout>,
}

impl Layouts {
    /// Load every `*.html` directly inside `dir`. A missing directory yields
    /// no layouts.
    pub fn load(dir: &Path) -> Result<Self, RenderError> {
        let mut layouts = Self::default();
        if !dir.is_dir() {
            return Ok(layouts);
        }

        let entries = fs::read_dir(dir).map_err(|err| RenderError::Io(dir.to_path_buf(), err))?;
        for entry in entries {
            let path = entry
                .map_err(|err| RenderError::Io(dir.to_path_buf(), err))?
                .path();
            let is_html = path.extension().is_some_and(|ext| ext == "html");
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_html || !path.is_file() {
                continue;
            }

            let content =
                fs::read_to_string(&path).map_err(|err| RenderError::Io(path.clone(), err))?;
            let layout = Layout::parse(name.to_string(), path.clone(), &content)?;
            layouts.map.insert(layout.name.clone(), layout);
        }
        Ok(layouts)
    }

    pub fn contains(&self, name: &str) -> bool {
        is_no_layout(name) || self.map.contains_key(name)
    }

    /// Layouts to apply for `name`, innermost first.
    pub fn chain(&self, name: &str) -> Result<Vec<&Layout>, RenderError> {
        let mut chain: Vec<&Layout> = Vec::new();
        let mut next = Some(name);

        while let Some(name) = next.filter(|name| !is_no_layout(name)) {
            if chain.iter().any(|layout| layout.name == name) {
                let mut cycle: Vec<_> = chain.iter().map(|l| l.name.clone()).collect();
                cycle.push(name.to_string());
                return Err(RenderError::LayoutCycle(cycle));
            }
            let layout = self
                .map
                .get(name)
                .ok_or_else(|| RenderError::UnknownLayout(name.to_string()))?;
            chain.push(layout);
            next = layout.parent.as_deref();
        }
        Ok(chain)
    }
}

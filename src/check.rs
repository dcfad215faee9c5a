//! Authoring checks over every post file.
//!
//! Each file runs through the same stages as a build (filename, front
//! matter, links, math, full render) but every problem is collected instead
//! of stopping at the first one.

use crate::{
    config::SiteConfig,
    content::{
        Post, PostError, collect_post_files,
        filename::PostName,
        frontmatter::{self, FrontMatter},
        links, math,
    },
    log,
    render::{Layouts, RenderError, Renderer},
};
use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Relative to the project root when possible.
    pub path: PathBuf,
    pub severity: Severity,
    pub rule: &'static str,
    pub message: String,
    /// 1-based line in the source file, when known.
    pub line: Option<usize>,
}

impl Diagnostic {
    fn error(path: &Path, rule: &'static str, line: Option<usize>, message: String) -> Self {
        Self {
            path: path.to_path_buf(),
            severity: Severity::Error,
            rule,
            message,
            line,
        }
    }

    fn warning(path: &Path, rule: &'static str, line: Option<usize>, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(path, rule, line, message)
        }
    }

    fn location(&self) -> String {
        match self.line {
            Some(line) => format!("{}:{line}", self.path.display()),
            None => self.path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub files: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// No errors, and no warnings either when `deny_warnings` is set.
    pub fn passed(&self, deny_warnings: bool) -> bool {
        self.errors() == 0 && (!deny_warnings || self.warnings() == 0)
    }

    fn print(&self) {
        for diag in &self.diagnostics {
            let module = match diag.severity {
                Severity::Error => "error",
                Severity::Warning => "warn",
            };
            log!(module; "{}: {} [{}]", diag.location(), diag.message, diag.rule);
        }
        log!("check"; "{} files, {} errors, {} warnings", self.files, self.errors(), self.warnings());
    }
}

/// `inkpost check`: run every rule, print the report, fail on errors.
pub fn run_check(config: &SiteConfig, json: bool, deny_warnings: bool) -> Result<()> {
    let report = check_site(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }

    if !report.passed(deny_warnings) {
        bail!(
            "check failed with {} errors and {} warnings",
            report.errors(),
            report.warnings()
        );
    }
    Ok(())
}

/// Check every post file under the posts directory.
pub fn check_site(config: &SiteConfig) -> Result<Report> {
    let layouts = Layouts::load(&config.build.layouts)
        .with_context(|| format!("failed to load layouts from `{}`", config.build.layouts.display()))?;
    let files = collect_post_files(&config.build.posts);

    let checked: Vec<_> = files
        .par_iter()
        .map(|path| check_file(path, &layouts))
        .collect();

    let mut diagnostics = Vec::new();
    let mut posts = Vec::new();
    for (mut found, post) in checked {
        diagnostics.append(&mut found);
        posts.extend(post);
    }
    diagnostics.extend(render_diagnostics(config, &posts, layouts));

    for diag in &mut diagnostics {
        if let Ok(relative) = diag.path.strip_prefix(&config.root) {
            diag.path = relative.to_path_buf();
        }
    }
    diagnostics.sort_by(|a, b| {
        (&a.path, a.line, a.rule, &a.message).cmp(&(&b.path, b.line, b.rule, &b.message))
    });

    Ok(Report {
        files: files.len(),
        diagnostics,
    })
}

/// Static checks for one file. Also returns the parsed post when the file is
/// well-formed enough to be rendered.
fn check_file(path: &Path, layouts: &Layouts) -> (Vec<Diagnostic>, Option<Post>) {
    let mut diags = Vec::new();

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            let err = PostError::Io(path.to_path_buf(), err);
            diags.push(Diagnostic::error(path, err.rule(), None, format!("{err}: {}", err_source(&err))));
            return (diags, None);
        }
    };

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    let name_ok = match PostName::parse(&file_name) {
        Ok(_) => true,
        Err(err) => {
            diags.push(Diagnostic::error(path, err.rule(), None, err.to_string()));
            false
        }
    };

    let split = match frontmatter::split(&source) {
        Ok(split) => split,
        Err(err) => {
            diags.push(Diagnostic::error(path, err.rule(), Some(1), err.to_string()));
            return (diags, None);
        }
    };
    let front = match FrontMatter::parse(split.yaml) {
        Ok(front) => front,
        Err(err) => {
            let line = yaml_line(&err).map(|line| line + 1);
            diags.push(Diagnostic::error(path, err.rule(), line, err.to_string()));
            return (diags, None);
        }
    };

    check_front_matter(path, &front, layouts, &mut diags);
    check_body(path, split.body, split.body_line, &mut diags);

    let post = if name_ok {
        Post::parse(path.to_path_buf(), &file_name, &source).ok()
    } else {
        None
    };
    (diags, post)
}

fn check_front_matter(path: &Path, front: &FrontMatter, layouts: &Layouts, diags: &mut Vec<Diagnostic>) {
    if front.title().is_empty() {
        diags.push(Diagnostic::error(
            path,
            "missing-title",
            Some(1),
            "front matter has no non-empty `title`".to_string(),
        ));
    }

    match front.layout.as_deref() {
        None => diags.push(Diagnostic::warning(
            path,
            "missing-layout",
            Some(1),
            "front matter has no `layout`; the page will not be wrapped".to_string(),
        )),
        Some(layout) if !layouts.contains(layout) => diags.push(Diagnostic::error(
            path,
            "unknown-layout",
            Some(1),
            format!("layout `{layout}` does not exist"),
        )),
        Some(_) => {}
    }

    if let Err(err) = front.datetime() {
        diags.push(Diagnostic::error(path, err.rule(), Some(1), err.to_string()));
    }
}

fn check_body(path: &Path, body: &str, body_line: usize, diags: &mut Vec<Diagnostic>) {
    let to_file_line = |line: usize| line + body_line - 1;

    if let Err(PostError::UnbalancedMath { line }) = math::scan(body) {
        let err = PostError::UnbalancedMath {
            line: to_file_line(line),
        };
        diags.push(Diagnostic::error(path, err.rule(), Some(to_file_line(line)), err.to_string()));
    }

    let report = links::analyze(body);
    for link in &report.unresolved {
        diags.push(Diagnostic::error(
            path,
            "unresolved-link",
            Some(to_file_line(link.line)),
            format!("link reference `[{}]` has no definition", link.label),
        ));
    }
    for (label, line) in report.table.duplicates() {
        diags.push(Diagnostic::warning(
            path,
            "duplicate-link",
            Some(to_file_line(*line)),
            format!("link reference `[{label}]` is defined more than once; the first definition wins"),
        ));
    }
    for (label, line) in report.unused() {
        diags.push(Diagnostic::warning(
            path,
            "unused-link",
            Some(to_file_line(line)),
            format!("link reference `[{label}]` is never used"),
        ));
    }
}

/// Fully render every parsed post in strict mode and report failures the
/// static rules do not already cover.
fn render_diagnostics(config: &SiteConfig, posts: &[Post], layouts: Layouts) -> Vec<Diagnostic> {
    let mut strict = config.clone();
    strict.build.strict = true;
    strict.build.minify = false;
    let renderer = Renderer::with_layouts(&strict, posts, layouts);

    posts
        .par_iter()
        .filter_map(|post| match renderer.render(post) {
            Ok(_)
            | Err(RenderError::UnresolvedLinks(_))
            | Err(RenderError::UnknownLayout(_))
            | Err(RenderError::Post(PostError::UnbalancedMath { .. })) => None,
            Err(err) => {
                // Only errors in the post's own body carry a line of this file.
                let line = match &err {
                    RenderError::Liquid { template, source }
                        if *template == post.source.display().to_string() =>
                    {
                        source.line()
                    }
                    _ => None,
                };
                Some(Diagnostic::error(&post.source, "render", line, err.to_string()))
            }
        })
        .collect()
}

/// 1-based line inside the YAML block, when serde_yaml knows it.
fn yaml_line(err: &PostError) -> Option<usize> {
    match err {
        PostError::Yaml(err) => err.location().map(|loc| loc.line()),
        _ => None,
    }
}

fn err_source(err: &PostError) -> String {
    std::error::Error::source(err)
        .map(ToString::to_string)
        .unwrap_or_default()
}

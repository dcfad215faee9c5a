//! Post filename parsing: `YYYY-MM-DD-slug.md`.

use super::PostError;
use chrono::NaiveDate;
use std::fmt;

/// Accepted post file extensions.
pub const POST_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Publish date and slug encoded in a post filename.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostName {
    pub date: NaiveDate,
    pub slug: String,
    pub ext: String,
}

impl PostName {
    /// Parse a bare file name such as `2023-08-10-distopia.md`.
    pub fn parse(file_name: &str) -> Result<Self, PostError> {
        let (stem, ext) = file_name
            .rsplit_once('.')
            .ok_or_else(|| PostError::filename(file_name, "missing file extension"))?;
        if !POST_EXTENSIONS.contains(&ext) {
            return Err(PostError::filename(
                file_name,
                format!("extension `.{ext}` is not one of .md, .markdown"),
            ));
        }

        let (date, slug) = Self::split_stem(stem)
            .map_err(|reason| PostError::filename(file_name, reason))?;

        Ok(Self {
            date,
            slug: slug.to_string(),
            ext: ext.to_string(),
        })
    }

    /// Split `YYYY-MM-DD-slug` into a validated date and slug.
    fn split_stem(stem: &str) -> Result<(NaiveDate, &str), String> {
        let bytes = stem.as_bytes();
        let shape_ok = bytes.len() >= 11
            && bytes[..4].iter().all(u8::is_ascii_digit)
            && bytes[4] == b'-'
            && bytes[5..7].iter().all(u8::is_ascii_digit)
            && bytes[7] == b'-'
            && bytes[8..10].iter().all(u8::is_ascii_digit)
            && bytes[10] == b'-';
        if !shape_ok {
            return Err("expected `YYYY-MM-DD-slug`".into());
        }

        // Shape is checked, so these slices are ASCII digits.
        let year: i32 = stem[..4].parse().map_err(|_| "bad year".to_string())?;
        let month: u32 = stem[5..7].parse().map_err(|_| "bad month".to_string())?;
        let day: u32 = stem[8..10].parse().map_err(|_| "bad day".to_string())?;
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| format!("{} is not a calendar date", &stem[..10]))?;

        let slug = &stem[11..];
        if slug.is_empty() {
            return Err("slug is empty".into());
        }
        if slug.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
            return Err(format!("slug `{slug}` contains whitespace or a path separator"));
        }
        Ok((date, slug))
    }

    /// `YYYY-MM-DD-slug`, the key used by `{% post_url %}`.
    pub fn stem(&self) -> String {
        format!("{}-{}", self.date.format("%Y-%m-%d"), self.slug)
    }
}

impl fmt::Display for PostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stem(), self.ext)
    }
}

/// Whether a path looks like a post source file by extension alone.
pub fn has_post_extension(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| POST_EXTENSIONS.contains(&ext))
}

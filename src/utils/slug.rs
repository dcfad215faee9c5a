//! URL slugification.

use deunicode::deunicode;

/// Convert text to a lowercase ASCII slug: `"Über SIMD!"` → `"uber-simd"`.
///
/// Non-ASCII is transliterated first; every run of non-alphanumerics
/// becomes a single `-`.
pub fn slugify(text: &str) -> String {
    let ascii = deunicode(text);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;

    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

//! `$$ … $$` math spans.
//!
//! Math is handed to a client-side renderer (MathJax, KaTeX) untouched. The
//! markdown pass must not see it, or `_` and `*` inside formulas turn into
//! emphasis. [`protect`] swaps every span for an opaque placeholder before
//! rendering and [`Protected::restore`] puts the original text back after.

use super::PostError;
use regex::Regex;
use std::{ops::Range, sync::LazyLock};

/// Math delimiter, used for both inline and display math.
pub const MATH_DELIMITER: &str = "$$";

const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

/// A math span, delimiters included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathSpan {
    pub range: Range<usize>,
    /// 1-based line of the opening delimiter.
    pub line: usize,
}

/// Find all math spans outside code.
///
/// Fails with the line of the first delimiter left without a partner.
pub fn scan(text: &str) -> Result<Vec<MathSpan>, PostError> {
    let code = code_regions(text);
    let bytes = text.as_bytes();

    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if let Some(region) = code.iter().find(|r| r.contains(&i)) {
            i = region.end;
            continue;
        }
        let is_delimiter = bytes[i] == b'$' && bytes[i + 1] == b'$';
        let escaped = i > 0 && bytes[i - 1] == b'\\';
        if is_delimiter && !escaped {
            match open.take() {
                None => open = Some(i),
                Some(start) => spans.push(MathSpan {
                    range: start..i + MATH_DELIMITER.len(),
                    line: line_of(text, start),
                }),
            }
            i += MATH_DELIMITER.len();
        } else {
            i += 1;
        }
    }

    match open {
        Some(start) => Err(PostError::UnbalancedMath {
            line: line_of(text, start),
        }),
        None => Ok(spans),
    }
}

/// Blank out every math span, keeping newlines so offsets and line
/// numbers stay valid. Unbalanced delimiters leave the text unchanged.
pub fn mask(text: &str) -> String {
    let Ok(spans) = scan(text) else {
        return text.to_string();
    };
    let mut bytes = text.as_bytes().to_vec();
    for span in spans {
        for b in &mut bytes[span.range] {
            if *b != b'\n' {
                *b = b' ';
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Text with math swapped out for placeholders.
#[derive(Debug, Clone)]
pub struct Protected {
    pub text: String,
    spans: Vec<String>,
    /// Per placeholder: its offset in `text` and the newlines it swallowed.
    folded: Vec<(usize, usize)>,
}

/// Replace every math span in `text` with a placeholder.
pub fn protect(text: &str) -> Result<Protected, PostError> {
    let spans = scan(text)?;
    if spans.is_empty() {
        return Ok(Protected {
            text: text.to_string(),
            spans: Vec::new(),
            folded: Vec::new(),
        });
    }

    let mut out = String::with_capacity(text.len());
    let mut originals = Vec::with_capacity(spans.len());
    let mut folded = Vec::new();
    let mut last = 0;
    for (index, span) in spans.iter().enumerate() {
        out.push_str(&text[last..span.range.start]);
        let newlines = text[span.range.clone()].matches('\n').count();
        if newlines > 0 {
            folded.push((out.len(), newlines));
        }
        out.push(PLACEHOLDER_OPEN);
        out.push_str(&index.to_string());
        out.push(PLACEHOLDER_CLOSE);
        originals.push(text[span.range.clone()].to_string());
        last = span.range.end;
    }
    out.push_str(&text[last..]);

    Ok(Protected {
        text: out,
        spans: originals,
        folded,
    })
}

impl Protected {
    /// Line in the unprotected text of a byte offset into [`Protected::text`].
    pub fn source_line(&self, offset: usize) -> usize {
        let hidden: usize = self
            .folded
            .iter()
            .take_while(|(at, _)| *at < offset)
            .map(|(_, newlines)| newlines)
            .sum();
        line_of(&self.text, offset) + hidden
    }

    /// Put the original math back into rendered HTML.
    pub fn restore(&self, html: &str) -> String {
        static RE_PLACEHOLDER: LazyLock<Regex> =
            LazyLock::new(|| Regex::new("\u{E000}([0-9]+)\u{E001}").unwrap());

        if self.spans.is_empty() {
            return html.to_string();
        }
        RE_PLACEHOLDER
            .replace_all(html, |caps: &regex::Captures| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| self.spans.get(index))
                    .map(|math| escape_math(math))
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Escape the characters that would otherwise be parsed as markup.
fn escape_math(math: &str) -> String {
    let mut out = String::with_capacity(math.len());
    for c in math.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// 1-based line number of a byte offset.
pub fn line_of(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())].matches('\n').count() + 1
}

/// Byte ranges of code: fenced and indented blocks, raw `<pre>` blocks and
/// inline code spans.
pub fn code_regions(text: &str) -> Vec<Range<usize>> {
    let blocks = code_blocks(text);
    let mut regions = Vec::new();
    let mut prose_start = 0;
    for block in &blocks {
        inline_code_spans(text, prose_start..block.start, &mut regions);
        prose_start = block.end;
    }
    inline_code_spans(text, prose_start..text.len(), &mut regions);
    regions.extend(blocks);
    regions.sort_by_key(|r| r.start);
    regions
}

#[derive(Debug, Clone, Copy)]
enum Block {
    Fence { ch: u8, len: usize, start: usize },
    Pre { start: usize },
    Indented { start: usize, end: usize },
}

/// Block-level code, line by line.
fn code_blocks(text: &str) -> Vec<Range<usize>> {
    let mut blocks = Vec::new();
    let mut open: Option<Block> = None;
    // An indented line is code only when it cannot continue a paragraph.
    let mut after_break = true;
    let mut in_list = false;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let start = offset;
        let end = offset + line.len();
        offset = end;
        let blank = line.trim().is_empty();

        match open {
            Some(Block::Fence { ch, len, start: from }) => {
                let closes = fence_marker(line)
                    .is_some_and(|(c, l)| c == ch && l >= len && is_bare_fence(line));
                if closes {
                    blocks.push(from..end);
                    open = None;
                    after_break = true;
                }
                continue;
            }
            Some(Block::Pre { start: from }) => {
                if closes_pre(line) {
                    blocks.push(from..end);
                    open = None;
                    after_break = true;
                }
                continue;
            }
            Some(Block::Indented { start: from, end: last }) => {
                if blank {
                    continue;
                }
                if indent_width(line) >= 4 {
                    open = Some(Block::Indented { start: from, end });
                    continue;
                }
                // Trailing blank lines are not part of the block.
                blocks.push(from..last);
                open = None;
                after_break = true;
            }
            None => {}
        }

        if blank {
            after_break = true;
            continue;
        }
        let indent = indent_width(line);
        if indent >= 4 {
            if after_break && !in_list {
                open = Some(Block::Indented { start, end });
                continue;
            }
            after_break = false;
            continue;
        }
        if let Some((ch, len)) = fence_marker(line) {
            open = Some(Block::Fence { ch, len, start });
            continue;
        }
        if let Some(rest) = opens_pre(line) {
            if closes_pre(rest) {
                blocks.push(start..end);
                after_break = true;
            } else {
                open = Some(Block::Pre { start });
            }
            continue;
        }

        if is_list_item(line) {
            in_list = true;
        } else if indent == 0 && after_break {
            in_list = false;
        }
        after_break = line.trim_start().starts_with('#');
    }

    match open {
        // Unclosed fences and `<pre>` run to the end of the document.
        Some(Block::Fence { start, .. } | Block::Pre { start }) => blocks.push(start..text.len()),
        Some(Block::Indented { start, end }) => blocks.push(start..end),
        None => {}
    }
    blocks
}

/// Leading indentation in columns, a tab counting as four.
fn indent_width(line: &str) -> usize {
    line.bytes()
        .map_while(|b| match b {
            b' ' => Some(1),
            b'\t' => Some(4),
            _ => None,
        })
        .sum()
}

/// The rest of the line after `<pre` when the line opens a raw `<pre>` block.
fn opens_pre(line: &str) -> Option<&str> {
    let trimmed = line.trim_start_matches(' ');
    let tag = trimmed.get(..4)?;
    if !tag.eq_ignore_ascii_case("<pre") {
        return None;
    }
    let rest = &trimmed[4..];
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c == '>' || c.is_whitespace() => Some(rest),
        _ => None,
    }
}

fn closes_pre(line: &str) -> bool {
    line.to_ascii_lowercase().contains("</pre>")
}

/// `- `, `* `, `+ `, `1. ` or `1) ` list markers.
fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim_start_matches(' ');
    let mut chars = trimmed.chars();
    match chars.next() {
        Some('-' | '*' | '+') => chars.next().is_none_or(char::is_whitespace),
        Some(c) if c.is_ascii_digit() => {
            let rest = trimmed.trim_start_matches(|c: char| c.is_ascii_digit());
            let mut rest = rest.chars();
            matches!(rest.next(), Some('.' | ')')) && rest.next().is_none_or(char::is_whitespace)
        }
        _ => false,
    }
}

/// Fence character and run length if the line opens or closes a fence.
fn fence_marker(line: &str) -> Option<(u8, usize)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = line[indent..].as_bytes();
    let ch = *rest.first()?;
    if ch != b'`' && ch != b'~' {
        return None;
    }
    let len = rest.iter().take_while(|&&b| b == ch).count();
    (len >= 3).then_some((ch, len))
}

/// Closing fences carry no info string.
fn is_bare_fence(line: &str) -> bool {
    let trimmed = line.trim();
    let Some(ch) = trimmed.chars().next() else {
        return false;
    };
    trimmed.chars().all(|c| c == ch)
}

/// Backtick code spans inside `range`, pushed into `regions`.
fn inline_code_spans(text: &str, range: Range<usize>, regions: &mut Vec<Range<usize>>) {
    let bytes = text.as_bytes();
    let mut i = range.start;
    while i < range.end {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let run = bytes[i..range.end].iter().take_while(|&&b| b == b'`').count();
        let start = i;
        i += run;

        // Look for a closing run of exactly the same length.
        let mut j = i;
        let mut closed = None;
        while j < range.end {
            if bytes[j] == b'`' {
                let close = bytes[j..range.end].iter().take_while(|&&b| b == b'`').count();
                if close == run {
                    closed = Some(j + close);
                    break;
                }
                j += close;
            } else {
                j += 1;
            }
        }
        if let Some(end) = closed {
            regions.push(start..end);
            i = end;
        }
    }
}

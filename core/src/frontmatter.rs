//! Source loading and front-matter parsing
//!
//! A workflow source is UTF-8 Markdown whose head may be a front-matter
//! block delimited by `---` lines. The split is purely line-based; YAML
//! parsing happens afterwards so parse errors can be reported with the
//! position inside the original file.

use crate::error::{CompileError, Result};
use serde_yaml::Mapping;
use std::path::{Path, PathBuf};

/// One loaded source file, split but not yet merged.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub path: PathBuf,
    /// Parsed front-matter document; empty mapping when the file has none.
    pub frontmatter: Mapping,
    /// Markdown body with the front-matter block removed and any outer
    /// `markdown` code fence stripped.
    pub body: String,
    /// 0-based line number in the original file where the body starts.
    pub body_line_offset: usize,
}

/// Read and split a source file.
pub fn parse_source(path: &Path) -> Result<ParsedSource> {
    let text =
        std::fs::read_to_string(path).map_err(|e| CompileError::file_read(path, e))?;
    parse_source_text(path, &text)
}

/// Split already-loaded text. Exposed separately so the import resolver can
/// parse in-memory fixtures.
pub fn parse_source_text(path: &Path, text: &str) -> Result<ParsedSource> {
    let (frontmatter_text, body, body_line_offset) = split_frontmatter(path, text)?;

    let frontmatter = match frontmatter_text {
        None => Mapping::new(),
        Some(raw) if raw.trim().is_empty() => Mapping::new(),
        Some(raw) => serde_yaml::from_str::<Mapping>(raw).map_err(|e| {
            // serde_yaml reports 1-based positions relative to the
            // front-matter text, which begins on line 2 of the file.
            let (line, column) = e
                .location()
                .map(|loc| (loc.line() + 1, loc.column()))
                .unwrap_or((2, 1));
            CompileError::parse(path, line, column, format!("invalid front-matter: {e}"))
        })?,
    };

    let body = unfence_markdown(&body);

    Ok(ParsedSource {
        path: path.to_path_buf(),
        frontmatter,
        body,
        body_line_offset,
    })
}

/// Split `text` into (front-matter text, body, body line offset).
///
/// The opening delimiter must be the first line of the file; both delimiters
/// are `---` with trailing ASCII whitespace tolerated. A file that does not
/// open with `---` has no front-matter.
fn split_frontmatter<'a>(
    path: &Path,
    text: &'a str,
) -> Result<(Option<&'a str>, String, usize)> {
    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok((None, String::new(), 0));
    };
    if first.trim_end() != "---" {
        return Ok((None, text.to_string(), 0));
    }

    let mut consumed = first.len();
    let mut line_no = 1;
    for line in lines {
        line_no += 1;
        if line.trim_end() == "---" {
            let frontmatter = &text[first.len()..consumed];
            let body = text[consumed + line.len()..].to_string();
            return Ok((Some(frontmatter), body, line_no));
        }
        consumed += line.len();
    }

    Err(CompileError::parse(
        path,
        1,
        1,
        "front-matter opened with '---' but never closed",
    ))
}

/// Strip one outer `markdown`/`md` code fence wrapping the whole body.
///
/// Authors sometimes paste a workflow body wrapped in a fence; the fence is
/// not part of the prompt. Backticks and tildes are both accepted, any
/// length >= 3, with a matching closing fence of the same character at least
/// as long as the opener.
pub fn unfence_markdown(body: &str) -> String {
    let trimmed = body.trim();
    let Some(first_line_end) = trimmed.find('\n') else {
        return body.to_string();
    };
    let first_line = trimmed[..first_line_end].trim_end();

    let fence_char = match first_line.chars().next() {
        Some(c @ ('`' | '~')) => c,
        _ => return body.to_string(),
    };
    let fence_len = first_line.chars().take_while(|&c| c == fence_char).count();
    if fence_len < 3 {
        return body.to_string();
    }
    let info = first_line[fence_len..].trim().to_ascii_lowercase();
    if info != "markdown" && info != "md" {
        return body.to_string();
    }

    let rest = &trimmed[first_line_end + 1..];
    let Some(last_line_start) = rest.trim_end().rfind('\n') else {
        return body.to_string();
    };
    let closing = rest.trim_end()[last_line_start + 1..].trim();
    let closing_len = closing.chars().take_while(|&c| c == fence_char).count();
    if closing_len < fence_len || closing.chars().any(|c| c != fence_char) {
        return body.to_string();
    }

    rest.trim_end()[..last_line_start].to_string()
}

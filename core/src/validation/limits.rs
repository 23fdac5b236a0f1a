//! Size bounds
//!
//! Hard limits on expression length and prompt chunking are errors; an
//! oversized lock file is a warning (the file is still written so the
//! author can inspect it).

use crate::diagnostics::Diagnostics;
use crate::error::{CompileError, Result};

/// Longest single CI expression, in bytes.
pub const MAX_EXPRESSION_BYTES: usize = 21_000;
/// Longest single heredoc chunk of prompt text, in bytes.
pub const MAX_PROMPT_CHUNK_BYTES: usize = 20_000;
/// Most heredoc chunks one prompt may split into.
pub const MAX_PROMPT_CHUNKS: usize = 5;
/// Lock-file size above which a warning is emitted, in bytes.
pub const MAX_LOCK_BYTES: usize = 500_000;

pub fn check_expression_size(expression: &str) -> Result<()> {
    if expression.len() > MAX_EXPRESSION_BYTES {
        return Err(CompileError::limit(format!(
            "expression of {} bytes exceeds the {MAX_EXPRESSION_BYTES} byte limit",
            expression.len()
        )));
    }
    Ok(())
}

/// Split prompt text into heredoc chunks of at most
/// [`MAX_PROMPT_CHUNK_BYTES`], failing when more than
/// [`MAX_PROMPT_CHUNKS`] would be needed. Splits happen on line
/// boundaries where possible.
pub fn chunk_prompt(prompt: &str) -> Result<Vec<String>> {
    if prompt.len() <= MAX_PROMPT_CHUNK_BYTES {
        return Ok(vec![prompt.to_string()]);
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in prompt.split_inclusive('\n') {
        if current.len() + line.len() > MAX_PROMPT_CHUNK_BYTES && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        // A single line longer than the chunk limit is split mid-line.
        let mut rest = line;
        while rest.len() > MAX_PROMPT_CHUNK_BYTES {
            let split = floor_char_boundary(rest, MAX_PROMPT_CHUNK_BYTES);
            chunks.push(rest[..split].to_string());
            rest = &rest[split..];
        }
        current.push_str(rest);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.len() > MAX_PROMPT_CHUNKS {
        return Err(CompileError::limit(format!(
            "prompt text needs {} chunks; the limit is {MAX_PROMPT_CHUNKS} (about {} bytes of prompt)",
            chunks.len(),
            MAX_PROMPT_CHUNKS * MAX_PROMPT_CHUNK_BYTES
        )));
    }
    Ok(chunks)
}

pub fn check_lock_size(lock_text: &str, diagnostics: &mut Diagnostics) {
    if lock_text.len() > MAX_LOCK_BYTES {
        diagnostics.warn(format!(
            "lock file is {} bytes, above the {MAX_LOCK_BYTES} byte guideline; consider moving prompt text into imports",
            lock_text.len()
        ));
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

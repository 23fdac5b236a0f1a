//! Expression-safety validation over source text
//!
//! Walks the resolved root body and every imported file (including
//! runtime-imported ones, whose text is fetched at execution time but whose
//! expressions are still author-controlled source) and checks each
//! `${{ ... }}` occurrence against the allow-list.

use crate::error::Result;
use crate::expr::safety::check_expression;
use crate::expr::{find_expressions, wrap_template_conditionals};
use crate::imports::Resolution;
use crate::validation::limits::check_expression_size;

pub fn check_resolution_expressions(resolution: &Resolution) -> Result<()> {
    // The resolved body, with bare conditionals wrapped the way the
    // expression engine will see them.
    check_text(&wrap_template_conditionals(&resolution.body))?;
    for file in &resolution.files {
        if file.path == resolution.root.path {
            continue;
        }
        check_text(&wrap_template_conditionals(&file.body))?;
    }
    Ok(())
}

fn check_text(text: &str) -> Result<()> {
    for found in find_expressions(text)? {
        check_expression_size(&found.inner)?;
        check_expression(&found.inner)?;
    }
    Ok(())
}

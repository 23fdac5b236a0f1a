//! Container image reference checks
//!
//! Best-effort: the compiler never performs network calls, so this is a
//! syntactic check of the `registry/name[:tag]` shape. Anything suspicious
//! degrades to a warning rather than blocking compilation, since the image
//! may exist in a private registry the compiler cannot see.

use crate::diagnostics::Diagnostics;
use crate::workflow::WorkflowSpec;
use regex_lite::Regex;
use std::sync::OnceLock;

#[allow(clippy::expect_used)]
fn image_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[a-z0-9]+([._-][a-z0-9]+)*(/[a-z0-9]+([._-][a-z0-9]+)*)*(:[A-Za-z0-9._-]+)?(@sha256:[a-f0-9]{64})?$",
        )
        .expect("valid image reference regex")
    })
}

pub fn check_container_images(spec: &WorkflowSpec, diagnostics: &mut Diagnostics) {
    for (name, tool) in spec.all_mcp_tools() {
        let Some(container) = &tool.container else {
            continue;
        };
        if !image_ref_regex().is_match(container) {
            diagnostics.warn(format!(
                "tools.{name}: container image reference '{container}' looks malformed; the workflow may fail to pull it"
            ));
            continue;
        }
        if tool.version.is_none() && !container.contains(':') && !container.contains("@sha256:") {
            diagnostics.warn(format!(
                "tools.{name}: container image '{container}' is not pinned to a tag or digest"
            ));
        }
    }
    if let Some(container) = &spec.sandbox.mcp_container {
        if !image_ref_regex().is_match(container) {
            diagnostics.warn(format!(
                "sandbox.mcp.container: image reference '{container}' looks malformed"
            ));
        }
    }
}

//! Textual import scanning and `import.meta.url` substitution.
//!
//! A text scan, not a parse. Specifiers inside ordinary string literals
//! that look like import statements can be picked up as false positives.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

/// The token a module uses to refer to its own URL.
pub const SELF_URL_TOKEN: &str = "import.meta.url";

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)(?:\b(?:import|export)(?:\s*\(\s*|\s+[^'";]*?\bfrom\s*)|(?:^|[;{}])[ \t]*import\s*)["']([^"'\r\n]+)["']"#,
    )
    .expect("import pattern is valid")
});

/// One import specifier and where it sits in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub specifier: String,
    /// Byte range of the specifier, quotes excluded.
    pub span: Range<usize>,
}

/// Find static, side-effect and dynamic import specifiers.
///
/// A side-effect `import "x"` only counts at the start of a statement.
pub fn scan_imports(source: &str) -> Vec<ImportRef> {
    IMPORT_RE
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let spec = caps.get(1)?;
            if in_comment_line(source, whole.start()) {
                return None;
            }
            Some(ImportRef {
                specifier: spec.as_str().to_string(),
                span: spec.range(),
            })
        })
        .collect()
}

/// True when the line holding `at` is a `//` comment or a block-comment body.
fn in_comment_line(source: &str, at: usize) -> bool {
    let line_start = source[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = source[line_start..at].trim_start();
    prefix.starts_with("//") || prefix.starts_with('*') || prefix.starts_with("/*")
}

/// Replace every `import.meta.url` with a string literal of `url`.
pub fn replace_self_url(source: &str, url: &str) -> String {
    if !source.contains(SELF_URL_TOKEN) {
        return source.to_string();
    }
    let literal = serde_json::Value::String(url.to_string()).to_string();
    source.replace(SELF_URL_TOKEN, &literal)
}

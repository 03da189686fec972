//! Node-style version ranges on top of the `semver` crate.
//!
//! `semver::VersionReq` follows Cargo conventions, where a bare `1.2.3`
//! means `^1.2.3`. Import URLs follow npm conventions instead: bare versions
//! are exact, `||` unions alternatives and whitespace intersects
//! comparators. [`VersionRange`] translates one into the other.

use semver::{Version, VersionReq};
use std::fmt;
use thiserror::Error;

/// A parsed version range that remembers the text it was written as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    kind: RangeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RangeKind {
    /// `*`, `latest`, or omitted: every valid version.
    Any,
    /// Satisfied when any alternative matches.
    Alternatives(Vec<VersionReq>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid version range '{range}': {message}")]
pub struct RangeParseError {
    pub range: String,
    pub message: String,
}

impl VersionRange {
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            kind: RangeKind::Any,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, RangeParseError> {
        let trimmed = raw.trim();
        if is_any(trimmed) {
            return Ok(Self {
                raw: trimmed.to_string(),
                kind: RangeKind::Any,
            });
        }

        let mut alternatives = Vec::new();
        for part in trimmed.split("||") {
            let part = part.trim();
            if is_any(part) {
                return Ok(Self {
                    raw: trimmed.to_string(),
                    kind: RangeKind::Any,
                });
            }
            let normalized = normalize(part).map_err(|message| RangeParseError {
                range: raw.to_string(),
                message,
            })?;
            let req = VersionReq::parse(&normalized).map_err(|e| RangeParseError {
                range: raw.to_string(),
                message: e.to_string(),
            })?;
            alternatives.push(req);
        }

        Ok(Self {
            raw: trimmed.to_string(),
            kind: RangeKind::Alternatives(alternatives),
        })
    }

    /// The range exactly as written in the request.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_any(&self) -> bool {
        matches!(self.kind, RangeKind::Any)
    }

    pub fn matches(&self, version: &Version) -> bool {
        match &self.kind {
            RangeKind::Any => true,
            RangeKind::Alternatives(reqs) => reqs.iter().any(|r| r.matches(version)),
        }
    }

    /// Highest version in `versions` that satisfies this range.
    pub fn max_satisfying<'a, I>(&self, versions: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        versions.into_iter().filter(|v| self.matches(v)).max()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_any(text: &str) -> bool {
    matches!(text, "" | "*" | "x" | "X" | "latest")
}

/// Rewrite one `||` alternative into `semver::VersionReq` syntax.
fn normalize(part: &str) -> Result<String, String> {
    let mut comparators = Vec::new();
    let mut pending_op = String::new();

    for token in part.split_whitespace() {
        if token.chars().all(is_op_char) {
            // `>= 1.2.0` style: operator separated from its version
            pending_op.push_str(token);
            continue;
        }
        let token = format!("{pending_op}{token}");
        pending_op.clear();
        comparators.push(normalize_comparator(&token)?);
    }

    if !pending_op.is_empty() {
        return Err(format!("dangling operator '{pending_op}'"));
    }
    if comparators.is_empty() {
        return Err("empty range".to_string());
    }
    Ok(comparators.join(", "))
}

fn normalize_comparator(token: &str) -> Result<String, String> {
    let token = token.trim_end_matches(',');
    let op_len = token.chars().take_while(|c| is_op_char(*c)).count();
    let (op, version) = token.split_at(op_len);
    let version = version.strip_prefix('v').unwrap_or(version);

    if version.is_empty() {
        return Err(format!("missing version after '{op}'"));
    }
    if is_any(version) {
        return Ok("*".to_string());
    }

    let has_wildcard = version
        .split('.')
        .any(|p| matches!(p, "x" | "X" | "*"));

    match op {
        // Bare versions are exact; bare partials and wildcards keep npm's
        // "whole line" meaning, which `=` gives for partial versions.
        "" if has_wildcard => Ok(version.to_string()),
        "" | "=" => Ok(format!("={version}")),
        "~" | "^" | ">" | ">=" | "<" | "<=" => Ok(format!("{op}{version}")),
        other => Err(format!("unknown operator '{other}'")),
    }
}

fn is_op_char(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '~' | '^')
}

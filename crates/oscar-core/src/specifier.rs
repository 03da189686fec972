//! Request specifier grammar: `@scope` / `name[@range]` / `path...`.

use std::fmt;

use crate::error::OscarError;
use crate::range::VersionRange;

/// A parsed `/@scope/name@range/path` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpecifier {
    /// Scope without its leading `@`.
    pub scope: String,
    pub name: String,
    pub range: VersionRange,
    /// Path inside the package, without a leading `/`.
    pub path: String,
}

impl PackageSpecifier {
    /// Parse the three route tokens of an import request.
    ///
    /// ```
    /// use oscar_core::specifier::PackageSpecifier;
    ///
    /// let spec = PackageSpecifier::parse("@acme", "widgets@^1.0.0", "mod.ts").unwrap();
    /// assert_eq!(spec.scope, "acme");
    /// assert_eq!(spec.range.as_str(), "^1.0.0");
    /// ```
    pub fn parse(scope_token: &str, pkg_token: &str, path_token: &str) -> Result<Self, OscarError> {
        let scope = parse_scope(scope_token)?;
        let (name, range) = parse_package(pkg_token)?;
        let path = parse_path(path_token)?;
        Ok(Self {
            scope,
            name,
            range,
            path,
        })
    }

    /// Parse a single `@scope/name[@range]/path` string.
    pub fn parse_str(spec: &str) -> Result<Self, OscarError> {
        let spec = spec.trim_start_matches('/');
        let mut parts = spec.splitn(3, '/');
        let scope = parts.next().unwrap_or_default();
        let pkg = parts.next().unwrap_or_default();
        let path = parts.next().unwrap_or_default();
        Self::parse(scope, pkg, path)
    }

    /// `name@version`, the form used in storage paths.
    pub fn package_at(&self, version: &impl fmt::Display) -> String {
        format!("{}@{}", self.name, version)
    }

    /// Canonical request path for a concrete version, with the file path
    /// percent-encoded so it survives as a URL path.
    pub fn canonical_path(&self, version: &impl fmt::Display) -> String {
        format!("/@{}/{}@{}/{}", self.scope, self.name, version, encode_path(&self.path))
    }
}

/// Percent-encode each `/`-separated segment of `path`.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment))
        .collect::<Vec<_>>()
        .join("/")
}

/// Inverse of [`encode_path`]; `None` if a segment does not decode to UTF-8.
pub fn decode_path(path: &str) -> Option<String> {
    path.split('/')
        .map(|segment| urlencoding::decode(segment).ok())
        .collect::<Option<Vec<_>>>()
        .map(|segments| segments.join("/"))
}

impl fmt::Display for PackageSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}/{}@{}/{}", self.scope, self.name, self.range, self.path)
    }
}

fn invalid(message: impl Into<String>) -> OscarError {
    OscarError::InvalidRequest(message.into())
}

fn is_name(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn parse_scope(token: &str) -> Result<String, OscarError> {
    let Some(scope) = token.strip_prefix('@') else {
        return Err(invalid("scope must start with '@'"));
    };
    if !is_name(scope) {
        return Err(invalid(format!("invalid scope '{token}'")));
    }
    Ok(scope.to_string())
}

fn parse_package(token: &str) -> Result<(String, VersionRange), OscarError> {
    let (name, range) = match token.split_once('@') {
        Some((name, range)) => (name, Some(range)),
        None => (token, None),
    };
    if !is_name(name) {
        return Err(invalid(format!("invalid package name '{token}'")));
    }
    let range = match range {
        None => VersionRange::any(),
        Some(r) if r.trim().is_empty() => return Err(invalid("empty version range")),
        Some(r) => VersionRange::parse(r).map_err(|e| invalid(e.to_string()))?,
    };
    Ok((name.to_string(), range))
}

fn parse_path(token: &str) -> Result<String, OscarError> {
    let path = token.trim_start_matches('/');
    if path.is_empty() {
        return Err(invalid("missing file path"));
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(invalid(format!("invalid file path '{token}'")));
        }
    }
    Ok(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_range() {
        let spec = PackageSpecifier::parse("@acme", "widgets@^1.0.0", "mod.ts").unwrap();
        assert_eq!(spec.scope, "acme");
        assert_eq!(spec.name, "widgets");
        assert_eq!(spec.range.as_str(), "^1.0.0");
        assert_eq!(spec.path, "mod.ts");
    }

    #[test]
    fn test_range_defaults_to_any() {
        let spec = PackageSpecifier::parse("@acme", "widgets", "src/mod.ts").unwrap();
        assert!(spec.range.is_any());
        assert_eq!(spec.range.as_str(), "*");
        assert_eq!(spec.path, "src/mod.ts");
    }

    #[test]
    fn test_latest_is_any() {
        let spec = PackageSpecifier::parse("@acme", "widgets@latest", "mod.ts").unwrap();
        assert!(spec.range.is_any());
        assert_eq!(spec.range.as_str(), "latest");
    }

    #[test]
    fn test_missing_parts_are_invalid() {
        assert!(matches!(
            PackageSpecifier::parse("", "widgets", "mod.ts"),
            Err(OscarError::InvalidRequest(_))
        ));
        assert!(matches!(
            PackageSpecifier::parse("@acme", "", "mod.ts"),
            Err(OscarError::InvalidRequest(_))
        ));
        assert!(matches!(
            PackageSpecifier::parse("@acme", "widgets", ""),
            Err(OscarError::InvalidRequest(_))
        ));
        assert!(PackageSpecifier::parse("acme", "widgets", "mod.ts").is_err());
        assert!(PackageSpecifier::parse("@acme", "widgets@", "mod.ts").is_err());
    }

    #[test]
    fn test_rejects_bad_ranges_and_paths() {
        assert!(PackageSpecifier::parse("@acme", "widgets@^abc", "mod.ts").is_err());
        assert!(PackageSpecifier::parse("@acme", "widgets", "../secret.ts").is_err());
        assert!(PackageSpecifier::parse("@acme", "widgets", "a//b.ts").is_err());
        assert!(PackageSpecifier::parse("@acme", "wid gets", "mod.ts").is_err());
    }

    #[test]
    fn test_parse_str_and_canonical_path() {
        let spec = PackageSpecifier::parse_str("/@acme/widgets@~1.2/lib/util.ts").unwrap();
        assert_eq!(spec.path, "lib/util.ts");
        assert_eq!(spec.canonical_path(&"1.2.5"), "/@acme/widgets@1.2.5/lib/util.ts");
        assert_eq!(spec.package_at(&"1.2.5"), "widgets@1.2.5");
        assert_eq!(spec.to_string(), "@acme/widgets@~1.2/lib/util.ts");
    }

    #[test]
    fn test_canonical_path_escapes_file_segments() {
        let spec = PackageSpecifier::parse("@acme", "widgets@^1.0.0", "docs/my file?#.ts").unwrap();
        assert_eq!(
            spec.canonical_path(&"1.3.0"),
            "/@acme/widgets@1.3.0/docs/my%20file%3F%23.ts"
        );
        assert_eq!(
            decode_path("docs/my%20file%3F%23.ts").as_deref(),
            Some("docs/my file?#.ts")
        );
        assert_eq!(decode_path("bad%FF.ts"), None);
    }
}

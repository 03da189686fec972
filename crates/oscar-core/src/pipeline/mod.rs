//! The two build strategies and the types they share.

pub mod bundle;
pub mod imports;
pub mod policy;
pub mod transpile;

use bytes::Bytes;
use semver::Version;
use std::collections::BTreeSet;
use std::ops::Range;
use url::Url;

pub use bundle::BundlePipeline;
pub use policy::{ExternalRule, ExternalizationPolicy};
pub use transpile::TranspilePipeline;

/// Content type of every built artifact.
pub const JAVASCRIPT: &str = "application/javascript";

/// A concrete file of a concrete package version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub scope: String,
    pub name: String,
    pub version: Version,
    pub path: String,
}

impl BuildTarget {
    pub fn package_at(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Built output plus whether it came out of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Bytes,
    pub from_cache: bool,
}

/// Where an import ended up after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// Loaded and inlined into the bundle.
    Module(Url),
    /// Left as a runtime import of this specifier.
    External(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    pub specifier: String,
    /// Byte range of the specifier inside the module's code.
    pub span: Range<usize>,
    pub target: ImportTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphModule {
    pub url: Url,
    /// Loaded text, with self-URL references already substituted.
    pub code: String,
    pub imports: Vec<ResolvedImport>,
}

impl GraphModule {
    /// Rewrite import specifiers in place.
    ///
    /// `replace` returns the new specifier text, or `None` to keep the
    /// original.
    pub fn rewrite_imports<F>(&self, mut replace: F) -> String
    where
        F: FnMut(&ResolvedImport) -> Option<String>,
    {
        let mut out = String::with_capacity(self.code.len());
        let mut last = 0;
        for import in &self.imports {
            if import.span.start < last || import.span.end > self.code.len() {
                continue;
            }
            if let Some(text) = replace(import) {
                out.push_str(&self.code[last..import.span.start]);
                out.push_str(&text);
                last = import.span.end;
            }
        }
        out.push_str(&self.code[last..]);
        out
    }
}

/// A fully loaded module graph, entry first, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleGraph {
    pub entry: Url,
    pub modules: Vec<GraphModule>,
}

impl ModuleGraph {
    pub fn module(&self, url: &Url) -> Option<&GraphModule> {
        self.modules.iter().find(|m| &m.url == url)
    }

    pub fn position(&self, url: &Url) -> Option<usize> {
        self.modules.iter().position(|m| &m.url == url)
    }

    /// Every specifier left external anywhere in the graph.
    pub fn externals(&self) -> BTreeSet<String> {
        self.modules
            .iter()
            .flat_map(|m| m.imports.iter())
            .filter_map(|i| match &i.target {
                ImportTarget::External(spec) => Some(spec.clone()),
                ImportTarget::Module(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> GraphModule {
        let code = r#"import a from "./a.ts"; import b from "react";"#.to_string();
        let a = code.find("./a.ts").unwrap();
        let b = code.find("react").unwrap();
        GraphModule {
            url: Url::parse("https://cdn.test/@acme/w@1.0.0/mod.ts").unwrap(),
            code,
            imports: vec![
                ResolvedImport {
                    specifier: "./a.ts".into(),
                    span: a..a + 6,
                    target: ImportTarget::Module(
                        Url::parse("https://cdn.test/@acme/w@1.0.0/a.ts").unwrap(),
                    ),
                },
                ResolvedImport {
                    specifier: "react".into(),
                    span: b..b + 5,
                    target: ImportTarget::External("react".into()),
                },
            ],
        }
    }

    #[test]
    fn test_rewrite_imports() {
        let m = module();
        let rewritten = m.rewrite_imports(|i| match &i.target {
            ImportTarget::Module(url) => Some(url.to_string()),
            ImportTarget::External(_) => None,
        });
        assert_eq!(
            rewritten,
            r#"import a from "https://cdn.test/@acme/w@1.0.0/a.ts"; import b from "react";"#
        );
    }

    #[test]
    fn test_graph_externals() {
        let m = module();
        let graph = ModuleGraph {
            entry: m.url.clone(),
            modules: vec![m],
        };
        assert_eq!(graph.externals().into_iter().collect::<Vec<_>>(), vec!["react"]);
        assert_eq!(graph.position(&graph.entry), Some(0));
    }
}

use async_trait::async_trait;

use crate::error::ToolError;
use crate::pipeline::ModuleGraph;

/// Source dialect of a file handed to a build tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSyntax {
    TypeScript,
    Tsx,
    JavaScript,
    Jsx,
}

impl SourceSyntax {
    /// Map a file extension (without the dot) to its dialect.
    ///
    /// Returns `None` for anything that is not transform-eligible.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "ts" | "mts" => Some(SourceSyntax::TypeScript),
            "tsx" => Some(SourceSyntax::Tsx),
            "js" | "mjs" => Some(SourceSyntax::JavaScript),
            "jsx" => Some(SourceSyntax::Jsx),
            _ => None,
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let file = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = file.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Loader name understood by esbuild-style tools.
    pub fn loader(&self) -> &'static str {
        match self {
            SourceSyntax::TypeScript => "ts",
            SourceSyntax::Tsx => "tsx",
            SourceSyntax::JavaScript => "js",
            SourceSyntax::Jsx => "jsx",
        }
    }
}

/// Single-file source transform: TypeScript/JSX in, baseline JavaScript out.
///
/// No module resolution happens here; imports pass through untouched.
#[async_trait]
pub trait Transpiler: Send + Sync {
    async fn transpile(&self, source: &str, syntax: SourceSyntax) -> Result<String, ToolError>;
}

/// Links an already resolved and loaded module graph into one ESM file.
#[async_trait]
pub trait Bundler: Send + Sync {
    async fn bundle(&self, graph: &ModuleGraph) -> Result<String, ToolError>;
}

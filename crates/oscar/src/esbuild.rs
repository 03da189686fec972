//! Build tools backed by the `esbuild` executable.

use async_trait::async_trait;
use oscar_core::error::ToolError;
use oscar_core::pipeline::{ImportTarget, ModuleGraph};
use oscar_core::runtime::{Bundler, SourceSyntax, Transpiler};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};
use url::Url;

/// Single-file transform: `esbuild --loader=<syntax>` over stdin.
#[derive(Debug, Clone)]
pub struct EsbuildTranspiler {
    program: PathBuf,
    target: String,
}

impl EsbuildTranspiler {
    pub fn new(program: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            target: target.into(),
        }
    }

    pub fn args(&self, syntax: SourceSyntax) -> Vec<String> {
        vec![
            format!("--loader={}", syntax.loader()),
            format!("--target={}", self.target),
            "--format=esm".to_string(),
            "--log-level=warning".to_string(),
        ]
    }
}

#[async_trait]
impl Transpiler for EsbuildTranspiler {
    #[instrument(skip(self, source), fields(syntax = ?syntax, bytes = source.len()))]
    async fn transpile(&self, source: &str, syntax: SourceSyntax) -> Result<String, ToolError> {
        run(&self.program, &self.args(syntax), None, Some(source)).await
    }
}

/// Whole-graph link: the graph is written to a scratch directory with
/// imports pointing at sibling files, then bundled from the entry.
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    program: PathBuf,
    target: String,
}

impl EsbuildBundler {
    pub fn new(program: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            target: target.into(),
        }
    }

    pub fn args(&self, graph: &ModuleGraph) -> Vec<String> {
        let mut args = vec![
            file_name(0, &graph.entry),
            "--bundle".to_string(),
            "--format=esm".to_string(),
            "--minify".to_string(),
            format!("--target={}", self.target),
            "--log-level=warning".to_string(),
            "--external:http://*".to_string(),
            "--external:https://*".to_string(),
        ];
        args.extend(
            graph
                .externals()
                .into_iter()
                .filter(|spec| !spec.starts_with("http://") && !spec.starts_with("https://"))
                .map(|spec| format!("--external:{spec}")),
        );
        args
    }
}

/// Scratch file name of the module at `index`, keeping its loader extension.
fn file_name(index: usize, url: &Url) -> String {
    let ext = SourceSyntax::from_path(url.path())
        .map(|s| s.loader())
        .unwrap_or("js");
    format!("m{index}.{ext}")
}

/// Module sources with inlined imports pointing at scratch files and
/// external imports spelled as their resolved specifier.
pub fn materialize(graph: &ModuleGraph) -> Vec<(String, String)> {
    graph
        .modules
        .iter()
        .enumerate()
        .map(|(index, module)| {
            let code = module.rewrite_imports(|import| match &import.target {
                ImportTarget::Module(url) => graph
                    .position(url)
                    .map(|pos| format!("./{}", file_name(pos, url))),
                ImportTarget::External(spec) => Some(spec.clone()),
            });
            (file_name(index, &module.url), code)
        })
        .collect()
}

#[async_trait]
impl Bundler for EsbuildBundler {
    #[instrument(skip(self, graph), fields(entry = %graph.entry, modules = graph.modules.len()))]
    async fn bundle(&self, graph: &ModuleGraph) -> Result<String, ToolError> {
        let workdir = tempfile::tempdir()
            .map_err(|e| ToolError::Failed(format!("cannot create scratch directory: {e}")))?;

        for (name, code) in materialize(graph) {
            tokio::fs::write(workdir.path().join(&name), code)
                .await
                .map_err(|e| ToolError::Failed(format!("cannot write {name}: {e}")))?;
        }
        debug!(dir = %workdir.path().display(), "Materialized module graph");

        run(&self.program, &self.args(graph), Some(workdir.path()), None).await
    }
}

/// Run `program`, feeding `input` on stdin, and return stdout.
///
/// The child is killed if the returned future is dropped.
async fn run(program: &Path, args: &[String], cwd: Option<&Path>, input: Option<&str>) -> Result<String, ToolError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| ToolError::Spawn(format!("{}: {}", program.display(), e)))?;

    let stdin = child.stdin.take();
    let feed = async move {
        if let (Some(mut pipe), Some(text)) = (stdin, input) {
            pipe.write_all(text.as_bytes()).await?;
            pipe.shutdown().await?;
        }
        Ok::<_, std::io::Error>(())
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());

    let output = output.map_err(|e| ToolError::Failed(e.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::Failed(format!(
            "{} exited with {}: {}",
            program.display(),
            output.status,
            stderr.trim()
        )));
    }
    fed.map_err(|e| ToolError::Failed(format!("cannot write to {}: {}", program.display(), e)))?;

    String::from_utf8(output.stdout).map_err(|e| ToolError::Failed(format!("output is not UTF-8: {e}")))
}

use oscar::{config, graphql::GraphQlMetadataSource, logging, server};

use anyhow::{Context, Result};
use clap::Parser;
use oscar_core::{PackageSpecifier, VersionResolver};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "oscar",
    about = "Module CDN: version redirects, transpiled and bundled imports, registry completions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Start the HTTP server
    Serve {
        /// Config file (defaults to ./oscar.toml, then the user config directory)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Listen address, overriding server.bind
        #[arg(long, short = 'b')]
        bind: Option<String>,

        /// Enable debug logging
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Resolve a specifier against the metadata source and print the result
    ///
    /// Examples:
    ///   oscar resolve @acme/widgets@^1.0.0/mod.ts
    ///   oscar resolve @acme/widgets/mod.ts
    Resolve {
        /// `@scope/name[@range]/path`
        specifier: String,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

async fn run_serve(config_path: Option<PathBuf>, bind: Option<String>, verbose: bool) -> Result<()> {
    let mut config = config::load_config(config_path.as_deref())?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    logging::init(&config.logging, verbose)?;
    if verbose {
        tracing::info!("Verbose logging enabled");
    }
    tracing::info!(
        public_url = %config.server.public_url,
        bucket = %config.storage.bucket,
        externals = config.externals.len(),
        "Starting oscar"
    );

    let state = server::AppState::from_config(&config)?;
    server::serve(state, &config.server.bind).await
}

async fn run_resolve(specifier: &str, config_path: Option<PathBuf>) -> Result<()> {
    let config = config::load_config(config_path.as_deref())?;
    let mut logging_config = config.logging.clone();
    logging_config.file = false;
    logging::init(&logging_config, false)?;

    let spec = PackageSpecifier::parse_str(specifier)
        .with_context(|| format!("Invalid specifier '{specifier}'"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.client.http_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;
    let source = GraphQlMetadataSource::new(
        client,
        config.metadata.endpoint.clone(),
        config.metadata.token.clone(),
        config.metadata.page_size,
    );
    let resolver = VersionResolver::new(Arc::new(source)).with_max_pages(config.metadata.max_pages);

    let resolution = resolver
        .resolve(&spec.scope, &spec.name, &spec.range)
        .await
        .with_context(|| format!("Failed to resolve @{}/{}@{}", spec.scope, spec.name, spec.range.as_str()))?;

    println!("{}", resolution.version);
    println!("{}", spec.canonical_path(&resolution.version));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            bind,
            verbose,
        } => run_serve(config, bind, verbose).await,
        Command::Resolve { specifier, config } => run_resolve(&specifier, config).await,
    }
}

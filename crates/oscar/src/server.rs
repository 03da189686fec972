//! HTTP surface: import routes, registry completions and housekeeping.

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Path, RawQuery, Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE,
    LOCATION, USER_AGENT,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use oscar_core::runtime::OriginStorage;
use oscar_core::{
    AutocompleteResolver, BuildCache, BundlePipeline, Completion, ExternalizationPolicy,
    ImportDispatcher, ImportRequest, Origin, OscarError, Reply, ServeOptions, StorageLayout,
    TranspilePipeline, VersionResolver,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::OscarConfig;
use crate::esbuild::{EsbuildBundler, EsbuildTranspiler};
use crate::fetch::HttpModuleFetcher;
use crate::graphql::GraphQlMetadataSource;
use crate::storage::{HttpObjectStorage, MetadataServerToken, StaticToken, TokenSource};

pub const REGISTRY_CONTENT_TYPE: &str = "application/vnd.deno.reg.v2+json";

const X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<ImportDispatcher>,
    autocomplete: Arc<AutocompleteResolver>,
}

impl AppState {
    pub fn new(dispatcher: ImportDispatcher, autocomplete: AutocompleteResolver) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            autocomplete: Arc::new(autocomplete),
        }
    }

    /// Wire the production collaborators described by `config`.
    pub fn from_config(config: &OscarConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.client.http_timeout_secs))
            .user_agent(concat!("oscar/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let metadata = GraphQlMetadataSource::new(
            client.clone(),
            config.metadata.endpoint.clone(),
            config.metadata.token.clone(),
            config.metadata.page_size,
        );
        let resolver =
            VersionResolver::new(Arc::new(metadata)).with_max_pages(config.metadata.max_pages);

        let tokens: Arc<dyn TokenSource> = match (&config.storage.token, config.storage.metadata_server) {
            (Some(token), _) => Arc::new(StaticToken(Some(token.clone()))),
            (None, true) => Arc::new(MetadataServerToken::new(client.clone())),
            (None, false) => Arc::new(StaticToken(None)),
        };
        let storage: Arc<dyn OriginStorage> = Arc::new(HttpObjectStorage::new(client.clone(), tokens));
        let layout = StorageLayout::new(&config.storage.root_url())
            .with_context(|| format!("Invalid storage root: {}", config.storage.root_url()))?;
        let public_base = config
            .public_base()
            .context("Invalid server.public_url")?;

        let origin = Origin::new(storage.clone(), layout.clone());
        let cache = BuildCache::new(storage, layout);
        let timeout = Duration::from_secs(config.build.timeout_secs);

        let transpile = TranspilePipeline::new(
            cache.clone(),
            origin.clone(),
            Arc::new(EsbuildTranspiler::new(&config.build.esbuild, &config.build.target)),
            timeout,
        );
        let bundle = BundlePipeline::new(
            cache,
            origin.clone(),
            resolver.clone(),
            Arc::new(HttpModuleFetcher::new(client)),
            Arc::new(EsbuildBundler::new(&config.build.esbuild, &config.build.target)),
            ExternalizationPolicy::new(config.externals.clone()),
            public_base,
            timeout,
        )
        .with_max_modules(config.build.max_modules);

        let options = ServeOptions {
            artifact_max_age: config.cache.artifact_max_age,
            redirect_max_age: config.cache.redirect_max_age,
            runtime_marker: config.client.runtime_marker.clone(),
        };

        Ok(Self::new(
            ImportDispatcher::new(resolver.clone(), origin, transpile, bundle, options),
            AutocompleteResolver::new(resolver),
        ))
    }
}

/// Adapter from the transport-neutral reply to an HTTP response.
pub struct ReplyResponse(pub Reply);

impl IntoResponse for ReplyResponse {
    fn into_response(self) -> Response {
        let reply = self.0;
        let mut headers = HeaderMap::new();
        let values = [
            (CONTENT_TYPE, reply.content_type.clone()),
            (CACHE_CONTROL, reply.cache_control()),
            (LOCATION, reply.location.clone()),
        ];
        for (name, value) in values {
            if let Some(value) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
                headers.insert(name, value);
            }
        }
        (reply.status, headers, Body::from(reply.body)).into_response()
    }
}

fn completion(result: Result<Completion, OscarError>) -> Response {
    match result {
        Ok(completion) => Json(completion).into_response(),
        Err(err) => ReplyResponse(err.into()).into_response(),
    }
}

async fn root() -> impl IntoResponse {
    (StatusCode::IM_A_TEAPOT, "Are you lost?")
}

async fn ping() -> &'static str {
    "pong"
}

async fn registry_schema() -> impl IntoResponse {
    let schema = json!({
        "version": 2,
        "registries": [{
            "schema": "/@:scope/:module@:version?/:path*",
            "variables": [
                { "key": "scope", "url": "/i10e/${scope}" },
                { "key": "module", "url": "/i10e/${scope}/${module}" },
                { "key": "version", "url": "/i10e/${scope}/${module}/${{version}}" },
                { "key": "path", "url": "/i10e/${scope}/${module}/${{version}}/${path}" },
            ],
        }],
    });
    ([(CONTENT_TYPE, REGISTRY_CONTENT_TYPE)], schema.to_string())
}

async fn scope_packages(State(state): State<AppState>, Path(scope): Path<String>) -> Response {
    completion(state.autocomplete.list_packages(&scope).await)
}

async fn search_packages(
    State(state): State<AppState>,
    Path((scope, package)): Path<(String, String)>,
) -> Response {
    completion(state.autocomplete.search_packages(&scope, &package).await)
}

async fn all_versions(
    State(state): State<AppState>,
    Path((scope, package)): Path<(String, String)>,
) -> Response {
    completion(state.autocomplete.list_versions(&scope, &package, None).await)
}

async fn matching_versions(
    State(state): State<AppState>,
    Path((scope, package, version)): Path<(String, String, String)>,
) -> Response {
    completion(
        state
            .autocomplete
            .list_versions(&scope, &package, Some(&version))
            .await,
    )
}

async fn version_files(
    State(state): State<AppState>,
    Path((scope, package, version, _path)): Path<(String, String, String, String)>,
) -> Response {
    completion(state.autocomplete.list_files(&scope, &package, &version).await)
}

fn import_request(scope: String, package: String, path: String, query: Option<String>, headers: &HeaderMap) -> ImportRequest {
    let mut request = ImportRequest::new(scope, package, path);
    if let Some(query) = query {
        request = request.with_query(query);
    }
    if let Some(agent) = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) {
        request = request.with_user_agent(agent);
    }
    request
}

async fn import_file(
    State(state): State<AppState>,
    Path((scope, package, path)): Path<(String, String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> ReplyResponse {
    let request = import_request(scope, package, path, query, &headers);
    ReplyResponse(state.dispatcher.dispatch(&request).await)
}

/// `/@scope/pkg` without a file path; the dispatcher rejects it.
async fn import_package(
    State(state): State<AppState>,
    Path((scope, package)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> ReplyResponse {
    let request = import_request(scope, package, String::new(), query, &headers);
    ReplyResponse(state.dispatcher.dispatch(&request).await)
}

/// CORS headers, response timing and the access log.
async fn observe(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let mut response = next.run(request).await;

    let elapsed = started.elapsed();
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    if let Ok(value) = HeaderValue::from_str(&format!("{}ms", elapsed.as_millis())) {
        headers.insert(X_RESPONSE_TIME, value);
    }

    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        %user_agent,
        elapsed_ms = elapsed.as_millis() as u64,
        "Request served"
    );
    response
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ping", get(ping))
        .route("/.well-known/deno-import-intellisense.json", get(registry_schema))
        .route("/i10e/{scope}", get(scope_packages))
        .route("/i10e/{scope}/{package}", get(search_packages))
        .route("/i10e/{scope}/{package}/", get(all_versions))
        .route("/i10e/{scope}/{package}/{version}", get(matching_versions))
        .route("/i10e/{scope}/{package}/{version}/{*path}", get(version_files))
        .route("/{scope}/{package}", get(import_package))
        .route("/{scope}/{package}/{*path}", get(import_file))
        .layer(middleware::from_fn(observe))
        .with_state(state)
}

/// Serve until ctrl-c.
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    Ok(())
}

mod common;

use common::{registry, TestServer};
use oscar::server::REGISTRY_CONTENT_TYPE;
use oscar_core::runtime::memory::InMemoryMetadata;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn test_ping_and_cors_headers() {
    let server = TestServer::start(registry()).await;
    let response = server.get("/ping").await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-headers"], "*");
    let timing = headers["x-response-time"].to_str().unwrap();
    assert!(timing.ends_with("ms"), "unexpected timing header {timing}");
    assert_eq!(response.text().await.unwrap(), "pong");
}

#[tokio::test]
async fn test_root_is_a_teapot() {
    let server = TestServer::start(registry()).await;
    let response = server.get("/").await;
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(response.text().await.unwrap(), "Are you lost?");
}

#[tokio::test]
async fn test_range_redirects_to_canonical_version() {
    let server = TestServer::start(registry()).await;
    let response = server.get("/@acme/widgets@^1.0.0/mod.ts?bundle").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[LOCATION], "/@acme/widgets@1.3.0/mod.ts?bundle");
    assert_eq!(response.headers()[CACHE_CONTROL], "public, max-age=300");
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_redirect_keeps_escaped_path_segments() {
    let server = TestServer::start(registry()).await;
    let response = server.get("/@acme/widgets@^1.0.0/a%3Fb%20c.ts?bundle").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[LOCATION], "/@acme/widgets@1.3.0/a%3Fb%20c.ts?bundle");
}

#[tokio::test]
async fn test_runtime_client_gets_raw_source() {
    let server = TestServer::start(registry()).await;
    server.put_file("acme", "widgets@1.3.0", "mod.ts", "export const x: number = 1;");

    let response = server
        .get_as("/@acme/widgets@1.3.0/mod.ts", "Deno/1.40.0")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/typescript");
    assert_eq!(response.headers()[CACHE_CONTROL], "public, max-age=691200");
    assert_eq!(response.text().await.unwrap(), "export const x: number = 1;");
}

#[tokio::test]
async fn test_browser_gets_transpiled_module_once() {
    let server = TestServer::start(registry()).await;
    server.put_file("acme", "widgets@1.3.0", "mod.ts", "export const x: number = 1;");

    for _ in 0..2 {
        let response = server
            .get_as("/@acme/widgets@1.3.0/mod.ts", "Mozilla/5.0")
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/javascript");
        assert_eq!(
            response.text().await.unwrap(),
            "// ts\nexport const x: number = 1;"
        );
    }
    assert_eq!(server.storage.put_count(), 1);
}

#[tokio::test]
async fn test_not_found_and_bad_requests() {
    let server = TestServer::start(registry()).await;

    let response = server.get("/@acme/nope/mod.ts").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "Package not found");

    let response = server.get("/@acme/widgets@^9.0.0/mod.ts").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "Version not found");

    let response = server.get("/@acme/widgets@2.0.0/missing.ts").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server.get("/@acme/widgets").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = server.get("/acme/widgets/mod.ts").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway() {
    let metadata = registry();
    metadata.fail_with(oscar_core::MetadataError::Transport("connection reset".into()));
    let server = TestServer::start(metadata).await;

    let response = server.get("/@acme/widgets/mod.ts").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_debug_report() {
    let server = TestServer::start(registry()).await;
    let response = server.get("/@acme/widgets@~1.2/mod.ts?debug").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["resolved"], "1.2.0");
    assert_eq!(body["latest"], "2.0.0");
}

#[tokio::test]
async fn test_registry_schema() {
    let server = TestServer::start(registry()).await;
    let response = server.get("/.well-known/deno-import-intellisense.json").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], REGISTRY_CONTENT_TYPE);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["version"], 2);
    assert_eq!(body["registries"][0]["schema"], "/@:scope/:module@:version?/:path*");
    assert_eq!(body["registries"][0]["variables"][2]["url"], "/i10e/${scope}/${module}/${{version}}");
}

#[tokio::test]
async fn test_scope_completions() {
    let server = TestServer::start(registry()).await;
    let body: Value = server.get("/i10e/acme").await.json().await.unwrap();
    assert_eq!(body["items"], serde_json::json!(["other", "widgets", "widgets-core"]));
    assert_eq!(body["isIncomplete"], false);

    let body: Value = server.get("/i10e/unknown").await.json().await.unwrap();
    assert_eq!(body["items"], serde_json::json!([]));
}

#[tokio::test]
async fn test_package_search_preselects_best_match() {
    let server = TestServer::start(registry()).await;
    let response = server.get("/i10e/acme/widg").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["items"], serde_json::json!(["widgets@", "widgets-core@"]));
    assert_eq!(body["preselect"], "widgets@");
}

#[tokio::test]
async fn test_version_completions() {
    let server = TestServer::start(registry()).await;

    let body: Value = server.get("/i10e/acme/widgets/").await.json().await.unwrap();
    assert_eq!(body["items"], serde_json::json!(["^2.0.0", "^1.3.0", "^1.2.0"]));
    assert_eq!(body["preselect"], "^2.0.0");

    let body: Value = server.get("/i10e/acme/widgets/%5E1").await.json().await.unwrap();
    assert_eq!(body["items"], serde_json::json!(["^1.3.0", "^1.2.0"]));
}

#[tokio::test]
async fn test_file_completions() {
    let server = TestServer::start(registry()).await;
    let body: Value = server.get("/i10e/acme/widgets/1.3.0/R").await.json().await.unwrap();
    assert_eq!(body["items"], serde_json::json!(["mod.ts", "README.md"]));

    let body: Value = server
        .get("/i10e/acme/widgets/%5E1.0.0/m")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["items"], serde_json::json!(["mod.ts", "README.md"]));
}

#[tokio::test]
async fn test_autocomplete_upstream_failure() {
    let metadata = InMemoryMetadata::new();
    metadata.fail_with(oscar_core::MetadataError::Upstream("rate limited".into()));
    let server = TestServer::start(metadata).await;

    let response = server.get("/i10e/acme").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

//! Integration tests for the HTTP plugin store and compile service.
//!
//! Both run against a local wiremock server.

mod common;

use nimbus_core::{NimbusError, PluginId};
use nimbus_plugin_api::StoredPlugin;
use nimbus_plugin_runtime::{
    CompileRequest, CompileService, HttpCompileService, HttpPluginStore, MemoryPluginStore, PluginEngine,
    PluginStore, RuntimeState,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn stored(id: &str) -> StoredPlugin {
    StoredPlugin {
        manifest: common::manifest(id),
        code: "(module)".to_string(),
    }
}

fn plugin_store(server: &MockServer) -> HttpPluginStore {
    HttpPluginStore::with_client(reqwest::Client::new(), &format!("{}/api/plugins/", server.uri()))
}

#[tokio::test]
async fn test_list_installed_plugins() {
    let server = MockServer::start().await;
    let records = vec![stored("p1"), stored("p2")];
    Mock::given(method("GET"))
        .and(path("/api/plugins"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&records))
        .expect(1)
        .mount(&server)
        .await;

    let listed = plugin_store(&server).list().await.unwrap();

    assert_eq!(listed, records);
}

#[tokio::test]
async fn test_save_posts_manifest_and_code() {
    let server = MockServer::start().await;
    let record = stored("p1");
    Mock::given(method("POST"))
        .and(path("/api/plugins"))
        .and(body_json(&record))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    plugin_store(&server).save(&record).await.unwrap();
}

#[tokio::test]
async fn test_save_failure_maps_to_external_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = plugin_store(&server).save(&stored("p1")).await.unwrap_err();

    assert!(matches!(err, NimbusError::ExternalService { ref message, .. } if message.contains("maintenance")));
}

#[tokio::test]
async fn test_delete_by_id() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/plugins/p1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/plugins/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = plugin_store(&server);
    store.delete(&PluginId::new("p1")).await.unwrap();
    store.delete(&PluginId::new("gone")).await.unwrap();
}

#[tokio::test]
async fn test_unreachable_store() {
    let store = HttpPluginStore::with_client(reqwest::Client::new(), "http://127.0.0.1:9/api/plugins");

    let err = store.list().await.unwrap_err();

    assert!(matches!(err, NimbusError::ExternalService { ref service, .. } if service == "plugin-store"));
}

#[tokio::test]
async fn test_compile_request_wire_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/compile"))
        .and(body_json(json!({
            "command": "gcc",
            "args": ["main.c", "-o", "main"],
            "code": "int main() { return 0; }",
            "fileName": "main.c",
            "workingDirectory": "/tmp",
            "environment": null
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": "" })))
        .expect(1)
        .mount(&server)
        .await;
    let service = HttpCompileService::with_client(reqwest::Client::new(), &format!("{}/api/compile", server.uri()));

    let response = service
        .compile(CompileRequest {
            command: "gcc".to_string(),
            args: vec!["main.c".to_string(), "-o".to_string(), "main".to_string()],
            code: "int main() { return 0; }".to_string(),
            file_name: "main.c".to_string(),
            working_directory: Some("/tmp".to_string()),
            environment: None,
        })
        .await
        .unwrap();

    assert_eq!(response.output, "");
}

#[tokio::test]
async fn test_compile_failure_carries_status_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    let service = HttpCompileService::with_client(reqwest::Client::new(), &server.uri());

    let err = service
        .compile(CompileRequest {
            command: "node".to_string(),
            args: vec!["a.js".to_string()],
            code: String::new(),
            file_name: "a.js".to_string(),
            working_directory: None,
            environment: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, NimbusError::Compilation(ref status) if status == "Bad Gateway"));
}

#[tokio::test]
async fn test_engine_compile_and_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/compile"))
        .and(body_partial_json(json!({
            "command": "node",
            "args": ["a.js"],
            "code": "console.log(1)",
            "fileName": "a.js"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": "1\n" })))
        .expect(1)
        .mount(&server)
        .await;
    let compiler = HttpCompileService::with_client(reqwest::Client::new(), &format!("{}/api/compile", server.uri()));
    let engine = PluginEngine::new(
        RuntimeState::new(common::test_config()),
        Arc::new(MemoryPluginStore::new()),
        Arc::new(compiler),
    );

    let output = engine.compile_and_run("javascript", "console.log(1)", "a.js").await.unwrap();
    assert_eq!(output, "1\n");

    let err = engine.compile_and_run("markdown", "# notes", "notes.md").await.unwrap_err();
    assert!(matches!(err, NimbusError::CompilerConfigMissing(_)));
}

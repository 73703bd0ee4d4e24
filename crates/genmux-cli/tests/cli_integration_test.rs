//! CLI Integration Tests
//!
//! Drives the `genmux` binary end to end:
//! 1. Argument and URL validation
//! 2. Manifest errors at startup
//! 3. `serve` with a manifest, queried through `status` and `generate`
//!
//! Addresses use `127.0.0.1` with explicit ports to avoid DNS lookups.

use genmux_cli::GenmuxClient;
use serde_json::Value;
use std::io::Write;
use std::process::{Child, Command, Output, Stdio};
use std::time::Duration;

// ============================================================================
// Test Helpers
// ============================================================================

fn genmux() -> Command {
    Command::new(env!("CARGO_BIN_EXE_genmux"))
}

fn run(args: &[&str]) -> Output {
    genmux().args(args).output().expect("failed to run genmux")
}

/// Returns a port that was free a moment ago.
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn write_manifest(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

/// Kills the server process when the test ends.
struct ServerProcess {
    child: Child,
    url: String,
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

async fn start_server(manifest: &tempfile::NamedTempFile) -> ServerProcess {
    let port = free_port();
    let bind = format!("127.0.0.1:{}", port);
    let child = genmux()
        .args([
            "serve",
            "-b",
            &bind,
            "--nodes",
            manifest.path().to_str().unwrap(),
            "--disable-health-check",
            "--retry-limit",
            "2",
            "--retry-delay",
            "10",
            "--default-timeout",
            "2000",
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn genmux serve");

    let server = ServerProcess {
        child,
        url: format!("http://{}", bind),
    };

    let client = GenmuxClient::new(&server.url)
        .unwrap()
        .with_timeout(Duration::from_secs(1));
    for _ in 0..100 {
        if matches!(client.health().await, Ok(true)) {
            return server;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("genmux serve did not become ready on {}", server.url);
}

/// A manifest whose single node points at a port nobody listens on.
fn unreachable_manifest() -> tempfile::NamedTempFile {
    write_manifest(&format!(
        r#"[{{"name": "offline", "kind": "ollama", "endpoint": "http://127.0.0.1:{}"}}]"#,
        free_port()
    ))
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_no_subcommand_fails() {
    let output = run(&[]);
    assert!(!output.status.success());
}

#[test]
fn test_help_lists_commands() {
    let output = run(&["--help"]);
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("serve"));
    assert!(text.contains("generate"));
    assert!(text.contains("status"));
}

#[test]
fn test_status_rejects_url_without_scheme() {
    let output = run(&["status", "127.0.0.1:8080"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("must start with http:// or https://"));
}

#[test]
fn test_generate_rejects_url_without_scheme() {
    let output = run(&["generate", "127.0.0.1:8080", "--prompt", "hi"]);
    assert!(!output.status.success());
}

#[test]
fn test_serve_with_missing_manifest_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nodes.json");
    let output = run(&[
        "serve",
        "-b",
        "127.0.0.1:0",
        "--nodes",
        missing.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read node manifest"));
}

#[test]
fn test_serve_with_invalid_node_fails() {
    let manifest = write_manifest(
        r#"[{"name": "bad", "kind": "ollama", "endpoint": "http://127.0.0.1:1", "weight": 0}]"#,
    );
    let output = run(&[
        "serve",
        "-b",
        "127.0.0.1:0",
        "--nodes",
        manifest.path().to_str().unwrap(),
        "--disable-health-check",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to register node 'bad'"));
}

#[test]
fn test_serve_with_invalid_config_fails() {
    let output = run(&["serve", "-b", "127.0.0.1:0", "--max-concurrent", "0"]);
    assert!(!output.status.success());
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_serve_registers_manifest_nodes() {
    let manifest = unreachable_manifest();
    let server = start_server(&manifest).await;

    let output = run(&["status", &server.url]);
    assert!(output.status.success());

    let status: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["total_nodes"], 1);
    assert_eq!(status["active_nodes"], 1);
    assert_eq!(status["nodes"][0]["name"], "offline");
    assert_eq!(status["nodes"][0]["kind"], "ollama");
}

#[tokio::test]
async fn test_generate_against_unreachable_node_is_rejected() {
    let manifest = unreachable_manifest();
    let server = start_server(&manifest).await;

    let output = run(&["generate", &server.url, "--prompt", "hello"]);
    assert!(!output.status.success());

    let reply: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reply["success"], false);
    assert_eq!(reply["attempts"], 2);

    let client = GenmuxClient::new(&server.url).unwrap();
    let status = client.status().await.unwrap();
    let failed = status["stats"]["failed_requests"].as_u64().unwrap();
    assert!(failed >= 1);
    assert_eq!(status["stats"]["successful_requests"], 0);
    assert_eq!(status["nodes"][0]["success_count"], 0);
}

//! Integration tests for a single stdio connection
//!
//! Every test spawns the `stub_server` helper binary as a real child process
//! and drives it through `RpcClient`.

use serde_json::json;
use std::time::Duration;
use toolbridge::{RpcClient, RpcError, ServerConfig, ServerKind, ServerStatus};

fn stub_config(name: &str, args: &[&str]) -> ServerConfig {
    let mut config = ServerConfig::new(name, env!("CARGO_BIN_EXE_stub_server"))
        .with_args(args.iter().copied());
    config.startup_timeout = 10.0;
    config.request_timeout = 10.0;
    config.shutdown_timeout = 2.0;
    config
}

#[tokio::test]
async fn test_handshake_stores_capabilities() {
    let client = RpcClient::new(stub_config("stub", &["--tag", "a"]));
    assert_eq!(client.status(), ServerStatus::Stopped);

    client.start().await.expect("start stub server");

    assert_eq!(client.status(), ServerStatus::Running);
    assert_eq!(client.capabilities(), Some(json!({"x": true})));
    assert!(client.pid().is_some());
    assert!(client.state().started_at.is_some());

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_list_and_call_tools() {
    let client = RpcClient::new(stub_config("stub", &["--tag", "a", "--tools", "echo,build"]));
    client.start().await.unwrap();

    let tools = client.list_tools().await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "build"]);
    assert!(tools.iter().all(|t| t.server_name == "stub"));

    let echoed = client
        .call_capability("echo", json!({"text": "hello"}))
        .await
        .unwrap();
    assert_eq!(echoed["content"][0]["text"], "hello");
    assert_eq!(echoed["isError"], false);

    let built = client.call_capability("build", json!({})).await.unwrap();
    assert_eq!(built["content"][0]["text"], "a:build");

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_requests_resolve_to_their_callers() {
    let client = RpcClient::new(stub_config("stub", &[]));
    client.start().await.unwrap();

    let shared = &client;
    let calls = (0..5).map(move |i| async move {
        let text = format!("call-{}", i);
        let result = shared
            .call_capability("echo", json!({"text": text.clone()}))
            .await
            .unwrap();
        (text, result["content"][0]["text"].as_str().unwrap().to_string())
    });

    for (sent, received) in futures::future::join_all(calls).await {
        assert_eq!(sent, received);
    }
    assert_eq!(client.pending_count().await, 0);

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_process_death_fails_pending_request() {
    let client = RpcClient::new(stub_config("stub", &["--tools", "echo,crash"]));
    client.start().await.unwrap();

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        client.call_capability("crash", json!({})),
    )
    .await
    .expect("pending request must resolve once the process dies")
    .unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)), "got {:?}", err);

    assert_eq!(client.status(), ServerStatus::Error);
    assert!(client.state().error.is_some());

    let err = client
        .call_capability("echo", json!({"text": "again"}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::NotRunning {
            status: ServerStatus::Error,
            ..
        }
    ));

    // A crashed connection can be started again
    client.start().await.unwrap();
    assert_eq!(client.status(), ServerStatus::Running);
    client.stop().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_killed_process_fails_pending_request_while_output_stays_open() {
    // The background `sleep` inherits stdout, so the pipe never reaches EOF
    let script = format!(
        "sleep 20 & exec '{}' --tools echo,sleep",
        env!("CARGO_BIN_EXE_stub_server")
    );
    let mut config = ServerConfig::new("stub", "sh").with_args(["-c".to_string(), script]);
    config.startup_timeout = 10.0;
    config.request_timeout = 30.0;
    config.shutdown_timeout = 2.0;
    let client = RpcClient::new(config);
    client.start().await.unwrap();
    let pid = client.pid().unwrap();

    let call = client.call_capability("sleep", json!({}));
    let kill = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = std::process::Command::new("kill")
            .args(["-9", &pid.to_string()])
            .status()
            .unwrap();
        assert!(status.success());
    };
    let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(call, kill)
    })
    .await
    .expect("pending request must resolve once the process is killed");

    let err = result.unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)), "got {:?}", err);
    assert_eq!(client.status(), ServerStatus::Error);
    let reason = client.state().error.unwrap();
    assert!(reason.contains("process exited"), "got {}", reason);

    let err = client
        .call_capability("echo", json!({"text": "again"}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::NotRunning {
            status: ServerStatus::Error,
            ..
        }
    ));

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_request_timeout_keeps_connection_usable() {
    let mut config = stub_config("stub", &["--tools", "echo,sleep"]);
    config.request_timeout = 0.2;
    let client = RpcClient::new(config);
    client.start().await.unwrap();

    let err = client.call_capability("sleep", json!({})).await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout { .. }), "got {:?}", err);
    assert_eq!(client.status(), ServerStatus::Running);

    let echoed = client
        .call_capability("echo", json!({"text": "still here"}))
        .await
        .unwrap();
    assert_eq!(echoed["content"][0]["text"], "still here");

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_method_is_remote_error() {
    let client = RpcClient::new(stub_config("stub", &[]));
    client.start().await.unwrap();

    let err = client.request("nope/nothing", None).await.unwrap_err();
    match err {
        RpcError::Remote { code, .. } => assert_eq!(code, -32601),
        other => panic!("expected remote error, got {:?}", other),
    }
    assert_eq!(client.status(), ServerStatus::Running);

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_refused_initialize_leaves_error_status() {
    let client = RpcClient::new(stub_config("stub", &["--mode", "fail-init"]));

    let err = client.start().await.unwrap_err();
    assert!(matches!(err, RpcError::Remote { .. }), "got {:?}", err);
    assert_eq!(client.status(), ServerStatus::Error);
    assert!(client.pid().is_none());
}

#[tokio::test]
async fn test_silent_initialize_times_out() {
    let mut config = stub_config("stub", &["--mode", "silent-init"]);
    config.startup_timeout = 0.3;
    let client = RpcClient::new(config);

    let err = client.start().await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout { .. }), "got {:?}", err);
    assert_eq!(client.status(), ServerStatus::Error);
}

#[tokio::test]
async fn test_malformed_frame_is_protocol_failure() {
    let client = RpcClient::new(stub_config("stub", &["--mode", "bad-frame"]));

    let err = client.start().await.unwrap_err();
    assert!(err.is_connection_fatal(), "got {:?}", err);
    assert_eq!(client.status(), ServerStatus::Error);
}

#[tokio::test]
async fn test_missing_binary_fails_start() {
    let client = RpcClient::new(ServerConfig::new("ghost", "/nonexistent/toolbridge-ghost"));

    let err = client.start().await.unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)), "got {:?}", err);
    assert_eq!(client.status(), ServerStatus::Error);
}

#[tokio::test]
async fn test_stop_resets_state() {
    let client = RpcClient::new(stub_config("stub", &[]));
    client.start().await.unwrap();
    assert!(client.pid().is_some());

    client.stop().await.unwrap();
    assert_eq!(client.status(), ServerStatus::Stopped);
    assert!(client.pid().is_none());
    assert!(client.capabilities().is_none());

    // Second stop is a no-op
    client.stop().await.unwrap();

    let err = client.request("ping", None).await.unwrap_err();
    assert!(matches!(
        err,
        RpcError::NotRunning {
            status: ServerStatus::Stopped,
            ..
        }
    ));
}

#[tokio::test]
async fn test_language_server_features() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();

    let config = stub_config("stub-ls", &["--mode", "lsp", "--tag", "ls"]).with_kind(ServerKind::Lsp);
    let client = RpcClient::new(config).with_root(dir.path());
    client.start().await.unwrap();

    let names: Vec<String> = client
        .list_tools()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert!(names.contains(&"hover".to_string()));
    assert!(names.contains(&"goto_definition".to_string()));
    assert!(!names.contains(&"find_references".to_string()));

    let hover = client
        .call_capability("hover", json!({"file": "main.rs", "line": 0, "character": 3}))
        .await
        .unwrap();
    assert_eq!(hover["contents"]["value"], "hover from ls");

    let diagnostics = client
        .call_capability("diagnostics", json!({"file": "main.rs"}))
        .await
        .unwrap();
    assert_eq!(
        diagnostics["diagnostics"][0]["message"],
        "stub diagnostic from ls"
    );

    let err = client
        .call_capability("find_references", json!({"file": "main.rs", "line": 0, "character": 3}))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::NotFound(_)));

    // shutdown + exit lets the stub leave on its own
    client.stop().await.unwrap();
    assert_eq!(client.status(), ServerStatus::Stopped);
}

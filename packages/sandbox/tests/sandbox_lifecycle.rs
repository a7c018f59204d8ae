// ABOUTME: Integration tests for sandbox lifecycle against a real container engine
// ABOUTME: Covers create, list, resolve, pause/resume, host URLs and kill

mod common;

use common::{cleanup, create_test_sandbox, engine_client, TEST_IMAGE};
use csbx_sandbox::{CreateSandboxRequest, PortMapping, SandboxError, SandboxStatus};
use std::collections::BTreeMap;

/// Test complete sandbox lifecycle: create → pause → resume → kill
#[tokio::test]
async fn test_complete_sandbox_lifecycle() {
    let Some(client) = engine_client().await else {
        return;
    };
    let manager = client.manager();

    let request = CreateSandboxRequest {
        template: Some(TEST_IMAGE.to_string()),
        timeout_secs: Some(900),
        metadata: BTreeMap::from([
            ("purpose".to_string(), serde_json::json!("lifecycle")),
            ("attempt".to_string(), serde_json::json!(1)),
        ]),
        ..Default::default()
    };

    let sandbox = manager.create(request).await.expect("Failed to create sandbox");

    assert_eq!(sandbox.id.len(), 12);
    assert!(sandbox.name.starts_with("csbx-"));
    assert_eq!(sandbox.status, SandboxStatus::Running);
    assert_eq!(sandbox.template, TEST_IMAGE);
    assert_eq!(sandbox.timeout_secs, Some(900));
    assert_eq!(sandbox.metadata.get("purpose").unwrap(), "lifecycle");
    assert_eq!(sandbox.metadata.get("attempt").unwrap(), "1");
    assert!(sandbox.created_at.is_some());

    // Lookup by name resolves to the same id
    let resolved = manager.resolve_identifier(&sandbox.name).await.unwrap();
    assert_eq!(resolved, sandbox.id);

    manager.pause(&sandbox.id).await.expect("Failed to pause");
    let paused = manager.get_info(&sandbox.id).await.unwrap();
    assert_eq!(paused.status, SandboxStatus::Paused);
    assert!(!manager.is_running(&sandbox.id).await.unwrap());

    manager.resume(&sandbox.id).await.expect("Failed to resume");
    assert!(manager.is_running(&sandbox.id).await.unwrap());

    assert!(manager.kill(&sandbox.id).await.unwrap());

    let result = manager.get_info(&sandbox.id).await;
    assert!(matches!(result, Err(SandboxError::NotFound(_))));
    assert!(!manager.is_running(&sandbox.id).await.unwrap());
}

#[tokio::test]
async fn test_kill_absent_sandbox_returns_false() {
    let Some(client) = engine_client().await else {
        return;
    };

    let killed = client
        .manager()
        .kill("csbx-does-not-exist-0000")
        .await
        .unwrap();
    assert!(!killed);
}

#[tokio::test]
async fn test_concurrent_creates_are_distinct_and_listed() {
    let Some(client) = engine_client().await else {
        return;
    };

    let (a, b) = tokio::join!(
        create_test_sandbox(&client, "concurrent-a"),
        create_test_sandbox(&client, "concurrent-b")
    );
    assert_ne!(a, b);

    let listed = client.manager().list(None).await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|s| s.id.as_str()).collect();
    assert!(ids.contains(&a.as_str()));
    assert!(ids.contains(&b.as_str()));

    cleanup(&client, &a).await;
    cleanup(&client, &b).await;
}

#[tokio::test]
async fn test_named_sandbox_gets_prefix() {
    let Some(client) = engine_client().await else {
        return;
    };

    let name = format!("it-{}", std::process::id());
    let request = CreateSandboxRequest {
        template: Some(TEST_IMAGE.to_string()),
        name: Some(name.clone()),
        ..Default::default()
    };

    let sandbox = client.manager().create(request).await.unwrap();
    assert_eq!(sandbox.name, format!("csbx-{}", name));

    let connected = client.manager().connect(&sandbox.name).await.unwrap();
    assert_eq!(connected.id, sandbox.id);

    cleanup(&client, &sandbox.id).await;
}

#[tokio::test]
async fn test_get_host_reports_published_port() {
    let Some(client) = engine_client().await else {
        return;
    };

    // Pick a high port unlikely to collide across parallel test runs
    let host_port = 40000 + (std::process::id() % 20000) as u16;
    let request = CreateSandboxRequest {
        template: Some(TEST_IMAGE.to_string()),
        ports: vec![PortMapping {
            container_port: 8000,
            host_port,
        }],
        ..Default::default()
    };

    let sandbox = match client.manager().create(request).await {
        Ok(sandbox) => sandbox,
        Err(e) => {
            println!("Skipping test: could not publish port {} ({})", host_port, e);
            return;
        }
    };

    let host = &client.manager().config().host_address;

    let url = client.manager().get_host(&sandbox.id, 8000).await.unwrap();
    assert_eq!(url, format!("http://{}:{}", host, host_port));

    let fallback = client.manager().get_host(&sandbox.id, 9999).await.unwrap();
    assert_eq!(fallback, format!("http://{}:9999", host));

    cleanup(&client, &sandbox.id).await;
}

// ABOUTME: Shared helpers for integration tests against a real container engine
// ABOUTME: Tests skip themselves when no engine is reachable

#![allow(dead_code)]

use csbx_sandbox::{CreateSandboxRequest, SandboxClient};
use std::collections::BTreeMap;

/// Image with GNU coreutils, needed for `ls --time-style` and `stat -c`
pub const TEST_IMAGE: &str = "debian:bookworm-slim";

/// Connect to the configured engine, or `None` when it is unavailable
pub async fn engine_client() -> Option<SandboxClient> {
    let client = match SandboxClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            println!("Skipping test: no container runtime ({})", e);
            return None;
        }
    };

    if let Err(e) = client.manager().ping().await {
        println!("Skipping test: container engine not reachable ({})", e);
        return None;
    }

    Some(client)
}

/// Create a sandbox from the test image tagged with the calling test's name
pub async fn create_test_sandbox(client: &SandboxClient, test: &str) -> String {
    let request = CreateSandboxRequest {
        template: Some(TEST_IMAGE.to_string()),
        metadata: BTreeMap::from([("test".to_string(), serde_json::json!(test))]),
        ..Default::default()
    };

    client
        .manager()
        .create(request)
        .await
        .expect("Failed to create sandbox")
        .id
}

pub async fn cleanup(client: &SandboxClient, sandbox_id: &str) {
    if let Err(e) = client.manager().kill(sandbox_id).await {
        eprintln!("Failed to clean up sandbox {}: {}", sandbox_id, e);
    }
}

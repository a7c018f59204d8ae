// ABOUTME: Integration tests for command execution and file transfer in a live sandbox
// ABOUTME: Exercises shell execution, text and binary round trips, and host transfers

mod common;

use common::{cleanup, create_test_sandbox, engine_client};
use csbx_sandbox::{FileType, RunOptions, SandboxError};
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_run_echo_and_missing_path() {
    let Some(client) = engine_client().await else {
        return;
    };
    let id = create_test_sandbox(&client, "run").await;
    let commands = client.commands();

    let result = commands
        .run(&id, "echo hello", &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), "hello");
    assert_eq!(result.stderr, "");

    let missing = commands
        .run(&id, "ls /definitely-missing", &RunOptions::default())
        .await
        .unwrap();
    assert_ne!(missing.exit_code, 0);
    assert!(!missing.stderr.is_empty());

    let empty = commands.run(&id, "", &RunOptions::default()).await;
    assert!(matches!(empty, Err(SandboxError::Usage(_))));

    let options = RunOptions {
        cwd: Some("/tmp".to_string()),
        env: [("GREETING".to_string(), "hi there".to_string())].into(),
        ..Default::default()
    };
    let scoped = commands
        .run(&id, "echo \"$GREETING from $(pwd)\"", &options)
        .await
        .unwrap();
    assert_eq!(scoped.stdout.trim(), "hi there from /tmp");

    cleanup(&client, &id).await;
}

#[tokio::test]
async fn test_run_timeout() {
    let Some(client) = engine_client().await else {
        return;
    };
    let id = create_test_sandbox(&client, "timeout").await;

    let options = RunOptions {
        timeout_secs: Some(1),
        ..Default::default()
    };
    let result = client.commands().run(&id, "sleep 5", &options).await;
    assert!(matches!(result, Err(SandboxError::Timeout { seconds: 1 })));

    cleanup(&client, &id).await;
}

#[tokio::test]
async fn test_detached_command_status() {
    let Some(client) = engine_client().await else {
        return;
    };
    let id = create_test_sandbox(&client, "detached").await;
    let commands = client.commands();

    let process = commands
        .run_detached(&id, "sleep 1; exit 3", &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(process.sandbox_id, id);

    let mut status = commands.detached_status(&process).await.unwrap();
    for _ in 0..50 {
        if !status.running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        status = commands.detached_status(&process).await.unwrap();
    }

    assert!(!status.running);
    assert_eq!(status.exit_code, Some(3));

    cleanup(&client, &id).await;
}

#[tokio::test]
async fn test_text_round_trips() {
    let Some(client) = engine_client().await else {
        return;
    };
    let id = create_test_sandbox(&client, "text").await;
    let files = client.files();

    let samples = [
        "",
        "line one\nline two\n\nline four",
        "it's \"quoted\" and $HOME and `backticks` and \\n",
        "héllo wörld ✓ 日本語",
        "%s %d 100%",
    ];

    for (i, content) in samples.iter().enumerate() {
        let path = format!("/tmp/sample-{}.txt", i);
        files.write_text(&id, &path, content).await.unwrap();
        let read = files.read_text(&id, &path).await.unwrap();
        assert_eq!(&read, content, "round trip failed for sample {}", i);
    }

    cleanup(&client, &id).await;
}

#[tokio::test]
async fn test_binary_round_trip_one_mebibyte() {
    let Some(client) = engine_client().await else {
        return;
    };
    let id = create_test_sandbox(&client, "binary").await;
    let files = client.files();

    let payload: Vec<u8> = (0..1024 * 1024u32).map(|i| (i * 7 % 256) as u8).collect();
    files.write_bytes(&id, "/tmp/blob.bin", &payload).await.unwrap();

    let read = files.read_bytes(&id, "/tmp/blob.bin").await.unwrap();
    assert_eq!(read.len(), payload.len());
    assert!(read == payload);

    let missing = files.read_bytes(&id, "/tmp/absent.bin").await;
    assert!(matches!(missing, Err(SandboxError::NotFound(_))));

    let directory = files.read_bytes(&id, "/etc").await;
    assert!(matches!(directory, Err(SandboxError::Transfer(_))));

    let relative = files.write_text(&id, "relative.txt", "x").await;
    assert!(matches!(relative, Err(SandboxError::Usage(_))));

    let quotes = "'".repeat(40_000);
    files.write_text(&id, "/tmp/quotes.txt", &quotes).await.unwrap();
    assert_eq!(files.read_text(&id, "/tmp/quotes.txt").await.unwrap(), quotes);

    cleanup(&client, &id).await;
}

#[tokio::test]
async fn test_exists_remove_mkdir_and_listing() {
    let Some(client) = engine_client().await else {
        return;
    };
    let id = create_test_sandbox(&client, "fsops").await;
    let files = client.files();

    files.write_text(&id, "/tmp/x.txt", "x").await.unwrap();
    assert!(files.exists(&id, "/tmp/x.txt").await.unwrap());

    let info = files.info(&id, "/tmp/x.txt").await.unwrap();
    assert_eq!(info.name, "x.txt");
    assert_eq!(info.size, 1);
    assert_eq!(info.file_type, FileType::File);

    files.remove(&id, "/tmp/x.txt").await.unwrap();
    assert!(!files.exists(&id, "/tmp/x.txt").await.unwrap());
    files.remove(&id, "/tmp/x.txt").await.unwrap();

    assert!(!files.mkdir(&id, "/tmp").await.unwrap());
    assert!(files.mkdir(&id, "/tmp/a/b/c").await.unwrap());
    assert_eq!(
        files.info(&id, "/tmp/a/b/c").await.unwrap().file_type,
        FileType::Dir
    );

    files.write_text(&id, "/tmp/a/b/c/leaf.txt", "leaf").await.unwrap();
    let renamed = files
        .rename(&id, "/tmp/a/b/c/leaf.txt", "/tmp/a/leaf.txt")
        .await
        .unwrap();
    assert_eq!(renamed.name, "leaf.txt");

    let shallow = files.list(&id, "/tmp/a", 1).await.unwrap();
    let names: Vec<&str> = shallow.iter().map(|f| f.name.as_str()).collect();
    assert!(names.contains(&"b"));
    assert!(names.contains(&"leaf.txt"));

    let deep = files.list(&id, "/tmp/a", 3).await.unwrap();
    assert!(deep.iter().any(|f| f.path == "/tmp/a/b/c"));

    let missing = files.list(&id, "/definitely-missing", 1).await;
    assert!(matches!(missing, Err(SandboxError::NotFound(_))));

    cleanup(&client, &id).await;
}

#[tokio::test]
async fn test_upload_download_and_export() {
    let Some(client) = engine_client().await else {
        return;
    };
    let id = create_test_sandbox(&client, "transfer").await;
    let files = client.files();
    let dir = TempDir::new().unwrap();

    let local = dir.path().join("upload.txt");
    std::fs::write(&local, "from the host\n").unwrap();

    let up = files.upload(&id, &local, "/tmp/upload.txt").await.unwrap();
    assert_eq!(up.size, 14);
    assert_eq!(
        files.read_text(&id, "/tmp/upload.txt").await.unwrap(),
        "from the host\n"
    );

    let target = dir.path().join("nested").join("download.txt");
    let down = files
        .download(&id, "/tmp/upload.txt", &target)
        .await
        .unwrap();
    assert_eq!(down.size, 14);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "from the host\n");

    let absent = files
        .upload(&id, &dir.path().join("absent"), "/tmp/absent")
        .await;
    assert!(matches!(absent, Err(SandboxError::NotFound(_))));

    files.mkdir(&id, "/tmp/project/src").await.unwrap();
    files
        .write_text(&id, "/tmp/project/src/main.rs", "fn main() {}\n")
        .await
        .unwrap();
    let exported = files
        .export_archive(&id, "/tmp/project", dir.path(), Some("project"))
        .await
        .unwrap();
    assert!(exported.ends_with("project.tar.gz"));
    assert!(std::fs::metadata(&exported).unwrap().len() > 0);
    assert!(!files.exists(&id, "/tmp/project.tar.gz").await.unwrap());

    cleanup(&client, &id).await;
}

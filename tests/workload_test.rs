//! Tests for the post-bootstrap workload runner.

#![cfg(unix)]

use std::time::Duration;

use hsm_bootstrap::config::Secret;
use hsm_bootstrap::mode::Workload;
use hsm_bootstrap::workload::{WorkloadError, WorkloadRunner};
use tokio_util::sync::CancellationToken;

fn sh(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

#[tokio::test]
async fn test_test_command_exit_code_is_returned() {
    let runner = WorkloadRunner::new(Workload::RunAutomatedTests).test_cmd(sh("exit 5"));
    let code = runner.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(code, 5);
}

#[tokio::test]
async fn test_secret_is_exported_to_workload() {
    let runner = WorkloadRunner::new(Workload::RunAutomatedTests)
        .test_cmd(sh("test \"$HMAC_SECRET\" = hunter2"))
        .secret(Secret::new("hunter2"));
    assert_eq!(runner.run(&CancellationToken::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_install_runs_before_workload() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("installed");
    let runner = WorkloadRunner::new(Workload::RunAutomatedTests)
        .install(sh(&format!("touch {}", marker.display())))
        .test_cmd(sh(&format!("test -f {}", marker.display())));
    assert_eq!(runner.run(&CancellationToken::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_install_skips_workload() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let runner = WorkloadRunner::new(Workload::RunAutomatedTests)
        .install(sh("exit 9"))
        .test_cmd(sh(&format!("touch {}", marker.display())));

    let err = runner.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, WorkloadError::InstallFailed { code: 9, .. }));
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_empty_test_command_is_error() {
    let runner = WorkloadRunner::new(Workload::RunAutomatedTests);
    let err = runner.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, WorkloadError::EmptyCommand("test")));
}

#[tokio::test]
async fn test_noop_waits_for_cancellation() {
    let runner = WorkloadRunner::new(Workload::NoOp);
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });
    let code = tokio::time::timeout(Duration::from_secs(5), runner.run(&token))
        .await
        .expect("no-op should end on cancellation")
        .unwrap();
    assert_eq!(code, 0);
}

#[tokio::test]
async fn test_cancellation_interrupts_long_command() {
    let runner = WorkloadRunner::new(Workload::RunAutomatedTests).test_cmd(vec!["sleep".into(), "30".into()]);
    let token = CancellationToken::new();
    token.cancel();
    let code = tokio::time::timeout(Duration::from_secs(5), runner.run(&token))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(code, 130);
}

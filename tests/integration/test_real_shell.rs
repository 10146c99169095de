//! Real Shell Tests
//!
//! Run against `/bin/bash` on a real PTY. Ignored by default because they
//! depend on the host shell and its startup files:
//!
//! ```text
//! cargo test --test test_real_shell -- --ignored
//! ```

#![cfg(unix)]

use shellbridge::config::Config;
use shellbridge::{ExecuteOptions, ShellSessionManager};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn bash_manager() -> Option<ShellSessionManager> {
    if !Path::new("/bin/bash").exists() {
        return None;
    }
    let mut config = Config::default();
    config.shell.program = Some(PathBuf::from("/bin/bash"));
    config.shell.args = vec!["--norc".to_string(), "--noprofile".to_string()];
    config.protocol.quiescence_poll_ms = 100;
    Some(ShellSessionManager::with_pty(config))
}

#[tokio::test]
#[ignore]
async fn test_bash_echo_roundtrip() {
    let Some(manager) = bash_manager() else {
        return;
    };
    manager.create_shell_session().await.unwrap();
    assert!(manager.sentinel().is_some());

    let output = manager
        .execute_shell_command("echo shellbridge-ok", ExecuteOptions::with_timeout(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(output, "shellbridge-ok");

    manager.close_shell_session().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_bash_directory_tracking() {
    let Some(manager) = bash_manager() else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().canonicalize().unwrap();
    manager.create_shell_session().await.unwrap();

    let cwd = manager.navigate_to_directory(&target).await.unwrap();
    assert_eq!(cwd, target);

    manager.close_shell_session().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_bash_interrupt_sleep() {
    let Some(manager) = bash_manager() else {
        return;
    };
    manager.create_shell_session().await.unwrap();

    let result = manager
        .execute_shell_command("sleep 30", ExecuteOptions::with_timeout(Duration::from_millis(500)))
        .await;
    assert!(result.is_err());

    manager.interrupt_shell_session().await.unwrap();
    let output = manager
        .execute_shell_command("echo after", ExecuteOptions::with_timeout(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(output, "after");

    manager.close_shell_session().await.unwrap();
}

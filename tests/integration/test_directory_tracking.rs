//! Working Directory Tracking
//!
//! Caching, invalidation and the recovery path for `pwd` queries.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use shellbridge::{Error, ExecuteOptions, SessionEvent};
use std::path::PathBuf;
use tempfile::TempDir;
use test_utils::*;

fn pwd_calls(lines: &[String]) -> usize {
    lines.iter().filter(|line| line.as_str() == "pwd").count()
}

async fn manager_in(dir: &TempDir) -> (shellbridge::ShellSessionManager, std::sync::Arc<MockSpawner>) {
    let (manager, spawner) = create_test_manager(MockShellOptions {
        cwd: dir.path().to_path_buf(),
        ..MockShellOptions::default()
    });
    manager.create_shell_session().await.unwrap();
    (manager, spawner)
}

#[tokio::test]
async fn test_directory_is_cached() {
    let dir = TempDir::new().unwrap();
    let (manager, spawner) = manager_in(&dir).await;

    let first = manager.get_current_directory().await.unwrap();
    assert_eq!(first, dir.path());

    manager
        .execute_shell_command("echo no move", ExecuteOptions::default())
        .await
        .unwrap();
    let second = manager.get_current_directory().await.unwrap();
    assert_eq!(second, first);
    assert_eq!(pwd_calls(&spawner.shell().lines()), 1);
}

#[tokio::test]
async fn test_cd_invalidates_cache() {
    let dir = TempDir::new().unwrap();
    let sub = dir.path().join("sub");
    std::fs::create_dir(&sub).unwrap();
    let (manager, spawner) = manager_in(&dir).await;

    manager.get_current_directory().await.unwrap();
    manager
        .execute_shell_command(&format!("cd {}", sub.display()), ExecuteOptions::default())
        .await
        .unwrap();

    let cwd = manager.get_current_directory().await.unwrap();
    assert_eq!(cwd, sub);
    assert_eq!(pwd_calls(&spawner.shell().lines()), 2);
}

#[tokio::test]
async fn test_navigate_to_directory() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("it's here");
    std::fs::create_dir(&target).unwrap();
    let (manager, spawner) = manager_in(&dir).await;

    let cwd = manager.navigate_to_directory(&target).await.unwrap();
    assert_eq!(cwd, target);
    assert_eq!(spawner.shell().cwd(), target);
}

#[tokio::test]
async fn test_navigate_to_missing_directory_stays_put() {
    let dir = TempDir::new().unwrap();
    let (manager, _spawner) = manager_in(&dir).await;

    let cwd = manager
        .navigate_to_directory(&dir.path().join("missing"))
        .await
        .unwrap();
    assert_eq!(cwd, dir.path());
}

#[tokio::test]
async fn test_hung_pwd_recovers_after_interrupt() {
    let dir = TempDir::new().unwrap();
    let (manager, spawner) = manager_in(&dir).await;
    spawner.shell().hang_pwd(1);

    let cwd = manager.get_current_directory().await.unwrap();
    assert_eq!(cwd, dir.path());
    assert_eq!(pwd_calls(&spawner.shell().lines()), 2);
}

#[tokio::test]
async fn test_hung_pwd_recovers_after_reinstall() {
    let dir = TempDir::new().unwrap();
    let (manager, spawner) = manager_in(&dir).await;
    spawner.shell().hang_pwd(2);

    let cwd = manager.get_current_directory().await.unwrap();
    assert_eq!(cwd, dir.path());

    let lines = spawner.shell().lines();
    assert_eq!(pwd_calls(&lines), 3);
    let installs = lines
        .iter()
        .filter(|line| line.starts_with("PROMPT_COMMAND="))
        .count();
    assert_eq!(installs, 2);
}

#[tokio::test]
async fn test_last_known_good_directory_on_failure() {
    let dir = TempDir::new().unwrap();
    let sub = dir.path().join("sub");
    std::fs::create_dir(&sub).unwrap();
    let (manager, spawner) = manager_in(&dir).await;

    manager.get_current_directory().await.unwrap();
    manager
        .execute_shell_command(&format!("cd {}", sub.display()), ExecuteOptions::default())
        .await
        .unwrap();

    let mut events = manager.subscribe();
    spawner.shell().hang_pwd(3);
    let cwd = manager.get_current_directory().await.unwrap();
    assert_eq!(cwd, dir.path());

    let mut notices = 0;
    while let Some(event) = events.try_recv() {
        if matches!(event, SessionEvent::Notice { .. }) {
            notices += 1;
        }
    }
    assert_eq!(notices, 1);
}

#[tokio::test]
async fn test_no_directory_is_fabricated() {
    let dir = TempDir::new().unwrap();
    let (manager, spawner) = manager_in(&dir).await;
    spawner.shell().hang_pwd(3);

    let result = manager.get_current_directory().await;
    assert!(matches!(result, Err(Error::DirectoryUnavailable { .. })));
}

#[tokio::test]
async fn test_interrupt_keeps_cached_directory() {
    let dir = TempDir::new().unwrap();
    let (manager, spawner) = manager_in(&dir).await;

    let cwd: PathBuf = manager.get_current_directory().await.unwrap();
    manager.interrupt_shell_session().await.unwrap();
    assert_eq!(manager.get_current_directory().await.unwrap(), cwd);
    assert_eq!(pwd_calls(&spawner.shell().lines()), 1);
}

//! Interrupt Handling
//!
//! Interrupting hung commands, preemption, and the shell going away.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use shellbridge::models::{ExecutionState, SessionState};
use shellbridge::{Error, ExecuteOptions};
use std::sync::Arc;
use std::time::Duration;
use test_utils::*;

#[tokio::test]
async fn test_interrupt_idle_shell() {
    let (manager, spawner) = create_ready_manager().await;
    let before = spawner.shell().interrupts();

    manager.interrupt_shell_session().await.unwrap();
    assert_eq!(spawner.shell().interrupts(), before + 1);
    assert_eq!(manager.execution_state(), ExecutionState::Done);
}

#[tokio::test]
async fn test_interrupt_releases_running_command() {
    let (manager, spawner) = create_ready_manager().await;
    let manager = Arc::new(manager);

    let running = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .execute_shell_command("sleep 100", ExecuteOptions::default())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(manager.execution_state(), ExecutionState::DetectingCompletion);

    let before = spawner.shell().interrupts();
    manager.interrupt_shell_session().await.unwrap();

    let output = running.await.unwrap().unwrap();
    assert_eq!(output, "^C");
    // One preemptive interrupt plus the one run under the session lock
    assert_eq!(spawner.shell().interrupts(), before + 2);
}

#[tokio::test]
async fn test_preempt_replaces_running_command() {
    let (manager, _spawner) = create_ready_manager().await;
    let manager = Arc::new(manager);

    let running = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .execute_shell_command("sleep 100", ExecuteOptions::default())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;

    let options = ExecuteOptions {
        preempt: true,
        ..ExecuteOptions::default()
    };
    let output = manager
        .execute_shell_command("echo next", options)
        .await
        .unwrap();
    assert_eq!(output, "next");
    assert!(running.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_shell_exit_aborts_pending_command() {
    let (manager, spawner) = create_ready_manager().await;
    let manager = Arc::new(manager);

    let running = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .execute_shell_command("sleep 100", ExecuteOptions::default())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;

    spawner.shell().exit();
    let result = running.await.unwrap();
    assert!(matches!(result, Err(Error::ExecutionAborted { .. })));

    tokio::time::sleep(Duration::from_millis(20)).await;
    let result = manager
        .execute_shell_command("echo gone", ExecuteOptions::default())
        .await;
    assert!(matches!(result, Err(Error::SessionClosed)));
}

#[tokio::test]
async fn test_close_aborts_pending_command() {
    let (manager, spawner) = create_ready_manager().await;
    let manager = Arc::new(manager);

    let running = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .execute_shell_command("sleep 100", ExecuteOptions::default())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;

    manager.close_shell_session().await.unwrap();
    assert!(matches!(
        running.await.unwrap(),
        Err(Error::ExecutionAborted { .. })
    ));
    assert!(spawner.shell().is_killed());
    assert_eq!(manager.state(), SessionState::Closed);
}

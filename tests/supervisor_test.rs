//! Supervisor behavior that is testable without spawning real workers:
//! capacity enforcement, reconciliation, cancellation bookkeeping, and the
//! orphan container sweep.

mod common;

use common::Harness;
use conductor::domain::errors::DomainError;
use conductor::domain::models::{TaskRecord, TaskStatus};
use conductor::domain::ports::container_runtime::{ContainerRuntime, ContainerSpec};
use conductor::infrastructure::supervisor::{CancelOutcome, Supervisor};
use conductor::services::parallel::TASK_LABEL;

fn supervisor(harness: &Harness, cap: usize) -> Supervisor {
    let mut global = harness.global.clone();
    global.max_parallel_tasks = cap;
    Supervisor::new(
        global,
        harness.store.clone(),
        harness.containers.clone(),
        harness.git.clone(),
        harness.source.clone(),
    )
}

async fn save_running_task(harness: &Harness, description: &str) -> TaskRecord {
    harness.new_task(description).await
}

#[tokio::test]
async fn start_background_at_capacity_fails() {
    let harness = Harness::new();
    let supervisor = supervisor(&harness, 2);
    // Two live "workers" (our own pid keeps them alive through sync).
    save_running_task(&harness, "one").await;
    save_running_task(&harness, "two").await;

    let err = supervisor
        .start_background("demo", "three", None)
        .await
        .unwrap_err();
    match err {
        DomainError::CapacityExceeded { running, cap } => {
            assert_eq!(running, 2);
            assert_eq!(cap, 2);
        }
        other => panic!("expected CapacityExceeded, got {other:?}"),
    }
}

#[tokio::test]
async fn dead_workers_do_not_count_against_the_cap() {
    let harness = Harness::new();
    let supervisor = supervisor(&harness, 1);
    let mut dead = TaskRecord::new("demo", "dead");
    dead.pid = Some(i32::MAX - 1);
    harness.store.save(&dead).await.unwrap();

    // Reconciliation marks it interrupted, freeing the slot; the running
    // list the cap is checked against is then empty.
    harness.store.sync().await.unwrap();
    let running = supervisor.list_running(None).await.unwrap();
    assert!(running.is_empty());
    assert_eq!(
        harness.store.load(&dead.id).await.unwrap().status,
        TaskStatus::Interrupted
    );
}

#[tokio::test]
async fn cancel_of_finished_task_is_a_noop() {
    let harness = Harness::new();
    let supervisor = supervisor(&harness, 10);
    let mut task = harness.new_task("done already").await;
    task.finish(TaskStatus::Completed);
    harness.store.save(&task).await.unwrap();

    let outcome = supervisor.cancel(&task.id).await.unwrap();
    assert_eq!(outcome, CancelOutcome::NotRunning(TaskStatus::Completed));
    assert_eq!(
        harness.store.load(&task.id).await.unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn cancel_of_dead_worker_records_cancelled_quickly() {
    let harness = Harness::new();
    let supervisor = supervisor(&harness, 10);
    let mut task = TaskRecord::new("demo", "ghost worker");
    task.pid = Some(i32::MAX - 1);
    harness.store.save(&task).await.unwrap();

    let started = std::time::Instant::now();
    let outcome = supervisor.cancel(&task.id).await.unwrap();
    assert!(matches!(outcome, CancelOutcome::Cancelled { .. }));
    // Cancellation settles well inside the 6-second contract.
    assert!(started.elapsed() < std::time::Duration::from_secs(6));

    let cancelled = harness.store.load(&task.id).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());
}

#[tokio::test]
async fn sweep_removes_only_orphan_containers_and_is_idempotent() {
    let harness = Harness::new();
    let supervisor = supervisor(&harness, 10);

    let live_task = save_running_task(&harness, "live").await;
    let spec_for = |task_id: &str| ContainerSpec {
        image: "ubuntu:24.04".to_string(),
        cpu_limit: 1.0,
        memory_mb: 512,
        mounts: vec![],
        labels: vec![(TASK_LABEL.to_string(), task_id.to_string())],
    };
    let live_container = harness
        .containers
        .create(&spec_for(&live_task.id))
        .await
        .unwrap();
    harness
        .containers
        .create(&spec_for("deadbeef0000"))
        .await
        .unwrap();

    let removed = supervisor.sweep().await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(harness.containers.live(), vec![live_container.id.clone()]);

    // Running the sweep again changes nothing.
    let removed_again = supervisor.sweep().await.unwrap();
    assert_eq!(removed_again, 0);
    assert_eq!(harness.containers.live(), vec![live_container.id]);

    // `cleanup --all` drops the tracked container too.
    let removed_all = supervisor.sweep_containers(true).await.unwrap();
    assert_eq!(removed_all, 1);
    assert!(harness.containers.live().is_empty());
}

#[tokio::test]
async fn dead_workers_leak_no_branches() {
    let harness = Harness::new();
    let supervisor = supervisor(&harness, 10);

    // A worker that was force-killed mid-run: its record still says
    // running with a dead pid, and its branches never got cleaned up.
    let mut dead = TaskRecord::new("demo", "killed mid-run");
    dead.pid = Some(i32::MAX - 1);
    let dead_branch = format!("task-{}", dead.id);
    dead.branch = Some(dead_branch.clone());
    harness.store.save(&dead).await.unwrap();
    harness.git.add_branch(&dead_branch);
    harness.git.add_branch(&format!("task-{}-part1", dead.id));

    // A live worker and a failed task keep their branches.
    let live = harness.new_task("still running").await;
    let live_branch = format!("task-{}", live.id);
    harness.git.add_branch(&live_branch);
    let mut failed = TaskRecord::new("demo", "broke earlier");
    failed.fail(
        conductor::domain::models::FailureCause::AgentError,
        "model error",
    );
    harness.store.save(&failed).await.unwrap();
    let failed_branch = format!("task-{}", failed.id);
    harness.git.add_branch(&failed_branch);

    // Reconcile, then sweep: the dead worker's branches go, nothing else.
    harness.store.sync().await.unwrap();
    let removed = supervisor.sweep().await.unwrap();
    assert_eq!(removed, 2);
    let branches = harness.git.branches();
    assert!(!branches.contains(&dead_branch));
    assert!(!branches.contains(&format!("task-{}-part1", dead.id)));
    assert!(branches.contains(&live_branch));
    assert!(branches.contains(&failed_branch));
    assert!(branches.contains(&"main".to_string()));

    // Sweeping again removes nothing further.
    assert_eq!(supervisor.sweep().await.unwrap(), 0);
}

#[tokio::test]
async fn sweep_never_touches_protected_branches() {
    let harness = Harness::new();
    let supervisor = supervisor(&harness, 10);
    // A branch inside the task- namespace that the project protects, with
    // no owning task record at all.
    harness.git.add_branch("task-aaaaaaaaaaaa");
    let mut project = harness.project.clone();
    project
        .protected_branches
        .push("task-aaaaaaaaaaaa".to_string());
    std::fs::write(
        harness
            .global
            .config_dir
            .join(format!("{}.yaml", project.name)),
        serde_yaml::to_string(&project).unwrap(),
    )
    .unwrap();

    supervisor.sweep().await.unwrap();
    assert!(harness
        .git
        .branches()
        .contains(&"task-aaaaaaaaaaaa".to_string()));
}

#[tokio::test]
async fn restart_source_fields_are_copied_not_shared() {
    let harness = Harness::new();
    let mut original = harness.new_task("original work").await;
    original.finish(TaskStatus::Failed);
    harness.store.save(&original).await.unwrap();

    // A restart builds a fresh record pointing back at the original.
    let mut fresh = TaskRecord::new(original.project.clone(), original.description.clone());
    fresh.restarted_from = Some(original.id.clone());
    harness.store.save(&fresh).await.unwrap();

    let loaded = harness.store.load(&fresh.id).await.unwrap();
    assert_ne!(loaded.id, original.id);
    assert_eq!(loaded.restarted_from.as_deref(), Some(original.id.as_str()));
    assert_eq!(loaded.status, TaskStatus::Running);
    assert!(loaded.completed_agents.is_empty());
}

#[tokio::test]
async fn list_running_filters_by_project() {
    let harness = Harness::new();
    let supervisor = supervisor(&harness, 10);
    let task = save_running_task(&harness, "shared view").await;
    let seen: Vec<String> = supervisor
        .list_running(Some("demo"))
        .await
        .unwrap()
        .iter()
        .map(|t| t.id.clone())
        .collect();
    assert_eq!(seen, vec![task.id]);
    let other = supervisor.list_running(Some("elsewhere")).await.unwrap();
    assert!(other.is_empty());
}

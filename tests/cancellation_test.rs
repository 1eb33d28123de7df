//! Cooperative cancellation: a set flag stops the run at the next
//! suspension point and cleanup still releases every resource.

mod common;

use common::{plan_json, turn, Harness};
use conductor::domain::models::{task_branch, TaskStatus};
use conductor::services::CancelFlag;

#[tokio::test]
async fn cancel_before_start_runs_no_agents() {
    let harness = Harness::new();
    let cancel = CancelFlag::new();
    cancel.set();

    let task = harness.new_task("never happens").await;
    let finished = harness
        .orchestrator()
        .run(&harness.project, task, cancel)
        .await
        .unwrap();

    assert_eq!(finished.status, TaskStatus::Cancelled);
    assert!(finished.completed_at.is_some());
    assert_eq!(harness.model.call_count(), 0);
    assert_eq!(harness.containers.created_count(), 0);
    assert!(harness.git.pushed_branches().is_empty());
}

#[tokio::test]
async fn cancel_mid_run_finishes_inflight_turn_then_stops() {
    let harness = Harness::new();
    let cancel = CancelFlag::new();

    harness.model.push_text(plan_json(&["coder", "reviewer"], 2));
    harness.model.push_text(turn("patched", "reviewer", "verify"));
    // The reviewer keeps handing off; without cancellation the loop would
    // continue to the tester.
    harness.model.push_text(turn("checked", "tester", "add tests"));

    let task = harness.new_task("interrupted fix").await;
    let branch = task_branch(&task.id);

    // Flip the flag as soon as the coder's call has been dispatched.
    // In-flight turns are allowed to finish; no new turn may start.
    let model = harness.model.clone();
    let watcher_flag = cancel.clone();
    let watcher = tokio::spawn(async move {
        loop {
            // Call 1 is the planner, call 2 the coder.
            if model.call_count() >= 2 {
                watcher_flag.set();
                break;
            }
            tokio::task::yield_now().await;
        }
    });

    let finished = harness
        .orchestrator()
        .run(&harness.project, task, cancel)
        .await
        .unwrap();
    watcher.abort();

    assert_eq!(finished.status, TaskStatus::Cancelled);
    // At most the planner, the coder, and one already-dispatched reviewer
    // turn ran; the tester never did.
    assert!(harness.model.call_count() <= 3);
    // Cancellation cleanup deletes the unmerged task branch and the
    // container.
    assert!(harness.git.deleted_branches().contains(&branch));
    assert!(harness.containers.live().is_empty());
}

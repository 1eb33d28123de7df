//! The persisted state layout is a contract: one directory per task id
//! holding `state.json` and `subtasks/<task_id>-part<k>.json`.

mod common;

use common::Harness;
use conductor::domain::models::{subtask_id, SubtaskRecord, TaskStatus};

#[tokio::test]
async fn task_documents_land_at_contractual_paths() {
    let harness = Harness::new();
    let task = harness.new_task("layout check").await;

    let task_dir = harness.global.tasks_dir.join(&task.id);
    assert!(task_dir.join("state.json").is_file());

    let subtask = SubtaskRecord {
        id: subtask_id(&task.id, 1),
        parent: task.id.clone(),
        part_index: 1,
        description: "part one".to_string(),
        agent: "coder".to_string(),
        assigned_files: vec![],
        branch: format!("task-{}-part1", task.id),
        container_id: None,
        status: TaskStatus::Running,
        result_summary: None,
        failure_cause: None,
        started_at: chrono::Utc::now(),
        completed_at: None,
    };
    harness.store.save_subtask(&subtask).await.unwrap();
    assert!(task_dir
        .join("subtasks")
        .join(format!("{}-part1.json", task.id))
        .is_file());
}

#[tokio::test]
async fn state_document_fields_use_contractual_names() {
    let harness = Harness::new();
    let task = harness.new_task("field names").await;
    let raw = std::fs::read_to_string(
        harness
            .global
            .tasks_dir
            .join(&task.id)
            .join("state.json"),
    )
    .unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["id"], serde_json::json!(task.id));
    assert_eq!(value["status"], serde_json::json!("running"));
    assert!(value["started_at"].is_string());
    assert!(value["pid"].is_number());
    // Unset optional fields are omitted, not null.
    assert!(value.get("completed_at").is_none());
    assert!(value.get("restarted_from").is_none());
}

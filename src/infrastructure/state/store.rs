//! Task state store: one JSON document per task under the state directory.
//!
//! Writes go through a per-task advisory lock and an atomic temp+rename so
//! readers never see a torn document; readers still retry once to tolerate
//! filesystems without atomic rename. `sync` is the only code path allowed
//! to move a task out of `running` from outside the owning worker.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{SubtaskRecord, TaskRecord, TaskStatus};
use crate::infrastructure::state::lock::StateLock;
use crate::infrastructure::supervisor::pid_alive;

/// Filesystem-backed task store.
#[derive(Debug, Clone)]
pub struct TaskStateStore {
    tasks_dir: PathBuf,
}

impl TaskStateStore {
    pub fn new(tasks_dir: PathBuf) -> Self {
        Self { tasks_dir }
    }

    pub fn tasks_dir(&self) -> &Path {
        &self.tasks_dir
    }

    fn task_dir(&self, id: &str) -> PathBuf {
        self.tasks_dir.join(id)
    }

    fn state_path(&self, id: &str) -> PathBuf {
        self.task_dir(id).join("state.json")
    }

    fn lock_path(&self, id: &str) -> PathBuf {
        self.task_dir(id).join(".lock")
    }

    /// Persist `task`, creating its directory on first save.
    pub async fn save(&self, task: &TaskRecord) -> DomainResult<()> {
        let dir = self.task_dir(&task.id);
        tokio::fs::create_dir_all(&dir).await?;
        let _lock = StateLock::acquire(&self.lock_path(&task.id)).await?;
        self.write_document(&self.state_path(&task.id), task).await
    }

    /// Load one task by exact id.
    pub async fn load(&self, id: &str) -> DomainResult<TaskRecord> {
        let path = self.state_path(id);
        match self.read_document::<TaskRecord>(&path).await {
            Ok(task) => Ok(task),
            Err(DomainError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(DomainError::TaskNotFound(id.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    /// Read-modify-write under the task's lock.
    pub async fn update<F>(&self, id: &str, mutate: F) -> DomainResult<TaskRecord>
    where
        F: FnOnce(&mut TaskRecord),
    {
        let _lock = StateLock::acquire(&self.lock_path(id)).await?;
        let path = self.state_path(id);
        let mut task: TaskRecord = self.read_document(&path).await.map_err(|err| match err {
            DomainError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                DomainError::TaskNotFound(id.to_string())
            }
            other => other,
        })?;
        mutate(&mut task);
        self.write_document(&path, &task).await?;
        Ok(task)
    }

    /// All task records, unordered directory scan sorted by start time.
    pub async fn list(&self) -> DomainResult<Vec<TaskRecord>> {
        let mut tasks = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.tasks_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(tasks),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            match self.load(&id).await {
                Ok(task) => tasks.push(task),
                Err(err) => warn!(task_id = %id, error = %err, "skipping unreadable task"),
            }
        }
        tasks.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(tasks)
    }

    pub async fn list_by_project(&self, project: &str) -> DomainResult<Vec<TaskRecord>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|t| t.project == project)
            .collect())
    }

    /// Resolve a (possibly partial) task id prefix to the full id.
    pub async fn resolve_id(&self, prefix: &str) -> DomainResult<String> {
        if self.state_path(prefix).exists() {
            return Ok(prefix.to_string());
        }
        let mut candidates: Vec<String> = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.tasks_dir).await {
            Ok(entries) => entries,
            Err(_) => return Err(DomainError::TaskNotFound(prefix.to_string())),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(prefix) {
                candidates.push(name);
            }
        }
        match candidates.len() {
            0 => Err(DomainError::TaskNotFound(prefix.to_string())),
            1 => Ok(candidates.remove(0)),
            _ => {
                candidates.sort();
                Err(DomainError::AmbiguousTaskId {
                    prefix: prefix.to_string(),
                    candidates,
                })
            }
        }
    }

    /// Persist a subtask document under its parent's `subtasks/` directory.
    pub async fn save_subtask(&self, subtask: &SubtaskRecord) -> DomainResult<()> {
        let dir = self.task_dir(&subtask.parent).join("subtasks");
        tokio::fs::create_dir_all(&dir).await?;
        self.write_document(&dir.join(format!("{}.json", subtask.id)), subtask)
            .await
    }

    pub async fn list_subtasks(&self, parent: &str) -> DomainResult<Vec<SubtaskRecord>> {
        let dir = self.task_dir(parent).join("subtasks");
        let mut subtasks: Vec<SubtaskRecord> = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(subtasks),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                subtasks.push(self.read_document(&entry.path()).await?);
            }
        }
        subtasks.sort_by_key(|s| s.part_index);
        Ok(subtasks)
    }

    /// Reconcile persisted state against live processes: every `running`
    /// task whose pid is missing or dead transitions to `interrupted`.
    /// Returns the ids that were transitioned. Idempotent.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> DomainResult<Vec<String>> {
        let mut interrupted = Vec::new();
        for task in self.list().await? {
            if task.status != TaskStatus::Running {
                continue;
            }
            let alive = task.pid.is_some_and(pid_alive);
            if !alive {
                info!(task_id = %task.id, pid = ?task.pid, "worker dead, marking interrupted");
                self.update(&task.id, |t| {
                    // Only the sync path may take running → interrupted.
                    if t.status == TaskStatus::Running {
                        t.finish(TaskStatus::Interrupted);
                    }
                })
                .await?;
                interrupted.push(task.id);
            }
        }
        Ok(interrupted)
    }

    async fn write_document<T: serde::Serialize>(
        &self,
        path: &Path,
        value: &T,
    ) -> DomainResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_document<T: serde::de::DeserializeOwned>(&self, path: &Path) -> DomainResult<T> {
        let bytes = tokio::fs::read(path).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(value),
            Err(_) => {
                // Tolerate one transient partial write.
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                let bytes = tokio::fs::read(path).await?;
                serde_json::from_slice(&bytes).map_err(Into::into)
            }
        }
    }
}

//! FileResultBackend - one JSON file per finished task.
//!
//! Layout: `{dir}/{sanitized task id}.json`. Writes go to a temporary file
//! first and are renamed into place, so a reader never sees a half-written
//! snapshot.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::domain::{TaskId, TaskRun};
use crate::error::Result;
use crate::ports::ResultBackend;

pub struct FileResultBackend {
    dir: PathBuf,
}

impl FileResultBackend {
    /// Create the backend, creating `dir` if it does not exist.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &TaskId) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(id.as_str())))
    }
}

/// Keep ids usable as file names on every platform.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl ResultBackend for FileResultBackend {
    async fn store(&self, run: &TaskRun) -> Result<()> {
        let path = self.path_for(&run.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(run)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(task_id = %run.id, path = %path.display(), "stored task result");
        Ok(())
    }

    async fn load(&self, id: &TaskId) -> Result<Option<TaskRun>> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Status;
    use serde_json::json;

    fn run(id: &str) -> TaskRun {
        TaskRun {
            id: TaskId::from(id),
            pool: "p".into(),
            status: Status::Success,
            result: Some(json!({"v": 1})),
            worker: None,
            requeues: 0,
            started_at: None,
            finished_at: None,
            duration_ms: None,
        }
    }

    #[tokio::test]
    async fn stores_and_loads_runs() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileResultBackend::open(dir.path().join("results")).await.unwrap();

        backend.store(&run("task-1")).await.unwrap();
        let loaded = backend.load(&TaskId::from("task-1")).await.unwrap();
        assert_eq!(loaded, Some(run("task-1")));
    }

    #[tokio::test]
    async fn missing_run_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileResultBackend::open(dir.path()).await.unwrap();
        assert_eq!(backend.load(&TaskId::from("nope")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn ids_with_separators_stay_inside_dir() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileResultBackend::open(dir.path()).await.unwrap();

        backend.store(&run("../escape/attempt")).await.unwrap();
        assert!(dir.path().join("___escape_attempt.json").exists());
        assert!(backend.load(&TaskId::from("../escape/attempt")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileResultBackend::open(dir.path()).await.unwrap();

        backend.store(&run("t")).await.unwrap();
        let mut second = run("t");
        second.status = Status::Failed;
        backend.store(&second).await.unwrap();

        let loaded = backend.load(&TaskId::from("t")).await.unwrap().unwrap();
        assert_eq!(loaded.status, Status::Failed);
    }
}

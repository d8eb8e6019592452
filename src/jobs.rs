use std::{collections::HashMap, path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub video_path: Option<PathBuf>,
    pub error: Option<String>,
}

/// In-memory registry of render jobs, shared between handlers and the
/// background render tasks. Nothing survives a restart.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new job in the `processing` state and returns its id.
    pub async fn create(&self) -> String {
        let mut jobs = self.jobs.write().await;
        let mut id = generate_job_id();
        while jobs.contains_key(&id) {
            id = generate_job_id();
        }
        jobs.insert(
            id.clone(),
            Job {
                id: id.clone(),
                status: JobStatus::Processing,
                video_path: None,
                error: None,
            },
        );
        id
    }

    pub async fn get(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    pub async fn complete(&self, id: &str, video_path: PathBuf) {
        if let Some(job) = self.jobs.write().await.get_mut(id) {
            job.status = JobStatus::Done;
            job.video_path = Some(video_path);
            job.error = None;
        }
    }

    pub async fn fail(&self, id: &str, error: impl Into<String>) {
        if let Some(job) = self.jobs.write().await.get_mut(id) {
            job.status = JobStatus::Failed;
            job.error = Some(error.into());
        }
    }

    pub async fn remove(&self, id: &str) -> Option<Job> {
        self.jobs.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// `jid_` followed by 8 lowercase hex characters.
pub fn generate_job_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("jid_{}", &hex[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_have_expected_shape() {
        let id = generate_job_id();
        assert_eq!(id.len(), 12);
        assert!(id.starts_with("jid_"));
        assert!(id[4..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(serde_json::to_string(&JobStatus::Done).unwrap(), "\"done\"");
        assert_eq!(
            serde_json::to_string(&JobStatus::Failed).unwrap(),
            "\"failed\""
        );
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let store = JobStore::new();
        assert!(store.is_empty().await);

        let done = store.create().await;
        let failed = store.create().await;
        assert_ne!(done, failed);
        assert_eq!(store.len().await, 2);
        assert_eq!(
            store.get(&done).await.unwrap().status,
            JobStatus::Processing
        );

        store.complete(&done, PathBuf::from("/tmp/x.mp4")).await;
        store.fail(&failed, "renderer exploded").await;

        let done = store.get(&done).await.unwrap();
        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.video_path, Some(PathBuf::from("/tmp/x.mp4")));

        let failed = store.get(&failed).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("renderer exploded"));

        assert!(store.get("jid_unknown").await.is_none());

        assert_eq!(store.remove(&failed.id).await.map(|job| job.status), Some(JobStatus::Failed));
        assert!(store.remove(&failed.id).await.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn updates_to_unknown_jobs_are_ignored() {
        let store = JobStore::new();
        store.complete("jid_missing", PathBuf::from("a.mp4")).await;
        store.fail("jid_missing", "nope").await;
        assert!(store.is_empty().await);
    }
}

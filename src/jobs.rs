//! Background solve jobs.
//!
//! A job moves `pending → running → completed | failed`. The lifecycle lives
//! behind [`JobStore`] so a deployment can persist it; the engine itself holds
//! no job state.

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use crate::error::EngineError;
use crate::solver::Solution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<JobFailure>,
    pub result: Option<Solution>,
}

impl JobRecord {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            error: None,
            result: None,
        }
    }

    /// Moves the record forward. Terminal records and backward moves are rejected.
    fn advance(&mut self, status: JobStatus) -> Result<(), EngineError> {
        let allowed = matches!(
            (self.status, status),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        );
        if !allowed {
            return Err(EngineError::Data(format!(
                "job {} cannot move from {:?} to {:?}",
                self.id, self.status, status
            )));
        }
        self.status = status;
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for JobRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage for job records, keyed by id.
pub trait JobStore: Send + Sync {
    fn insert(&self, record: JobRecord);
    fn get(&self, id: Uuid) -> Option<JobRecord>;
    fn update(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut JobRecord) -> Result<(), EngineError>,
    ) -> Result<JobRecord, EngineError>;

    fn create(&self) -> JobRecord {
        let record = JobRecord::new();
        self.insert(record.clone());
        record
    }

    fn mark_running(&self, id: Uuid) -> Result<JobRecord, EngineError> {
        self.update(id, &mut |r: &mut JobRecord| r.advance(JobStatus::Running))
    }

    /// Stores the outcome of a solve and closes the job.
    fn finish(
        &self,
        id: Uuid,
        outcome: Result<Solution, EngineError>,
    ) -> Result<JobRecord, EngineError> {
        let mut outcome = Some(outcome);
        self.update(id, &mut |r: &mut JobRecord| match outcome.take() {
            Some(Ok(solution)) => {
                r.advance(JobStatus::Completed)?;
                info!("Job {} completed", r.id);
                r.result = Some(solution);
                Ok(())
            }
            Some(Err(e)) => {
                r.advance(JobStatus::Failed)?;
                error!("Job {} failed: {e}", r.id);
                r.error = Some(JobFailure {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
                Ok(())
            }
            None => Ok(()),
        })
    }
}

/// Finished jobs a [`MemoryJobStore`] keeps unless told otherwise.
pub const DEFAULT_RETENTION: usize = 256;

#[derive(Debug, Default)]
struct Records {
    by_id: HashMap<Uuid, JobRecord>,
    /// Terminal jobs, oldest first.
    finished: VecDeque<Uuid>,
}

/// In-process store for single-node deployments and tests.
///
/// Pending and running jobs are always kept. Once more than `retention`
/// jobs have finished, the ones that finished first are dropped.
#[derive(Debug)]
pub struct MemoryJobStore {
    records: RwLock<Records>,
    retention: usize,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            records: RwLock::new(Records::default()),
            retention: retention.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().by_id.is_empty()
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, record: JobRecord) {
        self.records.write().by_id.insert(record.id, record);
    }

    fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.records.read().by_id.get(&id).cloned()
    }

    fn update(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut JobRecord) -> Result<(), EngineError>,
    ) -> Result<JobRecord, EngineError> {
        let mut records = self.records.write();
        let record = records
            .by_id
            .get_mut(&id)
            .ok_or_else(|| EngineError::Data(format!("unknown job {id}")))?;
        let was_terminal = record.status.is_terminal();
        apply(record)?;
        let updated = record.clone();

        if !was_terminal && updated.status.is_terminal() {
            records.finished.push_back(id);
            while records.finished.len() > self.retention {
                if let Some(oldest) = records.finished.pop_front() {
                    records.by_id.remove(&oldest);
                    debug!("Evicted finished job {oldest}");
                }
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_runs_forward() {
        let store = MemoryJobStore::new();
        let job = store.create();
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::Pending);

        store.mark_running(job.id).unwrap();
        let done = store
            .finish(job.id, Err(EngineError::Solver("boom".into())))
            .unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.status.is_terminal());
        let failure = done.error.unwrap();
        assert_eq!(failure.kind, "solver");
        assert!(failure.message.contains("boom"));
    }

    #[test]
    fn terminal_jobs_stay_terminal() {
        let store = MemoryJobStore::new();
        let job = store.create();
        store.mark_running(job.id).unwrap();
        store
            .finish(job.id, Err(EngineError::Config("bad".into())))
            .unwrap();
        assert!(store.mark_running(job.id).is_err());
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn oldest_finished_jobs_are_evicted() {
        let store = MemoryJobStore::with_retention(2);
        let waiting = store.create();
        let done: Vec<Uuid> = (0..3)
            .map(|_| {
                let job = store.create();
                store.mark_running(job.id).unwrap();
                store
                    .finish(job.id, Err(EngineError::Solver("boom".into())))
                    .unwrap();
                job.id
            })
            .collect();

        assert_eq!(store.len(), 3);
        assert!(store.get(done[0]).is_none());
        assert!(store.get(done[1]).is_some());
        assert!(store.get(done[2]).is_some());
        assert_eq!(store.get(waiting.id).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn unknown_job_is_reported() {
        let store = MemoryJobStore::new();
        assert!(store.get(Uuid::new_v4()).is_none());
        assert!(store.mark_running(Uuid::new_v4()).is_err());
    }
}

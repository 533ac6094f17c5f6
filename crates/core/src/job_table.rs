//! Job Table (C5, §4.5): the in-memory store of active jobs, keyed by
//! artifact basename, owned exclusively by the Build Queuer.

use std::collections::HashMap;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::warn;

use crate::artifact::Artifact;
use crate::ids::{InitiatorId, JobId};
use crate::job::Job;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobTableError {
    #[error("job already exists for basename {0:?}")]
    AlreadyExists(String),
}

/// Primary storage is keyed by [`JobId`] so `JobStarted`/`JobFinished`/
/// `JobFailed` (which carry a job id, not a basename) are O(1); a secondary
/// `basename -> JobId` index enforces invariant 1 of §3 ("at most one job
/// per basename").
///
/// `jobs` is an `IndexMap` so `next_queued` can walk jobs in creation order
/// without a separate FIFO — matches the original's behavior of iterating
/// (and popping from) one underlying list (§4.5, §9 open question).
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: IndexMap<JobId, Job>,
    by_basename: HashMap<String, JobId>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, basename: &str) -> Option<&Job> {
        self.by_basename.get(basename).and_then(|id| self.jobs.get(id))
    }

    pub fn get_by_id(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn get_by_id_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    pub fn exists(&self, basename: &str) -> bool {
        self.by_basename.contains_key(basename)
    }

    /// Precondition: `!exists(artifact.basename)`. Returns
    /// [`JobTableError::AlreadyExists`] rather than panicking, since the
    /// Queuer checks `exists` first in the normal path but this still needs
    /// to be a recoverable error, not a crash, if that invariant is ever
    /// violated by a caller bug.
    #[allow(clippy::expect_used)]
    pub fn create(
        &mut self,
        id: JobId,
        artifact: Artifact,
        initiator: InitiatorId,
    ) -> Result<&Job, JobTableError> {
        if self.by_basename.contains_key(&artifact.basename) {
            return Err(JobTableError::AlreadyExists(artifact.basename));
        }
        let basename = artifact.basename.clone();
        let job = Job::new(id.clone(), artifact, initiator);
        self.by_basename.insert(basename, id.clone());
        self.jobs.insert(id.clone(), job);
        Ok(self.jobs.get(&id).expect("just inserted"))
    }

    /// Idempotent on a missing key: logs a warning rather than failing
    /// (§4.5 `remove`, §7 "Remove-missing-job").
    pub fn remove(&mut self, id: &JobId) -> Option<Job> {
        match self.jobs.shift_remove(id) {
            Some(job) => {
                self.by_basename.remove(&job.artifact.basename);
                Some(job)
            }
            None => {
                warn!(job_id = %id, "attempted to remove a job that is not in the table");
                None
            }
        }
    }

    /// Atomic batch removal (§4.5 `remove_many`): every job matching
    /// `predicate` is removed and returned; the table reflects either all
    /// removals or none visible mid-call, since this runs on the single
    /// event-loop thread with no handler interleaving.
    pub fn remove_many(&mut self, predicate: impl Fn(&Job) -> bool) -> Vec<Job> {
        let matching: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|(_, job)| predicate(job))
            .map(|(id, _)| id.clone())
            .collect();
        matching
            .into_iter()
            .filter_map(|id| self.remove(&id))
            .collect()
    }

    /// Returns the most recently queued job (`assigned_worker = none`), i.e.
    /// the last-inserted-and-still-unassigned entry. This is the LIFO choice
    /// documented in SPEC_FULL.md's Open Question resolutions, matching the
    /// original's `list.pop()`.
    pub fn next_queued(&self) -> Option<&Job> {
        self.jobs.values().rev().find(|job| job.is_queued())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }
}

#[path = "job_table_tests.rs"]
#[cfg(test)]
mod tests;

//! Build Queuer (C6, §4.6): the singleton state machine that owns the Job
//! Table and the queue of idle workers, and matches jobs to workers.

use std::collections::{HashMap, VecDeque};

use distbuild_core::{Artifact, IdentifierGenerator, InitiatorId, Job, JobId, JobTable, WorkerId, WorkerName};
use tracing::{debug, info};

use crate::event::{Envelope, Event};

/// A record parked in the idle-workers FIFO: `{session, last_job}` (§3
/// "Available-worker entry").
#[derive(Debug, Clone)]
struct AvailableWorker {
    session: WorkerId,
    #[allow(dead_code)] // retained for parity with §3's documented shape; not read back
    last_job: Option<JobId>,
}

/// Owns the Job Table and the available-workers FIFO exclusively (§5
/// "Shared-resource policy"). Worker Sessions never touch either directly;
/// they signal intent through events the coordinator routes here.
pub struct BuildQueuer {
    jobs: JobTable,
    idle_workers: VecDeque<AvailableWorker>,
    job_ids: IdentifierGenerator,
    /// Worker display names, keyed by session id, refreshed on every
    /// `NeedJob` (§4.2 supplement: the original derives this once at
    /// connect time; we just need it available for `StepAlreadyStarted`
    /// (§4.6.1) and dispatch (§4.6.4)).
    worker_names: HashMap<WorkerId, WorkerName>,
}

impl BuildQueuer {
    pub fn new() -> Self {
        Self {
            jobs: JobTable::new(),
            idle_workers: VecDeque::new(),
            job_ids: IdentifierGenerator::new("job"),
            worker_names: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    fn jobs_with_initiator(&self, initiator_id: &InitiatorId) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|job| job.initiators.contains(initiator_id))
            .map(|job| job.id.clone())
            .collect()
    }

    fn worker_name_of(&self, job: &Job) -> WorkerName {
        job.assigned_worker
            .as_ref()
            .and_then(|w| self.worker_names.get(w))
            .cloned()
            .unwrap_or_else(|| WorkerName::new("unknown"))
    }

    /// §4.6.1.
    #[allow(clippy::expect_used)]
    pub fn handle_build_request(&mut self, artifact: Artifact, initiator_id: InitiatorId) -> Vec<Envelope> {
        let basename = artifact.basename.clone();
        if let Some(existing_id) = self.jobs.get(&basename).map(|j| j.id.clone()) {
            let job = self.jobs.get_by_id_mut(&existing_id).expect("looked up by basename");
            job.initiators.insert(initiator_id.clone());
            let cache_key = job.artifact.cache_key.clone();
            let running = job.running;
            debug!(job_id = %existing_id, initiator = %initiator_id, "attached initiator to existing job");

            if running {
                let worker_name = self.worker_name_of(self.jobs.get_by_id(&existing_id).expect("exists"));
                vec![Envelope::external(Event::StepAlreadyStarted {
                    initiator_id,
                    cache_key,
                    worker_name,
                })]
            } else {
                vec![Envelope::external(Event::Waiting { initiator_id, cache_key })]
            }
        } else {
            let id = JobId::new(self.job_ids.next_id());
            let cache_key = artifact.cache_key.clone();
            self.jobs
                .create(id.clone(), artifact, initiator_id.clone())
                .expect("basename existence checked above");
            info!(job_id = %id, basename = %basename, "created job");

            if let Some(worker) = self.idle_workers.pop_front() {
                self.dispatch(worker, id)
            } else {
                vec![Envelope::external(Event::Waiting { initiator_id, cache_key })]
            }
        }
    }

    /// §4.6.2. Never emits — the Worker Session owns the teardown path for
    /// running/failed jobs via its own `BuildCancel` subscription.
    #[allow(clippy::expect_used)]
    pub fn handle_cancel_pending(&mut self, initiator_id: InitiatorId) -> Vec<Envelope> {
        let affected = self.jobs_with_initiator(&initiator_id);
        let mut to_remove = Vec::new();

        for job_id in affected {
            let job = self.jobs.get_by_id_mut(&job_id).expect("collected from table above");
            if job.initiators.len() > 1 {
                job.initiators.shift_remove(&initiator_id);
                debug!(job_id = %job_id, initiator = %initiator_id, "removed cancelling initiator");
            } else if job.running || job.failed {
                debug!(
                    job_id = %job_id,
                    "sole initiator cancelled a running/failed job; leaving to worker session teardown"
                );
            } else {
                to_remove.push(job_id);
            }
        }

        for job_id in to_remove {
            debug!(job_id = %job_id, "removing queued job with no remaining initiators");
            self.jobs.remove(&job_id);
        }

        Vec::new()
    }

    /// §4.6.3.
    pub fn handle_need_job(
        &mut self,
        session: WorkerId,
        name: WorkerName,
        last_job: Option<JobId>,
    ) -> Vec<Envelope> {
        self.worker_names.insert(session.clone(), name);

        if let Some(job_id) = last_job {
            self.jobs.remove(&job_id);
        }

        self.idle_workers.push_back(AvailableWorker { session, last_job: None });

        match self.jobs.next_queued().map(|job| job.id.clone()) {
            Some(next) => match self.idle_workers.pop_front() {
                Some(worker) => self.dispatch(worker, next),
                None => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    /// §4.6.4.
    fn dispatch(&mut self, worker: AvailableWorker, job_id: JobId) -> Vec<Envelope> {
        if let Some(job) = self.jobs.get_by_id_mut(&job_id) {
            job.assigned_worker = Some(worker.session.clone());
        }
        info!(job_id = %job_id, worker = %worker.session, "dispatched job to worker");
        vec![Envelope::to_worker(worker.session, Event::HaveAJob { job: job_id })]
    }

    pub fn handle_job_started(&mut self, job: JobId) -> Vec<Envelope> {
        match self.jobs.get_by_id_mut(&job) {
            Some(j) => j.running = true,
            None => tracing::warn!(job_id = %job, "JobStarted for unknown job"),
        }
        Vec::new()
    }

    pub fn handle_job_finished(&mut self, job: JobId) -> Vec<Envelope> {
        match self.jobs.get_by_id_mut(&job) {
            Some(j) => j.running = false,
            None => tracing::warn!(job_id = %job, "JobFinished for unknown job"),
        }
        Vec::new()
    }

    pub fn handle_job_failed(&mut self, job: JobId) -> Vec<Envelope> {
        match self.jobs.get_by_id_mut(&job) {
            Some(j) => j.failed = true,
            None => tracing::warn!(job_id = %job, "JobFailed for unknown job"),
        }
        Vec::new()
    }

    /// Unconditional half of §4.7.3's `BuildCancel` handling: regardless of
    /// whether the owning Worker Session decided to actually cancel the
    /// build, the cancelling initiator is always dropped from the job's
    /// initiator set. Called by the coordinator after consulting the
    /// session, not by the session itself, since only the Queuer mutates the
    /// Job Table.
    pub fn remove_initiator(&mut self, job: &JobId, initiator_id: &InitiatorId) {
        if let Some(j) = self.jobs.get_by_id_mut(job) {
            j.initiators.shift_remove(initiator_id);
        }
    }

    /// Read access for the coordinator to build a [`crate::session::JobView`]
    /// before dispatching an event to a Worker Session.
    pub fn get_by_id(&self, id: &JobId) -> Option<&distbuild_core::Job> {
        self.jobs.get_by_id(id)
    }
}

impl Default for BuildQueuer {
    fn default() -> Self {
        Self::new()
    }
}

#[path = "queuer_tests.rs"]
#[cfg(test)]
mod tests;

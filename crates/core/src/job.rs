//! The Job record (§3) — the coordinator's deduplicated representation of
//! "someone wants artifact X built".

use indexmap::IndexSet;

use crate::artifact::Artifact;
use crate::ids::{InitiatorId, JobId, WorkerId};

/// A build job. Owned exclusively by the Job Table (§5 "Shared-resource
/// policy"); Worker Sessions hold only the [`JobId`] key, never a copy of
/// this struct, so there is exactly one writer of job state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub artifact: Artifact,
    /// Insertion-ordered, duplicate-free. `IndexSet` rather than `HashSet`
    /// so iteration order (and therefore the `ids` snapshot handed to
    /// `BuildOutput`) is deterministic and matches arrival order.
    pub initiators: IndexSet<InitiatorId>,
    pub assigned_worker: Option<WorkerId>,
    pub running: bool,
    pub failed: bool,
}

impl Job {
    /// Invariant 2 of §3: a freshly created job always has exactly one
    /// initiator.
    pub fn new(id: JobId, artifact: Artifact, initiator: InitiatorId) -> Self {
        let mut initiators = IndexSet::new();
        initiators.insert(initiator);
        Self {
            id,
            artifact,
            initiators,
            assigned_worker: None,
            running: false,
            failed: false,
        }
    }

    pub fn is_queued(&self) -> bool {
        self.assigned_worker.is_none()
    }

    /// Invariant 3 of §3: `assigned_worker = none` implies `running = false`.
    /// Debug-only check; production code never calls this directly on the
    /// mutation path because `JobTable::create` and dispatch are the only
    /// writers and both uphold it by construction.
    #[cfg(debug_assertions)]
    pub fn check_invariants(&self) {
        debug_assert!(
            self.assigned_worker.is_some() || !self.running,
            "job {} is running with no assigned worker",
            self.id
        );
        debug_assert!(
            !self.initiators.is_empty() || self.running || self.failed,
            "job {} has no initiators but is neither running nor failed",
            self.id
        );
    }
}

#[path = "job_tests.rs"]
#[cfg(test)]
mod tests;

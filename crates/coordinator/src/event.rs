//! The event vocabulary (§6) flowing through the Event Loop (C1), plus the
//! envelope/recipient types the loop uses for delivery (§9 "dynamic
//! dispatch on event types", "send-to-class publish").

use distbuild_core::{Artifact, CacheKey, InitiatorId, JobId, WorkerId, WorkerName};
use distbuild_wire::WorkerMessage;

use crate::helper::{HelperRequest, HelperResponse};

/// Every event kind the loop can carry. Grouped to mirror spec.md §6's
/// inbound/outbound split. §4.7's internal bare signals (`BuildFinished`,
/// `BuildFailed`, `BuildCancelled`, `Cached` self-raised inside a Worker
/// Session) are not modeled as loop events: since session handlers run their
/// self-transition synchronously in the same call, the envelopes those
/// signals would have produced (a follow-up `NeedJob`, mainly) are computed
/// directly rather than round-tripped through the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // -- inbound, from initiators / external collaborators --
    BuildRequest { artifact: Artifact, initiator_id: InitiatorId },
    CancelPending { initiator_id: InitiatorId },
    /// From the build-controller subsystem (§6); broadcast to every Worker
    /// Session in `building` state, each filters by whether its job's
    /// initiator set contains `initiator_id` (§4.7.3).
    BuildCancel { initiator_id: InitiatorId },

    // -- framer-sourced, delivered to one Worker Session --
    NewMessage { msg: WorkerMessage },
    Eof,

    // -- Worker Session -> Build Queuer --
    NeedJob { session: WorkerId, name: WorkerName, last_job: Option<JobId> },
    JobStarted { job: JobId },
    JobFinished { job: JobId },
    JobFailed { job: JobId },

    // -- Build Queuer -> Worker Session --
    HaveAJob { job: JobId },

    // -- Helper Router --
    HelperRequest { msg: HelperRequest },
    HelperResult { msg: HelperResponse },

    // -- outbound, observable by external collaborators (§6) --
    Waiting { initiator_id: InitiatorId, cache_key: CacheKey },
    StepStarted { initiators: Vec<InitiatorId>, cache_key: CacheKey, worker_name: WorkerName },
    StepAlreadyStarted { initiator_id: InitiatorId, cache_key: CacheKey, worker_name: WorkerName },
    BuildOutput { ids: Vec<InitiatorId>, cache_key: CacheKey, stdout: String, stderr: String },
    Caching { initiators: Vec<InitiatorId>, cache_key: CacheKey },
    BuildFinished { message: String, cache_key: CacheKey },
    BuildFailed { message: String, cache_key: CacheKey },
    Reconnect { worker: WorkerId },
}

/// Broadcast classes (§9 "send-to-class publish"): events delivered to every
/// subscriber of a source-kind rather than one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// `BuildCancel`, delivered to every Worker Session in `building` state.
    BuildCancel,
    /// `HelperResult`, delivered to every Worker Session in `caching` state.
    HelperResult,
}

/// Where an envelope is headed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Queuer,
    Worker(WorkerId),
    Broadcast(Topic),
    HelperRouter,
    /// An external observer: an initiator, a connection manager. The
    /// coordinator's run loop surfaces these rather than routing them to
    /// another state machine.
    External,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: Recipient,
    pub event: Event,
}

impl Envelope {
    pub fn new(to: Recipient, event: Event) -> Self {
        Self { to, event }
    }

    pub fn to_queuer(event: Event) -> Self {
        Self::new(Recipient::Queuer, event)
    }

    pub fn to_worker(worker: WorkerId, event: Event) -> Self {
        Self::new(Recipient::Worker(worker), event)
    }

    pub fn external(event: Event) -> Self {
        Self::new(Recipient::External, event)
    }
}

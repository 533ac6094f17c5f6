//! Worker Session (C7, §4.7): the per-connection state machine driving one
//! worker through `idle -> building -> caching -> idle`.

use distbuild_core::{Artifact, HelperRequestId, IdentifierGenerator, InitiatorId, JobId, WorkerId, WorkerName};
use distbuild_wire::{CoordinatorMessage, WorkerMessage};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{debug, info, warn};

/// RFC 3986 unreserved characters left unescaped, matching the original's
/// `urllib.quote(x)` default "always safe" set — `NON_ALPHANUMERIC` alone
/// would also escape `.`, `-`, `_` and `~`, producing a cache-fetch query
/// string a real cache server speaking the original protocol can't parse.
const CACHE_SUFFIX_ENCODE_SET: &AsciiSet =
    &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_').remove(b'~');

use crate::event::Envelope;
use crate::event::Event;
use crate::helper::HelperRequest;

/// §4.7 "States".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Building,
    Caching,
}

/// A read-only snapshot of the job a session needs to act on for one event.
/// The session never owns a `Job`; the coordinator looks this up from the
/// (Queuer-owned) Job Table fresh for every event (§5 "Shared-resource
/// policy" — avoids the aliased-mutable-object sharing the original Python
/// relies on between `WorkerConnection._job` and the Queuer's table entry).
#[derive(Debug, Clone)]
pub struct JobView {
    pub id: JobId,
    pub artifact: Artifact,
    pub initiators: Vec<InitiatorId>,
}

/// The effect of handling one event: events to enqueue back onto the loop,
/// plus an optional message to write through this session's framer. Kept
/// separate from `Envelope` because a wire send isn't routed through another
/// state machine — it's a side effect on this session's own transport.
#[derive(Debug, Default)]
pub struct SessionOutput {
    pub envelopes: Vec<Envelope>,
    pub wire_send: Option<CoordinatorMessage>,
}

impl SessionOutput {
    fn events(envelopes: Vec<Envelope>) -> Self {
        Self { envelopes, wire_send: None }
    }

    fn send(wire_send: CoordinatorMessage, envelopes: Vec<Envelope>) -> Self {
        Self { envelopes, wire_send: Some(wire_send) }
    }
}

/// Per-worker state (§3 "Worker Session state").
pub struct WorkerSession {
    pub id: WorkerId,
    pub name: WorkerName,
    pub cache_port: u16,
    pub state: SessionState,
    pub assigned_job: Option<JobId>,
    pending_helper_id: Option<HelperRequestId>,
    pending_exec_message: Option<String>,
}

impl WorkerSession {
    pub fn new(id: WorkerId, name: WorkerName, cache_port: u16) -> Self {
        Self {
            id,
            name,
            cache_port,
            state: SessionState::Idle,
            assigned_job: None,
            pending_helper_id: None,
            pending_exec_message: None,
        }
    }

    /// Emitted once, on connect (§4.7 "Initial action on connect").
    pub fn initial_need_job(&self) -> Envelope {
        Envelope::to_queuer(Event::NeedJob {
            session: self.id.clone(),
            name: self.name.clone(),
            last_job: None,
        })
    }

    /// `idle -> building` on `HaveAJob` (§4.7.1).
    pub fn start_build(&mut self, job: &JobView, worker_command: &str) -> SessionOutput {
        self.state = SessionState::Building;
        self.assigned_job = Some(job.id.clone());

        let argv = vec![worker_command.to_string(), job.artifact.name.clone()];
        let stdin_contents = serde_json::to_string(&job.artifact).unwrap_or_default();

        info!(job_id = %job.id, worker = %self.id, "starting build");

        SessionOutput::send(
            CoordinatorMessage::ExecRequest { id: job.id.to_string(), argv, stdin_contents },
            vec![
                Envelope::to_queuer(Event::JobStarted { job: job.id.clone() }),
                Envelope::external(Event::StepStarted {
                    initiators: job.initiators.clone(),
                    cache_key: job.artifact.cache_key.clone(),
                    worker_name: self.name.clone(),
                }),
            ],
        )
    }

    /// §4.7.2. `building -> building`, dispatched by `msg.type`.
    pub fn handle_worker_message(
        &mut self,
        job: &JobView,
        msg: WorkerMessage,
        cache_server_base: &str,
        helper_ids: &mut IdentifierGenerator,
    ) -> SessionOutput {
        match msg {
            WorkerMessage::ExecOutput { stdout, stderr, .. } => {
                SessionOutput::events(vec![Envelope::external(Event::BuildOutput {
                    ids: job.initiators.clone(),
                    cache_key: job.artifact.cache_key.clone(),
                    stdout,
                    stderr,
                })])
            }
            WorkerMessage::ExecResponse { exit, message, .. } => {
                if exit != 0 {
                    self.state = SessionState::Idle;
                    let mut envelopes = vec![
                        Envelope::external(Event::BuildFailed {
                            message,
                            cache_key: job.artifact.cache_key.clone(),
                        }),
                        Envelope::to_queuer(Event::JobFailed { job: job.id.clone() }),
                    ];
                    envelopes.push(self.request_next_job());
                    SessionOutput::events(envelopes)
                } else {
                    self.pending_exec_message = Some(message);
                    self.state = SessionState::Caching;
                    self.request_caching(job, cache_server_base, helper_ids)
                }
            }
        }
    }

    /// §4.7.3. The coordinator calls this only for sessions whose assigned
    /// job's initiator set contains `initiator_id` — it unconditionally
    /// removes that initiator from the Job Table afterwards regardless of
    /// which branch below ran (§4.7.3: "Always remove the initiator from
    /// the set").
    pub fn handle_build_cancel(&mut self, job: &JobView, initiator_id: &InitiatorId) -> SessionOutput {
        let sole_initiator = job.initiators.len() == 1 && job.initiators[0] == *initiator_id;
        if !sole_initiator {
            return SessionOutput::default();
        }

        self.state = SessionState::Idle;
        let next_job = self.request_next_job();
        SessionOutput::send(
            CoordinatorMessage::ExecCancel { id: job.id.to_string() },
            vec![next_job],
        )
    }

    /// §4.7.4.
    fn request_caching(
        &mut self,
        job: &JobView,
        cache_server_base: &str,
        helper_ids: &mut IdentifierGenerator,
    ) -> SessionOutput {
        let artifacts: String = job
            .artifact
            .cache_suffixes()
            .iter()
            .map(|suffix| utf8_percent_encode(suffix, CACHE_SUFFIX_ENCODE_SET).to_string())
            .collect::<Vec<_>>()
            .join(",");

        // `self.name` is already `"<fqdn>:<cache_port>"` (§4.7, `register_worker`);
        // it must not be re-suffixed with `self.cache_port` here or the query
        // parameter comes out double-ported (`host=fqdn:9000:9000`).
        let url = format!(
            "{base}/1.0/fetch?host={host}&cacheid={cache_key}&artifacts={artifacts}",
            base = cache_server_base,
            host = self.name,
            cache_key = job.artifact.cache_key,
            artifacts = artifacts,
        );

        let request_id = HelperRequestId::new(helper_ids.next_id());
        self.pending_helper_id = Some(request_id.clone());

        info!(job_id = %job.id, url = %url, "requesting cache population");

        SessionOutput::events(vec![
            Envelope::new(
                crate::event::Recipient::HelperRouter,
                Event::HelperRequest { msg: HelperRequest { id: request_id, url } },
            ),
            Envelope::external(Event::Caching {
                initiators: job.initiators.clone(),
                cache_key: job.artifact.cache_key.clone(),
            }),
        ])
    }

    /// §4.7.5. Filters by `msg.id == pending_helper_id`; a non-matching id
    /// (another session's in-flight request on the same broadcast) is a
    /// silent no-op.
    pub fn maybe_handle_helper_result(
        &mut self,
        job: &JobView,
        result_id: &HelperRequestId,
        status: u16,
    ) -> SessionOutput {
        if self.pending_helper_id.as_ref() != Some(result_id) {
            return SessionOutput::default();
        }

        self.pending_helper_id = None;
        self.state = SessionState::Idle;
        let message = self.pending_exec_message.take().unwrap_or_default();

        if status == 200 {
            let mut envelopes = vec![
                Envelope::external(Event::BuildFinished { message, cache_key: job.artifact.cache_key.clone() }),
                Envelope::to_queuer(Event::JobFinished { job: job.id.clone() }),
            ];
            envelopes.push(self.request_next_job());
            SessionOutput::events(envelopes)
        } else {
            warn!(job_id = %job.id, status, "cache population failed");
            let mut envelopes = vec![
                // §7 / §4.7.5: JobFailed must precede BuildFailed.
                Envelope::to_queuer(Event::JobFailed { job: job.id.clone() }),
                Envelope::external(Event::BuildFailed {
                    message: format!("cache population returned status {status}"),
                    cache_key: job.artifact.cache_key.clone(),
                }),
                Envelope::to_queuer(Event::JobFinished { job: job.id.clone() }),
            ];
            envelopes.push(self.request_next_job());
            SessionOutput::events(envelopes)
        }
    }

    /// §4.7.6. `Eof` from the framer in any non-terminal state.
    pub fn reconnect(&mut self) -> SessionOutput {
        debug!(worker = %self.id, state = ?self.state, "framer eof, requesting reconnect");
        SessionOutput::events(vec![Envelope::new(
            crate::event::Recipient::External,
            Event::Reconnect { worker: self.id.clone() },
        )])
    }

    /// After a terminal self-transition to idle, ask the Queuer for the next
    /// job. Also clears `assigned_job`; the job itself is removed from the
    /// table by the Queuer when it processes this `NeedJob` (§4.6.3).
    fn request_next_job(&mut self) -> Envelope {
        let last_job = self.assigned_job.take();
        self.state = SessionState::Idle;
        Envelope::to_queuer(Event::NeedJob { session: self.id.clone(), name: self.name.clone(), last_job })
    }
}

#[path = "session_tests.rs"]
#[cfg(test)]
mod tests;

//! The Event Loop (C1, §4): wires the Build Queuer, the Worker Sessions and
//! the Helper Router together and runs the single-threaded dispatch loop
//! the rest of this crate's invariants (§5) depend on.
//!
//! There is no real network listener here — accepting worker connections and
//! reading initiator requests off some front-end transport is out of scope
//! (spec.md §1 Non-goals). [`Coordinator`] exposes the handful of entry
//! points a thin transport layer would call (`register_worker`,
//! `handle_worker_message`, `submit_build_request`, ...); each one enqueues
//! the corresponding event and drains the loop before returning the
//! externally observable events it produced.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

use async_trait::async_trait;
use distbuild_core::{Artifact, IdentifierGenerator, InitiatorId, Job, JobId, WorkerId, WorkerName};
use distbuild_wire::{CoordinatorMessage, ProtocolError, WorkerMessage};
use tracing::{error, warn};

use crate::config::CoordinatorConfig;
use crate::event::{Envelope, Event, Recipient, Topic};
use crate::helper::{HelperResponse, HelperTransport};
use crate::session::{JobView, SessionOutput, SessionState, WorkerSession};

/// The write half of a framed worker connection, abstracted so the loop
/// doesn't need to be generic over a stream type — sessions come and go with
/// different concrete `S: AsyncRead + AsyncWrite` types (a real `TcpStream`
/// in production, one half of `tokio::io::duplex` in tests).
#[async_trait]
pub trait WireSink: Send {
    async fn send(&mut self, msg: &CoordinatorMessage) -> Result<(), ProtocolError>;
}

#[async_trait]
impl<S> WireSink for distbuild_wire::Framer<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, msg: &CoordinatorMessage) -> Result<(), ProtocolError> {
        distbuild_wire::Framer::send(self, msg).await
    }
}

/// A [`WireSink`] that records every message instead of writing it anywhere,
/// for tests that only need to observe what the coordinator sent a worker
/// (the way [`crate::helper::FakeHelperTransport`] stands in for the helper
/// side).
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct RecordingWireSink {
    sent: std::sync::Arc<std::sync::Mutex<Vec<CoordinatorMessage>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingWireSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<CoordinatorMessage> {
        self.sent.lock().expect("sink mutex poisoned").clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl WireSink for RecordingWireSink {
    async fn send(&mut self, msg: &CoordinatorMessage) -> Result<(), ProtocolError> {
        self.sent.lock().expect("sink mutex poisoned").push(msg.clone());
        Ok(())
    }
}

/// Ties C1/C4/C5/C6/C7 together. Generic over the helper transport so tests
/// can swap in [`crate::helper::FakeHelperTransport`].
pub struct Coordinator<T: HelperTransport> {
    config: CoordinatorConfig,
    queuer: crate::queuer::BuildQueuer,
    sessions: HashMap<WorkerId, WorkerSession>,
    framers: HashMap<WorkerId, Box<dyn WireSink>>,
    helper: T,
    helper_ids: IdentifierGenerator,
    worker_ids: IdentifierGenerator,
    queue: VecDeque<Envelope>,
    /// Every event dispatched, in delivery order, regardless of recipient —
    /// a superset of what public methods return (those filter to
    /// `Recipient::External`). Exists so scenario/property tests can assert
    /// the full causal ordering spec.md §8 describes (e.g. S1's expected
    /// sequence ends in `JobFinished`, a Queuer-directed event no external
    /// collaborator ever sees).
    trace: Vec<Event>,
}

impl<T: HelperTransport> Coordinator<T> {
    pub fn new(config: CoordinatorConfig, helper: T) -> Self {
        Self {
            config,
            queuer: crate::queuer::BuildQueuer::new(),
            sessions: HashMap::new(),
            framers: HashMap::new(),
            helper,
            helper_ids: IdentifierGenerator::new("helper"),
            worker_ids: IdentifierGenerator::new("worker"),
            queue: VecDeque::new(),
            trace: Vec::new(),
        }
    }

    /// Drains and returns the full event trace accumulated since the last
    /// call (or since construction). Test/scenario support only — not part
    /// of the steady-state API a transport layer would drive.
    #[cfg(any(test, feature = "test-support"))]
    pub fn take_trace(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.trace)
    }

    /// Registers a freshly connected worker (§4.7 "Initial action on
    /// connect"). `fqdn` mirrors the original's `socket.getfqdn(addr)` step
    /// (SPEC_FULL supplement 2) as an injectable hook so naming is testable
    /// without real DNS.
    pub async fn register_worker(
        &mut self,
        peer_ip: IpAddr,
        cache_port: u16,
        framer: Box<dyn WireSink>,
        fqdn: impl Fn(IpAddr) -> String,
    ) -> (WorkerId, Vec<Event>) {
        let id = WorkerId::new(self.worker_ids.next_id());
        let name = WorkerName::new(format!("{}:{}", fqdn(peer_ip), cache_port));
        let session = WorkerSession::new(id.clone(), name, cache_port);
        self.queue.push_back(session.initial_need_job());
        self.sessions.insert(id.clone(), session);
        self.framers.insert(id.clone(), framer);
        let events = self.drain().await;
        (id, events)
    }

    pub async fn submit_build_request(&mut self, artifact: Artifact, initiator_id: InitiatorId) -> Vec<Event> {
        self.queue.push_back(Envelope::to_queuer(Event::BuildRequest { artifact, initiator_id }));
        self.drain().await
    }

    pub async fn cancel_pending(&mut self, initiator_id: InitiatorId) -> Vec<Event> {
        self.queue.push_back(Envelope::to_queuer(Event::CancelPending { initiator_id }));
        self.drain().await
    }

    /// §4.7.3's broadcast entry point — a build-controller-driven cancel of
    /// an in-progress build, not a pending (unstarted) one.
    pub async fn cancel_build(&mut self, initiator_id: InitiatorId) -> Vec<Event> {
        self.queue
            .push_back(Envelope::new(Recipient::Broadcast(Topic::BuildCancel), Event::BuildCancel { initiator_id }));
        self.drain().await
    }

    pub async fn handle_worker_message(&mut self, worker: &WorkerId, msg: WorkerMessage) -> Vec<Event> {
        self.queue.push_back(Envelope::to_worker(worker.clone(), Event::NewMessage { msg }));
        self.drain().await
    }

    pub async fn handle_worker_eof(&mut self, worker: &WorkerId) -> Vec<Event> {
        self.queue.push_back(Envelope::to_worker(worker.clone(), Event::Eof));
        self.drain().await
    }

    fn job_view_for_id(&self, job_id: &JobId) -> Option<JobView> {
        self.queuer.get_by_id(job_id).map(Self::view_of)
    }

    fn view_of(job: &Job) -> JobView {
        JobView {
            id: job.id.clone(),
            artifact: job.artifact.clone(),
            initiators: job.initiators.iter().cloned().collect(),
        }
    }

    /// Drains `self.queue` to quiescence, routing each envelope by
    /// recipient. Runs on a single logical thread of control — the `&mut
    /// self` borrow is the mechanism enforcing §5's "no handler
    /// interleaving" invariant; two calls into a `Coordinator` can never run
    /// concurrently over the same state.
    async fn drain(&mut self) -> Vec<Event> {
        let mut observed = Vec::new();
        while let Some(envelope) = self.queue.pop_front() {
            self.trace.push(envelope.event.clone());
            match envelope.to {
                Recipient::External => observed.push(envelope.event),
                Recipient::Queuer => self.dispatch_to_queuer(envelope.event),
                Recipient::Worker(id) => self.dispatch_to_worker(&id, envelope.event).await,
                Recipient::Broadcast(topic) => self.dispatch_broadcast(topic, envelope.event).await,
                Recipient::HelperRouter => self.dispatch_helper(envelope.event).await,
            }
        }
        observed
    }

    fn dispatch_to_queuer(&mut self, event: Event) {
        let envelopes = match event {
            Event::BuildRequest { artifact, initiator_id } => {
                self.queuer.handle_build_request(artifact, initiator_id)
            }
            Event::CancelPending { initiator_id } => self.queuer.handle_cancel_pending(initiator_id),
            Event::NeedJob { session, name, last_job } => self.queuer.handle_need_job(session, name, last_job),
            Event::JobStarted { job } => self.queuer.handle_job_started(job),
            Event::JobFinished { job } => self.queuer.handle_job_finished(job),
            Event::JobFailed { job } => self.queuer.handle_job_failed(job),
            other => {
                warn!(event = ?other, "event addressed to queuer has no handler");
                Vec::new()
            }
        };
        self.queue.extend(envelopes);
    }

    async fn dispatch_to_worker(&mut self, id: &WorkerId, event: Event) {
        let output = match event {
            Event::HaveAJob { job } => {
                let Some(view) = self.job_view_for_id(&job) else {
                    warn!(job_id = %job, worker = %id, "HaveAJob for unknown job");
                    return;
                };
                let worker_command = self.config.worker_command.clone();
                match self.sessions.get_mut(id) {
                    Some(session) => session.start_build(&view, &worker_command),
                    None => {
                        warn!(worker = %id, "HaveAJob for unknown session");
                        return;
                    }
                }
            }
            Event::NewMessage { msg } => {
                let Some(job_id) = self.sessions.get(id).and_then(|s| s.assigned_job.clone()) else {
                    warn!(worker = %id, "worker message with no assigned job");
                    return;
                };
                let Some(view) = self.job_view_for_id(&job_id) else {
                    warn!(job_id = %job_id, worker = %id, "worker message for unknown job");
                    return;
                };
                let base = self.config.writeable_cache_server.as_str().trim_end_matches('/').to_string();
                match self.sessions.get_mut(id) {
                    Some(session) => session.handle_worker_message(&view, msg, &base, &mut self.helper_ids),
                    None => return,
                }
            }
            Event::Eof => match self.sessions.get_mut(id) {
                Some(session) => session.reconnect(),
                None => return,
            },
            other => {
                warn!(event = ?other, worker = %id, "event addressed to session has no handler");
                return;
            }
        };
        self.apply_session_output(id, output).await;
    }

    #[allow(clippy::expect_used)]
    async fn dispatch_broadcast(&mut self, topic: Topic, event: Event) {
        match (topic, event) {
            (Topic::BuildCancel, Event::BuildCancel { initiator_id }) => {
                let building: Vec<WorkerId> = self
                    .sessions
                    .iter()
                    .filter(|(_, s)| s.state == SessionState::Building)
                    .map(|(id, _)| id.clone())
                    .collect();

                for id in building {
                    let Some(job_id) = self.sessions.get(&id).and_then(|s| s.assigned_job.clone()) else {
                        continue;
                    };
                    let Some(view) = self.job_view_for_id(&job_id) else { continue };
                    if !view.initiators.contains(&initiator_id) {
                        continue;
                    }
                    let output = self
                        .sessions
                        .get_mut(&id)
                        .expect("id collected from sessions above")
                        .handle_build_cancel(&view, &initiator_id);
                    self.queuer.remove_initiator(&job_id, &initiator_id);
                    self.apply_session_output(&id, output).await;
                }
            }
            (Topic::HelperResult, Event::HelperResult { msg }) => {
                let caching: Vec<WorkerId> = self
                    .sessions
                    .iter()
                    .filter(|(_, s)| s.state == SessionState::Caching)
                    .map(|(id, _)| id.clone())
                    .collect();

                for id in caching {
                    let Some(job_id) = self.sessions.get(&id).and_then(|s| s.assigned_job.clone()) else {
                        continue;
                    };
                    let Some(view) = self.job_view_for_id(&job_id) else { continue };
                    let output = self
                        .sessions
                        .get_mut(&id)
                        .expect("id collected from sessions above")
                        .maybe_handle_helper_result(&view, &msg.id, msg.status);
                    self.apply_session_output(&id, output).await;
                }
            }
            (topic, event) => warn!(?topic, event = ?event, "broadcast topic/event mismatch"),
        }
    }

    async fn dispatch_helper(&mut self, event: Event) {
        let Event::HelperRequest { msg } = event else {
            warn!(event = ?event, "non-request event addressed to helper router");
            return;
        };
        let request_id = msg.id.clone();
        let result = self.helper.fetch(msg).await;
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                error!(request_id = %request_id, error = %err, "helper fetch failed");
                HelperResponse { id: request_id, status: 502, body: err.to_string() }
            }
        };
        self.queue
            .push_back(Envelope::new(Recipient::Broadcast(Topic::HelperResult), Event::HelperResult { msg: response }));
    }

    async fn apply_session_output(&mut self, id: &WorkerId, output: SessionOutput) {
        if let Some(msg) = output.wire_send {
            match self.framers.get_mut(id) {
                Some(sink) => {
                    if let Err(err) = sink.send(&msg).await {
                        warn!(worker = %id, error = %err, "wire send failed, treating as eof");
                        self.queue.push_back(Envelope::to_worker(id.clone(), Event::Eof));
                    }
                }
                None => warn!(worker = %id, "wire send for session with no framer"),
            }
        }
        self.queue.extend(output.envelopes);
    }
}

#[path = "coordinator_tests.rs"]
#[cfg(test)]
mod tests;

//! Property tests for the quantified invariants in spec.md §8. Exercises
//! [`crate::queuer::BuildQueuer`] and [`crate::session::WorkerSession`]
//! directly — both are synchronous, so no [`crate::coordinator::Coordinator`]
//! or tokio runtime is needed here.

use distbuild_core::{Artifact, ArtifactKind, HelperRequestId, InitiatorId, WorkerId, WorkerName};
use proptest::prelude::*;

use crate::event::Event;
use crate::queuer::BuildQueuer;
use crate::session::{JobView, WorkerSession};

fn artifact(basename: &str) -> Artifact {
    Artifact::new(basename, basename, format!("{basename}-key"), ArtifactKind::System)
}

/// A tiny vocabulary of ops to interleave, enough to cover the basename
/// reuse and cancel-then-rebuild interactions the invariants care about
/// without the state space exploding.
#[derive(Debug, Clone)]
enum Op {
    Build { basename: String, initiator: String },
    Cancel { initiator: String },
    NeedJob { worker: String },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (prop::sample::select(vec!["a", "b", "c"]), prop::sample::select(vec!["i1", "i2", "i3"]))
            .prop_map(|(b, i)| Op::Build { basename: b.to_string(), initiator: i.to_string() }),
        prop::sample::select(vec!["i1", "i2", "i3"]).prop_map(|i| Op::Cancel { initiator: i.to_string() }),
        prop::sample::select(vec!["w1", "w2"]).prop_map(|w| Op::NeedJob { worker: w.to_string() }),
    ]
}

fn apply(queuer: &mut BuildQueuer, op: &Op) {
    match op {
        Op::Build { basename, initiator } => {
            queuer.handle_build_request(artifact(basename), InitiatorId::new(initiator.as_str()));
        }
        Op::Cancel { initiator } => {
            queuer.handle_cancel_pending(InitiatorId::new(initiator.as_str()));
        }
        Op::NeedJob { worker } => {
            queuer.handle_need_job(WorkerId::new(worker.as_str()), WorkerName::new(worker.as_str()), None);
        }
    }
}

proptest! {
    /// #1 Deduplication: at every quiescent point, at most one job per
    /// basename exists.
    #[test]
    fn deduplication_holds_after_any_interleaving(ops in prop::collection::vec(arb_op(), 0..40)) {
        let mut queuer = BuildQueuer::new();
        for op in &ops {
            apply(&mut queuer, op);
            let mut seen = std::collections::HashSet::new();
            for job in queuer.jobs().iter() {
                prop_assert!(seen.insert(job.artifact.basename.clone()), "duplicate basename {}", job.artifact.basename);
            }
        }
    }

    /// #2 Initiator conservation: a job with zero initiators is absent from
    /// the table unless it's running or failed.
    #[test]
    fn initiator_conservation_holds_after_any_interleaving(ops in prop::collection::vec(arb_op(), 0..40)) {
        let mut queuer = BuildQueuer::new();
        for op in &ops {
            apply(&mut queuer, op);
            for job in queuer.jobs().iter() {
                prop_assert!(
                    !job.initiators.is_empty() || job.running || job.failed,
                    "job {:?} has no initiators but is neither running nor failed", job.id
                );
            }
        }
    }

    /// #3 Single dispatch: once a job is assigned a worker, it is never
    /// silently reassigned to a different one.
    #[test]
    fn single_dispatch_never_reassigns(ops in prop::collection::vec(arb_op(), 0..40)) {
        let mut queuer = BuildQueuer::new();
        let mut first_assignment: std::collections::HashMap<String, WorkerId> = std::collections::HashMap::new();
        for op in &ops {
            apply(&mut queuer, op);
            for job in queuer.jobs().iter() {
                if let Some(worker) = &job.assigned_worker {
                    match first_assignment.get(job.id.as_str()) {
                        Some(prior) => prop_assert_eq!(prior, worker, "job {:?} reassigned", job.id),
                        None => {
                            first_assignment.insert(job.id.as_str().to_string(), worker.clone());
                        }
                    }
                }
            }
        }
    }

    /// #5 Cancel safety: cancelling an initiator that holds no jobs never
    /// mutates the table.
    #[test]
    fn cancelling_an_uninvolved_initiator_is_a_no_op(
        basenames in prop::collection::vec(prop::sample::select(vec!["a", "b"]), 1..6),
    ) {
        let mut queuer = BuildQueuer::new();
        for (n, basename) in basenames.iter().enumerate() {
            queuer.handle_build_request(artifact(basename), InitiatorId::new(format!("holder-{n}")));
        }
        let before: Vec<_> = queuer.jobs().iter().cloned().collect();

        queuer.handle_cancel_pending(InitiatorId::new("ghost"));

        let after: Vec<_> = queuer.jobs().iter().cloned().collect();
        prop_assert_eq!(before, after);
    }

    /// #4 Progress monotonicity per job: the observable event sequence from
    /// `StepStarted` onward is a prefix of
    /// `StepStarted · BuildOutput* · (Caching · (BuildFinished | BuildFailed) | BuildFailed)`,
    /// across every combination of exit status and cache-helper outcome.
    #[test]
    fn progress_sequence_matches_grammar_after_any_lifecycle(
        output_count in 0usize..5,
        exit in prop_oneof![Just(0), 1..5],
        helper_status in prop_oneof![Just(200u16), 201u16..600],
    ) {
        let worker = WorkerId::new("w1");
        let mut session = WorkerSession::new(worker, WorkerName::new("worker-one"), 7000);
        let job = JobView {
            id: distbuild_core::JobId::new("job-1"),
            artifact: artifact("a"),
            initiators: vec![InitiatorId::new("i1")],
        };
        let mut helper_ids = distbuild_core::IdentifierGenerator::new("helper");

        let mut labels = Vec::new();
        let start = session.start_build(&job, "/usr/bin/build");
        labels.extend(start.envelopes.iter().filter_map(progress_label));

        for _ in 0..output_count {
            let out = session.handle_worker_message(
                &job,
                distbuild_wire::WorkerMessage::ExecOutput {
                    id: job.id.to_string(),
                    stdout: String::new(),
                    stderr: String::new(),
                },
                "http://cache.example",
                &mut helper_ids,
            );
            labels.extend(out.envelopes.iter().filter_map(progress_label));
        }

        let response = session.handle_worker_message(
            &job,
            distbuild_wire::WorkerMessage::ExecResponse { id: job.id.to_string(), exit, message: "msg".into() },
            "http://cache.example",
            &mut helper_ids,
        );
        labels.extend(response.envelopes.iter().filter_map(progress_label));

        if exit == 0 {
            let HelperRequestOutcome(request_id) = extract_helper_request(&response);
            let result = session.maybe_handle_helper_result(&job, &request_id, helper_status);
            labels.extend(result.envelopes.iter().filter_map(progress_label));
        }

        prop_assert!(
            matches_progress_grammar(&labels),
            "sequence {:?} violates progress monotonicity", labels
        );
    }

    /// #6 JobFailed precedes BuildFailed on every non-200 cache status.
    #[test]
    fn job_failed_precedes_build_failed_on_cache_failure(status in 201u16..600, message in ".{0,40}") {
        prop_assume!(status != 200);
        let worker = WorkerId::new("w1");
        let mut session = WorkerSession::new(worker, WorkerName::new("worker-one"), 7000);
        let job = JobView {
            id: distbuild_core::JobId::new("job-1"),
            artifact: artifact("a"),
            initiators: vec![InitiatorId::new("i1")],
        };
        let mut helper_ids = distbuild_core::IdentifierGenerator::new("helper");
        let caching = session.handle_worker_message(
            &job,
            distbuild_wire::WorkerMessage::ExecResponse { id: job.id.to_string(), exit: 0, message: message.clone() },
            "http://cache.example",
            &mut helper_ids,
        );
        let HelperRequestOutcome(request_id) = extract_helper_request(&caching);

        let output = session.maybe_handle_helper_result(&job, &request_id, status);
        let job_failed_pos = output.envelopes.iter().position(|e| matches!(e.event, Event::JobFailed { .. }));
        let build_failed_pos = output.envelopes.iter().position(|e| matches!(e.event, Event::BuildFailed { .. }));

        prop_assert!(job_failed_pos.is_some());
        prop_assert!(build_failed_pos.is_some());
        prop_assert!(job_failed_pos < build_failed_pos, "JobFailed must precede BuildFailed");
    }

    /// #7 Event-order determinism: replaying the same op sequence against a
    /// fresh queuer twice produces identical resulting tables and envelopes.
    #[test]
    fn replaying_the_same_ops_is_deterministic(ops in prop::collection::vec(arb_op(), 0..30)) {
        let mut left = BuildQueuer::new();
        let mut right = BuildQueuer::new();
        for op in &ops {
            let events_left: Vec<_> = apply_capturing(&mut left, op);
            let events_right: Vec<_> = apply_capturing(&mut right, op);
            prop_assert_eq!(events_left, events_right);
        }
        let left_jobs: Vec<_> = left.jobs().iter().cloned().collect();
        let right_jobs: Vec<_> = right.jobs().iter().cloned().collect();
        prop_assert_eq!(left_jobs, right_jobs);
    }
}

/// Maps an envelope to its label in spec.md §8 invariant #4's grammar,
/// ignoring Queuer-directed bookkeeping events (`JobStarted`, `JobFailed`,
/// `NeedJob`, ...) that aren't part of the observable per-job sequence.
fn progress_label(envelope: &crate::event::Envelope) -> Option<&'static str> {
    match &envelope.event {
        Event::StepStarted { .. } => Some("StepStarted"),
        Event::BuildOutput { .. } => Some("BuildOutput"),
        Event::Caching { .. } => Some("Caching"),
        Event::BuildFinished { .. } => Some("BuildFinished"),
        Event::BuildFailed { .. } => Some("BuildFailed"),
        _ => None,
    }
}

/// `StepStarted · BuildOutput* · (Caching · (BuildFinished | BuildFailed) | BuildFailed)`.
fn matches_progress_grammar(labels: &[&str]) -> bool {
    enum St {
        PreStep,
        Output,
        Caching,
        Done,
    }
    let mut state = St::PreStep;
    for label in labels {
        state = match (state, *label) {
            (St::PreStep, "StepStarted") => St::Output,
            (St::Output, "BuildOutput") => St::Output,
            (St::Output, "Caching") => St::Caching,
            (St::Output, "BuildFailed") => St::Done,
            (St::Caching, "BuildFinished") => St::Done,
            (St::Caching, "BuildFailed") => St::Done,
            _ => return false,
        };
    }
    true
}

struct HelperRequestOutcome(HelperRequestId);

fn extract_helper_request(output: &crate::session::SessionOutput) -> HelperRequestOutcome {
    for envelope in &output.envelopes {
        if let Event::HelperRequest { msg } = &envelope.event {
            return HelperRequestOutcome(msg.id.clone());
        }
    }
    panic!("expected a HelperRequest envelope, got {:?}", output.envelopes);
}

fn apply_capturing(queuer: &mut BuildQueuer, op: &Op) -> Vec<Event> {
    match op {
        Op::Build { basename, initiator } => queuer
            .handle_build_request(artifact(basename), InitiatorId::new(initiator.as_str()))
            .into_iter()
            .map(|e| e.event)
            .collect(),
        Op::Cancel { initiator } => queuer
            .handle_cancel_pending(InitiatorId::new(initiator.as_str()))
            .into_iter()
            .map(|e| e.event)
            .collect(),
        Op::NeedJob { worker } => queuer
            .handle_need_job(WorkerId::new(worker.as_str()), WorkerName::new(worker.as_str()), None)
            .into_iter()
            .map(|e| e.event)
            .collect(),
    }
}

//! Worker wire messages (§6 "Worker wire messages"): the typed records
//! exchanged between the coordinator and a connected worker over the
//! Message Framer.

use serde::{Deserialize, Serialize};

/// Coordinator → worker messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CoordinatorMessage {
    /// Sent once per job (§4.7.1): job id, an argv naming the worker-side
    /// command plus the artifact, and the artifact serialized as stdin.
    ExecRequest {
        id: String,
        argv: Vec<String>,
        stdin_contents: String,
    },
    /// Sent when the last initiator of a running job cancels (§4.7.3).
    ExecCancel { id: String },
}

/// Worker → coordinator messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerMessage {
    /// Streamed 0..n times while a build runs (§4.7.2).
    ExecOutput {
        id: String,
        #[serde(default)]
        stdout: String,
        #[serde(default)]
        stderr: String,
    },
    /// Terminal, sent exactly once per exec (§4.7.2).
    ExecResponse {
        id: String,
        exit: i32,
        #[serde(default)]
        message: String,
    },
}

impl WorkerMessage {
    pub fn job_id(&self) -> &str {
        match self {
            WorkerMessage::ExecOutput { id, .. } => id,
            WorkerMessage::ExecResponse { id, .. } => id,
        }
    }
}

#[path = "message_tests.rs"]
#[cfg(test)]
mod tests;

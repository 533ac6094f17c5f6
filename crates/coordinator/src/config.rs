//! Coordinator configuration (§6 "Configuration enumerated").

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::error::CoordinatorError;

/// Loaded from TOML, matching the way the teacher repository loads
/// workspace config (`toml` + `serde`).
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Base URL the Worker Session issues its post-build fetch GET against
    /// (§4.7.4).
    pub writeable_cache_server: Url,
    /// TCP port of the worker-side cache, interpolated into the fetch URL's
    /// `host=` query parameter.
    pub worker_cache_server_port: u16,
    /// Command name invoked on the worker per build (§4.7.1 argv[0]).
    pub worker_command: String,
    /// Where the worker-facing listener binds. Not part of spec.md's
    /// business logic (the transport itself is a Non-goal), but a runnable
    /// coordinator binary needs somewhere to listen.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

#[allow(clippy::expect_used)]
fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:9090".parse().expect("valid default bind address")
}

impl CoordinatorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, CoordinatorError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoordinatorError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CoordinatorError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}

#[path = "config_tests.rs"]
#[cfg(test)]
mod tests;

//! Crate-wide error type. Per §7, none of these ever cross the event-loop
//! boundary as a `Result` delivered to a handler — they surface either at
//! construction time (bad config) or are turned into events before the loop
//! sees them (framer/helper failures become `Eof`/`HelperResult`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("failed to read config file {path:?}: {source}")]
    ConfigRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    Job(#[from] distbuild_core::JobTableError),
}

//! The Artifact handle (§3): an external, read-only entity the core never
//! mutates, only carries and serializes into wire requests.

use serde::{Deserialize, Serialize};

use crate::ids::CacheKey;

/// `source.kind` (§3), plus the structure `_request_caching` needs off a
/// chunk artifact to build its suffix list (§4.7.4, SPEC_FULL supplement 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ArtifactKind {
    Chunk { sub_artifacts: Vec<String> },
    Stratum,
    System,
}

impl ArtifactKind {
    /// Label used in `"<kind>.<name>"` fallback suffixes (§4.7.4, "otherwise"
    /// branch) and in log output.
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::Chunk { .. } => "chunk",
            ArtifactKind::Stratum => "stratum",
            ArtifactKind::System => "system",
        }
    }
}

/// An immutable handle to a buildable artifact (§3). Identity is `basename`;
/// `cache_key` is the opaque content fingerprint used to address the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub basename: String,
    pub name: String,
    pub cache_key: CacheKey,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn new(
        basename: impl Into<String>,
        name: impl Into<String>,
        cache_key: impl Into<CacheKey>,
        kind: ArtifactKind,
    ) -> Self {
        Self {
            basename: basename.into(),
            name: name.into(),
            cache_key: cache_key.into(),
            kind,
        }
    }

    /// The cache-fetch suffixes for this artifact's kind, unencoded (§4.7.4).
    pub fn cache_suffixes(&self) -> Vec<String> {
        match &self.kind {
            ArtifactKind::Chunk { sub_artifacts } => {
                let mut suffixes: Vec<String> = sub_artifacts
                    .iter()
                    .map(|name| format!("{}.{}", self.kind.label(), name))
                    .collect();
                suffixes.push("build-log".to_string());
                suffixes
            }
            ArtifactKind::Stratum => vec![
                format!("stratum.{}", self.name),
                format!("stratum.{}.meta", self.name),
            ],
            ArtifactKind::System => vec![format!("{}.{}", self.kind.label(), self.name)],
        }
    }
}

#[path = "artifact_tests.rs"]
#[cfg(test)]
mod tests;

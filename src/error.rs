use std::sync::Arc;
use thiserror::Error;

/// A boot failure is reported to every caller waiting on the same boot
/// attempt, so the underlying error is shared rather than moved.
#[derive(Debug, Clone, Error)]
#[error("sandbox boot failed: {0}")]
pub struct BootError(Arc<anyhow::Error>);

impl BootError {
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    pub fn source_error(&self) -> &anyhow::Error {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("name collision: {0}")]
    NameCollision(String),

    /// The mirror step cannot run. Non-fatal for coordinator operations:
    /// persistence already succeeded when this shows up.
    #[error("sandbox unavailable: {0}")]
    SandboxUnavailable(String),

    /// The durability boundary failed. The triggering operation is rolled
    /// back and the previous tree restored.
    #[error("failed to persist workspace tree")]
    Persistence(#[source] anyhow::Error),

    #[error(transparent)]
    Boot(#[from] BootError),

    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),
}

//! Compensating cleanup for partially completed mounts
//!
//! Each step that leaves state behind registers its inverse. On failure the
//! steps run in reverse order of registration; on success the list is
//! disarmed and nothing runs.

use crate::cache::bind::BindMount;
use crate::error::LayerCacheError;
use crate::storage::{ContainerStore, WorkingContainer};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Inverse of one completed mount step
#[derive(Debug, Clone)]
pub enum RollbackStep {
    /// Remove the external mount directory we created
    RemoveDir(PathBuf),
    /// Delete the working container
    DeleteContainer(WorkingContainer),
    /// Unmount the container's top layer
    UnmountContainer(WorkingContainer),
    /// Detach the bind mount on the external directory
    Unbind(PathBuf),
}

impl RollbackStep {
    fn describe(&self) -> String {
        match self {
            Self::RemoveDir(dir) => format!("remove {}", dir.display()),
            Self::DeleteContainer(c) => format!("delete container {}", c.name),
            Self::UnmountContainer(c) => format!("unmount container {}", c.name),
            Self::Unbind(dir) => format!("unbind {}", dir.display()),
        }
    }
}

#[derive(Debug, Default)]
pub struct Rollback {
    steps: Vec<RollbackStep>,
}

impl Rollback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: RollbackStep) {
        self.steps.push(step);
    }

    #[cfg(test)]
    pub fn steps(&self) -> &[RollbackStep] {
        &self.steps
    }

    /// Forget all steps; the operation succeeded
    pub fn disarm(&mut self) {
        self.steps.clear();
    }

    /// Run every registered step in reverse order.
    ///
    /// Failures are logged and collected; one failing step never stops the
    /// remaining ones.
    pub async fn unwind(
        &mut self,
        store: &dyn ContainerStore,
        mounter: &dyn BindMount,
    ) -> Vec<LayerCacheError> {
        let mut errors = Vec::new();
        while let Some(step) = self.steps.pop() {
            debug!(step = %step.describe(), "rolling back");
            let result = match &step {
                RollbackStep::RemoveDir(dir) => match tokio::fs::remove_dir(dir).await {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(
                        LayerCacheError::io(format!("removing {}", dir.display()), e),
                    ),
                    _ => Ok(()),
                },
                RollbackStep::DeleteContainer(container) => store.delete(container).await,
                RollbackStep::UnmountContainer(container) => store.unmount(container).await,
                RollbackStep::Unbind(dir) => mounter
                    .unbind(dir)
                    .map_err(|e| LayerCacheError::io(format!("unbinding {}", dir.display()), e)),
            };
            if let Err(e) = result {
                warn!(step = %step.describe(), error = %e, "rollback step failed");
                errors.push(LayerCacheError::cleanup(step.describe(), e));
            }
        }
        errors
    }
}

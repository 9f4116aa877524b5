use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// Request-scoped scratch directory.
///
/// The directory is removed exactly once: by [`Workspace::destroy`] or, if
/// the workspace is dropped on an early return, by `Drop`.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    destroyed: bool,
}

impl Workspace {
    /// Create `<root>/archive-processor-<request_id>`.
    ///
    /// Fails if the directory already exists, so two requests can never share
    /// a workspace.
    ///
    /// # Arguments
    ///
    /// * `root` - Parent directory, created if missing
    /// * `request_id` - Single path component naming the workspace
    ///
    /// # Returns
    ///
    /// The new workspace, or `PipelineError::Workspace` if the id is path-like
    /// or the directory cannot be created.
    pub fn create(root: &Path, request_id: &str) -> Result<Self> {
        if request_id.is_empty()
            || request_id == "."
            || request_id == ".."
            || request_id.contains(['/', '\\'])
        {
            return Err(PipelineError::Workspace(format!(
                "invalid request id '{request_id}'"
            )));
        }

        fs::create_dir_all(root).map_err(|e| {
            PipelineError::Workspace(format!("cannot create {}: {e}", root.display()))
        })?;

        let path = root.join(format!("archive-processor-{request_id}"));
        fs::create_dir(&path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => {
                PipelineError::Workspace(format!("{} already exists", path.display()))
            }
            _ => PipelineError::Workspace(format!("cannot create {}: {e}", path.display())),
        })?;

        debug!(path = %path.display(), "Temporary directory created");
        Ok(Self {
            path,
            destroyed: false,
        })
    }

    /// Absolute location of the workspace directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively remove the directory tree.
    pub fn destroy(mut self) -> Result<()> {
        self.destroyed = true;
        remove(&self.path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            if let Err(e) = remove(&self.path) {
                warn!(error = %e, "Failed to clean up workspace");
            }
        }
    }
}

fn remove(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Temporary directory removed");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::Workspace(format!(
            "cannot remove {}: {e}",
            path.display()
        ))),
    }
}

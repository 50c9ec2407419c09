use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::RetrieveError;

pub trait ArchiveClient: Send + Sync {
    /// Extracts `members` of the tape archive `archive` below `destination`,
    /// keeping their internal paths. Members absent from the archive are
    /// simply not extracted.
    fn extract(
        &self,
        archive: &str,
        members: &[String],
        destination: &Path,
    ) -> Result<(), RetrieveError>;
}

#[derive(Debug, Clone)]
pub enum HtarToolStatus {
    Ready,
    Missing { message: String },
}

/// Runs the `htar` client found on `PATH`.
#[derive(Debug, Clone)]
pub struct HtarClient {
    htar: Option<PathBuf>,
}

impl HtarClient {
    pub fn new() -> Self {
        Self {
            htar: find_in_path("htar"),
        }
    }

    pub fn tool_status(&self) -> HtarToolStatus {
        match self.htar {
            Some(_) => HtarToolStatus::Ready,
            None => HtarToolStatus::Missing {
                message: "htar not found on PATH; the hpss data store is only available \
                          on hosts with the HPSS client loaded"
                    .to_string(),
            },
        }
    }

    fn require_htar(&self) -> Result<&PathBuf, RetrieveError> {
        self.htar
            .as_ref()
            .ok_or_else(|| RetrieveError::MissingTool("htar".to_string()))
    }

    fn run_cmd(&self, program: &Path, args: &[String], cwd: &Path) -> Result<(), RetrieveError> {
        tracing::debug!(program = %program.display(), ?args, "running");
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|err| RetrieveError::Archive(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {} ({})", program.display(), output.status)
        } else {
            stderr
        };
        Err(RetrieveError::Archive(message))
    }
}

impl Default for HtarClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveClient for HtarClient {
    fn extract(
        &self,
        archive: &str,
        members: &[String],
        destination: &Path,
    ) -> Result<(), RetrieveError> {
        let htar = self.require_htar()?;
        let mut args = vec!["-xvf".to_string(), archive.to_string()];
        args.extend(members.iter().cloned());
        self.run_cmd(htar, &args, destination)
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

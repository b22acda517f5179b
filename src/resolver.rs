//! Build artifact resolution
//!
//! The orchestrator validates a trigger's commit ref by resolving it to a
//! runnable build artifact before any case is dispatched. Checkout-and-build
//! providers live outside this crate; the reference implementation maps a
//! commit ref to a pre-built executable in a testbed directory.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Raised when a commit ref has no runnable build artifact
///
/// Fatal for the run and never retried: the commit genuinely has nothing to
/// benchmark.
#[derive(Debug, Clone, Error)]
#[error("no build artifact for commit `{commit_ref}`: {reason}")]
pub struct BuildNotFoundError {
    pub commit_ref: String,
    pub reason: String,
}

/// A runnable build of the compiler-under-test
#[derive(Debug, Clone, PartialEq)]
pub struct BuildArtifact {
    pub commit_ref: String,
    pub path: PathBuf,
}

/// Maps a commit ref to a runnable build artifact
pub trait ArtifactResolver: Send + Sync {
    fn resolve(&self, commit_ref: &str) -> Result<BuildArtifact, BuildNotFoundError>;
}

/// Reference resolver: one executable per commit ref in a testbed directory
///
/// An external build provider populates `<root>/<commit_ref>` ahead of the
/// run; resolution only checks that the file is there.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl ArtifactResolver for DirectoryResolver {
    fn resolve(&self, commit_ref: &str) -> Result<BuildArtifact, BuildNotFoundError> {
        let path = self.root.join(commit_ref);
        if !path.is_file() {
            return Err(BuildNotFoundError {
                commit_ref: commit_ref.to_string(),
                reason: format!("`{}` does not exist or is not a file", path.display()),
            });
        }
        Ok(BuildArtifact {
            commit_ref: commit_ref.to_string(),
            path,
        })
    }
}

//! Shared workspace directory exposed as a named-blob store
//!
//! The kernel runs with this directory as its working directory, so a file
//! uploaded here is visible to user code by its bare name, and anything user
//! code writes with a relative path can be downloaded back. No versioning;
//! the last writer wins.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, SandboxError};
use crate::outcome::ExecutionOutcome;

/// A file in the workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBlob {
    pub name: String,
    pub content: Vec<u8>,
}

/// Directory-backed blob store
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open (and create if needed) the workspace at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| SandboxError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `content` under `name`, replacing any existing blob
    pub fn upload(&self, name: &str, content: &[u8]) -> Result<()> {
        let path = self.blob_path(name)?;
        std::fs::write(&path, content).map_err(|e| SandboxError::io(&path, e))?;
        info!(name, bytes = content.len(), "blob uploaded");
        Ok(())
    }

    pub fn download(&self, name: &str) -> Result<NamedBlob> {
        let path = self.blob_path(name)?;
        let content = std::fs::read(&path).map_err(|e| SandboxError::io(&path, e))?;
        Ok(NamedBlob {
            name: name.to_string(),
            content,
        })
    }

    /// Names of all regular files, sorted
    pub fn list_names(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| SandboxError::io(&self.root, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SandboxError::io(&self.root, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Store an image outcome as `image-{uuid}.{ext}` and return the name
    ///
    /// Returns `Ok(None)` for text and error outcomes.
    pub fn save_image(&self, outcome: &ExecutionOutcome) -> Result<Option<String>> {
        let ExecutionOutcome::Image { encoding, .. } = outcome else {
            return Ok(None);
        };
        let bytes = match outcome.image_bytes() {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                return Err(SandboxError::io(
                    &self.root,
                    std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                ))
            }
            None => return Ok(None),
        };
        let name = format!("image-{}.{}", Uuid::now_v7(), encoding.extension());
        self.upload(&name, &bytes)?;
        debug!(name = %name, "image outcome saved");
        Ok(Some(name))
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

/// Blob names are bare file names: no separators, no `.`/`..`
fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(SandboxError::InvalidBlobName(name.to_string()));
    }
    Ok(())
}

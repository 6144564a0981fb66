//! Per-rebuild temp workspace
//!
//! Layout (all under the system temp directory):
//!
//! ```text
//! <temp>/FsbRebuildTool/<sanitized_container>_<offset>_workspace/
//!   source.fsb        raw copy of the chunk bytes
//!   AudioSource/
//!     000/<name>.wav  one folder per sub-sound, zero-padded index
//!     001/...
//!   manifest.json
//!   buildlist.txt     one WAV path per line, encoder input
//! ```
//!
//! The directory name is deterministic in `(source file name, chunk offset)`
//! so reruns reuse the same workspace. It is deleted on success and kept on
//! failure for debugging.

mod extract;
mod manifest;
mod sanitize;

pub use extract::build_workspace;
pub use manifest::{BuildFormat, FsbManifest, SubSoundManifestEntry};
pub use sanitize::sanitize_file_name;

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Root directory name for all workspaces under the system temp dir
pub const WORKSPACE_ROOT: &str = "FsbRebuildTool";

/// Deterministic workspace directory for a `(container, offset)` pair.
#[must_use]
pub fn workspace_dir_for(source: &Path, offset: u64) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "container".to_string());
    std::env::temp_dir()
        .join(WORKSPACE_ROOT)
        .join(format!("{}_{offset}_workspace", sanitize_file_name(&stem)))
}

/// An extraction workspace on disk
#[derive(Debug)]
pub struct Workspace {
    pub dir: PathBuf,
    pub manifest: FsbManifest,
}

impl Workspace {
    /// Re-attach to an existing workspace directory by reading its manifest.
    pub fn open(dir: PathBuf) -> Result<Self> {
        let manifest_path = dir.join("manifest.json");
        if !manifest_path.is_file() {
            return Err(Error::WorkspaceIncomplete(manifest_path));
        }
        let manifest = FsbManifest::load(&manifest_path)?;
        Ok(Self { dir, manifest })
    }

    /// The workspace for `(source, offset)` if one already exists on disk.
    #[must_use]
    pub fn existing_for(source: &Path, offset: u64) -> Option<PathBuf> {
        let dir = workspace_dir_for(source, offset);
        if dir.join("manifest.json").is_file() {
            Some(dir)
        } else {
            None
        }
    }

    #[must_use]
    pub fn source_fsb(&self) -> PathBuf {
        self.dir.join("source.fsb")
    }

    #[must_use]
    pub fn audio_dir(&self) -> PathBuf {
        self.dir.join("AudioSource")
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join("manifest.json")
    }

    #[must_use]
    pub fn buildlist_path(&self) -> PathBuf {
        self.dir.join("buildlist.txt")
    }

    /// Absolute WAV path for a manifest entry
    #[must_use]
    pub fn wav_path(&self, entry: &SubSoundManifestEntry) -> PathBuf {
        self.audio_dir().join(&entry.relative_wav_path)
    }

    /// Delete the workspace directory tree.
    pub fn remove(self) -> Result<()> {
        std::fs::remove_dir_all(&self.dir)
            .map_err(|e| Error::io_at(self.dir.clone(), "workspace cleanup", e))
    }

    /// Rewrite `buildlist.txt` from the manifest (one absolute path per
    /// line, LF-terminated; line count equals sub-sound count).
    pub fn write_buildlist(&self) -> Result<()> {
        let mut contents = String::new();
        for entry in &self.manifest.sub_sounds {
            contents.push_str(&self.wav_path(entry).to_string_lossy());
            contents.push('\n');
        }
        std::fs::write(self.buildlist_path(), contents)?;
        Ok(())
    }
}

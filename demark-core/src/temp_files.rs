//! Temporary artifact management.
//!
//! The pipeline writes its video-only intermediate next to the final output
//! and promotes or deletes it during the remux stage. `TempArtifact` ties the
//! file's lifetime to a scope so failed runs never leave it behind.

use std::path::{Path, PathBuf};

/// Returns a sibling path with a random suffix. Does not create the file.
pub fn sibling_temp_path(target: &Path, tag: &str, extension: &str) -> PathBuf {
    use rand::distributions::Alphanumeric;
    use rand::{thread_rng, Rng};

    let random_suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();

    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let filename = format!(".{stem}.{tag}_{random_suffix}.{extension}");
    target.with_file_name(filename)
}

/// Scope guard for an on-disk intermediate: the file is removed on drop
/// unless ownership is taken with [`TempArtifact::keep`].
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    armed: bool,
}

impl TempArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarms the guard and hands the path to the caller.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        self.path.clone()
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            if let Err(err) = std::fs::remove_file(&self.path) {
                log::warn!(
                    "Failed to remove intermediate {}: {}",
                    self.path.display(),
                    err
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_sibling_temp_path_shape() {
        let path = sibling_temp_path(Path::new("/out/final.mp4"), "video", "mp4");
        assert_eq!(path.parent(), Some(Path::new("/out")));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".final.video_"));
        assert!(name.ends_with(".mp4"));

        let other = sibling_temp_path(Path::new("/out/final.mp4"), "video", "mp4");
        assert_ne!(path, other, "suffixes should not collide");
    }

    #[test]
    fn test_temp_artifact_removes_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scratch.mp4");
        File::create(&path).unwrap();
        {
            let _guard = TempArtifact::new(path.clone());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_artifact_keep_disarms() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scratch.mp4");
        File::create(&path).unwrap();
        let guard = TempArtifact::new(path.clone());
        let kept = guard.keep();
        assert_eq!(kept, path);
        assert!(path.exists());
    }
}

//! Screenshot evidence and per-run output directories

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{HarnessError, HarnessResult};

/// A captured screenshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
    pub path: PathBuf,
    pub sha256: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Taken automatically because something failed
    pub diagnostic: bool,
}

impl Screenshot {
    /// Hash and measure an image file that was just written
    pub fn record(path: &Path, diagnostic: bool) -> HarnessResult<Self> {
        let sha256 = hash_file(path)?;
        let (width, height) = match image::image_dimensions(path) {
            Ok((w, h)) => (Some(w), Some(h)),
            Err(e) => {
                warn!("Could not read dimensions of {}: {}", path.display(), e);
                (None, None)
            }
        };
        debug!(path = %path.display(), %sha256, "Recorded screenshot");
        Ok(Self {
            path: path.to_path_buf(),
            sha256,
            width,
            height,
            diagnostic,
        })
    }
}

/// Hash a file using SHA256
pub fn hash_file(path: &Path) -> HarnessResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

/// Output directory owned by a single run.
///
/// Concurrent runs each get their own directory, so evidence never clobbers.
#[derive(Debug, Clone)]
pub struct EvidenceDir {
    dir: PathBuf,
}

impl EvidenceDir {
    /// Create `<root>/<scenario-slug>-<run id prefix>`
    pub fn create(root: &Path, scenario: &str, run_id: &Uuid) -> HarnessResult<Self> {
        let short = &run_id.simple().to_string()[..8];
        let dir = root.join(format!("{}-{}", slugify(scenario), short));
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Use an existing directory as-is
    pub fn at(dir: impl Into<PathBuf>) -> HarnessResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Place `path` inside the directory.
    ///
    /// Absolute paths and `..` components are rejected: evidence of one run
    /// must not land in another run's directory.
    pub fn resolve(&self, path: &Path) -> HarnessResult<PathBuf> {
        let contained = path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained || path.as_os_str().is_empty() {
            return Err(HarnessError::Config(format!(
                "evidence path {} must be relative to the run directory",
                path.display()
            )));
        }
        Ok(self.dir.join(path))
    }

    pub fn failure_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("failure-{}.png", slugify(label)))
    }

    pub fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> HarnessResult<PathBuf> {
        let path = self.resolve(Path::new(file_name))?;
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

/// Lowercase ASCII alphanumerics, everything else collapsed to single dashes
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "run".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Test results modal"), "test-results-modal");
        assert_eq!(slugify("step 3: click role=button"), "step-3-click-role-button");
        assert_eq!(slugify("///"), "run");
    }

    #[test]
    fn test_distinct_dirs_per_run() {
        let root = tempfile::tempdir().unwrap();
        let a = EvidenceDir::create(root.path(), "auth_flow", &Uuid::new_v4()).unwrap();
        let b = EvidenceDir::create(root.path(), "auth_flow", &Uuid::new_v4()).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(a.path().file_name().unwrap().to_string_lossy().starts_with("auth-flow-"));
    }

    #[test]
    fn test_resolve_stays_inside_run_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = EvidenceDir::at(root.path().join("run")).unwrap();
        assert_eq!(dir.resolve(Path::new("a.png")).unwrap(), root.path().join("run/a.png"));
        assert_eq!(
            dir.resolve(Path::new("dialogs/./first.png")).unwrap(),
            root.path().join("run/dialogs/./first.png")
        );

        let abs = root.path().join("elsewhere.png");
        assert!(matches!(dir.resolve(&abs), Err(HarnessError::Config(_))));
        assert!(dir.resolve(Path::new("../other-run/a.png")).is_err());
        assert!(dir.resolve(Path::new("dialogs/../../a.png")).is_err());
        assert!(dir.resolve(Path::new("")).is_err());
    }

    #[test]
    fn test_write_json() {
        let root = tempfile::tempdir().unwrap();
        let dir = EvidenceDir::at(root.path()).unwrap();
        let path = dir.write_json("result.json", &serde_json::json!({"status": "passed"})).unwrap();
        assert_eq!(path, root.path().join("result.json"));
        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["status"], "passed");
    }

    #[test]
    fn test_record_png() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("shot.png");
        image::RgbImage::new(4, 3).save(&path).unwrap();

        let shot = Screenshot::record(&path, true).unwrap();
        assert_eq!(shot.width, Some(4));
        assert_eq!(shot.height, Some(3));
        assert_eq!(shot.sha256.len(), 64);
        assert!(shot.diagnostic);
    }

    #[test]
    fn test_record_non_image_keeps_hash() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("placeholder.png");
        std::fs::write(&path, "placeholder").unwrap();

        let shot = Screenshot::record(&path, false).unwrap();
        assert_eq!(shot.width, None);
        assert_eq!(shot.height, None);
        assert_eq!(shot.sha256, hash_file(&path).unwrap());
    }
}

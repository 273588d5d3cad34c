use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::manifest::CacheLink;
use crate::error::{Error, Result};
use crate::utils::io::is_empty_dir;

/// What currently occupies a link target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TargetState {
    Vacant,
    /// Replaced when staged; covers links left by an earlier run.
    Symlink,
    EmptyDir,
    /// Never removed: staging fails instead.
    Conflict { occupied_by: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedLink {
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(flatten)]
    pub existing: TargetState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageAction {
    Created,
    Replaced,
}

#[derive(Debug, Clone, Serialize)]
pub struct StagedLink {
    pub source: PathBuf,
    pub target: PathBuf,
    pub action: StageAction,
}

/// Materializes cache links as symbolic links under one pipeline root.
#[derive(Debug, Clone)]
pub struct CacheStager {
    root: PathBuf,
}

impl CacheStager {
    /// Relative roots are resolved against the current directory so link sources are absolute.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Inspect every link target for `node` without modifying anything.
    pub fn plan(&self, node: &str, links: &[CacheLink]) -> Result<Vec<PlannedLink>> {
        links
            .iter()
            .map(|link| {
                let target = link.target_path(&self.root);
                let existing = inspect(&target).map_err(|e| {
                    Error::staging_io(node, target.display().to_string(), e.to_string())
                })?;
                Ok(PlannedLink {
                    source: link.source_path(&self.root),
                    target,
                    existing,
                })
            })
            .collect()
    }

    /// Create the links `node` needs before it runs.
    ///
    /// Every target is checked first, so a conflict anywhere leaves the
    /// filesystem untouched. Re-staging an identical link replaces it with
    /// the same link.
    pub fn stage(&self, node: &str, links: &[CacheLink]) -> Result<Vec<StagedLink>> {
        let plan = self.plan(node, links)?;
        if let Some(conflict) = plan.iter().find_map(|p| match &p.existing {
            TargetState::Conflict { occupied_by } => Some((p, occupied_by)),
            _ => None,
        }) {
            let (planned, occupied_by) = conflict;
            return Err(Error::staging_conflict(
                node,
                planned.target.display().to_string(),
                occupied_by.clone(),
            ));
        }

        plan.into_iter()
            .map(|planned| self.apply(node, planned))
            .collect()
    }

    fn apply(&self, node: &str, planned: PlannedLink) -> Result<StagedLink> {
        let target = planned.target;
        let io_err =
            |e: io::Error| Error::staging_io(node, target.display().to_string(), e.to_string());

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Re-inspect: an earlier link of this node may have claimed the same target.
        let action = match inspect(&target).map_err(io_err)? {
            TargetState::Vacant => StageAction::Created,
            TargetState::Symlink => {
                remove_symlink(&target).map_err(io_err)?;
                StageAction::Replaced
            }
            TargetState::EmptyDir => {
                fs::remove_dir(&target).map_err(io_err)?;
                StageAction::Replaced
            }
            TargetState::Conflict { occupied_by } => {
                return Err(Error::staging_conflict(
                    node,
                    target.display().to_string(),
                    occupied_by,
                ));
            }
        };

        create_symlink(&planned.source, &target).map_err(io_err)?;
        log_status!(
            "stage",
            "{} -> {}",
            target.display(),
            planned.source.display()
        );

        Ok(StagedLink {
            source: planned.source,
            target,
            action,
        })
    }
}

fn inspect(target: &Path) -> io::Result<TargetState> {
    let meta = match fs::symlink_metadata(target) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TargetState::Vacant),
        Err(e) => return Err(e),
    };

    let file_type = meta.file_type();
    if file_type.is_symlink() {
        Ok(TargetState::Symlink)
    } else if file_type.is_dir() {
        if is_empty_dir(target)? {
            Ok(TargetState::EmptyDir)
        } else {
            Ok(TargetState::Conflict {
                occupied_by: "non-empty directory".to_string(),
            })
        }
    } else {
        Ok(TargetState::Conflict {
            occupied_by: "file".to_string(),
        })
    }
}

#[cfg(unix)]
fn create_symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn create_symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(source, target)
}

#[cfg(unix)]
fn remove_symlink(target: &Path) -> io::Result<()> {
    fs::remove_file(target)
}

#[cfg(windows)]
fn remove_symlink(target: &Path) -> io::Result<()> {
    // Directory symlinks need remove_dir on Windows.
    fs::remove_dir(target).or_else(|_| fs::remove_file(target))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn link(sample: &str) -> CacheLink {
        CacheLink {
            source_node: "A".to_string(),
            target_node: "B".to_string(),
            source_cache: "mask".to_string(),
            target_cache: "mask".to_string(),
            sample: sample.to_string(),
        }
    }

    #[test]
    fn creates_parent_directories_and_absolute_link() {
        let root = TempDir::new().unwrap();
        let stager = CacheStager::new(root.path());

        let staged = stager.stage("B", &[link("s1")]).unwrap();

        let target = root.path().join("B/imported/s1/mask");
        assert_eq!(staged[0].action, StageAction::Created);
        assert!(fs::symlink_metadata(&target).unwrap().file_type().is_symlink());
        let pointed = fs::read_link(&target).unwrap();
        assert!(pointed.is_absolute());
        assert_eq!(pointed, stager.root().join("A/exported/s1/mask"));
    }

    #[test]
    fn restaging_is_idempotent() {
        let root = TempDir::new().unwrap();
        let stager = CacheStager::new(root.path());
        fs::create_dir_all(root.path().join("A/exported/s1/mask")).unwrap();

        stager.stage("B", &[link("s1")]).unwrap();
        let first = fs::read_link(root.path().join("B/imported/s1/mask")).unwrap();
        let again = stager.stage("B", &[link("s1")]).unwrap();
        let second = fs::read_link(root.path().join("B/imported/s1/mask")).unwrap();

        assert_eq!(again[0].action, StageAction::Replaced);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_directory_target_is_replaced() {
        let root = TempDir::new().unwrap();
        let target = root.path().join("B/imported/s1/mask");
        fs::create_dir_all(&target).unwrap();

        let staged = CacheStager::new(root.path()).stage("B", &[link("s1")]).unwrap();
        assert_eq!(staged[0].action, StageAction::Replaced);
        assert!(fs::symlink_metadata(&target).unwrap().file_type().is_symlink());
    }

    #[test]
    fn non_empty_directory_is_a_conflict_and_preserved() {
        let root = TempDir::new().unwrap();
        let target = root.path().join("B/imported/s1/mask");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("data.tif"), "pixels").unwrap();

        let err = CacheStager::new(root.path())
            .stage("B", &[link("s1")])
            .unwrap_err();

        assert_eq!(err.code.as_str(), "staging.conflict");
        assert_eq!(err.node(), Some("B"));
        assert_eq!(fs::read_to_string(target.join("data.tif")).unwrap(), "pixels");
    }

    #[test]
    fn regular_file_is_a_conflict() {
        let root = TempDir::new().unwrap();
        let target = root.path().join("B/imported/s1/mask");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, "keep me").unwrap();

        let err = CacheStager::new(root.path())
            .stage("B", &[link("s1")])
            .unwrap_err();

        assert_eq!(err.code.as_str(), "staging.conflict");
        assert_eq!(err.details["occupiedBy"], "file");
        assert_eq!(fs::read_to_string(&target).unwrap(), "keep me");
    }

    #[test]
    fn conflict_on_a_later_link_stages_nothing() {
        let root = TempDir::new().unwrap();
        let blocked = root.path().join("B/imported/s2/mask");
        fs::create_dir_all(&blocked).unwrap();
        fs::write(blocked.join("keep"), "").unwrap();

        let err = CacheStager::new(root.path())
            .stage("B", &[link("s1"), link("s2")])
            .unwrap_err();

        assert_eq!(err.code.as_str(), "staging.conflict");
        assert!(fs::symlink_metadata(root.path().join("B/imported/s1/mask")).is_err());
    }

    #[test]
    fn plan_reports_states_without_touching_disk() {
        let root = TempDir::new().unwrap();
        let occupied = root.path().join("B/imported/s2/mask");
        fs::create_dir_all(&occupied).unwrap();
        fs::write(occupied.join("x"), "").unwrap();

        let plan = CacheStager::new(root.path())
            .plan("B", &[link("s1"), link("s2")])
            .unwrap();

        assert_eq!(plan[0].existing, TargetState::Vacant);
        assert!(matches!(plan[1].existing, TargetState::Conflict { .. }));
        assert!(!root.path().join("B/imported/s1").exists());
    }
}

//! Filesystem artifact store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<project_id>/<stage>/
//!     board.json                         primary document (Artifact)
//!     board.md                           rendering, rewritten with the primary
//!     history/board-v<ver>-<ts>.json     snapshots taken before each revision
//!     CHANGELOG.md                       one line per accepted revision
//! ```
//!
//! A stored primary is only ever replaced through [`ArtifactStore::revise`];
//! `save` refuses to overwrite one. Writes go to a temporary sibling and are
//! renamed into place. Operations on the same locator are serialized by a
//! per-locator async lock.

mod render;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::orchestrator::{GenerationOutcome, Orchestrator, RevisionSeed};
use crate::prompt::Upstream;
use crate::provenance::Artifact;
use crate::validate::{self, Violation};

pub use render::render_markdown;

const PRIMARY_FILE: &str = "board.json";
const RENDER_FILE: &str = "board.md";
const HISTORY_DIR: &str = "history";
const CHANGELOG_FILE: &str = "CHANGELOG.md";

/// Identifies one stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactLocator {
    pub project_id: String,
    pub stage: String,
}

impl ArtifactLocator {
    pub fn new(project_id: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            stage: stage.into(),
        }
    }
}

impl fmt::Display for ArtifactLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.stage)
    }
}

/// Result of [`ArtifactStore::revise`].
#[derive(Debug, Clone)]
pub enum ReviseOutcome {
    /// Nothing is stored at the locator. No files were touched.
    NotFound,
    /// The revision passed and replaced the primary document.
    Revised(Artifact),
    /// The revision ran out of attempts. The stored artifact is unchanged.
    Rejected {
        attempts: u32,
        violations: Vec<Violation>,
        suggestions: Vec<String>,
    },
}

/// Persists validated boards and their revision history.
pub struct ArtifactStore {
    root: PathBuf,
    locks: Mutex<HashMap<ArtifactLocator, Arc<Mutex<()>>>>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the artifact at `locator`.
    pub fn artifact_dir(&self, locator: &ArtifactLocator) -> Result<PathBuf> {
        for (name, part) in [("project_id", &locator.project_id), ("stage", &locator.stage)] {
            if part.is_empty()
                || part == "."
                || part == ".."
                || part.contains(['/', '\\'])
            {
                bail!("invalid {name} {part:?} in artifact locator");
            }
        }
        Ok(self.root.join(&locator.project_id).join(&locator.stage))
    }

    /// Write an artifact as the primary document at its own locator.
    ///
    /// Fails if an artifact is already stored there; use
    /// [`revise`](Self::revise) to change it.
    pub async fn save(&self, artifact: &Artifact) -> Result<ArtifactLocator> {
        let locator = ArtifactLocator::new(
            artifact.metadata.project_id.clone(),
            artifact.metadata.stage_id.clone(),
        );
        let lock = self.lock_for(&locator).await;
        let result = {
            let _guard = lock.lock().await;
            self.save_locked(&locator, artifact).await
        };
        self.release_lock(&locator, lock).await;
        result.map(|()| locator)
    }

    /// Load the primary document. `None` when nothing is stored.
    pub async fn load(&self, locator: &ArtifactLocator) -> Result<Option<Artifact>> {
        let path = self.artifact_dir(locator)?.join(PRIMARY_FILE);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        let artifact = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(artifact))
    }

    /// Revise a stored artifact.
    ///
    /// Snapshots the current version, seeds the generation loop with the
    /// board's outstanding violations plus the revision request, and on
    /// success writes the new version (minor bump) and a changelog line.
    pub async fn revise(
        &self,
        locator: &ArtifactLocator,
        reason: &str,
        upstream: &Upstream,
        orchestrator: &Orchestrator,
    ) -> Result<ReviseOutcome> {
        let lock = self.lock_for(locator).await;
        let result = {
            let _guard = lock.lock().await;
            self.revise_locked(locator, reason, upstream, orchestrator)
                .await
        };
        self.release_lock(locator, lock).await;
        result
    }

    async fn revise_locked(
        &self,
        locator: &ArtifactLocator,
        reason: &str,
        upstream: &Upstream,
        orchestrator: &Orchestrator,
    ) -> Result<ReviseOutcome> {
        let Some(current) = self.load(locator).await? else {
            tracing::info!(locator = %locator, "revise: nothing stored");
            return Ok(ReviseOutcome::NotFound);
        };
        orchestrator.check_upstream(upstream)?;

        self.snapshot(locator, &current).await?;

        let prior = current.board.to_raw();
        let mut violations = validate::validate(&prior, orchestrator.rules());
        violations.push(Violation::RevisionRequested {
            reason: reason.to_string(),
        });
        let seed = RevisionSeed {
            prior,
            violations,
            previous_version: current.metadata.version,
        };

        match orchestrator.run(upstream, Some(seed)).await? {
            GenerationOutcome::Accepted(mut revised) => {
                // Identity follows the stored artifact, not the orchestrator.
                revised.metadata.project_id = locator.project_id.clone();
                revised.metadata.stage_id = locator.stage.clone();
                revised.metadata.stage_name = current.metadata.stage_name.clone();

                self.write_primary(locator, &revised).await?;
                self.append_changelog(locator, &current, &revised, reason)
                    .await?;
                tracing::info!(
                    locator = %locator,
                    from = %current.metadata.version,
                    to = %revised.metadata.version,
                    "artifact revised"
                );
                Ok(ReviseOutcome::Revised(revised))
            }
            GenerationOutcome::Exhausted {
                attempts,
                violations,
                suggestions,
                ..
            } => {
                tracing::warn!(
                    locator = %locator,
                    attempts,
                    violations = violations.len(),
                    "revision rejected; stored artifact unchanged"
                );
                Ok(ReviseOutcome::Rejected {
                    attempts,
                    violations,
                    suggestions,
                })
            }
        }
    }

    /// Snapshot files for `locator`, oldest first.
    pub async fn history(&self, locator: &ArtifactLocator) -> Result<Vec<PathBuf>> {
        let dir = self.artifact_dir(locator)?.join(HISTORY_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to list {}", dir.display()));
            }
        };
        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("failed to list {}", dir.display()))?
        {
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn lock_for(&self, locator: &ArtifactLocator) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(locator.clone()).or_default().clone()
    }

    /// Give back a lock from [`lock_for`](Self::lock_for), dropping the map
    /// entry once nobody else holds or waits on it.
    async fn release_lock(&self, locator: &ArtifactLocator, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(locator);
        }
    }

    async fn save_locked(&self, locator: &ArtifactLocator, artifact: &Artifact) -> Result<()> {
        let primary = self.artifact_dir(locator)?.join(PRIMARY_FILE);
        let exists = tokio::fs::try_exists(&primary)
            .await
            .with_context(|| format!("failed to check {}", primary.display()))?;
        if exists {
            bail!("an artifact is already stored at {locator}; revise it instead");
        }

        self.write_primary(locator, artifact).await?;
        tracing::info!(
            locator = %locator,
            version = %artifact.metadata.version,
            "artifact saved"
        );
        Ok(())
    }

    async fn write_primary(&self, locator: &ArtifactLocator, artifact: &Artifact) -> Result<()> {
        let dir = self.artifact_dir(locator)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let json = serde_json::to_string_pretty(artifact).context("failed to serialize artifact")?;
        write_atomic(&dir.join(PRIMARY_FILE), json.as_bytes()).await?;
        write_atomic(&dir.join(RENDER_FILE), render_markdown(artifact).as_bytes()).await?;
        Ok(())
    }

    async fn snapshot(&self, locator: &ArtifactLocator, artifact: &Artifact) -> Result<()> {
        let dir = self.artifact_dir(locator)?.join(HISTORY_DIR);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let name = format!(
            "board-v{}-{}.json",
            artifact.metadata.version,
            Utc::now().format("%Y%m%dT%H%M%S%6fZ")
        );
        let json = serde_json::to_string_pretty(artifact).context("failed to serialize artifact")?;
        write_atomic(&dir.join(name), json.as_bytes()).await
    }

    async fn append_changelog(
        &self,
        locator: &ArtifactLocator,
        old: &Artifact,
        new: &Artifact,
        reason: &str,
    ) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let path = self.artifact_dir(locator)?.join(CHANGELOG_FILE);
        let line = format!(
            "{} | {} -> {} | {}\n",
            Utc::now().to_rfc3339(),
            old.metadata.version,
            new.metadata.version,
            reason.replace(['\n', '\r'], " ").trim()
        );
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to append to {}", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("failed to flush {}", path.display()))?;
        Ok(())
    }
}

/// Write to `<path>.tmp`, then rename over `path`.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_rejects_path_tricks() {
        let store = ArtifactStore::new("/tmp/store");
        for (project, stage) in [("", "s"), ("p", ""), ("..", "s"), ("a/b", "s"), ("p", "x\\y")] {
            assert!(
                store
                    .artifact_dir(&ArtifactLocator::new(project, stage))
                    .is_err(),
                "{project:?}/{stage:?} should be rejected"
            );
        }
    }

    #[test]
    fn locator_maps_to_project_stage_dir() {
        let store = ArtifactStore::new("/tmp/store");
        let dir = store
            .artifact_dir(&ArtifactLocator::new("lighthouse", "scene_board"))
            .unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/store/lighthouse/scene_board"));
    }

    #[tokio::test]
    async fn load_missing_is_none_and_creates_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let loaded = store
            .load(&ArtifactLocator::new("nobody", "scene_board"))
            .await
            .unwrap();
        assert!(loaded.is_none());
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn write_atomic_replaces_and_leaves_no_temp() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("board.json");
        write_atomic(&path, b"one").await.unwrap();
        write_atomic(&path, b"two").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        assert!(!tmp.path().join("board.json.tmp").exists());
    }

    #[tokio::test]
    async fn lock_entries_are_dropped_after_the_last_holder() {
        let store = ArtifactStore::new("/tmp/store");
        let locator = ArtifactLocator::new("p", "s");

        let first = store.lock_for(&locator).await;
        let second = store.lock_for(&locator).await;
        assert!(Arc::ptr_eq(&first, &second));

        store.release_lock(&locator, first).await;
        assert!(store.locks.lock().await.contains_key(&locator));

        store.release_lock(&locator, second).await;
        assert!(store.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn history_of_unknown_locator_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let history = store
            .history(&ArtifactLocator::new("p", "s"))
            .await
            .unwrap();
        assert!(history.is_empty());
    }
}

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use log::{debug, info, warn};

const CLIPS: &str = "clips";
const THUMBNAILS: &str = "thumbnails";
const CROPS: &str = "crops";

/// Where each stage of one candidate's pipeline reads and writes during one
/// cycle. Overlapping cycles never share a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub clip: PathBuf,
    pub frame: PathBuf,
    pub crop: PathBuf,
}

impl ArtifactPaths {
    pub fn for_candidate(root: &Path, id: &str, cycle: u64) -> Self {
        // '.' never survives sanitizing, so the cycle suffix cannot collide with an id.
        let stem = format!("{}.{}", file_stem(id), cycle);
        ArtifactPaths {
            clip: root.join(CLIPS).join(format!("{}.mp4", stem)),
            frame: root.join(THUMBNAILS).join(format!("{}.png", stem)),
            crop: root.join(CROPS).join(format!("{}.png", stem)),
        }
    }
}

/// Stream ids come from upstream; keep them from naming anything outside
/// their own directory.
fn file_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "_".to_string()
    } else {
        stem
    }
}

/// Create the clip, thumbnail and crop directories under `root`.
pub fn ensure_dirs(root: &Path) -> Result<()> {
    for dir in [CLIPS, THUMBNAILS, CROPS] {
        let path = root.join(dir);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
    }
    Ok(())
}

/// Delete artifacts last modified more than `max_age` ago. Returns how many
/// files were removed.
///
/// Pipelines cut off by a cycle deadline never clean up after themselves;
/// this is what keeps their leftovers from piling up.
pub async fn sweep(root: &Path, max_age: Duration) -> usize {
    let now = SystemTime::now();
    let mut removed = 0;

    for dir in [CLIPS, THUMBNAILS, CROPS] {
        let dir = root.join(dir);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Cannot sweep {}: {}", dir.display(), err);
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!("Error reading {}: {}", dir.display(), err);
                    break;
                }
            };
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.map_or(false, |age| age > max_age) {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => {
                        debug!("Swept {}", entry.path().display());
                        removed += 1;
                    }
                    Err(err) => warn!("Could not sweep {}: {}", entry.path().display(), err),
                }
            }
        }
    }

    if removed > 0 {
        info!("Swept {} stale artifacts", removed);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_namespaced_by_candidate() {
        let paths = ArtifactPaths::for_candidate(Path::new("streams"), "alice", 3);
        assert_eq!(paths.clip, Path::new("streams/clips/alice.3.mp4"));
        assert_eq!(paths.frame, Path::new("streams/thumbnails/alice.3.png"));
        assert_eq!(paths.crop, Path::new("streams/crops/alice.3.png"));
        assert_ne!(paths, ArtifactPaths::for_candidate(Path::new("streams"), "bob", 3));
    }

    #[test]
    fn overlapping_cycles_get_separate_files() {
        let first = ArtifactPaths::for_candidate(Path::new("streams"), "alice", 1);
        let second = ArtifactPaths::for_candidate(Path::new("streams"), "alice", 2);
        assert_ne!(first.clip, second.clip);
        assert_ne!(first.frame, second.frame);
        assert_ne!(first.crop, second.crop);
    }

    #[test]
    fn hostile_ids_stay_inside_their_directory() {
        let paths = ArtifactPaths::for_candidate(Path::new("streams"), "../../etc/passwd", 1);
        assert_eq!(paths.clip, Path::new("streams/clips/______etc_passwd.1.mp4"));
        let empty = ArtifactPaths::for_candidate(Path::new("streams"), "", 1);
        assert_eq!(empty.frame, Path::new("streams/thumbnails/_.1.png"));
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        ensure_dirs(root.path()).unwrap();
        ensure_dirs(root.path()).unwrap();
        assert!(root.path().join("clips").is_dir());
        assert!(root.path().join("thumbnails").is_dir());
        assert!(root.path().join("crops").is_dir());
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_files() {
        let root = tempfile::tempdir().unwrap();
        ensure_dirs(root.path()).unwrap();
        let clip = root.path().join("clips/alice.mp4");
        std::fs::write(&clip, b"x").unwrap();

        assert_eq!(sweep(root.path(), Duration::from_secs(3600)).await, 0);
        assert!(clip.exists());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sweep(root.path(), Duration::from_millis(1)).await, 1);
        assert!(!clip.exists());
    }

    #[tokio::test]
    async fn sweep_tolerates_missing_dirs() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(sweep(&root.path().join("absent"), Duration::ZERO).await, 0);
    }
}

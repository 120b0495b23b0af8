//! Filesystem persistence of received detections.
//!
//! Each detection produces two artifacts under the output root:
//!
//! - `telemetry/{id}`: JSON `{time, lat, lon, alt, yaw, pitch, roll, speed}`
//! - `imagery/{id}.{ext}`: the raw image bytes
//!
//! Writes land in a hidden sibling file first and are renamed into place, so
//! readers never observe a truncated artifact and storing the same id again
//! replaces the previous files.

use std::{
    io,
    path::{Path, PathBuf},
    process,
    sync::atomic::{AtomicU64, Ordering},
};

use log::debug;
use thiserror::Error;
use tokio::fs;

use crate::detection::Detection;

/// Directory under the output root holding telemetry records.
pub const TELEMETRY_DIR: &str = "telemetry";
/// Directory under the output root holding images.
pub const IMAGERY_DIR: &str = "imagery";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors raised while persisting a detection.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The detection id cannot be used as a file name.
    #[error("detection id {0:?} is not a valid file name")]
    InvalidId(String),
    /// An artifact directory could not be created.
    #[error("failed to create directory {path:?}: {source}")]
    CreateDir {
        /// Directory being created.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// An artifact could not be written.
    #[error("failed to write {path:?}: {source}")]
    Write {
        /// Artifact being written.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The telemetry record could not be serialized.
    #[error("failed to encode telemetry record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Paths of the files written for one detection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// Telemetry record path.
    pub telemetry: PathBuf,
    /// Image path.
    pub image: PathBuf,
}

/// Writes artifacts below a fixed output root.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`. Nothing is touched on disk until the
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    /// Output root.
    #[must_use]
    pub fn root(&self) -> &Path { &self.root }

    /// Path of the telemetry record for `id`.
    #[must_use]
    pub fn telemetry_path(&self, id: &str) -> PathBuf { self.root.join(TELEMETRY_DIR).join(id) }

    /// Path of the image for `id` with extension `ext`.
    #[must_use]
    pub fn image_path(&self, id: &str, ext: &str) -> PathBuf {
        self.root.join(IMAGERY_DIR).join(format!("{id}.{ext}"))
    }

    /// Create the artifact directories if they are missing.
    ///
    /// Safe to call concurrently from many sessions.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::CreateDir`] if a directory cannot be
    /// created.
    pub async fn prepare(&self) -> Result<(), PersistenceError> {
        for dir in [TELEMETRY_DIR, IMAGERY_DIR] {
            let path = self.root.join(dir);
            fs::create_dir_all(&path)
                .await
                .map_err(|source| PersistenceError::CreateDir { path, source })?;
        }
        Ok(())
    }

    /// Persist the telemetry record and image of `detection`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::InvalidId`] if the id is not a plain file
    /// name, and a directory, encoding or write error if the filesystem
    /// rejects the artifacts.
    pub async fn store(&self, detection: &Detection) -> Result<Artifact, PersistenceError> {
        let id = detection.id.as_str();
        if !is_plain_file_name(id) {
            return Err(PersistenceError::InvalidId(id.to_owned()));
        }
        self.prepare().await?;

        let record = serde_json::to_vec(&detection.telemetry)?;
        let telemetry = self.telemetry_path(id);
        replace_file(&telemetry, &record).await?;

        let image = self.image_path(id, detection.image.extension());
        replace_file(&image, detection.image.bytes()).await?;

        debug!("artifact stored: id={id}, telemetry={telemetry:?}, image={image:?}");
        Ok(Artifact { telemetry, image })
    }
}

fn is_plain_file_name(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.starts_with('.')
        && !id.contains(['/', '\\', '\0'])
}

async fn replace_file(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let write_error = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };
    let temp = temp_sibling(path);
    if let Err(source) = fs::write(&temp, contents).await {
        let _ = fs::remove_file(&temp).await;
        return Err(write_error(source));
    }
    if let Err(source) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(write_error(source));
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{unique}.tmp", process::id()))
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;
    use crate::detection::{Image, Telemetry};

    #[fixture]
    fn root() -> TempDir { TempDir::new().expect("create temp dir") }

    fn detection(id: &str, image: &[u8]) -> Detection {
        let telemetry = Telemetry {
            captured_at: 42,
            latitude: 34.05,
            longitude: -118.25,
            altitude: 100.0,
            yaw: 1.0,
            pitch: 2.0,
            roll: 3.0,
            speed: 4.0,
        };
        Detection::new(id, telemetry, 90.0, Image::new(image.to_vec(), "jpg").expect("image"))
    }

    #[rstest]
    #[tokio::test]
    async fn writes_telemetry_projection_and_image(root: TempDir) {
        let store = ArtifactStore::new(root.path());
        let artifact = store
            .store(&detection("a1", b"jpeg-bytes"))
            .await
            .expect("store");

        assert_eq!(artifact.telemetry, root.path().join("telemetry/a1"));
        assert_eq!(artifact.image, root.path().join("imagery/a1.jpg"));
        let record = std::fs::read_to_string(&artifact.telemetry).expect("read telemetry");
        assert_eq!(
            record,
            r#"{"time":42,"lat":34.05,"lon":-118.25,"alt":100.0,"yaw":1.0,"pitch":2.0,"roll":3.0,"speed":4.0}"#
        );
        assert_eq!(
            std::fs::read(&artifact.image).expect("read image"),
            b"jpeg-bytes"
        );
    }

    #[rstest]
    #[tokio::test]
    async fn storing_same_id_overwrites(root: TempDir) {
        let store = ArtifactStore::new(root.path());
        store.store(&detection("a1", b"first")).await.expect("store");
        store.store(&detection("a1", b"second")).await.expect("store");

        let images: Vec<_> = std::fs::read_dir(root.path().join(IMAGERY_DIR))
            .expect("list imagery")
            .collect();
        assert_eq!(images.len(), 1);
        assert_eq!(
            std::fs::read(store.image_path("a1", "jpg")).expect("read image"),
            b"second"
        );
    }

    #[rstest]
    #[case("")]
    #[case("..")]
    #[case("../escape")]
    #[case("nested/id")]
    #[case(".hidden")]
    #[tokio::test]
    async fn unsafe_ids_are_rejected(root: TempDir, #[case] id: &str) {
        let store = ArtifactStore::new(root.path());
        let err = store
            .store(&detection(id, b"x"))
            .await
            .expect_err("unsafe id must be rejected");
        assert!(matches!(err, PersistenceError::InvalidId(_)));
        assert!(!root.path().join(TELEMETRY_DIR).exists());
    }

    #[rstest]
    #[tokio::test]
    async fn concurrent_prepare_is_idempotent(root: TempDir) {
        let store = ArtifactStore::new(root.path().join("nested/out"));
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.prepare().await })
            })
            .collect();
        for task in tasks {
            task.await.expect("join").expect("prepare");
        }
        assert!(store.root().join(IMAGERY_DIR).is_dir());
    }

    #[rstest]
    #[tokio::test]
    async fn unwritable_root_reports_create_dir(root: TempDir) {
        let blocker = root.path().join("file");
        std::fs::write(&blocker, b"").expect("create blocker");
        let store = ArtifactStore::new(&blocker);
        let err = store
            .store(&detection("a1", b"x"))
            .await
            .expect_err("root is a file");
        assert!(matches!(err, PersistenceError::CreateDir { .. }));
    }
}

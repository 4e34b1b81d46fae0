// Generated images and their JSON sidecars

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::error::JobError;
use crate::models::{Artifact, ArtifactDetails, ArtifactMetadata};

/// Extensions picked up when scanning the output directory.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

const UNKNOWN: &str = "Unknown";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Append-only store of generated images.
///
/// Each image `img_<timestamp>.<ext>` has a sidecar `img_<timestamp>.json`
/// holding its [`ArtifactMetadata`].
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn sidecar_path(image_path: &Path) -> PathBuf {
        image_path.with_extension("json")
    }

    /// All artifacts currently on disk, newest first.
    ///
    /// Images without a readable sidecar are still listed, with placeholder
    /// metadata. A missing output directory is an empty gallery.
    pub fn enumerate(&self) -> Vec<Artifact> {
        let entries = match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {e}", self.output_dir.display());
                }
                return Vec::new();
            }
        };

        let mut images: Vec<(PathBuf, SystemTime)> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_image(path))
            .map(|path| {
                let modified = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (path, modified)
            })
            .collect();

        images.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

        images
            .into_iter()
            .map(|(path, modified)| Self::load_artifact(path, modified))
            .collect()
    }

    fn load_artifact(path: PathBuf, modified: SystemTime) -> Artifact {
        let sidecar = Self::sidecar_path(&path);
        let fields = match fs::read_to_string(&sidecar) {
            Ok(contents) => match serde_json::from_str::<SidecarFields>(&contents) {
                Ok(fields) => Some(fields),
                Err(e) => {
                    warn!("Error reading JSON for {}: {e}", path.display());
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Error reading JSON for {}: {e}", path.display());
                None
            }
        };

        let mut metadata = placeholder_metadata(&path, modified);
        if let Some(fields) = fields {
            merge_sidecar(&mut metadata, &fields);
        }
        Artifact { path, metadata }
    }

    /// Persist a freshly generated image and its sidecar, stamped with the
    /// current local time.
    pub fn save(
        &self,
        bytes: &[u8],
        extension: &str,
        details: &ArtifactDetails,
    ) -> Result<Artifact, JobError> {
        self.save_at(bytes, extension, details, Local::now())
    }

    /// Same as [`ArtifactStore::save`] with an explicit timestamp.
    ///
    /// Names are second-resolution; a name already in use gets a `_<n>`
    /// suffix instead of being overwritten. The image is written before the
    /// sidecar, and a failed sidecar write is not rolled back.
    pub fn save_at(
        &self,
        bytes: &[u8],
        extension: &str,
        details: &ArtifactDetails,
        at: DateTime<Local>,
    ) -> Result<Artifact, JobError> {
        let timestamp = at.format(TIMESTAMP_FORMAT).to_string();
        let (path, mut file) = self.create_image_file(&timestamp, extension)?;

        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| JobError::io(format!("Failed to write {}", path.display()), e))?;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let metadata = ArtifactMetadata {
            filename,
            file_path: path.to_string_lossy().into_owned(),
            prompt: details.prompt.clone(),
            model: details.model.clone(),
            resolution: details.resolution.clone(),
            timestamp,
        };

        let sidecar = Self::sidecar_path(&path);
        let contents = serde_json::to_string_pretty(&metadata)
            .map_err(|e| JobError::io("Failed to serialize metadata", io::Error::other(e)))?;
        fs::write(&sidecar, contents)
            .map_err(|e| JobError::io(format!("Failed to write {}", sidecar.display()), e))?;

        debug!(path = %path.display(), "saved artifact");
        Ok(Artifact { path, metadata })
    }

    fn create_image_file(
        &self,
        timestamp: &str,
        extension: &str,
    ) -> Result<(PathBuf, fs::File), JobError> {
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| JobError::io("Failed to create output directory", e))?;
        let dir = std::path::absolute(&self.output_dir)
            .map_err(|e| JobError::io("Failed to resolve output directory", e))?;

        let mut attempt: u32 = 0;
        loop {
            let stem = if attempt == 0 {
                format!("img_{timestamp}")
            } else {
                format!("img_{timestamp}_{attempt}")
            };
            attempt += 1;

            if stem_taken(&dir, &stem) {
                continue;
            }

            let path = dir.join(format!("{stem}.{extension}"));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(JobError::io(
                        format!("Failed to create {}", path.display()),
                        e,
                    ))
                }
            }
        }
    }
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
}

/// A stem is taken if any image or the sidecar already uses it.
fn stem_taken(dir: &Path, stem: &str) -> bool {
    dir.join(format!("{stem}.json")).exists()
        || IMAGE_EXTENSIONS
            .iter()
            .any(|ext| dir.join(format!("{stem}.{ext}")).exists())
}

type SidecarFields = serde_json::Map<String, serde_json::Value>;

/// Overlay every string field the sidecar does have; absent or non-string
/// fields keep their placeholder.
fn merge_sidecar(metadata: &mut ArtifactMetadata, fields: &SidecarFields) {
    let slots = [
        ("filename", &mut metadata.filename),
        ("file_path", &mut metadata.file_path),
        ("prompt", &mut metadata.prompt),
        ("model", &mut metadata.model),
        ("resolution", &mut metadata.resolution),
        ("timestamp", &mut metadata.timestamp),
    ];
    for (key, slot) in slots {
        if let Some(value) = fields.get(key).and_then(serde_json::Value::as_str) {
            value.clone_into(slot);
        }
    }
}

fn placeholder_metadata(path: &Path, modified: SystemTime) -> ArtifactMetadata {
    ArtifactMetadata {
        filename: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_path: path.to_string_lossy().into_owned(),
        prompt: UNKNOWN.to_string(),
        model: UNKNOWN.to_string(),
        resolution: UNKNOWN.to_string(),
        timestamp: DateTime::<Local>::from(modified)
            .format(TIMESTAMP_FORMAT)
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup_test_store() -> (TempDir, ArtifactStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path().join("images"));
        (temp_dir, store)
    }

    fn fox() -> ArtifactDetails {
        ArtifactDetails {
            prompt: "a red fox".to_string(),
            model: "Qwen/Qwen-Image".to_string(),
            resolution: "1024x1024".to_string(),
        }
    }

    fn at(secs: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 14, 9, 26, secs).unwrap()
    }

    fn set_mtime(path: &Path, offset_secs: u64) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + offset_secs))
            .unwrap();
    }

    #[test]
    fn test_enumerate_missing_dir_is_empty() {
        let (_temp, store) = setup_test_store();
        assert!(store.enumerate().is_empty());
    }

    #[test]
    fn test_save_writes_image_and_sidecar() {
        let (_temp, store) = setup_test_store();
        let artifact = store.save_at(b"jpeg-bytes", "jpg", &fox(), at(5)).unwrap();

        assert_eq!(artifact.metadata.filename, "img_20250314_092605.jpg");
        assert_eq!(artifact.metadata.timestamp, "20250314_092605");
        assert!(artifact.path.is_absolute());
        assert_eq!(fs::read(&artifact.path).unwrap(), b"jpeg-bytes");

        let sidecar = ArtifactStore::sidecar_path(&artifact.path);
        let on_disk: ArtifactMetadata =
            serde_json::from_str(&fs::read_to_string(sidecar).unwrap()).unwrap();
        assert_eq!(on_disk, artifact.metadata);
        assert_eq!(on_disk.file_path, artifact.path.to_string_lossy());
    }

    #[test]
    fn test_save_then_enumerate_round_trip() {
        let (_temp, store) = setup_test_store();
        let saved = store.save(b"png-bytes", "png", &fox()).unwrap();

        let listed = store.enumerate();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], saved);
        assert_eq!(listed[0].metadata.prompt, "a red fox");
        assert_eq!(listed[0].metadata.model, "Qwen/Qwen-Image");
        assert_eq!(listed[0].metadata.resolution, "1024x1024");
    }

    #[test]
    fn test_same_second_saves_do_not_overwrite() {
        let (_temp, store) = setup_test_store();
        let first = store.save_at(b"one", "jpg", &fox(), at(7)).unwrap();
        let second = store.save_at(b"two", "jpg", &fox(), at(7)).unwrap();
        let third = store.save_at(b"three", "png", &fox(), at(7)).unwrap();

        assert_eq!(first.metadata.filename, "img_20250314_092607.jpg");
        assert_eq!(second.metadata.filename, "img_20250314_092607_1.jpg");
        assert_eq!(third.metadata.filename, "img_20250314_092607_2.png");
        assert_eq!(fs::read(&first.path).unwrap(), b"one");
        assert_eq!(fs::read(&second.path).unwrap(), b"two");
        assert_eq!(store.enumerate().len(), 3);
    }

    #[test]
    fn test_enumerate_orders_newest_first() {
        let (_temp, store) = setup_test_store();
        let old = store.save_at(b"old", "jpg", &fox(), at(1)).unwrap();
        let new = store.save_at(b"new", "jpg", &fox(), at(2)).unwrap();
        let middle = store.save_at(b"mid", "png", &fox(), at(3)).unwrap();
        set_mtime(&old.path, 0);
        set_mtime(&middle.path, 50);
        set_mtime(&new.path, 100);

        let names: Vec<String> = store
            .enumerate()
            .into_iter()
            .map(|a| a.metadata.filename)
            .collect();
        assert_eq!(
            names,
            vec![
                new.metadata.filename,
                middle.metadata.filename,
                old.metadata.filename
            ]
        );
    }

    #[test]
    fn test_missing_sidecar_uses_placeholders() {
        let (_temp, store) = setup_test_store();
        fs::create_dir_all(store.output_dir()).unwrap();
        let orphan = store.output_dir().join("orphan.PNG");
        fs::write(&orphan, b"bytes").unwrap();

        let listed = store.enumerate();
        assert_eq!(listed.len(), 1);
        let meta = &listed[0].metadata;
        assert_eq!(meta.filename, "orphan.PNG");
        assert_eq!(meta.prompt, "Unknown");
        assert_eq!(meta.model, "Unknown");
        assert_eq!(meta.resolution, "Unknown");
        assert_eq!(meta.timestamp.len(), "20250314_092605".len());
    }

    #[test]
    fn test_corrupt_sidecar_uses_placeholders() {
        let (_temp, store) = setup_test_store();
        let artifact = store.save(b"bytes", "jpg", &fox()).unwrap();
        fs::write(ArtifactStore::sidecar_path(&artifact.path), "{oops").unwrap();

        let listed = store.enumerate();
        assert_eq!(listed[0].metadata.prompt, "Unknown");
        assert_eq!(listed[0].path, artifact.path);
    }

    #[test]
    fn test_partial_sidecar_keeps_present_fields() {
        let (_temp, store) = setup_test_store();
        let artifact = store.save_at(b"bytes", "jpg", &fox(), at(9)).unwrap();
        set_mtime(&artifact.path, 0);
        fs::write(
            ArtifactStore::sidecar_path(&artifact.path),
            r#"{"prompt": "a red fox", "model": 42}"#,
        )
        .unwrap();

        let listed = store.enumerate();
        let meta = &listed[0].metadata;
        assert_eq!(meta.prompt, "a red fox");
        assert_eq!(meta.model, "Unknown");
        assert_eq!(meta.resolution, "Unknown");
        assert_eq!(meta.filename, "img_20250314_092609.jpg");
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let expected = DateTime::<Local>::from(mtime)
            .format(TIMESTAMP_FORMAT)
            .to_string();
        assert_eq!(meta.timestamp, expected);
    }

    #[test]
    fn test_enumerate_ignores_other_files() {
        let (_temp, store) = setup_test_store();
        fs::create_dir_all(store.output_dir().join("nested.png")).unwrap();
        fs::write(store.output_dir().join("notes.txt"), "hi").unwrap();
        fs::write(store.output_dir().join("lonely.json"), "{}").unwrap();
        fs::write(store.output_dir().join("kept.jpeg"), "img").unwrap();

        let listed = store.enumerate();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].metadata.filename, "kept.jpeg");
    }

    #[test]
    fn test_save_into_unwritable_location_fails_with_io() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        fs::write(&blocker, "not a dir").unwrap();
        let store = ArtifactStore::new(blocker.join("images"));

        let err = store.save(b"bytes", "jpg", &fox()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }
}

use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

use chrono::Local;
use serde_json::json;
use tactica_logging::LogLevel;
use thiserror::Error;

use crate::{
    artifact::{ModelArtifact, SCHEMA_VERSION},
    telemetry::{self, EngineTelemetry},
};

/// Suffix of the copy kept while a save is in flight.
pub const BACKUP_SUFFIX: &str = ".backup";
/// Suffix given to artifacts that failed to load.
pub const QUARANTINE_SUFFIX: &str = ".corrupto";

/// Errors emitted by [`ModelStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Nothing has been saved at the store path.
    #[error("no model artifact at {}", path.display())]
    NotFound {
        /// Store path.
        path: PathBuf,
    },
    /// The stored file is unreadable and was moved aside.
    #[error("model artifact at {} is unreadable: {reason}", path.display())]
    Corrupted {
        /// Store path.
        path: PathBuf,
        /// Where the bad file now lives, if the move succeeded.
        quarantined: Option<PathBuf>,
        /// Read or parse failure.
        reason: String,
    },
    /// A save or reset did not complete; the previous artifact is still in place.
    #[error("could not write model artifact at {}: {reason}", path.display())]
    WriteFailed {
        /// Store path.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },
}

/// JSON file holding the current artifact.
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
    telemetry: Option<EngineTelemetry>,
}

impl ModelStore {
    /// Store rooted at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: EngineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Artifact path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the in-flight backup.
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.path, BACKUP_SUFFIX)
    }

    /// Path unreadable artifacts are moved to.
    #[must_use]
    pub fn quarantine_path(&self) -> PathBuf {
        with_suffix(&self.path, QUARANTINE_SUFFIX)
    }

    /// True when an artifact file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Writes `artifact`. The previous file is kept as a backup during the write and
    /// restored if the write fails.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<(), StoreError> {
        self.replace_with(|path| {
            let data = serde_json::to_vec_pretty(artifact)?;
            fs::write(path, data)
        })?;
        self.log(
            LogLevel::Info,
            "artifact_saved",
            json!({
                "path": self.path.display().to_string(),
                "artifact_id": artifact.id.to_string(),
            }),
        );
        Ok(())
    }

    /// Reads the artifact. Unreadable or incomplete files are renamed with
    /// [`QUARANTINE_SUFFIX`]; a schema version mismatch is only logged.
    pub fn load(&self) -> Result<ModelArtifact, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::NotFound {
                path: self.path.clone(),
            });
        }
        let parsed = fs::read(&self.path)
            .map_err(|err| err.to_string())
            .and_then(|data| {
                serde_json::from_slice::<ModelArtifact>(&data).map_err(|err| err.to_string())
            })
            .and_then(|artifact| {
                if artifact.is_trained() {
                    Ok(artifact)
                } else {
                    Err("artifact is missing encoders or classifier".to_owned())
                }
            });
        match parsed {
            Ok(artifact) => {
                if artifact.schema_version != SCHEMA_VERSION {
                    self.log(
                        LogLevel::Warn,
                        "schema_version_mismatch",
                        json!({ "stored": artifact.schema_version, "current": SCHEMA_VERSION }),
                    );
                }
                self.log(
                    LogLevel::Info,
                    "artifact_loaded",
                    json!({ "artifact_id": artifact.id.to_string() }),
                );
                Ok(artifact)
            }
            Err(reason) => Err(self.quarantine(reason)),
        }
    }

    /// Moves the current artifact to a timestamped backup. Returns the backup path,
    /// or `None` when nothing was stored.
    pub fn reset(&self) -> Result<Option<PathBuf>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let target = with_suffix(&self.path, &format!("{BACKUP_SUFFIX}_{stamp}"));
        fs::rename(&self.path, &target).map_err(|err| self.write_failed(&err))?;
        self.log(
            LogLevel::Info,
            "artifact_reset",
            json!({ "backup": target.display().to_string() }),
        );
        Ok(Some(target))
    }

    /// Moves the current file to the backup path, runs `write`, and on failure puts
    /// the backup back.
    fn replace_with<F>(&self, write: F) -> Result<(), StoreError>
    where
        F: FnOnce(&Path) -> io::Result<()>,
    {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.write_failed(&err))?;
        }
        let backup = self.backup_path();
        let had_previous = self.path.exists();
        if had_previous {
            if backup.exists() {
                fs::remove_file(&backup).map_err(|err| self.write_failed(&err))?;
            }
            fs::rename(&self.path, &backup).map_err(|err| self.write_failed(&err))?;
        }
        let Err(err) = write(&self.path) else {
            return Ok(());
        };
        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
        if had_previous {
            if let Err(restore) = fs::rename(&backup, &self.path) {
                self.log(
                    LogLevel::Error,
                    "backup_restore_failed",
                    json!({
                        "backup": backup.display().to_string(),
                        "error": restore.to_string(),
                    }),
                );
            }
        }
        self.log(
            LogLevel::Error,
            "artifact_save_failed",
            json!({ "path": self.path.display().to_string(), "error": err.to_string() }),
        );
        Err(self.write_failed(&err))
    }

    fn quarantine(&self, reason: String) -> StoreError {
        let target = self.quarantine_path();
        let quarantined = match fs::rename(&self.path, &target) {
            Ok(()) => Some(target),
            Err(err) => {
                self.log(
                    LogLevel::Error,
                    "quarantine_failed",
                    json!({ "error": err.to_string() }),
                );
                None
            }
        };
        self.log(
            LogLevel::Error,
            "artifact_corrupted",
            json!({
                "path": self.path.display().to_string(),
                "quarantined": quarantined.as_ref().map(|p| p.display().to_string()),
                "reason": reason,
            }),
        );
        StoreError::Corrupted {
            path: self.path.clone(),
            quarantined,
            reason,
        }
    }

    fn write_failed(&self, err: &io::Error) -> StoreError {
        StoreError::WriteFailed {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        telemetry::log(self.telemetry.as_ref(), level, message, metadata);
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        records::PlanningRecord,
        training::{TrainingConfig, TrainingEngine},
    };
    use tempfile::tempdir;

    fn artifact() -> ModelArtifact {
        let mut records = Vec::new();
        for category in ["Cadete", "Juvenil", "Infantil"] {
            for block in ["Inicial", "Final"] {
                for weekday in ["Lunes", "Miercoles"] {
                    records.push(PlanningRecord::new(category, block, weekday, "Amplitud"));
                    if block == "Final" {
                        records.push(PlanningRecord::new(category, block, weekday, "Repliegue"));
                    }
                }
            }
        }
        TrainingEngine::new(TrainingConfig::default())
            .train(&records)
            .unwrap()
    }

    #[test]
    fn save_then_load_preserves_artifact() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("models/predictor.json"));
        let original = artifact();
        store.save(&original).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.id, original.id);
        assert_eq!(loaded.label_encoder, original.label_encoder);
        assert_eq!(loaded.feature_pipeline, original.feature_pipeline);
        assert_eq!(loaded.training_stats.example_count, 12);
        assert!(!store.backup_path().exists());
    }

    #[test]
    fn each_save_keeps_the_prior_artifact_as_backup() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("predictor.json"));
        let first = artifact();
        let mut second = first.clone();
        second.id = uuid::Uuid::new_v4();
        let mut third = first.clone();
        third.id = uuid::Uuid::new_v4();

        store.save(&first).unwrap();
        store.save(&second).unwrap();
        fs::write(store.backup_path(), b"stale").unwrap();
        store.save(&third).unwrap();

        assert_eq!(store.load().unwrap().id, third.id);
        let backup: ModelArtifact =
            serde_json::from_slice(&fs::read(store.backup_path()).unwrap()).unwrap();
        assert_eq!(backup.id, second.id);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.load(), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn corrupted_file_is_quarantined() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("predictor.json");
        fs::write(&path, b"{ not json").unwrap();
        let store = ModelStore::new(&path);
        match store.load() {
            Err(StoreError::Corrupted { quarantined, .. }) => {
                assert_eq!(quarantined, Some(store.quarantine_path()));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!path.exists());
        assert!(store.quarantine_path().exists());
        assert!(matches!(store.load(), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn incomplete_artifact_is_quarantined() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("predictor.json"));
        let mut broken = artifact();
        broken.classifier = crate::forest::MultiLabelForest::default();
        store.save(&broken).unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupted { .. })));
    }

    #[test]
    fn failed_write_restores_previous_artifact() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("predictor.json"));
        let original = artifact();
        store.save(&original).unwrap();
        let before = fs::read(store.path()).unwrap();

        let result = store.replace_with(|path| {
            fs::write(path, b"partial")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });
        assert!(matches!(result, Err(StoreError::WriteFailed { .. })));
        assert_eq!(fs::read(store.path()).unwrap(), before);
        assert_eq!(store.load().unwrap().id, original.id);
    }

    #[test]
    fn schema_mismatch_still_loads_and_warns() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("engine.log");
        let telemetry = EngineTelemetry::builder("tactica.store")
            .log_path(&log_path)
            .build()
            .unwrap();
        let store = ModelStore::new(dir.path().join("predictor.json")).with_telemetry(telemetry);
        let mut old = artifact();
        old.schema_version = 1;
        store.save(&old).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.schema_version, 1);
        let log = fs::read_to_string(&log_path).unwrap();
        assert!(log.contains("schema_version_mismatch"));
        assert!(log.contains("\"level\":\"WARN\""));
    }

    #[test]
    fn reset_moves_artifact_to_timestamped_backup() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("predictor.json"));
        assert_eq!(store.reset().unwrap(), None);
        store.save(&artifact()).unwrap();
        let backup = store.reset().unwrap().unwrap();
        assert!(backup.exists());
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("predictor.json.backup_"));
        assert!(!store.exists());
        assert!(matches!(store.load(), Err(StoreError::NotFound { .. })));
    }
}

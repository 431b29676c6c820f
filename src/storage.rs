use crate::{
    config::PID_FILE_SUFFIX,
    core::models::PidRecord,
    error::{errors, WardenResult},
};
use dashmap::DashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Persisted last-known PID per managed process name.
///
/// Records may be stale; callers re-check liveness before trusting them.
/// There is no locking between concurrent CLI invocations: last writer wins.
pub trait PidStore: Send + Sync {
    /// Read the record for `name`, `None` when there is none
    fn load(&self, name: &str) -> WardenResult<Option<PidRecord>>;

    /// Replace the record for `record.name`
    fn save(&self, record: &PidRecord) -> WardenResult<()>;

    /// Remove the record for `name`; removing a missing record is not an error
    fn clear(&self, name: &str) -> WardenResult<()>;
}

/// One JSON file per name under a state directory.
#[derive(Debug, Clone)]
pub struct FilePidStore {
    dir: PathBuf,
}

impl FilePidStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}{PID_FILE_SUFFIX}"))
    }

    /// Record path for `name`, refusing names that would escape the directory.
    fn checked_path(&self, name: &str) -> WardenResult<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(errors::validation_error(
                format!("invalid process name '{name}'"),
                Some("name".to_string()),
            ));
        }
        Ok(self.path_for(name))
    }

    fn ensure_dir(&self) -> WardenResult<()> {
        if self.dir.exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|err| {
            errors::storage_error(
                "Failed to create state directory",
                self.dir.display().to_string(),
                err,
            )
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o700);
            if let Err(err) = fs::set_permissions(&self.dir, perms) {
                debug!(dir = %self.dir.display(), error = %err, "could not restrict state directory");
            }
        }
        Ok(())
    }
}

impl PidStore for FilePidStore {
    fn load(&self, name: &str) -> WardenResult<Option<PidRecord>> {
        let path = self.checked_path(name)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(errors::storage_error(
                    "Failed to read PID record",
                    path.display().to_string(),
                    err,
                ))
            }
        };

        match serde_json::from_str::<PidRecord>(&content) {
            Ok(record) if record.pid > 0 => Ok(Some(record)),
            Ok(_) => {
                warn!(path = %path.display(), "ignoring PID record with pid 0");
                Ok(None)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring corrupt PID record");
                Ok(None)
            }
        }
    }

    fn save(&self, record: &PidRecord) -> WardenResult<()> {
        let path = self.checked_path(&record.name)?;
        self.ensure_dir()?;
        let tmp = self.dir.join(format!(".{}{PID_FILE_SUFFIX}.tmp", record.name));

        let body = serde_json::to_string_pretty(record).map_err(|err| {
            errors::storage_error(
                "Failed to serialize PID record",
                path.display().to_string(),
                err,
            )
        })?;

        fs::write(&tmp, body)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|err| {
                let _ = fs::remove_file(&tmp);
                errors::storage_error(
                    "Failed to write PID record",
                    path.display().to_string(),
                    err,
                )
            })?;

        debug!(name = %record.name, pid = record.pid, path = %path.display(), "PID record saved");
        Ok(())
    }

    fn clear(&self, name: &str) -> WardenResult<()> {
        let path = self.checked_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(name, path = %path.display(), "PID record cleared");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(errors::storage_error(
                "Failed to remove PID record",
                path.display().to_string(),
                err,
            )),
        }
    }
}

/// In-process store, not shared across invocations.
#[derive(Debug, Clone, Default)]
pub struct MemoryPidStore {
    records: Arc<DashMap<String, PidRecord>>,
}

impl MemoryPidStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PidStore for MemoryPidStore {
    fn load(&self, name: &str) -> WardenResult<Option<PidRecord>> {
        Ok(self.records.get(name).map(|entry| entry.value().clone()))
    }

    fn save(&self, record: &PidRecord) -> WardenResult<()> {
        self.records.insert(record.name.clone(), record.clone());
        Ok(())
    }

    fn clear(&self, name: &str) -> WardenResult<()> {
        self.records.remove(name);
        Ok(())
    }
}

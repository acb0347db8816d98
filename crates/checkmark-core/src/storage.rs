use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Versioned key the task list lives under. A format change gets a new key.
pub const STORAGE_KEY: &str = "todos.v1";

/// String key-value storage with whole-value replacement semantics.
pub trait KeyValueStorage {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set_item(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// One file per key under a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    pub data_dir: PathBuf,
}

impl FileStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file storage");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        validate_key(key)?;
        Ok(self.data_dir.join(format!("{key}.json")))
    }
}

impl KeyValueStorage for FileStorage {
    #[tracing::instrument(skip(self))]
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => {
                debug!(file = %path.display(), bytes = raw.len(), "read storage item");
                Ok(Some(raw))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(file = %path.display(), "storage item absent");
                Ok(None)
            }
            Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
        }
    }

    #[tracing::instrument(skip(self, value), fields(bytes = value.len()))]
    fn set_item(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        write_atomic(&path, value)
    }
}

/// In-process storage, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(key: &str, value: &str) -> Self {
        let mut items = BTreeMap::new();
        items.insert(key.to_string(), value.to_string());
        Self { items }
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

fn validate_key(key: &str) -> anyhow::Result<()> {
    if key.trim().is_empty() {
        bail!("storage key cannot be empty");
    }
    if key.contains('/') || key.contains('\\') || key.contains("..") {
        bail!("invalid storage key '{key}': must not contain path separators or '..'");
    }
    Ok(())
}

#[tracing::instrument(skip(path, value))]
fn write_atomic(path: &Path, value: &str) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = value.len(), "writing storage item atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    temp.write_all(value.as_bytes())
        .with_context(|| format!("failed writing temp file for {}", path.display()))?;
    temp.flush()
        .with_context(|| format!("failed flushing temp file for {}", path.display()))?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_key_reads_as_none() {
        let temp = tempdir().expect("tempdir");
        let storage = FileStorage::open(temp.path()).expect("open");
        assert_eq!(storage.get_item(STORAGE_KEY).expect("get"), None);
    }

    #[test]
    fn set_item_replaces_whole_value() {
        let temp = tempdir().expect("tempdir");
        let mut storage = FileStorage::open(temp.path()).expect("open");

        storage.set_item(STORAGE_KEY, "[1,2,3]").expect("first write");
        storage.set_item(STORAGE_KEY, "[]").expect("second write");

        assert_eq!(
            storage.get_item(STORAGE_KEY).expect("get").as_deref(),
            Some("[]")
        );
        assert!(temp.path().join("todos.v1.json").exists());
    }

    #[test]
    fn keys_cannot_escape_the_data_dir() {
        let temp = tempdir().expect("tempdir");
        let mut storage = FileStorage::open(temp.path()).expect("open");

        assert!(storage.set_item("../outside", "x").is_err());
        assert!(storage.get_item("a/b").is_err());
        assert!(storage.get_item("  ").is_err());
    }

    #[test]
    fn write_errors_name_the_target() {
        let temp = tempdir().expect("tempdir");
        let data_dir = temp.path().join("data");
        let mut storage = FileStorage::open(&data_dir).expect("open");
        fs::remove_dir_all(&data_dir).expect("remove data dir");

        let err = storage
            .set_item(STORAGE_KEY, "[]")
            .expect_err("write into missing dir");
        assert!(format!("{err:#}").contains(&data_dir.display().to_string()));
    }

    #[test]
    fn memory_storage_round_trips() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.get_item("k").expect("get"), None);
        storage.set_item("k", "v").expect("set");
        assert_eq!(storage.get_item("k").expect("get").as_deref(), Some("v"));
    }
}

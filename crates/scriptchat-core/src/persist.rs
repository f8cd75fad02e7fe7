//! On-disk record for the view store.
//!
//! The store is loaded once at start and written back after every successful
//! mutation. Writes go to a sibling temp file that is renamed over the record.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{CoreError, Script, ScriptId, ScriptStore};

/// Serialized form of the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRecord {
    #[serde(default)]
    pub scripts: Vec<Script>,
    #[serde(default)]
    pub selected_script: Option<ScriptId>,
}

impl From<&ScriptStore> for StoreRecord {
    fn from(store: &ScriptStore) -> Self {
        Self {
            scripts: store.scripts().to_vec(),
            selected_script: store.selected_id().cloned(),
        }
    }
}

impl From<StoreRecord> for ScriptStore {
    fn from(record: StoreRecord) -> Self {
        ScriptStore::from_parts(record.scripts, record.selected_script)
    }
}

/// A `ScriptStore` bound to a file.
#[derive(Debug)]
pub struct PersistentStore {
    path: PathBuf,
    store: ScriptStore,
}

impl PersistentStore {
    /// Load the record at `path`. A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let store = match fs::read_to_string(&path) {
            Ok(text) => {
                let record: StoreRecord = serde_json::from_str(&text)?;
                ScriptStore::from(record)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No store record yet, starting empty");
                ScriptStore::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            path = %path.display(),
            scripts = store.scripts().len(),
            "Loaded script store"
        );
        Ok(Self { path, store })
    }

    /// Location of the record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read access to the store.
    pub fn store(&self) -> &ScriptStore {
        &self.store
    }

    /// Apply a mutation and persist the result.
    ///
    /// The mutation runs on a copy that replaces the store only once it is on
    /// disk. When the mutation or the write fails, the store is unchanged.
    pub fn mutate<T>(
        &mut self,
        f: impl FnOnce(&mut ScriptStore) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut next = self.store.clone();
        let value = f(&mut next)?;
        write_store(&self.path, &next)?;
        self.store = next;
        Ok(value)
    }

    /// Write the current store to disk.
    pub fn save(&self) -> Result<(), CoreError> {
        write_store(&self.path, &self.store)
    }
}

fn write_store(path: &Path, store: &ScriptStore) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let record = StoreRecord::from(store);
        let json = serde_json::to_string_pretty(&record)?;

    let mut tmp = path.to_path_buf().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    debug!(path = %path.display(), "Saved script store");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, RoleId, RolePatch};

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::load(dir.path().join("script-storage.json")).unwrap();
        assert!(store.store().scripts().is_empty());
        assert!(store.store().selected_script().is_none());
    }

    #[test]
    fn test_mutations_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("script-storage.json");
        let id = ScriptId::new("s1");

        let mut store = PersistentStore::load(&path).unwrap();
        store
            .mutate(|s| {
                s.add_script(
                    Script::new(id.clone(), "Macbeth", "...")
                        .with_roles(vec![Role::new("m", "Macbeth", "ambitious", "dark")]),
                )
            })
            .unwrap();
        store.mutate(|s| s.select_script(Some(&id))).unwrap();
        store
            .mutate(|s| {
                s.update_script_role(
                    &id,
                    &RoleId::new("m"),
                    &RolePatch {
                        language_habit: Some("haunted".into()),
                        ..RolePatch::default()
                    },
                )
            })
            .unwrap();

        let reloaded = PersistentStore::load(&path).unwrap();
        assert_eq!(reloaded.store(), store.store());
        let selected = reloaded.store().selected_script().unwrap();
        assert_eq!(selected.roles[0].language_habit, "haunted");
    }

    #[test]
    fn test_failed_mutation_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script-storage.json");
        let mut store = PersistentStore::load(&path).unwrap();

        let result = store.mutate(|s| s.select_script(Some(&ScriptId::new("nope"))));
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_write_keeps_previous_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script-storage.json");
        let mut store = PersistentStore::load(&path).unwrap();
        store
            .mutate(|s| s.add_script(Script::new(ScriptId::new("s1"), "Hamlet", "...")))
            .unwrap();

        // A non-empty directory in place of the record makes the rename fail.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("blocker"), "x").unwrap();

        let result = store.mutate(|s| s.add_script(Script::new(ScriptId::new("s2"), "Lear", "...")));
        assert!(matches!(result, Err(CoreError::Io(_))));
        assert_eq!(store.store().scripts().len(), 1);
        assert!(store.store().script(&ScriptId::new("s2")).is_none());
    }

    #[test]
    fn test_record_keys() {
        let mut inner = ScriptStore::new();
        inner
            .add_script(Script::new(ScriptId::new("s"), "t", "c"))
            .unwrap();
        inner.select_script(Some(&ScriptId::new("s"))).unwrap();

        let json = serde_json::to_value(StoreRecord::from(&inner)).unwrap();
        assert_eq!(json["selectedScript"], "s");
        assert_eq!(json["scripts"][0]["id"], "s");
    }

    #[test]
    fn test_corrupt_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script-storage.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            PersistentStore::load(&path),
            Err(CoreError::Serialization(_))
        ));
    }
}

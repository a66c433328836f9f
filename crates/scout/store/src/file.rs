//! JSON state-file backend

use crate::error::{StoreError, StoreResult};
use crate::table::{overlay, UnitTable};
use crate::traits::MetadataStore;
use async_trait::async_trait;
use scout_types::{UnitName, UnitPatch, UnitRecord};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Store backed by a single JSON object file
///
/// Every write goes to a temporary file in the same directory which is then
/// renamed over the state file. Writers inside the process are serialized;
/// the file must not be shared between agent processes.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty state file if none exists
    pub async fn init(&self) -> StoreResult<()> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        tracing::info!(path = %self.path.display(), "Initializing empty metadata file");
        self.write_object(Map::new()).await
    }

    async fn read_object(&self) -> StoreResult<Map<String, Value>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&contents)? {
            Value::Object(object) => Ok(object),
            _ => Err(StoreError::NotAnObject(self.path.display().to_string())),
        }
    }

    async fn write_object(&self, object: Map<String, Value>) -> StoreResult<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &Value::Object(object)))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

#[async_trait]
impl MetadataStore for JsonFileStore {
    async fn load(&self) -> StoreResult<UnitTable> {
        let object = self.read_object().await?;
        Ok(UnitTable::from_object(&object))
    }

    async fn save(&self, table: &UnitTable) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let previous = self.read_object().await?;
        self.write_object(table.to_object(&previous)).await
    }

    async fn get(&self, name: &UnitName) -> StoreResult<Option<UnitRecord>> {
        let object = self.read_object().await?;
        decode_entry(name, object.get(name.as_str()))
    }

    async fn upsert(&self, name: &UnitName, patch: UnitPatch) -> StoreResult<UnitRecord> {
        let _guard = self.write_lock.lock().await;
        let mut object = self.read_object().await?;
        let existing = object.get(name.as_str()).cloned();

        let record = match decode_entry(name, existing.as_ref())? {
            Some(mut record) => {
                patch.apply(&mut record);
                record
            }
            None => patch
                .into_record()
                .ok_or_else(|| StoreError::IncompleteRecord(name.clone()))?,
        };

        object.insert(name.to_string(), overlay(existing, &record));
        self.write_object(object).await?;

        tracing::debug!(unit = %name, "Metadata record updated");
        Ok(record)
    }
}

fn decode_entry(name: &UnitName, raw: Option<&Value>) -> StoreResult<Option<UnitRecord>> {
    raw.map(|value| {
        serde_json::from_value::<UnitRecord>(value.clone()).map_err(|e| StoreError::Malformed {
            unit: name.clone(),
            reason: e.to_string(),
        })
    })
    .transpose()
}

/// Replace `path` with the pretty-printed `value` via rename
fn write_atomic(path: &Path, value: &Value) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&buf)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

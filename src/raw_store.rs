use std::collections::BTreeSet;
use std::fmt;
use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKind {
    Discovery,
    Detail,
    Credits,
}

impl RecordKind {
    pub fn suffix(self) -> &'static str {
        match self {
            RecordKind::Discovery => "discover_info",
            RecordKind::Detail => "details",
            RecordKind::Credits => "credits",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Raw tier: one payload per (series id, record kind).
pub trait ArtifactStore {
    fn put(&self, id: u64, kind: RecordKind, bytes: &[u8]) -> anyhow::Result<()>;
    fn get(&self, id: u64, kind: RecordKind) -> anyhow::Result<Option<Vec<u8>>>;
    /// Ids with a stored artifact of `kind`, ascending.
    fn list_ids(&self, kind: RecordKind) -> anyhow::Result<Vec<u64>>;
}

/// Stores artifacts as `<dir>/<id>_<kind>.json`.
#[derive(Debug, Clone)]
pub struct LocalFsRawStore {
    dir: PathBuf,
}

impl LocalFsRawStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn artifact_path(&self, id: u64, kind: RecordKind) -> PathBuf {
        self.dir.join(format!("{id}_{}.json", kind.suffix()))
    }
}

impl ArtifactStore for LocalFsRawStore {
    fn put(&self, id: u64, kind: RecordKind, bytes: &[u8]) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create raw dir: {}", self.dir.display()))?;

        let path = self.artifact_path(id, kind);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("create temp file in: {}", self.dir.display()))?;
        tmp.write_all(bytes)
            .with_context(|| format!("write raw artifact: {}", path.display()))?;
        tmp.persist(&path)
            .with_context(|| format!("persist raw artifact: {}", path.display()))?;
        Ok(())
    }

    fn get(&self, id: u64, kind: RecordKind) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.artifact_path(id, kind);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("read raw artifact: {}", path.display()))
            }
        }
    }

    fn list_ids(&self, kind: RecordKind) -> anyhow::Result<Vec<u64>> {
        let suffix = format!("_{}.json", kind.suffix());
        let mut ids = BTreeSet::new();

        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("read raw dir: {}", self.dir.display()))?
        {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(prefix) = file_name.strip_suffix(&suffix) else {
                continue;
            };
            if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                tracing::warn!(file = file_name, "ignoring raw artifact with non-numeric id");
                continue;
            }
            match prefix.parse::<u64>() {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(err) => {
                    tracing::warn!(file = file_name, %err, "ignoring raw artifact with unparsable id");
                }
            }
        }

        Ok(ids.into_iter().collect())
    }
}

/// Serializes `payload` and stores it; empty payloads are skipped.
///
/// Returns whether an artifact was written. Failures are logged, not returned,
/// so one bad artifact never stops ingestion.
pub fn save_record(store: &dyn ArtifactStore, id: u64, kind: RecordKind, payload: &Value) -> bool {
    if is_empty_payload(payload) {
        tracing::warn!(id, %kind, "empty payload; nothing saved");
        return false;
    }

    let bytes = match serde_json::to_vec_pretty(payload) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(id, %kind, %err, "serialize raw artifact");
            return false;
        }
    };

    match store.put(id, kind, &bytes) {
        Ok(()) => {
            tracing::debug!(id, %kind, "raw artifact saved");
            true
        }
        Err(err) => {
            tracing::error!(id, %kind, err = format!("{err:#}"), "save raw artifact");
            false
        }
    }
}

fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

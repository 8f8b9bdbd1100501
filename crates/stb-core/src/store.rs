use std::{collections::HashMap, marker::PhantomData, path::PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use crate::Result;

/// Whole-collection JSON store: one file per collection, `id -> record`.
///
/// There is no partial-update primitive; callers get the full mapping,
/// mutate it in memory and the collection writes it back. A per-collection
/// mutex is held across load → mutate → save so interleaved handlers in this
/// process cannot drop each other's writes. Across processes the guarantee
/// stays "last save wins".
pub struct JsonCollection<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCollection<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, T>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let txt = std::fs::read_to_string(&self.path)?;
        if txt.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&txt)?)
    }

    fn save(&self, map: &HashMap<String, T>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let txt = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, txt)?;
        Ok(())
    }

    /// Read-only snapshot of the collection.
    pub async fn snapshot(&self) -> Result<HashMap<String, T>> {
        let _guard = self.lock.lock().await;
        self.load()
    }

    /// Load the collection, apply `f`, write the result back.
    ///
    /// The closure's return value is passed through so callers can extract
    /// whatever they computed while holding the snapshot.
    pub async fn with_mut<R>(&self, f: impl FnOnce(&mut HashMap<String, T>) -> R) -> Result<R> {
        let _guard = self.lock.lock().await;
        let mut map = self.load()?;
        let out = f(&mut map);
        self.save(&map)?;
        Ok(out)
    }
}

//! Process-wide cache of loaded parameter tables.
//!
//! Entries are keyed by path and the SHA-256 of the file contents, so an
//! edited file is reloaded while engines pointing at the same unchanged file
//! share one `Arc<ParameterTable>`.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::errors::{ZoniError, ZoniResult};
use crate::rules::parameters::{fingerprint_bytes, ParameterTable};

pub const DEFAULT_MAX_TABLES: usize = 16;

static GLOBAL: LazyLock<ParameterCache> =
    LazyLock::new(|| ParameterCache::new(DEFAULT_MAX_TABLES));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Hit,
    Miss,
}

impl CacheMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Hit => "cache_hit",
            CacheMode::Miss => "cache_miss",
        }
    }
}

#[derive(Debug)]
pub struct ParameterCache {
    max_entries: usize,
    tables: Mutex<IndexMap<String, Arc<ParameterTable>>>,
}

impl ParameterCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            tables: Mutex::new(IndexMap::new()),
        }
    }

    /// Shared instance used by the Python engine.
    pub fn global() -> &'static ParameterCache {
        &GLOBAL
    }

    fn cache_key(path: &Path, fingerprint: &str) -> String {
        format!("{}:{fingerprint}", path.display())
    }

    fn evict_over_capacity(tables: &mut IndexMap<String, Arc<ParameterTable>>, max: usize) {
        while tables.len() > max {
            tables.shift_remove_index(0);
        }
    }

    /// Load `path`, reusing the cached table when the contents are unchanged.
    pub fn get_or_load(&self, path: &Path) -> ZoniResult<(Arc<ParameterTable>, CacheMode)> {
        let bytes = std::fs::read(path).map_err(|e| {
            ZoniError::ParameterTable(format!("cannot read {}: {e}", path.display()))
        })?;
        let fingerprint = fingerprint_bytes(&bytes);
        let key = Self::cache_key(path, &fingerprint);

        {
            let mut tables = self.tables.lock();
            if let Some(table) = tables.shift_remove(&key) {
                // Move to end for LRU
                tables.insert(key, Arc::clone(&table));
                tracing::debug!(path = %path.display(), "parameter table cache hit");
                return Ok((table, CacheMode::Hit));
            }
        }

        let text = String::from_utf8(bytes).map_err(|e| {
            ZoniError::ParameterTable(format!("{} is not UTF-8: {e}", path.display()))
        })?;
        let table = Arc::new(ParameterTable::from_json_str(&text)?);
        tracing::info!(
            path = %path.display(),
            zones = table.len(),
            fingerprint = %&fingerprint[..12],
            "parameter table loaded"
        );

        let mut tables = self.tables.lock();
        // Older versions of the same file are dead weight.
        let prefix = format!("{}:", path.display());
        tables.retain(|k, _| !k.starts_with(&prefix));
        tables.insert(key, Arc::clone(&table));
        Self::evict_over_capacity(&mut tables, self.max_entries);
        Ok((table, CacheMode::Miss))
    }

    pub fn len(&self) -> usize {
        self.tables.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.lock().is_empty()
    }

    pub fn clear(&self) {
        self.tables.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_unchanged_file_is_shared() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "p.json", r#"{"MUQ2": {"indices": {"CA_max": "1,0"}}}"#);
        let cache = ParameterCache::new(4);
        let (a, mode_a) = cache.get_or_load(&path).unwrap();
        let (b, mode_b) = cache.get_or_load(&path).unwrap();
        assert_eq!(mode_a, CacheMode::Miss);
        assert_eq!(mode_b, CacheMode::Hit);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_edited_file_is_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "p.json", r#"{"MUQ2": {"indices": {"CA_max": 1}}}"#);
        let cache = ParameterCache::new(4);
        let (a, _) = cache.get_or_load(&path).unwrap();
        write(dir.path(), "p.json", r#"{"MUQ2": {"indices": {"CA_max": 2}}}"#);
        let (b, mode) = cache.get_or_load(&path).unwrap();
        assert_eq!(mode, CacheMode::Miss);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(b.get("MUQ2").unwrap().ca_max, Some(2.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParameterCache::new(2);
        for i in 0..3 {
            let path = write(dir.path(), &format!("p{i}.json"), "{}");
            cache.get_or_load(&path).unwrap();
        }
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_file_is_parameter_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ParameterCache::new(1).get_or_load(&dir.path().join("none.json")),
            Err(ZoniError::ParameterTable(_))
        ));
    }
}

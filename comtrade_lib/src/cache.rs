//! On-disk result cache with a time-based validity window.
//!
//! One JSON file per [`RequestFingerprint`]; the file modification time is
//! the only record of an entry's age, so `touch`ing a file renews it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use comtrade_api::types::TradeRecord;

use crate::error::CacheError;
use crate::fingerprint::RequestFingerprint;

const ENTRY_EXT: &str = "json";
const TMP_EXT: &str = "json.tmp";

/// A cache entry as seen by [`DiskCache::entries`].
#[derive(Clone, Debug)]
pub struct CacheEntryInfo {
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub age: Duration,
    pub stale: bool,
}

/// Directory of cached sub-request results.
///
/// Assumes a single writer per fingerprint; there is no file locking.
pub struct DiskCache {
    dir: PathBuf,
    validity: Duration,
}

impl DiskCache {
    /// Creates a cache rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>, validity: Duration) -> Self {
        Self {
            dir: dir.into(),
            validity,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    fn path_for(&self, fingerprint: &RequestFingerprint) -> PathBuf {
        self.dir
            .join(format!("{}.{}", fingerprint.as_str(), ENTRY_EXT))
    }

    /// Returns the cached rows, or `None` on a miss.
    ///
    /// Stale entries, undecodable entries, and (with `retry_if_empty`) empty
    /// entries are deleted during the lookup.
    pub fn get(
        &self,
        fingerprint: &RequestFingerprint,
        retry_if_empty: bool,
    ) -> Result<Option<Vec<TradeRecord>>, CacheError> {
        let path = self.path_for(fingerprint);
        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };

        if age_of(modified) > self.validity {
            tracing::debug!("Cache entry {} expired, removing", fingerprint);
            remove_entry(&path)?;
            return Ok(None);
        }

        let text = fs::read_to_string(&path).map_err(|e| CacheError::io(&path, e))?;
        let rows: Vec<TradeRecord> = match serde_json::from_str(&text) {
            Ok(rows) => rows,
            Err(source) => {
                tracing::warn!("Cache entry {} is corrupt, removing", path.display());
                remove_entry(&path)?;
                return Err(CacheError::Corrupt { path, source });
            }
        };

        if rows.is_empty() && retry_if_empty {
            tracing::info!(
                "Empty result in cached entry {}, retrying. Disable with retry_if_empty=false",
                fingerprint
            );
            remove_entry(&path)?;
            return Ok(None);
        }
        Ok(Some(rows))
    }

    /// Stores `rows`, replacing any previous entry for the fingerprint.
    ///
    /// Writes to a temp file and renames it into place, so readers never
    /// see a partial entry.
    pub fn put(
        &self,
        fingerprint: &RequestFingerprint,
        rows: &[TradeRecord],
    ) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        let path = self.path_for(fingerprint);
        let tmp = path.with_extension(TMP_EXT);

        let bytes = serde_json::to_vec(rows).map_err(|source| CacheError::Encode {
            path: path.clone(),
            source,
        })?;

        let result = fs::write(&tmp, &bytes).and_then(|_| fs::rename(&tmp, &path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::io(&path, e));
        }
        tracing::debug!("Cached {} rows as {}", rows.len(), fingerprint);
        Ok(())
    }

    /// Deletes every entry older than the validity window. Returns the
    /// number of files removed.
    pub fn sweep(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for entry in self.entries()? {
            if entry.stale {
                remove_entry(&entry.path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!("Removed {} stale cache entries from {}", removed, self.dir.display());
        }
        Ok(removed)
    }

    /// Deletes every entry regardless of age.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let entries = self.entries()?;
        for entry in &entries {
            remove_entry(&entry.path)?;
        }
        Ok(entries.len())
    }

    /// Lists cache files (entries and leftover temp files), oldest first.
    pub fn entries(&self) -> Result<Vec<CacheEntryInfo>, CacheError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };

        let mut entries = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| CacheError::io(&self.dir, e))?;
            let path = item.path();
            let is_cache_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".json") || n.ends_with(".json.tmp"));
            if !is_cache_file {
                continue;
            }
            let meta = item.metadata().map_err(|e| CacheError::io(&path, e))?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().map_err(|e| CacheError::io(&path, e))?;
            let age = age_of(modified);
            entries.push(CacheEntryInfo {
                path,
                modified: DateTime::<Utc>::from(modified),
                age,
                stale: age > self.validity,
            });
        }
        entries.sort_by(|a, b| a.modified.cmp(&b.modified));
        Ok(entries)
    }
}

fn age_of(modified: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO)
}

fn remove_entry(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comtrade_api::TradeQuery;

    const DAY: Duration = Duration::from_secs(86_400);

    fn fingerprint(period: &str) -> RequestFingerprint {
        RequestFingerprint::of(&TradeQuery::default().with_period(period), false).unwrap()
    }

    fn row(partner: i64, value: f64) -> TradeRecord {
        TradeRecord {
            partner_code: Some(partner),
            primary_value: Some(value),
            ..Default::default()
        }
    }

    fn backdate(path: &Path, by: Duration) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn put_then_get() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path().join("cache"), 60 * DAY);
        let fp = fingerprint("2020");

        assert!(cache.get(&fp, true).unwrap().is_none());
        cache.put(&fp, &[row(226, 1.0), row(620, 2.0)]).unwrap();
        let rows = cache.get(&fp, true).unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].partner_code, Some(620));
    }

    #[test]
    fn put_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path(), 60 * DAY);
        let fp = fingerprint("2020");
        cache.put(&fp, &[row(1, 1.0)]).unwrap();
        cache.put(&fp, &[row(2, 2.0), row(3, 3.0)]).unwrap();
        assert_eq!(cache.get(&fp, false).unwrap().unwrap().len(), 2);
        assert_eq!(cache.entries().unwrap().len(), 1);
    }

    #[test]
    fn expired_entry_is_deleted_on_get() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path(), 60 * DAY);
        let fp = fingerprint("2020");
        cache.put(&fp, &[row(1, 1.0)]).unwrap();
        backdate(&cache.path_for(&fp), 61 * DAY);

        assert!(cache.get(&fp, false).unwrap().is_none());
        assert!(!cache.path_for(&fp).exists());
    }

    #[test]
    fn empty_entry_honours_retry_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path(), 60 * DAY);
        let fp = fingerprint("2020");

        cache.put(&fp, &[]).unwrap();
        assert_eq!(cache.get(&fp, false).unwrap(), Some(Vec::new()));
        assert!(cache.get(&fp, true).unwrap().is_none());
        assert!(!cache.path_for(&fp).exists());
    }

    #[test]
    fn corrupt_entry_is_removed_and_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path(), 60 * DAY);
        let fp = fingerprint("2020");
        fs::write(cache.path_for(&fp), "{not json").unwrap();

        let err = cache.get(&fp, true).unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
        assert!(!cache.path_for(&fp).exists());
    }

    #[test]
    fn sweep_removes_only_stale_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path(), 60 * DAY);
        let old = fingerprint("2001");
        let fresh = fingerprint("2021");
        cache.put(&old, &[row(1, 1.0)]).unwrap();
        cache.put(&fresh, &[row(1, 1.0)]).unwrap();
        fs::write(tmp.path().join("notes.txt"), "keep me").unwrap();
        backdate(&cache.path_for(&old), 90 * DAY);

        assert_eq!(cache.sweep().unwrap(), 1);
        assert!(!cache.path_for(&old).exists());
        assert!(cache.path_for(&fresh).exists());
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[test]
    fn clear_and_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path().join("never-created"), DAY);
        assert_eq!(cache.sweep().unwrap(), 0);
        assert_eq!(cache.clear().unwrap(), 0);

        cache.put(&fingerprint("2020"), &[row(1, 1.0)]).unwrap();
        cache.put(&fingerprint("2021"), &[row(1, 1.0)]).unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.entries().unwrap().is_empty());
    }
}

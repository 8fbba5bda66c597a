use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::CacheKey;
use crate::error::CacheError;

/// Index layout version written to `index.json`.
pub const SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024 * 1024;

const INDEX_FILE: &str = "index.json";

/// Free-form data stored alongside an entry. Never part of the key.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Source of "now" for entry timestamps and TTL checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Cache-owned copy of the artifact.
    pub artifact_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheIndex {
    schema_version: u32,
    #[serde(default)]
    entries: BTreeMap<CacheKey, CacheEntry>,
}

impl CacheIndex {
    fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            entries: BTreeMap::new(),
        }
    }

    fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }
}

/// What a [`CacheStore::prune`] pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Entries past their TTL or whose artifact file was gone.
    pub expired: usize,
    /// Entries evicted, oldest first, to get under the size bound.
    pub evicted: usize,
    pub remaining_entries: usize,
    pub remaining_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub dir: PathBuf,
}

/// Content-addressed store of finished artifacts.
///
/// Layout: `<dir>/index.json` plus one `<key>-<random>.<ext>` file per
/// entry. Every put gets a fresh file name, so deleting a superseded entry
/// never touches the artifact that replaced it. The
/// index file is only ever replaced whole, by renaming a fully written
/// temporary file over it.
///
/// One store may be shared (behind an `Arc`) by any number of concurrent
/// runs. Readers work on an immutable snapshot of the index and never block
/// on writers; every mutation is serialized through a single writer lock and
/// publishes a complete new snapshot.
pub struct CacheStore {
    dir: PathBuf,
    index_path: PathBuf,
    ttl: Duration,
    max_bytes: u64,
    index: RwLock<Arc<CacheIndex>>,
    writer: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Open (or create) a store rooted at `dir`.
    ///
    /// An unreadable index, or one written with a different schema version,
    /// is replaced by an empty one. Artifact files are left in place.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let index_path = dir.join(INDEX_FILE);

        let (index, needs_write) = match load_index(&index_path) {
            Ok(Some(index)) => (index, false),
            Ok(None) => (CacheIndex::empty(), true),
            Err(CacheError::Corrupt(reason)) => {
                log::warn!(
                    "Cache index {} is corrupt ({reason}); starting with an empty cache",
                    index_path.display()
                );
                (CacheIndex::empty(), true)
            }
            Err(e) => return Err(e),
        };

        let store = Self {
            dir,
            index_path,
            ttl: DEFAULT_TTL,
            max_bytes: DEFAULT_MAX_BYTES,
            index: RwLock::new(Arc::new(CacheIndex::empty())),
            writer: Mutex::new(()),
            clock: Arc::new(SystemClock),
        };
        if needs_write {
            store.write_index(&index)?;
        }
        log::debug!(
            "Opened cache at {} with {} entries",
            store.dir.display(),
            index.entries.len()
        );
        *store.index.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(index);
        Ok(store)
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Look up a live entry.
    ///
    /// File existence and age are checked on every call; an entry failing
    /// either check is evicted and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.snapshot().entries.get(key).cloned();
        let Some(entry) = entry else {
            log::debug!("Cache miss for {key}");
            return None;
        };

        let stale = if !entry.artifact_path.is_file() {
            Some("artifact file is missing")
        } else if self.is_expired(&entry, self.clock.now()) {
            Some("entry has expired")
        } else {
            None
        };

        if let Some(reason) = stale {
            log::info!("Evicting cache entry {key}: {reason}");
            if let Err(e) = self.evict_if_unchanged(&entry) {
                log::warn!("Failed to evict cache entry {key}: {e}");
            }
            return None;
        }

        log::debug!("Cache hit for {key}");
        Some(entry)
    }

    /// Copy `source` into the store under `key` and persist the index.
    ///
    /// The store keeps its own copy, so the caller may delete `source`
    /// afterwards. An existing entry for `key` is replaced.
    pub fn put(
        &self,
        key: &CacheKey,
        source: &Path,
        metadata: Metadata,
    ) -> Result<CacheEntry, CacheError> {
        if !source.is_file() {
            return Err(CacheError::MissingSource(source.to_path_buf()));
        }

        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let (artifact_path, size_bytes) = copy_into(source, &self.dir, key, extension)?;

        let entry = CacheEntry {
            key: key.clone(),
            artifact_path,
            created_at: self.clock.now(),
            size_bytes,
            metadata,
        };

        let guard = self.lock_writer();
        let mut next = (*self.snapshot()).clone();
        let replaced = next.entries.insert(key.clone(), entry.clone());
        if let Err(e) = self.commit(&guard, next) {
            remove_artifact(&entry.artifact_path);
            return Err(e);
        }
        if let Some(old) = replaced {
            remove_artifact(&old.artifact_path);
        }

        log::debug!("Cached {key} ({size_bytes} bytes)");
        Ok(entry)
    }

    /// Delete an entry and its artifact. Returns whether it existed.
    pub fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let guard = self.lock_writer();
        let mut next = (*self.snapshot()).clone();
        let Some(entry) = next.entries.remove(key) else {
            return Ok(false);
        };
        remove_artifact(&entry.artifact_path);
        self.commit(&guard, next)?;
        log::debug!("Removed cache entry {key}");
        Ok(true)
    }

    /// Drop expired and dangling entries, then evict the oldest entries
    /// (ties broken by key) until the total size fits the bound.
    pub fn prune(&self) -> Result<PruneReport, CacheError> {
        let guard = self.lock_writer();
        let mut next = (*self.snapshot()).clone();
        let now = self.clock.now();
        let mut report = PruneReport::default();

        let stale: Vec<CacheKey> = next
            .entries
            .values()
            .filter(|e| self.is_expired(e, now) || !e.artifact_path.is_file())
            .map(|e| e.key.clone())
            .collect();
        for key in stale {
            if let Some(entry) = next.entries.remove(&key) {
                remove_artifact(&entry.artifact_path);
                report.expired += 1;
            }
        }

        let mut total = next.total_bytes();
        if total > self.max_bytes {
            let mut by_age: Vec<(DateTime<Utc>, CacheKey)> = next
                .entries
                .values()
                .map(|e| (e.created_at, e.key.clone()))
                .collect();
            by_age.sort();

            for (_, key) in by_age {
                if total <= self.max_bytes {
                    break;
                }
                if let Some(entry) = next.entries.remove(&key) {
                    total = total.saturating_sub(entry.size_bytes);
                    remove_artifact(&entry.artifact_path);
                    report.evicted += 1;
                }
            }
        }

        report.remaining_entries = next.entries.len();
        report.remaining_bytes = total;
        if report.expired + report.evicted > 0 {
            self.commit(&guard, next)?;
        }

        log::info!(
            "Pruned cache: {} expired, {} evicted, {} entries ({} bytes) remaining",
            report.expired,
            report.evicted,
            report.remaining_entries,
            report.remaining_bytes
        );
        Ok(report)
    }

    pub fn stats(&self) -> CacheStats {
        let index = self.snapshot();
        CacheStats {
            entries: index.entries.len(),
            total_bytes: index.total_bytes(),
            dir: self.dir.clone(),
        }
    }

    fn snapshot(&self) -> Arc<CacheIndex> {
        Arc::clone(&self.index.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        match (now - entry.created_at).to_std() {
            Ok(age) => age >= self.ttl,
            // created in the future: clock went backwards
            Err(_) => false,
        }
    }

    /// Evict `entry` unless a concurrent writer already replaced it.
    fn evict_if_unchanged(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let guard = self.lock_writer();
        let mut next = (*self.snapshot()).clone();
        if next.entries.get(&entry.key) != Some(entry) {
            return Ok(());
        }
        next.entries.remove(&entry.key);
        remove_artifact(&entry.artifact_path);
        self.commit(&guard, next)
    }

    /// Persist `next`, then publish it to readers. Requires the writer lock.
    fn commit(&self, _writer: &MutexGuard<'_, ()>, next: CacheIndex) -> Result<(), CacheError> {
        self.write_index(&next)?;
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(())
    }

    fn write_index(&self, index: &CacheIndex) -> Result<(), CacheError> {
        let json = serde_json::to_vec_pretty(index)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.index_path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn load_index(path: &Path) -> Result<Option<CacheIndex>, CacheError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let index: CacheIndex =
        serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt(e.to_string()))?;
    if index.schema_version != SCHEMA_VERSION {
        return Err(CacheError::Corrupt(format!(
            "unsupported schema version {}",
            index.schema_version
        )));
    }
    Ok(Some(index))
}

/// Copy `source` into a new, uniquely named file in `dir`.
///
/// The file is unreferenced until the index commit, so readers never see it
/// half written.
fn copy_into(
    source: &Path,
    dir: &Path,
    key: &CacheKey,
    extension: &str,
) -> Result<(PathBuf, u64), CacheError> {
    let mut input = File::open(source)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!("{key}-"))
        .suffix(&format!(".{extension}"))
        .tempfile_in(dir)?;
    let size = io::copy(&mut input, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    let (_, path) = tmp.keep().map_err(|e| e.error)?;
    Ok((path, size))
}

fn remove_artifact(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            log::warn!("Failed to delete cached artifact {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::params::{EncodingSpec, SynthesisParams};

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Utc::now())))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::TimeDelta::from_std(by).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn key(text: &str) -> CacheKey {
        CacheKey::generate(
            &[text.to_string()],
            "en_us_ljspeech_medium",
            &SynthesisParams::default(),
            &EncodingSpec::default(),
        )
    }

    fn artifact(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn put_then_get_returns_identical_bytes() {
        let scratch = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(cache_dir.path()).unwrap();

        let source = artifact(scratch.path(), "out.mp3", b"ID3 fake mp3 payload");
        let mut metadata = Metadata::new();
        metadata.insert("engine".into(), serde_json::json!("piper"));
        store.put(&key("Hello world."), &source, metadata).unwrap();

        // the caller's scratch copy going away must not matter
        drop(scratch);

        let entry = store.get(&key("Hello world.")).expect("hit");
        assert_eq!(fs::read(&entry.artifact_path).unwrap(), b"ID3 fake mp3 payload");
        assert_eq!(entry.size_bytes, 20);
        assert_eq!(entry.metadata["engine"], "piper");
        assert!(entry.artifact_path.starts_with(cache_dir.path()));
    }

    #[test]
    fn replacing_an_entry_keeps_the_new_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path().join("cache")).unwrap();
        let old = store
            .put(&key("a"), &artifact(dir.path(), "1.wav", b"first"), Metadata::new())
            .unwrap();
        let new = store
            .put(&key("a"), &artifact(dir.path(), "2.wav", b"second"), Metadata::new())
            .unwrap();

        assert_ne!(old.artifact_path, new.artifact_path);
        assert!(!old.artifact_path.exists());

        // a reader that saw the old entry as stale must not take the new one with it
        store.evict_if_unchanged(&old).unwrap();
        let entry = store.get(&key("a")).expect("hit");
        assert_eq!(fs::read(entry.artifact_path).unwrap(), b"second");
    }

    #[test]
    fn unknown_key_is_a_plain_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        assert!(store.get(&key("never stored")).is_none());
    }

    #[test]
    fn missing_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path().join("cache")).unwrap();
        let err = store
            .put(&key("x"), &dir.path().join("nope.wav"), Metadata::new())
            .unwrap_err();
        assert!(matches!(err, CacheError::MissingSource(_)));
    }

    #[test]
    fn deleted_artifact_is_evicted_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path().join("cache")).unwrap();
        let source = artifact(dir.path(), "a.wav", b"RIFF");
        let entry = store.put(&key("a"), &source, Metadata::new()).unwrap();

        fs::remove_file(&entry.artifact_path).unwrap();
        assert!(store.get(&key("a")).is_none());
        assert_eq!(store.stats().entries, 0);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let store = CacheStore::open(dir.path().join("cache"))
            .unwrap()
            .with_ttl(Duration::from_secs(60))
            .with_clock(clock.clone());
        let source = artifact(dir.path(), "a.wav", b"RIFF");
        let entry = store.put(&key("a"), &source, Metadata::new()).unwrap();

        clock.advance(Duration::from_secs(59));
        assert!(store.get(&key("a")).is_some());

        clock.advance(Duration::from_secs(1));
        assert!(store.get(&key("a")).is_none());
        assert!(!entry.artifact_path.exists());
        assert_eq!(store.stats().entries, 0);
    }

    #[test]
    fn corrupt_index_is_reset() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INDEX_FILE), b"{ this is not json").unwrap();

        let store = CacheStore::open(dir.path()).unwrap();
        assert_eq!(store.stats().entries, 0);

        let rewritten = fs::read(dir.path().join(INDEX_FILE)).unwrap();
        let index: CacheIndex = serde_json::from_slice(&rewritten).unwrap();
        assert_eq!(index.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn unknown_schema_version_is_reset() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(INDEX_FILE),
            br#"{"schema_version": 99, "entries": {}}"#,
        )
        .unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        assert_eq!(store.stats().entries, 0);
    }

    #[test]
    fn index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        {
            let store = CacheStore::open(&cache_dir).unwrap();
            let source = artifact(dir.path(), "a.mp3", b"payload");
            store.put(&key("a"), &source, Metadata::new()).unwrap();
        }
        let store = CacheStore::open(&cache_dir).unwrap();
        assert!(store.get(&key("a")).is_some());
    }

    #[test]
    fn remove_deletes_entry_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path().join("cache")).unwrap();
        let source = artifact(dir.path(), "a.wav", b"RIFF");
        let entry = store.put(&key("a"), &source, Metadata::new()).unwrap();

        assert!(store.remove(&key("a")).unwrap());
        assert!(!store.remove(&key("a")).unwrap());
        assert!(!entry.artifact_path.exists());
    }

    #[test]
    fn prune_drops_expired_then_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let store = CacheStore::open(dir.path().join("cache"))
            .unwrap()
            .with_ttl(Duration::from_secs(3600))
            .with_max_bytes(25)
            .with_clock(clock.clone());

        let ten = [0u8; 10];
        store
            .put(&key("expired"), &artifact(dir.path(), "e.wav", &ten), Metadata::new())
            .unwrap();
        clock.advance(Duration::from_secs(3000));
        store
            .put(&key("oldest"), &artifact(dir.path(), "o.wav", &ten), Metadata::new())
            .unwrap();
        clock.advance(Duration::from_secs(10));
        store
            .put(&key("middle"), &artifact(dir.path(), "m.wav", &ten), Metadata::new())
            .unwrap();
        clock.advance(Duration::from_secs(10));
        store
            .put(&key("newest"), &artifact(dir.path(), "n.wav", &ten), Metadata::new())
            .unwrap();
        clock.advance(Duration::from_secs(600));

        let report = store.prune().unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.evicted, 1);
        assert_eq!(report.remaining_entries, 2);
        assert_eq!(report.remaining_bytes, 20);

        assert!(store.get(&key("oldest")).is_none());
        assert!(store.get(&key("middle")).is_some());
        assert!(store.get(&key("newest")).is_some());
    }

    #[test]
    fn prune_breaks_age_ties_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let store = CacheStore::open(dir.path().join("cache"))
            .unwrap()
            .with_max_bytes(25)
            .with_clock(clock);

        let mut keys: Vec<CacheKey> = ["one", "two", "three", "four"]
            .iter()
            .map(|text| key(text))
            .collect();
        for (i, k) in keys.iter().enumerate() {
            let source = artifact(dir.path(), &format!("{i}.wav"), &[0u8; 10]);
            store.put(k, &source, Metadata::new()).unwrap();
        }
        keys.sort();

        let report = store.prune().unwrap();
        assert_eq!(report.expired, 0);
        assert_eq!(report.evicted, 2);
        assert_eq!(report.remaining_bytes, 20);

        assert!(store.get(&keys[0]).is_none());
        assert!(store.get(&keys[1]).is_none());
        assert!(store.get(&keys[2]).is_some());
        assert!(store.get(&keys[3]).is_some());
    }

    #[test]
    fn prune_under_budget_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path().join("cache")).unwrap();
        store
            .put(&key("a"), &artifact(dir.path(), "a.wav", b"RIFF"), Metadata::new())
            .unwrap();
        let report = store.prune().unwrap();
        assert_eq!(
            report,
            PruneReport {
                expired: 0,
                evicted: 0,
                remaining_entries: 1,
                remaining_bytes: 4,
            }
        );
    }

    #[test]
    fn concurrent_puts_keep_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let store = Arc::new(CacheStore::open(&cache_dir).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let body = format!("clip {i}");
                let source = artifact(dir.path(), &format!("{i}.wav"), body.as_bytes());
                thread::spawn(move || {
                    store
                        .put(&key(&format!("sentence {i}")), &source, Metadata::new())
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.stats().entries, 8);
        let reopened = CacheStore::open(&cache_dir).unwrap();
        assert_eq!(reopened.stats().entries, 8);
        for i in 0..8 {
            let entry = reopened.get(&key(&format!("sentence {i}"))).unwrap();
            let body = fs::read(entry.artifact_path).unwrap();
            assert_eq!(body, format!("clip {i}").into_bytes());
        }
    }
}

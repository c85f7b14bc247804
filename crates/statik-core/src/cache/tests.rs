//! Tests for ValidatingCache state transitions, budget and concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::clock::{Clock, ManualClock};
use crate::content::{BaseResolver, ContentResolver, Descriptor, Encoding, MimeTable, VariantResolver};
use crate::error::ResolveError;
use crate::location::{FsRoot, MemoryStore, Storage};

use super::{spawn_sweeper, CacheSettings, ValidatingCache, ENTRY_OVERHEAD};

const WINDOW: Duration = Duration::from_millis(1000);

#[derive(Debug)]
struct Counting {
    inner: Arc<dyn ContentResolver>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ContentResolver for Counting {
    fn resolve(&self, path: &str) -> Result<Option<Arc<Descriptor>>, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.inner.resolve(path)
    }
}

struct Fixture {
    store: MemoryStore,
    clock: Arc<ManualClock>,
    counting: Arc<Counting>,
    cache: Arc<ValidatingCache>,
}

impl Fixture {
    fn calls(&self) -> usize {
        self.counting.calls.load(Ordering::SeqCst)
    }
}

fn settings() -> CacheSettings {
    CacheSettings {
        stale_window: WINDOW,
        ..CacheSettings::default()
    }
}

fn fixture_with(settings: CacheSettings, delay: Duration) -> Fixture {
    let store = MemoryStore::new();
    let storage: Arc<dyn Storage> = Arc::new(store.clone());
    let base = Arc::new(BaseResolver::new(Arc::clone(&storage), MimeTable::new()));
    let variants = Arc::new(VariantResolver::new(base, vec![Encoding::new("gzip", ".gz")]));
    let counting = Arc::new(Counting {
        inner: variants,
        calls: AtomicUsize::new(0),
        delay,
    });
    let clock = Arc::new(ManualClock::new());
    let cache = Arc::new(ValidatingCache::with_clock(
        Arc::clone(&counting) as Arc<dyn ContentResolver>,
        storage,
        settings,
        Arc::clone(&clock) as Arc<dyn Clock>,
    ));
    Fixture {
        store,
        clock,
        counting,
        cache,
    }
}

fn fixture() -> Fixture {
    fixture_with(settings(), Duration::ZERO)
}

fn t(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

#[test]
fn repeated_resolve_within_window_hits_once() {
    let f = fixture();
    f.store.insert("/a.txt", b"hello".to_vec(), t(1)).unwrap();

    let first = f.cache.resolve("/a.txt").unwrap().unwrap();
    f.clock.advance(WINDOW / 2);
    let second = f.cache.resolve("/./a.txt").unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.etag(), second.etag());
    assert_eq!(first.len(), second.len());
    assert_eq!(first.modified(), second.modified());
    assert_eq!(first.content_type(), second.content_type());
    assert_eq!(f.calls(), 1);
    let stats = f.cache.stats();
    assert_eq!((stats.misses, stats.hits), (1, 1));
}

#[test]
fn stale_entry_reloads_when_storage_changed() {
    let f = fixture();
    f.store.insert("/f.txt", b"one".to_vec(), t(1)).unwrap();
    assert_eq!(f.cache.resolve("/f.txt").unwrap().unwrap().len(), 3);

    f.store.insert("/f.txt", b"three".to_vec(), t(2)).unwrap();
    f.clock.advance(WINDOW - Duration::from_millis(1));
    assert_eq!(f.cache.resolve("/f.txt").unwrap().unwrap().len(), 3, "still within window");

    f.clock.advance(Duration::from_millis(1));
    let d = f.cache.resolve("/f.txt").unwrap().unwrap();
    assert_eq!(d.len(), 5);
    assert_eq!(d.modified(), t(2));
    assert_eq!(f.calls(), 2);
    assert_eq!(f.cache.stats().reloads, 1);
}

#[test]
fn stale_entry_is_restamped_when_unchanged() {
    let f = fixture();
    f.store.insert("/same.txt", b"x".to_vec(), t(1)).unwrap();
    let first = f.cache.resolve("/same.txt").unwrap().unwrap();

    f.clock.advance(WINDOW * 3);
    let again = f.cache.resolve("/same.txt").unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(f.calls(), 1);
    assert_eq!(f.cache.stats().revalidations, 1);

    // Fresh again after the re-stamp.
    f.clock.advance(WINDOW / 2);
    f.cache.resolve("/same.txt").unwrap();
    assert_eq!(f.cache.stats().revalidations, 1);
    assert_eq!(f.cache.stats().hits, 1);
}

#[test]
fn misses_are_cached_for_the_window() {
    let f = fixture();
    assert!(f.cache.resolve("/late.txt").unwrap().is_none());
    f.store.insert("/late.txt", b"now here".to_vec(), t(1)).unwrap();

    assert!(f.cache.resolve("/late.txt").unwrap().is_none());
    assert_eq!(f.calls(), 1);
    assert!(f.cache.contains("/late.txt"));
    assert_eq!(f.cache.weight(), ENTRY_OVERHEAD);

    f.clock.advance(WINDOW);
    assert_eq!(f.cache.resolve("/late.txt").unwrap().unwrap().len(), 8);
}

#[test]
fn changed_variant_forces_reload() {
    let f = fixture();
    f.store.insert("/app.js", b"body".to_vec(), t(1)).unwrap();
    f.store.insert("/app.js.gz", b"gz".to_vec(), t(1)).unwrap();
    let d = f.cache.resolve("/app.js").unwrap().unwrap();
    assert_eq!(d.variant("gzip").unwrap().len(), 2);

    f.store.insert("/app.js.gz", b"gzip!".to_vec(), t(2)).unwrap();
    f.clock.advance(WINDOW);
    let d = f.cache.resolve("/app.js").unwrap().unwrap();
    assert_eq!(d.variant("gzip").unwrap().len(), 5);
    assert_eq!(f.cache.stats().reloads, 1);
}

#[test]
fn least_recently_validated_entry_is_evicted_first() {
    let per_entry = ENTRY_OVERHEAD + 100;
    let f = fixture_with(
        CacheSettings {
            max_bytes: per_entry * 3 - 1,
            ..settings()
        },
        Duration::ZERO,
    );
    for name in ["/a", "/b", "/c"] {
        f.store.insert(name, vec![0u8; 100], t(1)).unwrap();
    }

    f.cache.resolve("/a").unwrap();
    f.cache.resolve("/b").unwrap();
    assert_eq!(f.cache.weight(), per_entry * 2);

    // Re-validating /a makes /b the oldest.
    f.clock.advance(WINDOW);
    f.cache.resolve("/a").unwrap();
    f.cache.resolve("/c").unwrap();

    assert!(f.cache.contains("/a"));
    assert!(!f.cache.contains("/b"));
    assert!(f.cache.contains("/c"));
    assert_eq!(f.cache.len(), 2);
    assert_eq!(f.cache.weight(), per_entry * 2);
    assert_eq!(f.cache.stats().evictions, 1);
}

#[test]
fn entry_count_ceiling_is_enforced() {
    let f = fixture_with(
        CacheSettings {
            max_entries: 2,
            ..settings()
        },
        Duration::ZERO,
    );
    for p in ["/x", "/y", "/z"] {
        f.cache.resolve(p).unwrap();
    }
    assert_eq!(f.cache.len(), 2);
    assert!(!f.cache.contains("/x"));
    assert_eq!(f.cache.stats().evictions, 1);
}

#[test]
fn oversized_content_is_served_but_not_cached() {
    let f = fixture_with(
        CacheSettings {
            max_bytes: ENTRY_OVERHEAD + 10,
            ..settings()
        },
        Duration::ZERO,
    );
    f.store.insert("/huge.bin", vec![1u8; 100], t(1)).unwrap();
    let d = f.cache.resolve("/huge.bin").unwrap().unwrap();
    assert_eq!(d.len(), 100);
    assert!(f.cache.is_empty());
    assert_eq!(f.cache.weight(), 0);
    f.cache.resolve("/huge.bin").unwrap();
    assert_eq!(f.calls(), 2);
}

#[test]
fn traversal_and_bad_paths_bypass_the_cache() {
    let f = fixture();
    assert!(f.cache.resolve("/../../etc/passwd").unwrap().is_none());
    let err = f.cache.resolve("/bad%zz").unwrap_err();
    assert_eq!(err.path(), "/bad%zz");
    assert!(f.cache.is_empty());
    assert_eq!(f.calls(), 0);
}

#[test]
fn invalidate_and_clear_release_budget() {
    let f = fixture();
    f.store.insert("/one", b"1".to_vec(), t(1)).unwrap();
    f.cache.resolve("/one").unwrap();
    f.cache.resolve("/two").unwrap();
    assert!(f.cache.invalidate("/one"));
    assert!(!f.cache.invalidate("/one"));
    assert_eq!(f.cache.weight(), ENTRY_OVERHEAD);
    f.cache.clear();
    assert!(f.cache.is_empty());
    assert_eq!(f.cache.weight(), 0);
}

#[test]
fn concurrent_misses_resolve_once() {
    let f = fixture_with(settings(), Duration::from_millis(30));
    f.store.insert("/hot.txt", b"hot".to_vec(), t(1)).unwrap();

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let d = f.cache.resolve("/hot.txt").unwrap().unwrap();
                assert_eq!(d.len(), 3);
            });
        }
    });
    assert_eq!(f.calls(), 1);
    assert_eq!(f.cache.len(), 1);
}

#[test]
fn concurrent_stale_reload_runs_once() {
    let f = fixture_with(settings(), Duration::from_millis(30));
    f.store.insert("/hot.txt", b"v1".to_vec(), t(1)).unwrap();
    f.cache.resolve("/hot.txt").unwrap();
    f.store.insert("/hot.txt", b"version two".to_vec(), t(2)).unwrap();
    f.clock.advance(WINDOW);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let d = f.cache.resolve("/hot.txt").unwrap().unwrap();
                assert_eq!(d.len(), 11);
                assert_eq!(d.modified(), t(2));
            });
        }
    });
    assert_eq!(f.calls(), 2);
    assert_eq!(f.cache.stats().reloads, 1);
    assert_eq!(f.cache.len(), 1);
    assert_eq!(f.cache.weight(), ENTRY_OVERHEAD + 11);
    let d = f.cache.resolve("/hot.txt").unwrap().unwrap();
    assert_eq!(d.read_all().unwrap(), b"version two");
}

#[cfg(unix)]
#[test]
fn fifo_is_missing_and_never_read() {
    let dir = tempfile::tempdir().unwrap();
    let status = std::process::Command::new("mkfifo")
        .arg(dir.path().join("pipe.txt"))
        .status()
        .unwrap();
    assert!(status.success());
    let storage: Arc<dyn Storage> = Arc::new(FsRoot::open(dir.path()).unwrap());
    let base = Arc::new(BaseResolver::new(Arc::clone(&storage), MimeTable::new()));
    let cache = Arc::new(ValidatingCache::new(base, storage, settings()));

    let (tx, rx) = std::sync::mpsc::channel();
    let worker = Arc::clone(&cache);
    std::thread::spawn(move || {
        let _ = tx.send(worker.resolve("/pipe.txt").map(|d| d.is_none()));
    });
    let missing = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("resolve blocked on a fifo")
        .unwrap();
    assert!(missing);
    assert!(cache.resolve("/pipe.txt").unwrap().is_none());
}

#[test]
fn small_filesystem_files_are_buffered() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("small.txt"), b"0123456789").unwrap();
    std::fs::write(dir.path().join("big.bin"), vec![9u8; 200]).unwrap();
    let storage: Arc<dyn Storage> = Arc::new(FsRoot::open(dir.path()).unwrap());
    let base = Arc::new(BaseResolver::new(Arc::clone(&storage), MimeTable::new()));
    let cache = ValidatingCache::new(
        base,
        storage,
        CacheSettings {
            max_buffered_file_bytes: 64,
            ..settings()
        },
    );

    let small = cache.resolve("/small.txt").unwrap().unwrap();
    assert_eq!(small.buffer(), Some(&b"0123456789"[..]));
    let big = cache.resolve("/big.bin").unwrap().unwrap();
    assert!(big.buffer().is_none());
    assert_eq!(big.read_all().unwrap().len(), 200);
    assert_eq!(cache.weight(), 2 * ENTRY_OVERHEAD + 10 + 200);
}

#[test]
fn sweep_drops_idle_entries() {
    let f = fixture();
    f.store.insert("/old", b"o".to_vec(), t(1)).unwrap();
    f.cache.resolve("/old").unwrap();
    f.clock.advance(WINDOW * 2);
    f.cache.resolve("/new").unwrap();

    assert_eq!(f.cache.sweep(WINDOW * 2), 1);
    assert!(!f.cache.contains("/old"));
    assert!(f.cache.contains("/new"));
    assert_eq!(f.cache.weight(), ENTRY_OVERHEAD);
}

#[tokio::test]
async fn background_sweeper_empties_idle_cache() {
    let f = fixture();
    f.store.insert("/idle", b"i".to_vec(), t(1)).unwrap();
    f.cache.resolve("/idle").unwrap();
    f.clock.advance(WINDOW * 10);

    let handle = spawn_sweeper(Arc::clone(&f.cache), Duration::from_millis(5), 2);
    for _ in 0..100 {
        if f.cache.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    handle.abort();
    assert!(f.cache.is_empty());
}

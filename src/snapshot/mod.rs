//! Per-tab page snapshots for the tab overview
//!
//! Snapshots live in memory for synchronous lookup and are mirrored to one
//! JPEG per tab on disk. Disk work runs on the blocking pool; its failures
//! are logged and never surface to callers.
//!
//! Every tab carries a generation number that `remove`/`clear_all` bump. A
//! capture or disk load that started under an older generation is discarded
//! when it completes, so late results never resurrect a deleted tab.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use tokio::task::JoinHandle;

use crate::config::SnapshotConfig;
use crate::engine::PageEngine;
use crate::session::TabId;
use crate::utils::Result;

/// A downsampled tab snapshot
pub type Snapshot = Arc<RgbaImage>;

const SNAPSHOT_EXTENSION: &str = "jpg";

/// Generation of one tab, kept only while a capture or load holds it
#[derive(Debug, Default)]
struct Lease {
    generation: u64,
    holders: usize,
}

#[derive(Default)]
struct SnapshotState {
    images: HashMap<TabId, Snapshot>,
    leases: HashMap<TabId, Lease>,
    epoch: u64,
}

impl SnapshotState {
    fn token(&self, tab_id: TabId) -> (u64, u64) {
        let generation = self.leases.get(&tab_id).map_or(0, |l| l.generation);
        (self.epoch, generation)
    }
}

type SharedState = Arc<Mutex<SnapshotState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, SnapshotState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Token held by an in-progress capture or load
///
/// Dropping the last lease of a tab forgets its generation.
struct TokenLease {
    state: SharedState,
    tab_id: TabId,
    token: (u64, u64),
}

impl TokenLease {
    fn acquire(state: &SharedState, tab_id: TabId) -> Self {
        let token = {
            let mut guard = lock(state);
            guard.leases.entry(tab_id).or_default().holders += 1;
            guard.token(tab_id)
        };
        Self {
            state: state.clone(),
            tab_id,
            token,
        }
    }

    fn is_current(&self, state: &SnapshotState) -> bool {
        state.token(self.tab_id) == self.token
    }
}

impl Drop for TokenLease {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if let Some(lease) = state.leases.get_mut(&self.tab_id) {
            lease.holders = lease.holders.saturating_sub(1);
            if lease.holders == 0 {
                state.leases.remove(&self.tab_id);
            }
        }
    }
}

/// Memory + disk cache of tab snapshots
pub struct SnapshotCache {
    dir: PathBuf,
    target_width: u32,
    quality: u8,
    state: SharedState,
    /// Held by every disk task so writes and deletions never interleave
    io: Arc<Mutex<()>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl SnapshotCache {
    pub fn new(dir: impl Into<PathBuf>, target_width: u32, quality: u8) -> Self {
        Self {
            dir: dir.into(),
            target_width: target_width.max(1),
            quality: quality.clamp(1, 100),
            state: Arc::new(Mutex::new(SnapshotState::default())),
            io: Arc::new(Mutex::new(())),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(dir: impl Into<PathBuf>, config: &SnapshotConfig) -> Self {
        Self::new(dir, config.target_width, config.quality)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing the snapshot of `tab_id`
    pub fn path_for(&self, tab_id: TabId) -> PathBuf {
        self.dir.join(format!("{tab_id}.{SNAPSHOT_EXTENSION}"))
    }

    /// Capture the engine's current content for `tab_id`
    ///
    /// Returns `false` when nothing was captured: the engine is empty, the
    /// capture failed (the previous snapshot stays), or the tab was removed
    /// while capturing.
    pub async fn capture(&self, tab_id: TabId, engine: &dyn PageEngine) -> bool {
        if engine.url().is_none() {
            return false;
        }
        let lease = TokenLease::acquire(&self.state, tab_id);

        let raw = match engine.capture_snapshot().await {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Snapshot capture failed for tab {}: {}", tab_id, e);
                return false;
            }
        };

        let target_width = self.target_width;
        let image = match tokio::task::spawn_blocking(move || downsample(raw, target_width)).await {
            Ok(image) => Arc::new(image),
            Err(e) => {
                log::warn!("Snapshot resize failed for tab {}: {}", tab_id, e);
                return false;
            }
        };

        {
            let mut state = lock(&self.state);
            if !lease.is_current(&state) {
                log::debug!("Discarding late snapshot for removed tab {}", tab_id);
                return false;
            }
            state.images.insert(tab_id, image.clone());
        }

        let path = self.path_for(tab_id);
        let quality = self.quality;
        self.spawn_io(move || {
            if !lease.is_current(&lock(&lease.state)) {
                return;
            }
            if let Err(e) = write_jpeg(&path, &image, quality) {
                log::warn!("Failed to write snapshot {}: {}", path.display(), e);
            }
        });
        true
    }

    /// In-memory lookup
    pub fn get(&self, tab_id: TabId) -> Option<Snapshot> {
        lock(&self.state).images.get(&tab_id).cloned()
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        lock(&self.state).images.contains_key(&tab_id)
    }

    /// Number of snapshots held in memory
    pub fn len(&self) -> usize {
        lock(&self.state).images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load every recognized snapshot file into memory
    ///
    /// Files whose name is not a tab id are skipped. Returns the number of
    /// snapshots loaded.
    pub async fn load_all(&self) -> usize {
        let dir = self.dir.clone();
        let files = match tokio::task::spawn_blocking(move || scan_dir(&dir)).await {
            Ok(files) => files,
            Err(e) => {
                log::warn!("Snapshot scan failed: {}", e);
                return 0;
            }
        };

        let mut loaded = 0;
        for (tab_id, path) in files {
            let lease = TokenLease::acquire(&self.state, tab_id);
            let decoded =
                tokio::task::spawn_blocking(move || image::open(&path).map(|img| img.to_rgba8()))
                    .await;

            let image = match decoded {
                Ok(Ok(image)) => Arc::new(image),
                Ok(Err(e)) => {
                    log::warn!("Skipping unreadable snapshot for tab {}: {}", tab_id, e);
                    continue;
                }
                Err(e) => {
                    log::warn!("Snapshot load task failed: {}", e);
                    continue;
                }
            };

            let mut state = lock(&self.state);
            // A fresher in-memory capture wins over the file
            if lease.is_current(&state) && !state.images.contains_key(&tab_id) {
                state.images.insert(tab_id, image);
                loaded += 1;
            }
        }

        log::info!("Loaded {} snapshot(s) from {}", loaded, self.dir.display());
        loaded
    }

    /// Forget the snapshot of `tab_id` and delete its file
    pub fn remove(&self, tab_id: TabId) {
        {
            let mut state = lock(&self.state);
            state.images.remove(&tab_id);
            if let Some(lease) = state.leases.get_mut(&tab_id) {
                lease.generation += 1;
            }
        }
        let path = self.path_for(tab_id);
        self.spawn_io(move || remove_file(&path));
    }

    /// Forget every snapshot and delete all snapshot files
    pub fn clear_all(&self) {
        {
            let mut state = lock(&self.state);
            state.images.clear();
            state.epoch += 1;
        }
        let dir = self.dir.clone();
        self.spawn_io(move || {
            for (_, path) in scan_dir(&dir) {
                remove_file(&path);
            }
        });
    }

    /// Drop snapshots (memory and disk) of tabs not in `live`
    pub fn retain(&self, live: &HashSet<TabId>) {
        let stale: Vec<TabId> = lock(&self.state)
            .images
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        for tab_id in stale {
            self.remove(tab_id);
        }

        let dir = self.dir.clone();
        let live = live.clone();
        self.spawn_io(move || {
            for (tab_id, path) in scan_dir(&dir) {
                if !live.contains(&tab_id) {
                    remove_file(&path);
                }
            }
        });
    }

    /// Wait for all background disk work started so far
    pub async fn flush(&self) {
        let pending: Vec<JoinHandle<()>> = match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => return,
        };
        for handle in pending {
            if let Err(e) = handle.await {
                log::warn!("Snapshot disk task failed: {}", e);
            }
        }
    }

    /// Run blocking disk work off the caller's thread when a runtime exists
    fn spawn_io(&self, work: impl FnOnce() + Send + 'static) {
        let io = self.io.clone();
        let work = move || {
            let _io = io.lock().unwrap_or_else(|e| e.into_inner());
            work()
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let handle = runtime.spawn_blocking(work);
                if let Ok(mut pending) = self.pending.lock() {
                    pending.retain(|h| !h.is_finished());
                    pending.push(handle);
                }
            }
            Err(_) => work(),
        }
    }
}

/// Scale `image` down to `target_width`, preserving aspect ratio
fn downsample(image: RgbaImage, target_width: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width <= target_width || width == 0 {
        return image;
    }
    let target_height =
        ((u64::from(height) * u64::from(target_width)) / u64::from(width)).max(1) as u32;
    imageops::resize(&image, target_width, target_height, FilterType::Triangle)
}

fn write_jpeg(path: &Path, image: &RgbaImage, quality: u8) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let tmp = path.with_extension("jpg.tmp");
    {
        let file = fs::File::create(&tmp)?;
        let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality);
        encoder.encode_image(&rgb)?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to delete snapshot {}: {}", path.display(), e),
    }
}

/// Snapshot files in `dir` keyed by the tab id encoded in their name
fn scan_dir(dir: &Path) -> Vec<(TabId, PathBuf)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Cannot read snapshot directory {}: {}", dir.display(), e);
            }
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(SNAPSHOT_EXTENSION))
        .filter_map(|path| {
            let tab_id = path.file_stem()?.to_str()?.parse::<TabId>().ok()?;
            Some((tab_id, path))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ScriptedEngine, ScriptedWeb, TabNavigationSink};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn engine(tab_id: TabId) -> ScriptedEngine {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sink = Arc::new(TabNavigationSink::new(tab_id, tx));
        ScriptedEngine::new(tab_id, Arc::new(ScriptedWeb::new()), sink)
    }

    #[test]
    fn test_downsample_preserves_aspect_ratio() {
        let image = RgbaImage::new(390, 844);
        let small = downsample(image, 300);
        assert_eq!(small.dimensions(), (300, 649));

        let narrow = downsample(RgbaImage::new(100, 50), 300);
        assert_eq!(narrow.dimensions(), (100, 50));
    }

    #[tokio::test]
    async fn test_capture_without_content_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), 300, 70);
        let tab_id = TabId::new();

        assert!(!cache.capture(tab_id, &engine(tab_id)).await);
        cache.flush().await;

        assert!(cache.get(tab_id).is_none());
        assert!(!cache.path_for(tab_id).exists());
    }

    #[tokio::test]
    async fn test_capture_stores_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), 300, 70);
        let tab_id = TabId::new();
        let engine = engine(tab_id);
        engine.load("https://example.com/");

        assert!(cache.capture(tab_id, &engine).await);
        cache.flush().await;

        let snapshot = cache.get(tab_id).unwrap();
        assert_eq!(snapshot.width(), 300);
        assert!(cache.path_for(tab_id).exists());
    }

    #[tokio::test]
    async fn test_load_all_restores_and_skips_unknown_files() {
        let dir = tempfile::tempdir().unwrap();
        let tab_id = TabId::new();
        {
            let cache = SnapshotCache::new(dir.path(), 300, 70);
            let engine = engine(tab_id);
            engine.load("https://example.com/");
            cache.capture(tab_id, &engine).await;
            cache.flush().await;
        }
        fs::write(dir.path().join("notes.jpg"), b"junk").unwrap();
        fs::write(dir.path().join("README.txt"), b"junk").unwrap();

        let cache = SnapshotCache::new(dir.path(), 300, 70);
        assert_eq!(cache.load_all().await, 1);
        assert!(cache.get(tab_id).is_some());
    }

    #[tokio::test]
    async fn test_remove_and_clear_delete_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), 300, 70);
        let a = TabId::new();
        let b = TabId::new();
        for id in [a, b] {
            let engine = engine(id);
            engine.load("https://example.com/");
            cache.capture(id, &engine).await;
        }
        cache.flush().await;

        cache.remove(a);
        cache.flush().await;
        assert!(cache.get(a).is_none());
        assert!(!cache.path_for(a).exists());
        assert!(cache.path_for(b).exists());

        cache.clear_all();
        cache.flush().await;
        assert!(cache.is_empty());
        assert!(!cache.path_for(b).exists());
    }

    #[tokio::test]
    async fn test_retain_prunes_unknown_tabs() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), 300, 70);
        let keep = TabId::new();
        let gone = TabId::new();
        for id in [keep, gone] {
            let engine = engine(id);
            engine.load("https://example.com/");
            cache.capture(id, &engine).await;
        }
        cache.flush().await;

        cache.retain(&HashSet::from([keep]));
        cache.flush().await;

        assert!(cache.contains(keep));
        assert!(!cache.contains(gone));
        assert!(!cache.path_for(gone).exists());
    }

    #[tokio::test]
    async fn test_removal_invalidates_pending_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), 300, 70);
        let tab_id = TabId::new();

        let lease = TokenLease::acquire(&cache.state, tab_id);
        assert!(lease.is_current(&lock(&cache.state)));
        cache.remove(tab_id);
        assert!(!lease.is_current(&lock(&cache.state)));

        let fresh = TokenLease::acquire(&cache.state, tab_id);
        cache.clear_all();
        assert!(!fresh.is_current(&lock(&cache.state)));
    }

    #[tokio::test]
    async fn test_released_leases_are_forgotten() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), 300, 70);
        let tab_id = TabId::new();
        let engine = engine(tab_id);
        engine.load("https://example.com/");

        cache.capture(tab_id, &engine).await;
        cache.remove(tab_id);
        for _ in 0..10 {
            cache.remove(TabId::new());
        }
        cache.flush().await;

        assert!(lock(&cache.state).leases.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_remove_during_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), 300, 70);

        for round in 0..50u64 {
            let tab_id = TabId::new();
            let engine = engine(tab_id);
            engine.load("https://example.com/");

            assert!(cache.capture(tab_id, &engine).await);
            tokio::time::sleep(Duration::from_micros(round * 10)).await;
            cache.remove(tab_id);
            cache.flush().await;

            assert!(!cache.path_for(tab_id).exists(), "snapshot survived removal in round {round}");
            assert_eq!(cache.load_all().await, 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_clear_during_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), 300, 70);

        for _ in 0..20 {
            let tab_id = TabId::new();
            let engine = engine(tab_id);
            engine.load("https://example.com/");

            cache.capture(tab_id, &engine).await;
            cache.clear_all();
            cache.flush().await;

            assert!(!cache.path_for(tab_id).exists());
        }
    }
}

//! Tracked grid store with JSON persistence

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use log::{debug, info};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::errors::{GridError, GridResult};
use super::types::TrackedGrid;

/// Symbol -> order ids of that symbol's grid
pub type GridStateMap = BTreeMap<String, TrackedGrid>;

/// Durable storage boundary for the store
pub trait StatePersistence: Send + Sync {
    /// Load the saved map; absent storage is an empty map
    fn load(&self) -> GridResult<GridStateMap>;

    /// Replace the saved map
    fn save(&self, state: &GridStateMap) -> GridResult<()>;
}

/// Pretty-printed JSON file, written atomically
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatePersistence for JsonFilePersistence {
    fn load(&self) -> GridResult<GridStateMap> {
        if !self.path.exists() {
            info!("No state file at {:?}, starting empty", self.path);
            return Ok(GridStateMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(GridStateMap::new());
        }
        let state: GridStateMap = serde_json::from_str(&content)?;
        Ok(state)
    }

    fn save(&self, state: &GridStateMap) -> GridResult<()> {
        let temp_path = self.path.with_extension("tmp");
        let content = serde_json::to_string_pretty(state)?;
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// In-memory persistence, mainly for tests
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    saved: StdMutex<Option<GridStateMap>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved map, if any save happened
    pub fn saved(&self) -> Option<GridStateMap> {
        self.saved.lock().ok().and_then(|s| s.clone())
    }
}

impl StatePersistence for MemoryPersistence {
    fn load(&self) -> GridResult<GridStateMap> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, state: &GridStateMap) -> GridResult<()> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|e| GridError::StatePersistence(e.to_string()))?;
        *saved = Some(state.clone());
        Ok(())
    }
}

/// Process-wide store of tracked grids
///
/// Every mutation is persisted before the write lock is released. Callers that
/// run a multi-step operation on one symbol hold [`GridStateStore::lock_symbol`]
/// for its whole duration.
pub struct GridStateStore {
    grids: RwLock<GridStateMap>,
    persistence: Arc<dyn StatePersistence>,
    symbol_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GridStateStore {
    /// Load the store from its persistence
    pub fn load(persistence: Arc<dyn StatePersistence>) -> GridResult<Self> {
        let grids = persistence.load()?;
        info!("Loaded {} tracked grid(s)", grids.len());
        Ok(Self {
            grids: RwLock::new(grids),
            persistence,
            symbol_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Exclusive access to one symbol for the duration of the guard
    ///
    /// Locks nobody holds or waits on are dropped, so the table only keeps
    /// symbols with an operation in flight.
    pub async fn lock_symbol(&self, symbol: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.symbol_locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub async fn get(&self, symbol: &str) -> Option<TrackedGrid> {
        self.grids.read().await.get(symbol).cloned()
    }

    pub async fn contains(&self, symbol: &str) -> bool {
        self.grids.read().await.contains_key(symbol)
    }

    /// Copy of the whole map
    pub async fn snapshot(&self) -> GridStateMap {
        self.grids.read().await.clone()
    }

    /// Record a grid and persist
    ///
    /// The in-memory entry is kept even if persisting fails.
    pub async fn insert(&self, symbol: &str, grid: TrackedGrid) -> GridResult<()> {
        let mut grids = self.grids.write().await;
        grids.insert(symbol.to_string(), grid);
        self.persist(&grids).await
    }

    /// Remove a grid and persist, returning what was tracked
    pub async fn remove(&self, symbol: &str) -> GridResult<Option<TrackedGrid>> {
        let mut grids = self.grids.write().await;
        let removed = grids.remove(symbol);
        self.persist(&grids).await?;
        Ok(removed)
    }

    /// Write the current map to persistence
    pub async fn flush(&self) -> GridResult<()> {
        let grids = self.grids.read().await;
        self.persist(&grids).await
    }

    /// Save off the runtime threads; callers keep their map lock until it lands
    async fn persist(&self, grids: &GridStateMap) -> GridResult<()> {
        let persistence = self.persistence.clone();
        let snapshot = grids.clone();
        tokio::task::spawn_blocking(move || persistence.save(&snapshot))
            .await
            .map_err(|e| GridError::StatePersistence(format!("save task failed: {}", e)))??;
        debug!("Persisted {} tracked grid(s)", grids.len());
        Ok(())
    }

    #[cfg(test)]
    async fn lock_table_len(&self) -> usize {
        self.symbol_locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(base: u64) -> TrackedGrid {
        TrackedGrid {
            grid: vec![base.to_string(), (base + 1).to_string()],
            sl: Some((base + 2).to_string()),
            tp: vec![(base + 3).to_string()],
        }
    }

    fn temp_state_path() -> PathBuf {
        std::env::temp_dir().join(format!("grid_state_{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_file_round_trip() {
        let path = temp_state_path();
        let persistence = JsonFilePersistence::new(&path);

        let mut state = GridStateMap::new();
        state.insert("BTCUSDT".into(), tracked(10));
        state.insert(
            "ETHUSDT".into(),
            TrackedGrid {
                grid: vec!["7".into()],
                sl: None,
                tp: vec![],
            },
        );

        persistence.save(&state).unwrap();
        let loaded = persistence.load().unwrap();
        assert_eq!(loaded, state);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_empty() {
        let persistence = JsonFilePersistence::new(temp_state_path());
        assert!(persistence.load().unwrap().is_empty());
    }

    #[test]
    fn test_reads_legacy_record_shape() {
        let path = temp_state_path();
        std::fs::write(
            &path,
            r#"{"BTCUSDT": {"grid": ["1", "2"], "sl": "3", "tp": ["4", "5"]}}"#,
        )
        .unwrap();

        let loaded = JsonFilePersistence::new(&path).load().unwrap();
        let grid = &loaded["BTCUSDT"];
        assert_eq!(grid.grid, vec!["1", "2"]);
        assert_eq!(grid.sl.as_deref(), Some("3"));
        assert_eq!(grid.tp, vec!["4", "5"]);

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_store_persists_every_mutation() {
        let persistence = Arc::new(MemoryPersistence::new());
        let store = GridStateStore::load(persistence.clone()).unwrap();

        store.insert("BTCUSDT", tracked(1)).await.unwrap();
        assert_eq!(persistence.saved().unwrap().len(), 1);

        let removed = store.remove("BTCUSDT").await.unwrap();
        assert_eq!(removed, Some(tracked(1)));
        // An empty map is written too, so the cancelled grid does not come back
        assert_eq!(persistence.saved(), Some(GridStateMap::new()));
    }

    #[tokio::test]
    async fn test_store_reload() {
        let path = temp_state_path();
        {
            let store =
                GridStateStore::load(Arc::new(JsonFilePersistence::new(&path))).unwrap();
            store.insert("BTCUSDT", tracked(1)).await.unwrap();
            store.insert("SOLUSDT", tracked(20)).await.unwrap();
            store.flush().await.unwrap();
        }

        let store = GridStateStore::load(Arc::new(JsonFilePersistence::new(&path))).unwrap();
        assert_eq!(store.get("SOLUSDT").await, Some(tracked(20)));
        assert_eq!(store.snapshot().await.len(), 2);

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_symbol_lock_serializes() {
        let store = Arc::new(GridStateStore::load(Arc::new(MemoryPersistence::new())).unwrap());

        let guard = store.lock_symbol("BTCUSDT").await;

        // Another symbol is independent
        let other = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            store.lock_symbol("ETHUSDT"),
        )
        .await;
        assert!(other.is_ok());

        // The same symbol waits for the first guard
        let same = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.lock_symbol("BTCUSDT"),
        )
        .await;
        assert!(same.is_err());

        drop(guard);
        let same = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            store.lock_symbol("BTCUSDT"),
        )
        .await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn test_idle_symbol_locks_are_dropped() {
        let store = GridStateStore::load(Arc::new(MemoryPersistence::new())).unwrap();

        for i in 0..50 {
            let _guard = store.lock_symbol(&format!("JUNK{}", i)).await;
        }
        // Each call prunes what the previous guard released
        assert_eq!(store.lock_table_len().await, 1);

        let held = store.lock_symbol("BTCUSDT").await;
        let _other = store.lock_symbol("ETHUSDT").await;
        assert_eq!(store.lock_table_len().await, 2);
        drop(held);

        let _next = store.lock_symbol("SOLUSDT").await;
        // BTCUSDT is idle again, ETHUSDT is still held
        assert_eq!(store.lock_table_len().await, 2);
    }
}

//! Navigation facade: neighbor lookup, ranked search and graph statistics
//! over lazily acquired graph and index handles.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{self, Direction, GraphStats, GraphStore, Neighbor};
use crate::error::{NavError, Result};
use crate::search::{ChunkIndex, SearchHit};

/// Opens a graph store on first use and again after [`Navigator::reload`].
pub type GraphOpener = Box<dyn Fn() -> Result<Box<dyn GraphStore>> + Send + Sync>;

pub struct Navigator {
    open_graph: GraphOpener,
    index_path: PathBuf,
    graph: Mutex<Option<Box<dyn GraphStore>>>,
    index: RwLock<Option<Arc<ChunkIndex>>>,
}

impl Navigator {
    pub fn new(open_graph: GraphOpener, index_path: impl Into<PathBuf>) -> Self {
        Self {
            open_graph,
            index_path: index_path.into(),
            graph: Mutex::new(None),
            index: RwLock::new(None),
        }
    }

    /// Graph backend and index location taken from `config`.
    pub fn from_config(config: &Config) -> Self {
        let graph_config = config.graph.clone();
        Self::new(
            Box::new(move || db::open_store(&graph_config)),
            config.index.path.clone(),
        )
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn neighbors(&self, path: &str, direction: Direction) -> Result<Vec<Neighbor>> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Err(NavError::InvalidArgument("file path is required".to_string()));
        }
        self.with_graph(|graph| graph.neighbors(&path, direction))
    }

    pub fn search(&self, query: &str, top_n: usize) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(NavError::InvalidArgument("query is required".to_string()));
        }
        if top_n == 0 {
            return Err(NavError::InvalidArgument("top_n must be at least 1".to_string()));
        }
        Ok(self.index()?.search(query, top_n))
    }

    pub fn stats(&self) -> Result<GraphStats> {
        self.with_graph(|graph| graph.stats())
    }

    /// Drops both handles; the next call reacquires them, picking up a rebuild.
    pub fn reload(&self) -> Result<()> {
        let closed = self.close_graph();
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = None;
        info!("Navigator handles released; next call reloads graph and index");
        closed
    }

    pub fn close(&self) -> Result<()> {
        self.reload()
    }

    fn close_graph(&self) -> Result<()> {
        let mut guard = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            Some(mut graph) => graph.close(),
            None => Ok(()),
        }
    }

    fn with_graph<T>(&self, f: impl FnOnce(&mut Box<dyn GraphStore>) -> Result<T>) -> Result<T> {
        let mut guard = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        let store = match guard.take() {
            Some(store) => store,
            None => {
                let store = (self.open_graph)()?;
                debug!("Opened {} graph store", store.backend_name());
                store
            }
        };
        let store = guard.insert(store);

        let result = f(store);
        if let Err(e @ NavError::DatastoreUnavailable { .. }) = &result {
            warn!("Dropping graph handle: {e}");
            *guard = None;
        }
        result
    }

    fn index(&self) -> Result<Arc<ChunkIndex>> {
        if let Some(index) = self.index.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(index));
        }
        let mut guard = self.index.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = guard.as_ref() {
            return Ok(Arc::clone(index));
        }
        let loaded = Arc::new(ChunkIndex::load(&self.index_path)?);
        debug!(
            "Loaded chunk index of {} ({} chunks, built at {} ms)",
            loaded.root(),
            loaded.len(),
            loaded.built_at_unix_ms()
        );
        *guard = Some(Arc::clone(&loaded));
        Ok(loaded)
    }
}

/// `./pkg\mod.py` → `pkg/mod.py`
fn normalize_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    let mut rest = path.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.to_string()
}

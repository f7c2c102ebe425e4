//! Graph store: `File` nodes and typed structural relationships.
//!
//! Two backends implement [`GraphStore`]: an embedded SQLite property graph
//! ([`SqliteGraph`]) and a networked FalkorDB graph ([`falkor::FalkorGraph`])
//! queried with Cypher.
use rusqlite::Connection;
use std::path::Path;
use tracing::{info, warn};

use crate::config::{GraphBackendKind, GraphConfig};
use crate::error::{NavError, Result};

pub mod edge_list;
pub mod falkor;
pub mod models;
pub mod relations;

pub use edge_list::EdgeList;
pub use models::{Direction, GraphStats, Neighbor, Relation, RelationCount, StructuralEdge};

/// Number of edges submitted per bulk statement.
pub const LOAD_BATCH_SIZE: usize = 100;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_file_path ON files(path);

CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL,
    target_id INTEGER NOT NULL,
    relation TEXT NOT NULL,
    meta TEXT,
    FOREIGN KEY (source_id) REFERENCES files(id) ON DELETE CASCADE,
    FOREIGN KEY (target_id) REFERENCES files(id) ON DELETE CASCADE,
    UNIQUE (source_id, target_id, relation)
);

CREATE INDEX IF NOT EXISTS idx_edge_source ON edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edge_target ON edges(target_id);
CREATE INDEX IF NOT EXISTS idx_edge_relation ON edges(relation);
"#;

/// How a batch of edges is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// One statement handles every relation type.
    Generic,
    /// One statement per relation type, for backends without a generic merge.
    PerRelation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub submitted: usize,
    pub strategy: LoadStrategy,
}

/// Persisted property graph of files and structural edges.
///
/// Loading is single-writer; queries are pure reads.
pub trait GraphStore: Send {
    fn backend_name(&self) -> &'static str;

    /// Removes every node and relationship.
    fn clear(&mut self) -> Result<()>;

    /// Merges `edges` into the graph. Reloading the same edges never
    /// creates duplicate relationships.
    fn load_edges(
        &mut self,
        edges: &[StructuralEdge],
        strategy: LoadStrategy,
    ) -> Result<LoadSummary>;

    /// Rows sorted by direction, relation, then neighbor path. Unknown files
    /// and files without edges both yield an empty list.
    fn neighbors(&mut self, path: &str, direction: Direction) -> Result<Vec<Neighbor>>;

    fn stats(&mut self) -> Result<GraphStats>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Loads with the generic strategy, falling back to one statement per
/// relation type when the backend reports the generic merge unsupported.
pub fn load_with_fallback(
    store: &mut dyn GraphStore,
    edges: &[StructuralEdge],
) -> Result<LoadSummary> {
    match store.load_edges(edges, LoadStrategy::Generic) {
        Err(NavError::Unsupported(what)) => {
            let backend = store.backend_name();
            warn!("{what} not available on {backend}, using per-relation loader");
            store.load_edges(edges, LoadStrategy::PerRelation)
        }
        other => other,
    }
}

/// Opens the backend selected in `config`.
pub fn open_store(config: &GraphConfig) -> Result<Box<dyn GraphStore>> {
    match config.backend {
        GraphBackendKind::Sqlite => Ok(Box::new(SqliteGraph::open(&config.db_path)?)),
        GraphBackendKind::Falkor => Ok(Box::new(falkor::FalkorGraph::connect(config)?)),
    }
}

/// SQLite-backed property graph.
pub struct SqliteGraph {
    pub(crate) conn: Connection,
    location: String,
}

impl SqliteGraph {
    /// Open (or create) a graph database at the given path and initialize the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening graph database: {}", path.display());

        let conn = Connection::open(path).map_err(|e| NavError::DatastoreUnavailable {
            endpoint: path.display().to_string(),
            reason: e.to_string(),
            remediation: "Check that graph.db_path (or CODECOMPASS_GRAPH_DB) is writable."
                .to_string(),
        })?;
        Self::init(conn, path.display().to_string())
    }

    /// Open an in-memory graph (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn init(conn: Connection, location: String) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn, location })
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_init() {
        let graph = SqliteGraph::open_in_memory().expect("Failed to open in-memory graph");

        let tables: usize = graph
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master \
                 WHERE type='table' AND name IN ('files', 'edges');",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
        assert_eq!(graph.location(), ":memory:");
    }

    #[test]
    fn test_open_on_disk_is_reopenable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        {
            let mut graph = SqliteGraph::open(&path).unwrap();
            let edge = StructuralEdge::new("a.py", "b.py", Relation::Imports);
            graph.load_edges(&[edge], LoadStrategy::Generic).unwrap();
        }
        let mut graph = SqliteGraph::open(&path).unwrap();
        assert_eq!(graph.stats().unwrap().files, 2);
    }

    struct GenericUnsupported {
        inner: SqliteGraph,
        attempts: Vec<LoadStrategy>,
    }

    impl GraphStore for GenericUnsupported {
        fn backend_name(&self) -> &'static str {
            "test"
        }
        fn clear(&mut self) -> Result<()> {
            self.inner.clear()
        }
        fn load_edges(
            &mut self,
            edges: &[StructuralEdge],
            strategy: LoadStrategy,
        ) -> Result<LoadSummary> {
            self.attempts.push(strategy);
            if strategy == LoadStrategy::Generic {
                return Err(NavError::Unsupported("generic relationship merge".to_string()));
            }
            self.inner.load_edges(edges, strategy)
        }
        fn neighbors(&mut self, path: &str, direction: Direction) -> Result<Vec<Neighbor>> {
            self.inner.neighbors(path, direction)
        }
        fn stats(&mut self) -> Result<GraphStats> {
            self.inner.stats()
        }
    }

    #[test]
    fn test_load_with_fallback_switches_strategy() {
        let mut store = GenericUnsupported {
            inner: SqliteGraph::open_in_memory().unwrap(),
            attempts: Vec::new(),
        };
        let edges = vec![StructuralEdge::new("a.py", "b.py", Relation::Imports)];
        let summary = load_with_fallback(&mut store, &edges).unwrap();
        assert_eq!(summary.strategy, LoadStrategy::PerRelation);
        assert_eq!(store.attempts, vec![LoadStrategy::Generic, LoadStrategy::PerRelation]);
        assert_eq!(store.stats().unwrap().total_edges(), 1);
    }
}

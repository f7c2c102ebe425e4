use super::models::{
    Direction, GraphStats, Neighbor, Relation, RelationCount, StructuralEdge, sort_neighbors,
};
use super::{GraphStore, LOAD_BATCH_SIZE, LoadStrategy, LoadSummary, SqliteGraph};
use crate::error::Result;
use rusqlite::{Row, Transaction, params};
use tracing::{debug, info};

const INSERT_FILE_SQL: &str = "INSERT OR IGNORE INTO files (path) VALUES (?)";

const GENERIC_EDGE_SQL: &str = r#"
    INSERT OR IGNORE INTO edges (source_id, target_id, relation, meta)
    SELECT s.id, t.id, ?3, ?4
    FROM files s JOIN files t ON t.path = ?2
    WHERE s.path = ?1
"#;

const OUTGOING_SQL: &str = r#"
    SELECT t.path, e.relation
    FROM edges e
    JOIN files s ON e.source_id = s.id
    JOIN files t ON e.target_id = t.id
    WHERE s.path = ?
"#;

const INCOMING_SQL: &str = r#"
    SELECT s.path, e.relation
    FROM edges e
    JOIN files s ON e.source_id = s.id
    JOIN files t ON e.target_id = t.id
    WHERE t.path = ?
"#;

fn per_relation_edge_sql(relation: Relation) -> String {
    format!(
        r#"
    INSERT OR IGNORE INTO edges (source_id, target_id, relation, meta)
    SELECT s.id, t.id, '{}', ?3
    FROM files s JOIN files t ON t.path = ?2
    WHERE s.path = ?1
"#,
        relation.as_str()
    )
}

fn map_path_relation(row: &Row<'_>) -> rusqlite::Result<(String, String)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn merge_nodes(tx: &Transaction<'_>, edge: &StructuralEdge) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare_cached(INSERT_FILE_SQL)?;
    stmt.execute(params![edge.source])?;
    stmt.execute(params![edge.target])?;
    Ok(())
}

impl SqliteGraph {
    fn load_generic(&mut self, edges: &[StructuralEdge]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for batch in edges.chunks(LOAD_BATCH_SIZE) {
            let mut stmt = tx.prepare_cached(GENERIC_EDGE_SQL)?;
            for edge in batch.iter().filter(|e| !e.is_self_edge()) {
                merge_nodes(&tx, edge)?;
                stmt.execute(params![edge.source, edge.target, edge.relation.as_str(), edge.meta])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_per_relation(&mut self, edges: &[StructuralEdge]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for relation in Relation::ALL {
            let batch: Vec<&StructuralEdge> = edges
                .iter()
                .filter(|e| e.relation == relation && !e.is_self_edge())
                .collect();
            if batch.is_empty() {
                continue;
            }
            let sql = per_relation_edge_sql(relation);
            for chunk in batch.chunks(LOAD_BATCH_SIZE) {
                let mut stmt = tx.prepare_cached(&sql)?;
                for edge in chunk {
                    merge_nodes(&tx, edge)?;
                    stmt.execute(params![edge.source, edge.target, edge.meta])?;
                }
            }
            debug!("Loaded {} {} edges", batch.len(), relation);
        }
        tx.commit()?;
        Ok(())
    }

    fn query_neighbors(
        &self,
        sql: &str,
        path: &str,
        direction: Direction,
    ) -> Result<Vec<Neighbor>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![path], map_path_relation)?;

        let mut results = Vec::new();
        for row in rows {
            let (neighbor, relation) = row?;
            results.push(Neighbor::new(neighbor, relation.parse()?, direction));
        }
        Ok(results)
    }

    /// Every stored edge, ordered by source, target, relation.
    pub fn export_edges(&self) -> Result<Vec<StructuralEdge>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT s.path, t.path, e.relation, e.meta
            FROM edges e
            JOIN files s ON e.source_id = s.id
            JOIN files t ON e.target_id = t.id
            ORDER BY s.path, t.path, e.relation
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            let (source, target, relation, meta) = row?;
            edges.push(StructuralEdge {
                source,
                target,
                relation: relation.parse()?,
                meta,
            });
        }
        Ok(edges)
    }

    /// All file paths in the graph, sorted.
    pub fn file_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT path FROM files ORDER BY path")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }
}

impl GraphStore for SqliteGraph {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn clear(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            DELETE FROM edges;
            DELETE FROM files;
            DELETE FROM sqlite_sequence WHERE name IN ('files', 'edges');
            "#,
        )?;
        info!("Graph cleared");
        Ok(())
    }

    fn load_edges(
        &mut self,
        edges: &[StructuralEdge],
        strategy: LoadStrategy,
    ) -> Result<LoadSummary> {
        match strategy {
            LoadStrategy::Generic => self.load_generic(edges)?,
            LoadStrategy::PerRelation => self.load_per_relation(edges)?,
        }
        info!("Loaded {} edges into {}", edges.len(), self.location());
        Ok(LoadSummary {
            submitted: edges.len(),
            strategy,
        })
    }

    fn neighbors(&mut self, path: &str, direction: Direction) -> Result<Vec<Neighbor>> {
        let mut rows = Vec::new();
        if direction.includes(Direction::Out) {
            rows.extend(self.query_neighbors(OUTGOING_SQL, path, Direction::Out)?);
        }
        if direction.includes(Direction::In) {
            rows.extend(self.query_neighbors(INCOMING_SQL, path, Direction::In)?);
        }
        sort_neighbors(&mut rows);
        Ok(rows)
    }

    fn stats(&mut self) -> Result<GraphStats> {
        let files: i64 = self.conn.query_row("SELECT count(*) FROM files", [], |row| row.get(0))?;

        let mut stmt = self
            .conn
            .prepare("SELECT relation, count(*) FROM edges GROUP BY relation")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut edges = Vec::new();
        for row in rows {
            let (relation, count) = row?;
            edges.push(RelationCount {
                relation,
                count: count as u64,
            });
        }

        Ok(GraphStats::new(files as u64, edges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample_edges() -> Vec<StructuralEdge> {
        vec![
            StructuralEdge::new("a.py", "b.py", Relation::Imports),
            StructuralEdge::new("a.py", "b.py", Relation::Inherits).with_meta("Foo inherits Bar"),
            StructuralEdge::new("c.py", "b.py", Relation::Imports),
            StructuralEdge::new("c.py", "a.py", Relation::Imports),
            StructuralEdge::new("c.py", "a.py", Relation::Instantiates).with_meta("calls Foo()"),
        ]
    }

    #[test]
    fn test_scenario_incoming_neighbors() {
        let mut graph = SqliteGraph::open_in_memory().unwrap();
        graph
            .load_edges(
                &[
                    StructuralEdge::new("a.py", "b.py", Relation::Imports),
                    StructuralEdge::new("a.py", "b.py", Relation::Inherits)
                        .with_meta("Foo inherits Bar"),
                ],
                LoadStrategy::Generic,
            )
            .unwrap();

        let rows = graph.neighbors("b.py", Direction::In).unwrap();
        assert_eq!(
            rows,
            vec![
                Neighbor::new("a.py", Relation::Imports, Direction::In),
                Neighbor::new("a.py", Relation::Inherits, Direction::In),
            ]
        );
    }

    #[test]
    fn test_reload_is_idempotent() {
        let mut graph = SqliteGraph::open_in_memory().unwrap();
        graph.load_edges(&sample_edges(), LoadStrategy::Generic).unwrap();
        let once = graph.stats().unwrap();

        graph.load_edges(&sample_edges(), LoadStrategy::Generic).unwrap();
        graph.load_edges(&sample_edges(), LoadStrategy::PerRelation).unwrap();
        let thrice = graph.stats().unwrap();

        assert_eq!(once, thrice);
        assert_eq!(once.files, 3);
        assert_eq!(once.total_edges(), 5);
    }

    #[test]
    fn test_strategies_produce_identical_graphs() {
        let mut generic = SqliteGraph::open_in_memory().unwrap();
        generic.load_edges(&sample_edges(), LoadStrategy::Generic).unwrap();

        let mut per_relation = SqliteGraph::open_in_memory().unwrap();
        per_relation.load_edges(&sample_edges(), LoadStrategy::PerRelation).unwrap();

        assert_eq!(generic.export_edges().unwrap(), per_relation.export_edges().unwrap());
        assert_eq!(generic.file_paths().unwrap(), per_relation.file_paths().unwrap());
        assert_eq!(generic.stats().unwrap(), per_relation.stats().unwrap());
    }

    #[test]
    fn test_first_meta_wins_on_merge() {
        let mut graph = SqliteGraph::open_in_memory().unwrap();
        let first = StructuralEdge::new("a.py", "b.py", Relation::Instantiates)
            .with_meta("calls Foo()");
        graph.load_edges(&[first], LoadStrategy::Generic).unwrap();
        let second = StructuralEdge::new("a.py", "b.py", Relation::Instantiates)
            .with_meta("calls Baz()");
        graph.load_edges(&[second], LoadStrategy::Generic).unwrap();
        let edges = graph.export_edges().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].meta.as_deref(), Some("calls Foo()"));
    }

    #[test]
    fn test_both_is_union_of_in_and_out() {
        let mut graph = SqliteGraph::open_in_memory().unwrap();
        graph.load_edges(&sample_edges(), LoadStrategy::Generic).unwrap();

        for file in ["a.py", "b.py", "c.py", "missing.py"] {
            let strip = |rows: Vec<Neighbor>| -> HashSet<(String, Relation)> {
                rows.into_iter().map(|r| (r.neighbor, r.relation)).collect()
            };
            let mut union = strip(graph.neighbors(file, Direction::In).unwrap());
            union.extend(strip(graph.neighbors(file, Direction::Out).unwrap()));
            let both = strip(graph.neighbors(file, Direction::Both).unwrap());
            assert_eq!(union, both, "mismatch for {file}");
        }
    }

    #[test]
    fn test_unknown_file_has_no_neighbors() {
        let mut graph = SqliteGraph::open_in_memory().unwrap();
        graph.load_edges(&sample_edges(), LoadStrategy::Generic).unwrap();
        assert!(graph.neighbors("nowhere.py", Direction::Both).unwrap().is_empty());
    }

    #[test]
    fn test_stats_on_empty_graph() {
        let mut graph = SqliteGraph::open_in_memory().unwrap();
        let stats = graph.stats().unwrap();
        assert_eq!(stats.files, 0);
        assert!(stats.edges.is_empty());
    }

    #[test]
    fn test_stats_sorted_descending() {
        let mut graph = SqliteGraph::open_in_memory().unwrap();
        graph.load_edges(&sample_edges(), LoadStrategy::Generic).unwrap();
        let stats = graph.stats().unwrap();
        assert_eq!(stats.edges[0].relation, "IMPORTS");
        assert_eq!(stats.edges[0].count, 3);
        assert!(stats.edges.windows(2).all(|w| w[0].count >= w[1].count));
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut graph = SqliteGraph::open_in_memory().unwrap();
        graph.load_edges(&sample_edges(), LoadStrategy::Generic).unwrap();
        graph.clear().unwrap();
        let stats = graph.stats().unwrap();
        assert_eq!(stats.files, 0);
        assert_eq!(stats.total_edges(), 0);
    }

    #[test]
    fn test_self_edges_are_never_stored() {
        let mut graph = SqliteGraph::open_in_memory().unwrap();
        let self_edge = StructuralEdge::new("a.py", "a.py", Relation::Imports);
        graph
            .load_edges(&[self_edge], LoadStrategy::PerRelation)
            .unwrap();
        assert_eq!(graph.stats().unwrap().total_edges(), 0);
    }
}

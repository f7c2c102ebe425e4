//! Plain-text rendering shared by the CLI and the MCP tools.
use std::fmt::Write;

use crate::db::{Direction, GraphStats, Neighbor};
use crate::search::SearchHit;

fn arrow(direction: Direction) -> &'static str {
    match direction {
        Direction::In => "←",
        _ => "→",
    }
}

pub fn render_neighbors(file: &str, rows: &[Neighbor]) -> String {
    let mut out = format!("Structural neighbors of '{file}':\n\n");
    for row in rows {
        let _ = writeln!(out, "  {} [{}]  {}", arrow(row.direction), row.relation, row.neighbor);
    }
    let _ = write!(out, "\nTotal: {} structural connections", rows.len());
    out
}

pub fn no_neighbors_message(file: &str) -> String {
    format!(
        "No structural neighbors found for '{file}'.\n\
         Check the file path or run 'codecompass stats' to verify the graph is loaded."
    )
}

pub fn render_search(query: &str, hits: &[SearchHit]) -> String {
    let mut out = format!("Top {} files for '{query}':\n\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let _ = writeln!(out, "  {:>2}. (score {:.3})  {}", i + 1, hit.score, hit.file);
    }
    out.truncate(out.trim_end().len());
    out
}

pub fn no_results_message(query: &str) -> String {
    format!("No results found for query: '{query}'")
}

pub fn render_stats(stats: &GraphStats) -> String {
    let mut out = String::from("CodeCompass Graph Statistics:\n\n");
    let _ = writeln!(out, "  Files: {}", stats.files);
    out.push_str("\n  Edges:\n");
    if stats.edges.is_empty() {
        out.push_str("    (none)\n");
    }
    for count in &stats.edges {
        let _ = writeln!(out, "    {:<15} {:>4}", count.relation, count.count);
    }
    out.truncate(out.trim_end().len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Relation, RelationCount};
    use crate::indexer::ChunkKind;

    #[test]
    fn test_neighbors_layout() {
        let rows = vec![
            Neighbor::new("b.py", Relation::Inherits, Direction::In),
            Neighbor::new("c.py", Relation::Imports, Direction::Out),
        ];
        let text = render_neighbors("a.py", &rows);
        assert_eq!(
            text,
            "Structural neighbors of 'a.py':\n\n\
             \x20 ← [INHERITS]  b.py\n\
             \x20 → [IMPORTS]  c.py\n\n\
             Total: 2 structural connections"
        );
    }

    #[test]
    fn test_search_layout() {
        let hits = vec![SearchHit {
            file: "app/auth.py".into(),
            score: 2.34567,
            chunk_kind: ChunkKind::Function,
            chunk_name: "login".into(),
            chunk_text: "def login(): pass".into(),
        }];
        assert_eq!(
            render_search("login", &hits),
            "Top 1 files for 'login':\n\n   1. (score 2.346)  app/auth.py"
        );
    }

    #[test]
    fn test_stats_layout() {
        let imports = RelationCount {
            relation: "IMPORTS".into(),
            count: 12,
        };
        let stats = GraphStats::new(4, vec![imports]);
        assert_eq!(
            render_stats(&stats),
            "CodeCompass Graph Statistics:\n\n  Files: 4\n\n  Edges:\n    IMPORTS           12"
        );
        assert!(render_stats(&GraphStats::default()).ends_with("(none)"));
    }
}

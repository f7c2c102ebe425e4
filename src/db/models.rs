use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::NavError;

/// Typed structural relation between two files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Relation {
    Imports,
    Inherits,
    Instantiates,
}

impl Relation {
    pub const ALL: [Relation; 3] = [Relation::Imports, Relation::Inherits, Relation::Instantiates];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Imports => "IMPORTS",
            Relation::Inherits => "INHERITS",
            Relation::Instantiates => "INSTANTIATES",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMPORTS" => Ok(Relation::Imports),
            "INHERITS" => Ok(Relation::Inherits),
            "INSTANTIATES" => Ok(Relation::Instantiates),
            other => Err(NavError::InvalidArgument(format!(
                "unknown relation '{other}' (expected IMPORTS, INHERITS or INSTANTIATES)"
            ))),
        }
    }
}

/// Directed edge: `source` depends on / references `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralEdge {
    pub source: String,
    pub target: String,
    pub relation: Relation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<String>,
}

impl StructuralEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, relation: Relation) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation,
            meta: None,
        }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    pub fn is_self_edge(&self) -> bool {
        self.source == self.target
    }
}

/// Drops self-edges and collapses duplicate `(source, target, relation)`
/// triples, keeping the first occurrence (and its metadata).
pub fn dedup_edges<I>(edges: I) -> Vec<StructuralEdge>
where
    I: IntoIterator<Item = StructuralEdge>,
{
    let mut seen: HashSet<(String, String, Relation)> = HashSet::new();
    let mut unique = Vec::new();
    for edge in edges {
        if edge.is_self_edge() {
            continue;
        }
        if seen.insert((edge.source.clone(), edge.target.clone(), edge.relation)) {
            unique.push(edge);
        }
    }
    unique
}

/// Neighbor-query direction filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Both => "both",
        }
    }

    pub fn includes(&self, other: Direction) -> bool {
        *self == Direction::Both || *self == other
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" | "incoming" => Ok(Direction::In),
            "out" | "outgoing" => Ok(Direction::Out),
            "both" | "" => Ok(Direction::Both),
            other => Err(NavError::InvalidArgument(format!(
                "unknown direction '{other}' (expected in, out or both)"
            ))),
        }
    }
}

/// One row of a neighbor lookup. `direction` is always `In` or `Out`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Neighbor {
    pub neighbor: String,
    pub relation: Relation,
    pub direction: Direction,
}

impl Neighbor {
    pub fn new(neighbor: impl Into<String>, relation: Relation, direction: Direction) -> Self {
        Self {
            neighbor: neighbor.into(),
            relation,
            direction,
        }
    }
}

/// Orders rows by direction, then relation name, then neighbor path.
pub fn sort_neighbors(rows: &mut [Neighbor]) {
    rows.sort_by(|a, b| {
        a.direction
            .as_str()
            .cmp(b.direction.as_str())
            .then_with(|| a.relation.as_str().cmp(b.relation.as_str()))
            .then_with(|| a.neighbor.cmp(&b.neighbor))
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationCount {
    pub relation: String,
    pub count: u64,
}

/// File count plus per-relation edge counts, sorted descending by count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub files: u64,
    #[serde(serialize_with = "serialize_counts")]
    pub edges: Vec<RelationCount>,
}

impl GraphStats {
    pub fn new(files: u64, mut edges: Vec<RelationCount>) -> Self {
        edges.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.relation.cmp(&b.relation)));
        Self { files, edges }
    }

    pub fn total_edges(&self) -> u64 {
        self.edges.iter().map(|e| e.count).sum()
    }

    pub fn count_for(&self, relation: Relation) -> u64 {
        self.edges
            .iter()
            .find(|e| e.relation == relation.as_str())
            .map_or(0, |e| e.count)
    }
}

fn serialize_counts<S>(counts: &[RelationCount], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(counts.len()))?;
    for c in counts {
        map.serialize_entry(&c.relation, &c.count)?;
    }
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_round_trips_through_json() {
        let edge =
            StructuralEdge::new("a.py", "b.py", Relation::Inherits).with_meta("Foo inherits Bar");
        let json = serde_json::to_string(&edge).unwrap();
        assert!(json.contains("\"INHERITS\""));
        let back: StructuralEdge = serde_json::from_str(&json).unwrap();
        assert_eq!(back, edge);
    }

    #[test]
    fn test_meta_is_optional_in_json() {
        let json = r#"{"source":"a.py","target":"b.py","relation":"IMPORTS"}"#;
        let edge: StructuralEdge = serde_json::from_str(json).unwrap();
        assert!(edge.meta.is_none());
        assert!(!serde_json::to_string(&edge).unwrap().contains("meta"));
    }

    #[test]
    fn test_dedup_keeps_first_meta_and_drops_self_edges() {
        let edges = vec![
            StructuralEdge::new("a.py", "b.py", Relation::Instantiates).with_meta("calls Foo()"),
            StructuralEdge::new("a.py", "b.py", Relation::Instantiates).with_meta("calls Bar()"),
            StructuralEdge::new("a.py", "a.py", Relation::Imports),
            StructuralEdge::new("a.py", "b.py", Relation::Imports),
        ];
        let unique = dedup_edges(edges);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].meta.as_deref(), Some("calls Foo()"));
        assert_eq!(unique[1].relation, Relation::Imports);
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("in".parse::<Direction>().unwrap(), Direction::In);
        assert_eq!("OUTGOING".parse::<Direction>().unwrap(), Direction::Out);
        assert_eq!("".parse::<Direction>().unwrap(), Direction::Both);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_sort_neighbors_orders_direction_relation_path() {
        let mut rows = vec![
            Neighbor::new("z.py", Relation::Imports, Direction::Out),
            Neighbor::new("b.py", Relation::Inherits, Direction::In),
            Neighbor::new("a.py", Relation::Inherits, Direction::In),
            Neighbor::new("c.py", Relation::Imports, Direction::In),
        ];
        sort_neighbors(&mut rows);
        let order: Vec<&str> = rows.iter().map(|r| r.neighbor.as_str()).collect();
        assert_eq!(order, vec!["c.py", "a.py", "b.py", "z.py"]);
    }

    #[test]
    fn test_stats_serialize_in_descending_order() {
        let stats = GraphStats::new(
            3,
            vec![
                RelationCount {
                    relation: "INHERITS".into(),
                    count: 1,
                },
                RelationCount {
                    relation: "IMPORTS".into(),
                    count: 4,
                },
            ],
        );
        let json = serde_json::to_string(&stats).unwrap();
        assert_eq!(json, r#"{"files":3,"edges":{"IMPORTS":4,"INHERITS":1}}"#);
        assert_eq!(stats.total_edges(), 5);
        assert_eq!(stats.count_for(Relation::Instantiates), 0);
    }
}

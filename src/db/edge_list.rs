//! Edge list artifact: the ordered `{source, target, relation, meta?}`
//! records handed from the extractor to the graph loader.
use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use super::models::{Relation, StructuralEdge, dedup_edges};
use crate::error::{NavError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeList {
    edges: Vec<StructuralEdge>,
}

impl EdgeList {
    /// Builds a list, applying the global uniqueness rule.
    pub fn new(edges: Vec<StructuralEdge>) -> Self {
        Self {
            edges: dedup_edges(edges),
        }
    }

    /// Merges per-file batches once for the whole tree. Batch order is kept.
    pub fn merge<I>(batches: I) -> Self
    where
        I: IntoIterator<Item = Vec<StructuralEdge>>,
    {
        Self::new(batches.into_iter().flatten().collect())
    }

    pub fn edges(&self) -> &[StructuralEdge] {
        &self.edges
    }

    pub fn into_edges(self) -> Vec<StructuralEdge> {
        self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn relation_counts(&self) -> BTreeMap<Relation, usize> {
        let mut counts = BTreeMap::new();
        for edge in &self.edges {
            *counts.entry(edge.relation).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.edges)?)
    }

    /// Writes the artifact to a sibling temp file, then renames it into place.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, self.to_json()?)?;
        std::fs::rename(&tmp, path)?;
        info!("Saved {} edges to {}", self.edges.len(), path.display());
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NavError::EdgeList {
                path: path.to_path_buf(),
                reason: "file not found; run `codecompass extract <repo>` first".to_string(),
            });
        }
        let data = std::fs::read_to_string(path)?;
        let edges: Vec<StructuralEdge> =
            serde_json::from_str(&data).map_err(|e| NavError::EdgeList {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        info!("Loaded {} edges from {}", edges.len(), path.display());
        Ok(Self::new(edges))
    }
}

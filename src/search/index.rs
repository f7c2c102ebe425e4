//! Persisted chunk index: the chunk collection plus its BM25 model, wrapped
//! in a versioned envelope and published atomically.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::bm25::{Bm25Model, Bm25Params};
use super::tokenizer::tokenize;
use crate::error::{NavError, Result};
use crate::indexer::{ChunkKind, CodeChunk};

pub const INDEX_FORMAT: &str = "codecompass-chunk-index";
pub const INDEX_VERSION: u32 = 1;

/// One ranked file and the chunk that earned its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub file: String,
    pub score: f64,
    pub chunk_kind: ChunkKind,
    pub chunk_name: String,
    pub chunk_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkIndex {
    format: String,
    version: u32,
    root: String,
    built_at_unix_ms: u64,
    chunks: Vec<CodeChunk>,
    model: Bm25Model,
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl ChunkIndex {
    /// Builds the model in one pass after every chunk is collected.
    pub fn build(root: &Path, chunks: Vec<CodeChunk>, params: Bm25Params) -> Self {
        let tokenized: Vec<Vec<String>> =
            chunks.par_iter().map(|c| tokenize(&c.index_text())).collect();
        let model = Bm25Model::build(&tokenized, params);
        Self {
            format: INDEX_FORMAT.to_string(),
            version: INDEX_VERSION,
            root: root.display().to_string(),
            built_at_unix_ms: unix_now_ms(),
            chunks,
            model,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn built_at_unix_ms(&self) -> u64 {
        self.built_at_unix_ms
    }

    pub fn chunks(&self) -> &[CodeChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn file_count(&self) -> usize {
        let mut files: Vec<&str> = self.chunks.iter().map(|c| c.file_path.as_str()).collect();
        files.sort_unstable();
        files.dedup();
        files.len()
    }

    /// Top `top_n` files by their best chunk score. Files whose best score
    /// is not positive are left out; ties keep chunk order.
    pub fn search(&self, query: &str, top_n: usize) -> Vec<SearchHit> {
        let tokens = tokenize(query);
        if tokens.is_empty() || top_n == 0 {
            return Vec::new();
        }
        let scores = self.model.scores(&tokens);

        // (best score, best chunk) per file, files in first-seen order
        let mut best: Vec<(f64, usize)> = Vec::new();
        let mut slot: HashMap<&str, usize> = HashMap::new();
        for (i, (chunk, score)) in self.chunks.iter().zip(&scores).enumerate() {
            match slot.get(chunk.file_path.as_str()) {
                Some(&s) => {
                    if *score > best[s].0 {
                        best[s] = (*score, i);
                    }
                }
                None => {
                    slot.insert(&chunk.file_path, best.len());
                    best.push((*score, i));
                }
            }
        }

        best.retain(|(score, _)| *score > 0.0);
        best.sort_by(|a, b| b.0.total_cmp(&a.0));
        best.truncate(top_n);

        best.into_iter()
            .map(|(score, i)| {
                let chunk = &self.chunks[i];
                SearchHit {
                    file: chunk.file_path.clone(),
                    score,
                    chunk_kind: chunk.kind,
                    chunk_name: chunk.name.clone(),
                    chunk_text: chunk.source.clone(),
                }
            })
            .collect()
    }

    /// Writes to a sibling temp file, then renames it over `path`, so
    /// readers never observe a partial index.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;
        info!("Saved chunk index to {} ({} chunks)", path.display(), self.chunks.len());
        Ok(())
    }

    /// Missing file is [`NavError::IndexNotFound`]; anything unreadable,
    /// including legacy chunk lists, is [`NavError::IndexMalformed`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(NavError::index_not_found(path));
        }
        let bytes = std::fs::read(path)?;
        let malformed = |e: serde_json::Error| NavError::index_malformed(path, e.to_string());
        let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(malformed)?;

        let Some(envelope) = value.as_object() else {
            return Err(NavError::index_malformed(
                path,
                "not a versioned index \
                 (legacy chunk lists can be converted with `codecompass migrate-index`)",
            ));
        };
        let format = envelope.get("format").and_then(|v| v.as_str());
        if format != Some(INDEX_FORMAT) {
            return Err(NavError::index_malformed(
                path,
                format!("unexpected format {format:?}, expected {INDEX_FORMAT:?}"),
            ));
        }
        let version = envelope.get("version").and_then(|v| v.as_u64());
        if version != Some(u64::from(INDEX_VERSION)) {
            return Err(NavError::index_malformed(
                path,
                format!("unsupported version {version:?}, expected {INDEX_VERSION}"),
            ));
        }

        let index: ChunkIndex = serde_json::from_value(value).map_err(malformed)?;
        if !index.model.is_consistent() || index.model.len() != index.chunks.len() {
            return Err(NavError::index_malformed(path, "model does not match chunk collection"));
        }
        info!("Loaded chunk index from {} ({} chunks)", path.display(), index.chunks.len());
        Ok(index)
    }
}

// ── Legacy migration ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LegacyRecord {
    #[serde(alias = "file")]
    file_path: String,
    #[serde(alias = "text", alias = "content")]
    source: String,
    #[serde(default, alias = "type", alias = "kind")]
    chunk_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyFile {
    Bare(Vec<LegacyRecord>),
    Wrapped {
        chunks: Vec<LegacyRecord>,
        #[serde(default, alias = "repo_root")]
        root: Option<String>,
    },
}

/// Chunks recovered from a pre-versioned chunk list.
#[derive(Debug)]
pub struct LegacyChunks {
    pub root: Option<String>,
    pub chunks: Vec<CodeChunk>,
}

fn legacy_kind(raw: Option<&str>) -> ChunkKind {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("function" | "method" | "async_function") => ChunkKind::Function,
        Some("class") => ChunkKind::Class,
        _ => ChunkKind::Module,
    }
}

/// Reads a legacy loosely-typed chunk list (a bare array or `{chunks: [...]}`
/// with `file`/`file_path`, `text`/`source`, `type`/`chunk_type` keys).
/// The only entry point that accepts the old shape.
pub fn read_legacy_chunks(path: &Path) -> Result<LegacyChunks> {
    if !path.is_file() {
        return Err(NavError::InvalidArgument(format!(
            "legacy chunk list not found: {}",
            path.display()
        )));
    }
    let bytes = std::fs::read(path)?;
    let parsed: LegacyFile =
        serde_json::from_slice(&bytes).map_err(|e| NavError::index_malformed(path, e.to_string()))?;
    let (records, root) = match parsed {
        LegacyFile::Bare(records) => (records, None),
        LegacyFile::Wrapped { chunks, root } => (chunks, root),
    };

    let chunks = records
        .into_iter()
        .map(|r| {
            let name = r.name.unwrap_or_else(|| {
                Path::new(&r.file_path)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            CodeChunk {
                kind: legacy_kind(r.chunk_type.as_deref()),
                file_path: r.file_path,
                name,
                source: r.source,
            }
        })
        .collect();
    Ok(LegacyChunks { root, chunks })
}

/// Converts a legacy chunk list into a versioned index at `output`.
pub fn migrate_legacy(input: &Path, output: &Path, params: Bm25Params) -> Result<ChunkIndex> {
    let legacy = read_legacy_chunks(input)?;
    let root = legacy.root.map(PathBuf::from).unwrap_or_default();
    info!("Migrating {} legacy chunks from {}", legacy.chunks.len(), input.display());
    let index = ChunkIndex::build(&root, legacy.chunks, params);
    index.save(output)?;
    Ok(index)
}

use std::path::Path;

use ignore::WalkBuilder;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::code_parser::{CodeChunk, CodeParser};
use super::languages::LanguageConfig;
use super::relations::StructuralExtractor;
use crate::db::EdgeList;
use crate::error::{NavError, Result};

/// Per-batch counts. Files that fail to parse are skipped, never fatal.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub files: usize,
    pub parsed: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct ExtractOutcome {
    pub edges: EdgeList,
    pub summary: BatchSummary,
}

#[derive(Debug)]
pub struct ChunkOutcome {
    pub chunks: Vec<CodeChunk>,
    pub summary: BatchSummary,
}

fn ensure_root(root: &Path) -> Result<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(NavError::InvalidArgument(format!(
            "source tree does not exist or is not a directory: {}",
            root.display()
        )))
    }
}

/// Tree-relative paths (forward slashes) of every source file for
/// `language`, sorted. `.gitignore` rules are honored.
pub fn scan_source_files(root: &Path, language: &LanguageConfig) -> Vec<String> {
    // Walk builder respects .gitignore by default
    let walker = WalkBuilder::new(root).hidden(false).build();

    let mut files: Vec<String> = walker
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
        .filter(|e| language.matches_path(e.path()))
        .filter(|e| !e.path().components().any(|c| c.as_os_str() == ".git"))
        .filter_map(|e| {
            let rel = e.path().strip_prefix(root).ok()?;
            Some(rel.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

/// Runs the extractor over every source file under `root`.
pub fn extract_tree<F>(
    root: &Path,
    extractor: &StructuralExtractor,
    on_progress: &F,
) -> Result<ExtractOutcome>
where
    F: Fn(&str) + Sync,
{
    ensure_root(root)?;
    let files = scan_source_files(root, extractor.language());
    extract_files(root, &files, extractor, on_progress)
}

/// Runs the extractor over an already scanned file list in parallel, then
/// merges the per-file batches once for the whole tree.
pub fn extract_files<F>(
    root: &Path,
    files: &[String],
    extractor: &StructuralExtractor,
    on_progress: &F,
) -> Result<ExtractOutcome>
where
    F: Fn(&str) + Sync,
{
    ensure_root(root)?;
    info!("Extracting {} source files under {}", files.len(), root.display());

    let results: Vec<Option<Vec<_>>> = files
        .par_iter()
        .inspect(|path| on_progress(path))
        .map(|path| match extractor.extract_file(root, path) {
            Ok(edges) => Some(edges),
            Err(e) => {
                debug!("Skipping {path}: {e}");
                None
            }
        })
        .collect();

    let summary = summarize(files.len(), &results);
    if summary.skipped > 0 {
        warn!(
            "Skipped {} of {} files that could not be parsed",
            summary.skipped, summary.files
        );
    }

    let edges = EdgeList::merge(results.into_iter().flatten());
    info!("Extracted {} edges", edges.len());
    Ok(ExtractOutcome { edges, summary })
}

/// Chunks every source file under `root`.
pub fn collect_chunks<F>(root: &Path, parser: &CodeParser, on_progress: &F) -> Result<ChunkOutcome>
where
    F: Fn(&str) + Sync,
{
    ensure_root(root)?;
    let files = scan_source_files(root, parser.language());
    chunk_files(root, &files, parser, on_progress)
}

/// Chunks an already scanned file list in parallel. Chunk order follows
/// the order of `files`.
pub fn chunk_files<F>(
    root: &Path,
    files: &[String],
    parser: &CodeParser,
    on_progress: &F,
) -> Result<ChunkOutcome>
where
    F: Fn(&str) + Sync,
{
    ensure_root(root)?;
    info!("Chunking {} source files under {}", files.len(), root.display());

    let results: Vec<Option<Vec<CodeChunk>>> = files
        .par_iter()
        .inspect(|path| on_progress(path))
        .map(|path| match parser.parse_file(root, path) {
            Ok(chunks) => Some(chunks),
            Err(e) => {
                debug!("Skipping {path}: {e}");
                None
            }
        })
        .collect();

    let summary = summarize(files.len(), &results);
    if summary.skipped > 0 {
        warn!(
            "Skipped {} of {} files that could not be read",
            summary.skipped, summary.files
        );
    }

    let chunks: Vec<CodeChunk> = results.into_iter().flatten().flatten().collect();
    info!("Indexed {} chunks from {}", chunks.len(), root.display());
    Ok(ChunkOutcome { chunks, summary })
}

fn summarize<T>(files: usize, results: &[Option<T>]) -> BatchSummary {
    let parsed = results.iter().filter(|r| r.is_some()).count();
    BatchSummary {
        files,
        parsed,
        skipped: files - parsed,
    }
}

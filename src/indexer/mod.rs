//! Source-tree analysis: structural edge extraction and chunking.
pub mod code_parser;
pub mod core;
pub mod languages;
pub mod relations;
pub mod resolver;

pub use code_parser::{ChunkKind, CodeChunk, CodeParser};
pub use self::core::{
    BatchSummary, ChunkOutcome, ExtractOutcome, chunk_files, collect_chunks, extract_files,
    extract_tree, scan_source_files,
};
pub use relations::{InstantiationHeuristic, StructuralExtractor, UppercaseConvention};

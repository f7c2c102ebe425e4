//! Lexical ranking: tokenizer, BM25 model and the persisted chunk index.
pub mod bm25;
pub mod index;
pub mod tokenizer;

pub use bm25::{Bm25Model, Bm25Params};
pub use index::{ChunkIndex, SearchHit, migrate_legacy};
pub use tokenizer::tokenize;

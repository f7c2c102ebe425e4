//! # CodeCompass — structural navigation for codebases
//!
//! Extracts a file-level dependency graph (imports, inheritance,
//! instantiation) from a Python source tree, ranks files for keyword
//! queries with BM25, and serves both to coding agents over MCP.
//!
//! ## Architecture
//!
//! - **[`indexer`]** — Tree-sitter structural extraction, module resolution, chunking
//! - **[`db`]** — Graph store trait with SQLite and FalkorDB backends, edge list artifact
//! - **[`search`]** — Tokenizer, BM25 model, versioned chunk index
//! - **[`navigator`]** — Lazily connected facade over the graph and the index
//! - **[`render`]** — Text output shared by the CLI and the tools
//! - **[`mcp`]** — MCP server with 2 tool handlers (stdio transport via rmcp)
//! - **[`config`]** — JSON configuration with environment overrides
//! - **[`error`]** — Typed error taxonomy

pub mod config;
pub mod db;
pub mod error;
pub mod indexer;
pub mod mcp;
pub mod navigator;
pub mod render;
pub mod search;

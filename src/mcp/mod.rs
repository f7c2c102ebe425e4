//! MCP tool surface over stdio.
pub mod server;
pub mod tools;

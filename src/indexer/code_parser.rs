use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator};

use super::languages::{LanguageConfig, python_config};
use crate::error::{NavError, Result};

pub const DEFAULT_MODULE_PREFIX_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Class,
    Module,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Class => "class",
            ChunkKind::Module => "module",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of lexical ranking: one definition, or a file's module prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChunk {
    pub file_path: String,
    pub kind: ChunkKind,
    pub name: String,
    pub source: String,
}

impl CodeChunk {
    /// Text the ranking model tokenizes: path, name and source together.
    pub fn index_text(&self) -> String {
        format!("{} {} {}", self.file_path, self.name, self.source)
    }
}

pub struct CodeParser {
    language: LanguageConfig,
    query: Query,
    module_prefix_chars: usize,
}

impl CodeParser {
    pub fn new(language: LanguageConfig, module_prefix_chars: usize) -> Result<Self> {
        let query = Query::new(&language.language, language.chunk_query)
            .map_err(|e| NavError::InvalidArgument(format!("{} chunk query: {e}", language.name)))?;
        Ok(Self {
            language,
            query,
            module_prefix_chars,
        })
    }

    pub fn python() -> Result<Self> {
        Self::new(python_config(), DEFAULT_MODULE_PREFIX_CHARS)
    }

    pub fn language(&self) -> &LanguageConfig {
        &self.language
    }

    /// Chunks `root/rel_path`. Non-UTF-8 content is a [`NavError::Parse`].
    pub fn parse_file(&self, root: &Path, rel_path: &str) -> Result<Vec<CodeChunk>> {
        let bytes = std::fs::read(root.join(rel_path))?;
        let source = String::from_utf8(bytes).map_err(|e| NavError::Parse {
            path: rel_path.to_string(),
            reason: format!("not UTF-8: {e}"),
        })?;
        Ok(self.parse_code(rel_path, &source))
    }

    /// Definition chunks in document order followed by the module chunk.
    /// Source that fails to parse becomes a single module chunk holding
    /// the whole file.
    pub fn parse_code(&self, rel_path: &str, source: &str) -> Vec<CodeChunk> {
        let module_name = Path::new(rel_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| rel_path.to_string());

        let mut parser = Parser::new();
        let tree = match parser.set_language(&self.language.language) {
            Ok(()) => parser.parse(source, None),
            Err(_) => None,
        };
        let Some(tree) = tree.filter(|t| !t.root_node().has_error()) else {
            return vec![CodeChunk {
                file_path: rel_path.to_string(),
                kind: ChunkKind::Module,
                name: module_name,
                source: source.to_string(),
            }];
        };

        let lines: Vec<&str> = source.lines().collect();
        let bytes = source.as_bytes();
        let mut defs: Vec<(usize, CodeChunk)> = Vec::new();
        let mut seen = HashSet::new();

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.query, tree.root_node(), bytes);
        while let Some(m) = matches.next() {
            let mut def_node = None;
            let mut kind = None;
            let mut name = String::new();

            for cap in m.captures {
                match self.query.capture_names()[cap.index as usize] {
                    "name" => name = cap.node.utf8_text(bytes).unwrap_or_default().to_string(),
                    "function" => {
                        def_node = Some(cap.node);
                        kind = Some(ChunkKind::Function);
                    }
                    "class" => {
                        def_node = Some(cap.node);
                        kind = Some(ChunkKind::Class);
                    }
                    _ => {}
                }
            }

            let (Some(node), Some(kind)) = (def_node, kind) else {
                continue;
            };
            if !seen.insert((node.start_byte(), node.end_byte())) {
                continue;
            }

            let start = node.start_position().row;
            let end = node.end_position().row;
            if start >= lines.len() {
                continue;
            }
            let end = end.min(lines.len() - 1);
            defs.push((
                node.start_byte(),
                CodeChunk {
                    file_path: rel_path.to_string(),
                    kind,
                    name,
                    source: lines[start..=end].join("\n"),
                },
            ));
        }

        defs.sort_by_key(|(start, _)| *start);
        let mut chunks: Vec<CodeChunk> = defs.into_iter().map(|(_, chunk)| chunk).collect();
        chunks.push(CodeChunk {
            file_path: rel_path.to_string(),
            kind: ChunkKind::Module,
            name: module_name,
            source: source.chars().take(self.module_prefix_chars).collect(),
        });
        chunks
    }
}

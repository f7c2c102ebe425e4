use std::collections::HashMap;
use std::path::Path;

use tree_sitter::{Node, Parser};

use super::languages::{LanguageConfig, python_config};
use super::resolver::ModuleResolver;
use crate::db::models::{Relation, StructuralEdge, dedup_edges};
use crate::error::{NavError, Result};

/// Decides whether a call site constructs a type.
pub trait InstantiationHeuristic: Send + Sync {
    fn is_instantiation(&self, callee: &str) -> bool;
}

/// Callee names starting with an uppercase letter are constructor calls.
/// Misses lowercase classes and over-attributes uppercase factory functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct UppercaseConvention;

impl InstantiationHeuristic for UppercaseConvention {
    fn is_instantiation(&self, callee: &str) -> bool {
        callee.chars().next().is_some_and(char::is_uppercase)
    }
}

/// A referenced symbol: `Name`, or `q.Name` with its qualifier.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SymbolRef<'s> {
    name: &'s str,
    qualifier: Option<&'s str>,
}

/// Local names introduced by import statements, each bound to the file the
/// import resolved to. First binding wins.
#[derive(Debug, Default)]
struct ImportBindings {
    targets: HashMap<String, String>,
}

impl ImportBindings {
    fn bind(&mut self, name: &str, target: &str) {
        self.targets
            .entry(name.to_string())
            .or_insert_with(|| target.to_string());
    }

    fn lookup(&self, symbol: &SymbolRef<'_>) -> Option<&str> {
        if let Some(target) = self.targets.get(symbol.name) {
            return Some(target);
        }
        // `q.Name` needs `q` itself bound; a bound prefix of `q` says
        // nothing about where `q` lives.
        self.targets.get(symbol.qualifier?).map(String::as_str)
    }
}

/// Emits IMPORTS, INHERITS and INSTANTIATES edges for one file at a time.
pub struct StructuralExtractor {
    language: LanguageConfig,
    heuristic: Box<dyn InstantiationHeuristic>,
}

impl Default for StructuralExtractor {
    fn default() -> Self {
        Self::new(python_config(), Box::new(UppercaseConvention))
    }
}

impl StructuralExtractor {
    pub fn new(language: LanguageConfig, heuristic: Box<dyn InstantiationHeuristic>) -> Self {
        Self { language, heuristic }
    }

    pub fn language(&self) -> &LanguageConfig {
        &self.language
    }

    /// Reads `root/rel_path` and extracts its edges.
    pub fn extract_file(&self, root: &Path, rel_path: &str) -> Result<Vec<StructuralEdge>> {
        let bytes = std::fs::read(root.join(rel_path))?;
        self.extract_source(root, rel_path, &bytes)
    }

    /// Edges originating at `rel_path`, deduplicated with self-edges removed.
    /// Non-UTF-8 input or a tree with syntax errors is a [`NavError::Parse`].
    pub fn extract_source(
        &self,
        root: &Path,
        rel_path: &str,
        bytes: &[u8],
    ) -> Result<Vec<StructuralEdge>> {
        let parse_error = |reason: String| NavError::Parse {
            path: rel_path.to_string(),
            reason,
        };
        let source =
            std::str::from_utf8(bytes).map_err(|e| parse_error(format!("not UTF-8: {e}")))?;

        let mut parser = Parser::new();
        parser
            .set_language(&self.language.language)
            .map_err(|e| parse_error(e.to_string()))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| parse_error("parser returned no tree".to_string()))?;
        let root_node = tree.root_node();
        if root_node.has_error() {
            return Err(parse_error("syntax error".to_string()));
        }

        let nodes = preorder(root_node);
        let src = source.as_bytes();
        let resolver = ModuleResolver::new(root, &self.language);
        let mut walk = FileWalk {
            rel_path,
            src,
            resolver: &resolver,
            bindings: ImportBindings::default(),
            edges: Vec::new(),
        };

        // Imports are collected first so a class or call can use an import
        // that appears later in the file.
        for node in &nodes {
            match node.kind() {
                "import_statement" => walk.import_statement(*node),
                "import_from_statement" => walk.import_from_statement(*node),
                _ => {}
            }
        }
        for node in &nodes {
            match node.kind() {
                "class_definition" => walk.class_definition(*node),
                "call" => walk.call(*node, self.heuristic.as_ref()),
                _ => {}
            }
        }

        Ok(dedup_edges(walk.edges))
    }
}

struct FileWalk<'a> {
    rel_path: &'a str,
    src: &'a [u8],
    resolver: &'a ModuleResolver,
    bindings: ImportBindings,
    edges: Vec<StructuralEdge>,
}

impl<'a> FileWalk<'a> {
    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.src).unwrap_or_default()
    }

    /// Records an IMPORTS edge; returns the target when it is another file.
    fn add_import(&mut self, target: Option<String>) -> Option<String> {
        let target = target.filter(|t| t != self.rel_path)?;
        self.edges
            .push(StructuralEdge::new(self.rel_path, target.clone(), Relation::Imports));
        Some(target)
    }

    /// `import a.b`, `import a.b as c`
    fn import_statement(&mut self, node: Node) {
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let (module, alias) = match name.kind() {
                "aliased_import" => (
                    name.child_by_field_name("name").map(|n| self.text(n).to_string()),
                    name.child_by_field_name("alias").map(|n| self.text(n).to_string()),
                ),
                _ => (Some(self.text(name).to_string()), None),
            };
            let Some(module) = module else { continue };
            let resolved = self.resolver.resolve(&module);
            let Some(target) = self.add_import(resolved) else {
                continue;
            };
            match alias {
                Some(alias) => self.bindings.bind(&alias, &target),
                None => self.bindings.bind(&module, &target),
            }
        }
    }

    /// `from m import X as Y`, `from ..m import X`, `from . import x`, `from m import *`
    fn import_from_statement(&mut self, node: Node) {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };

        let (level, module) = if module_node.kind() == "relative_import" {
            let mut level = 0;
            let mut module = None;
            let mut cursor = module_node.walk();
            for child in module_node.children(&mut cursor) {
                match child.kind() {
                    "import_prefix" => {
                        level = self.text(child).chars().filter(|c| *c == '.').count()
                    }
                    "dotted_name" => module = Some(self.text(child).to_string()),
                    _ => {}
                }
            }
            (level, module)
        } else {
            (0, Some(self.text(module_node).to_string()))
        };

        // (bound local name, imported name)
        let mut imported: Vec<(String, String)> = Vec::new();
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let pair = match name.kind() {
                "aliased_import" => {
                    let name_in_module = name.child_by_field_name("name").map(|n| self.text(n));
                    let alias = name.child_by_field_name("alias").map(|n| self.text(n));
                    name_in_module.map(|o| (alias.unwrap_or(o).to_string(), o.to_string()))
                }
                _ => {
                    let n = self.text(name);
                    Some((n.to_string(), n.to_string()))
                }
            };
            imported.extend(pair);
        }

        let module_target = match (level, module.as_deref()) {
            (0, Some(m)) => self.resolver.resolve(m),
            (level, m) => self.resolver.resolve_relative(self.rel_path, level, m),
        };

        if module.is_some() {
            if let Some(target) = self.add_import(module_target) {
                for (local, _) in &imported {
                    self.bindings.bind(local, &target);
                }
            }
            return;
        }

        // `from . import x`: each name may be a submodule of the package.
        for (local, name_in_module) in &imported {
            let submodule =
                self.resolver.resolve_relative(self.rel_path, level, Some(name_in_module));
            let target = submodule.or_else(|| module_target.clone());
            if let Some(target) = self.add_import(target) {
                self.bindings.bind(local, &target);
            }
        }
    }

    fn class_definition(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let class_name = self.text(name_node).to_string();
        let Some(bases) = node.child_by_field_name("superclasses") else {
            return;
        };
        let mut cursor = bases.walk();
        let base_nodes: Vec<Node> = bases.named_children(&mut cursor).collect();
        for base in base_nodes {
            let Some(symbol) = self.symbol_ref(base) else {
                continue;
            };
            if let Some(target) = self.bindings.lookup(&symbol).map(str::to_string) {
                let meta = format!("{class_name} inherits {}", symbol.name);
                let edge = StructuralEdge::new(self.rel_path, target, Relation::Inherits)
                    .with_meta(meta);
                self.edges.push(edge);
            }
        }
    }

    fn call(&mut self, node: Node, heuristic: &dyn InstantiationHeuristic) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let Some(symbol) = self.symbol_ref(function) else {
            return;
        };
        if !heuristic.is_instantiation(symbol.name) {
            return;
        }
        if let Some(target) = self.bindings.lookup(&symbol).map(str::to_string) {
            let meta = format!("calls {}()", symbol.name);
            let edge = StructuralEdge::new(self.rel_path, target, Relation::Instantiates)
                .with_meta(meta);
            self.edges.push(edge);
        }
    }

    /// Name referenced by a base-class or callee expression. Keyword
    /// arguments (`metaclass=...`) and other expressions yield `None`.
    fn symbol_ref(&self, node: Node) -> Option<SymbolRef<'a>> {
        match node.kind() {
            "identifier" => Some(SymbolRef {
                name: node.utf8_text(self.src).ok()?,
                qualifier: None,
            }),
            "attribute" => Some(SymbolRef {
                name: node.child_by_field_name("attribute")?.utf8_text(self.src).ok()?,
                qualifier: node
                    .child_by_field_name("object")
                    .and_then(|o| o.utf8_text(self.src).ok()),
            }),
            // Generic[T], models.Base[Row]
            "subscript" => self.symbol_ref(node.child_by_field_name("value")?),
            _ => None,
        }
    }
}

/// All nodes of the tree in document order.
fn preorder(root: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut cursor = root.walk();
    loop {
        out.push(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return out;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn tree(files: &[(&str, &str)]) -> TempDir {
        let dir = tempdir().unwrap();
        for (path, body) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, body).unwrap();
        }
        dir
    }

    fn extract(dir: &TempDir, file: &str) -> Vec<StructuralEdge> {
        StructuralExtractor::default()
            .extract_file(dir.path(), file)
            .expect("extraction should succeed")
    }

    fn triples(edges: &[StructuralEdge]) -> Vec<(&str, &str, Relation)> {
        edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str(), e.relation))
            .collect()
    }

    #[test]
    fn test_inherits_through_from_import() {
        let dir = tree(&[
            ("a.py", "from b import Bar\n\nclass Foo(Bar):\n    pass\n"),
            ("b.py", "class Bar:\n    pass\n"),
        ]);
        let edges = extract(&dir, "a.py");
        assert_eq!(
            triples(&edges),
            vec![("a.py", "b.py", Relation::Imports), ("a.py", "b.py", Relation::Inherits)]
        );
        assert_eq!(edges[1].meta.as_deref(), Some("Foo inherits Bar"));
    }

    #[test]
    fn test_unimported_base_produces_no_edge() {
        let dir = tree(&[
            (
                "a.py",
                "from b import helper\n\nclass Local:\n    pass\n\nclass Foo(Local):\n    pass\n",
            ),
            ("b.py", "def helper():\n    pass\n"),
        ]);
        let edges = extract(&dir, "a.py");
        assert_eq!(triples(&edges), vec![("a.py", "b.py", Relation::Imports)]);
    }

    #[test]
    fn test_instantiation_uses_binding_and_convention() {
        let dir = tree(&[
            (
                "svc.py",
                "import repo.store as store\nfrom models import User, make_user\n\n\
                 def run():\n    u = User()\n    v = make_user()\n    s = store.Store()\n",
            ),
            ("models.py", "class User:\n    pass\n\ndef make_user():\n    return User()\n"),
            ("repo/__init__.py", ""),
            ("repo/store.py", "class Store:\n    pass\n"),
        ]);
        let edges = extract(&dir, "svc.py");
        assert_eq!(
            triples(&edges),
            vec![
                ("svc.py", "repo/store.py", Relation::Imports),
                ("svc.py", "models.py", Relation::Imports),
                ("svc.py", "models.py", Relation::Instantiates),
                ("svc.py", "repo/store.py", Relation::Instantiates),
            ]
        );
        assert_eq!(edges[2].meta.as_deref(), Some("calls User()"));
    }

    #[test]
    fn test_import_after_use_still_binds() {
        let dir = tree(&[
            ("a.py", "class Foo(Bar):\n    pass\n\nfrom b import Bar\n"),
            ("b.py", "class Bar:\n    pass\n"),
        ]);
        let edges = extract(&dir, "a.py");
        assert!(edges.iter().any(|e| e.relation == Relation::Inherits));
    }

    #[test]
    fn test_relative_imports() {
        let dir = tree(&[
            ("pkg/__init__.py", ""),
            ("pkg/base.py", "class Base:\n    pass\n"),
            ("pkg/util.py", ""),
            ("pkg/sub/__init__.py", ""),
            (
                "pkg/sub/impl.py",
                "from ..base import Base\nfrom .. import util\nfrom ...outside import X\n\n\
                 class Impl(Base):\n    pass\n",
            ),
        ]);
        let edges = extract(&dir, "pkg/sub/impl.py");
        assert_eq!(
            triples(&edges),
            vec![
                ("pkg/sub/impl.py", "pkg/base.py", Relation::Imports),
                ("pkg/sub/impl.py", "pkg/util.py", Relation::Imports),
                ("pkg/sub/impl.py", "pkg/base.py", Relation::Inherits),
            ]
        );
    }

    #[test]
    fn test_qualified_base_and_external_imports() {
        let dir = tree(&[
            ("app/__init__.py", ""),
            ("app/models.py", "class Model:\n    pass\n"),
            (
                "views.py",
                "import os\nimport app.models\nfrom typing import Generic\n\n\
                 class View(app.models.Model, Generic[T], metaclass=Meta):\n    pass\n",
            ),
        ]);
        let edges = extract(&dir, "views.py");
        assert_eq!(
            triples(&edges),
            vec![
                ("views.py", "app/models.py", Relation::Imports),
                ("views.py", "app/models.py", Relation::Inherits),
            ]
        );
    }

    #[test]
    fn test_unimported_sibling_module_is_not_attributed() {
        let dir = tree(&[
            ("app/__init__.py", ""),
            ("app/models/__init__.py", ""),
            ("app/models/base.py", "class Thing:\n    pass\n"),
            ("app/other.py", "class Thing:\n    pass\n"),
            (
                "main.py",
                "import app.models.base\n\nclass X(app.other.Thing):\n    pass\n\n\
                 app.other.Thing()\napp.Thing()\n",
            ),
        ]);
        let edges = extract(&dir, "main.py");
        assert_eq!(triples(&edges), vec![("main.py", "app/models/base.py", Relation::Imports)]);
    }

    #[test]
    fn test_self_import_and_duplicates_dropped() {
        let dir = tree(&[
            ("a.py", "import a\nfrom b import X\nfrom b import Y\n\nX()\nY()\n"),
            ("b.py", ""),
        ]);
        let edges = extract(&dir, "a.py");
        assert_eq!(
            triples(&edges),
            vec![("a.py", "b.py", Relation::Imports), ("a.py", "b.py", Relation::Instantiates)]
        );
        assert_eq!(edges[1].meta.as_deref(), Some("calls X()"));
    }

    #[test]
    fn test_syntax_error_is_parse_failure() {
        let dir = tree(&[("bad.py", "def broken(:\n    pass\n")]);
        let err = StructuralExtractor::default()
            .extract_file(dir.path(), "bad.py")
            .unwrap_err();
        assert!(matches!(err, NavError::Parse { .. }));
    }

    #[test]
    fn test_non_utf8_is_parse_failure() {
        let dir = tempdir().unwrap();
        let err = StructuralExtractor::default()
            .extract_source(dir.path(), "bin.py", &[0xff, 0xfe, 0x00])
            .unwrap_err();
        assert!(matches!(err, NavError::Parse { .. }));
    }

    struct NeverInstantiates;

    impl InstantiationHeuristic for NeverInstantiates {
        fn is_instantiation(&self, _callee: &str) -> bool {
            false
        }
    }

    #[test]
    fn test_heuristic_is_swappable() {
        let dir = tree(&[("a.py", "from b import Bar\nBar()\n"), ("b.py", "")]);
        let extractor = StructuralExtractor::new(python_config(), Box::new(NeverInstantiates));
        let edges = extractor.extract_file(dir.path(), "a.py").unwrap();
        assert_eq!(triples(&edges), vec![("a.py", "b.py", Relation::Imports)]);
    }
}

use tree_sitter::Language;

/// Per-language parsing data. Adding a language means adding a row here;
/// the extractor and chunker read everything they need from this table.
pub struct LanguageConfig {
    pub name: &'static str,
    pub language: Language,
    pub extensions: &'static [&'static str],
    /// File that makes a directory importable as a package.
    pub package_init: &'static str,
    /// Captures `@function` / `@class` definitions with their `@name`.
    pub chunk_query: &'static str,
}

impl LanguageConfig {
    pub fn get_all() -> Vec<LanguageConfig> {
        vec![python_config()]
    }

    pub fn get_by_extension(ext: &str) -> Option<LanguageConfig> {
        Self::get_all()
            .into_iter()
            .find(|c| c.extensions.contains(&ext))
    }

    pub fn get_by_name(name: &str) -> Option<LanguageConfig> {
        Self::get_all().into_iter().find(|c| c.name == name)
    }

    /// Primary extension, used when building candidate module paths.
    pub fn primary_extension(&self) -> &'static str {
        self.extensions.first().copied().unwrap_or_default()
    }

    pub fn matches_path(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }
}

pub fn python_config() -> LanguageConfig {
    LanguageConfig {
        name: "python",
        language: tree_sitter_python::LANGUAGE.into(),
        extensions: &["py"],
        package_init: "__init__.py",
        chunk_query: r#"
(function_definition
  name: (identifier) @name) @function

(class_definition
  name: (identifier) @name) @class
"#,
    }
}

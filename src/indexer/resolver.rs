//! Maps dotted module references to tree-relative file paths.
use std::path::{Path, PathBuf};

use super::languages::LanguageConfig;

/// Resolves module references inside one source tree. A reference that does
/// not map to a file under the root is external and yields `None`.
pub struct ModuleResolver {
    root: PathBuf,
    extension: &'static str,
    package_init: &'static str,
}

impl ModuleResolver {
    pub fn new(root: &Path, config: &LanguageConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            extension: config.primary_extension(),
            package_init: config.package_init,
        }
    }

    /// Absolute reference such as `app.services.jwt`.
    pub fn resolve(&self, module: &str) -> Option<String> {
        let segments: Vec<&str> = module.split('.').collect();
        self.resolve_segments(&segments)
    }

    /// Reference written with `level` leading dots in `from_file`
    /// (a tree-relative path). `module` is `None` for `from . import x`.
    pub fn resolve_relative(
        &self,
        from_file: &str,
        level: usize,
        module: Option<&str>,
    ) -> Option<String> {
        let mut segments = package_of(from_file, level)?;
        if let Some(module) = module {
            segments.extend(module.split('.'));
        }
        self.resolve_segments(&segments)
    }

    /// Tries `<root>/<segments>.<ext>`, then `<root>/<segments>/<package init>`.
    fn resolve_segments(&self, segments: &[&str]) -> Option<String> {
        if segments.is_empty() || segments.iter().any(|s| !is_identifier(s)) {
            return None;
        }
        let joined = segments.join("/");

        let module_file = format!("{joined}.{}", self.extension);
        if self.root.join(&module_file).is_file() {
            return Some(module_file);
        }

        let package_file = format!("{joined}/{}", self.package_init);
        if self.root.join(&package_file).is_file() {
            return Some(package_file);
        }

        None
    }
}

/// Package chain of `from_file` after climbing `level - 1` parents.
/// Climbing above the root means the reference is external.
fn package_of(from_file: &str, level: usize) -> Option<Vec<&str>> {
    let mut parts: Vec<&str> = from_file.split('/').filter(|p| !p.is_empty()).collect();
    parts.pop();
    for _ in 1..level {
        parts.pop()?;
    }
    Some(parts)
}

fn is_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::languages::python_config;
    use std::fs;
    use tempfile::tempdir;

    fn tree(files: &[&str]) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for f in files {
            let path = dir.path().join(f);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        dir
    }

    #[test]
    fn test_module_file_before_package() {
        let dir = tree(&["app/services/jwt.py", "app/services/__init__.py", "app/__init__.py"]);
        let resolver = ModuleResolver::new(dir.path(), &python_config());
        assert_eq!(resolver.resolve("app.services.jwt").as_deref(), Some("app/services/jwt.py"));
        assert_eq!(resolver.resolve("app.services").as_deref(), Some("app/services/__init__.py"));
        assert_eq!(resolver.resolve("requests"), None);
        assert_eq!(resolver.resolve("app..jwt"), None);
    }

    #[test]
    fn test_relative_levels() {
        let dir = tree(&[
            "pkg/sub/mod.py",
            "pkg/sub/helpers.py",
            "pkg/models.py",
            "pkg/__init__.py",
        ]);
        let resolver = ModuleResolver::new(dir.path(), &python_config());
        assert_eq!(
            resolver.resolve_relative("pkg/sub/mod.py", 1, Some("helpers")).as_deref(),
            Some("pkg/sub/helpers.py")
        );
        assert_eq!(
            resolver.resolve_relative("pkg/sub/mod.py", 2, Some("models")).as_deref(),
            Some("pkg/models.py")
        );
        assert_eq!(
            resolver.resolve_relative("pkg/sub/mod.py", 3, None),
            None,
            "empty package chain is external"
        );
        assert_eq!(
            resolver.resolve_relative("pkg/sub/mod.py", 2, None).as_deref(),
            Some("pkg/__init__.py")
        );
    }

    #[test]
    fn test_climbing_above_root_is_external() {
        let dir = tree(&["top.py", "models.py"]);
        let resolver = ModuleResolver::new(dir.path(), &python_config());
        assert_eq!(resolver.resolve_relative("top.py", 2, Some("models")), None);
        assert_eq!(
            resolver.resolve_relative("top.py", 1, Some("models")).as_deref(),
            Some("models.py")
        );
    }
}

use crate::error::{RenderError, Result};
use globset::GlobBuilder;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Reads the contents of a file at the given path
///
/// # Errors
///
/// - `RenderError::FileNotFound` if the path doesn't exist or isn't a file.
/// - `RenderError::Io` if there's an error reading the file.
pub fn read_file_contents(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(RenderError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    fs::read_to_string(path).map_err(std::convert::Into::into)
}

/// Writes rendered output, replacing whatever was at `path`
///
/// # Errors
///
/// Returns `RenderError::Io` if the file cannot be written.
pub fn write_output(path: &Path, contents: &str) -> Result<()> {
    tracing::debug!(path = %path.display(), bytes = contents.len(), "writing output");
    fs::write(path, contents)?;
    Ok(())
}

/// Resolves a path named by a template against `base_dir`
///
/// Leading separators are ignored, so `/docs/a.md` means `<base>/docs/a.md`.
/// The result must stay inside `base_dir` once `..` and symlinks are resolved.
/// Missing trailing components are allowed; `File.exist?` needs to ask about them.
///
/// # Errors
///
/// - `RenderError::PathTraversal` if the resolved path escapes the base directory.
/// - `RenderError::Io` if the base directory or the parent directory cannot be resolved.
pub fn resolve_path(path: &str, base_dir: &Path) -> Result<PathBuf> {
    let relative = match path.trim_start_matches(['/', '\\']) {
        "" => ".",
        rest => rest,
    };
    let resolved = canonicalize_existing_prefix(&base_dir.join(relative))?;

    if !resolved.starts_with(base_dir.canonicalize()?) {
        return Err(RenderError::PathTraversal { path: resolved });
    }
    Ok(resolved)
}

/// Canonicalizes the longest existing ancestor of `path` and re-appends the
/// components below it.
fn canonicalize_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(resolved) => {
                return Ok(missing.iter().rev().fold(resolved, |acc, name| acc.join(name)));
            }
            Err(err) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name);
                    existing = parent;
                }
                _ => return Err(err),
            },
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Lists paths under `base_dir` matching a glob pattern
///
/// Paths are relative to `base_dir`, use `/` separators and are sorted.
/// `*` does not cross directory boundaries; `**` does. Hidden entries are
/// skipped unless the pattern itself names a dot-file.
///
/// # Errors
///
/// - `RenderError::Glob` if the pattern is invalid.
/// - `RenderError::PathTraversal` if the pattern walks above `base_dir`.
/// - `RenderError::WalkDir` if a directory cannot be read.
pub fn glob_files(pattern: &str, base_dir: &Path) -> Result<Vec<String>> {
    if Path::new(pattern)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir))
    {
        return Err(RenderError::PathTraversal {
            path: base_dir.join(pattern),
        });
    }

    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher();
    let include_hidden = pattern.starts_with('.') || pattern.contains("/.");
    let base = base_dir.canonicalize()?;

    let mut matches = Vec::new();
    let walker = WalkDir::new(&base)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| include_hidden || !is_hidden(e));
    for entry in walker {
        let entry = entry?;
        let relative = entry.path().strip_prefix(&base).unwrap_or(entry.path());
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if matcher.is_match(&relative) {
            matches.push(relative);
        }
    }

    matches.sort();
    tracing::trace!(pattern, count = matches.len(), "glob expanded");
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_file_contents() {
        let temp_dir = TempDir::new().unwrap();
        let template = temp_dir.path().join(".README.erb");

        fs::write(&template, "# <%= \"título\" %>\r\n").unwrap();
        assert_eq!(
            read_file_contents(&template).unwrap(),
            "# <%= \"título\" %>\r\n"
        );

        let missing = temp_dir.path().join("README.erb");
        assert!(matches!(
            read_file_contents(&missing),
            Err(RenderError::FileNotFound { .. })
        ));

        fs::create_dir(temp_dir.path().join("docs")).unwrap();
        assert!(matches!(
            read_file_contents(&temp_dir.path().join("docs")),
            Err(RenderError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_write_output_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("README.md");

        fs::write(&out, "a much longer previous body").unwrap();
        write_output(&out, "new").unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "new");
    }

    #[test]
    fn test_resolve_path_basic() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();

        let file_path = base.join("test.txt");
        fs::write(&file_path, "content").unwrap();

        let result = resolve_path("test.txt", base);
        assert_eq!(result.unwrap(), file_path.canonicalize().unwrap());

        // Leading separators stay inside the base directory
        let result = resolve_path("/test.txt", base);
        assert_eq!(result.unwrap(), file_path.canonicalize().unwrap());

        let result = resolve_path("\\test.txt", base);
        assert_eq!(result.unwrap(), file_path.canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_path_current_dir() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();

        assert_eq!(resolve_path(".", base).unwrap(), base.canonicalize().unwrap());
        assert_eq!(resolve_path("", base).unwrap(), base.canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_path_traversal_prevention() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();

        let nested_dir = base.join("subdir").join("nested");
        fs::create_dir_all(&nested_dir).unwrap();

        let result = resolve_path("../../../", &nested_dir);
        assert!(matches!(result, Err(RenderError::PathTraversal { .. })));

        let result = resolve_path("../", base);
        assert!(matches!(result, Err(RenderError::PathTraversal { .. })));
    }

    #[test]
    fn test_resolve_path_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();

        let resolved = resolve_path("nonexistent.txt", base).unwrap();
        assert_eq!(resolved, base.canonicalize().unwrap().join("nonexistent.txt"));
    }

    #[test]
    fn test_resolve_path_missing_parents() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();

        let resolved = resolve_path("docs/api/missing.md", base).unwrap();
        assert_eq!(
            resolved,
            base.canonicalize().unwrap().join("docs/api/missing.md")
        );
        assert!(!resolved.exists());

        assert!(matches!(
            resolve_path("../outside/missing.md", base),
            Err(RenderError::PathTraversal { .. })
        ));
    }

    #[test]
    fn test_glob_files() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();

        fs::write(base.join("b.py"), "").unwrap();
        fs::write(base.join("a.py"), "").unwrap();
        fs::write(base.join("notes.txt"), "").unwrap();
        fs::write(base.join(".hidden.py"), "").unwrap();
        fs::create_dir(base.join("pyunit")).unwrap();
        fs::write(base.join("pyunit").join("test_a.py"), "").unwrap();

        assert_eq!(glob_files("*.py", base).unwrap(), vec!["a.py", "b.py"]);
        assert_eq!(
            glob_files("**/*.py", base).unwrap(),
            vec!["a.py", "b.py", "pyunit/test_a.py"]
        );
        assert_eq!(glob_files(".*.py", base).unwrap(), vec![".hidden.py"]);
        assert!(glob_files("*.rs", base).unwrap().is_empty());
    }

    #[test]
    fn test_glob_files_rejects_escape_and_bad_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();

        assert!(matches!(
            glob_files("../*", base),
            Err(RenderError::PathTraversal { .. })
        ));
        assert!(matches!(
            glob_files("[unclosed", base),
            Err(RenderError::Glob(_))
        ));
    }
}

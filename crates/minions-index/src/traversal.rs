//! Workspace traversal and path handling.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use tracing::{debug, warn};

/// Decides which files under a workspace root are eligible for indexing.
#[derive(Debug, Clone)]
pub struct FileFilter {
    extensions: HashSet<String>,
    ignore_dirs: Arc<HashSet<String>>,
    max_file_size: u64,
    respect_gitignore: bool,
}

impl FileFilter {
    /// Extensions are matched case-insensitively and may be given with or
    /// without a leading dot.
    pub fn new(
        extensions: &[String],
        ignore_dirs: &[String],
        max_file_size: u64,
        respect_gitignore: bool,
    ) -> Self {
        let extensions = extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Self {
            extensions,
            ignore_dirs: Arc::new(ignore_dirs.iter().cloned().collect()),
            max_file_size,
            respect_gitignore,
        }
    }

    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.ignore_dirs.contains(name)
    }

    pub fn has_allowed_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    /// Walk `root` and return every eligible file, sorted by path.
    ///
    /// Ignored directories are pruned before descending. Entries that cannot
    /// be read are logged and skipped.
    pub fn collect(&self, root: &Path) -> Vec<PathBuf> {
        let ignore_dirs = Arc::clone(&self.ignore_dirs);

        let walker = WalkBuilder::new(root)
            .hidden(false)
            .ignore(false)
            .parents(self.respect_gitignore)
            .git_ignore(self.respect_gitignore)
            .git_global(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .require_git(false)
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
                !(is_dir && ignore_dirs.contains(entry.file_name().to_string_lossy().as_ref()))
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            if !self.has_allowed_extension(path) {
                debug!("Skipping {:?}: extension not indexed", path);
                continue;
            }

            match entry.metadata() {
                Ok(meta) if meta.len() > self.max_file_size => {
                    debug!(
                        "Skipping {:?}: {} bytes exceeds limit of {}",
                        path,
                        meta.len(),
                        self.max_file_size
                    );
                }
                Ok(_) => files.push(path.to_path_buf()),
                Err(e) => warn!("Skipping {:?}: {}", path, e),
            }
        }

        files.sort();
        files
    }
}

/// Normalize a relative path to its `/`-separated form.
///
/// Returns `None` for absolute paths, paths escaping via `..`, and paths
/// that are empty after dropping `.` components.
pub fn normalize_relative(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Workspace-relative form of `path`.
///
/// Relative paths are taken as relative to `root`. Absolute paths must lie
/// under `root`; they are canonicalized when they still exist so that
/// symlinked spellings of the root are accepted.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    if !path.is_absolute() {
        return normalize_relative(path);
    }

    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let stripped = resolved
        .strip_prefix(root)
        .or_else(|_| path.strip_prefix(root))
        .ok()?;
    normalize_relative(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn filter(max: u64) -> FileFilter {
        FileFilter::new(
            &["py".to_string(), ".RS".to_string()],
            &[".git".to_string(), "node_modules".to_string()],
            max,
            false,
        )
    }

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        let f = filter(1024);
        assert!(f.has_allowed_extension(Path::new("a/main.py")));
        assert!(f.has_allowed_extension(Path::new("lib.RS")));
        assert!(f.has_allowed_extension(Path::new("Main.PY")));
        assert!(!f.has_allowed_extension(Path::new("README")));
        assert!(!f.has_allowed_extension(Path::new("image.png")));
    }

    #[test]
    fn test_collect_prunes_ignored_dirs_and_filters() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("src/node_modules/pkg")).unwrap();
        fs::write(root.join("main.py"), "print('hi')\n").unwrap();
        fs::write(root.join("src/lib.rs"), "fn a() {}\n").unwrap();
        fs::write(root.join(".git/hook.py"), "x = 1\n").unwrap();
        fs::write(root.join("src/node_modules/pkg/index.py"), "x = 1\n").unwrap();
        fs::write(root.join("notes.bin"), "data").unwrap();
        fs::write(root.join("big.py"), "x".repeat(200)).unwrap();

        let files = filter(100).collect(root);
        let rel: Vec<String> = files
            .iter()
            .map(|p| relative_path(root, p).unwrap())
            .collect();

        assert_eq!(rel, vec!["main.py", "src/lib.rs"]);
    }

    #[test]
    fn test_collect_includes_hidden_files() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".config")).unwrap();
        fs::write(dir.path().join(".config/settings.py"), "a = 1\n").unwrap();

        let files = filter(1024).collect(dir.path());
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_gitignore_respected_only_when_enabled() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "generated.py\n").unwrap();
        fs::write(dir.path().join("generated.py"), "a = 1\n").unwrap();
        fs::write(dir.path().join("kept.py"), "b = 2\n").unwrap();

        assert_eq!(filter(1024).collect(dir.path()).len(), 2);

        let strict = FileFilter::new(&["py".to_string()], &[], 1024, true);
        let files = strict.collect(dir.path());
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("kept.py"));
    }

    #[test]
    fn test_normalize_relative() {
        assert_eq!(normalize_relative(Path::new("src/main.rs")).as_deref(), Some("src/main.rs"));
        assert_eq!(normalize_relative(Path::new("./a/./b.py")).as_deref(), Some("a/b.py"));
        assert_eq!(normalize_relative(Path::new("../etc/passwd")), None);
        assert_eq!(normalize_relative(Path::new("a/../../b")), None);
        assert_eq!(normalize_relative(Path::new("/etc/passwd")), None);
        assert_eq!(normalize_relative(Path::new(".")), None);
    }

    #[test]
    fn test_relative_path_for_absolute_inputs() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("pkg/mod.py"), "").unwrap();

        assert_eq!(
            relative_path(&root, &root.join("pkg/mod.py")).as_deref(),
            Some("pkg/mod.py")
        );
        // Deleted files can still be addressed by absolute path.
        assert_eq!(
            relative_path(&root, &root.join("gone.py")).as_deref(),
            Some("gone.py")
        );
        assert_eq!(relative_path(&root, Path::new("/definitely/elsewhere.py")), None);
    }
}

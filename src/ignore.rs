// Ignore pattern resolution

use globset::{Glob, GlobMatcher};
use std::path::Path;

use crate::config::{Config, IGNORE_FILE, STATE_DIR};
use crate::error::{EngineError, Result};

/// Directories and files excluded by default: VCS state, virtualenvs,
/// package caches, build output, and our own state directory.
const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "build",
    "dist",
    "out",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    ".idea",
    ".vscode",
    "vendor",
    "*.min.js",
    "*.map",
];

/// Binary extensions never worth walking into a parser.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "svg", "webp", "bmp", "woff", "woff2", "ttf", "eot",
    "otf", "mp3", "mp4", "wav", "ogg", "webm", "avi", "mov", "zip", "tar", "gz", "rar", "7z",
    "bz2", "xz", "pdf", "doc", "docx", "xls", "xlsx", "pyc", "pyo", "so", "dylib", "dll", "exe",
    "o", "a", "class", "jar", "wasm", "bin", "db", "sqlite", "sqlite3",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternSource {
    Default,
    IgnoreFile,
    Cli,
}

#[derive(Debug)]
struct IgnorePattern {
    matcher: GlobMatcher,
    component_matcher: GlobMatcher,
    negated: bool,
    dir_only: bool,
    #[allow(dead_code)]
    source: PatternSource,
}

impl IgnorePattern {
    fn new(raw: &str, source: PatternSource) -> Result<Self> {
        let mut pattern = raw.trim().to_string();
        let negated = pattern.starts_with('!');
        if negated {
            pattern.remove(0);
        }
        let dir_only = pattern.ends_with('/');
        if dir_only {
            pattern.pop();
        }
        let anchored = pattern.starts_with('/');
        if anchored {
            pattern.remove(0);
        }

        // Unanchored patterns match at any level, gitignore-style.
        let full = if anchored || pattern.contains('/') {
            pattern.clone()
        } else {
            format!("**/{pattern}")
        };
        let matcher = Glob::new(&full)
            .map_err(|e| EngineError::InvalidArgument(format!("bad glob {raw:?}: {e}")))?
            .compile_matcher();
        // Also match everything underneath a matching directory.
        let component = Glob::new(&format!("{full}/**"))
            .map_err(|e| EngineError::InvalidArgument(format!("bad glob {raw:?}: {e}")))?
            .compile_matcher();

        Ok(Self {
            matcher,
            component_matcher: component,
            negated,
            dir_only,
            source,
        })
    }

    fn matches(&self, rel_path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir && !self.component_matcher.is_match(rel_path) {
            return false;
        }
        self.matcher.is_match(rel_path) || self.component_matcher.is_match(rel_path)
    }
}

/// Merges built-in excludes, the repo ignore file, and explicit CLI
/// include/exclude globs into one decision function.
///
/// Precedence: CLI includes override everything except the state-directory
/// self-exclusion; CLI excludes come next; then ignore-file and default
/// patterns are applied in order with gitignore negation semantics.
pub struct IgnoreResolver {
    patterns: Vec<IgnorePattern>,
    includes: Vec<IgnorePattern>,
    excludes: Vec<IgnorePattern>,
}

impl IgnoreResolver {
    pub fn new(repo_root: &Path, config: &Config) -> Result<Self> {
        let mut patterns = Vec::new();

        for raw in DEFAULT_EXCLUDES {
            patterns.push(IgnorePattern::new(raw, PatternSource::Default)?);
        }
        for ext in BINARY_EXTENSIONS {
            patterns.push(IgnorePattern::new(
                &format!("*.{ext}"),
                PatternSource::Default,
            )?);
        }

        let ignore_file = repo_root.join(IGNORE_FILE);
        if ignore_file.is_file() {
            let content = std::fs::read_to_string(&ignore_file)?;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                patterns.push(IgnorePattern::new(line, PatternSource::IgnoreFile)?);
            }
            tracing::debug!("Loaded ignore patterns from {}", ignore_file.display());
        }

        let mut excludes = Vec::new();
        for raw in &config.index.exclude_dirs {
            excludes.push(IgnorePattern::new(raw, PatternSource::Cli)?);
        }

        Ok(Self {
            patterns,
            includes: Vec::new(),
            excludes,
        })
    }

    /// Add an explicit include glob (overrides matched excludes).
    pub fn add_include(&mut self, pattern: &str) -> Result<()> {
        self.includes
            .push(IgnorePattern::new(pattern, PatternSource::Cli)?);
        Ok(())
    }

    /// Add an explicit exclude glob.
    pub fn add_exclude(&mut self, pattern: &str) -> Result<()> {
        self.excludes
            .push(IgnorePattern::new(pattern, PatternSource::Cli)?);
        Ok(())
    }

    /// Whether a repo-relative path should be skipped.
    pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        let rel_path = rel_path.trim_start_matches("./");

        // Self-exclusion invariant: the index state directory is never
        // indexed, regardless of includes.
        if rel_path == STATE_DIR || rel_path.starts_with(&format!("{STATE_DIR}/")) {
            return true;
        }

        for include in &self.includes {
            if include.matches(rel_path, is_dir) {
                return false;
            }
        }

        for exclude in &self.excludes {
            if exclude.matches(rel_path, is_dir) {
                return true;
            }
        }

        // Hidden entries are skipped unless an ignore-file negation
        // re-includes them.
        let basename = rel_path.rsplit('/').next().unwrap_or(rel_path);
        let hidden = basename.starts_with('.') && basename != IGNORE_FILE;

        let mut ignored = hidden;
        for pattern in &self.patterns {
            if pattern.matches(rel_path, is_dir) {
                ignored = !pattern.negated;
            }
        }
        ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(dir: &Path) -> IgnoreResolver {
        IgnoreResolver::new(dir, &Config::default()).unwrap()
    }

    #[test]
    fn test_default_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path());
        assert!(r.is_ignored("node_modules", true));
        assert!(r.is_ignored("node_modules/pkg/index.js", false));
        assert!(r.is_ignored(".git/config", false));
        assert!(r.is_ignored("a/b/__pycache__/x.pyc", false));
        assert!(!r.is_ignored("src/main.py", false));
    }

    #[test]
    fn test_state_dir_never_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = resolver(dir.path());
        r.add_include(".pui/**").unwrap();
        assert!(r.is_ignored(".pui", true));
        assert!(r.is_ignored(".pui/index.sqlite", false));
    }

    #[test]
    fn test_binary_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path());
        assert!(r.is_ignored("assets/logo.png", false));
        assert!(r.is_ignored("lib.so", false));
    }

    #[test]
    fn test_cli_exclude_and_include() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = resolver(dir.path());
        r.add_exclude("generated/**").unwrap();
        assert!(r.is_ignored("generated/api.py", false));

        r.add_include("generated/keep.py").unwrap();
        assert!(!r.is_ignored("generated/keep.py", false));
        assert!(r.is_ignored("generated/other.py", false));
    }

    #[test]
    fn test_ignore_file_patterns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(IGNORE_FILE), "docs/\n!docs/api.md\n").unwrap();
        let r = resolver(dir.path());
        assert!(r.is_ignored("docs/guide.md", false));
        assert!(!r.is_ignored("docs/api.md", false));
    }

    #[test]
    fn test_hidden_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path());
        assert!(r.is_ignored(".env", false));
        assert!(r.is_ignored("conf/.secret", false));
    }
}

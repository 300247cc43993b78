// File discovery: walk, classify, normalize

use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::Result;
use crate::ignore::IgnoreResolver;
use crate::parser::Language;

/// A candidate file found on disk.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub abs_path: PathBuf,
    /// Repo-root-relative, forward-slash, NFC-normalized.
    pub rel_path: String,
    /// Classified language; None for unknown extensions, which still get
    /// File rows.
    pub language: Option<Language>,
    pub size: u64,
    pub mtime: i64,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryStats {
    pub walked: usize,
    pub skipped_too_large: usize,
}

/// Walk the repo root, skipping ignored entries, symlinks, and oversized
/// files. Results are sorted by relative path so downstream work is
/// deterministic.
pub fn discover(
    root: &Path,
    ignore: &IgnoreResolver,
    config: &Config,
) -> Result<(Vec<DiscoveredFile>, DiscoveryStats)> {
    let mut files = Vec::new();
    let mut stats = DiscoveryStats::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let rel = match entry.path().strip_prefix(root) {
                Ok(rel) => normalize_rel(rel),
                Err(_) => return false,
            };
            !ignore.is_ignored(&rel, entry.file_type().is_dir())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Walk error: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        stats.walked += 1;

        let rel_path = match entry.path().strip_prefix(root) {
            Ok(rel) => normalize_rel(rel),
            Err(_) => continue,
        };

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Cannot stat {}: {}", rel_path, e);
                continue;
            }
        };

        if metadata.len() > config.index.max_file_size {
            let skip = crate::error::EngineError::FileTooLarge {
                path: rel_path.clone(),
                size: metadata.len(),
                limit: config.index.max_file_size,
            };
            tracing::info!("Skipping: {}", skip);
            stats.skipped_too_large += 1;
            continue;
        }

        let language = classify(&rel_path, config);
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        files.push(DiscoveredFile {
            abs_path: entry.path().to_path_buf(),
            rel_path,
            language,
            size: metadata.len(),
            mtime,
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok((files, stats))
}

/// Classify by extension, honoring overrides and the enabled-language set.
/// Disabled or unrecognized languages come back as None; those files are
/// still tracked as File rows.
fn classify(rel_path: &str, config: &Config) -> Option<Language> {
    let ext = rel_path.rsplit('.').next()?;
    if ext == rel_path {
        return None;
    }
    let language = Language::from_extension(
        &ext.to_lowercase(),
        &config.parsing.language_overrides,
    )?;
    if config
        .parsing
        .languages
        .iter()
        .any(|l| l == language.as_str())
    {
        Some(language)
    } else {
        None
    }
}

/// Stored-path normalization: forward slashes, NFC.
fn normalize_rel(rel: &Path) -> String {
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    joined.nfc().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        dir
    }

    fn run(dir: &tempfile::TempDir) -> Vec<DiscoveredFile> {
        let config = Config::default();
        let ignore = IgnoreResolver::new(dir.path(), &config).unwrap();
        discover(dir.path(), &ignore, &config).unwrap().0
    }

    #[test]
    fn test_discover_classifies_languages() {
        let dir = setup(&[
            ("src/a.py", "x = 1\n"),
            ("src/b.rs", "fn main() {}\n"),
            ("README.md", "# hi\n"),
        ]);
        let files = run(&dir);
        assert_eq!(files.len(), 3);

        let by_path = |p: &str| files.iter().find(|f| f.rel_path == p).unwrap();
        assert_eq!(by_path("src/a.py").language, Some(Language::Python));
        assert_eq!(by_path("src/b.rs").language, Some(Language::Rust));
        assert_eq!(by_path("README.md").language, None);
    }

    #[test]
    fn test_discover_skips_ignored_dirs() {
        let dir = setup(&[
            ("src/a.py", "x = 1\n"),
            ("node_modules/p/i.js", "x\n"),
            (".pui/index.sqlite", "binary"),
        ]);
        let files = run(&dir);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "src/a.py");
    }

    #[test]
    fn test_discover_is_sorted() {
        let dir = setup(&[("z.py", "1"), ("a.py", "1"), ("m/b.py", "1")]);
        let files = run(&dir);
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn test_max_file_size_skip() {
        let dir = setup(&[("small.py", "x = 1\n")]);
        let big = "x".repeat(4096);
        std::fs::write(dir.path().join("big.py"), big).unwrap();

        let mut config = Config::default();
        config.index.max_file_size = 1024;
        let ignore = IgnoreResolver::new(dir.path(), &config).unwrap();
        let (files, stats) = discover(dir.path(), &ignore, &config).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(stats.skipped_too_large, 1);
    }

    #[test]
    fn test_disabled_language_unclassified() {
        let dir = setup(&[("a.go", "package a\n")]);
        let mut config = Config::default();
        config.parsing.languages = vec!["python".to_string()];
        let ignore = IgnoreResolver::new(dir.path(), &config).unwrap();
        let (files, _) = discover(dir.path(), &ignore, &config).unwrap();
        assert_eq!(files[0].language, None);
    }
}

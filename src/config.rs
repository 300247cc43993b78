// Configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{EngineError, Result};

/// Name of the repo-local state directory. The directory itself is always
/// excluded from indexing.
pub const STATE_DIR: &str = ".pui";

/// Cached effective configuration inside the state directory.
pub const CONFIG_FILE: &str = "config.json";

/// Repo-local ignore file, gitignore-style.
pub const IGNORE_FILE: &str = ".puiignore";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub parsing: ParsingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Glob patterns excluded on top of the built-in defaults.
    pub exclude_dirs: Vec<String>,
    /// Byte limit per file; larger files are skipped and logged.
    pub max_file_size: u64,
    /// Parser parallelism; 0 means one worker per CPU.
    pub workers: usize,
    /// Files per write transaction.
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    /// Enabled language set.
    pub languages: Vec<String>,
    /// Extension -> language overrides, e.g. {".pyx": "python"}.
    pub language_overrides: HashMap<String, String>,
    /// Soft per-file parse timeout in milliseconds.
    pub parse_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default token budget when a command does not pass --max-tokens.
    pub max_tokens: Option<usize>,
    /// markdown | json
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            parsing: ParsingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: Vec::new(),
            max_file_size: 1_048_576,
            workers: 0,
            batch_size: 1,
        }
    }
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            languages: vec![
                "python".to_string(),
                "javascript".to_string(),
                "typescript".to_string(),
                "go".to_string(),
                "rust".to_string(),
            ],
            language_overrides: HashMap::new(),
            parse_timeout_ms: 5000,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_tokens: None,
            format: "markdown".to_string(),
        }
    }
}

impl Config {
    /// Load the cached effective config from `<repo>/.pui/config.json`,
    /// falling back to defaults when absent or unreadable.
    pub fn from_repo(repo_root: impl AsRef<Path>) -> Self {
        let path = repo_root.as_ref().join(STATE_DIR).join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => match config.validate() {
                    Ok(()) => {
                        tracing::info!("Loaded configuration from {}", path.display());
                        config
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Invalid config at {}: {}; using defaults",
                            path.display(),
                            e
                        );
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::warn!("Could not parse {}: {}; using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::debug!("No config at {}: {}; using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write the effective config back into the state directory.
    pub fn write_cache(&self, repo_root: impl AsRef<Path>) -> Result<()> {
        let dir = repo_root.as_ref().join(STATE_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::InvalidArgument(format!("config serialization: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Effective worker count for parser parallelism.
    pub fn effective_workers(&self) -> usize {
        if self.index.workers > 0 {
            self.index.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.index.batch_size == 0 {
            return Err(EngineError::InvalidArgument(
                "index.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.index.max_file_size == 0 {
            return Err(EngineError::InvalidArgument(
                "index.max_file_size must be greater than 0".to_string(),
            ));
        }
        let known = [
            "python",
            "javascript",
            "typescript",
            "go",
            "rust",
            "c",
            "cpp",
        ];
        for lang in &self.parsing.languages {
            if !known.contains(&lang.as_str()) {
                return Err(EngineError::InvalidArgument(format!(
                    "unsupported language: {lang}"
                )));
            }
        }
        if self.output.format != "markdown" && self.output.format != "json" {
            return Err(EngineError::InvalidArgument(format!(
                "invalid output format: {}",
                self.output.format
            )));
        }
        Ok(())
    }
}

/// Normalize a user-supplied path against the repo root, rejecting anything
/// that escapes it. Returns the repo-relative, forward-slash form.
pub fn normalize_repo_path(repo_root: &Path, input: &str) -> Result<String> {
    use std::path::Component;

    let candidate = Path::new(input);
    let root = repo_root
        .canonicalize()
        .unwrap_or_else(|_| repo_root.to_path_buf());
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    // Lexical normalization: resolve `.` and `..` without touching the fs,
    // so the check holds even for paths that do not exist.
    let mut normalized = std::path::PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(EngineError::PathEscapesRoot(candidate.to_path_buf()));
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    let resolved = normalized.canonicalize().unwrap_or(normalized);
    let rel = resolved
        .strip_prefix(&root)
        .map_err(|_| EngineError::PathEscapesRoot(candidate.to_path_buf()))?;

    Ok(rel.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.index.batch_size, 1);
        assert!(config.parsing.languages.contains(&"python".to_string()));
        assert_eq!(config.output.format, "markdown");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.index.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.parsing.languages = vec!["cobol".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.format = "yaml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrip_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.index.max_file_size = 2048;
        config.write_cache(dir.path()).unwrap();

        let loaded = Config::from_repo(dir.path());
        assert_eq!(loaded.index.max_file_size, 2048);
    }

    #[test]
    fn test_normalize_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let err = normalize_repo_path(dir.path(), "../../etc/passwd").unwrap_err();
        assert!(matches!(err, EngineError::PathEscapesRoot(_)));
    }

    #[test]
    fn test_normalize_accepts_inside() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.py"), "x = 1\n").unwrap();
        let rel = normalize_repo_path(dir.path(), "src/./a.py").unwrap();
        assert_eq!(rel, "src/a.py");
    }
}

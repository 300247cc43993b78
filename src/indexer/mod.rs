// Incremental indexing: discover -> hash-skip -> parse -> persist -> resolve

pub mod discovery;
pub mod lock;
pub mod watcher;

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::{Config, STATE_DIR};
use crate::error::{EngineError, Result};
use crate::ignore::IgnoreResolver;
use crate::parser::{ParseOutput, ParserFacade};
use crate::resolver::{resolve_import, Resolver};
use crate::store::db::{FileUpsert, Store};
use discovery::DiscoveredFile;
use lock::IndexLock;

/// Operation modes for one indexing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Re-parse everything, ignoring stored hashes.
    Full,
    /// Skip files whose content hash is unchanged.
    Incremental,
    /// Count what would change; write nothing.
    StatsOnly,
}

/// Counters for one indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub files_scanned: usize,
    pub files_new: usize,
    pub files_changed: usize,
    pub files_unchanged: usize,
    pub files_deleted: usize,
    pub files_error: usize,
    pub files_skipped_large: usize,
    pub symbols_added: usize,
    pub edges_added: usize,
    pub callsites_added: usize,
    pub call_edges_resolved: usize,
    pub duration_ms: u128,
}

impl std::fmt::Display for IndexStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Index statistics:")?;
        writeln!(f, "  Files scanned:   {}", self.files_scanned)?;
        writeln!(f, "  Files new:       {}", self.files_new)?;
        writeln!(f, "  Files changed:   {}", self.files_changed)?;
        writeln!(f, "  Files unchanged: {}", self.files_unchanged)?;
        writeln!(f, "  Files deleted:   {}", self.files_deleted)?;
        writeln!(f, "  Files errored:   {}", self.files_error)?;
        writeln!(f, "  Symbols added:   {}", self.symbols_added)?;
        writeln!(f, "  Edges added:     {}", self.edges_added)?;
        writeln!(f, "  Call edges:      {}", self.call_edges_resolved)?;
        write!(f, "  Duration:        {}ms", self.duration_ms)
    }
}

/// Cooperative cancellation shared between the signal handler and the
/// indexer. Checked at file boundaries; committed work stays committed.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of the per-file parallel stage.
enum FileWork {
    Unchanged,
    Replace {
        upsert: FileUpsert,
        parse: Option<ParseOutput>,
        is_new: bool,
    },
    Failed {
        path: String,
        error: String,
    },
}

pub struct Indexer {
    repo_root: PathBuf,
    config: Config,
    store: Store,
    facade: Arc<ParserFacade>,
    cancel: CancelToken,
}

impl Indexer {
    pub fn new(repo_root: impl AsRef<Path>, config: Config, cancel: CancelToken) -> Result<Self> {
        let repo_root = repo_root.as_ref().to_path_buf();
        let store = Store::open_in_repo(&repo_root)?;
        let facade = Arc::new(ParserFacade::new(Duration::from_millis(
            config.parsing.parse_timeout_ms,
        )));
        Ok(Self {
            repo_root,
            config,
            store,
            facade,
            cancel,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run one indexing pass.
    pub async fn run(&self, mode: IndexMode) -> Result<IndexStats> {
        let start = Instant::now();
        let mut stats = IndexStats::default();

        // Writers are exclusive per repo; stats-only runs read.
        let _lock = if mode == IndexMode::StatsOnly {
            None
        } else {
            Some(IndexLock::acquire(&self.repo_root, IndexLock::DEFAULT_GRACE)?)
        };

        let mut ignore = IgnoreResolver::new(&self.repo_root, &self.config)?;
        for pattern in &self.config.index.exclude_dirs {
            ignore.add_exclude(pattern)?;
        }
        let (discovered, discovery_stats) =
            discovery::discover(&self.repo_root, &ignore, &self.config)?;
        stats.files_scanned = discovered.len();
        stats.files_skipped_large = discovery_stats.skipped_too_large;

        let stored: HashMap<String, String> = self
            .store
            .all_files()?
            .into_iter()
            .map(|f| (f.path, f.content_hash))
            .collect();
        let discovered_paths: HashSet<String> =
            discovered.iter().map(|f| f.rel_path.clone()).collect();

        // Deleted files first so cascades do not race replacements.
        if mode != IndexMode::StatsOnly {
            for path in stored.keys() {
                if !discovered_paths.contains(path) {
                    self.store.delete_file(path)?;
                    stats.files_deleted += 1;
                }
            }
        } else {
            stats.files_deleted = stored
                .keys()
                .filter(|p| !discovered_paths.contains(*p))
                .count();
        }

        // Parallel parse in worker-sized chunks; persistence stays
        // serialized behind the store's single writer.
        let workers = self.config.effective_workers().max(1);
        let mut changed_file_ids: Vec<i64> = Vec::new();
        let mut batch: Vec<(FileUpsert, Option<ParseOutput>)> = Vec::new();

        for chunk in discovered.chunks(workers) {
            if self.cancel.is_cancelled() {
                self.flush_batch(&mut batch, &mut changed_file_ids, &mut stats)?;
                return Err(EngineError::Cancelled);
            }

            let mut handles = Vec::with_capacity(chunk.len());
            for file in chunk {
                let file = file.clone();
                let stored_hash = stored.get(&file.rel_path).cloned();
                let facade = Arc::clone(&self.facade);
                let files = discovered_paths.clone();
                let force = mode == IndexMode::Full;
                handles.push(tokio::task::spawn_blocking(move || {
                    process_file(&file, stored_hash, force, &facade, &files)
                }));
            }

            for (file, handle) in chunk.iter().zip(handles) {
                let work = handle.await.map_err(|e| {
                    EngineError::ParseFailure {
                        path: file.rel_path.clone(),
                        message: format!("worker panicked: {e}"),
                    }
                })?;
                match work {
                    FileWork::Unchanged => {
                        stats.files_unchanged += 1;
                        if mode != IndexMode::StatsOnly {
                            self.store
                                .touch_file(&file.rel_path, chrono::Utc::now().timestamp())?;
                        }
                    }
                    FileWork::Replace {
                        upsert,
                        parse,
                        is_new,
                    } => {
                        if is_new {
                            stats.files_new += 1;
                        } else {
                            stats.files_changed += 1;
                        }
                        if mode == IndexMode::StatsOnly {
                            continue;
                        }
                        if let Some(parse) = &parse {
                            for error in &parse.errors {
                                self.log_parse_error(&upsert.path, error)?;
                            }
                        }
                        batch.push((upsert, parse));
                        if batch.len() >= self.config.index.batch_size {
                            self.flush_batch(&mut batch, &mut changed_file_ids, &mut stats)?;
                        }
                    }
                    FileWork::Failed { path, error } => {
                        // Prior rows stay intact; the failure is logged.
                        warn!("Parse failure in {}: {}", path, error);
                        stats.files_error += 1;
                        if mode != IndexMode::StatsOnly {
                            self.log_parse_error(&path, &error)?;
                        }
                    }
                }
            }
        }
        self.flush_batch(&mut batch, &mut changed_file_ids, &mut stats)?;

        // Resolver runs only after every changed file is persisted.
        if mode != IndexMode::StatsOnly
            && (!changed_file_ids.is_empty() || stats.files_deleted > 0)
        {
            let resolver = Resolver::new(&self.store)?;
            let resolve_stats = resolver.run(&changed_file_ids)?;
            stats.call_edges_resolved = resolve_stats.call_edges;
            stats.edges_added += resolve_stats.call_edges
                + resolve_stats.import_edges
                + resolve_stats.inherit_edges
                + resolve_stats.module_edges;
        }

        if mode != IndexMode::StatsOnly {
            self.store
                .meta_set("last_indexed", &chrono::Utc::now().timestamp().to_string())?;
            self.config.write_cache(&self.repo_root)?;
        }

        stats.duration_ms = start.elapsed().as_millis();
        info!(
            "Index pass done: {} new, {} changed, {} unchanged, {} deleted ({}ms)",
            stats.files_new,
            stats.files_changed,
            stats.files_unchanged,
            stats.files_deleted,
            stats.duration_ms
        );
        Ok(stats)
    }

    fn flush_batch(
        &self,
        batch: &mut Vec<(FileUpsert, Option<ParseOutput>)>,
        changed_file_ids: &mut Vec<i64>,
        stats: &mut IndexStats,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let outcomes = self.store.replace_files(batch)?;
        for outcome in outcomes {
            changed_file_ids.push(outcome.file_id);
            stats.symbols_added += outcome.symbols_added;
            stats.edges_added += outcome.edges_added;
            stats.callsites_added += outcome.callsites_added;
        }
        batch.clear();
        Ok(())
    }

    /// Append one NDJSON record to `.pui/parsing_errors.log`.
    fn log_parse_error(&self, path: &str, error: &str) -> Result<()> {
        use std::io::Write;
        let dir = self.repo_root.join(STATE_DIR);
        std::fs::create_dir_all(&dir)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("parsing_errors.log"))?;
        let record = serde_json::json!({
            "at": chrono::Utc::now().to_rfc3339(),
            "path": path,
            "error": error,
        });
        writeln!(file, "{record}")?;
        Ok(())
    }
}

/// CPU-bound per-file stage, run on the blocking pool: read, hash,
/// compare, parse, resolve imports.
fn process_file(
    file: &DiscoveredFile,
    stored_hash: Option<String>,
    force: bool,
    facade: &ParserFacade,
    repo_files: &HashSet<String>,
) -> FileWork {
    let bytes = match std::fs::read(&file.abs_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return FileWork::Failed {
                path: file.rel_path.clone(),
                error: format!("read failed: {e}"),
            }
        }
    };

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let content_hash = format!("{:x}", hasher.finalize());

    let is_new = stored_hash.is_none();
    if !force && stored_hash.as_deref() == Some(content_hash.as_str()) {
        return FileWork::Unchanged;
    }

    let content = String::from_utf8_lossy(&bytes);
    let upsert = FileUpsert {
        path: file.rel_path.clone(),
        language: file.language.map(|l| l.as_str().to_string()),
        content_hash,
        size: file.size as i64,
        mtime: file.mtime,
        line_count: content.lines().count() as u32,
    };

    let parse = match file.language {
        Some(language) if language.has_symbol_support() => {
            match facade.parse(language, &content, &file.rel_path) {
                Ok(mut output) => {
                    for import in &mut output.imports {
                        import.resolved_path =
                            resolve_import(&file.rel_path, &import.module, language, repo_files);
                    }
                    Some(output)
                }
                Err(e) => {
                    return FileWork::Failed {
                        path: file.rel_path.clone(),
                        error: e.to_string(),
                    }
                }
            }
        }
        // C/C++ and unknown extensions: File row only.
        _ => None,
    };

    FileWork::Replace {
        upsert,
        parse,
        is_new,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EdgeKind;

    fn write_file(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn indexer(root: &Path) -> Indexer {
        Indexer::new(root, Config::default(), CancelToken::new()).unwrap()
    }

    #[tokio::test]
    async fn test_python_roundtrip_callers() {
        // S1: def foo / def bar calling foo; bar must become a caller of
        // foo with confidence >= 0.7 and foo must have no callees.
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "src/a.py",
            "def foo():\n    pass\n\ndef bar():\n    foo()\n",
        );

        let idx = indexer(dir.path());
        let stats = idx.run(IndexMode::Incremental).await.unwrap();
        assert_eq!(stats.files_new, 1);

        let store = idx.store();
        let foo = &store.symbols_named("foo").unwrap()[0];
        let callers = store.edges_to(foo.id, Some(EdgeKind::Call)).unwrap();
        assert_eq!(callers.len(), 1);
        assert!(callers[0].confidence >= 0.7);
        let bar = store.symbol(callers[0].source_id).unwrap().unwrap();
        assert_eq!(bar.name, "bar");

        let callees = store.edges_from(foo.id, Some(EdgeKind::Call)).unwrap();
        assert!(callees.is_empty());
    }

    #[tokio::test]
    async fn test_idempotent_reindex() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.py", "def f():\n    pass\n");

        let idx = indexer(dir.path());
        idx.run(IndexMode::Incremental).await.unwrap();
        let v1 = idx.store().index_version().unwrap();
        let s1 = idx.store().stats().unwrap();

        let stats = idx.run(IndexMode::Incremental).await.unwrap();
        assert_eq!(stats.files_unchanged, 1);
        assert_eq!(stats.files_new + stats.files_changed, 0);
        assert_eq!(idx.store().index_version().unwrap(), v1);
        let s2 = idx.store().stats().unwrap();
        assert_eq!(s1.symbols, s2.symbols);
        assert_eq!(s1.edges, s2.edges);
    }

    #[tokio::test]
    async fn test_deletion_cleanup() {
        // S2: after deleting a file and re-indexing, nothing remains.
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/a.py", "def foo():\n    pass\n");
        write_file(dir.path(), "src/b.py", "from a import foo\n\ndef g():\n    foo()\n");

        let idx = indexer(dir.path());
        idx.run(IndexMode::Incremental).await.unwrap();
        assert!(!idx.store().symbols_named("foo").unwrap().is_empty());

        std::fs::remove_file(dir.path().join("src/a.py")).unwrap();
        let stats = idx.run(IndexMode::Incremental).await.unwrap();
        assert_eq!(stats.files_deleted, 1);
        assert!(idx.store().symbols_named("foo").unwrap().is_empty());

        // No dangling edges: every edge endpoint still resolves.
        for symbol in idx.store().all_symbols().unwrap() {
            for edge in idx.store().edges_from(symbol.id, None).unwrap() {
                assert!(idx.store().symbol(edge.target_id).unwrap().is_some());
            }
        }
    }

    #[tokio::test]
    async fn test_qualified_require_call() {
        // S3: const m = require('./m'); m.foo() resolves into m.js with
        // confidence >= 0.9.
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "m.js", "function foo() {}\nmodule.exports = { foo };\n");
        write_file(dir.path(), "x.js", "const m = require('./m');\nm.foo();\n");

        let idx = indexer(dir.path());
        idx.run(IndexMode::Incremental).await.unwrap();

        let store = idx.store();
        let foo = store
            .symbols_named("foo")
            .unwrap()
            .into_iter()
            .find(|s| s.kind.callable())
            .unwrap();
        let callers = store.edges_to(foo.id, Some(EdgeKind::Call)).unwrap();
        assert_eq!(callers.len(), 1, "expected one call edge into m.js:foo");
        assert!(callers[0].confidence >= 0.9);
    }

    #[tokio::test]
    async fn test_stats_only_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.py", "def f():\n    pass\n");

        let idx = indexer(dir.path());
        let stats = idx.run(IndexMode::StatsOnly).await.unwrap();
        assert_eq!(stats.files_new, 1);
        assert_eq!(idx.store().stats().unwrap().files, 0);
    }

    #[tokio::test]
    async fn test_parse_error_keeps_prior_rows() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.py", "def ok():\n    pass\n");
        let idx = indexer(dir.path());
        idx.run(IndexMode::Incremental).await.unwrap();

        // Even a broken file parses with error recovery; the engine keeps
        // whatever symbols the partial tree exposes and records the
        // diagnostic.
        write_file(dir.path(), "a.py", "def ok(:\n    pass\n\ndef also_ok():\n    pass\n");
        idx.run(IndexMode::Incremental).await.unwrap();
        let log = dir.path().join(STATE_DIR).join("parsing_errors.log");
        assert!(log.exists());
    }

    #[tokio::test]
    async fn test_cancel_before_work() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.py", "def f():\n    pass\n");

        let cancel = CancelToken::new();
        cancel.cancel();
        let idx = Indexer::new(dir.path(), Config::default(), cancel).unwrap();
        let err = idx.run(IndexMode::Incremental).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[tokio::test]
    async fn test_state_dir_never_indexed() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.py", "def f():\n    pass\n");

        let idx = indexer(dir.path());
        idx.run(IndexMode::Incremental).await.unwrap();
        // .pui/ now exists on disk; re-index must not pick it up.
        idx.run(IndexMode::Incremental).await.unwrap();
        for file in idx.store().all_files().unwrap() {
            assert!(!file.path.starts_with(".pui"));
        }
    }
}

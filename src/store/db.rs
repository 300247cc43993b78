// Store: connection pool, single writer, file replacement protocol, FTS

use parking_lot::Mutex;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::schema::{init_schema, SCHEMA_VERSION};
use super::{
    CallsiteRecord, EdgeKind, EdgeRecord, FileRecord, Provenance, StoreStats, SymbolKind,
    SymbolRecord, Visibility,
};
use crate::config::STATE_DIR;
use crate::error::{EngineError, Result};
use crate::parser::ParseOutput;

/// Confidence assigned to structural edges (CONTAIN, EXPORTS, same-file
/// INHERIT). Kept under the heuristic ceiling; only semantic providers
/// produce 1.0.
pub const STRUCTURAL_CONFIDENCE: f64 = 0.9;

const SYMBOL_COLUMNS: &str = "id, file_id, stable_id, name, qualified_name, kind, visibility, \
     line_start, line_end, column_start, column_end, signature, docstring, parent_id, metadata";

const EDGE_COLUMNS: &str =
    "id, source_id, target_id, kind, confidence, provenance, file_id, metadata";

/// File row fields for the upsert step of the replacement protocol.
#[derive(Debug, Clone)]
pub struct FileUpsert {
    pub path: String,
    pub language: Option<String>,
    pub content_hash: String,
    pub size: i64,
    pub mtime: i64,
    pub line_count: u32,
}

/// What one replacement wrote.
#[derive(Debug, Clone, Default)]
pub struct ReplaceOutcome {
    pub file_id: i64,
    pub module_symbol_id: Option<i64>,
    pub symbols_added: usize,
    pub edges_added: usize,
    pub callsites_added: usize,
}

/// An edge about to be inserted.
#[derive(Debug, Clone)]
pub struct NewEdge {
    pub source_id: i64,
    pub target_id: i64,
    pub kind: EdgeKind,
    pub confidence: f64,
    pub provenance: Provenance,
    pub file_id: i64,
    pub metadata: Option<serde_json::Value>,
}

/// An FTS hit with its bm25 rank.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub symbol: SymbolRecord,
    pub rank: f64,
}

/// The one process-wide store. Readers take short-lived pooled
/// connections; every mutation goes through the writer lock so there is
/// exactly one writer at a time.
#[derive(Clone)]
pub struct Store {
    pool: Pool<SqliteConnectionManager>,
    write_lock: Arc<Mutex<()>>,
}

impl Store {
    /// Open (creating if needed) the store at an explicit path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening store at {}", db_path.display());
        let manager = SqliteConnectionManager::file(&db_path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )
        });
        let pool = Pool::builder().max_size(8).build(manager)?;

        let store = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };

        {
            let conn = store.conn()?;
            // A database that cannot pass a quick check is refused, not
            // repaired; the caller is told to rebuild.
            let check: String = conn
                .query_row("PRAGMA quick_check(1)", [], |row| row.get(0))
                .map_err(|_| EngineError::StoreCorrupt(db_path.clone()))?;
            if check != "ok" {
                return Err(EngineError::StoreCorrupt(db_path));
            }
            init_schema(&conn)?;
        }

        Ok(store)
    }

    /// Open the store inside a repo's `.pui/` directory.
    pub fn open_in_repo(repo_root: impl AsRef<Path>) -> Result<Self> {
        Self::open(repo_root.as_ref().join(STATE_DIR).join("index.sqlite"))
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    // ---- files ----

    pub fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn()?;
        let file = conn
            .query_row(
                "SELECT id, path, language, content_hash, size, mtime, indexed_at
                 FROM files WHERE path = ?1",
                [path],
                row_to_file,
            )
            .optional()?;
        Ok(file)
    }

    pub fn all_files(&self) -> Result<Vec<FileRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, path, language, content_hash, size, mtime, indexed_at
             FROM files ORDER BY path",
        )?;
        let files = stmt
            .query_map([], row_to_file)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Delete a file row; symbols, edges and callsites cascade away. The
    /// symbol delete is explicit so the FTS sync triggers always fire.
    pub fn delete_file(&self, path: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM symbols WHERE file_id = (SELECT id FROM files WHERE path = ?1)",
            [path],
        )?;
        let deleted = tx.execute("DELETE FROM files WHERE path = ?1", [path])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Refresh `indexed_at` for an unchanged file.
    pub fn touch_file(&self, path: &str, indexed_at: i64) -> Result<()> {
        let _guard = self.write_lock.lock();
        let conn = self.conn()?;
        conn.execute(
            "UPDATE files SET indexed_at = ?1 WHERE path = ?2",
            params![indexed_at, path],
        )?;
        Ok(())
    }

    // ---- replacement protocol ----

    /// Atomically replace everything the index knows about one file.
    ///
    /// Protocol: one transaction that upserts the file row, deletes the
    /// file's symbols, edges and callsites, then inserts the new rows.
    /// Queries never observe a partially replaced file. `parse` is None
    /// for file-level-only languages and unknown extensions.
    pub fn replace_file(
        &self,
        upsert: &FileUpsert,
        parse: Option<&ParseOutput>,
    ) -> Result<ReplaceOutcome> {
        let batch = [(upsert.clone(), parse.cloned())];
        let mut outcomes = self.replace_files(&batch)?;
        Ok(outcomes.pop().expect("one outcome per replaced file"))
    }

    /// Replace a batch of files inside a single transaction. The batch
    /// size is the caller's choice (`index.batch_size`); one file per
    /// transaction is the default.
    pub fn replace_files(
        &self,
        batch: &[(FileUpsert, Option<ParseOutput>)],
    ) -> Result<Vec<ReplaceOutcome>> {
        let _guard = self.write_lock.lock();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut outcomes = Vec::with_capacity(batch.len());
        for (upsert, parse) in batch {
            outcomes.push(replace_in_tx(&tx, upsert, parse.as_ref())?);
        }
        tx.commit()?;
        Ok(outcomes)
    }

    // ---- symbols ----

    pub fn symbol(&self, id: i64) -> Result<Option<SymbolRecord>> {
        let conn = self.conn()?;
        let symbol = conn
            .query_row(
                &format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE id = ?1"),
                [id],
                row_to_symbol,
            )
            .optional()?;
        Ok(symbol)
    }

    pub fn symbol_by_stable_id(&self, stable_id: &str) -> Result<Option<SymbolRecord>> {
        let conn = self.conn()?;
        let symbol = conn
            .query_row(
                &format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE stable_id = ?1"),
                [stable_id],
                row_to_symbol,
            )
            .optional()?;
        Ok(symbol)
    }

    /// Symbols matching a bare or qualified name, deterministic order.
    pub fn symbols_named(&self, name: &str) -> Result<Vec<SymbolRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols
             WHERE name = ?1 OR qualified_name = ?1
             ORDER BY id"
        ))?;
        let symbols = stmt
            .query_map([name], row_to_symbol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(symbols)
    }

    pub fn symbols_in_file(&self, file_id: i64) -> Result<Vec<SymbolRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE file_id = ?1 ORDER BY line_start, id"
        ))?;
        let symbols = stmt
            .query_map([file_id], row_to_symbol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(symbols)
    }

    pub fn all_symbols(&self) -> Result<Vec<SymbolRecord>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {SYMBOL_COLUMNS} FROM symbols ORDER BY id"))?;
        let symbols = stmt
            .query_map([], row_to_symbol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(symbols)
    }

    /// Innermost non-import symbol whose span covers the given line.
    pub fn symbol_at(&self, path: &str, line: u32) -> Result<Option<SymbolRecord>> {
        let conn = self.conn()?;
        let symbol = conn
            .query_row(
                &format!(
                    "SELECT {SYMBOL_COLUMNS} FROM symbols
                     WHERE file_id = (SELECT id FROM files WHERE path = ?1)
                       AND kind != 'import'
                       AND line_start <= ?2
                       AND (line_end IS NULL OR line_end >= ?2)
                     ORDER BY line_start DESC LIMIT 1"
                ),
                params![path, line],
                row_to_symbol,
            )
            .optional()?;
        Ok(symbol)
    }

    /// The module symbol anchoring a file, if the file was parsed.
    pub fn module_symbol_of_file(&self, file_id: i64) -> Result<Option<SymbolRecord>> {
        let conn = self.conn()?;
        let symbol = conn
            .query_row(
                &format!(
                    "SELECT {SYMBOL_COLUMNS} FROM symbols
                     WHERE file_id = ?1 AND kind = 'module' AND parent_id IS NULL
                     ORDER BY id LIMIT 1"
                ),
                [file_id],
                row_to_symbol,
            )
            .optional()?;
        Ok(symbol)
    }

    /// Full-text search over symbol names and qualified names.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let fts_query = sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }
        let prefixed: String = SYMBOL_COLUMNS
            .split(", ")
            .map(|c| format!("s.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {prefixed}, rank FROM symbols_fts
             JOIN symbols s ON symbols_fts.rowid = s.id
             WHERE symbols_fts MATCH ?1
             ORDER BY rank, s.id
             LIMIT ?2"
        ))?;
        let hits = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                Ok(SearchHit {
                    symbol: row_to_symbol(row)?,
                    rank: row.get(15)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hits)
    }

    /// Near-miss names for a failed lookup, used by SymbolNotFound results.
    /// Falls back to progressively shorter substring matches so typos in
    /// the query tail still surface candidates.
    pub fn suggest(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let hits = self.search(query, limit)?;
        let mut names: Vec<String> = hits.into_iter().map(|h| h.symbol.qualified_name).collect();

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT qualified_name FROM symbols
             WHERE name LIKE ?1 AND kind != 'import'
             ORDER BY qualified_name LIMIT ?2",
        )?;
        let mut needle = query.to_string();
        while names.is_empty() && needle.chars().count() >= 3 {
            names = stmt
                .query_map(params![format!("%{needle}%"), limit as i64], |row| {
                    row.get(0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            needle.pop();
        }
        names.dedup();
        Ok(names)
    }

    // ---- edges ----

    /// Insert an edge under the domination rule: a resolved edge replaces
    /// any heuristic edge with the same endpoints and kind; a heuristic
    /// edge never displaces a resolved one and only raises the confidence
    /// of an existing heuristic edge.
    pub fn insert_edge(&self, edge: &NewEdge) -> Result<i64> {
        let _guard = self.write_lock.lock();
        let conn = self.conn()?;

        let existing: Option<(i64, String, f64)> = conn
            .query_row(
                "SELECT id, provenance, confidence FROM edges
                 WHERE source_id = ?1 AND target_id = ?2 AND kind = ?3
                 ORDER BY id LIMIT 1",
                params![edge.source_id, edge.target_id, edge.kind.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        if let Some((id, provenance, confidence)) = existing {
            match (edge.provenance, Provenance::parse(&provenance)?) {
                (Provenance::Heuristic, Provenance::Resolved) => return Ok(id),
                (Provenance::Heuristic, Provenance::Heuristic) => {
                    if edge.confidence > confidence {
                        conn.execute(
                            "UPDATE edges SET confidence = ?1, metadata = ?2 WHERE id = ?3",
                            params![
                                edge.confidence,
                                edge.metadata.as_ref().map(|m| m.to_string()),
                                id
                            ],
                        )?;
                    }
                    return Ok(id);
                }
                (Provenance::Resolved, _) => {
                    conn.execute(
                        "DELETE FROM edges
                         WHERE source_id = ?1 AND target_id = ?2 AND kind = ?3",
                        params![edge.source_id, edge.target_id, edge.kind.as_str()],
                    )?;
                }
            }
        }

        let id = insert_edge_row(
            &conn,
            edge.source_id,
            edge.target_id,
            edge.kind,
            edge.confidence,
            edge.provenance,
            edge.file_id,
            edge.metadata.as_ref(),
        )?;
        Ok(id)
    }

    pub fn edges_from(&self, symbol_id: i64, kind: Option<EdgeKind>) -> Result<Vec<EdgeRecord>> {
        self.edges_for("source_id", symbol_id, kind)
    }

    pub fn edges_to(&self, symbol_id: i64, kind: Option<EdgeKind>) -> Result<Vec<EdgeRecord>> {
        self.edges_for("target_id", symbol_id, kind)
    }

    fn edges_for(
        &self,
        column: &str,
        symbol_id: i64,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<EdgeRecord>> {
        let conn = self.conn()?;
        let edges = match kind {
            Some(kind) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EDGE_COLUMNS} FROM edges
                     WHERE {column} = ?1 AND kind = ?2 ORDER BY id"
                ))?;
                let rows = stmt
                    .query_map(params![symbol_id, kind.as_str()], row_to_edge)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EDGE_COLUMNS} FROM edges WHERE {column} = ?1 ORDER BY id"
                ))?;
                let rows = stmt
                    .query_map([symbol_id], row_to_edge)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(edges)
    }

    pub fn edges_of_kind(&self, kind: EdgeKind) -> Result<Vec<EdgeRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE kind = ?1 ORDER BY id"
        ))?;
        let edges = stmt
            .query_map([kind.as_str()], row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    // ---- callsites ----

    pub fn callsites_in_files(&self, file_ids: &[i64]) -> Result<Vec<CallsiteRecord>> {
        let conn = self.conn()?;
        let mut out = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT id, file_id, line, column, callee_text, scope_symbol_id, metadata
             FROM callsites WHERE file_id = ?1 ORDER BY line, id",
        )?;
        for file_id in file_ids {
            let rows = stmt
                .query_map([file_id], row_to_callsite)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            out.extend(rows);
        }
        Ok(out)
    }

    /// Callsites anywhere whose trailing callee segment matches one of the
    /// given names. Used to re-resolve calls into freshly re-parsed files.
    pub fn callsites_referencing(&self, names: &[String]) -> Result<Vec<CallsiteRecord>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, file_id, line, column, callee_text, scope_symbol_id, metadata
             FROM callsites
             WHERE callee_text = ?1
                OR callee_text LIKE ?2
                OR callee_text LIKE ?3
             ORDER BY file_id, line, id",
        )?;
        let mut out: Vec<CallsiteRecord> = Vec::new();
        for name in names {
            let rows = stmt
                .query_map(
                    params![name, format!("%.{name}"), format!("%::{name}")],
                    row_to_callsite,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            out.extend(rows);
        }
        out.sort_by_key(|c| c.id);
        out.dedup_by_key(|c| c.id);
        Ok(out)
    }

    // ---- meta / stats ----

    pub fn meta_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn()?;
        let count = |table: &str| -> Result<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?)
        };
        Ok(StoreStats {
            files: count("files")?,
            symbols: count("symbols")?,
            edges: count("edges")?,
            callsites: count("callsites")?,
            schema_version: SCHEMA_VERSION,
            last_indexed: self.meta_get("last_indexed")?.and_then(|v| v.parse().ok()),
        })
    }

    /// Deterministic fingerprint of the indexed content: SHA-256 over the
    /// sorted (path, hash) pairs. Identical content set => identical value.
    pub fn index_version(&self) -> Result<String> {
        let files = self.all_files()?;
        let mut hasher = Sha256::new();
        for file in &files {
            hasher.update(file.path.as_bytes());
            hasher.update(b"\t");
            hasher.update(file.content_hash.as_bytes());
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();
        Ok(hex_prefix(&digest, 16))
    }
}

fn replace_in_tx(
    tx: &Connection,
    upsert: &FileUpsert,
    parse: Option<&ParseOutput>,
) -> Result<ReplaceOutcome> {
    let now = chrono::Utc::now().timestamp();

    let file_id: i64 = tx.query_row(
        "INSERT INTO files (path, language, content_hash, size, mtime, indexed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(path) DO UPDATE SET
             language = excluded.language,
             content_hash = excluded.content_hash,
             size = excluded.size,
             mtime = excluded.mtime,
             indexed_at = excluded.indexed_at
         RETURNING id",
        params![
            upsert.path,
            upsert.language,
            upsert.content_hash,
            upsert.size,
            upsert.mtime,
            now
        ],
        |row| row.get(0),
    )?;

    tx.execute("DELETE FROM edges WHERE file_id = ?1", [file_id])?;
    tx.execute("DELETE FROM callsites WHERE file_id = ?1", [file_id])?;
    tx.execute("DELETE FROM symbols WHERE file_id = ?1", [file_id])?;

    let mut outcome = ReplaceOutcome {
        file_id,
        ..Default::default()
    };

    let Some(parse) = parse else {
        return Ok(outcome);
    };

    // One module symbol per parsed file anchors top-level structure:
    // CONTAIN/EXPORTS edges hang off it and top-level callsites scope to it.
    let module_path = module_path_of(&upsert.path);
    let module_name = module_path
        .rsplit('/')
        .next()
        .unwrap_or(&module_path)
        .to_string();
    let module_id = insert_symbol_row(
        tx,
        file_id,
        &SymbolRecord::stable_id_for(&upsert.path, SymbolKind::Module, &module_path, 1),
        &module_name,
        &module_path,
        SymbolKind::Module,
        Visibility::Public,
        1,
        Some(upsert.line_count.max(1)),
        None,
        None,
        None,
        None,
        None,
        None,
    )?;
    outcome.module_symbol_id = Some(module_id);
    outcome.symbols_added += 1;

    // Symbols, in parse order so parent indices resolve.
    let mut id_of_index: Vec<i64> = Vec::with_capacity(parse.symbols.len());
    for symbol in &parse.symbols {
        let parent_id = symbol
            .parent
            .and_then(|idx| id_of_index.get(idx).copied())
            .unwrap_or(module_id);
        let stable_id = SymbolRecord::stable_id_for(
            &upsert.path,
            symbol.kind,
            &symbol.qualified_name,
            symbol.line_start,
        );
        let metadata = if symbol.bases.is_empty() {
            None
        } else {
            Some(serde_json::json!({ "bases": symbol.bases }).to_string())
        };
        let id = insert_symbol_row(
            tx,
            file_id,
            &stable_id,
            &symbol.name,
            &symbol.qualified_name,
            symbol.kind,
            symbol.visibility,
            symbol.line_start,
            Some(symbol.line_end),
            Some(symbol.column_start),
            Some(symbol.column_end),
            symbol.signature.as_deref(),
            symbol.docstring.as_deref(),
            Some(parent_id),
            metadata.as_deref(),
        )?;
        id_of_index.push(id);
        outcome.symbols_added += 1;
    }

    // Structural edges: CONTAIN parent -> child, EXPORTS for public
    // top-level definitions, INHERIT when the base lives in this file.
    let mut name_to_id: HashMap<&str, i64> = HashMap::new();
    for (idx, symbol) in parse.symbols.iter().enumerate() {
        name_to_id
            .entry(symbol.name.as_str())
            .or_insert(id_of_index[idx]);
    }
    for (idx, symbol) in parse.symbols.iter().enumerate() {
        let id = id_of_index[idx];
        let parent_id = symbol
            .parent
            .and_then(|p| id_of_index.get(p).copied())
            .unwrap_or(module_id);
        insert_edge_row(
            tx,
            parent_id,
            id,
            EdgeKind::Contain,
            STRUCTURAL_CONFIDENCE,
            Provenance::Heuristic,
            file_id,
            None,
        )?;
        outcome.edges_added += 1;

        if symbol.parent.is_none() && symbol.visibility == Visibility::Public {
            insert_edge_row(
                tx,
                module_id,
                id,
                EdgeKind::Exports,
                STRUCTURAL_CONFIDENCE,
                Provenance::Heuristic,
                file_id,
                None,
            )?;
            outcome.edges_added += 1;
        }

        for base in &symbol.bases {
            let base_name = base.rsplit(['.', ':']).next().unwrap_or(base);
            if let Some(&base_id) = name_to_id.get(base_name) {
                if base_id != id {
                    insert_edge_row(
                        tx,
                        id,
                        base_id,
                        EdgeKind::Inherit,
                        STRUCTURAL_CONFIDENCE,
                        Provenance::Heuristic,
                        file_id,
                        Some(&serde_json::json!({ "base": base })),
                    )?;
                    outcome.edges_added += 1;
                }
            }
        }
    }

    // Imports become symbol rows carrying their parsed fields; the
    // resolver reads them back when scoring calls.
    for import in &parse.imports {
        let metadata = serde_json::json!({
            "module": import.module,
            "name": import.name,
            "alias": import.alias,
            "resolved_path": import.resolved_path,
        });
        insert_symbol_row(
            tx,
            file_id,
            &SymbolRecord::stable_id_for(
                &upsert.path,
                SymbolKind::Import,
                &import.module,
                import.line,
            ),
            import.binding(),
            &import.module,
            SymbolKind::Import,
            Visibility::Private,
            import.line,
            Some(import.line),
            None,
            None,
            Some(&import.raw),
            None,
            Some(module_id),
            Some(&metadata.to_string()),
        )?;
        outcome.symbols_added += 1;
    }

    // Callsites carry the imports visible at that point as raw metadata
    // for the resolver.
    let imports_in_scope: Vec<&str> = parse.imports.iter().map(|i| i.module.as_str()).collect();
    let callsite_meta = serde_json::json!({ "imports_in_scope": imports_in_scope }).to_string();
    for callsite in &parse.callsites {
        let scope_id = callsite
            .scope
            .and_then(|idx| id_of_index.get(idx).copied())
            .unwrap_or(module_id);
        tx.execute(
            "INSERT INTO callsites (file_id, line, column, callee_text, scope_symbol_id, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file_id,
                callsite.line,
                callsite.column,
                callsite.callee_text,
                scope_id,
                callsite_meta
            ],
        )?;
        outcome.callsites_added += 1;
    }

    debug!(
        "Replaced {}: {} symbols, {} edges, {} callsites",
        upsert.path, outcome.symbols_added, outcome.edges_added, outcome.callsites_added
    );
    Ok(outcome)
}

/// Module path of a file: relative path without its extension.
pub fn module_path_of(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem.to_string(),
        _ => path.to_string(),
    }
}

fn hex_prefix(bytes: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(len + 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
        if out.len() >= len {
            break;
        }
    }
    out.truncate(len);
    out
}

fn sanitize_fts_query(query: &str) -> String {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    tokens.join(" ")
}

#[allow(clippy::too_many_arguments)]
fn insert_symbol_row(
    conn: &Connection,
    file_id: i64,
    stable_id: &str,
    name: &str,
    qualified_name: &str,
    kind: SymbolKind,
    visibility: Visibility,
    line_start: u32,
    line_end: Option<u32>,
    column_start: Option<u32>,
    column_end: Option<u32>,
    signature: Option<&str>,
    docstring: Option<&str>,
    parent_id: Option<i64>,
    metadata: Option<&str>,
) -> Result<i64> {
    let id = conn.query_row(
        "INSERT INTO symbols
         (file_id, stable_id, name, qualified_name, kind, visibility, line_start, line_end,
          column_start, column_end, signature, docstring, parent_id, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         RETURNING id",
        params![
            file_id,
            stable_id,
            name,
            qualified_name,
            kind.as_str(),
            visibility.as_str(),
            line_start,
            line_end,
            column_start,
            column_end,
            signature,
            docstring,
            parent_id,
            metadata
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}

#[allow(clippy::too_many_arguments)]
fn insert_edge_row(
    conn: &Connection,
    source_id: i64,
    target_id: i64,
    kind: EdgeKind,
    confidence: f64,
    provenance: Provenance,
    file_id: i64,
    metadata: Option<&serde_json::Value>,
) -> Result<i64> {
    let id = conn.query_row(
        "INSERT INTO edges (source_id, target_id, kind, confidence, provenance, file_id, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         RETURNING id",
        params![
            source_id,
            target_id,
            kind.as_str(),
            confidence,
            provenance.as_str(),
            file_id,
            metadata.map(|m| m.to_string())
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn row_to_file(row: &Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        language: row.get(2)?,
        content_hash: row.get(3)?,
        size: row.get(4)?,
        mtime: row.get(5)?,
        indexed_at: row.get(6)?,
    })
}

fn row_to_symbol(row: &Row) -> rusqlite::Result<SymbolRecord> {
    let kind: String = row.get(5)?;
    let visibility: String = row.get(6)?;
    Ok(SymbolRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        stable_id: row.get(2)?,
        name: row.get(3)?,
        qualified_name: row.get(4)?,
        kind: SymbolKind::parse(&kind).unwrap_or(SymbolKind::Variable),
        visibility: Visibility::parse(&visibility).unwrap_or(Visibility::Public),
        line_start: row.get(7)?,
        line_end: row.get(8)?,
        column_start: row.get(9)?,
        column_end: row.get(10)?,
        signature: row.get(11)?,
        docstring: row.get(12)?,
        parent_id: row.get(13)?,
        metadata: row.get(14)?,
    })
}

fn row_to_edge(row: &Row) -> rusqlite::Result<EdgeRecord> {
    let kind: String = row.get(3)?;
    let provenance: String = row.get(5)?;
    Ok(EdgeRecord {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        kind: EdgeKind::parse(&kind).unwrap_or(EdgeKind::Call),
        confidence: row.get(4)?,
        provenance: Provenance::parse(&provenance).unwrap_or(Provenance::Heuristic),
        file_id: row.get(6)?,
        metadata: row.get(7)?,
    })
}

fn row_to_callsite(row: &Row) -> rusqlite::Result<CallsiteRecord> {
    Ok(CallsiteRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        line: row.get(2)?,
        column: row.get(3)?,
        callee_text: row.get(4)?,
        scope_symbol_id: row.get(5)?,
        metadata: row.get(6)?,
    })
}

// Heuristic call/import resolver with confidence banding

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::error::Result;
use crate::parser::Language;
use crate::store::db::{NewEdge, Store};
use crate::store::{CallsiteRecord, EdgeKind, FileRecord, Provenance, SymbolKind};

/// Confidence assigned per band. Heuristic confidence is strictly below
/// 0.95; only a semantic provider produces 1.0.
const CONF_QUALIFIED_UNIQUE: f64 = 0.94;
const CONF_QUALIFIED_AMBIGUOUS: f64 = 0.90;
const CONF_LOCAL_METHOD: f64 = 0.90;
const CONF_SAME_FILE_UNIQUE: f64 = 0.85;
const CONF_SAME_MODULE_UNIQUE: f64 = 0.75;
const CONF_IMPORT_HINT_UNIQUE: f64 = 0.65;
const CONF_GLOBAL_UNIQUE: f64 = 0.60;
const CONF_IMPORT_HINT_AMBIGUOUS: f64 = 0.55;
const CONF_AMBIGUOUS: f64 = 0.40;
const CONF_DYNAMIC: f64 = 0.25;
const CONF_IMPORT_EDGE: f64 = 0.90;
const CONF_MODULE_EDGE: f64 = 0.80;
const CONF_CROSS_FILE_INHERIT: f64 = 0.70;

/// Counters for one resolver pass.
#[derive(Debug, Clone, Default)]
pub struct ResolveStats {
    pub callsites_considered: usize,
    pub call_edges: usize,
    pub import_edges: usize,
    pub inherit_edges: usize,
    pub module_edges: usize,
}

/// An edge supplied by a semantic provider; always confidence 1.0 and it
/// overrides any heuristic edge with the same endpoints.
#[derive(Debug, Clone)]
pub struct ResolvedEdge {
    pub source_stable_id: String,
    pub target_stable_id: String,
    pub kind: EdgeKind,
}

/// Hook for future LSP/SCIP providers. Every method is optional; the
/// default implementation supplies nothing.
pub trait SemanticProvider: Send + Sync {
    fn name(&self) -> &str;

    fn definitions(&self, _file: &str, _line: u32, _column: u32) -> Result<Vec<ResolvedEdge>> {
        Ok(Vec::new())
    }

    fn references(&self, _symbol_stable_id: &str) -> Result<Vec<ResolvedEdge>> {
        Ok(Vec::new())
    }

    fn call_hierarchy(&self, _symbol_stable_id: &str) -> Result<Vec<ResolvedEdge>> {
        Ok(Vec::new())
    }
}

/// Apply provider-resolved edges; they dominate heuristics on insert.
pub fn apply_resolved_edges(store: &Store, edges: &[ResolvedEdge]) -> Result<usize> {
    let mut applied = 0;
    for edge in edges {
        let (Some(source), Some(target)) = (
            store.symbol_by_stable_id(&edge.source_stable_id)?,
            store.symbol_by_stable_id(&edge.target_stable_id)?,
        ) else {
            continue;
        };
        store.insert_edge(&NewEdge {
            source_id: source.id,
            target_id: target.id,
            kind: edge.kind,
            confidence: 1.0,
            provenance: Provenance::Resolved,
            file_id: source.file_id,
            metadata: Some(serde_json::json!({ "provider": true })),
        })?;
        applied += 1;
    }
    Ok(applied)
}

struct ImportBinding {
    binding: String,
    module: String,
    name: Option<String>,
    resolved_path: Option<String>,
}

/// Candidate callee with the context needed for tie-breaking.
struct Candidate {
    symbol_id: i64,
    file_id: i64,
    parent_id: Option<i64>,
}

pub struct Resolver<'a> {
    store: &'a Store,
    files: Vec<FileRecord>,
    file_paths: HashMap<i64, String>,
    path_to_file: HashMap<String, i64>,
    /// callable symbols keyed by bare name
    callables: HashMap<String, Vec<Candidate>>,
    /// class-like symbols keyed by bare name
    classes: HashMap<String, Vec<Candidate>>,
    /// import bindings per file
    imports: HashMap<i64, Vec<ImportBinding>>,
    /// file id -> module group key
    groups: HashMap<i64, String>,
    /// module symbol per file
    module_symbols: HashMap<i64, i64>,
    group_labels: HashMap<String, &'static str>,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a Store) -> Result<Self> {
        let files = store.all_files()?;
        let file_paths: HashMap<i64, String> =
            files.iter().map(|f| (f.id, f.path.clone())).collect();
        let path_to_file: HashMap<String, i64> =
            files.iter().map(|f| (f.path.clone(), f.id)).collect();

        let symbols = store.all_symbols()?;
        let mut callables: HashMap<String, Vec<Candidate>> = HashMap::new();
        let mut classes: HashMap<String, Vec<Candidate>> = HashMap::new();
        let mut imports: HashMap<i64, Vec<ImportBinding>> = HashMap::new();
        let mut module_symbols: HashMap<i64, i64> = HashMap::new();

        for symbol in &symbols {
            match symbol.kind {
                kind if kind.callable() => {
                    callables
                        .entry(symbol.name.clone())
                        .or_default()
                        .push(Candidate {
                            symbol_id: symbol.id,
                            file_id: symbol.file_id,
                            parent_id: symbol.parent_id,
                        });
                    if matches!(kind, SymbolKind::Class | SymbolKind::Struct) {
                        classes
                            .entry(symbol.name.clone())
                            .or_default()
                            .push(Candidate {
                                symbol_id: symbol.id,
                                file_id: symbol.file_id,
                                parent_id: symbol.parent_id,
                            });
                    }
                }
                SymbolKind::Import => {
                    if let Some(meta) = symbol
                        .metadata
                        .as_deref()
                        .and_then(|m| serde_json::from_str::<serde_json::Value>(m).ok())
                    {
                        imports.entry(symbol.file_id).or_default().push(ImportBinding {
                            binding: symbol.name.clone(),
                            module: meta["module"].as_str().unwrap_or("").to_string(),
                            name: meta["name"].as_str().map(str::to_string),
                            resolved_path: meta["resolved_path"].as_str().map(str::to_string),
                        });
                    }
                }
                SymbolKind::Module => {
                    if symbol.parent_id.is_none() {
                        module_symbols.entry(symbol.file_id).or_insert(symbol.id);
                    }
                }
                _ => {}
            }
        }

        let (groups, group_labels) = module_groups(&files);

        Ok(Self {
            store,
            files,
            file_paths,
            path_to_file,
            callables,
            classes,
            imports,
            groups,
            module_symbols,
            group_labels,
        })
    }

    /// Resolve callsites for the changed files plus any callsite elsewhere
    /// whose callee name is defined in a changed file, then refresh import
    /// and module-dependency edges.
    pub fn run(&self, changed_file_ids: &[i64]) -> Result<ResolveStats> {
        let mut stats = ResolveStats::default();
        let changed: HashSet<i64> = changed_file_ids.iter().copied().collect();

        let mut callsites = self.store.callsites_in_files(changed_file_ids)?;
        let changed_names: Vec<String> = {
            let mut names = HashSet::new();
            for file_id in changed_file_ids {
                for symbol in self.store.symbols_in_file(*file_id)? {
                    if symbol.kind.callable() {
                        names.insert(symbol.name);
                    }
                }
            }
            names.into_iter().collect()
        };
        for callsite in self.store.callsites_referencing(&changed_names)? {
            if !changed.contains(&callsite.file_id) {
                callsites.push(callsite);
            }
        }

        for callsite in &callsites {
            stats.callsites_considered += 1;
            if let Some((target_id, confidence, reason)) = self.resolve_callsite(callsite) {
                let source_id = match callsite.scope_symbol_id {
                    Some(id) => id,
                    None => match self.module_symbols.get(&callsite.file_id) {
                        Some(id) => *id,
                        None => continue,
                    },
                };
                self.store.insert_edge(&NewEdge {
                    source_id,
                    target_id,
                    kind: EdgeKind::Call,
                    confidence,
                    provenance: Provenance::Heuristic,
                    file_id: callsite.file_id,
                    metadata: Some(serde_json::json!({
                        "callee": callsite.callee_text,
                        "line": callsite.line,
                        "reason": reason,
                    })),
                })?;
                stats.call_edges += 1;
            }
        }

        stats.import_edges = self.emit_import_edges(&changed)?;
        stats.inherit_edges = self.emit_cross_file_inherits(changed_file_ids)?;
        stats.module_edges = self.emit_module_dependencies()?;

        debug!(
            "Resolver: {} callsites -> {} call edges, {} import, {} inherit, {} module",
            stats.callsites_considered,
            stats.call_edges,
            stats.import_edges,
            stats.inherit_edges,
            stats.module_edges
        );
        Ok(stats)
    }

    /// Score one callsite into a candidate edge. Returns the target symbol,
    /// the band confidence and a short reason string for edge metadata.
    fn resolve_callsite(&self, callsite: &CallsiteRecord) -> Option<(i64, f64, String)> {
        let callee = callsite.callee_text.trim();
        let (qualifier, name) = split_callee(callee);
        let candidates = self.callables.get(name)?;
        if candidates.is_empty() {
            return None;
        }
        let caller_file = callsite.file_id;
        let caller_group = self.groups.get(&caller_file);

        if let Some(qualifier) = qualifier {
            // Qualifier backed by an import binding of this file.
            if let Some(binding) = self
                .imports
                .get(&caller_file)
                .and_then(|imports| imports.iter().find(|i| i.binding == qualifier))
            {
                if let Some(resolved) = &binding.resolved_path {
                    if let Some(&target_file) = self.path_to_file.get(resolved) {
                        let in_target: Vec<&Candidate> = candidates
                            .iter()
                            .filter(|c| c.file_id == target_file)
                            .collect();
                        match in_target.len() {
                            0 => {}
                            1 => {
                                return Some((
                                    in_target[0].symbol_id,
                                    CONF_QUALIFIED_UNIQUE,
                                    format!("qualified via import {}", binding.module),
                                ))
                            }
                            _ => {
                                let best = self.pick(&in_target, caller_file, caller_group);
                                return Some((
                                    best,
                                    CONF_QUALIFIED_AMBIGUOUS,
                                    format!("qualified via import {} (ambiguous)", binding.module),
                                ));
                            }
                        }
                    }
                }
                // Import points outside the repo: nothing to link to.
                return None;
            }

            // Qualifier naming a class defined in the same file: method call
            // on a local type.
            if let Some(class_candidates) = self.classes.get(qualifier) {
                if let Some(class) = class_candidates.iter().find(|c| c.file_id == caller_file) {
                    let methods: Vec<&Candidate> = candidates
                        .iter()
                        .filter(|c| c.parent_id == Some(class.symbol_id))
                        .collect();
                    if methods.len() == 1 {
                        return Some((
                            methods[0].symbol_id,
                            CONF_LOCAL_METHOD,
                            format!("method of local type {qualifier}"),
                        ));
                    }
                }
            }

            // Unknown receiver: dynamic dispatch band. Report the best
            // possible target without over-promising.
            let methods: Vec<&Candidate> = candidates.iter().collect();
            let best = self.pick(&methods, caller_file, caller_group);
            return Some((
                best,
                CONF_DYNAMIC,
                format!("dynamic receiver {qualifier}"),
            ));
        }

        // Unqualified identifier.
        let same_file: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.file_id == caller_file)
            .collect();
        if same_file.len() == 1 {
            return Some((
                same_file[0].symbol_id,
                CONF_SAME_FILE_UNIQUE,
                "unique in same file".to_string(),
            ));
        }
        if same_file.len() > 1 {
            let best = self.pick(&same_file, caller_file, caller_group);
            return Some((best, CONF_AMBIGUOUS, "ambiguous in same file".to_string()));
        }

        let same_module: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| self.groups.get(&c.file_id) == caller_group)
            .collect();
        if same_module.len() == 1 {
            return Some((
                same_module[0].symbol_id,
                CONF_SAME_MODULE_UNIQUE,
                "unique in same module".to_string(),
            ));
        }

        // Import hints: `from x import foo` or an import resolving to the
        // candidate's file.
        if let Some(imports) = self.imports.get(&caller_file) {
            let hinted: Vec<&Candidate> = candidates
                .iter()
                .filter(|c| {
                    let path = self.file_paths.get(&c.file_id);
                    imports.iter().any(|i| {
                        i.name.as_deref() == Some(name)
                            && (i.resolved_path.is_none()
                                || i.resolved_path.as_deref() == path.map(String::as_str))
                            || i.resolved_path.as_deref() == path.map(String::as_str)
                    })
                })
                .collect();
            match hinted.len() {
                0 => {}
                1 => {
                    return Some((
                        hinted[0].symbol_id,
                        CONF_IMPORT_HINT_UNIQUE,
                        "import hint".to_string(),
                    ))
                }
                _ => {
                    let best = self.pick(&hinted, caller_file, caller_group);
                    return Some((
                        best,
                        CONF_IMPORT_HINT_AMBIGUOUS,
                        "import hint (ambiguous)".to_string(),
                    ));
                }
            }
        }

        if candidates.len() == 1 {
            return Some((
                candidates[0].symbol_id,
                CONF_GLOBAL_UNIQUE,
                "single global candidate".to_string(),
            ));
        }

        let all: Vec<&Candidate> = candidates.iter().collect();
        let best = self.pick(&all, caller_file, caller_group);
        Some((best, CONF_AMBIGUOUS, "multiple candidates".to_string()))
    }

    /// Deterministic tie-break: same file > same module > other, then
    /// lower symbol id.
    fn pick(&self, candidates: &[&Candidate], caller_file: i64, caller_group: Option<&String>) -> i64 {
        let rank = |c: &Candidate| {
            if c.file_id == caller_file {
                0
            } else if self.groups.get(&c.file_id) == caller_group {
                1
            } else {
                2
            }
        };
        candidates
            .iter()
            .min_by_key(|c| (rank(c), c.symbol_id))
            .map(|c| c.symbol_id)
            .expect("non-empty candidate set")
    }

    /// IMPORT edges: importing file's module symbol -> imported file's
    /// module symbol, for imports that resolved to a repo file.
    fn emit_import_edges(&self, changed: &HashSet<i64>) -> Result<usize> {
        let mut added = 0;
        for (file_id, imports) in &self.imports {
            if !changed.contains(file_id) {
                continue;
            }
            let Some(&source) = self.module_symbols.get(file_id) else {
                continue;
            };
            for import in imports {
                let Some(resolved) = &import.resolved_path else {
                    continue;
                };
                let Some(&target_file) = self.path_to_file.get(resolved) else {
                    continue;
                };
                let Some(&target) = self.module_symbols.get(&target_file) else {
                    continue;
                };
                if source == target {
                    continue;
                }
                self.store.insert_edge(&NewEdge {
                    source_id: source,
                    target_id: target,
                    kind: EdgeKind::Import,
                    confidence: CONF_IMPORT_EDGE,
                    provenance: Provenance::Heuristic,
                    file_id: *file_id,
                    metadata: Some(serde_json::json!({ "module": import.module })),
                })?;
                added += 1;
            }
        }
        Ok(added)
    }

    /// INHERIT edges whose base did not resolve within the defining file.
    fn emit_cross_file_inherits(&self, changed_file_ids: &[i64]) -> Result<usize> {
        let mut added = 0;
        for file_id in changed_file_ids {
            for symbol in self.store.symbols_in_file(*file_id)? {
                let Some(bases) = symbol
                    .metadata
                    .as_deref()
                    .and_then(|m| serde_json::from_str::<serde_json::Value>(m).ok())
                    .and_then(|v| v["bases"].as_array().cloned())
                else {
                    continue;
                };
                for base in bases.iter().filter_map(|b| b.as_str()) {
                    let base_name = base.rsplit(['.', ':']).next().unwrap_or(base);
                    let Some(candidates) = self.classes.get(base_name) else {
                        continue;
                    };
                    // Same-file bases were linked at extract time.
                    let external: Vec<&Candidate> = candidates
                        .iter()
                        .filter(|c| c.file_id != symbol.file_id)
                        .collect();
                    if external.is_empty() {
                        continue;
                    }
                    let caller_group = self.groups.get(&symbol.file_id);
                    let best = self.pick(&external, symbol.file_id, caller_group);
                    self.store.insert_edge(&NewEdge {
                        source_id: symbol.id,
                        target_id: best,
                        kind: EdgeKind::Inherit,
                        confidence: CONF_CROSS_FILE_INHERIT,
                        provenance: Provenance::Heuristic,
                        file_id: symbol.file_id,
                        metadata: Some(serde_json::json!({ "base": base })),
                    })?;
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// MODULE_DEPENDS_ON edges aggregated from resolved imports between
    /// module groupings. Grouping is best-effort; inferred groups are
    /// labeled as such in the edge metadata.
    fn emit_module_dependencies(&self) -> Result<usize> {
        // (source group, target group) -> import count
        let mut pairs: BTreeMap<(String, String), usize> = BTreeMap::new();
        for (file_id, imports) in &self.imports {
            let Some(source_group) = self.groups.get(file_id) else {
                continue;
            };
            for import in imports {
                let Some(resolved) = &import.resolved_path else {
                    continue;
                };
                let Some(target_file) = self.path_to_file.get(resolved) else {
                    continue;
                };
                let Some(target_group) = self.groups.get(target_file) else {
                    continue;
                };
                if source_group != target_group {
                    *pairs
                        .entry((source_group.clone(), target_group.clone()))
                        .or_default() += 1;
                }
            }
        }

        // Each group is represented by the module symbol of its first
        // parsed file in path order.
        let mut representatives: HashMap<&String, i64> = HashMap::new();
        for file in &self.files {
            if let (Some(group), Some(&module)) =
                (self.groups.get(&file.id), self.module_symbols.get(&file.id))
            {
                representatives.entry(group).or_insert(module);
            }
        }

        let mut added = 0;
        for ((source_group, target_group), count) in &pairs {
            let (Some(&source), Some(&target)) = (
                representatives.get(&source_group),
                representatives.get(&target_group),
            ) else {
                continue;
            };
            let source_file = self
                .store
                .symbol(source)?
                .map(|s| s.file_id)
                .unwrap_or_default();
            let label = self
                .group_labels
                .get(source_group)
                .copied()
                .unwrap_or("directory");
            self.store.insert_edge(&NewEdge {
                source_id: source,
                target_id: target,
                kind: EdgeKind::ModuleDependsOn,
                confidence: CONF_MODULE_EDGE,
                provenance: Provenance::Heuristic,
                file_id: source_file,
                metadata: Some(serde_json::json!({
                    "from_module": source_group,
                    "to_module": target_group,
                    "imports": count,
                    "grouping": label,
                })),
            })?;
            added += 1;
        }
        Ok(added)
    }
}

/// Split a callee expression into (qualifier, final name).
fn split_callee(callee: &str) -> (Option<&str>, &str) {
    if let Some(idx) = callee.rfind("::") {
        (Some(&callee[..idx]), &callee[idx + 2..])
    } else if let Some(idx) = callee.rfind('.') {
        (Some(&callee[..idx]), &callee[idx + 1..])
    } else {
        (None, callee)
    }
}

/// Manifest files that mark a module root.
const MANIFESTS: &[&str] = &[
    "package.json",
    "go.mod",
    "Cargo.toml",
    "pyproject.toml",
    "setup.py",
];

/// Group files into language-aware modules: nearest ancestor directory
/// holding a manifest, falling back to the top-level directory.
fn module_groups(
    files: &[FileRecord],
) -> (HashMap<i64, String>, HashMap<String, &'static str>) {
    let mut roots: Vec<String> = Vec::new();
    for file in files {
        let name = file.path.rsplit('/').next().unwrap_or(&file.path);
        if MANIFESTS.contains(&name) || name == "__init__.py" {
            let dir = match file.path.rsplit_once('/') {
                Some((dir, _)) => dir.to_string(),
                None => String::new(),
            };
            if !roots.contains(&dir) {
                roots.push(dir);
            }
        }
    }
    // Longest roots first so the nearest ancestor wins.
    roots.sort_by_key(|r| std::cmp::Reverse(r.len()));

    let mut groups = HashMap::new();
    let mut labels: HashMap<String, &'static str> = HashMap::new();
    for file in files {
        let manifest_root = roots
            .iter()
            .find(|root| {
                root.is_empty() || file.path.starts_with(&format!("{root}/"))
            })
            .cloned();
        let (key, label) = match manifest_root {
            Some(root) if root.is_empty() => ("root".to_string(), "manifest"),
            Some(root) => (root, "manifest"),
            None => match file.path.split_once('/') {
                Some((top, _)) => (top.to_string(), "directory"),
                None => ("root".to_string(), "directory"),
            },
        };
        labels.entry(key.clone()).or_insert(label);
        groups.insert(file.id, key);
    }
    (groups, labels)
}

/// Resolve an import's module text to a repo-relative file, when the
/// target lives in the repo. Rules are documented per language; anything
/// unresolvable (stdlib, third-party) returns None.
pub fn resolve_import(
    importer_path: &str,
    module: &str,
    language: Language,
    repo_files: &HashSet<String>,
) -> Option<String> {
    let importer_dir = importer_path.rsplit_once('/').map(|(d, _)| d).unwrap_or("");

    let try_exists = |candidate: String| -> Option<String> {
        let normalized = normalize_relative(&candidate)?;
        repo_files.contains(&normalized).then_some(normalized)
    };

    match language {
        Language::Python => {
            // Relative: `from .sibling import x`, `from ..pkg import y`
            if let Some(stripped) = module.strip_prefix('.') {
                let dots = module.len() - module.trim_start_matches('.').len();
                let rest = stripped.trim_start_matches('.').replace('.', "/");
                let mut base = importer_dir.to_string();
                for _ in 1..dots {
                    base = base.rsplit_once('/').map(|(d, _)| d.to_string()).unwrap_or_default();
                }
                let joined = if rest.is_empty() {
                    base
                } else if base.is_empty() {
                    rest
                } else {
                    format!("{base}/{rest}")
                };
                return try_exists(format!("{joined}.py"))
                    .or_else(|| try_exists(format!("{joined}/__init__.py")));
            }
            let rel = module.replace('.', "/");
            try_exists(format!("{rel}.py"))
                .or_else(|| try_exists(format!("{rel}/__init__.py")))
                .or_else(|| try_exists(format!("{importer_dir}/{rel}.py")))
                .or_else(|| try_exists(format!("src/{rel}.py")))
        }
        Language::JavaScript | Language::TypeScript => {
            if !module.starts_with('.') {
                return None;
            }
            let joined = format!("{importer_dir}/{module}");
            for suffix in [
                "", ".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx", "/index.js", "/index.ts",
            ] {
                if let Some(found) = try_exists(format!("{joined}{suffix}")) {
                    return Some(found);
                }
            }
            None
        }
        Language::Go => {
            // Match the trailing package segment against repo directories.
            let segment = module.rsplit('/').next()?;
            let mut hits: Vec<&String> = repo_files
                .iter()
                .filter(|p| {
                    p.ends_with(".go")
                        && p.rsplit_once('/')
                            .map(|(dir, _)| dir == segment || dir.ends_with(&format!("/{segment}")))
                            .unwrap_or(false)
                })
                .collect();
            hits.sort();
            hits.first().map(|p| (*p).clone())
        }
        Language::Rust => {
            let trimmed = module
                .trim_start_matches("crate::")
                .trim_start_matches("self::")
                .trim_start_matches("super::");
            if trimmed == module && module.contains("::") && !module.starts_with("crate") {
                // `use std::...` / external crates
                return None;
            }
            let mut segments: Vec<&str> = trimmed
                .split("::")
                .take_while(|s| !s.contains('{') && !s.contains('*'))
                .collect();
            // The trailing segment is usually an item, not a module; try
            // progressively shorter paths.
            while !segments.is_empty() {
                let joined = segments.join("/");
                for candidate in [
                    format!("src/{joined}.rs"),
                    format!("src/{joined}/mod.rs"),
                    format!("{joined}.rs"),
                ] {
                    if let Some(found) = try_exists(candidate) {
                        return Some(found);
                    }
                }
                segments.pop();
            }
            None
        }
        Language::C | Language::Cpp => None,
    }
}

/// Collapse `a/./b` and `a/x/../b` without touching the filesystem.
fn normalize_relative(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_callee() {
        assert_eq!(split_callee("foo"), (None, "foo"));
        assert_eq!(split_callee("m.foo"), (Some("m"), "foo"));
        assert_eq!(split_callee("a.b.foo"), (Some("a.b"), "foo"));
        assert_eq!(split_callee("store::open"), (Some("store"), "open"));
    }

    #[test]
    fn test_resolve_python_import() {
        let files: HashSet<String> = ["src/util.py", "src/pkg/__init__.py", "src/app.py"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            resolve_import("src/app.py", "util", Language::Python, &files),
            Some("src/util.py".to_string())
        );
        assert_eq!(
            resolve_import("src/app.py", ".util", Language::Python, &files),
            Some("src/util.py".to_string())
        );
        assert_eq!(
            resolve_import("src/app.py", "pkg", Language::Python, &files),
            Some("src/pkg/__init__.py".to_string())
        );
        assert_eq!(
            resolve_import("src/app.py", "os.path", Language::Python, &files),
            None
        );
    }

    #[test]
    fn test_resolve_js_import() {
        let files: HashSet<String> = ["x.js", "m.js", "lib/index.js"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            resolve_import("x.js", "./m", Language::JavaScript, &files),
            Some("m.js".to_string())
        );
        assert_eq!(
            resolve_import("x.js", "./lib", Language::JavaScript, &files),
            Some("lib/index.js".to_string())
        );
        assert_eq!(
            resolve_import("x.js", "express", Language::JavaScript, &files),
            None
        );
    }

    #[test]
    fn test_resolve_rust_use() {
        let files: HashSet<String> = ["src/store/db.rs", "src/store/mod.rs", "src/main.rs"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            resolve_import("src/main.rs", "crate::store::db::Store", Language::Rust, &files),
            Some("src/store/db.rs".to_string())
        );
        assert_eq!(
            resolve_import("src/main.rs", "crate::store", Language::Rust, &files),
            Some("src/store/mod.rs".to_string())
        );
        assert_eq!(
            resolve_import("src/main.rs", "std::collections::HashMap", Language::Rust, &files),
            None
        );
    }

    #[test]
    fn test_module_groups_manifest() {
        let file = |id: i64, path: &str| FileRecord {
            id,
            path: path.to_string(),
            language: None,
            content_hash: String::new(),
            size: 0,
            mtime: 0,
            indexed_at: 0,
        };
        let files = vec![
            file(1, "frontend/package.json"),
            file(2, "frontend/src/app.js"),
            file(3, "backend/go.mod"),
            file(4, "backend/server.go"),
            file(5, "scripts/tool.py"),
        ];
        let (groups, labels) = module_groups(&files);
        assert_eq!(groups[&2], "frontend");
        assert_eq!(groups[&4], "backend");
        assert_eq!(groups[&5], "scripts");
        assert_eq!(labels["frontend"], "manifest");
        assert_eq!(labels["scripts"], "directory");
    }
}

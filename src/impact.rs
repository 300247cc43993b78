// Impact analysis: changed set -> blast radius -> ranked review order

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::config::normalize_repo_path;
use crate::error::{EngineError, Result};
use crate::graph::{GraphEngine, GraphNode};
use crate::store::db::Store;
use crate::store::{EdgeKind, SymbolKind, SymbolRecord, Visibility};

/// What the caller wants analyzed.
#[derive(Debug, Clone, Default)]
pub struct ImpactTargets {
    pub files: Vec<String>,
    pub symbols: Vec<String>,
    pub git_diff: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangedItem {
    pub path: String,
    pub symbol: Option<String>,
    pub stable_id: Option<String>,
    pub kind: Option<String>,
    pub public: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedFile {
    pub path: String,
    pub score: f64,
    pub weighted_fan_in: f64,
    pub is_test: bool,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpactAnalysis {
    pub changed: Vec<ChangedItem>,
    /// Direct upstream callers of the changed symbols.
    pub upstream: Vec<GraphNode>,
    /// Transitive downstream callees with hop counts.
    pub downstream: Vec<GraphNode>,
    pub tests: Vec<String>,
    pub api_risk: &'static str,
    pub api_reasons: Vec<String>,
    pub ranked: Vec<RankedFile>,
}

/// Language-aware test file detection.
pub fn is_test_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    let basename = lower.rsplit('/').next().unwrap_or(&lower);
    basename.starts_with("test_")
        || basename.contains("_test.")
        || basename.contains(".spec.")
        || basename.contains(".test.")
        || lower.contains("/tests/")
        || lower.starts_with("tests/")
        || lower.contains("/__tests__/")
}

pub fn analyze(
    store: &Store,
    repo_root: &Path,
    targets: &ImpactTargets,
    depth: u32,
) -> Result<ImpactAnalysis> {
    let graph = GraphEngine::new(store)?;
    let file_paths: HashMap<i64, String> = store
        .all_files()?
        .into_iter()
        .map(|f| (f.id, f.path))
        .collect();

    // Resolve every target to concrete symbols.
    let mut changed: Vec<ChangedItem> = Vec::new();
    let mut start_symbols: Vec<SymbolRecord> = Vec::new();

    for file in &targets.files {
        let rel = normalize_repo_path(repo_root, file)?;
        let record = store.get_file(&rel).ok().flatten();
        match record {
            Some(record) => {
                let symbols = store.symbols_in_file(record.id)?;
                if symbols.is_empty() {
                    changed.push(ChangedItem {
                        path: rel.clone(),
                        symbol: None,
                        stable_id: None,
                        kind: None,
                        public: false,
                    });
                }
                for symbol in symbols {
                    if symbol.kind == SymbolKind::Import {
                        continue;
                    }
                    push_changed(&mut changed, &mut start_symbols, &rel, symbol);
                }
            }
            None => {
                return Err(EngineError::SymbolNotFound {
                    query: rel,
                    suggestions: Vec::new(),
                })
            }
        }
    }

    for name in &targets.symbols {
        let symbols = store.symbols_named(name)?;
        if symbols.is_empty() {
            return Err(EngineError::SymbolNotFound {
                query: name.clone(),
                suggestions: store.suggest(name, 5)?,
            });
        }
        for symbol in symbols {
            let path = file_paths
                .get(&symbol.file_id)
                .cloned()
                .unwrap_or_default();
            push_changed(&mut changed, &mut start_symbols, &path, symbol);
        }
    }

    if let Some(range) = &targets.git_diff {
        for (path, ranges) in git_diff_ranges(repo_root, range)? {
            let Some(record) = store.get_file(&path)? else {
                continue;
            };
            let symbols = store.symbols_in_file(record.id)?;
            let mut any = false;
            for symbol in symbols {
                if symbol.kind == SymbolKind::Import || symbol.kind == SymbolKind::Module {
                    continue;
                }
                let end = symbol.line_end.unwrap_or(symbol.line_start);
                if ranges
                    .iter()
                    .any(|(lo, hi)| symbol.line_start <= *hi && end >= *lo)
                {
                    push_changed(&mut changed, &mut start_symbols, &path, symbol);
                    any = true;
                }
            }
            if !any {
                changed.push(ChangedItem {
                    path,
                    symbol: None,
                    stable_id: None,
                    kind: None,
                    public: false,
                });
            }
        }
    }

    // Upstream: direct callers. Downstream: transitive callees with hops.
    let mut upstream: BTreeMap<i64, GraphNode> = BTreeMap::new();
    let mut downstream: BTreeMap<i64, GraphNode> = BTreeMap::new();
    for symbol in &start_symbols {
        for node in graph.callers(symbol.id, depth.max(1), 0.0)? {
            upstream
                .entry(node.symbol_id)
                .and_modify(|existing| {
                    if node.depth < existing.depth {
                        *existing = node.clone();
                    }
                })
                .or_insert(node);
        }
        for node in graph.callees(symbol.id, depth.max(1), 0.0)? {
            downstream
                .entry(node.symbol_id)
                .and_modify(|existing| {
                    if node.depth < existing.depth {
                        *existing = node.clone();
                    }
                })
                .or_insert(node);
        }
    }
    let changed_ids: BTreeSet<i64> = start_symbols.iter().map(|s| s.id).collect();
    let upstream: Vec<GraphNode> = upstream
        .into_values()
        .filter(|n| !changed_ids.contains(&n.symbol_id))
        .collect();
    let downstream: Vec<GraphNode> = downstream
        .into_values()
        .filter(|n| !changed_ids.contains(&n.symbol_id))
        .collect();

    // Affected file set.
    let changed_paths: BTreeSet<String> = changed.iter().map(|c| c.path.clone()).collect();
    let mut affected: BTreeSet<String> = BTreeSet::new();
    for node in upstream.iter().chain(downstream.iter()) {
        affected.insert(node.path.clone());
    }

    let tests: Vec<String> = affected
        .iter()
        .filter(|p| is_test_path(p))
        .cloned()
        .collect();

    // API surface: public changed symbols elevate severity.
    let public_changed: Vec<&ChangedItem> = changed.iter().filter(|c| c.public).collect();
    let (api_risk, api_reasons) = match public_changed.len() {
        0 => ("none", Vec::new()),
        n => {
            let reasons = public_changed
                .iter()
                .take(5)
                .map(|c| {
                    format!(
                        "public {} `{}` changed",
                        c.kind.as_deref().unwrap_or("symbol"),
                        c.symbol.as_deref().unwrap_or(&c.path)
                    )
                })
                .collect();
            if n >= 5 {
                ("high", reasons)
            } else if n >= 2 {
                ("medium", reasons)
            } else {
                ("low", reasons)
            }
        }
    };

    let ranked = rank_files(
        store,
        &affected,
        &changed_paths,
        &upstream,
        &file_paths,
        api_risk != "none",
    )?;

    debug!(
        "Impact: {} changed symbols, {} upstream, {} downstream, {} tests",
        changed_ids.len(),
        upstream.len(),
        downstream.len(),
        tests.len()
    );

    Ok(ImpactAnalysis {
        changed,
        upstream,
        downstream,
        tests,
        api_risk,
        api_reasons,
        ranked,
    })
}

fn push_changed(
    changed: &mut Vec<ChangedItem>,
    start_symbols: &mut Vec<SymbolRecord>,
    path: &str,
    symbol: SymbolRecord,
) {
    if start_symbols.iter().any(|s| s.id == symbol.id) {
        return;
    }
    changed.push(ChangedItem {
        path: path.to_string(),
        symbol: Some(symbol.qualified_name.clone()),
        stable_id: Some(symbol.stable_id.clone()),
        kind: Some(symbol.kind.as_str().to_string()),
        public: symbol.visibility == Visibility::Public && symbol.kind != SymbolKind::Module,
    });
    start_symbols.push(symbol);
}

/// Rank affected files for review. Key, in order: confidence-weighted
/// fan-in, test proximity, module centrality; public API changes raise
/// everything one band.
fn rank_files(
    store: &Store,
    affected: &BTreeSet<String>,
    changed_paths: &BTreeSet<String>,
    upstream: &[GraphNode],
    file_paths: &HashMap<i64, String>,
    api_elevated: bool,
) -> Result<Vec<RankedFile>> {
    // Weighted fan-in per file: confidence mass of upstream callers that
    // live in it.
    let mut fan_in: HashMap<&str, f64> = HashMap::new();
    for node in upstream {
        *fan_in.entry(node.path.as_str()).or_default() += node.confidence;
    }

    // Module centrality: import edges touching each file's module symbol.
    let mut centrality: HashMap<String, usize> = HashMap::new();
    for edge in store.edges_of_kind(EdgeKind::Import)? {
        for symbol_id in [edge.source_id, edge.target_id] {
            if let Some(symbol) = store.symbol(symbol_id)? {
                if let Some(path) = file_paths.get(&symbol.file_id) {
                    *centrality.entry(path.clone()).or_default() += 1;
                }
            }
        }
    }

    let mut ranked = Vec::new();
    for path in affected {
        if changed_paths.contains(path) {
            continue;
        }
        let weighted_fan_in = fan_in.get(path.as_str()).copied().unwrap_or(0.0);
        let is_test = is_test_path(path);
        let central = centrality.get(path).copied().unwrap_or(0);

        let fan_in_score = (weighted_fan_in / 10.0).min(1.0);
        let test_score = if is_test { 0.3 } else { 0.0 };
        let centrality_score = (central as f64 / 5.0).min(1.0) * 0.2;
        let api_score = if api_elevated { 0.25 } else { 0.0 };
        let score = fan_in_score + test_score + centrality_score + api_score;

        let mut reasons = Vec::new();
        if is_test {
            reasons.push("test proximity".to_string());
        }
        if fan_in_score > 0.5 {
            reasons.push(format!("high fan-in ({weighted_fan_in:.1} weighted callers)"));
        } else if weighted_fan_in > 0.0 {
            reasons.push(format!("fan-in {weighted_fan_in:.1}"));
        }
        if centrality_score > 0.1 {
            reasons.push("central module".to_string());
        }
        if api_elevated {
            reasons.push("public API changed".to_string());
        }
        if reasons.is_empty() {
            reasons.push("reachable from change".to_string());
        }

        ranked.push(RankedFile {
            path: path.clone(),
            score: (score * 1000.0).round() / 1000.0,
            weighted_fan_in: (weighted_fan_in * 100.0).round() / 100.0,
            is_test,
            rationale: reasons.join(", "),
        });
    }

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.path.cmp(&b.path))
    });
    Ok(ranked)
}

/// Parse `git diff --unified=0 <range>` into (path, new-side line ranges).
fn git_diff_ranges(repo_root: &Path, range: &str) -> Result<Vec<(String, Vec<(u32, u32)>)>> {
    let output = Command::new("git")
        .arg("diff")
        .arg("--unified=0")
        .arg(range)
        .current_dir(repo_root)
        .output()?;
    if !output.status.success() {
        return Err(EngineError::InvalidArgument(format!(
            "git diff {range} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let mut result: Vec<(String, Vec<(u32, u32)>)> = Vec::new();
    let mut current: Option<usize> = None;
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        if let Some(path) = line.strip_prefix("+++ b/") {
            result.push((path.to_string(), Vec::new()));
            current = Some(result.len() - 1);
        } else if line.starts_with("@@") {
            let Some(idx) = current else { continue };
            if let Some((start, count)) = parse_hunk_new_side(line) {
                if count > 0 {
                    result[idx].1.push((start, start + count - 1));
                } else {
                    // Pure deletion: the surrounding line still marks the spot.
                    result[idx].1.push((start.max(1), start.max(1)));
                }
            }
        }
    }
    Ok(result)
}

/// `@@ -a,b +c,d @@` -> (c, d); d defaults to 1 when omitted.
fn parse_hunk_new_side(line: &str) -> Option<(u32, u32)> {
    let plus = line.split_whitespace().find(|w| w.starts_with('+'))?;
    let spec = plus.trim_start_matches('+');
    match spec.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((spec.parse().ok()?, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::indexer::{CancelToken, IndexMode, Indexer};

    #[test]
    fn test_is_test_path() {
        assert!(is_test_path("pkg/store_test.go"));
        assert!(is_test_path("tests/test_db.py"));
        assert!(is_test_path("src/app.spec.ts"));
        assert!(is_test_path("src/app.test.jsx"));
        assert!(is_test_path("src/__tests__/util.js"));
        assert!(!is_test_path("src/app.ts"));
        assert!(!is_test_path("contest/winner.py"));
    }

    #[test]
    fn test_parse_hunk_new_side() {
        assert_eq!(parse_hunk_new_side("@@ -1,3 +2,5 @@"), Some((2, 5)));
        assert_eq!(parse_hunk_new_side("@@ -4 +7 @@ fn main"), Some((7, 1)));
        assert_eq!(parse_hunk_new_side("@@ -10,2 +12,0 @@"), Some((12, 0)));
    }

    fn write_file(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_test_proximity_ranks_high() {
        // A function called from several files, one of them a test file:
        // the test file must rank near the top with a "test proximity"
        // rationale.
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "utils.py", "def fmt(x):\n    return str(x)\n");
        for name in ["a", "b", "c", "d"] {
            write_file(
                dir.path(),
                &format!("{name}.py"),
                "from utils import fmt\n\ndef go():\n    fmt(1)\n",
            );
        }
        write_file(
            dir.path(),
            "fmt_test.py",
            "from utils import fmt\n\ndef test_fmt():\n    fmt(2)\n",
        );

        let idx = Indexer::new(dir.path(), Config::default(), CancelToken::new()).unwrap();
        idx.run(IndexMode::Incremental).await.unwrap();

        let targets = ImpactTargets {
            files: vec!["utils.py".to_string()],
            ..Default::default()
        };
        let analysis = analyze(idx.store(), dir.path(), &targets, 2).unwrap();

        assert!(analysis
            .tests
            .iter()
            .any(|t| t == "fmt_test.py"), "tests: {:?}", analysis.tests);
        let test_rank = analysis
            .ranked
            .iter()
            .position(|r| r.path == "fmt_test.py")
            .expect("fmt_test.py ranked");
        assert!(test_rank == 0, "expected top rank, got {:?}", analysis.ranked);
        assert!(analysis.ranked[test_rank]
            .rationale
            .contains("test proximity"));
    }

    #[tokio::test]
    async fn test_unknown_file_target_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.py", "def f():\n    pass\n");
        let idx = Indexer::new(dir.path(), Config::default(), CancelToken::new()).unwrap();
        idx.run(IndexMode::Incremental).await.unwrap();

        let targets = ImpactTargets {
            files: vec!["missing.py".to_string()],
            ..Default::default()
        };
        let err = analyze(idx.store(), dir.path(), &targets, 2).unwrap_err();
        assert!(matches!(err, EngineError::SymbolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_public_change_elevates_risk() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "lib.rs", "pub fn api() {}\n\nfn private() {\n    api();\n}\n");
        let idx = Indexer::new(dir.path(), Config::default(), CancelToken::new()).unwrap();
        idx.run(IndexMode::Incremental).await.unwrap();

        let targets = ImpactTargets {
            symbols: vec!["api".to_string()],
            ..Default::default()
        };
        let analysis = analyze(idx.store(), dir.path(), &targets, 1).unwrap();
        assert_eq!(analysis.api_risk, "low");
        assert!(!analysis.api_reasons.is_empty());
    }
}

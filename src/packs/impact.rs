// Impact pack: change blast radius with ranked review order

use std::path::Path;

use super::{Pack, PackFormat, PackSection, IMPACT_BUDGET};
use crate::error::Result;
use crate::impact::{analyze, is_test_path, ImpactTargets};
use crate::store::db::Store;

#[derive(Debug, Clone)]
pub struct ImpactOptions {
    pub depth: u32,
    pub include_tests: bool,
    pub explain: bool,
    pub max_tokens: Option<usize>,
    pub format: PackFormat,
}

impl Default for ImpactOptions {
    fn default() -> Self {
        Self {
            depth: 2,
            include_tests: false,
            explain: true,
            max_tokens: None,
            format: PackFormat::Markdown,
        }
    }
}

/// Build the impact pack for a set of changed files/symbols or a git
/// diff range.
pub fn generate(
    store: &Store,
    repo_root: &Path,
    targets: &ImpactTargets,
    opts: &ImpactOptions,
) -> Result<String> {
    let analysis = analyze(store, repo_root, targets, opts.depth)?;

    let mut pack = Pack::new("impact", "Impact Analysis", store)?;
    pack.meta("budget", IMPACT_BUDGET.resolve(opts.max_tokens));
    pack.meta("depth", opts.depth);
    pack.meta("changed_symbols", analysis.changed.len());
    pack.meta("upstream_count", analysis.upstream.len());
    pack.meta("downstream_count", analysis.downstream.len());
    pack.meta("test_count", analysis.tests.len());

    // Changed Items
    let mut changed = PackSection::new("Changed Items");
    for item in &analysis.changed {
        match &item.symbol {
            Some(symbol) => changed.push(format!(
                "- `{}` ({}) in `{}`{}",
                symbol,
                item.kind.as_deref().unwrap_or("symbol"),
                item.path,
                if item.public { " [public]" } else { "" }
            )),
            None => changed.push(format!("- `{}` (file)", item.path)),
        }
    }
    if changed.lines.is_empty() {
        changed.push("(nothing matched the given targets)".to_string());
    }
    pack.section(changed);

    // Upstream: direct and transitive callers, nearest first.
    let mut upstream = PackSection::new("Upstream");
    for node in &analysis.upstream {
        upstream.push(format!(
            "- `{}` {}:{} (depth {}, confidence {:.2})",
            node.qualified_name, node.path, node.line, node.depth, node.confidence
        ));
    }
    if upstream.lines.is_empty() {
        upstream.push("(no known callers)".to_string());
    }
    pack.section(upstream);

    // Downstream: transitive callees with hop counts.
    let mut downstream = PackSection::new("Downstream");
    for node in &analysis.downstream {
        downstream.push(format!(
            "- `{}` {}:{} ({} hops, confidence {:.2})",
            node.qualified_name, node.path, node.line, node.depth, node.confidence
        ));
    }
    if downstream.lines.is_empty() {
        downstream.push("(no known callees)".to_string());
    }
    pack.section(downstream);

    // Tests
    let mut tests = PackSection::new("Tests");
    for test in &analysis.tests {
        tests.push(format!("- `{test}`"));
    }
    if opts.include_tests {
        // Also surface tests that merely import the changed files.
        for extra in importing_tests(store, &analysis.changed)? {
            if !analysis.tests.contains(&extra) {
                tests.push(format!("- `{extra}` (imports changed module)"));
            }
        }
    }
    if tests.lines.is_empty() {
        tests.push("(no affected tests found)".to_string());
    }
    pack.section(tests);

    // Risk
    let mut risk = PackSection::new("Risk");
    risk.push(format!("API risk: {}", analysis.api_risk));
    for reason in &analysis.api_reasons {
        risk.push(format!("- {reason}"));
    }
    pack.section(risk);

    // Ranked Files
    let mut ranked = PackSection::new("Ranked Files");
    for (position, file) in analysis.ranked.iter().enumerate() {
        if opts.explain {
            ranked.push(format!(
                "{}. `{}` (score {:.3}) {}",
                position + 1,
                file.path,
                file.score,
                file.rationale
            ));
        } else {
            ranked.push(format!(
                "{}. `{}` (score {:.3})",
                position + 1,
                file.path,
                file.score
            ));
        }
    }
    if ranked.lines.is_empty() {
        ranked.push("(no downstream files to review)".to_string());
    }
    pack.section(ranked);

    pack.enforce_budget(IMPACT_BUDGET.resolve(opts.max_tokens))?;
    pack.render(opts.format)
}

/// Test files whose imports resolve into any changed file.
fn importing_tests(
    store: &Store,
    changed: &[crate::impact::ChangedItem],
) -> Result<Vec<String>> {
    let changed_paths: std::collections::HashSet<&str> =
        changed.iter().map(|c| c.path.as_str()).collect();
    let mut out = Vec::new();
    for file in store.all_files()? {
        if !is_test_path(&file.path) {
            continue;
        }
        for symbol in store.symbols_in_file(file.id)? {
            if symbol.kind != crate::store::SymbolKind::Import {
                continue;
            }
            let resolved = symbol
                .metadata
                .as_deref()
                .and_then(|m| serde_json::from_str::<serde_json::Value>(m).ok())
                .and_then(|v| v["resolved_path"].as_str().map(str::to_string));
            if let Some(resolved) = resolved {
                if changed_paths.contains(resolved.as_str()) {
                    out.push(file.path.clone());
                    break;
                }
            }
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::indexer::{CancelToken, IndexMode, Indexer};
    use crate::tokens;

    async fn indexed_repo(files: &[(&str, &str)]) -> (tempfile::TempDir, Indexer) {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        let idx = Indexer::new(dir.path(), Config::default(), CancelToken::new()).unwrap();
        idx.run(IndexMode::Incremental).await.unwrap();
        (dir, idx)
    }

    #[tokio::test]
    async fn test_impact_pack_sections_and_test_ranking() {
        // S6: utils.fmt called from several files including a test; the
        // test ranks among the top entries with a test-proximity
        // rationale.
        let caller = "from utils import fmt\n\ndef go():\n    fmt(1)\n";
        let (dir, idx) = indexed_repo(&[
            ("utils.py", "def fmt(x):\n    return str(x)\n"),
            ("a.py", caller),
            ("b.py", caller),
            ("c.py", caller),
            ("d.py", caller),
            (
                "fmt_test.py",
                "from utils import fmt\n\ndef test_fmt():\n    fmt(2)\n",
            ),
        ])
        .await;

        let targets = ImpactTargets {
            files: vec!["utils.py".to_string()],
            ..Default::default()
        };
        let out = generate(
            idx.store(),
            dir.path(),
            &targets,
            &ImpactOptions::default(),
        )
        .unwrap();

        for heading in [
            "# Impact Analysis",
            "## Changed Items",
            "## Upstream",
            "## Downstream",
            "## Tests",
            "## Risk",
            "## Ranked Files",
            "## Metadata",
        ] {
            assert!(out.contains(heading), "missing {heading} in:\n{out}");
        }
        assert!(out.contains("fmt_test.py"));
        assert!(out.contains("test proximity"));
        // The test file is the first ranked entry.
        let ranked_start = out.find("## Ranked Files").unwrap();
        let first_row = out[ranked_start..]
            .lines()
            .find(|l| l.starts_with("1."))
            .unwrap();
        assert!(first_row.contains("fmt_test.py"), "first: {first_row}");
    }

    #[tokio::test]
    async fn test_impact_respects_budget() {
        let caller = "from utils import fmt\n\ndef go():\n    fmt(1)\n";
        let mut files: Vec<(String, String)> = vec![(
            "utils.py".to_string(),
            "def fmt(x):\n    return str(x)\n".to_string(),
        )];
        for i in 0..40 {
            files.push((format!("caller_{i}.py"), caller.to_string()));
        }
        let refs: Vec<(&str, &str)> = files
            .iter()
            .map(|(a, b)| (a.as_str(), b.as_str()))
            .collect();
        let (dir, idx) = indexed_repo(&refs).await;

        let targets = ImpactTargets {
            files: vec!["utils.py".to_string()],
            ..Default::default()
        };
        let opts = ImpactOptions {
            max_tokens: Some(400),
            ..Default::default()
        };
        let out = generate(idx.store(), dir.path(), &targets, &opts).unwrap();
        assert!(tokens::estimate(&out) <= 400);
        assert!(out.contains("## Metadata"));
        assert!(out.contains("more available via zoom"));
    }
}

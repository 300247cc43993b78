// Zoom pack: bounded symbol-level detail view

use std::path::Path;

use super::{Pack, PackFormat, PackSection, ZOOM_BUDGET};
use crate::config::normalize_repo_path;
use crate::error::{EngineError, Result};
use crate::graph::GraphEngine;
use crate::store::db::Store;
use crate::store::{EdgeKind, SymbolKind, SymbolRecord};

#[derive(Debug, Clone)]
pub struct ZoomOptions {
    pub max_tokens: Option<usize>,
    pub format: PackFormat,
}

impl Default for ZoomOptions {
    fn default() -> Self {
        Self {
            max_tokens: None,
            format: PackFormat::Markdown,
        }
    }
}

/// Resolve a zoom target: numeric id, stable id, `path:line`, file path,
/// or symbol name. Path-shaped targets are sandbox-checked before any
/// file access; unknown names come back as `SymbolNotFound` with FTS
/// suggestions.
pub fn resolve_target(store: &Store, repo_root: &Path, target: &str) -> Result<SymbolRecord> {
    if let Ok(id) = target.parse::<i64>() {
        if let Some(symbol) = store.symbol(id)? {
            return Ok(symbol);
        }
    }

    if target.contains(':') {
        if let Some(symbol) = store.symbol_by_stable_id(target)? {
            return Ok(symbol);
        }
        // path:line
        if let Some((path_part, line_part)) = target.rsplit_once(':') {
            if let Ok(line) = line_part.parse::<u32>() {
                let rel = normalize_repo_path(repo_root, path_part)?;
                if let Some(symbol) = store.symbol_at(&rel, line)? {
                    return Ok(symbol);
                }
            }
        }
    }

    // Path-shaped targets are normalized first; this is where traversal
    // attempts like ../../etc/passwd are rejected.
    if target.contains('/') || target.contains('\\') {
        let rel = normalize_repo_path(repo_root, target)?;
        if let Some(file) = store.get_file(&rel)? {
            if let Some(module) = store.module_symbol_of_file(file.id)? {
                return Ok(module);
            }
        }
        return Err(EngineError::SymbolNotFound {
            query: target.to_string(),
            suggestions: store.suggest(target, 5)?,
        });
    }

    let mut named = store.symbols_named(target)?;
    named.retain(|s| s.kind != SymbolKind::Import);
    if let Some(symbol) = named.into_iter().next() {
        return Ok(symbol);
    }

    Err(EngineError::SymbolNotFound {
        query: target.to_string(),
        suggestions: store.suggest(target, 5)?,
    })
}

/// Build the zoom pack for one symbol.
pub fn generate(
    store: &Store,
    repo_root: &Path,
    target: &str,
    opts: &ZoomOptions,
) -> Result<String> {
    let symbol = resolve_target(store, repo_root, target)?;
    let file = store
        .all_files()?
        .into_iter()
        .find(|f| f.id == symbol.file_id)
        .ok_or_else(|| EngineError::SymbolNotFound {
            query: target.to_string(),
            suggestions: Vec::new(),
        })?;
    let language = file.language.clone().unwrap_or_default();

    let mut pack = Pack::new("zoom", format!("Zoom: {}", symbol.qualified_name), store)?;
    pack.meta("budget", ZOOM_BUDGET.resolve(opts.max_tokens));
    pack.meta("target", &symbol.stable_id);
    pack.meta("kind", symbol.kind.as_str());
    pack.meta("location", format!("{}:{}", file.path, symbol.line_start));

    // Signature
    let mut signature = PackSection::new("Signature");
    signature.push("```".to_string() + &language);
    signature.push(
        symbol
            .signature
            .clone()
            .unwrap_or_else(|| symbol.qualified_name.clone()),
    );
    signature.push("```".to_string());
    pack.section(signature);

    // Docs, capped to a quarter of the pack budget so a huge docstring
    // cannot crowd out the structural sections.
    if let Some(doc) = &symbol.docstring {
        let doc_budget = (ZOOM_BUDGET.resolve(opts.max_tokens) / 4).max(50);
        let doc_text = crate::tokens::truncate(doc, doc_budget).unwrap_or_default();
        if !doc_text.is_empty() {
            let mut docs = PackSection::new("Docs");
            for line in doc_text.lines() {
                docs.push(line.to_string());
            }
            pack.section(docs);
        }
    }

    // Skeleton of the enclosing file.
    let source = std::fs::read_to_string(repo_root.join(&file.path)).ok();
    if let Some(source) = &source {
        let mut skeleton = PackSection::new("Skeleton");
        skeleton.push(format!("```{language}"));
        for line in skeletonize(source, &language) {
            skeleton.push(line);
        }
        skeleton.push("```".to_string());
        pack.section(skeleton);
    }

    // Callers / Callees at depth 1.
    let graph = GraphEngine::new(store)?;
    let mut callers = PackSection::new("Callers");
    let caller_nodes = graph.callers(symbol.id, 1, 0.0)?;
    if caller_nodes.is_empty() {
        callers.push("(none known)".to_string());
    }
    for node in &caller_nodes {
        callers.push(format!(
            "- `{}` {}:{} (confidence {:.2})",
            node.qualified_name, node.path, node.line, node.confidence
        ));
    }
    pack.section(callers);

    let mut callees = PackSection::new("Callees");
    let callee_nodes = graph.callees(symbol.id, 1, 0.0)?;
    if callee_nodes.is_empty() {
        callees.push("(none known)".to_string());
    }
    for node in &callee_nodes {
        let qualifier = if node.confidence < 0.4 {
            " possible target;"
        } else {
            ""
        };
        callees.push(format!(
            "- `{}` {}:{} (confidence {:.2}{})",
            node.qualified_name, node.path, node.line, node.confidence, qualifier
        ));
    }
    if callee_nodes.iter().any(|n| n.confidence < 0.4) {
        callees.push(
            "Low-confidence rows are dynamic dispatch guesses; confirm via zoom on the target."
                .to_string(),
        );
    }
    pack.section(callees);

    // Code Slice: the symbol's own lines.
    if let Some(source) = &source {
        let mut slice = PackSection::new("Code Slice");
        let lines: Vec<&str> = source.lines().collect();
        let start = symbol.line_start.saturating_sub(1) as usize;
        let end = symbol
            .line_end
            .map(|l| l as usize)
            .unwrap_or(start + 1)
            .min(lines.len());
        slice.push(format!("```{language}"));
        for line in &lines[start.min(lines.len())..end] {
            slice.push(line.to_string());
        }
        slice.push("```".to_string());
        pack.section(slice);
    }

    // Related: containment and inheritance neighbors, then file siblings.
    let mut related = PackSection::new("Related");
    for edge in store.edges_from(symbol.id, Some(EdgeKind::Inherit))? {
        if let Some(base) = store.symbol(edge.target_id)? {
            related.push(format!("- inherits `{}`", base.qualified_name));
        }
    }
    for edge in store.edges_to(symbol.id, Some(EdgeKind::Inherit))? {
        if let Some(derived) = store.symbol(edge.source_id)? {
            related.push(format!("- inherited by `{}`", derived.qualified_name));
        }
    }
    let siblings = store.symbols_in_file(symbol.file_id)?;
    for sibling in siblings.iter().take(12) {
        if sibling.id == symbol.id
            || matches!(sibling.kind, SymbolKind::Import | SymbolKind::Module)
        {
            continue;
        }
        related.push(format!(
            "- `{}` ({}, line {})",
            sibling.qualified_name,
            sibling.kind.as_str(),
            sibling.line_start
        ));
    }
    if related.lines.is_empty() {
        related.push("(no related symbols)".to_string());
    }
    pack.section(related);

    pack.enforce_budget(ZOOM_BUDGET.resolve(opts.max_tokens))?;
    pack.render(opts.format)
}

/// Collapse a file to its structural skeleton: definition lines, doc
/// lines, calls, returns, raises/throws, and top-level branches survive;
/// everything else folds into a single placeholder per run.
pub fn skeletonize(source: &str, language: &str) -> Vec<String> {
    let keep_keywords: &[&str] = match language {
        "python" => &[
            "def ", "class ", "return", "raise ", "yield", "if ", "elif ", "else:", "for ",
            "while ", "with ", "import ", "from ",
        ],
        "rust" => &[
            "fn ", "struct ", "enum ", "trait ", "impl ", "mod ", "return", "panic!", "if ",
            "else", "for ", "while ", "match ", "use ", "pub ",
        ],
        "go" => &[
            "func ", "type ", "return", "panic(", "if ", "else", "for ", "switch ", "import ",
        ],
        "javascript" | "typescript" => &[
            "function", "class ", "return", "throw ", "if ", "else", "for ", "while ", "switch ",
            "import ", "export ", "const ", "=>",
        ],
        _ => &["def ", "fn ", "func ", "function", "class ", "return", "if "],
    };

    let mut out = Vec::new();
    let mut collapsed = false;
    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let keep = keep_keywords.iter().any(|k| trimmed.starts_with(k))
            || trimmed.starts_with("///")
            || trimmed.starts_with("\"\"\"")
            || trimmed.starts_with("//")
            || trimmed.starts_with('#')
            || trimmed.contains("(") && trimmed.ends_with(")");
        if keep {
            out.push(line.to_string());
            collapsed = false;
        } else if !collapsed {
            let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
            out.push(format!("{indent}..."));
            collapsed = true;
        }
    }
    out
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
    async fn test_zoom_lists_callers() {
        // S1: zoom foo shows bar as a caller with confidence >= 0.7.
        let (dir, idx) = indexed_repo(&[(
            "src/a.py",
            "def foo():\n    pass\n\ndef bar():\n    foo()\n",
        )])
        .await;

        let out = generate(idx.store(), dir.path(), "foo", &ZoomOptions::default()).unwrap();
        assert!(out.contains("# Zoom: foo"));
        assert!(out.contains("## Callers"));
        assert!(out.contains("bar"));
        assert!(out.contains("## Callees"));
        assert!(out.contains("(none known)"));
    }

    #[tokio::test]
    async fn test_zoom_path_escape_rejected() {
        // S5: no file read happens for targets outside the root.
        let (dir, idx) = indexed_repo(&[("a.py", "def f():\n    pass\n")]).await;
        let err = generate(
            idx.store(),
            dir.path(),
            "../../etc/passwd",
            &ZoomOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::PathEscapesRoot(_)));
    }

    #[tokio::test]
    async fn test_zoom_unknown_symbol_suggests() {
        let (dir, idx) = indexed_repo(&[(
            "a.py",
            "def format_output():\n    pass\n",
        )])
        .await;
        let err = generate(
            idx.store(),
            dir.path(),
            "format_outpt",
            &ZoomOptions::default(),
        )
        .unwrap_err();
        match err {
            EngineError::SymbolNotFound { suggestions, .. } => {
                assert!(
                    suggestions.iter().any(|s| s.contains("format_output")),
                    "suggestions: {suggestions:?}"
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_zoom_by_path_line() {
        let (dir, idx) = indexed_repo(&[(
            "src/a.py",
            "def foo():\n    pass\n\ndef bar():\n    foo()\n",
        )])
        .await;
        let out = generate(idx.store(), dir.path(), "src/a.py:4", &ZoomOptions::default())
            .unwrap();
        assert!(out.contains("# Zoom: bar"));
    }

    #[tokio::test]
    async fn test_zoom_respects_budget() {
        let mut body = String::from("def target():\n    \"\"\"Doc.\"\"\"\n");
        for i in 0..100 {
            body.push_str(&format!("    x{i} = {i}\n"));
        }
        body.push_str("\ndef other():\n    target()\n");
        let (dir, idx) = indexed_repo(&[("big.py", &body)]).await;

        let opts = ZoomOptions {
            max_tokens: Some(300),
            ..Default::default()
        };
        let out = generate(idx.store(), dir.path(), "target", &opts).unwrap();
        assert!(tokens::estimate(&out) <= 300);
        assert!(out.contains("## Metadata"));
    }

    #[test]
    fn test_skeletonize_python() {
        let source = "def foo(a):\n    \"\"\"Doc.\"\"\"\n    x = 1\n    y = 2\n    if x:\n        z = 3\n    return x\n";
        let skeleton = skeletonize(source, "python").join("\n");
        assert!(skeleton.contains("def foo(a):"));
        assert!(skeleton.contains("if x:"));
        assert!(skeleton.contains("return x"));
        assert!(skeleton.contains("..."));
        assert!(!skeleton.contains("y = 2"));
    }
}

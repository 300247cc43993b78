// Pack assembly: ordered sections, mandatory metadata, budget enforcement

pub mod impact;
pub mod repomap;
pub mod zoom;

use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::store::db::Store;
use crate::store::schema::SCHEMA_VERSION;
use crate::tokens;

/// Budget bounds for one pack type.
#[derive(Debug, Clone, Copy)]
pub struct PackBudget {
    pub default: usize,
    pub max: usize,
}

pub const REPOMAP_BUDGET: PackBudget = PackBudget {
    default: 8000,
    max: 16000,
};
pub const ZOOM_BUDGET: PackBudget = PackBudget {
    default: 4000,
    max: 8000,
};
pub const IMPACT_BUDGET: PackBudget = PackBudget {
    default: 6000,
    max: 12000,
};

impl PackBudget {
    /// Clamp a requested budget into this pack's bounds.
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default).min(self.max)
    }
}

/// Output format for packs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackFormat {
    Markdown,
    Json,
}

impl PackFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "markdown" => Ok(PackFormat::Markdown),
            "json" => Ok(PackFormat::Json),
            other => Err(EngineError::InvalidArgument(format!(
                "invalid format: {other} (expected markdown|json)"
            ))),
        }
    }
}

/// One content section. Rows are appended highest-rank first so budget
/// trimming can drop from the tail.
#[derive(Debug, Clone)]
pub struct PackSection {
    pub title: String,
    pub lines: Vec<String>,
    pub dropped: usize,
}

impl PackSection {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lines: Vec::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn markdown(&self) -> String {
        let mut out = format!("## {}\n\n", self.title);
        let mut fence_open = false;
        for line in &self.lines {
            if line.trim_start().starts_with("```") {
                fence_open = !fence_open;
            }
            out.push_str(line);
            out.push('\n');
        }
        // A trimmed code block must still close its fence.
        if fence_open {
            out.push_str("```\n");
        }
        if self.dropped > 0 {
            out.push_str(&tokens::more_marker(self.dropped));
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// A bounded, deterministic output view. The header and the metadata
/// section are mandatory and never truncated; content sections are
/// trimmed from the last section upward, last row first.
#[derive(Debug, Clone)]
pub struct Pack {
    pub pack_type: &'static str,
    pub title: String,
    pub sections: Vec<PackSection>,
    pub metadata: BTreeMap<String, String>,
}

impl Pack {
    pub fn new(pack_type: &'static str, title: impl Into<String>, store: &Store) -> Result<Self> {
        let mut metadata = BTreeMap::new();
        metadata.insert("schema_version".to_string(), SCHEMA_VERSION.to_string());
        metadata.insert("index_version".to_string(), store.index_version()?);
        // The one labeled source of non-determinism in any pack.
        metadata.insert(
            "generated_at (non-deterministic)".to_string(),
            chrono::Utc::now().to_rfc3339(),
        );
        Ok(Self {
            pack_type,
            title: title.into(),
            sections: Vec::new(),
            metadata,
        })
    }

    pub fn meta(&mut self, key: &str, value: impl ToString) {
        self.metadata.insert(key.to_string(), value.to_string());
    }

    pub fn section(&mut self, section: PackSection) {
        self.sections.push(section);
    }

    fn metadata_markdown(&self) -> String {
        let mut out = String::from("## Metadata\n\n");
        for (key, value) in &self.metadata {
            out.push_str(&format!("- {key}: {value}\n"));
        }
        out
    }

    pub fn render_markdown(&self) -> String {
        let mut out = format!("# {}\n\n", self.title);
        for section in &self.sections {
            out.push_str(&section.markdown());
        }
        out.push_str(&self.metadata_markdown());
        out
    }

    pub fn render_json(&self) -> Result<String> {
        let sections: Vec<serde_json::Value> = self
            .sections
            .iter()
            .map(|s| {
                serde_json::json!({
                    "title": s.title,
                    "lines": s.lines,
                    "dropped": s.dropped,
                })
            })
            .collect();
        let value = serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "type": self.pack_type,
            "title": self.title,
            "metadata": self.metadata,
            "sections": sections,
        });
        serde_json::to_string_pretty(&value)
            .map_err(|e| EngineError::InvalidArgument(format!("pack serialization: {e}")))
    }

    /// Trim content until the markdown rendering fits the budget.
    ///
    /// Later sections lose rows first (lowest-ranked rows are at each
    /// section's tail); a section that loses everything is removed and
    /// counted in the preceding section's marker. Fails with
    /// `BudgetTooSmall` when the title and metadata alone exceed the
    /// budget.
    pub fn enforce_budget(&mut self, budget: usize) -> Result<()> {
        let mandatory = tokens::estimate(&format!(
            "# {}\n\n{}",
            self.title,
            self.metadata_markdown()
        ));
        if mandatory > budget {
            return Err(EngineError::BudgetTooSmall {
                budget,
                required: mandatory,
            });
        }

        while tokens::estimate(&self.render_markdown()) > budget {
            let Some(section) = self.sections.iter_mut().rev().find(|s| !s.lines.is_empty())
            else {
                // Only empty sections remain: drop them entirely.
                if self.sections.is_empty() {
                    break;
                }
                let removed = self.sections.pop().expect("sections non-empty");
                if let Some(previous) = self.sections.last_mut() {
                    previous.dropped += removed.dropped + 1;
                }
                continue;
            };
            section.lines.pop();
            section.dropped += 1;
        }
        Ok(())
    }

    pub fn render(&self, format: PackFormat) -> Result<String> {
        match format {
            PackFormat::Markdown => Ok(self.render_markdown()),
            PackFormat::Json => self.render_json(),
        }
    }
}

/// Collapsed directory tree rendering shared by RepoMap.
pub fn directory_tree(paths: &[String], max_depth: usize) -> Vec<String> {
    #[derive(Default)]
    struct Node {
        children: BTreeMap<String, Node>,
        files: usize,
    }

    let mut root = Node::default();
    for path in paths {
        let parts: Vec<&str> = path.split('/').collect();
        let mut node = &mut root;
        for (depth, part) in parts.iter().enumerate() {
            if depth + 1 == parts.len() {
                node.files += 1;
            } else if depth < max_depth {
                node = node.children.entry(part.to_string()).or_default();
            } else {
                node.files += 1;
                break;
            }
        }
    }

    let mut lines = Vec::new();
    fn render(node: &Node, prefix: &str, lines: &mut Vec<String>) {
        let count = node.children.len();
        for (i, (name, child)) in node.children.iter().enumerate() {
            let last = i + 1 == count;
            let connector = if last { "`-- " } else { "|-- " };
            let suffix = if child.files > 0 {
                format!(" ({} files)", child.files)
            } else {
                String::new()
            };
            lines.push(format!("{prefix}{connector}{name}/{suffix}"));
            let extension = if last { "    " } else { "|   " };
            render(child, &format!("{prefix}{extension}"), lines);
        }
    }
    if root.files > 0 {
        lines.push(format!(". ({} files)", root.files));
    }
    render(&root, "", &mut lines);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("index.sqlite")).unwrap();
        (dir, store)
    }

    fn sample_pack(store: &Store, rows: usize) -> Pack {
        let mut pack = Pack::new("repomap", "Repository Map: sample", store).unwrap();
        let mut section = PackSection::new("Symbols");
        for i in 0..rows {
            section.push(format!("- `symbol_number_{i}` (function, line {i})"));
        }
        pack.section(section);
        pack
    }

    #[test]
    fn test_render_contains_mandatory_metadata() {
        let (_dir, store) = empty_store();
        let pack = sample_pack(&store, 3);
        let text = pack.render_markdown();
        assert!(text.contains("## Metadata"));
        assert!(text.contains("schema_version"));
        assert!(text.contains("index_version"));
        assert!(text.contains("generated_at (non-deterministic)"));
    }

    #[test]
    fn test_budget_enforcement_drops_rows_and_marks() {
        let (_dir, store) = empty_store();
        let mut pack = sample_pack(&store, 200);
        pack.enforce_budget(120).unwrap();
        let text = pack.render_markdown();
        assert!(tokens::estimate(&text) <= 120);
        assert!(text.contains("more available via zoom"));
        assert!(text.contains("## Metadata"));
    }

    #[test]
    fn test_budget_too_small() {
        let (_dir, store) = empty_store();
        let mut pack = sample_pack(&store, 5);
        let err = pack.enforce_budget(5).unwrap_err();
        assert!(matches!(err, EngineError::BudgetTooSmall { .. }));
    }

    #[test]
    fn test_truncation_is_deterministic() {
        let (_dir, store) = empty_store();
        let mut a = sample_pack(&store, 200);
        let mut b = sample_pack(&store, 200);
        a.enforce_budget(150).unwrap();
        b.enforce_budget(150).unwrap();
        let strip = |s: String| {
            s.lines()
                .filter(|l| !l.contains("generated_at"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert_eq!(strip(a.render_markdown()), strip(b.render_markdown()));
    }

    #[test]
    fn test_json_shape() {
        let (_dir, store) = empty_store();
        let pack = sample_pack(&store, 2);
        let json: serde_json::Value =
            serde_json::from_str(&pack.render_json().unwrap()).unwrap();
        assert_eq!(json["type"], "repomap");
        assert!(json["schema_version"].is_number());
        assert!(json["metadata"]["index_version"].is_string());
        assert!(json["sections"].is_array());
    }

    #[test]
    fn test_budget_resolve_clamps_to_max() {
        assert_eq!(REPOMAP_BUDGET.resolve(None), 8000);
        assert_eq!(REPOMAP_BUDGET.resolve(Some(99999)), 16000);
        assert_eq!(ZOOM_BUDGET.resolve(Some(500)), 500);
    }

    #[test]
    fn test_directory_tree() {
        let paths = vec![
            "src/a.py".to_string(),
            "src/sub/b.py".to_string(),
            "README.md".to_string(),
        ];
        let lines = directory_tree(&paths, 4);
        let text = lines.join("\n");
        assert!(text.contains("src/"));
        assert!(text.contains("sub/"));
        assert!(text.contains(". (1 files)"));
    }
}

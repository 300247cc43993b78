// Token estimation and budget-aware truncation

use crate::error::{EngineError, Result};

/// Bytes of UTF-8 per estimated token. This is an ordering/guard heuristic,
/// not an exact tokenizer count; it is deliberately simple so identical
/// input always yields the identical estimate.
pub const BYTES_PER_TOKEN: usize = 4;

/// Marker appended wherever content was dropped to satisfy a budget.
pub fn more_marker(count: usize) -> String {
    format!("[... {} more available via zoom]", count)
}

/// Estimate the token cost of a text: one token per 4 bytes of UTF-8,
/// with a floor of 1 for any non-empty text.
pub fn estimate(text: &str) -> usize {
    if text.trim().is_empty() {
        return 0;
    }
    std::cmp::max(1, (text.len() + BYTES_PER_TOKEN - 1) / BYTES_PER_TOKEN)
}

/// A header-delimited span of markdown text.
#[derive(Debug, Clone)]
struct Section {
    header: Option<String>,
    lines: Vec<String>,
}

impl Section {
    fn text(&self) -> String {
        let mut out = String::new();
        if let Some(h) = &self.header {
            out.push_str(h);
            out.push('\n');
        }
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

fn is_header(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('#') && trimmed.trim_start_matches('#').starts_with(' ')
}

fn split_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    for line in text.lines() {
        if is_header(line) {
            sections.push(Section {
                header: Some(line.to_string()),
                lines: Vec::new(),
            });
        } else {
            match sections.last_mut() {
                Some(section) => section.lines.push(line.to_string()),
                None => sections.push(Section {
                    header: None,
                    lines: vec![line.to_string()],
                }),
            }
        }
    }
    sections
}

/// Close any markdown code fence left open by a cut.
fn close_open_fence(lines: &mut Vec<String>) {
    let open = lines
        .iter()
        .filter(|l| l.trim_start().starts_with("```"))
        .count();
    if open % 2 == 1 {
        lines.push("```".to_string());
    }
}

fn render(sections: &[Section], dropped: usize) -> String {
    let mut out = String::new();
    for section in sections {
        out.push_str(&section.text());
    }
    if dropped > 0 {
        out.push_str(&more_marker(dropped));
        out.push('\n');
    }
    out
}

/// Truncate markdown text to fit a token budget.
///
/// Drops whole trailing sections first, then trailing lines (table rows
/// before prose) of the last surviving content section. A cut never leaves
/// a code fence open, and a single "N more available" marker records what
/// was removed. Fails with `BudgetTooSmall` when even the leading section
/// cannot fit.
pub fn truncate(text: &str, budget: usize) -> Result<String> {
    if estimate(text) <= budget {
        return Ok(text.to_string());
    }

    let mut sections = split_sections(text);
    if sections.is_empty() {
        return Ok(String::new());
    }

    // The leading line (title or first content line) plus the truncation
    // marker is the floor; everything else can be peeled away.
    let first_line = text.lines().next().unwrap_or("");
    let mandatory = estimate(first_line) + estimate(&more_marker(1));
    if mandatory > budget {
        return Err(EngineError::BudgetTooSmall {
            budget,
            required: mandatory,
        });
    }

    // Drop whole sections from the end, keeping the leading section.
    let mut dropped = 0usize;
    while sections.len() > 1 && estimate(&render(&sections, dropped + 1)) > budget {
        sections.pop();
        dropped += 1;
    }

    // Still over: peel trailing lines off the last section.
    while estimate(&render(&sections, dropped)) > budget {
        let last = sections.last_mut().expect("at least one section");
        if last.lines.is_empty() {
            if sections.len() == 1 {
                // Header-only remainder; the floor check guarantees this
                // fits together with the marker.
                break;
            }
            sections.pop();
            dropped += 1;
            continue;
        }
        last.lines.pop();
        close_open_fence(&mut last.lines);
        dropped += 1;
    }

    Ok(render(&sections, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_empty() {
        assert_eq!(estimate(""), 0);
        assert_eq!(estimate("   \n"), 0);
    }

    #[test]
    fn test_estimate_floor() {
        assert_eq!(estimate("ab"), 1);
        assert_eq!(estimate("abcdefgh"), 2);
    }

    #[test]
    fn test_truncate_noop_within_budget() {
        let text = "# Title\n\nshort body\n";
        assert_eq!(truncate(text, 1000).unwrap(), text);
    }

    #[test]
    fn test_truncate_drops_trailing_sections_first() {
        let mut text = String::from("# Title\n\n## Keep\n\nrow\n");
        text.push_str("## Drop\n\n");
        for i in 0..200 {
            text.push_str(&format!("- filler line number {}\n", i));
        }
        let out = truncate(&text, 30).unwrap();
        assert!(out.contains("# Title"));
        assert!(out.contains("more available via zoom"));
        assert!(!out.contains("filler line number 150"));
    }

    #[test]
    fn test_truncate_closes_code_fence() {
        let mut text = String::from("# Title\n\n## Code\n\n```rust\n");
        for i in 0..100 {
            text.push_str(&format!("let x{} = {};\n", i, i));
        }
        text.push_str("```\n");
        let out = truncate(&text, 40).unwrap();
        let fences = out
            .lines()
            .filter(|l| l.trim_start().starts_with("```"))
            .count();
        assert_eq!(fences % 2, 0, "fence left open in: {}", out);
    }

    #[test]
    fn test_truncate_budget_too_small() {
        let text = "# A very long mandatory header section that cannot be removed\nmore\n## B\nbody\n";
        let err = truncate(text, 2).unwrap_err();
        match err {
            EngineError::BudgetTooSmall { budget, .. } => assert_eq!(budget, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncate_unstructured_text() {
        let mut text = String::new();
        for i in 0..100 {
            text.push_str(&format!("plain line without any heading {i}\n"));
        }
        let out = truncate(&text, 50).unwrap();
        assert!(estimate(&out) <= 50);
        assert!(out.contains("more available via zoom"));
        assert!(out.starts_with("plain line without any heading 0"));
    }

    #[test]
    fn test_truncate_deterministic() {
        let mut text = String::from("# T\n\n## S\n");
        for i in 0..50 {
            text.push_str(&format!("line {}\n", i));
        }
        let a = truncate(&text, 25).unwrap();
        let b = truncate(&text, 25).unwrap();
        assert_eq!(a, b);
    }
}

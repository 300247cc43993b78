// Python symbol/import/callsite extraction

use tree_sitter::Node;

use super::{
    line_of, node_text, qualify, signature_before_body, Language, LanguageParser, ParseOutput,
    ParsedCallsite, ParsedImport, ParsedSymbol,
};
use crate::store::{SymbolKind, Visibility};

pub struct PythonParser;

impl LanguageParser for PythonParser {
    fn language(&self) -> Language {
        Language::Python
    }

    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn extract(&self, tree: &tree_sitter::Tree, source: &str) -> ParseOutput {
        let mut out = ParseOutput::default();
        let mut scope = Vec::new();
        walk(tree.root_node(), source, &mut out, &mut scope);
        out
    }
}

fn walk(node: Node, source: &str, out: &mut ParseOutput, scope: &mut Vec<(String, usize)>) {
    let mut pushed = false;

    match node.kind() {
        "function_definition" => {
            if let Some(idx) = extract_function(node, source, out, scope) {
                scope.push((out.symbols[idx].name.clone(), idx));
                pushed = true;
            }
        }
        "class_definition" => {
            if let Some(idx) = extract_class(node, source, out, scope) {
                scope.push((out.symbols[idx].name.clone(), idx));
                pushed = true;
            }
        }
        "import_statement" => {
            extract_import(node, source, out);
            return;
        }
        "import_from_statement" => {
            extract_from_import(node, source, out);
            return;
        }
        "call" => {
            if let Some(function) = node.child_by_field_name("function") {
                out.callsites.push(ParsedCallsite {
                    callee_text: node_text(function, source).to_string(),
                    line: line_of(node),
                    column: node.start_position().column as u32,
                    scope: scope.last().map(|(_, idx)| *idx),
                });
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, out, scope);
    }

    if pushed {
        scope.pop();
    }
}

fn extract_function(
    node: Node,
    source: &str,
    out: &mut ParseOutput,
    scope: &[(String, usize)],
) -> Option<usize> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source).to_string();

    // A def directly inside a class is a method.
    let kind = match scope.last().map(|(_, idx)| out.symbols[*idx].kind) {
        Some(SymbolKind::Class) => SymbolKind::Method,
        _ => SymbolKind::Function,
    };

    let names: Vec<String> = scope.iter().map(|(n, _)| n.clone()).collect();
    let symbol = ParsedSymbol {
        qualified_name: qualify(&names, &name, "."),
        visibility: visibility_of(&name),
        kind,
        line_start: line_of(node),
        line_end: node.end_position().row as u32 + 1,
        column_start: node.start_position().column as u32,
        column_end: node.end_position().column as u32,
        signature: signature_before_body(node, "body", source),
        docstring: extract_docstring(node, source),
        parent: scope.last().map(|(_, idx)| *idx),
        bases: Vec::new(),
        name,
    };
    out.symbols.push(symbol);
    Some(out.symbols.len() - 1)
}

fn extract_class(
    node: Node,
    source: &str,
    out: &mut ParseOutput,
    scope: &[(String, usize)],
) -> Option<usize> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source).to_string();

    let mut bases = Vec::new();
    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        let mut cursor = superclasses.walk();
        for child in superclasses.children(&mut cursor) {
            if matches!(child.kind(), "identifier" | "attribute") {
                bases.push(node_text(child, source).to_string());
            }
        }
    }

    let names: Vec<String> = scope.iter().map(|(n, _)| n.clone()).collect();
    let symbol = ParsedSymbol {
        qualified_name: qualify(&names, &name, "."),
        visibility: visibility_of(&name),
        kind: SymbolKind::Class,
        line_start: line_of(node),
        line_end: node.end_position().row as u32 + 1,
        column_start: node.start_position().column as u32,
        column_end: node.end_position().column as u32,
        signature: signature_before_body(node, "body", source),
        docstring: extract_docstring(node, source),
        parent: scope.last().map(|(_, idx)| *idx),
        bases,
        name,
    };
    out.symbols.push(symbol);
    Some(out.symbols.len() - 1)
}

/// Docstring: first statement of the body when it is a bare string literal.
fn extract_docstring(node: Node, source: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let raw = node_text(string, source);
    let cleaned = raw
        .trim_start_matches(|c| c == 'r' || c == 'b' || c == 'u' || c == 'f')
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn visibility_of(name: &str) -> Visibility {
    if name.starts_with('_') && !name.starts_with("__init__") {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

/// `import a.b`, `import a.b as c`
fn extract_import(node: Node, source: &str, out: &mut ParseOutput) {
    let raw = node_text(node, source).to_string();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "dotted_name" => out.imports.push(ParsedImport {
                module: node_text(child, source).to_string(),
                name: None,
                alias: None,
                line: line_of(node),
                raw: raw.clone(),
                resolved_path: None,
            }),
            "aliased_import" => {
                let module = child
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source).to_string())
                    .unwrap_or_default();
                let alias = child
                    .child_by_field_name("alias")
                    .map(|n| node_text(n, source).to_string());
                out.imports.push(ParsedImport {
                    module,
                    name: None,
                    alias,
                    line: line_of(node),
                    raw: raw.clone(),
                    resolved_path: None,
                });
            }
            _ => {}
        }
    }
}

/// `from a.b import c`, `from . import d as e`
fn extract_from_import(node: Node, source: &str, out: &mut ParseOutput) {
    let raw = node_text(node, source).to_string();
    let module = node
        .child_by_field_name("module_name")
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_default();

    let mut cursor = node.walk();
    for child in node.children_by_field_name("name", &mut cursor) {
        match child.kind() {
            "dotted_name" => out.imports.push(ParsedImport {
                module: module.clone(),
                name: Some(node_text(child, source).to_string()),
                alias: None,
                line: line_of(node),
                raw: raw.clone(),
                resolved_path: None,
            }),
            "aliased_import" => {
                let name = child
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source).to_string());
                let alias = child
                    .child_by_field_name("alias")
                    .map(|n| node_text(n, source).to_string());
                out.imports.push(ParsedImport {
                    module: module.clone(),
                    name,
                    alias,
                    line: line_of(node),
                    raw: raw.clone(),
                    resolved_path: None,
                });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserFacade;
    use std::time::Duration;

    fn parse(source: &str) -> ParseOutput {
        ParserFacade::new(Duration::from_secs(5))
            .parse(Language::Python, source, "test.py")
            .unwrap()
    }

    #[test]
    fn test_functions_and_calls() {
        let out = parse("def foo():\n    pass\n\ndef bar():\n    foo()\n");
        assert_eq!(out.symbols.len(), 2);
        assert_eq!(out.symbols[0].name, "foo");
        assert_eq!(out.symbols[1].name, "bar");
        assert_eq!(out.callsites.len(), 1);
        assert_eq!(out.callsites[0].callee_text, "foo");
        // the call inside bar is scoped to bar
        assert_eq!(out.callsites[0].scope, Some(1));
    }

    #[test]
    fn test_method_kind_and_qualified_name() {
        let out = parse("class A:\n    def run(self):\n        pass\n");
        assert_eq!(out.symbols[0].kind, SymbolKind::Class);
        assert_eq!(out.symbols[1].kind, SymbolKind::Method);
        assert_eq!(out.symbols[1].qualified_name, "A.run");
        assert_eq!(out.symbols[1].parent, Some(0));
    }

    #[test]
    fn test_docstring() {
        let out = parse("def foo():\n    \"\"\"Does a thing.\"\"\"\n    pass\n");
        assert_eq!(out.symbols[0].docstring.as_deref(), Some("Does a thing."));
    }

    #[test]
    fn test_signature_with_annotations() {
        let out = parse("def foo(a: int, b: str = \"x\") -> bool:\n    return True\n");
        let sig = out.symbols[0].signature.as_deref().unwrap();
        assert!(sig.contains("a: int"));
        assert!(sig.contains("-> bool"));
    }

    #[test]
    fn test_imports() {
        let out = parse("import os.path\nfrom sys import argv as args\n");
        assert_eq!(out.imports.len(), 2);
        assert_eq!(out.imports[0].module, "os.path");
        assert_eq!(out.imports[1].module, "sys");
        assert_eq!(out.imports[1].name.as_deref(), Some("argv"));
        assert_eq!(out.imports[1].alias.as_deref(), Some("args"));
        assert_eq!(out.imports[1].binding(), "args");
    }

    #[test]
    fn test_class_bases() {
        let out = parse("class B(A):\n    pass\n");
        assert_eq!(out.symbols[0].bases, vec!["A".to_string()]);
    }

    #[test]
    fn test_private_visibility() {
        let out = parse("def _hidden():\n    pass\n");
        assert_eq!(out.symbols[0].visibility, Visibility::Private);
    }

    #[test]
    fn test_qualified_callee_preserved() {
        let out = parse("import m\n\ndef go():\n    m.foo()\n");
        assert_eq!(out.callsites[0].callee_text, "m.foo");
    }
}

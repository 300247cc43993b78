// Go extraction: functions, methods, types, imports, calls

use tree_sitter::Node;

use super::{
    line_of, node_text, signature_before_body, Language, LanguageParser, ParseOutput,
    ParsedCallsite, ParsedImport, ParsedSymbol,
};
use crate::store::{SymbolKind, Visibility};

pub struct GoParser;

impl LanguageParser for GoParser {
    fn language(&self) -> Language {
        Language::Go
    }

    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_go::LANGUAGE.into()
    }

    fn extract(&self, tree: &tree_sitter::Tree, source: &str) -> ParseOutput {
        let mut out = ParseOutput::default();
        walk(tree.root_node(), source, &mut out, None);
        out
    }
}

fn walk(node: Node, source: &str, out: &mut ParseOutput, current: Option<usize>) {
    let mut scope = current;

    match node.kind() {
        "function_declaration" => {
            if let Some(idx) = extract_function(node, source, out, SymbolKind::Function, None) {
                scope = Some(idx);
            }
        }
        "method_declaration" => {
            let receiver = node
                .child_by_field_name("receiver")
                .map(|r| receiver_type(r, source));
            if let Some(idx) = extract_function(node, source, out, SymbolKind::Method, receiver) {
                scope = Some(idx);
            }
        }
        "type_declaration" => {
            extract_types(node, source, out);
        }
        "const_declaration" | "var_declaration" => {
            extract_values(node, source, out);
        }
        "import_declaration" => {
            extract_imports(node, source, out);
            return;
        }
        "call_expression" => {
            if let Some(function) = node.child_by_field_name("function") {
                out.callsites.push(ParsedCallsite {
                    callee_text: node_text(function, source).to_string(),
                    line: line_of(node),
                    column: node.start_position().column as u32,
                    scope,
                });
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, out, scope);
    }
}

/// Go visibility follows capitalization.
fn visibility_of(name: &str) -> Visibility {
    if name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

fn receiver_type(receiver: Node, source: &str) -> String {
    // (s *Server) -> Server
    node_text(receiver, source)
        .trim_matches(|c| c == '(' || c == ')')
        .rsplit(|c: char| c.is_whitespace() || c == '*')
        .next()
        .unwrap_or("")
        .to_string()
}

fn extract_function(
    node: Node,
    source: &str,
    out: &mut ParseOutput,
    kind: SymbolKind,
    receiver: Option<String>,
) -> Option<usize> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source).to_string();
    let qualified_name = match &receiver {
        Some(r) if !r.is_empty() => format!("{r}.{name}"),
        _ => name.clone(),
    };

    out.symbols.push(ParsedSymbol {
        qualified_name,
        kind,
        visibility: visibility_of(&name),
        line_start: line_of(node),
        line_end: node.end_position().row as u32 + 1,
        column_start: node.start_position().column as u32,
        column_end: node.end_position().column as u32,
        signature: signature_before_body(node, "body", source),
        docstring: leading_comment(node, source),
        parent: None,
        bases: Vec::new(),
        name,
    });
    Some(out.symbols.len() - 1)
}

fn extract_types(node: Node, source: &str, out: &mut ParseOutput) {
    let mut cursor = node.walk();
    for spec in node.children(&mut cursor) {
        if spec.kind() != "type_spec" {
            continue;
        }
        let Some(name_node) = spec.child_by_field_name("name") else {
            continue;
        };
        let name = node_text(name_node, source).to_string();
        let kind = match spec.child_by_field_name("type").map(|t| t.kind()) {
            Some("struct_type") => SymbolKind::Struct,
            Some("interface_type") => SymbolKind::Interface,
            _ => SymbolKind::Struct,
        };

        out.symbols.push(ParsedSymbol {
            qualified_name: name.clone(),
            kind,
            visibility: visibility_of(&name),
            line_start: line_of(spec),
            line_end: spec.end_position().row as u32 + 1,
            column_start: spec.start_position().column as u32,
            column_end: spec.end_position().column as u32,
            signature: None,
            docstring: leading_comment(node, source),
            parent: None,
            bases: Vec::new(),
            name,
        });
    }
}

/// Top-level const/var specs become variable symbols.
fn extract_values(node: Node, source: &str, out: &mut ParseOutput) {
    if node.parent().map(|p| p.kind()) != Some("source_file") {
        return;
    }
    let mut cursor = node.walk();
    for spec in node.children(&mut cursor) {
        if !matches!(spec.kind(), "const_spec" | "var_spec") {
            continue;
        }
        let mut inner = spec.walk();
        for child in spec.children(&mut inner) {
            if child.kind() != "identifier" {
                continue;
            }
            let name = node_text(child, source).to_string();
            out.symbols.push(ParsedSymbol {
                qualified_name: name.clone(),
                kind: SymbolKind::Variable,
                visibility: visibility_of(&name),
                line_start: line_of(child),
                line_end: line_of(child),
                column_start: child.start_position().column as u32,
                column_end: child.end_position().column as u32,
                signature: None,
                docstring: None,
                parent: None,
                bases: Vec::new(),
                name,
            });
        }
    }
}

/// `import "x"`, `import alias "x"`, and grouped import blocks.
fn extract_imports(node: Node, source: &str, out: &mut ParseOutput) {
    let raw = node_text(node, source).to_string();
    let mut specs = Vec::new();
    collect_import_specs(node, &mut specs);

    for spec in specs {
        let Some(path_node) = spec.child_by_field_name("path") else {
            continue;
        };
        let module = node_text(path_node, source)
            .trim_matches(|c| c == '"' || c == '`')
            .to_string();
        let alias = spec
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string());
        out.imports.push(ParsedImport {
            module,
            name: None,
            alias,
            line: line_of(spec),
            raw: raw.clone(),
            resolved_path: None,
        });
    }
}

fn collect_import_specs<'a>(node: Node<'a>, specs: &mut Vec<Node<'a>>) {
    if node.kind() == "import_spec" {
        specs.push(node);
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_import_specs(child, specs);
    }
}

/// Contiguous `//` comment block immediately above the declaration.
fn leading_comment(node: Node, source: &str) -> Option<String> {
    let mut lines = Vec::new();
    let mut prev = node.prev_sibling();
    let mut expected_row = node.start_position().row;

    while let Some(sibling) = prev {
        if sibling.kind() != "comment" || sibling.end_position().row + 1 != expected_row {
            break;
        }
        let text = node_text(sibling, source)
            .trim_start_matches("//")
            .trim()
            .to_string();
        lines.push(text);
        expected_row = sibling.start_position().row;
        prev = sibling.prev_sibling();
    }

    if lines.is_empty() {
        None
    } else {
        lines.reverse();
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserFacade;
    use std::time::Duration;

    fn parse(source: &str) -> ParseOutput {
        ParserFacade::new(Duration::from_secs(5))
            .parse(Language::Go, source, "test.go")
            .unwrap()
    }

    #[test]
    fn test_function_visibility() {
        let out = parse("package p\n\nfunc Exported() {}\n\nfunc hidden() {}\n");
        let pub_fn = out.symbols.iter().find(|s| s.name == "Exported").unwrap();
        let priv_fn = out.symbols.iter().find(|s| s.name == "hidden").unwrap();
        assert_eq!(pub_fn.visibility, Visibility::Public);
        assert_eq!(priv_fn.visibility, Visibility::Private);
    }

    #[test]
    fn test_method_receiver() {
        let out = parse("package p\n\ntype Server struct{}\n\nfunc (s *Server) Run() {}\n");
        let method = out.symbols.iter().find(|s| s.name == "Run").unwrap();
        assert_eq!(method.kind, SymbolKind::Method);
        assert_eq!(method.qualified_name, "Server.Run");
        let st = out.symbols.iter().find(|s| s.name == "Server").unwrap();
        assert_eq!(st.kind, SymbolKind::Struct);
    }

    #[test]
    fn test_imports_grouped() {
        let out = parse("package p\n\nimport (\n\t\"fmt\"\n\tlog \"mylog\"\n)\n");
        assert_eq!(out.imports.len(), 2);
        assert_eq!(out.imports[0].module, "fmt");
        assert_eq!(out.imports[1].module, "mylog");
        assert_eq!(out.imports[1].binding(), "log");
    }

    #[test]
    fn test_call_and_scope() {
        let out = parse("package p\n\nfunc a() {}\n\nfunc b() {\n\ta()\n\tfmt.Println(1)\n}\n");
        let callees: Vec<&str> = out
            .callsites
            .iter()
            .map(|c| c.callee_text.as_str())
            .collect();
        assert!(callees.contains(&"a"));
        assert!(callees.contains(&"fmt.Println"));
    }

    #[test]
    fn test_doc_comment() {
        let out = parse("package p\n\n// Run starts the server.\n// It blocks.\nfunc Run() {}\n");
        let doc = out.symbols[0].docstring.as_deref().unwrap();
        assert!(doc.contains("Run starts the server."));
        assert!(doc.contains("It blocks."));
    }
}

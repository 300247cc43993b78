// Rust extraction: items, impl scoping, use declarations, calls

use tree_sitter::Node;

use super::{
    line_of, node_text, qualify, signature_before_body, Language, LanguageParser, ParseOutput,
    ParsedCallsite, ParsedImport, ParsedSymbol,
};
use crate::store::{SymbolKind, Visibility};

pub struct RustParser;

impl LanguageParser for RustParser {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn extract(&self, tree: &tree_sitter::Tree, source: &str) -> ParseOutput {
        let mut out = ParseOutput::default();
        let mut scope = Vec::new();
        walk(tree.root_node(), source, &mut out, &mut scope);
        out
    }
}

/// Scope frames: named symbols (fn/mod) carry their output index; impl
/// blocks contribute a name only, so methods qualify as `Type::method`.
#[derive(Clone)]
struct Frame {
    name: String,
    symbol: Option<usize>,
}

fn walk(node: Node, source: &str, out: &mut ParseOutput, scope: &mut Vec<Frame>) {
    let mut pushed = false;

    match node.kind() {
        "function_item" => {
            let in_impl = scope.iter().any(|f| f.symbol.is_none());
            let kind = if in_impl {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            };
            if let Some(idx) = extract_item(node, source, out, scope, kind, "body") {
                scope.push(Frame {
                    name: out.symbols[idx].name.clone(),
                    symbol: Some(idx),
                });
                pushed = true;
            }
        }
        "struct_item" => {
            extract_item(node, source, out, scope, SymbolKind::Struct, "body");
        }
        "enum_item" => {
            extract_item(node, source, out, scope, SymbolKind::Enum, "body");
        }
        "trait_item" => {
            if let Some(idx) = extract_item(node, source, out, scope, SymbolKind::Interface, "body")
            {
                scope.push(Frame {
                    name: out.symbols[idx].name.clone(),
                    symbol: Some(idx),
                });
                pushed = true;
            }
        }
        "mod_item" => {
            if let Some(idx) = extract_item(node, source, out, scope, SymbolKind::Module, "body") {
                scope.push(Frame {
                    name: out.symbols[idx].name.clone(),
                    symbol: Some(idx),
                });
                pushed = true;
            }
        }
        "const_item" | "static_item" => {
            extract_item(node, source, out, scope, SymbolKind::Variable, "value");
        }
        "impl_item" => {
            if let Some(type_node) = node.child_by_field_name("type") {
                scope.push(Frame {
                    name: node_text(type_node, source).to_string(),
                    symbol: None,
                });
                pushed = true;
            }
        }
        "use_declaration" => {
            extract_use(node, source, out);
            return;
        }
        "call_expression" => {
            if let Some(function) = node.child_by_field_name("function") {
                out.callsites.push(ParsedCallsite {
                    callee_text: node_text(function, source).to_string(),
                    line: line_of(node),
                    column: node.start_position().column as u32,
                    scope: scope.iter().rev().find_map(|f| f.symbol),
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

fn extract_item(
    node: Node,
    source: &str,
    out: &mut ParseOutput,
    scope: &[Frame],
    kind: SymbolKind,
    body_field: &str,
) -> Option<usize> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source).to_string();
    let names: Vec<String> = scope.iter().map(|f| f.name.clone()).collect();

    let is_pub = {
        let mut cursor = node.walk();
        let has_pub = node
            .children(&mut cursor)
            .any(|c| c.kind() == "visibility_modifier");
        has_pub
    };

    out.symbols.push(ParsedSymbol {
        qualified_name: qualify(&names, &name, "::"),
        kind,
        visibility: if is_pub {
            Visibility::Public
        } else {
            Visibility::Private
        },
        line_start: line_of(node),
        line_end: node.end_position().row as u32 + 1,
        column_start: node.start_position().column as u32,
        column_end: node.end_position().column as u32,
        signature: signature_before_body(node, body_field, source),
        docstring: doc_comments(node, source),
        parent: scope.iter().rev().find_map(|f| f.symbol),
        bases: Vec::new(),
        name,
    });
    Some(out.symbols.len() - 1)
}

/// `use a::b::C;` and `use a::b as c;`; glob and list imports keep raw text.
fn extract_use(node: Node, source: &str, out: &mut ParseOutput) {
    let raw = node_text(node, source).to_string();
    let Some(argument) = node.child_by_field_name("argument") else {
        return;
    };

    match argument.kind() {
        "use_as_clause" => {
            let module = argument
                .child_by_field_name("path")
                .map(|n| node_text(n, source).to_string())
                .unwrap_or_default();
            let alias = argument
                .child_by_field_name("alias")
                .map(|n| node_text(n, source).to_string());
            out.imports.push(ParsedImport {
                module,
                name: None,
                alias,
                line: line_of(node),
                raw,
                resolved_path: None,
            });
        }
        _ => {
            let module = node_text(argument, source).to_string();
            out.imports.push(ParsedImport {
                module,
                name: None,
                alias: None,
                line: line_of(node),
                raw,
                resolved_path: None,
            });
        }
    }
}

/// Contiguous `///` doc comments immediately above the item.
fn doc_comments(node: Node, source: &str) -> Option<String> {
    let mut lines = Vec::new();
    let mut prev = node.prev_sibling();
    let mut expected_row = node.start_position().row;

    while let Some(sibling) = prev {
        let is_doc = matches!(sibling.kind(), "line_comment" | "doc_comment")
            && node_text(sibling, source).starts_with("///");
        // Attributes may sit between docs and the item.
        if sibling.kind() == "attribute_item" {
            expected_row = sibling.start_position().row;
            prev = sibling.prev_sibling();
            continue;
        }
        if !is_doc || sibling.end_position().row + 1 != expected_row {
            break;
        }
        lines.push(
            node_text(sibling, source)
                .trim_start_matches("///")
                .trim()
                .to_string(),
        );
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
            .parse(Language::Rust, source, "test.rs")
            .unwrap()
    }

    #[test]
    fn test_function_visibility() {
        let out = parse("pub fn open() {}\nfn helper() {}\n");
        let public = out.symbols.iter().find(|s| s.name == "open").unwrap();
        let private = out.symbols.iter().find(|s| s.name == "helper").unwrap();
        assert_eq!(public.visibility, Visibility::Public);
        assert_eq!(private.visibility, Visibility::Private);
    }

    #[test]
    fn test_impl_methods_qualify_with_type() {
        let out = parse("struct Store;\n\nimpl Store {\n    pub fn get(&self) {}\n}\n");
        let method = out.symbols.iter().find(|s| s.name == "get").unwrap();
        assert_eq!(method.kind, SymbolKind::Method);
        assert_eq!(method.qualified_name, "Store::get");
    }

    #[test]
    fn test_item_kinds() {
        let out = parse(
            "pub struct A;\npub enum B { X }\npub trait C {}\nmod d {}\nconst E: u8 = 1;\n",
        );
        let kind_of = |name: &str| out.symbols.iter().find(|s| s.name == name).unwrap().kind;
        assert_eq!(kind_of("A"), SymbolKind::Struct);
        assert_eq!(kind_of("B"), SymbolKind::Enum);
        assert_eq!(kind_of("C"), SymbolKind::Interface);
        assert_eq!(kind_of("d"), SymbolKind::Module);
        assert_eq!(kind_of("E"), SymbolKind::Variable);
    }

    #[test]
    fn test_use_declarations() {
        let out = parse("use std::collections::HashMap;\nuse crate::store as db;\n");
        assert_eq!(out.imports.len(), 2);
        assert_eq!(out.imports[0].module, "std::collections::HashMap");
        assert_eq!(out.imports[0].binding(), "HashMap");
        assert_eq!(out.imports[1].binding(), "db");
    }

    #[test]
    fn test_calls_preserve_qualification() {
        let out = parse("fn run() {\n    helper();\n    store::open();\n    conn.query();\n}\n");
        let callees: Vec<&str> = out
            .callsites
            .iter()
            .map(|c| c.callee_text.as_str())
            .collect();
        assert!(callees.contains(&"helper"));
        assert!(callees.contains(&"store::open"));
        assert!(callees.contains(&"conn.query"));
    }

    #[test]
    fn test_doc_comments() {
        let out = parse("/// Opens the store.\n/// Creates it when missing.\npub fn open() {}\n");
        let doc = out.symbols[0].docstring.as_deref().unwrap();
        assert!(doc.contains("Opens the store."));
    }
}

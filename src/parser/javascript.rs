// JavaScript / TypeScript extraction (ESM, CommonJS require, classes)

use tree_sitter::Node;

use super::{
    line_of, node_text, qualify, signature_before_body, Language, LanguageParser, ParseOutput,
    ParsedCallsite, ParsedImport, ParsedSymbol,
};
use crate::store::{SymbolKind, Visibility};

/// One adapter serves both JavaScript and TypeScript; the grammars share
/// their statement shapes and TypeScript adds interface/enum declarations.
pub struct EcmaParser {
    language: Language,
}

impl EcmaParser {
    pub fn new(language: Language) -> Self {
        Self { language }
    }
}

impl LanguageParser for EcmaParser {
    fn language(&self) -> Language {
        self.language
    }

    fn grammar(&self) -> tree_sitter::Language {
        match self.language {
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            _ => tree_sitter_javascript::LANGUAGE.into(),
        }
    }

    fn extract(&self, tree: &tree_sitter::Tree, source: &str) -> ParseOutput {
        let mut out = ParseOutput::default();
        let mut scope = Vec::new();
        walk(tree.root_node(), source, &mut out, &mut scope, false);
        out
    }
}

fn walk(
    node: Node,
    source: &str,
    out: &mut ParseOutput,
    scope: &mut Vec<(String, usize)>,
    exported: bool,
) {
    let mut pushed = false;

    match node.kind() {
        "export_statement" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                walk(child, source, out, scope, true);
            }
            return;
        }
        "function_declaration" | "generator_function_declaration" => {
            if let Some(idx) = push_symbol(node, source, out, scope, SymbolKind::Function, exported)
            {
                scope.push((out.symbols[idx].name.clone(), idx));
                pushed = true;
            }
        }
        "method_definition" => {
            if let Some(idx) = push_symbol(node, source, out, scope, SymbolKind::Method, exported) {
                scope.push((out.symbols[idx].name.clone(), idx));
                pushed = true;
            }
        }
        "class_declaration" => {
            if let Some(idx) = extract_class(node, source, out, scope, exported) {
                scope.push((out.symbols[idx].name.clone(), idx));
                pushed = true;
            }
        }
        "interface_declaration" => {
            if let Some(idx) = push_symbol(node, source, out, scope, SymbolKind::Interface, exported)
            {
                scope.push((out.symbols[idx].name.clone(), idx));
                pushed = true;
            }
        }
        "enum_declaration" => {
            push_symbol(node, source, out, scope, SymbolKind::Enum, exported);
        }
        "variable_declarator" => {
            extract_declarator(node, source, out, scope, exported);
        }
        "import_statement" => {
            extract_import(node, source, out);
            return;
        }
        "call_expression" => {
            if let Some(function) = node.child_by_field_name("function") {
                let callee = node_text(function, source);
                // require() is import plumbing, handled at the declarator.
                if callee != "require" {
                    out.callsites.push(ParsedCallsite {
                        callee_text: callee.to_string(),
                        line: line_of(node),
                        column: node.start_position().column as u32,
                        scope: scope.last().map(|(_, idx)| *idx),
                    });
                }
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, out, scope, exported);
    }

    if pushed {
        scope.pop();
    }
}

fn push_symbol(
    node: Node,
    source: &str,
    out: &mut ParseOutput,
    scope: &[(String, usize)],
    kind: SymbolKind,
    exported: bool,
) -> Option<usize> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source).to_string();
    let names: Vec<String> = scope.iter().map(|(n, _)| n.clone()).collect();

    out.symbols.push(ParsedSymbol {
        qualified_name: qualify(&names, &name, "."),
        kind,
        visibility: if exported || kind == SymbolKind::Method {
            Visibility::Public
        } else {
            Visibility::Private
        },
        line_start: line_of(node),
        line_end: node.end_position().row as u32 + 1,
        column_start: node.start_position().column as u32,
        column_end: node.end_position().column as u32,
        signature: signature_before_body(node, "body", source),
        docstring: leading_jsdoc(node, source),
        parent: scope.last().map(|(_, idx)| *idx),
        bases: Vec::new(),
        name,
    });
    Some(out.symbols.len() - 1)
}

fn extract_class(
    node: Node,
    source: &str,
    out: &mut ParseOutput,
    scope: &[(String, usize)],
    exported: bool,
) -> Option<usize> {
    let idx = push_symbol(node, source, out, scope, SymbolKind::Class, exported)?;

    // `class B extends A` / `class B extends ns.A`
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "class_heritage" {
            let mut inner = child.walk();
            for heritage in child.children(&mut inner) {
                if matches!(heritage.kind(), "identifier" | "member_expression") {
                    let base = node_text(heritage, source).to_string();
                    out.symbols[idx].bases.push(base);
                }
            }
        }
    }
    Some(idx)
}

/// `const foo = () => {}` and `const m = require('./m')`
fn extract_declarator(
    node: Node,
    source: &str,
    out: &mut ParseOutput,
    scope: &[(String, usize)],
    exported: bool,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    if name_node.kind() != "identifier" {
        return;
    }
    let name = node_text(name_node, source).to_string();
    let Some(value) = node.child_by_field_name("value") else {
        return;
    };

    match value.kind() {
        "arrow_function" | "function_expression" | "function" => {
            let names: Vec<String> = scope.iter().map(|(n, _)| n.clone()).collect();
            out.symbols.push(ParsedSymbol {
                qualified_name: qualify(&names, &name, "."),
                kind: SymbolKind::Function,
                visibility: if exported {
                    Visibility::Public
                } else {
                    Visibility::Private
                },
                line_start: line_of(node),
                line_end: value.end_position().row as u32 + 1,
                column_start: node.start_position().column as u32,
                column_end: value.end_position().column as u32,
                signature: value
                    .child_by_field_name("parameters")
                    .map(|p| format!("{} = {}", name, node_text(p, source))),
                docstring: leading_jsdoc(node, source),
                parent: scope.last().map(|(_, idx)| *idx),
                bases: Vec::new(),
                name,
            });
        }
        "call_expression" => {
            // CommonJS: const m = require('./m')
            let is_require = value
                .child_by_field_name("function")
                .map(|f| node_text(f, source) == "require")
                .unwrap_or(false);
            if is_require {
                if let Some(module) = first_string_argument(value, source) {
                    out.imports.push(ParsedImport {
                        module,
                        name: None,
                        alias: Some(name),
                        line: line_of(node),
                        raw: node_text(node, source).to_string(),
                        resolved_path: None,
                    });
                }
            }
        }
        _ => {}
    }
}

fn first_string_argument(call: Node, source: &str) -> Option<String> {
    let args = call.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    for child in args.children(&mut cursor) {
        if child.kind() == "string" {
            return Some(strip_quotes(node_text(child, source)));
        }
    }
    None
}

fn strip_quotes(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

/// `import d, { a, b as c } from './m'` and `import * as ns from './m'`
fn extract_import(node: Node, source: &str, out: &mut ParseOutput) {
    let raw = node_text(node, source).to_string();
    let Some(source_node) = node.child_by_field_name("source") else {
        return;
    };
    let module = strip_quotes(node_text(source_node, source));
    let line = line_of(node);
    let mut any = false;

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "import_clause" {
            continue;
        }
        let mut inner = child.walk();
        for clause in child.children(&mut inner) {
            match clause.kind() {
                "identifier" => {
                    out.imports.push(ParsedImport {
                        module: module.clone(),
                        name: Some("default".to_string()),
                        alias: Some(node_text(clause, source).to_string()),
                        line,
                        raw: raw.clone(),
                        resolved_path: None,
                    });
                    any = true;
                }
                "namespace_import" => {
                    let alias = clause
                        .named_child(0)
                        .map(|n| node_text(n, source).to_string());
                    out.imports.push(ParsedImport {
                        module: module.clone(),
                        name: None,
                        alias,
                        line,
                        raw: raw.clone(),
                        resolved_path: None,
                    });
                    any = true;
                }
                "named_imports" => {
                    let mut spec_cursor = clause.walk();
                    for spec in clause.children(&mut spec_cursor) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let name = spec
                            .child_by_field_name("name")
                            .map(|n| node_text(n, source).to_string());
                        let alias = spec
                            .child_by_field_name("alias")
                            .map(|n| node_text(n, source).to_string());
                        out.imports.push(ParsedImport {
                            module: module.clone(),
                            name,
                            alias,
                            line,
                            raw: raw.clone(),
                            resolved_path: None,
                        });
                        any = true;
                    }
                }
                _ => {}
            }
        }
    }

    // Bare side-effect import: `import './polyfill'`
    if !any {
        out.imports.push(ParsedImport {
            module,
            name: None,
            alias: None,
            line,
            raw,
            resolved_path: None,
        });
    }
}

/// Leading `/** ... */` comment, stripped of comment markers.
fn leading_jsdoc(node: Node, source: &str) -> Option<String> {
    let mut prev = node.prev_sibling();
    // The declarator sits inside a declaration; look above the statement.
    if prev.is_none() {
        prev = node.parent().and_then(|p| p.prev_sibling());
    }
    let comment = prev?;
    if comment.kind() != "comment" {
        return None;
    }
    let text = node_text(comment, source);
    if !text.starts_with("/**") {
        return None;
    }
    let cleaned: Vec<String> = text
        .trim_start_matches("/**")
        .trim_end_matches("*/")
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserFacade;
    use std::time::Duration;

    fn parse(source: &str) -> ParseOutput {
        ParserFacade::new(Duration::from_secs(5))
            .parse(Language::JavaScript, source, "test.js")
            .unwrap()
    }

    #[test]
    fn test_function_and_call() {
        let out = parse("function foo() {}\nfunction bar() { foo(); }\n");
        assert_eq!(out.symbols.len(), 2);
        assert_eq!(out.callsites.len(), 1);
        assert_eq!(out.callsites[0].callee_text, "foo");
    }

    #[test]
    fn test_require_is_import_not_callsite() {
        let out = parse("const m = require('./m');\nm.foo();\n");
        assert_eq!(out.imports.len(), 1);
        assert_eq!(out.imports[0].module, "./m");
        assert_eq!(out.imports[0].binding(), "m");
        assert_eq!(out.callsites.len(), 1);
        assert_eq!(out.callsites[0].callee_text, "m.foo");
    }

    #[test]
    fn test_esm_imports() {
        let out = parse("import def, { a, b as c } from './lib';\nimport * as ns from './ns';\n");
        let bindings: Vec<&str> = out.imports.iter().map(|i| i.binding()).collect();
        assert!(bindings.contains(&"def"));
        assert!(bindings.contains(&"a"));
        assert!(bindings.contains(&"c"));
        assert!(bindings.contains(&"ns"));
    }

    #[test]
    fn test_export_visibility() {
        let out = parse("export function pub() {}\nfunction priv() {}\n");
        let public = out.symbols.iter().find(|s| s.name == "pub").unwrap();
        let private = out.symbols.iter().find(|s| s.name == "priv").unwrap();
        assert_eq!(public.visibility, Visibility::Public);
        assert_eq!(private.visibility, Visibility::Private);
    }

    #[test]
    fn test_class_with_method_and_base() {
        let out = parse("class B extends A {\n  run() { return 1; }\n}\n");
        let class = out.symbols.iter().find(|s| s.name == "B").unwrap();
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.bases, vec!["A".to_string()]);
        let method = out.symbols.iter().find(|s| s.name == "run").unwrap();
        assert_eq!(method.kind, SymbolKind::Method);
        assert_eq!(method.qualified_name, "B.run");
    }

    #[test]
    fn test_arrow_function_symbol() {
        let out = parse("const handler = (req, res) => { res.end(); };\n");
        let sym = out.symbols.iter().find(|s| s.name == "handler").unwrap();
        assert_eq!(sym.kind, SymbolKind::Function);
    }

    #[test]
    fn test_typescript_interface() {
        let out = ParserFacade::new(Duration::from_secs(5))
            .parse(
                Language::TypeScript,
                "export interface Shape { area(): number; }\n",
                "test.ts",
            )
            .unwrap();
        let sym = out.symbols.iter().find(|s| s.name == "Shape").unwrap();
        assert_eq!(sym.kind, SymbolKind::Interface);
    }
}

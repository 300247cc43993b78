// Parser facade: per-language tree-sitter parsing behind one contract

pub mod go;
pub mod javascript;
pub mod python;
pub mod rust;

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::store::{SymbolKind, Visibility};

/// Languages the engine understands. C and C++ are classified at file
/// level only; their files get File rows but no symbol extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Go,
    Rust,
    C,
    Cpp,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "python" => Some(Language::Python),
            "javascript" => Some(Language::JavaScript),
            "typescript" => Some(Language::TypeScript),
            "go" => Some(Language::Go),
            "rust" => Some(Language::Rust),
            "c" => Some(Language::C),
            "cpp" | "c++" => Some(Language::Cpp),
            _ => None,
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "pyi"],
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::TypeScript => &["ts", "tsx", "mts"],
            Language::Go => &["go"],
            Language::Rust => &["rs"],
            Language::C => &["c", "h"],
            Language::Cpp => &["cc", "cpp", "cxx", "hpp", "hh"],
        }
    }

    /// Extension-first classification with a user-overrideable map.
    pub fn from_extension(ext: &str, overrides: &HashMap<String, String>) -> Option<Self> {
        let dotted = format!(".{ext}");
        if let Some(name) = overrides.get(&dotted).or_else(|| overrides.get(ext)) {
            return Language::from_name(name);
        }
        for lang in Language::all() {
            if lang.extensions().contains(&ext) {
                return Some(*lang);
            }
        }
        None
    }

    pub fn all() -> &'static [Language] {
        &[
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::Go,
            Language::Rust,
            Language::C,
            Language::Cpp,
        ]
    }

    /// Whether symbol extraction is implemented for this language.
    pub fn has_symbol_support(&self) -> bool {
        !matches!(self, Language::C | Language::Cpp)
    }

    /// Separator used in qualified names.
    pub fn scope_separator(&self) -> &'static str {
        match self {
            Language::Rust => "::",
            _ => ".",
        }
    }
}

/// A symbol definition captured from source.
#[derive(Debug, Clone)]
pub struct ParsedSymbol {
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub visibility: Visibility,
    pub line_start: u32,
    pub line_end: u32,
    pub column_start: u32,
    pub column_end: u32,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    /// Index of the enclosing symbol within the same ParseOutput.
    pub parent: Option<usize>,
    /// Base class/interface names for INHERIT edges.
    pub bases: Vec<String>,
}

/// An import/use/include statement captured from source.
#[derive(Debug, Clone)]
pub struct ParsedImport {
    /// Raw module path text, e.g. `os.path`, `./m`, `crate::store`.
    pub module: String,
    /// Imported binding name, for `from X import Y` forms.
    pub name: Option<String>,
    /// Local alias, if any.
    pub alias: Option<String>,
    pub line: u32,
    pub raw: String,
    /// Repo-relative file this import maps to, when it resolves locally.
    /// Filled by the indexer against the discovered file set.
    pub resolved_path: Option<String>,
}

impl ParsedImport {
    /// The name this import binds in local scope.
    pub fn binding(&self) -> &str {
        if let Some(alias) = &self.alias {
            return alias;
        }
        if let Some(name) = &self.name {
            return name;
        }
        self.module
            .rsplit(['.', '/', ':'])
            .next()
            .unwrap_or(&self.module)
    }
}

/// A call occurrence. Edges are not emitted here; the resolver turns
/// callsites into candidate call edges later.
#[derive(Debug, Clone)]
pub struct ParsedCallsite {
    /// Callee expression with qualification preserved (`foo`, `obj.foo`).
    pub callee_text: String,
    pub line: u32,
    pub column: u32,
    /// Index of the innermost enclosing symbol, if any.
    pub scope: Option<usize>,
}

/// Uniform output of parsing one file.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub symbols: Vec<ParsedSymbol>,
    pub imports: Vec<ParsedImport>,
    pub callsites: Vec<ParsedCallsite>,
    /// Non-fatal diagnostics, e.g. error-recovery notes.
    pub errors: Vec<String>,
}

/// Per-language adapter: supplies the grammar and turns a parse tree into
/// the uniform capture stream.
pub trait LanguageParser: Send + Sync {
    fn language(&self) -> Language;
    fn grammar(&self) -> tree_sitter::Language;
    fn extract(&self, tree: &tree_sitter::Tree, source: &str) -> ParseOutput;
}

/// The facade owning one adapter per supported language.
pub struct ParserFacade {
    parsers: HashMap<Language, Box<dyn LanguageParser>>,
    timeout: Duration,
}

impl ParserFacade {
    pub fn new(timeout: Duration) -> Self {
        let mut parsers: HashMap<Language, Box<dyn LanguageParser>> = HashMap::new();
        parsers.insert(Language::Python, Box::new(python::PythonParser));
        parsers.insert(
            Language::JavaScript,
            Box::new(javascript::EcmaParser::new(Language::JavaScript)),
        );
        parsers.insert(
            Language::TypeScript,
            Box::new(javascript::EcmaParser::new(Language::TypeScript)),
        );
        parsers.insert(Language::Go, Box::new(go::GoParser));
        parsers.insert(Language::Rust, Box::new(rust::RustParser));
        Self { parsers, timeout }
    }

    /// Parse a file's source. Parse errors are non-fatal: an
    /// error-recovering tree still yields whatever symbols it exposes and
    /// the diagnostic is recorded in the output.
    pub fn parse(&self, language: Language, source: &str, path: &str) -> Result<ParseOutput> {
        let adapter = self
            .parsers
            .get(&language)
            .ok_or_else(|| EngineError::ParseFailure {
                path: path.to_string(),
                message: format!("no parser for language {}", language.as_str()),
            })?;

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&adapter.grammar())
            .map_err(|e| EngineError::ParseFailure {
                path: path.to_string(),
                message: format!("grammar load failed: {e}"),
            })?;
        // Soft timeout: tree-sitter returns None when exceeded.
        parser.set_timeout_micros(self.timeout.as_micros() as u64);

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| EngineError::ParseFailure {
                path: path.to_string(),
                message: "parse timed out or was interrupted".to_string(),
            })?;

        let mut output = adapter.extract(&tree, source);
        if tree.root_node().has_error() {
            output.errors.push(format!(
                "{path}: syntax errors; partial extraction ({} symbols)",
                output.symbols.len()
            ));
        }
        assign_scopes(&mut output);
        Ok(output)
    }
}

/// Assign each callsite to its innermost enclosing symbol by span.
fn assign_scopes(output: &mut ParseOutput) {
    for callsite in &mut output.callsites {
        if callsite.scope.is_some() {
            continue;
        }
        let mut best: Option<usize> = None;
        for (idx, symbol) in output.symbols.iter().enumerate() {
            if symbol.kind == SymbolKind::Import {
                continue;
            }
            if symbol.line_start <= callsite.line && symbol.line_end >= callsite.line {
                let better = match best {
                    None => true,
                    Some(prev) => output.symbols[prev].line_start < symbol.line_start,
                };
                if better {
                    best = Some(idx);
                }
            }
        }
        callsite.scope = best;
    }
}

pub(crate) fn node_text<'a>(node: tree_sitter::Node, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

pub(crate) fn line_of(node: tree_sitter::Node) -> u32 {
    node.start_position().row as u32 + 1
}

pub(crate) fn qualify(scope: &[String], name: &str, separator: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", scope.join(separator), separator, name)
    }
}

/// Verbatim declaration text from the node start up to its body, which is
/// how signatures (parameter list + return annotation) are captured.
pub(crate) fn signature_before_body(
    node: tree_sitter::Node,
    body_field: &str,
    source: &str,
) -> Option<String> {
    let body = node.child_by_field_name(body_field)?;
    let text = source.get(node.start_byte()..body.start_byte())?;
    let trimmed = text.trim().trim_end_matches(':').trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(collapse_whitespace(trimmed))
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_extension() {
        let overrides = HashMap::new();
        assert_eq!(
            Language::from_extension("py", &overrides),
            Some(Language::Python)
        );
        assert_eq!(
            Language::from_extension("tsx", &overrides),
            Some(Language::TypeScript)
        );
        assert_eq!(Language::from_extension("zig", &overrides), None);
    }

    #[test]
    fn test_language_override_map() {
        let mut overrides = HashMap::new();
        overrides.insert(".pyx".to_string(), "python".to_string());
        assert_eq!(
            Language::from_extension("pyx", &overrides),
            Some(Language::Python)
        );
    }

    #[test]
    fn test_c_has_no_symbol_support() {
        assert!(!Language::C.has_symbol_support());
        assert!(!Language::Cpp.has_symbol_support());
        assert!(Language::Python.has_symbol_support());
    }

    #[test]
    fn test_import_binding() {
        let import = ParsedImport {
            module: "os.path".into(),
            name: None,
            alias: None,
            line: 1,
            raw: "import os.path".into(),
            resolved_path: None,
        };
        assert_eq!(import.binding(), "path");

        let aliased = ParsedImport {
            module: "./m".into(),
            name: None,
            alias: Some("m".into()),
            line: 1,
            raw: "const m = require('./m')".into(),
            resolved_path: None,
        };
        assert_eq!(aliased.binding(), "m");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(
            collapse_whitespace("fn foo(\n    a: u32,\n) -> bool"),
            "fn foo( a: u32, ) -> bool"
        );
    }

    #[test]
    fn test_facade_parses_python() {
        let facade = ParserFacade::new(Duration::from_secs(5));
        let out = facade
            .parse(Language::Python, "def foo():\n    pass\n", "a.py")
            .unwrap();
        assert_eq!(out.symbols.len(), 1);
        assert_eq!(out.symbols[0].name, "foo");
    }
}

// Index storage: schema, persistence, full-text search

pub mod db;
pub mod schema;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Kinds of symbol definitions tracked by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Interface,
    Enum,
    Variable,
    Module,
    Import,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Interface => "interface",
            SymbolKind::Enum => "enum",
            SymbolKind::Variable => "variable",
            SymbolKind::Module => "module",
            SymbolKind::Import => "import",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "function" => Ok(SymbolKind::Function),
            "method" => Ok(SymbolKind::Method),
            "class" => Ok(SymbolKind::Class),
            "struct" => Ok(SymbolKind::Struct),
            "interface" => Ok(SymbolKind::Interface),
            "enum" => Ok(SymbolKind::Enum),
            "variable" => Ok(SymbolKind::Variable),
            "module" => Ok(SymbolKind::Module),
            "import" => Ok(SymbolKind::Import),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown symbol kind: {other}"
            ))),
        }
    }

    /// Kinds that can be the target of a call edge.
    pub fn callable(&self) -> bool {
        matches!(
            self,
            SymbolKind::Function | SymbolKind::Method | SymbolKind::Class | SymbolKind::Struct
        )
    }
}

/// Typed relationships between symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Call,
    Import,
    Inherit,
    Contain,
    ModuleDependsOn,
    Exports,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Call => "call",
            EdgeKind::Import => "import",
            EdgeKind::Inherit => "inherit",
            EdgeKind::Contain => "contain",
            EdgeKind::ModuleDependsOn => "module_depends_on",
            EdgeKind::Exports => "exports",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "call" => Ok(EdgeKind::Call),
            "import" => Ok(EdgeKind::Import),
            "inherit" => Ok(EdgeKind::Inherit),
            "contain" => Ok(EdgeKind::Contain),
            "module_depends_on" => Ok(EdgeKind::ModuleDependsOn),
            "exports" => Ok(EdgeKind::Exports),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown edge kind: {other}"
            ))),
        }
    }
}

/// Where an edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Heuristic,
    Resolved,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Heuristic => "heuristic",
            Provenance::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "heuristic" => Ok(Provenance::Heuristic),
            "resolved" => Ok(Provenance::Resolved),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown provenance: {other}"
            ))),
        }
    }
}

/// Symbol visibility per language conventions (pub / export / capitalization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown visibility: {other}"
            ))),
        }
    }
}

/// A source file row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    pub language: Option<String>,
    pub content_hash: String,
    pub size: i64,
    pub mtime: i64,
    pub indexed_at: i64,
}

/// A symbol row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub id: i64,
    pub file_id: i64,
    /// Stable across re-parses of unchanged content:
    /// `path:kind:qualified_name:line_start`.
    pub stable_id: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub visibility: Visibility,
    pub line_start: u32,
    pub line_end: Option<u32>,
    pub column_start: Option<u32>,
    pub column_end: Option<u32>,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub parent_id: Option<i64>,
    pub metadata: Option<String>,
}

impl SymbolRecord {
    pub fn stable_id_for(path: &str, kind: SymbolKind, qualified_name: &str, line: u32) -> String {
        format!("{path}:{}:{qualified_name}:{line}", kind.as_str())
    }
}

/// An edge row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: i64,
    pub source_id: i64,
    pub target_id: i64,
    pub kind: EdgeKind,
    pub confidence: f64,
    pub provenance: Provenance,
    pub file_id: i64,
    pub metadata: Option<String>,
}

/// A callsite row: one concrete call occurrence, input to the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallsiteRecord {
    pub id: i64,
    pub file_id: i64,
    pub line: u32,
    pub column: Option<u32>,
    pub callee_text: String,
    pub scope_symbol_id: Option<i64>,
    pub metadata: Option<String>,
}

/// Aggregate row counts and metadata for `pui stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub files: i64,
    pub symbols: i64,
    pub edges: i64,
    pub callsites: i64,
    pub schema_version: i64,
    pub last_indexed: Option<i64>,
}

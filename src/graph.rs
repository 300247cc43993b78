// Graph traversal: callers, callees, module dependencies

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{EngineError, Result};
use crate::store::db::Store;
use crate::store::{EdgeKind, SymbolRecord};

/// Traversal direction for graph queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}

impl Direction {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            "both" => Ok(Direction::Both),
            other => Err(EngineError::InvalidArgument(format!(
                "invalid direction: {other} (expected in|out|both)"
            ))),
        }
    }
}

/// One reachable symbol in a traversal result.
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub symbol_id: i64,
    pub stable_id: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: String,
    pub path: String,
    pub line: u32,
    /// Minimum edge confidence along the path from the start symbol.
    pub confidence: f64,
    pub depth: u32,
}

pub struct GraphEngine<'a> {
    store: &'a Store,
    file_paths: HashMap<i64, String>,
}

impl<'a> GraphEngine<'a> {
    pub fn new(store: &'a Store) -> Result<Self> {
        let file_paths = store
            .all_files()?
            .into_iter()
            .map(|f| (f.id, f.path))
            .collect();
        Ok(Self { store, file_paths })
    }

    /// Symbols calling into `symbol_id`, up to `depth` hops.
    pub fn callers(&self, symbol_id: i64, depth: u32, min_conf: f64) -> Result<Vec<GraphNode>> {
        self.traverse(symbol_id, depth, min_conf, Direction::In)
    }

    /// Symbols called from `symbol_id`, up to `depth` hops.
    pub fn callees(&self, symbol_id: i64, depth: u32, min_conf: f64) -> Result<Vec<GraphNode>> {
        self.traverse(symbol_id, depth, min_conf, Direction::Out)
    }

    /// BFS over CALL edges with a visited set; cycles terminate. Output
    /// order is stable: depth asc, confidence desc, path asc, id asc.
    /// A multi-hop path's confidence is the minimum of its edges.
    pub fn traverse(
        &self,
        start: i64,
        depth: u32,
        min_conf: f64,
        direction: Direction,
    ) -> Result<Vec<GraphNode>> {
        let mut results: HashMap<i64, GraphNode> = HashMap::new();
        let mut visited: HashSet<i64> = HashSet::new();
        visited.insert(start);

        let mut queue: VecDeque<(i64, u32, f64)> = VecDeque::new();
        queue.push_back((start, 0, 1.0));

        while let Some((current, current_depth, path_conf)) = queue.pop_front() {
            if current_depth >= depth {
                continue;
            }

            let mut neighbors: Vec<(i64, f64)> = Vec::new();
            if matches!(direction, Direction::In | Direction::Both) {
                for edge in self.store.edges_to(current, Some(EdgeKind::Call))? {
                    neighbors.push((edge.source_id, edge.confidence));
                }
            }
            if matches!(direction, Direction::Out | Direction::Both) {
                for edge in self.store.edges_from(current, Some(EdgeKind::Call))? {
                    neighbors.push((edge.target_id, edge.confidence));
                }
            }

            for (neighbor, edge_conf) in neighbors {
                let conf = path_conf.min(edge_conf);
                if conf < min_conf {
                    continue;
                }
                if !visited.insert(neighbor) {
                    continue;
                }
                let Some(symbol) = self.store.symbol(neighbor)? else {
                    continue;
                };
                results.insert(neighbor, self.node(&symbol, conf, current_depth + 1));
                queue.push_back((neighbor, current_depth + 1, conf));
            }
        }

        let mut nodes: Vec<GraphNode> = results.into_values().collect();
        nodes.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then(
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.path.cmp(&b.path))
                .then(a.symbol_id.cmp(&b.symbol_id))
        });
        Ok(nodes)
    }

    /// Module-level dependencies around a module symbol.
    pub fn module_dependencies(
        &self,
        module: &SymbolRecord,
        direction: Direction,
    ) -> Result<Vec<GraphNode>> {
        let mut nodes = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            for edge in self
                .store
                .edges_from(module.id, Some(EdgeKind::ModuleDependsOn))?
            {
                if let Some(symbol) = self.store.symbol(edge.target_id)? {
                    nodes.push(self.node(&symbol, edge.confidence, 1));
                }
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            for edge in self
                .store
                .edges_to(module.id, Some(EdgeKind::ModuleDependsOn))?
            {
                if let Some(symbol) = self.store.symbol(edge.source_id)? {
                    nodes.push(self.node(&symbol, edge.confidence, 1));
                }
            }
        }
        nodes.sort_by(|a, b| a.path.cmp(&b.path).then(a.symbol_id.cmp(&b.symbol_id)));
        Ok(nodes)
    }

    fn node(&self, symbol: &SymbolRecord, confidence: f64, depth: u32) -> GraphNode {
        GraphNode {
            symbol_id: symbol.id,
            stable_id: symbol.stable_id.clone(),
            name: symbol.name.clone(),
            qualified_name: symbol.qualified_name.clone(),
            kind: symbol.kind.as_str().to_string(),
            path: self
                .file_paths
                .get(&symbol.file_id)
                .cloned()
                .unwrap_or_default(),
            line: symbol.line_start,
            confidence,
            depth,
        }
    }
}

/// Render a traversal neighborhood in an export format.
pub fn export_graph(
    center: &SymbolRecord,
    center_path: &str,
    nodes_in: &[GraphNode],
    nodes_out: &[GraphNode],
    format: &str,
) -> Result<String> {
    match format {
        "mermaid" => {
            let mut out = String::from("graph TD\n");
            let id = |n: i64| format!("S{n}");
            out.push_str(&format!(
                "    {}[\"{} ({})\"]\n",
                id(center.id),
                center.qualified_name,
                center_path
            ));
            for node in nodes_in {
                out.push_str(&format!(
                    "    {}[\"{}\"] -->|{:.2}| {}\n",
                    id(node.symbol_id),
                    node.qualified_name,
                    node.confidence,
                    id(center.id)
                ));
            }
            for node in nodes_out {
                out.push_str(&format!(
                    "    {} -->|{:.2}| {}[\"{}\"]\n",
                    id(center.id),
                    node.confidence,
                    id(node.symbol_id),
                    node.qualified_name
                ));
            }
            Ok(out)
        }
        "dot" => {
            let mut out = String::from("digraph calls {\n    rankdir=LR;\n");
            out.push_str(&format!(
                "    s{} [label=\"{}\", shape=box];\n",
                center.id, center.qualified_name
            ));
            for node in nodes_in {
                out.push_str(&format!(
                    "    s{} [label=\"{}\"];\n    s{} -> s{} [label=\"{:.2}\"];\n",
                    node.symbol_id, node.qualified_name, node.symbol_id, center.id, node.confidence
                ));
            }
            for node in nodes_out {
                out.push_str(&format!(
                    "    s{} [label=\"{}\"];\n    s{} -> s{} [label=\"{:.2}\"];\n",
                    node.symbol_id, node.qualified_name, center.id, node.symbol_id, node.confidence
                ));
            }
            out.push_str("}\n");
            Ok(out)
        }
        "json" => {
            let value = serde_json::json!({
                "center": {
                    "symbol_id": center.id,
                    "stable_id": center.stable_id,
                    "qualified_name": center.qualified_name,
                    "path": center_path,
                },
                "callers": nodes_in,
                "callees": nodes_out,
            });
            serde_json::to_string_pretty(&value)
                .map_err(|e| EngineError::InvalidArgument(format!("graph serialization: {e}")))
        }
        other => Err(EngineError::InvalidArgument(format!(
            "invalid graph format: {other} (expected mermaid|dot|json)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::NewEdge;
    use crate::store::{Provenance, SymbolKind, Visibility};
    use crate::parser::{ParseOutput, ParsedSymbol};

    fn symbol(name: &str, line: u32) -> ParsedSymbol {
        ParsedSymbol {
            name: name.into(),
            qualified_name: name.into(),
            kind: SymbolKind::Function,
            visibility: Visibility::Public,
            line_start: line,
            line_end: line + 1,
            column_start: 0,
            column_end: 0,
            signature: None,
            docstring: None,
            parent: None,
            bases: Vec::new(),
        }
    }

    /// Store with a -> b -> c -> a call cycle at varying confidences.
    fn cyclic_store() -> (tempfile::TempDir, Store, i64, i64, i64) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("index.sqlite")).unwrap();
        let parse = ParseOutput {
            symbols: vec![symbol("a", 1), symbol("b", 4), symbol("c", 7)],
            imports: Vec::new(),
            callsites: Vec::new(),
            errors: Vec::new(),
        };
        let outcome = store
            .replace_file(
                &crate::store::db::FileUpsert {
                    path: "m.py".into(),
                    language: Some("python".into()),
                    content_hash: "h".into(),
                    size: 1,
                    mtime: 1,
                    line_count: 9,
                },
                Some(&parse),
            )
            .unwrap();
        let symbols = store.symbols_in_file(outcome.file_id).unwrap();
        let id = |n: &str| symbols.iter().find(|s| s.name == n).unwrap().id;
        let (a, b, c) = (id("a"), id("b"), id("c"));
        let mut add = |s: i64, t: i64, conf: f64| {
            store
                .insert_edge(&NewEdge {
                    source_id: s,
                    target_id: t,
                    kind: EdgeKind::Call,
                    confidence: conf,
                    provenance: Provenance::Heuristic,
                    file_id: outcome.file_id,
                    metadata: None,
                })
                .unwrap();
        };
        add(a, b, 0.9);
        add(b, c, 0.6);
        add(c, a, 0.8);
        (dir, store, a, b, c)
    }

    #[test]
    fn test_cycle_terminates() {
        let (_dir, store, a, _b, _c) = cyclic_store();
        let graph = GraphEngine::new(&store).unwrap();
        let nodes = graph.callees(a, 10, 0.0).unwrap();
        // a reaches b and c exactly once despite the cycle.
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_path_confidence_is_minimum() {
        let (_dir, store, a, _b, c) = cyclic_store();
        let graph = GraphEngine::new(&store).unwrap();
        let nodes = graph.callees(a, 10, 0.0).unwrap();
        let c_node = nodes.iter().find(|n| n.symbol_id == c).unwrap();
        // a->b (0.9) then b->c (0.6): path confidence min = 0.6
        assert!((c_node.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_min_conf_filter() {
        let (_dir, store, a, b, _c) = cyclic_store();
        let graph = GraphEngine::new(&store).unwrap();
        let nodes = graph.callees(a, 10, 0.7).unwrap();
        // Only b survives: c is behind the 0.6 edge.
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].symbol_id, b);
    }

    #[test]
    fn test_callers_direction() {
        let (_dir, store, a, _b, c) = cyclic_store();
        let graph = GraphEngine::new(&store).unwrap();
        let nodes = graph.callers(a, 1, 0.0).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].symbol_id, c);
    }

    #[test]
    fn test_deterministic_ordering() {
        let (_dir, store, a, _b, _c) = cyclic_store();
        let graph = GraphEngine::new(&store).unwrap();
        let first = graph.callees(a, 10, 0.0).unwrap();
        let second = graph.callees(a, 10, 0.0).unwrap();
        let ids1: Vec<i64> = first.iter().map(|n| n.symbol_id).collect();
        let ids2: Vec<i64> = second.iter().map(|n| n.symbol_id).collect();
        assert_eq!(ids1, ids2);
    }

    #[test]
    fn test_module_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("index.sqlite")).unwrap();
        let upsert = |path: &str| crate::store::db::FileUpsert {
            path: path.into(),
            language: Some("python".into()),
            content_hash: "h".into(),
            size: 1,
            mtime: 1,
            line_count: 1,
        };
        let empty = ParseOutput::default();
        let a = store.replace_file(&upsert("app/main.py"), Some(&empty)).unwrap();
        let b = store.replace_file(&upsert("lib/util.py"), Some(&empty)).unwrap();
        let (a_mod, b_mod) = (
            a.module_symbol_id.unwrap(),
            b.module_symbol_id.unwrap(),
        );
        store
            .insert_edge(&NewEdge {
                source_id: a_mod,
                target_id: b_mod,
                kind: EdgeKind::ModuleDependsOn,
                confidence: 0.8,
                provenance: Provenance::Heuristic,
                file_id: a.file_id,
                metadata: None,
            })
            .unwrap();

        let graph = GraphEngine::new(&store).unwrap();
        let a_sym = store.symbol(a_mod).unwrap().unwrap();
        let out = graph.module_dependencies(&a_sym, Direction::Out).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].symbol_id, b_mod);

        let b_sym = store.symbol(b_mod).unwrap().unwrap();
        let incoming = graph.module_dependencies(&b_sym, Direction::In).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].symbol_id, a_mod);
    }

    #[test]
    fn test_export_formats() {
        let (_dir, store, a, _b, _c) = cyclic_store();
        let graph = GraphEngine::new(&store).unwrap();
        let center = store.symbol(a).unwrap().unwrap();
        let nodes_in = graph.callers(a, 1, 0.0).unwrap();
        let nodes_out = graph.callees(a, 1, 0.0).unwrap();

        let mermaid = export_graph(&center, "m.py", &nodes_in, &nodes_out, "mermaid").unwrap();
        assert!(mermaid.starts_with("graph TD"));
        let dot = export_graph(&center, "m.py", &nodes_in, &nodes_out, "dot").unwrap();
        assert!(dot.contains("digraph"));
        let json = export_graph(&center, "m.py", &nodes_in, &nodes_out, "json").unwrap();
        assert!(json.contains("\"callers\""));
        assert!(export_graph(&center, "m.py", &nodes_in, &nodes_out, "svg").is_err());
    }
}

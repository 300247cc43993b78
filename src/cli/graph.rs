use std::path::PathBuf;

use crate::error::{EngineError, Result};
use crate::graph::{export_graph, Direction, GraphEngine};
use crate::packs::zoom::resolve_target;
use crate::store::db::Store;

pub async fn run(
    project: PathBuf,
    symbol: String,
    depth: u32,
    direction: String,
    format: String,
) -> Result<()> {
    let store = Store::open_in_repo(&project)?;
    let direction = Direction::parse(&direction)?;

    let center = match resolve_target(&store, &project, &symbol) {
        Ok(center) => center,
        Err(EngineError::SymbolNotFound { query, suggestions }) => {
            println!("No symbol matches '{query}'.");
            if !suggestions.is_empty() {
                println!("Did you mean:");
                for suggestion in suggestions {
                    println!("- {suggestion}");
                }
            }
            return Ok(());
        }
        Err(other) => return Err(other),
    };

    let center_path = store
        .all_files()?
        .into_iter()
        .find(|f| f.id == center.file_id)
        .map(|f| f.path)
        .unwrap_or_default();

    let engine = GraphEngine::new(&store)?;
    let nodes_in = match direction {
        Direction::In | Direction::Both => engine.callers(center.id, depth, 0.0)?,
        Direction::Out => Vec::new(),
    };
    let nodes_out = match direction {
        Direction::Out | Direction::Both => engine.callees(center.id, depth, 0.0)?,
        Direction::In => Vec::new(),
    };

    let output = export_graph(&center, &center_path, &nodes_in, &nodes_out, &format)?;
    println!("{output}");
    Ok(())
}

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::Result;
use crate::store::db::Store;

/// Full-text search over symbol names and qualified names.
pub async fn run(project: PathBuf, query: String, limit: usize, format: String) -> Result<()> {
    let store = Store::open_in_repo(&project)?;
    let hits = store.search(&query, limit)?;
    let file_paths: HashMap<i64, String> = store
        .all_files()?
        .into_iter()
        .map(|f| (f.id, f.path))
        .collect();

    match format.as_str() {
        "json" => {
            let rows: Vec<serde_json::Value> = hits
                .iter()
                .map(|hit| {
                    serde_json::json!({
                        "stable_id": hit.symbol.stable_id,
                        "name": hit.symbol.name,
                        "qualified_name": hit.symbol.qualified_name,
                        "kind": hit.symbol.kind.as_str(),
                        "path": file_paths.get(&hit.symbol.file_id),
                        "line": hit.symbol.line_start,
                        "rank": hit.rank,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
        }
        _ => {
            if hits.is_empty() {
                println!("No symbols match '{query}'.");
                return Ok(());
            }
            for hit in &hits {
                let path = file_paths
                    .get(&hit.symbol.file_id)
                    .map(String::as_str)
                    .unwrap_or("?");
                println!(
                    "{}:{}  {} ({})",
                    path,
                    hit.symbol.line_start,
                    hit.symbol.qualified_name,
                    hit.symbol.kind.as_str()
                );
            }
        }
    }
    Ok(())
}

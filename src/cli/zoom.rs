use std::path::PathBuf;

use crate::error::{EngineError, Result};
use crate::packs::zoom::{self, ZoomOptions};
use crate::packs::PackFormat;
use crate::store::db::Store;

pub async fn run(
    project: PathBuf,
    target: String,
    max_tokens: Option<usize>,
    format: String,
) -> Result<()> {
    let store = Store::open_in_repo(&project)?;
    let opts = ZoomOptions {
        max_tokens,
        format: PackFormat::parse(&format)?,
    };

    match zoom::generate(&store, &project, &target, &opts) {
        Ok(output) => {
            println!("{output}");
            Ok(())
        }
        // An unknown symbol is a structured empty result, not a failure.
        Err(EngineError::SymbolNotFound { query, suggestions }) => {
            if opts.format == PackFormat::Json {
                let value = serde_json::json!({
                    "type": "zoom",
                    "found": false,
                    "query": query,
                    "suggestions": suggestions,
                });
                println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
            } else {
                println!("# Zoom: not found\n");
                println!("No symbol matches '{query}'.");
                if !suggestions.is_empty() {
                    println!("\nDid you mean:");
                    for suggestion in suggestions {
                        println!("- {suggestion}");
                    }
                }
            }
            Ok(())
        }
        Err(other) => Err(other),
    }
}

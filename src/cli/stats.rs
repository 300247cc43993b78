use std::path::PathBuf;

use crate::error::Result;
use crate::store::db::Store;

pub async fn run(project: PathBuf, verbose: bool) -> Result<()> {
    let store = Store::open_in_repo(&project)?;
    let stats = store.stats()?;

    println!("Index statistics for {}:", project.display());
    println!("  Files:      {}", stats.files);
    println!("  Symbols:    {}", stats.symbols);
    println!("  Edges:      {}", stats.edges);
    println!("  Callsites:  {}", stats.callsites);
    println!("  Schema:     v{}", stats.schema_version);
    match stats.last_indexed {
        Some(ts) => println!("  Last index: {ts} (unix)"),
        None => println!("  Last index: never"),
    }

    if verbose {
        println!("  Version:    {}", store.index_version()?);
        let mut by_language: std::collections::BTreeMap<String, usize> = Default::default();
        for file in store.all_files()? {
            *by_language
                .entry(file.language.unwrap_or_else(|| "other".to_string()))
                .or_default() += 1;
        }
        for (language, count) in by_language {
            println!("    {language}: {count} files");
        }
    }
    Ok(())
}

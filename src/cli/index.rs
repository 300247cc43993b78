use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::indexer::{watcher, CancelToken, IndexMode, Indexer};

pub async fn run(
    project: PathBuf,
    force: bool,
    stats_only: bool,
    watch: bool,
    cancel: CancelToken,
) -> Result<()> {
    let config = Config::from_repo(&project);
    config.validate()?;

    let mode = if stats_only {
        IndexMode::StatsOnly
    } else if force {
        IndexMode::Full
    } else {
        IndexMode::Incremental
    };

    info!("Indexing {} ({:?})", project.display(), mode);
    let indexer = Arc::new(Indexer::new(&project, config, cancel)?);
    let stats = indexer.run(mode).await?;
    println!("{stats}");

    if watch && !stats_only {
        println!("Watching for changes; press Ctrl-C to stop.");
        watcher::watch(indexer).await?;
    }

    Ok(())
}

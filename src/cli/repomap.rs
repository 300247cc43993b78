use std::path::PathBuf;

use crate::error::Result;
use crate::packs::repomap::{self, RepoMapOptions};
use crate::packs::PackFormat;
use crate::store::db::Store;

pub async fn run(
    project: PathBuf,
    depth: usize,
    focus: Option<String>,
    max_tokens: Option<usize>,
    format: String,
) -> Result<()> {
    let store = Store::open_in_repo(&project)?;
    let opts = RepoMapOptions {
        depth,
        focus,
        max_tokens,
        format: PackFormat::parse(&format)?,
    };
    let output = repomap::generate(&store, &project, &opts)?;
    println!("{output}");
    Ok(())
}

use std::path::PathBuf;

use crate::error::Result;
use crate::impact::ImpactTargets;
use crate::packs::impact::{self, ImpactOptions};
use crate::packs::PackFormat;
use crate::store::db::Store;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    project: PathBuf,
    files: Vec<String>,
    symbols: Vec<String>,
    git_diff: Option<String>,
    depth: u32,
    include_tests: bool,
    explain: bool,
    max_tokens: Option<usize>,
    format: String,
) -> Result<()> {
    let store = Store::open_in_repo(&project)?;
    let targets = ImpactTargets {
        files,
        symbols,
        git_diff,
    };
    let opts = ImpactOptions {
        depth,
        include_tests,
        explain,
        max_tokens,
        format: PackFormat::parse(&format)?,
    };
    let output = impact::generate(&store, &project, &targets, &opts)?;
    println!("{output}");
    Ok(())
}

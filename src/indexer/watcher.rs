// File watcher: debounced incremental re-indexing

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{EngineError, Result};
use crate::indexer::{IndexMode, Indexer};

/// Quiet period after the last event before a re-index fires. Editors
/// produce event bursts; one pass per burst is enough.
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Watch the repo and re-run incremental indexing after change bursts.
/// Runs until the indexer's cancel token fires.
pub async fn watch(indexer: Arc<Indexer>) -> Result<()> {
    let root = indexer.repo_root().to_path_buf();
    info!("Watching {} for changes", root.display());

    let (tx, rx) = std::sync::mpsc::channel::<Event>();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => error!("Watch error: {}", e),
        },
        notify::Config::default(),
    )
    .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;

    let rx = Arc::new(Mutex::new(rx));
    loop {
        // Block on the next relevant event off the async runtime.
        let event = {
            let rx = Arc::clone(&rx);
            tokio::task::spawn_blocking(move || wait_for_change(&rx.lock()))
                .await
                .map_err(|e| EngineError::Io(std::io::Error::other(e)))?
        };

        match event {
            WaitOutcome::Changed => {
                debug!("Change burst settled; re-indexing");
                match indexer.run(IndexMode::Incremental).await {
                    Ok(stats) => {
                        if stats.files_new + stats.files_changed + stats.files_deleted > 0 {
                            println!(
                                "Re-indexed: {} new, {} changed, {} deleted",
                                stats.files_new, stats.files_changed, stats.files_deleted
                            );
                        }
                    }
                    Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                    Err(e) => error!("Re-index failed: {}", e),
                }
            }
            WaitOutcome::Idle => {}
            WaitOutcome::Closed => break,
        }

        if indexer_cancelled(&indexer) {
            break;
        }
    }

    drop(watcher);
    Ok(())
}

enum WaitOutcome {
    Changed,
    Idle,
    Closed,
}

/// Poll interval so the loop notices cancellation even with no events.
const IDLE_TICK: Duration = Duration::from_secs(1);

/// Wait for a mutating event, then drain the burst until the channel has
/// been quiet for the debounce window. Returns Idle periodically so the
/// caller can observe cancellation.
fn wait_for_change(rx: &Receiver<Event>) -> WaitOutcome {
    loop {
        match rx.recv_timeout(IDLE_TICK) {
            Ok(event) if is_mutation(&event) => break,
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => return WaitOutcome::Idle,
            Err(RecvTimeoutError::Disconnected) => return WaitOutcome::Closed,
        }
    }
    loop {
        match rx.recv_timeout(DEBOUNCE) {
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => return WaitOutcome::Changed,
            Err(RecvTimeoutError::Disconnected) => return WaitOutcome::Closed,
        }
    }
}

fn is_mutation(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

fn indexer_cancelled(indexer: &Indexer) -> bool {
    indexer.cancel_token().is_cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};

    #[test]
    fn test_is_mutation() {
        let create = Event::new(EventKind::Create(CreateKind::File));
        let modify = Event::new(EventKind::Modify(ModifyKind::Any));
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any));
        assert!(is_mutation(&create));
        assert!(is_mutation(&modify));
        assert!(!is_mutation(&access));
    }
}

//! `toolhost watch`: keep servers connected and follow folder changes.
//!
//! The config file is polled; edits to its `[[folders]]` entries are applied
//! to the folder book, which drives the reload coordinator. Every reload
//! event is printed to stdout as one JSON line.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use th_domain::config::{Config, SyncFolderConfig};
use th_supervisor::{FolderSource, SyncFolderBook};
use tokio::sync::broadcast::error::RecvError;

use crate::bootstrap::build_supervisor;

pub async fn watch(
    config: Arc<Config>,
    config_path: String,
    character: Option<String>,
    poll_secs: u64,
) -> anyhow::Result<()> {
    let supervisor = build_supervisor(config);

    // Subscribe before the first connect so no event is missed.
    let mut events = supervisor.reload.subscribe();
    let listener = supervisor.reload.spawn_listener(supervisor.folders.subscribe());

    let results = supervisor.reload.connect_configured(character.as_deref()).await;
    let connected = results.iter().filter(|(_, s)| s.connected).count();
    tracing::info!(
        character = ?character,
        connected,
        total = results.len(),
        "MCP servers connected, watching for folder changes"
    );

    let mut poll = tokio::time::interval(Duration::from_secs(poll_secs.max(1)));
    let mut last_modified = modified_at(Path::new(&config_path));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "reload event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = poll.tick() => {
                let modified = modified_at(Path::new(&config_path));
                if modified == last_modified {
                    continue;
                }
                last_modified = modified;
                match super::read_config(&config_path) {
                    Ok(fresh) => {
                        let applied = reconcile_folders(&supervisor.folders, &fresh.folders);
                        tracing::info!(path = %config_path, applied, "config file changed, folders reconciled");
                    }
                    Err(e) => tracing::warn!(error = %e, "ignoring unreadable config file"),
                }
            }
        }
    }

    listener.abort();
    supervisor.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Bring the character folders in `book` in line with `desired`, emitting
/// one change event per mutation. Global folders are fixed at startup.
/// Returns the number of mutations applied.
pub fn reconcile_folders(book: &SyncFolderBook, desired: &[SyncFolderConfig]) -> usize {
    let desired: Vec<(&str, &PathBuf, bool)> = desired
        .iter()
        .filter_map(|f| f.character.as_deref().map(|c| (c, &f.path, f.primary)))
        .collect();
    let current = book.all_sync_folders();
    let mut applied = 0;

    for folder in &current {
        let Some(character) = folder.character.as_deref() else {
            continue;
        };
        let wanted = desired.iter().any(|(c, p, _)| *c == character && **p == folder.path);
        if !wanted && book.remove(character, &folder.path) {
            applied += 1;
        }
    }

    for (character, path, primary) in &desired {
        let existing = current
            .iter()
            .find(|f| f.character.as_deref() == Some(*character) && f.path == **path);
        match existing {
            None => {
                book.add(character, (*path).clone(), *primary);
                applied += 1;
            }
            Some(folder) if *primary && !folder.primary => {
                if book.set_primary(character, path) {
                    applied += 1;
                }
            }
            Some(_) => {}
        }
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use th_supervisor::FolderChangeKind;

    fn entry(character: &str, path: &str, primary: bool) -> SyncFolderConfig {
        SyncFolderConfig {
            character: Some(character.into()),
            path: path.into(),
            primary,
        }
    }

    #[tokio::test]
    async fn reconcile_adds_removes_and_promotes() {
        let book = SyncFolderBook::from_config(&[entry("alice", "/data/a", true), entry("alice", "/data/b", false)]);
        let mut rx = book.subscribe();

        let applied = reconcile_folders(
            &book,
            &[entry("alice", "/data/b", true), entry("alice", "/data/c", false)],
        );
        assert_eq!(applied, 3);

        let kinds: Vec<_> = [rx.recv().await, rx.recv().await, rx.recv().await]
            .into_iter()
            .map(|e| e.unwrap().kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                FolderChangeKind::Removed,
                FolderChangeKind::PrimaryChanged,
                FolderChangeKind::Added
            ]
        );

        let primary = book.primary_sync_folder(Some("alice")).unwrap();
        assert_eq!(primary.path, PathBuf::from("/data/b"));
        assert_eq!(book.sync_folders(Some("alice")).len(), 2);
    }

    #[test]
    fn unchanged_folders_apply_nothing() {
        let entries = [entry("alice", "/data/a", true)];
        let book = SyncFolderBook::from_config(&entries);
        assert_eq!(reconcile_folders(&book, &entries), 0);
    }

    #[test]
    fn global_folders_are_left_alone() {
        let global = SyncFolderConfig {
            character: None,
            path: "/data/shared".into(),
            primary: true,
        };
        let book = SyncFolderBook::from_config(&[global]);
        assert_eq!(reconcile_folders(&book, &[]), 0);
        assert_eq!(book.sync_folders(None).len(), 1);
    }
}

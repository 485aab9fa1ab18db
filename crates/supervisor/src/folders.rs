//! Synced folders: the dynamic paths substituted into server configs.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use th_domain::config::SyncFolderConfig;
use tokio::sync::broadcast;

/// A registered directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFolder {
    /// Owning character; `None` for a global folder.
    pub character: Option<String>,
    pub path: PathBuf,
    pub primary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderChangeKind {
    Added,
    Removed,
    PrimaryChanged,
}

/// Emitted whenever a character's folder set changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderChangeEvent {
    pub character: String,
    pub kind: FolderChangeKind,
}

/// Read access to the folder-synchronization state.
///
/// `None` as the character selects global folders.
pub trait FolderSource: Send + Sync {
    fn sync_folders(&self, character: Option<&str>) -> Vec<SyncFolder>;

    fn all_sync_folders(&self) -> Vec<SyncFolder>;

    /// The folder flagged primary, else the first registered one.
    fn primary_sync_folder(&self, character: Option<&str>) -> Option<SyncFolder> {
        let folders = self.sync_folders(character);
        folders
            .iter()
            .find(|f| f.primary)
            .or_else(|| folders.first())
            .cloned()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory folder book
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const EVENT_CAPACITY: usize = 64;

/// In-memory folder registry that broadcasts a [`FolderChangeEvent`] on
/// every mutation.
pub struct SyncFolderBook {
    folders: RwLock<Vec<SyncFolder>>,
    events: broadcast::Sender<FolderChangeEvent>,
}

impl Default for SyncFolderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncFolderBook {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            folders: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Seed from `[[folders]]` entries. No events are emitted.
    pub fn from_config(entries: &[SyncFolderConfig]) -> Self {
        let book = Self::new();
        *book.folders.write() = entries
            .iter()
            .map(|e| SyncFolder {
                character: e.character.clone(),
                path: e.path.clone(),
                primary: e.primary,
            })
            .collect();
        book
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FolderChangeEvent> {
        self.events.subscribe()
    }

    /// Register a folder for `character`. Registering a primary demotes the
    /// character's previous primary.
    pub fn add(&self, character: &str, path: impl Into<PathBuf>, primary: bool) {
        let path = path.into();
        {
            let mut folders = self.folders.write();
            if primary {
                for f in folders.iter_mut().filter(|f| f.character.as_deref() == Some(character)) {
                    f.primary = false;
                }
            }
            folders.retain(|f| !(f.character.as_deref() == Some(character) && f.path == path));
            folders.push(SyncFolder {
                character: Some(character.to_string()),
                path,
                primary,
            });
        }
        self.emit(character, FolderChangeKind::Added);
    }

    /// Unregister a folder. Returns false when it was not registered.
    pub fn remove(&self, character: &str, path: &Path) -> bool {
        let removed = {
            let mut folders = self.folders.write();
            let before = folders.len();
            folders.retain(|f| !(f.character.as_deref() == Some(character) && f.path == path));
            folders.len() != before
        };
        if removed {
            self.emit(character, FolderChangeKind::Removed);
        }
        removed
    }

    /// Mark `path` as the character's primary folder.
    pub fn set_primary(&self, character: &str, path: &Path) -> bool {
        let found = {
            let mut folders = self.folders.write();
            let owned = |f: &SyncFolder| f.character.as_deref() == Some(character);
            if !folders.iter().any(|f| owned(f) && f.path == path) {
                false
            } else {
                for f in folders.iter_mut().filter(|f| owned(f)) {
                    f.primary = f.path == path;
                }
                true
            }
        };
        if found {
            self.emit(character, FolderChangeKind::PrimaryChanged);
        }
        found
    }

    fn emit(&self, character: &str, kind: FolderChangeKind) {
        tracing::debug!(character, ?kind, "synced folders changed");
        // No receivers is fine.
        let _ = self.events.send(FolderChangeEvent {
            character: character.to_string(),
            kind,
        });
    }
}

impl FolderSource for SyncFolderBook {
    fn sync_folders(&self, character: Option<&str>) -> Vec<SyncFolder> {
        self.folders
            .read()
            .iter()
            .filter(|f| f.character.as_deref() == character)
            .cloned()
            .collect()
    }

    fn all_sync_folders(&self) -> Vec<SyncFolder> {
        self.folders.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_falls_back_to_first_folder() {
        let book = SyncFolderBook::new();
        book.add("alice", "/data/a", false);
        book.add("alice", "/data/b", false);
        let primary = book.primary_sync_folder(Some("alice")).unwrap();
        assert_eq!(primary.path, PathBuf::from("/data/a"));
    }

    #[test]
    fn adding_primary_demotes_previous() {
        let book = SyncFolderBook::new();
        book.add("alice", "/data/a", true);
        book.add("alice", "/data/b", true);
        let primaries: Vec<_> = book
            .sync_folders(Some("alice"))
            .into_iter()
            .filter(|f| f.primary)
            .collect();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].path, PathBuf::from("/data/b"));
    }

    #[test]
    fn global_and_character_folders_are_separate() {
        let book = SyncFolderBook::from_config(&[SyncFolderConfig {
            character: None,
            path: "/data/shared".into(),
            primary: true,
        }]);
        book.add("alice", "/data/a", false);
        assert_eq!(book.sync_folders(None).len(), 1);
        assert_eq!(book.sync_folders(Some("alice")).len(), 1);
        assert_eq!(book.all_sync_folders().len(), 2);
    }

    #[test]
    fn set_primary_on_unknown_path_changes_nothing() {
        let book = SyncFolderBook::new();
        book.add("alice", "/data/a", true);
        assert!(!book.set_primary("alice", Path::new("/data/missing")));
        let primary = book.primary_sync_folder(Some("alice")).unwrap();
        assert!(primary.primary);
        assert_eq!(primary.path, PathBuf::from("/data/a"));
    }

    #[tokio::test]
    async fn mutations_broadcast_events() {
        let book = SyncFolderBook::new();
        let mut rx = book.subscribe();
        book.add("alice", "/data/a", false);
        assert!(book.set_primary("alice", Path::new("/data/a")));
        assert!(book.remove("alice", Path::new("/data/a")));
        assert!(!book.remove("alice", Path::new("/data/a")));

        let kinds: Vec<_> = [rx.recv().await, rx.recv().await, rx.recv().await]
            .into_iter()
            .map(|e| e.unwrap().kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                FolderChangeKind::Added,
                FolderChangeKind::PrimaryChanged,
                FolderChangeKind::Removed
            ]
        );
        assert!(rx.try_recv().is_err());
    }
}

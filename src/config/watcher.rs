//! Store document watcher for hot reload.
//!
//! Watches the directory holding the store document rather than the file
//! itself: editors and deploy tools usually replace the file by rename,
//! which would silently end a watch on the old inode.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Turns changes to the store document into reload triggers.
pub struct StoreWatcher {
    path: PathBuf,
    trigger_tx: mpsc::UnboundedSender<()>,
}

impl StoreWatcher {
    /// Watch `path`, sending one `()` per relevant change into `trigger_tx`.
    pub fn new(path: &Path, trigger_tx: mpsc::UnboundedSender<()>) -> Self {
        Self {
            path: path.to_path_buf(),
            trigger_tx,
        }
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.trigger_tx;
        let target = self.path.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !is_content_change(&event.kind) {
                        return;
                    }
                    let touches_store = event
                        .paths
                        .iter()
                        .any(|p| p == &target || p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_store {
                        tracing::info!(path = ?target, "Store document changed, requesting reload");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Store watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let watch_root = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&watch_root, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Store watcher started");
        Ok(watcher)
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    kind.is_modify() || kind.is_create()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    #[test]
    fn test_content_change_kinds() {
        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_content_change(&EventKind::Access(AccessKind::Any)));
    }
}

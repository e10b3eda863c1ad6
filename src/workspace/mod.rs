//! The synchronization coordinator. Owns the workspace tree and the open
//! buffers; every mutating operation runs the same protocol:
//!
//! 1. apply the logical tree mutation (copy-on-write),
//! 2. persist the full new tree — the durability boundary; the swap is
//!    optimistic and rolled back if this fails,
//! 3. best-effort mirror the affected paths into the sandbox, with bounded
//!    retry; mirror failures degrade to a warning, never to an error.

use crate::buffers::{BufferId, BufferSet};
use crate::config::Config;
use crate::error::WorkspaceError;
use crate::sandbox::SandboxHandle;
use crate::store::TreeStore;
use crate::tree::{path, FileNode, FolderNode, MirrorEntry, Node, WorkspaceTree};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEFAULT_MIRROR_ATTEMPTS: u32 = 3;
const DEFAULT_MIRROR_BACKOFF: Duration = Duration::from_millis(50);

/// Notifications for the surrounding surface (toasts, tree refresh).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEvent {
    FileCreated { path: String },
    FolderCreated { path: String },
    FileDeleted { path: String },
    FolderDeleted { path: String },
    Renamed { from: String, to: String },
    BufferSaved { path: String },
    /// The mirror step gave up after retries; the logical operation still
    /// succeeded (persistence is the source of truth).
    MirrorDegraded { path: String, reason: String },
}

enum MirrorOp {
    Write { path: String, content: String },
    Dir { path: String },
    Remove { path: String },
}

impl MirrorOp {
    fn path(&self) -> &str {
        match self {
            MirrorOp::Write { path, .. } | MirrorOp::Dir { path } | MirrorOp::Remove { path } => {
                path
            }
        }
    }
}

pub struct WorkspaceController {
    workspace_id: String,
    tree: WorkspaceTree,
    buffers: BufferSet,
    store: Arc<dyn TreeStore>,
    sandbox: Arc<SandboxHandle>,
    events: Option<mpsc::UnboundedSender<WorkspaceEvent>>,
    mirror_attempts: u32,
    mirror_backoff: Duration,
}

impl WorkspaceController {
    /// Load the workspace tree from the store and take ownership of it.
    pub async fn load(
        store: Arc<dyn TreeStore>,
        sandbox: Arc<SandboxHandle>,
        workspace_id: impl Into<String>,
    ) -> Result<Self, WorkspaceError> {
        let workspace_id = workspace_id.into();
        let tree = store
            .load_tree(&workspace_id)
            .await
            .map_err(WorkspaceError::Persistence)?
            .ok_or_else(|| WorkspaceError::WorkspaceNotFound(workspace_id.clone()))?;
        debug!(workspace_id, "workspace tree loaded");
        Ok(Self {
            workspace_id,
            tree,
            buffers: BufferSet::new(),
            store,
            sandbox,
            events: None,
            mirror_attempts: DEFAULT_MIRROR_ATTEMPTS,
            mirror_backoff: DEFAULT_MIRROR_BACKOFF,
        })
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<WorkspaceEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_mirror_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.mirror_attempts = attempts.max(1);
        self.mirror_backoff = backoff;
        self
    }

    /// Apply the ambient configuration's coordinator knobs.
    pub fn with_config(self, config: &Config) -> Self {
        let backoff = self.mirror_backoff;
        self.with_mirror_retry(config.mirror_attempts, backoff)
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn tree(&self) -> &WorkspaceTree {
        &self.tree
    }

    pub fn buffers(&self) -> &BufferSet {
        &self.buffers
    }

    /// Open the file at `file_path` into the buffer set (or activate the
    /// buffer that already holds it).
    pub fn open_file(&mut self, file_path: &str) -> Result<BufferId, WorkspaceError> {
        let file = self.tree.file(file_path)?;
        let content = file.content.clone();
        Ok(self.buffers.open(file_path, &content))
    }

    /// Edit a buffer's working content. In-memory only; `save_buffer`
    /// commits it to the tree.
    pub fn update_buffer(&mut self, id: BufferId, content: impl Into<String>) -> bool {
        self.buffers.update_content(id, content)
    }

    pub fn close_buffer(&mut self, id: BufferId) {
        self.buffers.close(id);
    }

    pub fn close_all_buffers(&mut self) {
        self.buffers.close_all();
    }

    /// Create a file under `parent_path`, persist, mirror, and open it.
    /// Returns the new file's path.
    pub async fn add_file(
        &mut self,
        new_file: FileNode,
        parent_path: &str,
    ) -> Result<String, WorkspaceError> {
        let file_path = path::join(parent_path, &new_file.file_name());
        let content = new_file.content.clone();
        let next = self.tree.insert(parent_path, Node::File(new_file))?;
        self.commit(next).await?;
        self.mirror(MirrorOp::Write {
            path: file_path.clone(),
            content: content.clone(),
        })
        .await;
        self.buffers.open(&file_path, &content);
        self.emit(WorkspaceEvent::FileCreated {
            path: file_path.clone(),
        });
        Ok(file_path)
    }

    /// Create a folder (possibly carrying template contents) under
    /// `parent_path`, persist and mirror it. Returns the new folder's path.
    pub async fn add_folder(
        &mut self,
        new_folder: FolderNode,
        parent_path: &str,
    ) -> Result<String, WorkspaceError> {
        let folder_path = path::join(parent_path, &new_folder.name);
        let next = self.tree.insert(parent_path, Node::Folder(new_folder))?;
        self.commit(next).await?;
        let entries = self
            .tree
            .folder_entries(&folder_path)
            .unwrap_or_else(|_| vec![MirrorEntry::Dir(folder_path.clone())]);
        for entry in entries {
            self.mirror_entry(entry).await;
        }
        self.emit(WorkspaceEvent::FolderCreated {
            path: folder_path.clone(),
        });
        Ok(folder_path)
    }

    pub async fn delete_file(&mut self, file_path: &str) -> Result<(), WorkspaceError> {
        let next = self.tree.remove_file(file_path)?;
        self.commit(next).await?;
        if let Some(buffer) = self.buffers.find_by_path(file_path) {
            let id = buffer.id;
            self.buffers.close(id);
        }
        self.mirror(MirrorOp::Remove {
            path: file_path.to_string(),
        })
        .await;
        self.emit(WorkspaceEvent::FileDeleted {
            path: file_path.to_string(),
        });
        Ok(())
    }

    pub async fn delete_folder(&mut self, folder_path: &str) -> Result<(), WorkspaceError> {
        let next = self.tree.remove_folder(folder_path)?;
        self.commit(next).await?;
        self.buffers.close_under(folder_path);
        self.mirror(MirrorOp::Remove {
            path: folder_path.to_string(),
        })
        .await;
        self.emit(WorkspaceEvent::FolderDeleted {
            path: folder_path.to_string(),
        });
        Ok(())
    }

    /// Rename a file in place. Any open buffer follows to the new path
    /// (keeping its id); the mirror drops the old path and writes the new.
    pub async fn rename_file(
        &mut self,
        file_path: &str,
        new_name: &str,
        new_extension: &str,
    ) -> Result<String, WorkspaceError> {
        let (next, new_path) = self.tree.rename_file(file_path, new_name, new_extension)?;
        let content = next.file(&new_path)?.content.clone();
        self.commit(next).await?;
        if let Some(buffer) = self.buffers.find_by_path(file_path) {
            let id = buffer.id;
            self.buffers.set_path(id, &new_path);
        }
        self.mirror(MirrorOp::Remove {
            path: file_path.to_string(),
        })
        .await;
        self.mirror(MirrorOp::Write {
            path: new_path.clone(),
            content,
        })
        .await;
        self.emit(WorkspaceEvent::Renamed {
            from: file_path.to_string(),
            to: new_path.clone(),
        });
        Ok(new_path)
    }

    /// Rename a folder in place. Open buffers underneath follow; the mirror
    /// drops the old directory and rewrites the subtree under the new one.
    pub async fn rename_folder(
        &mut self,
        folder_path: &str,
        new_name: &str,
    ) -> Result<String, WorkspaceError> {
        let (next, new_path) = self.tree.rename_folder(folder_path, new_name)?;
        self.commit(next).await?;
        self.buffers.reroot(folder_path, &new_path);
        self.mirror(MirrorOp::Remove {
            path: folder_path.to_string(),
        })
        .await;
        if let Ok(entries) = self.tree.folder_entries(&new_path) {
            for entry in entries {
                self.mirror_entry(entry).await;
            }
        }
        self.emit(WorkspaceEvent::Renamed {
            from: folder_path.to_string(),
            to: new_path.clone(),
        });
        Ok(new_path)
    }

    /// Commit a buffer's working content into the tree. The node is located
    /// by the buffer's *current* path — renames since open are already
    /// reflected there — and a vanished node surfaces as `PathNotFound`.
    pub async fn save_buffer(&mut self, id: BufferId) -> Result<(), WorkspaceError> {
        let buffer = self
            .buffers
            .get(id)
            .ok_or_else(|| WorkspaceError::PathNotFound(format!("no open buffer {id:?}")))?;
        let file_path = buffer.path.clone();
        let content = buffer.content.clone();

        let next = self.tree.set_file_content(&file_path, &content)?;
        self.commit(next).await?;
        self.mirror(MirrorOp::Write {
            path: file_path.clone(),
            content,
        })
        .await;
        self.buffers.mark_saved(id);
        self.emit(WorkspaceEvent::BufferSaved { path: file_path });
        Ok(())
    }

    /// Rebuild the entire sandbox mirror from the authoritative tree, booting
    /// the sandbox if needed. Used after boot or whenever the mirror is
    /// suspected to have diverged; idempotent.
    pub async fn mirror_all(&self) -> Result<(), WorkspaceError> {
        self.sandbox.instance().await?;
        for entry in self.tree.entries() {
            self.mirror_entry(entry).await;
        }
        Ok(())
    }

    /// Optimistic swap: the new tree goes live before the persist call and
    /// is rolled back if the store rejects it.
    async fn commit(&mut self, next: WorkspaceTree) -> Result<(), WorkspaceError> {
        let previous = std::mem::replace(&mut self.tree, next);
        if let Err(err) = self.store.persist_tree(&self.workspace_id, &self.tree).await {
            self.tree = previous;
            return Err(WorkspaceError::Persistence(err));
        }
        Ok(())
    }

    async fn mirror_entry(&self, entry: MirrorEntry) {
        match entry {
            MirrorEntry::Dir(path) => self.mirror(MirrorOp::Dir { path }).await,
            MirrorEntry::File { path, content } => {
                self.mirror(MirrorOp::Write { path, content }).await
            }
        }
    }

    async fn mirror(&self, op: MirrorOp) {
        let mut delay = self.mirror_backoff;
        for attempt in 1..=self.mirror_attempts {
            let result = match &op {
                MirrorOp::Write { path, content } => self.sandbox.write_file(path, content).await,
                MirrorOp::Dir { path } => self.sandbox.create_dir(path).await,
                MirrorOp::Remove { path } => self.sandbox.remove(path).await,
            };
            match result {
                Ok(()) => return,
                Err(err) if attempt == self.mirror_attempts => {
                    warn!(path = op.path(), error = %err, "mirror step degraded after retries");
                    self.emit(WorkspaceEvent::MirrorDegraded {
                        path: op.path().to_string(),
                        reason: err.to_string(),
                    });
                }
                Err(_) => {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    fn emit(&self, event: WorkspaceEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

//! The open-file working set. Buffers are in-memory copies of file content,
//! independent of the tree and of persistence; the coordinator writes them
//! back through `save_buffer`.

use crate::tree::path;
use sha2::{Digest, Sha256};

/// Stable identity of an open buffer: derived from the node path at open
/// time and deliberately kept stable across later renames, so a tab does
/// not jump when its file moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

impl BufferId {
    pub fn from_path(node_path: &str) -> Self {
        let digest = Sha256::digest(node_path.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(bytes))
    }
}

#[derive(Debug, Clone)]
pub struct Buffer {
    pub id: BufferId,
    /// Current path of the backing node. Updated by the coordinator when a
    /// rename moves the file; the id stays put.
    pub path: String,
    pub content: String,
    pub original_content: String,
    pub has_unsaved_changes: bool,
}

impl Buffer {
    fn new(path: &str, content: &str) -> Self {
        Self {
            id: BufferId::from_path(path),
            path: path.to_string(),
            content: content.to_string(),
            original_content: content.to_string(),
            has_unsaved_changes: false,
        }
    }
}

/// Ordered set of open buffers plus the active-tab focus.
#[derive(Debug, Default)]
pub struct BufferSet {
    buffers: Vec<Buffer>,
    active: Option<BufferId>,
}

impl BufferSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the file at `path`. If a buffer with the derived id already
    /// exists it is merely activated; its content is left alone.
    pub fn open(&mut self, path: &str, content: &str) -> BufferId {
        let id = BufferId::from_path(path);
        if self.buffers.iter().all(|b| b.id != id) {
            self.buffers.push(Buffer::new(path, content));
        }
        self.active = Some(id);
        id
    }

    /// Replace a buffer's working content and recompute the dirty flag.
    /// Returns false when no buffer has that id.
    pub fn update_content(&mut self, id: BufferId, content: impl Into<String>) -> bool {
        match self.buffers.iter_mut().find(|b| b.id == id) {
            Some(buffer) => {
                buffer.content = content.into();
                buffer.has_unsaved_changes = buffer.content != buffer.original_content;
                true
            }
            None => false,
        }
    }

    /// After a successful save: the working content becomes the committed
    /// baseline.
    pub fn mark_saved(&mut self, id: BufferId) {
        if let Some(buffer) = self.buffers.iter_mut().find(|b| b.id == id) {
            buffer.original_content = buffer.content.clone();
            buffer.has_unsaved_changes = false;
        }
    }

    /// Close a buffer. When it was active, focus falls back to the last
    /// buffer in the list (last-in preference, not most-recently-used).
    pub fn close(&mut self, id: BufferId) {
        self.buffers.retain(|b| b.id != id);
        if self.active == Some(id) {
            self.active = self.buffers.last().map(|b| b.id);
        }
    }

    pub fn close_all(&mut self) {
        self.buffers.clear();
        self.active = None;
    }

    pub fn get(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.iter().find(|b| b.id == id)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&Buffer> {
        self.buffers.iter().find(|b| b.path == path)
    }

    pub fn active_buffer(&self) -> Option<&Buffer> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Point a single buffer at a new path (file rename).
    pub(crate) fn set_path(&mut self, id: BufferId, new_path: &str) {
        if let Some(buffer) = self.buffers.iter_mut().find(|b| b.id == id) {
            buffer.path = new_path.to_string();
        }
    }

    /// Rewrite the paths of every buffer under a renamed folder.
    pub(crate) fn reroot(&mut self, old_prefix: &str, new_prefix: &str) {
        for buffer in &mut self.buffers {
            if path::is_under(&buffer.path, old_prefix) {
                buffer.path = path::reroot(&buffer.path, old_prefix, new_prefix);
            }
        }
    }

    /// Drop every buffer under `prefix` (folder deletion). Focus falls back
    /// the same way as `close`.
    pub(crate) fn close_under(&mut self, prefix: &str) {
        self.buffers.retain(|b| !path::is_under(&b.path, prefix));
        if let Some(active) = self.active {
            if self.buffers.iter().all(|b| b.id != active) {
                self.active = self.buffers.last().map(|b| b.id);
            }
        }
    }
}

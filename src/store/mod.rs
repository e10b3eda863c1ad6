//! Persisted Snapshot collaborators. The store owns the durable whole-tree
//! copy for each workspace id; the core only ever replaces it wholesale.

use crate::tree::WorkspaceTree;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Load the tree for a workspace, `None` when the workspace is unknown.
    async fn load_tree(&self, workspace_id: &str) -> Result<Option<WorkspaceTree>>;

    /// Durably replace the stored tree. This is the durability boundary for
    /// every coordinator operation.
    async fn persist_tree(&self, workspace_id: &str, tree: &WorkspaceTree) -> Result<()>;
}

/// In-memory store. Trees are kept as serialized JSON so that every persist
/// and load exercises the wire encoding.
#[derive(Default)]
pub struct MemoryStore {
    trees: Mutex<HashMap<String, String>>,
    persist_count: AtomicUsize,
    fail_persists: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(workspace_id: &str, tree: &WorkspaceTree) -> Self {
        let store = Self::new();
        let encoded = serde_json::to_string(tree).expect("tree serializes");
        store
            .trees
            .lock()
            .expect("store lock")
            .insert(workspace_id.to_string(), encoded);
        store
    }

    pub fn persist_count(&self) -> usize {
        self.persist_count.load(Ordering::SeqCst)
    }

    /// Make subsequent persists fail, to exercise rollback paths.
    pub fn fail_persists(&self, fail: bool) {
        self.fail_persists.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self, workspace_id: &str) -> Option<WorkspaceTree> {
        let trees = self.trees.lock().expect("store lock");
        let encoded = trees.get(workspace_id)?;
        serde_json::from_str(encoded).ok()
    }
}

#[async_trait]
impl TreeStore for MemoryStore {
    async fn load_tree(&self, workspace_id: &str) -> Result<Option<WorkspaceTree>> {
        let trees = self.trees.lock().expect("store lock");
        match trees.get(workspace_id) {
            Some(encoded) => Ok(Some(
                serde_json::from_str(encoded).context("stored tree is corrupt")?,
            )),
            None => Ok(None),
        }
    }

    async fn persist_tree(&self, workspace_id: &str, tree: &WorkspaceTree) -> Result<()> {
        if self.fail_persists.load(Ordering::SeqCst) {
            bail!("injected persistence failure");
        }
        let encoded = serde_json::to_string(tree).context("serialize tree")?;
        self.trees
            .lock()
            .expect("store lock")
            .insert(workspace_id.to_string(), encoded);
        self.persist_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct TemplateEnvelope {
    #[serde(rename = "templateJson")]
    template_json: WorkspaceTree,
}

/// Remote store speaking the workspace service's template endpoint:
/// `GET {base}/api/template/{id}` returns `{"templateJson": ...}`, `PUT`
/// with the same envelope replaces it.
pub struct HttpStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn template_url(&self, workspace_id: &str) -> String {
        format!(
            "{}/api/template/{workspace_id}",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl TreeStore for HttpStore {
    async fn load_tree(&self, workspace_id: &str) -> Result<Option<WorkspaceTree>> {
        let response = self
            .http
            .get(self.template_url(workspace_id))
            .send()
            .await
            .context("template request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .context("template request rejected")?;
        let envelope: TemplateEnvelope = response
            .json()
            .await
            .context("template response is not a tree envelope")?;
        Ok(Some(envelope.template_json))
    }

    async fn persist_tree(&self, workspace_id: &str, tree: &WorkspaceTree) -> Result<()> {
        self.http
            .put(self.template_url(workspace_id))
            .json(&TemplateEnvelope {
                template_json: tree.clone(),
            })
            .send()
            .await
            .context("persist request failed")?
            .error_for_status()
            .context("persist request rejected")?;
        Ok(())
    }
}

//! The workspace tree: a nested file/folder structure addressed by
//! slash-separated paths.
//!
//! Every mutation is copy-on-write: children are held behind `Arc`, so an
//! edit rebuilds only the spine from the root down to the touched folder and
//! shares every untouched subtree with the previous tree. Callers always
//! receive a complete replacement tree; a concurrent reader holding the old
//! one never observes a half-applied edit.

pub mod path;

use crate::error::WorkspaceError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A file leaf. The wire shape keeps the original field names
/// (`filename` / `fileExtension` / `content`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    #[serde(rename = "filename")]
    pub name: String,
    #[serde(rename = "fileExtension", default)]
    pub extension: String,
    #[serde(default)]
    pub content: String,
}

impl FileNode {
    pub fn new(name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            content: String::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// `name.extension`, or just `name` for extension-less files.
    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.extension)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNode {
    #[serde(rename = "folderName")]
    pub name: String,
    #[serde(default)]
    pub items: Vec<Arc<Node>>,
}

impl FolderNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }
}

/// A tree node. Untagged: an object carrying `folderName` is a folder,
/// one carrying `filename` is a file, matching the original JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Folder(FolderNode),
    File(FileNode),
}

impl Node {
    /// Sibling identity: `name.extension` for files, `name` for folders.
    /// Two siblings may never share a key.
    pub fn key(&self) -> String {
        match self {
            Node::Folder(folder) => folder.name.clone(),
            Node::File(file) => file.file_name(),
        }
    }
}

/// One physical effect a tree (or subtree) implies on the sandbox mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEntry {
    Dir(String),
    File { path: String, content: String },
}

/// The root of one workspace. Serializes as `{"items": [...]}`, the same
/// shape as a folder body without a name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceTree {
    #[serde(default)]
    pub items: Vec<Arc<Node>>,
}

impl WorkspaceTree {
    pub fn new(items: Vec<Node>) -> Self {
        Self {
            items: items.into_iter().map(Arc::new).collect(),
        }
    }

    /// Walk folder names from the root, failing on the first absent segment.
    pub fn resolve_folder(&self, folder_path: &str) -> Result<&FolderNode, WorkspaceError> {
        let segs = path::segments(folder_path);
        if segs.is_empty() {
            return Err(WorkspaceError::PathNotFound(folder_path.to_string()));
        }
        let mut items = &self.items;
        let mut found = None;
        for seg in segs {
            let folder = find_folder(items, seg)
                .ok_or_else(|| WorkspaceError::PathNotFound(folder_path.to_string()))?;
            items = &folder.items;
            found = Some(folder);
        }
        // segs is non-empty, so the loop assigned at least once
        found.ok_or_else(|| WorkspaceError::PathNotFound(folder_path.to_string()))
    }

    fn items_at(&self, folder_path: &str) -> Result<&Vec<Arc<Node>>, WorkspaceError> {
        if path::segments(folder_path).is_empty() {
            Ok(&self.items)
        } else {
            Ok(&self.resolve_folder(folder_path)?.items)
        }
    }

    /// Append `node` to the folder at `parent_path`. Rejects a sibling with
    /// the same key with `NameCollision`.
    pub fn insert(&self, parent_path: &str, node: Node) -> Result<Self, WorkspaceError> {
        let segs = path::segments(parent_path);
        let items = update_items(&self.items, &segs, parent_path, move |siblings| {
            let key = node.key();
            if siblings.iter().any(|n| n.key() == key) {
                return Err(WorkspaceError::NameCollision(path::join(parent_path, &key)));
            }
            let mut out = siblings.to_vec();
            out.push(Arc::new(node));
            Ok(out)
        })?;
        Ok(Self { items })
    }

    /// Remove the file at `file_path` (matched on name and extension).
    pub fn remove_file(&self, file_path: &str) -> Result<Self, WorkspaceError> {
        let (parent, leaf) = path::parent_and_leaf(file_path);
        let segs = path::segments(&parent);
        let (name, extension) = path::split_file_name(&leaf);
        let items = update_items(&self.items, &segs, file_path, |siblings| {
            let before = siblings.len();
            let out: Vec<Arc<Node>> = siblings
                .iter()
                .filter(|n| !is_file(n.as_ref(), &name, &extension))
                .cloned()
                .collect();
            if out.len() == before {
                return Err(WorkspaceError::PathNotFound(file_path.to_string()));
            }
            Ok(out)
        })?;
        Ok(Self { items })
    }

    /// Remove the folder at `folder_path` and everything beneath it.
    pub fn remove_folder(&self, folder_path: &str) -> Result<Self, WorkspaceError> {
        let (parent, leaf) = path::parent_and_leaf(folder_path);
        let segs = path::segments(&parent);
        let items = update_items(&self.items, &segs, folder_path, |siblings| {
            let before = siblings.len();
            let out: Vec<Arc<Node>> = siblings
                .iter()
                .filter(|n| !matches!(n.as_ref(), Node::Folder(f) if f.name == leaf))
                .cloned()
                .collect();
            if out.len() == before {
                return Err(WorkspaceError::PathNotFound(folder_path.to_string()));
            }
            Ok(out)
        })?;
        Ok(Self { items })
    }

    /// Rename the file at `file_path` in place (position among its siblings
    /// is preserved). Returns the new tree and the file's new path.
    pub fn rename_file(
        &self,
        file_path: &str,
        new_name: &str,
        new_extension: &str,
    ) -> Result<(Self, String), WorkspaceError> {
        let (parent, leaf) = path::parent_and_leaf(file_path);
        let segs = path::segments(&parent);
        let (name, extension) = path::split_file_name(&leaf);
        let renamed = FileNode::new(new_name, new_extension);
        let new_key = renamed.file_name();
        let new_path = path::join(&parent, &new_key);
        let items = update_items(&self.items, &segs, file_path, |siblings| {
            let idx = siblings
                .iter()
                .position(|n| is_file(n.as_ref(), &name, &extension))
                .ok_or_else(|| WorkspaceError::PathNotFound(file_path.to_string()))?;
            if siblings
                .iter()
                .enumerate()
                .any(|(i, n)| i != idx && n.key() == new_key)
            {
                return Err(WorkspaceError::NameCollision(new_path.clone()));
            }
            let Node::File(existing) = &*siblings[idx] else {
                return Err(WorkspaceError::PathNotFound(file_path.to_string()));
            };
            let mut out = siblings.to_vec();
            out[idx] = Arc::new(Node::File(FileNode {
                name: new_name.to_string(),
                extension: new_extension.to_string(),
                content: existing.content.clone(),
            }));
            Ok(out)
        })?;
        Ok((Self { items }, new_path))
    }

    /// Rename the folder at `folder_path` in place, keeping its contents.
    pub fn rename_folder(
        &self,
        folder_path: &str,
        new_name: &str,
    ) -> Result<(Self, String), WorkspaceError> {
        let (parent, leaf) = path::parent_and_leaf(folder_path);
        let segs = path::segments(&parent);
        let new_path = path::join(&parent, new_name);
        let new_key = new_name.to_string();
        let items = update_items(&self.items, &segs, folder_path, |siblings| {
            let idx = siblings
                .iter()
                .position(|n| matches!(&**n, Node::Folder(f) if f.name == leaf))
                .ok_or_else(|| WorkspaceError::PathNotFound(folder_path.to_string()))?;
            if siblings
                .iter()
                .enumerate()
                .any(|(i, n)| i != idx && n.key() == new_key)
            {
                return Err(WorkspaceError::NameCollision(new_path.clone()));
            }
            let Node::Folder(existing) = &*siblings[idx] else {
                return Err(WorkspaceError::PathNotFound(folder_path.to_string()));
            };
            let mut out = siblings.to_vec();
            out[idx] = Arc::new(Node::Folder(FolderNode {
                name: new_key.clone(),
                items: existing.items.clone(),
            }));
            Ok(out)
        })?;
        Ok((Self { items }, new_path))
    }

    /// Look up the file at `file_path`.
    pub fn file(&self, file_path: &str) -> Result<&FileNode, WorkspaceError> {
        let (parent, leaf) = path::parent_and_leaf(file_path);
        let (name, extension) = path::split_file_name(&leaf);
        let siblings = self.items_at(&parent)?;
        siblings
            .iter()
            .find_map(|n| match &**n {
                Node::File(f) if f.name == name && f.extension == extension => Some(f),
                _ => None,
            })
            .ok_or_else(|| WorkspaceError::PathNotFound(file_path.to_string()))
    }

    /// Replace the content of the file at `file_path`.
    pub fn set_file_content(
        &self,
        file_path: &str,
        content: &str,
    ) -> Result<Self, WorkspaceError> {
        let (parent, leaf) = path::parent_and_leaf(file_path);
        let segs = path::segments(&parent);
        let (name, extension) = path::split_file_name(&leaf);
        let items = update_items(&self.items, &segs, file_path, |siblings| {
            let idx = siblings
                .iter()
                .position(|n| is_file(n.as_ref(), &name, &extension))
                .ok_or_else(|| WorkspaceError::PathNotFound(file_path.to_string()))?;
            let mut out = siblings.to_vec();
            out[idx] = Arc::new(Node::File(FileNode {
                name: name.clone(),
                extension: extension.clone(),
                content: content.to_string(),
            }));
            Ok(out)
        })?;
        Ok(Self { items })
    }

    /// Every directory and file the tree implies on a mirror filesystem,
    /// in depth-first sibling order.
    pub fn entries(&self) -> Vec<MirrorEntry> {
        let mut out = Vec::new();
        collect_entries(&self.items, "", &mut out);
        out
    }

    /// Mirror entries for the subtree rooted at `folder_path`, with paths
    /// anchored at that folder (the folder's own dir entry included).
    pub fn folder_entries(&self, folder_path: &str) -> Result<Vec<MirrorEntry>, WorkspaceError> {
        let folder = self.resolve_folder(folder_path)?;
        let mut out = vec![MirrorEntry::Dir(folder_path.trim_matches('/').to_string())];
        collect_entries(&folder.items, folder_path.trim_matches('/'), &mut out);
        Ok(out)
    }
}

fn is_file(node: &Node, name: &str, extension: &str) -> bool {
    matches!(node, Node::File(f) if f.name == name && f.extension == extension)
}

fn find_folder<'a>(items: &'a [Arc<Node>], name: &str) -> Option<&'a FolderNode> {
    items.iter().find_map(|n| match &**n {
        Node::Folder(f) if f.name == name => Some(f),
        _ => None,
    })
}

/// Rebuild the sibling list at the folder addressed by `segs`, cloning only
/// the `Arc`s along the spine. `full` is the original path, for errors.
fn update_items<F>(
    items: &[Arc<Node>],
    segs: &[&str],
    full: &str,
    apply: F,
) -> Result<Vec<Arc<Node>>, WorkspaceError>
where
    F: FnOnce(&[Arc<Node>]) -> Result<Vec<Arc<Node>>, WorkspaceError>,
{
    if segs.is_empty() {
        return apply(items);
    }
    let seg = segs[0];
    let idx = items
        .iter()
        .position(|n| matches!(&**n, Node::Folder(f) if f.name == seg))
        .ok_or_else(|| WorkspaceError::PathNotFound(full.to_string()))?;
    let Node::Folder(folder) = &*items[idx] else {
        return Err(WorkspaceError::PathNotFound(full.to_string()));
    };
    let children = update_items(&folder.items, &segs[1..], full, apply)?;
    let mut out = items.to_vec();
    out[idx] = Arc::new(Node::Folder(FolderNode {
        name: folder.name.clone(),
        items: children,
    }));
    Ok(out)
}

fn collect_entries(items: &[Arc<Node>], prefix: &str, out: &mut Vec<MirrorEntry>) {
    for node in items {
        let entry_path = path::join(prefix, &node.key());
        match &**node {
            Node::File(file) => out.push(MirrorEntry::File {
                path: entry_path,
                content: file.content.clone(),
            }),
            Node::Folder(folder) => {
                out.push(MirrorEntry::Dir(entry_path.clone()));
                collect_entries(&folder.items, &entry_path, out);
            }
        }
    }
}

/// Editor language id for a file extension, as the rendering surface and
/// suggestion generator expect it.
pub fn language_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "json" => "json",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" | "sass" => "scss",
        "less" => "less",
        "md" | "markdown" => "markdown",
        "xml" => "xml",
        "yaml" | "yml" => "yaml",
        "py" | "python" => "python",
        "java" => "java",
        "c" => "c",
        "cpp" => "cpp",
        "cs" => "csharp",
        "php" => "php",
        "rb" => "ruby",
        "go" => "go",
        "rs" => "rust",
        "sh" | "bash" => "shell",
        "sql" => "sql",
        "toml" | "ini" | "conf" => "ini",
        "dockerfile" => "dockerfile",
        _ => "plaintext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> WorkspaceTree {
        WorkspaceTree::new(vec![
            Node::Folder(FolderNode {
                name: "src".to_string(),
                items: vec![
                    Arc::new(Node::File(
                        FileNode::new("a", "js").with_content("let a = 1;"),
                    )),
                    Arc::new(Node::Folder(FolderNode {
                        name: "nested".to_string(),
                        items: vec![Arc::new(Node::File(FileNode::new("deep", "ts")))],
                    })),
                ],
            }),
            Node::File(FileNode::new("README", "md").with_content("# hi")),
        ])
    }

    #[test]
    fn test_resolve_folder_walks_segments() {
        let tree = sample_tree();
        assert_eq!(tree.resolve_folder("src").expect("src").name, "src");
        assert_eq!(
            tree.resolve_folder("src/nested").expect("nested").name,
            "nested"
        );
        assert!(matches!(
            tree.resolve_folder("src/missing"),
            Err(WorkspaceError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_insert_appends_and_preserves_order() {
        let tree = sample_tree();
        let next = tree
            .insert("src", Node::File(FileNode::new("b", "js")))
            .expect("insert");
        let src = next.resolve_folder("src").expect("src");
        let keys: Vec<String> = src.items.iter().map(|n| n.key()).collect();
        assert_eq!(keys, vec!["a.js", "nested", "b.js"]);
    }

    #[test]
    fn test_insert_rejects_sibling_collision() {
        let tree = sample_tree();
        let err = tree
            .insert("src", Node::File(FileNode::new("a", "js")))
            .expect_err("collision");
        assert!(matches!(err, WorkspaceError::NameCollision(_)));
        // Same name, different extension is a distinct sibling.
        tree.insert("src", Node::File(FileNode::new("a", "ts")))
            .expect("a.ts is distinct from a.js");
    }

    #[test]
    fn test_insert_into_missing_parent_fails() {
        let tree = sample_tree();
        assert!(matches!(
            tree.insert("no/such", Node::File(FileNode::new("x", "js"))),
            Err(WorkspaceError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_remove_file_and_folder() {
        let tree = sample_tree();
        let next = tree.remove_file("src/a.js").expect("remove file");
        assert!(matches!(
            next.file("src/a.js"),
            Err(WorkspaceError::PathNotFound(_))
        ));

        let next = next.remove_folder("src/nested").expect("remove folder");
        assert!(next.resolve_folder("src/nested").is_err());

        assert!(matches!(
            next.remove_file("src/a.js"),
            Err(WorkspaceError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_rename_file_keeps_content_and_position() {
        let tree = sample_tree();
        let (next, new_path) = tree.rename_file("src/a.js", "b", "js").expect("rename");
        assert_eq!(new_path, "src/b.js");
        assert_eq!(next.file("src/b.js").expect("renamed").content, "let a = 1;");
        let src = next.resolve_folder("src").expect("src");
        assert_eq!(src.items[0].key(), "b.js");
    }

    #[test]
    fn test_rename_rejects_collision() {
        let tree = sample_tree();
        let tree = tree
            .insert("src", Node::File(FileNode::new("b", "js")))
            .expect("seed b.js");
        assert!(matches!(
            tree.rename_file("src/a.js", "b", "js"),
            Err(WorkspaceError::NameCollision(_))
        ));
        assert!(matches!(
            tree.rename_folder("src/nested", "b.js"),
            Err(WorkspaceError::NameCollision(_))
        ));
    }

    #[test]
    fn test_set_file_content() {
        let tree = sample_tree();
        let next = tree
            .set_file_content("src/a.js", "let a = 2;")
            .expect("set content");
        assert_eq!(next.file("src/a.js").expect("a.js").content, "let a = 2;");
        // previous tree untouched
        assert_eq!(tree.file("src/a.js").expect("a.js").content, "let a = 1;");
    }

    #[test]
    fn test_mutation_shares_untouched_subtrees() {
        let tree = sample_tree();
        let next = tree
            .set_file_content("src/a.js", "changed")
            .expect("set content");
        // README at the root is reachable from both trees via the same Arc.
        assert!(Arc::ptr_eq(&tree.items[1], &next.items[1]));
        // src itself was on the spine, so it was rebuilt.
        assert!(!Arc::ptr_eq(&tree.items[0], &next.items[0]));
    }

    #[test]
    fn test_entries_depth_first_in_sibling_order() {
        let tree = sample_tree();
        assert_eq!(
            tree.entries(),
            vec![
                MirrorEntry::Dir("src".to_string()),
                MirrorEntry::File {
                    path: "src/a.js".to_string(),
                    content: "let a = 1;".to_string()
                },
                MirrorEntry::Dir("src/nested".to_string()),
                MirrorEntry::File {
                    path: "src/nested/deep.ts".to_string(),
                    content: String::new()
                },
                MirrorEntry::File {
                    path: "README.md".to_string(),
                    content: "# hi".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_json_wire_shape_matches_original_encoding() {
        let tree = WorkspaceTree::new(vec![Node::Folder(FolderNode {
            name: "src".to_string(),
            items: vec![Arc::new(Node::File(
                FileNode::new("index", "js").with_content("x"),
            ))],
        })]);
        let value = serde_json::to_value(&tree).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "items": [{
                    "folderName": "src",
                    "items": [{
                        "filename": "index",
                        "fileExtension": "js",
                        "content": "x"
                    }]
                }]
            })
        );
    }

    #[test]
    fn test_round_trip_preserves_structure_and_order() {
        let tree = sample_tree();
        let encoded = serde_json::to_string(&tree).expect("serialize");
        let decoded: WorkspaceTree = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, tree);
    }

    #[test]
    fn test_deserialize_tolerates_missing_optional_fields() {
        let decoded: WorkspaceTree =
            serde_json::from_str(r#"{"items":[{"folderName":"src"},{"filename":"go"}]}"#)
                .expect("deserialize");
        assert_eq!(decoded.items[0].key(), "src");
        assert_eq!(decoded.items[1].key(), "go");
    }

    #[test]
    fn test_language_for_extension() {
        assert_eq!(language_for_extension("tsx"), "typescript");
        assert_eq!(language_for_extension("RS"), "rust");
        assert_eq!(language_for_extension("weird"), "plaintext");
    }
}

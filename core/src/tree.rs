use tracing::debug;

use crate::copyname::next_copy_name;
use crate::error::TreeError;
use crate::model::{validate_name, Folder, FolderId, Node, NodeDraft, NodeId, Tree};

impl Folder {
    /// Nodes whose id is in `ids`, in folder order. Repeated or foreign ids are ignored.
    pub fn selected(&self, ids: &[NodeId]) -> Vec<Node> {
        self.nodes.iter().filter(|n| ids.contains(&n.id)).cloned().collect()
    }
}

impl Tree {
    pub fn folder(&self, id: FolderId) -> Option<&Folder> {
        self.folders.iter().find(|f| f.id == id)
    }

    fn folder_mut(&mut self, id: FolderId) -> Result<&mut Folder, TreeError> {
        self.folders.iter_mut().find(|f| f.id == id).ok_or(TreeError::FolderNotFound(id))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes().find(|n| n.id == id)
    }

    /// The folder that physically holds node `id`, regardless of its `folder_id`.
    pub fn holder_of(&self, id: NodeId) -> Option<&Folder> {
        self.folders.iter().find(|f| f.nodes.iter().any(|n| n.id == id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.folders.iter().flat_map(|f| f.nodes.iter())
    }

    fn allocate_folder_id(&mut self) -> FolderId {
        let id = self.next_folder_id;
        self.next_folder_id += 1;
        id
    }

    fn allocate_node_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    /// Raise the counters above every id in use so a hand-edited or imported
    /// tree can never hand out a duplicate id.
    pub fn normalize(&mut self) {
        let max_folder = self.folders.iter().map(|f| f.id).max().unwrap_or(0);
        let max_node = self.nodes().map(|n| n.id).max().unwrap_or(0);
        self.next_folder_id = self.next_folder_id.max(max_folder + 1).max(1);
        self.next_node_id = self.next_node_id.max(max_node + 1).max(1);
    }

    pub fn add_folder(&mut self, name: &str) -> Result<&Folder, TreeError> {
        let name = validate_name(name)?;
        let id = self.allocate_folder_id();
        debug!(folder_id = id, "folder created");
        self.folders.push(Folder { id, name, nodes: Vec::new() });
        Ok(&self.folders[self.folders.len() - 1])
    }

    pub fn rename_folder(&mut self, id: FolderId, name: &str) -> Result<&Folder, TreeError> {
        let name = validate_name(name)?;
        let folder = self.folder_mut(id)?;
        folder.name = name;
        Ok(&*folder)
    }

    /// Removes the folder and every node in it. Returns the removed node count.
    pub fn delete_folder(&mut self, id: FolderId) -> Result<usize, TreeError> {
        let pos = self.folders.iter().position(|f| f.id == id).ok_or(TreeError::FolderNotFound(id))?;
        let removed = self.folders.remove(pos);
        debug!(folder_id = id, nodes = removed.nodes.len(), "folder deleted");
        Ok(removed.nodes.len())
    }

    /// Deep copy with a `copy_N_` name and fresh ids for the folder and its nodes.
    pub fn duplicate_folder(&mut self, id: FolderId) -> Result<&Folder, TreeError> {
        let src = self.folder(id).ok_or(TreeError::FolderNotFound(id))?.clone();
        let names: Vec<&str> = self.folders.iter().map(|f| f.name.as_str()).collect();
        let name = next_copy_name(&names, &src.name);
        let new_id = self.allocate_folder_id();
        let mut nodes = Vec::with_capacity(src.nodes.len());
        for n in src.nodes {
            nodes.push(Node { id: self.allocate_node_id(), folder_id: new_id, ..n });
        }
        self.folders.push(Folder { id: new_id, name, nodes });
        Ok(&self.folders[self.folders.len() - 1])
    }

    /// Deletes every node in the folder, keeping the folder itself.
    pub fn clear_folder(&mut self, id: FolderId) -> Result<usize, TreeError> {
        let folder = self.folder_mut(id)?;
        let n = folder.nodes.len();
        folder.nodes.clear();
        Ok(n)
    }

    pub fn add_node(&mut self, folder_id: FolderId, draft: NodeDraft) -> Result<&Node, TreeError> {
        let draft = draft.validated()?;
        // fail before consuming an id
        self.folder_mut(folder_id)?;
        let id = self.allocate_node_id();
        let folder = self.folder_mut(folder_id)?;
        folder.nodes.push(Node {
            id,
            folder_id,
            name: draft.name,
            url: draft.url,
            comment: draft.comment.unwrap_or_default(),
            active: draft.active,
        });
        debug!(node_id = id, folder_id, "node created");
        Ok(&folder.nodes[folder.nodes.len() - 1])
    }

    pub fn update_node(&mut self, id: NodeId, draft: NodeDraft) -> Result<&Node, TreeError> {
        let draft = draft.validated()?;
        let node = self.node_mut(id)?;
        node.name = draft.name;
        node.url = draft.url;
        node.comment = draft.comment.unwrap_or_default();
        node.active = draft.active;
        Ok(&*node)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.folders
            .iter_mut()
            .flat_map(|f| f.nodes.iter_mut())
            .find(|n| n.id == id)
            .ok_or(TreeError::NodeNotFound(id))
    }

    pub fn delete_node(&mut self, id: NodeId) -> Result<(), TreeError> {
        for f in &mut self.folders {
            if let Some(pos) = f.nodes.iter().position(|n| n.id == id) {
                f.nodes.remove(pos);
                return Ok(());
            }
        }
        Err(TreeError::NodeNotFound(id))
    }

    /// Deletes every listed node that exists; unknown ids are ignored.
    pub fn delete_nodes(&mut self, ids: &[NodeId]) -> usize {
        let mut removed = 0;
        for f in &mut self.folders {
            let before = f.nodes.len();
            f.nodes.retain(|n| !ids.contains(&n.id));
            removed += before - f.nodes.len();
        }
        removed
    }

    /// Flips `active` and returns the new value.
    pub fn toggle_node(&mut self, id: NodeId) -> Result<bool, TreeError> {
        let node = self.node_mut(id)?;
        node.active = !node.active;
        Ok(node.active)
    }

    /// Copy of the node placed in the same folder under a `copy_N_` name.
    pub fn duplicate_node(&mut self, id: NodeId) -> Result<&Node, TreeError> {
        let holder = self.holder_of(id).ok_or(TreeError::NodeNotFound(id))?;
        let holder_id = holder.id;
        let names: Vec<&str> = holder.nodes.iter().map(|n| n.name.as_str()).collect();
        let src = self.node(id).ok_or(TreeError::NodeNotFound(id))?;
        let name = next_copy_name(&names, &src.name);
        let copy = Node { name, folder_id: holder_id, ..src.clone() };
        let new_id = self.allocate_node_id();
        let folder = self.folder_mut(holder_id)?;
        folder.nodes.push(Node { id: new_id, ..copy });
        Ok(&folder.nodes[folder.nodes.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_folder() -> (Tree, FolderId) {
        let mut t = Tree::default();
        let id = t.add_folder("Prod").unwrap().id;
        (t, id)
    }

    #[test]
    fn ids_are_allocated_from_counters() {
        let (mut t, fid) = tree_with_folder();
        assert_eq!(fid, 1);
        let a = t.add_node(fid, NodeDraft::new("a", "https://a.example")).unwrap().id;
        let b = t.add_node(fid, NodeDraft::new("b", "https://b.example")).unwrap().id;
        assert_eq!((a, b), (1, 2));
        assert_eq!(t.next_node_id, 3);
        assert_eq!(t.node(b).unwrap().folder_id, fid);
    }

    #[test]
    fn unknown_folder_does_not_consume_an_id() {
        let (mut t, _) = tree_with_folder();
        let err = t.add_node(42, NodeDraft::new("a", "https://a.example")).unwrap_err();
        assert_eq!(err, TreeError::FolderNotFound(42));
        assert_eq!(t.next_node_id, 1);
    }

    #[test]
    fn invalid_drafts_are_rejected() {
        let (mut t, fid) = tree_with_folder();
        assert!(matches!(t.add_node(fid, NodeDraft::new("", "https://a")), Err(TreeError::EmptyName)));
        assert!(matches!(t.add_node(fid, NodeDraft::new("x", "nope")), Err(TreeError::InvalidUrl { .. })));
    }

    #[test]
    fn delete_folder_cascades() {
        let (mut t, fid) = tree_with_folder();
        t.add_node(fid, NodeDraft::new("a", "https://a.example")).unwrap();
        t.add_node(fid, NodeDraft::new("b", "https://b.example")).unwrap();
        assert_eq!(t.delete_folder(fid).unwrap(), 2);
        assert_eq!(t.nodes().count(), 0);
        assert_eq!(t.delete_folder(fid), Err(TreeError::FolderNotFound(fid)));
    }

    #[test]
    fn duplicate_folder_gets_fresh_ids() {
        let (mut t, fid) = tree_with_folder();
        t.add_node(fid, NodeDraft::new("a", "https://a.example")).unwrap();
        let copy = t.duplicate_folder(fid).unwrap().clone();
        assert_eq!(copy.name, "copy_1_Prod");
        assert_ne!(copy.id, fid);
        assert_eq!(copy.nodes.len(), 1);
        assert_eq!(copy.nodes[0].folder_id, copy.id);
        assert_eq!(copy.nodes[0].id, 2);
        let again = t.duplicate_folder(copy.id).unwrap();
        assert_eq!(again.name, "copy_2_Prod");
    }

    #[test]
    fn duplicate_node_stays_in_holder_folder() {
        let (mut t, fid) = tree_with_folder();
        let id = t.add_node(fid, NodeDraft::new("api", "https://a.example")).unwrap().id;
        // a stale back-reference must not break duplication
        t.folders[0].nodes[0].folder_id = 99;
        let copy = t.duplicate_node(id).unwrap();
        assert_eq!(copy.name, "copy_1_api");
        assert_eq!(copy.folder_id, fid);
        assert_eq!(t.folder(fid).unwrap().nodes.len(), 2);
    }

    #[test]
    fn toggle_and_bulk_delete() {
        let (mut t, fid) = tree_with_folder();
        let a = t.add_node(fid, NodeDraft::new("a", "https://a.example")).unwrap().id;
        let b = t.add_node(fid, NodeDraft::new("b", "https://b.example")).unwrap().id;
        assert!(!t.toggle_node(a).unwrap());
        assert!(t.toggle_node(a).unwrap());
        assert_eq!(t.delete_nodes(&[a, b, 777]), 2);
        assert_eq!(t.toggle_node(a), Err(TreeError::NodeNotFound(a)));
    }

    #[test]
    fn normalize_repairs_counters() {
        let mut t = Tree { next_folder_id: 1, next_node_id: 0, folders: vec![] };
        t.folders.push(Folder {
            id: 5,
            name: "x".into(),
            nodes: vec![Node { id: 9, folder_id: 5, name: "n".into(), url: "http://a/".into(), comment: String::new(), active: true }],
        });
        t.normalize();
        assert_eq!((t.next_folder_id, t.next_node_id), (6, 10));
    }

    #[test]
    fn selection_keeps_folder_order() {
        let (mut t, fid) = tree_with_folder();
        let a = t.add_node(fid, NodeDraft::new("a", "https://a.example")).unwrap().id;
        t.add_node(fid, NodeDraft::new("b", "https://b.example")).unwrap();
        let c = t.add_node(fid, NodeDraft::new("c", "https://c.example")).unwrap().id;
        let picked = t.folder(fid).unwrap().selected(&[c, a, c, 404]);
        let ids: Vec<NodeId> = picked.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![a, c]);
        assert!(t.folder(fid).unwrap().selected(&[]).is_empty());
    }

    #[test]
    fn clear_and_update() {
        let (mut t, fid) = tree_with_folder();
        let id = t.add_node(fid, NodeDraft::new("a", "https://a.example")).unwrap().id;
        let mut draft = NodeDraft::new("Home", "http://b.example/x");
        draft.active = false;
        draft.comment = Some("note".into());
        let n = t.update_node(id, draft).unwrap();
        assert_eq!((n.name.as_str(), n.comment.as_str(), n.active), ("Home", "note", false));
        assert_eq!(t.clear_folder(fid).unwrap(), 1);
        assert!(t.folder(fid).unwrap().nodes.is_empty());
        assert_eq!(t.rename_folder(fid, " Staging ").unwrap().name, "Staging");
    }
}

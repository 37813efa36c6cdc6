// 👪 Clone Families - Side table of every instance sharing an id stem
//
// Nodes own their children; everything else (parent links, owning entry,
// family membership) is a non-owning id lookup rebuilt from the entries.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::tree::node::{Entry, EntryKey, Node, NodeId};

#[derive(Debug, Clone, Default)]
pub struct FamilyIndex {
    /// stem -> instance ids in document pre-order
    families: BTreeMap<String, Vec<NodeId>>,

    /// id -> parent id (`None` for entry roots)
    parents: HashMap<NodeId, Option<NodeId>>,

    /// id -> owning entry
    owners: HashMap<NodeId, EntryKey>,
}

impl FamilyIndex {
    pub fn build(entries: &[Entry]) -> Self {
        let mut index = FamilyIndex::default();
        for entry in entries {
            index.visit(&entry.root, None, entry.key);
        }
        index
    }

    fn visit(&mut self, node: &Node, parent: Option<&NodeId>, key: EntryKey) {
        self.families
            .entry(node.id.stem().to_string())
            .or_default()
            .push(node.id.clone());
        self.parents.insert(node.id.clone(), parent.cloned());
        self.owners.insert(node.id.clone(), key);

        for child in &node.children {
            self.visit(child, Some(&node.id), key);
        }
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.parents.contains_key(id)
    }

    /// Every instance of `id`'s family, `id` included; empty when unknown
    pub fn family(&self, id: &NodeId) -> &[NodeId] {
        self.families
            .get(id.stem())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True when other instances share `id`'s stem
    pub fn has_mirrors(&self, id: &NodeId) -> bool {
        self.family(id).len() > 1
    }

    pub fn parent(&self, id: &NodeId) -> Option<&NodeId> {
        self.parents.get(id).and_then(Option::as_ref)
    }

    pub fn entry_of(&self, id: &NodeId) -> Option<EntryKey> {
        self.owners.get(id).copied()
    }

    /// A clone instance whose parent does not belong to the same clone branch
    pub fn is_clone_root(&self, id: &NodeId) -> bool {
        if !id.is_clone() || !self.contains(id) {
            return false;
        }
        match self.parent(id) {
            Some(parent) => parent.branch() != id.branch(),
            None => true,
        }
    }

    /// Every suffix token currently in use
    pub fn suffixes(&self) -> HashSet<String> {
        self.parents
            .keys()
            .flat_map(|id| id.suffix_tokens())
            .map(str::to_string)
            .collect()
    }

    pub fn families(&self) -> impl Iterator<Item = (&str, &[NodeId])> {
        self.families.iter().map(|(stem, ids)| (stem.as_str(), ids.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

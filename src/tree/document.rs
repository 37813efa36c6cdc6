// 📄 Template Document - Mutable forest of funding lines and calculations
//
// Every mutation is applied to a working copy of the entries, checked against
// the document invariants and only then committed. A refused mutation leaves
// the document exactly as it was.
//
// Clone propagation rules:
// - instances of one family have the same attributes and the same child stems
// - a node added or moved under a family is placed as-is under the original
//   parent and with `:s` appended to every id under the clone instance `p:s`
// - a cloned copy takes a fresh suffix token under every instance of the new
//   parent, so each copy is a clone root

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{TreeError, TreeResult};
use crate::template::TemplateContent;
use crate::transform::{datasource_to_template_funding_lines, template_funding_lines_to_datasource};
use crate::tree::family::FamilyIndex;
use crate::tree::invariants;
use crate::tree::node::{Entry, EntryKey, Node, NodeId, NodeKind};
use crate::tree::query::get_last_used_id;
use crate::tree::suffix::{FreshSuffixes, SuffixSource};

// ============================================================================
// ID ALLOCATOR
// ============================================================================

/// Notified once for every node instance an insert writes into the document
///
/// Hosts use it to advance their next-template-id counters; tests use it to
/// count the clone fan-out of an insert.
pub trait IdAllocator {
    fn allocate(&mut self, id: &NodeId);
}

impl<F> IdAllocator for F
where
    F: FnMut(&NodeId),
{
    fn allocate(&mut self, id: &NodeId) {
        self(id)
    }
}

// ============================================================================
// UPDATE MODEL
// ============================================================================

/// New attribute values for a node and all of its clones
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUpdate {
    pub id: NodeId,
    pub kind: NodeKind,
}

// ============================================================================
// DOCUMENT
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Document {
    entries: Vec<Entry>,
    index: FamilyIndex,
}

impl Document {
    /// Empty document
    pub fn new() -> Self {
        Document::default()
    }

    /// Build a document, refusing entries that break the invariants
    pub fn from_entries(entries: Vec<Entry>) -> TreeResult<Self> {
        invariants::check(&entries)?;
        let index = FamilyIndex::build(&entries);
        Ok(Document { entries, index })
    }

    /// Load a nested template; recurring template ids become clone instances
    pub fn from_template(content: &TemplateContent, suffixes: &mut dyn SuffixSource) -> TreeResult<Self> {
        Document::from_entries(template_funding_lines_to_datasource(&content.funding_lines, suffixes))
    }

    /// Nested template for saving
    pub fn to_template(&self) -> TemplateContent {
        TemplateContent::new(datasource_to_template_funding_lines(&self.entries))
    }

    /// Next unused template line / calculation id
    pub fn next_template_id(&self) -> u32 {
        if self.entries.is_empty() {
            return 0;
        }
        get_last_used_id(&self.to_template().funding_lines) + 1
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    pub fn entry(&self, key: EntryKey) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn find_node(&self, id: &NodeId) -> Option<&Node> {
        find_in(&self.entries, id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains(id)
    }

    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    /// All instances sharing `id`'s stem (original first in document order)
    pub fn clone_family(&self, id: &NodeId) -> Vec<NodeId> {
        self.index.family(id).to_vec()
    }

    pub fn index(&self) -> &FamilyIndex {
        &self.index
    }

    pub fn validate(&self) -> TreeResult<()> {
        invariants::check(&self.entries)
    }

    // ========================================================================
    // ADD
    // ========================================================================

    /// Append a new top-level funding line as its own entry; returns the new key
    pub fn add_entry(&mut self, root: Node) -> TreeResult<EntryKey> {
        let key = self.entries.iter().map(|e| e.key).max().unwrap_or(0) + 1;
        let mut working = self.entries.clone();
        working.push(Entry::new(key, root));

        self.commit(working, "add_entry")?;
        Ok(key)
    }

    /// Append `new_node` under `parent_id` and under every clone of that parent
    pub fn add_node(
        &mut self,
        parent_id: &NodeId,
        new_node: Node,
        allocator: &mut dyn IdAllocator,
    ) -> TreeResult<()> {
        if !self.index.contains(parent_id) {
            return Err(TreeError::not_found(parent_id));
        }
        if let Some(clone) = new_node.iter().find(|n| n.id.is_clone()) {
            return Err(TreeError::invariant(format!(
                "new node id `{}` must not carry a clone suffix",
                clone.id
            )));
        }

        let mut working = self.entries.clone();
        let mut inserted = Vec::new();

        for member in self.index.family(parent_id) {
            let mut instance = match member.suffix() {
                Some(suffix) => new_node.suffixed(suffix),
                None => new_node.clone(),
            };
            if let Some(key) = self.index.entry_of(member) {
                instance.stamp_entry_key(key);
            }
            inserted.push(instance.id.clone());
            attach(&mut working, member, instance)?;
        }

        self.commit(working, "add_node")?;
        for id in &inserted {
            allocator.allocate(id);
        }
        debug!(parent = %parent_id, instances = inserted.len(), "node added");
        Ok(())
    }

    // ========================================================================
    // UPDATE
    // ========================================================================

    /// Overwrite the attributes of `update.id` and of every clone of it
    pub fn update_node(&mut self, update: &NodeUpdate) -> TreeResult<()> {
        let current = self
            .find_node(&update.id)
            .ok_or_else(|| TreeError::not_found(&update.id))?;
        if !current.kind.same_kind(&update.kind) {
            return Err(TreeError::KindMismatch {
                id: update.id.clone(),
                expected: update.kind.kind_name(),
                actual: current.kind.kind_name(),
            });
        }

        let mut working = self.entries.clone();
        let family = self.index.family(&update.id);
        for member in family {
            let node = find_mut_in(&mut working, member).ok_or_else(|| TreeError::not_found(member))?;
            node.kind = update.kind.clone();
        }

        let instances = family.len();
        self.commit(working, "update_node")?;
        debug!(id = %update.id, instances, "node updated");
        Ok(())
    }

    // ========================================================================
    // REMOVE
    // ========================================================================

    /// Delete a node
    ///
    /// - original (or node without clones): every instance of the family goes
    /// - clone root: only that clone branch goes
    /// - clone descendant: refused with `InvalidDelete`
    pub fn remove_node(&mut self, node_id: &NodeId) -> TreeResult<()> {
        if !self.index.contains(node_id) {
            return Err(TreeError::not_found(node_id));
        }

        let targets: Vec<NodeId> = if !node_id.is_clone() || !self.index.has_mirrors(node_id) {
            self.index.family(node_id).to_vec()
        } else if self.index.is_clone_root(node_id) {
            self.branch_instances(node_id)?
        } else {
            return Err(TreeError::InvalidDelete {
                id: node_id.clone(),
                original: node_id.original(),
            });
        };

        let mut working = self.entries.clone();
        let removed = remove_cascade(&mut working, targets.into_iter().collect());

        self.commit(working, "remove_node")?;
        debug!(id = %node_id, removed, "node removed");
        Ok(())
    }

    /// `node_id` plus the nodes holding its position under each clone of its parent
    fn branch_instances(&self, node_id: &NodeId) -> TreeResult<Vec<NodeId>> {
        let Some(parent_id) = self.index.parent(node_id) else {
            return Ok(vec![node_id.clone()]);
        };
        let position = self.child_position(parent_id, node_id)?;

        let mut instances = Vec::new();
        for member in self.index.family(parent_id) {
            let parent = self.find_node(member).ok_or_else(|| TreeError::not_found(member))?;
            if let Some(child) = parent.children.get(position) {
                instances.push(child.id.clone());
            }
        }
        Ok(instances)
    }

    fn child_position(&self, parent_id: &NodeId, child_id: &NodeId) -> TreeResult<usize> {
        self.find_node(parent_id)
            .and_then(|p| p.children.iter().position(|c| &c.id == child_id))
            .ok_or_else(|| TreeError::not_found(child_id))
    }

    // ========================================================================
    // MOVE
    // ========================================================================

    /// Move `dragged_id` (in entry `source_key`) under `new_parent_id` (in entry
    /// `target_key`), mirroring the detach over the old parent's clones and the
    /// attach over the new parent's clones
    pub fn move_node(
        &mut self,
        dragged_id: &NodeId,
        source_key: EntryKey,
        target_key: EntryKey,
        new_parent_id: &NodeId,
    ) -> TreeResult<()> {
        self.require_in_entry(dragged_id, source_key)?;
        self.require_in_entry(new_parent_id, target_key)?;

        let dragged = self
            .find_node(dragged_id)
            .ok_or_else(|| TreeError::not_found(dragged_id))?;
        if dragged.contains(new_parent_id) {
            return Err(TreeError::InvalidMove {
                id: dragged_id.clone(),
                reason: format!("`{}` is inside the moved branch", new_parent_id),
            });
        }

        let mut working = self.entries.clone();

        let payload = match self.index.parent(dragged_id) {
            None => {
                working.retain(|e| &e.root.id != dragged_id);
                dragged.clone()
            }
            Some(old_parent) => {
                let position = self.child_position(old_parent, dragged_id)?;
                let mut payload = None;
                for member in self.index.family(old_parent) {
                    let parent = find_mut_in(&mut working, member)
                        .ok_or_else(|| TreeError::not_found(member))?;
                    if position >= parent.children.len() {
                        return Err(TreeError::invariant(format!(
                            "`{}` does not mirror `{}`",
                            member, old_parent
                        )));
                    }
                    let detached = parent.children.remove(position);
                    if !member.is_clone() {
                        payload = Some(detached);
                    }
                }
                payload.ok_or_else(|| TreeError::not_found(&old_parent.original()))?
            }
        };

        let detached_index = FamilyIndex::build(&working);
        if !detached_index.contains(new_parent_id) {
            return Err(TreeError::InvalidMove {
                id: dragged_id.clone(),
                reason: format!("`{}` is inside a mirror of the moved branch", new_parent_id),
            });
        }

        for member in detached_index.family(new_parent_id) {
            let mut instance = match member.suffix() {
                Some(suffix) => payload.suffixed(suffix),
                None => payload.clone(),
            };
            if let Some(key) = detached_index.entry_of(member) {
                instance.stamp_entry_key(key);
            }
            attach(&mut working, member, instance)?;
        }

        self.commit(working, "move_node")?;
        debug!(id = %dragged_id, to = %new_parent_id, "node moved");
        Ok(())
    }

    // ========================================================================
    // CLONE
    // ========================================================================

    /// Deep-copy `source_id` under `new_parent_id` as a new clone branch
    ///
    /// Every id of the copy gets a fresh suffix token appended (`n3` becomes
    /// `n3:<fresh>`, `n0:7` inside it becomes `n0:7:<fresh>`). Each clone of the
    /// parent receives its own copy with its own token. Returns the id of the
    /// copy under `new_parent_id`, which is a clone root.
    pub fn clone_node(
        &mut self,
        source_id: &NodeId,
        source_key: EntryKey,
        target_key: EntryKey,
        new_parent_id: &NodeId,
        suffixes: &mut dyn SuffixSource,
    ) -> TreeResult<NodeId> {
        self.require_in_entry(source_id, source_key)?;
        self.require_in_entry(new_parent_id, target_key)?;

        let source = self
            .find_node(source_id)
            .ok_or_else(|| TreeError::not_found(source_id))?;
        if source.contains(new_parent_id) {
            return Err(TreeError::InvalidStructure {
                reason: format!("cannot clone `{}` into its own subtree", source_id),
            });
        }

        let mut fresh = FreshSuffixes::new(suffixes, self.index.suffixes());
        let mut working = self.entries.clone();

        // Requested parent first so its copy takes the first fresh token
        let members = std::iter::once(new_parent_id).chain(
            self.index
                .family(new_parent_id)
                .iter()
                .filter(|member| *member != new_parent_id),
        );

        let mut new_id = None;
        let mut copies = 0;
        for member in members {
            let mut instance = source.suffixed(&fresh.next_suffix());
            if let Some(key) = self.index.entry_of(member) {
                instance.stamp_entry_key(key);
            }
            if new_id.is_none() {
                new_id = Some(instance.id.clone());
            }
            attach(&mut working, member, instance)?;
            copies += 1;
        }

        let new_id = new_id.ok_or_else(|| TreeError::not_found(new_parent_id))?;
        self.commit(working, "clone_node")?;
        debug!(source = %source_id, clone = %new_id, copies, "node cloned");
        Ok(new_id)
    }

    /// Prune `remove_id` after it turned out to duplicate `keep_id`
    ///
    /// Only the one instance is removed; nothing is mirrored. Refused when the
    /// pruning would desynchronise clones or orphan clones of nodes inside it.
    /// `keep_id` is the merge anchor: it is only validated (an existing
    /// calculation outside the pruned subtree) and is never modified.
    pub fn clone_calculation(&mut self, remove_id: &NodeId, keep_id: &NodeId) -> TreeResult<()> {
        let remove = self
            .find_node(remove_id)
            .ok_or_else(|| TreeError::not_found(remove_id))?;
        let keep = self
            .find_node(keep_id)
            .ok_or_else(|| TreeError::not_found(keep_id))?;

        for node in [remove, keep] {
            if !node.is_calculation() {
                return Err(TreeError::KindMismatch {
                    id: node.id.clone(),
                    expected: "calculation",
                    actual: node.kind.kind_name(),
                });
            }
        }
        if remove.contains(keep_id) {
            return Err(TreeError::InvalidStructure {
                reason: format!("`{}` is inside `{}`", keep_id, remove_id),
            });
        }

        let mut working = self.entries.clone();
        for entry in &mut working {
            entry.root.remove_where(&mut |_: &NodeId, child: &Node| &child.id == remove_id);
        }

        self.commit(working, "clone_calculation")?;
        debug!(removed = %remove_id, kept = %keep_id, "duplicate calculation pruned");
        Ok(())
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn require_in_entry(&self, id: &NodeId, key: EntryKey) -> TreeResult<()> {
        if self.entry(key).is_none() {
            return Err(TreeError::EntryNotFound { key });
        }
        match self.index.entry_of(id) {
            Some(owner) if owner == key => Ok(()),
            _ => Err(TreeError::not_found(id)),
        }
    }

    fn commit(&mut self, working: Vec<Entry>, operation: &'static str) -> TreeResult<()> {
        if let Err(err) = invariants::check(&working) {
            warn!(operation, error = %err, "tree mutation refused");
            return Err(err);
        }
        self.index = FamilyIndex::build(&working);
        self.entries = working;
        Ok(())
    }
}

// ============================================================================
// ENTRY HELPERS
// ============================================================================

pub(crate) fn find_in<'a>(entries: &'a [Entry], id: &NodeId) -> Option<&'a Node> {
    entries.iter().find_map(|e| e.root.find(id))
}

pub(crate) fn find_mut_in<'a>(entries: &'a mut [Entry], id: &NodeId) -> Option<&'a mut Node> {
    entries.iter_mut().find_map(|e| e.root.find_mut(id))
}

fn attach(entries: &mut [Entry], parent_id: &NodeId, child: Node) -> TreeResult<()> {
    let parent = find_mut_in(entries, parent_id).ok_or_else(|| TreeError::not_found(parent_id))?;
    parent.children.push(child);
    Ok(())
}

/// Remove `targets`; removing an original also removes every clone of it,
/// including originals found inside removed subtrees. Returns the node count removed.
fn remove_cascade(entries: &mut Vec<Entry>, mut targets: HashSet<NodeId>) -> usize {
    let mut removed_total = 0;

    while !targets.is_empty() {
        let mut removed: Vec<Node> = Vec::new();

        let (dropped, kept): (Vec<Entry>, Vec<Entry>) = entries
            .drain(..)
            .partition(|e| targets.contains(&e.root.id));
        *entries = kept;
        removed.extend(dropped.into_iter().map(|e| e.root));

        for entry in entries.iter_mut() {
            removed.extend(
                entry
                    .root
                    .remove_where(&mut |_: &NodeId, child: &Node| targets.contains(&child.id)),
            );
        }

        let remaining = FamilyIndex::build(entries);
        let mut next = HashSet::new();
        for node in removed.iter().flat_map(|root| root.iter()) {
            removed_total += 1;
            if !node.id.is_clone() {
                next.extend(remaining.family(&node.id).iter().cloned());
            }
        }
        targets = next;
    }

    removed_total
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::fixtures::{calc, line, shared_calculation_document, two_clone_branch_document};
    use crate::tree::node::{CalculationType, FundingLineType};
    use crate::tree::suffix::SequentialSuffixes;

    fn id(raw: &str) -> NodeId {
        NodeId::from(raw)
    }

    fn ids_with_stem(doc: &Document, stem: &str) -> Vec<String> {
        doc.entries()
            .iter()
            .flat_map(|e| e.root.iter())
            .filter(|n| n.id.stem() == stem)
            .map(|n| n.id.to_string())
            .collect()
    }

    fn renamed_calc(node_id: &str, name: &str) -> NodeUpdate {
        let mut kind = calc(node_id, 4).kind;
        if let NodeKind::Calculation(c) = &mut kind {
            c.name = name.to_string();
            c.calculation_type = CalculationType::Adjustment;
        }
        NodeUpdate { id: id(node_id), kind }
    }

    #[test]
    fn test_update_clone_propagates_to_original() {
        let mut doc = shared_calculation_document();
        doc.update_node(&renamed_calc("n0:12345", "New Name")).unwrap();

        for instance in ["n0", "n0:12345"] {
            let node = doc.find_node(&id(instance)).unwrap();
            assert_eq!(node.name(), "New Name");
            match &node.kind {
                NodeKind::Calculation(c) => assert_eq!(c.calculation_type, CalculationType::Adjustment),
                other => panic!("unexpected kind {:?}", other),
            }
        }
    }

    #[test]
    fn test_update_original_propagates_to_clone() {
        let mut doc = shared_calculation_document();
        doc.update_node(&renamed_calc("n0", "Renamed")).unwrap();

        assert_eq!(doc.find_node(&id("n0:12345")).unwrap().name(), "Renamed");
    }

    #[test]
    fn test_update_missing_node() {
        let mut doc = shared_calculation_document();
        let err = doc.update_node(&renamed_calc("n99", "x")).unwrap_err();

        assert_eq!(err, TreeError::not_found(&id("n99")));
    }

    #[test]
    fn test_update_kind_mismatch_leaves_document() {
        let mut doc = shared_calculation_document();
        let before = doc.entries().to_vec();

        let update = NodeUpdate { id: id("n0"), kind: line("n0", 0).kind };
        let err = doc.update_node(&update).unwrap_err();

        assert!(matches!(err, TreeError::KindMismatch { .. }));
        assert_eq!(doc.entries(), before.as_slice());
    }

    #[test]
    fn test_update_to_template_id_of_other_family_refused() {
        let mut doc = shared_calculation_document();
        let before = doc.entries().to_vec();

        let mut update = NodeUpdate { id: id("n2"), kind: line("n2", 1).kind };
        if let NodeKind::FundingLine(l) = &mut update.kind {
            l.line_type = FundingLineType::Payment;
        }
        let err = doc.update_node(&update).unwrap_err();

        assert!(matches!(err, TreeError::InvariantViolation { .. }));
        assert_eq!(doc.entries(), before.as_slice());
    }

    #[test]
    fn test_remove_original_cascades() {
        let mut doc = shared_calculation_document();
        doc.remove_node(&id("n0")).unwrap();

        assert!(ids_with_stem(&doc, "n0").is_empty());
        assert_eq!(doc.node_count(), 3);
    }

    #[test]
    fn test_remove_clone_root_only_removes_instance() {
        let mut doc = shared_calculation_document();
        doc.remove_node(&id("n0:12345")).unwrap();

        assert_eq!(ids_with_stem(&doc, "n0"), vec!["n0"]);
        assert_eq!(doc.entry(1).unwrap().root.children.len(), 1);
        assert_eq!(doc.node_count(), 4);
    }

    #[test]
    fn test_remove_clone_descendant_refused() {
        let mut doc = shared_calculation_document();
        doc.add_node(&id("n0"), calc("n7", 7), &mut |_: &NodeId| {}).unwrap();
        let before = doc.entries().to_vec();

        let err = doc.remove_node(&id("n7:12345")).unwrap_err();

        assert_eq!(
            err,
            TreeError::InvalidDelete { id: id("n7:12345"), original: id("n7") }
        );
        assert_eq!(doc.entries(), before.as_slice());
    }

    #[test]
    fn test_remove_original_of_descendant_cascades() {
        let mut doc = shared_calculation_document();
        doc.add_node(&id("n0"), calc("n7", 7), &mut |_: &NodeId| {}).unwrap();

        doc.remove_node(&id("n7")).unwrap();

        assert!(ids_with_stem(&doc, "n7").is_empty());
        assert!(doc.find_node(&id("n0")).unwrap().children.is_empty());
        assert!(doc.find_node(&id("n0:12345")).unwrap().children.is_empty());
    }

    #[test]
    fn test_remove_entry_root() {
        let mut doc = shared_calculation_document();
        doc.remove_node(&id("n3")).unwrap();

        assert_eq!(doc.entries().len(), 1);
        assert!(doc.entry(2).is_none());
        assert_eq!(ids_with_stem(&doc, "n0"), vec!["n0"]);
    }

    #[test]
    fn test_remove_root_containing_original_cascades_to_clones_elsewhere() {
        let mut doc = shared_calculation_document();
        doc.remove_node(&id("n1")).unwrap();

        assert!(doc.entry(1).is_none());
        assert!(ids_with_stem(&doc, "n0").is_empty());
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_remove_original_cascades_to_every_clone_branch() {
        let mut doc = two_clone_branch_document();
        assert_eq!(doc.node_count(), 7);

        doc.remove_node(&id("n0")).unwrap();

        assert!(ids_with_stem(&doc, "n0").is_empty());
        assert_eq!(doc.node_count(), 4);
        assert!(doc.find_node(&id("n5")).unwrap().children.is_empty());
    }

    #[test]
    fn test_remove_clone_root_keeps_sibling_branch() {
        let mut doc = two_clone_branch_document();

        doc.remove_node(&id("n0:a")).unwrap();

        assert_eq!(ids_with_stem(&doc, "n0"), vec!["n0", "n0:b"]);
        assert_eq!(doc.node_count(), 6);
        assert_eq!(doc.find_node(&id("n5")).unwrap().children[0].id, id("n0:b"));
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_update_reaches_every_clone_branch() {
        let mut doc = two_clone_branch_document();

        doc.update_node(&renamed_calc("n0:b", "Everywhere")).unwrap();

        for instance in ["n0", "n0:a", "n0:b"] {
            assert_eq!(doc.find_node(&id(instance)).unwrap().name(), "Everywhere");
        }
    }

    #[test]
    fn test_remove_missing() {
        let mut doc = shared_calculation_document();
        assert_eq!(doc.remove_node(&id("n42")).unwrap_err(), TreeError::not_found(&id("n42")));
    }

    #[test]
    fn test_add_node_without_clones() {
        let mut doc = shared_calculation_document();
        let mut calls = 0;
        doc.add_node(&id("n3"), calc("n4", 5), &mut |_: &NodeId| calls += 1).unwrap();

        assert_eq!(calls, 1);
        let n3 = doc.find_node(&id("n3")).unwrap();
        assert_eq!(n3.children.len(), 3);
        assert_eq!(n3.children[2].id, id("n4"));
        assert_eq!(n3.children[2].ds_key, Some(2));
    }

    #[test]
    fn test_add_node_fans_out_to_clones() {
        let mut doc = shared_calculation_document();
        let mut allocated = Vec::new();
        doc.add_node(&id("n0:12345"), calc("n4", 5), &mut |i: &NodeId| allocated.push(i.clone()))
            .unwrap();

        assert_eq!(allocated, vec![id("n4"), id("n4:12345")]);

        let original = doc.find_node(&id("n0")).unwrap();
        let clone = doc.find_node(&id("n0:12345")).unwrap();
        assert_eq!(original.children.len(), 1);
        assert_eq!(clone.children.len(), 1);
        assert_ne!(original.children[0].id, clone.children[0].id);
        assert_eq!(clone.children[0].ds_key, Some(2));
    }

    #[test]
    fn test_add_node_missing_parent() {
        let mut doc = shared_calculation_document();
        let mut calls = 0;
        let err = doc
            .add_node(&id("nope"), calc("n4", 5), &mut |_: &NodeId| calls += 1)
            .unwrap_err();

        assert_eq!(err, TreeError::not_found(&id("nope")));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_add_node_colliding_id_refused() {
        let mut doc = shared_calculation_document();
        let before = doc.entries().to_vec();

        let err = doc.add_node(&id("n3"), calc("n2", 9), &mut |_: &NodeId| {}).unwrap_err();

        assert!(matches!(err, TreeError::InvariantViolation { .. }));
        assert_eq!(doc.entries(), before.as_slice());
    }

    #[test]
    fn test_add_funding_line_under_calculation_refused() {
        let mut doc = shared_calculation_document();
        let err = doc.add_node(&id("n0"), line("n8", 8), &mut |_: &NodeId| {}).unwrap_err();

        assert!(matches!(err, TreeError::InvalidStructure { .. }));
    }

    #[test]
    fn test_clone_node_into_other_entry() {
        let mut doc = shared_calculation_document();
        let mut suffixes = SequentialSuffixes::new();
        let new_id = doc
            .clone_node(&id("n3"), 2, 1, &id("n1"), &mut suffixes)
            .unwrap();

        assert!(new_id.as_str().starts_with("n3:"));
        let n1 = doc.find_node(&id("n1")).unwrap();
        assert_eq!(n1.children.last().unwrap().id, new_id);
        assert_eq!(doc.entry(2).unwrap().root.id, id("n3"));
        assert_eq!(doc.entry(2).unwrap().root.children.len(), 2);
    }

    #[test]
    fn test_clone_node_suffixes_whole_subtree() {
        let mut doc = shared_calculation_document();
        let mut suffixes = SequentialSuffixes::new();
        let new_id = doc
            .clone_node(&id("n3"), 2, 1, &id("n1"), &mut suffixes)
            .unwrap();

        let suffix = new_id.suffix().unwrap().to_string();
        let copy = doc.find_node(&new_id).unwrap();
        let copied: Vec<String> = copy.iter().map(|n| n.id.to_string()).collect();
        assert_eq!(
            copied,
            vec![
                format!("n3:{}", suffix),
                format!("n2:{}", suffix),
                format!("n0:12345:{}", suffix),
            ]
        );

        let mut seen = HashSet::new();
        for entry in doc.entries() {
            for node in entry.root.iter() {
                assert!(seen.insert(node.id.clone()), "duplicate id {}", node.id);
            }
        }
    }

    #[test]
    fn test_clone_node_skips_suffix_in_use() {
        let mut doc = shared_calculation_document();
        let mut suffixes = SequentialSuffixes::starting_at(12345);
        let new_id = doc
            .clone_node(&id("n2"), 2, 1, &id("n1"), &mut suffixes)
            .unwrap();

        assert_eq!(new_id, id("n2:12346"));
    }

    #[test]
    fn test_clone_node_into_clone_parent_mirrors() {
        let mut doc = shared_calculation_document();
        let mut suffixes = SequentialSuffixes::new();
        doc.add_entry(line("n8", 8).with_children(vec![calc("n9", 9)])).unwrap();

        let copy = doc
            .clone_node(&id("n9"), 3, 2, &id("n0:12345"), &mut suffixes)
            .unwrap();

        assert_eq!(copy, id("n9:1"));
        let original = doc.find_node(&id("n0")).unwrap();
        assert_eq!(original.children[0].id, id("n9:2"));
        assert_eq!(original.children[0].ds_key, Some(1));
        assert!(doc.index().is_clone_root(&copy));
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_clone_under_clone_parent_can_be_deleted_by_returned_id() {
        let mut doc = shared_calculation_document();
        doc.add_entry(line("n8", 8).with_children(vec![calc("n9", 9)])).unwrap();
        let copy = doc
            .clone_node(&id("n9"), 3, 2, &id("n0:12345"), &mut SequentialSuffixes::new())
            .unwrap();

        doc.remove_node(&copy).unwrap();

        assert_eq!(ids_with_stem(&doc, "n9"), vec!["n9"]);
        assert!(doc.find_node(&id("n0")).unwrap().children.is_empty());
        assert!(doc.find_node(&id("n0:12345")).unwrap().children.is_empty());
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_clone_line_into_calculation_refused() {
        let mut doc = shared_calculation_document();
        doc.add_entry(line("n5", 5)).unwrap();
        let before = doc.entries().to_vec();

        let err = doc
            .clone_node(&id("n5"), 3, 2, &id("n0:12345"), &mut SequentialSuffixes::new())
            .unwrap_err();

        assert!(matches!(err, TreeError::InvalidStructure { .. }));
        assert_eq!(doc.entries(), before.as_slice());
    }

    #[test]
    fn test_clone_subtree_holding_original_and_clone_of_one_family() {
        // Entry 1: n0 -> [n1 -> [n2, n3 -> [n2:1]]]
        // Entry 2: n4 -> [n1:2 -> [n2:2, n3:2 -> [n2:1:2]]]
        let branch = |suffix: &str| {
            let named = |base: &str| match suffix {
                "" => base.to_string(),
                s => format!("{}:{}", base, s),
            };
            line(&named("n1"), 2).with_children(vec![
                calc(&named("n2"), 4),
                calc(&named("n3"), 5).with_children(vec![calc(&named("n2:1"), 4)]),
            ])
        };
        let mut doc = Document::from_entries(vec![
            Entry::new(1, line("n0", 0).with_children(vec![branch("")])),
            Entry::new(2, line("n4", 1).with_children(vec![branch("2")])),
        ])
        .unwrap();

        let copy = doc
            .clone_node(&id("n1"), 1, 2, &id("n4"), &mut SequentialSuffixes::new())
            .unwrap();

        assert_eq!(copy, id("n1:3"));
        let copied: Vec<&str> = doc.find_node(&copy).unwrap().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(copied, vec!["n1:3", "n2:3", "n3:3", "n2:1:3"]);
        assert_eq!(doc.clone_family(&id("n2")).len(), 6);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_clone_into_own_subtree_refused() {
        let mut doc = shared_calculation_document();
        let mut suffixes = SequentialSuffixes::new();
        let err = doc
            .clone_node(&id("n3"), 2, 2, &id("n2"), &mut suffixes)
            .unwrap_err();

        assert!(matches!(err, TreeError::InvalidStructure { .. }));
    }

    #[test]
    fn test_clone_wrong_entry_key() {
        let mut doc = shared_calculation_document();
        let mut suffixes = SequentialSuffixes::new();

        let err = doc
            .clone_node(&id("n3"), 1, 1, &id("n1"), &mut suffixes)
            .unwrap_err();
        assert_eq!(err, TreeError::not_found(&id("n3")));

        let err = doc
            .clone_node(&id("n3"), 2, 9, &id("n1"), &mut suffixes)
            .unwrap_err();
        assert_eq!(err, TreeError::EntryNotFound { key: 9 });
    }

    #[test]
    fn test_move_node_between_entries() {
        let mut doc = shared_calculation_document();
        doc.move_node(&id("n2"), 2, 1, &id("n1")).unwrap();

        let n1 = doc.find_node(&id("n1")).unwrap();
        assert_eq!(n1.children.last().unwrap().id, id("n2"));
        assert_eq!(n1.children.last().unwrap().ds_key, Some(1));
        assert_eq!(doc.find_node(&id("n3")).unwrap().children.len(), 1);
    }

    #[test]
    fn test_move_into_cloned_parent_mirrors() {
        let mut doc = shared_calculation_document();
        doc.add_node(&id("n3"), calc("n6", 6), &mut |_: &NodeId| {}).unwrap();

        doc.move_node(&id("n6"), 2, 1, &id("n0")).unwrap();

        assert_eq!(doc.find_node(&id("n0")).unwrap().children[0].id, id("n6"));
        assert_eq!(
            doc.find_node(&id("n0:12345")).unwrap().children[0].id,
            id("n6:12345")
        );
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_move_out_of_cloned_parent_mirrors() {
        let mut doc = shared_calculation_document();
        doc.add_node(&id("n0"), calc("n6", 6), &mut |_: &NodeId| {}).unwrap();

        doc.move_node(&id("n6:12345"), 2, 2, &id("n3")).unwrap();

        assert!(doc.find_node(&id("n0")).unwrap().children.is_empty());
        assert!(doc.find_node(&id("n0:12345")).unwrap().children.is_empty());
        assert_eq!(doc.find_node(&id("n3")).unwrap().children.last().unwrap().id, id("n6"));
    }

    #[test]
    fn test_move_into_own_subtree_refused() {
        let mut doc = shared_calculation_document();
        let before = doc.entries().to_vec();

        let err = doc.move_node(&id("n3"), 2, 2, &id("n2")).unwrap_err();

        assert!(matches!(err, TreeError::InvalidMove { .. }));
        assert_eq!(doc.entries(), before.as_slice());
    }

    #[test]
    fn test_clone_calculation_prunes_single_instance() {
        let mut doc = shared_calculation_document();
        doc.add_node(&id("n3"), calc("n6", 6), &mut |_: &NodeId| {}).unwrap();

        doc.clone_calculation(&id("n6"), &id("n0")).unwrap();

        assert!(doc.find_node(&id("n6")).is_none());
        assert!(doc.find_node(&id("n0")).is_some());
    }

    #[test]
    fn test_clone_calculation_refuses_desync() {
        let mut doc = shared_calculation_document();
        doc.add_node(&id("n0"), calc("n6", 6), &mut |_: &NodeId| {}).unwrap();
        let before = doc.entries().to_vec();

        let err = doc.clone_calculation(&id("n6"), &id("n0")).unwrap_err();

        assert!(matches!(err, TreeError::InvariantViolation { .. }));
        assert_eq!(doc.entries(), before.as_slice());
    }

    #[test]
    fn test_clone_calculation_requires_calculations() {
        let mut doc = shared_calculation_document();
        let err = doc.clone_calculation(&id("n2"), &id("n0")).unwrap_err();

        assert!(matches!(err, TreeError::KindMismatch { .. }));
    }

    #[test]
    fn test_template_round_trip_through_document() {
        let doc = shared_calculation_document();
        let content = doc.to_template();

        assert_eq!(content.funding_lines.len(), 2);
        assert_eq!(content.funding_lines[1].calculations[0].template_calculation_id, 4);

        let reloaded = Document::from_template(&content, &mut SequentialSuffixes::new()).unwrap();
        assert_eq!(reloaded.to_template(), content);
        assert_eq!(reloaded.clone_family(&id("n1")).len(), 2);
    }

    #[test]
    fn test_next_template_id() {
        assert_eq!(Document::new().next_template_id(), 0);
        assert_eq!(shared_calculation_document().next_template_id(), 5);
    }

    #[test]
    fn test_add_entry_assigns_next_key() {
        let mut doc = shared_calculation_document();
        let key = doc.add_entry(line("n5", 5)).unwrap();

        assert_eq!(key, 3);
        assert_eq!(doc.entry(3).unwrap().root.ds_key, Some(3));

        let err = doc.add_entry(calc("n6", 6)).unwrap_err();
        assert!(matches!(err, TreeError::InvalidStructure { .. }));
    }
}

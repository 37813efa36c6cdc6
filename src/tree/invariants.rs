// 🛡️ Invariant Checker - Run on the working copy before a mutation is committed
//
// Checks:
// - entry keys are unique and every entry root is a funding line
// - calculations only own calculations
// - node ids are unique across the document
// - every clone id has exactly one original with the bare stem
// - all instances of a family carry equal attributes and the same child stems
// - one template id per family, one family per template id

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{TreeError, TreeResult};
use crate::tree::node::{Entry, Node, TemplateRef};

pub fn check(entries: &[Entry]) -> TreeResult<()> {
    check_entries(entries)?;

    let mut ids: HashSet<&str> = HashSet::new();
    let mut families: BTreeMap<&str, Vec<&Node>> = BTreeMap::new();

    for entry in entries {
        for node in entry.root.iter() {
            if !ids.insert(node.id.as_str()) {
                return Err(TreeError::invariant(format!("duplicate node id `{}`", node.id)));
            }
            if node.is_calculation() {
                if let Some(child) = node.children.iter().find(|c| c.is_funding_line()) {
                    return Err(TreeError::InvalidStructure {
                        reason: format!(
                            "calculation `{}` cannot own funding line `{}`",
                            node.id, child.id
                        ),
                    });
                }
            }
            families.entry(node.id.stem()).or_default().push(node);
        }
    }

    let mut stems_by_ref: HashMap<TemplateRef, &str> = HashMap::new();

    for (stem, members) in &families {
        if !ids.contains(stem) {
            return Err(TreeError::invariant(format!(
                "clone `{}` has no original `{}`",
                members[0].id, stem
            )));
        }

        let first = members[0];
        for member in &members[1..] {
            if member.kind != first.kind {
                return Err(TreeError::invariant(format!(
                    "clone `{}` differs from `{}`",
                    member.id, first.id
                )));
            }
            if !same_child_stems(first, member) {
                return Err(TreeError::invariant(format!(
                    "children of `{}` do not mirror children of `{}`",
                    member.id, first.id
                )));
            }
        }

        let template_ref = first.template_ref();
        if let Some(other) = stems_by_ref.insert(template_ref, *stem) {
            return Err(TreeError::invariant(format!(
                "{:?} is shared by unrelated nodes `{}` and `{}`",
                template_ref, other, stem
            )));
        }
    }

    Ok(())
}

fn check_entries(entries: &[Entry]) -> TreeResult<()> {
    let mut keys = HashSet::new();
    for entry in entries {
        if !keys.insert(entry.key) {
            return Err(TreeError::invariant(format!("duplicate entry key {}", entry.key)));
        }
        if !entry.root.is_funding_line() {
            return Err(TreeError::InvalidStructure {
                reason: format!("entry {} root `{}` is not a funding line", entry.key, entry.root.id),
            });
        }
    }
    Ok(())
}

fn same_child_stems(a: &Node, b: &Node) -> bool {
    a.children.len() == b.children.len()
        && a.children
            .iter()
            .zip(&b.children)
            .all(|(x, y)| x.id.same_family(&y.id))
}

// ============================================================================
// TESTS
// ============================================================================

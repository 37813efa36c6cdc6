// 🔎 Tree Queries - Read-only helpers over entries and node forests

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{TreeError, TreeResult};
use crate::template::{TemplateCalculation, TemplateFundingLine};
use crate::tree::node::{Entry, Node, NodeId, NodeKind};

// ============================================================================
// SUMMARIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingLineSummary {
    pub id: NodeId,
    pub name: String,
    pub template_line_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationSummary {
    pub id: NodeId,
    pub name: String,
    pub template_calculation_id: u32,
}

/// Roots of every entry, in entry order
pub fn roots(entries: &[Entry]) -> impl Iterator<Item = &Node> {
    entries.iter().map(|e| &e.root)
}

/// Pre-order list of funding lines; clone instances only with `include_clones`
pub fn get_all_funding_lines<'a, I>(nodes: I, include_clones: bool) -> Vec<FundingLineSummary>
where
    I: IntoIterator<Item = &'a Node>,
{
    nodes
        .into_iter()
        .flat_map(Node::iter)
        .filter(|n| include_clones || !n.id.is_clone())
        .filter_map(|n| match &n.kind {
            NodeKind::FundingLine(line) => Some(FundingLineSummary {
                id: n.id.clone(),
                name: line.name.clone(),
                template_line_id: line.template_line_id,
            }),
            NodeKind::Calculation(_) => None,
        })
        .collect()
}

/// Pre-order list of calculations; clone instances only with `include_clones`
pub fn get_all_calculations<'a, I>(nodes: I, include_clones: bool) -> Vec<CalculationSummary>
where
    I: IntoIterator<Item = &'a Node>,
{
    nodes
        .into_iter()
        .flat_map(Node::iter)
        .filter(|n| include_clones || !n.id.is_clone())
        .filter_map(|n| match &n.kind {
            NodeKind::Calculation(calc) => Some(CalculationSummary {
                id: n.id.clone(),
                name: calc.name.clone(),
                template_calculation_id: calc.template_calculation_id,
            }),
            NodeKind::FundingLine(_) => None,
        })
        .collect()
}

/// Distinct template line ids, first occurrence order
pub fn get_all_template_line_ids(entries: &[Entry]) -> Vec<u32> {
    distinct(
        get_all_funding_lines(roots(entries), true)
            .into_iter()
            .map(|s| s.template_line_id),
    )
}

/// Distinct template calculation ids, first occurrence order
pub fn get_all_template_calculation_ids(entries: &[Entry]) -> Vec<u32> {
    distinct(
        get_all_calculations(roots(entries), true)
            .into_iter()
            .map(|s| s.template_calculation_id),
    )
}

fn distinct(ids: impl Iterator<Item = u32>) -> Vec<u32> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

/// Highest template line or calculation id in a nested template (0 when empty)
pub fn get_last_used_id(funding_lines: &[TemplateFundingLine]) -> u32 {
    fn calc_max(calc: &TemplateCalculation) -> u32 {
        calc.calculations
            .iter()
            .map(calc_max)
            .fold(calc.template_calculation_id, u32::max)
    }

    fn line_max(line: &TemplateFundingLine) -> u32 {
        let lines = line.funding_lines.iter().map(line_max);
        let calcs = line.calculations.iter().map(calc_max);
        lines.chain(calcs).fold(line.template_line_id, u32::max)
    }

    funding_lines.iter().map(line_max).max().unwrap_or(0)
}

// ============================================================================
// ANCESTRY
// ============================================================================

/// Parent of `node_id`; `None` for an entry root
pub fn find_parent_id(entries: &[Entry], node_id: &NodeId) -> TreeResult<Option<NodeId>> {
    fn search(node: &Node, target: &NodeId) -> Option<NodeId> {
        for child in &node.children {
            if &child.id == target {
                return Some(node.id.clone());
            }
            if let Some(found) = search(child, target) {
                return Some(found);
            }
        }
        None
    }

    for entry in entries {
        if &entry.root.id == node_id {
            return Ok(None);
        }
        if let Some(parent) = search(&entry.root, node_id) {
            return Ok(Some(parent));
        }
    }
    Err(TreeError::not_found(node_id))
}

/// True when `ancestor_id` is a proper ancestor of `node_id`
pub fn is_child_of(entries: &[Entry], node_id: &NodeId, ancestor_id: &NodeId) -> bool {
    if node_id == ancestor_id {
        return false;
    }
    roots(entries)
        .flat_map(Node::iter)
        .filter(|n| &n.id == ancestor_id)
        .any(|ancestor| ancestor.contains(node_id))
}

/// True when `node_id` is a clone whose parent is outside its clone branch
pub fn is_clone_root(entries: &[Entry], node_id: &NodeId) -> bool {
    if !node_id.is_clone() {
        return false;
    }
    match find_parent_id(entries, node_id) {
        Ok(Some(parent)) => parent.branch() != node_id.branch(),
        Ok(None) => true,
        Err(_) => false,
    }
}

/// Ids inside `subtree_root` whose stem is `target_stem`
pub fn find_all_cloned_node_ids(subtree_root: &Node, target_stem: &str) -> Vec<NodeId> {
    subtree_root
        .iter()
        .filter(|n| n.id.stem() == target_stem)
        .map(|n| n.id.clone())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

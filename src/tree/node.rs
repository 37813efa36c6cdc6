// 🌳 Template Node - Funding lines and calculations with stable identity
//
// "The template id is IDENTITY (shared by every clone), the node id is the INSTANCE"
//
// A node id is either a plain stem ("n4") for the original instance or
// "<stem>:<suffix>" for a clone instance. Cloning appends one fresh token to
// every id of the copied subtree, so a suffix may hold several tokens
// ("n4:7:9"); the last token names the clone branch the instance belongs to.
// All instances sharing a stem form one clone family and carry identical
// attributes and child shapes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between id stem and clone suffix
pub const CLONE_SEPARATOR: char = ':';

/// Ordinal key of a top-level entry
pub type EntryKey = u32;

// ============================================================================
// NODE ID
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Portion before the clone separator; identifies the clone family
    pub fn stem(&self) -> &str {
        match self.0.split_once(CLONE_SEPARATOR) {
            Some((stem, _)) => stem,
            None => &self.0,
        }
    }

    /// Clone suffix, `None` for an original
    pub fn suffix(&self) -> Option<&str> {
        self.0.split_once(CLONE_SEPARATOR).map(|(_, suffix)| suffix)
    }

    /// Last suffix token: the clone branch this instance was copied into
    pub fn branch(&self) -> Option<&str> {
        self.0.rsplit_once(CLONE_SEPARATOR).map(|(_, token)| token)
    }

    /// Suffix tokens in the order they were appended
    pub fn suffix_tokens(&self) -> impl Iterator<Item = &str> {
        self.suffix().into_iter().flat_map(|s| s.split(CLONE_SEPARATOR))
    }

    pub fn is_clone(&self) -> bool {
        self.suffix().is_some()
    }

    /// Id of the original instance of this family
    pub fn original(&self) -> NodeId {
        NodeId(self.stem().to_string())
    }

    /// Same family, one more clone suffix: "n4" + "s" is "n4:s", "n4:t" + "s" is "n4:t:s"
    pub fn appended(&self, suffix: &str) -> NodeId {
        NodeId(format!("{}{}{}", self.0, CLONE_SEPARATOR, suffix))
    }

    pub fn same_family(&self, other: &NodeId) -> bool {
        self.stem() == other.stem()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(id)
    }
}

// ============================================================================
// CLASSIFICATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingLineType {
    /// Shown on statements, carries no payment
    Information,

    /// Paid out to providers
    Payment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalculationType {
    Cash,
    Rate,
    PupilNumber,
    Weighting,
    Scope,
    Information,
    Drilldown,
    PerPupilFunding,
    LumpSum,
    ProviderLedFunding,
    Number,
    Enum,
    Boolean,
    Adjustment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationType {
    None,
    Average,
    Sum,
    GroupRate,
    PercentageChangeBetweenAandB,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueFormat {
    Number,
    Percentage,
    Currency,
    Boolean,
    String,
}

/// Group rate aggregation: numerator / denominator calculation ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRate {
    pub numerator: u32,
    pub denominator: u32,
}

/// Percentage change between two calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentageChangeBetweenAandB {
    #[serde(rename = "calculationA")]
    pub calculation_a: u32,

    #[serde(rename = "calculationB")]
    pub calculation_b: u32,

    #[serde(rename = "calculationAggregationType")]
    pub calculation_aggregation_type: AggregationType,
}

// ============================================================================
// NODE ATTRIBUTES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingLine {
    pub name: String,
    pub funding_line_code: Option<String>,
    pub template_line_id: u32,
    #[serde(rename = "type")]
    pub line_type: FundingLineType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calculation {
    pub name: String,
    pub template_calculation_id: u32,
    #[serde(rename = "type")]
    pub calculation_type: CalculationType,
    pub aggregation_type: AggregationType,
    pub formula_text: String,
    pub value_format: ValueFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_enum_type_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_rate: Option<GroupRate>,
    #[serde(
        default,
        rename = "percentageChangeBetweenAandB",
        skip_serializing_if = "Option::is_none"
    )]
    pub percentage_change_between_a_and_b: Option<PercentageChangeBetweenAandB>,
}

/// Semantic identity of a node: shared by all instances of one family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateRef {
    Line(u32),
    Calculation(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NodeKind {
    FundingLine(FundingLine),
    Calculation(Calculation),
}

impl NodeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::FundingLine(_) => "funding line",
            NodeKind::Calculation(_) => "calculation",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NodeKind::FundingLine(line) => &line.name,
            NodeKind::Calculation(calc) => &calc.name,
        }
    }

    pub fn template_ref(&self) -> TemplateRef {
        match self {
            NodeKind::FundingLine(line) => TemplateRef::Line(line.template_line_id),
            NodeKind::Calculation(calc) => TemplateRef::Calculation(calc.template_calculation_id),
        }
    }

    pub fn same_kind(&self, other: &NodeKind) -> bool {
        matches!(
            (self, other),
            (NodeKind::FundingLine(_), NodeKind::FundingLine(_))
                | (NodeKind::Calculation(_), NodeKind::Calculation(_))
        )
    }
}

// ============================================================================
// NODE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,

    #[serde(flatten)]
    pub kind: NodeKind,

    /// Ordered children; calculations only own calculations
    #[serde(default)]
    pub children: Vec<Node>,

    /// Owning entry, lookup only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ds_key: Option<EntryKey>,
}

impl Node {
    pub fn funding_line(id: impl Into<NodeId>, line: FundingLine) -> Self {
        Node {
            id: id.into(),
            kind: NodeKind::FundingLine(line),
            children: Vec::new(),
            ds_key: None,
        }
    }

    pub fn calculation(id: impl Into<NodeId>, calculation: Calculation) -> Self {
        Node {
            id: id.into(),
            kind: NodeKind::Calculation(calculation),
            children: Vec::new(),
            ds_key: None,
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn is_funding_line(&self) -> bool {
        matches!(self.kind, NodeKind::FundingLine(_))
    }

    pub fn is_calculation(&self) -> bool {
        matches!(self.kind, NodeKind::Calculation(_))
    }

    pub fn template_ref(&self) -> TemplateRef {
        self.kind.template_ref()
    }

    /// Pre-order traversal including self
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![self] }
    }

    pub fn find(&self, id: &NodeId) -> Option<&Node> {
        self.iter().find(|node| &node.id == id)
    }

    pub fn find_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        if &self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(id))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.find(id).is_some()
    }

    /// Number of nodes in this subtree
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// Deep copy with `suffix` appended to every id
    ///
    /// Distinct ids stay distinct, so a subtree holding both an original and a
    /// clone of one family copies without collisions.
    pub fn suffixed(&self, suffix: &str) -> Node {
        Node {
            id: self.id.appended(suffix),
            kind: self.kind.clone(),
            children: self.children.iter().map(|c| c.suffixed(suffix)).collect(),
            ds_key: self.ds_key,
        }
    }

    /// Set the owning entry on the whole subtree
    pub fn stamp_entry_key(&mut self, key: EntryKey) {
        self.ds_key = Some(key);
        for child in &mut self.children {
            child.stamp_entry_key(key);
        }
    }

    /// Remove every descendant matching `pred(parent_id, child)`; returns the removed subtrees
    pub fn remove_where<F>(&mut self, pred: &mut F) -> Vec<Node>
    where
        F: FnMut(&NodeId, &Node) -> bool,
    {
        let mut removed = Vec::new();
        let parent_id = &self.id;

        let mut kept = Vec::with_capacity(self.children.len());
        for child in self.children.drain(..) {
            if pred(parent_id, &child) {
                removed.push(child);
            } else {
                kept.push(child);
            }
        }
        self.children = kept;

        for child in &mut self.children {
            removed.extend(child.remove_where(pred));
        }
        removed
    }
}

/// Pre-order iterator over a subtree
pub struct PreOrder<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

// ============================================================================
// ENTRY
// ============================================================================

/// Top-level container owning one funding-line root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub key: EntryKey,
    pub root: Node,
}

impl Entry {
    pub fn new(key: EntryKey, mut root: Node) -> Self {
        root.stamp_entry_key(key);
        Entry { key, root }
    }
}

// ============================================================================
// TESTS
// ============================================================================

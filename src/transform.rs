// 🔁 Template Transform - Nested template format ⇄ entry/node forest
//
// Forward: every top-level funding line becomes an entry; node ids are
// "n<ordinal>" in pre-order. The first occurrence of a template id is the
// original. A later occurrence starts a clone branch with a fresh suffix:
// every node inside the branch takes the id of the node at the same position
// under the original with that suffix appended.
//
// Backward: strips ids, suffixes and entry keys and re-nests by children,
// funding-line children into `fundingLines`, calculation children into
// `calculations`.

use std::collections::HashMap;

use crate::template::{TemplateCalculation, TemplateFundingLine};
use crate::tree::node::{Calculation, Entry, EntryKey, FundingLine, Node, NodeId, NodeKind, TemplateRef};
use crate::tree::suffix::SuffixSource;

// ============================================================================
// NESTED -> ENTRIES
// ============================================================================

/// Convert nested funding lines into entries keyed 1, 2, ...
pub fn template_funding_lines_to_datasource(
    funding_lines: &[TemplateFundingLine],
    suffixes: &mut dyn SuffixSource,
) -> Vec<Entry> {
    let mut builder = DatasourceBuilder {
        next_ordinal: 0,
        originals: HashMap::new(),
        suffixes,
    };

    funding_lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let key = (index + 1) as EntryKey;
            let root = builder.funding_line(line, None);
            Entry::new(key, root)
        })
        .collect()
}

/// Node under the original that a node inside a clone branch corresponds to
type Mirror<'m> = Option<(&'m Node, &'m str)>;

/// How one template node gets its id
enum Placement<'m> {
    Original(NodeId),
    /// Inside a clone branch: corresponding node plus branch suffix
    Mirror { id: NodeId, of: &'m Node, branch: &'m str },
    /// First node of a new clone branch
    CloneRoot { id: NodeId, of: Node, branch: String },
}

impl Placement<'_> {
    fn id(&self) -> &NodeId {
        match self {
            Placement::Original(id) => id,
            Placement::Mirror { id, .. } | Placement::CloneRoot { id, .. } => id,
        }
    }

    fn child_mirror(&self, position: usize) -> Mirror<'_> {
        match self {
            Placement::Original(_) => None,
            Placement::Mirror { of, branch, .. } => of.children.get(position).map(|c| (c, *branch)),
            Placement::CloneRoot { of, branch, .. } => {
                of.children.get(position).map(|c| (c, branch.as_str()))
            }
        }
    }
}

struct DatasourceBuilder<'a> {
    next_ordinal: usize,
    /// Completed original subtrees by template id
    originals: HashMap<TemplateRef, Node>,
    suffixes: &'a mut dyn SuffixSource,
}

impl DatasourceBuilder<'_> {
    fn place<'m>(&mut self, template_ref: TemplateRef, mirror: Mirror<'m>) -> Placement<'m> {
        if let Some((of, branch)) = mirror {
            if of.template_ref() == template_ref {
                return Placement::Mirror {
                    id: of.id.appended(branch),
                    of,
                    branch,
                };
            }
        }

        match self.originals.get(&template_ref) {
            Some(original) => {
                let branch = self.suffixes.next_suffix();
                Placement::CloneRoot {
                    id: original.id.appended(&branch),
                    of: original.clone(),
                    branch,
                }
            }
            None => {
                let id = NodeId::new(format!("n{}", self.next_ordinal));
                self.next_ordinal += 1;
                Placement::Original(id)
            }
        }
    }

    fn remember(&mut self, placement: &Placement<'_>, node: &Node) {
        if let Placement::Original(_) = placement {
            self.originals.insert(node.template_ref(), node.clone());
        }
    }

    fn funding_line(&mut self, line: &TemplateFundingLine, mirror: Mirror<'_>) -> Node {
        let placement = self.place(TemplateRef::Line(line.template_line_id), mirror);

        let mut children: Vec<Node> = Vec::with_capacity(line.funding_lines.len() + line.calculations.len());
        for child in &line.funding_lines {
            let position = children.len();
            children.push(self.funding_line(child, placement.child_mirror(position)));
        }
        for child in &line.calculations {
            let position = children.len();
            children.push(self.calculation(child, placement.child_mirror(position)));
        }

        let node = Node::funding_line(
            placement.id().clone(),
            FundingLine {
                name: line.name.clone(),
                funding_line_code: line.funding_line_code.clone(),
                template_line_id: line.template_line_id,
                line_type: line.line_type,
            },
        )
        .with_children(children);

        self.remember(&placement, &node);
        node
    }

    fn calculation(&mut self, calc: &TemplateCalculation, mirror: Mirror<'_>) -> Node {
        let placement = self.place(TemplateRef::Calculation(calc.template_calculation_id), mirror);

        let mut children: Vec<Node> = Vec::with_capacity(calc.calculations.len());
        for child in &calc.calculations {
            let position = children.len();
            children.push(self.calculation(child, placement.child_mirror(position)));
        }

        let node = Node::calculation(
            placement.id().clone(),
            Calculation {
                name: calc.name.clone(),
                template_calculation_id: calc.template_calculation_id,
                calculation_type: calc.calculation_type,
                aggregation_type: calc.aggregation_type,
                formula_text: calc.formula_text.clone(),
                value_format: calc.value_format,
                allowed_enum_type_values: calc.allowed_enum_type_values.clone(),
                group_rate: calc.group_rate,
                percentage_change_between_a_and_b: calc.percentage_change_between_a_and_b,
            },
        )
        .with_children(children);

        self.remember(&placement, &node);
        node
    }
}

// ============================================================================
// ENTRIES -> NESTED
// ============================================================================

/// Convert entries back into nested funding lines, in entry order
pub fn datasource_to_template_funding_lines(entries: &[Entry]) -> Vec<TemplateFundingLine> {
    entries
        .iter()
        .filter_map(|entry| match &entry.root.kind {
            NodeKind::FundingLine(line) => Some(to_template_funding_line(line, &entry.root.children)),
            NodeKind::Calculation(_) => None,
        })
        .collect()
}

fn to_template_funding_line(line: &FundingLine, children: &[Node]) -> TemplateFundingLine {
    let mut funding_lines = Vec::new();
    let mut calculations = Vec::new();

    for child in children {
        match &child.kind {
            NodeKind::FundingLine(l) => funding_lines.push(to_template_funding_line(l, &child.children)),
            NodeKind::Calculation(c) => calculations.push(to_template_calculation(c, &child.children)),
        }
    }

    TemplateFundingLine {
        name: line.name.clone(),
        funding_line_code: line.funding_line_code.clone(),
        template_line_id: line.template_line_id,
        line_type: line.line_type,
        funding_lines,
        calculations,
    }
}

fn to_template_calculation(calc: &Calculation, children: &[Node]) -> TemplateCalculation {
    let calculations = children
        .iter()
        .filter_map(|child| match &child.kind {
            NodeKind::Calculation(c) => Some(to_template_calculation(c, &child.children)),
            NodeKind::FundingLine(_) => None,
        })
        .collect();

    TemplateCalculation {
        name: calc.name.clone(),
        template_calculation_id: calc.template_calculation_id,
        calculation_type: calc.calculation_type,
        aggregation_type: calc.aggregation_type,
        formula_text: calc.formula_text.clone(),
        value_format: calc.value_format,
        allowed_enum_type_values: calc.allowed_enum_type_values.clone(),
        group_rate: calc.group_rate,
        percentage_change_between_a_and_b: calc.percentage_change_between_a_and_b,
        calculations,
    }
}

// ============================================================================
// TESTS
// ============================================================================

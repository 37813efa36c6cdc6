// Shared test builders for the tree store

use crate::tree::document::Document;
use crate::tree::node::{
    AggregationType, Calculation, CalculationType, Entry, FundingLine, FundingLineType, Node,
    ValueFormat,
};

pub fn line(id: &str, template_line_id: u32) -> Node {
    Node::funding_line(
        id,
        FundingLine {
            name: format!("Funding Line {}", template_line_id),
            funding_line_code: Some(format!("FL-{}", template_line_id)),
            template_line_id,
            line_type: FundingLineType::Information,
        },
    )
}

pub fn calc(id: &str, template_calculation_id: u32) -> Node {
    Node::calculation(
        id,
        Calculation {
            name: format!("Calculation {}", template_calculation_id),
            template_calculation_id,
            calculation_type: CalculationType::Cash,
            aggregation_type: AggregationType::Sum,
            formula_text: String::new(),
            value_format: ValueFormat::Currency,
            allowed_enum_type_values: None,
            group_rate: None,
            percentage_change_between_a_and_b: None,
        },
    )
}

/// Entry 1: n1 (line 0) -> [n0 (calc 4)]
/// Entry 2: n3 (line 1) -> [n2 (line 3), n0:12345 (clone of n0)]
pub fn shared_calculation_entries() -> Vec<Entry> {
    vec![
        Entry::new(1, line("n1", 0).with_children(vec![calc("n0", 4)])),
        Entry::new(
            2,
            line("n3", 1).with_children(vec![line("n2", 3), calc("n0:12345", 4)]),
        ),
    ]
}

pub fn shared_calculation_document() -> Document {
    Document::from_entries(shared_calculation_entries()).expect("fixture is a valid document")
}

/// Shared calculation plus a second clone branch in its own entry:
/// Entry 1: n1 -> [n0], Entry 2: n3 -> [n2, n0:a], Entry 3: n5 (line 5) -> [n0:b]
pub fn two_clone_branch_document() -> Document {
    let mut entries = shared_calculation_entries();
    entries[1] = Entry::new(
        2,
        line("n3", 1).with_children(vec![line("n2", 3), calc("n0:a", 4)]),
    );
    entries.push(Entry::new(3, line("n5", 5).with_children(vec![calc("n0:b", 4)])));
    Document::from_entries(entries).expect("fixture is a valid document")
}

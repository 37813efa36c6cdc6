// Template Tree Store - Funding lines and calculations as an editable forest
//
// Each entry owns one funding-line root. Nodes can be cloned: all instances of
// a clone family share an id stem ("n4", "n4:<suffix>") and are kept in sync
// by every mutation on the document.

pub mod document;
pub mod family;
pub mod invariants;
pub mod node;
pub mod query;
pub mod suffix;

#[cfg(test)]
pub(crate) mod fixtures;

pub use document::{Document, IdAllocator, NodeUpdate};
pub use family::FamilyIndex;
pub use node::{
    AggregationType, Calculation, CalculationType, Entry, EntryKey, FundingLine, FundingLineType,
    GroupRate, Node, NodeId, NodeKind, PercentageChangeBetweenAandB, TemplateRef, ValueFormat,
    CLONE_SEPARATOR,
};
pub use query::{
    find_all_cloned_node_ids, find_parent_id, get_all_calculations, get_all_funding_lines,
    get_all_template_calculation_ids, get_all_template_line_ids, get_last_used_id, is_child_of,
    is_clone_root, roots, CalculationSummary, FundingLineSummary,
};
pub use suffix::{SequentialSuffixes, SuffixSource, UuidSuffixes};

// Funding Template Tree - Core Library
// Exposes the tree store, transform and storage for the CLI and tests

pub mod config;
pub mod error;
pub mod storage;
pub mod template;
pub mod transform;
pub mod tree;

// Re-export commonly used types
pub use config::{EditorConfig, SuffixStrategy};
pub use error::{TreeError, TreeResult};
pub use storage::{
    content_hash, InMemoryTemplateStorage, SqliteTemplateStorage, StorageEvent, TemplateStorage,
    VersionInfo,
};
pub use template::{TemplateCalculation, TemplateContent, TemplateFundingLine};
pub use transform::{datasource_to_template_funding_lines, template_funding_lines_to_datasource};
pub use tree::{
    Calculation, CalculationSummary, Document, Entry, EntryKey, FamilyIndex, FundingLine,
    FundingLineSummary, IdAllocator, Node, NodeId, NodeKind, NodeUpdate, SequentialSuffixes,
    SuffixSource, UuidSuffixes,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod mirror;
pub mod report;
pub mod tree_copy;

pub use mirror::{CopiedPair, ExtractionIssue, ExtractionReport, MirrorExtractor, NameScope};
pub use report::{BatchReport, BatchSummary, ConfigSnapshot, ReportWriter};
pub use tree_copy::{CopyStats, TreeCopier};

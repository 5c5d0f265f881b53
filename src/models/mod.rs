//! Core data model: immutable message snapshots and summary value types.

pub mod message;
pub mod summary;

pub use message::{Attachment, CodeBlock, Message, ThreadInfo};
pub use summary::{
    ActionItem, ExtractionStats, FinalStats, Participant, ParsingMetadata, ParsingMethod,
    Priority, SummarizationContext, SummaryLength, SummaryMetadata, SummaryOptions,
    SummaryResult, TechnicalTerm,
};

//! Core traits and types for the outbound call orchestrator
//!
//! This crate provides foundational types used across all other crates:
//! - Error taxonomy shared by every layer
//! - Conversation history and per-turn results
//! - Lead classification (interest, objections, follow-up)
//! - Lead/task/company/call-log records
//! - Capability traits for generation and record storage

pub mod classification;
pub mod conversation;
pub mod error;
pub mod llm_types;
pub mod records;
pub mod traits;

pub use classification::{Classification, ClassificationDelta, InterestLevel};
pub use conversation::{
    CallPhase, ConversationState, HistoryEntry, ReplySource, Speaker, TurnResult,
};
pub use error::{Error, Result};
pub use llm_types::{FinishReason, GenerateRequest, GenerateResponse, Message, Role, TokenUsage};
pub use records::{
    CallLog, CallOutcome, Company, KnowledgeEntry, Lead, Task, TaskStatus,
};

pub use traits::{
    CallLogStore, CompanyStore, KnowledgeBase, LanguageModel, LeadStore, RecordStores, TaskStore,
};

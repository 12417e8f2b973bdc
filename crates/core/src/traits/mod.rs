//! Capability traits for the call orchestrator
//!
//! Every external dependency of the conversation engine sits behind one of
//! these traits so it can be swapped by configuration or mocked in tests.
//!
//! ```text
//! Generation:
//!   - LanguageModel: free text and schema-validated JSON generation
//!
//! Records (scoped by company_id):
//!   - LeadStore, TaskStore, CompanyStore, CallLogStore
//!   - KnowledgeBase: product excerpts for the generation context
//! ```

mod llm;
mod records;

pub use llm::LanguageModel;
pub use records::{CallLogStore, CompanyStore, KnowledgeBase, LeadStore, RecordStores, TaskStore};

//! AI Integration Layer
//!
//! LLM integration for proposing training-plan revisions.

pub mod prompt;
pub mod provider;
pub mod revision;
pub mod validation;

pub use prompt::{build_revision_prompt, revision_schema};
pub use provider::{
    LlmProvider, LlmResponse, OpenAiProvider, ResponseMetadata, ResponseTiming, SharedProvider,
    TokenUsage, create_provider,
};
pub use revision::{PatchOperation, PlanRevision, parse_revision};
pub use validation::extract_json_from_response;

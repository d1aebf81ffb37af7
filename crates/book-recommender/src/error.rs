use rec_common::llm::LlmClientError;
use rec_common::store::StoreError;

/// Terminal errors a pipeline invocation can surface. Translation failures
/// are absorbed inside the pipeline and never appear here.
#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error(transparent)]
    Llm(#[from] LlmClientError),

    #[error(transparent)]
    Lookup(#[from] StoreError),

    #[error("no relevant categories found for your query")]
    NoRelevantCategories,

    #[error("no books found for the determined categories")]
    NoCandidateRecords,

    #[error("no valid highlights found in the candidate books")]
    NoExtractableUnits,

    #[error("no results match your query well enough")]
    NoMatchingRecommendations,

    #[error("config error: {0}")]
    Config(String),
}

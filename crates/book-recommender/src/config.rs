use rec_common::llm::LlmClientConfig;
use rec_common::store::StoreConfig;

use crate::error::RecommendError;

/// Application configuration loaded explicitly from environment variables.
///
/// The store URL and API key are required; everything else has documented
/// defaults (see `LlmClientConfig::from_env` and `StoreConfig::from_env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmClientConfig,
    pub store: StoreConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, RecommendError> {
        let llm = LlmClientConfig::from_env();
        let store = StoreConfig::from_env().map_err(|e| RecommendError::Config(e.to_string()))?;
        Ok(Self { llm, store })
    }
}

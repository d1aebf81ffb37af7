/// Recommendation pipeline.
///
/// One invocation runs a linear chain with a single branch on search mode:
/// language detection → category inference → candidate lookup → unit
/// extraction → ranking → reconciliation/selection → conditional translation.
/// Each stage depends on the previous stage's output, so everything is
/// sequential. The two external collaborators sit behind small traits so the
/// business logic between the calls stays pure and testable.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use rec_common::llm::{LlmClient, LlmClientError};
use rec_common::store::{RecordRow, RecordStore, StoreError, TextField};

use crate::error::RecommendError;
use crate::extract::{build_highlight_units, build_synopsis_units};
use crate::model::{Category, Record, Recommendation, SearchMode, Unit, UnitKey};
use crate::prompts;

/// Records considered for ranking, by store return order.
const MAX_CANDIDATES: usize = 75;
/// Hard cap on synopsis-mode output.
const MAX_SYNOPSIS_RESULTS: usize = 5;
/// Highlight blobs at or below this trimmed length are degenerate.
const MIN_HIGHLIGHT_LEN: usize = 10;

/// Detected query language. Anything that is not Indonesian is treated as
/// English, including an absent or unreadable detection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Indonesian,
}

/// Seam over the one-shot text-understanding call.
#[async_trait]
pub trait TextUnderstanding: Send + Sync {
    async fn invoke(&self, instruction: &str) -> Result<serde_json::Value, LlmClientError>;
}

#[async_trait]
impl TextUnderstanding for LlmClient {
    async fn invoke(&self, instruction: &str) -> Result<serde_json::Value, LlmClientError> {
        LlmClient::invoke(self, instruction).await
    }
}

/// Seam over the record store's candidate search.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn search(
        &self,
        categories: &[String],
        field: TextField,
    ) -> Result<Vec<RecordRow>, StoreError>;
}

#[async_trait]
impl CandidateSource for RecordStore {
    async fn search(
        &self,
        categories: &[String],
        field: TextField,
    ) -> Result<Vec<RecordRow>, StoreError> {
        RecordStore::search(self, categories, field).await
    }
}

pub struct Pipeline {
    llm: Arc<dyn TextUnderstanding>,
    store: Arc<dyn CandidateSource>,
}

impl Pipeline {
    pub fn new(llm: Arc<dyn TextUnderstanding>, store: Arc<dyn CandidateSource>) -> Self {
        Self { llm, store }
    }

    /// Run one full invocation. Every intermediate structure is local to
    /// this call; nothing is cached across invocations.
    pub async fn recommend(
        &self,
        query: &str,
        mode: SearchMode,
    ) -> Result<Vec<Recommendation>, RecommendError> {
        let query = query.trim();

        // 1. Language detection. A missing field defaults to English; only
        // a failed call is terminal.
        let language_value = self.llm.invoke(&prompts::language_detection(query)).await?;
        let language = decode_language(&language_value);
        info!(?language, "language detected");

        // 2. Category inference.
        let category_value = self
            .llm
            .invoke(&prompts::category_inference(query, &Category::joined_labels()))
            .await?;
        let categories = decode_categories(&category_value);
        if categories.is_empty() {
            return Err(RecommendError::NoRelevantCategories);
        }
        info!(count = categories.len(), "categories inferred");

        // 3. Candidate lookup and validation.
        let labels: Vec<String> = categories.iter().map(|c| c.label().to_string()).collect();
        let rows = self.store.search(&labels, mode.text_field()).await?;
        let mut records = validate_rows(rows, mode, &labels);
        if records.is_empty() {
            return Err(RecommendError::NoCandidateRecords);
        }
        records.truncate(MAX_CANDIDATES);
        info!(count = records.len(), "candidate records validated");

        // 4. Unit extraction.
        let units = match mode {
            SearchMode::ByHighlights => build_highlight_units(&records),
            SearchMode::BySynopsis => build_synopsis_units(&records),
        };
        if units.is_empty() {
            return Err(RecommendError::NoExtractableUnits);
        }
        info!(count = units.len(), "units extracted");

        // 5. Ranking.
        let ranking_prompt = match mode {
            SearchMode::ByHighlights => prompts::highlight_ranking(query, &units),
            SearchMode::BySynopsis => prompts::synopsis_ranking(query, &units),
        };
        let ranking_value = self.llm.invoke(&ranking_prompt).await?;
        let ranked_ids = decode_ranked_ids(&ranking_value);
        info!(count = ranked_ids.len(), "ranking received");

        // 6. Reconciliation and selection.
        let mut recommendations = match mode {
            SearchMode::ByHighlights => reconcile_highlights(&ranked_ids, &units),
            SearchMode::BySynopsis => reconcile_synopses(&ranked_ids, &records),
        };
        if recommendations.is_empty() {
            return Err(RecommendError::NoMatchingRecommendations);
        }

        // 7. Conditional translation. Failure here is absorbed; the original
        // text is always a valid answer.
        if language == Language::Indonesian {
            let texts: Vec<String> = recommendations.iter().map(|r| r.text.clone()).collect();
            match self.llm.invoke(&prompts::translation(&texts)).await {
                Ok(value) => {
                    if apply_translations(&mut recommendations, &value) {
                        info!(count = recommendations.len(), "recommendations translated");
                    } else {
                        warn!("translation result did not match, keeping original text");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "translation call failed, keeping original text");
                }
            }
        }

        info!(count = recommendations.len(), "recommendations ready");
        Ok(recommendations)
    }
}

fn decode_language(value: &serde_json::Value) -> Language {
    match value.get("language").and_then(|v| v.as_str()) {
        Some("id") => Language::Indonesian,
        _ => Language::English,
    }
}

/// Decode the inferred category list, dropping unknown labels and
/// duplicates while preserving order. The contract response key is
/// `categories`; `genres` is accepted as a legacy alias.
fn decode_categories(value: &serde_json::Value) -> Vec<Category> {
    let array = value
        .get("categories")
        .or_else(|| value.get("genres"))
        .and_then(|v| v.as_array());
    let mut out: Vec<Category> = Vec::new();
    if let Some(items) = array {
        for item in items {
            if let Some(category) = item.as_str().and_then(Category::from_label) {
                if !out.contains(&category) {
                    out.push(category);
                }
            }
        }
    }
    out
}

fn decode_ranked_ids(value: &serde_json::Value) -> Vec<String> {
    value
        .get("recommendations")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id").and_then(|id| id.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Validation pass over raw store rows.
///
/// Runs even though the store query already filtered for non-null text:
/// present-but-degenerate values must not reach ranking. Rows missing an
/// identifier, title, author, text, or category label are dropped, as are
/// rows whose category does not fuzzy-match a requested label (the fallback
/// query returns unfiltered rows). Highlight mode additionally drops blobs
/// of 10 trimmed characters or fewer.
fn validate_rows(rows: Vec<RecordRow>, mode: SearchMode, labels: &[String]) -> Vec<Record> {
    let wanted: Vec<String> = labels.iter().map(|l| l.to_lowercase()).collect();
    let mut records = Vec::new();
    for row in rows {
        let Some(id) = row.id_string() else { continue };
        let Some(title) = row.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            continue;
        };
        let Some(author) = row.author.as_deref().map(str::trim).filter(|a| !a.is_empty())
        else {
            continue;
        };
        let text = match mode {
            SearchMode::ByHighlights => row.highlights.as_deref(),
            SearchMode::BySynopsis => row.synopsis.as_deref(),
        };
        let Some(text) = text.filter(|t| !t.trim().is_empty()) else { continue };
        if mode == SearchMode::ByHighlights && text.trim().len() <= MIN_HIGHLIGHT_LEN {
            continue;
        }
        let Some(category) = row.category.as_deref().filter(|c| !c.trim().is_empty()) else {
            continue;
        };
        let row_categories = category.to_lowercase();
        if !wanted.iter().any(|label| row_categories.contains(label)) {
            continue;
        }
        records.push(Record {
            id,
            title: title.to_string(),
            author: author.to_string(),
            text: text.to_string(),
            category: category.to_string(),
        });
    }
    records
}

/// Walk the ranked identifiers in order, emitting one recommendation per
/// identifier that names a known unit. Unknown or malformed identifiers are
/// skipped silently: the model may hallucinate or mis-transcribe an id, and
/// degrading gracefully beats failing the whole invocation. No cap applies.
fn reconcile_highlights(ranked_ids: &[String], units: &[Unit]) -> Vec<Recommendation> {
    let by_key: HashMap<UnitKey, &Unit> = units.iter().map(|u| (u.key, u)).collect();
    let mut out = Vec::new();
    for id in ranked_ids {
        let Some(key) = UnitKey::parse_synthetic(SearchMode::ByHighlights, id) else {
            continue;
        };
        let Some(unit) = by_key.get(&key) else { continue };
        out.push(Recommendation {
            id: unit.record_id.clone(),
            title: unit.record_title.clone(),
            author: unit.record_author.clone(),
            text: unit.text.clone(),
        });
    }
    out
}

/// Synopsis selection: ranked order, at most one recommendation per
/// distinct title, stopping at five. Malformed or out-of-range identifiers
/// are skipped silently.
fn reconcile_synopses(ranked_ids: &[String], records: &[Record]) -> Vec<Recommendation> {
    let mut seen_titles: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    for id in ranked_ids {
        if out.len() >= MAX_SYNOPSIS_RESULTS {
            break;
        }
        let Some(key) = UnitKey::parse_synthetic(SearchMode::BySynopsis, id) else {
            continue;
        };
        let Some(record) = records.get(key.record) else { continue };
        if !seen_titles.insert(record.title.as_str()) {
            continue;
        }
        out.push(Recommendation {
            id: record.id.clone(),
            title: record.title.clone(),
            author: record.author.clone(),
            text: record.text.clone(),
        });
    }
    out
}

/// Replace display texts with translations when, and only when, the
/// returned array length exactly equals the recommendation count. Returns
/// whether any replacement happened. Non-string or empty entries keep the
/// original text.
fn apply_translations(
    recommendations: &mut [Recommendation],
    value: &serde_json::Value,
) -> bool {
    let Some(translations) = value.get("translations").and_then(|v| v.as_array()) else {
        return false;
    };
    if translations.len() != recommendations.len() {
        return false;
    }
    for (rec, translated) in recommendations.iter_mut().zip(translations) {
        if let Some(text) = translated.as_str() {
            if !text.trim().is_empty() {
                rec.text = text.to_string();
            }
        }
    }
    true
}

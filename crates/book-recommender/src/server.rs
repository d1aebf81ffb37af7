use std::sync::{Arc, Mutex};

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::Deserialize;

use rec_common::store::{RecordStore, ShelfRow};

use crate::model::{Category, Recommendation, SearchMode};
use crate::pipeline::Pipeline;
use crate::session::BrowseSession;

#[derive(Clone)]
pub struct RecommenderServer {
    pipeline: Arc<Pipeline>,
    store: Arc<RecordStore>,
    session: Arc<Mutex<Option<BrowseSession>>>,
    tool_router: ToolRouter<RecommenderServer>,
}

impl RecommenderServer {
    pub fn new(pipeline: Arc<Pipeline>, store: Arc<RecordStore>) -> Self {
        Self {
            pipeline,
            store,
            session: Arc::new(Mutex::new(None)),
            tool_router: Self::tool_router(),
        }
    }

    fn cursor_response(
        session: &BrowseSession,
    ) -> Result<CursorResponse, String> {
        let recommendation = session
            .current()
            .cloned()
            .ok_or_else(|| "no recommendations available".to_string())?;
        Ok(CursorResponse {
            index: session.index(),
            total: session.len(),
            recommendation,
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RecommendParams {
    /// Free-text description of what the user is looking for.
    query: String,
    /// `by-highlights` ranks individual quoted passages; `by-synopsis`
    /// ranks whole books by their synopsis.
    mode: SearchMode,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct BrowseShelfParams {
    /// Optional category label to sample from; omit for all categories.
    category: Option<String>,
    /// Number of books to sample (default 15).
    limit: Option<usize>,
}

#[derive(Debug, serde::Serialize, JsonSchema)]
struct RecommendResponse {
    count: usize,
    recommendations: Vec<Recommendation>,
}

#[derive(Debug, serde::Serialize, JsonSchema)]
struct CursorResponse {
    index: usize,
    total: usize,
    recommendation: Recommendation,
}

#[derive(Debug, serde::Serialize, JsonSchema)]
struct CategoryListResponse {
    categories: Vec<String>,
}

#[derive(Debug, serde::Serialize, JsonSchema)]
struct ShelfResponse {
    books: Vec<ShelfRow>,
}

#[tool_router]
impl RecommenderServer {
    #[tool(description = "Recommend books for a free-text query. Runs the full pipeline (language detection, category inference, candidate lookup, ranking, reconciliation, optional translation) and returns the ordered recommendation list.")]
    async fn recommend(
        &self,
        Parameters(params): Parameters<RecommendParams>,
    ) -> Result<Json<RecommendResponse>, String> {
        let query = params.query.trim().to_string();
        if query.is_empty() {
            return Err("query must not be empty".to_string());
        }

        let recommendations = self
            .pipeline
            .recommend(&query, params.mode)
            .await
            .map_err(|e| e.to_string())?;

        let response = RecommendResponse {
            count: recommendations.len(),
            recommendations: recommendations.clone(),
        };
        *self.session.lock().expect("session lock") =
            Some(BrowseSession::new(recommendations));
        Ok(Json(response))
    }

    #[tool(description = "Move forward through the most recent recommendation list and return the current entry. Bounded at the last entry.")]
    async fn next_recommendation(&self) -> Result<Json<CursorResponse>, String> {
        let mut guard = self.session.lock().expect("session lock");
        let session = guard
            .as_mut()
            .ok_or_else(|| "no recommendation list yet, call recommend first".to_string())?;
        session.forward();
        Ok(Json(Self::cursor_response(session)?))
    }

    #[tool(description = "Move backward through the most recent recommendation list and return the current entry. Bounded at the first entry.")]
    async fn previous_recommendation(&self) -> Result<Json<CursorResponse>, String> {
        let mut guard = self.session.lock().expect("session lock");
        let session = guard
            .as_mut()
            .ok_or_else(|| "no recommendation list yet, call recommend first".to_string())?;
        session.back();
        Ok(Json(Self::cursor_response(session)?))
    }

    #[tool(description = "List the fixed set of category labels the catalog is tagged with.")]
    async fn list_categories(&self) -> Result<Json<CategoryListResponse>, String> {
        Ok(Json(CategoryListResponse {
            categories: Category::ALL
                .into_iter()
                .map(|c| c.label().to_string())
                .collect(),
        }))
    }

    #[tool(description = "Sample random books from the shelf, optionally filtered to one category label.")]
    async fn browse_shelf(
        &self,
        Parameters(params): Parameters<BrowseShelfParams>,
    ) -> Result<Json<ShelfResponse>, String> {
        let category = match params.category.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => Some(
                Category::from_label(label)
                    .ok_or_else(|| format!("unknown category: {label}"))?,
            ),
            _ => None,
        };
        let limit = params.limit.unwrap_or(15).clamp(1, 50);

        let books = self
            .store
            .random_sample(category.map(Category::label), limit)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Json(ShelfResponse { books }))
    }
}

#[tool_handler]
impl ServerHandler for RecommenderServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "book-recommender".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Book recommendation MCP server. Call recommend with a free-text query and a \
mode (by-highlights or by-synopsis) to get an ordered recommendation list, then navigate it \
with next_recommendation/previous_recommendation. list_categories shows the fixed label set; \
browse_shelf samples random books for display surfaces."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RecommenderServer;

    #[test]
    fn tools_publish_output_schemas() {
        let tools = RecommenderServer::tool_router().list_all();
        for name in [
            "recommend",
            "next_recommendation",
            "previous_recommendation",
            "list_categories",
            "browse_shelf",
        ] {
            let tool = tools
                .iter()
                .find(|t| t.name == name)
                .unwrap_or_else(|| panic!("missing tool: {name}"));
            assert!(
                tool.output_schema.is_some(),
                "tool {name} should publish output_schema"
            );
        }
    }
}

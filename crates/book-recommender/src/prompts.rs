/// Instruction composition for the text-understanding calls.
///
/// Every prompt is assembled from the same sections (role, context, task,
/// process, output format, payload) so the model always receives a
/// fully-composed instruction string and the client can stay shape-agnostic.
use crate::model::Unit;

struct PromptSections<'a> {
    role: &'a str,
    context: Option<String>,
    task: &'a str,
    process: Option<&'a str>,
    output_format: &'a str,
    content: String,
}

impl PromptSections<'_> {
    fn compose(&self) -> String {
        let mut out = format!("# ROLE\n{}", self.role);
        if let Some(context) = &self.context {
            out.push_str(&format!("\n\n# CONTEXT\n{context}"));
        }
        out.push_str(&format!("\n\n# TASK\n{}", self.task));
        if let Some(process) = self.process {
            out.push_str(&format!("\n\n# PROCESS\n{process}"));
        }
        out.push_str(&format!("\n\n# OUTPUT FORMAT\n{}", self.output_format));
        out.push_str(&format!("\n\n{}", self.content));
        out
    }
}

/// Classify the query as English or Indonesian.
pub fn language_detection(query: &str) -> String {
    PromptSections {
        role: "You are a highly accurate language identification AI.",
        context: None,
        task: "Analyze the user's query and determine if it is primarily written in English or Indonesian.",
        process: None,
        output_format: "\
- Your response MUST be a valid JSON object.
- The JSON object must have a single key: \"language\".
- The value must be either \"en\" for English or \"id\" for Indonesian.",
        content: format!("User query: \"{query}\""),
    }
    .compose()
}

/// Pick 1-3 categories from the fixed label list for the query.
pub fn category_inference(query: &str, available_labels: &str) -> String {
    PromptSections {
        role: "You are a specialized AI assistant with expert knowledge of book categories and user intent analysis. You are fluent in both English and Indonesian.",
        context: Some(format!("Available categories: {available_labels}")),
        task: "Analyze the user's query, which can be in English or Indonesian, and determine which book categories would be most relevant.",
        process: Some("\
1. First, detect the language of the user's query (English or Indonesian).
2. Carefully read the query to understand the user's needs, interests, or preferences, regardless of the language.
3. Scan the available categories for the best matches based on the query's meaning.
4. Prioritize categories where the benefits directly address the user's query.
5. Select a minimum of 1 and a maximum of 3 categories that are most relevant.
6. If the query is vague, choose the most general applicable categories."),
        output_format: "\
- Your response MUST be a valid JSON object.
- The JSON object must have a single key: \"categories\".
- The value of \"categories\" must be an array of strings.
- Each string must be the exact name of a recommended category from the provided list.",
        content: format!("User query: \"{query}\"\n\nSelected categories:"),
    }
    .compose()
}

/// Rank every highlight unit against the query, omitting none.
pub fn highlight_ranking(query: &str, units: &[Unit]) -> String {
    PromptSections {
        role: "You are an expert content analyst specializing in matching book insights to user queries with surgical precision. You are fluent in both English and Indonesian.",
        context: Some(format!(
            "You have {} individual book highlights. Your task is to find the most relevant highlights that directly answer or address the user's specific query, which may be in English or Indonesian.",
            units.len()
        )),
        task: "Rank ALL of the provided highlights based on how relevant they are to the user's query.",
        process: Some("\
1. Analyze the user's query (in English or Indonesian) to understand their specific need.
2. Evaluate every single highlight provided for its relevance to the query.
3. Rank all highlights from most relevant to least relevant. Even highlights with low relevance must be included at the end of the list.
4. Do not filter or exclude any highlights. The final list must contain all original highlights, just in a new order."),
        output_format: RANKING_OUTPUT_FORMAT,
        content: format!(
            "Available highlights:\n{}\n\nUser query: \"{query}\"\n\nRanked matching highlights:",
            unit_lines(units, crate::model::SearchMode::ByHighlights, "Highlight")
        ),
    }
    .compose()
}

/// Rank every synopsis unit against the query, with an advisory preference
/// for cross-book diversity. The hard one-per-title cap is enforced later
/// in reconciliation regardless of how the model ranks.
pub fn synopsis_ranking(query: &str, units: &[Unit]) -> String {
    PromptSections {
        role: "You are an expert content analyst specializing in matching book synopses to user queries with surgical precision. You are fluent in both English and Indonesian.",
        context: Some(format!(
            "You have {} individual book synopses. Your task is to find the most relevant synopses that directly address the user's specific query.",
            units.len()
        )),
        task: "Rank ALL of the provided synopses based on how relevant they are to the user's query.",
        process: Some("\
1. Analyze the user's query to understand their specific need.
2. Evaluate every single synopsis for its relevance to the query.
3. Rank all synopses from most relevant to least relevant. Even synopses with low relevance must be included at the end of the list.
4. Do not filter or exclude any synopses. The final list must contain all original synopses, just in a new order.
5. CRITICAL RULE: While ranking, strongly prefer diversity. Try not to rank multiple synopses from the same book highly if possible."),
        output_format: RANKING_OUTPUT_FORMAT,
        content: format!(
            "Available synopses:\n{}\n\nUser query: \"{query}\"\n\nRanked matching synopses:",
            unit_lines(units, crate::model::SearchMode::BySynopsis, "Synopsis")
        ),
    }
    .compose()
}

/// Translate the ordered display texts into Indonesian.
pub fn translation(texts: &[String]) -> String {
    PromptSections {
        role: "You are an expert translator specializing in conveying the nuanced meaning of book highlights from English to Indonesian.",
        context: None,
        task: "Translate EACH of the following English book highlights into Indonesian. Preserve the core wisdom, context, and tone of the original highlight. Return the translations in the exact same order as the input.",
        process: None,
        output_format: "\
- Your response MUST be a valid JSON object.
- The JSON object must have a single key: \"translations\".
- The value must be an array of strings.",
        content: format!(
            "Original English highlights (JSON array format):\n{}",
            serde_json::to_string(texts).unwrap_or_else(|_| "[]".to_string())
        ),
    }
    .compose()
}

const RANKING_OUTPUT_FORMAT: &str = "\
- Your response MUST be a valid JSON object.
- The JSON object must have a single key: \"recommendations\".
- The value must be an array of objects, each with an \"id\" field.
- The array must contain an object for EVERY id provided in the input.
- Order the array by relevance (most relevant first, least relevant last).";

fn unit_lines(units: &[Unit], mode: crate::model::SearchMode, kind: &str) -> String {
    units
        .iter()
        .map(|u| {
            format!(
                "ID: {} | Book: \"{}\" | {kind}: \"{}\"",
                u.key.synthetic_id(mode),
                u.record_title,
                u.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

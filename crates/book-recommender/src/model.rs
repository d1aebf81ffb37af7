use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use rec_common::store::TextField;

/// The fixed set of category labels the catalog is tagged with.
///
/// The same labels constrain the model's category inference and key the
/// store's fuzzy filter, so the list is compiled in rather than fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Habits,
    Finance,
    Leadership,
    MentalHealth,
    Motivational,
    PhysicalHealth,
    TimeManagement,
    Communication,
    SelfDiscovery,
    DecisionMaking,
    Creativity,
    CognitiveIntelligence,
    Behaviour,
    EmotionalIntelligence,
    Innovation,
    Philosophy,
    Entrepreneurship,
}

impl Category {
    pub const ALL: [Category; 17] = [
        Category::Habits,
        Category::Finance,
        Category::Leadership,
        Category::MentalHealth,
        Category::Motivational,
        Category::PhysicalHealth,
        Category::TimeManagement,
        Category::Communication,
        Category::SelfDiscovery,
        Category::DecisionMaking,
        Category::Creativity,
        Category::CognitiveIntelligence,
        Category::Behaviour,
        Category::EmotionalIntelligence,
        Category::Innovation,
        Category::Philosophy,
        Category::Entrepreneurship,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Habits => "Habits",
            Category::Finance => "Finance",
            Category::Leadership => "Leadership",
            Category::MentalHealth => "Mental health",
            Category::Motivational => "Motivational",
            Category::PhysicalHealth => "Physical Health",
            Category::TimeManagement => "Time Management",
            Category::Communication => "Communication",
            Category::SelfDiscovery => "Self-Discovery",
            Category::DecisionMaking => "Decision making",
            Category::Creativity => "Creativity",
            Category::CognitiveIntelligence => "Cognitive intelligence",
            Category::Behaviour => "Behaviour",
            Category::EmotionalIntelligence => "Emotional Intelligence",
            Category::Innovation => "Innovation",
            Category::Philosophy => "Philosophy",
            Category::Entrepreneurship => "Entrepreneurship",
        }
    }

    /// Case-insensitive label match. Unknown labels return `None`; the
    /// pipeline drops them rather than failing, since the model occasionally
    /// invents variants.
    pub fn from_label(s: &str) -> Option<Category> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(wanted))
    }

    /// Comma-separated label list for prompt context.
    pub fn joined_labels() -> String {
        Category::ALL
            .into_iter()
            .map(Category::label)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Which per-record text the pipeline ranks against the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    ByHighlights,
    BySynopsis,
}

impl SearchMode {
    pub fn text_field(self) -> TextField {
        match self {
            SearchMode::ByHighlights => TextField::Highlights,
            SearchMode::BySynopsis => TextField::Synopsis,
        }
    }
}

/// A validated candidate record. `text` holds whichever column the mode
/// selected; the pipeline never mutates a record after validation.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub author: String,
    pub text: String,
    pub category: String,
}

/// Identity of one rankable unit within a single pipeline invocation.
///
/// Strongly typed rather than a string to be parsed; the synthetic string
/// forms (`highlight_<i>_<j>`, `synopsis_<i>`) exist only at the prompt
/// boundary and are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitKey {
    pub record: usize,
    pub unit: usize,
}

impl UnitKey {
    pub fn synthetic_id(self, mode: SearchMode) -> String {
        match mode {
            SearchMode::ByHighlights => format!("highlight_{}_{}", self.record, self.unit),
            SearchMode::BySynopsis => format!("synopsis_{}", self.record),
        }
    }

    /// Parse a synthetic identifier returned by the ranking stage.
    ///
    /// Returns `None` for anything that does not round-trip: wrong prefix,
    /// missing or non-numeric indices, trailing segments. Callers skip such
    /// identifiers silently.
    pub fn parse_synthetic(mode: SearchMode, id: &str) -> Option<UnitKey> {
        match mode {
            SearchMode::ByHighlights => {
                let rest = id.strip_prefix("highlight_")?;
                let (record, unit) = rest.split_once('_')?;
                Some(UnitKey {
                    record: record.parse().ok()?,
                    unit: unit.parse().ok()?,
                })
            }
            SearchMode::BySynopsis => {
                let rest = id.strip_prefix("synopsis_")?;
                Some(UnitKey {
                    record: rest.parse().ok()?,
                    unit: 0,
                })
            }
        }
    }
}

/// One rankable, displayable span of text derived from a record, with
/// back-references to the owning record.
#[derive(Debug, Clone)]
pub struct Unit {
    pub key: UnitKey,
    pub text: String,
    pub record_id: String,
    pub record_title: String,
    pub record_author: String,
}

/// Final output unit handed to the presentation layer.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct Recommendation {
    pub id: String,
    pub title: String,
    pub author: String,
    /// Display text: a highlight or synopsis, possibly translated.
    pub text: String,
}

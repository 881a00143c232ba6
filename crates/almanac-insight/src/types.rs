use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use almanac_core::types::{SummaryConfig, SummarySection};

/// The structured reply of a summary generation call.
///
/// Sections the model left out, or filled with something other than a
/// list, come back empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredSummary {
    pub key_points: Vec<String>,
    pub decisions: Vec<String>,
    pub action_items: Vec<String>,
    pub questions: Vec<String>,
    pub sentiment: Option<String>,
    pub participants: Vec<String>,
}

impl StructuredSummary {
    /// Read the known keys out of an extracted JSON object.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let list = |key: &str| object.get(key).map(items).unwrap_or_default();
        Self {
            key_points: list(SummarySection::KeyPoints.json_key()),
            decisions: list(SummarySection::Decisions.json_key()),
            action_items: list(SummarySection::ActionItems.json_key()),
            questions: list(SummarySection::Questions.json_key()),
            sentiment: object
                .get("sentiment")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            participants: object.get("participants").map(items).unwrap_or_default(),
        }
    }

    pub fn section(&self, section: SummarySection) -> &[String] {
        match section {
            SummarySection::KeyPoints => &self.key_points,
            SummarySection::Decisions => &self.decisions,
            SummarySection::ActionItems => &self.action_items,
            SummarySection::Questions => &self.questions,
        }
    }

    /// Whether any of the configured sections carries at least one item.
    pub fn has_content(&self, config: &SummaryConfig) -> bool {
        config
            .sections()
            .iter()
            .any(|s| !self.section(*s).is_empty())
    }

    /// Render the stored summary text.
    ///
    /// Only configured sections appear, in canonical order, each capped
    /// at the detail level's item limit. Empty sections are omitted.
    pub fn render(&self, config: &SummaryConfig) -> String {
        let max_items = config.detail_level().max_items();
        let mut blocks: Vec<String> = Vec::new();

        for section in config.sections() {
            let entries = self.section(*section);
            if entries.is_empty() {
                continue;
            }
            let mut block = format!("## {}", section.title());
            for entry in entries.iter().take(max_items) {
                block.push_str("\n- ");
                block.push_str(entry);
            }
            blocks.push(block);
        }

        let mut footer: Vec<String> = Vec::new();
        if !self.participants.is_empty() {
            footer.push(format!("Participants: {}", self.participants.join(", ")));
        }
        if let Some(sentiment) = &self.sentiment {
            footer.push(format!("Sentiment: {}", sentiment));
        }
        if !footer.is_empty() {
            blocks.push(footer.join("\n"));
        }

        blocks.join("\n\n")
    }
}

/// Flatten a JSON list into display strings.
///
/// Objects are tolerated for action items of the form
/// `{"task": ..., "owner": ..., "deadline": ...}`.
fn items(value: &Value) -> Vec<String> {
    let Some(array) = value.as_array() else {
        return Vec::new();
    };
    array
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(o) => object_item(o),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn object_item(object: &Map<String, Value>) -> Option<String> {
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| object.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    let text = field(&["task", "text", "description", "item"])?;
    let owner = field(&["owner", "assignee", "responsible"]);
    let deadline = field(&["deadline", "due", "dueDate"]);
    Some(match (owner, deadline) {
        (Some(o), Some(d)) => format!("{} ({}, {})", text, o, d),
        (Some(o), None) => format!("{} ({})", text, o),
        (None, Some(d)) => format!("{} ({})", text, d),
        (None, None) => text.to_string(),
    })
}

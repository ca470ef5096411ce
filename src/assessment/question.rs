//! Assessment question types and validation of AI-generated question JSON.
//!
//! AI output is parsed into untyped JSON first, then each entry is
//! validated into a strict [`Question`]. Entries that fail validation are
//! dropped whole; no partially-filled question ever leaves this module.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use super::extract_json_array;

/// How much a question counts toward the alignment score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Importance {
    Critical,
    Important,
    #[default]
    Normal,
    NiceToHave,
}

impl Importance {
    /// Fixed multiplier applied to the question's contribution
    pub fn weight(&self) -> f64 {
        match self {
            Self::Critical => 1.5,
            Self::Important => 1.2,
            Self::Normal => 1.0,
            Self::NiceToHave => 0.7,
        }
    }

    /// Lenient parse: case, spaces and dashes are ignored
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().replace([' ', '-'], "_").as_str() {
            "CRITICAL" => Some(Self::Critical),
            "IMPORTANT" | "HIGH" => Some(Self::Important),
            "NORMAL" | "MEDIUM" => Some(Self::Normal),
            "NICE_TO_HAVE" | "LOW" => Some(Self::NiceToHave),
            _ => None,
        }
    }
}

/// One selectable answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub value: String,
    pub label: String,
    /// Position on the question's 1..=4 stance spectrum
    pub weight: u8,
}

impl AnswerOption {
    /// Create an option, clamping the weight into 1..=4
    pub fn new(value: impl Into<String>, label: impl Into<String>, weight: u8) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            weight: weight.clamp(1, 4),
        }
    }
}

/// A validated assessment question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub category: String,
    pub importance: Importance,
    pub importance_weight: f64,
    pub question_text: String,
    pub options: Vec<AnswerOption>,
}

impl Question {
    /// Create a question; the importance weight comes from the lookup table
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        importance: Importance,
        question_text: impl Into<String>,
        options: Vec<AnswerOption>,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            importance,
            importance_weight: importance.weight(),
            question_text: question_text.into(),
            options,
        }
    }

    /// Find an option by its value
    pub fn option(&self, value: &str) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.value == value)
    }
}

/// Parse an AI completion into validated questions.
///
/// Returns `Err` when no JSON array can be located or parsed; returns
/// `Ok(vec![])` when an array was found but every entry was invalid.
pub fn parse_ai_questions(completion: &str) -> Result<Vec<Question>, String> {
    let json = extract_json_array(completion)?;
    let entries: Vec<Value> =
        serde_json::from_str(json).map_err(|e| format!("Invalid question JSON: {}", e))?;

    let mut seen_ids = HashSet::new();
    let mut questions = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        match validate_entry(entry, index, &mut seen_ids) {
            Some(q) => questions.push(q),
            None => debug!(index, "Dropping invalid AI question entry"),
        }
    }

    Ok(questions)
}

fn validate_entry(entry: &Value, index: usize, seen_ids: &mut HashSet<String>) -> Option<Question> {
    let obj = entry.as_object()?;

    let text = ["question", "questionText", "question_text", "text"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())?;

    let options = validate_options(obj.get("options")?)?;

    let importance = obj
        .get("importance")
        .and_then(Value::as_str)
        .and_then(Importance::parse)
        .unwrap_or_default();

    let importance_weight = ["importanceWeight", "importance_weight"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_f64))
        .filter(|w| w.is_finite() && *w > 0.0)
        .unwrap_or_else(|| importance.weight());

    let category = obj
        .get("category")
        .and_then(Value::as_str)
        .map(|c| c.trim().to_lowercase().replace([' ', '-'], "_"))
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "general".to_string());

    let mut id = obj
        .get("id")
        .and_then(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("ai_q{}", index + 1));

    if seen_ids.contains(&id) {
        id = format!("ai_q{}", index + 1);
        let mut suffix = 1;
        while seen_ids.contains(&id) {
            suffix += 1;
            id = format!("ai_q{}_{}", index + 1, suffix);
        }
    }
    seen_ids.insert(id.clone());

    Some(Question {
        id,
        category,
        importance,
        importance_weight,
        question_text: text.to_string(),
        options,
    })
}

fn validate_options(raw: &Value) -> Option<Vec<AnswerOption>> {
    let items = raw.as_array()?;

    let mut parsed: Vec<(String, String, Option<u8>)> = Vec::new();
    for item in items {
        let entry = match item {
            Value::String(s) if !s.trim().is_empty() => {
                let s = s.trim().to_string();
                (s.clone(), s, None)
            }
            Value::Object(o) => {
                let label = o
                    .get("label")
                    .or_else(|| o.get("text"))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty());
                let value = o
                    .get("value")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty());
                let (value, label) = match (value, label) {
                    (Some(v), Some(l)) => (v.to_string(), l.to_string()),
                    (Some(v), None) => (v.to_string(), v.to_string()),
                    (None, Some(l)) => (l.to_string(), l.to_string()),
                    (None, None) => continue,
                };
                let weight = o
                    .get("weight")
                    .and_then(Value::as_f64)
                    .map(|w| w.round().clamp(1.0, 4.0) as u8);
                (value, label, weight)
            }
            _ => continue,
        };

        if parsed.iter().any(|(v, _, _)| *v == entry.0) {
            continue;
        }
        parsed.push(entry);
    }

    if parsed.len() < 2 {
        return None;
    }

    let last = parsed.len() - 1;
    Some(
        parsed
            .into_iter()
            .enumerate()
            .map(|(i, (value, label, weight))| {
                let weight = weight.unwrap_or_else(|| positional_weight(i, last));
                AnswerOption::new(value, label, weight)
            })
            .collect(),
    )
}

/// Spread option positions evenly over the 1..=4 scale.
fn positional_weight(index: usize, last: usize) -> u8 {
    if last == 0 {
        return 1;
    }
    (1.0 + (index as f64 * 3.0 / last as f64)).round() as u8
}

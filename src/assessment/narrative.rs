//! Insight sentences, discussion prompts and the results narrative.
//!
//! Template text lives in `assets/insights.json`. The AI narrative is
//! validated here; the deterministic narrative is built from templates
//! keyed on score bucket and priority.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::context::Priority;
use super::extract_json_object;
use super::scorer::Misalignment;
use super::selector::PartnerNames;

const BUILTIN_INSIGHTS: &str = include_str!("../../assets/insights.json");

/// Template key used when a category has no dedicated entry.
const DEFAULT_KEY: &str = "default";

/// Prompts taken from misalignments in the deterministic narrative.
const MAX_FALLBACK_PROMPTS: usize = 3;

/// Where a result's narrative text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeSource {
    Ai,
    Fallback,
}

impl NarrativeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Fallback => "fallback",
        }
    }
}

/// Qualitative part of an alignment result.
#[derive(Debug, Clone, PartialEq)]
pub struct Narrative {
    pub narrative: String,
    pub discussion_prompts: Vec<String>,
    pub recommended_goals: Vec<String>,
    pub source: NarrativeSource,
}

/// Numeric results the narrative is written from.
#[derive(Debug, Clone, Copy)]
pub struct NarrativeInput<'a> {
    pub names: &'a PartnerNames,
    pub priority: Priority,
    pub alignment_score: u8,
    pub category_scores: &'a BTreeMap<String, u8>,
    pub misalignments: &'a [Misalignment],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InsightTiers {
    exceptional: String,
    solid: String,
    opportunity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NarrativeTemplates {
    thriving: String,
    strong: String,
    growing: String,
    building: String,
    strength: String,
    growth: String,
}

/// Template tables for insights, prompts, narratives and goals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightCatalog {
    category_insights: BTreeMap<String, InsightTiers>,
    discussion_prompts: BTreeMap<String, String>,
    narratives: NarrativeTemplates,
    priority_sentences: BTreeMap<String, String>,
    priority_prompts: BTreeMap<String, Vec<String>>,
    priority_goals: BTreeMap<String, Vec<String>>,
    category_goals: BTreeMap<String, String>,
}

static BUILTIN: OnceLock<InsightCatalog> = OnceLock::new();

impl InsightCatalog {
    /// Parse a catalog from its JSON form
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The embedded catalog, parsed on first use
    pub fn builtin() -> &'static InsightCatalog {
        BUILTIN.get_or_init(|| {
            Self::from_json(BUILTIN_INSIGHTS).expect("embedded insights must be valid JSON")
        })
    }

    /// Insight sentence for a shared answer, tiered by the category score
    pub fn insight(&self, category: &str, category_score: u8) -> &str {
        let tiers = self
            .category_insights
            .get(category)
            .or_else(|| self.category_insights.get(DEFAULT_KEY));

        match tiers {
            Some(t) if category_score >= 80 => &t.exceptional,
            Some(t) if category_score >= 60 => &t.solid,
            Some(t) => &t.opportunity,
            None => "",
        }
    }

    /// Discussion prompt for a question the partners answered differently
    pub fn discussion_prompt(
        &self,
        category: &str,
        question_text: &str,
        names: &PartnerNames,
        partner1_label: &str,
        partner2_label: &str,
    ) -> String {
        let template = lookup_or_default(&self.discussion_prompts, category);
        fill(
            template,
            &[
                ("question", question_text),
                ("partner1", &names.partner1),
                ("partner2", &names.partner2),
                ("label1", partner1_label),
                ("label2", partner2_label),
            ],
        )
    }

    /// Deterministic narrative, prompts and goals
    pub fn fallback_narrative(&self, input: &NarrativeInput<'_>) -> Narrative {
        let score = input.alignment_score.to_string();
        let names = input.names;

        let bucket = match input.alignment_score {
            85..=u8::MAX => &self.narratives.thriving,
            70..=84 => &self.narratives.strong,
            50..=69 => &self.narratives.growing,
            _ => &self.narratives.building,
        };

        let mut paragraphs = vec![fill(
            bucket,
            &[
                ("partner1", &names.partner1),
                ("partner2", &names.partner2),
                ("score", &score),
            ],
        )];

        if let Some(sentence) = self.priority_sentences.get(input.priority.as_str()) {
            paragraphs.push(sentence.clone());
        }

        let strongest = strongest_category(input.category_scores);
        let weakest = weakest_category(input.category_scores);

        let mut detail = Vec::new();
        if let Some((category, value)) = strongest {
            detail.push(fill(
                &self.narratives.strength,
                &[("category", &display_category(category)), ("score", &value.to_string())],
            ));
        }
        if let (Some((weak, weak_score)), Some((strong, _))) = (weakest, strongest) {
            if weak != strong {
                detail.push(capitalize(&fill(
                    &self.narratives.growth,
                    &[("category", &display_category(weak)), ("score", &weak_score.to_string())],
                )));
            }
        }
        if !detail.is_empty() {
            paragraphs.push(detail.join(" "));
        }

        let mut discussion_prompts: Vec<String> = input
            .misalignments
            .iter()
            .take(MAX_FALLBACK_PROMPTS)
            .map(|m| m.discussion_prompt.clone())
            .collect();
        if discussion_prompts.is_empty() {
            discussion_prompts = self.priority_prompts(input.priority).to_vec();
        }

        let mut recommended_goals = self.priority_goals(input.priority).to_vec();
        if let Some((category, _)) = weakest {
            let goal = lookup_or_default(&self.category_goals, category).to_string();
            if !goal.is_empty() && !recommended_goals.contains(&goal) {
                recommended_goals.push(goal);
            }
        }

        Narrative {
            narrative: paragraphs.join("\n\n"),
            discussion_prompts,
            recommended_goals,
            source: NarrativeSource::Fallback,
        }
    }

    /// Generic prompts for a priority
    pub fn priority_prompts(&self, priority: Priority) -> &[String] {
        self.priority_prompts
            .get(priority.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Recommended goals for a priority
    pub fn priority_goals(&self, priority: Priority) -> &[String] {
        self.priority_goals
            .get(priority.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn lookup_or_default<'a>(table: &'a BTreeMap<String, String>, key: &str) -> &'a str {
    table
        .get(key)
        .or_else(|| table.get(DEFAULT_KEY))
        .map(String::as_str)
        .unwrap_or("")
}

/// Replace `{name}` placeholders.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{}}}", key), value)
    })
}

/// First category with the highest score (map order breaks ties).
fn strongest_category(scores: &BTreeMap<String, u8>) -> Option<(&str, u8)> {
    let mut best: Option<(&str, u8)> = None;
    for (category, &score) in scores {
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((category.as_str(), score));
        }
    }
    best
}

/// First category with the lowest score (map order breaks ties).
fn weakest_category(scores: &BTreeMap<String, u8>) -> Option<(&str, u8)> {
    scores
        .iter()
        .min_by_key(|entry| *entry.1)
        .map(|(category, &score)| (category.as_str(), score))
}

/// "buy_home" -> "Buy home"
pub(crate) fn display_category(category: &str) -> String {
    capitalize(&category.replace('_', " "))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiNarrative {
    #[serde(default)]
    narrative: String,
    #[serde(default, alias = "discussion_prompts")]
    discussion_prompts: Vec<String>,
    #[serde(default, alias = "recommended_goals")]
    recommended_goals: Vec<String>,
}

/// Parse and validate an AI narrative completion.
///
/// Requires a non-empty `narrative`; blank prompt and goal entries are dropped.
pub(crate) fn parse_ai_narrative(completion: &str) -> Result<Narrative, String> {
    let json = extract_json_object(completion)?;
    let raw: AiNarrative =
        serde_json::from_str(json).map_err(|e| format!("Invalid narrative JSON: {}", e))?;

    let narrative = raw.narrative.trim().to_string();
    if narrative.is_empty() {
        return Err("Narrative response has an empty narrative".to_string());
    }

    let clean = |items: Vec<String>| -> Vec<String> {
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };

    Ok(Narrative {
        narrative,
        discussion_prompts: clean(raw.discussion_prompts),
        recommended_goals: clean(raw.recommended_goals),
        source: NarrativeSource::Ai,
    })
}

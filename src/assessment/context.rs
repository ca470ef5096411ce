//! Context derivation: prescreening answers in, normalized couple facts out.
//!
//! [`derive_context`] is the single place where prescreening defaults are
//! applied. Everything downstream (selector, scorer, narrative) reads a
//! [`NormalizedContext`] and never re-checks for missing fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Focus areas applied when a couple picks none.
pub const DEFAULT_FOCUS_AREAS: [&str; 3] = ["finances", "communication", "values"];

/// Focus-area tags that have a question pool behind them.
pub const KNOWN_FOCUS_AREAS: [&str; 8] = [
    "finances",
    "travel",
    "home",
    "career",
    "family",
    "lifestyle",
    "communication",
    "values",
];

/// One partner's raw prescreening answers, keyed by question id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrescreeningAnswers(HashMap<String, Value>);

impl PrescreeningAnswers {
    /// Create an empty answer map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an answer
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// First non-null value stored under any of `keys`.
    pub fn get_any(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .find(|v| !v.is_null())
    }

    /// Whether no answers were recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, Value>> for PrescreeningAnswers {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

/// Both partners' prescreening. Partner 1 is authoritative per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prescreening {
    #[serde(default)]
    pub partner1: PrescreeningAnswers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner2: Option<PrescreeningAnswers>,
}

impl Prescreening {
    /// Prescreening with only partner 1's answers
    pub fn single(partner1: PrescreeningAnswers) -> Self {
        Self {
            partner1,
            partner2: None,
        }
    }

    /// Attach partner 2's answers
    pub fn with_partner2(mut self, partner2: PrescreeningAnswers) -> Self {
        self.partner2 = Some(partner2);
        self
    }

    fn lookup<T>(&self, keys: &[&str], parse: impl Fn(&Value) -> Option<T>) -> Option<T> {
        self.partner1
            .get_any(keys)
            .and_then(&parse)
            .or_else(|| {
                self.partner2
                    .as_ref()
                    .and_then(|p| p.get_any(keys))
                    .and_then(&parse)
            })
    }
}

/// How long the couple has been together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipLength {
    #[serde(rename = "under_1_year")]
    UnderOneYear,
    #[serde(rename = "1_3_years")]
    OneToThreeYears,
    #[serde(rename = "3_5_years")]
    ThreeToFiveYears,
    #[serde(rename = "5_plus_years")]
    FivePlusYears,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl RelationshipLength {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "under_1_year" | "less_than_1_year" => Some(Self::UnderOneYear),
            "1_3_years" => Some(Self::OneToThreeYears),
            "3_5_years" => Some(Self::ThreeToFiveYears),
            "5_plus_years" | "5_years_plus" => Some(Self::FivePlusYears),
            _ => None,
        }
    }

    /// Human-readable label for prompts
    pub fn describe(&self) -> &'static str {
        match self {
            Self::UnderOneYear => "less than a year",
            Self::OneToThreeYears => "1-3 years",
            Self::ThreeToFiveYears => "3-5 years",
            Self::FivePlusYears => "more than 5 years",
            Self::Unknown => "not specified",
        }
    }
}

/// Whether a couple without children wants them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WantsChildren {
    YesSoon,
    YesLater,
    Maybe,
    No,
    #[default]
    Unset,
}

impl WantsChildren {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "yes_soon" => Some(Self::YesSoon),
            "yes_later" | "yes" => Some(Self::YesLater),
            "maybe" | "unsure" => Some(Self::Maybe),
            "no" => Some(Self::No),
            _ => None,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::YesSoon => "yes, soon",
            Self::YesLater => "yes, later",
            Self::Maybe => "maybe",
            Self::No => "no",
            Self::Unset => "not specified",
        }
    }
}

/// Current living arrangement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivingSituation {
    Together,
    Separate,
    LongDistance,
    #[default]
    Unknown,
}

impl LivingSituation {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "together" | "living_together" => Some(Self::Together),
            "separate" | "living_separately" => Some(Self::Separate),
            "long_distance" => Some(Self::LongDistance),
            _ => None,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Together => "living together",
            Self::Separate => "living separately",
            Self::LongDistance => "long distance",
            Self::Unknown => "not specified",
        }
    }
}

/// The couple's single stated priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Moving,
    BuyHome,
    Wedding,
    Baby,
    FinancialGoal,
    TravelTrip,
    CareerChange,
    #[default]
    JustExploring,
}

impl Priority {
    /// Tag used as the pool key and in prompts
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Moving => "moving",
            Self::BuyHome => "buy_home",
            Self::Wedding => "wedding",
            Self::Baby => "baby",
            Self::FinancialGoal => "financial_goal",
            Self::TravelTrip => "travel_trip",
            Self::CareerChange => "career_change",
            Self::JustExploring => "just_exploring",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "moving" => Some(Self::Moving),
            "buy_home" => Some(Self::BuyHome),
            "wedding" => Some(Self::Wedding),
            "baby" => Some(Self::Baby),
            "financial_goal" => Some(Self::FinancialGoal),
            "travel_trip" => Some(Self::TravelTrip),
            "career_change" => Some(Self::CareerChange),
            "just_exploring" => Some(Self::JustExploring),
            _ => None,
        }
    }

    /// Phrase used in prompts and fallback prose
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Moving => "planning a move",
            Self::BuyHome => "buying a home",
            Self::Wedding => "planning a wedding",
            Self::Baby => "starting or growing a family",
            Self::FinancialGoal => "reaching a financial goal",
            Self::TravelTrip => "planning a trip together",
            Self::CareerChange => "navigating a career change",
            Self::JustExploring => "getting to know each other better",
        }
    }

    /// Question categories that count as this priority.
    pub fn categories(&self) -> &'static [&'static str] {
        match self {
            Self::Moving => &["moving"],
            Self::BuyHome => &["buy_home", "home"],
            Self::Wedding => &["wedding"],
            Self::Baby => &["baby", "family"],
            Self::FinancialGoal => &["financial_goal", "finances"],
            Self::TravelTrip => &["travel_trip", "travel"],
            Self::CareerChange => &["career_change", "career"],
            Self::JustExploring => &["just_exploring"],
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requested assessment length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentDepth {
    Quick,
    #[default]
    Standard,
    Deep,
}

impl AssessmentDepth {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "quick" => Some(Self::Quick),
            "standard" => Some(Self::Standard),
            "deep" => Some(Self::Deep),
            _ => None,
        }
    }

    /// Inclusive (min, max) question count
    pub fn range(&self) -> (usize, usize) {
        match self {
            Self::Quick => (10, 15),
            Self::Standard => (18, 25),
            Self::Deep => (30, 40),
        }
    }

    /// Count the fallback generator aims for
    pub fn target(&self) -> usize {
        match self {
            Self::Quick => 12,
            Self::Standard => 20,
            Self::Deep => 35,
        }
    }

    /// Tag used in prompts
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Standard => "standard",
            Self::Deep => "deep",
        }
    }
}

/// Prescreening facts with every default applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedContext {
    pub relationship_length: RelationshipLength,
    pub is_married: bool,
    pub has_children: bool,
    pub owns_home: bool,
    pub wants_children: WantsChildren,
    pub living_situation: LivingSituation,
    pub focus_areas: Vec<String>,
    pub current_priority: Priority,
    pub assessment_depth: AssessmentDepth,
}

impl Default for NormalizedContext {
    fn default() -> Self {
        Self {
            relationship_length: RelationshipLength::default(),
            is_married: false,
            has_children: false,
            owns_home: false,
            wants_children: WantsChildren::default(),
            living_situation: LivingSituation::default(),
            focus_areas: DEFAULT_FOCUS_AREAS.iter().map(|s| s.to_string()).collect(),
            current_priority: Priority::default(),
            assessment_depth: AssessmentDepth::default(),
        }
    }
}

/// Normalize both partners' prescreening into a fully populated context.
///
/// Total: never fails, never leaves a field unset.
pub fn derive_context(prescreening: &Prescreening) -> NormalizedContext {
    let defaults = NormalizedContext::default();

    NormalizedContext {
        relationship_length: prescreening
            .lookup(&["relationship_length", "relationshipLength"], |v| {
                tag(v).and_then(|t| RelationshipLength::from_tag(&t))
            })
            .unwrap_or(defaults.relationship_length),
        is_married: prescreening
            .lookup(&["is_married", "isMarried"], parse_married)
            .unwrap_or(defaults.is_married),
        has_children: prescreening
            .lookup(&["has_children", "hasChildren"], parse_bool)
            .unwrap_or(defaults.has_children),
        owns_home: prescreening
            .lookup(&["owns_home", "ownsHome"], parse_bool)
            .unwrap_or(defaults.owns_home),
        wants_children: prescreening
            .lookup(&["wants_children", "wantsChildren"], |v| {
                tag(v).and_then(|t| WantsChildren::from_tag(&t))
            })
            .unwrap_or(defaults.wants_children),
        living_situation: prescreening
            .lookup(&["living_situation", "livingSituation"], |v| {
                tag(v).and_then(|t| LivingSituation::from_tag(&t))
            })
            .unwrap_or(defaults.living_situation),
        focus_areas: prescreening
            .lookup(&["focus_areas", "focusAreas"], parse_focus_areas)
            .unwrap_or(defaults.focus_areas),
        current_priority: prescreening
            .lookup(&["current_priority", "currentPriority"], |v| {
                tag(v).and_then(|t| Priority::from_tag(&t))
            })
            .unwrap_or(defaults.current_priority),
        assessment_depth: prescreening
            .lookup(&["assessment_depth", "assessmentDepth"], |v| {
                tag(v).and_then(|t| AssessmentDepth::from_tag(&t))
            })
            .unwrap_or(defaults.assessment_depth),
    }
}

/// Lowercase, trimmed tag with spaces and dashes folded to underscores.
fn tag(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    Some(s.to_lowercase().replace([' ', '-'], "_"))
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(_) => match tag(value)?.as_str() {
            "yes" | "y" | "true" | "1" => Some(true),
            "no" | "n" | "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Marital status as a yes/no or as a status word.
fn parse_married(value: &Value) -> Option<bool> {
    parse_bool(value).or_else(|| match tag(value)?.as_str() {
        "married" => Some(true),
        "not_married" | "unmarried" | "single" | "engaged" | "dating" => Some(false),
        _ => None,
    })
}

fn parse_focus_areas(value: &Value) -> Option<Vec<String>> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(tag).collect(),
        Value::String(s) => s
            .split(',')
            .filter_map(|part| tag(&Value::String(part.to_string())))
            .collect(),
        _ => return None,
    };

    let mut areas: Vec<String> = Vec::new();
    for area in raw {
        if KNOWN_FOCUS_AREAS.contains(&area.as_str()) && !areas.contains(&area) {
            areas.push(area);
        }
    }

    if areas.is_empty() {
        None
    } else {
        Some(areas)
    }
}

impl NormalizedContext {
    /// Inclusive (min, max) question count for the chosen depth
    pub fn question_range(&self) -> (usize, usize) {
        self.assessment_depth.range()
    }

    /// Count the fallback generator aims for
    pub fn target_count(&self) -> usize {
        self.assessment_depth.target()
    }

    /// Whether a question category bears on the couple's priority or focus areas
    pub fn is_high_priority(&self, category: &str) -> bool {
        self.current_priority.categories().contains(&category)
            || self.focus_areas.iter().any(|a| a == category)
    }

    /// Whether the couple is open to having a first child
    pub fn open_to_children(&self) -> bool {
        !self.has_children && self.wants_children != WantsChildren::No
    }

    /// Adaptive guidance handed to the question generator.
    pub fn guidance(&self) -> Vec<String> {
        let mut rules = Vec::new();

        if self.is_married {
            rules.push(
                "They are already married: do NOT ask when or whether they plan to marry."
                    .to_string(),
            );
        } else {
            rules.push(
                "They are not married: questions about marriage plans and timing are relevant."
                    .to_string(),
            );
        }

        if self.has_children {
            rules.push(
                "They already have children: do NOT ask whether they want kids; ask about parenting styles and whether they want more children."
                    .to_string(),
            );
        } else {
            match self.wants_children {
                WantsChildren::No => rules.push(
                    "They do not want children: do NOT include any questions about children."
                        .to_string(),
                ),
                WantsChildren::YesSoon => rules.push(
                    "They want children soon: include questions about parenting readiness."
                        .to_string(),
                ),
                _ => {}
            }
        }

        if self.owns_home {
            rules.push(
                "They already own a home: do NOT ask whether they want to buy one; ask about home improvements and future housing instead."
                    .to_string(),
            );
        }

        match self.living_situation {
            LivingSituation::LongDistance => rules.push(
                "They are long distance: include questions about closing the distance.".to_string(),
            ),
            LivingSituation::Separate => rules.push(
                "They live separately: include questions about moving in together.".to_string(),
            ),
            LivingSituation::Together => rules.push(
                "They already live together: do NOT ask about moving in together.".to_string(),
            ),
            LivingSituation::Unknown => {}
        }

        match self.relationship_length {
            RelationshipLength::UnderOneYear => rules.push(
                "They have been together less than a year: favor values and communication discovery questions."
                    .to_string(),
            ),
            RelationshipLength::FivePlusYears => rules.push(
                "They have been together more than 5 years: favor deeper future-alignment questions."
                    .to_string(),
            ),
            _ => {}
        }

        rules
    }

    /// Bullet summary of the couple's facts for prompts
    pub fn summary_lines(&self) -> Vec<String> {
        vec![
            format!(
                "Relationship length: {}",
                self.relationship_length.describe()
            ),
            format!("Married: {}", yes_no(self.is_married)),
            format!("Has children: {}", yes_no(self.has_children)),
            format!("Wants children: {}", self.wants_children.describe()),
            format!("Owns home: {}", yes_no(self.owns_home)),
            format!("Living situation: {}", self.living_situation.describe()),
            format!(
                "Current priority: {} ({})",
                self.current_priority,
                self.current_priority.describe()
            ),
            format!("Focus areas: {}", self.focus_areas.join(", ")),
        ]
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

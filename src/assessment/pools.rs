//! Static question pools and the deterministic fallback generator.
//!
//! Pools live in `assets/question_pools.json`, embedded at compile time and
//! parsed once. Selection is a pure function of the normalized context: the
//! same prescreening always yields the same question set.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::context::{LivingSituation, NormalizedContext, Priority, RelationshipLength, WantsChildren};
use super::question::{AnswerOption, Importance, Question};

const BUILTIN_POOLS: &str = include_str!("../../assets/question_pools.json");

/// Pools topped up when priority and focus draws leave the set short.
pub const FOUNDATIONAL_POOLS: [&str; 4] = ["communication", "values", "lifestyle", "finances"];

/// Extra draws per foundational pool.
const FOUNDATIONAL_DRAW: usize = 2;

/// When a pool question is relevant to a couple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCondition {
    /// Marriage plans and timing
    NotMarried,
    /// "Do you want kids"
    OpenToChildren,
    /// Parenting style and more children
    HasChildren,
    /// Any other children question
    ChildrenTopic,
    /// Parenting readiness
    WantsChildrenSoon,
    /// "Do you want to buy a home"
    NotHomeowner,
    /// Home improvement and future housing
    Homeowner,
    /// Closing the distance
    LongDistance,
    /// Moving in together
    NotLivingTogether,
    /// Discovery questions for new couples
    EarlyRelationship,
    /// Deeper future alignment for long-term couples
    LongRelationship,
}

impl QuestionCondition {
    /// Whether the condition holds for this couple
    pub fn holds(&self, ctx: &NormalizedContext) -> bool {
        match self {
            Self::NotMarried => !ctx.is_married,
            Self::OpenToChildren => ctx.open_to_children(),
            Self::HasChildren => ctx.has_children,
            Self::ChildrenTopic => ctx.has_children || ctx.wants_children != WantsChildren::No,
            Self::WantsChildrenSoon => {
                !ctx.has_children && ctx.wants_children == WantsChildren::YesSoon
            }
            Self::NotHomeowner => !ctx.owns_home,
            Self::Homeowner => ctx.owns_home,
            Self::LongDistance => ctx.living_situation == LivingSituation::LongDistance,
            Self::NotLivingTogether => ctx.living_situation != LivingSituation::Together,
            Self::EarlyRelationship => ctx.relationship_length == RelationshipLength::UnderOneYear,
            Self::LongRelationship => ctx.relationship_length == RelationshipLength::FivePlusYears,
        }
    }
}

/// A pre-authored pool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolQuestion {
    pub id: String,
    pub category: String,
    pub importance: Importance,
    pub question: String,
    pub options: Vec<AnswerOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<QuestionCondition>,
    /// Entries sharing a topic ask the same thing; at most one is drawn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl PoolQuestion {
    /// Whether this entry may be asked of the couple
    pub fn is_eligible(&self, ctx: &NormalizedContext) -> bool {
        self.condition.map_or(true, |c| c.holds(ctx))
    }

    /// Convert into an assessment question
    pub fn to_question(&self) -> Question {
        Question::new(
            &self.id,
            &self.category,
            self.importance,
            &self.question,
            self.options.clone(),
        )
    }
}

/// All question pools, keyed by priority and by focus area.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionCatalog {
    #[serde(default)]
    priority: BTreeMap<String, Vec<PoolQuestion>>,
    #[serde(default)]
    focus: BTreeMap<String, Vec<PoolQuestion>>,
    #[serde(default)]
    context: Vec<PoolQuestion>,
}

static BUILTIN: OnceLock<QuestionCatalog> = OnceLock::new();

impl QuestionCatalog {
    /// Parse a catalog from its JSON form
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The embedded catalog, parsed on first use
    pub fn builtin() -> &'static QuestionCatalog {
        BUILTIN.get_or_init(|| {
            Self::from_json(BUILTIN_POOLS).expect("embedded question pools must be valid JSON")
        })
    }

    /// Pool for a priority (empty if none is authored)
    pub fn priority_pool(&self, priority: Priority) -> &[PoolQuestion] {
        self.priority
            .get(priority.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pool for a focus area (empty if none is authored)
    pub fn focus_pool(&self, area: &str) -> &[PoolQuestion] {
        self.focus.get(area).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Conditional single questions, in insertion order
    pub fn context_questions(&self) -> &[PoolQuestion] {
        &self.context
    }

    /// Every entry: priority pools, focus pools, then context questions
    pub fn iter(&self) -> impl Iterator<Item = &PoolQuestion> {
        self.priority
            .values()
            .chain(self.focus.values())
            .flatten()
            .chain(self.context.iter())
    }

    /// Look up an entry by id
    pub fn find(&self, id: &str) -> Option<&PoolQuestion> {
        self.iter().find(|q| q.id == id)
    }

    /// Number of entries across all pools
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether the catalog has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accumulates drawn questions, deduplicating by id and topic and honoring eligibility.
struct Picker<'a> {
    ctx: &'a NormalizedContext,
    used: HashSet<&'a str>,
    topics: HashSet<&'a str>,
    picked: Vec<&'a PoolQuestion>,
}

impl<'a> Picker<'a> {
    fn new(ctx: &'a NormalizedContext) -> Self {
        Self {
            ctx,
            used: HashSet::new(),
            topics: HashSet::new(),
            picked: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.picked.len()
    }

    /// Take one entry if eligible and unused; reports whether it was taken.
    fn take(&mut self, question: &'a PoolQuestion) -> bool {
        if !question.is_eligible(self.ctx) || self.used.contains(question.id.as_str()) {
            return false;
        }
        if let Some(topic) = question.topic.as_deref() {
            if !self.topics.insert(topic) {
                return false;
            }
        }
        self.used.insert(question.id.as_str());
        self.picked.push(question);
        true
    }

    /// Take up to `count` entries from a pool, in pool order.
    fn draw(&mut self, pool: &'a [PoolQuestion], count: usize) -> usize {
        let mut taken = 0;
        for question in pool {
            if taken >= count {
                break;
            }
            if self.take(question) {
                taken += 1;
            }
        }
        taken
    }

    fn into_questions(self, max: usize) -> Vec<Question> {
        self.picked
            .into_iter()
            .take(max)
            .map(PoolQuestion::to_question)
            .collect()
    }
}

/// Deterministically select a question set from the pools.
///
/// Draw order: priority pool (half the target), each focus area (30% of
/// the target split evenly), foundational top-ups while short, conditional
/// context questions while below the maximum, then a padding sweep over
/// every remaining eligible entry while still short of the target.
pub fn fallback_questions(ctx: &NormalizedContext, catalog: &QuestionCatalog) -> Vec<Question> {
    let (min, max) = ctx.question_range();
    let target = ctx.target_count();
    let mut picker = Picker::new(ctx);

    let priority_quota = (target + 1) / 2;
    let priority_taken = picker.draw(catalog.priority_pool(ctx.current_priority), priority_quota);

    let areas = ctx.focus_areas.len().max(1);
    let per_area = (target * 3 + 10 * areas - 1) / (10 * areas);
    for area in &ctx.focus_areas {
        picker.draw(catalog.focus_pool(area), per_area);
    }

    for pool in FOUNDATIONAL_POOLS {
        if picker.len() >= target {
            break;
        }
        picker.draw(catalog.focus_pool(pool), FOUNDATIONAL_DRAW);
    }

    for question in catalog.context_questions() {
        if picker.len() >= max {
            break;
        }
        picker.take(question);
    }

    if picker.len() < target {
        let preferred = catalog
            .priority_pool(ctx.current_priority)
            .iter()
            .chain(ctx.focus_areas.iter().flat_map(|a| catalog.focus_pool(a)))
            .chain(FOUNDATIONAL_POOLS.iter().flat_map(|p| catalog.focus_pool(p)));

        for question in preferred.chain(catalog.iter()) {
            if picker.len() >= target {
                break;
            }
            picker.take(question);
        }
    }

    debug!(
        priority = %ctx.current_priority,
        priority_taken,
        selected = picker.len(),
        target,
        "Fallback pool selection complete"
    );

    if picker.len() < min {
        warn!(
            selected = picker.len(),
            min,
            "Fallback pools could not reach the minimum question count"
        );
    }

    picker.into_questions(max)
}

// ToxiGuard Data Models
// Types shared by the moderation pipeline stages and the presentation shell

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Chat identifier as handed over by the transport (Telegram chat ids are i64).
pub type ConversationId = i64;

// ============ Categories & Patterns ============

/// Scored toxicity categories produced by the classifier.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Toxicity,
    Insult,
    Harassment,
    Hate,
    SexualHarassment,
    Threat,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Toxicity,
        Category::Insult,
        Category::Harassment,
        Category::Hate,
        Category::SexualHarassment,
        Category::Threat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Toxicity => "toxicity",
            Self::Insult => "insult",
            Self::Harassment => "harassment",
            Self::Hate => "hate",
            Self::SexualHarassment => "sexual_harassment",
            Self::Threat => "threat",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PatternSeverity {
    /// Escalates to red when paired with moderate intensity.
    Hard,
    /// Escalates to orange on its own.
    Soft,
}

/// Unhealthy communication pattern vocabulary.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternTag {
    Sarcasm,
    Dismissive,
    Condescension,
    Humiliation,
    PassiveAggression,
    Manipulation,
    Gaslighting,
}

impl PatternTag {
    pub const ALL: [PatternTag; 7] = [
        PatternTag::Sarcasm,
        PatternTag::Dismissive,
        PatternTag::Condescension,
        PatternTag::Humiliation,
        PatternTag::PassiveAggression,
        PatternTag::Manipulation,
        PatternTag::Gaslighting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sarcasm => "sarcasm",
            Self::Dismissive => "dismissive",
            Self::Condescension => "condescension",
            Self::Humiliation => "humiliation",
            Self::PassiveAggression => "passive_aggression",
            Self::Manipulation => "manipulation",
            Self::Gaslighting => "gaslighting",
        }
    }

    /// Parse a tag as emitted by the classifier. Unknown tags yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|t| t.as_str() == normalized)
    }

    pub fn severity(&self) -> PatternSeverity {
        match self {
            Self::Humiliation | Self::Gaslighting | Self::Manipulation => PatternSeverity::Hard,
            Self::Sarcasm | Self::Dismissive | Self::Condescension | Self::PassiveAggression => {
                PatternSeverity::Soft
            }
        }
    }
}

impl fmt::Display for PatternTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Classifier Output ============

/// Fine-grained classification of one message.
///
/// Scores are always finite and within `[0, 1]`. Scores the classifier did not
/// supply (or supplied as non-numbers) are 0 and listed in `defaulted_scores`,
/// so callers can tell a genuine 0 from a missing value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRecord {
    pub lang: Option<String>,
    pub toxicity: f64,
    pub insult: f64,
    pub harassment: f64,
    pub hate: f64,
    pub sexual_harassment: f64,
    pub threat: f64,
    #[serde(default)]
    pub unhealthy_patterns: BTreeSet<PatternTag>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaulted_scores: Vec<Category>,
}

impl DetailRecord {
    pub fn score(&self, category: Category) -> f64 {
        match category {
            Category::Toxicity => self.toxicity,
            Category::Insult => self.insult,
            Category::Harassment => self.harassment,
            Category::Hate => self.hate,
            Category::SexualHarassment => self.sexual_harassment,
            Category::Threat => self.threat,
        }
    }

    /// Returns a copy with `category` set to `value` (clamped; non-finite becomes 0).
    pub fn with_score(mut self, category: Category, value: f64) -> Self {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        let slot = match category {
            Category::Toxicity => &mut self.toxicity,
            Category::Insult => &mut self.insult,
            Category::Harassment => &mut self.harassment,
            Category::Hate => &mut self.hate,
            Category::SexualHarassment => &mut self.sexual_harassment,
            Category::Threat => &mut self.threat,
        };
        *slot = value;
        self.defaulted_scores.retain(|c| *c != category);
        self
    }

    pub fn with_pattern(mut self, tag: PatternTag) -> Self {
        self.unhealthy_patterns.insert(tag);
        self
    }

    pub fn with_lang(mut self, lang: &str) -> Self {
        self.lang = Some(lang.to_string());
        self
    }

    /// Patterns of the given severity, sorted by tag name.
    pub fn patterns_of(&self, severity: PatternSeverity) -> Vec<PatternTag> {
        let mut tags: Vec<PatternTag> = self
            .unhealthy_patterns
            .iter()
            .copied()
            .filter(|t| t.severity() == severity)
            .collect();
        tags.sort_by_key(|t| t.as_str());
        tags
    }
}

// ============ Moderation ============

/// Verdict from the external moderation signal, passed through as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationVerdict {
    pub flagged: bool,
    #[serde(default)]
    pub categories: BTreeMap<String, bool>,
    #[serde(default)]
    pub category_scores: BTreeMap<String, f64>,
}

impl ModerationVerdict {
    pub fn flagged_categories(&self) -> Vec<&str> {
        self.categories
            .iter()
            .filter(|(_, hit)| **hit)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

// ============ Zoning ============

/// Severity tier. Ordering follows severity: `Green < Orange < Red`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Green,
    Orange,
    Red,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Orange => "orange",
            Self::Red => "red",
        }
    }

    pub fn is_escalated(&self) -> bool {
        *self != Zone::Green
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryThreshold {
    pub category: Category,
    pub threshold: f64,
}

impl CategoryThreshold {
    pub const fn new(category: Category, threshold: f64) -> Self {
        Self { category, threshold }
    }
}

/// Configurable threshold table for the zone decision.
///
/// Rule lists are evaluated in order; the first list entries win when
/// reasons are reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneThresholds {
    /// Critical categories: any hit is red.
    #[serde(default = "default_critical")]
    pub critical: Vec<CategoryThreshold>,
    /// Very high generic scores: any hit is red.
    #[serde(default = "default_high")]
    pub high: Vec<CategoryThreshold>,
    /// Moderate scores: hits accumulate into orange.
    #[serde(default = "default_orange")]
    pub orange: Vec<CategoryThreshold>,
    /// Intensity a hard pattern needs from toxicity/insult/harassment to go red.
    #[serde(default = "default_hard_pattern_intensity")]
    pub hard_pattern_intensity: f64,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self {
            critical: default_critical(),
            high: default_high(),
            orange: default_orange(),
            hard_pattern_intensity: default_hard_pattern_intensity(),
        }
    }
}

fn default_critical() -> Vec<CategoryThreshold> {
    vec![
        CategoryThreshold::new(Category::Threat, 0.30),
        CategoryThreshold::new(Category::Hate, 0.50),
        CategoryThreshold::new(Category::SexualHarassment, 0.50),
    ]
}

fn default_high() -> Vec<CategoryThreshold> {
    vec![
        CategoryThreshold::new(Category::Insult, 0.75),
        CategoryThreshold::new(Category::Toxicity, 0.75),
    ]
}

fn default_orange() -> Vec<CategoryThreshold> {
    vec![
        CategoryThreshold::new(Category::Insult, 0.40),
        CategoryThreshold::new(Category::Toxicity, 0.40),
        CategoryThreshold::new(Category::Harassment, 0.40),
    ]
}

fn default_hard_pattern_intensity() -> f64 {
    0.40
}

/// Zone plus the ordered reasons that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDecision {
    pub zone: Zone,
    pub reasons: Vec<String>,
}

// ============ Conversations ============

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    /// Only speak up in groups when there is a risk.
    #[default]
    Assistive,
    /// Also delete red messages in groups.
    Strict,
}

impl ConversationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assistive => "assistive",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of one conversation's state.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub seen: u64,
    pub flagged: u64,
    pub mode: ConversationMode,
}

impl ConversationStats {
    /// Share of flagged messages in percent; 0 when nothing was seen.
    pub fn flagged_rate(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.flagged as f64 / self.seen as f64 * 100.0
        }
    }
}

impl fmt::Display for ConversationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Seen: {}, flagged: {} ({:.1}%). Mode: {}",
            self.seen,
            self.flagged,
            self.flagged_rate(),
            self.mode
        )
    }
}

// ============ Output ============

/// Display languages with localized output. The first variant is the primary one.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayLang {
    #[default]
    Uk,
    En,
}

impl DisplayLang {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Uk => "uk",
            Self::En => "en",
        }
    }

    /// English name used inside generation prompts.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uk => "Ukrainian",
            Self::En => "English",
        }
    }
}

/// Everything the pipeline produced for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictBundle {
    pub zone: Zone,
    pub reasons: Vec<String>,
    pub detail: DetailRecord,
    pub moderation: ModerationVerdict,
    pub softer_text: String,
    pub reply_text: String,
    pub lang: DisplayLang,
}

impl VerdictBundle {
    pub fn escalated(&self) -> bool {
        self.zone.is_escalated()
    }
}

/// What the chat shell should do with a verdict.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPlan {
    /// Private chat: always answer with the full report.
    ReplyPrivately,
    /// Group chat: reply to the message with the report.
    ReplyInGroup,
    /// Group chat: delete the source message and post a warning.
    DeleteAndWarn,
    /// Say nothing.
    Silent,
}

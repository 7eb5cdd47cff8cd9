// Zone Decision
// Maps the moderation verdict and the classifier's detail record into a
// green/orange/red tier. Thresholds are data, never hard-coded in the rules.

use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::models::{
    Category, CategoryThreshold, DetailRecord, PatternSeverity, PatternTag, Zone, ZoneDecision,
    ZoneThresholds,
};
use crate::services::errors::{GuardError, GuardResult};

/// Categories that lend intensity to a hard pattern.
const HARD_PATTERN_INTENSITY: [Category; 3] =
    [Category::Toxicity, Category::Insult, Category::Harassment];

const REASON_MODERATION: &str = "moderation flagged";
const REASON_CLEAN: &str = "no clear toxicity";

impl ZoneThresholds {
    /// Category thresholds must lie in (0, 1]; the hard-pattern intensity in [0, 1].
    pub fn validate(&self) -> GuardResult<()> {
        let rules = self.critical.iter().chain(&self.high).chain(&self.orange);
        for rule in rules {
            check_rule_threshold(rule.category.as_str(), rule.threshold)?;
        }
        check_unit("hard_pattern_intensity", self.hard_pattern_intensity)
    }

    /// Threshold at which insult/toxicity alone go red (first high-score rule).
    pub fn high_score_threshold(&self) -> Option<f64> {
        self.high.first().map(|r| r.threshold)
    }

    /// Returns a copy with every high-score rule set to `value`.
    pub fn with_high_score_threshold(mut self, value: f64) -> Self {
        for rule in &mut self.high {
            rule.threshold = value;
        }
        self
    }
}

/// Category rule thresholds lie in (0, 1].
pub(crate) fn check_rule_threshold(name: &str, value: f64) -> GuardResult<()> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(GuardError::config(format!(
            "threshold {} must be within (0.0, 1.0], got {}",
            name, value
        )))
    }
}

fn check_unit(name: &str, value: f64) -> GuardResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(GuardError::config(format!(
            "threshold {} must be within 0.0..1.0, got {}",
            name, value
        )))
    }
}

fn threshold_reason(rule: &CategoryThreshold) -> String {
    format!("{}>={}", rule.category.as_str(), rule.threshold)
}

fn pattern_reason(tags: &[PatternTag]) -> String {
    let names: Vec<&str> = tags.iter().map(|t| t.as_str()).collect();
    format!("patterns:{}", names.join(","))
}

fn first_hit<'a>(detail: &DetailRecord, rules: &'a [CategoryThreshold]) -> Option<&'a CategoryThreshold> {
    rules.iter().find(|r| rule_hit(detail, r))
}

/// A rule only fires on a positive score, whatever its threshold.
fn rule_hit(detail: &DetailRecord, rule: &CategoryThreshold) -> bool {
    let score = detail.score(rule.category);
    score > 0.0 && score >= rule.threshold
}

/// Decide the zone for one message. Total and deterministic: the first
/// matching red rule wins; orange collects every contributing reason.
pub fn decide(
    detail: &DetailRecord,
    moderation_flagged: bool,
    thresholds: &ZoneThresholds,
) -> ZoneDecision {
    if moderation_flagged {
        return ZoneDecision {
            zone: Zone::Red,
            reasons: vec![REASON_MODERATION.to_string()],
        };
    }

    if let Some(rule) = first_hit(detail, &thresholds.critical) {
        return ZoneDecision {
            zone: Zone::Red,
            reasons: vec![threshold_reason(rule)],
        };
    }

    if let Some(rule) = first_hit(detail, &thresholds.high) {
        return ZoneDecision {
            zone: Zone::Red,
            reasons: vec![threshold_reason(rule)],
        };
    }

    let hard = detail.patterns_of(PatternSeverity::Hard);
    if !hard.is_empty()
        && HARD_PATTERN_INTENSITY
            .iter()
            .any(|c| {
                let score = detail.score(*c);
                score > 0.0 && score >= thresholds.hard_pattern_intensity
            })
    {
        return ZoneDecision {
            zone: Zone::Red,
            reasons: vec![pattern_reason(&hard)],
        };
    }

    let mut reasons: Vec<String> = thresholds
        .orange
        .iter()
        .filter(|r| rule_hit(detail, r))
        .map(threshold_reason)
        .collect();

    let soft = detail.patterns_of(PatternSeverity::Soft);
    if !soft.is_empty() {
        reasons.push(pattern_reason(&soft));
    }

    if reasons.is_empty() {
        ZoneDecision {
            zone: Zone::Green,
            reasons: vec![REASON_CLEAN.to_string()],
        }
    } else {
        ZoneDecision {
            zone: Zone::Orange,
            reasons,
        }
    }
}

// ============================================================================
// Policy floors
// ============================================================================

/// Post-processing step over the classifier output, run before zoning.
///
/// Floors may only raise severity signals; they receive the original message
/// text so they can match on it.
pub trait PolicyFloor: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, text: &str, detail: DetailRecord) -> DetailRecord;
}

#[derive(Debug, Clone, PartialEq)]
pub enum FloorEffect {
    /// Raise the category score to at least this value.
    MinScore(Category, f64),
    /// Add a pattern tag.
    AddPattern(PatternTag),
}

/// Regex-triggered floor.
pub struct KeywordFloor {
    name: String,
    pattern: Regex,
    effect: FloorEffect,
}

impl KeywordFloor {
    pub fn new(name: &str, pattern: &str, effect: FloorEffect) -> GuardResult<Self> {
        if let FloorEffect::MinScore(category, value) = &effect {
            check_unit(category.as_str(), *value)?;
        }
        let pattern = Regex::new(pattern)
            .map_err(|e| GuardError::config(format!("invalid floor pattern {}: {}", name, e)))?;
        Ok(Self {
            name: name.to_string(),
            pattern,
            effect,
        })
    }
}

impl PolicyFloor for KeywordFloor {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, text: &str, detail: DetailRecord) -> DetailRecord {
        if !self.pattern.is_match(text) {
            return detail;
        }
        match self.effect {
            FloorEffect::MinScore(category, value) if detail.score(category) < value => {
                detail.with_score(category, value)
            }
            FloorEffect::MinScore(..) => detail,
            FloorEffect::AddPattern(tag) => detail.with_pattern(tag),
        }
    }
}

/// Zone decision plus its registered policy floors.
#[derive(Clone, Default)]
pub struct ZoneDecider {
    floors: Vec<Arc<dyn PolicyFloor>>,
}

impl ZoneDecider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_floor(mut self, floor: impl PolicyFloor + 'static) -> Self {
        self.floors.push(Arc::new(floor));
        self
    }

    /// Run every floor in registration order.
    pub fn apply_floors(&self, text: &str, detail: DetailRecord) -> DetailRecord {
        self.floors.iter().fold(detail, |acc, floor| {
            let next = floor.apply(text, acc.clone());
            if next != acc {
                debug!("[ZONING] floor {} adjusted detail record", floor.name());
            }
            next
        })
    }

    /// Apply floors, then decide. Returns the floored record alongside the decision.
    pub fn evaluate(
        &self,
        text: &str,
        detail: DetailRecord,
        moderation_flagged: bool,
        thresholds: &ZoneThresholds,
    ) -> (DetailRecord, ZoneDecision) {
        let detail = self.apply_floors(text, detail);
        let decision = decide(&detail, moderation_flagged, thresholds);
        (detail, decision)
    }
}

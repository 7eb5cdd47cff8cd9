// Moderation Session
// Orchestrates one message through moderation, classification, zoning and
// remediation text, and keeps per-conversation counters and mode.

use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{error, info, warn};

use super::classifier::Classifier;
use super::generation::{Rephraser, ReplyAdvisor};
use super::language::resolve_lang;
use super::moderation::ModeratorAdapter;
use super::zoning::{check_rule_threshold, PolicyFloor, ZoneDecider};
use crate::models::{
    ConversationId, ConversationMode, ConversationStats, DisplayLang, VerdictBundle, Zone,
    ZoneThresholds,
};
use crate::services::capabilities::{Generator, Moderator};
use crate::services::config_store::AppConfig;
use crate::services::errors::{GuardError, GuardResult};

/// Mutable state of one conversation. Lives for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub mode: ConversationMode,
    pub seen: u64,
    pub flagged: u64,
}

impl ConversationState {
    fn stats(&self) -> ConversationStats {
        ConversationStats {
            seen: self.seen,
            flagged: self.flagged,
            mode: self.mode,
        }
    }
}

/// Per-conversation state keyed by conversation id.
///
/// Every mutation runs under the entry guard of its key, so concurrent
/// messages in one conversation cannot lose counter updates. No guard is
/// held across an await.
#[derive(Default)]
pub struct ConversationStore {
    conversations: DashMap<ConversationId, ConversationState>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<R>(&self, id: ConversationId, f: impl FnOnce(&mut ConversationState) -> R) -> R {
        let mut entry = self.conversations.entry(id).or_default();
        f(entry.value_mut())
    }

    /// Snapshot; creates the conversation on first reference.
    pub fn stats(&self, id: ConversationId) -> ConversationStats {
        self.update(id, |s| s.stats())
    }

    pub fn set_mode(&self, id: ConversationId, mode: ConversationMode) -> ConversationStats {
        self.update(id, |s| {
            s.mode = mode;
            s.stats()
        })
    }

    pub fn record_seen(&self, id: ConversationId) -> ConversationStats {
        self.update(id, |s| {
            s.seen += 1;
            s.stats()
        })
    }

    /// Count a computed zone. Must follow `record_seen` for the same message.
    pub fn record_zone(&self, id: ConversationId, zone: Zone) -> ConversationStats {
        self.update(id, |s| {
            if zone.is_escalated() {
                debug_assert!(
                    s.flagged < s.seen,
                    "record_zone without record_seen for conversation {}",
                    id
                );
                if s.flagged < s.seen {
                    s.flagged += 1;
                } else {
                    error!(
                        "[SESSION] conversation={} escalated zone recorded before the message was seen (seen={}, flagged={})",
                        id, s.seen, s.flagged
                    );
                }
            }
            s.stats()
        })
    }
}

impl std::str::FromStr for ConversationMode {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "assistive" => Ok(Self::Assistive),
            "strict" => Ok(Self::Strict),
            other => Err(GuardError::config(format!(
                "unknown mode {:?}, expected assistive | strict",
                other
            ))),
        }
    }
}

pub struct ModerationSession {
    moderator: ModeratorAdapter,
    classifier: Classifier,
    rephraser: Rephraser,
    advisor: ReplyAdvisor,
    decider: ZoneDecider,
    thresholds: RwLock<ZoneThresholds>,
    default_lang: DisplayLang,
    store: ConversationStore,
}

impl ModerationSession {
    pub fn new(moderator: Arc<dyn Moderator>, generator: Arc<dyn Generator>) -> Self {
        Self {
            moderator: ModeratorAdapter::new(moderator),
            classifier: Classifier::new(generator.clone()),
            rephraser: Rephraser::new(generator.clone()),
            advisor: ReplyAdvisor::new(generator),
            decider: ZoneDecider::new(),
            thresholds: RwLock::new(ZoneThresholds::default()),
            default_lang: DisplayLang::default(),
            store: ConversationStore::new(),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        moderator: Arc<dyn Moderator>,
        generator: Arc<dyn Generator>,
    ) -> GuardResult<Self> {
        Ok(Self::new(moderator, generator)
            .with_thresholds(config.zoning.clone())?
            .with_default_lang(config.default_lang))
    }

    pub fn with_thresholds(self, thresholds: ZoneThresholds) -> GuardResult<Self> {
        thresholds.validate()?;
        *self.thresholds.write().unwrap_or_else(PoisonError::into_inner) = thresholds;
        Ok(self)
    }

    pub fn with_default_lang(mut self, lang: DisplayLang) -> Self {
        self.default_lang = lang;
        self
    }

    pub fn with_floor(mut self, floor: impl PolicyFloor + 'static) -> Self {
        self.decider = self.decider.with_floor(floor);
        self
    }

    /// Current zoning table (copy).
    pub fn thresholds(&self) -> ZoneThresholds {
        self.thresholds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run the full pipeline for one message.
    ///
    /// Moderation and classification run concurrently; if either fails the
    /// error is returned and no zone is guessed. `seen` counts only messages
    /// whose signals were obtained.
    pub async fn handle(&self, conversation_id: ConversationId, text: &str) -> GuardResult<VerdictBundle> {
        let started = Instant::now();
        let text = text.trim();

        let (moderation, detail) =
            tokio::try_join!(self.moderator.check(text), self.classifier.classify(text)).map_err(|e| {
                warn!("[SESSION] conversation={} signals unavailable: {}", conversation_id, e);
                e
            })?;

        self.store.record_seen(conversation_id);

        let thresholds = self.thresholds();
        let (detail, decision) = self
            .decider
            .evaluate(text, detail, moderation.flagged, &thresholds);
        let stats = self.store.record_zone(conversation_id, decision.zone);

        let lang = resolve_lang(detail.lang.as_deref(), self.default_lang);
        let escalated = decision.zone.is_escalated();

        let softer = self.rephraser.rephrase(text, lang).await;
        let reply = self.advisor.suggest(text, escalated, lang).await;

        info!(
            "[SESSION] conversation={} zone={} reasons=[{}] lang={} seen={} flagged={} elapsed_ms={}",
            conversation_id,
            decision.zone,
            decision.reasons.join("; "),
            lang.code(),
            stats.seen,
            stats.flagged,
            started.elapsed().as_millis()
        );

        Ok(VerdictBundle {
            zone: decision.zone,
            reasons: decision.reasons,
            detail,
            moderation,
            softer_text: softer.text,
            reply_text: reply.text,
            lang,
        })
    }

    pub fn set_mode(&self, conversation_id: ConversationId, mode: ConversationMode) -> ConversationStats {
        info!("[SESSION] conversation={} mode={}", conversation_id, mode);
        self.store.set_mode(conversation_id, mode)
    }

    /// Parse and set a mode given as text. Unknown modes leave the state unchanged.
    pub fn set_mode_str(&self, conversation_id: ConversationId, mode: &str) -> GuardResult<ConversationStats> {
        let mode = mode.parse::<ConversationMode>()?;
        Ok(self.set_mode(conversation_id, mode))
    }

    pub fn get_stats(&self, conversation_id: ConversationId) -> ConversationStats {
        self.store.stats(conversation_id)
    }

    /// Effective insult/toxicity red threshold.
    pub fn global_threshold(&self) -> f64 {
        self.thresholds().high_score_threshold().unwrap_or(0.75)
    }

    /// Override the insult/toxicity red threshold. Values above 1 are clamped
    /// to 1; NaN, infinities and values <= 0 are rejected and change nothing.
    pub fn set_global_threshold(&self, value: f64) -> GuardResult<f64> {
        if !value.is_finite() {
            return Err(GuardError::config(format!("threshold must be a number, got {}", value)));
        }
        let value = value.min(1.0);
        check_rule_threshold("global", value)?;
        let mut guard = self.thresholds.write().unwrap_or_else(PoisonError::into_inner);
        *guard = guard.clone().with_high_score_threshold(value);
        info!("[SESSION] global threshold set to {}", value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ModerationVerdict};
    use crate::services::capabilities::{Completion, CompletionRequest};
    use crate::services::guard::generation::{REPHRASE_FALLBACK, REPLY_FALLBACK};
    use crate::services::guard::testing::{unflagged, FnGenerator, FnModerator, ScriptedGenerator};
    use crate::services::guard::zoning::{FloorEffect, KeywordFloor};
    use serde_json::{json, Value};

    /// Classifier answers keyed on message text; remediation answers are English.
    fn classify_by_text(text: &str) -> Value {
        let mut detail = json!({
            "lang": "en", "toxicity": 0.0, "insult": 0.0, "harassment": 0.0,
            "hate": 0.0, "sexual_harassment": 0.0, "threat": 0.0,
            "unhealthy_patterns": [], "summary": "A message."
        });
        if text.contains("threat") {
            detail["threat"] = json!(0.35);
        }
        if text.contains("sarcastic") {
            detail["insult"] = json!(0.45);
            detail["unhealthy_patterns"] = json!(["sarcasm"]);
        }
        if text.contains("привіт") {
            detail["lang"] = json!("uk");
        }
        detail
    }

    fn routing_generator() -> Arc<FnGenerator<impl Fn(&CompletionRequest) -> GuardResult<Completion> + Send + Sync>> {
        Arc::new(FnGenerator::new(|req: &CompletionRequest| {
            if req.expect_json {
                let text = req.user.trim_start_matches("Text:\n");
                Ok(Completion::Structured(classify_by_text(text)))
            } else if req.system.contains("Ukrainian") {
                Ok(Completion::Text("Давай поговоримо спокійно.".to_string()))
            } else {
                Ok(Completion::Text("Let's talk calmly.".to_string()))
            }
        }))
    }

    fn session() -> ModerationSession {
        ModerationSession::new(Arc::new(FnModerator::new(|_| unflagged())), routing_generator())
    }

    #[tokio::test]
    async fn test_threat_goes_red() {
        let s = session();
        let bundle = s.handle(1, "this is a threat").await.unwrap();
        assert_eq!(bundle.zone, Zone::Red);
        assert!(bundle.reasons.contains(&"threat>=0.3".to_string()));
        assert_eq!(bundle.lang, DisplayLang::En);
        assert_eq!(bundle.softer_text, "Let's talk calmly.");
        let stats = s.get_stats(1);
        assert_eq!((stats.seen, stats.flagged), (1, 1));
    }

    #[tokio::test]
    async fn test_insult_with_sarcasm_goes_orange() {
        let s = session();
        let bundle = s.handle(1, "a sarcastic remark").await.unwrap();
        assert_eq!(bundle.zone, Zone::Orange);
        assert!(bundle.reasons.contains(&"insult>=0.4".to_string()));
        assert!(bundle.reasons.contains(&"patterns:sarcasm".to_string()));
    }

    #[tokio::test]
    async fn test_clean_message_green_and_not_flagged() {
        let s = session();
        let bundle = s.handle(5, "  good morning  ").await.unwrap();
        assert_eq!(bundle.zone, Zone::Green);
        assert_eq!(bundle.reasons, vec!["no clear toxicity"]);
        assert!(!bundle.escalated());
        let stats = s.get_stats(5);
        assert_eq!((stats.seen, stats.flagged), (1, 0));
    }

    #[tokio::test]
    async fn test_moderation_flag_dominates() {
        let moderator = FnModerator::new(|_| {
            Ok(ModerationVerdict {
                flagged: true,
                ..Default::default()
            })
        });
        let s = ModerationSession::new(Arc::new(moderator), routing_generator());
        let bundle = s.handle(1, "good morning").await.unwrap();
        assert_eq!(bundle.zone, Zone::Red);
        assert_eq!(bundle.reasons, vec!["moderation flagged"]);
        assert!(bundle.moderation.flagged);
    }

    #[tokio::test]
    async fn test_detected_language_drives_generation() {
        let s = session();
        let bundle = s.handle(1, "привіт").await.unwrap();
        assert_eq!(bundle.lang, DisplayLang::Uk);
        assert_eq!(bundle.reply_text, "Давай поговоримо спокійно.");
    }

    #[tokio::test]
    async fn test_unsupported_language_uses_default() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(Completion::Structured(json!({"lang": "de", "insult": 0.0}))),
            Ok(Completion::Text("Sprich ruhig.".to_string())),
            Ok(Completion::Text("Bitte ruhig.".to_string())),
            Ok(Completion::Text("Danke!".to_string())),
            Ok(Completion::Text("Gut.".to_string())),
        ]));
        let s = ModerationSession::new(Arc::new(FnModerator::new(|_| unflagged())), generator.clone());
        let bundle = s.handle(1, "Guten Morgen").await.unwrap();
        // German output has no Cyrillic, so both tasks fall back to Ukrainian canned text
        assert_eq!(bundle.lang, DisplayLang::Uk);
        assert_eq!(bundle.softer_text, REPHRASE_FALLBACK.uk);
        assert_eq!(bundle.reply_text, REPLY_FALLBACK.uk);
        assert_eq!(generator.calls(), 5);

        let s = ModerationSession::new(Arc::new(FnModerator::new(|_| unflagged())), routing_generator())
            .with_default_lang(DisplayLang::En);
        let bundle = s.handle(1, "bonjour").await.unwrap();
        assert_eq!(bundle.lang, DisplayLang::En);
    }

    #[tokio::test]
    async fn test_moderation_failure_surfaces_and_is_not_counted() {
        let moderator = FnModerator::new(|_| Err(GuardError::service("rate limited")));
        let generator = routing_generator();
        let s = ModerationSession::new(Arc::new(moderator), generator.clone());
        let err = s.handle(9, "anything").await.unwrap_err();
        assert_eq!(err, GuardError::Service("rate limited".to_string()));
        assert_eq!(s.get_stats(9).seen, 0);
    }

    #[tokio::test]
    async fn test_malformed_classification_surfaces() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(Completion::Structured(json!({
            "summary": "no scores at all"
        })))]));
        let s = ModerationSession::new(Arc::new(FnModerator::new(|_| unflagged())), generator.clone());
        let err = s.handle(9, "anything").await.unwrap_err();
        assert!(matches!(err, GuardError::MalformedResponse(_)));
        assert_eq!(s.get_stats(9).seen, 0);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_handles_do_not_lose_updates() {
        let s = Arc::new(session());
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..40 {
            let s = s.clone();
            tasks.spawn(async move {
                let text = if i % 4 == 0 { "a threat" } else { "hello" };
                s.handle(42, text).await.map(|b| b.zone)
            });
        }

        let mut non_green = 0;
        while let Some(res) = tasks.join_next().await {
            if res.unwrap().unwrap() != Zone::Green {
                non_green += 1;
            }
        }

        let stats = s.get_stats(42);
        assert_eq!(stats.seen, 40);
        assert_eq!(stats.flagged, non_green);
        assert_eq!(non_green, 10);
    }

    #[tokio::test]
    async fn test_conversations_are_isolated() {
        let s = session();
        s.handle(1, "a threat").await.unwrap();
        s.handle(2, "hello").await.unwrap();
        assert_eq!(s.get_stats(1).flagged, 1);
        assert_eq!(s.get_stats(2).flagged, 0);
        assert_eq!(s.get_stats(1).seen, 1);
        assert_eq!(s.get_stats(3).seen, 0);
    }

    #[tokio::test]
    async fn test_floor_applies_before_zoning() {
        let s = session().with_floor(
            KeywordFloor::new("kill", r"(?i)\bkill\b", FloorEffect::MinScore(Category::Threat, 0.9)).unwrap(),
        );
        let bundle = s.handle(1, "I will kill this bug").await.unwrap();
        assert_eq!(bundle.zone, Zone::Red);
        assert_eq!(bundle.detail.threat, 0.9);
    }

    #[test]
    fn test_mode_defaults_and_updates() {
        let s = session();
        assert_eq!(s.get_stats(7).mode, ConversationMode::Assistive);
        s.set_mode(7, ConversationMode::Strict);
        assert_eq!(s.get_stats(7).mode, ConversationMode::Strict);
        assert_eq!(s.get_stats(8).mode, ConversationMode::Assistive);
    }

    #[test]
    fn test_set_mode_str_rejects_unknown() {
        let s = session();
        s.set_mode_str(7, "Strict").unwrap();
        let err = s.set_mode_str(7, "lenient").unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));
        assert_eq!(s.get_stats(7).mode, ConversationMode::Strict);
    }

    #[tokio::test]
    async fn test_global_threshold_override() {
        let s = session();
        assert_eq!(s.global_threshold(), 0.75);
        assert_eq!(s.set_global_threshold(1.4).unwrap(), 1.0);
        assert_eq!(s.set_global_threshold(0.3).unwrap(), 0.3);
        assert_eq!(s.global_threshold(), 0.3);

        assert!(s.set_global_threshold(f64::NAN).is_err());
        assert_eq!(s.global_threshold(), 0.3);

        // 0.45 insult now crosses the high-score rule
        let bundle = s.handle(1, "a sarcastic remark").await.unwrap();
        assert_eq!(bundle.zone, Zone::Red);
        assert_eq!(bundle.reasons, vec!["insult>=0.3"]);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut t = ZoneThresholds::default();
        t.orange[0].threshold = 2.0;
        assert!(session().with_thresholds(t).is_err());
    }

    #[tokio::test]
    async fn test_zero_global_threshold_rejected() {
        let s = session();
        for bad in [0.0, -0.4] {
            let err = s.set_global_threshold(bad).unwrap_err();
            assert!(matches!(err, GuardError::Configuration(_)));
        }
        assert_eq!(s.global_threshold(), 0.75);

        let bundle = s.handle(1, "good morning").await.unwrap();
        assert_eq!(bundle.zone, Zone::Green);
        assert_eq!(bundle.reasons, vec!["no clear toxicity"]);
    }

    #[test]
    fn test_store_counts_in_order() {
        let store = ConversationStore::new();
        store.record_seen(1);
        store.record_zone(1, Zone::Red);
        store.record_seen(1);
        store.record_zone(1, Zone::Green);
        let stats = store.stats(1);
        assert_eq!((stats.seen, stats.flagged), (2, 1));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "record_zone without record_seen")]
    fn test_store_zone_before_seen_panics_in_debug() {
        let store = ConversationStore::new();
        store.record_zone(1, Zone::Red);
    }
}

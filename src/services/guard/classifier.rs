// Classifier
// Asks the generator for a structured detail record (scores, patterns,
// detected language, summary) for one message

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::models::{Category, DetailRecord, PatternTag};
use crate::services::capabilities::{Completion, CompletionRequest, Generator};
use crate::services::errors::{GuardError, GuardResult};
use crate::services::providers::parse_json_payload;

/// System prompt fixing the JSON shape the classifier accepts.
const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You are a communication classifier. Detect the input language and ALWAYS write the summary in that language.
Return ONLY a JSON object with these keys:
{"lang": "bcp47 code like 'uk' or 'en'",
 "toxicity": float, "insult": float, "harassment": float, "hate": float,
 "sexual_harassment": float, "threat": float,
 "unhealthy_patterns": array drawn from ["sarcasm","dismissive","condescension","humiliation","passive_aggression","manipulation","gaslighting"],
 "summary": "1-2 sentence neutral summary in the input language"}
Scoring rubric (0..1, round to 0.1):
- Direct insult or condescending rhetorical question (e.g. "you are stupid", "you don't understand simple things") -> insult >= 0.6, toxicity >= 0.6.
- Any statement of intent to harm -> threat >= 0.5.
- No unhealthy pattern -> empty array."#;

pub struct Classifier {
    generator: Arc<dyn Generator>,
}

impl Classifier {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Classify one message. Transport failures and payloads that are not a
    /// usable JSON object are returned as errors, never turned into zeros.
    pub async fn classify(&self, text: &str) -> GuardResult<DetailRecord> {
        let started = Instant::now();
        let request = CompletionRequest::structured(CLASSIFIER_SYSTEM_PROMPT, format!("Text:\n{}", text));

        let value = match self.generator.complete(&request).await? {
            Completion::Structured(value) => value,
            Completion::Text(raw) => parse_json_payload(&raw)?,
        };

        let detail = parse_detail_record(&value)?;
        info!(
            "[CLASSIFIER] lang={} toxicity={} insult={} harassment={} threat={} patterns={} elapsed_ms={}",
            detail.lang.as_deref().unwrap_or("-"),
            detail.toxicity,
            detail.insult,
            detail.harassment,
            detail.threat,
            detail.unhealthy_patterns.len(),
            started.elapsed().as_millis()
        );
        Ok(detail)
    }
}

/// Read a score field. Numbers and numeric strings are accepted; anything
/// else counts as missing.
fn score_value(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    raw.is_finite().then(|| raw.clamp(0.0, 1.0))
}

fn parse_patterns(obj: &Map<String, Value>) -> Vec<PatternTag> {
    let Some(items) = obj.get("unhealthy_patterns").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|raw| {
            let tag = PatternTag::parse(raw);
            if tag.is_none() {
                debug!("[CLASSIFIER] dropping unknown pattern tag {:?}", raw);
            }
            tag
        })
        .collect()
}

/// Turn the classifier's JSON into a detail record.
///
/// Individual missing or non-numeric scores default to 0 and are listed in
/// `defaulted_scores`. A payload without a single usable score is rejected.
pub fn parse_detail_record(value: &Value) -> GuardResult<DetailRecord> {
    let obj = value
        .as_object()
        .ok_or_else(|| GuardError::malformed("classifier payload is not a JSON object"))?;

    let mut detail = DetailRecord::default();
    let mut defaulted = Vec::new();
    for category in Category::ALL {
        match obj.get(category.as_str()).and_then(score_value) {
            Some(score) => detail = detail.with_score(category, score),
            None => defaulted.push(category),
        }
    }

    if defaulted.len() == Category::ALL.len() {
        return Err(GuardError::malformed("classifier payload has no usable scores"));
    }
    if !defaulted.is_empty() {
        let names: Vec<&str> = defaulted.iter().map(|c| c.as_str()).collect();
        warn!("[CLASSIFIER] scores missing or non-numeric, treated as 0: {}", names.join(","));
    }
    detail.defaulted_scores = defaulted;

    detail.unhealthy_patterns = parse_patterns(obj).into_iter().collect();
    detail.lang = obj
        .get("lang")
        .and_then(Value::as_str)
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty());
    detail.summary = obj
        .get("summary")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    Ok(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::guard::testing::ScriptedGenerator;
    use serde_json::json;

    #[test]
    fn test_parse_full_record() {
        let value = json!({
            "lang": "UK",
            "toxicity": 0.6, "insult": 0.7, "harassment": 0.1,
            "hate": 0, "sexual_harassment": 0.0, "threat": "0.2",
            "unhealthy_patterns": ["sarcasm", "condescension"],
            "summary": " Образливе звернення. "
        });
        let detail = parse_detail_record(&value).unwrap();
        assert_eq!(detail.lang.as_deref(), Some("uk"));
        assert_eq!(detail.insult, 0.7);
        assert_eq!(detail.threat, 0.2);
        assert!(detail.unhealthy_patterns.contains(&PatternTag::Sarcasm));
        assert!(detail.unhealthy_patterns.contains(&PatternTag::Condescension));
        assert_eq!(detail.summary, "Образливе звернення.");
        assert!(detail.defaulted_scores.is_empty());
    }

    #[test]
    fn test_missing_scores_default_to_zero_and_are_listed() {
        let value = json!({"lang": "en", "insult": 0.5, "threat": "high", "toxicity": null});
        let detail = parse_detail_record(&value).unwrap();
        assert_eq!(detail.insult, 0.5);
        assert_eq!(detail.threat, 0.0);
        assert!(detail.defaulted_scores.contains(&Category::Threat));
        assert!(detail.defaulted_scores.contains(&Category::Toxicity));
        assert!(!detail.defaulted_scores.contains(&Category::Insult));
        assert_eq!(detail.summary, "");
    }

    #[test]
    fn test_out_of_range_scores_clamped() {
        let value = json!({"insult": 3.0, "toxicity": -1.0});
        let detail = parse_detail_record(&value).unwrap();
        assert_eq!(detail.insult, 1.0);
        assert_eq!(detail.toxicity, 0.0);
    }

    #[test]
    fn test_unknown_patterns_dropped() {
        let value = json!({"insult": 0.1, "unhealthy_patterns": ["trolling", "Gaslighting", 7]});
        let detail = parse_detail_record(&value).unwrap();
        assert_eq!(detail.unhealthy_patterns.len(), 1);
        assert!(detail.unhealthy_patterns.contains(&PatternTag::Gaslighting));
    }

    #[test]
    fn test_rejects_unusable_payloads() {
        assert!(matches!(
            parse_detail_record(&json!(["not", "an", "object"])),
            Err(GuardError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_detail_record(&json!({"lang": "en", "summary": "fine"})),
            Err(GuardError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_classify_requests_structured_output() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(Completion::Structured(json!({
            "lang": "en", "toxicity": 0.1, "insult": 0.0, "harassment": 0.0,
            "hate": 0.0, "sexual_harassment": 0.0, "threat": 0.0,
            "unhealthy_patterns": [], "summary": "Greeting."
        })))]));
        let classifier = Classifier::new(generator.clone());
        let detail = classifier.classify("hi").await.unwrap();
        assert_eq!(detail.summary, "Greeting.");

        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].expect_json);
        assert_eq!(requests[0].temperature, 0.0);
        assert!(requests[0].user.ends_with("hi"));
    }

    #[tokio::test]
    async fn test_classify_accepts_text_json() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(Completion::Text(
            "Sure! {\"insult\": 0.4, \"lang\": \"en\"}".to_string(),
        ))]));
        let detail = Classifier::new(generator).classify("x").await.unwrap();
        assert_eq!(detail.insult, 0.4);
    }

    #[tokio::test]
    async fn test_classify_surfaces_failures() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Err(GuardError::service("quota"))]));
        let err = Classifier::new(generator).classify("x").await.unwrap_err();
        assert_eq!(err, GuardError::Service("quota".to_string()));

        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(Completion::Text(
            "I cannot classify that".to_string(),
        ))]));
        let err = Classifier::new(generator).classify("x").await.unwrap_err();
        assert!(matches!(err, GuardError::MalformedResponse(_)));
    }
}

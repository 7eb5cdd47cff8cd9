// Language-Guaranteed Generation
// Rephraser and ReplyAdvisor share one bounded protocol: a first attempt,
// one stricter deterministic retry if the output fails the language check,
// then a canned sentence in the target language.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::language::{looks_like, resolve_lang};
use crate::models::DisplayLang;
use crate::services::capabilities::{CompletionRequest, Generator};

pub const MAX_ATTEMPTS: u8 = 2;

const STRICT_SUFFIX: &str = " STRICT: Use EXACTLY this language. If you cannot, output nothing.";
const RETRY_TEMPERATURE: f64 = 0.0;
const REPHRASE_TEMPERATURE: f64 = 0.1;
const REPLY_ESCALATED_TEMPERATURE: f64 = 0.2;
const REPLY_COOPERATIVE_TEMPERATURE: f64 = 0.15;

/// Canned sentences, one per supported language.
#[derive(Debug, Clone, Copy)]
pub struct Fallbacks {
    pub uk: &'static str,
    pub en: &'static str,
}

impl Fallbacks {
    /// Canned text for `target`; unrecognized or missing targets get the primary language.
    pub fn for_target(&self, target: Option<&str>) -> &'static str {
        match resolve_lang(target, DisplayLang::default()) {
            DisplayLang::Uk => self.uk,
            DisplayLang::En => self.en,
        }
    }
}

pub const REPHRASE_FALLBACK: Fallbacks = Fallbacks {
    uk: "Мені важливо сказати це спокійно й з повагою до тебе.",
    en: "It matters to me to say this calmly and with respect for you.",
};

pub const REPLY_FALLBACK: Fallbacks = Fallbacks {
    uk: "Дякую за повідомлення. Давай обговоримо це спокійно, щоб краще зрозуміти одне одного.",
    en: "Thanks for your message. Let’s discuss this calmly so we can better understand each other.",
};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum GenerationOutcome {
    Accepted { attempt: u8 },
    Fallback,
}

/// Generated text plus how it was obtained. `text` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardedText {
    pub text: String,
    pub outcome: GenerationOutcome,
}

/// Strip whitespace and surrounding quote marks the model likes to add.
pub fn clean_output(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| matches!(c, '"' | '“' | '”' | '«' | '»'))
        .trim()
        .to_string()
}

fn accepts(text: &str, target: Option<&str>) -> bool {
    !text.is_empty() && looks_like(text, target)
}

/// One generator call. A failed call counts as an empty answer.
async fn attempt(generator: &dyn Generator, system: &str, user: &str, temperature: f64, n: u8) -> String {
    let request = CompletionRequest::text(system, user, temperature);
    match generator.complete(&request).await {
        Ok(completion) => clean_output(&completion.into_text()),
        Err(e) => {
            warn!("[GENERATION] attempt {} failed: {}", n, e);
            String::new()
        }
    }
}

/// Run the two-attempt protocol. Never makes more than [`MAX_ATTEMPTS`] calls.
pub async fn generate_in_language(
    generator: &dyn Generator,
    system: &str,
    user: &str,
    temperature: f64,
    target: Option<&str>,
    fallbacks: &Fallbacks,
) -> GuardedText {
    let first = attempt(generator, system, user, temperature, 1).await;
    if accepts(&first, target) {
        return GuardedText {
            text: first,
            outcome: GenerationOutcome::Accepted { attempt: 1 },
        };
    }

    debug!(
        "[GENERATION] attempt 1 rejected for target={}, retrying strictly",
        target.unwrap_or("-")
    );
    let strict_system = format!("{}{}", system, STRICT_SUFFIX);
    let second = attempt(generator, &strict_system, user, RETRY_TEMPERATURE, 2).await;
    if accepts(&second, target) {
        return GuardedText {
            text: second,
            outcome: GenerationOutcome::Accepted { attempt: 2 },
        };
    }

    info!(
        "[GENERATION] both attempts rejected for target={}, using canned text",
        target.unwrap_or("-")
    );
    GuardedText {
        text: fallbacks.for_target(target).to_string(),
        outcome: GenerationOutcome::Fallback,
    }
}

/// Non-toxic rewrite of a message that keeps its intent.
pub struct Rephraser {
    generator: Arc<dyn Generator>,
}

impl Rephraser {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub async fn rephrase(&self, text: &str, lang: DisplayLang) -> GuardedText {
        let ln = lang.name();
        let system = format!(
            "You rewrite messages into respectful, non-violent language. \
             Answer ONLY in {ln}. Do NOT use any other language. \
             Return ONLY the rewritten sentence, WITHOUT quotation marks."
        );
        let user = format!(
            "Rewrite the following message in {ln}, preserving the intent, \
             keeping emojis/punctuation if appropriate:\n\n{text}"
        );
        generate_in_language(
            self.generator.as_ref(),
            &system,
            &user,
            REPHRASE_TEMPERATURE,
            Some(lang.code()),
            &REPHRASE_FALLBACK,
        )
        .await
    }
}

/// Short suggested reply; de-escalating when the message was escalated,
/// cooperative otherwise.
pub struct ReplyAdvisor {
    generator: Arc<dyn Generator>,
}

impl ReplyAdvisor {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub async fn suggest(&self, text: &str, escalated: bool, lang: DisplayLang) -> GuardedText {
        let ln = lang.name();
        let system = format!(
            "You craft concise replies. Answer ONLY in {ln}. Do NOT use any other language. \
             Return ONLY the reply text, WITHOUT quotation marks or extra commentary. \
             Keep it to 1-2 sentences. Match the input's tone/emoticons when appropriate."
        );

        let (user, temperature) = if escalated {
            (
                format!(
                    "Write a brief, respectful reply to the message below. \
                     Goals: de-escalate; use I-statements; set a clear boundary if there is an insult; \
                     offer a constructive next step (clarify, pause, or move to a calmer channel). \
                     Do NOT moralize, do NOT attack back.\n\nMessage:\n{text}\nLanguage hint: {ln}"
                ),
                REPLY_ESCALATED_TEMPERATURE,
            )
        } else {
            (
                format!(
                    "Write a brief, cooperative reply to the message below. \
                     Assume positive intent. Be informative and friendly. \
                     If it is a question, answer directly; if it is a request, acknowledge and confirm the next step. \
                     Avoid defensive phrasing.\n\nMessage:\n{text}\nLanguage hint: {ln}"
                ),
                REPLY_COOPERATIVE_TEMPERATURE,
            )
        };

        generate_in_language(
            self.generator.as_ref(),
            &system,
            &user,
            temperature,
            Some(lang.code()),
            &REPLY_FALLBACK,
        )
        .await
    }
}

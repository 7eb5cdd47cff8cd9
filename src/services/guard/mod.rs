// Moderation Guard
// Core decision pipeline organized into specialized submodules:
// - zoning: green/orange/red decision and policy floors
// - language: script-based language check and display-language resolution
// - classifier: structured detail record from the generator
// - moderation: adapter over the external moderation signal
// - generation: language-guaranteed rephrase and reply suggestions
// - session: per-message orchestration and per-conversation state
// - presentation: localized report and delivery plan

pub mod classifier;
pub mod generation;
pub mod language;
pub mod moderation;
pub mod presentation;
pub mod session;
pub mod zoning;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{parse_detail_record, Classifier};
pub use generation::{
    generate_in_language, GenerationOutcome, GuardedText, Rephraser, ReplyAdvisor,
    REPHRASE_FALLBACK, REPLY_FALLBACK,
};
pub use language::{looks_like, resolve_lang};
pub use moderation::ModeratorAdapter;
pub use presentation::{
    plan_delivery, render_debug_line, render_delete_failed, render_removal_notice, render_report,
};
pub use session::{ConversationState, ConversationStore, ModerationSession};
pub use zoning::{decide, FloorEffect, KeywordFloor, PolicyFloor, ZoneDecider};

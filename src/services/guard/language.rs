// Language Guard
// Cheap script-based check that generated text is in the requested language,
// plus display-language resolution for classifier output

use crate::models::DisplayLang;

fn is_cyrillic(c: char) -> bool {
    ('\u{0400}'..='\u{04FF}').contains(&c)
}

/// Whether `text` plausibly is written in `target`.
///
/// `uk` needs at least one Cyrillic character; `en` needs a Latin letter and no
/// Cyrillic at all. No target, or a target we have no rule for, always passes.
/// This is a heuristic meant to gate one retry, not a language detector.
pub fn looks_like(text: &str, target: Option<&str>) -> bool {
    let Some(target) = target else {
        return true;
    };

    let target = target.trim().to_lowercase();
    let has_cyrillic = text.chars().any(is_cyrillic);
    if target.starts_with("uk") {
        has_cyrillic
    } else if target.starts_with("en") {
        !has_cyrillic && text.chars().any(|c| c.is_ascii_alphabetic())
    } else {
        true
    }
}

/// Map a detected BCP-47-like code onto a supported display language.
/// Missing or unsupported codes fall back to `default`.
pub fn resolve_lang(code: Option<&str>, default: DisplayLang) -> DisplayLang {
    let code = code.unwrap_or("").trim().to_lowercase();
    if code.starts_with("uk") {
        DisplayLang::Uk
    } else if code.starts_with("en") {
        DisplayLang::En
    } else {
        default
    }
}

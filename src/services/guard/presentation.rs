// Presentation
// Localized report text for a verdict and the send/delete decision the chat
// shell applies per chat type and conversation mode

use crate::models::{ConversationMode, DeliveryPlan, DisplayLang, PatternTag, VerdictBundle, Zone};

struct Labels {
    toxic_hdr: &'static str,
    ok_hdr: &'static str,
    brief: &'static str,
    patterns: &'static str,
    softer: &'static str,
    reply: &'static str,
    none: &'static str,
    zone_green: &'static str,
    zone_orange: &'static str,
    zone_red: &'static str,
}

static UK: Labels = Labels {
    toxic_hdr: "⚠️ Є ризик токсичності / нездорових патернів.",
    ok_hdr: "✅ Явної токсичності не виявлено.",
    brief: "• Коротко:",
    patterns: "• Патерни:",
    softer: "• Мʼякіший варіант:",
    reply: "• Як відповісти на це повідомлення:",
    none: "—",
    zone_green: "🟢 Зелена зона",
    zone_orange: "🟠 Помаранчева зона",
    zone_red: "🔴 Червона зона",
};

static EN: Labels = Labels {
    toxic_hdr: "⚠️ Possible toxicity / unhealthy patterns.",
    ok_hdr: "✅ No clear toxicity detected.",
    brief: "• Summary:",
    patterns: "• Patterns:",
    softer: "• Softer alternative:",
    reply: "• How to reply to this message:",
    none: "—",
    zone_green: "🟢 Green zone",
    zone_orange: "🟠 Orange zone",
    zone_red: "🔴 Red zone",
};

fn labels(lang: DisplayLang) -> &'static Labels {
    match lang {
        DisplayLang::Uk => &UK,
        DisplayLang::En => &EN,
    }
}

pub fn pattern_label(tag: PatternTag, lang: DisplayLang) -> &'static str {
    match lang {
        DisplayLang::Uk => match tag {
            PatternTag::Sarcasm => "сарказм",
            PatternTag::Dismissive => "зневажливість",
            PatternTag::Condescension => "поблажливий тон",
            PatternTag::Humiliation => "приниження",
            PatternTag::PassiveAggression => "пасивна агресія",
            PatternTag::Manipulation => "маніпуляція",
            PatternTag::Gaslighting => "газлайтинг",
        },
        DisplayLang::En => match tag {
            PatternTag::PassiveAggression => "passive aggression",
            other => other.as_str(),
        },
    }
}

pub fn zone_header(zone: Zone, lang: DisplayLang) -> &'static str {
    let t = labels(lang);
    match zone {
        Zone::Green => t.zone_green,
        Zone::Orange => t.zone_orange,
        Zone::Red => t.zone_red,
    }
}

fn patterns_text(bundle: &VerdictBundle) -> String {
    if bundle.detail.unhealthy_patterns.is_empty() {
        return labels(bundle.lang).none.to_string();
    }
    bundle
        .detail
        .unhealthy_patterns
        .iter()
        .map(|t| pattern_label(*t, bundle.lang))
        .collect::<Vec<_>>()
        .join(", ")
}

fn summary_text(bundle: &VerdictBundle) -> &str {
    if bundle.detail.summary.is_empty() {
        labels(bundle.lang).none
    } else {
        bundle.detail.summary.as_str()
    }
}

/// Full localized report for one verdict.
pub fn render_report(bundle: &VerdictBundle) -> String {
    let t = labels(bundle.lang);
    let header = if bundle.escalated() { t.toxic_hdr } else { t.ok_hdr };
    let summary = summary_text(bundle);

    format!(
        "{}\n{}\n\n{} {}\n{} {}\n{}\n{}\n{}\n{}",
        zone_header(bundle.zone, bundle.lang),
        header,
        t.brief,
        summary,
        t.patterns,
        patterns_text(bundle),
        t.softer,
        bundle.softer_text,
        t.reply,
        bundle.reply_text
    )
}

/// Post that replaces a red message removed from a strict group.
pub fn render_removal_notice(bundle: &VerdictBundle) -> String {
    let t = labels(bundle.lang);
    format!(
        "{}\n{}\n{} {}\n{} {}\n{}\n{}\n{}\n{}",
        zone_header(bundle.zone, bundle.lang),
        t.toxic_hdr,
        t.brief,
        summary_text(bundle),
        t.patterns,
        patterns_text(bundle),
        t.softer,
        bundle.softer_text,
        t.reply,
        bundle.reply_text
    )
}

/// Shorter reply used when the red message could not be deleted.
pub fn render_delete_failed(bundle: &VerdictBundle) -> String {
    let t = labels(bundle.lang);
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        zone_header(bundle.zone, bundle.lang),
        t.toxic_hdr,
        t.softer,
        bundle.softer_text,
        t.reply,
        bundle.reply_text
    )
}

/// One-line technical summary for operators.
pub fn render_debug_line(bundle: &VerdictBundle) -> String {
    let d = &bundle.detail;
    format!(
        "zone={}, flagged={}, tox={}, insult={}, harassment={}, threat={}",
        bundle.zone,
        bundle.escalated(),
        d.toxicity,
        d.insult,
        d.harassment,
        d.threat
    )
}

/// Private chats always get the report. Groups stay quiet on green; strict
/// groups additionally remove red messages.
pub fn plan_delivery(zone: Zone, mode: ConversationMode, is_group: bool) -> DeliveryPlan {
    if !is_group {
        return DeliveryPlan::ReplyPrivately;
    }
    match (mode, zone) {
        (_, Zone::Green) => DeliveryPlan::Silent,
        (ConversationMode::Strict, Zone::Red) => DeliveryPlan::DeleteAndWarn,
        _ => DeliveryPlan::ReplyInGroup,
    }
}

use std::io::Read;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde::Serialize;
use toxiguard_lib::models::{ConversationMode, ConversationStats, DeliveryPlan, VerdictBundle};
use toxiguard_lib::services::guard::{
    plan_delivery, render_debug_line, render_removal_notice, render_report,
};
use toxiguard_lib::services::{ConfigStore, ModerationSession, ProviderClient};

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

/// First argument that is neither a flag nor a flag's value.
fn positional_text(args: &[String]) -> Option<String> {
    const VALUED: [&str; 4] = ["--conversation", "--mode", "--threshold", "--out"];
    let mut skip_next = false;
    for arg in args.iter().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }
        if VALUED.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        return Some(arg.clone());
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    toxiguard_lib::init_logging();

    let args: Vec<String> = std::env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        eprintln!(
            "Usage:\n  moderate_text [<text>] [--conversation <id>] [--mode assistive|strict] [--group] [--threshold <0..1>] [--out <json_path>]\n\nNotes:\n  - Without <text> the message is read from stdin.\n  - OPENAI_API_KEY (or TOXIGUARD_OPENAI_API_KEY) must be set or stored in the config file."
        );
        return Ok(());
    }

    let text = match positional_text(&args) {
        Some(t) => t,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read stdin failed")?;
            buf
        }
    };
    if text.trim().is_empty() {
        bail!("no text given (pass it as an argument or on stdin)");
    }

    let conversation_id: i64 = match parse_arg_value(&args, "--conversation") {
        Some(v) => v.parse().with_context(|| format!("invalid conversation id {:?}", v))?,
        None => 0,
    };
    let is_group = has_flag(&args, "--group");
    let out_path = parse_arg_value(&args, "--out");

    let config = match ConfigStore::default_config_dir() {
        Some(dir) => ConfigStore::new(dir).load()?,
        None => Default::default(),
    };

    let client = Arc::new(ProviderClient::from_config(&config)?);
    if !client.has_api_key() {
        bail!("API key not configured (set OPENAI_API_KEY)");
    }
    let session = ModerationSession::from_config(&config, client.clone(), client)?;

    if let Some(mode) = parse_arg_value(&args, "--mode") {
        session.set_mode_str(conversation_id, &mode)?;
    }
    if let Some(th) = parse_arg_value(&args, "--threshold") {
        let value: f64 = th.parse().with_context(|| format!("invalid threshold {:?}", th))?;
        session.set_global_threshold(value)?;
    }

    let bundle = session.handle(conversation_id, &text).await?;
    let stats = session.get_stats(conversation_id);
    let plan = plan_delivery(bundle.zone, stats.mode, is_group);

    match plan {
        DeliveryPlan::Silent => println!("(silent: nothing would be posted)"),
        DeliveryPlan::DeleteAndWarn => println!("{}", render_removal_notice(&bundle)),
        DeliveryPlan::ReplyPrivately | DeliveryPlan::ReplyInGroup => {
            println!("{}", render_report(&bundle))
        }
    }
    println!();
    println!("Reasons: {}", bundle.reasons.join("; "));
    println!("Debug: {}", render_debug_line(&bundle));
    println!("Delivery: {:?}", plan);
    println!("{}", stats);

    if let Some(out_path) = out_path {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Output<'a> {
            conversation_id: i64,
            group: bool,
            mode: ConversationMode,
            global_threshold: f64,
            delivery: DeliveryPlan,
            verdict: &'a VerdictBundle,
            stats: ConversationStats,
        }

        let out = Output {
            conversation_id,
            group: is_group,
            mode: stats.mode,
            global_threshold: session.global_threshold(),
            delivery: plan,
            verdict: &bundle,
            stats,
        };

        let json = serde_json::to_string_pretty(&out)?;
        std::fs::write(&out_path, json).with_context(|| format!("write {} failed", out_path))?;
        println!();
        println!("Wrote JSON: {}", out_path);
    }

    Ok(())
}

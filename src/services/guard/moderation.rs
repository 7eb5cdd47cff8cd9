// Moderator Adapter
// Wraps the external moderation capability; failures propagate unchanged

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::models::ModerationVerdict;
use crate::services::capabilities::Moderator;
use crate::services::errors::GuardResult;

pub struct ModeratorAdapter {
    moderator: Arc<dyn Moderator>,
}

impl ModeratorAdapter {
    pub fn new(moderator: Arc<dyn Moderator>) -> Self {
        Self { moderator }
    }

    pub async fn check(&self, text: &str) -> GuardResult<ModerationVerdict> {
        let started = Instant::now();
        let verdict = self.moderator.moderate(text).await?;
        info!(
            "[MODERATION] flagged={} categories=[{}] elapsed_ms={}",
            verdict.flagged,
            verdict.flagged_categories().join(","),
            started.elapsed().as_millis()
        );
        Ok(verdict)
    }
}

//! Due-schedule scanning
//!
//! One scan pass loads every schedule whose publish instant has arrived and
//! runs it to completion. Finalization is unconditional: once a due schedule
//! has been attempted, the content item is marked published and the schedule
//! deleted, whatever the individual variant outcomes were. A schedule fires
//! exactly once; failed variants stay queued and can be re-published by hand.

use chrono::{DateTime, Utc};

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::types::ContentStatus;

/// Outcome of a single scan pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanReport {
    /// Schedules taken through to finalization.
    pub processed: usize,
    /// Variant publish failures and orphaned schedules encountered.
    pub errors: usize,
}

pub struct Scanner {
    dispatcher: Dispatcher,
}

impl Scanner {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Run one scan pass against `now`.
    ///
    /// Errors out only when the due set cannot be loaded at all. Everything
    /// past that point is isolated per schedule and per variant.
    pub async fn process_due_schedules(&self, now: DateTime<Utc>) -> Result<ScanReport> {
        let db = self.dispatcher.db();
        let due = db.due_schedules(now.timestamp()).await?;
        let mut report = ScanReport::default();

        for schedule in due {
            let content_id = &schedule.content_id;

            if db.get_content(content_id).await?.is_none() {
                tracing::error!(content_id, "Schedule references missing content, dropping it");
                db.delete_schedule(content_id).await?;
                report.errors += 1;
                continue;
            }

            match self.dispatcher.publish_content(content_id).await {
                Ok(results) => {
                    report.errors += results.iter().filter(|r| r.outcome.is_err()).count();
                }
                Err(err) => {
                    tracing::error!(content_id, "Batch publish failed: {}", err);
                    report.errors += 1;
                }
            }

            // The schedule fires once, regardless of variant outcomes
            db.set_content_status(content_id, ContentStatus::Published)
                .await?;
            db.delete_schedule(content_id).await?;
            report.processed += 1;

            tracing::info!(content_id, "Finalized schedule");
        }

        Ok(report)
    }
}

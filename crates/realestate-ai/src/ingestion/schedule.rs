use std::future::Future;
use std::str::FromStr;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::pipeline::IngestionSummary;
use super::IngestionError;

/// Accepts classic five-field crontab lines by pinning seconds to zero.
pub fn normalise_cron(expression: &str) -> Result<String, IngestionError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(IngestionError::MissingCron);
    }
    if trimmed.split_whitespace().count() == 5 {
        Ok(format!("0 {trimmed}"))
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn parse_schedule(expression: &str) -> Result<Schedule, IngestionError> {
    let normalised = normalise_cron(expression)?;
    Schedule::from_str(&normalised).map_err(|source| IngestionError::InvalidCron {
        expression: expression.trim().to_string(),
        source,
    })
}

/// Spawns a loop that runs `task` at every fire time of `expression`.
/// Failed runs are logged and the schedule keeps going.
pub fn schedule_ingestion<F, Fut>(
    expression: &str,
    task: F,
) -> Result<JoinHandle<()>, IngestionError>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<IngestionSummary, IngestionError>> + Send + 'static,
{
    let schedule = parse_schedule(expression)?;
    info!(status = "scheduled", expression = expression.trim(), "ingestion.cron");

    Ok(tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("ingestion.cron schedule has no upcoming fire times");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            match task().await {
                Ok(summary) => info!(
                    status = "completed",
                    at = %Utc::now().to_rfc3339(),
                    inserted = summary.inserted,
                    updated = summary.updated,
                    "ingestion.cron"
                ),
                Err(err) => error!(error = %err, "ingestion.cron.error"),
            }
        }
    }))
}

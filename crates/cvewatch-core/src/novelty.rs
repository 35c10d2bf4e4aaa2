//! Decides which fetched records still need to be delivered.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::{
    domain::AlertKind,
    errors::CycleError,
    feed::{FeedRecord, FeedSource, FetchOutcome, QueryWindow},
};

/// Records to deliver, in delivery order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Detection {
    pub kind: AlertKind,
    pub items: Vec<FeedRecord>,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Primary path: everything in feed order up to (not including) the
/// watermark. Without a watermark the whole batch is new.
///
/// The batch is not re-sorted; upstream order is the delivery order.
pub fn select_new(batch: Vec<FeedRecord>, watermark: Option<&str>) -> Vec<FeedRecord> {
    batch
        .into_iter()
        .take_while(|r| Some(r.id.as_str()) != watermark)
        .collect()
}

/// Fallback path: the single most recently published record, unless it is
/// the watermark itself. Records without a publication date sort last.
pub fn select_most_recent(batch: Vec<FeedRecord>, watermark: Option<&str>) -> Option<FeedRecord> {
    let mut batch = batch;
    batch.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    let newest = batch.into_iter().next()?;
    if Some(newest.id.as_str()) == watermark {
        return None;
    }
    Some(newest)
}

/// Run the primary query and, if it comes back empty, the one-day fallback.
///
/// `clock` is read when each window is built, so the fallback window ends at
/// the time it is queried, not when the primary query started.
pub async fn detect(
    source: &dyn FeedSource,
    watermark: Option<&str>,
    clock: impl Fn() -> DateTime<Utc>,
) -> Result<Detection, CycleError> {
    let primary = QueryWindow::primary(clock());
    let batch = into_batch(source.fetch(primary).await, primary)?;

    if !batch.is_empty() {
        let items = select_new(batch, watermark);
        if items.is_empty() {
            info!("no new CVEs at this time");
        }
        return Ok(Detection {
            kind: AlertKind::New,
            items,
        });
    }

    info!("no new CVEs in the last time window, checking the last day");
    let fallback = QueryWindow::fallback(clock());
    let batch = into_batch(source.fetch(fallback).await, fallback)?;
    if batch.is_empty() {
        info!("no CVEs published in the last day");
    }

    let items: Vec<FeedRecord> = select_most_recent(batch, watermark).into_iter().collect();
    Ok(Detection {
        kind: AlertKind::MostRecent,
        items,
    })
}

fn into_batch(outcome: FetchOutcome, window: QueryWindow) -> Result<Vec<FeedRecord>, CycleError> {
    match outcome {
        FetchOutcome::Success(batch) => Ok(batch),
        FetchOutcome::RateLimited { attempts } => Err(CycleError::FetchTransient {
            window,
            attempts,
            rate_limited: true,
        }),
        FetchOutcome::Transient { attempts } => Err(CycleError::FetchTransient {
            window,
            attempts,
            rate_limited: false,
        }),
        FetchOutcome::Fatal { reason } => Err(CycleError::FetchFatal { window, reason }),
    }
}

use crate::broker::BrokerError;
use crate::tasks::{PROCESS_NEWS_ITEM, TaskError, WorkerContext, get_conn};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use feedfusion_db::db;
use feedfusion_db::models::DbChannel;
use feedwire::{FeedFetchError, RawEntry};
use log::{info, warn};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One normalized feed entry, ready for the ingest writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedNews {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source: String,
    pub image: Option<String>,
    pub published: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessNewsPayload {
    pub channel_id: i32,
    pub items: Vec<ParsedNews>,
}

#[derive(Debug, Error, Diagnostic)]
enum PollError {
    #[error(transparent)]
    Fetch(#[from] FeedFetchError),

    #[error(transparent)]
    Enqueue(#[from] BrokerError),
}

/// The periodic poll over every registered channel. One bad feed only costs
/// that feed; the rest of the walk continues.
pub async fn parse_rss(ctx: &WorkerContext) -> Result<(), TaskError> {
    let channels = {
        let mut conn = get_conn(ctx)?;
        db::channels::all(&mut conn).map_err(TaskError::fatal)?
    };

    info!("Polling {} channels", channels.len());

    for channel in channels {
        match poll_channel(ctx, &channel).await {
            Ok(0) => {}
            Ok(accepted) => info!(
                "Accepted {accepted} entries from channel {} ({})",
                channel.id, channel.link
            ),
            Err(err) => warn!(
                "Failed to poll channel {} ({}): {err}",
                channel.id, channel.link
            ),
        }
    }

    Ok(())
}

async fn poll_channel(ctx: &WorkerContext, channel: &DbChannel) -> Result<usize, PollError> {
    let feed = ctx.feed_client.fetch(&channel.link).await?;

    let source = if feed.title.is_empty() {
        channel.title.as_str()
    } else {
        feed.title.as_str()
    };

    let now = Utc::now();
    let max_age = Duration::hours(ctx.config.preferred_hours_period);

    let items: Vec<ParsedNews> = feed
        .entries
        .iter()
        .take(ctx.config.parser_max_entries_per_feed)
        .filter_map(|entry| normalize_entry(entry, source, now, max_age, &ctx.config.empty_text))
        .collect();

    if items.is_empty() {
        return Ok(0);
    }

    let accepted = items.len();
    let payload = serde_json::to_value(ProcessNewsPayload {
        channel_id: channel.id,
        items,
    })
    .expect("payload serialization cannot fail");

    ctx.broker.enqueue(PROCESS_NEWS_ITEM, payload).await?;

    Ok(accepted)
}

/// Normalization rules, in order: an entry with no parseable date is
/// skipped; an entry older than `max_age` is skipped; empty link and title
/// fall back to the placeholder; the summary is stored as stripped plain
/// text, placeholder when nothing is left.
fn normalize_entry(
    entry: &RawEntry,
    source: &str,
    now: DateTime<Utc>,
    max_age: Duration,
    placeholder: &str,
) -> Option<ParsedNews> {
    let published = entry
        .published
        .as_deref()
        .and_then(feedwire::parse_published)?;

    if now.signed_duration_since(published) > max_age {
        return None;
    }

    let title = match entry.title.as_deref().map(str::trim) {
        Some("") | None => placeholder.to_string(),
        Some(title) => title.to_string(),
    };
    let link = match entry.link.as_deref().map(str::trim) {
        Some("") | None => placeholder.to_string(),
        Some(link) => link.to_string(),
    };

    let summary = entry
        .summary
        .as_deref()
        .map(feedwire::strip_html)
        .unwrap_or_default();
    let summary = if summary.is_empty() {
        placeholder.to_string()
    } else {
        summary
    };

    Some(ParsedNews {
        title,
        link,
        summary,
        source: source.to_string(),
        image: entry.image.clone(),
        published: published.naive_utc(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(published: Option<&str>) -> RawEntry {
        RawEntry {
            title: Some("Title".to_string()),
            link: Some("https://example.com/a".to_string()),
            summary: Some("<p>Summary</p>".to_string()),
            published: published.map(str::to_string),
            image: None,
        }
    }

    fn now() -> DateTime<Utc> {
        "2026-03-02T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn fresh_entry_is_accepted_and_stripped() {
        let normalized = normalize_entry(
            &entry(Some("Mon, 02 Mar 2026 10:00:00 GMT")),
            "Example Wire",
            now(),
            Duration::hours(24),
            "N/A",
        )
        .unwrap();

        assert_eq!(normalized.title, "Title");
        assert_eq!(normalized.summary, "Summary");
        assert_eq!(normalized.source, "Example Wire");
        assert_eq!(normalized.published.to_string(), "2026-03-02 10:00:00");
    }

    #[test]
    fn entry_older_than_window_is_dropped() {
        // 48h old against a 24h window
        let normalized = normalize_entry(
            &entry(Some("Sat, 28 Feb 2026 12:00:00 GMT")),
            "Example Wire",
            now(),
            Duration::hours(24),
            "N/A",
        );
        assert!(normalized.is_none());
    }

    #[test]
    fn entry_without_parseable_date_is_dropped() {
        assert!(
            normalize_entry(
                &entry(None),
                "Example Wire",
                now(),
                Duration::hours(24),
                "N/A"
            )
            .is_none()
        );
        assert!(
            normalize_entry(
                &entry(Some("sometime last week")),
                "Example Wire",
                now(),
                Duration::hours(24),
                "N/A"
            )
            .is_none()
        );
    }

    #[test]
    fn empty_fields_fall_back_to_placeholder() {
        let raw = RawEntry {
            title: Some("   ".to_string()),
            link: None,
            summary: Some("<br/>".to_string()),
            published: Some("Mon, 02 Mar 2026 10:00:00 GMT".to_string()),
            image: Some("https://example.com/a.jpg".to_string()),
        };

        let normalized =
            normalize_entry(&raw, "Example Wire", now(), Duration::hours(24), "N/A").unwrap();
        assert_eq!(normalized.title, "N/A");
        assert_eq!(normalized.link, "N/A");
        assert_eq!(normalized.summary, "N/A");
        assert_eq!(normalized.image.as_deref(), Some("https://example.com/a.jpg"));
    }
}

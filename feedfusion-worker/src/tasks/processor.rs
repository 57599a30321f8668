use crate::broker::TaskEnvelope;
use crate::search::NewsDoc;
use crate::tasks::parser::{ParsedNews, ProcessNewsPayload};
use crate::tasks::{TaskError, WorkerContext, backoff_delay, get_conn};
use diesel::Connection;
use feedfusion_db::models::{DbNews, NewNews};
use feedfusion_db::{StoreResult, db};
use itertools::Itertools;
use log::{info, warn};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// The dedup key: SHA-256 of the entry link, hex encoded.
pub fn content_hash(link: &str) -> String {
    hex::encode(Sha256::digest(link.as_bytes()))
}

/// Consumes one channel's batch: fingerprint, filter against the store,
/// bulk-upsert with conflict-ignore, then optionally index. A database
/// error rolls the whole batch back and retries it with backoff; index
/// errors never fail the task.
pub async fn process_news(ctx: &WorkerContext, envelope: &TaskEnvelope) -> Result<(), TaskError> {
    let payload: ProcessNewsPayload =
        serde_json::from_value(envelope.payload.clone()).map_err(|err| {
            TaskError::Fatal(miette::miette!("undecodable process_news payload: {err}"))
        })?;

    if payload.items.is_empty() {
        return Ok(());
    }

    info!("Started saving news into DB...");

    // Duplicate links inside one batch collapse to one row up front.
    let hashed: Vec<(ParsedNews, String)> = payload
        .items
        .into_iter()
        .map(|item| {
            let hash = content_hash(&item.link);
            (item, hash)
        })
        .unique_by(|(_, hash)| hash.clone())
        .collect();

    let channel_id = payload.channel_id;
    let mut conn = get_conn(ctx)?;

    let inserted = conn.transaction(|conn| -> StoreResult<Vec<DbNews>> {
        let all_hashes: Vec<String> = hashed.iter().map(|(_, hash)| hash.clone()).collect();
        let existing: HashSet<String> =
            db::news::existing_hashes(conn, &all_hashes)?.into_iter().collect();

        let fresh: Vec<&(ParsedNews, String)> = hashed
            .iter()
            .filter(|(_, hash)| !existing.contains(hash))
            .collect();

        info!(
            "Filtered news: {} new, {} duplicates",
            fresh.len(),
            existing.len()
        );

        if fresh.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<NewNews> = fresh
            .iter()
            .map(|(item, hash)| NewNews {
                channel_id,
                link: &item.link,
                title: &item.title,
                summary: &item.summary,
                source: &item.source,
                image: item.image.as_deref(),
                published: item.published,
                content_hash: hash,
            })
            .collect();

        db::news::insert_bulk_ignore_conflicts(conn, &rows)
    });

    let inserted = match inserted {
        Ok(rows) => rows,
        Err(err) => {
            let delay = backoff_delay(envelope.retries);
            info!(
                "Error during processing news item, retrying from {} sec...",
                delay.as_secs()
            );
            return Err(TaskError::retry(delay, err));
        }
    };

    info!("Saved into DB: {} items", inserted.len());

    if let Some(search) = &ctx.search {
        if !inserted.is_empty() {
            info!("Started indexing news in search index...");
            let docs: Vec<NewsDoc> = inserted.iter().map(NewsDoc::from).collect();
            match search.bulk_add(&docs).await {
                Ok(item_errors) => {
                    for error in item_errors {
                        warn!("Search index rejected a document: {error}");
                    }
                }
                Err(err) => warn!("Search indexing failed, continuing: {err}"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_hex_sha256() {
        let first = content_hash("https://x/a");
        let again = content_hash("https://x/a");
        let other = content_hash("https://x/b");

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn duplicate_links_in_one_batch_collapse() {
        let item = |link: &str| ParsedNews {
            title: "t".to_string(),
            link: link.to_string(),
            summary: "s".to_string(),
            source: "src".to_string(),
            image: None,
            published: chrono::NaiveDateTime::default(),
        };

        let hashed: Vec<(ParsedNews, String)> = vec![
            item("https://x/a"),
            item("https://x/a"),
            item("https://x/b"),
        ]
        .into_iter()
        .map(|item| {
            let hash = content_hash(&item.link);
            (item, hash)
        })
        .unique_by(|(_, hash)| hash.clone())
        .collect();

        assert_eq!(hashed.len(), 2);
    }

    #[test]
    fn existing_hashes_filter_out_known_entries() {
        let existing: HashSet<String> = [content_hash("https://x/a")].into_iter().collect();
        let batch = [
            ("https://x/a", content_hash("https://x/a")),
            ("https://x/b", content_hash("https://x/b")),
        ];

        let fresh: Vec<_> = batch
            .iter()
            .filter(|(_, hash)| !existing.contains(hash))
            .collect();

        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].0, "https://x/b");
    }
}

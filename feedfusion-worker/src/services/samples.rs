use crate::broker::TaskBroker;
use crate::services::ServiceError;
use crate::tasks::UPLOAD_TRAINING_DATASET;
use diesel::{Connection, PgConnection};
use feedfusion_db::models::{DbSample, DbUpload, NewSample, NewsCategory};
use feedfusion_db::{ConnectionPool, StoreError, db, id_from_i64};
use log::{info, warn};
use std::collections::HashSet;

pub const REQUIRED_DATASET_HEADERS: [&str; 3] = ["title", "summary", "category"];

/// The headers the upload must carry, checked synchronously before any row
/// is touched. Returns the missing ones, sorted for stable messages.
pub fn missing_headers(csv_text: &str) -> Result<Vec<String>, ServiceError> {
    let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
    let headers = reader.headers().map_err(|_| ServiceError::CsvDecode)?.clone();

    let actual: HashSet<&str> = headers.iter().map(str::trim).collect();
    let mut missing: Vec<String> = REQUIRED_DATASET_HEADERS
        .iter()
        .filter(|header| !actual.contains(**header))
        .map(|header| header.to_string())
        .collect();
    missing.sort();

    Ok(missing)
}

/// Synchronous half of a dataset upload: validate the envelope (encoding
/// and headers), create the status row, and hand the body to the
/// background importer. Header problems surface before any row exists.
pub async fn upload_samples(
    pool: &ConnectionPool,
    broker: &TaskBroker,
    content: &[u8],
) -> Result<DbUpload, ServiceError> {
    let text = std::str::from_utf8(content).map_err(|_| ServiceError::CsvDecode)?;

    let missing = missing_headers(text)?;
    if !missing.is_empty() {
        return Err(ServiceError::MissingCsvHeaders(missing));
    }

    let mut conn = pool.get()?;
    let upload = db::uploads::create(&mut conn)?;
    info!("Created dataset upload id={}", upload.id);

    let payload = serde_json::json!({
        "upload_id": upload.id,
        "csv_text": text,
    });
    if let Err(err) = broker.enqueue(UPLOAD_TRAINING_DATASET, payload).await {
        // The row is already committed; close it out so it doesn't read as
        // forever pending, then surface the broker failure.
        warn!("Failed to enqueue dataset import for upload id={}", upload.id);
        let compensation = db::uploads::update(
            &mut conn,
            upload.id,
            &db::uploads::UploadPatch {
                uploads: None,
                errors: None,
                is_completed: Some(true),
                details: Some(serde_json::json!(["task enqueue failed"])),
            },
        );
        if let Err(update_err) = compensation {
            warn!(
                "Failed to mark upload id={} as failed: {update_err}",
                upload.id
            );
        }
        return Err(ServiceError::Broker(err));
    }

    Ok(upload)
}

pub fn get_upload(conn: &mut PgConnection, upload_id: i64) -> Result<DbUpload, ServiceError> {
    let id = id_from_i64(upload_id)?;
    db::uploads::get_optional(conn, id)?.ok_or(ServiceError::UploadNotFound)
}

pub fn get_uploads(conn: &mut PgConnection) -> Result<Vec<DbUpload>, ServiceError> {
    Ok(db::uploads::all(conn)?)
}

/// Admin correction of a news category. Updates the row and records the
/// corrected pair as a fresh training sample, in one unit of work.
pub fn correct_category(
    conn: &mut PgConnection,
    news_id: i64,
    category: NewsCategory,
) -> Result<DbSample, ServiceError> {
    let id = id_from_i64(news_id)?;

    let news = match db::news::get(conn, id) {
        Err(StoreError::NotFound) => return Err(ServiceError::NewsNotFound),
        other => other?,
    };

    let category = category.to_string();
    if news.category.as_deref() == Some(category.as_str()) {
        return Err(ServiceError::CategoryAlreadyAssigned);
    }

    conn.transaction(|conn| {
        db::news::set_category(conn, id, &category, false)?;

        let summary = match news.summary.as_str() {
            "" => None,
            summary => Some(summary),
        };
        match db::samples::insert(
            conn,
            &NewSample {
                title: &news.title,
                summary,
                category: &category,
            },
        ) {
            Err(StoreError::ObjectExists) => Err(ServiceError::SampleExists),
            other => other.map_err(ServiceError::from),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_missing_headers() {
        let missing = missing_headers("title,summary\nA,B\n").unwrap();
        assert_eq!(missing, vec!["category".to_string()]);

        let missing = missing_headers("link\nx\n").unwrap();
        assert_eq!(
            missing,
            vec![
                "category".to_string(),
                "summary".to_string(),
                "title".to_string()
            ]
        );
    }

    #[test]
    fn accepts_complete_headers_in_any_order() {
        let missing = missing_headers("category, summary ,title\nsport,,A\n").unwrap();
        assert!(missing.is_empty());
    }
}

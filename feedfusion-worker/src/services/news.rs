use crate::cursor::{Cursor, decode_cursor, encode_cursor};
use crate::search::{SearchIndex, SearchRequest};
use crate::services::ServiceError;
use feedfusion_db::models::NewsCategory;
use feedfusion_db::{ConnectionPool, db, id_from_i64};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct NewsListParams {
    pub limit: i64,
    pub query: Option<String>,
    pub categories: Option<Vec<NewsCategory>>,
    pub channel_ids: Option<Vec<i64>>,
    pub search_after: Option<String>,
    pub recent_first: bool,
}

#[derive(Debug)]
pub struct NewsPage {
    pub total: i64,
    pub items: Vec<serde_json::Value>,
    pub next_cursor: Option<String>,
    pub offset: i64,
}

/// Paginated listing through the search index when one is wired in, the
/// store's substring search otherwise. The cursor is opaque to callers;
/// an unreadable one silently restarts from the first page.
pub async fn search_news(
    pool: &ConnectionPool,
    search: Option<&Arc<dyn SearchIndex>>,
    params: NewsListParams,
) -> Result<NewsPage, ServiceError> {
    let channel_ids: Option<Vec<i32>> = params
        .channel_ids
        .map(|ids| ids.into_iter().map(id_from_i64).collect())
        .transpose()?;

    if let Some(ids) = &channel_ids {
        let mut conn = pool.get()?;
        for id in ids {
            if db::channels::get_optional(&mut conn, *id)?.is_none() {
                return Err(ServiceError::ChannelNotFound);
            }
        }
    }

    let cursor = decode_cursor(params.search_after.as_deref());
    let categories: Option<Vec<String>> = params
        .categories
        .map(|categories| categories.iter().map(ToString::to_string).collect());

    let (total, items, last_sort) = match search {
        Some(index) => {
            let response = index
                .search(&SearchRequest {
                    query: params.query.clone(),
                    categories,
                    channel_ids,
                    limit: params.limit,
                    search_after: cursor.sort.clone(),
                    recent_first: params.recent_first,
                })
                .await?;
            (response.total, response.docs, response.last_sort)
        }
        None => {
            let mut conn = pool.get()?;
            let (total, rows) = db::news::search_page(
                &mut conn,
                &db::news::NewsSearch {
                    query: params.query.as_deref(),
                    categories: categories.as_deref(),
                    channel_ids: channel_ids.as_deref(),
                    limit: params.limit,
                    offset: cursor.offset,
                    recent_first: params.recent_first,
                },
            )?;
            let items = rows
                .iter()
                .map(|row| serde_json::to_value(row).expect("news serialization cannot fail"))
                .collect();
            (total, items, None)
        }
    };

    let next_cursor = if items.len() as i64 == params.limit && params.limit > 0 {
        Some(encode_cursor(&Cursor {
            sort: last_sort,
            offset: cursor.offset + items.len() as i64,
        }))
    } else {
        None
    };

    Ok(NewsPage {
        total,
        items,
        next_cursor,
        offset: cursor.offset,
    })
}

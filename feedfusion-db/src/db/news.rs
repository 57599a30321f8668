use crate::error::{StoreError, StoreResult};
use crate::models::{DbNews, NewNews};
use diesel::prelude::*;

pub fn get(conn: &mut PgConnection, id: i32) -> StoreResult<DbNews> {
    use crate::news::dsl;

    dsl::news
        .find(id)
        .select(DbNews::as_select())
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn get_optional(conn: &mut PgConnection, id: i32) -> StoreResult<Option<DbNews>> {
    use crate::news::dsl;

    dsl::news
        .find(id)
        .select(DbNews::as_select())
        .get_result(conn)
        .optional()
        .map_err(StoreError::from)
}

/// Returns the subset of `hashes` that already has a row in the store.
pub fn existing_hashes(conn: &mut PgConnection, hashes: &[String]) -> StoreResult<Vec<String>> {
    use crate::news::dsl;

    dsl::news
        .filter(dsl::content_hash.eq_any(hashes))
        .select(dsl::content_hash)
        .get_results(conn)
        .map_err(StoreError::from)
}

/// Bulk insert with conflict-ignore on `content_hash`. Only the rows that
/// were actually inserted come back; rows whose hash lost the race to a
/// concurrent writer are absent from the result.
pub fn insert_bulk_ignore_conflicts(
    conn: &mut PgConnection,
    rows: &[NewNews],
) -> StoreResult<Vec<DbNews>> {
    use crate::news::dsl;

    diesel::insert_into(dsl::news)
        .values(rows)
        .on_conflict(dsl::content_hash)
        .do_nothing()
        .get_results(conn)
        .map_err(StoreError::from)
}

/// Read surface ordering: newest published first.
pub fn recent(
    conn: &mut PgConnection,
    channel_id: i32,
    gt: Option<i32>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> StoreResult<Vec<DbNews>> {
    use crate::news::dsl;

    let mut query = dsl::news
        .filter(dsl::channel_id.eq(channel_id))
        .into_boxed();

    if let Some(gt) = gt {
        query = query.filter(dsl::id.gt(gt));
    }
    query = query.order_by(dsl::published.desc());
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    if let Some(offset) = offset {
        query = query.offset(offset);
    }

    query
        .select(DbNews::as_select())
        .get_results(conn)
        .map_err(StoreError::from)
}

/// Watermark walk ordering: ascending ids, so the caller can advance its
/// `last_news_id` monotonically.
pub fn after_id(conn: &mut PgConnection, channel_id: i32, gt_id: i32) -> StoreResult<Vec<DbNews>> {
    use crate::news::dsl;

    dsl::news
        .filter(dsl::channel_id.eq(channel_id))
        .filter(dsl::id.gt(gt_id))
        .order_by(dsl::id.asc())
        .select(DbNews::as_select())
        .get_results(conn)
        .map_err(StoreError::from)
}

/// The channel's highest news id, if it has any rows. This is the value
/// watermarks are seeded from; watermark arithmetic is id-based throughout,
/// never published-time-based.
pub fn max_id(conn: &mut PgConnection, channel_id: i32) -> StoreResult<Option<i32>> {
    use crate::news::dsl;

    dsl::news
        .filter(dsl::channel_id.eq(channel_id))
        .select(diesel::dsl::max(dsl::id))
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn uncategorized(conn: &mut PgConnection) -> StoreResult<Vec<DbNews>> {
    use crate::news::dsl;

    dsl::news
        .filter(dsl::category.is_null())
        .order_by(dsl::id.asc())
        .select(DbNews::as_select())
        .get_results(conn)
        .map_err(StoreError::from)
}

pub fn set_category(
    conn: &mut PgConnection,
    id: i32,
    category: &str,
    ensure_existence: bool,
) -> StoreResult<()> {
    use crate::news::dsl;

    let updated = diesel::update(dsl::news.find(id))
        .set((
            dsl::category.eq(category),
            dsl::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)?;
    if updated == 0 && ensure_existence {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub fn delete(conn: &mut PgConnection, id: i32, ensure_existence: bool) -> StoreResult<()> {
    use crate::news::dsl;

    let deleted = diesel::delete(dsl::news.find(id)).execute(conn)?;
    if deleted == 0 && ensure_existence {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub fn count(conn: &mut PgConnection) -> StoreResult<i64> {
    use crate::news::dsl;

    dsl::news.count().get_result(conn).map_err(StoreError::from)
}

#[derive(Debug, Clone, Default)]
pub struct NewsSearch<'a> {
    pub query: Option<&'a str>,
    pub categories: Option<&'a [String]>,
    pub channel_ids: Option<&'a [i32]>,
    pub limit: i64,
    pub offset: i64,
    pub recent_first: bool,
}

/// Offset-paginated substring search over title, summary, and source. This
/// is the store-side fallback for when the search index is disabled.
pub fn search_page(
    conn: &mut PgConnection,
    params: &NewsSearch,
) -> StoreResult<(i64, Vec<DbNews>)> {
    use crate::news::dsl;

    // Boxed queries cannot be cloned, so the filter is applied twice: once
    // for the total count and once for the page itself.
    let mut count_query = dsl::news.into_boxed();
    let mut page_query = dsl::news.into_boxed();

    if let Some(query) = params.query {
        let pattern = format!("%{}%", query);
        count_query = count_query.filter(
            dsl::title
                .ilike(pattern.clone())
                .or(dsl::summary.ilike(pattern.clone()))
                .or(dsl::source.ilike(pattern.clone())),
        );
        page_query = page_query.filter(
            dsl::title
                .ilike(pattern.clone())
                .or(dsl::summary.ilike(pattern.clone()))
                .or(dsl::source.ilike(pattern)),
        );
    }

    if let Some(categories) = params.categories {
        count_query = count_query.filter(dsl::category.eq_any(categories));
        page_query = page_query.filter(dsl::category.eq_any(categories));
    }

    if let Some(channel_ids) = params.channel_ids {
        count_query = count_query.filter(dsl::channel_id.eq_any(channel_ids));
        page_query = page_query.filter(dsl::channel_id.eq_any(channel_ids));
    }

    let total: i64 = count_query.count().get_result(conn)?;

    page_query = if params.recent_first {
        page_query.order_by((dsl::published.desc(), dsl::id.desc()))
    } else {
        page_query.order_by((dsl::published.asc(), dsl::id.asc()))
    };

    let rows = page_query
        .limit(params.limit)
        .offset(params.offset)
        .select(DbNews::as_select())
        .get_results(conn)?;

    Ok((total, rows))
}

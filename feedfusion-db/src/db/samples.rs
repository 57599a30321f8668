use crate::error::{StoreError, StoreResult};
use crate::models::{DbSample, NewSample};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Double;

pub fn insert(conn: &mut PgConnection, sample: &NewSample) -> StoreResult<DbSample> {
    use crate::news_denormalized::dsl;

    diesel::insert_into(dsl::news_denormalized)
        .values(sample)
        .get_result(conn)
        .map_err(StoreError::from)
}

/// Bulk insert with conflict-ignore on the `(title, category)` natural key.
/// Returns how many rows were actually inserted.
pub fn insert_bulk_ignore_conflicts(
    conn: &mut PgConnection,
    samples: &[NewSample],
) -> StoreResult<usize> {
    use crate::news_denormalized::dsl;

    diesel::insert_into(dsl::news_denormalized)
        .values(samples)
        .on_conflict((dsl::title, dsl::category))
        .do_nothing()
        .execute(conn)
        .map_err(StoreError::from)
}

pub fn unused(conn: &mut PgConnection) -> StoreResult<Vec<DbSample>> {
    use crate::news_denormalized::dsl;

    dsl::news_denormalized
        .filter(dsl::used_in_training.eq(false))
        .order_by(dsl::id.asc())
        .select(DbSample::as_select())
        .get_results(conn)
        .map_err(StoreError::from)
}

pub fn all(conn: &mut PgConnection) -> StoreResult<Vec<DbSample>> {
    use crate::news_denormalized::dsl;

    dsl::news_denormalized
        .order_by(dsl::id.asc())
        .select(DbSample::as_select())
        .get_results(conn)
        .map_err(StoreError::from)
}

pub fn mark_used_in_training(conn: &mut PgConnection, ids: &[i32]) -> StoreResult<usize> {
    use crate::news_denormalized::dsl;

    diesel::update(dsl::news_denormalized.filter(dsl::id.eq_any(ids)))
        .set((
            dsl::used_in_training.eq(true),
            dsl::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .map_err(StoreError::from)
}

/// A uniform random replay draw from the already-consumed samples.
pub fn random_used(conn: &mut PgConnection, n: i64) -> StoreResult<Vec<DbSample>> {
    use crate::news_denormalized::dsl;

    dsl::news_denormalized
        .filter(dsl::used_in_training.eq(true))
        .order(sql::<Double>("random()"))
        .limit(n)
        .select(DbSample::as_select())
        .get_results(conn)
        .map_err(StoreError::from)
}

pub fn count(conn: &mut PgConnection) -> StoreResult<i64> {
    use crate::news_denormalized::dsl;

    dsl::news_denormalized
        .count()
        .get_result(conn)
        .map_err(StoreError::from)
}

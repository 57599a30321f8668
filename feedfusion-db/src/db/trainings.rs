use crate::error::{StoreError, StoreResult};
use crate::models::{DbTraining, NewTraining};
use diesel::prelude::*;

/// The uniqueness probe consulted before starting a job: is a training
/// already running against this artifact directory?
pub fn active(conn: &mut PgConnection, model_dir: &str) -> StoreResult<Option<DbTraining>> {
    use crate::classification_trainings::dsl;

    dsl::classification_trainings
        .filter(dsl::model_dir.eq(model_dir))
        .filter(dsl::in_progress.eq(true))
        .select(DbTraining::as_select())
        .first(conn)
        .optional()
        .map_err(StoreError::from)
}

/// The partial unique index on `(model_dir) WHERE in_progress` backs the
/// gate: a concurrent insert for the same directory surfaces `ObjectExists`.
pub fn insert(conn: &mut PgConnection, training: &NewTraining) -> StoreResult<DbTraining> {
    use crate::classification_trainings::dsl;

    diesel::insert_into(dsl::classification_trainings)
        .values(training)
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn get(conn: &mut PgConnection, id: i32) -> StoreResult<DbTraining> {
    use crate::classification_trainings::dsl;

    dsl::classification_trainings
        .find(id)
        .select(DbTraining::as_select())
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn all(conn: &mut PgConnection) -> StoreResult<Vec<DbTraining>> {
    use crate::classification_trainings::dsl;

    dsl::classification_trainings
        .order_by(dsl::id.asc())
        .select(DbTraining::as_select())
        .get_results(conn)
        .map_err(StoreError::from)
}

/// Closes a job out, recording metrics on success or a failure detail
/// otherwise. Always clears `in_progress` so the gate reopens.
pub fn finish(
    conn: &mut PgConnection,
    id: i32,
    metrics: Option<&serde_json::Value>,
    details: Option<&str>,
) -> StoreResult<DbTraining> {
    use crate::classification_trainings::dsl;

    diesel::update(dsl::classification_trainings.find(id))
        .set((
            dsl::in_progress.eq(false),
            dsl::metrics.eq(metrics),
            dsl::details.eq(details),
            dsl::updated_at.eq(diesel::dsl::now),
        ))
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn count(conn: &mut PgConnection) -> StoreResult<i64> {
    use crate::classification_trainings::dsl;

    dsl::classification_trainings
        .count()
        .get_result(conn)
        .map_err(StoreError::from)
}

use crate::error::{StoreError, StoreResult};
use crate::models::DbUpload;
use diesel::prelude::*;

/// Creates the status row for a fresh upload; all counters start at their
/// column defaults.
pub fn create(conn: &mut PgConnection) -> StoreResult<DbUpload> {
    use crate::dataset_uploads::dsl;

    diesel::insert_into(dsl::dataset_uploads)
        .default_values()
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn get(conn: &mut PgConnection, id: i32) -> StoreResult<DbUpload> {
    use crate::dataset_uploads::dsl;

    dsl::dataset_uploads
        .find(id)
        .select(DbUpload::as_select())
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn get_optional(conn: &mut PgConnection, id: i32) -> StoreResult<Option<DbUpload>> {
    use crate::dataset_uploads::dsl;

    dsl::dataset_uploads
        .find(id)
        .select(DbUpload::as_select())
        .get_result(conn)
        .optional()
        .map_err(StoreError::from)
}

pub fn all(conn: &mut PgConnection) -> StoreResult<Vec<DbUpload>> {
    use crate::dataset_uploads::dsl;

    dsl::dataset_uploads
        .order_by(dsl::id.asc())
        .select(DbUpload::as_select())
        .get_results(conn)
        .map_err(StoreError::from)
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::dataset_uploads)]
pub struct UploadPatch {
    pub uploads: Option<i32>,
    pub errors: Option<i32>,
    pub is_completed: Option<bool>,
    pub details: Option<serde_json::Value>,
}

pub fn update(conn: &mut PgConnection, id: i32, patch: &UploadPatch) -> StoreResult<DbUpload> {
    use crate::dataset_uploads::dsl;

    diesel::update(dsl::dataset_uploads.find(id))
        .set((patch, dsl::updated_at.eq(diesel::dsl::now)))
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn count(conn: &mut PgConnection) -> StoreResult<i64> {
    use crate::dataset_uploads::dsl;

    dsl::dataset_uploads
        .count()
        .get_result(conn)
        .map_err(StoreError::from)
}

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use miette::Diagnostic;
use thiserror::Error;

/// The store-level error taxonomy. Callers match on the kind; the raw diesel
/// error is only carried for the generic `Query` case.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,

    #[error("object already exists")]
    ObjectExists,

    #[error("value out of integer range")]
    ValueOutOfRange,

    #[error("database error")]
    Query(#[source] DieselError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => StoreError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                StoreError::ObjectExists
            }
            other => StoreError::Query(other),
        }
    }
}

/// Ids arrive from JSON payloads as `i64`; the store keys are `Int4`.
/// An id that cannot fit must not turn into a driver error downstream.
pub fn id_from_i64(raw: i64) -> StoreResult<i32> {
    i32::try_from(raw).map_err(|_| StoreError::ValueOutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_conversion_bounds() {
        assert_eq!(id_from_i64(1).unwrap(), 1);
        assert_eq!(id_from_i64(i32::MAX as i64).unwrap(), i32::MAX);
        assert!(matches!(
            id_from_i64(i32::MAX as i64 + 1),
            Err(StoreError::ValueOutOfRange)
        ));
        assert!(matches!(
            id_from_i64(i64::MIN),
            Err(StoreError::ValueOutOfRange)
        ));
    }

    #[test]
    fn not_found_translation() {
        let err: StoreError = DieselError::NotFound.into();
        assert!(matches!(err, StoreError::NotFound));
    }
}

use crate::broker::TaskBroker;
use crate::config::WorkerConfig;
use crate::services::ServiceError;
use crate::tasks::RETRAIN_MODEL;
use diesel::PgConnection;
use feedfusion_db::models::{DbTraining, NewTraining};
use feedfusion_db::{ConnectionPool, StoreError, db, id_from_i64};
use log::warn;

/// On-demand training entry point. The gate is the `in_progress` partial
/// unique index: probe first for a friendly error, and treat an insert
/// conflict the same way for the race where two callers pass the probe.
/// The job row is committed before the enqueue; a failed enqueue closes
/// the row in-band and surfaces the broker error.
pub async fn train_model(
    pool: &ConnectionPool,
    broker: &TaskBroker,
    config: &WorkerConfig,
    train_config: serde_json::Value,
) -> Result<DbTraining, ServiceError> {
    let model_dir = config.model_dir.to_string_lossy().to_string();
    let mut conn = pool.get()?;

    if db::trainings::active(&mut conn, &model_dir)?.is_some() {
        return Err(ServiceError::ModelAlreadyTraining);
    }

    let row = match db::trainings::insert(
        &mut conn,
        &NewTraining {
            config: &train_config,
            model_dir: &model_dir,
            device: &config.device,
            in_progress: true,
        },
    ) {
        Err(StoreError::ObjectExists) => return Err(ServiceError::ModelAlreadyTraining),
        other => other?,
    };

    let payload = serde_json::json!({
        "training_id": row.id,
        "config": train_config,
    });
    if let Err(err) = broker.enqueue(RETRAIN_MODEL, payload).await {
        warn!("Failed to enqueue training id={}", row.id);
        let compensation =
            db::trainings::finish(&mut conn, row.id, None, Some("enqueue failed"));
        if let Err(update_err) = compensation {
            warn!(
                "Failed to mark training id={} as failed: {update_err}",
                row.id
            );
        }
        return Err(ServiceError::Broker(err));
    }

    Ok(row)
}

pub fn get_training(conn: &mut PgConnection, training_id: i64) -> Result<DbTraining, ServiceError> {
    let id = id_from_i64(training_id)?;
    match db::trainings::get(conn, id) {
        Err(StoreError::NotFound) => Err(ServiceError::TrainingNotFound),
        other => other.map_err(ServiceError::from),
    }
}

pub fn get_trainings(conn: &mut PgConnection) -> Result<Vec<DbTraining>, ServiceError> {
    Ok(db::trainings::all(conn)?)
}

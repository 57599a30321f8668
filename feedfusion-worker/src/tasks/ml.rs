use crate::broker::TaskEnvelope;
use crate::ml::artifacts::ArtifactError;
use crate::ml::classifier::{ClassifierError, PredictionInput, TrainingSample};
use crate::tasks::{
    CATEGORIZE_UNCATEGORIZED_NEWS, TaskError, WorkerContext, backoff_delay, get_conn,
};
use diesel::Connection;
use feedfusion_db::models::{NewSample, NewTraining, NewsCategory};
use feedfusion_db::{StoreError, db};
use log::{debug, error, info, warn};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use strum::Display;
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize)]
pub struct CategorizePayload {
    pub items: Vec<PredictionInput>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RetrainPayload {
    #[serde(default)]
    pub training_id: Option<i32>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadPayload {
    pub upload_id: i32,
    pub csv_text: String,
}

/// Which shape of training run the sample situation calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TrainingMode {
    Fresh,
    FullRetrain,
    Incremental,
}

/// The scheduler-side half of auto-categorization: cheap presence probe,
/// snapshot, hand off. The model itself is only ever loaded on the worker
/// that runs the categorize task.
pub async fn check_for_uncategorized_news(ctx: &WorkerContext) -> Result<(), TaskError> {
    info!("Started checking for uncategorized news...");

    if !ctx.artifacts.model_is_present() {
        info!(
            "Model artifacts are not present in {}, skipping",
            ctx.artifacts.model_dir().display()
        );
        return Ok(());
    }

    let uncategorized = {
        let mut conn = get_conn(ctx)?;
        db::news::uncategorized(&mut conn).map_err(TaskError::fatal)?
    };

    if uncategorized.is_empty() {
        info!("No uncategorized news. Skipping...");
        return Ok(());
    }

    info!("Found {} uncategorized news...", uncategorized.len());

    let items: Vec<PredictionInput> = uncategorized
        .iter()
        .map(|news| PredictionInput {
            news_id: news.id,
            title: news.title.clone(),
            summary: news.summary.clone(),
        })
        .collect();

    let payload = serde_json::to_value(CategorizePayload { items })
        .expect("payload serialization cannot fail");
    ctx.broker
        .enqueue(CATEGORIZE_UNCATEGORIZED_NEWS, payload)
        .await
        .map_err(TaskError::fatal)?;

    Ok(())
}

/// Applies the model's labels. Unknown labels are logged and skipped; all
/// accepted updates commit in one unit of work. Re-running over the same
/// batch is harmless: rows either gain a category or stay null.
pub async fn categorize_uncategorized_news(
    ctx: &WorkerContext,
    envelope: &TaskEnvelope,
) -> Result<(), TaskError> {
    let payload: CategorizePayload =
        serde_json::from_value(envelope.payload.clone()).map_err(|err| {
            TaskError::Fatal(miette::miette!("undecodable categorize payload: {err}"))
        })?;

    if payload.items.is_empty() {
        return Ok(());
    }

    let predictions = ctx
        .classifier
        .predict_batch(&payload.items)
        .await
        .map_err(|err| TaskError::retry(backoff_delay(envelope.retries), err))?;

    let mut conn = get_conn(ctx)?;
    let assigned = conn
        .transaction(|conn| {
            let mut assigned = 0usize;
            for prediction in &predictions {
                let Some(label) = prediction.category.as_deref() else {
                    continue;
                };
                match NewsCategory::from_str(label) {
                    Ok(category) => {
                        db::news::set_category(
                            conn,
                            prediction.news_id,
                            &category.to_string(),
                            false,
                        )?;
                        debug!(
                            "Assigned category '{category}' to news_id {}",
                            prediction.news_id
                        );
                        assigned += 1;
                    }
                    Err(_) => warn!(
                        "Classifier produced unknown label '{label}' for news_id {}, skipping",
                        prediction.news_id
                    ),
                }
            }
            Ok::<_, StoreError>(assigned)
        })
        .map_err(TaskError::fatal)?;

    if assigned != payload.items.len() {
        warn!(
            "Assigned categories to {assigned} of {} news",
            payload.items.len()
        );
    } else {
        info!("Assigned categories to all {assigned} news");
    }

    Ok(())
}

#[derive(Debug, Error, Diagnostic)]
enum TrainFailure {
    #[error("couldn't check out a database connection: {0}")]
    Pool(String),

    #[error("error loading training samples")]
    Store(#[from] StoreError),

    #[error("error reading model artifacts")]
    Artifacts(#[from] ArtifactError),

    #[error("training invocation failed")]
    Classifier(#[from] ClassifierError),
}

enum TrainOutcome {
    Skipped(String),
    Trained {
        metrics: serde_json::Value,
        mode: TrainingMode,
        new_sample_ids: Vec<i32>,
    },
}

/// The retrain task. Invoked either by the daily tick (payload null, gate
/// and job row created here) or by an admin call that already created the
/// job row and passes its id.
pub async fn retrain_model(ctx: &WorkerContext, envelope: &TaskEnvelope) -> Result<(), TaskError> {
    let payload: RetrainPayload = if envelope.payload.is_null() {
        RetrainPayload::default()
    } else {
        serde_json::from_value(envelope.payload.clone()).map_err(|err| {
            TaskError::Fatal(miette::miette!("undecodable retrain payload: {err}"))
        })?
    };

    let model_dir = ctx.config.model_dir.to_string_lossy().to_string();

    let (training_id, train_config) = match payload.training_id {
        Some(id) => (
            id,
            payload
                .config
                .unwrap_or_else(|| ctx.config.train_config.clone()),
        ),
        None => {
            let mut conn = get_conn(ctx)?;

            if db::trainings::active(&mut conn, &model_dir)
                .map_err(TaskError::fatal)?
                .is_some()
            {
                info!("A training is already in progress for {model_dir}, skipping tick");
                return Ok(());
            }

            let row = db::trainings::insert(
                &mut conn,
                &NewTraining {
                    config: &ctx.config.train_config,
                    model_dir: &model_dir,
                    device: &ctx.config.device,
                    in_progress: true,
                },
            );
            let row = match row {
                Ok(row) => row,
                Err(StoreError::ObjectExists) => {
                    // A concurrent tick won the gate between probe and insert.
                    info!("Lost the training gate race for {model_dir}, skipping tick");
                    return Ok(());
                }
                Err(err) => return Err(TaskError::fatal(err)),
            };
            (row.id, ctx.config.train_config.clone())
        }
    };

    match train_inner(ctx, &train_config).await {
        Ok(TrainOutcome::Skipped(detail)) => {
            let mut conn = get_conn(ctx)?;
            db::trainings::finish(&mut conn, training_id, None, Some(&detail))
                .map_err(TaskError::fatal)?;
            info!("Training {training_id} finished without running: {detail}");
            Ok(())
        }
        Ok(TrainOutcome::Trained {
            metrics,
            mode,
            new_sample_ids,
        }) => {
            let report = serde_json::json!({
                "mode": mode.to_string(),
                "metrics": metrics,
            });
            let mut conn = get_conn(ctx)?;
            // Marking the consumed samples and closing the job are one unit
            // of work: either the whole new-sample set is marked used, or
            // none of it is.
            conn.transaction(|conn| {
                let marked = db::samples::mark_used_in_training(conn, &new_sample_ids)?;
                debug!("Marked {marked} samples as used in training");
                db::trainings::finish(conn, training_id, Some(&report), None)?;
                Ok::<_, StoreError>(())
            })
            .map_err(TaskError::fatal)?;
            info!("Training {training_id} finished ({mode})");
            Ok(())
        }
        Err(failure) => {
            let detail = failure.to_string();
            error!("Training {training_id} failed: {detail}");
            let mut conn = get_conn(ctx)?;
            db::trainings::finish(&mut conn, training_id, None, Some(&detail))
                .map_err(TaskError::fatal)?;
            Ok(())
        }
    }
}

async fn train_inner(
    ctx: &WorkerContext,
    train_config: &serde_json::Value,
) -> Result<TrainOutcome, TrainFailure> {
    let (batch, mode, new_sample_ids) = {
        let mut conn = ctx
            .pool
            .get()
            .map_err(|err| TrainFailure::Pool(err.to_string()))?;

        let new_samples = db::samples::unused(&mut conn)?;
        if new_samples.len() < ctx.config.ml_min_new_samples_for_train {
            return Ok(TrainOutcome::Skipped(format!(
                "not enough new samples: {} < {}",
                new_samples.len(),
                ctx.config.ml_min_new_samples_for_train,
            )));
        }

        let model_present = ctx.artifacts.model_is_present();
        let known_labels = if model_present {
            ctx.artifacts.load_labels()?
        } else {
            Vec::new()
        };
        let new_labels: HashSet<&str> =
            new_samples.iter().map(|s| s.category.as_str()).collect();

        let mode = select_training_mode(model_present, &known_labels, &new_labels);
        let new_sample_ids: Vec<i32> = new_samples.iter().map(|s| s.id).collect();

        let batch = match mode {
            TrainingMode::Fresh => new_samples,
            TrainingMode::FullRetrain => db::samples::all(&mut conn)?,
            TrainingMode::Incremental => {
                let replay_n = replay_size(
                    new_samples.len(),
                    ctx.config.ml_replay_ratio,
                    ctx.config.ml_max_replay_samples,
                );
                let mut batch = new_samples;
                if replay_n > 0 {
                    batch.extend(db::samples::random_used(&mut conn, replay_n as i64)?);
                }
                batch
            }
        };

        (batch, mode, new_sample_ids)
    };

    let samples: Vec<TrainingSample> = batch
        .iter()
        .map(|sample| TrainingSample {
            title: sample.title.clone(),
            summary: sample.summary.clone(),
            category: sample.category.clone(),
        })
        .collect();

    let resume = mode == TrainingMode::Incremental;
    info!("Training model on {} samples ({mode})", samples.len());

    let metrics = ctx.classifier.train(&samples, resume, train_config).await?;

    Ok(TrainOutcome::Trained {
        metrics,
        mode,
        new_sample_ids,
    })
}

/// No artifacts: nothing to resume, train fresh. A label the current model
/// has never seen forces a full retrain; otherwise incremental with replay.
fn select_training_mode(
    model_present: bool,
    known_labels: &[String],
    new_labels: &HashSet<&str>,
) -> TrainingMode {
    if !model_present {
        return TrainingMode::Fresh;
    }
    let unknown = new_labels
        .iter()
        .any(|label| !known_labels.iter().any(|known| known == label));
    if unknown {
        TrainingMode::FullRetrain
    } else {
        TrainingMode::Incremental
    }
}

fn replay_size(new_count: usize, ratio: f64, max: usize) -> usize {
    ((new_count as f64 * ratio).floor() as usize).min(max)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSample {
    pub title: String,
    pub summary: Option<String>,
    pub category: String,
}

/// Row-by-row validation of an uploaded dataset. Cells are trimmed; a row
/// needs a non-empty title and a recognizable category. Row failures are
/// collected as human-readable details, never aborting the rest.
pub fn validate_dataset(csv_text: &str) -> (Vec<ValidatedSample>, Vec<String>) {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(csv_text.as_bytes());

    let headers = reader.headers().cloned().unwrap_or_default();
    let position = |name: &str| headers.iter().position(|header| header == name);
    let title_idx = position("title");
    let summary_idx = position("summary");
    let category_idx = position("category");

    let mut valid = Vec::new();
    let mut errors = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let row = row + 1;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                errors.push(format!("row {row}: {err}"));
                continue;
            }
        };

        let field = |idx: Option<usize>| {
            idx.and_then(|idx| record.get(idx))
                .map(str::trim)
                .unwrap_or("")
        };

        let title = field(title_idx);
        if title.is_empty() {
            errors.push(format!("row {row}: missing title"));
            continue;
        }

        let category_raw = field(category_idx);
        let category = match NewsCategory::from_str(category_raw) {
            Ok(category) => category,
            Err(_) => {
                errors.push(format!("row {row}: unknown category '{category_raw}'"));
                continue;
            }
        };

        let summary = match field(summary_idx) {
            "" => None,
            summary => Some(summary.to_string()),
        };

        valid.push(ValidatedSample {
            title: title.to_string(),
            summary,
            category: category.to_string(),
        });
    }

    (valid, errors)
}

/// The background half of a dataset upload: validate every row, bulk-insert
/// the survivors, and complete the status record with the tallies.
pub async fn upload_training_dataset(
    ctx: &WorkerContext,
    envelope: &TaskEnvelope,
) -> Result<(), TaskError> {
    let payload: UploadPayload =
        serde_json::from_value(envelope.payload.clone()).map_err(|err| {
            TaskError::Fatal(miette::miette!("undecodable upload payload: {err}"))
        })?;

    info!("Started uploading dataset...");

    let (valid, errors) = validate_dataset(&payload.csv_text);
    info!(
        "Finished validating dataset. Errors: {}, Uploads: {}",
        errors.len(),
        valid.len(),
    );

    let mut conn = get_conn(ctx)?;
    conn.transaction(|conn| {
        if !valid.is_empty() {
            let rows: Vec<NewSample> = valid
                .iter()
                .map(|sample| NewSample {
                    title: &sample.title,
                    summary: sample.summary.as_deref(),
                    category: &sample.category,
                })
                .collect();
            db::samples::insert_bulk_ignore_conflicts(conn, &rows)?;
        }

        db::uploads::update(
            conn,
            payload.upload_id,
            &db::uploads::UploadPatch {
                uploads: Some(valid.len() as i32),
                errors: Some(errors.len() as i32),
                is_completed: Some(true),
                details: Some(serde_json::json!(errors)),
            },
        )?;

        Ok::<_, StoreError>(())
    })
    .map_err(|err| TaskError::retry(backoff_delay(envelope.retries), err))?;

    info!("Successfully saved dataset into db");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_when_no_artifacts() {
        let new_labels: HashSet<&str> = ["sport"].into_iter().collect();
        assert_eq!(
            select_training_mode(false, &[], &new_labels),
            TrainingMode::Fresh
        );
    }

    #[test]
    fn full_retrain_on_unseen_label() {
        let known = vec!["sport".to_string(), "economics".to_string()];
        let new_labels: HashSet<&str> = ["sport", "culture"].into_iter().collect();
        assert_eq!(
            select_training_mode(true, &known, &new_labels),
            TrainingMode::FullRetrain
        );
    }

    #[test]
    fn incremental_when_labels_are_known() {
        let known = vec!["sport".to_string(), "economics".to_string()];
        let new_labels: HashSet<&str> = ["sport"].into_iter().collect();
        assert_eq!(
            select_training_mode(true, &known, &new_labels),
            TrainingMode::Incremental
        );
    }

    #[test]
    fn replay_is_ratio_capped_by_max() {
        assert_eq!(replay_size(100, 0.3, 500), 30);
        assert_eq!(replay_size(100, 0.35, 500), 35);
        assert_eq!(replay_size(10_000, 0.3, 500), 500);
        assert_eq!(replay_size(0, 0.3, 500), 0);
    }

    #[test]
    fn dataset_rows_validate_individually() {
        let csv_text = "title,summary,category\n\
            First,Some summary,sport\n\
            ,missing title,sport\n\
            Third,,economics\n\
            Fourth,bad label,astrology\n";

        let (valid, errors) = validate_dataset(csv_text);

        assert_eq!(valid.len(), 2);
        assert_eq!(valid[0].title, "First");
        assert_eq!(valid[0].summary.as_deref(), Some("Some summary"));
        assert_eq!(valid[0].category, "sport");
        assert_eq!(valid[1].title, "Third");
        assert_eq!(valid[1].summary, None);

        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("row 2"));
        assert!(errors[1].contains("row 4"));
        assert!(errors[1].contains("astrology"));
    }

    #[test]
    fn mode_descriptor_strings() {
        assert_eq!(TrainingMode::Fresh.to_string(), "fresh");
        assert_eq!(TrainingMode::FullRetrain.to_string(), "full_retrain");
        assert_eq!(TrainingMode::Incremental.to_string(), "incremental");
    }
}

use crate::broker::TaskBroker;
use crate::config::WorkerConfig;
use crate::tasks;
use chrono::Utc;
use cron::Schedule;
use log::{debug, error, info};
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ScheduleEntry {
    pub task: &'static str,
    pub schedule: Schedule,
}

fn entry(task: &'static str, expression: &str) -> ScheduleEntry {
    ScheduleEntry {
        task,
        // Expressions are compiled in; a typo is a programming error.
        schedule: Schedule::from_str(expression).expect("cron expression is valid"),
    }
}

/// The periodic ticks this deployment runs, honoring the config gates.
pub fn entries_from_config(config: &WorkerConfig) -> Vec<ScheduleEntry> {
    let mut entries = vec![entry(tasks::PARSE_RSS, "0 */10 * * * *")];

    if config.enable_subs_check {
        entries.push(entry(tasks::CHECK_SUBS, "0 */3 * * * *"));
    }
    if config.enable_ml_autocategorization {
        entries.push(entry(tasks::CHECK_FOR_UNCATEGORIZED_NEWS, "0 * * * * *"));
    }
    if config.enable_ml_autotrain {
        entries.push(entry(tasks::RETRAIN_MODEL, "0 0 0 * * *"));
    }

    entries
}

/// Enqueues every entry's tick at its schedule until cancelled. Delivery is
/// at-least-once: if the broker hiccups the tick is simply missed and the
/// next one fires, but a tick is never half-submitted.
pub async fn run_scheduler(
    broker: Arc<TaskBroker>,
    entries: Vec<ScheduleEntry>,
    cancel: CancellationToken,
) {
    let handles: Vec<_> = entries
        .into_iter()
        .map(|entry| {
            let broker = broker.clone();
            let cancel = cancel.clone();
            tokio::spawn(run_entry(broker, entry, cancel))
        })
        .collect();

    for handle in handles {
        if let Err(err) = handle.await {
            error!("Scheduler loop exited abnormally: {err}");
        }
    }
}

async fn run_entry(broker: Arc<TaskBroker>, entry: ScheduleEntry, cancel: CancellationToken) {
    info!("Scheduling {} ({})", entry.task, entry.schedule);

    loop {
        let Some(next) = entry.schedule.upcoming(Utc).next() else {
            error!("Schedule for {} has no upcoming fire time", entry.task);
            return;
        };

        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        debug!("Next {} tick at {next}", entry.task);

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        match broker
            .enqueue(entry.task, serde_json::Value::Null)
            .await
        {
            Ok(()) => debug!("Enqueued periodic {}", entry.task),
            Err(err) => error!("Failed to enqueue periodic {}: {err}", entry.task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates_control_which_ticks_run() {
        let mut config = WorkerConfig::default();
        config.enable_subs_check = false;
        config.enable_ml_autocategorization = false;
        config.enable_ml_autotrain = false;

        let names: Vec<_> = entries_from_config(&config)
            .iter()
            .map(|e| e.task)
            .collect();
        assert_eq!(names, vec![tasks::PARSE_RSS]);

        config.enable_subs_check = true;
        config.enable_ml_autocategorization = true;
        config.enable_ml_autotrain = true;

        let names: Vec<_> = entries_from_config(&config)
            .iter()
            .map(|e| e.task)
            .collect();
        assert_eq!(
            names,
            vec![
                tasks::PARSE_RSS,
                tasks::CHECK_SUBS,
                tasks::CHECK_FOR_UNCATEGORIZED_NEWS,
                tasks::RETRAIN_MODEL,
            ]
        );
    }

    #[test]
    fn daily_retrain_fires_at_midnight() {
        let schedule = Schedule::from_str("0 0 0 * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "00:00:00");
    }
}

use std::time::Duration;

use tokio::time;

use crate::AppState;

/// Recurring scheduler for the evaluation cycle. The engine itself knows
/// nothing about timers; this adapter just ticks and calls it.
pub fn spawn_alert_scheduler(state: AppState) {
    tokio::spawn(async move {
        let mut interval =
            time::interval(Duration::from_secs(state.settings.alert_check_interval_secs));

        loop {
            interval.tick().await;

            match state.engine.run_evaluation_cycle().await {
                Ok(summary) => {
                    tracing::info!(
                        evaluated = summary.evaluated,
                        fired = summary.fired,
                        "alert cycle complete"
                    );
                }
                // Fatal for this cycle only; the next tick is the retry.
                Err(e) => {
                    tracing::error!("alert cycle failed: {e}");
                }
            }
        }
    });
}

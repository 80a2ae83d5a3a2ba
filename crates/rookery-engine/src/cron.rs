//! Cron schedule computation
//!
//! Schedules come either from a cron expression (parsed with `croner`) or
//! from a plain interval in seconds, optionally with uniform jitter. On
//! server start `next_run` is recomputed from the current time so a backlog
//! of missed firings never stampedes.

use chrono::{DateTime, Duration, Utc};
use croner::Cron as CronSchedule;
use rand::Rng;
use rookery_core::Cron;

use crate::error::EngineError;

/// Compute the next firing instant after `now`.
pub fn next_run(cron: &Cron, now: DateTime<Utc>) -> Result<DateTime<Utc>, EngineError> {
    if !cron.cron_expression.is_empty() {
        let schedule = CronSchedule::new(&cron.cron_expression)
            .parse()
            .map_err(|e| {
                EngineError::InvalidArgument(format!(
                    "bad cron expression {:?}: {e}",
                    cron.cron_expression
                ))
            })?;
        return schedule
            .find_next_occurrence(&now, false)
            .map_err(|e| EngineError::InvalidArgument(format!("no next occurrence: {e}")));
    }
    if cron.interval > 0 {
        let mut seconds = cron.interval;
        if cron.random {
            seconds += rand::thread_rng().gen_range(0..cron.interval);
        }
        return Ok(now + Duration::seconds(seconds));
    }
    Err(EngineError::InvalidArgument(format!(
        "cron {} has neither expression nor interval",
        cron.name
    )))
}

/// Whether the cron is due at `now`. A cron with no computed `next_run` yet
/// is never due; the trigger loop initializes it first.
pub fn is_due(cron: &Cron, now: DateTime<Utc>) -> bool {
    cron.next_run.map(|next| next <= now).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cron() -> Cron {
        Cron::new(rookery_core::generate_id(), "tick", "{}")
    }

    #[test]
    fn test_expression_schedule() {
        let cron = cron().with_expression("0 * * * *");
        let now = Utc::now();
        let next = next_run(&cron, now).unwrap();
        assert!(next > now);
        assert_eq!(next.timestamp() % 3600, 0);
    }

    #[test]
    fn test_interval_schedule() {
        let cron = cron().with_interval(30);
        let now = Utc::now();
        let next = next_run(&cron, now).unwrap();
        assert_eq!(next, now + Duration::seconds(30));
    }

    #[test]
    fn test_interval_with_jitter_stays_in_range() {
        let mut cron = cron().with_interval(60);
        cron.random = true;
        let now = Utc::now();
        for _ in 0..20 {
            let next = next_run(&cron, now).unwrap();
            assert!(next >= now + Duration::seconds(60));
            assert!(next < now + Duration::seconds(120));
        }
    }

    #[test]
    fn test_unscheduled_cron_rejected() {
        assert!(matches!(
            next_run(&cron(), Utc::now()),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_bad_expression_rejected() {
        let cron = cron().with_expression("not a cron line");
        assert!(matches!(
            next_run(&cron, Utc::now()),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_is_due() {
        let mut cron = cron().with_interval(30);
        assert!(!is_due(&cron, Utc::now()));
        cron.next_run = Some(Utc::now() - Duration::seconds(1));
        assert!(is_due(&cron, Utc::now()));
        cron.next_run = Some(Utc::now() + Duration::seconds(60));
        assert!(!is_due(&cron, Utc::now()));
    }
}

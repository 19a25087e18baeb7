//! A named, scheduled context task.

use xdscp_config::{RetryPolicy, TaskInterval};
use xdscp_loadable::LoadableSpec;

/// `{name, spec, interval, retry_policy}` — created at configuration load,
/// refreshed forever, never destroyed.
#[derive(Clone)]
pub struct ContextTask {
    pub name: String,
    pub spec: LoadableSpec,
    pub interval: TaskInterval,
    pub retry_policy: RetryPolicy,
}

/// Seconds until `task` is next due, measured from `now`.
pub fn seconds_til_next_run(interval: &TaskInterval, now: chrono::DateTime<chrono::Utc>) -> i64 {
    match interval {
        TaskInterval::Seconds(n) => *n as i64,
        TaskInterval::Cron(expr) => {
            use std::str::FromStr;
            match cron::Schedule::from_str(expr) {
                Ok(schedule) => schedule
                    .after(&now)
                    .next()
                    .map(|next| (next - now).num_seconds().max(0))
                    .unwrap_or(60),
                Err(_) => 60,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn seconds_interval_is_literal() {
        assert_eq!(seconds_til_next_run(&TaskInterval::Seconds(42), Utc::now()), 42);
    }

    #[test]
    fn cron_interval_is_non_negative() {
        let secs = seconds_til_next_run(&TaskInterval::Cron("0 * * * * *".to_string()), Utc::now());
        assert!(secs >= 0);
    }

    #[test]
    fn invalid_cron_falls_back_to_a_minute() {
        assert_eq!(seconds_til_next_run(&TaskInterval::Cron("not a cron".to_string()), Utc::now()), 60);
    }
}

use chrono::{DateTime, Duration, Utc};
use vproc_domain::Metrics;

/// Runs the local fraud checks of spec §4.G against a candidate
/// snapshot. `prior` is the metrics of the previous record emitted for
/// the same job, if any — absent only for the very first record.
/// `Metrics`'s fields are unsigned, so the "any metric is negative"
/// condition from the source is unreachable by construction here and is
/// not re-checked at runtime.
pub fn check(
    now: DateTime<Utc>,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    metrics: &Metrics,
    prior: Option<&Metrics>,
) -> Result<(), String> {
    if period_end > now + Duration::seconds(60) {
        return Err(format!("period_end {} is more than 60s ahead of clock {}", period_end, now));
    }
    if period_end - period_start > Duration::hours(48) {
        return Err(format!("period duration {} exceeds 48h maximum", period_end - period_start));
    }
    if let Some(prior) = prior {
        if !metrics.dominates(prior) {
            return Err("cumulative metrics regressed versus the prior record".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(wall: u64) -> Metrics {
        Metrics { wall_clock_seconds: wall, ..Default::default() }
    }

    #[test]
    fn rejects_end_time_far_in_the_future() {
        let now = Utc::now();
        let result = check(now, now, now + Duration::seconds(120), &metrics(10), None);
        assert!(result.is_err());
    }

    #[test]
    fn allows_end_time_within_skew_tolerance() {
        let now = Utc::now();
        let result = check(now, now, now + Duration::seconds(30), &metrics(10), None);
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_duration_over_48_hours() {
        let now = Utc::now();
        let start = now - Duration::hours(50);
        let result = check(now, start, now, &metrics(10), None);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_regressed_metrics() {
        let now = Utc::now();
        let prior = metrics(100);
        let current = metrics(50);
        let result = check(now, now - Duration::seconds(10), now, &current, Some(&prior));
        assert!(result.is_err());
    }

    #[test]
    fn accepts_advancing_metrics() {
        let now = Utc::now();
        let prior = metrics(50);
        let current = metrics(100);
        let result = check(now, now - Duration::seconds(10), now, &current, Some(&prior));
        assert!(result.is_ok());
    }
}

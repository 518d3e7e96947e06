//! Cron utility functions for the global sweep schedule
//!
//! Operators write standard 5-field expressions (minute hour day-of-month
//! month day-of-week). The `cron` crate expects a leading seconds field and
//! numbers day-of-week 1-7 starting at Sunday, so expressions are normalised
//! before parsing: a `0` seconds field is prepended and numeric weekdays
//! (0-7, both 0 and 7 meaning Sunday) are rewritten as names.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;

const WEEKDAY_NAMES: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Convert a 5-field expression into the 6-field form the `cron` crate parses
pub fn normalize_expression(cron_expression: &str) -> Result<String, String> {
    let fields: Vec<&str> = cron_expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!(
            "Invalid cron expression '{cron_expression}': expected 5 fields (minute hour day month weekday), got {}",
            fields.len()
        ));
    }

    let weekday = normalize_weekday_field(fields[4])
        .map_err(|e| format!("Invalid cron expression '{cron_expression}': {e}"))?;

    Ok(format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], weekday
    ))
}

fn normalize_weekday_field(field: &str) -> Result<String, String> {
    let parts: Result<Vec<String>, String> = field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };

            let range = match range.split_once('-') {
                // `Mon-Sun` is an inverted range for the cron crate, so spell it out
                Some((start, "7")) => return expand_to_sunday(start, step),
                Some((start, end)) => format!("{}-{}", weekday_name(start)?, weekday_name(end)?),
                None => weekday_name(range)?,
            };

            Ok(match step {
                Some(step) => format!("{range}/{step}"),
                None => range,
            })
        })
        .collect();

    Ok(parts?.join(","))
}

/// List the days of a numeric range ending at 7 (Sunday), honoring an optional step
fn expand_to_sunday(start: &str, step: Option<&str>) -> Result<String, String> {
    let start: usize = start
        .parse()
        .map_err(|_| format!("day-of-week range must start with a number 0-7, got '{start}'"))?;
    if start > 7 {
        return Err(format!("day-of-week {start} is out of range 0-7"));
    }
    let step = match step {
        Some(step) => match step.parse::<usize>() {
            Ok(step) if step > 0 => step,
            _ => return Err(format!("invalid day-of-week step '{step}'")),
        },
        None => 1,
    };

    let mut days: Vec<&str> = Vec::new();
    for day in (start..=7).step_by(step) {
        let name = WEEKDAY_NAMES[day];
        if !days.contains(&name) {
            days.push(name);
        }
    }
    Ok(days.join(","))
}

fn weekday_name(token: &str) -> Result<String, String> {
    match token.parse::<usize>() {
        Ok(day) if day < WEEKDAY_NAMES.len() => Ok(WEEKDAY_NAMES[day].to_string()),
        Ok(day) => Err(format!("day-of-week {day} is out of range 0-7")),
        // '*', '?' and names pass through untouched
        Err(_) => Ok(token.to_string()),
    }
}

/// Parse a 5-field cron expression
pub fn parse_schedule(cron_expression: &str) -> Result<Schedule, String> {
    let normalized = normalize_expression(cron_expression)?;
    Schedule::from_str(&normalized)
        .map_err(|e| format!("Invalid cron expression '{cron_expression}': {e}"))
}

/// First scheduled instant strictly after `after`, evaluated in `timezone`
pub fn next_fire_after(schedule: &Schedule, after: DateTime<Utc>, timezone: Tz) -> Option<DateTime<Utc>> {
    schedule
        .after(&after.with_timezone(&timezone))
        .next()
        .map(|t| t.with_timezone(&Utc))
}

/// Whether at least one scheduled instant falls in `(last_evaluated, now]`.
/// Several missed instants still count as a single fire.
pub fn fires_between(
    schedule: &Schedule,
    last_evaluated: DateTime<Utc>,
    now: DateTime<Utc>,
    timezone: Tz,
) -> bool {
    next_fire_after(schedule, last_evaluated, timezone).is_some_and(|next| next <= now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_normalization_prepends_seconds() {
        assert_eq!(normalize_expression("0 3 * * *").unwrap(), "0 0 3 * * *");
        assert_eq!(normalize_expression("*/15 * * * 1-5").unwrap(), "0 */15 * * * Mon-Fri");
        assert_eq!(normalize_expression("0 0 * * 0,6").unwrap(), "0 0 0 * * Sun,Sat");
        assert_eq!(normalize_expression("0 0 * * 7").unwrap(), "0 0 0 * * Sun");
        assert_eq!(
            normalize_expression("0 3 * * 1-7").unwrap(),
            "0 0 3 * * Mon,Tue,Wed,Thu,Fri,Sat,Sun"
        );
        assert_eq!(normalize_expression("0 3 * * 5-7").unwrap(), "0 0 3 * * Fri,Sat,Sun");
        assert_eq!(normalize_expression("0 3 * * 0-7").unwrap(), "0 0 3 * * Sun,Mon,Tue,Wed,Thu,Fri,Sat");
        assert_eq!(normalize_expression("0 3 * * 1-7/2").unwrap(), "0 0 3 * * Mon,Wed,Fri,Sun");
    }

    #[test]
    fn test_ranges_ending_on_sunday_parse() {
        let schedule = parse_schedule("0 3 * * 5-7").unwrap();
        // 2025-03-13 is a Thursday; the range covers Friday through Sunday
        let after = Utc.with_ymd_and_hms(2025, 3, 13, 12, 0, 0).unwrap();
        let fires: Vec<_> = schedule
            .after(&after)
            .take(4)
            .map(|t| t.with_timezone(&Utc))
            .collect();
        assert_eq!(
            fires,
            vec![
                Utc.with_ymd_and_hms(2025, 3, 14, 3, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 15, 3, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 16, 3, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 21, 3, 0, 0).unwrap(),
            ]
        );
        assert!(parse_schedule("0 3 * * 1-7").is_ok());
        assert!(parse_schedule("0 3 * * 1-7/0").is_err());
    }

    #[test]
    fn test_wrong_field_count_is_rejected() {
        assert!(parse_schedule("0 0 3 * * *").is_err());
        assert!(parse_schedule("0 3 * *").is_err());
        assert!(parse_schedule("invalid").is_err());
        assert!(parse_schedule("0 0 * * 9").is_err());
    }

    #[test]
    fn test_daily_schedule_fires_once_for_its_minute() {
        let schedule = parse_schedule("0 3 * * *").unwrap();
        let fire = Utc.with_ymd_and_hms(2025, 3, 14, 3, 0, 0).unwrap();

        // Evaluation window ending exactly at 03:00:00 fires
        assert!(fires_between(&schedule, fire - Duration::seconds(30), fire, Tz::UTC));
        // The following window in the same minute does not fire again
        assert!(!fires_between(&schedule, fire, fire + Duration::seconds(30), Tz::UTC));
        // Nor does the window before
        assert!(!fires_between(
            &schedule,
            fire - Duration::minutes(2),
            fire - Duration::seconds(1),
            Tz::UTC
        ));
    }

    #[test]
    fn test_schedule_respects_timezone() {
        let schedule = parse_schedule("0 3 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();

        let next = next_fire_after(&schedule, after, chrono_tz::Europe::Berlin).unwrap();
        // 03:00 in Berlin (UTC+1 in winter) is 02:00 UTC
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 10, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_weekday_numbers_follow_standard_cron() {
        let schedule = parse_schedule("0 12 * * 1").unwrap();
        // 2025-03-15 is a Saturday; next Monday is the 17th
        let after = Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap();
        let next = next_fire_after(&schedule, after, Tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 17, 12, 0, 0).unwrap());
    }
}

//! Schedule rules and their evaluation.
//!
//! A rule is constructed once at configuration time and evaluated as a pure
//! function of the current instant. All arithmetic is in UTC. Matching is
//! done at wall-clock minute granularity; a tick that never happened is not
//! retroactively fired.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("hour out of range: {0} (expected 0-23)")]
    HourOutOfRange(u32),
    #[error("minute out of range: {0} (expected 0-59)")]
    MinuteOutOfRange(u32),
}

/// When a task recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleRule {
    /// At the top of every hour.
    Hourly,
    /// Every day at the given time.
    DailyAt { hour: u32, minute: u32 },
    /// Every week on the given weekday at the given time.
    WeeklyAt {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
}

impl ScheduleRule {
    /// Check the time-of-day fields. Called once at configuration load;
    /// the evaluation methods assume a validated rule.
    pub fn validate(&self) -> Result<(), RuleError> {
        let (hour, minute) = match *self {
            Self::Hourly => return Ok(()),
            Self::DailyAt { hour, minute } => (hour, minute),
            Self::WeeklyAt { hour, minute, .. } => (hour, minute),
        };
        if hour > 23 {
            return Err(RuleError::HourOutOfRange(hour));
        }
        if minute > 59 {
            return Err(RuleError::MinuteOutOfRange(minute));
        }
        Ok(())
    }

    /// Whether the rule matches `now`, at minute granularity.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match *self {
            Self::Hourly => now.minute() == 0,
            Self::DailyAt { hour, minute } => now.hour() == hour && now.minute() == minute,
            Self::WeeklyAt {
                weekday,
                hour,
                minute,
            } => now.weekday() == weekday && now.hour() == hour && now.minute() == minute,
        }
    }

    /// The next instant strictly after `now` at which the rule fires.
    pub fn next_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Self::Hourly => start_of_hour(now) + Duration::hours(1),
            Self::DailyAt { hour, minute } => {
                let today = at(now.date_naive(), hour, minute);
                if today > now {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
            Self::WeeklyAt {
                weekday,
                hour,
                minute,
            } => {
                let days_ahead =
                    (weekday.num_days_from_monday() + 7 - now.weekday().num_days_from_monday()) % 7;
                let candidate = at(now.date_naive() + Duration::days(days_ahead.into()), hour, minute);
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
        }
    }

    /// Start of the period `now` falls in, used as the at-most-once key:
    /// the current hour for hourly rules, the current day otherwise.
    pub fn period_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Hourly => start_of_hour(now),
            Self::DailyAt { .. } | Self::WeeklyAt { .. } => at(now.date_naive(), 0, 0),
        }
    }
}

impl fmt::Display for ScheduleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Hourly => write!(f, "hourly"),
            Self::DailyAt { hour, minute } => write!(f, "daily at {hour:02}:{minute:02}"),
            Self::WeeklyAt {
                weekday,
                hour,
                minute,
            } => write!(f, "weekly on {weekday} at {hour:02}:{minute:02}"),
        }
    }
}

fn start_of_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    at(t.date_naive(), t.hour(), 0)
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    // Rules are validated at load time, so the fallback is unreachable.
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn hourly_due_at_top_of_hour_only() {
        let rule = ScheduleRule::Hourly;
        assert!(rule.is_due(utc(2026, 3, 4, 14, 0, 0)));
        assert!(rule.is_due(utc(2026, 3, 4, 14, 0, 59)));
        assert!(!rule.is_due(utc(2026, 3, 4, 14, 1, 0)));
    }

    #[test]
    fn hourly_next_run_is_start_of_next_hour() {
        let rule = ScheduleRule::Hourly;
        assert_eq!(rule.next_run(utc(2026, 3, 4, 14, 37, 12)), utc(2026, 3, 4, 15, 0, 0));
        // Exactly on the boundary still moves forward a full hour.
        assert_eq!(rule.next_run(utc(2026, 3, 4, 14, 0, 0)), utc(2026, 3, 4, 15, 0, 0));
        // Day rollover.
        assert_eq!(rule.next_run(utc(2026, 3, 4, 23, 30, 0)), utc(2026, 3, 5, 0, 0, 0));
    }

    #[test]
    fn daily_due_matches_hour_and_minute() {
        let rule = ScheduleRule::DailyAt { hour: 8, minute: 0 };
        assert!(rule.is_due(utc(2026, 3, 4, 8, 0, 0)));
        assert!(rule.is_due(utc(2026, 3, 4, 8, 0, 30)));
        // One minute later is a miss: no catch-up at minute granularity.
        assert!(!rule.is_due(utc(2026, 3, 4, 8, 1, 0)));
        assert!(!rule.is_due(utc(2026, 3, 4, 9, 0, 0)));
    }

    #[test]
    fn daily_next_run_rolls_to_tomorrow() {
        let rule = ScheduleRule::DailyAt { hour: 8, minute: 0 };
        // Before the time: today.
        assert_eq!(rule.next_run(utc(2026, 3, 4, 6, 0, 0)), utc(2026, 3, 4, 8, 0, 0));
        // Exactly at the time: tomorrow.
        assert_eq!(rule.next_run(utc(2026, 3, 4, 8, 0, 0)), utc(2026, 3, 5, 8, 0, 0));
        // After the time: tomorrow.
        assert_eq!(rule.next_run(utc(2026, 3, 4, 12, 0, 0)), utc(2026, 3, 5, 8, 0, 0));
    }

    #[test]
    fn weekly_next_run_from_midweek() {
        // 2024-01-10 is a Wednesday; next Monday is 2024-01-15, 5 days ahead.
        let rule = ScheduleRule::WeeklyAt {
            weekday: Weekday::Mon,
            hour: 8,
            minute: 0,
        };
        assert_eq!(rule.next_run(utc(2024, 1, 10, 12, 0, 0)), utc(2024, 1, 15, 8, 0, 0));
    }

    #[test]
    fn weekly_same_day_rolls_a_full_week_once_passed() {
        // 2024-01-08 is a Monday.
        let rule = ScheduleRule::WeeklyAt {
            weekday: Weekday::Mon,
            hour: 8,
            minute: 0,
        };
        assert_eq!(rule.next_run(utc(2024, 1, 8, 6, 0, 0)), utc(2024, 1, 8, 8, 0, 0));
        assert_eq!(rule.next_run(utc(2024, 1, 8, 8, 0, 0)), utc(2024, 1, 15, 8, 0, 0));
        assert_eq!(rule.next_run(utc(2024, 1, 8, 9, 0, 0)), utc(2024, 1, 15, 8, 0, 0));
    }

    #[test]
    fn weekly_due_needs_weekday_and_time() {
        let rule = ScheduleRule::WeeklyAt {
            weekday: Weekday::Mon,
            hour: 8,
            minute: 0,
        };
        assert!(rule.is_due(utc(2024, 1, 8, 8, 0, 0)));
        assert!(!rule.is_due(utc(2024, 1, 9, 8, 0, 0)));
        assert!(!rule.is_due(utc(2024, 1, 8, 8, 1, 0)));
    }

    #[test]
    fn period_start_truncation() {
        let now = utc(2026, 3, 4, 14, 37, 12);
        assert_eq!(ScheduleRule::Hourly.period_start(now), utc(2026, 3, 4, 14, 0, 0));
        assert_eq!(
            ScheduleRule::DailyAt { hour: 8, minute: 0 }.period_start(now),
            utc(2026, 3, 4, 0, 0, 0)
        );
        assert_eq!(
            ScheduleRule::WeeklyAt {
                weekday: Weekday::Sun,
                hour: 8,
                minute: 0
            }
            .period_start(now),
            utc(2026, 3, 4, 0, 0, 0)
        );
    }

    #[test]
    fn next_run_is_always_in_the_future() {
        let rules = [
            ScheduleRule::Hourly,
            ScheduleRule::DailyAt { hour: 3, minute: 30 },
            ScheduleRule::WeeklyAt {
                weekday: Weekday::Fri,
                hour: 23,
                minute: 59,
            },
        ];
        let now = utc(2026, 8, 7, 23, 59, 0);
        for rule in rules {
            assert!(rule.next_run(now) > now, "{rule} produced a past next_run");
        }
    }

    #[test]
    fn validate_rejects_out_of_range_fields() {
        assert_eq!(
            ScheduleRule::DailyAt { hour: 24, minute: 0 }.validate(),
            Err(RuleError::HourOutOfRange(24))
        );
        assert_eq!(
            ScheduleRule::WeeklyAt {
                weekday: Weekday::Mon,
                hour: 8,
                minute: 60
            }
            .validate(),
            Err(RuleError::MinuteOutOfRange(60))
        );
        assert!(ScheduleRule::Hourly.validate().is_ok());
        assert!(ScheduleRule::DailyAt { hour: 23, minute: 59 }.validate().is_ok());
    }

    #[test]
    fn rule_serde_round_trip() {
        let rules = [
            ScheduleRule::Hourly,
            ScheduleRule::DailyAt { hour: 8, minute: 0 },
            ScheduleRule::WeeklyAt {
                weekday: Weekday::Mon,
                hour: 8,
                minute: 0,
            },
        ];
        for rule in rules {
            let json = serde_json::to_string(&rule).unwrap();
            let parsed: ScheduleRule = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, rule);
        }
    }

    #[test]
    fn rule_serde_tag_shape() {
        let json = serde_json::to_string(&ScheduleRule::DailyAt { hour: 8, minute: 0 }).unwrap();
        assert!(json.contains("\"type\":\"daily_at\""));

        let parsed: ScheduleRule =
            serde_json::from_str(r#"{"type":"weekly_at","weekday":"Mon","hour":9,"minute":30}"#)
                .unwrap();
        assert_eq!(
            parsed,
            ScheduleRule::WeeklyAt {
                weekday: Weekday::Mon,
                hour: 9,
                minute: 30
            }
        );

        assert!(serde_json::from_str::<ScheduleRule>(r#"{"type":"monthly"}"#).is_err());
    }

    #[test]
    fn rule_display() {
        assert_eq!(ScheduleRule::Hourly.to_string(), "hourly");
        assert_eq!(
            ScheduleRule::DailyAt { hour: 8, minute: 0 }.to_string(),
            "daily at 08:00"
        );
        assert_eq!(
            ScheduleRule::WeeklyAt {
                weekday: Weekday::Mon,
                hour: 8,
                minute: 0
            }
            .to_string(),
            "weekly on Mon at 08:00"
        );
    }
}

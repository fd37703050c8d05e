//! Reset boundary arithmetic.
//!
//! All boundaries are computed in UTC. The default schedule resets daily
//! tasks at 00:00, weekly tasks on Wednesday 00:00 and monthly tasks on the
//! first day of the month at 00:00. Every function here is a pure function of
//! its inputs; the reconciler calls them once per task per tick.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::Frequency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSchedule {
    /// UTC hour at which every boundary falls
    pub daily_hour: u32,
    /// Day of week the weekly boundary falls on
    pub weekly_anchor: Weekday,
}

impl Default for ResetSchedule {
    fn default() -> Self {
        Self {
            daily_hour: 0,
            weekly_anchor: Weekday::Wed,
        }
    }
}

impl ResetSchedule {
    pub fn new(daily_hour: u32, weekly_anchor: Weekday) -> Result<Self, CoreError> {
        if daily_hour > 23 {
            return Err(CoreError::InvalidInput(format!(
                "Reset hour must be between 0 and 23, got {}",
                daily_hour
            )));
        }
        Ok(Self {
            daily_hour,
            weekly_anchor,
        })
    }

    fn reset_time(&self) -> NaiveTime {
        NaiveTime::MIN + Duration::hours(i64::from(self.daily_hour % 24))
    }

    fn at_reset(&self, date: NaiveDate) -> DateTime<Utc> {
        date.and_time(self.reset_time()).and_utc()
    }

    fn daily_floor(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.at_reset(instant.date_naive());
        if today <= instant {
            today
        } else {
            today - Duration::days(1)
        }
    }

    /// Latest boundary at or before `instant`.
    pub fn most_recent_boundary(&self, instant: DateTime<Utc>, frequency: Frequency) -> DateTime<Utc> {
        let day = self.daily_floor(instant);
        match frequency {
            Frequency::Daily => day,
            Frequency::Weekly => {
                let current = day.weekday().num_days_from_monday();
                let anchor = self.weekly_anchor.num_days_from_monday();
                let back = (current + 7 - anchor) % 7;
                day - Duration::days(i64::from(back))
            }
            Frequency::Monthly => {
                let date = instant.date_naive();
                let first = self.at_reset(first_of_month(date));
                if first <= instant {
                    first
                } else {
                    let previous = first_of_month(first_of_month(date) - Duration::days(1));
                    self.at_reset(previous)
                }
            }
        }
    }

    /// Earliest boundary strictly after `instant`.
    pub fn next_boundary(&self, instant: DateTime<Utc>, frequency: Frequency) -> DateTime<Utc> {
        let recent = self.most_recent_boundary(instant, frequency);
        match frequency {
            Frequency::Daily => recent + Duration::days(1),
            Frequency::Weekly => recent + Duration::days(7),
            Frequency::Monthly => {
                // 31 days past the first always lands inside the next month.
                let next = first_of_month(recent.date_naive() + Duration::days(31));
                self.at_reset(next)
            }
        }
    }

    pub fn time_until_next(&self, instant: DateTime<Utc>, frequency: Frequency) -> Duration {
        self.next_boundary(instant, frequency) - instant
    }

    /// Number of boundaries in the half-open interval `(from, to]`.
    pub fn boundaries_between(&self, from: DateTime<Utc>, to: DateTime<Utc>, frequency: Frequency) -> u32 {
        if to <= from {
            return 0;
        }
        let start = self.most_recent_boundary(from, frequency);
        let end = self.most_recent_boundary(to, frequency);
        let count = match frequency {
            Frequency::Daily => (end - start).num_days(),
            Frequency::Weekly => (end - start).num_days() / 7,
            Frequency::Monthly => {
                let months = |d: DateTime<Utc>| i64::from(d.year()) * 12 + i64::from(d.month0());
                months(end) - months(start)
            }
        };
        u32::try_from(count.max(0)).unwrap_or(u32::MAX)
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

/// [`ResetSchedule::most_recent_boundary`] on the default schedule.
pub fn most_recent_boundary(instant: DateTime<Utc>, frequency: Frequency) -> DateTime<Utc> {
    ResetSchedule::default().most_recent_boundary(instant, frequency)
}

/// [`ResetSchedule::next_boundary`] on the default schedule.
pub fn next_boundary(instant: DateTime<Utc>, frequency: Frequency) -> DateTime<Utc> {
    ResetSchedule::default().next_boundary(instant, frequency)
}

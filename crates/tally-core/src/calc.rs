//! Estimating how many resets a recurring gain needs to reach a target.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Frequency;
use crate::reset::ResetSchedule;

/// Projections stop after this many daily boundaries.
const MAX_DAYS: u32 = 3660;

/// A value that grows by fixed amounts at every reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressProjection {
    pub current: u64,
    pub target: u64,
    pub daily_gain: u64,
    pub weekly_gain: u64,
    pub monthly_gain: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletionEstimate {
    /// Boundary at which the target is first met
    pub reached_at: DateTime<Utc>,
    pub daily_resets: u32,
    pub weekly_resets: u32,
    pub monthly_resets: u32,
    pub total_gained: u64,
}

impl ProgressProjection {
    pub fn remaining(&self) -> u64 {
        self.target.saturating_sub(self.current)
    }

    /// Walks forward over reset boundaries after `from`, collecting gains,
    /// until the target is met. `None` when it never is within ten years.
    pub fn project_completion(&self, from: DateTime<Utc>, schedule: &ResetSchedule) -> Option<CompletionEstimate> {
        let mut estimate = CompletionEstimate {
            reached_at: from,
            daily_resets: 0,
            weekly_resets: 0,
            monthly_resets: 0,
            total_gained: 0,
        };
        let needed = self.remaining();
        if needed == 0 {
            return Some(estimate);
        }
        if self.daily_gain == 0 && self.weekly_gain == 0 && self.monthly_gain == 0 {
            return None;
        }

        let mut boundary = schedule.next_boundary(from, Frequency::Daily);
        for _ in 0..MAX_DAYS {
            estimate.daily_resets = schedule.boundaries_between(from, boundary, Frequency::Daily);
            estimate.weekly_resets = schedule.boundaries_between(from, boundary, Frequency::Weekly);
            estimate.monthly_resets = schedule.boundaries_between(from, boundary, Frequency::Monthly);
            estimate.total_gained = gained(estimate.daily_resets, self.daily_gain)
                .saturating_add(gained(estimate.weekly_resets, self.weekly_gain))
                .saturating_add(gained(estimate.monthly_resets, self.monthly_gain));
            if estimate.total_gained >= needed {
                estimate.reached_at = boundary;
                return Some(estimate);
            }
            boundary += Duration::days(1);
        }
        None
    }
}

fn gained(resets: u32, per_reset: u64) -> u64 {
    u64::from(resets).saturating_mul(per_reset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn monday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_already_reached() {
        let plan = ProgressProjection {
            current: 10,
            target: 5,
            ..Default::default()
        };
        let estimate = plan.project_completion(monday(), &ResetSchedule::default()).unwrap();
        assert_eq!(estimate.reached_at, monday());
        assert_eq!(estimate.daily_resets, 0);
    }

    #[test]
    fn test_no_gain_never_reaches() {
        let plan = ProgressProjection {
            current: 0,
            target: 1,
            ..Default::default()
        };
        assert_eq!(plan.project_completion(monday(), &ResetSchedule::default()), None);
    }

    #[test]
    fn test_weekly_gain_lands_on_wednesday() {
        let plan = ProgressProjection {
            current: 0,
            target: 100,
            daily_gain: 0,
            weekly_gain: 100,
            monthly_gain: 0,
        };
        let estimate = plan.project_completion(monday(), &ResetSchedule::default()).unwrap();
        assert_eq!(estimate.reached_at, Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap());
        assert_eq!(estimate.daily_resets, 2);
        assert_eq!(estimate.weekly_resets, 1);
    }

    #[test]
    fn test_mixed_gains_count_each_kind() {
        // Tuesday 2024-04-30; the next boundary is May 1st, also a Wednesday.
        let from = Utc.with_ymd_and_hms(2024, 4, 30, 8, 0, 0).unwrap();
        let plan = ProgressProjection {
            current: 0,
            target: 111,
            daily_gain: 1,
            weekly_gain: 10,
            monthly_gain: 100,
        };
        let estimate = plan.project_completion(from, &ResetSchedule::default()).unwrap();
        assert_eq!(estimate.reached_at, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(
            (estimate.daily_resets, estimate.weekly_resets, estimate.monthly_resets),
            (1, 1, 1)
        );
    }

    #[test]
    fn test_weekly_gain_over_several_weeks() {
        let plan = ProgressProjection {
            current: 0,
            target: 300,
            weekly_gain: 100,
            ..Default::default()
        };
        let estimate = plan.project_completion(monday(), &ResetSchedule::default()).unwrap();
        assert_eq!(estimate.reached_at, Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap());
        assert_eq!((estimate.daily_resets, estimate.weekly_resets), (16, 3));
        assert_eq!(estimate.monthly_resets, 0);
    }

    proptest! {
        #[test]
        fn prop_daily_only_takes_ceil_days(target in 1u64..5000, gain in 1u64..50) {
            let plan = ProgressProjection { current: 0, target, daily_gain: gain, ..Default::default() };
            let estimate = plan.project_completion(monday(), &ResetSchedule::default());
            let days = target.div_ceil(gain);
            if days <= u64::from(MAX_DAYS) {
                let estimate = estimate.unwrap();
                prop_assert_eq!(u64::from(estimate.daily_resets), days);
                prop_assert!(estimate.total_gained >= target);
            } else {
                prop_assert!(estimate.is_none());
            }
        }
    }
}

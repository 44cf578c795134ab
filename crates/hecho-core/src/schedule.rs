//! Weekly load schedule and the catch-up decision.
//!
//! Loads are expected once a week on a fixed weekday. A stage is due when it
//! has never succeeded, when too many days passed since the last success, or
//! when the most recent scheduled day came and went without a success.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSchedule {
  pub weekday:                Weekday,
  pub max_days_between_loads: i64,
}

/// Outcome of [`LoadSchedule::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
  NeverLoaded,
  Overdue { days: i64 },
  MissedScheduledDay { scheduled: NaiveDate },
  UpToDate,
}

impl Verdict {
  pub fn is_due(&self) -> bool { !matches!(self, Self::UpToDate) }
}

impl LoadSchedule {
  pub fn weekly(weekday: Weekday) -> Self { Self { weekday, max_days_between_loads: 7 } }

  /// The latest date on or before `today` that falls on the scheduled
  /// weekday.
  pub fn most_recent_scheduled_day(&self, today: NaiveDate) -> NaiveDate {
    let back = (today.weekday().num_days_from_monday() + 7
      - self.weekday.num_days_from_monday())
      % 7;
    today - Days::new(u64::from(back))
  }

  pub fn evaluate(
    &self,
    last_success: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
  ) -> Verdict {
    let Some(last) = last_success else { return Verdict::NeverLoaded };

    let days = (now - last).num_days();
    if days > self.max_days_between_loads {
      return Verdict::Overdue { days };
    }

    let scheduled = self.most_recent_scheduled_day(now.date_naive());
    if last.date_naive() < scheduled {
      return Verdict::MissedScheduledDay { scheduled };
    }

    Verdict::UpToDate
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
  }

  // 2024-05-10 is a Friday.
  const FRIDAY: (i32, u32, u32) = (2024, 5, 10);

  #[test]
  fn never_loaded_is_due() {
    let s = LoadSchedule::weekly(Weekday::Fri);
    assert_eq!(s.evaluate(None, at(2024, 5, 8, 12)), Verdict::NeverLoaded);
  }

  #[test]
  fn overdue_after_max_days() {
    let s = LoadSchedule::weekly(Weekday::Fri);
    let verdict = s.evaluate(Some(at(2024, 5, 1, 2)), at(2024, 5, 9, 3));
    assert_eq!(verdict, Verdict::Overdue { days: 8 });
    assert!(verdict.is_due());
  }

  #[test]
  fn scheduled_day_without_load_is_due() {
    let s = LoadSchedule::weekly(Weekday::Fri);
    let (y, m, d) = FRIDAY;
    // Loaded Wednesday, checking Friday afternoon.
    let verdict = s.evaluate(Some(at(2024, 5, 8, 2)), at(y, m, d, 15));
    assert_eq!(
      verdict,
      Verdict::MissedScheduledDay { scheduled: NaiveDate::from_ymd_opt(y, m, d).unwrap() }
    );
  }

  #[test]
  fn missed_last_friday_is_due() {
    let s = LoadSchedule::weekly(Weekday::Fri);
    // Last load Thursday 2024-05-09, checking Monday 2024-05-13.
    let verdict = s.evaluate(Some(at(2024, 5, 9, 2)), at(2024, 5, 13, 9));
    assert!(matches!(verdict, Verdict::MissedScheduledDay { .. }));
  }

  #[test]
  fn loaded_on_schedule_is_up_to_date() {
    let s = LoadSchedule::weekly(Weekday::Fri);
    let (y, m, d) = FRIDAY;
    let verdict = s.evaluate(Some(at(y, m, d, 2)), at(2024, 5, 14, 9));
    assert_eq!(verdict, Verdict::UpToDate);
    assert!(!verdict.is_due());
  }

  #[test]
  fn most_recent_scheduled_day_includes_today() {
    let s = LoadSchedule::weekly(Weekday::Sat);
    let saturday = NaiveDate::from_ymd_opt(2024, 5, 11).unwrap();
    assert_eq!(s.most_recent_scheduled_day(saturday), saturday);
    let friday = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
    assert_eq!(
      s.most_recent_scheduled_day(friday),
      NaiveDate::from_ymd_opt(2024, 5, 4).unwrap()
    );
  }
}

//! Calendar expansion for the date dimension.
//!
//! Every derived attribute is computed here, in process, so the warehouse
//! never depends on store-specific date functions.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

/// Month names in the warehouse's data locale (es-CO), January first.
const MONTH_NAMES: [&str; 12] = [
  "Enero",
  "Febrero",
  "Marzo",
  "Abril",
  "Mayo",
  "Junio",
  "Julio",
  "Agosto",
  "Septiembre",
  "Octubre",
  "Noviembre",
  "Diciembre",
];

/// Weekday names in the warehouse's data locale (es-CO), Monday first.
const WEEKDAY_NAMES: [&str; 7] =
  ["Lunes", "Martes", "Miércoles", "Jueves", "Viernes", "Sábado", "Domingo"];

/// One row of the date dimension, minus its surrogate key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
  pub day:          NaiveDate,
  pub year:         i32,
  pub month:        u32,
  pub day_of_month: u32,
  pub quarter:      u32,
  /// ISO 8601 week number.
  pub iso_week:     u32,
  /// ISO weekday, 1 = Monday … 7 = Sunday.
  pub weekday:      u32,
  pub month_name:   &'static str,
  pub weekday_name: &'static str,
  pub is_weekend:   bool,
}

impl CalendarDay {
  pub fn new(day: NaiveDate) -> Self {
    let month = day.month();
    let weekday = day.weekday().number_from_monday();
    Self {
      day,
      year: day.year(),
      month,
      day_of_month: day.day(),
      quarter: (month - 1) / 3 + 1,
      iso_week: day.iso_week().week(),
      weekday,
      month_name: MONTH_NAMES[(month - 1) as usize],
      weekday_name: WEEKDAY_NAMES[(weekday - 1) as usize],
      is_weekend: matches!(day.weekday(), Weekday::Sat | Weekday::Sun),
    }
  }
}

/// Every calendar day in `[start, end]`, inclusive. Empty when
/// `start > end`.
pub fn expand(start: NaiveDate, end: NaiveDate) -> Vec<CalendarDay> {
  start
    .iter_days()
    .take_while(|day| *day <= end)
    .map(CalendarDay::new)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  #[test]
  fn expand_is_inclusive_and_gapless() {
    let start = date(2023, 12, 25);
    let end = date(2024, 3, 1);
    let days = expand(start, end);

    assert_eq!(days.len() as i64, (end - start).num_days() + 1);
    assert_eq!(days.first().unwrap().day, start);
    assert_eq!(days.last().unwrap().day, end);
    assert!(days.windows(2).all(|w| w[0].day.succ_opt() == Some(w[1].day)));
  }

  #[test]
  fn expand_single_day_and_inverted_range() {
    assert_eq!(expand(date(2024, 1, 1), date(2024, 1, 1)).len(), 1);
    assert!(expand(date(2024, 1, 2), date(2024, 1, 1)).is_empty());
  }

  #[test]
  fn weekend_flag_matches_saturday_and_sunday() {
    for day in expand(date(2024, 1, 1), date(2024, 12, 31)) {
      let expected = day.weekday >= 6;
      assert_eq!(day.is_weekend, expected, "{}", day.day);
    }
  }

  #[test]
  fn derived_attributes() {
    // 2024-02-29 is a Thursday in ISO week 9.
    let day = CalendarDay::new(date(2024, 2, 29));
    assert_eq!(day.year, 2024);
    assert_eq!(day.month, 2);
    assert_eq!(day.day_of_month, 29);
    assert_eq!(day.quarter, 1);
    assert_eq!(day.iso_week, 9);
    assert_eq!(day.weekday, 4);
    assert_eq!(day.month_name, "Febrero");
    assert_eq!(day.weekday_name, "Jueves");
    assert!(!day.is_weekend);

    // 2021-01-03 is a Sunday that belongs to ISO week 53 of 2020.
    let day = CalendarDay::new(date(2021, 1, 3));
    assert_eq!(day.iso_week, 53);
    assert_eq!(day.weekday, 7);
    assert_eq!(day.weekday_name, "Domingo");
    assert!(day.is_weekend);

    assert_eq!(CalendarDay::new(date(2024, 10, 1)).quarter, 4);
  }
}

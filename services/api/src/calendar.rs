//! Class calendar helpers
//!
//! One parser for class times (12h and 24h spellings), the studio-local start
//! instant of a class, Monday–Sunday week windows and the weekly slot template
//! used to lay out a year of classes.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use regex::Regex;
use std::sync::OnceLock;

/// Parse a class time such as `"07:30"`, `"19:00"`, `"7:30 PM"`, `"7pm"` or `"12:00 AM"`
pub fn parse_class_time(raw: &str) -> Option<NaiveTime> {
    static TIME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = TIME_REGEX.get_or_init(|| {
        Regex::new(concat!(
            r"^(\d{1,2})(?::(\d{2}))?(?::(\d{2}))?\s*([AaPp])\.?\s*[Mm]?\.?$",
            r"|^(\d{1,2}):(\d{2})(?::(\d{2}))?$",
        ))
        .expect("Failed to compile class time regex")
    });

    let caps = regex.captures(raw.trim())?;

    if let Some(meridiem) = caps.get(4) {
        let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let is_pm = meridiem.as_str().eq_ignore_ascii_case("p");
        let hour = match (hour, is_pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        };
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    let hour: u32 = caps.get(5)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(6)?.as_str().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Normalize any accepted spelling to the stored `HH:MM` form
pub fn canonical_time(raw: &str) -> Option<String> {
    parse_class_time(raw).map(|t| t.format("%H:%M").to_string())
}

/// Weekday label stored next to each class
pub fn day_of_week_label(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// The instant a class starts, reading its date and time in the studio's offset
pub fn class_start(date: NaiveDate, time: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let time = parse_class_time(time)?;
    date.and_time(time)
        .and_local_timezone(offset)
        .single()
        .map(|start| start.with_timezone(&Utc))
}

/// The Monday and Sunday of the week containing `date`
pub fn week_window(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    (monday, monday + Duration::days(6))
}

/// Today's date on the studio's clock
pub fn studio_today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Morning and evening slot lists for one weekday
#[derive(Debug, Clone, Default)]
pub struct DaySlots {
    pub morning: Vec<&'static str>,
    pub evening: Vec<&'static str>,
}

/// Weekly timetable the batch generator repeats over a year
#[derive(Debug, Clone)]
pub struct WeeklyTemplate {
    days: [DaySlots; 7],
}

impl Default for WeeklyTemplate {
    fn default() -> Self {
        let weekday = || DaySlots {
            morning: vec!["07:00", "08:00", "09:00", "10:00"],
            evening: vec!["17:00", "18:00", "19:00", "20:00"],
        };
        let friday = DaySlots {
            morning: vec!["07:00", "08:00", "09:00", "10:00"],
            evening: vec!["17:00", "18:00"],
        };
        let saturday = DaySlots {
            morning: vec!["09:00", "10:00", "11:00"],
            evening: vec![],
        };

        Self {
            days: [
                weekday(),
                weekday(),
                weekday(),
                weekday(),
                friday,
                saturday,
                DaySlots::default(),
            ],
        }
    }
}

impl WeeklyTemplate {
    /// Slots for a weekday, mornings first
    pub fn slots_for(&self, weekday: Weekday) -> impl Iterator<Item = &'static str> + '_ {
        let day = &self.days[weekday.num_days_from_monday() as usize];
        day.morning.iter().chain(day.evening.iter()).copied()
    }

    /// Every (date, time) pair for `days` consecutive days starting at `start`
    pub fn generate(&self, start: NaiveDate, days: u32) -> Vec<(NaiveDate, String)> {
        start
            .iter_days()
            .take(days as usize)
            .flat_map(|date| {
                self.slots_for(date.weekday())
                    .map(move |time| (date, time.to_string()))
            })
            .collect()
    }
}

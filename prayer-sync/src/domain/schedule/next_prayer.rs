//! Pure next/current prayer queries over a schedule and a local time.
//!
//! Countdown accuracy follows the device clock; there is no server-time
//! correction.

use chrono::{NaiveDateTime, TimeDelta, Timelike};
use serde::Serialize;

use super::model::{PrayerKey, PrayerSchedule, PrayerTime};

/// Time left until a prayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Remaining {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Remaining {
    fn from_delta(delta: TimeDelta) -> Self {
        let total = delta.num_seconds();
        Self {
            hours: total / 3_600,
            minutes: (total % 3_600) / 60,
            seconds: total % 60,
        }
    }

    /// Whole seconds remaining.
    pub fn total_seconds(&self) -> i64 {
        self.hours * 3_600 + self.minutes * 60 + self.seconds
    }
}

/// Upcoming prayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextPrayer {
    pub key: PrayerKey,
    pub name: String,
    pub time: PrayerTime,
    pub remaining: Remaining,
    /// `false` for tomorrow's imsak after the last prayer of the day.
    pub is_today: bool,
}

/// Prayer whose time has most recently started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentPrayer {
    pub key: PrayerKey,
    pub name: String,
    pub time: PrayerTime,
}

fn minute_of_day(now: NaiveDateTime) -> u32 {
    now.hour() * 60 + now.minute()
}

/// First timing strictly after the current minute, else tomorrow's imsak.
///
/// Returns `None` when the schedule has no imsak or the computed countdown
/// would not be positive.
///
/// ```
/// use prayer_sync::domain::{PrayerKey, next_prayer};
/// # use prayer_sync::domain::PrayerSchedule;
/// # fn check(schedule: &PrayerSchedule, now: chrono::NaiveDateTime) {
/// if let Some(next) = next_prayer(schedule, now) {
///     assert!(next.remaining.total_seconds() > 0);
///     assert!(next.is_today || next.key == PrayerKey::Imsak);
/// }
/// # }
/// ```
pub fn next_prayer(schedule: &PrayerSchedule, now: NaiveDateTime) -> Option<NextPrayer> {
    let now_minutes = minute_of_day(now);
    let upcoming = schedule
        .timings()
        .find(|(_, timing)| timing.time.minutes_of_day() > now_minutes);
    if let Some((key, timing)) = upcoming {
        let target = now.date().and_time(timing.time.time());
        return build(key, &timing.name, timing.time, target - now, true);
    }

    let imsak = schedule.timing(PrayerKey::Imsak)?;
    let tomorrow = now.date().succ_opt()?;
    let target = tomorrow.and_time(imsak.time.time());
    build(PrayerKey::Imsak, &imsak.name, imsak.time, target - now, false)
}

fn build(
    key: PrayerKey,
    name: &str,
    time: PrayerTime,
    diff: TimeDelta,
    is_today: bool,
) -> Option<NextPrayer> {
    if diff <= TimeDelta::zero() {
        return None;
    }
    Some(NextPrayer {
        key,
        name: name.to_owned(),
        time,
        remaining: Remaining::from_delta(diff),
        is_today,
    })
}

/// Last timing at or before the current minute; `None` before imsak.
pub fn current_prayer(schedule: &PrayerSchedule, now: NaiveDateTime) -> Option<CurrentPrayer> {
    let now_minutes = minute_of_day(now);
    schedule
        .timings()
        .filter(|(_, timing)| timing.time.minutes_of_day() <= now_minutes)
        .last()
        .map(|(key, timing)| CurrentPrayer {
            key,
            name: timing.name.clone(),
            time: timing.time,
        })
}

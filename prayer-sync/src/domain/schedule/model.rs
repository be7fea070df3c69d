//! Prayer schedule value types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ScheduleError;
use crate::domain::{Coordinate, LocationRecord, LocationSource};

/// Timings in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrayerKey {
    Imsak,
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerKey {
    /// Fixed display order used by every scan.
    pub const ORDER: [Self; 7] = [
        Self::Imsak,
        Self::Fajr,
        Self::Sunrise,
        Self::Dhuhr,
        Self::Asr,
        Self::Maghrib,
        Self::Isha,
    ];

    /// Keys the API must always supply.
    pub const REQUIRED: [Self; 5] = [Self::Fajr, Self::Dhuhr, Self::Asr, Self::Maghrib, Self::Isha];

    /// Indonesian display name.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Imsak => "Imsak",
            Self::Fajr => "Subuh",
            Self::Sunrise => "Terbit",
            Self::Dhuhr => "Dzuhur",
            Self::Asr => "Ashar",
            Self::Maghrib => "Maghrib",
            Self::Isha => "Isya",
        }
    }

    /// Field name in the API `timings` object.
    pub fn api_field(self) -> &'static str {
        match self {
            Self::Imsak => "Imsak",
            Self::Fajr => "Fajr",
            Self::Sunrise => "Sunrise",
            Self::Dhuhr => "Dhuhr",
            Self::Asr => "Asr",
            Self::Maghrib => "Maghrib",
            Self::Isha => "Isha",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Imsak => "imsak",
            Self::Fajr => "fajr",
            Self::Sunrise => "sunrise",
            Self::Dhuhr => "dhuhr",
            Self::Asr => "asr",
            Self::Maghrib => "maghrib",
            Self::Isha => "isha",
        }
    }
}

/// Minute-precision wall-clock time, serialised as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrayerTime(NaiveTime);

impl PrayerTime {
    /// Build from hour and minute.
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    /// Parse the leading `HH:MM` token, ignoring suffixes such as `"(WIB)"`.
    ///
    /// ```
    /// use prayer_sync::domain::PrayerTime;
    ///
    /// let time = PrayerTime::parse("04:30 (WIB)").expect("valid time");
    /// assert_eq!(time.to_string(), "04:30");
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.split_whitespace().next()?;
        NaiveTime::parse_from_str(token, "%H:%M").ok().map(Self)
    }

    pub fn time(self) -> NaiveTime {
        self.0
    }

    /// Minutes since local midnight.
    pub fn minutes_of_day(self) -> u32 {
        self.0.hour() * 60 + self.0.minute()
    }

    /// `minutes` earlier, wrapping past midnight.
    #[must_use]
    pub fn minus_minutes(self, minutes: u32) -> Self {
        Self(self.0 - TimeDelta::minutes(i64::from(minutes)))
    }
}

impl fmt::Display for PrayerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl Serialize for PrayerTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PrayerTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("`{raw}` is not an HH:MM time")))
    }
}

/// Whether a timing came from the API or was derived locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingSource {
    Api,
    Calculated,
}

/// One entry of a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerTiming {
    pub time: PrayerTime,
    pub name: String,
    pub source: TimingSource,
}

/// Islamic calendar date as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HijriDate {
    pub day: u32,
    pub month_number: u32,
    pub month_name: String,
    pub year: i32,
}

impl fmt::Display for HijriDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} H", self.day, self.month_name, self.year)
    }
}

/// Calendar date of a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDate {
    /// Serialised as ISO `YYYY-MM-DD`.
    pub gregorian: NaiveDate,
    pub hijri: Option<HijriDate>,
}

/// Location a schedule was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSnapshot {
    pub regency_id: Option<String>,
    pub province_id: Option<String>,
    pub name: String,
    pub coordinates: Coordinate,
    pub source: LocationSource,
}

impl From<&LocationRecord> for LocationSnapshot {
    fn from(record: &LocationRecord) -> Self {
        Self {
            regency_id: record.regency().map(|region| region.id.clone()),
            province_id: record.province().map(|region| region.id.clone()),
            name: record.display_name(),
            coordinates: record.coordinates(),
            source: record.source(),
        }
    }
}

/// Immutable daily schedule. `imsak` is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(try_from = "ScheduleDto")]
pub struct PrayerSchedule {
    date: ScheduleDate,
    location: LocationSnapshot,
    timings: BTreeMap<PrayerKey, PrayerTiming>,
    fetched_at: i64,
}

impl PrayerSchedule {
    /// Build a schedule from source timings.
    ///
    /// Imsak is derived from Fajr only when the source omitted it.
    pub fn new(
        date: ScheduleDate,
        location: LocationSnapshot,
        source_timings: &BTreeMap<PrayerKey, PrayerTime>,
        imsak_offset_minutes: u32,
        fetched_at: i64,
    ) -> Result<Self, ScheduleError> {
        let mut timings: BTreeMap<PrayerKey, PrayerTiming> = source_timings
            .iter()
            .map(|(key, time)| {
                (
                    *key,
                    PrayerTiming {
                        time: *time,
                        name: key.display_name().to_owned(),
                        source: TimingSource::Api,
                    },
                )
            })
            .collect();
        if let Some(missing) = PrayerKey::REQUIRED
            .iter()
            .find(|key| !timings.contains_key(*key))
        {
            return Err(ScheduleError::Decode {
                message: format!("timing `{}` missing", missing.api_field()),
            });
        }
        if !timings.contains_key(&PrayerKey::Imsak) {
            if let Some(fajr) = timings.get(&PrayerKey::Fajr).map(|timing| timing.time) {
                timings.insert(
                    PrayerKey::Imsak,
                    PrayerTiming {
                        time: derive_imsak(fajr, imsak_offset_minutes),
                        name: PrayerKey::Imsak.display_name().to_owned(),
                        source: TimingSource::Calculated,
                    },
                );
            }
        }
        Ok(Self {
            date,
            location,
            timings,
            fetched_at,
        })
    }

    pub fn date(&self) -> &ScheduleDate {
        &self.date
    }

    pub fn gregorian(&self) -> NaiveDate {
        self.date.gregorian
    }

    pub fn location(&self) -> &LocationSnapshot {
        &self.location
    }

    pub fn timing(&self, key: PrayerKey) -> Option<&PrayerTiming> {
        self.timings.get(&key)
    }

    /// Timings in display order.
    pub fn timings(&self) -> impl Iterator<Item = (PrayerKey, &PrayerTiming)> {
        PrayerKey::ORDER
            .into_iter()
            .filter_map(|key| self.timings.get(&key).map(|timing| (key, timing)))
    }

    /// Fetch time in epoch milliseconds.
    pub fn fetched_at(&self) -> i64 {
        self.fetched_at
    }

    /// Whether this schedule was computed for the cache cell of `coordinate`.
    pub fn is_for_location(&self, coordinate: &Coordinate) -> bool {
        self.location.coordinates.same_cell(coordinate)
    }
}

/// Imsak as `fajr - offset_minutes`, wrapping past midnight.
pub fn derive_imsak(fajr: PrayerTime, offset_minutes: u32) -> PrayerTime {
    fajr.minus_minutes(offset_minutes)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleDto {
    date: ScheduleDate,
    location: LocationSnapshot,
    timings: BTreeMap<PrayerKey, PrayerTiming>,
    fetched_at: i64,
}

impl TryFrom<ScheduleDto> for PrayerSchedule {
    type Error = String;

    fn try_from(value: ScheduleDto) -> Result<Self, Self::Error> {
        if !value.timings.contains_key(&PrayerKey::Imsak) {
            return Err("stored schedule lacks imsak".to_owned());
        }
        if let Some(missing) = PrayerKey::REQUIRED
            .iter()
            .find(|key| !value.timings.contains_key(*key))
        {
            return Err(format!("stored schedule lacks {}", missing.as_str()));
        }
        Ok(Self {
            date: value.date,
            location: value.location,
            timings: value.timings,
            fetched_at: value.fetched_at,
        })
    }
}

//! Decoding of prayer API payloads into schedule parts.
//!
//! Timing strings carry timezone suffixes (`"04:30 (WIB)"`); only the leading
//! `HH:MM` token is kept. Hijri day and year arrive as strings in some
//! mirrors and as numbers in others, so both are accepted.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ScheduleError;
use super::model::{HijriDate, PrayerKey, PrayerTime};

/// One decoded day.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct ParsedDay {
    pub(super) gregorian: NaiveDate,
    pub(super) hijri: Option<HijriDate>,
    pub(super) timings: BTreeMap<PrayerKey, PrayerTime>,
}

#[derive(Deserialize)]
struct DayDto {
    timings: HashMap<String, String>,
    date: DateDto,
}

#[derive(Deserialize)]
struct DateDto {
    gregorian: GregorianDto,
    #[serde(default)]
    hijri: Option<HijriDto>,
}

#[derive(Deserialize)]
struct GregorianDto {
    date: String,
}

#[derive(Deserialize)]
struct HijriDto {
    day: NumberLike,
    month: HijriMonthDto,
    year: NumberLike,
}

#[derive(Deserialize)]
struct HijriMonthDto {
    number: NumberLike,
    en: String,
}

#[derive(Deserialize)]
struct ConversionDto {
    hijri: HijriDto,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberLike {
    Number(i64),
    Text(String),
}

impl NumberLike {
    fn to_i64(&self, field: &str) -> Result<i64, ScheduleError> {
        match self {
            Self::Number(value) => Ok(*value),
            Self::Text(text) => text.trim().parse().map_err(|_| decode(format!(
                "hijri {field} `{text}` is not a number"
            ))),
        }
    }
}

/// Reject envelopes reporting an API-level failure.
pub(super) fn ensure_success(payload: &Value) -> Result<(), ScheduleError> {
    let code = payload.get("code").and_then(Value::as_i64);
    let status = payload.get("status").and_then(Value::as_str);
    if code == Some(200) && status == Some("OK") {
        return Ok(());
    }
    let detail = payload
        .get("data")
        .and_then(Value::as_str)
        .unwrap_or("no detail");
    Err(ScheduleError::ApiLogical {
        message: format!(
            "code {} status {}: {detail}",
            code.map_or_else(|| "missing".to_owned(), |code| code.to_string()),
            status.unwrap_or("missing"),
        ),
    })
}

/// Decode a `timings/{date}` envelope.
pub(super) fn parse_day(payload: &Value) -> Result<ParsedDay, ScheduleError> {
    ensure_success(payload)?;
    let dto: DayDto = data_as(payload)?;
    day_from_dto(dto)
}

/// Decode a `calendar/{year}/{month}` envelope.
pub(super) fn parse_calendar(payload: &Value) -> Result<Vec<ParsedDay>, ScheduleError> {
    ensure_success(payload)?;
    let days: Vec<DayDto> = data_as(payload)?;
    days.into_iter().map(day_from_dto).collect()
}

/// Decode a `gToH/{date}` envelope.
pub(super) fn parse_conversion(payload: &Value) -> Result<HijriDate, ScheduleError> {
    ensure_success(payload)?;
    let dto: ConversionDto = data_as(payload)?;
    hijri_from_dto(&dto.hijri)
}

fn data_as<T: DeserializeOwned>(payload: &Value) -> Result<T, ScheduleError> {
    let data = payload
        .get("data")
        .cloned()
        .ok_or_else(|| decode("payload has no `data`"))?;
    serde_json::from_value(data).map_err(|err| decode(err.to_string()))
}

fn day_from_dto(dto: DayDto) -> Result<ParsedDay, ScheduleError> {
    let gregorian = NaiveDate::parse_from_str(&dto.date.gregorian.date, "%d-%m-%Y")
        .map_err(|err| decode(format!("gregorian date `{}`: {err}", dto.date.gregorian.date)))?;
    let hijri = dto.date.hijri.as_ref().map(hijri_from_dto).transpose()?;

    let mut timings = BTreeMap::new();
    for key in PrayerKey::ORDER {
        let Some(raw) = dto.timings.get(key.api_field()) else {
            continue;
        };
        match PrayerTime::parse(raw) {
            Some(time) => {
                timings.insert(key, time);
            }
            None if PrayerKey::REQUIRED.contains(&key) => {
                return Err(decode(format!("timing `{}` value `{raw}`", key.api_field())));
            }
            None => {}
        }
    }
    Ok(ParsedDay {
        gregorian,
        hijri,
        timings,
    })
}

fn hijri_from_dto(dto: &HijriDto) -> Result<HijriDate, ScheduleError> {
    let narrow = |value: i64, field: &str| {
        u32::try_from(value).map_err(|_| decode(format!("hijri {field} {value} out of range")))
    };
    Ok(HijriDate {
        day: narrow(dto.day.to_i64("day")?, "day")?,
        month_number: narrow(dto.month.number.to_i64("month")?, "month")?,
        month_name: dto.month.en.clone(),
        year: i32::try_from(dto.year.to_i64("year")?)
            .map_err(|_| decode("hijri year out of range"))?,
    })
}

fn decode(message: impl Into<String>) -> ScheduleError {
    ScheduleError::Decode {
        message: message.into(),
    }
}

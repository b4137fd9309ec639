use chrono::FixedOffset;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::AtemateError;
use crate::wellness::tracker::today;

/// Largest UTC offset in use anywhere (UTC+14).
const MAX_OFFSET_MINUTES: u32 = 14 * 60;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogWaterRequest {
    /// Water intake in millilitres.
    pub ml: u32,
    /// YYYY-MM-DD; defaults to today at the caller's offset.
    pub date: Option<String>,
    /// Caller's offset from UTC in minutes (e.g. 330 for UTC+05:30); defaults to 0.
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogFitnessRequest {
    pub steps: u32,
    /// Calories burned.
    pub calories: u32,
    /// YYYY-MM-DD; defaults to today at the caller's offset.
    pub date: Option<String>,
    /// Caller's offset from UTC in minutes; defaults to 0.
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SummaryRequest {
    /// YYYY-MM-DD; defaults to today at the caller's offset.
    pub date: Option<String>,
    /// Caller's offset from UTC in minutes. Picks the greeting and the
    /// default date; defaults to 0.
    pub utc_offset_minutes: Option<i32>,
}

/// Missing offsets mean UTC.
pub fn utc_offset(minutes: Option<i32>) -> Result<FixedOffset, AtemateError> {
    let minutes = minutes.unwrap_or(0);
    if minutes.unsigned_abs() > MAX_OFFSET_MINUTES {
        return Err(AtemateError::InvalidInput(format!(
            "utc_offset_minutes must be within ±{MAX_OFFSET_MINUTES}, got {minutes}"
        )));
    }
    FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| AtemateError::InvalidInput(format!("invalid utc offset: {minutes}")))
}

/// Blank or missing dates mean today.
pub fn date_or_today(date: Option<&str>, offset: FixedOffset) -> String {
    date.map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| today(offset))
}
